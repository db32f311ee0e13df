//! Include/exclude rules applied while listing
//!
//! A filters file holds one rule per line:
//!
//! ```text
//! # comment
//! - *.tmp          exclude any file named *.tmp
//! - /build/        exclude the top-level build directory
//! + /docs/**       include everything under docs
//! !                clear the rules read so far
//! ```
//!
//! Patterns without a leading `/` match at any depth. A trailing `/` makes
//! a rule apply to directories only. The first matching rule wins; paths
//! matching no rule are included.

use std::path::Path;

use bisync_fs::RelPath;
use globset::{GlobBuilder, GlobMatcher};

use crate::{Error, Result};

#[derive(Debug, Clone)]
struct Rule {
    include: bool,
    dir_only: bool,
    pattern: String,
    matcher: GlobMatcher,
}

/// Ordered filter rules plus the checksum of their source
#[derive(Debug, Clone, Default)]
pub struct FilterSet {
    rules: Vec<Rule>,
    checksum: Option<String>,
}

impl FilterSet {
    /// Read rules from a filters file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = bisync_fs::io::read_text(path)?;
        Self::parse(&content)
    }

    /// Parse rules from text, reporting every bad line at once.
    pub fn parse(content: &str) -> Result<Self> {
        let mut rules = Vec::new();
        let mut problems = Vec::new();

        for (number, line) in content.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') || line.starts_with(';') {
                continue;
            }
            if line == "!" {
                rules.clear();
                continue;
            }

            let (include, pattern) = if let Some(rest) = line.strip_prefix('+') {
                (true, rest.trim())
            } else if let Some(rest) = line.strip_prefix('-') {
                (false, rest.trim())
            } else {
                problems.push(format!(
                    "filters line {}: expected '+ pattern' or '- pattern', got {:?}",
                    number + 1,
                    line
                ));
                continue;
            };

            match compile(pattern) {
                Ok((matcher, dir_only)) => rules.push(Rule {
                    include,
                    dir_only,
                    pattern: pattern.to_string(),
                    matcher,
                }),
                Err(message) => problems.push(format!("filters line {}: {}", number + 1, message)),
            }
        }

        if !problems.is_empty() {
            return Err(Error::Config { problems });
        }

        Ok(Self {
            rules,
            checksum: Some(bisync_fs::checksum::compute_content_checksum(
                content.as_bytes(),
            )),
        })
    }

    /// Checksum of the filters source, `None` when no filters are in use.
    pub fn checksum(&self) -> Option<&str> {
        self.checksum.as_deref()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Whether a file at `path` is synchronized.
    pub fn is_file_included(&self, path: &RelPath) -> bool {
        self.rules
            .iter()
            .filter(|r| !r.dir_only)
            .find(|r| r.matcher.is_match(path.as_str()))
            .is_none_or(|r| r.include)
    }

    /// Whether the directory at `path` is descended into.
    pub fn is_dir_included(&self, path: &RelPath) -> bool {
        match self
            .rules
            .iter()
            .filter(|r| r.dir_only)
            .find(|r| r.matcher.is_match(path.as_str()))
        {
            Some(rule) if !rule.include => {
                tracing::trace!(path = %path, pattern = %rule.pattern, "Directory pruned");
                false
            }
            _ => true,
        }
    }
}

/// Compile a rule pattern into a glob matcher over `/`-separated paths.
fn compile(pattern: &str) -> std::result::Result<(GlobMatcher, bool), String> {
    if pattern.is_empty() || pattern == "/" {
        return Err("empty pattern".to_string());
    }

    let dir_only = pattern.ends_with('/');
    let body = pattern.trim_end_matches('/');
    let glob = match body.strip_prefix('/') {
        Some(rest) => rest.to_string(),
        None if body.starts_with("**") => body.to_string(),
        None => format!("**/{}", body),
    };

    GlobBuilder::new(&glob)
        .literal_separator(true)
        .backslash_escape(true)
        .build()
        .map(|g| (g.compile_matcher(), dir_only))
        .map_err(|e| format!("invalid pattern {:?}: {}", pattern, e))
}
