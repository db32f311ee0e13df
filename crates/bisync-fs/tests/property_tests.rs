//! Property-based tests for RelPath normalization

use bisync_fs::RelPath;
use proptest::prelude::*;

fn component() -> impl Strategy<Value = String> {
    "[a-zA-Z0-9_][a-zA-Z0-9_. -]{0,8}".prop_filter("not a dot component", |s| s != "." && s != "..")
}

proptest! {
    #[test]
    fn normalization_is_idempotent(parts in prop::collection::vec(component(), 1..6), sep in "[/\\\\]") {
        let raw = parts.join(&sep);
        let once = RelPath::new(&raw).unwrap();
        let twice = RelPath::new(once.as_str()).unwrap();
        prop_assert_eq!(once, twice);
    }

    #[test]
    fn parent_and_file_name_rebuild_the_path(parts in prop::collection::vec(component(), 1..6)) {
        let path = RelPath::new(parts.join("/")).unwrap();
        let parent = path.parent().unwrap();
        let name = path.file_name().unwrap();
        prop_assert_eq!(parent.join(name), path.clone());
        prop_assert_eq!(path.depth(), parts.len());
        prop_assert_eq!(path.ancestors().len(), parts.len() - 1);
    }

    #[test]
    fn parent_components_are_rejected(parts in prop::collection::vec(component(), 0..4)) {
        let mut with_dots = parts.clone();
        with_dots.push("..".to_string());
        prop_assert!(RelPath::new(with_dots.join("/")).is_err());
    }
}
