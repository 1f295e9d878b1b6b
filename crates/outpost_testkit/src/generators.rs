//! Property-based test generators using proptest.

use proptest::prelude::*;
use std::collections::BTreeMap;

/// Strategy for short printable cell text.
pub fn arb_label() -> impl Strategy<Value = String> {
    "[a-zA-Z0-9 _.-]{0,24}"
}

/// Strategy for folder-relative file paths, up to two directories deep.
pub fn arb_file_path() -> impl Strategy<Value = String> {
    ("[a-z]{1,6}(/[a-z]{1,6}){0,2}", prop_oneof![Just(".txt"), Just(".log")])
        .prop_map(|(stem, ext)| format!("{stem}{ext}"))
}

/// Strategy for keyed rows of the `projects` fixture table.
pub fn arb_projects(max: usize) -> impl Strategy<Value = BTreeMap<i64, String>> {
    prop::collection::btree_map(1i64..10_000, arb_label(), 0..=max)
}

/// Strategy for LOB payloads that straddle chunk boundaries.
pub fn arb_payload(max_len: usize) -> impl Strategy<Value = Vec<u8>> {
    prop::collection::vec(any::<u8>(), 0..=max_len)
}

#[cfg(test)]
mod tests {
    use super::*;

    proptest! {
        #[test]
        fn file_paths_are_relative(path in arb_file_path()) {
            prop_assert!(!path.starts_with('/'));
            prop_assert!(!path.contains(".."));
        }

        #[test]
        fn project_ids_are_positive(rows in arb_projects(8)) {
            prop_assert!(rows.keys().all(|id| *id > 0));
        }
    }
}
