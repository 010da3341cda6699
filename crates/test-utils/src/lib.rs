//! Shared test utilities for the harvester workspace.
//!
//! This crate provides common testing infrastructure including:
//! - Atom feed builders that mimic the granule search service
//! - Dataset configuration fixtures
//! - Temporary target/scratch directory layouts
//!
//! # Usage
//!
//! Add to your crate's `Cargo.toml`:
//!
//! ```toml
//! [dev-dependencies]
//! test-utils = { path = "../test-utils" }
//! ```
//!
//! Then import in your tests:
//!
//! ```ignore
//! use test_utils::{AtomFeed, DatasetFixture, HarvestDirs};
//! ```

pub mod feeds;
pub mod fixtures;
pub mod paths;

// Re-export commonly used items at the crate root
pub use feeds::*;
pub use fixtures::*;
pub use paths::*;

/// Assert that a JSON document field holds the expected value.
///
/// # Usage
///
/// ```ignore
/// use test_utils::assert_field;
///
/// assert_field!(doc, "status_s", json!("harvested"));
/// ```
#[macro_export]
macro_rules! assert_field {
    ($doc:expr, $field:expr, $expected:expr) => {{
        let actual = $doc.get($field);
        let expected = $expected;
        if actual != Some(&expected) {
            panic!(
                "assertion failed: field `{}`\n  actual: `{:?}`,\n expected: `{:?}`",
                $field, actual, expected
            );
        }
    }};
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    #[test]
    fn test_assert_field_passes() {
        let doc: HashMap<&str, i32> = HashMap::from([("a", 1)]);
        assert_field!(doc, "a", 1);
    }

    #[test]
    #[should_panic(expected = "assertion failed")]
    fn test_assert_field_fails() {
        let doc: HashMap<&str, i32> = HashMap::from([("a", 1)]);
        assert_field!(doc, "a", 2);
    }
}
