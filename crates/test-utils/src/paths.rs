//! Temporary directory layouts for harvest tests.

use std::path::{Path, PathBuf};

/// Creates a temporary directory for test output.
///
/// The directory is automatically cleaned up when the returned `TempDir` is dropped.
pub fn temp_test_dir() -> tempfile::TempDir {
    tempfile::tempdir().expect("Failed to create temporary test directory")
}

/// Creates a temporary directory with a specific prefix.
pub fn temp_test_dir_with_prefix(prefix: &str) -> tempfile::TempDir {
    tempfile::Builder::new()
        .prefix(prefix)
        .tempdir()
        .expect("Failed to create temporary test directory")
}

/// A target directory and a scratch directory under one temporary root.
///
/// Neither subdirectory is created up front so tests also cover the
/// harvester creating them.
pub struct HarvestDirs {
    root: tempfile::TempDir,
    target: PathBuf,
    scratch: PathBuf,
}

impl HarvestDirs {
    pub fn new() -> Self {
        let root = temp_test_dir_with_prefix("harvest_test_");
        let target = root.path().join("target");
        let scratch = root.path().join("scratch");
        Self {
            root,
            target,
            scratch,
        }
    }

    pub fn root(&self) -> &Path {
        self.root.path()
    }

    pub fn target(&self) -> &Path {
        &self.target
    }

    pub fn scratch(&self) -> &Path {
        &self.scratch
    }
}

impl Default for HarvestDirs {
    fn default() -> Self {
        Self::new()
    }
}
