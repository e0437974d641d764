//! Shared development code for testing the runner and the pipeline.

use tempfile::{NamedTempFile, TempDir};

pub mod collab;
pub mod task;
pub mod test;

/// Creates a new temporary directory that gets cleaned up when dropped.
pub fn create_temp_dir() -> TempDir {
  tempfile::tempdir().expect("failed to create temporary directory")
}

/// Creates a new temporary file that gets cleaned up when dropped.
pub fn create_temp_file() -> NamedTempFile {
  NamedTempFile::new().expect("failed to create temporary file")
}
