use std::collections::{BTreeMap, HashMap};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::fs;
use std::sync::Mutex;

use tempfile::{NamedTempFile, TempDir};
use tracing::debug;

/// Error reading or writing an artifact.
#[derive(Debug, thiserror::Error)]
pub enum ArtifactError {
  /// No artifact exists at the path.
  #[error("artifact '{}' does not exist", path.display())]
  NotFound {
    /// The missing artifact path.
    path: PathBuf,
  },
  /// An I/O operation on the artifact failed; the underlying cause is kept.
  #[error("failed to {action} artifact '{}'", path.display())]
  Io {
    /// What was being attempted.
    action: &'static str,
    /// The artifact path involved.
    path: PathBuf,
    /// Underlying I/O error.
    #[source]
    source: io::Error,
  },
}

impl ArtifactError {
  #[inline]
  fn io<'a>(action: &'static str, path: &'a Path) -> impl FnOnce(io::Error) -> Self + 'a {
    move |source| Self::Io { action, path: path.to_path_buf(), source }
  }
}

/// Maps deterministic artifact paths to materialized artifacts.
///
/// The write operations follow a publish-on-success discipline: content is
/// produced at a temporary location and only becomes visible at the canonical
/// path when the producer succeeds, so no observer ever sees a
/// partially-written artifact. An interrupted producer leaves the canonical
/// path absent or unchanged.
pub trait ArtifactStore {
  /// Returns `true` if an artifact exists at `path`.
  fn exists(&self, path: &Path) -> bool;

  /// Reads the file-shaped artifact at `path`.
  fn read(&self, path: &Path) -> Result<Vec<u8>, ArtifactError>;

  /// Writes a file-shaped artifact: streams `produce` to a temporary
  /// location, then atomically publishes it at `path`.
  fn write(
    &self,
    path: &Path,
    produce: &mut dyn FnMut(&mut dyn Write) -> io::Result<()>,
  ) -> Result<(), ArtifactError>;

  /// Writes a directory-shaped artifact: `produce` fills a temporary
  /// directory, which is atomically moved to `path` on success.
  fn write_dir(
    &self,
    path: &Path,
    produce: &mut dyn FnMut(&Path) -> io::Result<()>,
  ) -> Result<(), ArtifactError>;
}

/// Filesystem-backed [`ArtifactStore`].
///
/// Operates on the paths tasks declare, creating parent directories on
/// demand. Temporary files and directories are created next to their
/// destination so the publishing rename stays on one filesystem.
#[derive(Default, Debug, Copy, Clone)]
pub struct FsStore;

impl FsStore {
  /// Creates a new filesystem store.
  #[inline]
  pub fn new() -> Self { Self }

  fn create_parent(path: &Path) -> Result<&Path, ArtifactError> {
    let parent = path.parent().filter(|parent| !parent.as_os_str().is_empty())
      .unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(parent).map_err(ArtifactError::io("create parent directory of", path))?;
    Ok(parent)
  }
}

impl ArtifactStore for FsStore {
  #[inline]
  fn exists(&self, path: &Path) -> bool {
    path.exists()
  }

  fn read(&self, path: &Path) -> Result<Vec<u8>, ArtifactError> {
    match fs::read(path) {
      Err(e) if e.kind() == io::ErrorKind::NotFound => {
        Err(ArtifactError::NotFound { path: path.to_path_buf() })
      }
      Err(e) => Err(ArtifactError::io("read", path)(e)),
      Ok(bytes) => Ok(bytes),
    }
  }

  fn write(
    &self,
    path: &Path,
    produce: &mut dyn FnMut(&mut dyn Write) -> io::Result<()>,
  ) -> Result<(), ArtifactError> {
    let parent = Self::create_parent(path)?;
    let mut temp = NamedTempFile::new_in(parent)
      .map_err(ArtifactError::io("create temporary file for", path))?;
    // A producer error drops the temporary file; nothing is published.
    produce(&mut temp).map_err(ArtifactError::io("produce", path))?;
    temp.flush().map_err(ArtifactError::io("flush", path))?;
    temp.persist(path).map_err(|e| ArtifactError::io("publish", path)(e.error))?;
    debug!(path = %path.display(), "published artifact");
    Ok(())
  }

  fn write_dir(
    &self,
    path: &Path,
    produce: &mut dyn FnMut(&Path) -> io::Result<()>,
  ) -> Result<(), ArtifactError> {
    let parent = Self::create_parent(path)?;
    let temp = TempDir::new_in(parent)
      .map_err(ArtifactError::io("create temporary directory for", path))?;
    // A producer error drops the temporary directory; nothing is published.
    produce(temp.path()).map_err(ArtifactError::io("produce", path))?;
    let temp_path = temp.keep();
    if let Err(e) = fs::rename(&temp_path, path) {
      let _ = fs::remove_dir_all(&temp_path);
      return Err(ArtifactError::io("publish", path)(e));
    }
    debug!(path = %path.display(), "published directory artifact");
    Ok(())
  }
}

/// In-memory [`ArtifactStore`] for tests, following the same
/// publish-on-success contract: a failing producer inserts nothing.
#[derive(Default, Debug)]
pub struct MemoryStore {
  files: Mutex<HashMap<PathBuf, Vec<u8>>>,
  directories: Mutex<HashMap<PathBuf, BTreeMap<PathBuf, Vec<u8>>>>,
}

impl MemoryStore {
  /// Creates an empty in-memory store.
  #[inline]
  pub fn new() -> Self { Self::default() }

  /// Returns the relative file names and contents of the directory-shaped
  /// artifact at `path`, if one was published.
  pub fn directory(&self, path: &Path) -> Option<BTreeMap<PathBuf, Vec<u8>>> {
    self.directories.lock().unwrap().get(path).cloned()
  }

  /// Removes the artifact at `path`, returning whether one existed.
  pub fn remove(&self, path: &Path) -> bool {
    self.files.lock().unwrap().remove(path).is_some()
      || self.directories.lock().unwrap().remove(path).is_some()
  }
}

impl ArtifactStore for MemoryStore {
  fn exists(&self, path: &Path) -> bool {
    self.files.lock().unwrap().contains_key(path)
      || self.directories.lock().unwrap().contains_key(path)
  }

  fn read(&self, path: &Path) -> Result<Vec<u8>, ArtifactError> {
    self.files.lock().unwrap().get(path)
      .cloned()
      .ok_or_else(|| ArtifactError::NotFound { path: path.to_path_buf() })
  }

  fn write(
    &self,
    path: &Path,
    produce: &mut dyn FnMut(&mut dyn Write) -> io::Result<()>,
  ) -> Result<(), ArtifactError> {
    let mut buffer = Vec::new();
    produce(&mut buffer).map_err(ArtifactError::io("produce", path))?;
    self.files.lock().unwrap().insert(path.to_path_buf(), buffer);
    Ok(())
  }

  fn write_dir(
    &self,
    path: &Path,
    produce: &mut dyn FnMut(&Path) -> io::Result<()>,
  ) -> Result<(), ArtifactError> {
    // Producers write real files; buffer them in a temporary directory and
    // only capture the result into the store when the producer succeeds.
    let temp = TempDir::new().map_err(ArtifactError::io("create temporary directory for", path))?;
    produce(temp.path()).map_err(ArtifactError::io("produce", path))?;
    let mut contents = BTreeMap::new();
    collect_files(temp.path(), Path::new(""), &mut contents)
      .map_err(ArtifactError::io("capture", path))?;
    self.directories.lock().unwrap().insert(path.to_path_buf(), contents);
    Ok(())
  }
}

fn collect_files(
  root: &Path,
  relative: &Path,
  into: &mut BTreeMap<PathBuf, Vec<u8>>,
) -> io::Result<()> {
  for entry in fs::read_dir(root.join(relative))? {
    let entry = entry?;
    let relative = relative.join(entry.file_name());
    if entry.file_type()?.is_dir() {
      collect_files(root, &relative, into)?;
    } else {
      into.insert(relative.clone(), fs::read(root.join(&relative))?);
    }
  }
  Ok(())
}

#[cfg(test)]
mod tests {
  use std::io::ErrorKind;

  use assert_matches::assert_matches;

  use super::*;

  fn failing_producer(partial: &'static [u8]) -> impl FnMut(&mut dyn Write) -> io::Result<()> {
    move |writer| {
      writer.write_all(partial)?;
      Err(io::Error::new(ErrorKind::Other, "simulated interruption"))
    }
  }

  #[test]
  fn fs_store_roundtrip() {
    let temp_dir = tempfile::tempdir().unwrap();
    let store = FsStore::new();
    let path = temp_dir.path().join("nested").join("artifact.bin");

    assert!(!store.exists(&path));
    store.write(&path, &mut |writer| writer.write_all(b"payload")).unwrap();
    assert!(store.exists(&path));
    assert_eq!(store.read(&path).unwrap(), b"payload");
  }

  #[test]
  fn fs_store_failed_producer_publishes_nothing() {
    let temp_dir = tempfile::tempdir().unwrap();
    let store = FsStore::new();
    let path = temp_dir.path().join("artifact.bin");

    let result = store.write(&path, &mut failing_producer(b"part"));
    assert_matches!(result, Err(ArtifactError::Io { action: "produce", .. }));
    assert!(!store.exists(&path));
    // No temporary leftovers next to the destination.
    assert_eq!(fs::read_dir(temp_dir.path()).unwrap().count(), 0);
  }

  #[test]
  fn fs_store_directory_artifact() {
    let temp_dir = tempfile::tempdir().unwrap();
    let store = FsStore::new();
    let path = temp_dir.path().join("images");

    store.write_dir(&path, &mut |dir| {
      fs::write(dir.join("one.png"), b"1")?;
      fs::write(dir.join("two.png"), b"2")
    }).unwrap();
    assert!(store.exists(&path));
    assert!(path.join("one.png").exists());
    assert!(path.join("two.png").exists());
  }

  #[test]
  fn fs_store_failed_directory_producer_publishes_nothing() {
    let temp_dir = tempfile::tempdir().unwrap();
    let store = FsStore::new();
    let path = temp_dir.path().join("images");

    let result = store.write_dir(&path, &mut |dir| {
      fs::write(dir.join("one.png"), b"1")?;
      Err(io::Error::new(ErrorKind::Other, "simulated interruption"))
    });
    assert_matches!(result, Err(ArtifactError::Io { action: "produce", .. }));
    assert!(!store.exists(&path));
  }

  #[test]
  fn fs_store_read_missing_is_not_found() {
    let temp_dir = tempfile::tempdir().unwrap();
    let store = FsStore::new();
    let path = temp_dir.path().join("missing.bin");
    assert_matches!(store.read(&path), Err(ArtifactError::NotFound { .. }));
  }

  #[test]
  fn memory_store_matches_fs_contract() {
    let store = MemoryStore::new();
    let path = Path::new("artifact.bin");

    assert!(!store.exists(path));
    assert_matches!(store.read(path), Err(ArtifactError::NotFound { .. }));

    store.write(path, &mut |writer| writer.write_all(b"payload")).unwrap();
    assert!(store.exists(path));
    assert_eq!(store.read(path).unwrap(), b"payload");

    let result = store.write(Path::new("other.bin"), &mut failing_producer(b"part"));
    assert!(result.is_err());
    assert!(!store.exists(Path::new("other.bin")));
  }

  #[test]
  fn memory_store_directory_artifact() {
    let store = MemoryStore::new();
    let path = Path::new("images");

    store.write_dir(path, &mut |dir| {
      fs::write(dir.join("one.png"), b"1")?;
      fs::create_dir(dir.join("sub"))?;
      fs::write(dir.join("sub").join("two.png"), b"2")
    }).unwrap();

    assert!(store.exists(path));
    let contents = store.directory(path).unwrap();
    assert_eq!(contents.get(Path::new("one.png")).unwrap(), b"1");
    assert_eq!(contents.get(Path::new("sub/two.png")).unwrap(), b"2");
  }
}
