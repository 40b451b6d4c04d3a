//! Filesystem collaborator
//!
//! Scene stores never touch `std::fs` directly; they go through a
//! [`FileSystem`] so tests can substitute an in-memory one.

use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{BufWriter, ErrorKind as IoErrorKind, Write};
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use vista_core::{SceneError, SceneResult};

/// Synchronous byte-level file access
pub trait FileSystem: Send + Sync {
    /// Read a whole file
    ///
    /// A missing file is `NotFound`; anything else is `OpenFailure` or
    /// `ReadFailure`.
    fn read(&self, path: &Path) -> SceneResult<Vec<u8>>;

    /// Replace a whole file
    fn write(&self, path: &Path, data: &[u8]) -> SceneResult<()>;

    fn exists(&self, path: &Path) -> bool;
}

/// The real filesystem
///
/// Writes are atomic: data goes to a temp file next to the target, which is
/// then renamed over it.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalFileSystem;

impl LocalFileSystem {
    pub fn new() -> Self {
        Self
    }

    fn temp_path(path: &Path) -> PathBuf {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "scene".to_string());
        path.with_file_name(format!(".{}.tmp", name))
    }

    /// Fill a temp file with `fill` and rename it over `path`
    ///
    /// The temp file is removed on every failure after it was created.
    fn replace_via_temp(
        path: &Path,
        fill: impl FnOnce(&mut BufWriter<File>) -> std::io::Result<()>,
    ) -> SceneResult<()> {
        let write_err = |e: std::io::Error| SceneError::WriteFailure {
            path: path.display().to_string(),
            reason: e.to_string(),
        };
        let temp_path = Self::temp_path(path);

        let file = File::create(&temp_path).map_err(|e| SceneError::OpenFailure {
            path: temp_path.display().to_string(),
            reason: e.to_string(),
        })?;
        let written = {
            let mut writer = BufWriter::new(file);
            fill(&mut writer).and_then(|()| writer.flush())
        };

        if let Err(e) = written.and_then(|()| fs::rename(&temp_path, path)) {
            if let Err(cleanup) = fs::remove_file(&temp_path) {
                log::warn!("Could not remove {}: {}", temp_path.display(), cleanup);
            }
            return Err(write_err(e));
        }
        Ok(())
    }
}

impl FileSystem for LocalFileSystem {
    fn read(&self, path: &Path) -> SceneResult<Vec<u8>> {
        let display = path.display().to_string();
        match fs::read(path) {
            Ok(data) => Ok(data),
            Err(e) if e.kind() == IoErrorKind::NotFound => {
                Err(SceneError::not_found(format!("file {}", display)))
            }
            Err(e) if e.kind() == IoErrorKind::PermissionDenied => Err(SceneError::OpenFailure {
                path: display,
                reason: e.to_string(),
            }),
            Err(e) => Err(SceneError::ReadFailure {
                path: display,
                reason: e.to_string(),
            }),
        }
    }

    fn write(&self, path: &Path, data: &[u8]) -> SceneResult<()> {
        Self::replace_via_temp(path, |writer| writer.write_all(data))?;
        log::debug!("Wrote {} bytes to {}", data.len(), path.display());
        Ok(())
    }

    fn exists(&self, path: &Path) -> bool {
        path.exists()
    }
}

/// An in-memory filesystem, mainly for tests
///
/// Writes can be made to fail to exercise error paths.
#[derive(Debug, Default)]
pub struct MemoryFileSystem {
    files: Mutex<HashMap<PathBuf, Vec<u8>>>,
    fail_writes: Mutex<bool>,
}

impl MemoryFileSystem {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every following write fail (or succeed again)
    pub fn set_fail_writes(&self, fail: bool) {
        *self.fail_writes.lock() = fail;
    }

    /// Put a file in place directly
    pub fn insert(&self, path: impl Into<PathBuf>, data: impl Into<Vec<u8>>) {
        self.files.lock().insert(path.into(), data.into());
    }

    /// Current content of a file
    pub fn contents(&self, path: &Path) -> Option<Vec<u8>> {
        self.files.lock().get(path).cloned()
    }
}

impl FileSystem for MemoryFileSystem {
    fn read(&self, path: &Path) -> SceneResult<Vec<u8>> {
        self.files
            .lock()
            .get(path)
            .cloned()
            .ok_or_else(|| SceneError::not_found(format!("file {}", path.display())))
    }

    fn write(&self, path: &Path, data: &[u8]) -> SceneResult<()> {
        if *self.fail_writes.lock() {
            return Err(SceneError::WriteFailure {
                path: path.display().to_string(),
                reason: "writes disabled".to_string(),
            });
        }
        self.files.lock().insert(path.to_path_buf(), data.to_vec());
        Ok(())
    }

    fn exists(&self, path: &Path) -> bool {
        self.files.lock().contains_key(path)
    }
}
