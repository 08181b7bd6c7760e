use crate::error::ErrorCode;
use fs2::FileExt;
use std::{
    fs::{self, File, OpenOptions},
    io,
    path::{Path, PathBuf},
    thread,
    time::{Duration, Instant},
};

/// Advisory lock errors for the snapshot file.
#[derive(Debug, thiserror::Error)]
pub enum LockError {
    #[error(
        "{}: snapshot lock still held after {waited:?} at {}",
        ErrorCode::LockContention.code(),
        path.display()
    )]
    Timeout { path: PathBuf, waited: Duration },

    #[error("{}: snapshot lock file unusable: {0}", ErrorCode::FileWriteFailed.code())]
    Io(#[from] io::Error),
}

impl LockError {
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::Timeout { .. } => ErrorCode::LockContention,
            Self::Io(_) => ErrorCode::FileWriteFailed,
        }
    }

    /// Operator hint for this failure, if any.
    #[must_use]
    pub const fn hint(&self) -> Option<&'static str> {
        self.code().hint()
    }
}

/// RAII guard serialising sync runs against one snapshot file.
///
/// The lock lives in a sidecar `<snapshot>.lock` file so the snapshot itself
/// can be replaced by rename while the lock is held.
#[derive(Debug)]
pub struct SnapshotLock {
    file: File,
    path: PathBuf,
}

impl SnapshotLock {
    /// Sidecar lock path for a snapshot file.
    #[must_use]
    pub fn path_for(snapshot: &Path) -> PathBuf {
        let mut name = snapshot
            .file_name()
            .map(std::ffi::OsStr::to_os_string)
            .unwrap_or_default();
        name.push(".lock");
        snapshot.with_file_name(name)
    }

    /// Acquire an exclusive advisory lock for `snapshot`, polling until `timeout`.
    pub fn acquire(snapshot: &Path, timeout: Duration) -> Result<Self, LockError> {
        let path = Self::path_for(snapshot);
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }

        let start = Instant::now();
        loop {
            let file = OpenOptions::new()
                .create(true)
                .read(true)
                .write(true)
                .truncate(false)
                .open(&path)?;

            if file.try_lock_exclusive().is_ok() {
                tracing::debug!(path = %path.display(), "snapshot lock acquired");
                return Ok(Self { file, path });
            }

            if start.elapsed() >= timeout {
                return Err(LockError::Timeout {
                    path,
                    waited: start.elapsed(),
                });
            }

            thread::sleep(Duration::from_millis(10));
        }
    }

    /// Explicitly release the lock. Release also happens automatically on drop.
    pub fn release(self) {
        drop(self);
    }

    /// Return the lock file path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for SnapshotLock {
    fn drop(&mut self) {
        let _ = FileExt::unlock(&self.file);
    }
}
