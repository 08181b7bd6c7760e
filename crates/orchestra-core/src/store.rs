//! On-disk persistence for the Todoist snapshot and the ritual document.
//!
//! Reads are tolerant: a missing or unreadable snapshot means "start fresh".
//! Writes are atomic: serialize to a sibling `.tmp` file, then rename over the
//! target, so readers never observe a half-written document.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::todoist::Snapshot;

/// Failure to persist a JSON document.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("failed to serialize {}: {source}", path.display())]
    Serialize {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to write {}: {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Serialize `value` as pretty JSON and atomically replace `path`.
pub fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> Result<(), StoreError> {
    let write_err = |source| StoreError::Write {
        path: path.to_path_buf(),
        source,
    };

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(write_err)?;
    }

    let mut body = serde_json::to_vec_pretty(value).map_err(|source| StoreError::Serialize {
        path: path.to_path_buf(),
        source,
    })?;
    body.push(b'\n');

    let mut tmp_name = path.file_name().map(std::ffi::OsStr::to_os_string).unwrap_or_default();
    tmp_name.push(".tmp");
    let tmp_path = path.with_file_name(tmp_name);

    fs::write(&tmp_path, body).map_err(write_err)?;
    fs::rename(&tmp_path, path).map_err(|source| {
        let _ = fs::remove_file(&tmp_path);
        write_err(source)
    })?;

    Ok(())
}

/// The locally persisted Todoist snapshot.
#[derive(Debug, Clone)]
pub struct SnapshotStore {
    path: PathBuf,
}

impl SnapshotStore {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the last snapshot. Missing or malformed files yield `None`.
    #[must_use]
    pub fn load(&self) -> Option<Snapshot> {
        let bytes = match fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                tracing::warn!(path = %self.path.display(), "Todoist snapshot not present");
                return None;
            }
            Err(err) => {
                tracing::error!(
                    path = %self.path.display(),
                    error = %err,
                    "Todoist snapshot unreadable, treating as absent"
                );
                return None;
            }
        };

        match serde_json::from_slice::<Snapshot>(&bytes) {
            Ok(snapshot) => {
                tracing::debug!(
                    path = %self.path.display(),
                    cursor = %snapshot.sync_token,
                    "read Todoist snapshot"
                );
                Some(snapshot)
            }
            Err(err) => {
                tracing::warn!(
                    path = %self.path.display(),
                    error = %err,
                    "Todoist snapshot malformed, treating as absent"
                );
                None
            }
        }
    }

    /// Atomically overwrite the snapshot file.
    pub fn save(&self, snapshot: &Snapshot) -> Result<(), StoreError> {
        write_json_atomic(&self.path, snapshot)?;
        tracing::info!(
            path = %self.path.display(),
            cursor = %snapshot.sync_token,
            "saved Todoist snapshot"
        );
        Ok(())
    }
}
