//! The sync pipeline: fetch → merge → extract → persist.
//!
//! Every run builds a [`SyncContext`] from configuration, loading both schemas
//! fresh. The context is passed explicitly through each stage. All fetching,
//! validation and extraction happen before the first write, so a failure
//! leaves the snapshot and ritual files as they were.

pub mod merge;

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Serialize;

use crate::config::{Config, ConfigError};
use crate::error::ErrorCode;
use crate::lock::{LockError, SnapshotLock};
use crate::ritual::{self, ExtractError, RitualDocument};
use crate::schema::{RITUALS_SCHEMA, Schema, SchemaError, TODOIST_SCHEMA};
use crate::store::{SnapshotStore, StoreError};
use crate::todoist::{DeltaSource, FULL_SYNC_CURSOR, FetchError, Snapshot, TodoistClient};

pub use merge::{MergeError, MergeMode, MergeReport, TableMerge};

const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(5);

/// Fatal failures of a sync or extract run.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Schema(#[from] SchemaError),

    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Merge(#[from] MergeError),

    #[error(transparent)]
    Extract(#[from] ExtractError),

    #[error(transparent)]
    Lock(#[from] LockError),

    #[error(transparent)]
    Io(#[from] StoreError),

    #[error("no Todoist snapshot at {}", path.display())]
    NoSnapshot { path: PathBuf },
}

impl SyncError {
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::Config(err) => err.code(),
            Self::Schema(err) => err.code(),
            Self::Fetch(err) => err.code(),
            Self::Merge(MergeError::Schema(err)) => err.code(),
            Self::Merge(MergeError::Decode(_)) => ErrorCode::RemoteDecode,
            Self::Extract(err) => err.code(),
            Self::Lock(err) => err.code(),
            Self::Io(_) => ErrorCode::FileWriteFailed,
            Self::NoSnapshot { .. } => ErrorCode::SnapshotMissing,
        }
    }
}

/// Everything one pipeline run needs.
#[derive(Debug)]
pub struct SyncContext {
    pub config: Config,
    pub todoist_schema: Schema,
    pub rituals_schema: Schema,
    pub lock_timeout: Duration,
}

impl SyncContext {
    /// Build a context, loading both schemas from their configured paths or
    /// the embedded copies.
    pub fn new(config: Config) -> Result<Self, SyncError> {
        let todoist_schema = Schema::load_or_embedded(
            config.paths.todoist_schema.as_deref(),
            "todoist",
            TODOIST_SCHEMA,
        )?;
        let rituals_schema = Schema::load_or_embedded(
            config.paths.rituals_schema.as_deref(),
            "rituals",
            RITUALS_SCHEMA,
        )?;
        Ok(Self {
            config,
            todoist_schema,
            rituals_schema,
            lock_timeout: DEFAULT_LOCK_TIMEOUT,
        })
    }

    #[must_use]
    pub const fn with_lock_timeout(mut self, timeout: Duration) -> Self {
        self.lock_timeout = timeout;
        self
    }

    const fn merge_mode(&self) -> MergeMode {
        if self.config.dry_run {
            MergeMode::DryRun
        } else {
            MergeMode::Advance
        }
    }

    fn store(&self) -> SnapshotStore {
        SnapshotStore::new(&self.config.paths.snapshot)
    }

    fn lock(&self) -> Result<SnapshotLock, LockError> {
        SnapshotLock::acquire(&self.config.paths.snapshot, self.lock_timeout)
    }
}

/// HTTP delta source for the configured account.
pub fn client_for(config: &Config) -> Result<TodoistClient, ConfigError> {
    Ok(TodoistClient::new(
        config.todoist.api_url.clone(),
        config.todoist.token()?,
        config.todoist.timeout(),
    ))
}

/// How a run obtained its Todoist state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PullKind {
    Full,
    Incremental,
}

/// Summary of the ritual document a run wrote.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExtractReport {
    pub path: PathBuf,
    pub headings: usize,
    pub rituals: usize,
    pub acts: usize,
}

impl ExtractReport {
    fn new(path: &Path, doc: &RitualDocument) -> Self {
        Self {
            path: path.to_path_buf(),
            headings: doc.headings.len(),
            rituals: doc.ritual_count(),
            acts: doc.acts.len(),
        }
    }
}

/// Summary of one sync run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    pub pull: PullKind,
    pub dry_run: bool,
    pub cursor_before: Option<String>,
    pub cursor_after: String,
    pub merge: MergeReport,
    pub extract: ExtractReport,
}

/// Full pull straight into a snapshot, gated by the Todoist schema.
fn full_snapshot(
    raw: serde_json::Value,
    schema: &Schema,
    mode: MergeMode,
) -> Result<(Snapshot, MergeReport), SyncError> {
    schema.validate("full pull", &raw)?;
    let delta = crate::todoist::Delta::from_value(raw).map_err(MergeError::from)?;
    let mut snapshot = Snapshot::from_full(delta);

    let added = |n| TableMerge {
        added: n,
        ..TableMerge::default()
    };
    let report = MergeReport {
        projects: added(snapshot.projects.len()),
        sections: added(snapshot.sections.len()),
        items: added(snapshot.items.len()),
        cursor_advanced: mode == MergeMode::Advance,
    };
    if mode == MergeMode::DryRun {
        tracing::info!(skipped = %snapshot.sync_token, "dry run: full pull stored without a cursor");
        snapshot.sync_token = FULL_SYNC_CURSOR.to_string();
    }
    Ok((snapshot, report))
}

/// Run the whole pipeline against `source`.
///
/// A full pull happens when there is no usable snapshot or `force_sync` is
/// set; otherwise the stored cursor is used for an incremental pull.
pub fn run_sync(ctx: &SyncContext, source: &dyn DeltaSource) -> Result<SyncReport, SyncError> {
    let _lock = ctx.lock()?;
    let store = ctx.store();
    let mode = ctx.merge_mode();

    let base = if ctx.config.force_sync {
        tracing::info!("forced full sync, ignoring local snapshot");
        None
    } else {
        store
            .load()
            .filter(|snapshot| snapshot.sync_token != FULL_SYNC_CURSOR)
    };
    let cursor_before = base.as_ref().map(|s| s.sync_token.clone());

    let (snapshot, merge_report, pull) = match base {
        None => {
            tracing::debug!("starting full Todoist sync");
            let raw = source.fetch(FULL_SYNC_CURSOR)?;
            let (snapshot, report) = full_snapshot(raw, &ctx.todoist_schema, mode)?;
            (snapshot, report, PullKind::Full)
        }
        Some(base) => {
            tracing::debug!(cursor = %base.sync_token, "starting incremental Todoist sync");
            let raw = source.fetch(&base.sync_token)?;
            let (snapshot, report) = merge::merge(base, raw, &ctx.todoist_schema, mode)?;
            (snapshot, report, PullKind::Incremental)
        }
    };

    let doc = ritual::extract(&snapshot, &ctx.rituals_schema, &ctx.config.todoist.project)?;

    store.save(&snapshot)?;
    doc.save(&ctx.config.paths.rituals)?;

    let report = SyncReport {
        pull,
        dry_run: mode == MergeMode::DryRun,
        cursor_before,
        cursor_after: snapshot.sync_token,
        merge: merge_report,
        extract: ExtractReport::new(&ctx.config.paths.rituals, &doc),
    };
    tracing::info!(
        pull = ?report.pull,
        changes = report.merge.changes(),
        cursor = %report.cursor_after,
        rituals = report.extract.rituals,
        "sync complete"
    );
    Ok(report)
}

/// Rebuild the ritual document from the local snapshot without any network.
pub fn extract_only(ctx: &SyncContext) -> Result<ExtractReport, SyncError> {
    let _lock = ctx.lock()?;
    let store = ctx.store();
    let snapshot = store.load().ok_or_else(|| SyncError::NoSnapshot {
        path: store.path().to_path_buf(),
    })?;
    ctx.todoist_schema
        .validate("local snapshot", &serde_json::to_value(&snapshot).map_err(MergeError::from)?)?;

    let doc = ritual::extract(&snapshot, &ctx.rituals_schema, &ctx.config.todoist.project)?;
    doc.save(&ctx.config.paths.rituals)?;
    Ok(ExtractReport::new(&ctx.config.paths.rituals, &doc))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn errors_carry_their_source_code() {
        let err = SyncError::from(ExtractError::UnresolvedInserts(vec!["Breathing".into()]));
        assert_eq!(err.code(), ErrorCode::UnresolvedInsert);
        assert!(err.to_string().contains("Breathing"));

        let err = SyncError::from(ConfigError::MissingToken);
        assert_eq!(err.code(), ErrorCode::MissingApiToken);

        let err = SyncError::NoSnapshot {
            path: PathBuf::from("data/todoist.json"),
        };
        assert_eq!(err.code(), ErrorCode::SnapshotMissing);
    }

    #[test]
    fn client_needs_a_token() {
        let mut config = Config::default();
        assert!(matches!(client_for(&config), Err(ConfigError::MissingToken)));
        config.todoist.api_token = Some("t".into());
        let client = client_for(&config).expect("client");
        assert_eq!(client.endpoint(), config.todoist.api_url);
    }

    #[test]
    fn context_uses_configured_schema_paths() {
        let mut config = Config::default();
        config.paths.rituals_schema = Some(PathBuf::from("/definitely/not/here.json"));
        let err = SyncContext::new(config).expect_err("missing schema");
        assert_eq!(err.code(), ErrorCode::SchemaLoadFailed);
    }
}
