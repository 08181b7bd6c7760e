//! End-to-end pipeline tests with a canned delta source and temp files.
//!
//! Each test builds a config whose paths all live under a `TempDir`, then
//! drives `run_sync` / `extract_only` and inspects what reached disk.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::fs;
use std::path::Path;
use std::time::Duration;

use orchestra_core::config::Config;
use orchestra_core::error::ErrorCode;
use orchestra_core::lock::SnapshotLock;
use orchestra_core::ritual::RitualDocument;
use orchestra_core::schema::RITUALS_SCHEMA;
use orchestra_core::store::SnapshotStore;
use orchestra_core::sync::{PullKind, SyncContext, SyncError, extract_only, run_sync};
use orchestra_core::todoist::{DeltaSource, FetchError};
use serde_json::{Value, json};
use tempfile::TempDir;

/// Replays queued payloads and records the cursors it was asked for.
#[derive(Default)]
struct Canned {
    payloads: RefCell<VecDeque<Result<Value, FetchError>>>,
    cursors: RefCell<Vec<String>>,
}

impl Canned {
    fn new(payloads: Vec<Value>) -> Self {
        Self {
            payloads: RefCell::new(payloads.into_iter().map(Ok).collect()),
            cursors: RefCell::default(),
        }
    }

    fn failing(err: FetchError) -> Self {
        Self {
            payloads: RefCell::new(VecDeque::from([Err(err)])),
            cursors: RefCell::default(),
        }
    }

    fn cursors(&self) -> Vec<String> {
        self.cursors.borrow().clone()
    }
}

impl DeltaSource for Canned {
    fn fetch(&self, cursor: &str) -> Result<Value, FetchError> {
        self.cursors.borrow_mut().push(cursor.to_string());
        self.payloads
            .borrow_mut()
            .pop_front()
            .unwrap_or_else(|| Err(FetchError::Transport("no canned payload left".into())))
    }
}

fn context(dir: &TempDir) -> SyncContext {
    let mut config = Config::default();
    config.paths.snapshot = dir.path().join("data").join("todoist.json");
    config.paths.rituals = dir.path().join("data").join("rituals.json");
    SyncContext::new(config)
        .expect("embedded schemas")
        .with_lock_timeout(Duration::from_millis(50))
}

fn task(id: &str, content: &str, parent: Option<&str>, order: i64) -> Value {
    json!({
        "id": id,
        "content": content,
        "description": "",
        "project_id": "p1",
        "section_id": "s1",
        "parent_id": parent,
        "child_order": order,
        "priority": 1,
        "checked": false
    })
}

fn morning_pull() -> Value {
    json!({
        "sync_token": "tok-1",
        "full_sync": true,
        "projects": [{ "id": "p1", "name": "RITUALS" }],
        "sections": [{ "id": "s1", "name": "Morning", "project_id": "p1", "section_order": 0 }],
        "items": [
            task("wake", "Wake Up", None, 0),
            task("stretch", "Stretch", None, 1)
        ]
    })
}

fn read_rituals(path: &Path) -> (RitualDocument, Value) {
    let bytes = fs::read(path).expect("rituals written");
    let raw: Value = serde_json::from_slice(&bytes).expect("rituals json");
    let doc = serde_json::from_value(raw.clone()).expect("rituals decode");
    (doc, raw)
}

#[test]
fn first_run_pulls_everything_and_writes_rituals() {
    let dir = TempDir::new().expect("tempdir");
    let ctx = context(&dir);
    let source = Canned::new(vec![morning_pull()]);

    let report = run_sync(&ctx, &source).expect("sync");

    assert_eq!(source.cursors(), vec!["*".to_string()]);
    assert_eq!(report.pull, PullKind::Full);
    assert_eq!(report.cursor_before, None);
    assert_eq!(report.cursor_after, "tok-1");
    assert_eq!(report.merge.items.added, 2);

    let (doc, raw) = read_rituals(&ctx.config.paths.rituals);
    assert_eq!(doc.sync_token, "tok-1");
    assert_eq!(doc.headings.len(), 1);
    assert_eq!(doc.headings["s1"].name, "Morning");
    assert_eq!(doc.headings["s1"].rituals, vec!["wake".to_string()]);
    assert_eq!(doc.acts["wake"].next.as_deref(), Some("stretch"));
    for act in raw["acts"].as_object().expect("acts").values() {
        assert!(act.get("order").is_none(), "{act}");
    }

    let snapshot = SnapshotStore::new(&ctx.config.paths.snapshot)
        .load()
        .expect("snapshot saved");
    assert_eq!(snapshot.sync_token, "tok-1");
    assert_eq!(snapshot.items[0].extra.get("checked"), Some(&json!(false)));
}

#[test]
fn second_run_merges_delta_from_stored_cursor() {
    let dir = TempDir::new().expect("tempdir");
    let ctx = context(&dir);
    let source = Canned::new(vec![
        morning_pull(),
        json!({
            "sync_token": "tok-2",
            "items": [
                task("wake", "Wake Up Slowly", None, 0),
                task("w1", "Open blinds", Some("wake"), 0),
                { "id": "stretch", "content": "", "project_id": "p1", "is_deleted": true },
                { "id": "ghost", "content": "", "project_id": "p1", "is_deleted": true }
            ]
        }),
    ]);

    run_sync(&ctx, &source).expect("first sync");
    let report = run_sync(&ctx, &source).expect("second sync");

    assert_eq!(source.cursors(), vec!["*".to_string(), "tok-1".to_string()]);
    assert_eq!(report.pull, PullKind::Incremental);
    assert_eq!(report.cursor_before.as_deref(), Some("tok-1"));
    assert_eq!(report.merge.items.replaced, 1);
    assert_eq!(report.merge.items.added, 1);
    assert_eq!(report.merge.items.deleted, 1);
    assert_eq!(report.merge.items.ignored_deletes, 1);

    let (doc, _) = read_rituals(&ctx.config.paths.rituals);
    assert_eq!(doc.sync_token, "tok-2");
    assert_eq!(doc.acts["wake"].name, "Wake Up Slowly");
    assert_eq!(doc.acts["wake"].next.as_deref(), Some("w1"));
    assert!(!doc.acts.contains_key("stretch"));
}

#[test]
fn dry_run_keeps_stored_cursor() {
    let dir = TempDir::new().expect("tempdir");
    let mut ctx = context(&dir);
    let source = Canned::new(vec![
        morning_pull(),
        json!({ "sync_token": "tok-2", "items": [task("yoga", "Yoga", None, 2)] }),
        json!({ "sync_token": "tok-3" }),
    ]);

    run_sync(&ctx, &source).expect("first sync");
    ctx.config.dry_run = true;
    let report = run_sync(&ctx, &source).expect("dry run");
    assert!(report.dry_run);
    assert!(!report.merge.cursor_advanced);
    assert_eq!(report.cursor_after, "tok-1");

    ctx.config.dry_run = false;
    run_sync(&ctx, &source).expect("third sync");
    assert_eq!(
        source.cursors(),
        vec!["*".to_string(), "tok-1".to_string(), "tok-1".to_string()]
    );
}

#[test]
fn force_sync_ignores_snapshot() {
    let dir = TempDir::new().expect("tempdir");
    let mut ctx = context(&dir);
    let source = Canned::new(vec![morning_pull(), morning_pull()]);

    run_sync(&ctx, &source).expect("first sync");
    ctx.config.force_sync = true;
    let report = run_sync(&ctx, &source).expect("forced sync");

    assert_eq!(report.pull, PullKind::Full);
    assert_eq!(source.cursors(), vec!["*".to_string(), "*".to_string()]);
}

#[test]
fn corrupt_snapshot_falls_back_to_full_pull() {
    let dir = TempDir::new().expect("tempdir");
    let ctx = context(&dir);
    fs::create_dir_all(dir.path().join("data")).expect("mkdir");
    fs::write(&ctx.config.paths.snapshot, "{ truncated").expect("write");

    let source = Canned::new(vec![morning_pull()]);
    run_sync(&ctx, &source).expect("sync");
    assert_eq!(source.cursors(), vec!["*".to_string()]);
}

#[test]
fn fetch_failure_writes_nothing() {
    let dir = TempDir::new().expect("tempdir");
    let ctx = context(&dir);
    let source = Canned::failing(FetchError::Status {
        status: 403,
        cursor: "*".into(),
        body: "Forbidden".into(),
    });

    let err = run_sync(&ctx, &source).expect_err("fetch fails");
    assert_eq!(err.code(), ErrorCode::RemoteStatus);
    assert!(!ctx.config.paths.snapshot.exists());
    assert!(!ctx.config.paths.rituals.exists());
}

#[test]
fn schema_violation_in_delta_leaves_files_untouched() {
    let dir = TempDir::new().expect("tempdir");
    let ctx = context(&dir);
    let source = Canned::new(vec![
        morning_pull(),
        json!({ "sync_token": "tok-2", "items": [{ "id": 42, "content": "x", "project_id": "p1" }] }),
    ]);
    run_sync(&ctx, &source).expect("first sync");
    let snapshot_before = fs::read(&ctx.config.paths.snapshot).expect("snapshot");
    let rituals_before = fs::read(&ctx.config.paths.rituals).expect("rituals");

    let err = run_sync(&ctx, &source).expect_err("invalid delta");
    assert_eq!(err.code(), ErrorCode::SchemaViolation);
    assert_eq!(fs::read(&ctx.config.paths.snapshot).expect("snapshot"), snapshot_before);
    assert_eq!(fs::read(&ctx.config.paths.rituals).expect("rituals"), rituals_before);
}

#[test]
fn ritual_schema_violation_keeps_previous_rituals() {
    let dir = TempDir::new().expect("tempdir");
    let mut strict: Value = serde_json::from_str(RITUALS_SCHEMA).expect("schema json");
    strict["definitions"]["act"]["properties"]["n"]["maxLength"] = json!(3);
    let schema_path = dir.path().join("rituals.strict.json");
    fs::write(&schema_path, serde_json::to_vec(&strict).expect("encode")).expect("write schema");

    let mut config = context(&dir).config;
    config.paths.rituals_schema = Some(schema_path);
    let ctx = SyncContext::new(config)
        .expect("strict schema")
        .with_lock_timeout(Duration::from_millis(50));

    fs::create_dir_all(dir.path().join("data")).expect("mkdir");
    fs::write(&ctx.config.paths.rituals, "PRIOR").expect("seed rituals");

    let source = Canned::new(vec![morning_pull()]);
    let err = run_sync(&ctx, &source).expect_err("act name too long");
    assert_eq!(err.code(), ErrorCode::SchemaViolation);
    assert_eq!(
        fs::read_to_string(&ctx.config.paths.rituals).expect("rituals"),
        "PRIOR"
    );
    assert!(!ctx.config.paths.snapshot.exists());
}

#[test]
fn unresolved_insert_is_fatal_and_lists_names() {
    let dir = TempDir::new().expect("tempdir");
    let ctx = context(&dir);
    let mut pull = morning_pull();
    pull["items"]
        .as_array_mut()
        .expect("items")
        .push(task("i1", "INS: Evening Walk", Some("wake"), 0));
    let source = Canned::new(vec![pull]);

    let err = run_sync(&ctx, &source).expect_err("unresolved");
    assert_eq!(err.code(), ErrorCode::UnresolvedInsert);
    assert!(err.to_string().contains("Evening Walk"), "{err}");
    assert!(!ctx.config.paths.rituals.exists());
    assert!(!ctx.config.paths.snapshot.exists());
}

#[test]
fn held_lock_blocks_sync() {
    let dir = TempDir::new().expect("tempdir");
    let ctx = context(&dir);
    let _held = SnapshotLock::acquire(&ctx.config.paths.snapshot, Duration::from_millis(50))
        .expect("first lock");

    let source = Canned::new(vec![morning_pull()]);
    let err = run_sync(&ctx, &source).expect_err("locked");
    assert!(matches!(err, SyncError::Lock(_)));
    assert_eq!(err.code(), ErrorCode::LockContention);
    assert!(source.cursors().is_empty());
}

#[test]
fn extract_only_rebuilds_from_snapshot() {
    let dir = TempDir::new().expect("tempdir");
    let ctx = context(&dir);

    let err = extract_only(&ctx).expect_err("no snapshot yet");
    assert_eq!(err.code(), ErrorCode::SnapshotMissing);

    run_sync(&ctx, &Canned::new(vec![morning_pull()])).expect("sync");
    fs::remove_file(&ctx.config.paths.rituals).expect("remove rituals");

    let report = extract_only(&ctx).expect("extract");
    assert_eq!(report.rituals, 2);
    assert_eq!(report.headings, 1);
    let (doc, _) = read_rituals(&ctx.config.paths.rituals);
    assert_eq!(doc.headings["s1"].rituals, vec!["wake".to_string()]);
}

#[test]
fn missing_project_writes_empty_document() {
    let dir = TempDir::new().expect("tempdir");
    let mut ctx = context(&dir);
    ctx.config.todoist.project = "ROUTINES".into();

    run_sync(&ctx, &Canned::new(vec![morning_pull()])).expect("sync");
    let (doc, _) = read_rituals(&ctx.config.paths.rituals);
    assert!(doc.acts.is_empty());
    assert!(doc.headings.is_empty());
    assert_eq!(doc.sync_token, "tok-1");
}
