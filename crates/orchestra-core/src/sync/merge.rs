//! Reconciliation of a Todoist delta into the local snapshot.
//!
//! # Merge Semantics
//!
//! The remote delta is authoritative for every id it mentions. Each table
//! (`projects`, `sections`, `items`) is reconciled independently, walking the
//! delta in order and matching each record against the **first** base record
//! with the same id:
//!
//! | base has id | delta `is_deleted` | result                    |
//! |-------------|--------------------|---------------------------|
//! | yes         | true               | base record removed       |
//! | yes         | false              | replaced in place         |
//! | no          | false              | appended                  |
//! | no          | true               | ignored (nothing to drop) |
//!
//! Base records the delta does not mention are left untouched. Repeated ids
//! inside one delta are applied in order, so the last one wins.
//!
//! Deletion markers never survive a merge.

use serde::Serialize;

use crate::schema::{Schema, SchemaError};
use crate::todoist::{Delta, Record, Snapshot};

/// Whether a merge advances the local sync cursor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MergeMode {
    /// Adopt the delta's cursor.
    #[default]
    Advance,
    /// Keep the base cursor so the next run re-fetches the same window.
    DryRun,
}

/// Per-table counts of what a merge did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TableMerge {
    pub added: usize,
    pub replaced: usize,
    pub deleted: usize,
    /// Deletion markers for ids the base never had.
    pub ignored_deletes: usize,
}

impl TableMerge {
    #[must_use]
    pub const fn changes(&self) -> usize {
        self.added + self.replaced + self.deleted
    }
}

/// Outcome of merging one delta.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MergeReport {
    pub projects: TableMerge,
    pub sections: TableMerge,
    pub items: TableMerge,
    pub cursor_advanced: bool,
}

impl MergeReport {
    #[must_use]
    pub const fn changes(&self) -> usize {
        self.projects.changes() + self.sections.changes() + self.items.changes()
    }
}

/// Reconcile one table of `delta` records into `base`.
pub fn merge_table<R: Record>(base: &mut Vec<R>, delta: Vec<R>) -> TableMerge {
    let mut stats = TableMerge::default();

    for incoming in delta {
        let position = base.iter().position(|existing| existing.id() == incoming.id());
        match (position, incoming.is_deleted()) {
            (Some(index), true) => {
                let removed = base.remove(index);
                tracing::info!(table = R::TABLE, id = removed.id(), name = removed.label(), "deleting");
                stats.deleted += 1;
            }
            (Some(index), false) => {
                tracing::info!(table = R::TABLE, id = incoming.id(), name = incoming.label(), "overwriting");
                base[index] = incoming;
                stats.replaced += 1;
            }
            (None, true) => {
                tracing::debug!(table = R::TABLE, id = incoming.id(), "delete for unknown id ignored");
                stats.ignored_deletes += 1;
            }
            (None, false) => {
                tracing::info!(table = R::TABLE, id = incoming.id(), name = incoming.label(), "adding");
                base.push(incoming);
                stats.added += 1;
            }
        }
    }

    stats
}

/// Merge `delta` into `base` without schema checks.
#[must_use]
pub fn apply_delta(mut base: Snapshot, delta: Delta, mode: MergeMode) -> (Snapshot, MergeReport) {
    let projects = merge_table(&mut base.projects, delta.projects);
    let sections = merge_table(&mut base.sections, delta.sections);
    let items = merge_table(&mut base.items, delta.items);

    let cursor_advanced = match mode {
        MergeMode::Advance => {
            base.sync_token = delta.sync_token;
            true
        }
        MergeMode::DryRun => {
            tracing::info!(
                kept = %base.sync_token,
                skipped = %delta.sync_token,
                "dry run: sync cursor not advanced"
            );
            false
        }
    };

    (
        base,
        MergeReport {
            projects,
            sections,
            items,
            cursor_advanced,
        },
    )
}

/// Errors from [`merge`].
#[derive(Debug, thiserror::Error)]
pub enum MergeError {
    #[error(transparent)]
    Schema(#[from] SchemaError),

    #[error("delta payload does not decode: {0}")]
    Decode(#[from] serde_json::Error),
}

/// Validate base and raw delta against the Todoist schema, merge, then
/// validate the merged snapshot.
///
/// Nothing is merged if either side violates the schema, and a merged
/// snapshot that fails the schema is never returned.
pub fn merge(
    base: Snapshot,
    raw_delta: serde_json::Value,
    schema: &Schema,
    mode: MergeMode,
) -> Result<(Snapshot, MergeReport), MergeError> {
    schema.validate("local snapshot", &serde_json::to_value(&base)?)?;
    schema.validate("remote delta", &raw_delta)?;
    let delta = Delta::from_value(raw_delta)?;

    tracing::info!(
        projects = delta.projects.len(),
        sections = delta.sections.len(),
        items = delta.items.len(),
        "merging Todoist delta"
    );
    let (merged, report) = apply_delta(base, delta, mode);
    schema.validate("merged snapshot", &serde_json::to_value(&merged)?)?;
    Ok((merged, report))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{Value, json};

    fn item(id: &str, content: &str) -> Value {
        json!({ "id": id, "content": content, "project_id": "p1" })
    }

    fn deleted(id: &str) -> Value {
        json!({ "id": id, "content": "", "project_id": "p1", "is_deleted": true })
    }

    fn snapshot(token: &str, items: Vec<Value>) -> Snapshot {
        Snapshot::from_full(
            Delta::from_value(json!({
                "sync_token": token,
                "projects": [{ "id": "p1", "name": "RITUALS" }],
                "items": items
            }))
            .expect("decode"),
        )
    }

    fn contents(snapshot: &Snapshot) -> Vec<(&str, &str)> {
        snapshot
            .items
            .iter()
            .map(|i| (i.id.as_str(), i.content.as_str()))
            .collect()
    }

    #[test]
    fn update_insert_and_delete_of_absent() {
        let base = snapshot("t1", vec![item("A", "a"), item("B", "b")]);
        let delta = json!({
            "sync_token": "t2",
            "items": [item("B", "b-prime"), item("C", "c"), deleted("D")]
        });

        let (merged, report) =
            merge(base, delta, &Schema::todoist().expect("schema"), MergeMode::Advance)
                .expect("merge");

        assert_eq!(contents(&merged), vec![("A", "a"), ("B", "b-prime"), ("C", "c")]);
        assert_eq!(merged.sync_token, "t2");
        assert_eq!(
            report.items,
            TableMerge {
                added: 1,
                replaced: 1,
                deleted: 0,
                ignored_deletes: 1
            }
        );
        assert!(report.cursor_advanced);
    }

    #[test]
    fn delete_removes_record_and_marker() {
        let base = snapshot("t1", vec![item("A", "a"), item("B", "b")]);
        let delta = Delta::from_value(json!({ "sync_token": "t2", "items": [deleted("A")] }))
            .expect("decode");

        let (merged, report) = apply_delta(base, delta, MergeMode::Advance);
        assert_eq!(contents(&merged), vec![("B", "b")]);
        assert!(merged.items.iter().all(|i| !i.is_deleted));
        assert_eq!(report.items.deleted, 1);
    }

    #[test]
    fn empty_delta_only_moves_cursor() {
        let base = snapshot("t1", vec![item("A", "a")]);
        let (merged, report) = apply_delta(base.clone(), Delta::empty("t2"), MergeMode::Advance);
        assert_eq!(merged.items, base.items);
        assert_eq!(merged.projects, base.projects);
        assert_eq!(merged.sync_token, "t2");
        assert_eq!(report.changes(), 0);
    }

    #[test]
    fn dry_run_keeps_cursor() {
        let base = snapshot("t1", vec![item("A", "a")]);
        let (merged, report) = apply_delta(base.clone(), Delta::empty("t2"), MergeMode::DryRun);
        assert_eq!(merged, base);
        assert!(!report.cursor_advanced);
    }

    #[test]
    fn repeated_delta_ids_apply_in_order() {
        let base = snapshot("t1", vec![item("A", "a")]);
        let delta = Delta::from_value(json!({
            "sync_token": "t2",
            "items": [item("A", "first"), item("A", "second"), item("N", "n1"), item("N", "n2")]
        }))
        .expect("decode");

        let (merged, _) = apply_delta(base, delta, MergeMode::Advance);
        assert_eq!(contents(&merged), vec![("A", "second"), ("N", "n2")]);
    }

    #[test]
    fn tables_merge_independently() {
        let base = snapshot("t1", vec![item("X", "item x")]);
        let delta = Delta::from_value(json!({
            "sync_token": "t2",
            "projects": [{ "id": "X", "name": "project x" }],
            "sections": [{ "id": "s1", "name": "Morning", "project_id": "p1" }]
        }))
        .expect("decode");

        let (merged, report) = apply_delta(base, delta, MergeMode::Advance);
        assert_eq!(merged.items.len(), 1);
        assert_eq!(merged.projects.len(), 2);
        assert_eq!(merged.sections.len(), 1);
        assert_eq!(report.projects.added, 1);
        assert_eq!(report.sections.added, 1);
    }

    #[test]
    fn invalid_delta_is_rejected_before_merge() {
        let base = snapshot("t1", vec![item("A", "a")]);
        let delta = json!({ "items": [item("B", "b")] });

        let err = merge(base, delta, &Schema::todoist().expect("schema"), MergeMode::Advance)
            .expect_err("missing sync_token");
        assert!(matches!(err, MergeError::Schema(SchemaError::Violation { .. })));
    }

    #[test]
    fn merged_snapshot_is_validated() {
        let mut raw: Value =
            serde_json::from_str(crate::schema::TODOIST_SCHEMA).expect("schema json");
        raw["properties"]["items"]["maxItems"] = json!(1);
        let schema = Schema::from_value("one item", raw).expect("compile");

        let base = snapshot("t1", vec![item("A", "a")]);
        let delta = json!({ "sync_token": "t2", "items": [item("B", "b")] });

        let err = merge(base, delta, &schema, MergeMode::Advance).expect_err("two items");
        let MergeError::Schema(SchemaError::Violation { subject, .. }) = err else {
            panic!("expected a violation, got {err:?}");
        };
        assert_eq!(subject, "merged snapshot");
    }
}
