//! Todoist record model: projects, sections, items, and the snapshot/delta
//! envelopes that carry them.
//!
//! Records keep every field Todoist sends. The fields orchestra reads are
//! typed; the rest ride along in `extra` so a merged snapshot round-trips
//! through disk without losing data.

pub mod client;

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

pub use client::{DeltaSource, FetchError, TodoistClient};

/// Cursor value that requests every resource instead of a delta.
pub const FULL_SYNC_CURSOR: &str = "*";

/// Resource types requested from the Sync API, in request order.
pub const RESOURCE_TYPES: [&str; 3] = ["projects", "items", "sections"];

const fn default_priority() -> i64 {
    1
}

/// Common view over the three record tables for id-keyed reconciliation.
pub trait Record {
    /// Table name used in logs and merge reports.
    const TABLE: &'static str;

    fn id(&self) -> &str;

    /// Human-readable label (name or content) for logs.
    fn label(&self) -> &str;

    fn is_deleted(&self) -> bool;
}

/// A Todoist project.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Project {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub is_deleted: bool,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

/// A Todoist section; becomes a ritual heading.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Section {
    pub id: String,
    pub name: String,
    pub project_id: String,
    #[serde(default)]
    pub section_order: i64,
    #[serde(default)]
    pub is_deleted: bool,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

/// A Todoist task; becomes a ritual or an act.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Item {
    pub id: String,
    pub content: String,
    #[serde(default)]
    pub description: String,
    pub project_id: String,
    #[serde(default)]
    pub parent_id: Option<String>,
    #[serde(default)]
    pub section_id: Option<String>,
    #[serde(default)]
    pub child_order: i64,
    #[serde(default = "default_priority")]
    pub priority: i64,
    #[serde(default)]
    pub is_deleted: bool,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl Record for Project {
    const TABLE: &'static str = "projects";

    fn id(&self) -> &str {
        &self.id
    }

    fn label(&self) -> &str {
        &self.name
    }

    fn is_deleted(&self) -> bool {
        self.is_deleted
    }
}

impl Record for Section {
    const TABLE: &'static str = "sections";

    fn id(&self) -> &str {
        &self.id
    }

    fn label(&self) -> &str {
        &self.name
    }

    fn is_deleted(&self) -> bool {
        self.is_deleted
    }
}

impl Record for Item {
    const TABLE: &'static str = "items";

    fn id(&self) -> &str {
        &self.id
    }

    fn label(&self) -> &str {
        &self.content
    }

    fn is_deleted(&self) -> bool {
        self.is_deleted
    }
}

/// A payload returned by the Sync API: either a full pull or a delta.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Delta {
    pub sync_token: String,
    #[serde(default)]
    pub full_sync: bool,
    #[serde(default)]
    pub projects: Vec<Project>,
    #[serde(default)]
    pub sections: Vec<Section>,
    #[serde(default)]
    pub items: Vec<Item>,
}

impl Delta {
    /// Decode a payload that has already passed schema validation.
    pub fn from_value(value: Value) -> Result<Self, serde_json::Error> {
        serde_json::from_value(value)
    }

    /// An empty delta carrying only a cursor.
    #[must_use]
    pub fn empty(sync_token: impl Into<String>) -> Self {
        Self {
            sync_token: sync_token.into(),
            full_sync: false,
            projects: Vec::new(),
            sections: Vec::new(),
            items: Vec::new(),
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.projects.is_empty() && self.sections.is_empty() && self.items.is_empty()
    }
}

/// The last fully reconciled Todoist state, as persisted on disk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub sync_token: String,
    #[serde(default)]
    pub projects: Vec<Project>,
    #[serde(default)]
    pub sections: Vec<Section>,
    #[serde(default)]
    pub items: Vec<Item>,
}

impl Snapshot {
    /// Build a snapshot from a full pull, dropping any deletion markers.
    #[must_use]
    pub fn from_full(delta: Delta) -> Self {
        fn live<R: Record>(records: Vec<R>) -> Vec<R> {
            records.into_iter().filter(|r| !r.is_deleted()).collect()
        }

        Self {
            sync_token: delta.sync_token,
            projects: live(delta.projects),
            sections: live(delta.sections),
            items: live(delta.items),
        }
    }

    /// First project whose name is exactly `name`.
    #[must_use]
    pub fn project_named(&self, name: &str) -> Option<&Project> {
        self.projects.iter().find(|p| p.name == name)
    }

    /// Sections belonging to `project_id`, in snapshot order.
    pub fn sections_of<'a>(&'a self, project_id: &'a str) -> impl Iterator<Item = &'a Section> {
        self.sections.iter().filter(move |s| s.project_id == project_id)
    }

    /// Items belonging to `project_id`, in snapshot order.
    pub fn items_of<'a>(&'a self, project_id: &'a str) -> impl Iterator<Item = &'a Item> {
        self.items.iter().filter(move |i| i.project_id == project_id)
    }
}
