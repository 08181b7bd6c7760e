//! Ritual document model and the extraction pipeline that builds it.
//!
//! The persisted document uses the compact key names the watch app reads
//! (`n`, `py`, `ti`, `x`, ...). Rust field names stay descriptive and are
//! renamed at the serde boundary.

pub mod extract;
pub mod field;
pub mod timespan;

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::store::{self, StoreError};

pub use extract::{ExtractError, Markers, extract};

/// Rendering discriminator for an act.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActKind {
    /// Not rendered as a step: rituals themselves and insert placeholders.
    Hide,
}

/// Timing parsed from an act description, in seconds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Timing {
    /// Expected duration.
    #[serde(rename = "est", default, skip_serializing_if = "Option::is_none")]
    pub expected: Option<f64>,
    /// Reminder while the act is running.
    #[serde(rename = "r", default, skip_serializing_if = "Option::is_none")]
    pub reminder_active: Option<f64>,
    /// Reminder once the expected duration has passed.
    #[serde(rename = "rx", default, skip_serializing_if = "Option::is_none")]
    pub reminder_expired: Option<f64>,
}

impl Timing {
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.expected.is_none() && self.reminder_active.is_none() && self.reminder_expired.is_none()
    }
}

/// One step of a ritual, or a ritual itself when it has no parent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Act {
    #[serde(rename = "n")]
    pub name: String,
    #[serde(rename = "d", default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(rename = "pt", default, skip_serializing_if = "Option::is_none")]
    pub parent: Option<String>,
    #[serde(rename = "py")]
    pub priority: i64,
    #[serde(rename = "ti", default, skip_serializing_if = "Option::is_none")]
    pub timing: Option<Timing>,
    /// Id of the ritual this act stands in for.
    #[serde(rename = "i", default, skip_serializing_if = "Option::is_none")]
    pub insert: Option<String>,
    #[serde(rename = "ty", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<ActKind>,
    /// Id of the act that follows this one.
    #[serde(rename = "x", default, skip_serializing_if = "Option::is_none")]
    pub next: Option<String>,
}

/// A named group of rituals, built from a Todoist section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Heading {
    #[serde(rename = "n")]
    pub name: String,
    /// Ritual ids that start a run of the heading's `x` chain, in order.
    #[serde(rename = "rs")]
    pub rituals: Vec<String>,
}

/// The persisted output of an extraction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RitualDocument {
    /// Sync cursor of the snapshot this document was built from.
    #[serde(rename = "sync")]
    pub sync_token: String,
    pub acts: BTreeMap<String, Act>,
    #[serde(rename = "hdgs")]
    pub headings: BTreeMap<String, Heading>,
}

impl RitualDocument {
    #[must_use]
    pub fn empty(sync_token: impl Into<String>) -> Self {
        Self {
            sync_token: sync_token.into(),
            acts: BTreeMap::new(),
            headings: BTreeMap::new(),
        }
    }

    /// Number of root-level acts.
    #[must_use]
    pub fn ritual_count(&self) -> usize {
        self.acts.values().filter(|act| act.parent.is_none()).count()
    }

    /// Follow `x` pointers from `start`, stopping at the end or on a revisit.
    #[must_use]
    pub fn chain_from<'a>(&'a self, start: &'a str) -> Vec<&'a str> {
        let mut seen = std::collections::HashSet::new();
        let mut chain = Vec::new();
        let mut cursor = Some(start);
        while let Some(id) = cursor {
            if !seen.insert(id) || !self.acts.contains_key(id) {
                break;
            }
            chain.push(id);
            cursor = self.acts.get(id).and_then(|act| act.next.as_deref());
        }
        chain
    }

    /// Atomically write the document to `path`.
    pub fn save(&self, path: &Path) -> Result<(), StoreError> {
        store::write_json_atomic(path, self)?;
        tracing::info!(
            path = %path.display(),
            acts = self.acts.len(),
            headings = self.headings.len(),
            "saved ritual document"
        );
        Ok(())
    }
}
