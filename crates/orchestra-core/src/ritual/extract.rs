//! Ritual extraction: flat Todoist records to an ordered, linked act graph.
//!
//! # Algorithm
//!
//! 1. Select the monitored project by exact name. Absent project → empty
//!    document.
//! 2. Build headings from the project's sections, ordered by `section_order`.
//! 3. Parse every project item into an act: timing fields and prose from the
//!    description, insert marker from the name.
//! 4. Group acts into sibling runs: root items under their section's heading,
//!    nested items under their parent. Each group is ordered by
//!    `(child_order, encounter index)`.
//! 5. Resolve insert markers by ritual name, heading by heading.
//! 6. Link each group into an `x` chain; a parent act's `x` points at its first
//!    child. A heading's `rs` lists the rituals that start a run of its chain.
//! 7. Validate every heading, every act and the whole document.
//!
//! The raw order key never leaves this module.

use std::collections::{BTreeMap, HashMap};

use super::field::{FieldGrammar, GrammarError, LINE, Tag, extract_field};
use super::timespan::parse_span;
use super::{Act, ActKind, Heading, RitualDocument, Timing};
use crate::error::ErrorCode;
use crate::schema::{Schema, SchemaError};
use crate::todoist::{Item, Snapshot};

/// Project name whose sections and tasks become rituals.
pub const MONITORED_PROJECT: &str = "RITUALS";

const EST: &str = "est";
const REMINDER: &str = "r";
const REMINDER_EXPIRED: &str = "rx";

const DEFAULT_EST_PREFIX: &str = "EST:";
const DEFAULT_REMINDER_PREFIX: &str = "REM:";
const DEFAULT_REMINDER_EXPIRED_PREFIX: &str = "EXP:";
const DEFAULT_INSERT_PREFIX: &str = "INS:";

/// Errors that abort an extraction.
#[derive(Debug, thiserror::Error)]
pub enum ExtractError {
    #[error(transparent)]
    Schema(#[from] SchemaError),

    #[error("invalid field markers: {0}")]
    Grammar(#[from] GrammarError),

    #[error("failed to link ritual(s): {}", .0.join(", "))]
    UnresolvedInserts(Vec<String>),

    #[error("failed to encode ritual document: {0}")]
    Encode(#[from] serde_json::Error),
}

impl ExtractError {
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::Schema(err) => err.code(),
            Self::Grammar(_) => ErrorCode::SchemaLoadFailed,
            Self::UnresolvedInserts(_) => ErrorCode::UnresolvedInsert,
            Self::Encode(_) => ErrorCode::InternalUnexpected,
        }
    }
}

/// Markers the extractor looks for in task text.
#[derive(Debug, Clone)]
pub struct Markers {
    /// Timing fields in descriptions, applied in order: est, r, rx.
    pub description: FieldGrammar,
    /// Insert marker in task names.
    pub insert: String,
}

impl Markers {
    /// Read marker prefixes from the ritual schema's `prefix` annotations,
    /// falling back to the built-in prefixes for any that are missing.
    pub fn from_schema(schema: &Schema) -> Result<Self, GrammarError> {
        let time = |field: &str, fallback: &str| {
            schema
                .prefix_at(&format!("/definitions/time/properties/{field}"))
                .unwrap_or(fallback)
                .to_string()
        };

        let description = FieldGrammar::new(vec![
            Tag::line(EST, time(EST, DEFAULT_EST_PREFIX)),
            Tag::line(REMINDER, time(REMINDER, DEFAULT_REMINDER_PREFIX)),
            Tag::line(
                REMINDER_EXPIRED,
                time(REMINDER_EXPIRED, DEFAULT_REMINDER_EXPIRED_PREFIX),
            ),
        ])?;

        let insert = schema
            .prefix_at("/definitions/act/properties/i")
            .unwrap_or(DEFAULT_INSERT_PREFIX)
            .to_string();
        if insert.is_empty() {
            return Err(GrammarError::EmptyPrefix { label: "i".into() });
        }

        Ok(Self {
            description,
            insert,
        })
    }
}

/// An act before ordering, with the bookkeeping the output drops.
#[derive(Debug)]
struct Draft {
    id: String,
    act: Act,
    order: i64,
    seq: usize,
    heading: Option<String>,
    insert_target: Option<String>,
}

/// Members of one sibling group, with their ordering key.
#[derive(Debug, Default)]
struct Siblings(Vec<(i64, usize, String)>);

impl Siblings {
    fn push(&mut self, draft: &Draft) {
        self.0.push((draft.order, draft.seq, draft.id.clone()));
    }

    /// Ids by ascending order key; ties keep encounter order.
    fn into_ordered(mut self) -> Vec<String> {
        self.0.sort_by_key(|(order, seq, _)| (*order, *seq));
        self.0.into_iter().map(|(_, _, id)| id).collect()
    }
}

fn seconds(parsed: &super::field::ParsedFields, label: &str, item: &Item) -> Option<f64> {
    let raw = parsed.get(label)?.trim();
    if raw.is_empty() {
        return None;
    }
    let value = parse_span(raw);
    if value.is_none() {
        tracing::warn!(id = %item.id, name = %item.content, field = label, value = raw, "unparseable duration omitted");
    }
    value
}

/// Parse one task into an act draft.
fn draft_act(item: &Item, seq: usize, markers: &Markers) -> Draft {
    let description = item.description.replace('\'', "");
    let parsed = markers.description.parse(&description);

    let timing = Timing {
        expected: seconds(&parsed, EST, item),
        reminder_active: seconds(&parsed, REMINDER, item),
        reminder_expired: seconds(&parsed, REMINDER_EXPIRED, item),
    };

    let marker = extract_field(&item.content, &markers.insert, LINE);
    let target = marker.value.trim();
    let insert_target = if marker.is_present() && !target.is_empty() {
        Some(target.to_string())
    } else {
        if marker.is_present() {
            tracing::warn!(id = %item.id, name = %item.content, "insert marker without a ritual name ignored");
        }
        None
    };

    let remainder = parsed.remainder.trim();
    let act = Act {
        name: item.content.clone(),
        description: (!remainder.is_empty()).then(|| remainder.to_string()),
        parent: item.parent_id.clone(),
        priority: item.priority,
        timing: (!timing.is_empty()).then_some(timing),
        insert: None,
        kind: insert_target.as_ref().map(|_| ActKind::Hide),
        next: None,
    };

    Draft {
        id: item.id.clone(),
        act,
        order: item.child_order,
        seq,
        heading: item.section_id.clone(),
        insert_target,
    }
}

/// Build the ritual document for `project_name` from a merged snapshot.
///
/// `schema` is the ritual document schema; its `prefix` annotations define
/// the markers and its definitions gate each intermediate step.
pub fn extract(
    snapshot: &Snapshot,
    schema: &Schema,
    project_name: &str,
) -> Result<RitualDocument, ExtractError> {
    let markers = Markers::from_schema(schema)?;
    let heading_schema = schema.definition("heading")?;
    let act_schema = schema.definition("act")?;

    let mut doc = RitualDocument::empty(snapshot.sync_token.clone());

    let Some(project) = snapshot.project_named(project_name) else {
        tracing::warn!(project = project_name, "monitored project not found, no rituals extracted");
        schema.validate("ritual document", &serde_json::to_value(&doc)?)?;
        return Ok(doc);
    };
    tracing::info!(project = %project.name, id = %project.id, "extracting rituals");

    // Headings, by display order. `sort_by_key` is stable, so equal orders
    // keep snapshot order.
    let mut sections: Vec<_> = snapshot.sections_of(&project.id).collect();
    sections.sort_by_key(|section| section.section_order);
    let heading_order: Vec<String> = sections.iter().map(|s| s.id.clone()).collect();
    let mut headings: BTreeMap<String, Heading> = BTreeMap::new();
    for section in &sections {
        tracing::debug!(id = %section.id, name = %section.name, "heading");
        headings.insert(
            section.id.clone(),
            Heading {
                name: section.name.clone(),
                rituals: Vec::new(),
            },
        );
    }

    // Acts, grouped into sibling sets.
    let mut acts: BTreeMap<String, Act> = BTreeMap::new();
    let mut roots: HashMap<String, Siblings> = HashMap::new();
    let mut children: HashMap<String, Siblings> = HashMap::new();
    let mut child_parents: Vec<String> = Vec::new();
    let mut insert_queue: Vec<(String, Vec<String>)> = Vec::new();

    for (seq, item) in snapshot.items_of(&project.id).enumerate() {
        let mut draft = draft_act(item, seq, &markers);

        if let Some(target) = draft.insert_target.take() {
            match insert_queue.iter_mut().find(|(name, _)| *name == target) {
                Some((_, ids)) => ids.push(draft.id.clone()),
                None => insert_queue.push((target, vec![draft.id.clone()])),
            }
        }

        match draft.act.parent.clone() {
            None => {
                draft.act.kind = Some(ActKind::Hide);
                tracing::debug!(id = %draft.id, name = %draft.act.name, "ritual");
                match draft.heading.as_deref().filter(|h| headings.contains_key(*h)) {
                    Some(heading) => roots.entry(heading.to_string()).or_default().push(&draft),
                    None => tracing::warn!(
                        id = %draft.id,
                        name = %draft.act.name,
                        section = ?draft.heading,
                        "ritual outside any heading is not listed"
                    ),
                }
            }
            Some(parent) => {
                tracing::debug!(id = %draft.id, name = %draft.act.name, parent = %parent, "act");
                if !children.contains_key(&parent) {
                    child_parents.push(parent.clone());
                }
                children.entry(parent).or_default().push(&draft);
            }
        }

        if acts.insert(draft.id.clone(), draft.act).is_some() {
            tracing::warn!(id = %draft.id, "duplicate item id, later record wins");
        }
    }

    let roots: Vec<(String, Vec<String>)> = heading_order
        .iter()
        .map(|heading| {
            let ordered = roots.remove(heading).map(Siblings::into_ordered).unwrap_or_default();
            (heading.clone(), ordered)
        })
        .collect();

    resolve_inserts(&mut acts, &roots, insert_queue)?;

    // Sibling chains first, then parent-to-first-child links on top.
    for (_, rituals) in &roots {
        link_siblings(&mut acts, rituals);
    }
    let mut groups = Vec::with_capacity(child_parents.len());
    for parent in child_parents {
        let ordered = children.remove(&parent).map(Siblings::into_ordered).unwrap_or_default();
        link_siblings(&mut acts, &ordered);
        groups.push((parent, ordered));
    }
    for (parent, ordered) in &groups {
        let (Some(first), Some(parent_act)) = (ordered.first(), acts.get_mut(parent)) else {
            continue;
        };
        tracing::debug!(parent = %parent, first = %first, "ordering first act");
        let displaced = parent_act.next.replace(first.clone());
        if let (Some(displaced), Some(_)) = (displaced, &parent_act.parent) {
            tracing::warn!(
                act = %parent,
                successor = %displaced,
                "nested act with children loses its sibling link"
            );
        }
    }

    // A heading lists each ritual its chain does not already reach.
    for (heading, rituals) in roots {
        let entry = headings.get_mut(&heading);
        let Some(entry) = entry else { continue };
        let mut previous: Option<&String> = None;
        for ritual in &rituals {
            let reached = previous
                .and_then(|prev| acts.get(prev))
                .is_some_and(|prev| prev.next.as_ref() == Some(ritual));
            if !reached {
                entry.rituals.push(ritual.clone());
            }
            previous = Some(ritual);
        }
    }

    for (id, heading) in &headings {
        heading_schema.validate(&format!("heading {id}"), &serde_json::to_value(heading)?)?;
    }
    for (id, act) in &acts {
        act_schema.validate(&format!("act {id}"), &serde_json::to_value(act)?)?;
    }

    doc.acts = acts;
    doc.headings = headings;
    schema.validate("ritual document", &serde_json::to_value(&doc)?)?;

    tracing::info!(
        headings = doc.headings.len(),
        rituals = doc.ritual_count(),
        acts = doc.acts.len(),
        "rituals extracted"
    );
    Ok(doc)
}

/// Point every queued act at the ritual it names.
///
/// Headings are scanned in display order and rituals in chain order; the
/// first ritual with a matching name wins. Acts queued under one name keep
/// the order their tasks appeared in.
fn resolve_inserts(
    acts: &mut BTreeMap<String, Act>,
    roots: &[(String, Vec<String>)],
    mut queue: Vec<(String, Vec<String>)>,
) -> Result<(), ExtractError> {
    for (_, rituals) in roots {
        for ritual_id in rituals {
            if queue.is_empty() {
                return Ok(());
            }
            let Some(ritual_name) = acts.get(ritual_id).map(|a| a.name.clone()) else {
                continue;
            };
            let Some(position) = queue.iter().position(|(name, _)| *name == ritual_name) else {
                continue;
            };
            let (_, waiting) = queue.remove(position);
            for act_id in waiting {
                if let Some(act) = acts.get_mut(&act_id) {
                    tracing::debug!(act = %act.name, ritual = %ritual_name, "linking insert");
                    act.insert = Some(ritual_id.clone());
                }
            }
        }
    }

    if queue.is_empty() {
        return Ok(());
    }
    let unresolved: Vec<String> = queue.into_iter().map(|(name, _)| name).collect();
    tracing::error!(unresolved = ?unresolved, "failed to link ritual inserts");
    Err(ExtractError::UnresolvedInserts(unresolved))
}

fn link_siblings(acts: &mut BTreeMap<String, Act>, ordered: &[String]) {
    for pair in ordered.windows(2) {
        if let Some(act) = acts.get_mut(&pair[0]) {
            tracing::trace!(act = %pair[0], next = %pair[1], "ordering next");
            act.next = Some(pair[1].clone());
        }
    }
}
