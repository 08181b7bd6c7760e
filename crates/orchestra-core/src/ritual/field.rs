//! Labeled fields embedded in free text.
//!
//! Todoist descriptions carry small `PREFIX value` fields, one per line, mixed
//! with ordinary prose. [`extract_field`] pulls a single field out of a body;
//! [`FieldGrammar`] applies an ordered set of them and returns what is left.

/// Default field terminator.
pub const LINE: &str = "\n";

/// Which span a caller wants removed from the body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strip {
    /// Remove only the prefix token; the value stays in the text.
    PrefixOnly,
    /// Remove the prefix and its value.
    WholeField,
}

/// Result of looking for one field in a body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Extracted {
    /// Text between the prefix and the delimiter; empty when absent.
    pub value: String,
    /// Body with only the prefix occurrence removed.
    pub prefix_removed: String,
    /// Body with prefix and value removed; the delimiter is kept.
    pub field_removed: String,
    /// Byte offset of the prefix in the original body.
    pub offset: Option<usize>,
}

impl Extracted {
    #[must_use]
    pub const fn is_present(&self) -> bool {
        self.offset.is_some()
    }

    /// The residual body for the given strip mode.
    #[must_use]
    pub fn remainder(&self, strip: Strip) -> &str {
        match strip {
            Strip::PrefixOnly => &self.prefix_removed,
            Strip::WholeField => &self.field_removed,
        }
    }
}

/// Find the first `prefix` in `body` and split out the value up to `delim`.
///
/// When `delim` does not follow the prefix the value runs to the end of the
/// body. An empty prefix never matches.
#[must_use]
pub fn extract_field(body: &str, prefix: &str, delim: &str) -> Extracted {
    let Some(start) = (!prefix.is_empty()).then(|| body.find(prefix)).flatten() else {
        return Extracted {
            value: String::new(),
            prefix_removed: body.to_string(),
            field_removed: body.to_string(),
            offset: None,
        };
    };

    let value_start = start + prefix.len();
    let value_end = if delim.is_empty() {
        body.len()
    } else {
        body[value_start..]
            .find(delim)
            .map_or(body.len(), |rel| value_start + rel)
    };

    Extracted {
        value: body[value_start..value_end].to_string(),
        prefix_removed: format!("{}{}", &body[..start], &body[value_start..]),
        field_removed: format!("{}{}", &body[..start], &body[value_end..]),
        offset: Some(start),
    }
}

/// Invalid tag set for a [`FieldGrammar`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GrammarError {
    #[error("field `{label}` has an empty prefix")]
    EmptyPrefix { label: String },

    #[error("prefix `{inner}` of field `{inner_label}` occurs inside prefix `{outer}` of field `{outer_label}`")]
    Overlap {
        inner_label: String,
        inner: String,
        outer_label: String,
        outer: String,
    },
}

/// One labeled field: `prefix` up to `delim`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tag {
    pub label: String,
    pub prefix: String,
    pub delim: String,
}

impl Tag {
    /// A line-terminated field.
    #[must_use]
    pub fn line(label: impl Into<String>, prefix: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            prefix: prefix.into(),
            delim: LINE.to_string(),
        }
    }
}

/// Fields found by [`FieldGrammar::parse`], in grammar order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedFields {
    pub values: Vec<(String, String)>,
    /// Body with every matched field removed.
    pub remainder: String,
}

impl ParsedFields {
    #[must_use]
    pub fn get(&self, label: &str) -> Option<&str> {
        self.values
            .iter()
            .find(|(l, _)| l == label)
            .map(|(_, v)| v.as_str())
    }
}

/// An ordered set of tags applied one after another to residual text.
///
/// No tag's prefix may occur inside another's, so removing one field can
/// never expose or destroy a different field's marker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldGrammar {
    tags: Vec<Tag>,
}

impl FieldGrammar {
    pub fn new(tags: Vec<Tag>) -> Result<Self, GrammarError> {
        for tag in &tags {
            if tag.prefix.is_empty() {
                return Err(GrammarError::EmptyPrefix {
                    label: tag.label.clone(),
                });
            }
        }
        for (i, inner) in tags.iter().enumerate() {
            for (j, outer) in tags.iter().enumerate() {
                if i != j && outer.prefix.contains(inner.prefix.as_str()) {
                    return Err(GrammarError::Overlap {
                        inner_label: inner.label.clone(),
                        inner: inner.prefix.clone(),
                        outer_label: outer.label.clone(),
                        outer: outer.prefix.clone(),
                    });
                }
            }
        }
        Ok(Self { tags })
    }

    #[must_use]
    pub fn tags(&self) -> &[Tag] {
        &self.tags
    }

    /// Apply every tag in order, each to the text the previous ones left.
    #[must_use]
    pub fn parse(&self, body: &str) -> ParsedFields {
        let mut parsed = ParsedFields {
            values: Vec::new(),
            remainder: body.to_string(),
        };
        for tag in &self.tags {
            let found = extract_field(&parsed.remainder, &tag.prefix, &tag.delim);
            if found.is_present() {
                parsed.values.push((tag.label.clone(), found.value));
                parsed.remainder = found.field_removed;
            }
        }
        parsed
    }
}
