//! # Annotation Normalizer
//!
//! The annotation exports this corpus was built from come in three shapes.
//! Each record has a `text` field and exactly one annotation field:
//!
//! | Shape               | Field      | Entry                                            |
//! |---------------------|------------|--------------------------------------------------|
//! | `ArrayTriple`       | `label`    | `[start, end, "INS"]`                            |
//! | `NamedArrayTriple`  | `labels`   | `[start, end, "INS"]`                            |
//! | `OffsetDict`        | `entities` | `{"start_offset": 0, "end_offset": 4, "label": "INS"}` |
//!
//! `OffsetDict` also accepts `start`/`end`, so canonical output can be fed
//! back in.
//!
//! ## Error Policy
//!
//! - Record-level problems (bad JSON, no `text`, no or several annotation
//!   fields) reject the record: `MalformedRecord`.
//! - Entry-level problems (wrong arity, missing key, bad offsets, unknown
//!   label) drop that span only: `InvalidSpan`. The document is kept, even
//!   when no span survives.
//!
//! Nothing is silently dropped; every rejection carries the 1-based line.

use serde_json::{Map, Value};

use crate::corpus::{Document, EntitySpan};
use crate::error::{Error, Result};
use crate::report::{Issue, IssueKind};
use crate::tagger::EntityCategory;
use crate::tokenizer::char_len;

/// Which annotation field a record uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnnotationShape {
    ArrayTriple,
    NamedArrayTriple,
    OffsetDict,
}

impl AnnotationShape {
    pub const ALL: [AnnotationShape; 3] = [
        AnnotationShape::ArrayTriple,
        AnnotationShape::NamedArrayTriple,
        AnnotationShape::OffsetDict,
    ];

    pub fn field(&self) -> &'static str {
        match self {
            AnnotationShape::ArrayTriple => "label",
            AnnotationShape::NamedArrayTriple => "labels",
            AnnotationShape::OffsetDict => "entities",
        }
    }

    /// Detects the shape from the fields present. Exactly one must match.
    pub fn detect(record: &Map<String, Value>) -> Result<Self> {
        let present: Vec<AnnotationShape> = AnnotationShape::ALL
            .into_iter()
            .filter(|shape| record.contains_key(shape.field()))
            .collect();
        match present.as_slice() {
            [shape] => Ok(*shape),
            [] => Err(Error::malformed(
                "Missing annotation field ('label', 'labels' or 'entities').",
            )),
            many => {
                let fields: Vec<&str> = many.iter().map(|s| s.field()).collect();
                Err(Error::malformed(format!(
                    "Ambiguous annotation fields: {}.",
                    fields.join(", ")
                )))
            }
        }
    }
}

/// A document and the spans dropped while normalizing it.
#[derive(Debug, Clone)]
pub struct NormalizedRecord {
    pub document: Document,
    pub shape: AnnotationShape,
    /// `InvalidSpan` issues, without line numbers.
    pub dropped: Vec<Issue>,
}

/// Normalizes one parsed record into a [`Document`].
///
/// Returns `Err(MalformedRecord)` when the record as a whole is unusable.
pub fn normalize_record(id: impl Into<String>, value: &Value) -> Result<NormalizedRecord> {
    let record = value
        .as_object()
        .ok_or_else(|| Error::malformed("Record is not a JSON object."))?;

    let text = match record.get("text") {
        Some(Value::String(s)) => s.clone(),
        Some(_) => return Err(Error::malformed("Field 'text' is not a string.")),
        None => return Err(Error::malformed("Missing 'text'.")),
    };

    let shape = AnnotationShape::detect(record)?;
    let entries = record
        .get(shape.field())
        .and_then(Value::as_array)
        .ok_or_else(|| Error::malformed(format!("Field '{}' is not a list.", shape.field())))?;

    let limit = char_len(&text);
    let mut entities = Vec::with_capacity(entries.len());
    let mut dropped = Vec::new();

    for entry in entries {
        let parsed = match shape {
            AnnotationShape::ArrayTriple | AnnotationShape::NamedArrayTriple => parse_triple(entry),
            AnnotationShape::OffsetDict => parse_offset_dict(entry),
        };
        match parsed.and_then(|span| validate_span(span, limit)) {
            Ok(span) => entities.push(span),
            Err(e) => dropped.push(Issue::new(IssueKind::InvalidSpan, e.to_string())),
        }
    }

    Ok(NormalizedRecord {
        document: Document::new(id, text, entities),
        shape,
        dropped,
    })
}

/// Parses and normalizes one JSON-Lines line. `line_no` is 1-based.
///
/// On success the span issues are returned tagged with the line; on failure a
/// single `MalformedRecord` issue is returned.
pub fn normalize_line(
    id: impl Into<String>,
    line: &str,
    line_no: usize,
) -> std::result::Result<(Document, Vec<Issue>), Issue> {
    let value: Value = serde_json::from_str(line.trim())
        .map_err(|_| Issue::new(IssueKind::MalformedRecord, "Invalid JSON format.").at_line(line_no))?;

    let id = id.into();
    match normalize_record(id.clone(), &value) {
        Ok(normalized) => {
            let issues = normalized
                .dropped
                .into_iter()
                .map(|issue| issue.at_line(line_no).for_document(id.clone()))
                .collect();
            Ok((normalized.document, issues))
        }
        Err(e) => Err(Issue::new(IssueKind::MalformedRecord, e.to_string()).at_line(line_no)),
    }
}

/// `[start, end, label]`.
fn parse_triple(entry: &Value) -> Result<RawSpan> {
    match entry.as_array().map(Vec::as_slice) {
        Some([start, end, label]) => Ok(RawSpan {
            start: offset(start, "start")?,
            end: offset(end, "end")?,
            label: label_string(label),
        }),
        _ => Err(Error::invalid_span(format!(
            "Invalid label format {}. Expected [start, end, label].",
            entry
        ))),
    }
}

/// `{"start_offset", "end_offset", "label"}` (or `start`/`end`).
fn parse_offset_dict(entry: &Value) -> Result<RawSpan> {
    let obj = entry.as_object().ok_or_else(|| {
        Error::invalid_span(format!(
            "Invalid entity format {}. Expected an object with start_offset, end_offset and label.",
            entry
        ))
    })?;
    let field = |primary: &str, alias: &str| {
        obj.get(primary).or_else(|| obj.get(alias)).ok_or_else(|| {
            Error::invalid_span(format!("Entity {} is missing '{}'.", entry, primary))
        })
    };
    Ok(RawSpan {
        start: offset(field("start_offset", "start")?, "start_offset")?,
        end: offset(field("end_offset", "end")?, "end_offset")?,
        label: label_string(field("label", "label")?),
    })
}

struct RawSpan {
    start: u64,
    end: u64,
    label: String,
}

fn offset(value: &Value, name: &str) -> Result<u64> {
    value.as_u64().ok_or_else(|| {
        Error::invalid_span(format!(
            "Offset '{}' must be a non-negative integer, found {}.",
            name, value
        ))
    })
}

/// Labels are compared as strings; a numeric label is stringified and then
/// rejected as unknown rather than coerced to anything.
fn label_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn validate_span(raw: RawSpan, limit: usize) -> Result<EntitySpan> {
    let label: EntityCategory = raw.label.parse().map_err(|e: Error| {
        Error::invalid_span(format!("{} in span [{}, {}].", e, raw.start, raw.end))
    })?;
    if raw.end <= raw.start {
        return Err(Error::invalid_span(format!(
            "Span [{}, {}, \"{}\"] has end <= start.",
            raw.start, raw.end, label
        )));
    }
    if raw.end > limit as u64 {
        return Err(Error::invalid_span(format!(
            "Span [{}, {}, \"{}\"] exceeds text length {}.",
            raw.start, raw.end, label, limit
        )));
    }
    Ok(EntitySpan::new(raw.start as usize, raw.end as usize, label))
}
