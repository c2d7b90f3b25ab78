//! # Model Boundary
//!
//! The token classifier itself (a fine-tuned transformer) lives outside this
//! crate. This module fixes the contract on both sides of it:
//!
//! - **In**: [`TrainingExample`]s (words plus tag ids) and a [`LabelMap`]
//!   giving the `id2label`/`label2id` tables the model is configured with.
//! - **Out**: a [`TokenClassifier`] returns one score row per word. [`predict`]
//!   turns the rows into tags and repairs dangling `I-` tags.
//!
//! Models that tokenize into word pieces report `##`-prefixed continuations
//! and special tokens; [`collapse_wordpieces`] maps such output back to words.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::corpus::TaggedDocument;
use crate::error::{Error, Result};
use crate::tagger::{repair_dangling, Tag};

/// Tag ↔ id, using [`Tag::index`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabelMap {
    pub id2label: BTreeMap<usize, String>,
    pub label2id: BTreeMap<String, usize>,
}

impl LabelMap {
    pub fn new() -> Self {
        let tags = Tag::all();
        Self {
            id2label: tags.iter().map(|t| (t.index(), t.label())).collect(),
            label2id: tags.iter().map(|t| (t.label(), t.index())).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.id2label.len()
    }

    pub fn is_empty(&self) -> bool {
        self.id2label.is_empty()
    }

    pub fn id(&self, tag: &Tag) -> usize {
        tag.index()
    }

    pub fn tag(&self, id: usize) -> Option<Tag> {
        Tag::from_index(id)
    }
}

impl Default for LabelMap {
    fn default() -> Self {
        Self::new()
    }
}

/// One document as the trainer consumes it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrainingExample {
    pub id: String,
    pub tokens: Vec<String>,
    pub tags: Vec<Tag>,
}

impl TrainingExample {
    pub fn tag_ids(&self) -> Vec<usize> {
        self.tags.iter().map(Tag::index).collect()
    }

    /// `{"id", "tokens", "ner_tags"}` with numeric tags.
    pub fn to_json_line(&self) -> Result<String> {
        #[derive(Serialize)]
        struct Line<'a> {
            id: &'a str,
            tokens: &'a [String],
            ner_tags: Vec<usize>,
        }
        Ok(serde_json::to_string(&Line {
            id: &self.id,
            tokens: &self.tokens,
            ner_tags: self.tag_ids(),
        })?)
    }
}

impl From<&TaggedDocument> for TrainingExample {
    fn from(doc: &TaggedDocument) -> Self {
        Self {
            id: doc.id.clone(),
            tokens: doc.words(),
            tags: doc.tags(),
        }
    }
}

/// Converts documents in order.
pub fn training_examples(docs: &[TaggedDocument]) -> Vec<TrainingExample> {
    docs.iter().map(TrainingExample::from).collect()
}

/// The external model, seen from here.
pub trait TokenClassifier {
    /// One row per token, one column per tag id.
    fn scores(&self, tokens: &[String]) -> Vec<Vec<f32>>;
}

/// Index of the highest score. The first maximum wins.
fn argmax(row: &[f32]) -> Option<usize> {
    let mut best: Option<(usize, f32)> = None;
    for (i, &v) in row.iter().enumerate() {
        if v.is_nan() {
            return None;
        }
        if best.map_or(true, |(_, b)| v > b) {
            best = Some((i, v));
        }
    }
    best.map(|(i, _)| i)
}

/// Predicts one tag sequence per example.
///
/// Fails with `LengthMismatch` when the classifier returns the wrong number of
/// rows and with `InvalidScores` when a row is not `Tag::COUNT` wide or holds
/// a NaN.
pub fn predict<C: TokenClassifier + ?Sized>(
    classifier: &C,
    examples: &[TrainingExample],
) -> Result<Vec<Vec<Tag>>> {
    examples
        .iter()
        .map(|example| {
            let rows = classifier.scores(&example.tokens);
            if rows.len() != example.tokens.len() {
                return Err(Error::LengthMismatch {
                    id: example.id.clone(),
                    expected: example.tokens.len(),
                    actual: rows.len(),
                });
            }
            let mut tags = rows
                .iter()
                .enumerate()
                .map(|(i, row)| {
                    if row.len() != Tag::COUNT {
                        return Err(Error::InvalidScores(format!(
                            "'{}' token {}: expected {} scores, got {}",
                            example.id,
                            i,
                            Tag::COUNT,
                            row.len()
                        )));
                    }
                    argmax(row).and_then(Tag::from_index).ok_or_else(|| {
                        Error::InvalidScores(format!("'{}' token {}: NaN score", example.id, i))
                    })
                })
                .collect::<Result<Vec<Tag>>>()?;
            let repaired = repair_dangling(&mut tags);
            if !repaired.is_empty() {
                tracing::debug!(
                    "{}: promoted {} dangling prediction(s)",
                    example.id,
                    repaired.len()
                );
            }
            Ok(tags)
        })
        .collect()
}

const SPECIAL_PIECES: [&str; 3] = ["[CLS]", "[SEP]", "[PAD]"];

/// Merges `##` continuation pieces into the preceding word, keeping the first
/// piece's tag, and drops special tokens.
pub fn collapse_wordpieces(pieces: &[String], tags: &[Tag]) -> Result<(Vec<String>, Vec<Tag>)> {
    if pieces.len() != tags.len() {
        return Err(Error::LengthMismatch {
            id: "word pieces".to_string(),
            expected: pieces.len(),
            actual: tags.len(),
        });
    }
    let mut words: Vec<String> = Vec::new();
    let mut word_tags: Vec<Tag> = Vec::new();
    for (piece, tag) in pieces.iter().zip(tags) {
        if SPECIAL_PIECES.contains(&piece.as_str()) {
            continue;
        }
        match (piece.strip_prefix("##"), words.last_mut()) {
            (Some(rest), Some(word)) => word.push_str(rest),
            (Some(rest), None) => {
                words.push(rest.to_string());
                word_tags.push(*tag);
            }
            (None, _) => {
                words.push(piece.clone());
                word_tags.push(*tag);
            }
        }
    }
    Ok((words, word_tags))
}
