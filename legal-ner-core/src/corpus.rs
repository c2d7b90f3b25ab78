//! # Documents, Spans and the IOB Format
//!
//! A [`Document`] is one annotated decision (raw text plus character spans).
//! A [`TaggedDocument`] is the same decision after tokenization and tagging,
//! the form consumed by counting, splitting, augmentation and training.
//!
//! ## Canonical Forms
//!
//! Both forms below are canonical and have a writer and a reader here.
//!
//! **JSON-Lines**, one document per line:
//!
//! ```text
//! {"text": "NEDA issued PD 1468.", "entities": [{"start": 0, "end": 4, "label": "INS"}, ...]}
//! ```
//!
//! **IOB**, one `token<TAB>TAG` per line and a blank line after each document:
//!
//! ```text
//! NEDA	B-INS
//! issued	O
//! PD	B-STA
//! 1468	I-STA
//! .	O
//!
//! ```
//!
//! IOB carries no source text. Documents read from IOB get token offsets in
//! the coordinate space of their tokens joined by single spaces, which is what
//! [`TaggedDocument::text`] returns.

use std::collections::BTreeMap;
use std::fmt::Write as _;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::report::{Issue, IssueKind};
use crate::tagger::{tag_tokens, tokens_to_spans, EntityCategory, Tag, TaggedToken};
use crate::tokenizer::{slice_chars, tokenize, Token};

/// A labeled character range `[start, end)` in a document's text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EntitySpan {
    pub start: usize,
    pub end: usize,
    pub label: EntityCategory,
}

impl EntitySpan {
    pub fn new(start: usize, end: usize, label: EntityCategory) -> Self {
        Self { start, end, label }
    }

    pub fn len(&self) -> usize {
        self.end.saturating_sub(self.start)
    }

    pub fn is_empty(&self) -> bool {
        self.end <= self.start
    }

    pub fn contains(&self, start: usize, end: usize) -> bool {
        self.start <= start && end <= self.end
    }
}

/// One annotated decision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    /// Stable identity, used as the IOB file stem.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub id: String,
    pub text: String,
    /// Spans in input order. Order matters for overlap resolution.
    pub entities: Vec<EntitySpan>,
}

impl Document {
    pub fn new(id: impl Into<String>, text: impl Into<String>, entities: Vec<EntitySpan>) -> Self {
        Self {
            id: id.into(),
            text: text.into(),
            entities,
        }
    }

    /// Surface text of a span, if its offsets are valid for this document.
    pub fn span_text(&self, span: &EntitySpan) -> Option<&str> {
        slice_chars(&self.text, span.start, span.end)
    }

    /// Tokenizes and tags the document. See [`crate::tagger::assign_tags`].
    pub fn tag(&self) -> (TaggedDocument, Vec<Issue>) {
        let (tokens, issues) = tag_tokens(tokenize(&self.text), &self.entities);
        let issues = issues
            .into_iter()
            .map(|issue| issue.for_document(self.id.clone()))
            .collect();
        (
            TaggedDocument {
                id: self.id.clone(),
                tokens,
            },
            issues,
        )
    }

    /// Canonical JSON-Lines form (without the trailing newline).
    pub fn to_json_line(&self) -> Result<String> {
        #[derive(Serialize)]
        struct Canonical<'a> {
            text: &'a str,
            entities: &'a [EntitySpan],
        }
        Ok(serde_json::to_string(&Canonical {
            text: &self.text,
            entities: &self.entities,
        })?)
    }
}

/// A tokenized document with one BIO tag per token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaggedDocument {
    pub id: String,
    pub tokens: Vec<TaggedToken>,
}

impl TaggedDocument {
    /// Builds a document from `(token, tag)` pairs, placing the tokens one
    /// space apart.
    pub fn from_pairs<S: Into<String>>(id: impl Into<String>, pairs: impl IntoIterator<Item = (S, Tag)>) -> Self {
        let mut offset = 0;
        let tokens = pairs
            .into_iter()
            .enumerate()
            .map(|(index, (text, tag))| {
                let text = text.into();
                let len = text.chars().count();
                let token = Token::new(text, offset, offset + len, index);
                offset += len + 1;
                TaggedToken { token, tag }
            })
            .collect();
        Self {
            id: id.into(),
            tokens,
        }
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    pub fn tags(&self) -> Vec<Tag> {
        self.tokens.iter().map(|t| t.tag).collect()
    }

    pub fn words(&self) -> Vec<String> {
        self.tokens.iter().map(|t| t.token.text.clone()).collect()
    }

    /// Token texts joined by single spaces.
    pub fn text(&self) -> String {
        self.words().join(" ")
    }

    /// Recomputes offsets after token texts changed (augmentation, stripping).
    pub fn reflow(&mut self) {
        let mut offset = 0;
        for (index, tt) in self.tokens.iter_mut().enumerate() {
            let len = tt.token.text.chars().count();
            tt.token.start = offset;
            tt.token.end = offset + len;
            tt.token.index = index;
            offset += len + 1;
        }
    }

    /// Converts back to a canonical [`Document`] over [`TaggedDocument::text`].
    pub fn to_document(&self) -> Document {
        Document::new(self.id.clone(), self.text(), tokens_to_spans(&self.tokens))
    }

    /// Serializes as IOB, ending with the blank separator line.
    pub fn to_iob(&self) -> String {
        let mut out = String::new();
        for tt in &self.tokens {
            let _ = writeln!(out, "{}\t{}", tt.token.text, tt.tag);
        }
        out.push('\n');
        out
    }
}

/// Result of parsing IOB text: the documents and the lines that were skipped.
#[derive(Debug, Clone, Default)]
pub struct IobParse {
    pub documents: Vec<TaggedDocument>,
    pub issues: Vec<Issue>,
}

/// Parses IOB text where blank lines separate documents. Documents get ids
/// `<id_prefix>_<n>` (1-based) unless there is only one, which keeps
/// `id_prefix` as is.
///
/// Lines that do not have exactly two whitespace-separated fields, or whose
/// tag is not a valid BIO tag, are skipped and reported as `MalformedRecord`
/// with their 1-based line number.
pub fn parse_iob(input: &str, id_prefix: &str) -> IobParse {
    let mut blocks: Vec<Vec<(String, Tag)>> = Vec::new();
    let mut current: Vec<(String, Tag)> = Vec::new();
    let mut issues = Vec::new();

    for (i, line) in input.lines().enumerate() {
        if line.trim().is_empty() {
            if !current.is_empty() {
                blocks.push(std::mem::take(&mut current));
            }
            continue;
        }
        let parts: Vec<&str> = line.split_whitespace().collect();
        if parts.len() != 2 {
            issues.push(
                Issue::new(
                    IssueKind::MalformedRecord,
                    format!("Expected 'token<TAB>TAG', found {} field(s).", parts.len()),
                )
                .at_line(i + 1),
            );
            continue;
        }
        match Tag::from_label(parts[1]) {
            Some(tag) => current.push((parts[0].to_string(), tag)),
            None => issues.push(
                Issue::new(IssueKind::MalformedRecord, format!("Invalid tag '{}'.", parts[1]))
                    .at_line(i + 1),
            ),
        }
    }
    if !current.is_empty() {
        blocks.push(current);
    }

    let single = blocks.len() == 1;
    let documents = blocks
        .into_iter()
        .enumerate()
        .map(|(n, pairs)| {
            let id = if single {
                id_prefix.to_string()
            } else {
                format!("{}_{}", id_prefix, n + 1)
            };
            TaggedDocument::from_pairs(id, pairs)
        })
        .collect();

    IobParse { documents, issues }
}

/// Parses an IOB file holding a single document; blank lines inside the file
/// are treated as sentence breaks and the blocks are concatenated.
pub fn parse_iob_document(input: &str, id: &str) -> (TaggedDocument, Vec<Issue>) {
    let IobParse { documents, issues } = parse_iob(input, id);
    let tokens = documents.into_iter().flat_map(|d| d.tokens).map(|tt| (tt.token.text, tt.tag));
    (TaggedDocument::from_pairs(id, tokens), issues)
}

/// Serializes several documents into one IOB text.
pub fn write_iob(documents: &[TaggedDocument]) -> String {
    documents.iter().map(TaggedDocument::to_iob).collect()
}

/// Parses canonical JSON-Lines back into documents. Lines that fail to parse
/// are reported as `MalformedRecord`.
pub fn parse_canonical_jsonl(input: &str, id_prefix: &str) -> (Vec<Document>, Vec<Issue>) {
    let mut docs = Vec::new();
    let mut issues = Vec::new();
    for (i, line) in input.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<Document>(line) {
            Ok(mut doc) => {
                if doc.id.is_empty() {
                    doc.id = format!("{}_{:05}", id_prefix, i + 1);
                }
                docs.push(doc);
            }
            Err(e) => issues.push(
                Issue::new(IssueKind::MalformedRecord, format!("Invalid canonical record: {}.", e))
                    .at_line(i + 1),
            ),
        }
    }
    (docs, issues)
}

/// Groups the tokens of a document by entity category, in document order.
/// Useful for inspecting what an IOB file actually annotates.
pub fn entity_surfaces(doc: &TaggedDocument) -> BTreeMap<EntityCategory, Vec<String>> {
    let mut out: BTreeMap<EntityCategory, Vec<String>> = BTreeMap::new();
    let text = doc.text();
    for span in tokens_to_spans(&doc.tokens) {
        if let Some(surface) = slice_chars(&text, span.start, span.end) {
            out.entry(span.label).or_default().push(surface.to_string());
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Document {
        Document::new(
            "neda",
            "NEDA issued PD 1468.",
            vec![
                EntitySpan::new(0, 4, EntityCategory::Institution),
                EntitySpan::new(12, 19, EntityCategory::Statute),
            ],
        )
    }

    #[test]
    fn test_document_tag_and_iob() {
        let (tagged, issues) = sample().tag();
        assert!(issues.is_empty());
        assert_eq!(
            tagged.to_iob(),
            "NEDA\tB-INS\nissued\tO\nPD\tB-STA\n1468\tI-STA\n.\tO\n\n"
        );
    }

    #[test]
    fn test_span_text() {
        let doc = sample();
        assert_eq!(doc.span_text(&doc.entities[1]), Some("PD 1468"));
    }

    #[test]
    fn test_canonical_json_line() {
        let line = sample().to_json_line().unwrap();
        assert_eq!(
            line,
            r#"{"text":"NEDA issued PD 1468.","entities":[{"start":0,"end":4,"label":"INS"},{"start":12,"end":19,"label":"STA"}]}"#
        );
        let (docs, issues) = parse_canonical_jsonl(&line, "x");
        assert!(issues.is_empty());
        assert_eq!(docs[0].entities, sample().entities);
        assert_eq!(docs[0].id, "x_00001");
    }

    #[test]
    fn test_parse_iob_multiple_documents_and_bad_lines() {
        let input = "NEDA\tB-INS\nissued\tO\n\nRA\tB-RA\n3019\tI-RA\nbroken line here\nfoo\tB-LOC\n";
        let parsed = parse_iob(input, "batch");
        assert_eq!(parsed.documents.len(), 2);
        assert_eq!(parsed.documents[0].id, "batch_1");
        assert_eq!(parsed.documents[1].words(), ["RA", "3019"]);
        let lines: Vec<Option<usize>> = parsed.issues.iter().map(|i| i.line).collect();
        assert_eq!(lines, [Some(6), Some(7)]);
    }

    #[test]
    fn test_parse_iob_document_merges_sentences() {
        let (doc, issues) = parse_iob_document("A\tO\n\nB\tB-PERSON\n", "doc");
        assert!(issues.is_empty());
        assert_eq!(doc.id, "doc");
        assert_eq!(doc.words(), ["A", "B"]);
        assert_eq!(doc.tokens[1].token.start, 2);
    }

    #[test]
    fn test_to_document_rebuilds_spans() {
        let doc = TaggedDocument::from_pairs(
            "d",
            [
                ("Republic", Tag::Begin(EntityCategory::RepublicAct)),
                ("Act", Tag::Inside(EntityCategory::RepublicAct)),
                ("applies", Tag::Outside),
            ],
        );
        let canonical = doc.to_document();
        assert_eq!(canonical.text, "Republic Act applies");
        assert_eq!(canonical.entities, [EntitySpan::new(0, 12, EntityCategory::RepublicAct)]);
        assert_eq!(
            entity_surfaces(&doc).get(&EntityCategory::RepublicAct),
            Some(&vec!["Republic Act".to_string()])
        );
    }

    #[test]
    fn test_reflow_after_text_change() {
        let mut doc = TaggedDocument::from_pairs("d", [("NEDA", Tag::Outside), ("x", Tag::Outside)]);
        doc.tokens[0].token.text = "Commission".to_string();
        doc.reflow();
        assert_eq!((doc.tokens[1].token.start, doc.tokens[1].token.end), (11, 12));
    }
}
