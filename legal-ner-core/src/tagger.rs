//! # BIO Tag Scheme and IOB Tag Assigner
//!
//! Defines the entity categories annotated in Philippine Supreme Court
//! decisions, the **BIO** (Beginning-Inside-Outside) tags built on them, and
//! the assigner that turns character-offset spans into one tag per token.
//!
//! ## Entity Categories
//!
//! | Code        | Meaning            | Examples                                  |
//! |-------------|--------------------|-------------------------------------------|
//! | `INS`       | Institution        | Commission on Audit, NEDA, RTC            |
//! | `CNS`       | Constitution       | Section 1, Article VIII of the Constitution |
//! | `STA`       | Statute            | PD 1468, Civil Code                       |
//! | `RA`        | Republic Act       | Republic Act No. 3019                     |
//! | `PROM_DATE` | Promulgation date  | October 03, 2023                          |
//! | `CASE_NUM`  | Case number        | G.R. No. 261280                           |
//! | `PERSON`    | Person             | Michelle P. Dela Calzada                  |
//!
//! ## BIO Scheme
//!
//! - `B-TYPE`: first token of an entity
//! - `I-TYPE`: following tokens of the same entity
//! - `O`: not part of any entity
//!
//! ## Assignment Rules
//!
//! 1. Every token starts as `O`.
//! 2. Spans are applied **in input order**. A token is tagged by a span only
//!    when it lies wholly inside it: `span.start <= token.start` and
//!    `token.end <= span.end`. A token straddling a span boundary is left
//!    alone.
//! 3. The first covered token gets `B-` when it starts exactly at the span
//!    start, every other covered token gets `I-`.
//! 4. **Last write wins**: a later span overwrites the tags of tokens it also
//!    covers.
//! 5. Overwrites (and spans whose start falls inside a token) can leave an
//!    `I-X` that does not follow `B-X`/`I-X`. Those are promoted to `B-X` by
//!    [`repair_dangling`], so the assigner never emits a dangling inside tag.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::corpus::EntitySpan;
use crate::error::{Error, Result};
use crate::report::{Issue, IssueKind};
use crate::tokenizer::Token;

/// Closed set of entity categories.
///
/// The declaration order is the order of the model's label map and of every
/// report table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum EntityCategory {
    #[serde(rename = "INS")]
    Institution,
    /// The rare class of this corpus.
    #[serde(rename = "CNS")]
    Constitution,
    #[serde(rename = "STA")]
    Statute,
    #[serde(rename = "RA")]
    RepublicAct,
    #[serde(rename = "PROM_DATE")]
    PromulgationDate,
    #[serde(rename = "CASE_NUM")]
    CaseNumber,
    #[serde(rename = "PERSON")]
    Person,
}

impl EntityCategory {
    pub const ALL: [EntityCategory; 7] = [
        EntityCategory::Institution,
        EntityCategory::Constitution,
        EntityCategory::Statute,
        EntityCategory::RepublicAct,
        EntityCategory::PromulgationDate,
        EntityCategory::CaseNumber,
        EntityCategory::Person,
    ];

    /// Annotation code (ex: "INS", "CASE_NUM").
    pub fn code(&self) -> &'static str {
        match self {
            EntityCategory::Institution => "INS",
            EntityCategory::Constitution => "CNS",
            EntityCategory::Statute => "STA",
            EntityCategory::RepublicAct => "RA",
            EntityCategory::PromulgationDate => "PROM_DATE",
            EntityCategory::CaseNumber => "CASE_NUM",
            EntityCategory::Person => "PERSON",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            EntityCategory::Institution => "institution",
            EntityCategory::Constitution => "constitution",
            EntityCategory::Statute => "statute",
            EntityCategory::RepublicAct => "republic act",
            EntityCategory::PromulgationDate => "promulgation date",
            EntityCategory::CaseNumber => "case number",
            EntityCategory::Person => "person",
        }
    }

    /// Position in [`EntityCategory::ALL`].
    pub fn ordinal(&self) -> usize {
        match self {
            EntityCategory::Institution => 0,
            EntityCategory::Constitution => 1,
            EntityCategory::Statute => 2,
            EntityCategory::RepublicAct => 3,
            EntityCategory::PromulgationDate => 4,
            EntityCategory::CaseNumber => 5,
            EntityCategory::Person => 6,
        }
    }

    /// Case-sensitive lookup by code; `None` for anything outside the set.
    pub fn from_code(code: &str) -> Option<Self> {
        EntityCategory::ALL.into_iter().find(|c| c.code() == code)
    }
}

impl FromStr for EntityCategory {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        EntityCategory::from_code(s).ok_or_else(|| Error::UnknownLabel(s.to_string()))
    }
}

impl fmt::Display for EntityCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// BIO tag applied to a token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Tag {
    /// **Begin**: first token of an entity. Ex: **Republic** (B-RA) Act No. 3019.
    Begin(EntityCategory),
    /// **Inside**: continuation of an entity. Ex: Republic **Act** (I-RA).
    Inside(EntityCategory),
    /// **Outside**: not part of an entity.
    Outside,
}

impl Tag {
    /// Number of distinct tags: `O` plus a `B-`/`I-` pair per category.
    pub const COUNT: usize = 1 + 2 * EntityCategory::ALL.len();

    /// Textual form (ex: "B-PERSON", "I-INS", "O").
    pub fn label(&self) -> String {
        match self {
            Tag::Begin(cat) => format!("B-{}", cat.code()),
            Tag::Inside(cat) => format!("I-{}", cat.code()),
            Tag::Outside => "O".to_string(),
        }
    }

    /// Numeric id used as the external model's label map: `O` is 0, then
    /// `B-`/`I-` pairs in category order.
    pub fn index(&self) -> usize {
        match self {
            Tag::Outside => 0,
            Tag::Begin(cat) => 1 + 2 * cat.ordinal(),
            Tag::Inside(cat) => 2 + 2 * cat.ordinal(),
        }
    }

    pub fn from_index(index: usize) -> Option<Self> {
        match index {
            0 => Some(Tag::Outside),
            i if i < Tag::COUNT => {
                let cat = EntityCategory::ALL[(i - 1) / 2];
                if i % 2 == 1 {
                    Some(Tag::Begin(cat))
                } else {
                    Some(Tag::Inside(cat))
                }
            }
            _ => None,
        }
    }

    /// All tags ordered by index.
    pub fn all() -> Vec<Tag> {
        (0..Tag::COUNT).filter_map(Tag::from_index).collect()
    }

    pub fn category(&self) -> Option<EntityCategory> {
        match self {
            Tag::Begin(c) | Tag::Inside(c) => Some(*c),
            Tag::Outside => None,
        }
    }

    pub fn is_entity(&self) -> bool {
        !matches!(self, Tag::Outside)
    }

    /// Whether `prev → next` is legal in BIO.
    ///
    /// - `I-X` may only follow `B-X` or `I-X`
    /// - `B-X` and `O` may follow anything
    pub fn is_valid_transition(prev: Option<&Tag>, next: &Tag) -> bool {
        match next {
            Tag::Inside(cat) => match prev {
                Some(Tag::Begin(prev_cat)) | Some(Tag::Inside(prev_cat)) => prev_cat == cat,
                _ => false,
            },
            _ => true,
        }
    }

    /// Parses "O", "B-<CODE>" or "I-<CODE>". Codes are case-sensitive.
    pub fn from_label(s: &str) -> Option<Self> {
        if s == "O" {
            return Some(Tag::Outside);
        }
        let (prefix, code) = s.split_once('-')?;
        let cat = EntityCategory::from_code(code)?;
        match prefix {
            "B" => Some(Tag::Begin(cat)),
            "I" => Some(Tag::Inside(cat)),
            _ => None,
        }
    }
}

impl FromStr for Tag {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Tag::from_label(s).ok_or_else(|| Error::InvalidTag(s.to_string()))
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.label())
    }
}

impl Serialize for Tag {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.label())
    }
}

impl<'de> Deserialize<'de> for Tag {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Tag::from_label(&s).ok_or_else(|| serde::de::Error::custom(format!("invalid tag '{}'", s)))
    }
}

/// A token with its BIO tag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaggedToken {
    pub token: Token,
    pub tag: Tag,
}

/// Output of [`assign_tags`]: one tag per token plus what went wrong.
#[derive(Debug, Clone, Default)]
pub struct Assignment {
    pub tags: Vec<Tag>,
    /// `UncoveredSpan` warnings and `TagInconsistency` repairs.
    pub issues: Vec<Issue>,
}

/// Assigns BIO tags to `tokens` from character spans. See the module docs for
/// the rules.
pub fn assign_tags(tokens: &[Token], spans: &[EntitySpan]) -> Assignment {
    let mut tags = vec![Tag::Outside; tokens.len()];
    let mut issues = Vec::new();

    for span in spans {
        let mut covered = 0usize;
        for (i, token) in tokens.iter().enumerate() {
            if token.start >= span.start && token.end <= span.end {
                tags[i] = if token.start == span.start {
                    Tag::Begin(span.label)
                } else {
                    Tag::Inside(span.label)
                };
                covered += 1;
            }
        }
        if covered == 0 {
            tracing::warn!(
                "Span [{}, {}) {} covers no whole token; left untagged",
                span.start,
                span.end,
                span.label
            );
            issues.push(Issue::new(
                IssueKind::UncoveredSpan,
                format!(
                    "Span [{}, {}, \"{}\"] covers no whole token.",
                    span.start, span.end, span.label
                ),
            ));
        }
    }

    for i in repair_dangling(&mut tags) {
        tracing::debug!("Promoted dangling {} at token {}", tags[i].label(), i);
        issues.push(Issue::new(
            IssueKind::TagInconsistency,
            format!(
                "Dangling inside tag at token {} ('{}') promoted to {}.",
                i, tokens[i].text, tags[i]
            ),
        ));
    }

    Assignment { tags, issues }
}

/// Tags `tokens` and pairs each token with its tag.
pub fn tag_tokens(tokens: Vec<Token>, spans: &[EntitySpan]) -> (Vec<TaggedToken>, Vec<Issue>) {
    let Assignment { tags, issues } = assign_tags(&tokens, spans);
    let tagged = tokens
        .into_iter()
        .zip(tags)
        .map(|(token, tag)| TaggedToken { token, tag })
        .collect();
    (tagged, issues)
}

/// Positions of `I-X` tags not preceded by `B-X`/`I-X`.
pub fn find_dangling(tags: &[Tag]) -> Vec<usize> {
    let mut prev: Option<&Tag> = None;
    let mut dangling = Vec::new();
    for (i, tag) in tags.iter().enumerate() {
        if !Tag::is_valid_transition(prev, tag) {
            dangling.push(i);
        }
        prev = Some(tag);
    }
    dangling
}

/// Promotes every dangling `I-X` to `B-X`, left to right, and returns the
/// positions that changed. A promoted tag starts a new entity, so the tokens
/// after it are checked against the repaired sequence.
pub fn repair_dangling(tags: &mut [Tag]) -> Vec<usize> {
    let mut repaired = Vec::new();
    for i in 0..tags.len() {
        let prev = if i == 0 { None } else { Some(&tags[i - 1]) };
        if let Tag::Inside(cat) = tags[i] {
            if !Tag::is_valid_transition(prev, &tags[i]) {
                tags[i] = Tag::Begin(cat);
                repaired.push(i);
            }
        }
    }
    repaired
}

/// Rebuilds character spans from tagged tokens.
///
/// - `B-X` opens an entity
/// - `I-X` extends the open entity of the same category
/// - `O`, `B-Y` or a mismatching `I-Y` closes it (a dangling `I-Y` opens a
///   new entity, the same reading [`repair_dangling`] applies)
pub fn tokens_to_spans(tagged: &[TaggedToken]) -> Vec<EntitySpan> {
    let mut spans = Vec::new();
    let mut open: Option<EntitySpan> = None;

    for tt in tagged {
        match tt.tag {
            Tag::Inside(cat) if open.as_ref().is_some_and(|s| s.label == cat) => {
                if let Some(span) = open.as_mut() {
                    span.end = tt.token.end;
                }
            }
            Tag::Begin(cat) | Tag::Inside(cat) => {
                spans.extend(open.take());
                open = Some(EntitySpan::new(tt.token.start, tt.token.end, cat));
            }
            Tag::Outside => spans.extend(open.take()),
        }
    }
    spans.extend(open);
    spans
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tokenizer::tokenize;

    fn labels(tags: &[Tag]) -> Vec<String> {
        tags.iter().map(Tag::label).collect()
    }

    fn span(start: usize, end: usize, cat: EntityCategory) -> EntitySpan {
        EntitySpan::new(start, end, cat)
    }

    #[test]
    fn test_tag_labels() {
        assert_eq!(Tag::Outside.label(), "O");
        assert_eq!(Tag::Begin(EntityCategory::Person).label(), "B-PERSON");
        assert_eq!(Tag::Inside(EntityCategory::CaseNumber).label(), "I-CASE_NUM");
    }

    #[test]
    fn test_tag_from_label_is_case_sensitive() {
        assert_eq!(Tag::from_label("B-INS"), Some(Tag::Begin(EntityCategory::Institution)));
        assert_eq!(Tag::from_label("I-PROM_DATE"), Some(Tag::Inside(EntityCategory::PromulgationDate)));
        assert_eq!(Tag::from_label("B-ins"), None);
        assert_eq!(Tag::from_label("X-INS"), None);
        assert_eq!(Tag::from_label("B-"), None);
        assert!("B-LOC".parse::<Tag>().is_err());
    }

    #[test]
    fn test_unknown_label_is_named_error() {
        let err = "LOC".parse::<EntityCategory>().unwrap_err();
        assert!(matches!(err, Error::UnknownLabel(ref l) if l == "LOC"));
    }

    #[test]
    fn test_all_tags_have_unique_indices() {
        let all = Tag::all();
        assert_eq!(all.len(), Tag::COUNT);
        for (i, tag) in all.iter().enumerate() {
            assert_eq!(tag.index(), i);
            assert_eq!(Tag::from_index(i), Some(*tag));
        }
        assert_eq!(Tag::from_index(Tag::COUNT), None);
    }

    #[test]
    fn test_valid_transitions() {
        let b_per = Tag::Begin(EntityCategory::Person);
        let i_per = Tag::Inside(EntityCategory::Person);
        assert!(Tag::is_valid_transition(Some(&b_per), &i_per));
        assert!(!Tag::is_valid_transition(Some(&Tag::Outside), &i_per));
        assert!(!Tag::is_valid_transition(None, &i_per));
        assert!(!Tag::is_valid_transition(
            Some(&Tag::Begin(EntityCategory::Institution)),
            &i_per
        ));
    }

    #[test]
    fn test_assign_example_sentence() {
        let tokens = tokenize("NEDA issued PD 1468.");
        let spans = [
            span(0, 4, EntityCategory::Institution),
            span(12, 19, EntityCategory::Statute),
        ];
        let out = assign_tags(&tokens, &spans);
        assert_eq!(labels(&out.tags), ["B-INS", "O", "B-STA", "I-STA", "O"]);
        assert!(out.issues.is_empty());
    }

    #[test]
    fn test_straddling_token_is_not_tagged() {
        // Span [1,5) lies inside the single token "Section" [0,7).
        let tokens = tokenize("Section 5 of RA");
        let out = assign_tags(&tokens, &[span(1, 5, EntityCategory::RepublicAct)]);
        assert!(out.tags.iter().all(|t| *t == Tag::Outside));
        assert_eq!(out.issues.len(), 1);
        assert_eq!(out.issues[0].kind, IssueKind::UncoveredSpan);
    }

    #[test]
    fn test_partial_overlap_keeps_only_contained_tokens() {
        // Span [6,10) covers "RA" [6,8) fully and cuts "10" [9,11).
        let tokens = tokenize("Under RA 10 today");
        let out = assign_tags(&tokens, &[span(6, 10, EntityCategory::RepublicAct)]);
        assert_eq!(labels(&out.tags), ["O", "B-RA", "O", "O"]);
    }

    #[test]
    fn test_last_span_wins_on_overlap() {
        // Tokens: "Juan" [0,4) "Cruz" [5,9) "Office" [10,16)
        let tokens = tokenize("Juan Cruz Office");
        let spans = [
            span(0, 16, EntityCategory::Institution),
            span(0, 9, EntityCategory::Person),
        ];
        let out = assign_tags(&tokens, &spans);
        // "Office" was I-INS after I-PERSON: promoted to B-INS.
        assert_eq!(labels(&out.tags), ["B-PERSON", "I-PERSON", "B-INS"]);
        assert_eq!(out.issues.len(), 1);
        assert_eq!(out.issues[0].kind, IssueKind::TagInconsistency);
    }

    #[test]
    fn test_span_starting_mid_token_yields_no_dangling_inside() {
        // Span [2,16) starts inside "Manila" but fully covers "City" and "Hall".
        let tokens = tokenize("Manila City Hall");
        let out = assign_tags(&tokens, &[span(2, 16, EntityCategory::Institution)]);
        assert_eq!(labels(&out.tags), ["O", "B-INS", "I-INS"]);
        assert!(find_dangling(&out.tags).is_empty());
    }

    #[test]
    fn test_repair_dangling_chain() {
        let per = EntityCategory::Person;
        let ins = EntityCategory::Institution;
        let mut tags = vec![
            Tag::Inside(per),
            Tag::Inside(per),
            Tag::Outside,
            Tag::Begin(ins),
            Tag::Inside(per),
        ];
        let repaired = repair_dangling(&mut tags);
        assert_eq!(repaired, [0, 4]);
        assert_eq!(labels(&tags), ["B-PERSON", "I-PERSON", "O", "B-INS", "B-PERSON"]);
        assert!(find_dangling(&tags).is_empty());
    }

    #[test]
    fn test_tokens_to_spans() {
        let tokens = tokenize("NEDA issued PD 1468.");
        let spans = [
            span(0, 4, EntityCategory::Institution),
            span(12, 19, EntityCategory::Statute),
        ];
        let (tagged, _) = tag_tokens(tokens, &spans);
        assert_eq!(tokens_to_spans(&tagged), spans);
    }
}
