//! # Augmentation Substitutor
//!
//! Creates extra training documents by swapping entity tokens for other
//! tokens observed with the same category elsewhere in the corpus. Tags are
//! never touched, so an augmented document has exactly the tag sequence of
//! its source.
//!
//! ```text
//! source:  Juan/B-PERSON  Cruz/I-PERSON  v./O  COMELEC/B-INS
//! round 1: Maria/B-PERSON Santos/I-PERSON v./O  NEDA/B-INS
//! ```
//!
//! Each round draws from its own `StdRng`, seeded from the base seed and the
//! round number, so any single round can be reproduced in isolation.
//!
//! Also here: [`is_augmented`] to recognize generated documents by id, and
//! [`strip_category`] / [`strip_category_iob`] to remove one category's
//! tokens from a document or from raw IOB text.

use std::collections::{BTreeMap, BTreeSet};

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};

use crate::corpus::TaggedDocument;
use crate::tagger::{EntityCategory, Tag};

/// Category → sorted distinct token strings seen with it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EntityBank {
    entries: BTreeMap<EntityCategory, Vec<String>>,
}

impl EntityBank {
    /// Collects entity tokens from `docs`, skipping `excluded` categories.
    pub fn build<'a>(
        docs: impl IntoIterator<Item = &'a TaggedDocument>,
        excluded: &[EntityCategory],
    ) -> Self {
        let mut sets: BTreeMap<EntityCategory, BTreeSet<String>> = BTreeMap::new();
        for doc in docs {
            for tt in &doc.tokens {
                if let Some(category) = tt.tag.category() {
                    if !excluded.contains(&category) {
                        sets.entry(category).or_default().insert(tt.token.text.clone());
                    }
                }
            }
        }
        let entries = sets
            .into_iter()
            .map(|(category, set)| (category, set.into_iter().collect()))
            .collect();
        Self { entries }
    }

    pub fn get(&self, category: EntityCategory) -> &[String] {
        self.entries.get(&category).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn categories(&self) -> impl Iterator<Item = EntityCategory> + '_ {
        self.entries.keys().copied()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.values().all(Vec::is_empty)
    }

    /// Token strings per category, for logging.
    pub fn sizes(&self) -> BTreeMap<EntityCategory, usize> {
        self.entries.iter().map(|(c, v)| (*c, v.len())).collect()
    }
}

/// Replaces every entity token whose category has bank entries with a
/// uniformly drawn entry. The id is left unchanged.
pub fn augment_document<R: Rng + ?Sized>(
    doc: &TaggedDocument,
    bank: &EntityBank,
    rng: &mut R,
) -> TaggedDocument {
    let mut out = doc.clone();
    for tt in &mut out.tokens {
        if let Some(category) = tt.tag.category() {
            if let Some(replacement) = bank.get(category).choose(rng) {
                tt.token.text = replacement.clone();
            }
        }
    }
    out.reflow();
    out
}

/// Seed for one round. Distinct rounds get well separated seeds even for
/// small base seeds.
pub fn round_seed(seed: u64, round: u32) -> u64 {
    seed ^ u64::from(round).wrapping_mul(0x9E37_79B9_7F4A_7C15)
}

/// Runs `rounds` augmentation rounds over `docs`, round by round. Output ids
/// are `<id>_aug<r>`.
pub fn augment_corpus(
    docs: &[TaggedDocument],
    bank: &EntityBank,
    rounds: u32,
    seed: u64,
) -> Vec<TaggedDocument> {
    let mut out = Vec::with_capacity(docs.len() * rounds as usize);
    for round in 1..=rounds {
        let mut rng = StdRng::seed_from_u64(round_seed(seed, round));
        for doc in docs {
            let mut augmented = augment_document(doc, bank, &mut rng);
            augmented.id = augmented_id(&doc.id, round);
            out.push(augmented);
        }
        tracing::debug!("Augmentation round {} produced {} document(s)", round, docs.len());
    }
    out
}

pub fn augmented_id(id: &str, round: u32) -> String {
    format!("{}_aug{}", id, round)
}

/// True when `name` (a document id or file stem) contains `_aug` followed by
/// at least one digit.
pub fn is_augmented(name: &str) -> bool {
    name.match_indices("_aug").any(|(i, m)| {
        name[i + m.len()..]
            .chars()
            .next()
            .is_some_and(|c| c.is_ascii_digit())
    })
}

/// Removes every `B-X`/`I-X` token of `category` and returns how many were
/// removed. Offsets are recomputed.
pub fn strip_category(doc: &mut TaggedDocument, category: EntityCategory) -> usize {
    let before = doc.tokens.len();
    doc.tokens.retain(|tt| match tt.tag {
        Tag::Begin(c) | Tag::Inside(c) => c != category,
        Tag::Outside => true,
    });
    let removed = before - doc.tokens.len();
    if removed > 0 {
        doc.reflow();
    }
    removed
}

/// Line-level variant of [`strip_category`] for IOB text. Drops the
/// `token<TAB>B-X`/`I-X` lines of `category` and keeps every other line
/// verbatim, including blank sentence breaks and lines that do not parse.
/// Returns the new text and the number of lines dropped.
pub fn strip_category_iob(input: &str, category: EntityCategory) -> (String, usize) {
    let mut out = String::with_capacity(input.len());
    let mut removed = 0;
    for line in input.split_inclusive('\n') {
        let mut fields = line.split_whitespace();
        let tag = match (fields.next(), fields.next(), fields.next()) {
            (Some(_), Some(tag), None) => Tag::from_label(tag),
            _ => None,
        };
        if tag.and_then(|t| t.category()) == Some(category) {
            removed += 1;
        } else {
            out.push_str(line);
        }
    }
    (out, removed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use EntityCategory::*;

    fn sample() -> Vec<TaggedDocument> {
        vec![
            TaggedDocument::from_pairs(
                "a",
                [
                    ("Juan", Tag::Begin(Person)),
                    ("Cruz", Tag::Inside(Person)),
                    ("v.", Tag::Outside),
                    ("COMELEC", Tag::Begin(Institution)),
                    ("Constitution", Tag::Begin(Constitution)),
                ],
            ),
            TaggedDocument::from_pairs(
                "b",
                [
                    ("Maria", Tag::Begin(Person)),
                    ("Santos", Tag::Inside(Person)),
                    ("and", Tag::Outside),
                    ("NEDA", Tag::Begin(Institution)),
                ],
            ),
        ]
    }

    #[test]
    fn test_bank_is_sorted_and_excludes_rare() {
        let docs = sample();
        let bank = EntityBank::build(&docs, &[Constitution]);
        assert_eq!(bank.get(Person), ["Cruz", "Juan", "Maria", "Santos"]);
        assert_eq!(bank.get(Institution), ["COMELEC", "NEDA"]);
        assert!(bank.get(Constitution).is_empty());
        assert!(bank.categories().all(|c| c != Constitution));
    }

    #[test]
    fn test_tags_are_preserved() {
        let docs = sample();
        let bank = EntityBank::build(&docs, &[Constitution]);
        let augmented = augment_corpus(&docs, &bank, 3, 7);
        assert_eq!(augmented.len(), 6);
        for (i, aug) in augmented.iter().enumerate() {
            let source = &docs[i % docs.len()];
            assert_eq!(aug.tags(), source.tags());
            assert_eq!(aug.len(), source.len());
        }
    }

    #[test]
    fn test_outside_and_excluded_tokens_are_untouched() {
        let docs = sample();
        let bank = EntityBank::build(&docs, &[Constitution]);
        let mut rng = StdRng::seed_from_u64(1);
        let aug = augment_document(&docs[0], &bank, &mut rng);
        assert_eq!(aug.tokens[2].token.text, "v.");
        assert_eq!(aug.tokens[4].token.text, "Constitution");
        assert!(bank.get(Person).contains(&aug.tokens[0].token.text));
    }

    #[test]
    fn test_fixed_seed_is_reproducible() {
        let docs = sample();
        let bank = EntityBank::build(&docs, &[Constitution]);
        let first = augment_corpus(&docs, &bank, 2, 42);
        let second = augment_corpus(&docs, &bank, 2, 42);
        assert_eq!(first, second);

        // A round depends only on (seed, round).
        let only_round_one = augment_corpus(&docs, &bank, 1, 42);
        assert_eq!(&first[..2], only_round_one.as_slice());
    }

    #[test]
    fn test_augmented_ids() {
        let docs = sample();
        let bank = EntityBank::build(&docs, &[]);
        let ids: Vec<String> = augment_corpus(&docs, &bank, 2, 0)
            .into_iter()
            .map(|d| d.id)
            .collect();
        assert_eq!(ids, ["a_aug1", "b_aug1", "a_aug2", "b_aug2"]);
        assert!(ids.iter().all(|id| is_augmented(id)));
    }

    #[test]
    fn test_is_augmented() {
        assert!(is_augmented("decision_00003_aug2"));
        assert!(is_augmented("x_aug10.iob"));
        assert!(!is_augmented("decision_00003"));
        assert!(!is_augmented("august_term"));
        assert!(!is_augmented("x_aug"));
    }

    #[test]
    fn test_strip_category() {
        let mut doc = sample().remove(0);
        let removed = strip_category(&mut doc, Constitution);
        assert_eq!(removed, 1);
        assert_eq!(doc.text(), "Juan Cruz v. COMELEC");
        assert!(doc.tags().iter().all(|t| t.category() != Some(Constitution)));
        assert_eq!(strip_category(&mut doc, Constitution), 0);
    }

    #[test]
    fn test_strip_category_iob_keeps_other_lines() {
        let input = "Article\tB-CNS\nIII\tI-CNS\nof\tO\n\nCOA\tB-INS\nParis\tB-LOC\nodd line here\n\n";
        let (out, removed) = strip_category_iob(input, Constitution);
        assert_eq!(removed, 2);
        assert_eq!(out, "of\tO\n\nCOA\tB-INS\nParis\tB-LOC\nodd line here\n\n");

        let (same, none) = strip_category_iob(&out, Constitution);
        assert_eq!((same.as_str(), none), (out.as_str(), 0));
    }
}
