//! # Entity Counter
//!
//! Counts entities per category in a tag sequence. Only `B-<TYPE>` tags are
//! counted, so a multi-token entity counts once.
//!
//! Counting is tolerant: a tag string that is not a valid BIO tag (`B-ins`,
//! `X-PERSON`) or an IOB line without exactly two fields is skipped, never an
//! error. Tags are case-sensitive.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::corpus::TaggedDocument;
use crate::tagger::{EntityCategory, Tag};

/// Entity counts per category. Missing categories count as zero.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityCounts {
    counts: BTreeMap<EntityCategory, usize>,
}

impl EntityCounts {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, category: EntityCategory) -> usize {
        self.counts.get(&category).copied().unwrap_or(0)
    }

    pub fn increment(&mut self, category: EntityCategory) {
        *self.counts.entry(category).or_insert(0) += 1;
    }

    /// Sum over all categories.
    pub fn total(&self) -> usize {
        self.counts.values().sum()
    }

    /// Merges `other` into `self`.
    pub fn add(&mut self, other: &EntityCounts) {
        for (&category, &n) in &other.counts {
            *self.counts.entry(category).or_insert(0) += n;
        }
    }

    /// Non-zero counts in category order.
    pub fn iter(&self) -> impl Iterator<Item = (EntityCategory, usize)> + '_ {
        self.counts
            .iter()
            .filter(|(_, &n)| n > 0)
            .map(|(&c, &n)| (c, n))
    }

    pub fn is_empty(&self) -> bool {
        self.total() == 0
    }

    /// One row per category (including zeros) and a total row.
    pub fn summary(&self) -> String {
        let mut out = String::new();
        for category in EntityCategory::ALL {
            out.push_str(&format!("{:<10} {:>6}\n", category.code(), self.get(category)));
        }
        out.push_str(&format!("{:<10} {:>6}\n", "TOTAL", self.total()));
        out
    }
}

impl fmt::Display for EntityCounts {
    /// Compact form: `INS=3 STA=1`.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.iter().map(|(c, n)| format!("{}={}", c, n)).collect();
        if parts.is_empty() {
            f.write_str("(none)")
        } else {
            f.write_str(&parts.join(" "))
        }
    }
}

impl FromIterator<EntityCategory> for EntityCounts {
    fn from_iter<I: IntoIterator<Item = EntityCategory>>(iter: I) -> Self {
        let mut counts = EntityCounts::new();
        for category in iter {
            counts.increment(category);
        }
        counts
    }
}

pub fn count_tags<'a>(tags: impl IntoIterator<Item = &'a Tag>) -> EntityCounts {
    tags.into_iter()
        .filter_map(|tag| match tag {
            Tag::Begin(category) => Some(*category),
            _ => None,
        })
        .collect()
}

/// Counts tag strings, skipping anything that is not a valid BIO tag.
pub fn count_tag_strings<'a>(tags: impl IntoIterator<Item = &'a str>) -> EntityCounts {
    tags.into_iter()
        .filter_map(|label| match Tag::from_label(label) {
            Some(Tag::Begin(category)) => Some(category),
            _ => None,
        })
        .collect()
}

pub fn count_document(doc: &TaggedDocument) -> EntityCounts {
    count_tags(doc.tokens.iter().map(|tt| &tt.tag))
}

/// Counts a serialized IOB text directly, without building documents.
pub fn count_iob(input: &str) -> EntityCounts {
    count_tag_strings(input.lines().filter_map(|line| {
        let mut fields = line.split_whitespace();
        match (fields.next(), fields.next(), fields.next()) {
            (Some(_), Some(tag), None) => Some(tag),
            _ => None,
        }
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use EntityCategory::*;

    #[test]
    fn test_counts_begin_only() {
        let tags = [
            Tag::Begin(Institution),
            Tag::Inside(Institution),
            Tag::Outside,
            Tag::Begin(Statute),
            Tag::Inside(Statute),
            Tag::Begin(Institution),
        ];
        let counts = count_tags(&tags);
        assert_eq!(counts.get(Institution), 2);
        assert_eq!(counts.get(Statute), 1);
        assert_eq!(counts.get(Person), 0);
        assert_eq!(counts.total(), 3);
    }

    #[test]
    fn test_unrecognized_strings_are_skipped() {
        let counts = count_tag_strings(["B-ins", "X-PERSON", "B-PERSON", "I-PERSON", "", "B-"]);
        assert_eq!(counts.total(), 1);
        assert_eq!(counts.get(Person), 1);
    }

    #[test]
    fn test_count_iob_tolerates_bad_lines() {
        let iob = "Juan\tB-PERSON\nCruz\tI-PERSON\n\nbroken\nthree fields here\nCOA\tB-INS\nx\tb-INS\n";
        let counts = count_iob(iob);
        assert_eq!(counts.get(Person), 1);
        assert_eq!(counts.get(Institution), 1);
        assert_eq!(counts.total(), 2);
    }

    #[test]
    fn test_add_and_display() {
        let mut a: EntityCounts = [RepublicAct, RepublicAct].into_iter().collect();
        let b: EntityCounts = [Constitution].into_iter().collect();
        a.add(&b);
        assert_eq!(a.total(), 3);
        assert_eq!(a.to_string(), "CNS=1 RA=2");
        assert_eq!(EntityCounts::new().to_string(), "(none)");
    }

    #[test]
    fn test_summary_lists_every_category() {
        let summary = EntityCounts::new().summary();
        for category in EntityCategory::ALL {
            assert!(summary.contains(category.code()));
        }
        assert!(summary.contains("TOTAL"));
    }
}
