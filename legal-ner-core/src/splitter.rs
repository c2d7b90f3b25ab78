//! # Corpus Splitter
//!
//! Partitions documents into train/eval/test so that each split gets its share
//! of documents *and* a balanced share of entities, while the rare category
//! (`CNS` by default) is guaranteed to appear in both train and eval.
//!
//! ## Algorithm
//!
//! 1. **Quotas.** `train = round(r_train·n)`, `eval = round(r_eval·n)` (clamped
//!    to `n - train`), `test` takes the remainder.
//! 2. **Order.** Documents are stably sorted by descending entity total.
//! 3. **Rare documents.** The first `floor(rare_train_fraction·n_rare)` go to
//!    train, the rest to eval. None go to test.
//! 4. **Greedy balance.** Every other document goes to the split, among those
//!    still under quota, whose entity total would be smallest after adding it.
//!    Ties go to train, then eval, then test.
//! 5. **Overflow.** When every split is full, the document goes to the
//!    least-full split and a `SplitQuotaExhausted` issue is recorded.
//!
//! No randomness: the same input always gives the same partition.
//!
//! | n  | ratios   | quotas (train/eval/test) |
//! |----|----------|--------------------------|
//! | 10 | 70/20/10 | 7 / 2 / 1                |
//! | 5  | 70/20/10 | 4 / 1 / 0                |
//! | 3  | 34/33/33 | 1 / 1 / 1                |

use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::counter::EntityCounts;
use crate::error::{Error, Result};
use crate::report::{Issue, IssueKind};
use crate::tagger::EntityCategory;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Split {
    Train,
    Eval,
    Test,
}

impl Split {
    /// Tie-break order.
    pub const ALL: [Split; 3] = [Split::Train, Split::Eval, Split::Test];

    /// Directory name under the output root.
    pub fn name(&self) -> &'static str {
        match self {
            Split::Train => "train",
            Split::Eval => "eval",
            Split::Test => "test",
        }
    }

    fn slot(&self) -> usize {
        match self {
            Split::Train => 0,
            Split::Eval => 1,
            Split::Test => 2,
        }
    }
}

impl fmt::Display for Split {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Split {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Split::ALL
            .into_iter()
            .find(|split| split.name() == s)
            .ok_or_else(|| Error::Config(format!("Unknown split '{}'", s)))
    }
}

/// Share of documents per split.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SplitRatios {
    pub train: f64,
    pub eval: f64,
    pub test: f64,
}

impl SplitRatios {
    /// Ratios must each lie in `[0, 1]` and sum to 1 (within 1e-6).
    pub fn new(train: f64, eval: f64, test: f64) -> Result<Self> {
        let ratios = Self { train, eval, test };
        ratios.validate()?;
        Ok(ratios)
    }

    pub fn validate(&self) -> Result<()> {
        for (name, r) in [("train", self.train), ("eval", self.eval), ("test", self.test)] {
            if !(0.0..=1.0).contains(&r) {
                return Err(Error::InvalidRatios(format!(
                    "{} ratio {} is outside [0, 1]",
                    name, r
                )));
            }
        }
        let sum = self.train + self.eval + self.test;
        if (sum - 1.0).abs() > 1e-6 {
            return Err(Error::InvalidRatios(format!(
                "ratios sum to {}, expected 1",
                sum
            )));
        }
        Ok(())
    }

    /// Document quotas for a corpus of `n` documents, in [`Split::ALL`] order.
    pub fn quotas(&self, n: usize) -> [usize; 3] {
        let train = ((self.train * n as f64).round() as usize).min(n);
        let eval = ((self.eval * n as f64).round() as usize).min(n - train);
        [train, eval, n - train - eval]
    }
}

impl Default for SplitRatios {
    fn default() -> Self {
        Self {
            train: 0.7,
            eval: 0.2,
            test: 0.1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SplitConfig {
    pub ratios: SplitRatios,
    /// Category kept out of test and spread over train and eval. `None`
    /// disables the special handling.
    pub rare: Option<EntityCategory>,
    /// Share of rare-bearing documents that go to train.
    pub rare_train_fraction: f64,
}

impl Default for SplitConfig {
    fn default() -> Self {
        Self {
            ratios: SplitRatios::default(),
            rare: Some(EntityCategory::Constitution),
            rare_train_fraction: 0.9,
        }
    }
}

/// A document placed in a split that was already full.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Overflow {
    pub document: String,
    pub split: Split,
}

/// Result of [`split_corpus`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SplitOutcome {
    pub assignment: BTreeMap<String, Split>,
    /// Members in assignment order: train, eval, test.
    pub members: [Vec<String>; 3],
    pub tallies: [EntityCounts; 3],
    pub quotas: [usize; 3],
    pub overflows: Vec<Overflow>,
    pub issues: Vec<Issue>,
}

impl SplitOutcome {
    pub fn members(&self, split: Split) -> &[String] {
        &self.members[split.slot()]
    }

    pub fn tally(&self, split: Split) -> &EntityCounts {
        &self.tallies[split.slot()]
    }

    pub fn quota(&self, split: Split) -> usize {
        self.quotas[split.slot()]
    }

    pub fn split_of(&self, id: &str) -> Option<Split> {
        self.assignment.get(id).copied()
    }

    /// One block per split: size, quota and entity counts.
    pub fn summary(&self) -> String {
        let mut out = String::new();
        for split in Split::ALL {
            out.push_str(&format!(
                "{} ({} files, quota {}):\n",
                split.name().to_uppercase(),
                self.members(split).len(),
                self.quota(split)
            ));
            for line in self.tally(split).summary().lines() {
                out.push_str("  ");
                out.push_str(line);
                out.push('\n');
            }
        }
        out
    }
}

struct State {
    quotas: [usize; 3],
    outcome: SplitOutcome,
}

impl State {
    fn size(&self, split: Split) -> usize {
        self.outcome.members[split.slot()].len()
    }

    fn place(&mut self, id: &str, counts: &EntityCounts, split: Split) {
        let slot = split.slot();
        self.outcome.members[slot].push(id.to_string());
        self.outcome.tallies[slot].add(counts);
        self.outcome.assignment.insert(id.to_string(), split);
        tracing::debug!("{} -> {} ({})", id, split, counts);
    }

    /// Under-quota split with the smallest projected total.
    fn best_under_quota(&self, counts: &EntityCounts) -> Option<Split> {
        let mut best: Option<(Split, usize)> = None;
        for split in Split::ALL {
            if self.size(split) >= self.quotas[split.slot()] {
                continue;
            }
            let projected = self.outcome.tallies[split.slot()].total() + counts.total();
            if best.map_or(true, |(_, b)| projected < b) {
                best = Some((split, projected));
            }
        }
        best.map(|(split, _)| split)
    }

    /// Split with the smallest `size - quota`.
    fn least_full(&self) -> Split {
        let mut best = Split::Train;
        let mut best_excess = i64::MAX;
        for split in Split::ALL {
            let excess = self.size(split) as i64 - self.quotas[split.slot()] as i64;
            if excess < best_excess {
                best = split;
                best_excess = excess;
            }
        }
        best
    }
}

/// Partitions `documents` (id and entity counts, in a deterministic order).
///
/// Fails on invalid ratios or rare train fraction, and when two documents
/// share an id.
pub fn split_corpus(documents: &[(String, EntityCounts)], config: &SplitConfig) -> Result<SplitOutcome> {
    config.ratios.validate()?;
    if !(0.0..=1.0).contains(&config.rare_train_fraction) {
        return Err(Error::InvalidRatios(format!(
            "rare train fraction {} is outside [0, 1]",
            config.rare_train_fraction
        )));
    }

    let mut seen = HashSet::with_capacity(documents.len());
    for (id, _) in documents {
        if !seen.insert(id.as_str()) {
            return Err(Error::DuplicateId(id.clone()));
        }
    }

    let n = documents.len();
    let quotas = config.ratios.quotas(n);
    let mut state = State {
        quotas,
        outcome: SplitOutcome {
            quotas,
            ..SplitOutcome::default()
        },
    };

    let mut ordered: Vec<&(String, EntityCounts)> = documents.iter().collect();
    ordered.sort_by(|a, b| b.1.total().cmp(&a.1.total()));

    let is_rare = |counts: &EntityCounts| config.rare.is_some_and(|rare| counts.get(rare) > 0);
    let (rare, common): (Vec<_>, Vec<_>) = ordered.into_iter().partition(|(_, c)| is_rare(c));

    let rare_train = (config.rare_train_fraction * rare.len() as f64).floor() as usize;
    for (i, (id, counts)) in rare.iter().enumerate() {
        let split = if i < rare_train { Split::Train } else { Split::Eval };
        state.place(id, counts, split);
    }
    if !rare.is_empty() {
        tracing::info!(
            "Placed {} rare-bearing document(s): {} train, {} eval",
            rare.len(),
            rare_train,
            rare.len() - rare_train
        );
    }

    for (id, counts) in common {
        let split = match state.best_under_quota(counts) {
            Some(split) => split,
            None => {
                let split = state.least_full();
                tracing::warn!("All split quotas are full; {} overflows into {}", id, split);
                state.outcome.overflows.push(Overflow {
                    document: id.clone(),
                    split,
                });
                state.outcome.issues.push(
                    Issue::new(
                        IssueKind::SplitQuotaExhausted,
                        format!("All quotas full; placed in {}.", split),
                    )
                    .for_document(id.clone()),
                );
                split
            }
        };
        state.place(id, counts, split);
    }

    tracing::info!(
        "Split {} document(s): train {}, eval {}, test {}",
        n,
        state.size(Split::Train),
        state.size(Split::Eval),
        state.size(Split::Test)
    );
    Ok(state.outcome)
}

#[cfg(test)]
mod tests {
    use super::*;
    use EntityCategory::*;

    fn doc(id: &str, cats: &[EntityCategory]) -> (String, EntityCounts) {
        (id.to_string(), cats.iter().copied().collect())
    }

    #[test]
    fn test_quotas() {
        let r = SplitRatios::default();
        assert_eq!(r.quotas(10), [7, 2, 1]);
        assert_eq!(r.quotas(5), [4, 1, 0]);
        assert_eq!(r.quotas(0), [0, 0, 0]);
        let even = SplitRatios::new(0.34, 0.33, 0.33).unwrap();
        assert_eq!(even.quotas(3), [1, 1, 1]);
    }

    #[test]
    fn test_invalid_ratios() {
        assert!(matches!(SplitRatios::new(0.5, 0.5, 0.5), Err(Error::InvalidRatios(_))));
        assert!(matches!(SplitRatios::new(1.2, -0.2, 0.0), Err(Error::InvalidRatios(_))));
        assert!(SplitRatios::new(0.7, 0.2, 0.1).is_ok());
    }

    #[test]
    fn test_single_rare_document_goes_to_eval() {
        let mut docs: Vec<_> = (0..9).map(|i| doc(&format!("d{}", i), &[Institution])).collect();
        docs.push(doc("rare", &[Constitution, Statute, Statute]));

        let outcome = split_corpus(&docs, &SplitConfig::default()).unwrap();
        assert_eq!(outcome.split_of("rare"), Some(Split::Eval));
        assert_eq!(outcome.members(Split::Train).len(), 7);
        assert_eq!(outcome.members(Split::Eval).len(), 2);
        assert_eq!(outcome.members(Split::Test).len(), 1);
        assert!(outcome.overflows.is_empty());
    }

    #[test]
    fn test_rare_documents_cover_train_and_eval() {
        let mut docs: Vec<_> = (0..8).map(|i| doc(&format!("d{}", i), &[Person])).collect();
        docs.push(doc("r1", &[Constitution]));
        docs.push(doc("r2", &[Constitution]));

        let outcome = split_corpus(&docs, &SplitConfig::default()).unwrap();
        assert_eq!(outcome.split_of("r1"), Some(Split::Train));
        assert_eq!(outcome.split_of("r2"), Some(Split::Eval));
        assert_eq!(outcome.tally(Split::Test).get(Constitution), 0);
    }

    #[test]
    fn test_rare_handling_can_be_disabled() {
        let docs = vec![doc("a", &[Constitution]), doc("b", &[])];
        let config = SplitConfig {
            ratios: SplitRatios::new(0.0, 0.0, 1.0).unwrap(),
            rare: None,
            ..SplitConfig::default()
        };
        let outcome = split_corpus(&docs, &config).unwrap();
        assert_eq!(outcome.split_of("a"), Some(Split::Test));
    }

    #[test]
    fn test_greedy_prefers_smallest_projected_total() {
        // Quotas 2/1/1. Sorted: big(3), mid(2), s1(1), s2(1).
        let docs = vec![
            doc("s1", &[Person]),
            doc("big", &[Person, Person, Person]),
            doc("s2", &[Person]),
            doc("mid", &[Person, Person]),
        ];
        let config = SplitConfig {
            ratios: SplitRatios::new(0.5, 0.25, 0.25).unwrap(),
            ..SplitConfig::default()
        };
        let outcome = split_corpus(&docs, &config).unwrap();
        // big -> train (tie, train first); mid -> eval (2 < 5, tie with test);
        // s1 -> test (1 < 3 and 4); s2 -> train (only split with room).
        assert_eq!(outcome.members(Split::Train), ["big", "s2"]);
        assert_eq!(outcome.members(Split::Eval), ["mid"]);
        assert_eq!(outcome.members(Split::Test), ["s1"]);
    }

    #[test]
    fn test_rare_documents_may_exceed_their_split_quota() {
        // Quotas 1/1/3; rare: floor(2.7) = 2 train, 1 eval. x, y -> test.
        let docs = vec![
            doc("r1", &[Constitution]),
            doc("r2", &[Constitution]),
            doc("r3", &[Constitution]),
            doc("x", &[Person]),
            doc("y", &[Person]),
        ];
        let config = SplitConfig {
            ratios: SplitRatios::new(0.2, 0.2, 0.6).unwrap(),
            ..SplitConfig::default()
        };
        let outcome = split_corpus(&docs, &config).unwrap();
        assert_eq!(outcome.members(Split::Train), ["r1", "r2"]);
        assert_eq!(outcome.members(Split::Eval), ["r3"]);
        assert_eq!(outcome.members(Split::Test), ["x", "y"]);
        assert!(outcome.overflows.is_empty());
    }

    #[test]
    fn test_least_full_split() {
        let mut state = State {
            quotas: [1, 1, 0],
            outcome: SplitOutcome::default(),
        };
        let empty = EntityCounts::new();
        state.place("a", &empty, Split::Train);
        state.place("b", &empty, Split::Eval);
        assert_eq!(state.best_under_quota(&empty), None);
        // All splits are at quota: tie resolves to train.
        assert_eq!(state.least_full(), Split::Train);

        state.place("c", &empty, Split::Train);
        assert_eq!(state.least_full(), Split::Eval);
    }

    #[test]
    fn test_duplicate_ids_are_rejected() {
        let docs = vec![
            doc("dec_00001", &[Institution]),
            doc("dec_00002", &[Person]),
            doc("dec_00001", &[Person]),
        ];
        let err = split_corpus(&docs, &SplitConfig::default()).unwrap_err();
        assert!(matches!(err, Error::DuplicateId(ref id) if id == "dec_00001"));
    }

    #[test]
    fn test_partition_is_complete_and_deterministic() {
        let docs: Vec<_> = (0..23)
            .map(|i| {
                let cats: Vec<EntityCategory> = EntityCategory::ALL
                    .into_iter()
                    .cycle()
                    .skip(i)
                    .take(i % 5)
                    .collect();
                doc(&format!("d{:02}", i), &cats)
            })
            .collect();
        let config = SplitConfig::default();
        let first = split_corpus(&docs, &config).unwrap();
        let second = split_corpus(&docs, &config).unwrap();
        assert_eq!(first.members, second.members);

        let placed: usize = Split::ALL.iter().map(|s| first.members(*s).len()).sum();
        assert_eq!(placed, docs.len());
        assert_eq!(first.assignment.len(), docs.len());
        let total: usize = first.tallies.iter().map(EntityCounts::total).sum();
        let expected: usize = docs.iter().map(|(_, c)| c.total()).sum();
        assert_eq!(total, expected);
    }
}
