//! # Token-level Confusion
//!
//! Compares gold and predicted tag sequences token by token and tallies, for
//! every gold entity category, which category the model predicted instead.
//!
//! - **Rows**: gold category. Tokens whose gold tag is `O` are ignored.
//! - **Columns**: predicted category, or `Missed` when the prediction is `O`.
//! - The `B-`/`I-` prefix is ignored on both sides.
//!
//! ```text
//!            INS    STA  ...  Missed
//! INS       92.0    1.5  ...     4.0
//! STA        0.8   88.1  ...     9.2
//! ```
//!
//! Percentages are row-normalized over the visible columns. Excluding a
//! category (usually `CNS`) hides its row and its column.

use std::collections::BTreeMap;
use std::fmt;

use crate::corpus::TaggedDocument;
use crate::error::{Error, Result};
use crate::tagger::{EntityCategory, Tag};

/// A confusion-matrix column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Predicted {
    Category(EntityCategory),
    Missed,
}

impl fmt::Display for Predicted {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Predicted::Category(c) => f.write_str(c.code()),
            Predicted::Missed => f.write_str("Missed"),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfusionMatrix {
    counts: BTreeMap<EntityCategory, BTreeMap<Predicted, usize>>,
    excluded: Vec<EntityCategory>,
}

impl ConfusionMatrix {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds one document's sequences. Both must have the same length.
    pub fn add_sequence(&mut self, id: &str, gold: &[Tag], predicted: &[Tag]) -> Result<()> {
        if gold.len() != predicted.len() {
            return Err(Error::LengthMismatch {
                id: id.to_string(),
                expected: gold.len(),
                actual: predicted.len(),
            });
        }
        for (g, p) in gold.iter().zip(predicted) {
            let Some(row) = g.category() else {
                continue;
            };
            let column = match p.category() {
                Some(c) => Predicted::Category(c),
                None => Predicted::Missed,
            };
            *self.counts.entry(row).or_default().entry(column).or_insert(0) += 1;
        }
        Ok(())
    }

    /// Builds a matrix from `(gold, predicted)` document pairs.
    pub fn from_documents<'a>(
        pairs: impl IntoIterator<Item = (&'a TaggedDocument, &'a TaggedDocument)>,
    ) -> Result<Self> {
        let mut matrix = Self::new();
        for (gold, predicted) in pairs {
            matrix.add_sequence(&gold.id, &gold.tags(), &predicted.tags())?;
        }
        Ok(matrix)
    }

    /// Hides `category` from rows and columns.
    pub fn exclude(mut self, category: EntityCategory) -> Self {
        if !self.excluded.contains(&category) {
            self.excluded.push(category);
        }
        self
    }

    fn visible(&self, category: EntityCategory) -> bool {
        !self.excluded.contains(&category)
    }

    pub fn rows(&self) -> Vec<EntityCategory> {
        EntityCategory::ALL
            .into_iter()
            .filter(|c| self.visible(*c))
            .collect()
    }

    pub fn columns(&self) -> Vec<Predicted> {
        self.rows()
            .into_iter()
            .map(Predicted::Category)
            .chain(std::iter::once(Predicted::Missed))
            .collect()
    }

    pub fn get(&self, gold: EntityCategory, predicted: Predicted) -> usize {
        self.counts
            .get(&gold)
            .and_then(|row| row.get(&predicted))
            .copied()
            .unwrap_or(0)
    }

    /// Sum of the visible cells of a row.
    pub fn row_total(&self, gold: EntityCategory) -> usize {
        self.columns().into_iter().map(|p| self.get(gold, p)).sum()
    }

    /// Raw counts, one row per visible category in [`ConfusionMatrix::columns`] order.
    pub fn counts(&self) -> Vec<Vec<usize>> {
        let columns = self.columns();
        self.rows()
            .into_iter()
            .map(|gold| columns.iter().map(|p| self.get(gold, *p)).collect())
            .collect()
    }

    /// Row-normalized percentages (0 to 100). Empty rows are all zero.
    pub fn percentages(&self) -> Vec<Vec<f64>> {
        self.counts()
            .into_iter()
            .map(|row| {
                let total: usize = row.iter().sum();
                row.into_iter()
                    .map(|n| {
                        if total == 0 {
                            0.0
                        } else {
                            n as f64 * 100.0 / total as f64
                        }
                    })
                    .collect()
            })
            .collect()
    }

    /// Share of gold entity tokens predicted with the right category.
    pub fn accuracy(&self) -> f64 {
        let rows = self.rows();
        let total: usize = rows.iter().map(|g| self.row_total(*g)).sum();
        if total == 0 {
            return 0.0;
        }
        let hits: usize = rows
            .iter()
            .map(|g| self.get(*g, Predicted::Category(*g)))
            .sum();
        hits as f64 / total as f64
    }

    /// Plain-text table, counts or percentages.
    pub fn render(&self, percent: bool) -> String {
        let columns = self.columns();
        let mut out = format!("{:<10}", "gold\\pred");
        for column in &columns {
            out.push_str(&format!(" {:>9}", column.to_string()));
        }
        out.push('\n');

        let cells: Vec<Vec<String>> = if percent {
            self.percentages()
                .into_iter()
                .map(|row| row.into_iter().map(|v| format!("{:.1}", v)).collect())
                .collect()
        } else {
            self.counts()
                .into_iter()
                .map(|row| row.into_iter().map(|n| n.to_string()).collect())
                .collect()
        };
        for (gold, row) in self.rows().into_iter().zip(cells) {
            out.push_str(&format!("{:<10}", gold.code()));
            for cell in row {
                out.push_str(&format!(" {:>9}", cell));
            }
            out.push('\n');
        }
        out
    }
}
