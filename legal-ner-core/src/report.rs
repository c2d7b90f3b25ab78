//! # Batch Report
//!
//! Every stage of the pipeline returns the problems it tolerated as a list of
//! [`Issue`]s instead of printing and forgetting them. A [`BatchReport`]
//! gathers those lists for a whole run and can summarize them by category and
//! by source file.
//!
//! | Category              | Effect                                      |
//! |-----------------------|---------------------------------------------|
//! | `MalformedRecord`     | record dropped, batch continues             |
//! | `InvalidSpan`         | span dropped, document kept                 |
//! | `UncoveredSpan`       | warning only, span covers no whole token    |
//! | `TagInconsistency`    | dangling `I-` promoted to `B-`              |
//! | `SplitQuotaExhausted` | document overflowed into the least-full split |
//! | `IoFailure`           | one file skipped, batch continues           |

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueKind {
    MalformedRecord,
    InvalidSpan,
    UncoveredSpan,
    TagInconsistency,
    SplitQuotaExhausted,
    IoFailure,
}

impl IssueKind {
    pub fn name(&self) -> &'static str {
        match self {
            IssueKind::MalformedRecord => "MalformedRecord",
            IssueKind::InvalidSpan => "InvalidSpan",
            IssueKind::UncoveredSpan => "UncoveredSpan",
            IssueKind::TagInconsistency => "TagInconsistency",
            IssueKind::SplitQuotaExhausted => "SplitQuotaExhausted",
            IssueKind::IoFailure => "IOFailure",
        }
    }

    /// Issues that remove data from the output, as opposed to warnings.
    pub fn drops_data(&self) -> bool {
        matches!(
            self,
            IssueKind::MalformedRecord | IssueKind::InvalidSpan | IssueKind::IoFailure
        )
    }
}

/// One tolerated problem.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Issue {
    pub kind: IssueKind,
    /// Source file, once known. Pure functions leave it empty and the
    /// pipeline fills it in with [`Issue::in_file`].
    pub file: Option<PathBuf>,
    /// 1-based line of the source record, when the issue comes from one.
    pub line: Option<usize>,
    /// Document the issue refers to, when there is one.
    pub document: Option<String>,
    pub message: String,
}

impl Issue {
    pub fn new(kind: IssueKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            file: None,
            line: None,
            document: None,
            message: message.into(),
        }
    }

    pub fn at_line(mut self, line: usize) -> Self {
        self.line = Some(line);
        self
    }

    pub fn for_document(mut self, id: impl Into<String>) -> Self {
        self.document = Some(id.into());
        self
    }

    pub fn in_file(mut self, file: impl Into<PathBuf>) -> Self {
        self.file = Some(file.into());
        self
    }

    /// The line written to a per-file error log: `Line k: reason`.
    pub fn log_line(&self) -> String {
        match (self.line, &self.document) {
            (Some(line), _) => format!("Line {}: {}", line, self.message),
            (None, Some(doc)) => format!("{}: {}", doc, self.message),
            (None, None) => self.message.clone(),
        }
    }
}

impl fmt::Display for Issue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] ", self.kind.name())?;
        if let Some(file) = &self.file {
            write!(f, "{}: ", file.display())?;
        }
        write!(f, "{}", self.log_line())
    }
}

/// All issues of one batch run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BatchReport {
    pub issues: Vec<Issue>,
}

impl BatchReport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, issue: Issue) {
        self.issues.push(issue);
    }

    pub fn extend(&mut self, issues: impl IntoIterator<Item = Issue>) {
        self.issues.extend(issues);
    }

    /// Adds issues that were produced without file context.
    pub fn extend_for_file(&mut self, file: &Path, issues: impl IntoIterator<Item = Issue>) {
        self.issues
            .extend(issues.into_iter().map(|issue| issue.in_file(file)));
    }

    pub fn is_empty(&self) -> bool {
        self.issues.is_empty()
    }

    pub fn len(&self) -> usize {
        self.issues.len()
    }

    pub fn count(&self, kind: IssueKind) -> usize {
        self.issues.iter().filter(|i| i.kind == kind).count()
    }

    /// Issue counts per category, only for categories that occurred.
    pub fn counts_by_kind(&self) -> BTreeMap<IssueKind, usize> {
        let mut counts = BTreeMap::new();
        for issue in &self.issues {
            *counts.entry(issue.kind).or_insert(0) += 1;
        }
        counts
    }

    /// Issues grouped by source file. Issues without a file are keyed by an
    /// empty path.
    pub fn by_file(&self) -> BTreeMap<PathBuf, Vec<&Issue>> {
        let mut grouped: BTreeMap<PathBuf, Vec<&Issue>> = BTreeMap::new();
        for issue in &self.issues {
            grouped
                .entry(issue.file.clone().unwrap_or_default())
                .or_default()
                .push(issue);
        }
        grouped
    }

    /// Multi-line human readable summary: counts first, then per-file detail.
    pub fn summary(&self) -> String {
        if self.issues.is_empty() {
            return "No issues.\n".to_string();
        }
        let mut out = String::new();
        out.push_str(&format!("{} issue(s):\n", self.issues.len()));
        for (kind, n) in self.counts_by_kind() {
            out.push_str(&format!("  {:<20} {}\n", kind.name(), n));
        }
        for (file, issues) in self.by_file() {
            let name = if file.as_os_str().is_empty() {
                "<no file>".to_string()
            } else {
                file.display().to_string()
            };
            out.push_str(&format!("\n{} ({}):\n", name, issues.len()));
            for issue in issues {
                out.push_str(&format!("  [{}] {}\n", issue.kind.name(), issue.log_line()));
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_line_format() {
        let issue = Issue::new(IssueKind::MalformedRecord, "Missing 'text'.").at_line(3);
        assert_eq!(issue.log_line(), "Line 3: Missing 'text'.");
    }

    #[test]
    fn test_counts_and_grouping() {
        let mut report = BatchReport::new();
        report.push(Issue::new(IssueKind::InvalidSpan, "a").in_file("x.jsonl"));
        report.push(Issue::new(IssueKind::InvalidSpan, "b").in_file("y.jsonl"));
        report.push(Issue::new(IssueKind::TagInconsistency, "c"));

        assert_eq!(report.count(IssueKind::InvalidSpan), 2);
        assert_eq!(report.counts_by_kind().get(&IssueKind::TagInconsistency), Some(&1));
        assert_eq!(report.by_file().len(), 3);
        assert!(report.summary().contains("InvalidSpan"));
    }

    #[test]
    fn test_drops_data() {
        assert!(IssueKind::MalformedRecord.drops_data());
        assert!(!IssueKind::UncoveredSpan.drops_data());
    }
}
