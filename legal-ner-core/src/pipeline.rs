//! # Corpus Pipeline: Orchestrator with Observable Events
//!
//! Chains the stages of corpus preparation and reports each step through a
//! Rust channel (`mpsc`), so a driver can show progress while a long batch
//! runs.
//!
//! ```text
//! *.jsonl ──normalize──▶ Document ──tag──▶ TaggedDocument ──write──▶ staging/<id>.iob
//!                                                │
//!                                   count ──▶ split ──copy──▶ train/ eval/ test/
//!                                                               │
//!                                                  augment ─────┘ train/<id>_aug<r>.iob
//! ```
//!
//! ## Error Policy
//!
//! A file that cannot be read is recorded as `IOFailure` and the next file is
//! processed. Bad records and spans are dropped and logged per source file
//! (`<stem>.errors.log` in the staging directory). Only configuration errors
//! and an unwritable staging/output directory stop the run.

use std::io::BufRead;
use std::path::{Path, PathBuf};
use std::sync::mpsc;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::annotation::normalize_line;
use crate::augment::{augment_corpus, EntityBank};
use crate::config::PipelineConfig;
use crate::corpus::{Document, TaggedDocument};
use crate::counter::{count_document, EntityCounts};
use crate::error::{Error, Result};
use crate::fs;
use crate::report::{BatchReport, Issue, IssueKind};
use crate::splitter::{split_corpus, Split, SplitOutcome};

/// Progress events of a pipeline run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum PipelineEvent {
    /// A source file was read and normalized (or failed to read).
    FileLoaded {
        path: PathBuf,
        documents: usize,
        issues: usize,
    },
    DocumentTagged {
        id: String,
        tokens: usize,
        entities: EntityCounts,
    },
    SplitComputed {
        train: usize,
        eval: usize,
        test: usize,
        overflows: usize,
    },
    Augmented {
        rounds: u32,
        documents: usize,
    },
    Done {
        output: Box<PipelineOutput>,
    },
    /// The run stopped on a fatal error.
    Error {
        message: String,
    },
}

/// Everything a run produces besides the files it writes.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PipelineOutput {
    pub report: BatchReport,
    pub split: SplitOutcome,
    /// Documents tagged and written to staging.
    pub documents: usize,
    /// Augmented documents written to the train split.
    pub augmented: usize,
}

impl PipelineOutput {
    pub fn tally(&self, split: Split) -> &EntityCounts {
        self.split.tally(split)
    }
}

/// Reads JSON-Lines annotation records. Document ids are
/// `<source>_<line:05>`. Malformed records, including lines that are not
/// valid UTF-8, are reported and skipped; a read error ends the file with an
/// `IOFailure` issue.
pub fn normalize_jsonl<R: BufRead>(reader: R, source: &str) -> (Vec<Document>, Vec<Issue>) {
    let mut docs = Vec::new();
    let mut issues = Vec::new();
    for (i, bytes) in reader.split(b'\n').enumerate() {
        let line_no = i + 1;
        let mut bytes = match bytes {
            Ok(bytes) => bytes,
            Err(e) => {
                issues.push(
                    Issue::new(IssueKind::IoFailure, format!("Read failed: {}.", e)).at_line(line_no),
                );
                break;
            }
        };
        if bytes.last() == Some(&b'\r') {
            bytes.pop();
        }
        let line = match String::from_utf8(bytes) {
            Ok(line) => line,
            Err(_) => {
                tracing::debug!("{}: line {} is not valid UTF-8", source, line_no);
                issues.push(
                    Issue::new(IssueKind::MalformedRecord, "Invalid UTF-8 encoding.").at_line(line_no),
                );
                continue;
            }
        };
        if line.trim().is_empty() {
            continue;
        }
        match normalize_line(format!("{}_{:05}", source, line_no), &line, line_no) {
            Ok((doc, span_issues)) => {
                issues.extend(span_issues);
                docs.push(doc);
            }
            Err(issue) => issues.push(issue),
        }
    }
    (docs, issues)
}

/// Tags documents in parallel. Output order matches input order.
pub fn tag_documents(docs: &[Document]) -> (Vec<TaggedDocument>, Vec<Issue>) {
    let results: Vec<(TaggedDocument, Vec<Issue>)> = docs.par_iter().map(Document::tag).collect();
    let mut tagged = Vec::with_capacity(results.len());
    let mut issues = Vec::new();
    for (doc, doc_issues) in results {
        tagged.push(doc);
        issues.extend(doc_issues);
    }
    (tagged, issues)
}

/// Counts every document in parallel, keeping order.
pub fn count_documents(docs: &[TaggedDocument]) -> Vec<(String, EntityCounts)> {
    docs.par_iter()
        .map(|doc| (doc.id.clone(), count_document(doc)))
        .collect()
}

/// The corpus preparation pipeline.
///
/// # Usage
/// - **Sync**: [`CorpusPipeline::run`] returns the output directly.
/// - **Streaming**: [`CorpusPipeline::run_streaming`] pushes
///   [`PipelineEvent`]s through a channel and ends with `Done` or `Error`.
pub struct CorpusPipeline {
    config: PipelineConfig,
}

impl CorpusPipeline {
    pub fn new(config: PipelineConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Runs to completion, draining the progress events into the debug log.
    pub fn run(&self) -> Result<PipelineOutput> {
        let (tx, rx) = mpsc::channel();
        let result = self.execute(&tx);
        drop(tx);
        for event in rx.iter() {
            tracing::trace!("{:?}", event);
        }
        result
    }

    /// Runs to completion, sending progress events through `tx`. The last
    /// event is always `Done` or `Error`.
    pub fn run_streaming(&self, tx: mpsc::Sender<PipelineEvent>) {
        match self.execute(&tx) {
            Ok(output) => {
                let _ = tx.send(PipelineEvent::Done {
                    output: Box::new(output),
                });
            }
            Err(e) => {
                tracing::error!("Pipeline failed: {}", e);
                let _ = tx.send(PipelineEvent::Error {
                    message: e.to_string(),
                });
            }
        }
    }

    fn execute(&self, tx: &mpsc::Sender<PipelineEvent>) -> Result<PipelineOutput> {
        let config = &self.config;
        let inputs = fs::expand_inputs(&config.inputs, "jsonl")?;
        if inputs.is_empty() {
            return Err(Error::Config("no input files".to_string()));
        }
        fs::ensure_unique_stems(&inputs)?;
        fs::ensure_dir(&config.staging_dir)?;
        fs::ensure_dir(&config.output_root)?;

        let mut report = BatchReport::new();
        let mut documents: Vec<TaggedDocument> = Vec::new();

        // === Stage 1: normalize, tag, stage ===
        for path in &inputs {
            match self.load_file(path, tx) {
                Ok((tagged, issues)) => {
                    report.extend_for_file(path, issues);
                    documents.extend(tagged);
                }
                Err(e) => {
                    tracing::warn!("Skipping {}: {}", path.display(), e);
                    report.push(Issue::new(IssueKind::IoFailure, e.to_string()).in_file(path));
                    let _ = tx.send(PipelineEvent::FileLoaded {
                        path: path.clone(),
                        documents: 0,
                        issues: 1,
                    });
                }
            }
        }
        tracing::info!(
            "Tagged {} document(s) from {} file(s)",
            documents.len(),
            inputs.len()
        );

        // === Stage 2: count and split ===
        let counts = count_documents(&documents);
        let outcome = split_corpus(&counts, &config.split_config())?;
        report.extend(outcome.issues.iter().cloned());
        let _ = tx.send(PipelineEvent::SplitComputed {
            train: outcome.members(Split::Train).len(),
            eval: outcome.members(Split::Eval).len(),
            test: outcome.members(Split::Test).len(),
            overflows: outcome.overflows.len(),
        });

        let cleared = fs::clear_split_dirs(&config.output_root)?;
        if cleared > 0 {
            tracing::info!("Cleared {} file(s) from previous splits", cleared);
        }
        fs::copy_splits(&config.staging_dir, &config.output_root, &outcome)?;

        // === Stage 3: augment the train split ===
        let augmented = if config.augment_rounds > 0 {
            let train: Vec<TaggedDocument> = documents
                .iter()
                .filter(|doc| outcome.split_of(&doc.id) == Some(Split::Train))
                .cloned()
                .collect();
            let bank = EntityBank::build(&train, &config.excluded_categories);
            tracing::debug!("Entity bank sizes: {:?}", bank.sizes());
            let extra = augment_corpus(&train, &bank, config.augment_rounds, config.seed);
            fs::write_iob_files(&config.output_root.join(Split::Train.name()), &extra)?;
            tracing::info!(
                "Wrote {} augmented document(s) over {} round(s)",
                extra.len(),
                config.augment_rounds
            );
            let _ = tx.send(PipelineEvent::Augmented {
                rounds: config.augment_rounds,
                documents: extra.len(),
            });
            extra.len()
        } else {
            0
        };

        if !report.is_empty() {
            tracing::warn!("{} issue(s) recorded during the run", report.len());
        }
        Ok(PipelineOutput {
            report,
            documents: documents.len(),
            split: outcome,
            augmented,
        })
    }

    /// Normalizes and tags one source file and writes its staging outputs.
    fn load_file(
        &self,
        path: &Path,
        tx: &mpsc::Sender<PipelineEvent>,
    ) -> Result<(Vec<TaggedDocument>, Vec<Issue>)> {
        let staging = &self.config.staging_dir;
        let stem = fs::file_stem(path);
        let file = std::fs::File::open(path).map_err(|e| Error::io(path, e))?;
        let (docs, mut issues) = normalize_jsonl(std::io::BufReader::new(file), &stem);

        let mut clean = String::new();
        for doc in &docs {
            clean.push_str(&doc.to_json_line()?);
            clean.push('\n');
        }
        fs::write_string(&staging.join(format!("{}.clean.jsonl", stem)), &clean)?;

        let (tagged, tag_issues) = tag_documents(&docs);
        issues.extend(tag_issues);
        fs::write_iob_files(staging, &tagged)?;
        for doc in &tagged {
            let _ = tx.send(PipelineEvent::DocumentTagged {
                id: doc.id.clone(),
                tokens: doc.len(),
                entities: count_document(doc),
            });
        }

        let log_path = staging.join(format!("{}.errors.log", stem));
        let logged: Vec<Issue> = issues
            .iter()
            .filter(|i| i.kind.drops_data())
            .cloned()
            .collect();
        fs::write_error_log(&log_path, &logged)?;
        if !logged.is_empty() {
            tracing::warn!(
                "{}: {} record(s) or span(s) dropped, see {}",
                path.display(),
                logged.len(),
                log_path.display()
            );
        }

        tracing::info!("Loaded {} document(s) from {}", docs.len(), path.display());
        let _ = tx.send(PipelineEvent::FileLoaded {
            path: path.to_path_buf(),
            documents: docs.len(),
            issues: issues.len(),
        });
        Ok((tagged, issues))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tagger::{EntityCategory, Tag};

    const SAMPLE: &str = r#"{"text": "NEDA issued PD 1468.", "label": [[0,4,"INS"],[12,19,"STA"]]}
{"label": []}

{"text": "Juan Cruz v. COMELEC", "labels": [[0, 9, "PERSON"], [13, 20, "INS"], [0, 3, "LOC"]]}
not json
"#;

    #[test]
    fn test_normalize_jsonl_keeps_going() {
        let (docs, issues) = normalize_jsonl(SAMPLE.as_bytes(), "batch");
        let ids: Vec<&str> = docs.iter().map(|d| d.id.as_str()).collect();
        assert_eq!(ids, ["batch_00001", "batch_00004"]);

        let lines: Vec<String> = issues.iter().map(Issue::log_line).collect();
        assert_eq!(lines[0], "Line 2: Missing 'text'.");
        assert!(lines[1].starts_with("Line 4: Unknown label 'LOC'"));
        assert_eq!(lines[2], "Line 5: Invalid JSON format.");
    }

    #[test]
    fn test_invalid_utf8_line_is_skipped_alone() {
        let mut input = br#"{"text": "NEDA issued PD 1468.", "label": [[0,4,"INS"]]}"#.to_vec();
        input.extend_from_slice(b"\n{\"text\": \"bad \xff byte\", \"label\": []}\n");
        for _ in 0..3 {
            input.extend_from_slice(br#"{"text": "Juan Cruz", "label": [[0, 9, "PERSON"]]}"#);
            input.extend_from_slice(b"\r\n");
        }

        let (docs, issues) = normalize_jsonl(input.as_slice(), "batch");
        let ids: Vec<&str> = docs.iter().map(|d| d.id.as_str()).collect();
        assert_eq!(ids, ["batch_00001", "batch_00003", "batch_00004", "batch_00005"]);
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].kind, IssueKind::MalformedRecord);
        assert_eq!(issues[0].log_line(), "Line 2: Invalid UTF-8 encoding.");
        assert_eq!(docs[1].text, "Juan Cruz");
    }

    #[test]
    fn test_tag_documents_scenario_one() {
        let (docs, _) = normalize_jsonl(SAMPLE.as_bytes(), "batch");
        let (tagged, issues) = tag_documents(&docs);
        assert!(issues.is_empty());
        assert_eq!(tagged[0].words(), ["NEDA", "issued", "PD", "1468", "."]);
        assert_eq!(
            tagged[0].tags(),
            [
                Tag::Begin(EntityCategory::Institution),
                Tag::Outside,
                Tag::Begin(EntityCategory::Statute),
                Tag::Inside(EntityCategory::Statute),
                Tag::Outside,
            ]
        );
        assert_eq!(tagged[1].id, "batch_00004");
    }

    #[test]
    fn test_streaming_ends_with_error_on_missing_inputs() {
        let dir = tempfile::tempdir().unwrap();
        let config = PipelineConfig {
            inputs: vec![],
            staging_dir: dir.path().join("queue"),
            output_root: dir.path().join("out"),
            ..PipelineConfig::default()
        };
        let pipeline = CorpusPipeline::new(config).unwrap();
        let (tx, rx) = mpsc::channel();
        pipeline.run_streaming(tx);
        let events: Vec<PipelineEvent> = rx.iter().collect();
        assert!(matches!(events.last(), Some(PipelineEvent::Error { .. })));
    }
}
