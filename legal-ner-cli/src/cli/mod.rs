//! Command-line surface. Parses arguments with clap, builds the
//! configuration and hands the work to `legal-ner-core`; nothing here
//! computes anything itself.

pub mod commands;

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::Parser;
use commands::{
    AugmentArgs, CleanArgs, Commands, ConfusionArgs, CountArgs, PruneArgs, RunArgs, SplitArgs,
    StripArgs, TagArgs,
};
use legal_ner_core::augment::{augment_corpus, is_augmented, EntityBank};
use legal_ner_core::confusion::ConfusionMatrix;
use legal_ner_core::counter::{count_iob, EntityCounts};
use legal_ner_core::fs;
use legal_ner_core::pipeline::{count_documents, normalize_jsonl, tag_documents};
use legal_ner_core::splitter::split_corpus;
use legal_ner_core::{BatchReport, CorpusPipeline, Document, Issue, IssueKind, PipelineConfig};

#[derive(Parser, Debug)]
#[command(
    name = "legal-ner",
    version,
    about = "Build and evaluate an IOB corpus of Philippine legal decisions."
)]
pub struct Cli {
    /// JSON configuration file; flags override its values
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Warnings and errors only
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    /// Default log filter when `RUST_LOG` is not set.
    pub fn log_filter(&self) -> &'static str {
        if self.verbose {
            "legal_ner=debug"
        } else if self.quiet {
            "legal_ner=warn"
        } else {
            "legal_ner=info"
        }
    }

    pub fn run(self) -> Result<()> {
        let config = self.load_config()?;
        match self.command {
            Commands::Clean(args) => run_clean(args),
            Commands::Tag(args) => run_tag(args, config),
            Commands::Count(args) => run_count(args),
            Commands::Split(args) => run_split(args, config),
            Commands::Augment(args) => run_augment(args, config),
            Commands::PruneAugmented(args) => run_prune(args),
            Commands::StripLabel(args) => run_strip(args),
            Commands::Confusion(args) => run_confusion(args),
            Commands::Run(args) => run_pipeline(args, config),
        }
    }

    fn load_config(&self) -> Result<PipelineConfig> {
        match &self.config {
            Some(path) => PipelineConfig::load(path)
                .with_context(|| format!("Failed to load configuration {}", path.display())),
            None => Ok(PipelineConfig::default()),
        }
    }
}

/// Reads and normalizes annotation files one by one. A file that cannot be
/// opened is reported and skipped.
fn load_annotations(inputs: &[PathBuf], report: &mut BatchReport) -> Result<Vec<(PathBuf, Vec<Document>)>> {
    let files = fs::expand_inputs(inputs, "jsonl")?;
    if files.is_empty() {
        bail!("No annotation files found");
    }
    fs::ensure_unique_stems(&files)?;
    let mut loaded = Vec::new();
    for path in files {
        let file = match std::fs::File::open(&path) {
            Ok(file) => file,
            Err(e) => {
                tracing::warn!("Skipping {}: {}", path.display(), e);
                report.push(
                    Issue::new(IssueKind::IoFailure, e.to_string()).in_file(&path),
                );
                continue;
            }
        };
        let (docs, issues) = normalize_jsonl(std::io::BufReader::new(file), &fs::file_stem(&path));
        tracing::info!("{}: {} document(s), {} issue(s)", path.display(), docs.len(), issues.len());
        report.extend_for_file(&path, issues);
        loaded.push((path, docs));
    }
    Ok(loaded)
}

/// Logs the lines of `.iob` files that were skipped while reading.
fn warn_skipped(issues: &[Issue]) {
    for issue in issues {
        let file = issue.file.as_deref().map(|p| p.display().to_string()).unwrap_or_default();
        tracing::warn!("{}: skipped {}", file, issue.log_line());
    }
}

fn print_report(report: &BatchReport, detailed: bool) {
    if detailed {
        print!("{}", report.summary());
    } else if report.is_empty() {
        println!("No issues.");
    } else {
        println!("{} issue(s):", report.len());
        for (kind, n) in report.counts_by_kind() {
            println!("  {:<20} {}", kind.name(), n);
        }
    }
}

fn run_clean(args: CleanArgs) -> Result<()> {
    let mut report = BatchReport::new();
    for (path, docs) in load_annotations(&args.inputs, &mut report)? {
        let stem = fs::file_stem(&path);
        let mut out = String::new();
        for doc in &docs {
            out.push_str(&doc.to_json_line()?);
            out.push('\n');
        }
        fs::write_string(&args.out_dir.join(format!("{}.clean.jsonl", stem)), &out)?;

        let issues: Vec<Issue> = report
            .issues
            .iter()
            .filter(|i| i.file.as_deref() == Some(path.as_path()))
            .cloned()
            .collect();
        fs::write_error_log(&args.out_dir.join(format!("{}.errors.log", stem)), &issues)?;
        println!("{}: {} valid record(s), {} issue(s)", path.display(), docs.len(), issues.len());
    }
    print_report(&report, true);
    Ok(())
}

fn run_tag(args: TagArgs, config: PipelineConfig) -> Result<()> {
    let out_dir = args.out_dir.unwrap_or(config.staging_dir);
    let mut report = BatchReport::new();
    let mut written = 0;
    for (path, docs) in load_annotations(&args.inputs, &mut report)? {
        let (tagged, issues) = tag_documents(&docs);
        report.extend_for_file(&path, issues);
        written += fs::write_iob_files(&out_dir, &tagged)?.len();
    }
    println!("Wrote {} .iob file(s) to {}", written, out_dir.display());
    print_report(&report, false);
    Ok(())
}

fn iob_files(paths: &[PathBuf]) -> Result<Vec<PathBuf>> {
    Ok(fs::expand_inputs(paths, fs::IOB_EXTENSION)?)
}

fn run_count(args: CountArgs) -> Result<()> {
    let mut total = EntityCounts::new();
    let files = iob_files(&args.paths)?;
    for path in &files {
        let counts = count_iob(&fs::read_to_string(path)?);
        if args.per_file {
            println!("{}: {}", path.display(), counts);
        }
        total.add(&counts);
    }
    println!("{} file(s)", files.len());
    print!("{}", total.summary());
    Ok(())
}

fn run_split(args: SplitArgs, mut config: PipelineConfig) -> Result<()> {
    if let Some(staging) = args.staging {
        config.staging_dir = staging;
    }
    if let Some(root) = args.output_root {
        config.output_root = root;
    }
    args.split.apply(&mut config);
    config.validate()?;

    let (docs, issues) = fs::read_iob_dir(&config.staging_dir)
        .with_context(|| format!("Failed to read {}", config.staging_dir.display()))?;
    let mut report = BatchReport::new();
    report.extend(issues);

    let outcome = split_corpus(&count_documents(&docs), &config.split_config())?;
    report.extend(outcome.issues.iter().cloned());
    fs::clear_split_dirs(&config.output_root)?;
    let copied = fs::copy_splits(&config.staging_dir, &config.output_root, &outcome)?;

    print!("{}", outcome.summary());
    println!("Copied {} file(s) into {}", copied, config.output_root.display());
    print_report(&report, false);
    Ok(())
}

fn run_augment(args: AugmentArgs, mut config: PipelineConfig) -> Result<()> {
    args.augment.apply(&mut config);
    let (docs, issues) = fs::read_iob_dir(&args.dir)?;
    warn_skipped(&issues);
    let sources: Vec<_> = docs.into_iter().filter(|d| !is_augmented(&d.id)).collect();

    let bank = EntityBank::build(&sources, &config.excluded_categories);
    for (category, n) in bank.sizes() {
        tracing::info!("Bank {}: {} token(s)", category, n);
    }
    let augmented = augment_corpus(&sources, &bank, config.augment_rounds, config.seed);
    fs::write_iob_files(&args.dir, &augmented)?;
    println!(
        "Wrote {} augmented file(s) from {} source(s) in {}",
        augmented.len(),
        sources.len(),
        args.dir.display()
    );
    Ok(())
}

fn run_prune(args: PruneArgs) -> Result<()> {
    for dir in &args.dirs {
        let removed = fs::prune_augmented(dir)?;
        println!("Removed {} augmented file(s) from {}", removed.len(), dir.display());
    }
    Ok(())
}

fn run_strip(args: StripArgs) -> Result<()> {
    let mut report = BatchReport::new();
    for dir in &args.dirs {
        let summary = fs::strip_category_in_dir(dir, args.label)?;
        println!(
            "Removed {} {} token(s) from {} file(s) in {}",
            summary.tokens,
            args.label,
            summary.files,
            dir.display()
        );
        report.extend(summary.issues);
    }
    print_report(&report, false);
    Ok(())
}

fn run_confusion(args: ConfusionArgs) -> Result<()> {
    let mut matrix = ConfusionMatrix::new();
    let mut paired = 0;
    for gold_path in fs::list_files(&args.gold, fs::IOB_EXTENSION)? {
        let name = gold_path.file_name().context("gold file without a name")?;
        let pred_path = args.pred.join(name);
        if !pred_path.is_file() {
            tracing::warn!("No prediction for {}", gold_path.display());
            continue;
        }
        let (gold, gold_issues) = fs::read_iob_file(&gold_path)?;
        let (pred, pred_issues) = fs::read_iob_file(&pred_path)?;
        warn_skipped(&gold_issues);
        warn_skipped(&pred_issues);
        matrix
            .add_sequence(&gold.id, &gold.tags(), &pred.tags())
            .with_context(|| format!("Comparing {}", gold_path.display()))?;
        paired += 1;
    }
    if paired == 0 {
        bail!("No gold/prediction pairs found");
    }
    for category in &args.excluded {
        matrix = matrix.exclude(*category);
    }
    println!("{} document pair(s)", paired);
    print!("{}", matrix.render(args.percent));
    println!("Entity-token accuracy: {:.1}%", matrix.accuracy() * 100.0);
    Ok(())
}

fn run_pipeline(args: RunArgs, mut config: PipelineConfig) -> Result<()> {
    args.apply(&mut config);
    let pipeline = CorpusPipeline::new(config)?;
    let output = pipeline.run().context("Pipeline failed")?;
    if args.json {
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    println!("{} document(s) tagged", output.documents);
    print!("{}", output.split.summary());
    if output.augmented > 0 {
        println!("{} augmented document(s) added to train", output.augmented);
    }
    print_report(&output.report, args.report);
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use legal_ner_core::{EntityCategory, Tag, TaggedDocument};

    use super::*;

    fn cli(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("legal-ner").chain(args.iter().copied())).unwrap()
    }

    fn arg(path: &Path) -> &str {
        path.to_str().unwrap()
    }

    fn write_decisions(dir: &Path, n: usize) {
        let docs: Vec<TaggedDocument> = (0..n)
            .map(|i| {
                TaggedDocument::from_pairs(
                    format!("dec_{:05}", i + 1),
                    [
                        ("COMELEC", Tag::Begin(EntityCategory::Institution)),
                        ("ruled", Tag::Outside),
                        (".", Tag::Outside),
                    ],
                )
            })
            .collect();
        fs::write_iob_files(dir, &docs).unwrap();
    }

    #[test]
    fn test_count_reads_a_directory() {
        let dir = tempfile::tempdir().unwrap();
        write_decisions(dir.path(), 3);
        cli(&["count", "--per-file", arg(dir.path())]).run().unwrap();

        let missing = dir.path().join("missing");
        assert!(cli(&["count", arg(&missing)]).run().is_err());
    }

    #[test]
    fn test_split_fills_the_split_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let staging = dir.path().join("queue");
        let out = dir.path().join("train_data");
        write_decisions(&staging, 10);

        let args = ["split", "--staging", arg(&staging), "--output-root", arg(&out)];
        cli(&args).run().unwrap();
        let sizes: Vec<usize> = ["train", "eval", "test"]
            .iter()
            .map(|s| fs::list_files(&out.join(s), fs::IOB_EXTENSION).unwrap().len())
            .collect();
        assert_eq!(sizes, [7, 2, 1]);

        let bad = ["split", "--staging", arg(&staging), "--output-root", arg(&out), "--train", "0.9"];
        assert!(cli(&bad).run().is_err());
    }

    #[test]
    fn test_tag_refuses_inputs_sharing_a_stem() {
        let dir = tempfile::tempdir().unwrap();
        let line = r#"{"text": "NEDA ruled.", "label": [[0, 4, "INS"]]}"#;
        for sub in ["a", "b"] {
            fs::write_string(&dir.path().join(sub).join("dec.jsonl"), line).unwrap();
        }
        let (a, b, out) = (dir.path().join("a"), dir.path().join("b"), dir.path().join("queue"));
        let args = ["tag", arg(&a), arg(&b), "-o", arg(&out)];
        assert!(cli(&args).run().is_err());
        assert!(!out.exists());
    }
}
