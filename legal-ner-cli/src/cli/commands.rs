//! Subcommands and their flags.
//!
//! Flags that also exist in [`PipelineConfig`] are optional here: when given
//! they override the value from `--config` (or the default).

use std::path::PathBuf;

use clap::{Args, Subcommand};
use legal_ner_core::{EntityCategory, PipelineConfig, SplitRatios};

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Normalize annotation files into canonical JSON-Lines and error logs
    Clean(CleanArgs),

    /// Normalize and tag annotation files, writing one .iob file per document
    Tag(TagArgs),

    /// Count entities (B- tags) in .iob files
    Count(CountArgs),

    /// Split a directory of .iob files into train/eval/test
    Split(SplitArgs),

    /// Write augmented copies of the .iob files in a directory
    Augment(AugmentArgs),

    /// Delete augmented .iob files from a directory
    PruneAugmented(PruneArgs),

    /// Remove every token of one entity category from .iob files
    StripLabel(StripArgs),

    /// Token-level confusion table between gold and predicted .iob files
    Confusion(ConfusionArgs),

    /// Full pipeline: clean, tag, split and augment
    Run(RunArgs),
}

#[derive(Args, Debug)]
pub struct CleanArgs {
    /// Annotation files or directories of *.jsonl
    #[arg(required = true)]
    pub inputs: Vec<PathBuf>,

    /// Directory for <stem>.clean.jsonl and <stem>.errors.log
    #[arg(long, short, default_value = "cleaned")]
    pub out_dir: PathBuf,
}

#[derive(Args, Debug)]
pub struct TagArgs {
    /// Annotation files or directories of *.jsonl
    #[arg(required = true)]
    pub inputs: Vec<PathBuf>,

    /// Directory for the .iob files
    #[arg(long, short)]
    pub out_dir: Option<PathBuf>,
}

#[derive(Args, Debug)]
pub struct CountArgs {
    /// .iob files or directories of them
    #[arg(required = true)]
    pub paths: Vec<PathBuf>,

    /// Print one line per file as well as the total
    #[arg(long)]
    pub per_file: bool,
}

/// Ratio and rare-category overrides shared by `split` and `run`.
#[derive(Args, Debug, Default)]
pub struct SplitOverrides {
    /// Train share, e.g. 0.7
    #[arg(long)]
    pub train: Option<f64>,

    /// Eval share, e.g. 0.2
    #[arg(long)]
    pub eval: Option<f64>,

    /// Test share, e.g. 0.1
    #[arg(long)]
    pub test: Option<f64>,

    /// Rare category kept out of test (default CNS)
    #[arg(long)]
    pub rare: Option<EntityCategory>,

    /// Disable rare-category handling
    #[arg(long, conflicts_with = "rare")]
    pub no_rare: bool,

    /// Share of rare-bearing documents sent to train
    #[arg(long)]
    pub rare_train_fraction: Option<f64>,
}

impl SplitOverrides {
    pub fn apply(&self, config: &mut PipelineConfig) {
        let SplitRatios { train, eval, test } = config.ratios;
        config.ratios = SplitRatios {
            train: self.train.unwrap_or(train),
            eval: self.eval.unwrap_or(eval),
            test: self.test.unwrap_or(test),
        };
        if let Some(rare) = self.rare {
            config.rare_category = Some(rare);
        }
        if self.no_rare {
            config.rare_category = None;
        }
        if let Some(fraction) = self.rare_train_fraction {
            config.rare_train_fraction = fraction;
        }
    }
}

#[derive(Args, Debug)]
pub struct SplitArgs {
    /// Directory holding the tagged .iob files
    #[arg(long)]
    pub staging: Option<PathBuf>,

    /// Parent of train/, eval/ and test/
    #[arg(long)]
    pub output_root: Option<PathBuf>,

    #[command(flatten)]
    pub split: SplitOverrides,
}

/// Augmentation overrides shared by `augment` and `run`.
#[derive(Args, Debug, Default)]
pub struct AugmentOverrides {
    /// Augmented copies per document
    #[arg(long)]
    pub rounds: Option<u32>,

    /// Base seed; each round derives its own
    #[arg(long)]
    pub seed: Option<u64>,

    /// Categories never substituted (repeatable; default CNS)
    #[arg(long = "exclude")]
    pub excluded: Vec<EntityCategory>,
}

impl AugmentOverrides {
    pub fn apply(&self, config: &mut PipelineConfig) {
        if let Some(rounds) = self.rounds {
            config.augment_rounds = rounds;
        }
        if let Some(seed) = self.seed {
            config.seed = seed;
        }
        if !self.excluded.is_empty() {
            config.excluded_categories = self.excluded.clone();
        }
    }
}

#[derive(Args, Debug)]
pub struct AugmentArgs {
    /// Directory of .iob files; augmented files are written next to them
    pub dir: PathBuf,

    #[command(flatten)]
    pub augment: AugmentOverrides,
}

#[derive(Args, Debug)]
pub struct PruneArgs {
    /// Directories to clean
    #[arg(required = true)]
    pub dirs: Vec<PathBuf>,
}

#[derive(Args, Debug)]
pub struct StripArgs {
    /// Directories of .iob files, rewritten in place
    #[arg(required = true)]
    pub dirs: Vec<PathBuf>,

    /// Category to remove
    #[arg(long, default_value = "CNS")]
    pub label: EntityCategory,
}

#[derive(Args, Debug)]
pub struct ConfusionArgs {
    /// Directory of gold .iob files
    #[arg(long)]
    pub gold: PathBuf,

    /// Directory of predicted .iob files with the same names
    #[arg(long)]
    pub pred: PathBuf,

    /// Categories to hide (repeatable)
    #[arg(long = "exclude")]
    pub excluded: Vec<EntityCategory>,

    /// Print row percentages instead of counts
    #[arg(long)]
    pub percent: bool,
}

#[derive(Args, Debug)]
pub struct RunArgs {
    /// Annotation files or directories of *.jsonl
    pub inputs: Vec<PathBuf>,

    #[arg(long)]
    pub staging: Option<PathBuf>,

    #[arg(long)]
    pub output_root: Option<PathBuf>,

    #[command(flatten)]
    pub split: SplitOverrides,

    #[command(flatten)]
    pub augment: AugmentOverrides,

    /// Print the full per-file issue list
    #[arg(long)]
    pub report: bool,

    /// Print the run output (report, split, tallies) as JSON instead
    #[arg(long)]
    pub json: bool,
}

impl RunArgs {
    pub fn apply(&self, config: &mut PipelineConfig) {
        if !self.inputs.is_empty() {
            config.inputs = self.inputs.clone();
        }
        if let Some(staging) = &self.staging {
            config.staging_dir = staging.clone();
        }
        if let Some(root) = &self.output_root {
            config.output_root = root.clone();
        }
        self.split.apply(config);
        self.augment.apply(config);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_overrides_keep_unset_values() {
        let mut config = PipelineConfig::default();
        let overrides = SplitOverrides {
            train: Some(0.8),
            test: Some(0.0),
            no_rare: true,
            ..SplitOverrides::default()
        };
        overrides.apply(&mut config);
        assert_eq!(config.ratios.train, 0.8);
        assert_eq!(config.ratios.eval, 0.2);
        assert_eq!(config.rare_category, None);
        assert_eq!(config.rare_train_fraction, 0.9);
    }

    #[test]
    fn test_augment_overrides() {
        let mut config = PipelineConfig::default();
        AugmentOverrides {
            rounds: Some(0),
            seed: None,
            excluded: vec![EntityCategory::Person],
        }
        .apply(&mut config);
        assert_eq!(config.augment_rounds, 0);
        assert_eq!(config.seed, 42);
        assert_eq!(config.excluded_categories, [EntityCategory::Person]);
    }
}
