//! # Pipeline Configuration
//!
//! Every knob of a corpus run, loadable from JSON. Missing fields take their
//! defaults, so a config file only needs what it changes:
//!
//! ```json
//! { "inputs": ["raw/"], "augment_rounds": 0, "ratios": { "train": 0.8, "eval": 0.1, "test": 0.1 } }
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::splitter::{SplitConfig, SplitRatios};
use crate::tagger::EntityCategory;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Annotation files, or directories scanned for `*.jsonl`.
    pub inputs: Vec<PathBuf>,
    /// Where every tagged document is written before splitting.
    pub staging_dir: PathBuf,
    /// Parent of `train/`, `eval/` and `test/`.
    pub output_root: PathBuf,
    pub ratios: SplitRatios,
    /// Kept out of test; `null` disables rare handling.
    pub rare_category: Option<EntityCategory>,
    pub rare_train_fraction: f64,
    /// Augmented copies per training document. 0 disables augmentation.
    pub augment_rounds: u32,
    pub seed: u64,
    /// Categories never substituted during augmentation.
    pub excluded_categories: Vec<EntityCategory>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            inputs: Vec::new(),
            staging_dir: PathBuf::from("queue"),
            output_root: PathBuf::from("train_data"),
            ratios: SplitRatios::default(),
            rare_category: Some(EntityCategory::Constitution),
            rare_train_fraction: 0.9,
            augment_rounds: 2,
            seed: 42,
            excluded_categories: vec![EntityCategory::Constitution],
        }
    }
}

impl PipelineConfig {
    pub fn from_json(input: &str) -> Result<Self> {
        serde_json::from_str(input).map_err(|e| Error::Config(format!("invalid config: {}", e)))
    }

    pub fn load(path: &Path) -> Result<Self> {
        let input = std::fs::read_to_string(path).map_err(|e| Error::io(path, e))?;
        let config = Self::from_json(&input)?;
        tracing::debug!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        self.ratios.validate()?;
        if !(0.0..=1.0).contains(&self.rare_train_fraction) {
            return Err(Error::Config(format!(
                "rare_train_fraction {} is outside [0, 1]",
                self.rare_train_fraction
            )));
        }
        if self.staging_dir == self.output_root {
            return Err(Error::Config(
                "staging_dir and output_root must differ".to_string(),
            ));
        }
        Ok(())
    }

    pub fn split_config(&self) -> SplitConfig {
        SplitConfig {
            ratios: self.ratios,
            rare: self.rare_category,
            rare_train_fraction: self.rare_train_fraction,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_json_keeps_defaults() {
        let config = PipelineConfig::from_json(r#"{"augment_rounds": 0, "rare_category": null}"#).unwrap();
        assert_eq!(config.augment_rounds, 0);
        assert_eq!(config.rare_category, None);
        assert_eq!(config.seed, 42);
        assert_eq!(config.ratios, SplitRatios::default());
    }

    #[test]
    fn test_rejects_unknown_category_and_bad_ratios() {
        assert!(matches!(
            PipelineConfig::from_json(r#"{"rare_category": "LOC"}"#),
            Err(Error::Config(_))
        ));
        let config = PipelineConfig {
            ratios: SplitRatios {
                train: 0.9,
                eval: 0.9,
                test: 0.0,
            },
            ..PipelineConfig::default()
        };
        assert!(matches!(config.validate(), Err(Error::InvalidRatios(_))));
    }

    #[test]
    fn test_defaults_validate() {
        assert!(PipelineConfig::default().validate().is_ok());
    }
}
