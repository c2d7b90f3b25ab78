//! # legal-ner-core: Corpus Tooling for NER over Philippine Legal Decisions
//!
//! Turns annotation exports into a training corpus for a token-classification
//! model and evaluates what the model gives back.
//!
//! ## Data Flow
//!
//! 1.  **Normalization** ([`annotation`]): three annotation shapes become one
//!     canonical [`Document`] (text plus character spans).
//! 2.  **Tokenization** ([`tokenizer`]): tokens with character offsets.
//! 3.  **Tagging** ([`tagger`]): spans become BIO tags, one per token.
//! 4.  **Counting** ([`counter`]) and **splitting** ([`splitter`]): a
//!     stratified train/eval/test partition that keeps the rare `CNS`
//!     category in train and eval.
//! 5.  **Augmentation** ([`augment`]): entity tokens swapped for others of the
//!     same category, tags untouched.
//! 6.  **Model boundary** ([`training`]) and **evaluation** ([`confusion`]).
//!
//! [`pipeline`] chains steps 1 to 5 over files; [`fs`] holds the directory edges.
//!
//! ## Example
//!
//! ```rust
//! use legal_ner_core::annotation::normalize_line;
//!
//! let line = r#"{"text": "NEDA issued PD 1468.", "label": [[0,4,"INS"],[12,19,"STA"]]}"#;
//! let (doc, _) = normalize_line("d1", line, 1).unwrap();
//! let (tagged, _) = doc.tag();
//!
//! let tags: Vec<String> = tagged.tags().iter().map(|t| t.to_string()).collect();
//! assert_eq!(tags, ["B-INS", "O", "B-STA", "I-STA", "O"]);
//! ```

pub mod annotation;
pub mod augment;
pub mod config;
pub mod confusion;
pub mod corpus;
pub mod counter;
pub mod error;
pub mod fs;
pub mod pipeline;
pub mod report;
pub mod splitter;
pub mod tagger;
pub mod tokenizer;
pub mod training;

pub use config::PipelineConfig;
pub use corpus::{Document, EntitySpan, TaggedDocument};
pub use counter::EntityCounts;
pub use error::{Error, Result};
pub use pipeline::{CorpusPipeline, PipelineEvent, PipelineOutput};
pub use report::{BatchReport, Issue, IssueKind};
pub use splitter::{Split, SplitOutcome, SplitRatios};
pub use tagger::{EntityCategory, Tag, TaggedToken};
pub use tokenizer::Token;
