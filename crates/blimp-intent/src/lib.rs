//! Intent resolution for Blimp.
//!
//! This crate provides:
//!
//! - **Classification**: a [`Classifier`] trait with an LLM-backed
//!   implementation ([`LlmClassifier`], OpenAI-compatible or Gemini) and an
//!   offline [`KeywordClassifier`].
//! - **Matching**: the tiered, deterministic ranking in [`IntentResolver`],
//!   scored with [`Similarity`].
//! - **Synthesis**: new templates or user workflows persisted when no
//!   candidate qualifies.

pub mod classifier;
pub mod error;
pub mod keyword;
pub mod llm;
pub mod resolver;
pub mod similarity;

pub use classifier::{
    CatalogueEntry, Classification, ClassificationRequest, ClassifiedIntent, Classifier,
    parse_classification,
};
pub use error::{ResolutionError, Result};
pub use keyword::KeywordClassifier;
pub use llm::{LlmClassifier, LlmClassifierConfig, LlmProvider};
pub use resolver::{IntentResolver, MatchTier, RankedCandidate, ResolvedWorkflow, ResolverConfig};
pub use similarity::Similarity;
