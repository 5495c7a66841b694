//! HuggingFace Hub access
//!
//! Resolves a model repository (or a local directory) to the files the
//! loader needs: `config.json`, `tokenizer.json` and the SafeTensors weights.

mod fetcher;
mod options;

pub use fetcher::{HfModelFetcher, ModelArtifact};
pub use options::FetchOptions;
