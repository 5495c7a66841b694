//! On-disk tiny model shared by the fine-tuning tests

use crate::config::FinetuneSpec;
use crate::tokenizer::word_level_json;
use crate::transformer::{tiny_checkpoint, LlamaConfig, TokenIds};
use std::path::Path;
use tempfile::TempDir;

pub(crate) const WORDS: [&str; 10] =
    ["what", "is", "two", "plus", "three", "<4>", "<5>", "<6>", "four", "five"];

/// Model directory with `config.json`, `tokenizer.json` and `model.safetensors`
pub(crate) fn tiny_model_dir() -> TempDir {
    let dir = TempDir::new().unwrap();
    let config = LlamaConfig { eos_token_id: Some(TokenIds::One(2)), ..LlamaConfig::tiny() };
    std::fs::write(dir.path().join("config.json"), serde_json::to_string(&config).unwrap()).unwrap();
    std::fs::write(dir.path().join("tokenizer.json"), word_level_json(&WORDS)).unwrap();
    std::fs::write(dir.path().join("model.safetensors"), tiny_checkpoint(&config, 3)).unwrap();
    dir
}

/// Spec pointing at a [`tiny_model_dir`], small enough for unit tests
pub(crate) fn tiny_spec(model_dir: &Path) -> FinetuneSpec {
    let yaml = format!(
        "model:\n  local_path: {}\nquantization:\n  blocksize: 16\nlora:\n  r: 2\n  lora_alpha: 4\n\
         data:\n  train: train.jsonl\n  batch_size: 2\n  max_input_length: 12\n  max_gen_length: 3\n\
         training:\n  lr: 0.0002\n  seed: 5\n",
        model_dir.display()
    );
    serde_yaml::from_str(&yaml).unwrap()
}
