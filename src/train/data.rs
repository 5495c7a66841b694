//! JSONL examples and batching

use super::batch::Batch;
use crate::error::{Error, Result};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// One `{"input": ..., "answer": ...}` line
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Example {
    pub input: String,
    pub answer: String,
}

/// Examples read from a JSON Lines file
#[derive(Clone, Debug, Default)]
pub struct JsonlDataset {
    examples: Vec<Example>,
}

impl JsonlDataset {
    /// Read one example per non-blank line
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| Error::io(path, e))?;
        let examples = text
            .lines()
            .enumerate()
            .filter(|(_, line)| !line.trim().is_empty())
            .map(|(i, line)| {
                serde_json::from_str(line).map_err(|e| {
                    Error::ConfigError(format!("{}:{}: {e}", path.display(), i + 1))
                })
            })
            .collect::<Result<Vec<Example>>>()?;
        Ok(Self { examples })
    }

    pub fn from_examples(examples: Vec<Example>) -> Self {
        Self { examples }
    }

    pub fn len(&self) -> usize {
        self.examples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.examples.is_empty()
    }

    pub fn examples(&self) -> &[Example] {
        &self.examples
    }

    /// Keep at most the first `n` examples
    pub fn truncate(&mut self, n: usize) {
        self.examples.truncate(n);
    }
}

/// Splits a dataset into batches, optionally reshuffled every epoch
#[derive(Clone, Debug)]
pub struct DataLoader {
    dataset: JsonlDataset,
    batch_size: usize,
    shuffle: bool,
}

impl DataLoader {
    pub fn new(dataset: JsonlDataset, batch_size: usize, shuffle: bool) -> Self {
        Self { dataset, batch_size: batch_size.max(1), shuffle }
    }

    pub fn dataset(&self) -> &JsonlDataset {
        &self.dataset
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Number of batches per epoch, the last one possibly short
    pub fn num_batches(&self) -> usize {
        self.dataset.len().div_ceil(self.batch_size)
    }

    /// Batches for one epoch; `rng` is used only when shuffling is enabled
    pub fn batches(&self, rng: Option<&mut StdRng>) -> Vec<Batch> {
        let mut order: Vec<usize> = (0..self.dataset.len()).collect();
        if let (true, Some(rng)) = (self.shuffle, rng) {
            order.shuffle(rng);
        }
        order
            .chunks(self.batch_size)
            .map(|chunk| {
                let (inputs, answers) = chunk
                    .iter()
                    .map(|&i| {
                        let ex = &self.dataset.examples[i];
                        (ex.input.clone(), ex.answer.clone())
                    })
                    .unzip();
                Batch::new(inputs, answers)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use tempfile::TempDir;

    fn dataset(n: usize) -> JsonlDataset {
        JsonlDataset::from_examples(
            (0..n).map(|i| Example { input: format!("q{i}"), answer: format!("<{i}>") }).collect(),
        )
    }

    #[test]
    fn test_from_file_skips_blank_lines() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("train.jsonl");
        std::fs::write(
            &path,
            "{\"input\": \"2+2\", \"answer\": \"<4>\"}\n\n{\"input\": \"1+1\", \"answer\": \"<2>\"}\n",
        )
        .unwrap();
        let data = JsonlDataset::from_file(&path).unwrap();
        assert_eq!(data.len(), 2);
        assert_eq!(data.examples()[1].answer, "<2>");
    }

    #[test]
    fn test_bad_line_reports_line_number() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("bad.jsonl");
        std::fs::write(&path, "{\"input\": \"x\", \"answer\": \"<1>\"}\n{\"input\": 3}\n").unwrap();
        let err = JsonlDataset::from_file(&path).unwrap_err();
        assert!(err.to_string().contains("bad.jsonl:2"), "{err}");
    }

    #[test]
    fn test_batches_in_order_without_shuffle() {
        let loader = DataLoader::new(dataset(5), 2, false);
        assert_eq!(loader.num_batches(), 3);
        let batches = loader.batches(None);
        assert_eq!(batches[0].inputs, vec!["q0", "q1"]);
        assert_eq!(batches[2].inputs, vec!["q4"]);
    }

    #[test]
    fn test_shuffle_is_seeded_and_complete() {
        let loader = DataLoader::new(dataset(10), 3, true);
        let mut a = StdRng::seed_from_u64(42);
        let mut b = StdRng::seed_from_u64(42);
        let first = loader.batches(Some(&mut a));
        assert_eq!(first, loader.batches(Some(&mut b)));

        let mut seen: Vec<String> = first.into_iter().flat_map(|b| b.inputs).collect();
        seen.sort();
        let mut expected: Vec<String> = (0..10).map(|i| format!("q{i}")).collect();
        expected.sort();
        assert_eq!(seen, expected);
    }
}
