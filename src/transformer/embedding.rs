//! Token embedding lookup

use crate::error::{Error, Result};
use crate::Tensor;
use std::rc::Rc;

/// Frozen `vocab × hidden` embedding table
///
/// The table is reference counted so a tied `lm_head` can share it.
pub struct Embedding {
    weight: Rc<[f32]>,
    vocab_size: usize,
    hidden_size: usize,
}

impl Embedding {
    pub fn new(weight: Rc<[f32]>, vocab_size: usize, hidden_size: usize) -> Self {
        assert_eq!(weight.len(), vocab_size * hidden_size, "embedding table size");
        Self { weight, vocab_size, hidden_size }
    }

    /// Rows of the table for each token id, flattened
    pub fn forward(&self, token_ids: &[u32]) -> Result<Tensor> {
        let h = self.hidden_size;
        let mut output = Vec::with_capacity(token_ids.len() * h);
        for &id in token_ids {
            let idx = id as usize;
            if idx >= self.vocab_size {
                return Err(Error::ConfigError(format!(
                    "token id {id} is outside the vocabulary ({} entries)",
                    self.vocab_size
                )));
            }
            output.extend_from_slice(&self.weight[idx * h..(idx + 1) * h]);
        }
        Ok(Tensor::from_vec(output, false))
    }

    pub fn weight(&self) -> &Rc<[f32]> {
        &self.weight
    }

    pub fn vocab_size(&self) -> usize {
        self.vocab_size
    }

    pub fn hidden_size(&self) -> usize {
        self.hidden_size
    }
}
