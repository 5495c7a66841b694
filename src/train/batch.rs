//! Batch data structure and causal-LM label construction

use crate::tokenizer::EncodedBatch;

/// Label value excluded from the loss
pub const IGNORE_INDEX: i64 = -100;

/// A batch of `(input, answer)` examples
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Batch {
    /// Prompts
    pub inputs: Vec<String>,
    /// Reference answers, e.g. `"<42>"`
    pub answers: Vec<String>,
}

impl Batch {
    /// Create a new batch
    ///
    /// # Panics
    ///
    /// Panics if `inputs` and `answers` differ in length.
    pub fn new(inputs: Vec<String>, answers: Vec<String>) -> Self {
        assert_eq!(inputs.len(), answers.len(), "Batch inputs and answers must have the same length");
        Self { inputs, answers }
    }

    /// Number of examples
    pub fn size(&self) -> usize {
        self.inputs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inputs.is_empty()
    }

    /// `(prompt, answer)` pairs for pair encoding
    pub fn pairs(&self) -> Vec<(&str, &str)> {
        self.inputs.iter().map(String::as_str).zip(self.answers.iter().map(String::as_str)).collect()
    }

    pub fn prompts(&self) -> Vec<&str> {
        self.inputs.iter().map(String::as_str).collect()
    }
}

/// Labels for a pair-encoded batch
///
/// Copies `input_ids` and sets [`IGNORE_INDEX`] wherever the token is padding
/// or belongs to the prompt segment (token type 0), so only answer tokens
/// are scored.
pub fn build_labels(encoded: &EncodedBatch, pad_id: u32) -> Vec<i64> {
    encoded
        .input_ids
        .iter()
        .zip(&encoded.token_type_ids)
        .map(|(&id, &type_id)| if id == pad_id || type_id == 0 { IGNORE_INDEX } else { i64::from(id) })
        .collect()
}

/// Hidden-state rows and their next-token targets after the causal shift
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ShiftedTargets {
    /// Rows `b·seq + t` of the `batch·seq` hidden states
    pub rows: Vec<usize>,
    /// Token expected at position `t + 1`
    pub targets: Vec<usize>,
}

impl ShiftedTargets {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Position `t` predicts label `t + 1`; ignored labels drop out
pub fn shift_targets(labels: &[i64], batch: usize, seq: usize) -> ShiftedTargets {
    let mut shifted = ShiftedTargets::default();
    for b in 0..batch {
        for t in 0..seq.saturating_sub(1) {
            let label = labels[b * seq + t + 1];
            if label != IGNORE_INDEX {
                shifted.rows.push(b * seq + t);
                shifted.targets.push(label as usize);
            }
        }
    }
    shifted
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn encoded() -> EncodedBatch {
        EncodedBatch {
            input_ids: vec![0, 0, 1, 6, 7, 9, 1, 5, 6, 7, 8, 9],
            attention_mask: vec![0, 0, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1],
            token_type_ids: vec![0, 0, 0, 0, 0, 1, 0, 0, 0, 0, 1, 1],
            batch: 2,
            seq: 6,
        }
    }

    #[test]
    fn test_batch_pairs() {
        let batch = Batch::new(vec!["a".into(), "b".into()], vec!["<1>".into(), "<2>".into()]);
        assert_eq!(batch.size(), 2);
        assert_eq!(batch.pairs(), vec![("a", "<1>"), ("b", "<2>")]);
    }

    #[test]
    #[should_panic(expected = "same length")]
    fn test_batch_new_rejects_unpaired_answers() {
        let _ = Batch::new(vec!["a".into(), "b".into()], vec!["<1>".into()]);
    }

    #[test]
    fn test_labels_mask_padding_and_prompt() {
        let labels = build_labels(&encoded(), 0);
        assert_eq!(labels, vec![-100, -100, -100, -100, -100, 9, -100, -100, -100, -100, 8, 9]);
    }

    #[test]
    fn test_answer_token_equal_to_pad_is_ignored() {
        let mut enc = encoded();
        enc.input_ids[5] = 0;
        assert_eq!(build_labels(&enc, 0)[5], IGNORE_INDEX);
    }

    #[test]
    fn test_shift_targets() {
        let labels = build_labels(&encoded(), 0);
        let shifted = shift_targets(&labels, 2, 6);
        assert_eq!(shifted.rows, vec![4, 9, 10]);
        assert_eq!(shifted.targets, vec![9, 8, 9]);
    }

    #[test]
    fn test_all_ignored_batch_has_no_targets() {
        assert!(shift_targets(&[IGNORE_INDEX; 8], 2, 4).is_empty());
    }

    proptest! {
        #[test]
        fn prop_shifted_targets_match_labels(
            labels in prop::collection::vec(prop_oneof![Just(IGNORE_INDEX), 0i64..50], 1..40)
        ) {
            let seq = labels.len();
            let shifted = shift_targets(&labels, 1, seq);
            let expected = labels[1..].iter().filter(|&&l| l != IGNORE_INDEX).count();
            prop_assert_eq!(shifted.len(), expected);
            for (&row, &target) in shifted.rows.iter().zip(&shifted.targets) {
                prop_assert_eq!(labels[row + 1], target as i64);
            }
        }
    }
}
