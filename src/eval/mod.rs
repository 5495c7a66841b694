//! Scoring of generated numeric answers
//!
//! Answers are written as `<number>`. Predictions take the last marker of the
//! generated text, labels the first marker of the reference, and an epoch is
//! scored by mean absolute error.

mod collector;
mod extract;

pub use collector::{EvalCollector, EvalReport};
pub use extract::{extract_label, extract_prediction};
