//! Per-epoch buffers for generated answers and their score

use super::extract::{extract_label, extract_prediction};
use crate::error::{Error, Result};
use serde::Serialize;
use std::fmt;
use std::io::{BufWriter, Write};
use std::path::Path;

/// MAE over one validation or test epoch
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EvalReport {
    /// Mean absolute error; NaN when nothing was collected
    pub mae: f64,
    pub count: usize,
    /// Generations without a parseable `<number>`, scored as 0
    pub parse_failures: usize,
}

impl fmt::Display for EvalReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "MAE {:.4} over {} samples ({} unparseable)",
            self.mae, self.count, self.parse_failures
        )
    }
}

#[derive(Serialize)]
struct PredictionRecord<'a> {
    input: &'a str,
    generated_text: &'a str,
    label: &'a str,
    prediction: f64,
    parsed: bool,
}

/// Inputs, generations and reference answers gathered during an epoch
#[derive(Debug, Clone, Default)]
pub struct EvalCollector {
    inputs: Vec<String>,
    generated: Vec<String>,
    labels: Vec<String>,
}

impl EvalCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reset(&mut self) {
        self.inputs.clear();
        self.generated.clear();
        self.labels.clear();
    }

    pub fn push(
        &mut self,
        input: impl Into<String>,
        generated_text: impl Into<String>,
        label: impl Into<String>,
    ) {
        self.inputs.push(input.into());
        self.generated.push(generated_text.into());
        self.labels.push(label.into());
    }

    pub fn len(&self) -> usize {
        self.generated.len()
    }

    pub fn is_empty(&self) -> bool {
        self.generated.is_empty()
    }

    /// Score every buffered generation against its label
    ///
    /// A label without a number is an error; an unparseable generation counts
    /// as a prediction of 0.
    pub fn compute(&self) -> Result<EvalReport> {
        let mut total = 0.0;
        let mut parse_failures = 0;
        for (generated, label) in self.generated.iter().zip(&self.labels) {
            let (prediction, parsed) = extract_prediction(generated);
            if !parsed {
                parse_failures += 1;
            }
            total += (prediction - extract_label(label)?).abs();
        }
        let count = self.len();
        let mae = if count == 0 { f64::NAN } else { total / count as f64 };
        Ok(EvalReport { mae, count, parse_failures })
    }

    /// One JSON object per sample
    pub fn write_jsonl(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| Error::io(parent, e))?;
        }
        let file = std::fs::File::create(path).map_err(|e| Error::io(path, e))?;
        let mut writer = BufWriter::new(file);
        for ((input, generated_text), label) in
            self.inputs.iter().zip(&self.generated).zip(&self.labels)
        {
            let (prediction, parsed) = extract_prediction(generated_text);
            let record = PredictionRecord { input, generated_text, label, prediction, parsed };
            serde_json::to_writer(&mut writer, &record)?;
            writer.write_all(b"\n").map_err(|e| Error::io(path, e))?;
        }
        writer.flush().map_err(|e| Error::io(path, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use tempfile::TempDir;

    #[test]
    fn test_mae_counts_unparsed_as_zero() {
        let mut collector = EvalCollector::new();
        collector.push("q1", "q1 <3>", "<5>");
        collector.push("q2", "q2 <1.5> <2.5>", "<2>");
        collector.push("q3", "q3 no idea", "<4>");
        let report = collector.compute().unwrap();
        assert_eq!(report.count, 3);
        assert_eq!(report.parse_failures, 1);
        assert_abs_diff_eq!(report.mae, (2.0 + 0.5 + 4.0) / 3.0, epsilon = 1e-12);
    }

    #[test]
    fn test_reset_clears_epoch() {
        let mut collector = EvalCollector::new();
        collector.push("q", "<1>", "<1>");
        collector.reset();
        assert!(collector.is_empty());
        assert!(collector.compute().unwrap().mae.is_nan());
    }

    #[test]
    fn test_bad_label_is_error() {
        let mut collector = EvalCollector::new();
        collector.push("q", "<1>", "one");
        assert!(matches!(collector.compute(), Err(Error::InvalidLabel(_))));
    }

    #[test]
    fn test_write_jsonl() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("preds/val.jsonl");
        let mut collector = EvalCollector::new();
        collector.push("a", "<1>", "<2>");
        collector.push("b", "none", "<3>");
        collector.write_jsonl(&path).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        let rows: Vec<serde_json::Value> =
            text.lines().map(|l| serde_json::from_str(l).unwrap()).collect();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0]["prediction"], 1.0);
        assert_eq!(rows[1]["parsed"], false);
        assert_eq!(rows[1]["input"], "b");
    }
}
