//! Numeric answer extraction from `<...>` markers

use crate::error::{Error, Result};
use regex::Regex;
use std::sync::LazyLock;

static ANSWER_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<(.*?)>").expect("Invalid answer regex"));

fn parse_number(text: &str) -> Option<f64> {
    text.trim().parse::<f64>().ok()
}

/// Number inside the last `<...>` of generated text
///
/// Returns `(0.0, false)` when there is no marker or the last one does not
/// hold a number.
pub fn extract_prediction(text: &str) -> (f64, bool) {
    ANSWER_REGEX
        .captures_iter(text)
        .last()
        .and_then(|caps| parse_number(&caps[1]))
        .map_or((0.0, false), |value| (value, true))
}

/// Number inside the first `<...>` of a reference answer
pub fn extract_label(text: &str) -> Result<f64> {
    let caps = ANSWER_REGEX
        .captures(text)
        .ok_or_else(|| Error::InvalidLabel(format!("no <number> in {text:?}")))?;
    parse_number(&caps[1])
        .ok_or_else(|| Error::InvalidLabel(format!("{:?} is not a number", &caps[1])))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_prediction_uses_last_marker() {
        assert_eq!(extract_prediction("guess <3> then <4.5>"), (4.5, true));
        assert_eq!(extract_prediction("value: < -2 >"), (-2.0, true));
    }

    #[test]
    fn test_prediction_falls_back_to_zero() {
        assert_eq!(extract_prediction("no answer here"), (0.0, false));
        assert_eq!(extract_prediction("<7> but finally <seven>"), (0.0, false));
        assert_eq!(extract_prediction("<>"), (0.0, false));
    }

    #[test]
    fn test_label_uses_first_marker() {
        assert_eq!(extract_label("<12> <99>").unwrap(), 12.0);
        assert!(matches!(extract_label("twelve"), Err(Error::InvalidLabel(_))));
        assert!(matches!(extract_label("<twelve> <12>"), Err(Error::InvalidLabel(_))));
    }

    #[test]
    fn test_marker_does_not_span_lines() {
        assert_eq!(extract_prediction("<1\n2>"), (0.0, false));
    }

    proptest! {
        #[test]
        fn prop_formatted_numbers_round_trip(x in -1e6f64..1e6, prefix in "[a-z ]{0,12}") {
            let text = format!("{prefix}<{x}>");
            prop_assert_eq!(extract_prediction(&text), (x, true));
            prop_assert_eq!(extract_label(&text).unwrap(), x);
        }
    }
}
