//! Decoding of the model's completion text into an [`Assessment`].

use std::collections::BTreeMap;

use serde_json::{Map, Value};

use super::ScoringError;
use crate::job::{Assessment, Dimension, DimensionScore, ProficiencyLevel};

/// Returns the first balanced `{...}` object in `response`, skipping braces
/// inside string literals. Returns `None` if there is no complete object.
pub fn extract_json(response: &str) -> Option<&str> {
    let start = response.find('{')?;

    let mut depth = 0usize;
    let mut in_string = false;
    let mut escape_next = false;

    for (i, c) in response[start..].char_indices() {
        if escape_next {
            escape_next = false;
            continue;
        }

        match c {
            '\\' if in_string => escape_next = true,
            '"' => in_string = !in_string,
            '{' if !in_string => depth += 1,
            '}' if !in_string => {
                depth -= 1;
                if depth == 0 {
                    return Some(&response[start..start + i + 1]);
                }
            }
            _ => {}
        }
    }

    None
}

fn malformed(message: impl Into<String>) -> ScoringError {
    ScoringError::MalformedResponse(message.into())
}

/// Accepts `72.5`, `"72.5"` and `"72.5%"`.
fn score_value(object: &Map<String, Value>, key: &str) -> Result<Option<f64>, ScoringError> {
    match object.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Number(n)) => n
            .as_f64()
            .map(Some)
            .ok_or_else(|| malformed(format!("'{}' is not a finite number", key))),
        Some(Value::String(s)) => s
            .trim()
            .trim_end_matches('%')
            .trim()
            .parse::<f64>()
            .map(Some)
            .map_err(|_| malformed(format!("'{}' is not numeric: {:?}", key, s))),
        Some(other) => Err(malformed(format!("'{}' has unexpected type: {}", key, other))),
    }
}

fn text_value(object: &Map<String, Value>, key: &str) -> Result<String, ScoringError> {
    match object.get(key) {
        Some(Value::String(s)) => Ok(s.trim().to_string()),
        Some(Value::Null) | None => Ok(String::new()),
        Some(other) => Ok(other.to_string()),
    }
}

/// Parses a completion into a validated assessment.
///
/// Every dimension needs a score; a missing explanation becomes empty text.
/// A missing `overall_score` is computed as the mean of the dimension scores.
pub fn parse_assessment(completion: &str) -> Result<Assessment, ScoringError> {
    let json = extract_json(completion).ok_or_else(|| malformed("no JSON object in response"))?;
    let value: Value =
        serde_json::from_str(json).map_err(|e| malformed(format!("invalid JSON: {}", e)))?;
    let object = value
        .as_object()
        .ok_or_else(|| malformed("response is not a JSON object"))?;

    let level: ProficiencyLevel = object
        .get("level")
        .and_then(Value::as_str)
        .ok_or_else(|| malformed("missing 'level'"))?
        .parse()
        .map_err(malformed)?;

    let mut dimensions = BTreeMap::new();
    for dimension in Dimension::ALL {
        let score_key = format!("{}_score", dimension.key());
        let score = score_value(object, &score_key)?
            .ok_or_else(|| malformed(format!("missing '{}'", score_key)))?;
        dimensions.insert(
            dimension,
            DimensionScore {
                explanation: text_value(object, dimension.key())?,
                score,
            },
        );
    }

    let overall = score_value(object, "overall_score")?;

    Assessment::new(level, dimensions, overall).map_err(malformed)
}
