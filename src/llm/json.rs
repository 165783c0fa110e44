//! Pulling structured JSON out of free-form model output.

use crate::types::{AppError, Result};
use serde::de::DeserializeOwned;

/// Locates the outermost JSON object in a model response.
///
/// Models wrap JSON in prose or code fences often enough that the slice from
/// the first `{` to the last `}` is the reliable part.
pub fn extract_json_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    (end > start).then(|| &text[start..=end])
}

/// Parses the JSON object embedded in `text` into `T`.
///
/// Failures are reported as [`AppError::LLM`] so callers can decide whether
/// a malformed answer degrades or fails their stage.
pub fn parse_json_response<T: DeserializeOwned>(text: &str) -> Result<T> {
    let json = extract_json_object(text)
        .ok_or_else(|| AppError::LLM("No JSON object found in model response".to_string()))?;
    serde_json::from_str(json)
        .map_err(|e| AppError::LLM(format!("Model returned malformed JSON: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Deserialize, PartialEq)]
    struct Decision {
        ready: bool,
    }

    #[test]
    fn test_extracts_from_code_fence() {
        let text = "Sure!\n```json\n{\"ready\": true}\n```\nDone.";
        assert_eq!(extract_json_object(text), Some("{\"ready\": true}"));
        let parsed: Decision = parse_json_response(text).unwrap();
        assert_eq!(parsed, Decision { ready: true });
    }

    #[test]
    fn test_missing_object_is_llm_error() {
        let result: Result<Decision> = parse_json_response("no json here");
        assert!(matches!(result, Err(AppError::LLM(_))));
    }

    #[test]
    fn test_malformed_object_is_llm_error() {
        let result: Result<Decision> = parse_json_response("{ready: yes}");
        assert!(matches!(result, Err(AppError::LLM(_))));
    }
}
