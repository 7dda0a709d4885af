//! Lenient JSON extraction from model output
//!
//! Models asked for "a JSON object only" still wrap the object in prose
//! or Markdown code fences often enough that strict parsing of the raw
//! text fails. The helpers here scan for the first balanced JSON object
//! and parse that instead.

use serde::de::DeserializeOwned;

use super::client::LlmError;

/// Extract the first balanced `{...}` object from model output.
///
/// Respects string literals and escapes, so braces inside JSON strings
/// don't confuse the depth count.
pub fn extract_json_object(text: &str) -> Option<String> {
    let start = text.find('{')?;
    let bytes = text.as_bytes();

    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (i, &b) in bytes.iter().enumerate().skip(start) {
        if in_string {
            if escaped {
                escaped = false;
            } else if b == b'\\' {
                escaped = true;
            } else if b == b'"' {
                in_string = false;
            }
            continue;
        }

        match b {
            b'"' => in_string = true,
            b'{' => depth += 1,
            b'}' => {
                depth -= 1;
                if depth == 0 {
                    // Both ends are ASCII bytes, so the slice is on char boundaries.
                    return Some(text[start..=i].to_string());
                }
            }
            _ => {}
        }
    }

    None
}

/// Parse model output into a typed value, tolerating surrounding prose
/// and code fences.
pub fn parse_json_response<T: DeserializeOwned>(text: &str) -> Result<T, LlmError> {
    let json = extract_json_object(text).ok_or_else(|| {
        LlmError::MalformedResponse("no JSON object found in model output".to_string())
    })?;

    serde_json::from_str(&json).map_err(|e| LlmError::MalformedResponse(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Deserialize, PartialEq)]
    struct Score {
        score: f64,
    }

    #[test]
    fn plain_object_parses() {
        let parsed: Score = parse_json_response(r#"{"score": 0.7}"#).unwrap();
        assert_eq!(parsed, Score { score: 0.7 });
    }

    #[test]
    fn code_fenced_object_parses() {
        let text = "Here is the result:\n```json\n{\"score\": 0.25}\n```\nLet me know.";
        let parsed: Score = parse_json_response(text).unwrap();
        assert_eq!(parsed.score, 0.25);
    }

    #[test]
    fn braces_inside_strings_are_ignored() {
        let text = r#"{"score": 1.0, "note": "weird {unbalanced} text \" with escape"}"#;
        let extracted = extract_json_object(text).unwrap();
        assert_eq!(extracted, text);
    }

    #[test]
    fn first_balanced_object_wins() {
        let text = r#"{"score": 0.5} trailing prose {"other": true}"#;
        let parsed: Score = parse_json_response(text).unwrap();
        assert_eq!(parsed.score, 0.5);
    }

    #[test]
    fn nested_objects_balance() {
        let text = r#"prefix {"a": {"b": {"c": 1}}, "score": 0.1} suffix"#;
        let extracted = extract_json_object(text).unwrap();
        assert!(extracted.starts_with("{\"a\""));
        assert!(extracted.ends_with('}'));
        let parsed: Score = serde_json::from_str(&extracted).unwrap();
        assert_eq!(parsed.score, 0.1);
    }

    #[test]
    fn missing_object_is_malformed() {
        let err = parse_json_response::<Score>("the model refused to answer").unwrap_err();
        assert!(matches!(err, LlmError::MalformedResponse(_)));
    }

    #[test]
    fn truncated_object_is_malformed() {
        assert!(extract_json_object(r#"{"score": 0.5"#).is_none());
    }
}
