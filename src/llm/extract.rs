//! Structured-value extraction from free-form generative-service replies.
//!
//! Models are asked for bare JSON but routinely wrap it in prose or fenced
//! code blocks. Extraction strips one layer of fencing, slices out the first
//! JSON object or array in the remaining text, and checks the parsed value
//! against the shape the caller asked for. Field values are never guessed;
//! anything short of a parseable candidate is a [`LlmError::MalformedResponse`]
//! for the caller's stage-specific fallback to handle.

use serde_json::Value;

use crate::error::LlmError;

/// Shape the caller expects the reply to parse into, resolved before the
/// call is made rather than inferred from whatever comes back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExpectedShape {
    Object,
    List,
}

/// Extract a structured value of the expected shape from raw reply text.
pub fn extract_structured(raw: &str, shape: ExpectedShape) -> Result<Value, LlmError> {
    let cleaned = strip_code_fences(raw);
    let candidate = slice_candidate(&cleaned).ok_or_else(|| {
        LlmError::MalformedResponse(format!(
            "no JSON object or array in response: {}",
            snippet(&cleaned)
        ))
    })?;
    let value: Value = serde_json::from_str(candidate)
        .map_err(|err| LlmError::MalformedResponse(format!("{err}: {}", snippet(candidate))))?;
    match (shape, &value) {
        (ExpectedShape::Object, Value::Object(_)) | (ExpectedShape::List, Value::Array(_)) => {
            Ok(value)
        }
        (ExpectedShape::Object, _) => Err(LlmError::MalformedResponse(
            "expected a JSON object".to_string(),
        )),
        (ExpectedShape::List, _) => Err(LlmError::MalformedResponse(
            "expected a JSON array".to_string(),
        )),
    }
}

/// Remove one layer of triple-backtick fencing, with or without a language
/// tag on the opening line.
pub fn strip_code_fences(raw: &str) -> String {
    let trimmed = raw.trim();
    if !trimmed.starts_with("```") {
        return trimmed.to_string();
    }
    let mut lines: Vec<&str> = trimmed.lines().collect();
    if let Some(first) = lines.first() {
        if first.trim_start().starts_with("```") {
            lines.remove(0);
        }
    }
    if let Some(last) = lines.last() {
        if last.trim_start().starts_with("```") {
            lines.pop();
        }
    }
    lines.join("\n").trim().to_string()
}

/// Slice from the first `{` or `[` (whichever opens first) to the matching
/// closer found scanning backward from the end.
fn slice_candidate(text: &str) -> Option<&str> {
    let first_brace = text.find('{');
    let first_bracket = text.find('[');
    let (start, closer) = match (first_brace, first_bracket) {
        (Some(brace), Some(bracket)) if brace < bracket => (brace, '}'),
        (Some(_), Some(bracket)) => (bracket, ']'),
        (Some(brace), None) => (brace, '}'),
        (None, Some(bracket)) => (bracket, ']'),
        (None, None) => return None,
    };
    let end = text.rfind(closer)?;
    if end < start {
        return None;
    }
    Some(&text[start..=end])
}

fn snippet(text: &str) -> String {
    crate::util::truncate_string(text, 200)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn fenced_block_parses_same_as_unwrapped() {
        let bare = r#"{"status": "Pass", "reason": ""}"#;
        let fenced = format!("```json\n{bare}\n```");
        let from_bare = extract_structured(bare, ExpectedShape::Object).unwrap();
        let from_fenced = extract_structured(&fenced, ExpectedShape::Object).unwrap();
        assert_eq!(from_bare, from_fenced);
    }

    #[test]
    fn fence_without_language_tag() {
        let text = "```\n[1, 2, 3]\n```";
        let value = extract_structured(text, ExpectedShape::List).unwrap();
        assert_eq!(value, json!([1, 2, 3]));
    }

    #[test]
    fn conversational_wrapping_is_tolerated() {
        let text = "Sure, here is the mapping you asked for:\n{\"Title\": \"case_name\"}\nLet me know if you need anything else.";
        let value = extract_structured(text, ExpectedShape::Object).unwrap();
        assert_eq!(value, json!({"Title": "case_name"}));
    }

    #[test]
    fn earlier_opener_wins() {
        // The array opens before the object, so the array delimiters bound
        // the candidate slice.
        let text = r#"[{"id": 0, "module": "auth"}]"#;
        let value = extract_structured(text, ExpectedShape::List).unwrap();
        assert_eq!(value[0]["module"], "auth");
    }

    #[test]
    fn backward_scan_takes_the_last_closer() {
        // Two arrays in one reply: the slice spans from the first opener to
        // the last closer and is not valid JSON, so extraction fails rather
        // than guessing which array was meant.
        let text = r#"[1, 2] or maybe ["x"]"#;
        let err = extract_structured(text, ExpectedShape::List);
        assert!(matches!(err, Err(LlmError::MalformedResponse(_))));
    }

    #[test]
    fn shape_mismatch_is_malformed() {
        let err = extract_structured("[1, 2]", ExpectedShape::Object).unwrap_err();
        assert!(matches!(err, LlmError::MalformedResponse(_)));
        let err = extract_structured("{\"a\": 1}", ExpectedShape::List).unwrap_err();
        assert!(matches!(err, LlmError::MalformedResponse(_)));
    }

    #[test]
    fn no_json_at_all_is_malformed() {
        let err = extract_structured("I could not produce a mapping.", ExpectedShape::Object);
        assert!(matches!(err, Err(LlmError::MalformedResponse(_))));
    }
}
