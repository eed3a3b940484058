//! Recovering JSON objects from model output.

/// Strip an optional markdown code fence (```` ```json ... ``` ````) around
/// a model response.
pub fn strip_code_fence(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };

    // Drop the info string ("json", "JSON", ...) up to the first newline.
    let body = match rest.find('\n') {
        Some(pos) if rest[..pos].chars().all(|c| c.is_ascii_alphanumeric()) => &rest[pos + 1..],
        _ => rest
            .trim_start_matches(|c: char| c.is_ascii_alphabetic())
            .trim_start(),
    };

    body.trim_end().trim_end_matches('`').trim()
}

/// Extract a JSON object from model output that may carry a fence or
/// surrounding prose.
pub fn extract_json_object(text: &str) -> &str {
    let unfenced = strip_code_fence(text);
    if unfenced.starts_with('{') {
        return unfenced;
    }

    if let (Some(start), Some(end)) = (unfenced.find('{'), unfenced.rfind('}'))
        && end > start
    {
        return &unfenced[start..=end];
    }

    unfenced
}

/// Parse model output as a JSON object.
pub fn parse_object(text: &str) -> Result<serde_json::Value, serde_json::Error> {
    let value: serde_json::Value = serde_json::from_str(extract_json_object(text))?;
    if value.is_object() {
        Ok(value)
    } else {
        Err(serde::de::Error::custom(format!(
            "expected a JSON object, got {}",
            kind_of(&value)
        )))
    }
}

fn kind_of(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "a boolean",
        serde_json::Value::Number(_) => "a number",
        serde_json::Value::String(_) => "a string",
        serde_json::Value::Array(_) => "an array",
        serde_json::Value::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_json_passes_through() {
        let input = r#"{"betreff": "Unfall"}"#;
        assert_eq!(strip_code_fence(input), input);
        assert_eq!(extract_json_object(input), input);
    }

    #[test]
    fn fenced_json_matches_unwrapped() {
        let bare = r#"{"mandant": {"vorname": "Max"}}"#;
        let fenced = format!("```json\n{bare}\n```");
        assert_eq!(parse_object(&fenced).unwrap(), parse_object(bare).unwrap());
    }

    #[test]
    fn fence_without_info_string() {
        assert_eq!(strip_code_fence("```\n{\"a\": 1}\n```"), "{\"a\": 1}");
    }

    #[test]
    fn fence_on_single_line() {
        assert_eq!(strip_code_fence("```json {\"a\": 1}```"), "{\"a\": 1}");
    }

    #[test]
    fn object_embedded_in_prose() {
        let input = "Hier ist das Ergebnis: {\"betreff\": \"x\"} Viele Grüße";
        assert_eq!(extract_json_object(input), "{\"betreff\": \"x\"}");
    }

    #[test]
    fn non_object_is_rejected() {
        assert!(parse_object("[1, 2, 3]").is_err());
        assert!(parse_object("keine Daten gefunden").is_err());
        assert!(parse_object("").is_err());
    }
}
