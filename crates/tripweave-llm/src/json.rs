use tripweave_core::error::{Result, TripweaveError};

/// Pull the first JSON object out of a model reply.
///
/// Models often wrap JSON in prose or a fenced block; the outermost balanced
/// `{ ... }` span is parsed, skipping braces inside string literals.
pub fn extract_json(text: &str) -> Result<serde_json::Value> {
    if let Ok(value) = serde_json::from_str::<serde_json::Value>(text.trim()) {
        if value.is_object() {
            return Ok(value);
        }
    }

    let mut search_from = 0;
    while let Some(offset) = text[search_from..].find('{') {
        let start = search_from + offset;
        if let Some(end) = balanced_end(&text[start..]) {
            let candidate = &text[start..start + end];
            if let Ok(value) = serde_json::from_str::<serde_json::Value>(candidate) {
                return Ok(value);
            }
        }
        search_from = start + 1;
    }

    Err(TripweaveError::ReasoningParse(
        "no JSON object found in reply".into(),
    ))
}

fn balanced_end(s: &str) -> Option<usize> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (i, c) in s.char_indices() {
        if in_string {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth = depth.checked_sub(1)?;
                if depth == 0 {
                    return Some(i + 1);
                }
            }
            _ => {}
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_json() {
        let v = extract_json(r#"{"a": 1}"#).unwrap();
        assert_eq!(v["a"], 1);
    }

    #[test]
    fn test_fenced_json_with_prose() {
        let reply = "Here is the plan:\n```json\n{\"summary\": \"use {braces} freely\", \"n\": 2}\n```\nEnjoy!";
        let v = extract_json(reply).unwrap();
        assert_eq!(v["summary"], "use {braces} freely");
        assert_eq!(v["n"], 2);
    }

    #[test]
    fn test_skips_invalid_candidates() {
        let reply = "{not json} then {\"ok\": true}";
        assert_eq!(extract_json(reply).unwrap()["ok"], true);
    }

    #[test]
    fn test_no_object() {
        assert!(matches!(
            extract_json("no braces here"),
            Err(TripweaveError::ReasoningParse(_))
        ));
    }
}
