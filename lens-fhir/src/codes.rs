//! Coded concept normalization and comparison.

use lens_core::{Code, CodeMatch};
use serde_json::Value;

/// Flatten a CodeableConcept into code triples. Missing `system` and `display`
/// default to empty strings; codings without a string `code` are skipped.
pub fn extract_codes(concept: Option<&Value>) -> Vec<Code> {
    let Some(codings) = concept
        .and_then(|concept| concept.get("coding"))
        .and_then(Value::as_array)
    else {
        return Vec::new();
    };

    codings.iter().filter_map(coding_to_code).collect()
}

pub fn coding_to_code(coding: &Value) -> Option<Code> {
    let code = coding.get("code").and_then(Value::as_str)?;
    Some(Code {
        code: code.to_string(),
        system: string_field(coding, "system").unwrap_or_default(),
        display: string_field(coding, "display").unwrap_or_default(),
        source: None,
    })
}

/// `false` whenever either side is absent.
pub fn codes_match(a: Option<&Code>, b: Option<&Code>, mode: CodeMatch) -> bool {
    match (a, b) {
        (Some(a), Some(b)) => a.matches(b, mode),
        _ => false,
    }
}

/// Free text of a concept, trimmed. Blank text counts as absent.
pub fn concept_text(concept: Option<&Value>) -> Option<String> {
    concept
        .and_then(|concept| concept.get("text"))
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|text| !text.is_empty())
        .map(str::to_string)
}

/// Human label of a concept: text first, then the first display or code.
pub fn concept_label(concept: Option<&Value>) -> Option<String> {
    if let Some(text) = concept_text(concept) {
        return Some(text);
    }

    extract_codes(concept).into_iter().find_map(|code| {
        if !code.display.trim().is_empty() {
            Some(code.display.trim().to_string())
        } else if !code.code.trim().is_empty() {
            Some(code.code.trim().to_string())
        } else {
            None
        }
    })
}

/// Status-like fields are either a plain code string or a CodeableConcept.
pub fn status_code(value: Option<&Value>) -> Option<String> {
    let value = value?;
    if let Some(text) = value.as_str() {
        return Some(text.to_string());
    }
    extract_codes(Some(value))
        .into_iter()
        .next()
        .map(|code| code.code)
        .or_else(|| concept_text(Some(value)))
}

pub fn string_field(value: &Value, field: &str) -> Option<String> {
    value.get(field).and_then(Value::as_str).map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn defaults_missing_system_and_display() {
        let concept = json!({"coding": [{"code": "A"}, {"system": "S", "display": "no code"}]});
        let codes = extract_codes(Some(&concept));
        assert_eq!(codes, vec![Code::new("A", "")]);
    }

    #[test]
    fn non_list_coding_yields_nothing() {
        assert!(extract_codes(Some(&json!({"coding": "A"}))).is_empty());
        assert!(extract_codes(Some(&Value::Null)).is_empty());
        assert!(extract_codes(None).is_empty());
    }

    #[test]
    fn absent_codes_never_match() {
        let code = Code::new("1", "S");
        assert!(!codes_match(Some(&code), None, CodeMatch::Loose));
        assert!(!codes_match(None, Some(&code), CodeMatch::Strict));
        assert!(codes_match(Some(&code), Some(&code), CodeMatch::Strict));
    }

    #[test]
    fn status_code_reads_both_shapes() {
        let concept = json!({"coding": [{"code": "active"}]});
        assert_eq!(status_code(Some(&concept)).as_deref(), Some("active"));
        assert_eq!(status_code(Some(&json!("completed"))).as_deref(), Some("completed"));
        assert_eq!(status_code(None), None);
    }
}
