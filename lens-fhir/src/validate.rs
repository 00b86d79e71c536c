//! Structural checks on incoming collections. They report problems instead of
//! failing so the caller decides whether to continue.

use lens_core::{ResourceKind, ValidationReport};
use serde_json::Value;

use crate::index::{entry_resources, resource_type};

/// Bundle of type `collection` holding at least one Observation.
pub fn validate_persona_vector(collection: &Value) -> ValidationReport {
    let mut errors = Vec::new();
    if !collection.is_object() {
        errors.push("Persona vector must be a JSON object".to_string());
        return ValidationReport::from_errors(errors);
    }

    check_bundle_type(collection, &mut errors);
    if collection.get("type").and_then(Value::as_str) != Some("collection") {
        errors.push("Persona vector must be a Bundle of type 'collection'".to_string());
    }

    match collection.get("entry").and_then(Value::as_array) {
        Some(entries) => {
            if count_of(entries, &ResourceKind::Observation) == 0 {
                errors.push("Persona vector must contain at least one Observation".to_string());
            }
        }
        None => errors.push("Persona vector has no entry list".to_string()),
    }

    ValidationReport::from_errors(errors)
}

/// Bundle holding exactly one Composition.
pub fn validate_epi(doc: &Value) -> ValidationReport {
    let mut errors = Vec::new();
    if !doc.is_object() {
        errors.push("ePI must be a JSON object".to_string());
        return ValidationReport::from_errors(errors);
    }

    check_bundle_type(doc, &mut errors);

    match doc.get("entry").and_then(Value::as_array) {
        Some(entries) => match count_of(entries, &ResourceKind::Composition) {
            0 => errors.push("ePI must contain a Composition".to_string()),
            1 => {}
            many => errors.push(format!(
                "ePI must contain exactly one Composition, found {many}"
            )),
        },
        None => errors.push("ePI has no entry list".to_string()),
    }

    ValidationReport::from_errors(errors)
}

/// Bundle with an entry list and at least one Patient.
pub fn validate_clinical_bundle(bundle: &Value) -> ValidationReport {
    let mut errors = Vec::new();
    if !bundle.is_object() {
        errors.push("Clinical bundle must be a JSON object".to_string());
        return ValidationReport::from_errors(errors);
    }

    check_bundle_type(bundle, &mut errors);

    match bundle.get("entry").and_then(Value::as_array) {
        Some(entries) => {
            if count_of(entries, &ResourceKind::Patient) == 0 {
                errors.push("Clinical bundle must contain a Patient".to_string());
            }
        }
        None => errors.push("Clinical bundle has no entry list".to_string()),
    }

    ValidationReport::from_errors(errors)
}

fn check_bundle_type(value: &Value, errors: &mut Vec<String>) {
    match resource_type(value) {
        Some("Bundle") => {}
        Some(other) => errors.push(format!("Expected resourceType Bundle, received {other}")),
        None => errors.push("Missing resourceType".to_string()),
    }
}

fn count_of(entries: &[Value], kind: &ResourceKind) -> usize {
    entry_resources(entries)
        .filter(|resource| resource_type(resource) == Some(kind.as_str()))
        .count()
}
