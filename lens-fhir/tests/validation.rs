use std::fs;

use lens_fhir::{validate_clinical_bundle, validate_epi, validate_persona_vector};
use serde_json::{json, Value};

fn fixture_path(name: &str) -> String {
    format!("{}/tests/data/{name}", env!("CARGO_MANIFEST_DIR"))
}

fn load(name: &str) -> Value {
    let raw = fs::read_to_string(fixture_path(name)).expect("could not read fixture");
    serde_json::from_str(&raw).expect("fixture is not valid JSON")
}

#[test]
fn fixtures_pass_their_validators() {
    assert!(validate_persona_vector(&load("persona_vector.json")).valid);
    assert!(validate_epi(&load("epi_bundle.json")).valid);
    assert!(validate_clinical_bundle(&load("clinical_bundle.json")).valid);
}

#[test]
fn persona_vector_problems_are_reported_not_raised() {
    let report = validate_persona_vector(&Value::Null);
    assert!(!report.valid);
    assert_eq!(report.errors.len(), 1);

    let report = validate_persona_vector(&json!({
        "resourceType": "Bundle",
        "type": "document",
        "entry": [{"resource": {"resourceType": "Patient"}}]
    }));
    assert!(!report.valid);
    assert_eq!(report.errors.len(), 2);

    let report =
        validate_persona_vector(&json!({"resourceType": "Observation", "type": "collection"}));
    assert_eq!(report.errors.len(), 2);
}

#[test]
fn epi_needs_exactly_one_composition() {
    let report = validate_epi(&load("clinical_bundle.json"));
    assert!(!report.valid);
    assert_eq!(report.errors, ["ePI must contain a Composition"]);

    let report = validate_epi(&json!({
        "resourceType": "Bundle",
        "entry": [
            {"resource": {"resourceType": "Composition"}},
            {"resource": {"resourceType": "Composition"}}
        ]
    }));
    assert_eq!(report.errors, ["ePI must contain exactly one Composition, found 2"]);
}

#[test]
fn clinical_bundle_needs_a_patient() {
    let report = validate_clinical_bundle(&load("epi_bundle.json"));
    assert!(!report.valid);
    assert_eq!(report.errors, ["Clinical bundle must contain a Patient"]);
    assert!(!validate_clinical_bundle(&json!("bundle")).valid);
}
