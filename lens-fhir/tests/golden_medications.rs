use std::fs;

use chrono::{TimeZone, Utc};
use lens_fhir::{
    get_all_dimensions, get_allergies, get_annotated_sections, get_conditions, get_medications,
    get_patient_info_at,
};
use serde::Serialize;
use serde_json::Value;

fn fixture_path(name: &str) -> String {
    format!("{}/tests/data/{name}", env!("CARGO_MANIFEST_DIR"))
}

fn load(name: &str) -> Value {
    let raw = fs::read_to_string(fixture_path(name)).expect("could not read fixture");
    serde_json::from_str(&raw).expect("fixture is not valid JSON")
}

#[test]
fn medication_facts_match_golden() {
    let bundle = load("clinical_bundle.json");

    let medications = get_medications(&bundle);
    let actual = serde_json::to_value(&medications).expect("could not serialize medications");

    assert_eq!(actual, load("medications_snapshot.json"));
}

fn as_json<T: Serialize>(value: &T) -> Value {
    serde_json::to_value(value).expect("could not serialize extractor output")
}

#[test]
fn extraction_is_idempotent() {
    let bundle = load("clinical_bundle.json");
    let before = bundle.clone();
    let now = Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap();

    assert_eq!(get_medications(&bundle), get_medications(&bundle));
    assert_eq!(as_json(&get_conditions(&bundle)), as_json(&get_conditions(&bundle)));
    assert_eq!(as_json(&get_allergies(&bundle)), as_json(&get_allergies(&bundle)));
    assert_eq!(
        as_json(&get_patient_info_at(&bundle, now)),
        as_json(&get_patient_info_at(&bundle, now))
    );
    assert_eq!(bundle, before);
}

#[test]
fn section_and_dimension_reads_are_idempotent() {
    let epi = load("epi_bundle.json");
    let persona = load("persona_vector.json");

    let sections = as_json(&get_annotated_sections(&epi));
    assert_ne!(sections, Value::Array(Vec::new()));
    assert_eq!(sections, as_json(&get_annotated_sections(&epi)));

    let dimensions = as_json(&get_all_dimensions(&persona));
    assert_ne!(dimensions, Value::Array(Vec::new()));
    assert_eq!(dimensions, as_json(&get_all_dimensions(&persona)));
}
