use std::fs;

use chrono::{TimeZone, Utc};
use lens_core::{Code, CodeSource, ObservationValue, ResourceKind};
use lens_fhir::{
    get_allergies, get_conditions, get_medications, get_observations_by_code,
    get_patient_contacts, get_patient_extensions, get_patient_info, get_patient_info_at,
    has_occupation, resolve_reference, resources_by_type, ClinicalBundle, ObservationOptions,
};
use serde_json::{json, Value};

fn fixture_path(name: &str) -> String {
    format!("{}/tests/data/{name}", env!("CARGO_MANIFEST_DIR"))
}

fn clinical_bundle() -> Value {
    let raw = fs::read_to_string(fixture_path("clinical_bundle.json"))
        .expect("could not read clinical bundle");
    serde_json::from_str(&raw).expect("clinical bundle is not valid JSON")
}

fn malformed_inputs() -> Vec<Value> {
    vec![
        Value::Null,
        json!({}),
        json!({"entry": null}),
        json!({"entry": "not-a-list"}),
        json!([1, 2, 3]),
    ]
}

#[test]
fn malformed_bundles_degrade_to_empty_results() {
    for input in malformed_inputs() {
        assert!(get_patient_info(&input).is_none(), "{input}");
        assert!(get_conditions(&input).is_empty(), "{input}");
        assert!(get_allergies(&input).is_empty(), "{input}");
        assert!(get_medications(&input).is_empty(), "{input}");
        assert!(
            get_observations_by_code(&input, &["29463-7"], &ObservationOptions::default())
                .is_empty(),
            "{input}"
        );
        assert!(get_patient_extensions(&input, None).is_empty(), "{input}");
        assert!(get_patient_contacts(&input).is_empty(), "{input}");
        assert!(!has_occupation(&input, "2221"), "{input}");
        assert!(resources_by_type(&input, &ResourceKind::Patient).is_empty());
    }
}

#[test]
fn resources_by_type_keeps_entry_order_and_skips_junk() {
    let bundle = clinical_bundle();
    let observations = resources_by_type(&bundle, &ResourceKind::Observation);
    let ids: Vec<&str> = observations
        .iter()
        .filter_map(|resource| resource["id"].as_str())
        .collect();
    assert_eq!(ids, ["obs-occupation", "obs-weight", "obs-egfr"]);
    assert!(resources_by_type(&bundle, &ResourceKind::Other("Encounter".into())).is_empty());
}

#[test]
fn resolve_reference_finds_exact_type_and_id() {
    let bundle = clinical_bundle();
    let entries = bundle["entry"].as_array().unwrap();
    let medication = resolve_reference("Medication/med-1", entries).unwrap();
    assert_eq!(medication["code"]["coding"][0]["code"], "N02BE01");
    assert!(resolve_reference("Practitioner/med-1", entries).is_none());
    assert!(resolve_reference("med-1", entries).is_none());
    assert!(resolve_reference("", entries).is_none());
}

#[test]
fn patient_age_uses_reference_date() {
    let bundle = clinical_bundle();
    let now = Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap();
    let patient = get_patient_info_at(&bundle, now).unwrap();

    assert_eq!(patient.id(), Some("pat-1"));
    assert_eq!(patient.gender(), Some("female"));
    assert_eq!(patient.birth_date(), Some("1990-01-01"));
    let age = patient.age.unwrap();
    assert!((30..40).contains(&age));
    assert_eq!(age, 34);
}

#[test]
fn first_patient_wins_and_bad_birth_date_has_no_age() {
    let bundle = json!({
        "entry": [
            {"resource": {"resourceType": "Patient", "id": "first", "birthDate": "sometime"}},
            {"resource": {"resourceType": "Patient", "id": "second", "birthDate": "1980-01-01"}}
        ]
    });
    let patient = get_patient_info(&bundle).unwrap();
    assert_eq!(patient.id(), Some("first"));
    assert_eq!(patient.age, None);
}

#[test]
fn conditions_are_emitted_even_without_codes() {
    let conditions = get_conditions(&clinical_bundle());
    assert_eq!(conditions.len(), 2);

    let pregnancy = &conditions[0];
    assert_eq!(pregnancy.id.as_deref(), Some("cond-pregnancy"));
    assert_eq!(
        pregnancy.codes,
        vec![Code::new("77386006", "http://snomed.info/sct").with_display("Pregnancy")]
    );
    assert_eq!(pregnancy.text.as_deref(), Some("Pregnant"));
    assert_eq!(pregnancy.clinical_status.as_deref(), Some("active"));
    assert_eq!(pregnancy.verification_status.as_deref(), Some("confirmed"));

    let uncoded = &conditions[1];
    assert!(uncoded.codes.is_empty());
    assert_eq!(uncoded.text, None);
    assert_eq!(uncoded.clinical_status.as_deref(), Some("resolved"));

    let json = serde_json::to_value(uncoded).unwrap();
    assert_eq!(json["codes"], json!([]));
}

#[test]
fn allergies_carry_status_fields() {
    let allergies = get_allergies(&clinical_bundle());
    assert_eq!(allergies.len(), 1);
    let allergy = &allergies[0];
    assert_eq!(allergy.codes[0].code, "764146007");
    assert_eq!(allergy.criticality.as_deref(), Some("high"));
    assert_eq!(allergy.category, vec!["medication".to_string()]);
    assert_eq!(allergy.allergy_type.as_deref(), Some("allergy"));
}

#[test]
fn referenced_medication_merges_code_and_ingredients() {
    let medications = get_medications(&clinical_bundle());
    let statement = &medications[0];

    let sources: Vec<Option<CodeSource>> =
        statement.codes.iter().map(|code| code.source).collect();
    assert_eq!(
        sources,
        vec![
            Some(CodeSource::MedicationCode),
            Some(CodeSource::Ingredient),
            Some(CodeSource::Ingredient)
        ]
    );
    assert_eq!(statement.resource_type, ResourceKind::MedicationStatement);
}

#[test]
fn medications_without_codes_are_dropped() {
    let bundle = clinical_bundle();
    let activities = bundle["entry"]
        .as_array()
        .unwrap()
        .iter()
        .filter(|entry| {
            entry["resource"]["resourceType"]
                .as_str()
                .is_some_and(|kind| ResourceKind::parse(kind).is_medication_activity())
        })
        .count();
    let medications = get_medications(&bundle);

    assert_eq!(activities, 4);
    assert_eq!(medications.len(), 2);
    assert!(medications
        .iter()
        .all(|fact| fact.id.as_deref() != Some("ma-dangling")
            && fact.id.as_deref() != Some("md-empty")));
}

#[test]
fn inline_codes_come_before_resolved_codes() {
    let bundle = json!({
        "entry": [
            {"resource": {
                "resourceType": "MedicationAdministration",
                "id": "ma-1",
                "medicationCodeableConcept": {"coding": [{"code": "inline"}]},
                "medicationReference": {"reference": "Medication/m"}
            }},
            {"resource": {
                "resourceType": "Medication",
                "id": "m",
                "code": {"coding": [{"code": "product", "system": "S"}]},
                "ingredient": [
                    {"itemCodeableConcept": {"coding": [{"code": "i1"}, {"code": "i2"}]}},
                    {"itemReference": {"reference": "Substance/x"}}
                ]
            }}
        ]
    });
    let medications = get_medications(&bundle);
    assert_eq!(medications.len(), 1);

    let codes: Vec<(&str, Option<CodeSource>)> = medications[0]
        .codes
        .iter()
        .map(|code| (code.code.as_str(), code.source))
        .collect();
    assert_eq!(
        codes,
        vec![
            ("inline", None),
            ("product", Some(CodeSource::MedicationCode)),
            ("i1", Some(CodeSource::Ingredient)),
            ("i2", Some(CodeSource::Ingredient)),
        ]
    );
}

#[test]
fn r5_medication_shape_is_understood() {
    let bundle = json!({
        "entry": [
            {"resource": {
                "resourceType": "MedicationStatement",
                "id": "r5",
                "medication": {"reference": {"reference": "Medication/m"}}
            }},
            {"resource": {
                "resourceType": "Medication",
                "id": "m",
                "code": {"coding": [{"code": "product"}]},
                "ingredient": [{"item": {"concept": {"coding": [{"code": "active"}]}}}]
            }}
        ]
    });
    let codes: Vec<String> = get_medications(&bundle)[0]
        .codes
        .iter()
        .map(|code| code.code.clone())
        .collect();
    assert_eq!(codes, ["product", "active"]);
}

#[test]
fn observations_match_on_code_value_only() {
    let bundle = clinical_bundle();
    let weights =
        get_observations_by_code(&bundle, &["29463-7"], &ObservationOptions::default());
    assert_eq!(weights.len(), 1);
    assert_eq!(
        weights[0].value,
        Some(ObservationValue::Quantity {
            value: Some(72.5),
            unit: Some("kg".to_string()),
            system: Some("http://unitsofmeasure.org".to_string()),
            code: Some("kg".to_string()),
        })
    );
    assert_eq!(
        weights[0].effective,
        Some(ObservationValue::DateTime("2024-05-01T08:00:00Z".to_string()))
    );
}

#[test]
fn observations_match_on_display_substring() {
    let bundle = clinical_bundle();
    let options = ObservationOptions {
        include_display: Some("FILTRATION".to_string()),
        ..ObservationOptions::default()
    };
    let matches = get_observations_by_code::<&str>(&bundle, &[], &options);
    assert_eq!(matches.len(), 1);
    assert_eq!(matches[0].id.as_deref(), Some("obs-egfr"));
    assert_eq!(
        matches[0].effective,
        Some(ObservationValue::Period {
            start: Some("2024-04-01".to_string()),
            end: Some("2024-04-02".to_string()),
        })
    );
}

#[test]
fn value_filter_rejects_records() {
    let bundle = clinical_bundle();
    let below_sixty = |fact: &lens_core::ObservationFact| {
        fact.value
            .as_ref()
            .and_then(ObservationValue::as_f64)
            .is_some_and(|value| value < 60.0)
    };
    let options = ObservationOptions {
        value_filter: Some(&below_sixty),
        ..ObservationOptions::default()
    };
    let matches = get_observations_by_code(&bundle, &["29463-7", "33914-3"], &options);
    assert_eq!(matches.len(), 1);
    assert_eq!(matches[0].id.as_deref(), Some("obs-egfr"));
}

#[test]
fn occupation_is_found_on_extension_or_observation() {
    let bundle = clinical_bundle();
    assert!(has_occupation(&bundle, "2221"));
    assert!(has_occupation(&bundle, "3221"));
    assert!(!has_occupation(&bundle, "9999"));
}

#[test]
fn patient_extensions_can_be_filtered_by_url() {
    let bundle = clinical_bundle();
    assert_eq!(get_patient_extensions(&bundle, None).len(), 2);

    let birth_place = get_patient_extensions(&bundle, Some("birthPlace"));
    assert_eq!(birth_place.len(), 1);
    assert_eq!(birth_place[0].value, Some(json!({"city": "Lisboa"})));
}

#[test]
fn contacts_follow_practitioner_and_organization_references() {
    let contacts = get_patient_contacts(&clinical_bundle());
    let summary: Vec<(&str, &str, &str)> = contacts
        .iter()
        .map(|contact| {
            (
                contact.reference.as_str(),
                contact.system.as_str(),
                contact.value.as_str(),
            )
        })
        .collect();
    assert_eq!(
        summary,
        vec![
            ("Practitioner/pr-1", "phone", "+351 210 000 000"),
            ("Practitioner/pr-1", "email", "rui.costa@example.org"),
            ("Organization/org-1", "phone", "+351 220 000 000"),
        ]
    );
    assert_eq!(contacts[0].name.as_deref(), Some("Rui Costa"));
    assert_eq!(contacts[0].contact_use.as_deref(), Some("work"));
    assert_eq!(contacts[2].name.as_deref(), Some("Centro de Saude"));
}

#[test]
fn clinical_bundle_collects_every_fact_from_one_index() {
    let bundle = clinical_bundle();
    let now = Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap();
    let facts = ClinicalBundle::new(&bundle).facts_at(now);

    assert_eq!(facts.patient.and_then(|patient| patient.age), Some(34));
    assert_eq!(facts.conditions.len(), 2);
    assert_eq!(facts.allergies.len(), 1);
    assert_eq!(facts.medications.len(), 2);
}
