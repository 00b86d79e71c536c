//! Projection of clinical bundle resources into normalized fact records.

use chrono::{DateTime, NaiveDate, Utc};
use lens_core::{
    AllergyFact, ClinicalFacts, CodeSource, ConditionFact, MedicationFact, ObservationFact,
    ObservationValue, PatientContact, PatientExtension, PatientInfo, ResourceKind,
};
use serde_json::Value;
use tracing::debug;

use crate::codes::{concept_label, concept_text, extract_codes, status_code, string_field};
use crate::index::{resource_kind, ResourceIndex};

/// Milliseconds in a 365.25-day year.
const YEAR_MILLIS: f64 = 365.25 * 24.0 * 60.0 * 60.0 * 1000.0;

/// LOINC codes for occupation observations.
const OCCUPATION_OBSERVATION_CODES: [&str; 2] = ["11341-5", "85658-3"];

/// Filters for [`ClinicalBundle::observations_by_code`].
#[derive(Default)]
pub struct ObservationOptions<'f> {
    /// Case-insensitive substring matched against coding displays.
    pub include_display: Option<String>,
    /// Last word on a matched record before it is kept.
    pub value_filter: Option<&'f dyn Fn(&ObservationFact) -> bool>,
}

/// A clinical bundle indexed once, with every extractor available as a method.
#[derive(Debug, Clone)]
pub struct ClinicalBundle<'a> {
    index: ResourceIndex<'a>,
}

impl<'a> ClinicalBundle<'a> {
    pub fn new(bundle: &'a Value) -> Self {
        Self {
            index: ResourceIndex::new(bundle),
        }
    }

    pub fn index(&self) -> &ResourceIndex<'a> {
        &self.index
    }

    pub fn patient_info(&self) -> Option<PatientInfo> {
        self.patient_info_at(Utc::now())
    }

    /// First Patient resource with its age computed against `now`.
    pub fn patient_info_at(&self, now: DateTime<Utc>) -> Option<PatientInfo> {
        let patient = self.index.first(&ResourceKind::Patient)?;
        let mut resource = patient.as_object()?.clone();
        resource.remove("age");

        let age = resource
            .get("birthDate")
            .and_then(Value::as_str)
            .and_then(parse_birth_date)
            .map(|birth| age_between(birth, now));

        Some(PatientInfo { resource, age })
    }

    pub fn conditions(&self) -> Vec<ConditionFact> {
        self.index
            .by_type(&ResourceKind::Condition)
            .iter()
            .map(|resource| ConditionFact {
                id: string_field(resource, "id"),
                codes: extract_codes(resource.get("code")),
                text: concept_text(resource.get("code")),
                clinical_status: status_code(resource.get("clinicalStatus")),
                verification_status: status_code(resource.get("verificationStatus")),
                onset_date_time: string_field(resource, "onsetDateTime"),
                recorded_date: string_field(resource, "recordedDate"),
            })
            .collect()
    }

    pub fn allergies(&self) -> Vec<AllergyFact> {
        self.index
            .by_type(&ResourceKind::AllergyIntolerance)
            .iter()
            .map(|resource| AllergyFact {
                id: string_field(resource, "id"),
                codes: extract_codes(resource.get("code")),
                text: concept_text(resource.get("code")),
                clinical_status: status_code(resource.get("clinicalStatus")),
                verification_status: status_code(resource.get("verificationStatus")),
                criticality: string_field(resource, "criticality"),
                category: resource
                    .get("category")
                    .and_then(Value::as_array)
                    .map(|arr| {
                        arr.iter()
                            .filter_map(Value::as_str)
                            .map(str::to_string)
                            .collect()
                    })
                    .unwrap_or_default(),
                allergy_type: string_field(resource, "type"),
            })
            .collect()
    }

    /// Medication activities with inline, referenced and ingredient codes
    /// merged. Activities that end up without any code are left out.
    pub fn medications(&self) -> Vec<MedicationFact> {
        self.index
            .entries()
            .iter()
            .filter_map(|entry| entry.get("resource"))
            .filter(|resource| {
                resource_kind(resource).is_some_and(|kind| kind.is_medication_activity())
            })
            .filter_map(|resource| self.medication_fact(resource))
            .collect()
    }

    fn medication_fact(&self, resource: &Value) -> Option<MedicationFact> {
        let kind = resource_kind(resource)?;
        let inline = resource.get("medicationCodeableConcept").or_else(|| {
            resource
                .get("medication")
                .and_then(|medication| medication.get("concept"))
        });
        let reference_field = resource.get("medicationReference").or_else(|| {
            resource
                .get("medication")
                .and_then(|medication| medication.get("reference"))
        });
        let reference = reference_field
            .and_then(|field| field.get("reference"))
            .and_then(Value::as_str);

        let mut codes = extract_codes(inline);

        if let Some(reference) = reference {
            match self.index.resolve(reference) {
                Some(medication) => {
                    codes.extend(
                        extract_codes(medication.get("code"))
                            .into_iter()
                            .map(|code| code.tagged(CodeSource::MedicationCode)),
                    );

                    let ingredients = medication
                        .get("ingredient")
                        .and_then(Value::as_array)
                        .map(Vec::as_slice)
                        .unwrap_or(&[]);
                    for ingredient in ingredients {
                        let concept = ingredient.get("itemCodeableConcept").or_else(|| {
                            ingredient.get("item").and_then(|item| item.get("concept"))
                        });
                        codes.extend(
                            extract_codes(concept)
                                .into_iter()
                                .map(|code| code.tagged(CodeSource::Ingredient)),
                        );
                    }
                }
                None => debug!(reference, "medication reference does not resolve in bundle"),
            }
        }

        if codes.is_empty() {
            let id = resource.get("id").and_then(Value::as_str);
            debug!(
                id,
                kind = %kind,
                "dropping medication activity without codes"
            );
            return None;
        }

        let text = concept_label(inline).or_else(|| {
            reference_field
                .and_then(|field| field.get("display"))
                .and_then(Value::as_str)
                .map(str::to_string)
        });

        Some(MedicationFact {
            id: string_field(resource, "id"),
            resource_type: kind,
            codes,
            text,
            status: status_code(resource.get("status")),
            reference: reference.map(str::to_string),
        })
    }

    /// Observations whose coding carries one of `codes` (code value only), or
    /// whose display contains `options.include_display`.
    pub fn observations_by_code<S: AsRef<str>>(
        &self,
        codes: &[S],
        options: &ObservationOptions<'_>,
    ) -> Vec<ObservationFact> {
        let needle = options
            .include_display
            .as_deref()
            .map(str::to_lowercase)
            .filter(|needle| !needle.is_empty());

        self.index
            .by_type(&ResourceKind::Observation)
            .iter()
            .filter(|resource| {
                let concept = resource.get("code");
                let by_code = extract_codes(concept)
                    .iter()
                    .any(|coding| codes.iter().any(|code| code.as_ref() == coding.code));
                by_code
                    || needle
                        .as_deref()
                        .is_some_and(|needle| display_contains(concept, needle))
            })
            .map(|resource| observation_fact(resource))
            .filter(|fact| options.value_filter.map_or(true, |keep| keep(fact)))
            .collect()
    }

    /// Whether the patient is recorded with the given occupation code, either
    /// on a Patient extension or on an occupation Observation.
    pub fn has_occupation(&self, occupation_code: &str) -> bool {
        let carries_code = |concept: Option<&Value>| {
            extract_codes(concept)
                .iter()
                .any(|code| code.code == occupation_code)
        };

        let on_extension = self
            .patient_extensions(Some("occupation"))
            .iter()
            .any(|extension| carries_code(extension.value.as_ref()));
        if on_extension {
            return true;
        }

        self.index
            .by_type(&ResourceKind::Observation)
            .iter()
            .filter(|resource| {
                extract_codes(resource.get("code"))
                    .iter()
                    .any(|code| OCCUPATION_OBSERVATION_CODES.contains(&code.code.as_str()))
            })
            .any(|resource| carries_code(resource.get("valueCodeableConcept")))
    }

    /// Extensions of the first Patient, optionally restricted to URLs that
    /// contain `url_filter`.
    pub fn patient_extensions(&self, url_filter: Option<&str>) -> Vec<PatientExtension> {
        let Some(extensions) = self
            .index
            .first(&ResourceKind::Patient)
            .and_then(|patient| patient.get("extension"))
            .and_then(Value::as_array)
        else {
            return Vec::new();
        };

        extensions
            .iter()
            .filter_map(|extension| {
                let url = extension.get("url").and_then(Value::as_str)?;
                if url_filter.is_some_and(|filter| !url.contains(filter)) {
                    return None;
                }
                Some(PatientExtension {
                    url: url.to_string(),
                    value: extension_value(extension),
                })
            })
            .collect()
    }

    /// Phone and email entries of the general practitioners that resolve to a
    /// Practitioner or Organization in the bundle.
    pub fn patient_contacts(&self) -> Vec<PatientContact> {
        let Some(practitioners) = self
            .index
            .first(&ResourceKind::Patient)
            .and_then(|patient| patient.get("generalPractitioner"))
            .and_then(Value::as_array)
        else {
            return Vec::new();
        };

        let mut contacts = Vec::new();
        for reference_field in practitioners {
            let Some(reference) = reference_field.get("reference").and_then(Value::as_str) else {
                continue;
            };
            let Some(resource) = self.index.resolve(reference) else {
                debug!(reference, "general practitioner does not resolve in bundle");
                continue;
            };
            let Some(kind) = resource_kind(resource) else {
                continue;
            };
            if !matches!(kind, ResourceKind::Practitioner | ResourceKind::Organization) {
                continue;
            }

            let name = contact_name(&kind, resource);
            let telecoms = resource
                .get("telecom")
                .and_then(Value::as_array)
                .map(Vec::as_slice)
                .unwrap_or(&[]);

            for telecom in telecoms {
                let Some(system) = telecom.get("system").and_then(Value::as_str) else {
                    continue;
                };
                if system != "phone" && system != "email" {
                    continue;
                }
                let Some(value) = telecom.get("value").and_then(Value::as_str) else {
                    continue;
                };
                contacts.push(PatientContact {
                    resource_type: kind.clone(),
                    reference: reference.to_string(),
                    name: name.clone(),
                    system: system.to_string(),
                    value: value.to_string(),
                    contact_use: string_field(telecom, "use"),
                });
            }
        }
        contacts
    }

    pub fn facts(&self) -> ClinicalFacts {
        self.facts_at(Utc::now())
    }

    /// Patient, conditions, allergies and medications from a single index.
    pub fn facts_at(&self, now: DateTime<Utc>) -> ClinicalFacts {
        ClinicalFacts {
            patient: self.patient_info_at(now),
            conditions: self.conditions(),
            allergies: self.allergies(),
            medications: self.medications(),
        }
    }
}

fn observation_fact(resource: &Value) -> ObservationFact {
    let effective = if let Some(date_time) = resource
        .get("effectiveDateTime")
        .or_else(|| resource.get("effectiveInstant"))
        .and_then(Value::as_str)
    {
        Some(ObservationValue::DateTime(date_time.to_string()))
    } else {
        resource.get("effectivePeriod").map(period_value)
    };

    ObservationFact {
        id: string_field(resource, "id"),
        codes: extract_codes(resource.get("code")),
        text: concept_text(resource.get("code")),
        status: status_code(resource.get("status")),
        value: observation_value(resource),
        effective,
        issued: string_field(resource, "issued"),
    }
}

fn observation_value(resource: &Value) -> Option<ObservationValue> {
    if let Some(quantity) = resource.get("valueQuantity") {
        return Some(ObservationValue::Quantity {
            value: quantity.get("value").and_then(Value::as_f64),
            unit: string_field(quantity, "unit"),
            system: string_field(quantity, "system"),
            code: string_field(quantity, "code"),
        });
    }
    if let Some(concept) = resource.get("valueCodeableConcept") {
        return Some(ObservationValue::CodeableConcept(extract_codes(Some(
            concept,
        ))));
    }
    if let Some(text) = resource.get("valueString").and_then(Value::as_str) {
        return Some(ObservationValue::String(text.to_string()));
    }
    if let Some(number) = resource.get("valueInteger").and_then(Value::as_i64) {
        return Some(ObservationValue::Integer(number));
    }
    if let Some(flag) = resource.get("valueBoolean").and_then(Value::as_bool) {
        return Some(ObservationValue::Boolean(flag));
    }
    if let Some(date_time) = resource.get("valueDateTime").and_then(Value::as_str) {
        return Some(ObservationValue::DateTime(date_time.to_string()));
    }
    resource.get("valuePeriod").map(period_value)
}

fn period_value(period: &Value) -> ObservationValue {
    ObservationValue::Period {
        start: string_field(period, "start"),
        end: string_field(period, "end"),
    }
}

/// Display check over the raw codings, so code-less codings still count.
fn display_contains(concept: Option<&Value>, needle: &str) -> bool {
    concept
        .and_then(|concept| concept.get("coding"))
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or(&[])
        .iter()
        .filter_map(|coding| coding.get("display").and_then(Value::as_str))
        .any(|display| display.to_lowercase().contains(needle))
}

/// `value[x]` of an extension, or its nested extension list for complex ones.
fn extension_value(extension: &Value) -> Option<Value> {
    let object = extension.as_object()?;
    object
        .iter()
        .find(|(key, _)| key.starts_with("value"))
        .map(|(_, value)| value.clone())
        .or_else(|| object.get("extension").cloned())
}

fn contact_name(kind: &ResourceKind, resource: &Value) -> Option<String> {
    match kind {
        ResourceKind::Organization => string_field(resource, "name"),
        _ => human_name(resource),
    }
}

fn human_name(resource: &Value) -> Option<String> {
    let name = resource.get("name")?.as_array()?.first()?;
    if let Some(text) = name.get("text").and_then(Value::as_str) {
        return Some(text.to_string());
    }
    let given = name
        .get("given")
        .and_then(Value::as_array)
        .map(|arr| {
            arr.iter()
                .filter_map(Value::as_str)
                .collect::<Vec<_>>()
                .join(" ")
        })
        .unwrap_or_default();
    let family = name.get("family").and_then(Value::as_str).unwrap_or("");
    let full = format!("{given} {family}").trim().to_string();
    if full.is_empty() {
        None
    } else {
        Some(full)
    }
}

/// Accepts `YYYY`, `YYYY-MM`, `YYYY-MM-DD` and RFC 3339 date-times.
pub(crate) fn parse_birth_date(value: &str) -> Option<DateTime<Utc>> {
    if let Ok(date_time) = DateTime::parse_from_rfc3339(value) {
        return Some(date_time.with_timezone(&Utc));
    }

    let date = match value.len() {
        4 => NaiveDate::parse_from_str(&format!("{value}-01-01"), "%Y-%m-%d").ok(),
        7 => NaiveDate::parse_from_str(&format!("{value}-01"), "%Y-%m-%d").ok(),
        _ => NaiveDate::parse_from_str(value, "%Y-%m-%d").ok(),
    }?;
    Some(date.and_hms_opt(0, 0, 0)?.and_utc())
}

/// Whole 365.25-day years between `birth` and `now`, calendar unaware.
pub(crate) fn age_between(birth: DateTime<Utc>, now: DateTime<Utc>) -> i64 {
    let elapsed = now.signed_duration_since(birth).num_milliseconds() as f64;
    (elapsed / YEAR_MILLIS).floor() as i64
}

pub fn get_patient_info(bundle: &Value) -> Option<PatientInfo> {
    ClinicalBundle::new(bundle).patient_info()
}

pub fn get_patient_info_at(bundle: &Value, now: DateTime<Utc>) -> Option<PatientInfo> {
    ClinicalBundle::new(bundle).patient_info_at(now)
}

pub fn get_conditions(bundle: &Value) -> Vec<ConditionFact> {
    ClinicalBundle::new(bundle).conditions()
}

pub fn get_allergies(bundle: &Value) -> Vec<AllergyFact> {
    ClinicalBundle::new(bundle).allergies()
}

pub fn get_medications(bundle: &Value) -> Vec<MedicationFact> {
    ClinicalBundle::new(bundle).medications()
}

pub fn get_observations_by_code<S: AsRef<str>>(
    bundle: &Value,
    codes: &[S],
    options: &ObservationOptions<'_>,
) -> Vec<ObservationFact> {
    ClinicalBundle::new(bundle).observations_by_code(codes, options)
}

pub fn has_occupation(bundle: &Value, occupation_code: &str) -> bool {
    ClinicalBundle::new(bundle).has_occupation(occupation_code)
}

pub fn get_patient_extensions(bundle: &Value, url_filter: Option<&str>) -> Vec<PatientExtension> {
    ClinicalBundle::new(bundle).patient_extensions(url_filter)
}

pub fn get_patient_contacts(bundle: &Value) -> Vec<PatientContact> {
    ClinicalBundle::new(bundle).patient_contacts()
}
