//! FHIR extraction and matching engine behind ePI lenses.
//!
//! Clinical bundles are projected into normalized facts, product-information
//! documents into annotated sections, and the two are correlated by code.
//! Every extractor is a pure function over a `serde_json::Value`; malformed
//! input degrades to `None` or an empty list instead of an error.

mod annotate;
mod clinical;
mod codes;
mod i18n;
mod index;
mod persona;
mod sections;
mod validate;

use lens_core::{parse_json, ClinicalFacts, LensError};
use serde_json::Value;

pub use annotate::{annotate_document, annotate_markup, annotate_relevance};
pub use clinical::{
    get_allergies, get_conditions, get_medications, get_observations_by_code,
    get_patient_contacts, get_patient_extensions, get_patient_info, get_patient_info_at,
    has_occupation, ClinicalBundle, ObservationOptions,
};
pub use codes::{codes_match, concept_label, concept_text, extract_codes};
pub use i18n::{translate, Translations};
pub use index::{bundle_entries, resolve_reference, resources_by_type, ResourceIndex};
pub use persona::{
    find_dimensions_by_value, get_all_dimensions, get_dimension_by_code, get_dimension_value,
    get_dimensions_by_codes, get_dimensions_by_value_type, group_dimensions_by_subject,
    match_dimensions, DimensionCriteria, PersonaReader, UNKNOWN_SUBJECT,
};
pub use sections::{
    find_composition, find_sections_by_code, find_sections_by_codes, find_sections_by_value,
    get_annotated_sections, get_document_language, match_bundle_identifier,
    match_product_identifier,
};
pub use validate::{validate_clinical_bundle, validate_epi, validate_persona_vector};

/// Sections of `doc` relevant to the conditions, allergies and medications
/// recorded in `bundle`.
pub fn match_clinical_sections(doc: &Value, bundle: &Value, match_system: bool) -> Vec<String> {
    let facts = ClinicalBundle::new(bundle).facts();
    match_facts_to_sections(doc, &facts, match_system)
}

pub fn match_facts_to_sections(
    doc: &Value,
    facts: &ClinicalFacts,
    match_system: bool,
) -> Vec<String> {
    find_sections_by_code(doc, &facts.search_codes(), match_system)
}

/// [`match_clinical_sections`] over raw JSON text.
pub fn match_clinical_sections_str(
    doc_json: &str,
    bundle_json: &str,
    match_system: bool,
) -> Result<Vec<String>, LensError> {
    let doc = parse_json(doc_json)?;
    let bundle = parse_json(bundle_json)?;
    Ok(match_clinical_sections(&doc, &bundle, match_system))
}
