//! Section annotations of a product-information document and matching of
//! clinical codes against them.

use std::collections::HashSet;

use lens_core::{AnnotatedSection, Code, CodeMatch, ResourceKind, SearchCode};
use serde_json::Value;
use tracing::debug;

use crate::codes::{coding_to_code, extract_codes};
use crate::index::{resource_type, ResourceIndex};

/// URL of the child extension that carries the section concept.
const CONCEPT_URL: &str = "concept";

/// The structural Composition: the document itself when it is one, otherwise
/// the first Composition entry of the bundle.
pub fn find_composition(doc: &Value) -> Option<&Value> {
    if resource_type(doc) == Some(ResourceKind::Composition.as_str()) {
        return Some(doc);
    }
    ResourceIndex::new(doc).first(&ResourceKind::Composition)
}

/// One record per well-formed annotation block. Blocks sharing a category are
/// kept apart.
pub fn get_annotated_sections(doc: &Value) -> Vec<AnnotatedSection> {
    let Some(blocks) = find_composition(doc)
        .and_then(|composition| composition.get("extension"))
        .and_then(Value::as_array)
    else {
        return Vec::new();
    };

    blocks
        .iter()
        .enumerate()
        .filter_map(|(position, block)| {
            let section = annotated_section(block);
            if section.is_none() {
                debug!(position, "skipping malformed section annotation");
            }
            section
        })
        .collect()
}

fn annotated_section(block: &Value) -> Option<AnnotatedSection> {
    let children = block.get("extension")?.as_array()?;
    let category = children.first()?.get("valueString")?.as_str()?;

    let concept_block = children.get(1)?;
    if concept_block.get("url").and_then(Value::as_str) != Some(CONCEPT_URL) {
        return None;
    }
    let concept = concept_block
        .get("valueCodeableReference")
        .and_then(|reference| reference.get("concept"))
        .or_else(|| concept_block.get("valueCodeableConcept"))?;

    Some(AnnotatedSection {
        category: category.to_string(),
        codes: extract_codes(Some(concept)),
    })
}

/// Distinct categories, in first-occurrence order, of the sections holding
/// at least one code that matches at least one search code.
pub fn find_sections_by_code(
    doc: &Value,
    search_codes: &[SearchCode],
    match_system: bool,
) -> Vec<String> {
    if search_codes.is_empty() {
        return Vec::new();
    }
    let mode = CodeMatch::from_strict(match_system);
    let sections = get_annotated_sections(doc);

    let mut seen = HashSet::new();
    sections
        .into_iter()
        .filter(|section| {
            section.codes.iter().any(|candidate| {
                search_codes
                    .iter()
                    .any(|search| search.matches(candidate, mode))
            })
        })
        .map(|section| section.category)
        .filter(|category| seen.insert(category.clone()))
        .collect()
}

/// Same as [`find_sections_by_code`] for search codes that arrive as raw
/// JSON. Anything but a list yields no match; list items that are neither a
/// string nor a coding object are ignored.
pub fn find_sections_by_value(
    doc: &Value,
    search_codes: &Value,
    match_system: bool,
) -> Vec<String> {
    let Some(items) = search_codes.as_array() else {
        return Vec::new();
    };
    let codes: Vec<SearchCode> = items.iter().filter_map(search_code_from_value).collect();
    find_sections_by_code(doc, &codes, match_system)
}

fn search_code_from_value(item: &Value) -> Option<SearchCode> {
    match item {
        Value::String(code) => Some(SearchCode::Bare(code.clone())),
        Value::Object(_) => coding_to_code(item).map(SearchCode::Coded),
        _ => None,
    }
}

/// Convenience for callers holding codes rather than search terms.
pub fn find_sections_by_codes(doc: &Value, codes: &[Code], match_system: bool) -> Vec<String> {
    let search: Vec<SearchCode> = codes.iter().cloned().map(SearchCode::Coded).collect();
    find_sections_by_code(doc, &search, match_system)
}

/// Whether the document bundle's own identifier is one of `candidates`.
pub fn match_bundle_identifier<S: AsRef<str>>(doc: &Value, candidates: &[S]) -> bool {
    identifier_values(doc.get("identifier"))
        .iter()
        .any(|value| candidates.iter().any(|candidate| candidate.as_ref() == *value))
}

/// Whether any identifier of the embedded MedicinalProductDefinition is one
/// of `candidates`.
pub fn match_product_identifier<S: AsRef<str>>(doc: &Value, candidates: &[S]) -> bool {
    let index = ResourceIndex::new(doc);
    index
        .by_type(&ResourceKind::MedicinalProductDefinition)
        .iter()
        .flat_map(|product| identifier_values(product.get("identifier")))
        .any(|value| candidates.iter().any(|candidate| candidate.as_ref() == value))
}

/// `identifier` is a single Identifier on a Bundle and a list elsewhere.
fn identifier_values(identifier: Option<&Value>) -> Vec<&str> {
    match identifier {
        Some(Value::Array(identifiers)) => identifiers
            .iter()
            .filter_map(|identifier| identifier.get("value").and_then(Value::as_str))
            .collect(),
        Some(identifier) => identifier
            .get("value")
            .and_then(Value::as_str)
            .into_iter()
            .collect(),
        None => Vec::new(),
    }
}

/// Language of the document: bundle level first, then the Composition, then
/// the product definition.
pub fn get_document_language(doc: &Value) -> Option<String> {
    if let Some(language) = doc.get("language").and_then(Value::as_str) {
        return Some(language.to_string());
    }
    if let Some(language) = find_composition(doc)
        .and_then(|composition| composition.get("language"))
        .and_then(Value::as_str)
    {
        return Some(language.to_string());
    }
    ResourceIndex::new(doc)
        .first(&ResourceKind::MedicinalProductDefinition)
        .and_then(|product| product.get("language"))
        .and_then(Value::as_str)
        .map(str::to_string)
}
