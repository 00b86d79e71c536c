//! Class toggling on product-information markup.
//!
//! This is the one strict boundary of the crate: a missing markup string or
//! class name is an error, because silently returning the input would hand
//! an unannotated leaflet to the reader.

use std::sync::LazyLock;

use lens_core::{LensConfig, LensError, ResourceKind};
use regex::{Captures, Regex};
use serde_json::Value;

use crate::index::resource_type;
use crate::sections::get_annotated_sections;

/// A start tag, with quoted attribute values allowed to contain `>`.
static START_TAG: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(concat!(
        r"<[A-Za-z][A-Za-z0-9-]*",
        r#"(?:\s+[^\s"'<>/=]+(?:\s*=\s*(?:"[^"]*"|'[^']*'|[^\s"'<>]+))?)*"#,
        r"\s*/?>",
    ))
    .unwrap()
});

static CLASS_ATTR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(\s)class\s*=\s*(?:"([^"]*)"|'([^']*)')"#).unwrap()
});

/// Append `class` (and `lens_tag`, if any) to every element whose class list
/// contains one of `categories`. Classes already present are not repeated.
pub fn annotate_markup<S: AsRef<str>>(
    markup: &str,
    categories: &[S],
    class: &str,
    lens_tag: Option<&str>,
) -> Result<String, LensError> {
    if markup.trim().is_empty() {
        return Err(LensError::MissingParameter("markup"));
    }
    let additions = required_classes(class, lens_tag)?;
    Ok(apply_classes(markup, categories, &additions))
}

/// Annotate every section narrative (`text.div`, nested sections included)
/// of the document's Composition. The input is left untouched.
pub fn annotate_document<S: AsRef<str>>(
    doc: &Value,
    categories: &[S],
    class: &str,
    lens_tag: Option<&str>,
) -> Result<Value, LensError> {
    let additions = required_classes(class, lens_tag)?;
    let mut annotated = doc.clone();
    let composition = composition_mut(&mut annotated).ok_or_else(|| {
        LensError::InvalidInput("document has no Composition to annotate".to_string())
    })?;

    if let Some(sections) = composition.get_mut("section").and_then(Value::as_array_mut) {
        for section in sections {
            annotate_section(section, categories, &additions);
        }
    }
    Ok(annotated)
}

/// Highlight the `relevant` categories with the configured highlight class and
/// collapse every other annotated category with the collapse class.
pub fn annotate_relevance<S: AsRef<str>>(
    doc: &Value,
    relevant: &[S],
    config: &LensConfig,
    lens_tag: Option<&str>,
) -> Result<Value, LensError> {
    let mut others: Vec<String> = Vec::new();
    for section in get_annotated_sections(doc) {
        let is_relevant = relevant
            .iter()
            .any(|category| category.as_ref() == section.category);
        if !is_relevant && !others.contains(&section.category) {
            others.push(section.category);
        }
    }

    let highlighted = annotate_document(doc, relevant, &config.highlight_class, lens_tag)?;
    annotate_document(&highlighted, &others, &config.collapse_class, lens_tag)
}

fn required_classes(class: &str, lens_tag: Option<&str>) -> Result<Vec<String>, LensError> {
    let mut additions: Vec<String> = class.split_whitespace().map(str::to_string).collect();
    if additions.is_empty() {
        return Err(LensError::MissingParameter("class"));
    }
    if let Some(tag) = lens_tag.map(str::trim).filter(|tag| !tag.is_empty()) {
        additions.push(tag.to_string());
    }
    Ok(additions)
}

fn annotate_section<S: AsRef<str>>(section: &mut Value, categories: &[S], additions: &[String]) {
    if let Some(div) = section
        .get_mut("text")
        .and_then(|text| text.get_mut("div"))
    {
        if let Some(markup) = div.as_str() {
            let updated = apply_classes(markup, categories, additions);
            *div = Value::String(updated);
        }
    }

    if let Some(children) = section.get_mut("section").and_then(Value::as_array_mut) {
        for child in children {
            annotate_section(child, categories, additions);
        }
    }
}

fn composition_mut(doc: &mut Value) -> Option<&mut Value> {
    if resource_type(doc) == Some(ResourceKind::Composition.as_str()) {
        return Some(doc);
    }
    doc.get_mut("entry")?
        .as_array_mut()?
        .iter_mut()
        .filter_map(|entry| entry.get_mut("resource"))
        .find(|resource| resource_type(resource) == Some(ResourceKind::Composition.as_str()))
}

fn apply_classes<S: AsRef<str>>(markup: &str, categories: &[S], additions: &[String]) -> String {
    if categories.is_empty() {
        return markup.to_string();
    }

    START_TAG
        .replace_all(markup, |tag: &Captures| {
            let tag = &tag[0];
            CLASS_ATTR
                .replace(tag, |attr: &Captures| {
                    let separator = &attr[1];
                    let existing = attr
                        .get(2)
                        .or_else(|| attr.get(3))
                        .map(|value| value.as_str())
                        .unwrap_or("");
                    let mut classes: Vec<&str> = existing.split_whitespace().collect();

                    let targeted = classes.iter().any(|class| {
                        categories
                            .iter()
                            .any(|category| category.as_ref() == *class)
                    });
                    if !targeted {
                        return attr[0].to_string();
                    }

                    for addition in additions {
                        if !classes.contains(&addition.as_str()) {
                            classes.push(addition);
                        }
                    }
                    format!("{separator}class=\"{}\"", classes.join(" "))
                })
                .into_owned()
        })
        .into_owned()
}
