//! Typed lookup over the entries of a bundle-shaped collection.

use std::collections::HashMap;

use lens_core::ResourceKind;
use serde_json::Value;

/// Entry list of a collection, or an empty slice when the collection is
/// absent, not an object, or its `entry` is not a list.
pub fn bundle_entries(collection: &Value) -> &[Value] {
    collection
        .get("entry")
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or(&[])
}

/// Object resources wrapped by the entries, in entry order.
pub fn entry_resources(entries: &[Value]) -> impl Iterator<Item = &Value> {
    entries
        .iter()
        .filter_map(|entry| entry.get("resource"))
        .filter(|resource| resource.is_object())
}

pub fn resource_type(resource: &Value) -> Option<&str> {
    resource.get("resourceType").and_then(Value::as_str)
}

pub fn resource_kind(resource: &Value) -> Option<ResourceKind> {
    resource_type(resource).map(ResourceKind::parse)
}

/// Every resource of the given kind, in entry order.
pub fn resources_by_type<'a>(collection: &'a Value, kind: &ResourceKind) -> Vec<&'a Value> {
    entry_resources(bundle_entries(collection))
        .filter(|resource| resource_type(resource) == Some(kind.as_str()))
        .collect()
}

/// Split `Type/id` on the first slash. Either half empty means malformed.
pub fn split_reference(reference: &str) -> Option<(&str, &str)> {
    let (kind, id) = reference.split_once('/')?;
    if kind.is_empty() || id.is_empty() {
        return None;
    }
    Some((kind, id))
}

/// Linear scan for the first resource matching a `Type/id` reference.
pub fn resolve_reference<'a>(reference: &str, entries: &'a [Value]) -> Option<&'a Value> {
    let (kind, id) = split_reference(reference)?;
    entry_resources(entries).find(|resource| {
        resource_type(resource) == Some(kind)
            && resource.get("id").and_then(Value::as_str) == Some(id)
    })
}

/// One-pass index of a collection, built per extraction call and shared by
/// every lookup made during that call.
#[derive(Debug, Clone, Default)]
pub struct ResourceIndex<'a> {
    entries: &'a [Value],
    by_type: HashMap<&'a str, Vec<&'a Value>>,
    by_reference: HashMap<(&'a str, &'a str), &'a Value>,
}

impl<'a> ResourceIndex<'a> {
    pub fn new(collection: &'a Value) -> Self {
        let entries = bundle_entries(collection);
        let mut by_type: HashMap<&'a str, Vec<&'a Value>> = HashMap::new();
        let mut by_reference = HashMap::new();

        for resource in entry_resources(entries) {
            let Some(kind) = resource_type(resource) else {
                continue;
            };
            by_type.entry(kind).or_default().push(resource);

            if let Some(id) = resource.get("id").and_then(Value::as_str) {
                // First occurrence wins, as with a linear scan.
                by_reference.entry((kind, id)).or_insert(resource);
            }
        }

        Self {
            entries,
            by_type,
            by_reference,
        }
    }

    pub fn entries(&self) -> &'a [Value] {
        self.entries
    }

    pub fn by_type(&self, kind: &ResourceKind) -> &[&'a Value] {
        self.by_type
            .get(kind.as_str())
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn first(&self, kind: &ResourceKind) -> Option<&'a Value> {
        self.by_type(kind).first().copied()
    }

    pub fn resolve(&self, reference: &str) -> Option<&'a Value> {
        let key = split_reference(reference)?;
        self.by_reference.get(&key).copied()
    }

    /// Resolve a FHIR `Reference` object (`{"reference": "Type/id"}`).
    pub fn resolve_field(&self, reference: &Value) -> Option<&'a Value> {
        reference
            .get("reference")
            .and_then(Value::as_str)
            .and_then(|reference| self.resolve(reference))
    }

    pub fn is_empty(&self) -> bool {
        self.by_type.is_empty()
    }
}
