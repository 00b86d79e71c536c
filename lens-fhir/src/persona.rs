//! Reader for persona vectors: collections of patient-preference Observations.

use std::collections::BTreeMap;

use lens_core::{
    DimensionValue, LensConfig, PersonaDimension, ResourceKind, ValueType,
    PERSONA_DIMENSION_SYSTEM,
};
use serde_json::Value;

use crate::codes::{concept_text, extract_codes, status_code, string_field};
use crate::index::resources_by_type;

/// Bucket for dimensions without a subject reference.
pub const UNKNOWN_SUBJECT: &str = "unknown";

/// Typed value fields, probed in this order. The first one present decides
/// the value type even when later ones are populated too.
const VALUE_PROBES: [(&str, ValueType); 5] = [
    ("valueCodeableConcept", ValueType::CodeableConcept),
    ("valueString", ValueType::String),
    ("valueInteger", ValueType::Integer),
    ("valueBoolean", ValueType::Boolean),
    ("valueQuantity", ValueType::Quantity),
];

/// Criteria for [`PersonaReader::matching`]. Unset criteria always pass.
#[derive(Default)]
pub struct DimensionCriteria<'f> {
    pub dimension_code: Option<String>,
    pub value: Option<DimensionValue>,
    pub value_type: Option<ValueType>,
    pub value_predicate: Option<&'f dyn Fn(&DimensionValue) -> bool>,
}

impl DimensionCriteria<'_> {
    fn accepts(&self, dimension: &PersonaDimension) -> bool {
        if let Some(code) = &self.dimension_code {
            if dimension.dimension_code.as_ref() != Some(code) {
                return false;
            }
        }
        if let Some(value) = &self.value {
            if dimension.value.as_ref() != Some(value) {
                return false;
            }
        }
        if let Some(value_type) = self.value_type {
            if dimension.value_type != Some(value_type) {
                return false;
            }
        }
        if let Some(predicate) = self.value_predicate {
            if !dimension.value.as_ref().is_some_and(predicate) {
                return false;
            }
        }
        true
    }
}

/// All dimensions of one persona collection, read once.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PersonaReader {
    dimensions: Vec<PersonaDimension>,
}

impl PersonaReader {
    pub fn new(collection: &Value, code_system: &str) -> Self {
        let dimensions = resources_by_type(collection, &ResourceKind::Observation)
            .into_iter()
            .map(|observation| read_dimension(observation, code_system))
            .collect();
        Self { dimensions }
    }

    pub fn with_config(collection: &Value, config: &LensConfig) -> Self {
        Self::new(collection, &config.persona_code_system)
    }

    pub fn dimensions(&self) -> &[PersonaDimension] {
        &self.dimensions
    }

    pub fn into_dimensions(self) -> Vec<PersonaDimension> {
        self.dimensions
    }

    pub fn by_code(&self, code: &str) -> Option<&PersonaDimension> {
        self.dimensions
            .iter()
            .find(|dimension| dimension.dimension_code.as_deref() == Some(code))
    }

    pub fn by_codes<S: AsRef<str>>(&self, codes: &[S]) -> Vec<&PersonaDimension> {
        self.dimensions
            .iter()
            .filter(|dimension| {
                dimension
                    .dimension_code
                    .as_deref()
                    .is_some_and(|own| codes.iter().any(|code| code.as_ref() == own))
            })
            .collect()
    }

    pub fn by_value_type(&self, value_type: ValueType) -> Vec<&PersonaDimension> {
        self.dimensions
            .iter()
            .filter(|dimension| dimension.value_type == Some(value_type))
            .collect()
    }

    /// Dimensions whose value satisfies `predicate`. Valueless ones never do.
    pub fn find_by_value<F>(&self, predicate: F) -> Vec<&PersonaDimension>
    where
        F: Fn(&DimensionValue) -> bool,
    {
        self.dimensions
            .iter()
            .filter(|dimension| dimension.value.as_ref().is_some_and(&predicate))
            .collect()
    }

    pub fn matching(&self, criteria: &DimensionCriteria<'_>) -> Vec<&PersonaDimension> {
        self.dimensions
            .iter()
            .filter(|dimension| criteria.accepts(dimension))
            .collect()
    }

    pub fn grouped_by_subject(&self) -> BTreeMap<String, Vec<PersonaDimension>> {
        let mut groups: BTreeMap<String, Vec<PersonaDimension>> = BTreeMap::new();
        for dimension in &self.dimensions {
            let subject = dimension
                .subject
                .clone()
                .unwrap_or_else(|| UNKNOWN_SUBJECT.to_string());
            groups.entry(subject).or_default().push(dimension.clone());
        }
        groups
    }

    pub fn value_of(&self, code: &str) -> Option<&DimensionValue> {
        self.by_code(code)
            .and_then(|dimension| dimension.value.as_ref())
    }
}

fn read_dimension(observation: &Value, code_system: &str) -> PersonaDimension {
    let codes = extract_codes(observation.get("code"));
    let dimension = codes.iter().find(|code| code.system == code_system);

    let mut record = PersonaDimension {
        id: string_field(observation, "id"),
        status: status_code(observation.get("status")),
        dimension_code: dimension.map(|code| code.code.clone()),
        dimension_display: dimension
            .map(|code| code.display.clone())
            .filter(|display| !display.is_empty()),
        subject: observation
            .get("subject")
            .and_then(|subject| subject.get("reference"))
            .and_then(Value::as_str)
            .map(str::to_string),
        effective_date_time: string_field(observation, "effectiveDateTime"),
        value: None,
        value_type: None,
        codes,
        value_codes: None,
        unit: None,
    };

    let probed = VALUE_PROBES.iter().find_map(|(field, value_type)| {
        observation
            .get(*field)
            .filter(|raw| !raw.is_null())
            .map(|raw| (raw, *value_type))
    });

    if let Some((raw, value_type)) = probed {
        record.value_type = Some(value_type);
        match value_type {
            ValueType::CodeableConcept => {
                let value_codes = extract_codes(Some(raw));
                record.value = value_codes
                    .first()
                    .map(|code| code.code.clone())
                    .or_else(|| concept_text(Some(raw)))
                    .map(DimensionValue::Text);
                record.value_codes = Some(value_codes);
            }
            ValueType::String => {
                record.value = raw.as_str().map(|text| DimensionValue::Text(text.to_string()));
            }
            ValueType::Integer => {
                record.value = raw.as_i64().map(DimensionValue::Integer);
            }
            ValueType::Boolean => {
                record.value = raw.as_bool().map(DimensionValue::Boolean);
            }
            ValueType::Quantity => {
                record.value = raw
                    .get("value")
                    .and_then(Value::as_f64)
                    .map(DimensionValue::Number);
                record.unit = string_field(raw, "unit").or_else(|| string_field(raw, "code"));
            }
        }
    }

    record
}

pub fn get_all_dimensions(collection: &Value) -> Vec<PersonaDimension> {
    PersonaReader::new(collection, PERSONA_DIMENSION_SYSTEM).into_dimensions()
}

pub fn get_dimension_by_code(collection: &Value, code: &str) -> Option<PersonaDimension> {
    PersonaReader::new(collection, PERSONA_DIMENSION_SYSTEM)
        .by_code(code)
        .cloned()
}

pub fn get_dimensions_by_codes<S: AsRef<str>>(
    collection: &Value,
    codes: &[S],
) -> Vec<PersonaDimension> {
    PersonaReader::new(collection, PERSONA_DIMENSION_SYSTEM)
        .by_codes(codes)
        .into_iter()
        .cloned()
        .collect()
}

pub fn get_dimensions_by_value_type(
    collection: &Value,
    value_type: ValueType,
) -> Vec<PersonaDimension> {
    PersonaReader::new(collection, PERSONA_DIMENSION_SYSTEM)
        .by_value_type(value_type)
        .into_iter()
        .cloned()
        .collect()
}

pub fn find_dimensions_by_value<F>(collection: &Value, predicate: F) -> Vec<PersonaDimension>
where
    F: Fn(&DimensionValue) -> bool,
{
    PersonaReader::new(collection, PERSONA_DIMENSION_SYSTEM)
        .find_by_value(predicate)
        .into_iter()
        .cloned()
        .collect()
}

pub fn match_dimensions(
    collection: &Value,
    criteria: &DimensionCriteria<'_>,
) -> Vec<PersonaDimension> {
    PersonaReader::new(collection, PERSONA_DIMENSION_SYSTEM)
        .matching(criteria)
        .into_iter()
        .cloned()
        .collect()
}

pub fn group_dimensions_by_subject(
    collection: &Value,
) -> BTreeMap<String, Vec<PersonaDimension>> {
    PersonaReader::new(collection, PERSONA_DIMENSION_SYSTEM).grouped_by_subject()
}

pub fn get_dimension_value(collection: &Value, code: &str) -> Option<DimensionValue> {
    PersonaReader::new(collection, PERSONA_DIMENSION_SYSTEM)
        .value_of(code)
        .cloned()
}
