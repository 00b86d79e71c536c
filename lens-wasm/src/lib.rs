//! Cầu nối WASM <-> JavaScript cho các script lens, không phụ thuộc framework.

use lens_core::{DimensionValue, LensConfig, LensError, ValueType};
use lens_fhir::{DimensionCriteria, ObservationOptions, PersonaReader, Translations};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use serde_wasm_bindgen::{from_value, Serializer};
use wasm_bindgen::prelude::*;

#[derive(Deserialize)]
struct JsLensConfig {
    #[serde(default)]
    persona_code_system: Option<String>,
    #[serde(default)]
    default_language: Option<String>,
    #[serde(default)]
    highlight_class: Option<String>,
    #[serde(default)]
    collapse_class: Option<String>,
}

impl From<JsLensConfig> for LensConfig {
    fn from(cfg: JsLensConfig) -> Self {
        let mut base = LensConfig::default();
        if let Some(system) = cfg.persona_code_system {
            base.persona_code_system = system;
        }
        if let Some(language) = cfg.default_language {
            base.default_language = language;
        }
        if let Some(class) = cfg.highlight_class {
            base.highlight_class = class;
        }
        if let Some(class) = cfg.collapse_class {
            base.collapse_class = class;
        }
        base
    }
}

fn read_config(config: Option<JsValue>) -> Result<LensConfig, JsValue> {
    match config {
        Some(js_cfg) if !js_cfg.is_undefined() && !js_cfg.is_null() => {
            let cfg: JsLensConfig = from_value(js_cfg)
                .map_err(|err| JsValue::from_str(&format!("Không đọc được config: {err}")))?;
            Ok(LensConfig::from(cfg))
        }
        _ => Ok(LensConfig::default()),
    }
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct JsDimensionCriteria {
    #[serde(default)]
    dimension_code: Option<String>,
    #[serde(default)]
    value: Option<DimensionValue>,
    #[serde(default)]
    value_type: Option<ValueType>,
}

fn read_json(input: JsValue, what: &str) -> Result<Value, JsValue> {
    #[cfg(target_arch = "wasm32")]
    console_error_panic_hook::set_once();

    from_value::<Value>(input)
        .map_err(|err| JsValue::from_str(&format!("Không đọc được {what}: {err}")))
}

/// Các phần tử chuỗi của mảng JS; giá trị khác coi như rỗng.
fn read_strings(input: JsValue, what: &str) -> Result<Vec<String>, JsValue> {
    Ok(match read_json(input, what)? {
        Value::Array(items) => items
            .iter()
            .filter_map(Value::as_str)
            .map(str::to_string)
            .collect(),
        _ => Vec::new(),
    })
}

/// Trả về object thường thay cho `Map` của JS để script lens truy cập bằng dấu chấm.
fn to_js<T: Serialize + ?Sized>(value: &T) -> Result<JsValue, JsValue> {
    value
        .serialize(&Serializer::json_compatible())
        .map_err(|err| JsValue::from_str(&format!("Không chuyển được kết quả: {err}")))
}

fn format_lens_error(err: LensError) -> JsValue {
    JsValue::from_str(&format!("Lỗi lens: {err}"))
}

#[wasm_bindgen]
pub fn get_patient_info(bundle: JsValue) -> Result<JsValue, JsValue> {
    let bundle = read_json(bundle, "bundle")?;
    to_js(&lens_fhir::get_patient_info(&bundle))
}

#[wasm_bindgen]
pub fn get_conditions(bundle: JsValue) -> Result<JsValue, JsValue> {
    let bundle = read_json(bundle, "bundle")?;
    to_js(&lens_fhir::get_conditions(&bundle))
}

#[wasm_bindgen]
pub fn get_allergies(bundle: JsValue) -> Result<JsValue, JsValue> {
    let bundle = read_json(bundle, "bundle")?;
    to_js(&lens_fhir::get_allergies(&bundle))
}

#[wasm_bindgen]
pub fn get_medications(bundle: JsValue) -> Result<JsValue, JsValue> {
    let bundle = read_json(bundle, "bundle")?;
    to_js(&lens_fhir::get_medications(&bundle))
}

#[wasm_bindgen]
pub fn get_observations_by_code(
    bundle: JsValue,
    codes: JsValue,
    include_display: Option<String>,
) -> Result<JsValue, JsValue> {
    let bundle = read_json(bundle, "bundle")?;
    let codes = read_strings(codes, "codes")?;
    let options = ObservationOptions {
        include_display,
        ..ObservationOptions::default()
    };
    to_js(&lens_fhir::get_observations_by_code(&bundle, &codes, &options))
}

#[wasm_bindgen]
pub fn has_occupation(bundle: JsValue, occupation_code: &str) -> Result<bool, JsValue> {
    let bundle = read_json(bundle, "bundle")?;
    Ok(lens_fhir::has_occupation(&bundle, occupation_code))
}

#[wasm_bindgen]
pub fn get_patient_extensions(
    bundle: JsValue,
    url_filter: Option<String>,
) -> Result<JsValue, JsValue> {
    let bundle = read_json(bundle, "bundle")?;
    to_js(&lens_fhir::get_patient_extensions(
        &bundle,
        url_filter.as_deref(),
    ))
}

#[wasm_bindgen]
pub fn get_patient_contacts(bundle: JsValue) -> Result<JsValue, JsValue> {
    let bundle = read_json(bundle, "bundle")?;
    to_js(&lens_fhir::get_patient_contacts(&bundle))
}

#[wasm_bindgen]
pub fn get_annotated_sections(epi: JsValue) -> Result<JsValue, JsValue> {
    let epi = read_json(epi, "ePI")?;
    to_js(&lens_fhir::get_annotated_sections(&epi))
}

#[wasm_bindgen]
pub fn match_bundle_identifier(epi: JsValue, candidates: JsValue) -> Result<bool, JsValue> {
    let epi = read_json(epi, "ePI")?;
    let candidates = read_strings(candidates, "identifiers")?;
    Ok(lens_fhir::match_bundle_identifier(&epi, &candidates))
}

#[wasm_bindgen]
pub fn match_product_identifier(epi: JsValue, candidates: JsValue) -> Result<bool, JsValue> {
    let epi = read_json(epi, "ePI")?;
    let candidates = read_strings(candidates, "identifiers")?;
    Ok(lens_fhir::match_product_identifier(&epi, &candidates))
}

#[wasm_bindgen]
pub fn get_document_language(epi: JsValue) -> Result<Option<String>, JsValue> {
    let epi = read_json(epi, "ePI")?;
    Ok(lens_fhir::get_document_language(&epi))
}

#[wasm_bindgen]
pub fn find_sections_by_code(
    epi: JsValue,
    search_codes: JsValue,
    match_system: bool,
) -> Result<JsValue, JsValue> {
    let epi = read_json(epi, "ePI")?;
    let search_codes = read_json(search_codes, "search codes")?;
    to_js(&lens_fhir::find_sections_by_value(
        &epi,
        &search_codes,
        match_system,
    ))
}

#[wasm_bindgen]
pub fn match_clinical_sections(
    epi: JsValue,
    bundle: JsValue,
    match_system: bool,
) -> Result<JsValue, JsValue> {
    let epi = read_json(epi, "ePI")?;
    let bundle = read_json(bundle, "bundle")?;
    to_js(&lens_fhir::match_clinical_sections(&epi, &bundle, match_system))
}

#[wasm_bindgen]
pub fn get_all_dimensions(persona: JsValue, config: Option<JsValue>) -> Result<JsValue, JsValue> {
    let persona = read_json(persona, "persona vector")?;
    let cfg = read_config(config)?;
    to_js(PersonaReader::with_config(&persona, &cfg).dimensions())
}

#[wasm_bindgen]
pub fn get_dimension_by_code(
    persona: JsValue,
    code: &str,
    config: Option<JsValue>,
) -> Result<JsValue, JsValue> {
    let persona = read_json(persona, "persona vector")?;
    let cfg = read_config(config)?;
    to_js(&PersonaReader::with_config(&persona, &cfg).by_code(code))
}

#[wasm_bindgen]
pub fn get_dimensions_by_codes(
    persona: JsValue,
    codes: JsValue,
    config: Option<JsValue>,
) -> Result<JsValue, JsValue> {
    let persona = read_json(persona, "persona vector")?;
    let codes = read_strings(codes, "codes")?;
    let cfg = read_config(config)?;
    to_js(&PersonaReader::with_config(&persona, &cfg).by_codes(&codes))
}

#[wasm_bindgen]
pub fn get_dimensions_by_value_type(
    persona: JsValue,
    value_type: JsValue,
    config: Option<JsValue>,
) -> Result<JsValue, JsValue> {
    let persona = read_json(persona, "persona vector")?;
    let value_type: ValueType = from_value(value_type)
        .map_err(|err| JsValue::from_str(&format!("Không đọc được kiểu giá trị: {err}")))?;
    let cfg = read_config(config)?;
    to_js(&PersonaReader::with_config(&persona, &cfg).by_value_type(value_type))
}

/// Object điều kiện với các trường tuỳ chọn `dimensionCode`, `value`, `valueType`.
#[wasm_bindgen]
pub fn match_dimensions(
    persona: JsValue,
    criteria: JsValue,
    config: Option<JsValue>,
) -> Result<JsValue, JsValue> {
    let persona = read_json(persona, "persona vector")?;
    let criteria = match read_json(criteria, "criteria")? {
        Value::Null => JsDimensionCriteria::default(),
        raw => serde_json::from_value::<JsDimensionCriteria>(raw)
            .map_err(|err| JsValue::from_str(&format!("Không đọc được điều kiện: {err}")))?,
    };
    let criteria = DimensionCriteria {
        dimension_code: criteria.dimension_code,
        value: criteria.value,
        value_type: criteria.value_type,
        ..DimensionCriteria::default()
    };
    let cfg = read_config(config)?;
    to_js(&PersonaReader::with_config(&persona, &cfg).matching(&criteria))
}

#[wasm_bindgen]
pub fn group_dimensions_by_subject(
    persona: JsValue,
    config: Option<JsValue>,
) -> Result<JsValue, JsValue> {
    let persona = read_json(persona, "persona vector")?;
    let cfg = read_config(config)?;
    to_js(&PersonaReader::with_config(&persona, &cfg).grouped_by_subject())
}

#[wasm_bindgen]
pub fn get_dimension_value(
    persona: JsValue,
    code: &str,
    config: Option<JsValue>,
) -> Result<JsValue, JsValue> {
    let persona = read_json(persona, "persona vector")?;
    let cfg = read_config(config)?;
    to_js(&PersonaReader::with_config(&persona, &cfg).value_of(code))
}

#[wasm_bindgen]
pub fn validate_persona_vector(persona: JsValue) -> Result<JsValue, JsValue> {
    let persona = read_json(persona, "persona vector")?;
    to_js(&lens_fhir::validate_persona_vector(&persona))
}

#[wasm_bindgen]
pub fn validate_epi(epi: JsValue) -> Result<JsValue, JsValue> {
    let epi = read_json(epi, "ePI")?;
    to_js(&lens_fhir::validate_epi(&epi))
}

#[wasm_bindgen]
pub fn validate_clinical_bundle(bundle: JsValue) -> Result<JsValue, JsValue> {
    let bundle = read_json(bundle, "bundle")?;
    to_js(&lens_fhir::validate_clinical_bundle(&bundle))
}

/// Báo lỗi khi thiếu markup, danh sách mục hoặc class.
#[wasm_bindgen]
pub fn annotate_markup(
    markup: Option<String>,
    categories: JsValue,
    class: Option<String>,
    lens_tag: Option<String>,
) -> Result<String, JsValue> {
    let markup = markup.ok_or_else(|| format_lens_error(LensError::MissingParameter("markup")))?;
    let class = class.ok_or_else(|| format_lens_error(LensError::MissingParameter("class")))?;
    let categories: Vec<String> = match read_json(categories, "categories")? {
        Value::Array(items) => items
            .iter()
            .filter_map(Value::as_str)
            .map(str::to_string)
            .collect(),
        _ => return Err(format_lens_error(LensError::MissingParameter("categories"))),
    };

    lens_fhir::annotate_markup(&markup, &categories, &class, lens_tag.as_deref())
        .map_err(format_lens_error)
}

/// Bản sao ePI đã đánh dấu; `class` mặc định là class nổi bật trong cấu hình.
#[wasm_bindgen]
pub fn annotate_document(
    epi: JsValue,
    categories: JsValue,
    class: Option<String>,
    lens_tag: Option<String>,
    config: Option<JsValue>,
) -> Result<JsValue, JsValue> {
    let epi = read_json(epi, "ePI")?;
    let categories = read_strings(categories, "categories")?;
    let cfg = read_config(config)?;
    let class = class.unwrap_or(cfg.highlight_class);
    let annotated = lens_fhir::annotate_document(&epi, &categories, &class, lens_tag.as_deref())
        .map_err(format_lens_error)?;
    to_js(&annotated)
}

#[wasm_bindgen]
pub fn annotate_relevance(
    epi: JsValue,
    relevant: JsValue,
    lens_tag: Option<String>,
    config: Option<JsValue>,
) -> Result<JsValue, JsValue> {
    let epi = read_json(epi, "ePI")?;
    let relevant = read_strings(relevant, "categories")?;
    let cfg = read_config(config)?;
    let annotated = lens_fhir::annotate_relevance(&epi, &relevant, &cfg, lens_tag.as_deref())
        .map_err(format_lens_error)?;
    to_js(&annotated)
}

#[wasm_bindgen]
pub fn translate(
    dictionary: JsValue,
    key: &str,
    language: &str,
    config: Option<JsValue>,
) -> Result<String, JsValue> {
    let dictionary = Translations::from_value(&read_json(dictionary, "dictionary")?);
    let cfg = read_config(config)?;
    Ok(lens_fhir::translate(&dictionary, key, language, &cfg))
}
