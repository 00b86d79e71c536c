//! Các bản ghi dữ liệu dùng chung cho bộ trích xuất và đối chiếu lens.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Hệ mã gắn cho các observation chiều persona.
pub const PERSONA_DIMENSION_SYSTEM: &str =
    "http://hl7.eu/fhir/ig/gravitate-health/CodeSystem/persona-dimension-cs";

/// Cấu hình dùng chung cho bộ trích xuất, bộ đánh dấu và các cầu nối.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LensConfig {
    /// URI hệ mã dùng để nhận diện coding chiều của observation persona.
    pub persona_code_system: String,
    /// Ngôn ngữ dự phòng khi thiếu bản dịch cho ngôn ngữ được yêu cầu.
    pub default_language: String,
    /// Class thêm vào các mục lens muốn làm nổi bật.
    pub highlight_class: String,
    /// Class thêm vào các mục lens muốn thu gọn.
    pub collapse_class: String,
}

impl Default for LensConfig {
    fn default() -> Self {
        Self {
            persona_code_system: PERSONA_DIMENSION_SYSTEM.to_string(),
            default_language: "en".to_string(),
            highlight_class: "highlight".to_string(),
            collapse_class: "collapse".to_string(),
        }
    }
}

/// Các loại resource FHIR đã biết. Loại khác rơi vào `Other` và không bao giờ
/// khớp với tra cứu theo loại đã biết.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ResourceKind {
    Patient,
    Condition,
    AllergyIntolerance,
    MedicationStatement,
    MedicationDispense,
    MedicationAdministration,
    MedicationRequest,
    Medication,
    Observation,
    Composition,
    MedicinalProductDefinition,
    Practitioner,
    Organization,
    Bundle,
    Other(String),
}

impl ResourceKind {
    /// Các loại hoạt động dùng thuốc được `get_medications` gộp lại.
    pub const MEDICATION_ACTIVITIES: [ResourceKind; 4] = [
        ResourceKind::MedicationStatement,
        ResourceKind::MedicationDispense,
        ResourceKind::MedicationAdministration,
        ResourceKind::MedicationRequest,
    ];

    pub fn parse(value: &str) -> Self {
        match value {
            "Patient" => Self::Patient,
            "Condition" => Self::Condition,
            "AllergyIntolerance" => Self::AllergyIntolerance,
            "MedicationStatement" => Self::MedicationStatement,
            "MedicationDispense" => Self::MedicationDispense,
            "MedicationAdministration" => Self::MedicationAdministration,
            "MedicationRequest" => Self::MedicationRequest,
            "Medication" => Self::Medication,
            "Observation" => Self::Observation,
            "Composition" => Self::Composition,
            "MedicinalProductDefinition" => Self::MedicinalProductDefinition,
            "Practitioner" => Self::Practitioner,
            "Organization" => Self::Organization,
            "Bundle" => Self::Bundle,
            other => Self::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Patient => "Patient",
            Self::Condition => "Condition",
            Self::AllergyIntolerance => "AllergyIntolerance",
            Self::MedicationStatement => "MedicationStatement",
            Self::MedicationDispense => "MedicationDispense",
            Self::MedicationAdministration => "MedicationAdministration",
            Self::MedicationRequest => "MedicationRequest",
            Self::Medication => "Medication",
            Self::Observation => "Observation",
            Self::Composition => "Composition",
            Self::MedicinalProductDefinition => "MedicinalProductDefinition",
            Self::Practitioner => "Practitioner",
            Self::Organization => "Organization",
            Self::Bundle => "Bundle",
            Self::Other(name) => name,
        }
    }

    pub fn is_medication_activity(&self) -> bool {
        Self::MEDICATION_ACTIVITIES.contains(self)
    }
}

impl From<String> for ResourceKind {
    fn from(value: String) -> Self {
        Self::parse(&value)
    }
}

impl From<ResourceKind> for String {
    fn from(kind: ResourceKind) -> Self {
        kind.as_str().to_string()
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Nguồn của mã thuốc khi không nằm trực tiếp trong resource.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum CodeSource {
    MedicationCode,
    Ingredient,
}

/// Chế độ so sánh hai mã.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CodeMatch {
    /// Phải trùng cả mã lẫn hệ mã.
    Strict,
    /// Chỉ cần trùng giá trị mã.
    Loose,
}

impl CodeMatch {
    pub fn from_strict(strict: bool) -> Self {
        if strict {
            Self::Strict
        } else {
            Self::Loose
        }
    }
}

/// Bộ ba coding đã chuẩn hoá.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct Code {
    pub code: String,
    #[serde(default)]
    pub system: String,
    #[serde(default)]
    pub display: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<CodeSource>,
}

impl Code {
    pub fn new(code: impl Into<String>, system: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            system: system.into(),
            ..Self::default()
        }
    }

    pub fn with_display(mut self, display: impl Into<String>) -> Self {
        self.display = display.into();
        self
    }

    pub fn tagged(mut self, source: CodeSource) -> Self {
        self.source = Some(source);
        self
    }

    /// Strict so cả mã và hệ mã, loose chỉ so mã. Nhãn `source` và `display`
    /// không tham gia so sánh.
    pub fn matches(&self, other: &Code, mode: CodeMatch) -> bool {
        match mode {
            CodeMatch::Strict => self.code == other.code && self.system == other.system,
            CodeMatch::Loose => self.code == other.code,
        }
    }
}

/// Điều kiện tìm kiếm cho bộ đối chiếu mục: một giá trị mã trần hoặc một
/// bộ ba coding đầy đủ.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum SearchCode {
    Bare(String),
    Coded(Code),
}

impl SearchCode {
    /// Mã trần chỉ so theo giá trị mã, bất kể chế độ.
    pub fn matches(&self, candidate: &Code, mode: CodeMatch) -> bool {
        match self {
            Self::Bare(code) => *code == candidate.code,
            Self::Coded(code) => code.matches(candidate, mode),
        }
    }
}

impl From<&str> for SearchCode {
    fn from(value: &str) -> Self {
        Self::Bare(value.to_string())
    }
}

impl From<Code> for SearchCode {
    fn from(value: Code) -> Self {
        Self::Coded(value)
    }
}

/// Patient đầu tiên của bundle kèm tuổi đã tính.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PatientInfo {
    #[serde(flatten)]
    pub resource: Map<String, Value>,
    pub age: Option<i64>,
}

impl PatientInfo {
    pub fn id(&self) -> Option<&str> {
        self.resource.get("id").and_then(Value::as_str)
    }

    pub fn gender(&self) -> Option<&str> {
        self.resource.get("gender").and_then(Value::as_str)
    }

    pub fn birth_date(&self) -> Option<&str> {
        self.resource.get("birthDate").and_then(Value::as_str)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ConditionFact {
    pub id: Option<String>,
    pub codes: Vec<Code>,
    pub text: Option<String>,
    pub clinical_status: Option<String>,
    pub verification_status: Option<String>,
    pub onset_date_time: Option<String>,
    pub recorded_date: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AllergyFact {
    pub id: Option<String>,
    pub codes: Vec<Code>,
    pub text: Option<String>,
    pub clinical_status: Option<String>,
    pub verification_status: Option<String>,
    pub criticality: Option<String>,
    #[serde(default)]
    pub category: Vec<String>,
    #[serde(rename = "type")]
    pub allergy_type: Option<String>,
}

/// Hoạt động dùng thuốc với mã gộp theo thứ tự: trực tiếp, qua tham chiếu,
/// rồi từ thành phần.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MedicationFact {
    pub id: Option<String>,
    pub resource_type: ResourceKind,
    pub codes: Vec<Code>,
    pub text: Option<String>,
    pub status: Option<String>,
    pub reference: Option<String>,
}

/// Những gì một lens thường cần từ một bundle lâm sàng.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ClinicalFacts {
    pub patient: Option<PatientInfo>,
    pub conditions: Vec<ConditionFact>,
    pub allergies: Vec<AllergyFact>,
    pub medications: Vec<MedicationFact>,
}

impl ClinicalFacts {
    /// Trải phẳng mã của mọi dữ kiện thành điều kiện tìm kiếm cho bộ đối chiếu.
    pub fn search_codes(&self) -> Vec<SearchCode> {
        self.conditions
            .iter()
            .flat_map(|fact| fact.codes.iter())
            .chain(self.allergies.iter().flat_map(|fact| fact.codes.iter()))
            .chain(self.medications.iter().flat_map(|fact| fact.codes.iter()))
            .cloned()
            .map(SearchCode::Coded)
            .collect()
    }
}

/// Giá trị `value[x]` có kiểu hoặc mốc thời gian của observation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", content = "value", rename_all = "camelCase")]
pub enum ObservationValue {
    Quantity {
        value: Option<f64>,
        unit: Option<String>,
        system: Option<String>,
        code: Option<String>,
    },
    CodeableConcept(Vec<Code>),
    String(String),
    Integer(i64),
    Boolean(bool),
    DateTime(String),
    Period {
        start: Option<String>,
        end: Option<String>,
    },
}

impl ObservationValue {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Quantity { value, .. } => *value,
            Self::Integer(value) => Some(*value as f64),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ObservationFact {
    pub id: Option<String>,
    pub codes: Vec<Code>,
    pub text: Option<String>,
    pub status: Option<String>,
    pub value: Option<ObservationValue>,
    pub effective: Option<ObservationValue>,
    pub issued: Option<String>,
}

/// Extension của Patient đầu tiên, rút gọn thành URL và `value[x]`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PatientExtension {
    pub url: String,
    pub value: Option<Value>,
}

/// Số điện thoại hoặc email lấy từ bác sĩ gia đình đã phân giải được.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PatientContact {
    pub resource_type: ResourceKind,
    pub reference: String,
    pub name: Option<String>,
    pub system: String,
    pub value: String,
    #[serde(rename = "use")]
    pub contact_use: Option<String>,
}

/// Một định danh mục của tài liệu thông tin sản phẩm và các mã liên quan.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AnnotatedSection {
    pub category: String,
    pub codes: Vec<Code>,
}

/// Cho biết trường có kiểu nào cung cấp giá trị chiều persona.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum ValueType {
    CodeableConcept,
    String,
    Integer,
    Boolean,
    Quantity,
}

/// Giá trị vô hướng của chiều persona. Giá trị mã hoá giữ mã đầu tiên.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum DimensionValue {
    Boolean(bool),
    Integer(i64),
    Number(f64),
    Text(String),
}

impl DimensionValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Text(text) => Some(text),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Integer(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Integer(value) => Some(*value as f64),
            Self::Number(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Boolean(value) => Some(*value),
            _ => None,
        }
    }
}

/// Một observation sở thích bệnh nhân trong tập persona.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PersonaDimension {
    pub id: Option<String>,
    pub status: Option<String>,
    pub dimension_code: Option<String>,
    pub dimension_display: Option<String>,
    pub subject: Option<String>,
    pub effective_date_time: Option<String>,
    pub value: Option<DimensionValue>,
    pub value_type: Option<ValueType>,
    pub codes: Vec<Code>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value_codes: Option<Vec<Code>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
}

/// Kết quả kiểm tra cấu trúc. Bộ kiểm tra chỉ báo cáo, không trả lỗi.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ValidationReport {
    pub valid: bool,
    pub errors: Vec<String>,
}

impl ValidationReport {
    pub fn from_errors(errors: Vec<String>) -> Self {
        Self {
            valid: errors.is_empty(),
            errors,
        }
    }
}

/// Lỗi tại các điểm có thể thất bại: đọc JSON và đánh dấu markup.
#[derive(Debug, thiserror::Error)]
pub enum LensError {
    #[error("Không đọc được dữ liệu đầu vào: {0}")]
    Parse(String),
    #[error("Thiếu tham số bắt buộc `{0}`")]
    MissingParameter(&'static str),
    #[error("Dữ liệu đầu vào không hợp lệ: {0}")]
    InvalidInput(String),
}

/// Đọc tài liệu JSON thành cây mà bộ trích xuất chấp nhận.
pub fn parse_json(input: &str) -> Result<Value, LensError> {
    serde_json::from_str(input).map_err(|err| LensError::Parse(err.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resource_kind_round_trips_unknown_names() {
        let kind = ResourceKind::parse("Encounter");
        assert_eq!(kind, ResourceKind::Other("Encounter".to_string()));
        assert_eq!(kind.as_str(), "Encounter");
        assert!(!kind.is_medication_activity());
        assert!(ResourceKind::parse("MedicationDispense").is_medication_activity());
    }

    #[test]
    fn strict_match_implies_loose_match() {
        let a = Code::new("123", "SYS1");
        let b = Code::new("123", "SYS2");
        assert!(!a.matches(&b, CodeMatch::Strict));
        assert!(a.matches(&b, CodeMatch::Loose));
        assert!(a.matches(&a.clone().tagged(CodeSource::Ingredient), CodeMatch::Strict));
    }

    #[test]
    fn code_matching_is_symmetric() {
        let codes = [
            Code::new("123", "SYS1"),
            Code::new("123", "SYS2"),
            Code::new("456", "SYS1"),
            Code::new("123", ""),
        ];
        for a in &codes {
            for b in &codes {
                for mode in [CodeMatch::Strict, CodeMatch::Loose] {
                    assert_eq!(a.matches(b, mode), b.matches(a, mode));
                }
                if a.matches(b, CodeMatch::Strict) {
                    assert!(a.matches(b, CodeMatch::Loose));
                }
            }
        }
    }

    #[test]
    fn search_codes_deserialize_from_strings_and_objects() {
        let codes: Vec<SearchCode> =
            serde_json::from_str(r#"["123", {"code": "456", "system": "SYS"}]"#).unwrap();
        assert_eq!(codes[0], SearchCode::Bare("123".to_string()));
        assert_eq!(codes[1], SearchCode::Coded(Code::new("456", "SYS")));
    }

    #[test]
    fn untagged_codes_omit_source() {
        let json = serde_json::to_value(Code::new("1", "S")).unwrap();
        assert!(json.get("source").is_none());
        let json = serde_json::to_value(Code::new("1", "S").tagged(CodeSource::MedicationCode))
            .unwrap();
        assert_eq!(json["source"], "medication-code");
    }

    #[test]
    fn parse_json_reports_errors() {
        assert!(matches!(parse_json("{"), Err(LensError::Parse(_))));
    }
}
