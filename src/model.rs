use std::fmt;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentSection {
    pub heading: String,
    pub level: u8,
    pub content: String,
    pub subsections: Vec<DocumentSection>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParsedDocument {
    pub sections: Vec<DocumentSection>,
    pub raw_text: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentChunk {
    pub chunk_id: String,
    pub document_id: String,
    pub section_path: Vec<String>,
    pub heading: String,
    pub content: String,
    pub char_count: usize,
    pub estimated_tokens: usize,
    pub keywords: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkedDocument {
    pub document_id: String,
    pub filename: String,
    pub chunks: Vec<DocumentChunk>,
    pub total_chunks: usize,
    pub total_chars: usize,
    pub total_estimated_tokens: usize,
    pub chunked_at: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationStatus {
    Validated,
    NeedsReview,
    Dismissed,
}

impl ValidationStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Validated => "validated",
            Self::NeedsReview => "needs_review",
            Self::Dismissed => "dismissed",
        }
    }
}

/// Marker in `TestStep::mistyped` for a step entry that was not an object.
pub const NOT_AN_OBJECT: &str = "step";

/// One test step. Text fields of the wrong JSON type decode as absent and
/// their names are kept in `mistyped` for validation to report.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "StepRepr")]
pub struct TestStep {
    pub step_number: usize,
    pub action: String,
    pub input: String,
    pub expected_result: Option<String>,
    #[serde(skip)]
    pub mistyped: Vec<&'static str>,
}

#[derive(Default, Deserialize)]
#[serde(default)]
struct StepRepr {
    step_number: Value,
    action: Value,
    input: Value,
    expected_result: Value,
}

impl From<StepRepr> for TestStep {
    fn from(repr: StepRepr) -> Self {
        let mut mistyped = Vec::new();
        let action = step_text(repr.action, "action", &mut mistyped).unwrap_or_default();
        let input = step_text(repr.input, "input", &mut mistyped).unwrap_or_default();
        let expected_result = step_text(repr.expected_result, "expected_result", &mut mistyped);

        Self {
            step_number: repr
                .step_number
                .as_u64()
                .and_then(|number| usize::try_from(number).ok())
                .unwrap_or_default(),
            action,
            input,
            expected_result,
            mistyped,
        }
    }
}

fn step_text(
    value: Value,
    field: &'static str,
    mistyped: &mut Vec<&'static str>,
) -> Option<String> {
    match value {
        Value::String(text) => Some(text),
        Value::Null => None,
        _ => {
            mistyped.push(field);
            None
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Traceability {
    #[serde(deserialize_with = "optional_text")]
    pub source_confluence_page_id: Option<String>,
    #[serde(deserialize_with = "optional_text")]
    pub generated_at: Option<String>,
}

/// A scenario as produced by the generation step. Every field may be missing,
/// null or of the wrong type in generated input; such fields decode as absent
/// and are reported by validation rather than rejected at decode time.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneratedTestScenario {
    #[serde(deserialize_with = "text")]
    pub test_id: String,
    #[serde(deserialize_with = "optional_text")]
    pub test_name: Option<String>,
    #[serde(deserialize_with = "optional_text")]
    pub description: Option<String>,
    #[serde(deserialize_with = "optional_text")]
    pub test_type: Option<String>,
    #[serde(deserialize_with = "optional_text")]
    pub scenario_classification: Option<String>,
    #[serde(deserialize_with = "optional_text")]
    pub priority: Option<String>,
    #[serde(deserialize_with = "text_list")]
    pub preconditions: Vec<String>,
    #[serde(deserialize_with = "steps")]
    pub test_steps: Vec<TestStep>,
    #[serde(deserialize_with = "optional_text")]
    pub automation_status: Option<String>,
    #[serde(deserialize_with = "optional_text")]
    pub test_repository_folder: Option<String>,
    #[serde(deserialize_with = "or_default")]
    pub validation_status: Option<ValidationStatus>,
    #[serde(deserialize_with = "or_default")]
    pub validation_notes: ValidationNotes,
    #[serde(deserialize_with = "or_default")]
    pub traceability: Traceability,
    #[serde(deserialize_with = "optional_text")]
    pub parent_jira_issue_id: Option<String>,
}

impl GeneratedTestScenario {
    /// Decodes one entry of a scenario file. Only a non-object entry fails.
    pub fn from_value(value: Value) -> Result<Self, serde_json::Error> {
        serde_json::from_value(value)
    }
}

fn scalar_text(value: Value) -> Option<String> {
    match value {
        Value::String(text) => Some(text),
        Value::Number(number) => Some(number.to_string()),
        Value::Bool(flag) => Some(flag.to_string()),
        _ => None,
    }
}

fn optional_text<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<String>, D::Error> {
    Ok(scalar_text(Value::deserialize(deserializer)?))
}

fn text<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    Ok(optional_text(deserializer)?.unwrap_or_default())
}

fn text_list<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<String>, D::Error> {
    let items = match Value::deserialize(deserializer)? {
        Value::Array(items) => items.into_iter().filter_map(scalar_text).collect(),
        Value::String(item) => vec![item],
        _ => Vec::new(),
    };
    Ok(items)
}

fn steps<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<TestStep>, D::Error> {
    let steps = match Value::deserialize(deserializer)? {
        Value::Array(items) => items
            .into_iter()
            .map(|item| match item {
                Value::Object(_) => serde_json::from_value(item).unwrap_or_default(),
                _ => TestStep {
                    mistyped: vec![NOT_AN_OBJECT],
                    ..TestStep::default()
                },
            })
            .collect(),
        _ => Vec::new(),
    };
    Ok(steps)
}

fn or_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned + Default,
{
    Ok(serde_json::from_value(Value::deserialize(deserializer)?).unwrap_or_default())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationDetailType {
    AutoCorrectionNeeded,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Critical,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationDetail {
    #[serde(rename = "type")]
    pub detail_type: ValidationDetailType,
    pub severity: Severity,
    pub ratio: f64,
    pub problematic_steps: Vec<usize>,
}

impl ValidationDetail {
    pub fn auto_correction_needed(ratio: f64, problematic_steps: Vec<usize>) -> Self {
        Self {
            detail_type: ValidationDetailType::AutoCorrectionNeeded,
            severity: Severity::Critical,
            ratio,
            problematic_steps,
        }
    }
}

/// Review notes attached to a scenario.
///
/// `issues` are blocking findings, `flags` are structured signals and are only
/// ever appended to, `remarks` are informational. Legacy payloads where notes
/// were a bare string or a bare array of details still decode.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "NotesRepr")]
pub struct ValidationNotes {
    pub issues: Vec<String>,
    pub flags: Vec<ValidationDetail>,
    pub remarks: Vec<String>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum NotesRepr {
    Text(String),
    Details(Vec<ValidationDetail>),
    Structured {
        #[serde(default)]
        issues: Vec<String>,
        #[serde(default)]
        flags: Vec<ValidationDetail>,
        #[serde(default)]
        remarks: Vec<String>,
    },
    Empty(()),
}

impl From<NotesRepr> for ValidationNotes {
    fn from(repr: NotesRepr) -> Self {
        match repr {
            NotesRepr::Text(text) if text.trim().is_empty() => Self::default(),
            NotesRepr::Text(text) => Self {
                remarks: vec![text],
                ..Self::default()
            },
            NotesRepr::Details(flags) => Self {
                flags,
                ..Self::default()
            },
            NotesRepr::Structured {
                issues,
                flags,
                remarks,
            } => Self {
                issues,
                flags,
                remarks,
            },
            NotesRepr::Empty(()) => Self::default(),
        }
    }
}

impl ValidationNotes {
    pub fn has_critical_flag(&self) -> bool {
        self.flags
            .iter()
            .any(|flag| flag.severity == Severity::Critical)
    }

    /// Flat rendering for presentation layers: issues joined with `"; "`,
    /// followed by remarks.
    pub fn render(&self) -> String {
        let mut parts = Vec::<String>::new();
        if !self.issues.is_empty() {
            parts.push(self.issues.join("; "));
        }
        parts.extend(self.remarks.iter().cloned());
        parts.join(" | ")
    }
}

impl fmt::Display for ValidationNotes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewConceptsAnalysis {
    #[serde(rename = "hasNewConcepts")]
    pub has_new_concepts: bool,
    #[serde(rename = "newConceptRatio")]
    pub new_concept_ratio: f64,
    #[serde(rename = "newKeywords")]
    pub new_keywords: Vec<String>,
    #[serde(rename = "totalKeywords")]
    pub total_keywords: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InputMetadata {
    pub parent_jira_issue_id: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NormalizedInput {
    pub normalized_text: String,
    pub metadata: InputMetadata,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationSummary {
    pub total: usize,
    pub validated: usize,
    pub needs_review: usize,
    pub auto_corrected: usize,
    pub correction_failed: usize,
    pub dismissed: usize,
    pub unprocessed: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunPaths {
    pub input_path: String,
    pub output_path: String,
    pub manifest_path: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ChunkRunCounts {
    pub source_chars: usize,
    pub sections: usize,
    pub chunks: usize,
    pub total_estimated_tokens: usize,
    pub exceeds_context: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct ChunkRunManifest {
    pub manifest_version: u32,
    pub run_id: String,
    pub status: String,
    pub started_at: String,
    pub updated_at: String,
    pub command: String,
    pub document_id: String,
    pub paths: RunPaths,
    pub counts: ChunkRunCounts,
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ValidationRunManifest {
    pub manifest_version: u32,
    pub run_id: String,
    pub job_id: String,
    pub status: String,
    pub started_at: String,
    pub updated_at: String,
    pub command: String,
    pub correction_enabled: bool,
    pub paths: RunPaths,
    pub summary: ValidationSummary,
    pub warnings: Vec<String>,
}
