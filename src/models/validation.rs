use serde::{Deserialize, Serialize};

/// Minimum sub-scores a prompt should reach
pub const CLARITY_THRESHOLD: f64 = 0.7;
pub const COMPLETENESS_THRESHOLD: f64 = 0.8;
pub const CONTEXT_RELEVANCE_THRESHOLD: f64 = 0.75;
pub const OVERALL_QUALITY_THRESHOLD: f64 = 0.75;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationIssue {
    pub code: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
}

impl ValidationIssue {
    pub fn new(code: &str, message: impl Into<String>) -> Self {
        Self {
            code: code.to_string(),
            message: message.into(),
            field: None,
        }
    }

    pub fn for_field(code: &str, field: &str, message: impl Into<String>) -> Self {
        Self {
            code: code.to_string(),
            message: message.into(),
            field: Some(field.to_string()),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PromptValidationResult {
    pub is_valid: bool,
    pub errors: Vec<ValidationIssue>,
    pub warnings: Vec<ValidationIssue>,
    pub quality_score: f64,
    pub suggestions: Vec<String>,
}

impl PromptValidationResult {
    pub fn error_messages(&self) -> Vec<String> {
        self.errors.iter().map(|e| e.message.clone()).collect()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QualityAssessment {
    pub clarity: f64,
    pub completeness: f64,
    pub context_relevance: f64,
    pub schema_alignment: f64,
    pub overall_score: f64,
    pub suggestions: Vec<String>,
}

impl QualityAssessment {
    pub fn zeroed(suggestion: impl Into<String>) -> Self {
        Self {
            clarity: 0.0,
            completeness: 0.0,
            context_relevance: 0.0,
            schema_alignment: 0.0,
            overall_score: 0.0,
            suggestions: vec![suggestion.into()],
        }
    }

    pub fn meets_thresholds(&self) -> bool {
        self.clarity >= CLARITY_THRESHOLD
            && self.completeness >= COMPLETENESS_THRESHOLD
            && self.context_relevance >= CONTEXT_RELEVANCE_THRESHOLD
            && self.overall_score >= OVERALL_QUALITY_THRESHOLD
    }
}
