//! Structural checks and quality scoring for generated prompts.
//!
//! Both operate on the prompt's JSON form so that a wholly absent section can
//! be told apart from an empty one. Neither ever fails: a prompt that cannot
//! be serialized yields a single `VALIDATION_EXCEPTION` error.

use serde_json::Value;

use crate::models::{
    GeneratedPrompt, PromptValidationResult, QualityAssessment, ValidationIssue,
    CLARITY_THRESHOLD, COMPLETENESS_THRESHOLD, CONTEXT_RELEVANCE_THRESHOLD,
    OVERALL_QUALITY_THRESHOLD,
};

pub const MANDATORY_SECTIONS: [&str; 4] = [
    "systemMessage",
    "contextSection",
    "instructionSection",
    "schemaSection",
];

pub const REQUIRED_RESPONSE_FIELDS: [&str; 3] = ["decision", "reasoning", "commands"];

const MIN_SYSTEM_MESSAGE_CHARS: usize = 50;

#[derive(Clone, Copy)]
enum FieldKind {
    String,
    Number,
    Object,
}

const TOP_LEVEL_FIELDS: [(&str, FieldKind); 7] = [
    ("promptId", FieldKind::String),
    ("sessionId", FieldKind::String),
    ("stepIndex", FieldKind::Number),
    ("promptType", FieldKind::String),
    ("content", FieldKind::Object),
    ("schema", FieldKind::Object),
    ("generatedAt", FieldKind::String),
];

impl FieldKind {
    fn matches(&self, value: &Value) -> bool {
        match self {
            FieldKind::String => value.is_string(),
            FieldKind::Number => value.is_number(),
            FieldKind::Object => value.is_object(),
        }
    }

    fn name(&self) -> &'static str {
        match self {
            FieldKind::String => "string",
            FieldKind::Number => "number",
            FieldKind::Object => "object",
        }
    }
}

/// Present and not `null`
fn present<'a>(parent: Option<&'a Value>, key: &str) -> Option<&'a Value> {
    parent.and_then(|p| p.get(key)).filter(|v| !v.is_null())
}

fn is_investigation_type(prompt: &Value) -> bool {
    prompt
        .get("promptType")
        .and_then(Value::as_str)
        .map(|t| t.starts_with("INVESTIGATION_"))
        .unwrap_or(false)
}

fn round_score(score: f64) -> f64 {
    (score.clamp(0.0, 1.0) * 10_000.0).round() / 10_000.0
}

/// Response schema has `type: "object"` and the three top-level properties
pub fn validate_schema_integration(schema: &Value) -> bool {
    let is_object = schema.get("type").and_then(Value::as_str) == Some("object");
    let Some(properties) = schema.get("properties").and_then(Value::as_object) else {
        return false;
    };
    is_object && REQUIRED_RESPONSE_FIELDS.iter().all(|f| properties.contains_key(*f))
}

#[derive(Debug, Clone, Default)]
pub struct PromptValidator;

impl PromptValidator {
    pub fn new() -> Self {
        Self
    }

    pub fn validate_prompt_structure(&self, prompt: &GeneratedPrompt) -> PromptValidationResult {
        match serde_json::to_value(prompt) {
            Ok(value) => self.validate_prompt_value(&value),
            Err(e) => exception_result(e.to_string()),
        }
    }

    pub fn validate_prompt_value(&self, prompt: &Value) -> PromptValidationResult {
        if !prompt.is_object() {
            return exception_result("prompt is not a JSON object".to_string());
        }

        let mut errors = Vec::new();
        let mut warnings = Vec::new();

        for (field, kind) in TOP_LEVEL_FIELDS {
            match present(Some(prompt), field) {
                None => errors.push(ValidationIssue::for_field(
                    "MISSING_FIELD",
                    field,
                    format!("Required field {} is missing", field),
                )),
                Some(value) if !kind.matches(value) => errors.push(ValidationIssue::for_field(
                    "INVALID_FIELD_TYPE",
                    field,
                    format!("Field {} must be a {}", field, kind.name()),
                )),
                Some(_) => {}
            }
        }

        if prompt
            .get("promptId")
            .and_then(Value::as_str)
            .map(|id| id.trim().is_empty())
            .unwrap_or(false)
        {
            errors.push(ValidationIssue::for_field(
                "EMPTY_PROMPT_ID",
                "promptId",
                "Prompt id must not be empty",
            ));
        }

        let content = present(Some(prompt), "content");
        if content.is_some() {
            for section in MANDATORY_SECTIONS {
                if present(content, section).is_none() {
                    errors.push(ValidationIssue::for_field(
                        "MISSING_SECTION",
                        section,
                        format!("Mandatory content section {} is missing", section),
                    ));
                }
            }

            if let Some(message) = present(content, "systemMessage").and_then(Value::as_str) {
                if message.trim().is_empty() {
                    warnings.push(ValidationIssue::for_field(
                        "EMPTY_SYSTEM_MESSAGE",
                        "systemMessage",
                        "System message is empty",
                    ));
                }
            }

            if is_investigation_type(prompt) {
                for section in ["investigationSection", "workingMemorySection"] {
                    if present(content, section).is_none() {
                        warnings.push(ValidationIssue::for_field(
                            "MISSING_EXPECTED_SECTION",
                            section,
                            format!("Investigation prompt has no {}", section),
                        ));
                    }
                }
            }
        }

        let assessment = self.assess_prompt_value(prompt);

        PromptValidationResult {
            is_valid: errors.is_empty(),
            errors,
            warnings,
            quality_score: assessment.overall_score,
            suggestions: assessment.suggestions,
        }
    }

    pub fn assess_prompt_quality(&self, prompt: &GeneratedPrompt) -> QualityAssessment {
        match serde_json::to_value(prompt) {
            Ok(value) => self.assess_prompt_value(&value),
            Err(e) => QualityAssessment::zeroed(format!("Prompt could not be assessed: {}", e)),
        }
    }

    pub fn assess_prompt_value(&self, prompt: &Value) -> QualityAssessment {
        let content = present(Some(prompt), "content");
        let investigation = is_investigation_type(prompt);

        let clarity = round_score(clarity_score(content));
        let completeness = round_score(completeness_score(content, investigation));
        let context_relevance = round_score(context_relevance_score(content, investigation));
        let schema_alignment = round_score(schema_alignment_score(prompt, content));
        let overall_score =
            round_score((clarity + completeness + context_relevance + schema_alignment) / 4.0);

        let mut suggestions = Vec::new();
        if clarity < CLARITY_THRESHOLD {
            suggestions.push(
                "Improve clarity: provide a fuller system message and well-formed instruction and schema sections"
                    .to_string(),
            );
        }
        if completeness < COMPLETENESS_THRESHOLD {
            suggestions.push("Add the missing prompt sections".to_string());
        }
        if context_relevance < CONTEXT_RELEVANCE_THRESHOLD {
            suggestions.push(
                "Include current step, execution history and page state in the context".to_string(),
            );
        }
        if schema_alignment < 1.0 {
            suggestions.push(
                "Align the response schema: object type, decision/reasoning/commands, and examples"
                    .to_string(),
            );
        }
        if overall_score < OVERALL_QUALITY_THRESHOLD {
            suggestions.push(format!(
                "Overall quality {:.2} is below {:.2}",
                overall_score, OVERALL_QUALITY_THRESHOLD
            ));
        }

        QualityAssessment {
            clarity,
            completeness,
            context_relevance,
            schema_alignment,
            overall_score,
            suggestions,
        }
    }
}

fn exception_result(message: String) -> PromptValidationResult {
    tracing::warn!("Prompt validation failed unexpectedly: {}", message);
    PromptValidationResult {
        is_valid: false,
        errors: vec![ValidationIssue::new(
            "VALIDATION_EXCEPTION",
            format!("Validation failed: {}", message),
        )],
        warnings: Vec::new(),
        quality_score: 0.0,
        suggestions: Vec::new(),
    }
}

fn clarity_score(content: Option<&Value>) -> f64 {
    let mut score: f64 = 1.0;

    let message_len = present(content, "systemMessage")
        .and_then(Value::as_str)
        .map(|m| m.chars().count());
    if message_len.map(|n| n < MIN_SYSTEM_MESSAGE_CHARS).unwrap_or(true) {
        score -= 0.2;
    }

    let instructions_ok = present(content, "instructionSection")
        .and_then(|s| s.get("mainInstruction"))
        .and_then(Value::as_str)
        .is_some();
    if !instructions_ok {
        score -= 0.3;
    }

    let schema_ok = present(content, "schemaSection")
        .and_then(|s| s.get("schema"))
        .map(Value::is_object)
        .unwrap_or(false);
    if !schema_ok {
        score -= 0.2;
    }

    score.max(0.0)
}

fn completeness_score(content: Option<&Value>, investigation: bool) -> f64 {
    let missing = MANDATORY_SECTIONS
        .iter()
        .filter(|s| present(content, s).is_none())
        .count();
    let mut score = 1.0 - 0.25 * missing as f64;

    if investigation {
        if present(content, "investigationSection").is_none() {
            score -= 0.2;
        }
        if present(content, "workingMemorySection").is_none() {
            score -= 0.1;
        }
    }

    score.max(0.0)
}

fn context_relevance_score(content: Option<&Value>, investigation: bool) -> f64 {
    let Some(context) = present(content, "contextSection") else {
        return 0.3;
    };

    let mut score = 1.0;
    for key in ["currentStep", "executionHistory", "pageStates"] {
        if present(Some(context), key).is_none() {
            score -= 0.2;
        }
    }

    if investigation {
        if present(Some(context), "investigationHistory").is_none() {
            score -= 0.2;
        }
        if present(Some(context), "filteredContext").is_none() {
            score -= 0.1;
        }
    }

    f64::max(score, 0.0)
}

fn schema_alignment_score(prompt: &Value, content: Option<&Value>) -> f64 {
    let schema = present(Some(prompt), "schema")
        .or_else(|| present(content, "schemaSection").and_then(|s| s.get("schema")));

    let Some(schema) = schema.filter(|s| validate_schema_integration(s)) else {
        return 0.2;
    };

    let mut score = 1.0;

    let has_examples = present(content, "examplesSection")
        .and_then(|s| s.get("examples"))
        .and_then(Value::as_array)
        .map(|e| !e.is_empty())
        .unwrap_or(false);
    if !has_examples {
        score -= 0.2;
    }

    let required = schema
        .get("required")
        .and_then(Value::as_array)
        .map(Vec::len)
        .unwrap_or(0);
    if required < 3 {
        score -= 0.1;
    }

    f64::max(score, 0.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn schema() -> Value {
        json!({
            "type": "object",
            "properties": {
                "decision": {"type": "object"},
                "reasoning": {"type": "object"},
                "commands": {"type": "array"}
            },
            "required": ["decision", "reasoning", "commands"]
        })
    }

    fn prompt(prompt_type: &str) -> Value {
        json!({
            "promptId": "prompt_1_abcdef01",
            "sessionId": "s1",
            "stepIndex": 0,
            "promptType": prompt_type,
            "generatedAt": "2026-01-01T00:00:00Z",
            "schema": schema(),
            "content": {
                "systemMessage": "You are a browser automation agent. Complete the current step carefully.",
                "contextSection": {
                    "currentStep": {"index": 0, "content": "Open the page", "type": "action", "totalSteps": 2},
                    "executionHistory": {"previousSteps": [], "successCount": 0, "failureCount": 0},
                    "pageStates": {}
                },
                "instructionSection": {"mainInstruction": "Do the step", "stepGuidance": "", "decisionFramework": "", "actionGuidelines": []},
                "schemaSection": {"responseFormat": "json", "schema": schema(), "requiredFields": ["decision", "reasoning", "commands"]},
                "examplesSection": {"examples": [{"description": "d", "response": {}}]}
            }
        })
    }

    #[test]
    fn test_complete_prompt_is_valid_and_scores_full() {
        let validator = PromptValidator::new();
        let result = validator.validate_prompt_value(&prompt("INITIAL_ACTION"));
        assert!(result.is_valid, "{:?}", result.errors);
        assert!(result.warnings.is_empty());
        assert_eq!(result.quality_score, 1.0);
    }

    #[test]
    fn test_missing_instruction_section_is_invalid() {
        let validator = PromptValidator::new();
        let mut value = prompt("INITIAL_ACTION");
        value["content"]
            .as_object_mut()
            .unwrap()
            .remove("instructionSection");

        let result = validator.validate_prompt_value(&value);
        assert!(!result.is_valid);
        assert_eq!(result.errors[0].code, "MISSING_SECTION");
        assert_eq!(result.errors[0].field.as_deref(), Some("instructionSection"));

        let assessment = validator.assess_prompt_value(&value);
        assert!(assessment.completeness <= 0.75);
        assert_eq!(assessment.clarity, 0.7);
    }

    #[test]
    fn test_top_level_field_types() {
        let validator = PromptValidator::new();
        let mut value = prompt("INITIAL_ACTION");
        value["stepIndex"] = json!("zero");
        value.as_object_mut().unwrap().remove("generatedAt");

        let result = validator.validate_prompt_value(&value);
        let codes: Vec<&str> = result.errors.iter().map(|e| e.code.as_str()).collect();
        assert!(codes.contains(&"INVALID_FIELD_TYPE"));
        assert!(codes.contains(&"MISSING_FIELD"));
    }

    #[test]
    fn test_investigation_sections_only_warn() {
        let validator = PromptValidator::new();
        let value = prompt("INVESTIGATION_INITIAL_ASSESSMENT");
        let result = validator.validate_prompt_value(&value);

        assert!(result.is_valid);
        assert_eq!(result.warnings.len(), 2);

        let assessment = validator.assess_prompt_value(&value);
        assert_eq!(assessment.completeness, 0.7);
        assert_eq!(assessment.context_relevance, 0.7);
    }

    #[test]
    fn test_context_section_absent_scores_flat() {
        let validator = PromptValidator::new();
        let mut value = prompt("INITIAL_ACTION");
        value["content"]
            .as_object_mut()
            .unwrap()
            .remove("contextSection");
        assert_eq!(validator.assess_prompt_value(&value).context_relevance, 0.3);
    }

    #[test]
    fn test_schema_alignment_rules() {
        let validator = PromptValidator::new();

        let mut broken = prompt("INITIAL_ACTION");
        broken["schema"] = json!({"type": "object", "properties": {"decision": {}}});
        assert_eq!(validator.assess_prompt_value(&broken).schema_alignment, 0.2);

        let mut no_examples = prompt("INITIAL_ACTION");
        no_examples["content"]
            .as_object_mut()
            .unwrap()
            .remove("examplesSection");
        no_examples["schema"]["required"] = json!(["decision"]);
        assert_eq!(validator.assess_prompt_value(&no_examples).schema_alignment, 0.7);
    }

    #[test]
    fn test_non_object_yields_exception_issue() {
        let result = PromptValidator::new().validate_prompt_value(&json!("not a prompt"));
        assert!(!result.is_valid);
        assert_eq!(result.errors.len(), 1);
        assert_eq!(result.errors[0].code, "VALIDATION_EXCEPTION");
        assert_eq!(result.quality_score, 0.0);
    }

    #[test]
    fn test_schema_integration() {
        assert!(validate_schema_integration(&schema()));
        assert!(!validate_schema_integration(&json!({"type": "array"})));
        assert!(!validate_schema_integration(&json!({
            "type": "object",
            "properties": {"decision": {}, "reasoning": {}}
        })));
    }
}
