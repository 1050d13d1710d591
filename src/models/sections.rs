use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Decision the model reports for a step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DecisionAction {
    Proceed,
    Retry,
    Investigate,
    Abort,
}

impl DecisionAction {
    pub const ALL: [DecisionAction; 4] = [
        DecisionAction::Proceed,
        DecisionAction::Retry,
        DecisionAction::Abort,
        DecisionAction::Investigate,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            DecisionAction::Proceed => "PROCEED",
            DecisionAction::Retry => "RETRY",
            DecisionAction::Investigate => "INVESTIGATE",
            DecisionAction::Abort => "ABORT",
        }
    }
}

impl fmt::Display for DecisionAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstructionSection {
    pub main_instruction: String,
    pub step_guidance: String,
    pub decision_framework: String,
    pub action_guidelines: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub validation_requirements: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub investigation_guidance: Option<Vec<String>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationCriterion {
    pub name: String,
    pub description: String,
    pub weight: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DecisionRule {
    pub decision: DecisionAction,
    pub condition: String,
}

/// Rubric the model uses to judge the previous step
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationSection {
    pub session_id: String,
    pub last_step_index: usize,
    pub expected_outcome: String,
    pub validation_criteria: Vec<ValidationCriterion>,
    pub success_indicators: Vec<String>,
    pub failure_indicators: Vec<String>,
    pub decision_framework: Vec<DecisionRule>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SchemaSection {
    pub response_format: String,
    pub schema: Value,
    pub required_fields: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PromptExample {
    pub description: String,
    pub response: Value,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExamplesSection {
    pub examples: Vec<PromptExample>,
}
