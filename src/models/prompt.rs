use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

use super::context::ContextSection;
use super::investigation::{InvestigationPhase, InvestigationSection};
use super::memory::WorkingMemorySection;
use super::sections::{ExamplesSection, InstructionSection, SchemaSection, ValidationSection};

/// The kind of prompt produced for a workflow step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PromptType {
    InitialAction,
    ActionWithValidation,
    ReflectionAndValidation,
    InvestigationInitialAssessment,
    InvestigationFocusedExploration,
    InvestigationSelectorDetermination,
    ActionWithInvestigation,
}

impl PromptType {
    pub fn as_str(&self) -> &'static str {
        match self {
            PromptType::InitialAction => "INITIAL_ACTION",
            PromptType::ActionWithValidation => "ACTION_WITH_VALIDATION",
            PromptType::ReflectionAndValidation => "REFLECTION_AND_VALIDATION",
            PromptType::InvestigationInitialAssessment => "INVESTIGATION_INITIAL_ASSESSMENT",
            PromptType::InvestigationFocusedExploration => "INVESTIGATION_FOCUSED_EXPLORATION",
            PromptType::InvestigationSelectorDetermination => {
                "INVESTIGATION_SELECTOR_DETERMINATION"
            }
            PromptType::ActionWithInvestigation => "ACTION_WITH_INVESTIGATION",
        }
    }

    /// Phase-specific investigation prompts. These are expected to carry an
    /// investigation section and a working memory section.
    pub fn is_investigation(&self) -> bool {
        matches!(
            self,
            PromptType::InvestigationInitialAssessment
                | PromptType::InvestigationFocusedExploration
                | PromptType::InvestigationSelectorDetermination
        )
    }

    pub fn for_phase(phase: InvestigationPhase) -> Self {
        match phase {
            InvestigationPhase::InitialAssessment => PromptType::InvestigationInitialAssessment,
            InvestigationPhase::FocusedExploration => PromptType::InvestigationFocusedExploration,
            InvestigationPhase::SelectorDetermination => {
                PromptType::InvestigationSelectorDetermination
            }
        }
    }

    /// Template used when the caller does not name one
    pub fn default_template_id(&self) -> &'static str {
        match self {
            PromptType::InitialAction => "initial_action",
            PromptType::ActionWithValidation => "action_with_validation",
            PromptType::ReflectionAndValidation => "reflection_and_validation",
            PromptType::InvestigationInitialAssessment
            | PromptType::InvestigationFocusedExploration
            | PromptType::InvestigationSelectorDetermination => "investigation_phase",
            PromptType::ActionWithInvestigation => "action_with_investigation",
        }
    }
}

impl fmt::Display for PromptType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PromptType {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "INITIAL_ACTION" => Ok(PromptType::InitialAction),
            "ACTION_WITH_VALIDATION" => Ok(PromptType::ActionWithValidation),
            "REFLECTION_AND_VALIDATION" => Ok(PromptType::ReflectionAndValidation),
            "INVESTIGATION_INITIAL_ASSESSMENT" => Ok(PromptType::InvestigationInitialAssessment),
            "INVESTIGATION_FOCUSED_EXPLORATION" => Ok(PromptType::InvestigationFocusedExploration),
            "INVESTIGATION_SELECTOR_DETERMINATION" => {
                Ok(PromptType::InvestigationSelectorDetermination)
            }
            "ACTION_WITH_INVESTIGATION" => Ok(PromptType::ActionWithInvestigation),
            _ => Err(anyhow::anyhow!("Unknown prompt type: {}", s)),
        }
    }
}

/// Where the response schema of a prompt came from
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SchemaSource {
    Store,
    #[default]
    Fallback,
    Override,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PromptMetadata {
    pub template_id: String,
    pub template_version: String,
    #[serde(default)]
    pub generation_time_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema_version: Option<String>,
    #[serde(default)]
    pub schema_source: SchemaSource,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quality_score: Option<f64>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PromptContent {
    pub system_message: String,
    pub context_section: ContextSection,
    pub instruction_section: InstructionSection,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub validation_section: Option<ValidationSection>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub investigation_section: Option<InvestigationSection>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub working_memory_section: Option<WorkingMemorySection>,
    pub schema_section: SchemaSection,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub examples_section: Option<ExamplesSection>,
}

/// A fully assembled prompt for one workflow step. Never mutated after
/// generation; the cache hands out clones.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeneratedPrompt {
    pub prompt_id: String,
    pub session_id: String,
    pub step_index: usize,
    pub prompt_type: PromptType,
    pub content: PromptContent,
    pub schema: Value,
    pub generated_at: DateTime<Utc>,
    #[serde(default)]
    pub metadata: PromptMetadata,
}

/// Opaque prompt id: generation time plus a random suffix
pub fn new_prompt_id() -> String {
    let suffix = uuid::Uuid::new_v4().simple().to_string();
    format!("prompt_{}_{}", Utc::now().timestamp_millis(), &suffix[..8])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prompt_type_round_trip_str() {
        for ty in [
            PromptType::InitialAction,
            PromptType::ActionWithValidation,
            PromptType::ReflectionAndValidation,
            PromptType::InvestigationInitialAssessment,
            PromptType::InvestigationFocusedExploration,
            PromptType::InvestigationSelectorDetermination,
            PromptType::ActionWithInvestigation,
        ] {
            assert_eq!(ty.as_str().parse::<PromptType>().unwrap(), ty);
            assert_eq!(
                serde_json::to_value(ty).unwrap(),
                serde_json::Value::String(ty.as_str().to_string())
            );
        }
    }

    #[test]
    fn test_investigation_types() {
        assert!(PromptType::InvestigationFocusedExploration.is_investigation());
        assert!(!PromptType::ActionWithInvestigation.is_investigation());
        assert_eq!(
            PromptType::for_phase(InvestigationPhase::SelectorDetermination),
            PromptType::InvestigationSelectorDetermination
        );
    }

    #[test]
    fn test_prompt_id_shape() {
        let id = new_prompt_id();
        assert!(id.starts_with("prompt_"));
        assert_ne!(id, new_prompt_id());
    }
}
