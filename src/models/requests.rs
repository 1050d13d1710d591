use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::context::FilteringLevel;
use super::investigation::{InvestigationContext, InvestigationPhase, InvestigationTool};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReasoningDepth {
    Basic,
    #[default]
    Detailed,
    Comprehensive,
}

/// Per-request switches for prompt generation
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PromptOptions {
    pub include_execution_history: bool,
    pub include_page_state: bool,
    /// Include the DOM from the previous step for comparison
    pub include_previous_dom: bool,
    /// Overrides the configured filtered context switch when set
    pub use_filtered_context: Option<bool>,
    pub filtering_level: Option<FilteringLevel>,
    pub include_working_memory: bool,
    pub include_investigation_history: bool,
    pub include_validation: bool,
    pub reasoning_depth: ReasoningDepth,
    pub use_cache: bool,
    pub max_history_steps: Option<usize>,
    pub template_id: Option<String>,
    pub custom_instructions: Option<String>,
    /// Response schema to use instead of the schema store's
    pub response_schema_override: Option<Value>,
}

impl Default for PromptOptions {
    fn default() -> Self {
        Self {
            include_execution_history: true,
            include_page_state: true,
            include_previous_dom: false,
            use_filtered_context: None,
            filtering_level: None,
            include_working_memory: true,
            include_investigation_history: false,
            include_validation: false,
            reasoning_depth: ReasoningDepth::default(),
            use_cache: true,
            max_history_steps: None,
            template_id: None,
            custom_instructions: None,
            response_schema_override: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionPromptRequest {
    pub session_id: String,
    pub step_index: usize,
    pub step_content: String,
    pub total_steps: usize,
    #[serde(default)]
    pub options: PromptOptions,
}

impl ActionPromptRequest {
    pub fn new(
        session_id: impl Into<String>,
        step_index: usize,
        step_content: impl Into<String>,
        total_steps: usize,
    ) -> Self {
        Self {
            session_id: session_id.into(),
            step_index,
            step_content: step_content.into(),
            total_steps,
            options: PromptOptions::default(),
        }
    }

    pub fn with_options(mut self, options: PromptOptions) -> Self {
        self.options = options;
        self
    }
}

/// Request to reflect on a completed step before executing the next one
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReflectionPromptRequest {
    pub session_id: String,
    pub completed_step_index: usize,
    pub next_step_index: usize,
    pub next_step_content: String,
    pub total_steps: usize,
    #[serde(default)]
    pub expected_outcome: Option<String>,
    #[serde(default)]
    pub options: PromptOptions,
}

impl ReflectionPromptRequest {
    pub fn new(
        session_id: impl Into<String>,
        completed_step_index: usize,
        next_step_content: impl Into<String>,
        total_steps: usize,
    ) -> Self {
        Self {
            session_id: session_id.into(),
            completed_step_index,
            next_step_index: completed_step_index + 1,
            next_step_content: next_step_content.into(),
            total_steps,
            expected_outcome: None,
            options: PromptOptions::default(),
        }
    }

    pub fn with_expected_outcome(mut self, outcome: impl Into<String>) -> Self {
        self.expected_outcome = Some(outcome.into());
        self
    }

    pub fn with_options(mut self, options: PromptOptions) -> Self {
        self.options = options;
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InvestigationPromptRequest {
    pub session_id: String,
    pub step_index: usize,
    pub step_content: String,
    pub total_steps: usize,
    pub phase: InvestigationPhase,
    /// Tools the caller can run; empty means every enabled tool
    #[serde(default)]
    pub available_tools: Vec<InvestigationTool>,
    #[serde(default)]
    pub options: PromptOptions,
}

impl InvestigationPromptRequest {
    pub fn new(
        session_id: impl Into<String>,
        step_index: usize,
        step_content: impl Into<String>,
        total_steps: usize,
        phase: InvestigationPhase,
    ) -> Self {
        Self {
            session_id: session_id.into(),
            step_index,
            step_content: step_content.into(),
            total_steps,
            phase,
            available_tools: Vec::new(),
            options: PromptOptions::default(),
        }
    }

    pub fn with_tools(mut self, tools: Vec<InvestigationTool>) -> Self {
        self.available_tools = tools;
        self
    }

    pub fn with_options(mut self, options: PromptOptions) -> Self {
        self.options = options;
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionWithInvestigationRequest {
    pub session_id: String,
    pub step_index: usize,
    pub step_content: String,
    pub total_steps: usize,
    pub investigation_context: InvestigationContext,
    #[serde(default)]
    pub options: PromptOptions,
}

impl ActionWithInvestigationRequest {
    pub fn new(
        session_id: impl Into<String>,
        step_index: usize,
        step_content: impl Into<String>,
        total_steps: usize,
        investigation_context: InvestigationContext,
    ) -> Self {
        Self {
            session_id: session_id.into(),
            step_index,
            step_content: step_content.into(),
            total_steps,
            investigation_context,
            options: PromptOptions::default(),
        }
    }

    pub fn with_options(mut self, options: PromptOptions) -> Self {
        self.options = options;
        self
    }
}
