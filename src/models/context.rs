use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

use super::investigation::{InvestigationContext, InvestigationPhase, InvestigationTool};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepKind {
    #[default]
    Action,
    Reflection,
    Investigation,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CurrentStep {
    pub index: usize,
    pub content: String,
    #[serde(rename = "type")]
    pub kind: StepKind,
    pub total_steps: usize,
}

/// A command the agent issued while executing a step
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandRecord {
    pub action: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selector: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<String>,
    #[serde(default)]
    pub success: bool,
}

impl CommandRecord {
    pub fn new(action: impl Into<String>, success: bool) -> Self {
        Self {
            action: action.into(),
            selector: None,
            value: None,
            result: None,
            success,
        }
    }

    pub fn with_selector(mut self, selector: impl Into<String>) -> Self {
        self.selector = Some(selector.into());
        self
    }

    pub fn with_result(mut self, result: impl Into<String>) -> Self {
        self.result = Some(result.into());
        self
    }
}

/// One executed attempt of a workflow step, as kept by the context store
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepRecord {
    pub step_index: usize,
    pub content: String,
    pub success: bool,
    #[serde(default = "default_attempt")]
    pub attempt: u32,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub commands: Vec<CommandRecord>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasoning: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub executed_at: Option<DateTime<Utc>>,
}

fn default_attempt() -> u32 {
    1
}

impl StepRecord {
    pub fn new(step_index: usize, content: impl Into<String>, success: bool) -> Self {
        Self {
            step_index,
            content: content.into(),
            success,
            attempt: 1,
            commands: Vec::new(),
            reasoning: None,
            error: None,
            executed_at: Some(Utc::now()),
        }
    }

    pub fn with_attempt(mut self, attempt: u32) -> Self {
        self.attempt = attempt;
        self
    }

    pub fn with_command(mut self, command: CommandRecord) -> Self {
        self.commands.push(command);
        self
    }

    pub fn with_reasoning(mut self, reasoning: impl Into<String>) -> Self {
        self.reasoning = Some(reasoning.into());
        self
    }

    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionHistory {
    pub previous_steps: Vec<StepRecord>,
    pub success_count: usize,
    pub failure_count: usize,
    /// Length-bounded text rendering of the history
    #[serde(default)]
    pub digest: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageStates {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_dom: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous_dom: Option<String>,
    /// Why a DOM snapshot was left out, one note per omitted snapshot
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub omissions: Vec<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FilteringLevel {
    Minimal,
    #[default]
    Standard,
    Detailed,
}

impl FilteringLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            FilteringLevel::Minimal => "minimal",
            FilteringLevel::Standard => "standard",
            FilteringLevel::Detailed => "detailed",
        }
    }
}

impl FromStr for FilteringLevel {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "minimal" => Ok(FilteringLevel::Minimal),
            "standard" => Ok(FilteringLevel::Standard),
            "detailed" => Ok(FilteringLevel::Detailed),
            _ => Err(()),
        }
    }
}

/// Options forwarded to the store when asking for a filtered context
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FilteredContextOptions {
    pub level: FilteringLevel,
    pub max_size: usize,
    pub max_history_steps: usize,
    pub include_page_insights: bool,
}

/// Summarized, size-bounded view of history and page insight
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FilteredContext {
    pub level: FilteringLevel,
    pub summary: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub relevant_elements: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub key_insights: Vec<String>,
}

impl FilteredContext {
    /// Approximate rendered size in characters
    pub fn size(&self) -> usize {
        self.summary.chars().count()
            + self
                .relevant_elements
                .iter()
                .chain(self.key_insights.iter())
                .map(|s| s.chars().count())
                .sum::<usize>()
    }
}

/// A past investigation round for the session
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InvestigationRecord {
    pub step_index: usize,
    pub phase: InvestigationPhase,
    pub tool: InvestigationTool,
    pub summary: String,
    #[serde(default)]
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionMetadata {
    pub session_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub total_steps: usize,
    #[serde(default)]
    pub current_step_index: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
}

/// Context assembled for one prompt. Built fresh per request.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContextSection {
    pub current_step: CurrentStep,
    pub execution_history: ExecutionHistory,
    pub page_states: PageStates,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filtered_context: Option<FilteredContext>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub investigation_history: Option<Vec<InvestigationRecord>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_metadata: Option<SessionMetadata>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub investigation_context: Option<InvestigationContext>,
}

impl ContextSection {
    pub fn new(current_step: CurrentStep) -> Self {
        Self {
            current_step,
            execution_history: ExecutionHistory::default(),
            page_states: PageStates::default(),
            filtered_context: None,
            investigation_history: None,
            session_metadata: None,
            investigation_context: None,
        }
    }
}
