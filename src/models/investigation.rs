use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

use crate::error::PromptError;

/// Stage of the investigation workflow. The engine never advances phases on
/// its own; the calling workflow owns the current phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InvestigationPhase {
    InitialAssessment,
    FocusedExploration,
    SelectorDetermination,
}

impl InvestigationPhase {
    pub const ALL: [InvestigationPhase; 3] = [
        InvestigationPhase::InitialAssessment,
        InvestigationPhase::FocusedExploration,
        InvestigationPhase::SelectorDetermination,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            InvestigationPhase::InitialAssessment => "INITIAL_ASSESSMENT",
            InvestigationPhase::FocusedExploration => "FOCUSED_EXPLORATION",
            InvestigationPhase::SelectorDetermination => "SELECTOR_DETERMINATION",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            InvestigationPhase::InitialAssessment => "Initial Assessment",
            InvestigationPhase::FocusedExploration => "Focused Exploration",
            InvestigationPhase::SelectorDetermination => "Selector Determination",
        }
    }

    /// The phase a workflow moves to after this one, if any
    pub fn next(&self) -> Option<InvestigationPhase> {
        match self {
            InvestigationPhase::InitialAssessment => Some(InvestigationPhase::FocusedExploration),
            InvestigationPhase::FocusedExploration => {
                Some(InvestigationPhase::SelectorDetermination)
            }
            InvestigationPhase::SelectorDetermination => None,
        }
    }
}

impl fmt::Display for InvestigationPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for InvestigationPhase {
    type Err = PromptError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "INITIAL_ASSESSMENT" => Ok(InvestigationPhase::InitialAssessment),
            "FOCUSED_EXPLORATION" => Ok(InvestigationPhase::FocusedExploration),
            "SELECTOR_DETERMINATION" => Ok(InvestigationPhase::SelectorDetermination),
            _ => Err(PromptError::investigation_phase_invalid(s)),
        }
    }
}

/// Page investigation tools the agent can call before acting
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvestigationTool {
    ScreenshotAnalysis,
    TextExtraction,
    FullDomRetrieval,
    SubDomExtraction,
}

impl InvestigationTool {
    pub const ALL: [InvestigationTool; 4] = [
        InvestigationTool::ScreenshotAnalysis,
        InvestigationTool::TextExtraction,
        InvestigationTool::FullDomRetrieval,
        InvestigationTool::SubDomExtraction,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            InvestigationTool::ScreenshotAnalysis => "screenshot_analysis",
            InvestigationTool::TextExtraction => "text_extraction",
            InvestigationTool::FullDomRetrieval => "full_dom_retrieval",
            InvestigationTool::SubDomExtraction => "sub_dom_extraction",
        }
    }
}

impl fmt::Display for InvestigationTool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for InvestigationTool {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "screenshot_analysis" => Ok(InvestigationTool::ScreenshotAnalysis),
            "text_extraction" => Ok(InvestigationTool::TextExtraction),
            "full_dom_retrieval" => Ok(InvestigationTool::FullDomRetrieval),
            "sub_dom_extraction" => Ok(InvestigationTool::SubDomExtraction),
            _ => Err(anyhow::anyhow!("Unknown investigation tool: {}", s)),
        }
    }
}

/// Tool description handed to the model inside an investigation prompt
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolDescriptor {
    pub name: InvestigationTool,
    pub description: String,
    pub parameters: Value,
    pub priority: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InvestigationStrategy {
    pub primary: InvestigationTool,
    pub fallbacks: Vec<InvestigationTool>,
    pub reasoning: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PhaseGuidance {
    pub objectives: Vec<String>,
    pub recommended_tools: Vec<InvestigationTool>,
    pub pitfalls: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContextManagementGuidance {
    pub overflow_prevention: Vec<String>,
    pub summarization_rules: Vec<String>,
    pub element_bookkeeping: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InvestigationSection {
    pub phase: InvestigationPhase,
    pub available_tools: Vec<ToolDescriptor>,
    pub strategy: InvestigationStrategy,
    pub phase_guidance: PhaseGuidance,
    #[serde(default)]
    pub investigation_questions: Vec<String>,
    #[serde(default)]
    pub expected_outputs: Vec<String>,
    pub context_management: ContextManagementGuidance,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous_context: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub elements_discovered: Option<usize>,
}

/// A single finding produced by an investigation tool
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InvestigationFinding {
    pub tool: InvestigationTool,
    pub summary: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selector: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
}

/// Results of a completed investigation, supplied by the caller when asking
/// for an action prompt informed by that investigation
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InvestigationContext {
    #[serde(default)]
    pub findings: Vec<InvestigationFinding>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recommended_action: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub phases_completed: Vec<InvestigationPhase>,
}

impl InvestigationContext {
    pub fn is_empty(&self) -> bool {
        self.findings.is_empty()
            && self
                .recommended_action
                .as_deref()
                .map(|a| a.trim().is_empty())
                .unwrap_or(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PromptErrorKind;

    #[test]
    fn test_phase_from_str() {
        assert_eq!(
            "FOCUSED_EXPLORATION".parse::<InvestigationPhase>().unwrap(),
            InvestigationPhase::FocusedExploration
        );
        let err = "DEEP_DIVE".parse::<InvestigationPhase>().unwrap_err();
        assert_eq!(err.kind(), PromptErrorKind::InvestigationPhaseInvalid);
    }

    #[test]
    fn test_phase_order() {
        assert_eq!(
            InvestigationPhase::InitialAssessment.next(),
            Some(InvestigationPhase::FocusedExploration)
        );
        assert_eq!(InvestigationPhase::SelectorDetermination.next(), None);
    }

    #[test]
    fn test_tool_from_str() {
        assert_eq!(
            "sub_dom_extraction".parse::<InvestigationTool>().unwrap(),
            InvestigationTool::SubDomExtraction
        );
        assert!("mouse_hover".parse::<InvestigationTool>().is_err());
    }

    #[test]
    fn test_empty_investigation_context() {
        let mut ctx = InvestigationContext::default();
        assert!(ctx.is_empty());
        ctx.recommended_action = Some("  ".to_string());
        assert!(ctx.is_empty());
        ctx.recommended_action = Some("Click the login button".to_string());
        assert!(!ctx.is_empty());
    }
}
