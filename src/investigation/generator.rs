//! Investigation guidance for the three investigation phases.
//!
//! Everything here is a pure function of the phase, the investigation
//! config and the caller's available tools. The generator never decides
//! which phase comes next.

use super::tools::describe_tools;
use crate::config::InvestigationConfig;
use crate::error::{PromptError, Result};
use crate::models::{
    ContextManagementGuidance, InvestigationContext, InvestigationPhase, InvestigationSection,
    InvestigationStrategy, InvestigationTool, PhaseGuidance,
};

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

/// Optional inputs carried into the section from earlier rounds
#[derive(Debug, Clone, Default)]
pub struct InvestigationInputs {
    pub previous_context: Option<String>,
    pub elements_discovered: Option<usize>,
}

#[derive(Debug, Clone, Default)]
pub struct InvestigationGenerator;

impl InvestigationGenerator {
    pub fn new() -> Self {
        Self
    }

    /// Tools that suit the phase best, most useful first
    pub fn preferred_tools(&self, phase: InvestigationPhase) -> &'static [InvestigationTool] {
        use InvestigationTool::*;
        match phase {
            InvestigationPhase::InitialAssessment => &[ScreenshotAnalysis, TextExtraction],
            InvestigationPhase::FocusedExploration => &[SubDomExtraction, TextExtraction],
            InvestigationPhase::SelectorDetermination => &[SubDomExtraction, FullDomRetrieval],
        }
    }

    /// Phase-preferred tools, then the configured order, without repeats.
    /// Only enabled tools, and only the caller's tools when it names any.
    pub fn tool_priority(
        &self,
        phase: InvestigationPhase,
        config: &InvestigationConfig,
        available: &[InvestigationTool],
    ) -> Result<Vec<InvestigationTool>> {
        let mut ordered: Vec<InvestigationTool> = Vec::new();
        for tool in self
            .preferred_tools(phase)
            .iter()
            .chain(config.tool_priority_order.iter())
        {
            if ordered.contains(tool) || !config.is_tool_enabled(*tool) {
                continue;
            }
            if !available.is_empty() && !available.contains(tool) {
                continue;
            }
            ordered.push(*tool);
        }

        if ordered.is_empty() {
            return Err(PromptError::strategy_generation_failed(format!(
                "No investigation tools are both enabled and available for phase {}",
                phase
            )));
        }
        Ok(ordered)
    }

    pub fn strategy(
        &self,
        phase: InvestigationPhase,
        priority: &[InvestigationTool],
    ) -> Result<InvestigationStrategy> {
        let (primary, fallbacks) = priority.split_first().ok_or_else(|| {
            PromptError::strategy_generation_failed(format!(
                "Cannot build an investigation strategy for phase {} without tools",
                phase
            ))
        })?;

        let focus = match phase {
            InvestigationPhase::InitialAssessment => {
                "get an overview of the page before narrowing down"
            }
            InvestigationPhase::FocusedExploration => {
                "examine the region of the page that matters for this step"
            }
            InvestigationPhase::SelectorDetermination => {
                "confirm a reliable selector for the element the step acts on"
            }
        };

        let reasoning = if fallbacks.is_empty() {
            format!("Start with {} to {}.", primary, focus)
        } else {
            let fallback_names: Vec<&str> = fallbacks.iter().map(|t| t.as_str()).collect();
            format!(
                "Start with {} to {}. If it does not give a clear answer, fall back to {}.",
                primary,
                focus,
                fallback_names.join(", then ")
            )
        };

        Ok(InvestigationStrategy {
            primary: *primary,
            fallbacks: fallbacks.to_vec(),
            reasoning,
        })
    }

    pub fn phase_guidance(&self, phase: InvestigationPhase) -> PhaseGuidance {
        let (objectives, pitfalls) = match phase {
            InvestigationPhase::InitialAssessment => (
                strings(&[
                    "Identify what kind of page is loaded and whether it matches the step",
                    "Spot blocking elements such as modals, cookie banners or login walls",
                    "Locate the general area where the step's target should be",
                ]),
                strings(&[
                    "Pulling the full DOM before knowing where to look",
                    "Acting on the page during assessment",
                ]),
            ),
            InvestigationPhase::FocusedExploration => (
                strings(&[
                    "Inspect the page region that contains the step's target",
                    "List candidate elements with their visible text and attributes",
                    "Note dynamic content that may change between reads",
                ]),
                strings(&[
                    "Exploring regions unrelated to the current step",
                    "Trusting generated class names as stable identifiers",
                ]),
            ),
            InvestigationPhase::SelectorDetermination => (
                strings(&[
                    "Choose one selector that uniquely matches the target element",
                    "Prefer ids, data attributes, labels and roles over positional selectors",
                    "Estimate how reliable the chosen selector is",
                ]),
                strings(&[
                    "Selectors that match more than one element",
                    "Index-based selectors such as :nth-child when a stable attribute exists",
                ]),
            ),
        };

        PhaseGuidance {
            objectives,
            recommended_tools: self.preferred_tools(phase).to_vec(),
            pitfalls,
        }
    }

    pub fn investigation_questions(&self, phase: InvestigationPhase) -> Vec<String> {
        match phase {
            InvestigationPhase::InitialAssessment => strings(&[
                "Is the page fully loaded and the one the step expects?",
                "Is anything covering the content the step needs?",
                "Which part of the page is relevant to the step?",
            ]),
            InvestigationPhase::FocusedExploration => strings(&[
                "Which elements could be the step's target?",
                "What text, labels and attributes distinguish them?",
                "Does the target need scrolling or expanding to become reachable?",
            ]),
            InvestigationPhase::SelectorDetermination => strings(&[
                "Which selector matches exactly one element?",
                "Will the selector survive a page reload?",
                "How confident are you that it is the right element?",
            ]),
        }
    }

    pub fn expected_outputs(&self, phase: InvestigationPhase) -> Vec<String> {
        match phase {
            InvestigationPhase::InitialAssessment => strings(&[
                "Page summary",
                "Blocking elements, if any",
                "Region to explore next",
            ]),
            InvestigationPhase::FocusedExploration => strings(&[
                "Candidate elements with descriptions",
                "Distinguishing attributes for each candidate",
            ]),
            InvestigationPhase::SelectorDetermination => strings(&[
                "Final selector",
                "Element type",
                "Confidence between 0 and 1",
            ]),
        }
    }

    pub fn context_management(&self) -> ContextManagementGuidance {
        ContextManagementGuidance {
            overflow_prevention: strings(&[
                "Prefer targeted extraction over full DOM retrieval",
                "Limit extracted text to what the step needs",
            ]),
            summarization_rules: strings(&[
                "Summarize each tool result in one or two sentences",
                "Keep selectors and exact labels verbatim, summarize the rest",
            ]),
            element_bookkeeping: strings(&[
                "Record every confirmed selector with its element type",
                "Mark selectors that failed so they are not retried",
            ]),
        }
    }

    pub fn build_investigation_section(
        &self,
        phase: InvestigationPhase,
        config: &InvestigationConfig,
        available: &[InvestigationTool],
        inputs: InvestigationInputs,
    ) -> Result<InvestigationSection> {
        let priority = self.tool_priority(phase, config, available)?;
        let strategy = self.strategy(phase, &priority)?;

        tracing::debug!(
            "Investigation phase {} uses tools [{}]",
            phase,
            priority
                .iter()
                .map(|t| t.as_str())
                .collect::<Vec<_>>()
                .join(", ")
        );

        Ok(InvestigationSection {
            phase,
            available_tools: describe_tools(&priority),
            strategy,
            phase_guidance: self.phase_guidance(phase),
            investigation_questions: self.investigation_questions(phase),
            expected_outputs: self.expected_outputs(phase),
            context_management: self.context_management(),
            previous_context: inputs.previous_context,
            elements_discovered: inputs.elements_discovered,
        })
    }

    /// Readable digest of a completed investigation
    pub fn build_investigation_summary(&self, context: &InvestigationContext) -> String {
        let mut lines = Vec::new();

        if !context.phases_completed.is_empty() {
            let phases: Vec<&str> = context
                .phases_completed
                .iter()
                .map(|p| p.display_name())
                .collect();
            lines.push(format!("Phases completed: {}", phases.join(", ")));
        }

        for (i, finding) in context.findings.iter().enumerate() {
            let mut line = format!("{}. [{}] {}", i + 1, finding.tool, finding.summary);
            if let Some(selector) = &finding.selector {
                line.push_str(&format!(" (selector: {})", selector));
            }
            if let Some(confidence) = finding.confidence {
                line.push_str(&format!(" confidence {:.2}", confidence));
            }
            lines.push(line);
        }

        if let Some(action) = context
            .recommended_action
            .as_deref()
            .filter(|a| !a.trim().is_empty())
        {
            lines.push(format!("Recommended action: {}", action));
        }

        if let Some(confidence) = context.confidence {
            lines.push(format!("Overall confidence: {:.2}", confidence));
        }

        lines.join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PromptErrorKind;
    use crate::models::InvestigationFinding;

    #[test]
    fn test_priority_puts_phase_tools_first() {
        let generator = InvestigationGenerator::new();
        let config = InvestigationConfig::default();

        let priority = generator
            .tool_priority(InvestigationPhase::SelectorDetermination, &config, &[])
            .unwrap();
        assert_eq!(
            priority,
            vec![
                InvestigationTool::SubDomExtraction,
                InvestigationTool::FullDomRetrieval,
                InvestigationTool::ScreenshotAnalysis,
                InvestigationTool::TextExtraction,
            ]
        );
    }

    #[test]
    fn test_priority_respects_enabled_and_available() {
        let generator = InvestigationGenerator::new();
        let mut config = InvestigationConfig::default();
        config.enabled_investigation_tools = vec![
            InvestigationTool::TextExtraction,
            InvestigationTool::FullDomRetrieval,
        ];

        let priority = generator
            .tool_priority(
                InvestigationPhase::InitialAssessment,
                &config,
                &[InvestigationTool::FullDomRetrieval, InvestigationTool::ScreenshotAnalysis],
            )
            .unwrap();
        assert_eq!(priority, vec![InvestigationTool::FullDomRetrieval]);
    }

    #[test]
    fn test_no_usable_tools_fails() {
        let generator = InvestigationGenerator::new();
        let mut config = InvestigationConfig::default();
        config.enabled_investigation_tools.clear();

        let err = generator
            .tool_priority(InvestigationPhase::FocusedExploration, &config, &[])
            .unwrap_err();
        assert_eq!(err.kind(), PromptErrorKind::InvestigationStrategyGenerationFailed);
    }

    #[test]
    fn test_strategy_primary_and_fallbacks() {
        let generator = InvestigationGenerator::new();
        let strategy = generator
            .strategy(
                InvestigationPhase::InitialAssessment,
                &[InvestigationTool::ScreenshotAnalysis, InvestigationTool::TextExtraction],
            )
            .unwrap();
        assert_eq!(strategy.primary, InvestigationTool::ScreenshotAnalysis);
        assert_eq!(strategy.fallbacks, vec![InvestigationTool::TextExtraction]);
        assert!(strategy.reasoning.contains("text_extraction"));
    }

    #[test]
    fn test_section_carries_inputs() {
        let generator = InvestigationGenerator::new();
        let section = generator
            .build_investigation_section(
                InvestigationPhase::FocusedExploration,
                &InvestigationConfig::default(),
                &[],
                InvestigationInputs {
                    previous_context: Some("Login form found in the header".to_string()),
                    elements_discovered: Some(3),
                },
            )
            .unwrap();

        assert_eq!(section.available_tools[0].priority, 1);
        assert_eq!(section.available_tools.len(), 4);
        assert_eq!(section.elements_discovered, Some(3));
        assert!(!section.investigation_questions.is_empty());
        assert!(!section.context_management.overflow_prevention.is_empty());
    }

    #[test]
    fn test_summary_lists_findings() {
        let generator = InvestigationGenerator::new();
        let context = InvestigationContext {
            findings: vec![InvestigationFinding {
                tool: InvestigationTool::SubDomExtraction,
                summary: "Submit button inside the login form".to_string(),
                selector: Some("form#login button[type=submit]".to_string()),
                confidence: Some(0.9),
            }],
            recommended_action: Some("Click the submit button".to_string()),
            confidence: Some(0.85),
            phases_completed: vec![InvestigationPhase::InitialAssessment],
        };

        let summary = generator.build_investigation_summary(&context);
        assert!(summary.contains("Phases completed: Initial Assessment"));
        assert!(summary.contains("1. [sub_dom_extraction] Submit button"));
        assert!(summary.contains("selector: form#login button[type=submit]"));
        assert!(summary.contains("Recommended action: Click the submit button"));
    }
}
