use serde::Serialize;
use std::fmt;
use thiserror::Error;

/// Category of a prompt generation failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PromptErrorKind {
    ValidationFailed,
    ContextUnavailable,
    ContextFilteringFailed,
    InvestigationContextUnavailable,
    InvestigationPhaseInvalid,
    InvestigationDisabled,
    InvestigationStrategyGenerationFailed,
    TemplateNotFound,
    TemplateRenderingFailed,
    TemplateInvalid,
    SchemaGenerationFailed,
    ConfigInvalid,
}

impl PromptErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            PromptErrorKind::ValidationFailed => "VALIDATION_FAILED",
            PromptErrorKind::ContextUnavailable => "CONTEXT_UNAVAILABLE",
            PromptErrorKind::ContextFilteringFailed => "CONTEXT_FILTERING_FAILED",
            PromptErrorKind::InvestigationContextUnavailable => {
                "INVESTIGATION_CONTEXT_UNAVAILABLE"
            }
            PromptErrorKind::InvestigationPhaseInvalid => "INVESTIGATION_PHASE_INVALID",
            PromptErrorKind::InvestigationDisabled => "INVESTIGATION_DISABLED",
            PromptErrorKind::InvestigationStrategyGenerationFailed => {
                "INVESTIGATION_STRATEGY_GENERATION_FAILED"
            }
            PromptErrorKind::TemplateNotFound => "TEMPLATE_NOT_FOUND",
            PromptErrorKind::TemplateRenderingFailed => "TEMPLATE_RENDERING_FAILED",
            PromptErrorKind::TemplateInvalid => "TEMPLATE_INVALID",
            PromptErrorKind::SchemaGenerationFailed => "SCHEMA_GENERATION_FAILED",
            PromptErrorKind::ConfigInvalid => "CONFIG_INVALID",
        }
    }
}

impl fmt::Display for PromptErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error raised by the prompt engine.
///
/// Carries the session and step it was raised for when those are known.
/// Lower-level store failures are kept as the `source`.
#[derive(Error, Debug)]
#[error("{message}")]
pub struct PromptError {
    kind: PromptErrorKind,
    message: String,
    session_id: Option<String>,
    step_index: Option<usize>,
    #[source]
    source: Option<anyhow::Error>,
}

impl PromptError {
    pub fn new(kind: PromptErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            session_id: None,
            step_index: None,
            source: None,
        }
    }

    pub fn validation_failed(message: impl Into<String>) -> Self {
        Self::new(PromptErrorKind::ValidationFailed, message)
    }

    pub fn context_unavailable(message: impl Into<String>) -> Self {
        Self::new(PromptErrorKind::ContextUnavailable, message)
    }

    pub fn context_filtering_failed(message: impl Into<String>) -> Self {
        Self::new(PromptErrorKind::ContextFilteringFailed, message)
    }

    pub fn investigation_context_unavailable(message: impl Into<String>) -> Self {
        Self::new(PromptErrorKind::InvestigationContextUnavailable, message)
    }

    pub fn investigation_phase_invalid(phase: &str) -> Self {
        Self::new(
            PromptErrorKind::InvestigationPhaseInvalid,
            format!("Invalid investigation phase: {}", phase),
        )
    }

    pub fn investigation_disabled() -> Self {
        Self::new(
            PromptErrorKind::InvestigationDisabled,
            "Investigation prompts are disabled in configuration",
        )
    }

    pub fn strategy_generation_failed(message: impl Into<String>) -> Self {
        Self::new(PromptErrorKind::InvestigationStrategyGenerationFailed, message)
    }

    pub fn template_not_found(template_id: &str) -> Self {
        Self::new(
            PromptErrorKind::TemplateNotFound,
            format!("Template not found: {}", template_id),
        )
    }

    pub fn template_rendering_failed(message: impl Into<String>) -> Self {
        Self::new(PromptErrorKind::TemplateRenderingFailed, message)
    }

    pub fn template_invalid(message: impl Into<String>) -> Self {
        Self::new(PromptErrorKind::TemplateInvalid, message)
    }

    pub fn schema_generation_failed(message: impl Into<String>) -> Self {
        Self::new(PromptErrorKind::SchemaGenerationFailed, message)
    }

    pub fn config_invalid(message: impl Into<String>) -> Self {
        Self::new(PromptErrorKind::ConfigInvalid, message)
    }

    /// Attach the session the error was raised for.
    pub fn for_session(mut self, session_id: &str) -> Self {
        if self.session_id.is_none() {
            self.session_id = Some(session_id.to_string());
        }
        self
    }

    /// Attach the step index the error was raised for.
    pub fn at_step(mut self, step_index: usize) -> Self {
        if self.step_index.is_none() {
            self.step_index = Some(step_index);
        }
        self
    }

    pub fn with_source(mut self, source: anyhow::Error) -> Self {
        self.source = Some(source);
        self
    }

    /// Prefix the message while keeping the kind and source intact.
    pub fn prefixed(mut self, prefix: &str) -> Self {
        if !self.message.starts_with(prefix) {
            self.message = format!("{}: {}", prefix, self.message);
        }
        self
    }

    pub fn kind(&self) -> PromptErrorKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn session_id(&self) -> Option<&str> {
        self.session_id.as_deref()
    }

    pub fn step_index(&self) -> Option<usize> {
        self.step_index
    }
}

pub type Result<T> = std::result::Result<T, PromptError>;
