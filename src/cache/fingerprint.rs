use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use crate::models::{
    ActionPromptRequest, ActionWithInvestigationRequest, InvestigationPromptRequest,
    PromptOptions, PromptType, ReflectionPromptRequest,
};

/// Deterministic cache key for a prompt request. Identical requests produce
/// identical keys within one build of the crate.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PromptFingerprint(String);

impl PromptFingerprint {
    fn build(
        prompt_type: PromptType,
        session_id: &str,
        step_index: usize,
        hash_extra: impl FnOnce(&mut DefaultHasher),
    ) -> Self {
        let mut hasher = DefaultHasher::new();
        hash_extra(&mut hasher);
        Self(format!(
            "{}:{}:{}:{:016x}",
            prompt_type.as_str(),
            session_id,
            step_index,
            hasher.finish()
        ))
    }

    pub fn for_action(prompt_type: PromptType, request: &ActionPromptRequest) -> Self {
        Self::build(prompt_type, &request.session_id, request.step_index, |h| {
            request.step_content.hash(h);
            request.total_steps.hash(h);
            hash_options(&request.options, h);
        })
    }

    pub fn for_reflection(request: &ReflectionPromptRequest) -> Self {
        Self::build(
            PromptType::ReflectionAndValidation,
            &request.session_id,
            request.next_step_index,
            |h| {
                request.completed_step_index.hash(h);
                request.next_step_content.hash(h);
                request.total_steps.hash(h);
                request.expected_outcome.hash(h);
                hash_options(&request.options, h);
            },
        )
    }

    pub fn for_investigation(request: &InvestigationPromptRequest) -> Self {
        Self::build(
            PromptType::for_phase(request.phase),
            &request.session_id,
            request.step_index,
            |h| {
                request.step_content.hash(h);
                request.total_steps.hash(h);
                request.available_tools.hash(h);
                hash_options(&request.options, h);
            },
        )
    }

    pub fn for_action_with_investigation(request: &ActionWithInvestigationRequest) -> Self {
        Self::build(
            PromptType::ActionWithInvestigation,
            &request.session_id,
            request.step_index,
            |h| {
                request.step_content.hash(h);
                request.total_steps.hash(h);
                // Findings are free-form; their JSON form is stable enough to key on
                serde_json::to_string(&request.investigation_context)
                    .unwrap_or_default()
                    .hash(h);
                hash_options(&request.options, h);
            },
        )
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for PromptFingerprint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

fn hash_options(options: &PromptOptions, h: &mut DefaultHasher) {
    options.include_execution_history.hash(h);
    options.include_page_state.hash(h);
    options.include_previous_dom.hash(h);
    options.use_filtered_context.hash(h);
    options.filtering_level.map(|l| l.as_str()).hash(h);
    options.include_working_memory.hash(h);
    options.include_investigation_history.hash(h);
    options.include_validation.hash(h);
    options.reasoning_depth.hash(h);
    options.max_history_steps.hash(h);
    options.template_id.hash(h);
    options.custom_instructions.hash(h);
    options
        .response_schema_override
        .as_ref()
        .map(|s| s.to_string())
        .hash(h);
}
