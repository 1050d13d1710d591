use std::sync::Arc;

use super::orchestrator::PromptManager;
use crate::error::{PromptError, Result};
use crate::models::ActionPromptRequest;

/// Step-list view over a [`PromptManager`] for callers that only need the
/// rendered system message per step.
pub struct LegacyStepPrompts {
    manager: Arc<PromptManager>,
    session_id: String,
    steps: Vec<String>,
}

impl LegacyStepPrompts {
    pub fn init(manager: Arc<PromptManager>, session_id: impl Into<String>, steps: Vec<String>) -> Self {
        Self {
            manager,
            session_id: session_id.into(),
            steps,
        }
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn step_count(&self) -> usize {
        self.steps.len()
    }

    /// System message for the step at `index`
    pub async fn get_step_prompt(&self, index: usize) -> Result<String> {
        let content = self.steps.get(index).ok_or_else(|| {
            PromptError::context_unavailable(format!(
                "Step {} is out of range for a workflow of {} steps",
                index,
                self.steps.len()
            ))
            .for_session(&self.session_id)
            .at_step(index)
        })?;

        let request =
            ActionPromptRequest::new(self.session_id.clone(), index, content.clone(), self.steps.len());
        let prompt = self.manager.generate_action_prompt(&request).await?;
        Ok(prompt.content.system_message)
    }
}
