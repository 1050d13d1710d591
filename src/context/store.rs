use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;

use crate::models::{
    ElementRecord, FilteredContext, FilteredContextOptions, InvestigationRecord, SessionMetadata,
    StepRecord, WorkingMemoryRecord,
};

/// Session store holding execution history, page snapshots and working
/// memory. Implementations own their own timeouts and retries.
#[async_trait]
pub trait ContextStore: Send + Sync {
    async fn get_execution_context(&self, session_id: &str) -> Result<Option<SessionMetadata>>;

    /// Most recent `max_steps` step records, oldest first
    async fn get_step_history(&self, session_id: &str, max_steps: usize) -> Result<Vec<StepRecord>>;

    async fn get_current_page_state(&self, session_id: &str) -> Result<Option<String>>;

    /// DOM snapshot captured at `step_index`
    async fn get_previous_page_state(
        &self,
        session_id: &str,
        step_index: usize,
    ) -> Result<Option<String>>;

    async fn generate_filtered_context(
        &self,
        session_id: &str,
        step_index: usize,
        options: &FilteredContextOptions,
    ) -> Result<Option<FilteredContext>>;

    /// Free-text summary of what earlier investigations established
    async fn generate_investigation_context(&self, session_id: &str) -> Result<Option<String>>;

    fn get_working_memory(&self, session_id: &str) -> Result<Option<WorkingMemoryRecord>>;

    async fn get_investigation_history(
        &self,
        session_id: &str,
        step_index: usize,
    ) -> Result<Vec<InvestigationRecord>>;

    async fn get_page_elements_discovered(&self, session_id: &str) -> Result<Vec<ElementRecord>>;
}

/// Source of the response schema the model must follow
#[async_trait]
pub trait SchemaStore: Send + Sync {
    async fn get_response_schema(&self) -> Result<Value>;

    fn validate_schema_compatibility(&self, schema: &Value) -> bool;

    fn get_schema_version(&self) -> String;
}
