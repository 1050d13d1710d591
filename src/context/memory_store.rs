use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use std::collections::BTreeMap;

use super::store::ContextStore;
use crate::models::{
    ElementRecord, FilteredContext, FilteredContextOptions, InvestigationRecord, SessionMetadata,
    StepRecord, WorkingMemoryRecord,
};

/// Everything held for one session
#[derive(Debug, Default)]
struct SessionState {
    metadata: Option<SessionMetadata>,
    steps: Vec<StepRecord>,
    current_dom: Option<String>,
    /// DOM snapshots by the step they were captured at
    snapshots: BTreeMap<usize, String>,
    filtered_context: Option<FilteredContext>,
    investigation_summary: Option<String>,
    investigations: Vec<InvestigationRecord>,
    working_memory: Option<WorkingMemoryRecord>,
    elements: Vec<ElementRecord>,
}

/// In-process context store keyed by session id
pub struct MemoryContextStore {
    sessions: DashMap<String, SessionState>,
}

impl MemoryContextStore {
    pub fn new() -> Self {
        Self {
            sessions: DashMap::new(),
        }
    }

    pub fn start_session(&self, session_id: &str, total_steps: usize) {
        let mut state = self.sessions.entry(session_id.to_string()).or_default();
        state.metadata = Some(SessionMetadata {
            session_id: session_id.to_string(),
            started_at: Some(Utc::now()),
            total_steps,
            current_step_index: 0,
            status: Some("running".to_string()),
        });
        tracing::debug!("Session {} started with {} steps", session_id, total_steps);
    }

    pub fn record_step(&self, session_id: &str, record: StepRecord) {
        let mut state = self.sessions.entry(session_id.to_string()).or_default();
        if let Some(metadata) = state.metadata.as_mut() {
            metadata.current_step_index = metadata.current_step_index.max(record.step_index);
        }
        state.steps.push(record);
    }

    pub fn set_page_state(&self, session_id: &str, dom: impl Into<String>) {
        self.sessions
            .entry(session_id.to_string())
            .or_default()
            .current_dom = Some(dom.into());
    }

    /// Keep the current DOM as the snapshot for `step_index`
    pub fn snapshot_page_state(&self, session_id: &str, step_index: usize) {
        let mut state = self.sessions.entry(session_id.to_string()).or_default();
        if let Some(dom) = state.current_dom.clone() {
            state.snapshots.insert(step_index, dom);
        }
    }

    pub fn set_filtered_context(&self, session_id: &str, context: FilteredContext) {
        self.sessions
            .entry(session_id.to_string())
            .or_default()
            .filtered_context = Some(context);
    }

    pub fn set_investigation_summary(&self, session_id: &str, summary: impl Into<String>) {
        self.sessions
            .entry(session_id.to_string())
            .or_default()
            .investigation_summary = Some(summary.into());
    }

    pub fn record_investigation(&self, session_id: &str, record: InvestigationRecord) {
        self.sessions
            .entry(session_id.to_string())
            .or_default()
            .investigations
            .push(record);
    }

    pub fn set_working_memory(&self, session_id: &str, memory: WorkingMemoryRecord) {
        self.sessions
            .entry(session_id.to_string())
            .or_default()
            .working_memory = Some(memory);
    }

    pub fn record_element(&self, session_id: &str, element: ElementRecord) {
        let mut state = self.sessions.entry(session_id.to_string()).or_default();
        match state.elements.iter().position(|e| e.selector == element.selector) {
            Some(idx) => state.elements[idx] = element,
            None => state.elements.push(element),
        }
    }

    pub fn end_session(&self, session_id: &str) -> bool {
        self.sessions.remove(session_id).is_some()
    }

    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }
}

impl Default for MemoryContextStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ContextStore for MemoryContextStore {
    async fn get_execution_context(&self, session_id: &str) -> Result<Option<SessionMetadata>> {
        Ok(self
            .sessions
            .get(session_id)
            .and_then(|s| s.metadata.clone()))
    }

    async fn get_step_history(&self, session_id: &str, max_steps: usize) -> Result<Vec<StepRecord>> {
        let Some(state) = self.sessions.get(session_id) else {
            return Ok(Vec::new());
        };
        let skip = state.steps.len().saturating_sub(max_steps);
        Ok(state.steps[skip..].to_vec())
    }

    async fn get_current_page_state(&self, session_id: &str) -> Result<Option<String>> {
        Ok(self
            .sessions
            .get(session_id)
            .and_then(|s| s.current_dom.clone()))
    }

    async fn get_previous_page_state(
        &self,
        session_id: &str,
        step_index: usize,
    ) -> Result<Option<String>> {
        Ok(self
            .sessions
            .get(session_id)
            .and_then(|s| s.snapshots.get(&step_index).cloned()))
    }

    async fn generate_filtered_context(
        &self,
        session_id: &str,
        _step_index: usize,
        options: &FilteredContextOptions,
    ) -> Result<Option<FilteredContext>> {
        Ok(self.sessions.get(session_id).and_then(|s| {
            s.filtered_context.clone().map(|mut ctx| {
                ctx.level = options.level;
                ctx
            })
        }))
    }

    async fn generate_investigation_context(&self, session_id: &str) -> Result<Option<String>> {
        Ok(self
            .sessions
            .get(session_id)
            .and_then(|s| s.investigation_summary.clone()))
    }

    fn get_working_memory(&self, session_id: &str) -> Result<Option<WorkingMemoryRecord>> {
        Ok(self
            .sessions
            .get(session_id)
            .and_then(|s| s.working_memory.clone()))
    }

    async fn get_investigation_history(
        &self,
        session_id: &str,
        step_index: usize,
    ) -> Result<Vec<InvestigationRecord>> {
        Ok(self
            .sessions
            .get(session_id)
            .map(|s| {
                s.investigations
                    .iter()
                    .filter(|r| r.step_index <= step_index)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn get_page_elements_discovered(&self, session_id: &str) -> Result<Vec<ElementRecord>> {
        Ok(self
            .sessions
            .get(session_id)
            .map(|s| s.elements.clone())
            .unwrap_or_default())
    }
}
