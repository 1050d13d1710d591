use std::sync::Arc;

use super::history::{render_history_digest, truncate_command_results};
use super::store::ContextStore;
use crate::config::ContextConfig;
use crate::error::{PromptError, Result};
use crate::models::{
    ContextSection, CurrentStep, ExecutionHistory, ExtractedVariable, FilteredContextOptions,
    InvestigationPreferences, InvestigationTool, KnownElement, PageStates, PromptOptions,
    StepKind, WorkingMemoryRecord, WorkingMemorySection,
};

/// Identifies the step a context section is built for
#[derive(Debug, Clone)]
pub struct StepTarget<'a> {
    pub session_id: &'a str,
    pub step_index: usize,
    pub step_content: &'a str,
    pub total_steps: usize,
    pub kind: StepKind,
}

/// Pulls history, page state and memory from the context store and
/// assembles a bounded [`ContextSection`].
pub struct ContextIntegrator {
    store: Option<Arc<dyn ContextStore>>,
}

impl ContextIntegrator {
    pub fn new(store: Option<Arc<dyn ContextStore>>) -> Self {
        Self { store }
    }

    pub fn has_store(&self) -> bool {
        self.store.is_some()
    }

    pub async fn build_context_section(
        &self,
        target: &StepTarget<'_>,
        options: &PromptOptions,
        config: &ContextConfig,
    ) -> Result<ContextSection> {
        let mut section = ContextSection::new(CurrentStep {
            index: target.step_index,
            content: target.step_content.to_string(),
            kind: target.kind,
            total_steps: target.total_steps,
        });

        let Some(store) = self.store.as_ref() else {
            tracing::debug!(
                "No context store attached, building context for session {} from the request only",
                target.session_id
            );
            return Ok(section);
        };

        if options.include_execution_history {
            let max_steps = options.max_history_steps.unwrap_or(config.max_history_items);
            let (metadata, history) = self
                .load_execution_history(store.as_ref(), target, max_steps, config)
                .await?;
            section.session_metadata = metadata;
            section.execution_history = history;
        }

        if options.include_page_state {
            section.page_states = self
                .load_page_states(store.as_ref(), target, options, config)
                .await?;
        }

        let use_filtered = options
            .use_filtered_context
            .unwrap_or(config.filtered_context_enabled);
        if use_filtered {
            let filter_options = FilteredContextOptions {
                level: options
                    .filtering_level
                    .unwrap_or(config.default_filtering_level),
                max_size: config.max_filtered_context_size,
                max_history_steps: options.max_history_steps.unwrap_or(config.max_history_items),
                include_page_insights: options.include_page_state,
            };
            let filtered = store
                .generate_filtered_context(target.session_id, target.step_index, &filter_options)
                .await
                .map_err(|e| {
                    PromptError::context_filtering_failed(format!(
                        "Failed to generate filtered context for session {}",
                        target.session_id
                    ))
                    .for_session(target.session_id)
                    .at_step(target.step_index)
                    .with_source(e)
                })?;

            section.filtered_context = match filtered {
                Some(ctx) if ctx.size() > config.max_filtered_context_size => {
                    tracing::warn!(
                        "Filtered context for session {} is {} chars, over the {} limit; omitting",
                        target.session_id,
                        ctx.size(),
                        config.max_filtered_context_size
                    );
                    None
                }
                other => other,
            };
        }

        if options.include_investigation_history {
            match store
                .get_investigation_history(target.session_id, target.step_index)
                .await
            {
                Ok(records) => section.investigation_history = Some(records),
                Err(e) => {
                    tracing::warn!(
                        "Investigation history unavailable for session {}: {}",
                        target.session_id,
                        e
                    );
                }
            }
        }

        Ok(section)
    }

    async fn load_execution_history(
        &self,
        store: &dyn ContextStore,
        target: &StepTarget<'_>,
        max_steps: usize,
        config: &ContextConfig,
    ) -> Result<(Option<crate::models::SessionMetadata>, ExecutionHistory)> {
        let unavailable = |what: &str, e: anyhow::Error| {
            PromptError::context_unavailable(format!(
                "Failed to load {} for session {}",
                what, target.session_id
            ))
            .for_session(target.session_id)
            .at_step(target.step_index)
            .with_source(e)
        };

        let metadata = store
            .get_execution_context(target.session_id)
            .await
            .map_err(|e| unavailable("execution context", e))?;

        let mut steps = store
            .get_step_history(target.session_id, max_steps)
            .await
            .map_err(|e| unavailable("step history", e))?;

        // The store may hand back more than asked for; keep the newest
        if steps.len() > max_steps {
            steps.drain(..steps.len() - max_steps);
        }

        truncate_command_results(&mut steps, config.max_extracted_value_length);

        let success_count = steps.iter().filter(|s| s.success).count();
        let failure_count = steps.len() - success_count;
        let digest = render_history_digest(&steps, target.step_index, config.max_history_digest_chars);

        Ok((
            metadata,
            ExecutionHistory {
                previous_steps: steps,
                success_count,
                failure_count,
                digest,
            },
        ))
    }

    async fn load_page_states(
        &self,
        store: &dyn ContextStore,
        target: &StepTarget<'_>,
        options: &PromptOptions,
        config: &ContextConfig,
    ) -> Result<PageStates> {
        let mut states = PageStates::default();

        let current = store
            .get_current_page_state(target.session_id)
            .await
            .map_err(|e| {
                PromptError::context_unavailable(format!(
                    "Failed to load current page state for session {}",
                    target.session_id
                ))
                .for_session(target.session_id)
                .at_step(target.step_index)
                .with_source(e)
            })?;
        states.current_dom = within_budget(current, "currentDom", config.max_dom_size, &mut states.omissions);

        let wants_previous = options.include_previous_dom || config.previous_dom_enabled;
        if wants_previous && target.step_index > 0 {
            match store
                .get_previous_page_state(target.session_id, target.step_index - 1)
                .await
            {
                Ok(previous) => {
                    states.previous_dom = within_budget(
                        previous,
                        "previousDom",
                        config.max_dom_size,
                        &mut states.omissions,
                    );
                }
                Err(e) => {
                    tracing::warn!(
                        "Previous page state unavailable for session {} step {}: {}",
                        target.session_id,
                        target.step_index - 1,
                        e
                    );
                }
            }
        }

        Ok(states)
    }

    /// Working memory mapped into a prompt section. Absent on any failure.
    pub fn build_working_memory_section(
        &self,
        session_id: &str,
        config: &ContextConfig,
    ) -> Option<WorkingMemorySection> {
        let store = self.store.as_ref()?;

        let record = match store.get_working_memory(session_id) {
            Ok(Some(record)) => record,
            Ok(None) => return None,
            Err(e) => {
                tracing::warn!("Working memory unavailable for session {}: {}", session_id, e);
                return None;
            }
        };

        Some(map_working_memory(record, config))
    }

    /// Summary of earlier investigations, if the store can produce one
    pub async fn investigation_summary(&self, session_id: &str) -> Option<String> {
        let store = self.store.as_ref()?;
        match store.generate_investigation_context(session_id).await {
            Ok(summary) => summary.filter(|s| !s.trim().is_empty()),
            Err(e) => {
                tracing::warn!(
                    "Investigation context unavailable for session {}: {}",
                    session_id,
                    e
                );
                None
            }
        }
    }

    /// Number of page elements discovered so far in the session
    pub async fn discovered_element_count(&self, session_id: &str) -> Option<usize> {
        let store = self.store.as_ref()?;
        match store.get_page_elements_discovered(session_id).await {
            Ok(elements) => Some(elements.len()),
            Err(e) => {
                tracing::warn!(
                    "Discovered elements unavailable for session {}: {}",
                    session_id,
                    e
                );
                None
            }
        }
    }
}

fn within_budget(
    dom: Option<String>,
    label: &str,
    max_size: usize,
    omissions: &mut Vec<String>,
) -> Option<String> {
    let dom = dom?;
    let size = dom.chars().count();
    if size > max_size {
        omissions.push(format!(
            "{} omitted: {} characters exceeds maxDomSize of {}",
            label, size, max_size
        ));
        None
    } else {
        Some(dom)
    }
}

fn cap<T>(mut items: Vec<T>, limit: Option<usize>) -> Vec<T> {
    if let Some(limit) = limit {
        items.truncate(limit);
    }
    items
}

fn map_working_memory(record: WorkingMemoryRecord, config: &ContextConfig) -> WorkingMemorySection {
    let limit = config.working_memory_detail_level.item_limit();

    let mut elements: Vec<KnownElement> = record
        .elements
        .into_iter()
        .filter(|e| e.reliability >= config.element_knowledge_threshold)
        .map(|e| KnownElement {
            selector: e.selector,
            element_type: e.element_type,
            reliability: e.reliability,
            last_validated: e.last_validated.unwrap_or_else(chrono::Utc::now),
        })
        .collect();
    elements.sort_by(|a, b| {
        b.reliability
            .partial_cmp(&a.reliability)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let variables = record
        .variables
        .into_iter()
        .map(|(name, value)| ExtractedVariable { name, value })
        .collect();

    let preferred_tool_order = record
        .preferred_tool_order
        .iter()
        .filter_map(|name| name.parse::<InvestigationTool>().ok())
        .collect();

    WorkingMemorySection {
        known_elements: cap(elements, limit),
        extracted_variables: cap(variables, limit),
        successful_patterns: cap(record.successful_patterns, limit),
        failure_patterns: cap(record.failure_patterns, limit),
        investigation_preferences: InvestigationPreferences {
            preferred_tool_order,
            quality_thresholds: record.quality_thresholds,
        },
    }
}
