//! End-to-end tests for the prompt manager against in-memory and scripted
//! stores.
//!
//! Run with: cargo test --test prompt_engine_integration

use anyhow::anyhow;
use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;

use tasker_prompts::content::canonical_response_schema;
use tasker_prompts::models::{
    ActionPromptRequest, CommandRecord, ElementRecord, FilteredContext, FilteredContextOptions,
    InvestigationPhase, InvestigationPromptRequest, InvestigationRecord, PromptOptions,
    ReflectionPromptRequest, SchemaSource, SessionMetadata, StepRecord, WorkingMemoryRecord,
};
use tasker_prompts::{
    create_prompt_manager, ContextStore, LegacyStepPrompts, MemoryContextStore, PromptErrorKind,
    PromptManager, PromptManagerConfig, SchemaStore,
};

// ============================================================================
// Test doubles
// ============================================================================

/// Context store that can fail or stall on chosen calls
#[derive(Default)]
struct ScriptedStore {
    fail_history: bool,
    page_delay: Option<Duration>,
}

#[async_trait]
impl ContextStore for ScriptedStore {
    async fn get_execution_context(&self, session_id: &str) -> anyhow::Result<Option<SessionMetadata>> {
        Ok(Some(SessionMetadata {
            session_id: session_id.to_string(),
            started_at: None,
            total_steps: 4,
            current_step_index: 1,
            status: None,
        }))
    }

    async fn get_step_history(&self, _session_id: &str, _max_steps: usize) -> anyhow::Result<Vec<StepRecord>> {
        if self.fail_history {
            return Err(anyhow!("history backend offline"));
        }
        Ok(vec![StepRecord::new(0, "Open the shop", true)])
    }

    async fn get_current_page_state(&self, _session_id: &str) -> anyhow::Result<Option<String>> {
        if let Some(delay) = self.page_delay {
            tokio::time::sleep(delay).await;
        }
        Ok(Some("<html><body>shop</body></html>".to_string()))
    }

    async fn get_previous_page_state(&self, _session_id: &str, _step_index: usize) -> anyhow::Result<Option<String>> {
        Ok(None)
    }

    async fn generate_filtered_context(
        &self,
        _session_id: &str,
        _step_index: usize,
        _options: &FilteredContextOptions,
    ) -> anyhow::Result<Option<FilteredContext>> {
        Ok(None)
    }

    async fn generate_investigation_context(&self, _session_id: &str) -> anyhow::Result<Option<String>> {
        Err(anyhow!("investigation index missing"))
    }

    fn get_working_memory(&self, _session_id: &str) -> anyhow::Result<Option<WorkingMemoryRecord>> {
        Err(anyhow!("working memory corrupted"))
    }

    async fn get_investigation_history(&self, _session_id: &str, _step_index: usize) -> anyhow::Result<Vec<InvestigationRecord>> {
        Ok(Vec::new())
    }

    async fn get_page_elements_discovered(&self, _session_id: &str) -> anyhow::Result<Vec<ElementRecord>> {
        Ok(Vec::new())
    }
}

struct FixedSchemaStore {
    schema: Option<Value>,
}

#[async_trait]
impl SchemaStore for FixedSchemaStore {
    async fn get_response_schema(&self) -> anyhow::Result<Value> {
        self.schema.clone().ok_or_else(|| anyhow!("schema service unreachable"))
    }

    fn validate_schema_compatibility(&self, _schema: &Value) -> bool {
        true
    }

    fn get_schema_version(&self) -> String {
        "2.1.0".to_string()
    }
}

fn manager_with(config: PromptManagerConfig, store: Option<Arc<dyn ContextStore>>) -> PromptManager {
    create_prompt_manager(config, store, None).unwrap()
}

fn seeded_store(session_id: &str) -> Arc<MemoryContextStore> {
    let store = Arc::new(MemoryContextStore::new());
    store.start_session(session_id, 3);
    store.set_page_state(session_id, "<html><body><button id=\"buy\">Buy</button></body></html>");
    store.record_step(
        session_id,
        StepRecord::new(0, "Open the product page", true)
            .with_command(CommandRecord::new("navigate", true).with_result("Loaded product page")),
    );
    store
}

// ============================================================================
// Schema resolution
// ============================================================================

#[tokio::test]
async fn test_failing_schema_store_falls_back() {
    let schema_store: Arc<dyn SchemaStore> = Arc::new(FixedSchemaStore { schema: None });
    let manager = create_prompt_manager(PromptManagerConfig::default(), None, Some(schema_store)).unwrap();

    let prompt = manager
        .generate_action_prompt(&ActionPromptRequest::new("s1", 0, "Open the shop", 2))
        .await
        .unwrap();

    assert_eq!(prompt.metadata.schema_source, SchemaSource::Fallback);
    assert_eq!(prompt.schema, canonical_response_schema());
}

#[tokio::test]
async fn test_schema_store_schema_is_used() {
    let mut schema = canonical_response_schema();
    schema["title"] = json!("Store schema");
    let schema_store: Arc<dyn SchemaStore> = Arc::new(FixedSchemaStore { schema: Some(schema.clone()) });
    let manager = create_prompt_manager(PromptManagerConfig::default(), None, Some(schema_store)).unwrap();

    let prompt = manager
        .generate_action_prompt(&ActionPromptRequest::new("s1", 0, "Open the shop", 2))
        .await
        .unwrap();

    assert_eq!(prompt.metadata.schema_source, SchemaSource::Store);
    assert_eq!(prompt.metadata.schema_version.as_deref(), Some("2.1.0"));
    assert_eq!(prompt.schema, schema);
}

#[tokio::test]
async fn test_bad_schema_override_is_rejected() {
    let manager = manager_with(PromptManagerConfig::default(), None);
    let request = ActionPromptRequest::new("s1", 0, "Open the shop", 2).with_options(PromptOptions {
        response_schema_override: Some(json!({ "type": "string" })),
        ..Default::default()
    });

    let err = manager.generate_action_prompt(&request).await.unwrap_err();
    assert_eq!(err.kind(), PromptErrorKind::SchemaGenerationFailed);
}

// ============================================================================
// Cache behaviour
// ============================================================================

#[tokio::test]
async fn test_cache_evicts_least_recently_used() {
    let mut config = PromptManagerConfig::default();
    config.cache.max_cache_size = 2;
    let manager = manager_with(config, None);

    let first = ActionPromptRequest::new("s1", 1, "Step one", 5);
    let second = ActionPromptRequest::new("s1", 2, "Step two", 5);
    let third = ActionPromptRequest::new("s1", 3, "Step three", 5);

    let first_prompt = manager.generate_action_prompt(&first).await.unwrap();
    let second_prompt = manager.generate_action_prompt(&second).await.unwrap();
    // Touch the first so the second becomes least recently used
    manager.generate_action_prompt(&first).await.unwrap();
    manager.generate_action_prompt(&third).await.unwrap();

    assert_eq!(manager.cache_stats().total_entries, 2);
    assert_eq!(
        manager.generate_action_prompt(&first).await.unwrap().prompt_id,
        first_prompt.prompt_id
    );
    assert_ne!(
        manager.generate_action_prompt(&second).await.unwrap().prompt_id,
        second_prompt.prompt_id
    );
}

#[tokio::test]
async fn test_cache_entries_expire() {
    let mut config = PromptManagerConfig::default();
    config.cache.cache_ttl_ms = 5;
    let manager = manager_with(config, None);
    let request = ActionPromptRequest::new("s1", 1, "Search for shoes", 3);

    let first = manager.generate_action_prompt(&request).await.unwrap();
    tokio::time::sleep(Duration::from_millis(30)).await;
    let second = manager.generate_action_prompt(&request).await.unwrap();

    assert_ne!(first.prompt_id, second.prompt_id);
}

#[tokio::test]
async fn test_disabled_cache_stores_nothing() {
    let mut config = PromptManagerConfig::default();
    config.cache.cache_enabled = false;
    let manager = manager_with(config, None);
    let request = ActionPromptRequest::new("s1", 1, "Search for shoes", 3);

    let first = manager.generate_action_prompt(&request).await.unwrap();
    let second = manager.generate_action_prompt(&request).await.unwrap();

    assert_ne!(first.prompt_id, second.prompt_id);
    assert_eq!(manager.cache_stats().total_entries, 0);
}

#[tokio::test]
async fn test_template_update_clears_cache() {
    let manager = manager_with(PromptManagerConfig::default(), None);
    let request = ActionPromptRequest::new("s1", 0, "Open the shop", 2);
    let before = manager.generate_action_prompt(&request).await.unwrap();
    assert_eq!(manager.cache_stats().total_entries, 1);

    let mut template = manager
        .get_prompt_templates()
        .into_iter()
        .find(|t| t.id == "initial_action")
        .unwrap();
    template.version = "1.1.0".to_string();
    manager.update_prompt_template(template).unwrap();
    assert_eq!(manager.cache_stats().total_entries, 0);

    let after = manager.generate_action_prompt(&request).await.unwrap();
    assert_ne!(before.prompt_id, after.prompt_id);
    assert_eq!(after.metadata.template_version, "1.1.0");
}

#[tokio::test]
async fn test_config_update_drops_prompts_built_under_old_budgets() {
    let store = seeded_store("budget");
    store.set_page_state("budget", "d".repeat(120));
    let manager = manager_with(PromptManagerConfig::default(), Some(store as Arc<dyn ContextStore>));
    let request = ActionPromptRequest::new("budget", 1, "Click Buy", 3);

    let before = manager.generate_action_prompt(&request).await.unwrap();
    assert!(before.content.context_section.page_states.current_dom.is_some());

    manager
        .update_config(&json!({ "context": { "maxDomSize": 10 } }))
        .unwrap();
    assert_eq!(manager.cache_stats().total_entries, 0);

    let after = manager.generate_action_prompt(&request).await.unwrap();
    assert_ne!(before.prompt_id, after.prompt_id);
    let states = &after.content.context_section.page_states;
    assert!(states.current_dom.is_none());
    assert_eq!(
        states.omissions,
        vec!["currentDom omitted: 120 characters exceeds maxDomSize of 10".to_string()]
    );
}

// ============================================================================
// Context integration
// ============================================================================

#[tokio::test]
async fn test_history_and_page_state_from_store() {
    let store = seeded_store("shop");
    let manager = manager_with(PromptManagerConfig::default(), Some(store as Arc<dyn ContextStore>));

    let request = ReflectionPromptRequest::new("shop", 0, "Click Buy", 3)
        .with_expected_outcome("The product page is open");
    let prompt = manager.generate_reflection_prompt(&request).await.unwrap();

    let context = &prompt.content.context_section;
    assert_eq!(context.execution_history.success_count, 1);
    assert!(context.page_states.current_dom.as_deref().unwrap().contains("buy"));
    assert!(prompt.content.system_message.contains("Step 1 (attempt 1): Open the product page -> SUCCESS"));
    assert!(prompt.content.system_message.contains("CURRENT PAGE STATE:"));
}

#[tokio::test]
async fn test_oversized_dom_is_omitted_with_note() {
    let store = seeded_store("big");
    store.set_page_state("big", "x".repeat(500));
    let mut config = PromptManagerConfig::default();
    config.context.max_dom_size = 100;
    let manager = manager_with(config, Some(store as Arc<dyn ContextStore>));

    let prompt = manager
        .generate_action_prompt(&ActionPromptRequest::new("big", 1, "Click Buy", 3))
        .await
        .unwrap();

    let states = &prompt.content.context_section.page_states;
    assert!(states.current_dom.is_none());
    assert_eq!(
        states.omissions,
        vec!["currentDom omitted: 500 characters exceeds maxDomSize of 100".to_string()]
    );
}

#[tokio::test]
async fn test_optional_context_failures_degrade() {
    let store: Arc<dyn ContextStore> = Arc::new(ScriptedStore::default());
    let manager = manager_with(PromptManagerConfig::default(), Some(store));

    let prompt = manager
        .generate_investigation_prompt(&InvestigationPromptRequest::new(
            "s1",
            1,
            "Find the checkout button",
            4,
            InvestigationPhase::InitialAssessment,
        ))
        .await
        .unwrap();

    assert!(prompt.content.working_memory_section.is_none());
    let section = prompt.content.investigation_section.as_ref().unwrap();
    assert!(section.previous_context.is_none());
    assert_eq!(section.elements_discovered, Some(0));
}

#[tokio::test]
async fn test_history_failure_is_wrapped() {
    let store: Arc<dyn ContextStore> = Arc::new(ScriptedStore {
        fail_history: true,
        ..Default::default()
    });
    let manager = manager_with(PromptManagerConfig::default(), Some(store));

    let err = manager
        .generate_action_prompt(&ActionPromptRequest::new("s1", 2, "Pay", 4))
        .await
        .unwrap_err();

    assert_eq!(err.kind(), PromptErrorKind::ContextUnavailable);
    assert_eq!(
        err.to_string(),
        "Failed to generate action prompt: Failed to load step history for session s1"
    );
    assert_eq!(err.session_id(), Some("s1"));
    assert_eq!(err.step_index(), Some(2));
    assert_eq!(
        std::error::Error::source(&err).map(|s| s.to_string()),
        Some("history backend offline".to_string())
    );
}

// ============================================================================
// Investigation gating
// ============================================================================

#[tokio::test]
async fn test_imported_config_disables_investigation() {
    let manager = manager_with(PromptManagerConfig::default(), None);
    manager
        .import_config(r#"{ "investigation": { "enableInvestigationPrompts": false } }"#)
        .unwrap();

    let err = manager
        .generate_investigation_prompt(&InvestigationPromptRequest::new(
            "s1",
            0,
            "Find the login form",
            2,
            InvestigationPhase::FocusedExploration,
        ))
        .await
        .unwrap_err();

    assert_eq!(err.kind(), PromptErrorKind::InvestigationDisabled);
    assert_eq!(
        err.to_string(),
        "Failed to generate investigation prompt: Investigation prompts are disabled in configuration"
    );
}

// ============================================================================
// Concurrency and cancellation
// ============================================================================

#[tokio::test]
async fn test_cancelled_generation_leaves_cache_empty() {
    let store: Arc<dyn ContextStore> = Arc::new(ScriptedStore {
        page_delay: Some(Duration::from_millis(500)),
        ..Default::default()
    });
    let manager = manager_with(PromptManagerConfig::default(), Some(store));
    let request = ActionPromptRequest::new("s1", 1, "Click Buy", 4);

    let outcome = tokio::time::timeout(
        Duration::from_millis(20),
        manager.generate_action_prompt(&request),
    )
    .await;

    assert!(outcome.is_err());
    assert_eq!(manager.cache_stats().total_entries, 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_generation_shares_cache() {
    let store = seeded_store("parallel");
    let manager = Arc::new(manager_with(
        PromptManagerConfig::default(),
        Some(store as Arc<dyn ContextStore>),
    ));

    let mut handles = Vec::new();
    for step in 0..16 {
        let manager = Arc::clone(&manager);
        handles.push(tokio::spawn(async move {
            let request = ActionPromptRequest::new("parallel", step, format!("Step {}", step), 16);
            manager.generate_action_prompt(&request).await
        }));
    }

    for handle in handles {
        assert!(handle.await.unwrap().is_ok());
    }

    assert_eq!(manager.cache_stats().total_entries, 16);
    assert!(manager.validate_cache_integrity());
}

// ============================================================================
// Legacy wrapper
// ============================================================================

#[tokio::test]
async fn test_legacy_wrapper_uses_manager() {
    let store = seeded_store("legacy");
    let manager = Arc::new(manager_with(
        PromptManagerConfig::default(),
        Some(store as Arc<dyn ContextStore>),
    ));
    let prompts = LegacyStepPrompts::init(
        Arc::clone(&manager),
        "legacy",
        vec![
            "Open the product page".to_string(),
            "Click Buy".to_string(),
            "Confirm the order".to_string(),
        ],
    );

    let message = prompts.get_step_prompt(1).await.unwrap();
    assert!(message.contains("CURRENT STEP (2 of 3):\nClick Buy"));
    assert!(message.contains("EXECUTION HISTORY:"));
    assert_eq!(prompts.step_count(), 3);
    assert_eq!(manager.cache_stats().total_entries, 1);
}
