use std::sync::Arc;

use super::orchestrator::PromptManager;
use crate::cache::{MemoryPromptCache, PromptCache};
use crate::config::PromptManagerConfig;
use crate::context::{ContextIntegrator, ContextStore, SchemaStore};
use crate::error::Result;
use crate::template::{default_templates, TemplateEngine};

/// Create a prompt manager with the built-in templates and an in-memory
/// prompt cache. Without a context store prompts carry only the current step.
pub fn create_prompt_manager(
    config: PromptManagerConfig,
    context_store: Option<Arc<dyn ContextStore>>,
    schema_store: Option<Arc<dyn SchemaStore>>,
) -> Result<PromptManager> {
    PromptManagerBuilder::new()
        .config(config)
        .context_store_opt(context_store)
        .schema_store_opt(schema_store)
        .build()
}

/// Builder for a [`PromptManager`] when the defaults need replacing
#[derive(Default)]
pub struct PromptManagerBuilder {
    config: Option<PromptManagerConfig>,
    context_store: Option<Arc<dyn ContextStore>>,
    schema_store: Option<Arc<dyn SchemaStore>>,
    cache: Option<Arc<dyn PromptCache>>,
}

impl PromptManagerBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn config(mut self, config: PromptManagerConfig) -> Self {
        self.config = Some(config);
        self
    }

    pub fn context_store(mut self, store: Arc<dyn ContextStore>) -> Self {
        self.context_store = Some(store);
        self
    }

    pub fn schema_store(mut self, store: Arc<dyn SchemaStore>) -> Self {
        self.schema_store = Some(store);
        self
    }

    /// Use a caller-provided cache in place of the in-memory one
    pub fn cache(mut self, cache: Arc<dyn PromptCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    fn context_store_opt(mut self, store: Option<Arc<dyn ContextStore>>) -> Self {
        self.context_store = store;
        self
    }

    fn schema_store_opt(mut self, store: Option<Arc<dyn SchemaStore>>) -> Self {
        self.schema_store = store;
        self
    }

    pub fn build(self) -> Result<PromptManager> {
        let config = self.config.unwrap_or_default();
        config.validate()?;

        let engine = TemplateEngine::new();
        let templates = default_templates();
        for template in &templates {
            engine.validate(template)?;
        }

        let cache = match self.cache {
            Some(cache) => {
                cache.update_config(config.cache.clone());
                cache
            }
            None => Arc::new(MemoryPromptCache::new(config.cache.clone())) as Arc<dyn PromptCache>,
        };

        tracing::info!(
            "Prompt manager ready: {} templates, context store {}, schema store {}",
            templates.len(),
            if self.context_store.is_some() { "attached" } else { "absent" },
            if self.schema_store.is_some() { "attached" } else { "absent" }
        );

        Ok(PromptManager::new(
            config,
            templates,
            ContextIntegrator::new(self.context_store),
            self.schema_store,
            cache,
        ))
    }
}
