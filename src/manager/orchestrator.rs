use chrono::Utc;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Instant;

use crate::cache::{CacheStats, PromptCache, PromptFingerprint};
use crate::config::PromptManagerConfig;
use crate::content::{resolve_response_schema, ContentBuilder, ContentRequest};
use crate::context::{ContextIntegrator, SchemaStore, StepTarget};
use crate::error::{PromptError, Result};
use crate::investigation::{InvestigationGenerator, InvestigationInputs};
use crate::models::{
    new_prompt_id, ActionPromptRequest, ActionWithInvestigationRequest, GeneratedPrompt,
    InvestigationContext, InvestigationPhase, InvestigationPromptRequest, InvestigationTool,
    PromptMetadata, PromptOptions, PromptType, PromptValidationResult, QualityAssessment,
    ReflectionPromptRequest, StepKind,
};
use crate::template::{PromptTemplate, TemplateEngine};
use crate::validation::PromptValidator;

/// One generation run, described independently of the request type
struct GenerationPlan<'a> {
    prompt_type: PromptType,
    target: StepTarget<'a>,
    options: PromptOptions,
    key: PromptFingerprint,
    /// Step to validate, with its expected outcome
    validate_step: Option<(usize, Option<&'a str>)>,
    investigation: Option<(InvestigationPhase, &'a [InvestigationTool])>,
    investigation_context: Option<&'a InvestigationContext>,
}

/// Builds, validates and caches prompts for the agent's investigate, act and
/// reflect loop. Shared across tasks behind an `Arc`.
pub struct PromptManager {
    config: RwLock<Arc<PromptManagerConfig>>,
    templates: RwLock<HashMap<String, Arc<PromptTemplate>>>,
    engine: TemplateEngine,
    context: ContextIntegrator,
    schema_store: Option<Arc<dyn SchemaStore>>,
    builder: ContentBuilder,
    investigation: InvestigationGenerator,
    validator: PromptValidator,
    cache: Arc<dyn PromptCache>,
}

impl PromptManager {
    pub(crate) fn new(
        config: PromptManagerConfig,
        templates: Vec<PromptTemplate>,
        context: ContextIntegrator,
        schema_store: Option<Arc<dyn SchemaStore>>,
        cache: Arc<dyn PromptCache>,
    ) -> Self {
        let templates = templates
            .into_iter()
            .map(|t| (t.id.clone(), Arc::new(t)))
            .collect();

        Self {
            config: RwLock::new(Arc::new(config)),
            templates: RwLock::new(templates),
            engine: TemplateEngine::new(),
            context,
            schema_store,
            builder: ContentBuilder::new(),
            investigation: InvestigationGenerator::new(),
            validator: PromptValidator::new(),
            cache,
        }
    }

    fn config_snapshot(&self) -> Arc<PromptManagerConfig> {
        let guard = self.config.read().unwrap_or_else(|e| e.into_inner());
        Arc::clone(&guard)
    }

    fn template(&self, template_id: &str) -> Result<Arc<PromptTemplate>> {
        let templates = self.templates.read().unwrap_or_else(|e| e.into_inner());
        templates
            .get(template_id)
            .cloned()
            .ok_or_else(|| PromptError::template_not_found(template_id))
    }

    // ========================================================================
    // Generation
    // ========================================================================

    pub async fn generate_action_prompt(
        &self,
        request: &ActionPromptRequest,
    ) -> Result<GeneratedPrompt> {
        let prompt_type = if request.step_index == 0 {
            PromptType::InitialAction
        } else {
            PromptType::ActionWithValidation
        };

        let validate_step = (prompt_type == PromptType::ActionWithValidation
            && request.options.include_validation)
            .then(|| (request.step_index - 1, None));

        let plan = GenerationPlan {
            prompt_type,
            target: StepTarget {
                session_id: &request.session_id,
                step_index: request.step_index,
                step_content: &request.step_content,
                total_steps: request.total_steps,
                kind: StepKind::Action,
            },
            options: request.options.clone(),
            key: PromptFingerprint::for_action(prompt_type, request),
            validate_step,
            investigation: None,
            investigation_context: None,
        };

        self.generate(plan).await.map_err(|e| {
            e.prefixed("Failed to generate action prompt")
                .for_session(&request.session_id)
                .at_step(request.step_index)
        })
    }

    /// Reflection always carries execution history and the validation rubric
    pub async fn generate_reflection_prompt(
        &self,
        request: &ReflectionPromptRequest,
    ) -> Result<GeneratedPrompt> {
        let options = PromptOptions {
            include_execution_history: true,
            include_validation: true,
            ..request.options.clone()
        };

        let plan = GenerationPlan {
            prompt_type: PromptType::ReflectionAndValidation,
            target: StepTarget {
                session_id: &request.session_id,
                step_index: request.next_step_index,
                step_content: &request.next_step_content,
                total_steps: request.total_steps,
                kind: StepKind::Reflection,
            },
            options,
            key: PromptFingerprint::for_reflection(request),
            validate_step: Some((
                request.completed_step_index,
                request.expected_outcome.as_deref(),
            )),
            investigation: None,
            investigation_context: None,
        };

        self.generate(plan).await.map_err(|e| {
            e.prefixed("Failed to generate reflection prompt")
                .for_session(&request.session_id)
                .at_step(request.next_step_index)
        })
    }

    pub async fn generate_investigation_prompt(
        &self,
        request: &InvestigationPromptRequest,
    ) -> Result<GeneratedPrompt> {
        let wrap = |e: PromptError| {
            e.prefixed("Failed to generate investigation prompt")
                .for_session(&request.session_id)
                .at_step(request.step_index)
        };

        if !self.config_snapshot().investigation.enable_investigation_prompts {
            return Err(wrap(PromptError::investigation_disabled()));
        }

        let prompt_type = PromptType::for_phase(request.phase);
        let plan = GenerationPlan {
            prompt_type,
            target: StepTarget {
                session_id: &request.session_id,
                step_index: request.step_index,
                step_content: &request.step_content,
                total_steps: request.total_steps,
                kind: StepKind::Investigation,
            },
            options: request.options.clone(),
            key: PromptFingerprint::for_investigation(request),
            validate_step: None,
            investigation: Some((request.phase, &request.available_tools)),
            investigation_context: None,
        };

        self.generate(plan).await.map_err(wrap)
    }

    pub async fn generate_action_with_investigation_prompt(
        &self,
        request: &ActionWithInvestigationRequest,
    ) -> Result<GeneratedPrompt> {
        let wrap = |e: PromptError| {
            e.prefixed("Failed to generate action with investigation prompt")
                .for_session(&request.session_id)
                .at_step(request.step_index)
        };

        if request.investigation_context.is_empty() {
            return Err(wrap(PromptError::investigation_context_unavailable(
                "Investigation context has no findings and no recommended action",
            )));
        }

        let plan = GenerationPlan {
            prompt_type: PromptType::ActionWithInvestigation,
            target: StepTarget {
                session_id: &request.session_id,
                step_index: request.step_index,
                step_content: &request.step_content,
                total_steps: request.total_steps,
                kind: StepKind::Action,
            },
            options: request.options.clone(),
            key: PromptFingerprint::for_action_with_investigation(request),
            validate_step: None,
            investigation: None,
            investigation_context: Some(&request.investigation_context),
        };

        self.generate(plan).await.map_err(wrap)
    }

    async fn generate(&self, plan: GenerationPlan<'_>) -> Result<GeneratedPrompt> {
        let started = Instant::now();
        let config = self.config_snapshot();
        let options = &plan.options;
        let session_id = plan.target.session_id;

        if options.use_cache {
            if let Some(cached) = self.cache.get(plan.key.as_str()) {
                tracing::debug!("Serving {} prompt for session {} from cache", plan.prompt_type, session_id);
                return Ok(cached);
            }
        }

        let template_id = options
            .template_id
            .as_deref()
            .unwrap_or(plan.prompt_type.default_template_id());
        let template = self.template(template_id)?;

        let mut context = self
            .context
            .build_context_section(&plan.target, options, &config.context)
            .await?;
        if let Some(investigation_context) = plan.investigation_context {
            context.investigation_context = Some(investigation_context.clone());
        }

        let validation = plan.validate_step.map(|(step, expected)| {
            self.builder
                .build_validation_section(session_id, step, expected)
        });

        let investigation = match plan.investigation {
            Some((phase, tools)) => {
                let inputs = InvestigationInputs {
                    previous_context: self.context.investigation_summary(session_id).await,
                    elements_discovered: self.context.discovered_element_count(session_id).await,
                };
                Some(self.investigation.build_investigation_section(
                    phase,
                    &config.investigation,
                    tools,
                    inputs,
                )?)
            }
            None => None,
        };

        let working_memory = (options.include_working_memory
            && config.context.working_memory_enabled)
            .then(|| {
                self.context
                    .build_working_memory_section(session_id, &config.context)
            })
            .flatten();

        let schema = resolve_response_schema(
            options.response_schema_override.as_ref(),
            self.schema_store.as_ref(),
        )
        .await?;

        let instructions = self.builder.build_instruction_section(
            plan.prompt_type,
            plan.target.step_content,
            options.reasoning_depth,
            validation.is_some(),
        );

        let built = self.builder.build_prompt_content(ContentRequest {
            prompt_type: plan.prompt_type,
            template: &template,
            context,
            instructions,
            validation,
            investigation,
            working_memory,
            schema: self.builder.build_schema_section(&schema.schema),
            examples: Some(self.builder.build_examples_section(plan.prompt_type)),
            custom_instructions: options.custom_instructions.as_deref(),
            completed_step_index: plan.validate_step.map(|(step, _)| step),
            investigation_summary: plan
                .investigation_context
                .map(|ctx| self.investigation.build_investigation_summary(ctx)),
        })?;

        let mut prompt = GeneratedPrompt {
            prompt_id: new_prompt_id(),
            session_id: session_id.to_string(),
            step_index: plan.target.step_index,
            prompt_type: plan.prompt_type,
            content: built.content,
            schema: schema.schema,
            generated_at: Utc::now(),
            metadata: PromptMetadata {
                template_id: template.id.clone(),
                template_version: template.version.clone(),
                generation_time_ms: 0,
                schema_version: Some(schema.version),
                schema_source: schema.source,
                quality_score: None,
                warnings: built.warnings,
            },
        };

        let validation_result = self.validator.validate_prompt_structure(&prompt);
        if !validation_result.is_valid {
            return Err(PromptError::validation_failed(format!(
                "Generated prompt failed validation: {}",
                validation_result.error_messages().join("; ")
            )));
        }
        prompt
            .metadata
            .warnings
            .extend(validation_result.warnings.into_iter().map(|w| w.message));

        if config.validation.quality_assessment_enabled {
            let assessment = self.validator.assess_prompt_quality(&prompt);
            prompt.metadata.quality_score = Some(assessment.overall_score);

            if assessment.overall_score < config.validation.minimum_quality_score {
                let message = format!(
                    "Prompt quality {:.2} is below the minimum of {:.2}",
                    assessment.overall_score, config.validation.minimum_quality_score
                );
                if config.validation.strict_quality_gate_enabled {
                    return Err(PromptError::validation_failed(message));
                }
                tracing::warn!("{} for session {}", message, session_id);
                prompt.metadata.warnings.push(message);
            }
        }

        prompt.metadata.generation_time_ms = started.elapsed().as_millis() as u64;

        if options.use_cache {
            self.cache.set(plan.key.as_str(), prompt.clone(), None);
        }

        tracing::info!(
            "Generated {} prompt {} for session {} step {} in {}ms",
            prompt.prompt_type,
            prompt.prompt_id,
            session_id,
            prompt.step_index,
            prompt.metadata.generation_time_ms
        );

        Ok(prompt)
    }

    // ========================================================================
    // Validation
    // ========================================================================

    pub fn validate_prompt_structure(&self, prompt: &GeneratedPrompt) -> PromptValidationResult {
        self.validator.validate_prompt_structure(prompt)
    }

    pub fn assess_prompt_quality(&self, prompt: &GeneratedPrompt) -> QualityAssessment {
        self.validator.assess_prompt_quality(prompt)
    }

    // ========================================================================
    // Templates
    // ========================================================================

    /// Registered templates, ordered by id
    pub fn get_prompt_templates(&self) -> Vec<PromptTemplate> {
        let templates = self.templates.read().unwrap_or_else(|e| e.into_inner());
        let mut list: Vec<PromptTemplate> = templates.values().map(|t| (**t).clone()).collect();
        list.sort_by(|a, b| a.id.cmp(&b.id));
        list
    }

    /// Register or replace a template. Cached prompts are dropped since they
    /// may have been rendered from the old version.
    pub fn update_prompt_template(&self, template: PromptTemplate) -> Result<()> {
        if !self.config_snapshot().template.custom_templates_enabled {
            return Err(PromptError::template_invalid(
                "Custom templates are disabled in configuration",
            ));
        }
        self.engine.validate(&template)?;

        let id = template.id.clone();
        let replaced = {
            let mut templates = self.templates.write().unwrap_or_else(|e| e.into_inner());
            templates.insert(id.clone(), Arc::new(template)).is_some()
        };
        self.cache.clear();

        tracing::info!(
            "{} prompt template {}",
            if replaced { "Replaced" } else { "Registered" },
            id
        );
        Ok(())
    }

    // ========================================================================
    // Configuration
    // ========================================================================

    pub fn get_config(&self) -> PromptManagerConfig {
        (*self.config_snapshot()).clone()
    }

    /// Merge a partial configuration document over the current one
    pub fn update_config(&self, patch: &Value) -> Result<PromptManagerConfig> {
        let merged = self.config_snapshot().merge(patch)?;
        self.install_config(merged.clone());
        Ok(merged)
    }

    pub fn import_config(&self, document: &str) -> Result<PromptManagerConfig> {
        let imported = self.config_snapshot().import(document)?;
        self.install_config(imported.clone());
        Ok(imported)
    }

    pub fn export_config(&self) -> Result<String> {
        self.config_snapshot().export()
    }

    /// Swap in a new configuration. Cached prompts were built under the old
    /// budgets and are dropped.
    fn install_config(&self, config: PromptManagerConfig) {
        self.cache.update_config(config.cache.clone());
        {
            let mut guard = self.config.write().unwrap_or_else(|e| e.into_inner());
            *guard = Arc::new(config);
        }
        self.cache.clear();
        tracing::info!("Prompt manager configuration updated");
    }

    // ========================================================================
    // Cache
    // ========================================================================

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    pub fn validate_cache_integrity(&self) -> bool {
        self.cache.validate_integrity()
    }

    pub fn perform_cache_maintenance(&self) -> usize {
        self.cache.perform_maintenance()
    }

    pub fn clear_cache(&self) {
        self.cache.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PromptErrorKind;
    use crate::manager::create_prompt_manager;
    use crate::models::SchemaSource;
    use serde_json::json;

    fn manager() -> PromptManager {
        create_prompt_manager(PromptManagerConfig::default(), None, None).unwrap()
    }

    #[tokio::test]
    async fn test_first_step_uses_initial_action() {
        let manager = manager();
        let prompt = manager
            .generate_action_prompt(&ActionPromptRequest::new("s1", 0, "Open the shop", 3))
            .await
            .unwrap();

        assert_eq!(prompt.prompt_type, PromptType::InitialAction);
        assert_eq!(prompt.metadata.template_id, "initial_action");
        assert_eq!(prompt.metadata.schema_source, SchemaSource::Fallback);
        assert!(prompt.content.validation_section.is_none());
        assert!(prompt.metadata.quality_score.is_some());
    }

    #[tokio::test]
    async fn test_later_step_with_validation() {
        let manager = manager();
        let request = ActionPromptRequest::new("s1", 2, "Add to cart", 3).with_options(PromptOptions {
            include_validation: true,
            ..Default::default()
        });
        let prompt = manager.generate_action_prompt(&request).await.unwrap();

        assert_eq!(prompt.prompt_type, PromptType::ActionWithValidation);
        let validation = prompt.content.validation_section.unwrap();
        assert_eq!(validation.last_step_index, 1);
        assert!(prompt.content.system_message.contains("VALIDATE THE PREVIOUS STEP FIRST"));
    }

    #[tokio::test]
    async fn test_identical_requests_hit_cache() {
        let manager = manager();
        let request = ActionPromptRequest::new("s1", 1, "Search for shoes", 3);
        let first = manager.generate_action_prompt(&request).await.unwrap();
        let second = manager.generate_action_prompt(&request).await.unwrap();

        assert_eq!(first.prompt_id, second.prompt_id);
        assert_eq!(manager.cache_stats().total_entries, 1);
    }

    #[tokio::test]
    async fn test_unknown_template_is_wrapped() {
        let manager = manager();
        let request = ActionPromptRequest::new("s1", 0, "Open the shop", 3).with_options(PromptOptions {
            template_id: Some("does_not_exist".to_string()),
            ..Default::default()
        });
        let err = manager.generate_action_prompt(&request).await.unwrap_err();

        assert_eq!(err.kind(), PromptErrorKind::TemplateNotFound);
        assert_eq!(
            err.to_string(),
            "Failed to generate action prompt: Template not found: does_not_exist"
        );
        assert_eq!(err.session_id(), Some("s1"));
        assert_eq!(err.step_index(), Some(0));
    }

    #[tokio::test]
    async fn test_reflection_validates_completed_step() {
        let manager = manager();
        let request = ReflectionPromptRequest::new("s1", 1, "Check out", 4)
            .with_expected_outcome("The cart shows one item");
        let prompt = manager.generate_reflection_prompt(&request).await.unwrap();

        assert_eq!(prompt.prompt_type, PromptType::ReflectionAndValidation);
        assert_eq!(prompt.step_index, 2);
        let validation = prompt.content.validation_section.as_ref().unwrap();
        assert_eq!(validation.expected_outcome, "The cart shows one item");
        assert!(prompt.content.system_message.contains("Decide whether step 2 achieved its goal"));
        assert!(!prompt.content.system_message.contains("{{"));
    }

    #[tokio::test]
    async fn test_investigation_disabled_wins() {
        let manager = manager();
        manager
            .update_config(&json!({ "investigation": { "enableInvestigationPrompts": false } }))
            .unwrap();

        for phase in InvestigationPhase::ALL {
            let request = InvestigationPromptRequest::new("s1", 0, "Find login", 2, phase)
                .with_tools(vec![InvestigationTool::TextExtraction]);
            let err = manager.generate_investigation_prompt(&request).await.unwrap_err();
            assert_eq!(err.kind(), PromptErrorKind::InvestigationDisabled);
        }
    }

    #[tokio::test]
    async fn test_investigation_prompt_has_section() {
        let manager = manager();
        let request = InvestigationPromptRequest::new(
            "s1",
            0,
            "Find login",
            2,
            InvestigationPhase::SelectorDetermination,
        );
        let prompt = manager.generate_investigation_prompt(&request).await.unwrap();

        assert_eq!(prompt.prompt_type, PromptType::InvestigationSelectorDetermination);
        let section = prompt.content.investigation_section.as_ref().unwrap();
        assert_eq!(section.strategy.primary, InvestigationTool::SubDomExtraction);
        assert!(prompt.content.system_message.contains("Selector Determination"));
    }

    #[tokio::test]
    async fn test_empty_investigation_context_rejected() {
        let manager = manager();
        let request = ActionWithInvestigationRequest::new(
            "s1",
            1,
            "Click login",
            3,
            InvestigationContext::default(),
        );
        let err = manager
            .generate_action_with_investigation_prompt(&request)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), PromptErrorKind::InvestigationContextUnavailable);
        assert!(err
            .to_string()
            .starts_with("Failed to generate action with investigation prompt: "));
    }

    #[test]
    fn test_template_update_validates() {
        let manager = manager();
        let mut template = manager.get_prompt_templates()[0].clone();
        template.body.push_str(" {{undeclared}}");
        let err = manager.update_prompt_template(template).unwrap_err();
        assert_eq!(err.kind(), PromptErrorKind::TemplateInvalid);
    }

    #[test]
    fn test_config_round_trip() {
        let manager = manager();
        let exported = manager.export_config().unwrap();
        let imported = manager.import_config(&exported).unwrap();
        assert_eq!(imported.cache.max_cache_size, 100);

        let err = manager
            .update_config(&json!({ "context": { "elementKnowledgeThreshold": 1.5 } }))
            .unwrap_err();
        assert_eq!(err.kind(), PromptErrorKind::ConfigInvalid);
        assert_eq!(manager.get_config().context.element_knowledge_threshold, 0.7);
    }
}
