use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::env;

use crate::error::{PromptError, Result};
use crate::models::{FilteringLevel, InvestigationTool, MemoryDetailLevel};

pub const DEFAULT_CACHE_TTL_MS: u64 = 300_000;
pub const DEFAULT_MAX_CACHE_SIZE: usize = 100;
pub const DEFAULT_MAX_DOM_SIZE: usize = 100_000;
pub const DEFAULT_MAX_HISTORY_ITEMS: usize = 10;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TemplateConfig {
    /// Allows callers to replace templates at runtime
    pub custom_templates_enabled: bool,
    pub default_template_version: String,
}

impl Default for TemplateConfig {
    fn default() -> Self {
        Self {
            custom_templates_enabled: true,
            default_template_version: "1.0.0".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ContextConfig {
    pub max_history_items: usize,
    /// DOM snapshots larger than this (in characters) are omitted
    pub max_dom_size: usize,
    pub previous_dom_enabled: bool,
    pub filtered_context_enabled: bool,
    pub default_filtering_level: FilteringLevel,
    pub max_filtered_context_size: usize,
    pub working_memory_enabled: bool,
    pub working_memory_detail_level: MemoryDetailLevel,
    pub element_knowledge_threshold: f64,
    pub max_extracted_value_length: usize,
    pub max_history_digest_chars: usize,
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            max_history_items: DEFAULT_MAX_HISTORY_ITEMS,
            max_dom_size: DEFAULT_MAX_DOM_SIZE,
            previous_dom_enabled: false,
            filtered_context_enabled: false,
            default_filtering_level: FilteringLevel::Standard,
            max_filtered_context_size: 8_000,
            working_memory_enabled: true,
            working_memory_detail_level: MemoryDetailLevel::Detailed,
            element_knowledge_threshold: 0.7,
            max_extracted_value_length: 1_000,
            max_history_digest_chars: 4_000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ValidationConfig {
    pub quality_assessment_enabled: bool,
    /// Reject prompts scoring below `minimum_quality_score` instead of warning
    pub strict_quality_gate_enabled: bool,
    pub minimum_quality_score: f64,
    pub minimum_confidence_threshold: f64,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            quality_assessment_enabled: true,
            strict_quality_gate_enabled: false,
            minimum_quality_score: 0.75,
            minimum_confidence_threshold: 0.6,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ToolSettings {
    pub enabled: bool,
    pub timeout_ms: u64,
    pub max_retries: u32,
    pub quality_threshold: f64,
}

impl Default for ToolSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            timeout_ms: 10_000,
            max_retries: 2,
            quality_threshold: 0.7,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct InvestigationConfig {
    pub enable_investigation_prompts: bool,
    pub enabled_investigation_tools: Vec<InvestigationTool>,
    pub tool_priority_order: Vec<InvestigationTool>,
    pub tool_settings: BTreeMap<InvestigationTool, ToolSettings>,
    pub max_investigation_rounds: u32,
}

impl Default for InvestigationConfig {
    fn default() -> Self {
        Self {
            enable_investigation_prompts: true,
            enabled_investigation_tools: InvestigationTool::ALL.to_vec(),
            tool_priority_order: vec![
                InvestigationTool::ScreenshotAnalysis,
                InvestigationTool::TextExtraction,
                InvestigationTool::SubDomExtraction,
                InvestigationTool::FullDomRetrieval,
            ],
            tool_settings: InvestigationTool::ALL
                .iter()
                .map(|tool| (*tool, ToolSettings::default()))
                .collect(),
            max_investigation_rounds: 5,
        }
    }
}

impl InvestigationConfig {
    /// Tool is listed as enabled and not switched off in its settings
    pub fn is_tool_enabled(&self, tool: InvestigationTool) -> bool {
        self.enabled_investigation_tools.contains(&tool)
            && self
                .tool_settings
                .get(&tool)
                .map(|s| s.enabled)
                .unwrap_or(true)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CacheConfig {
    pub cache_enabled: bool,
    pub cache_ttl_ms: u64,
    pub max_cache_size: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            cache_enabled: true,
            cache_ttl_ms: DEFAULT_CACHE_TTL_MS,
            max_cache_size: DEFAULT_MAX_CACHE_SIZE,
        }
    }
}

/// Full engine configuration. Partial documents are merged over the
/// defaults and validated before they take effect.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PromptManagerConfig {
    pub template: TemplateConfig,
    pub context: ContextConfig,
    pub validation: ValidationConfig,
    pub investigation: InvestigationConfig,
    pub cache: CacheConfig,
}

impl PromptManagerConfig {
    /// Defaults overlaid with `TASKER_PROMPT_*` environment variables
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Some(enabled) = env_parse::<bool>("TASKER_PROMPT_CACHE_ENABLED") {
            config.cache.cache_enabled = enabled;
        }
        if let Some(ttl) = env_parse::<u64>("TASKER_PROMPT_CACHE_TTL_MS") {
            config.cache.cache_ttl_ms = ttl;
        }
        if let Some(size) = env_parse::<usize>("TASKER_PROMPT_MAX_CACHE_SIZE") {
            config.cache.max_cache_size = size.max(1);
        }
        if let Some(size) = env_parse::<usize>("TASKER_PROMPT_MAX_DOM_SIZE") {
            config.context.max_dom_size = size;
        }
        if let Some(enabled) = env_parse::<bool>("TASKER_PROMPT_INVESTIGATION_ENABLED") {
            config.investigation.enable_investigation_prompts = enabled;
        }

        config
    }

    /// Merge a partial camelCase document over this config and validate the result
    pub fn merge(&self, patch: &Value) -> Result<Self> {
        if !patch.is_object() {
            return Err(PromptError::config_invalid(
                "Configuration update must be a JSON object",
            ));
        }

        let mut merged = serde_json::to_value(self).map_err(|e| {
            PromptError::config_invalid(format!("Failed to serialize configuration: {}", e))
        })?;
        deep_merge(&mut merged, patch);

        validate_document(&merged)?;

        serde_json::from_value(merged)
            .map_err(|e| PromptError::config_invalid(format!("Invalid configuration: {}", e)))
    }

    pub fn validate(&self) -> Result<()> {
        let value = serde_json::to_value(self).map_err(|e| {
            PromptError::config_invalid(format!("Failed to serialize configuration: {}", e))
        })?;
        validate_document(&value)
    }

    pub fn export(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(|e| {
            PromptError::config_invalid(format!("Failed to export configuration: {}", e))
        })
    }

    /// Parse an exported document and merge it over this config
    pub fn import(&self, document: &str) -> Result<Self> {
        let patch: Value = serde_json::from_str(document).map_err(|e| {
            PromptError::config_invalid(format!("Malformed configuration document: {}", e))
        })?;
        self.merge(&patch)
    }
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    env::var(name).ok().and_then(|v| v.trim().parse().ok())
}

/// Recursively overlay `patch` onto `base`. Objects merge key by key,
/// everything else is replaced.
pub fn deep_merge(base: &mut Value, patch: &Value) {
    match (base, patch) {
        (Value::Object(base_map), Value::Object(patch_map)) => {
            for (key, patch_value) in patch_map {
                match base_map.get_mut(key) {
                    Some(existing) if existing.is_object() && patch_value.is_object() => {
                        deep_merge(existing, patch_value);
                    }
                    _ => {
                        base_map.insert(key.clone(), patch_value.clone());
                    }
                }
            }
        }
        (base, patch) => *base = patch.clone(),
    }
}

fn validate_document(doc: &Value) -> Result<()> {
    check_flags("", doc)?;

    let section = |name: &str| doc.get(name).and_then(Value::as_object);

    if let Some(context) = section("context") {
        for key in ["maxDomSize", "maxHistoryItems", "maxFilteredContextSize"] {
            check_non_negative(context, key)?;
        }
        check_unit_interval(context, "elementKnowledgeThreshold")?;
        check_one_of(
            context,
            "defaultFilteringLevel",
            &["minimal", "standard", "detailed"],
        )?;
        check_one_of(
            context,
            "workingMemoryDetailLevel",
            &["summary", "detailed", "comprehensive"],
        )?;
    }

    if let Some(validation) = section("validation") {
        check_unit_interval(validation, "minimumConfidenceThreshold")?;
        check_unit_interval(validation, "minimumQualityScore")?;
    }

    if let Some(investigation) = section("investigation") {
        for key in ["enabledInvestigationTools", "toolPriorityOrder"] {
            check_tool_list(investigation, key)?;
        }
        if let Some(settings) = investigation.get("toolSettings") {
            check_tool_settings(settings)?;
        }
    }

    if let Some(cache) = section("cache") {
        check_non_negative(cache, "cacheTtlMs")?;
        if let Some(size) = cache.get("maxCacheSize") {
            if size.as_f64().map(|s| s < 1.0).unwrap_or(true) {
                return Err(PromptError::config_invalid(
                    "maxCacheSize must be a number greater than or equal to 1",
                ));
            }
        }
    }

    Ok(())
}

/// Every `*Enabled` / `enable*` key must hold a boolean
fn check_flags(path: &str, value: &Value) -> Result<()> {
    if let Value::Object(map) = value {
        for (key, child) in map {
            if is_flag_key(key) && !child.is_boolean() {
                return Err(PromptError::config_invalid(format!(
                    "{}{} must be a boolean",
                    path, key
                )));
            }
            if child.is_object() {
                check_flags(&format!("{}{}.", path, key), child)?;
            }
        }
    }
    Ok(())
}

// `enabledInvestigationTools` is a list, not a flag
fn is_flag_key(key: &str) -> bool {
    key.ends_with("Enabled")
        || key
            .strip_prefix("enable")
            .and_then(|rest| rest.chars().next())
            .map(|c| c.is_ascii_uppercase())
            .unwrap_or(false)
}

fn check_non_negative(map: &Map<String, Value>, key: &str) -> Result<()> {
    match map.get(key) {
        None => Ok(()),
        Some(v) if v.as_f64().map(|n| n >= 0.0).unwrap_or(false) => Ok(()),
        Some(_) => Err(PromptError::config_invalid(format!(
            "{} must be a number greater than or equal to 0",
            key
        ))),
    }
}

fn check_unit_interval(map: &Map<String, Value>, key: &str) -> Result<()> {
    match map.get(key) {
        None => Ok(()),
        Some(v) if v.as_f64().map(|n| (0.0..=1.0).contains(&n)).unwrap_or(false) => Ok(()),
        Some(_) => Err(PromptError::config_invalid(format!(
            "{} must be between 0 and 1",
            key
        ))),
    }
}

fn check_one_of(map: &Map<String, Value>, key: &str, allowed: &[&str]) -> Result<()> {
    match map.get(key) {
        None => Ok(()),
        Some(Value::String(s)) if allowed.contains(&s.as_str()) => Ok(()),
        Some(_) => Err(PromptError::config_invalid(format!(
            "{} must be one of: {}",
            key,
            allowed.join(", ")
        ))),
    }
}

fn check_tool_name(name: &str, key: &str) -> Result<()> {
    name.parse::<InvestigationTool>().map(|_| ()).map_err(|_| {
        PromptError::config_invalid(format!("{} contains unknown tool: {}", key, name))
    })
}

fn check_tool_list(map: &Map<String, Value>, key: &str) -> Result<()> {
    let Some(value) = map.get(key) else {
        return Ok(());
    };
    let list = value
        .as_array()
        .ok_or_else(|| PromptError::config_invalid(format!("{} must be an array", key)))?;
    for item in list {
        let name = item.as_str().ok_or_else(|| {
            PromptError::config_invalid(format!("{} must contain tool names", key))
        })?;
        check_tool_name(name, key)?;
    }
    Ok(())
}

fn check_tool_settings(settings: &Value) -> Result<()> {
    let map = settings
        .as_object()
        .ok_or_else(|| PromptError::config_invalid("toolSettings must be an object"))?;

    for (tool, entry) in map {
        check_tool_name(tool, "toolSettings")?;
        let entry = entry.as_object().ok_or_else(|| {
            PromptError::config_invalid(format!("toolSettings.{} must be an object", tool))
        })?;
        if let Some(enabled) = entry.get("enabled") {
            if !enabled.is_boolean() {
                return Err(PromptError::config_invalid(format!(
                    "toolSettings.{}.enabled must be a boolean",
                    tool
                )));
            }
        }
        check_non_negative(entry, "timeoutMs")?;
        check_non_negative(entry, "maxRetries")?;
        check_unit_interval(entry, "qualityThreshold")?;
    }
    Ok(())
}
