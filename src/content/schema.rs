use serde_json::{json, Value};
use std::sync::Arc;

use crate::context::SchemaStore;
use crate::error::{PromptError, Result};
use crate::models::{DecisionAction, SchemaSource};
use crate::validation::validate_schema_integration;

pub const CANONICAL_SCHEMA_VERSION: &str = "1.0.0";

/// Response schema used whenever the schema store cannot supply one
pub fn canonical_response_schema() -> Value {
    let actions: Vec<&str> = DecisionAction::ALL.iter().map(|a| a.as_str()).collect();

    json!({
        "type": "object",
        "properties": {
            "decision": {
                "type": "object",
                "properties": {
                    "action": { "type": "string", "enum": actions },
                    "message": { "type": "string" }
                },
                "required": ["action", "message"]
            },
            "reasoning": {
                "type": "object",
                "properties": {
                    "analysis": { "type": "string" },
                    "rationale": { "type": "string" },
                    "expectedOutcome": { "type": "string" },
                    "confidence": { "type": "number", "minimum": 0, "maximum": 1 }
                },
                "required": ["analysis", "rationale", "expectedOutcome", "confidence"]
            },
            "commands": {
                "type": "array",
                "items": {
                    "type": "object",
                    "properties": {
                        "action": { "type": "string" },
                        "selector": { "type": "string" },
                        "value": { "type": "string" }
                    },
                    "required": ["action"]
                }
            }
        },
        "required": ["decision", "reasoning", "commands"]
    })
}

/// Schema chosen for a prompt and where it came from
#[derive(Debug, Clone)]
pub struct ResolvedSchema {
    pub schema: Value,
    pub source: SchemaSource,
    pub version: String,
}

impl ResolvedSchema {
    pub fn fallback() -> Self {
        Self {
            schema: canonical_response_schema(),
            source: SchemaSource::Fallback,
            version: CANONICAL_SCHEMA_VERSION.to_string(),
        }
    }
}

/// Pick the response schema: caller override, then the schema store, then
/// the canonical schema. Only a bad override is an error.
pub async fn resolve_response_schema(
    schema_override: Option<&Value>,
    store: Option<&Arc<dyn SchemaStore>>,
) -> Result<ResolvedSchema> {
    if let Some(schema) = schema_override {
        if !validate_schema_integration(schema) {
            return Err(PromptError::schema_generation_failed(
                "Response schema override must be an object schema with decision, reasoning and commands properties",
            ));
        }
        return Ok(ResolvedSchema {
            schema: schema.clone(),
            source: SchemaSource::Override,
            version: "override".to_string(),
        });
    }

    let Some(store) = store else {
        return Ok(ResolvedSchema::fallback());
    };

    match store.get_response_schema().await {
        Ok(schema) if store.validate_schema_compatibility(&schema) && validate_schema_integration(&schema) => {
            Ok(ResolvedSchema {
                schema,
                source: SchemaSource::Store,
                version: store.get_schema_version(),
            })
        }
        Ok(_) => {
            tracing::warn!("Schema store returned an incompatible response schema, using canonical schema");
            Ok(ResolvedSchema::fallback())
        }
        Err(e) => {
            tracing::warn!("Schema store unavailable ({}), using canonical schema", e);
            Ok(ResolvedSchema::fallback())
        }
    }
}

/// Names listed under the schema's `required` key
pub fn required_fields(schema: &Value) -> Vec<String> {
    schema
        .get("required")
        .and_then(Value::as_array)
        .map(|fields| {
            fields
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}
