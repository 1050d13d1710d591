//! Prompt orchestration engine for Tasker browser automation agents.
//!
//! Builds the prompts that drive the agent's investigate, act and reflect
//! loop from session context, templates and the response schema.

pub mod cache;
pub mod config;
pub mod content;
pub mod context;
pub mod error;
pub mod investigation;
pub mod manager;
pub mod models;
pub mod template;
pub mod validation;

pub use config::PromptManagerConfig;
pub use context::{ContextStore, MemoryContextStore, SchemaStore};
pub use error::{PromptError, PromptErrorKind, Result};
pub use manager::{create_prompt_manager, LegacyStepPrompts, PromptManager, PromptManagerBuilder};
