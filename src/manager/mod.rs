pub mod factory;
pub mod legacy;
pub mod orchestrator;

pub use factory::{create_prompt_manager, PromptManagerBuilder};
pub use legacy::LegacyStepPrompts;
pub use orchestrator::PromptManager;
