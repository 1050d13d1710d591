pub mod validator;

pub use validator::{validate_schema_integration, PromptValidator, MANDATORY_SECTIONS};
