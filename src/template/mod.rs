pub mod engine;
pub mod library;

pub use engine::{
    is_truthy, PromptTemplate, TemplateEngine, TemplateVariable, TemplateVariables, VariableType,
};
pub use library::default_templates;
