pub mod generator;
pub mod tools;

pub use generator::{InvestigationGenerator, InvestigationInputs};
pub use tools::{describe_tools, tool_descriptor};
