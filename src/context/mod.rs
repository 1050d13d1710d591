pub mod history;
pub mod integrator;
pub mod memory_store;
pub mod store;

pub use history::{render_history_digest, truncate_command_results, truncate_extracted_value};
pub use integrator::{ContextIntegrator, StepTarget};
pub use memory_store::MemoryContextStore;
pub use store::{ContextStore, SchemaStore};
