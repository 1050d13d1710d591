pub mod context;
pub mod investigation;
pub mod memory;
pub mod prompt;
pub mod requests;
pub mod sections;
pub mod validation;

pub use context::*;
pub use investigation::*;
pub use memory::*;
pub use prompt::*;
pub use requests::*;
pub use sections::*;
pub use validation::*;
