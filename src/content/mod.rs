pub mod builder;
pub mod schema;

pub use builder::{BuiltContent, ContentBuilder, ContentRequest};
pub use schema::{
    canonical_response_schema, required_fields, resolve_response_schema, ResolvedSchema,
    CANONICAL_SCHEMA_VERSION,
};
