pub mod fingerprint;
pub mod prompt_cache;

pub use fingerprint::PromptFingerprint;
pub use prompt_cache::{CacheEntry, CacheStats, MemoryPromptCache, PromptCache};
