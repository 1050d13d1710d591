//! Request-scoped prompt cache.
//!
//! The cache is best-effort: no operation returns an error or panics. A
//! poisoned lock or any other internal fault degrades to a miss, `false`, or
//! zeroed stats so that the caller simply regenerates the prompt.

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use crate::config::CacheConfig;
use crate::models::GeneratedPrompt;

#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub key: String,
    pub prompt: GeneratedPrompt,
    pub created_at: DateTime<Utc>,
    pub last_accessed: DateTime<Utc>,
    pub access_count: u64,
    pub ttl_ms: u64,
    pub expires_at: DateTime<Utc>,
    /// Serialized size of the prompt in bytes
    size_bytes: usize,
    /// Logical access clock, bumped with `last_accessed`; orders entries
    /// even when their timestamps tie
    tick: u64,
}

impl CacheEntry {
    fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheStats {
    pub total_entries: usize,
    pub hit_rate: f64,
    pub memory_usage: usize,
    pub oldest_entry: Option<DateTime<Utc>>,
    pub newest_entry: Option<DateTime<Utc>>,
    pub average_generation_time: f64,
}

/// Storage for generated prompts keyed by request fingerprint
pub trait PromptCache: Send + Sync {
    fn get(&self, key: &str) -> Option<GeneratedPrompt>;

    /// Store a prompt; `ttl_ms` falls back to the configured TTL
    fn set(&self, key: &str, prompt: GeneratedPrompt, ttl_ms: Option<u64>);

    fn delete(&self, key: &str) -> bool;

    fn clear(&self);

    fn stats(&self) -> CacheStats;

    fn validate_integrity(&self) -> bool;

    /// Drop expired entries, then least recently used ones over capacity.
    /// Returns how many entries were removed.
    fn perform_maintenance(&self) -> usize;

    fn update_config(&self, config: CacheConfig);
}

struct CacheState {
    entries: HashMap<String, CacheEntry>,
    hits: u64,
    misses: u64,
    tick: u64,
    config: CacheConfig,
}

impl CacheState {
    fn next_tick(&mut self) -> u64 {
        self.tick += 1;
        self.tick
    }

    fn evict_lru(&mut self) -> Option<String> {
        let key = self
            .entries
            .values()
            .min_by_key(|e| e.tick)
            .map(|e| e.key.clone())?;
        self.entries.remove(&key);
        tracing::debug!("Evicted least recently used prompt {}", key);
        Some(key)
    }

    fn evict_over_capacity(&mut self) -> usize {
        let mut removed = 0;
        while self.entries.len() > self.config.max_cache_size {
            if self.evict_lru().is_none() {
                break;
            }
            removed += 1;
        }
        removed
    }
}

/// In-process LRU cache with lazy TTL expiry, guarded by one mutex
pub struct MemoryPromptCache {
    state: Mutex<CacheState>,
}

impl MemoryPromptCache {
    pub fn new(config: CacheConfig) -> Self {
        Self {
            state: Mutex::new(CacheState {
                entries: HashMap::new(),
                hits: 0,
                misses: 0,
                tick: 0,
                config,
            }),
        }
    }

    fn lock(&self) -> Option<MutexGuard<'_, CacheState>> {
        match self.state.lock() {
            Ok(guard) => Some(guard),
            Err(_) => {
                tracing::warn!("Prompt cache lock poisoned; treating cache as unavailable");
                None
            }
        }
    }

    pub fn len(&self) -> usize {
        self.lock().map(|s| s.entries.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for MemoryPromptCache {
    fn default() -> Self {
        Self::new(CacheConfig::default())
    }
}

impl PromptCache for MemoryPromptCache {
    fn get(&self, key: &str) -> Option<GeneratedPrompt> {
        let mut state = self.lock()?;
        if !state.config.cache_enabled {
            return None;
        }

        let now = Utc::now();
        match state.entries.get(key).map(|e| e.is_expired(now)) {
            None => {
                state.misses += 1;
                return None;
            }
            Some(true) => {
                state.entries.remove(key);
                state.misses += 1;
                tracing::debug!("Cached prompt {} expired", key);
                return None;
            }
            Some(false) => {}
        }

        let tick = state.next_tick();
        state.hits += 1;
        let entry = state.entries.get_mut(key)?;
        entry.last_accessed = now;
        entry.access_count += 1;
        entry.tick = tick;
        Some(entry.prompt.clone())
    }

    fn set(&self, key: &str, prompt: GeneratedPrompt, ttl_ms: Option<u64>) {
        let Some(mut state) = self.lock() else {
            return;
        };
        if !state.config.cache_enabled || state.config.max_cache_size == 0 {
            return;
        }

        if !state.entries.contains_key(key) {
            while state.entries.len() >= state.config.max_cache_size {
                if state.evict_lru().is_none() {
                    break;
                }
            }
        }

        let now = Utc::now();
        let ttl_ms = ttl_ms.unwrap_or(state.config.cache_ttl_ms);
        let expires_at = i64::try_from(ttl_ms)
            .ok()
            .and_then(|ms| now.checked_add_signed(Duration::milliseconds(ms)))
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        let size_bytes = serde_json::to_vec(&prompt).map(|b| b.len()).unwrap_or(0);
        let tick = state.next_tick();

        state.entries.insert(
            key.to_string(),
            CacheEntry {
                key: key.to_string(),
                prompt,
                created_at: now,
                last_accessed: now,
                access_count: 0,
                ttl_ms,
                expires_at,
                size_bytes,
                tick,
            },
        );
    }

    fn delete(&self, key: &str) -> bool {
        self.lock()
            .map(|mut s| s.entries.remove(key).is_some())
            .unwrap_or(false)
    }

    fn clear(&self) {
        if let Some(mut state) = self.lock() {
            state.entries.clear();
            state.hits = 0;
            state.misses = 0;
        }
    }

    fn stats(&self) -> CacheStats {
        let Some(state) = self.lock() else {
            return CacheStats::default();
        };
        if state.entries.is_empty() {
            return CacheStats::default();
        }

        let lookups = state.hits + state.misses;
        let hit_rate = if lookups == 0 {
            0.0
        } else {
            state.hits as f64 / lookups as f64
        };

        let total_generation: u64 = state
            .entries
            .values()
            .map(|e| e.prompt.metadata.generation_time_ms)
            .sum();

        CacheStats {
            total_entries: state.entries.len(),
            hit_rate,
            memory_usage: state.entries.values().map(|e| e.size_bytes).sum(),
            oldest_entry: state.entries.values().map(|e| e.created_at).min(),
            newest_entry: state.entries.values().map(|e| e.created_at).max(),
            average_generation_time: total_generation as f64 / state.entries.len() as f64,
        }
    }

    fn validate_integrity(&self) -> bool {
        let Some(state) = self.lock() else {
            return false;
        };
        let now = Utc::now();
        state.entries.iter().all(|(key, entry)| {
            entry.key == *key
                && !entry.prompt.prompt_id.trim().is_empty()
                && entry.created_at <= now
        })
    }

    fn perform_maintenance(&self) -> usize {
        let Some(mut state) = self.lock() else {
            return 0;
        };

        let now = Utc::now();
        let before = state.entries.len();
        state.entries.retain(|_, entry| !entry.is_expired(now));
        let expired = before - state.entries.len();
        let evicted = state.evict_over_capacity();

        if expired + evicted > 0 {
            tracing::info!(
                "Prompt cache maintenance removed {} expired and {} excess entries",
                expired,
                evicted
            );
        }
        expired + evicted
    }

    fn update_config(&self, config: CacheConfig) {
        if let Some(mut state) = self.lock() {
            state.config = config;
            state.evict_over_capacity();
        }
    }
}
