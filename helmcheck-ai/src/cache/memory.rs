//! Bounded in-memory cache with LRU eviction and absolute TTL

use super::{Cache, CacheStats};
use crate::protocol::Response;
use crate::providers::error::{ProviderError, ProviderResult};
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, warn};

/// Fixed bookkeeping cost charged to every entry
const ENTRY_OVERHEAD: u64 = 128;

struct CacheEntry {
    response: Response,
    size: u64,
    /// `None` when the TTL is too large to represent
    expires_at: Option<Instant>,
    /// Position in the recency index
    tick: u64,
}

impl CacheEntry {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| now >= at)
    }
}

#[derive(Default)]
struct CacheState {
    entries: HashMap<String, CacheEntry>,
    /// Recency index: lowest tick is least recently used
    recency: BTreeMap<u64, String>,
    next_tick: u64,
    size: u64,
    hits: u64,
    misses: u64,
    evictions: u64,
}

impl CacheState {
    fn bump(&mut self) -> u64 {
        self.next_tick += 1;
        self.next_tick
    }

    fn remove(&mut self, key: &str) -> Option<CacheEntry> {
        let entry = self.entries.remove(key)?;
        self.recency.remove(&entry.tick);
        self.size -= entry.size;
        Some(entry)
    }

    fn evict_oldest(&mut self) -> bool {
        let Some((_, key)) = self.recency.pop_first() else {
            return false;
        };
        if let Some(entry) = self.entries.remove(&key) {
            self.size -= entry.size;
            self.evictions += 1;
            debug!(key = %key, size = entry.size, "evicted least recently used cache entry");
        }
        true
    }

    fn get(&mut self, key: &str, now: Instant) -> Option<Response> {
        let expired = match self.entries.get(key) {
            None => {
                self.misses += 1;
                return None;
            }
            Some(entry) => entry.is_expired(now),
        };
        if expired {
            self.remove(key);
            self.misses += 1;
            return None;
        }

        let tick = self.bump();
        let entry = self.entries.get_mut(key)?;
        self.recency.remove(&entry.tick);
        entry.tick = tick;
        self.recency.insert(tick, key.to_string());
        self.hits += 1;

        let mut copy = entry.response.clone();
        copy.cached = true;
        Some(copy)
    }

    fn remove_expired(&mut self, now: Instant) -> usize {
        let expired: Vec<String> = self
            .entries
            .iter()
            .filter(|(_, entry)| entry.is_expired(now))
            .map(|(key, _)| key.clone())
            .collect();
        for key in &expired {
            self.remove(key);
        }
        expired.len()
    }
}

/// Approximate memory footprint of a stored response
fn entry_size(key: &str, response: &Response) -> ProviderResult<u64> {
    let mut size = key.len() + response.id.len() + response.content.len() + response.provider.len();
    size += response
        .metadata
        .iter()
        .map(|(k, v)| k.len() + v.len())
        .sum::<usize>();
    if let Some(data) = &response.structured_data {
        size += serde_json::to_vec(data)
            .map_err(|e| ProviderError::Cache {
                operation: "set".to_string(),
                reason: format!("cannot size structured data: {}", e),
            })?
            .len();
    }
    Ok(size as u64 + ENTRY_OVERHEAD)
}

/// Thread-safe LRU cache bounded by a byte budget
///
/// Expiry is absolute from the moment of `set`; reads never extend it.
pub struct MemoryCache {
    state: Mutex<CacheState>,
    max_size: u64,
}

impl MemoryCache {
    /// Create a cache holding at most `max_size` accounted bytes
    pub fn new(max_size: u64) -> Self {
        Self {
            state: Mutex::new(CacheState::default()),
            max_size,
        }
    }

    /// Bytes currently accounted to live entries
    pub fn size(&self) -> u64 {
        self.state.lock().size
    }

    pub fn count(&self) -> usize {
        self.state.lock().entries.len()
    }

    pub fn max_size(&self) -> u64 {
        self.max_size
    }

    /// Remove every expired entry, returning how many were dropped
    pub fn cleanup_expired(&self) -> usize {
        let removed = self.state.lock().remove_expired(Instant::now());
        if removed > 0 {
            debug!(removed, "swept expired cache entries");
        }
        removed
    }

    /// Sweep expired entries every `interval` on the current tokio runtime
    ///
    /// The task stops when the returned handle is dropped or the cache is freed.
    pub fn spawn_cleanup(self: &Arc<Self>, interval: Duration) -> CleanupHandle {
        let cache: Weak<MemoryCache> = Arc::downgrade(self);
        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                match cache.upgrade() {
                    Some(cache) => {
                        cache.cleanup_expired();
                    }
                    None => break,
                }
            }
        });
        CleanupHandle { task }
    }
}

impl Cache for MemoryCache {
    fn get(&self, key: &str) -> Option<Response> {
        self.state.lock().get(key, Instant::now())
    }

    fn set(&self, key: &str, response: &Response, ttl: Duration) -> ProviderResult<()> {
        let size = entry_size(key, response)?;
        if size > self.max_size {
            warn!(
                key = %key,
                size,
                max_size = self.max_size,
                "rejecting cache entry larger than cache capacity"
            );
            return Err(ProviderError::Cache {
                operation: "set".to_string(),
                reason: format!(
                    "entry of {} bytes exceeds cache capacity of {} bytes",
                    size, self.max_size
                ),
            });
        }

        let mut state = self.state.lock();
        state.remove(key);
        while state.size + size > self.max_size {
            if !state.evict_oldest() {
                break;
            }
        }

        let mut stored = response.clone();
        stored.cached = false;
        let tick = state.bump();
        state.recency.insert(tick, key.to_string());
        state.size += size;
        state.entries.insert(
            key.to_string(),
            CacheEntry {
                response: stored,
                size,
                expires_at: Instant::now().checked_add(ttl),
                tick,
            },
        );
        Ok(())
    }

    fn delete(&self, key: &str) -> bool {
        self.state.lock().remove(key).is_some()
    }

    fn clear(&self) {
        let mut state = self.state.lock();
        state.entries.clear();
        state.recency.clear();
        state.size = 0;
    }

    fn stats(&self) -> CacheStats {
        let state = self.state.lock();
        let lookups = state.hits + state.misses;
        let count = state.entries.len();
        CacheStats {
            hits: state.hits,
            misses: state.misses,
            evictions: state.evictions,
            size: state.size,
            max_size: self.max_size,
            count,
            hit_rate: if lookups == 0 {
                0.0
            } else {
                state.hits as f64 / lookups as f64 * 100.0
            },
            average_item_size: if count == 0 { 0 } else { state.size / count as u64 },
        }
    }
}

/// Background sweep task; aborted on drop
#[derive(Debug)]
pub struct CleanupHandle {
    task: JoinHandle<()>,
}

impl CleanupHandle {
    /// Stop the sweep now rather than at drop
    pub fn stop(self) {
        self.task.abort();
    }
}

impl Drop for CleanupHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}
