//! Pool registry keyed by normalized connection string.
//!
//! Pools are shared across sequential invocations for the lifetime of the
//! adapter. Growth is bounded by an injectable [`EvictionPolicy`]; the
//! entry touched by the current lookup is never evicted by that lookup.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use tracing::{debug, info};

use crate::config::PoolSettings;

/// Canonical cache key: trimmed, `postgresql://` folded into `postgres://`.
pub fn normalize_key(raw: &str) -> String {
    let trimmed = raw.trim();
    match trimmed.strip_prefix("postgresql://") {
        Some(rest) => format!("postgres://{rest}"),
        None => trimmed.to_string(),
    }
}

/// Bookkeeping the policies decide on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryStats {
    pub key: String,
    pub last_used: Instant,
}

/// Chooses which cached pools to drop after a lookup.
pub trait EvictionPolicy: Send + Sync + fmt::Debug {
    /// Returns the keys to evict. `entries` excludes the entry just touched.
    fn victims(&self, entries: &[EntryStats], now: Instant) -> Vec<String>;
}

/// Keeps every pool until the process exits.
#[derive(Debug, Default)]
pub struct Unbounded;

impl EvictionPolicy for Unbounded {
    fn victims(&self, _entries: &[EntryStats], _now: Instant) -> Vec<String> {
        Vec::new()
    }
}

/// Keeps at most `capacity` pools, dropping the least recently used.
#[derive(Debug)]
pub struct LruCapacity {
    pub capacity: usize,
}

impl EvictionPolicy for LruCapacity {
    fn victims(&self, entries: &[EntryStats], _now: Instant) -> Vec<String> {
        // The touched entry always stays, so it occupies one slot.
        let keep = self.capacity.saturating_sub(1);
        if entries.len() <= keep {
            return Vec::new();
        }
        let mut by_age: Vec<&EntryStats> = entries.iter().collect();
        by_age.sort_by_key(|e| e.last_used);
        by_age
            .into_iter()
            .take(entries.len() - keep)
            .map(|e| e.key.clone())
            .collect()
    }
}

/// Drops pools that have not been used for `ttl`.
#[derive(Debug)]
pub struct IdleTtl {
    pub ttl: Duration,
}

impl EvictionPolicy for IdleTtl {
    fn victims(&self, entries: &[EntryStats], now: Instant) -> Vec<String> {
        entries
            .iter()
            .filter(|e| now.saturating_duration_since(e.last_used) >= self.ttl)
            .map(|e| e.key.clone())
            .collect()
    }
}

/// Applies an idle TTL first, then a capacity bound on what remains.
#[derive(Debug)]
pub struct IdleThenCapacity {
    pub idle: IdleTtl,
    pub capacity: LruCapacity,
}

impl EvictionPolicy for IdleThenCapacity {
    fn victims(&self, entries: &[EntryStats], now: Instant) -> Vec<String> {
        let mut victims = self.idle.victims(entries, now);
        let remaining: Vec<EntryStats> = entries
            .iter()
            .filter(|e| !victims.contains(&e.key))
            .cloned()
            .collect();
        victims.extend(self.capacity.victims(&remaining, now));
        victims
    }
}

/// Picks the policy described by the pool settings.
pub fn policy_from_settings(settings: &PoolSettings) -> Box<dyn EvictionPolicy> {
    match (settings.idle_ttl, settings.cache_capacity) {
        (None, None) => Box::new(Unbounded),
        (None, Some(capacity)) => Box::new(LruCapacity { capacity }),
        (Some(ttl), None) => Box::new(IdleTtl { ttl }),
        (Some(ttl), Some(capacity)) => Box::new(IdleThenCapacity {
            idle: IdleTtl { ttl },
            capacity: LruCapacity { capacity },
        }),
    }
}

struct Entry<P> {
    pool: Arc<P>,
    last_used: Instant,
}

/// Cache of shared pools.
///
/// Generic over the pool type so the caching rules can be exercised
/// without a database.
pub struct PoolRegistry<P> {
    entries: Mutex<HashMap<String, Entry<P>>>,
    policy: Box<dyn EvictionPolicy>,
}

impl<P> PoolRegistry<P> {
    pub fn new(policy: Box<dyn EvictionPolicy>) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            policy,
        }
    }

    /// Returns the pool for `key`, creating it with `make` on a miss.
    pub fn get_or_try_insert<E>(
        &self,
        key: &str,
        make: impl FnOnce(&str) -> Result<P, E>,
    ) -> Result<Arc<P>, E> {
        self.get_or_try_insert_at(key, Instant::now(), make)
    }

    /// Same as [`get_or_try_insert`](Self::get_or_try_insert) with an explicit clock.
    pub fn get_or_try_insert_at<E>(
        &self,
        key: &str,
        now: Instant,
        make: impl FnOnce(&str) -> Result<P, E>,
    ) -> Result<Arc<P>, E> {
        let key = normalize_key(key);
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);

        let pool = match entries.get_mut(&key) {
            Some(entry) => {
                entry.last_used = now;
                debug!("reusing cached pool");
                Arc::clone(&entry.pool)
            }
            None => {
                let pool = Arc::new(make(&key)?);
                entries.insert(
                    key.clone(),
                    Entry {
                        pool: Arc::clone(&pool),
                        last_used: now,
                    },
                );
                debug!(cached = entries.len(), "created pool");
                pool
            }
        };

        let others: Vec<EntryStats> = entries
            .iter()
            .filter(|(k, _)| **k != key)
            .map(|(k, e)| EntryStats {
                key: k.clone(),
                last_used: e.last_used,
            })
            .collect();
        let victims = self.policy.victims(&others, now);
        for victim in victims {
            if entries.remove(&victim).is_some() {
                info!(policy = ?self.policy, "evicted cached pool");
            }
        }
        Ok(pool)
    }

    /// Drops the cached pool for `key`, if any.
    pub fn remove(&self, key: &str) -> bool {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&normalize_key(key))
            .is_some()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(&normalize_key(key))
    }

    pub fn len(&self) -> usize {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
