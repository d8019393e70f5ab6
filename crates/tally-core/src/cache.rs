//! Completion caching keyed by request fingerprint

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use crate::ai::CompletionResult;
use crate::pacing::{Clock, SystemClock};

/// Default entry limit for `MemoryCache`
pub const DEFAULT_CACHE_CAPACITY: usize = 1000;

/// Storage for successful completions
pub trait CompletionCache: Send + Sync {
    fn get(&self, fingerprint: &str) -> Option<CompletionResult>;
    fn put(&self, fingerprint: &str, result: &CompletionResult);
}

/// Cache that stores nothing
#[derive(Debug, Clone, Copy, Default)]
pub struct NullCache;

impl CompletionCache for NullCache {
    fn get(&self, _fingerprint: &str) -> Option<CompletionResult> {
        None
    }

    fn put(&self, _fingerprint: &str, _result: &CompletionResult) {}
}

/// In-process cache with a time-to-live and an entry limit
pub struct MemoryCache {
    ttl: Duration,
    capacity: usize,
    clock: Arc<dyn Clock>,
    entries: Mutex<HashMap<String, (Instant, CompletionResult)>>,
}

impl MemoryCache {
    pub fn new(ttl: Duration) -> Self {
        Self::with_clock(ttl, Arc::new(SystemClock))
    }

    pub fn with_clock(ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            ttl,
            capacity: DEFAULT_CACHE_CAPACITY,
            clock,
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity.max(1);
        self
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, (Instant, CompletionResult)>> {
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl CompletionCache for MemoryCache {
    fn get(&self, fingerprint: &str) -> Option<CompletionResult> {
        let now = self.clock.now();
        let mut entries = self.lock();

        let lookup = entries
            .get(fingerprint)
            .map(|(stored, result)| (now.saturating_duration_since(*stored) < self.ttl, result));

        match lookup {
            Some((true, result)) => Some(result.clone()),
            Some((false, _)) => {
                entries.remove(fingerprint);
                None
            }
            None => None,
        }
    }

    fn put(&self, fingerprint: &str, result: &CompletionResult) {
        let now = self.clock.now();
        let ttl = self.ttl;
        let mut entries = self.lock();

        if entries.len() >= self.capacity && !entries.contains_key(fingerprint) {
            entries.retain(|_, (stored, _)| now.saturating_duration_since(*stored) < ttl);
        }
        if entries.len() >= self.capacity && !entries.contains_key(fingerprint) {
            let oldest = entries
                .iter()
                .min_by_key(|(_, (stored, _))| *stored)
                .map(|(key, _)| key.clone());
            if let Some(key) = oldest {
                entries.remove(&key);
            }
        }

        entries.insert(fingerprint.to_string(), (now, result.clone()));
    }
}
