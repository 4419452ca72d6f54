// Fetch cache - keyed by exact request URL with time-based invalidation
use crate::application::errors::FetchError;
use crate::application::json_source::JsonSource;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::Instant;

pub const DEFAULT_CACHE_DURATION: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, Default)]
pub struct FetchOptions {
    /// How long a cached payload stays valid. Falls back to the cache default.
    pub duration: Option<Duration>,
    pub force_refresh: bool,
    pub headers: Vec<(String, String)>,
}

#[derive(Debug, Clone)]
struct CacheEntry {
    payload: Arc<Value>,
    fetched_at: Instant,
}

/// Last successful payload per URL.
///
/// Concurrent misses for the same URL are not coalesced: each caller fetches
/// and the last response to complete wins. Capacity is bounded by evicting the
/// oldest entry, and [`FetchCache::sweep`] drops entries past a maximum age.
pub struct FetchCache {
    source: Arc<dyn JsonSource>,
    entries: Mutex<HashMap<String, CacheEntry>>,
    max_entries: usize,
    default_duration: Duration,
}

impl FetchCache {
    pub fn new(source: Arc<dyn JsonSource>, max_entries: usize) -> Self {
        Self {
            source,
            entries: Mutex::new(HashMap::new()),
            max_entries: max_entries.max(1),
            default_duration: DEFAULT_CACHE_DURATION,
        }
    }

    pub fn with_default_duration(mut self, duration: Duration) -> Self {
        self.default_duration = duration;
        self
    }

    pub async fn get(&self, url: &str, options: &FetchOptions) -> Result<Arc<Value>, FetchError> {
        if !options.force_refresh {
            let duration = options.duration.unwrap_or(self.default_duration);
            if let Some(payload) = self.lookup(url, duration) {
                tracing::debug!(url, "serving from cache");
                return Ok(payload);
            }
        }

        let payload = Arc::new(self.source.get_json(url, &options.headers).await?);
        self.store(url, Arc::clone(&payload));
        Ok(payload)
    }

    fn lookup(&self, url: &str, duration: Duration) -> Option<Arc<Value>> {
        self.lock()
            .get(url)
            .filter(|entry| entry.fetched_at.elapsed() < duration)
            .map(|entry| Arc::clone(&entry.payload))
    }

    fn store(&self, url: &str, payload: Arc<Value>) {
        let mut entries = self.lock();
        if !entries.contains_key(url) && entries.len() >= self.max_entries {
            let oldest = entries
                .iter()
                .min_by_key(|(_, entry)| entry.fetched_at)
                .map(|(key, _)| key.clone());
            if let Some(key) = oldest {
                tracing::debug!(url = %key, "evicting oldest cache entry");
                entries.remove(&key);
            }
        }
        entries.insert(
            url.to_string(),
            CacheEntry {
                payload,
                fetched_at: Instant::now(),
            },
        );
    }

    pub fn invalidate(&self, url: &str) -> bool {
        self.lock().remove(url).is_some()
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    /// Drop entries older than `max_age`. Returns how many were removed.
    pub fn sweep(&self, max_age: Duration) -> usize {
        let mut entries = self.lock();
        let before = entries.len();
        entries.retain(|_, entry| entry.fetched_at.elapsed() < max_age);
        before - entries.len()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn fetched_at(&self, url: &str) -> Option<Instant> {
        self.lock().get(url).map(|entry| entry.fetched_at)
    }

    /// Periodically sweep stale entries for the lifetime of the process.
    pub fn spawn_sweeper(self: &Arc<Self>, every: Duration, max_age: Duration) -> JoinHandle<()> {
        let cache = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let removed = cache.sweep(max_age);
                if removed > 0 {
                    tracing::info!(removed, remaining = cache.len(), "swept stale cache entries");
                }
            }
        })
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, CacheEntry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
