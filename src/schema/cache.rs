use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, info};

use super::SchemaDescriptor;

pub const DEFAULT_TTL: Duration = Duration::from_secs(300);

#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub key: String,
    pub descriptor: Arc<SchemaDescriptor>,
    pub created_at: Instant,
}

impl CacheEntry {
    fn is_fresh(&self, key: &str, ttl: Duration, now: Instant) -> bool {
        self.key == key && now.saturating_duration_since(self.created_at) < ttl
    }
}

/// Time-bounded memo of the last retrieved schema. Holds exactly one entry;
/// every write replaces it wholesale.
pub struct SchemaCache {
    ttl: Duration,
    entry: Mutex<Option<CacheEntry>>,
}

impl SchemaCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entry: Mutex::new(None),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub async fn get(&self, key: &str) -> Option<Arc<SchemaDescriptor>> {
        let entry = self.entry.lock().await;
        Self::lookup(&entry, key, self.ttl)
    }

    pub async fn put(&self, key: &str, descriptor: SchemaDescriptor) -> Arc<SchemaDescriptor> {
        let mut entry = self.entry.lock().await;
        Self::replace(&mut entry, key, descriptor)
    }

    /// Drops the entry if it was stored under `key`.
    pub async fn invalidate(&self, key: &str) {
        let mut entry = self.entry.lock().await;
        if entry.as_ref().is_some_and(|e| e.key == key) {
            *entry = None;
            info!("Schema cache entry '{}' invalidated", key);
        }
    }

    pub async fn clear(&self) {
        *self.entry.lock().await = None;
        info!("Schema cache cleared");
    }

    /// Returns the cached descriptor for `key`, or runs `fetch` and stores its
    /// result. The lock is held for the whole check-fetch-store sequence, so
    /// concurrent callers never fetch twice within one window. A failed or
    /// abandoned fetch leaves the previous entry untouched.
    pub async fn get_or_try_fetch<F, Fut, E>(
        &self,
        key: &str,
        fetch: F,
    ) -> Result<Arc<SchemaDescriptor>, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<SchemaDescriptor, E>>,
    {
        let mut entry = self.entry.lock().await;
        if let Some(hit) = Self::lookup(&entry, key, self.ttl) {
            info!(
                "Using cached schema ({} tables, ttl {}s)",
                hit.len(),
                self.ttl.as_secs()
            );
            return Ok(hit);
        }

        let descriptor = fetch().await?;
        Ok(Self::replace(&mut entry, key, descriptor))
    }

    fn lookup(entry: &Option<CacheEntry>, key: &str, ttl: Duration) -> Option<Arc<SchemaDescriptor>> {
        entry
            .as_ref()
            .filter(|e| e.is_fresh(key, ttl, Instant::now()))
            .map(|e| Arc::clone(&e.descriptor))
    }

    fn replace(
        entry: &mut Option<CacheEntry>,
        key: &str,
        descriptor: SchemaDescriptor,
    ) -> Arc<SchemaDescriptor> {
        let descriptor = Arc::new(descriptor);
        debug!("Storing schema under '{}' ({} tables)", key, descriptor.len());
        *entry = Some(CacheEntry {
            key: key.to_string(),
            descriptor: Arc::clone(&descriptor),
            created_at: Instant::now(),
        });
        descriptor
    }
}

impl Default for SchemaCache {
    fn default() -> Self {
        Self::new(DEFAULT_TTL)
    }
}
