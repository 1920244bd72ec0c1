//! Pluggable session persistence.
//!
//! `SessionStore` is `async_trait`-based, following the pack's convention for
//! `dyn`-safe async traits (`armature-session::SessionStore`). `InMemorySessionStore`
//! is the bundled reference implementation; alternative backends (Redis, etc.) can
//! implement the same trait without touching the pipeline.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::Value;
use tokio::sync::Notify;
use tokio::task::JoinHandle;

pub type SessionData = HashMap<String, Value>;

pub const DEFAULT_TTL: Duration = Duration::from_secs(30 * 60);
const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Returns an independent copy of the stored data, or `None` if missing/expired.
    async fn load(&self, id: &str) -> Option<SessionData>;

    /// Stores an independent copy with `expiresAt = now + (ttl or default)`.
    async fn save(&self, id: &str, data: SessionData, ttl: Option<Duration>);

    /// Idempotent removal.
    async fn destroy(&self, id: &str);

    /// Extends expiry only if the entry exists and is unexpired; no-op otherwise.
    async fn touch(&self, id: &str, ttl: Option<Duration>);

    /// Drops expired entries. May no-op for stores with intrinsic TTL.
    async fn cleanup(&self);

    /// Releases timers and underlying resources.
    async fn dispose(&self);
}

struct Entry {
    data: SessionData,
    expires_at: Instant,
}

impl Entry {
    fn is_expired(&self) -> bool {
        Instant::now() >= self.expires_at
    }
}

/// In-memory `SessionStore` with a background sweep task for expired entries.
pub struct InMemorySessionStore {
    entries: DashMap<String, Entry>,
    default_ttl: Duration,
    sweep_handle: std::sync::Mutex<Option<JoinHandle<()>>>,
    shutdown: std::sync::Arc<Notify>,
}

impl InMemorySessionStore {
    pub fn new(default_ttl: Duration) -> std::sync::Arc<Self> {
        let store = std::sync::Arc::new(Self {
            entries: DashMap::new(),
            default_ttl,
            sweep_handle: std::sync::Mutex::new(None),
            shutdown: std::sync::Arc::new(Notify::new()),
        });
        store.spawn_sweeper(DEFAULT_SWEEP_INTERVAL);
        store
    }

    fn spawn_sweeper(self: &std::sync::Arc<Self>, interval: Duration) {
        let weak = std::sync::Arc::downgrade(self);
        let shutdown = self.shutdown.clone();
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        match weak.upgrade() {
                            Some(store) => store.cleanup().await,
                            None => break,
                        }
                    }
                    _ = shutdown.notified() => break,
                }
            }
        });
        *self.sweep_handle.lock().unwrap() = Some(handle);
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn load(&self, id: &str) -> Option<SessionData> {
        let entry = self.entries.get(id)?;
        if entry.is_expired() {
            drop(entry);
            self.entries.remove(id);
            return None;
        }
        Some(entry.data.clone())
    }

    async fn save(&self, id: &str, data: SessionData, ttl: Option<Duration>) {
        let expires_at = Instant::now() + ttl.unwrap_or(self.default_ttl);
        self.entries.insert(id.to_string(), Entry { data, expires_at });
    }

    async fn destroy(&self, id: &str) {
        self.entries.remove(id);
    }

    async fn touch(&self, id: &str, ttl: Option<Duration>) {
        if let Some(mut entry) = self.entries.get_mut(id) {
            if !entry.is_expired() {
                entry.expires_at = Instant::now() + ttl.unwrap_or(self.default_ttl);
            }
        }
    }

    async fn cleanup(&self) {
        self.entries.retain(|_, entry| !entry.is_expired());
    }

    async fn dispose(&self) {
        self.shutdown.notify_one();
        if let Some(handle) = self.sweep_handle.lock().unwrap().take() {
            handle.abort();
        }
        self.entries.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn save_then_load_is_an_independent_copy() {
        let store = InMemorySessionStore::new(DEFAULT_TTL);
        let mut data = SessionData::new();
        data.insert("k".into(), json!("v"));
        store.save("id1", data.clone(), None).await;

        let mut loaded = store.load("id1").await.unwrap();
        loaded.insert("k".into(), json!("mutated"));

        let reloaded = store.load("id1").await.unwrap();
        assert_eq!(reloaded.get("k"), Some(&json!("v")));
    }

    #[tokio::test]
    async fn expiry() {
        let store = InMemorySessionStore::new(Duration::from_millis(10));
        store.save("id1", SessionData::new(), None).await;
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(store.load("id1").await.is_none());
    }

    #[tokio::test]
    async fn destroy_is_idempotent() {
        let store = InMemorySessionStore::new(DEFAULT_TTL);
        store.destroy("missing").await;
        store.save("id1", SessionData::new(), None).await;
        store.destroy("id1").await;
        store.destroy("id1").await;
        assert!(store.load("id1").await.is_none());
    }
}
