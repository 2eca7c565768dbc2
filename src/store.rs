//! Combat storage
//!
//! Combats are served from a short-TTL read-through cache keyed by channel
//! id, so repeated lookups within one invocation see the same instance.
//! Commits are explicit and only happen at run boundaries, never
//! mid-interpretation; cross-process races resolve last-write-wins.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::{Mutex, RwLock};
use tracing::debug;

use crate::initiative::Combat;

/// Backing document store for combats.
pub trait CombatStore {
    fn load(
        &self,
        channel_id: &str,
    ) -> impl std::future::Future<Output = anyhow::Result<Option<Combat>>> + Send;
    fn save(
        &self,
        combat: &Combat,
    ) -> impl std::future::Future<Output = anyhow::Result<()>> + Send;
}

/// In-memory store; documents round-trip through their serialized form.
#[derive(Debug, Default)]
pub struct MemoryStore {
    docs: RwLock<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CombatStore for MemoryStore {
    async fn load(&self, channel_id: &str) -> anyhow::Result<Option<Combat>> {
        let docs = self.docs.read().await;
        match docs.get(channel_id) {
            Some(raw) => {
                let mut combat: Combat = serde_json::from_str(raw)?;
                combat.restore_owners();
                Ok(Some(combat))
            }
            None => Ok(None),
        }
    }

    async fn save(&self, combat: &Combat) -> anyhow::Result<()> {
        let raw = serde_json::to_string(combat)?;
        self.docs
            .write()
            .await
            .insert(combat.channel_id.clone(), raw);
        Ok(())
    }
}

struct CacheEntry {
    combat: Arc<Mutex<Combat>>,
    fetched_at: Instant,
}

/// Read-through cache over a [`CombatStore`].
pub struct CombatCache<S> {
    store: S,
    ttl: Duration,
    entries: RwLock<HashMap<String, CacheEntry>>,
}

impl<S: CombatStore> CombatCache<S> {
    pub fn new(store: S, ttl: Duration) -> Self {
        Self {
            store,
            ttl,
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Fetches the combat for a channel. A fresh cache hit returns the same
    /// shared instance; a stale or missing entry reads through to the
    /// store.
    pub async fn get(&self, channel_id: &str) -> anyhow::Result<Option<Arc<Mutex<Combat>>>> {
        {
            let entries = self.entries.read().await;
            if let Some(entry) = entries.get(channel_id) {
                if entry.fetched_at.elapsed() < self.ttl {
                    return Ok(Some(entry.combat.clone()));
                }
            }
        }

        debug!(channel = channel_id, "combat cache miss");
        let Some(combat) = self.store.load(channel_id).await? else {
            return Ok(None);
        };
        let combat = Arc::new(Mutex::new(combat));
        self.entries.write().await.insert(
            channel_id.to_string(),
            CacheEntry {
                combat: combat.clone(),
                fetched_at: Instant::now(),
            },
        );
        Ok(Some(combat))
    }

    /// Inserts a newly created combat into the cache and store.
    pub async fn put(&self, combat: Combat) -> anyhow::Result<Arc<Mutex<Combat>>> {
        self.store.save(&combat).await?;
        let channel_id = combat.channel_id.clone();
        let combat = Arc::new(Mutex::new(combat));
        self.entries.write().await.insert(
            channel_id,
            CacheEntry {
                combat: combat.clone(),
                fetched_at: Instant::now(),
            },
        );
        Ok(combat)
    }

    /// Writes the cached combat for a channel back to the store.
    /// Last-write-wins; there is no distributed lock.
    pub async fn commit(&self, channel_id: &str) -> anyhow::Result<()> {
        let entry = {
            let entries = self.entries.read().await;
            entries.get(channel_id).map(|e| e.combat.clone())
        };
        if let Some(combat) = entry {
            let combat = combat.lock().await;
            self.store.save(&combat).await?;
        }
        Ok(())
    }

    /// Drops the cached entry for a channel.
    pub async fn invalidate(&self, channel_id: &str) {
        self.entries.write().await.remove(channel_id);
    }
}
