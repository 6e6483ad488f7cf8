//! Visitor view dedup window.
//!
//! A view counts once per visitor fingerprint inside the configured TTL.
//! The check is best-effort: when the backend fails, the caller counts
//! the view anyway rather than blocking reads on cache health.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use redis::aio::ConnectionManager;
use uuid::Uuid;

use crate::error::Result;

/// First-sighting probe over a TTL window.
#[async_trait]
pub trait ViewDedup: Send + Sync {
    /// Returns `true` when `key` was not seen within `ttl`, recording the
    /// sighting as a side effect. Backend failures surface as errors; the
    /// caller decides the fallback.
    async fn check_and_mark(&self, key: &str, ttl: Duration) -> Result<bool>;
}

/// Visitor fingerprint key: post, session, client address.
pub fn view_key(post_id: Uuid, session_id: &str, client_addr: &str) -> String {
    format!("view:{}:{}:{}", post_id, session_id, client_addr)
}

// ========== In-memory backend ==========

/// In-process window for tests and single-node deployments. Entries store
/// their own deadline; cloning shares the underlying map.
#[derive(Debug, Default, Clone)]
pub struct MemoryViewDedup {
    seen: Arc<DashMap<String, Instant>>,
}

impl MemoryViewDedup {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop entries past their deadline. Returns how many were removed.
    pub fn sweep_expired(&self) -> usize {
        let now = Instant::now();
        let before = self.seen.len();
        self.seen.retain(|_, deadline| *deadline > now);
        before - self.seen.len()
    }

    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }
}

#[async_trait]
impl ViewDedup for MemoryViewDedup {
    async fn check_and_mark(&self, key: &str, ttl: Duration) -> Result<bool> {
        let now = Instant::now();
        match self.seen.entry(key.to_string()) {
            Entry::Occupied(mut entry) => {
                if *entry.get() <= now {
                    entry.insert(now + ttl);
                    Ok(true)
                } else {
                    Ok(false)
                }
            }
            Entry::Vacant(entry) => {
                entry.insert(now + ttl);
                Ok(true)
            }
        }
    }
}

// ========== Redis backend ==========

/// Shared window across instances. SET NX EX folds the probe and the mark
/// into one round trip, and Redis expires entries on its own.
#[derive(Clone)]
pub struct RedisViewDedup {
    conn: ConnectionManager,
}

impl RedisViewDedup {
    pub fn new(conn: ConnectionManager) -> Self {
        Self { conn }
    }

    pub async fn connect(url: &str) -> Result<Self> {
        let client = redis::Client::open(url)?;
        let conn = ConnectionManager::new(client).await?;
        tracing::info!("connected to redis for view dedup");
        Ok(Self { conn })
    }
}

#[async_trait]
impl ViewDedup for RedisViewDedup {
    async fn check_and_mark(&self, key: &str, ttl: Duration) -> Result<bool> {
        let mut conn = self.conn.clone();
        // EX rejects zero, so the window is at least one second.
        let ttl_secs = ttl.as_secs().max(1);
        let reply: Option<String> = redis::cmd("SET")
            .arg(key)
            .arg(1)
            .arg("NX")
            .arg("EX")
            .arg(ttl_secs)
            .query_async(&mut conn)
            .await?;
        Ok(reply.is_some())
    }
}
