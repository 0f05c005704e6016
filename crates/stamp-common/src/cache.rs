//! Key-value cache
//!
//! Small cache abstraction used for cross-request state: the ETH price feed
//! and the per-key rate limit windows. Redis in production, an in-memory
//! DashMap for tests and local development.

use crate::error::CacheError;
use async_trait::async_trait;
use dashmap::DashMap;
use redis::{aio::MultiplexedConnection, AsyncCommands, Client};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, instrument, warn};

/// Key-value cache with expiring entries
#[async_trait]
pub trait KeyValueCache: Send + Sync {
    /// Read a value, `None` when missing or expired
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError>;

    /// Write a value that expires after `ttl`
    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), CacheError>;

    /// Increment a counter, starting a new window of length `window` when the
    /// counter has no expiry yet. Returns the count after incrementing.
    async fn incr(&self, key: &str, window: Duration) -> Result<u64, CacheError>;
}

/// Redis-based cache
pub struct RedisCache {
    /// Redis client
    client: Client,
    /// Shared multiplexed connection
    connection: Arc<RwLock<Option<MultiplexedConnection>>>,
    /// Key prefix for cache entries
    prefix: String,
}

impl RedisCache {
    /// Connect to Redis
    pub async fn new(redis_url: &str) -> Result<Self, CacheError> {
        let client = Client::open(redis_url)
            .map_err(|e| CacheError::Connection(format!("Failed to create Redis client: {}", e)))?;

        let connection = client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| CacheError::Connection(format!("Failed to connect to Redis: {}", e)))?;

        Ok(Self {
            client,
            connection: Arc::new(RwLock::new(Some(connection))),
            prefix: "stamp".to_string(),
        })
    }

    /// Create cache with custom prefix
    pub fn with_prefix(mut self, prefix: &str) -> Self {
        self.prefix = prefix.to_string();
        self
    }

    fn key(&self, key: &str) -> String {
        format!("{}:{}", self.prefix, key)
    }

    /// Get a connection, reconnecting if the previous one was dropped
    async fn get_connection(&self) -> Result<MultiplexedConnection, CacheError> {
        let guard = self.connection.read().await;
        if let Some(conn) = guard.as_ref() {
            return Ok(conn.clone());
        }
        drop(guard);

        let mut guard = self.connection.write().await;
        if let Some(conn) = guard.as_ref() {
            return Ok(conn.clone());
        }

        let connection = self
            .client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| CacheError::Connection(format!("Failed to reconnect to Redis: {}", e)))?;

        *guard = Some(connection.clone());
        Ok(connection)
    }

    /// Forget the shared connection after a connection-level failure
    async fn reset_on_disconnect(&self, err: &redis::RedisError) {
        if err.is_connection_dropped() || err.is_io_error() {
            warn!("Redis connection lost: {}", err);
            *self.connection.write().await = None;
        }
    }
}

#[async_trait]
impl KeyValueCache for RedisCache {
    #[instrument(skip(self))]
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        let redis_key = self.key(key);
        let mut conn = self.get_connection().await?;

        match conn.get::<_, Option<String>>(&redis_key).await {
            Ok(value) => {
                debug!(key = %redis_key, hit = value.is_some(), "Cache get");
                Ok(value)
            }
            Err(e) => {
                self.reset_on_disconnect(&e).await;
                Err(e.into())
            }
        }
    }

    #[instrument(skip(self, value))]
    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), CacheError> {
        let redis_key = self.key(key);
        let mut conn = self.get_connection().await?;
        let ttl_secs = ttl.as_secs().max(1);

        if let Err(e) = conn.set_ex::<_, _, ()>(&redis_key, value, ttl_secs).await {
            self.reset_on_disconnect(&e).await;
            return Err(e.into());
        }

        debug!(key = %redis_key, ttl_secs, "Cache set");
        Ok(())
    }

    #[instrument(skip(self))]
    async fn incr(&self, key: &str, window: Duration) -> Result<u64, CacheError> {
        let redis_key = self.key(key);
        let mut conn = self.get_connection().await?;

        let (count, ttl) = match redis::pipe()
            .atomic()
            .incr(&redis_key, 1u64)
            .ttl(&redis_key)
            .query_async::<_, (u64, i64)>(&mut conn)
            .await
        {
            Ok(reply) => reply,
            Err(e) => {
                self.reset_on_disconnect(&e).await;
                return Err(e.into());
            }
        };

        // A counter left without a TTL by an earlier failed EXPIRE gets one here
        if window_needs_expiry(ttl) {
            let expired: redis::RedisResult<()> = redis::cmd("EXPIRE")
                .arg(&redis_key)
                .arg(window.as_secs().max(1))
                .query_async(&mut conn)
                .await;
            if let Err(e) = expired {
                self.reset_on_disconnect(&e).await;
                return Err(e.into());
            }
        }

        Ok(count)
    }
}

#[derive(Debug, Clone)]
struct Entry {
    value: String,
    expires_at: i64,
}

/// In-memory fallback cache using DashMap
pub struct InMemoryCache {
    entries: DashMap<String, Entry>,
    max_entries: usize,
}

impl Default for InMemoryCache {
    fn default() -> Self {
        Self::new(10_000)
    }
}

impl InMemoryCache {
    pub fn new(max_entries: usize) -> Self {
        Self {
            entries: DashMap::new(),
            max_entries,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn evict_if_full(&self, now: i64) {
        if self.entries.len() < self.max_entries {
            return;
        }
        self.entries.retain(|_, e| now < e.expires_at);

        if self.entries.len() >= self.max_entries {
            let soonest_expiring = self
                .entries
                .iter()
                .min_by_key(|e| e.expires_at)
                .map(|e| e.key().clone());
            if let Some(key) = soonest_expiring {
                self.entries.remove(&key);
            }
        }
    }
}

/// Whether a window counter needs its expiry set, given the `TTL` reply
/// (`-1` no expiry, `-2` missing key)
fn window_needs_expiry(ttl: i64) -> bool {
    ttl < 0
}

fn expiry(now: i64, ttl: Duration) -> i64 {
    now.saturating_add(i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX))
}

#[async_trait]
impl KeyValueCache for InMemoryCache {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        let now = chrono::Utc::now().timestamp_millis();
        Ok(self
            .entries
            .get(key)
            .filter(|e| now < e.expires_at)
            .map(|e| e.value.clone()))
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), CacheError> {
        let now = chrono::Utc::now().timestamp_millis();
        self.evict_if_full(now);
        self.entries.insert(
            key.to_string(),
            Entry {
                value: value.to_string(),
                expires_at: expiry(now, ttl),
            },
        );
        Ok(())
    }

    async fn incr(&self, key: &str, window: Duration) -> Result<u64, CacheError> {
        let now = chrono::Utc::now().timestamp_millis();
        self.evict_if_full(now);

        let mut entry = self.entries.entry(key.to_string()).or_insert_with(|| Entry {
            value: "0".to_string(),
            expires_at: expiry(now, window),
        });
        if now >= entry.expires_at {
            entry.value = "0".to_string();
            entry.expires_at = expiry(now, window);
        }

        let count = entry.value.parse::<u64>().unwrap_or(0) + 1;
        entry.value = count.to_string();
        Ok(count)
    }
}

/// Hash a secret (API key, token) into a stable cache key segment
pub fn hashed_key(namespace: &str, secret: &str) -> String {
    format!("{}:{}", namespace, blake3::hash(secret.as_bytes()).to_hex())
}
