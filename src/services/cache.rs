use anyhow::Result;
use moka::future::Cache;
use std::sync::Arc;
use std::time::Duration;

/// Short-lived claim cache used to suppress duplicate webhook deliveries.
///
/// The in-process tier is authoritative for a single process; when Redis is reachable a
/// `SET NX EX` claim is also taken so that sibling processes share the window. Claims never
/// outlive `ttl` and nothing survives a restart of both tiers.
pub struct CacheService {
    redis: Option<redis::aio::ConnectionManager>,
    memory: Arc<Cache<String, ()>>,
    ttl: Duration,
}

impl CacheService {
    pub async fn new(redis_url: Option<&str>, ttl: Duration) -> Result<Self> {
        let redis = match redis_url {
            Some(url) => match redis::Client::open(url) {
                Ok(client) => match client.get_connection_manager().await {
                    Ok(conn) => {
                        tracing::info!("Redis connected successfully");
                        Some(conn)
                    }
                    Err(e) => {
                        tracing::warn!("Redis connection failed: {}, using memory cache only", e);
                        None
                    }
                },
                Err(e) => {
                    tracing::warn!("Redis client creation failed: {}, using memory cache only", e);
                    None
                }
            },
            None => None,
        };

        Ok(Self::with_redis(redis, ttl))
    }

    pub fn memory_only(ttl: Duration) -> Self {
        Self::with_redis(None, ttl)
    }

    fn with_redis(redis: Option<redis::aio::ConnectionManager>, ttl: Duration) -> Self {
        let memory = Arc::new(
            Cache::builder()
                .max_capacity(10_000)
                .time_to_live(ttl)
                .build(),
        );

        Self { redis, memory, ttl }
    }

    /// Takes the claim for `key`. Returns `false` when it is already held inside the window.
    pub async fn try_claim(&self, key: &str) -> bool {
        let entry = self.memory.entry(key.to_string()).or_insert(()).await;
        if !entry.is_fresh() {
            tracing::debug!("Memory claim already held for key: {}", key);
            return false;
        }

        if let Some(mut redis) = self.redis.clone() {
            let claimed = redis::cmd("SET")
                .arg(key)
                .arg(1)
                .arg("NX")
                .arg("EX")
                .arg(self.ttl.as_secs().max(1))
                .query_async::<_, Option<String>>(&mut redis)
                .await;
            match claimed {
                Ok(Some(_)) => {}
                Ok(None) => {
                    tracing::debug!("Redis claim already held for key: {}", key);
                    return false;
                }
                // Redis trouble degrades to the in-process window.
                Err(e) => tracing::warn!("Redis claim error: {}", e),
            }
        }

        true
    }

    pub fn has_redis(&self) -> bool {
        self.redis.is_some()
    }

    pub async fn ping(&self) -> Result<bool> {
        if let Some(mut redis) = self.redis.clone() {
            match redis::cmd("PING").query_async::<_, String>(&mut redis).await {
                Ok(_) => Ok(true),
                Err(_) => Ok(false),
            }
        } else {
            Ok(false)
        }
    }
}
