use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client};

use crate::config::Config;

/// Redis-backed JSON cache. Every operation is best-effort: a cache built
/// with [`Cache::disabled`] (or one whose connection failed at startup)
/// behaves as a permanent miss.
#[derive(Clone)]
pub struct Cache {
    conn: Option<ConnectionManager>,
    prefix: String,
    configured: bool,
}

impl Cache {
    pub async fn new(config: &Config) -> Self {
        if !config.redis.enabled {
            tracing::info!("Redis disabled; club directory will not be cached");
            return Self::disabled();
        }

        let prefix = config.redis.key_prefix.clone();
        let client = match Client::open(config.redis_url()) {
            Ok(client) => client,
            Err(e) => {
                tracing::warn!("Invalid Redis URL, continuing without cache: {e}");
                return Self::offline(prefix);
            }
        };
        match ConnectionManager::new(client).await {
            Ok(conn) => Self {
                conn: Some(conn),
                prefix,
                configured: true,
            },
            Err(e) => {
                tracing::warn!("Redis unavailable, continuing without cache: {e}");
                Self::offline(prefix)
            }
        }
    }

    pub fn disabled() -> Self {
        Self {
            conn: None,
            prefix: String::new(),
            configured: false,
        }
    }

    /// Redis was asked for but could not be reached.
    pub fn offline(prefix: impl Into<String>) -> Self {
        Self {
            conn: None,
            prefix: prefix.into(),
            configured: true,
        }
    }

    /// Whether Redis was configured, reachable or not.
    pub fn is_configured(&self) -> bool {
        self.configured
    }

    fn key(&self, k: &str) -> String {
        format!("{}{}", self.prefix, k)
    }

    pub async fn get(&self, key: &str) -> Option<String> {
        let mut conn = self.conn.clone()?;
        redis::cmd("GET")
            .arg(self.key(key))
            .query_async::<_, Option<String>>(&mut conn)
            .await
            .ok()
            .flatten()
    }

    pub async fn get_json<T: serde::de::DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.get(key)
            .await
            .and_then(|s| serde_json::from_str(&s).ok())
    }

    pub async fn set(&self, key: &str, value: &str, ttl_secs: u64) {
        let Some(mut conn) = self.conn.clone() else {
            return;
        };
        let k = self.key(key);
        let result: Result<(), _> = if ttl_secs > 0 {
            conn.set_ex(&k, value, ttl_secs).await
        } else {
            conn.set(&k, value).await
        };
        if let Err(e) = result {
            tracing::warn!("Cache write failed for {k}: {e}");
        }
    }

    pub async fn set_json<T: serde::Serialize>(&self, key: &str, value: &T, ttl_secs: u64) {
        if let Ok(json) = serde_json::to_string(value) {
            self.set(key, &json, ttl_secs).await;
        }
    }

    pub async fn del(&self, key: &str) {
        let Some(mut conn) = self.conn.clone() else {
            return;
        };
        let _: Result<(), _> = conn.del(self.key(key)).await;
    }

    pub async fn health_check(&self) -> bool {
        let Some(mut conn) = self.conn.clone() else {
            return false;
        };
        redis::cmd("PING")
            .query_async::<_, String>(&mut conn)
            .await
            .is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn disabled_cache_always_misses() {
        let cache = Cache::disabled();
        cache.set("clubs:directory", "[]", 60).await;
        assert_eq!(cache.get("clubs:directory").await, None);
        assert!(cache.get_json::<Vec<String>>("clubs:directory").await.is_none());
        assert!(!cache.health_check().await);
        assert!(!cache.is_configured());
    }

    #[tokio::test]
    async fn unreachable_redis_stays_configured() {
        let mut config = Config::from_env();
        config.redis.enabled = true;
        config.redis.host = "not a host".into();
        let cache = Cache::new(&config).await;
        assert!(cache.is_configured());
        assert!(!cache.health_check().await);
    }
}
