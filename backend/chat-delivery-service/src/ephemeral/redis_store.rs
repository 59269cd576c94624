use async_trait::async_trait;
use redis::AsyncCommands;
use std::time::Duration;

use super::EphemeralStore;
use crate::error::AppResult;
use crate::redis_client::RedisClient;

const SCAN_COUNT: usize = 200;

#[derive(Clone)]
pub struct RedisEphemeralStore {
    redis: RedisClient,
}

impl RedisEphemeralStore {
    pub fn new(redis: RedisClient) -> Self {
        Self { redis }
    }
}

#[async_trait]
impl EphemeralStore for RedisEphemeralStore {
    async fn set_with_ttl(&self, key: &str, value: &str, ttl: Duration) -> AppResult<()> {
        let mut conn = self.redis.connection().await;
        let secs = ttl.as_secs().max(1);
        conn.set_ex::<_, _, ()>(key, value, secs).await?;
        Ok(())
    }

    async fn get(&self, key: &str) -> AppResult<Option<String>> {
        let mut conn = self.redis.connection().await;
        Ok(conn.get::<_, Option<String>>(key).await?)
    }

    async fn get_many(&self, keys: &[String]) -> AppResult<Vec<Option<String>>> {
        if keys.is_empty() {
            return Ok(Vec::new());
        }
        let mut conn = self.redis.connection().await;
        let values: Vec<Option<String>> = redis::cmd("MGET")
            .arg(keys)
            .query_async(&mut conn)
            .await?;
        Ok(values)
    }

    async fn delete(&self, key: &str) -> AppResult<()> {
        let mut conn = self.redis.connection().await;
        conn.del::<_, ()>(key).await?;
        Ok(())
    }

    async fn scan(&self, pattern: &str) -> AppResult<Vec<String>> {
        let mut conn = self.redis.connection().await;
        let mut cursor: u64 = 0;
        let mut keys = Vec::new();
        loop {
            let (next, batch): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(pattern)
                .arg("COUNT")
                .arg(SCAN_COUNT)
                .query_async(&mut conn)
                .await?;
            keys.extend(batch);
            if next == 0 {
                break;
            }
            cursor = next;
        }
        // SCAN may return a key more than once
        keys.sort();
        keys.dedup();
        Ok(keys)
    }
}
