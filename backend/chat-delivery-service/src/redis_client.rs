use redis::aio::ConnectionManager;
use redis::{Client, RedisResult};
use std::sync::Arc;
use tokio::sync::Mutex;

pub type SharedConnectionManager = Arc<Mutex<ConnectionManager>>;

#[derive(Clone)]
pub struct RedisClient {
    manager: SharedConnectionManager,
}

impl RedisClient {
    pub async fn from_url(url: &str) -> RedisResult<Self> {
        let client = Client::open(url)?;
        let manager = ConnectionManager::new(client).await?;
        Ok(Self {
            manager: Arc::new(Mutex::new(manager)),
        })
    }

    /// ConnectionManager is cheap to clone and multiplexes over one socket
    pub async fn connection(&self) -> ConnectionManager {
        let guard = self.manager.lock().await;
        guard.clone()
    }
}
