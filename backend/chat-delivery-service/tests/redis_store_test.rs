//! Ephemeral store against a real Redis
//!
//! Needs Docker: `cargo test -- --ignored`

use chat_delivery_service::ephemeral::{EphemeralStore, RedisEphemeralStore};
use chat_delivery_service::redis_client::RedisClient;
use std::time::Duration;
use testcontainers::{core::WaitFor, runners::AsyncRunner, ContainerAsync, GenericImage};

async fn setup_store() -> (RedisEphemeralStore, ContainerAsync<GenericImage>) {
    let container = GenericImage::new("redis", "7-alpine")
        .with_wait_for(WaitFor::message_on_stdout("Ready to accept connections"))
        .start()
        .await
        .expect("start redis container");
    let port = container
        .get_host_port_ipv4(6379)
        .await
        .expect("redis port");

    let client = RedisClient::from_url(&format!("redis://127.0.0.1:{port}"))
        .await
        .expect("connect to redis");
    (RedisEphemeralStore::new(client), container)
}

#[tokio::test]
#[ignore] // Requires Docker
async fn test_scan_get_many_and_delete() {
    let (store, _container) = setup_store().await;
    let ttl = Duration::from_secs(30);

    store.set_with_ttl("typing:u1_u2:u1", "a", ttl).await.unwrap();
    store.set_with_ttl("typing:u2_u3:u3", "b", ttl).await.unwrap();
    store.set_with_ttl("presence:u2", "c", ttl).await.unwrap();

    let mut keys = store.scan("typing:*_u2:*").await.unwrap();
    keys.extend(store.scan("typing:u2_*:*").await.unwrap());
    keys.sort();
    assert_eq!(keys, vec!["typing:u1_u2:u1", "typing:u2_u3:u3"]);

    let values = store
        .get_many(&["presence:u2".to_string(), "presence:nobody".to_string()])
        .await
        .unwrap();
    assert_eq!(values, vec![Some("c".to_string()), None]);

    store.delete("presence:u2").await.unwrap();
    assert!(store.get("presence:u2").await.unwrap().is_none());
}

#[tokio::test]
#[ignore] // Requires Docker
async fn test_keys_expire() {
    let (store, _container) = setup_store().await;

    store
        .set_with_ttl("session:online:u1:pod-a", "1", Duration::from_secs(1))
        .await
        .unwrap();
    assert!(store.get("session:online:u1:pod-a").await.unwrap().is_some());

    tokio::time::sleep(Duration::from_millis(2100)).await;
    assert!(store.get("session:online:u1:pod-a").await.unwrap().is_none());
}
