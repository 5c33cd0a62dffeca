//! End-to-end behaviour of the storage facade against the in-process store.

use std::sync::Arc;
use std::time::Duration;

use chrono::{TimeDelta, Utc};
use serde_json::{Value, json};

use quotesync_client::{MemoryDocumentStore, RemoteError, StorageClient, StoreCall};
use quotesync_core::record::chunk_id;
use quotesync_core::{AppConfig, Category, ChunkRecord, LocalDb};

fn config() -> AppConfig {
    AppConfig {
        chunk_size: 25,
        retry_base_delay_ms: 1,
        queue_min_delay_ms: 1,
        queue_backoff_base_ms: 1,
        queue_backoff_cap_ms: 5,
        queue_yield_ms: 1,
        chunk_write_delay_ms: 1,
        delete_batch_delay_ms: 1,
        ..Default::default()
    }
}

async fn setup() -> (Arc<MemoryDocumentStore>, StorageClient) {
    let store = Arc::new(MemoryDocumentStore::new());
    let local = LocalDb::open_in_memory().await.unwrap();
    let client = StorageClient::new(&config(), local, Some(store.clone())).await.unwrap();
    (store, client)
}

fn partition(client: &StorageClient) -> String {
    client.visitor_id().as_str().to_string()
}

fn quotes(n: usize) -> Value {
    Value::Array(
        (0..n)
            .map(|i| json!({"planId": format!("S{i:04}-001"), "carrier": "Acme", "monthlyPremium": 10 + i}))
            .collect(),
    )
}

#[tokio::test]
async fn test_sixty_quotes_are_chunked_and_reassembled() {
    let (store, client) = setup().await;
    client.save("drug_plan_quotes", quotes(60)).await;

    let p = partition(&client);
    let ids = store.ids(&p, "drug_plan_quotes");
    assert_eq!(ids.len(), 3);
    let mut sizes = Vec::new();
    for id in &ids {
        let doc = store.document(&p, "drug_plan_quotes", id).unwrap();
        assert_eq!(doc["originatingKey"], "drug_plan_quotes");
        assert_eq!(doc["totalChunks"], 3);
        sizes.push(doc["payload"].as_array().unwrap().len());
    }
    assert_eq!(sizes, vec![25, 25, 10]);

    assert_eq!(client.load("drug_plan_quotes", json!([])).await, quotes(60));
}

#[tokio::test]
async fn test_ui_state_survives_unavailable_remote() {
    let (store, client) = setup().await;
    store.fail_always(RemoteError::Unavailable("unavailable".into()));

    client.save("ui_filter_state", json!({"sort": "price"})).await;

    assert_eq!(client.load_local("ui_filter_state").await, Some(json!({"sort": "price"})));
    assert_eq!(client.load("ui_filter_state", Value::Null).await, json!({"sort": "price"}));
}

#[tokio::test]
async fn test_remote_failure_mirrors_to_local_store() {
    let (store, client) = setup().await;
    store.fail_always(RemoteError::Unavailable("unavailable".into()));

    client.save("plan_config_current", json!({"planType": "G", "zip": "30301"})).await;
    assert_eq!(client.load_local("plan_config_current").await, Some(json!({"planType": "G", "zip": "30301"})));

    let loaded = client.load("plan_config_current", Value::Null).await;
    assert_eq!(loaded, json!({"planType": "G", "zip": "30301"}));
}

#[tokio::test]
async fn test_unknown_key_returns_default_without_deletes() {
    let (store, client) = setup().await;

    assert_eq!(client.load("unknown_key", json!([])).await, json!([]));
    assert!(!store.calls().iter().any(StoreCall::is_delete));
}

#[tokio::test]
async fn test_partial_expiry_returns_surviving_chunk() {
    let (store, client) = setup().await;
    let p = partition(&client);
    let saved_at = Utc::now() - TimeDelta::hours(23);

    for (index, expired) in [(0, true), (1, false), (2, true)] {
        let expires_at = if expired { Utc::now() - TimeDelta::minutes(5) } else { Utc::now() + TimeDelta::hours(2) };
        let chunk = ChunkRecord {
            chunk_key: chunk_id("drug_plan_quotes", None, index),
            payload: vec![json!({"planId": format!("plan-{index}")})],
            chunk_index: index,
            total_chunks: 3,
            originating_key: "drug_plan_quotes".into(),
            saved_at,
            expires_at,
            group_tags: None,
        };
        let id = chunk.chunk_key.clone();
        store.insert(&p, "drug_plan_quotes", &id, serde_json::to_value(chunk).unwrap());
    }

    let loaded = client.load("drug_plan_quotes", json!([])).await;
    assert_eq!(loaded, json!([{"planId": "plan-1"}]));

    tokio::time::sleep(Duration::from_millis(50)).await;
    let deleted: Vec<StoreCall> = store.calls().into_iter().filter(StoreCall::is_delete).collect();
    assert_eq!(deleted.len(), 2);
    assert_eq!(store.ids(&p, "drug_plan_quotes"), vec!["drug_plan_quotes__chunk_1"]);
}

#[tokio::test]
async fn test_newer_request_wins_over_slower_older_one() {
    let (store, client) = setup().await;
    client.save("drug_plan_quotes", json!(["old"])).await;

    // request A sees the old value but answers late
    store.delay_next(Duration::from_millis(200));
    let slow = {
        let client = client.clone();
        tokio::spawn(async move { client.load("drug_plan_quotes", json!([])).await })
    };
    tokio::time::sleep(Duration::from_millis(20)).await;

    client.save("drug_plan_quotes", json!(["new"])).await;
    let fresh = client.load("drug_plan_quotes", json!([])).await;
    assert_eq!(fresh, json!(["new"]));

    let stale = slow.await.unwrap();
    assert_eq!(stale, json!(["new"]));
    assert_eq!(client.cache().get("drug_plan_quotes"), Some(json!(["new"])));
}

#[tokio::test]
async fn test_load_in_flight_across_save_does_not_restore_old_value() {
    let (store, client) = setup().await;
    client.save("drug_plan_quotes", json!(["old"])).await;

    // the load reads ["old"] and answers while the next save is still writing
    store.delay_next(Duration::from_millis(200));
    let in_flight = {
        let client = client.clone();
        tokio::spawn(async move { client.load("drug_plan_quotes", json!([])).await })
    };
    tokio::time::sleep(Duration::from_millis(20)).await;

    store.delay_next(Duration::from_millis(500));
    client.save("drug_plan_quotes", json!(["new"])).await;

    assert_ne!(in_flight.await.unwrap(), json!(["old"]));
    assert_ne!(client.cache().get("drug_plan_quotes"), Some(json!(["old"])));
    assert_eq!(client.load("drug_plan_quotes", json!([])).await, json!(["new"]));
}

#[tokio::test]
async fn test_chunk_key_lookalike_stays_local() {
    let (store, client) = setup().await;
    client.save("drug_plan_quotes", quotes(30)).await;
    store.clear_calls();

    client.save("drug_plan_quotes__chunk_0", json!({"note": "mine"})).await;

    assert!(store.calls().is_empty());
    assert_eq!(client.load("drug_plan_quotes__chunk_0", Value::Null).await, json!({"note": "mine"}));
    client.cache().clear();
    assert_eq!(client.load("drug_plan_quotes", json!([])).await, quotes(30));
}

#[tokio::test]
async fn test_cancel_category_abandons_pending_load() {
    let (store, client) = setup().await;
    client.save("drug_plan_quotes", json!(["stored"])).await;

    store.delay_next(Duration::from_millis(500));
    let pending = {
        let client = client.clone();
        tokio::spawn(async move { client.load("drug_plan_quotes", json!(["default"])).await })
    };
    tokio::time::sleep(Duration::from_millis(20)).await;

    assert_eq!(client.cancel_category(Category::DrugPlanQuotes), 1);
    let value = tokio::time::timeout(Duration::from_millis(200), pending).await.unwrap().unwrap();
    assert_eq!(value, json!(["default"]));
    assert!(client.cache().get("drug_plan_quotes").is_none());
}

#[tokio::test]
async fn test_round_trip_across_categories() {
    let (_, client) = setup().await;
    let cases = [
        ("drug_plan_quotes", quotes(3)),
        ("medigap_quotes", quotes(40)),
        ("advantage_quotes", json!([])),
        ("plan_builder_state", json!({"step": 3, "selected": ["G", "N"]})),
        ("profile", json!({"zip": "73301", "tobacco": false})),
        ("form_contact", json!({"email": "a@example.com"})),
    ];

    for (key, value) in &cases {
        client.save(*key, value.clone()).await;
    }
    client.cache().clear();
    for (key, value) in &cases {
        assert_eq!(&client.load(*key, Value::Null).await, value, "key {key}");
    }
}

#[tokio::test]
async fn test_remove_clears_every_layer() {
    let (store, client) = setup().await;
    client.save("medigap_quotes", quotes(60)).await;
    client.load("medigap_quotes", json!([])).await;

    client.remove("medigap_quotes").await;

    assert!(client.cache().get("medigap_quotes").is_none());
    assert!(store.ids(&partition(&client), "medigap_quotes").is_empty());
    assert_eq!(client.load("medigap_quotes", json!([])).await, json!([]));
}

#[tokio::test]
async fn test_grouped_saves_coexist() {
    let (_, client) = setup().await;
    client.save_group("medigap_quotes", json!([{"plan": "G", "rate": 120}]), "plan_g").await;
    client.save_group("medigap_quotes", json!([{"plan": "N", "rate": 95}]), "plan_n").await;
    client.save_group("medigap_quotes", json!([{"plan": "G", "rate": 118}]), "plan_g").await;

    let loaded = client.load("medigap_quotes", json!([])).await;
    assert_eq!(loaded, json!([{"plan": "G", "rate": 118}, {"plan": "N", "rate": 95}]));
}
