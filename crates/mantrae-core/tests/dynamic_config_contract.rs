//! Contract Test: Dynamic Config Assembly
//!
//! Constraints verified:
//! - Only enabled rows of the requested profile are rendered
//! - Stored config blobs are copied verbatim under their names
//! - Protocol sections without routers, services and middlewares are omitted
//! - Assembly is read-only and repeatable

mod common;

use common::*;
use mantrae_core::model::{Protocol, ResourceKind};
use mantrae_core::{Error, MemoryStore, build_dynamic_config, build_dynamic_config_by_name};
use serde_json::json;

async fn tcp_only_store() -> MemoryStore {
    let store = MemoryStore::new();
    seed_profile(&store, 1, "default").await;
    store
        .upsert_resource(resource(
            1,
            1,
            "db",
            Protocol::Tcp,
            ResourceKind::Router,
            json!({ "rule": "HostSNI(`db.example.com`)", "service": "db", "tls": {} }),
        ))
        .await;
    store
        .upsert_resource(resource(
            2,
            1,
            "db",
            Protocol::Tcp,
            ResourceKind::Service,
            json!({ "loadBalancer": { "servers": [{ "address": "10.0.0.5:5432" }] } }),
        ))
        .await;
    store
}

#[tokio::test]
async fn tcp_only_profile_omits_http_and_udp() {
    let store = tcp_only_store().await;

    let config = build_dynamic_config(&store, 1).await.unwrap();

    assert!(config.http.is_none());
    assert!(config.udp.is_none());
    let tcp = config.tcp.as_ref().unwrap();
    assert_eq!(
        tcp.routers["db"],
        json!({ "rule": "HostSNI(`db.example.com`)", "service": "db", "tls": {} })
    );

    let rendered: serde_json::Value = serde_json::from_str(&config.to_json().unwrap()).unwrap();
    let keys: Vec<&String> = rendered.as_object().unwrap().keys().collect();
    assert_eq!(keys, vec!["tcp"]);
    assert!(rendered["tcp"].get("middlewares").is_none());
}

#[tokio::test]
async fn disabled_rows_and_other_profiles_are_excluded() {
    let store = tcp_only_store().await;
    seed_profile(&store, 2, "staging").await;
    let mut disabled = resource(
        3,
        1,
        "old",
        Protocol::Tcp,
        ResourceKind::Router,
        json!({ "rule": "HostSNI(`old.example.com`)" }),
    );
    disabled.enabled = false;
    store.upsert_resource(disabled).await;
    store
        .upsert_resource(resource(
            4,
            2,
            "staging-web",
            Protocol::Http,
            ResourceKind::Router,
            json!({ "rule": "Host(`staging.example.com`)" }),
        ))
        .await;

    let config = build_dynamic_config(&store, 1).await.unwrap();

    assert!(config.http.is_none());
    let tcp = config.tcp.unwrap();
    assert_eq!(tcp.routers.len(), 1);
    assert!(!tcp.routers.contains_key("old"));
}

#[tokio::test]
async fn every_kind_lands_in_its_native_map() {
    let store = MemoryStore::new();
    seed_profile(&store, 1, "default").await;
    let rows = [
        (1, "web", Protocol::Http, ResourceKind::Router, json!({ "rule": "Host(`a`)" })),
        (2, "app", Protocol::Http, ResourceKind::Service, json!({ "loadBalancer": {} })),
        (3, "auth", Protocol::Http, ResourceKind::Middleware, json!({ "basicAuth": {} })),
        (4, "skip", Protocol::Http, ResourceKind::ServersTransport, json!({ "insecureSkipVerify": true })),
        (5, "dns", Protocol::Udp, ResourceKind::Router, json!({ "service": "dns" })),
        (6, "dns", Protocol::Udp, ResourceKind::Service, json!({ "loadBalancer": {} })),
    ];
    for (id, name, protocol, kind, config) in rows {
        store
            .upsert_resource(resource(id, 1, name, protocol, kind, config))
            .await;
    }

    let config = build_dynamic_config(&store, 1).await.unwrap();
    let rendered = serde_json::to_value(&config).unwrap();

    assert_eq!(rendered["http"]["routers"]["web"]["rule"], "Host(`a`)");
    assert_eq!(rendered["http"]["middlewares"]["auth"], json!({ "basicAuth": {} }));
    assert_eq!(
        rendered["http"]["serversTransports"]["skip"],
        json!({ "insecureSkipVerify": true })
    );
    assert!(rendered["udp"]["routers"].get("dns").is_some());
    assert!(rendered.get("tcp").is_none());
}

#[tokio::test]
async fn transports_alone_do_not_emit_a_section() {
    let store = MemoryStore::new();
    seed_profile(&store, 1, "default").await;
    store
        .upsert_resource(resource(
            1,
            1,
            "skip",
            Protocol::Http,
            ResourceKind::ServersTransport,
            json!({ "insecureSkipVerify": true }),
        ))
        .await;

    let config = build_dynamic_config(&store, 1).await.unwrap();

    assert!(config.http.is_none());
    assert_eq!(config.to_json().unwrap(), "{}");
}

#[tokio::test]
async fn lookup_by_profile_name() {
    let store = tcp_only_store().await;

    let by_name = build_dynamic_config_by_name(&store, "default").await.unwrap();
    let by_id = build_dynamic_config(&store, 1).await.unwrap();
    assert_eq!(by_name, by_id);

    let err = build_dynamic_config_by_name(&store, "missing").await.unwrap_err();
    assert!(matches!(err, Error::NotFound(_)));
    assert!(matches!(
        build_dynamic_config(&store, 42).await.unwrap_err(),
        Error::NotFound(_)
    ));
}

#[tokio::test]
async fn concurrent_assembly_is_consistent() {
    let store = tcp_only_store().await;
    let before = store.snapshot().await;

    let (a, b, c) = tokio::join!(
        build_dynamic_config(&store, 1),
        build_dynamic_config(&store, 1),
        build_dynamic_config(&store, 1),
    );

    let a = a.unwrap();
    assert_eq!(a, b.unwrap());
    assert_eq!(a, c.unwrap());
    assert_eq!(store.snapshot().await, before);
}
