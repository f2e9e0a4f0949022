//! Tests for sqlgate gateway module

mod common;

use common::{FakeFactory, PingMode};
use serde_json::json;
use sqlgate::prelude::*;

fn gateway_with(factory: FakeFactory) -> Gateway {
    Gateway::new(GatewayConfig::default(), Arc::new(factory))
}

// ==================== Default Tests ====================

#[tokio::test]
async fn test_defaults_apply_when_arguments_missing() {
    let factory = FakeFactory::new();
    let state = factory.state();
    let gateway = gateway_with(factory);

    let table = gateway.query(None, None, None).await.unwrap();
    assert_eq!(table.len(), 1);
    assert_eq!(state.last_sql().as_deref(), Some("SELECT version()"));
    assert_eq!(
        state.last_descriptor().as_deref(),
        Some("host=localhost port=5432 user=postgres dbname=test sslmode=disable")
    );
}

#[tokio::test]
async fn test_empty_query_uses_default() {
    let factory = FakeFactory::new();
    let state = factory.state();
    let gateway = gateway_with(factory);

    gateway.query(Some(""), Some("host=db"), None).await.unwrap();
    assert_eq!(state.last_sql().as_deref(), Some("SELECT version()"));
    assert_eq!(state.last_descriptor().as_deref(), Some("host=db"));
}

#[tokio::test]
async fn test_configured_defaults_override_presets() {
    let factory = FakeFactory::new().with_database(DatabaseType::SqlServer);
    let state = factory.state();
    let config = GatewayConfig::for_database(DatabaseType::SqlServer)
        .with_default_query("SELECT 42")
        .with_default_descriptor("server=db;user=app");
    let gateway = Gateway::new(config, Arc::new(factory));

    gateway.query(None, None, None).await.unwrap();
    assert_eq!(state.last_sql().as_deref(), Some("SELECT 42"));
    assert_eq!(state.last_descriptor().as_deref(), Some("server=db;user=app"));
}

#[tokio::test]
async fn test_sqlserver_presets() {
    let factory = FakeFactory::new().with_database(DatabaseType::SqlServer);
    let state = factory.state();
    let gateway = Gateway::new(
        GatewayConfig::for_database(DatabaseType::SqlServer),
        Arc::new(factory),
    );

    gateway.query(None, None, None).await.unwrap();
    assert_eq!(state.last_sql().as_deref(), Some("SELECT @@VERSION"));
    assert_eq!(
        state.last_descriptor().as_deref(),
        Some("server=localhost;user=sa;password=Password123,port=1433")
    );
}

// ==================== Failure Tests ====================

#[tokio::test]
async fn test_failure_is_absent_result() {
    let factory = FakeFactory::new();
    let state = factory.state();
    state.set_refuse(true);
    let gateway = gateway_with(factory);

    assert!(gateway.query(Some("SELECT 1"), None, None).await.is_none());

    let err = gateway.run(Some("SELECT 1"), None, None).await.unwrap_err();
    assert_eq!(err.category(), ErrorCategory::ConnectionRefused);
}

#[tokio::test]
async fn test_no_rows_is_distinct_from_failure() {
    let factory = FakeFactory::new().with_responder(|_, _| Ok(None));
    let gateway = gateway_with(factory);

    let table = gateway.query(Some("DELETE FROM t"), None, None).await;
    assert_eq!(table.map(|t| t.len()), Some(0));
}

#[tokio::test]
async fn test_malformed_descriptor_is_absent_result() {
    let gateway = gateway_with(FakeFactory::new());

    let err = gateway.run(None, Some(""), None).await.unwrap_err();
    assert_eq!(classify(&err), FailureClass::MalformedDescriptor);
    assert!(gateway.query(None, Some(""), None).await.is_none());
}

// ==================== Lifecycle Tests ====================

#[tokio::test]
async fn test_stale_connection_recovered_transparently() {
    let factory = FakeFactory::new();
    let state = factory.state();
    let gateway = gateway_with(factory);

    assert!(gateway.query(None, None, None).await.is_some());
    state.set_ping(PingMode::Broken);
    assert!(gateway.query(None, None, None).await.is_some());

    let stats = gateway.stats();
    assert_eq!(stats.connections_created, 2);
    assert_eq!(stats.connections_closed, 1);
    assert_eq!(stats.probe_failures, 1);
}

#[tokio::test]
async fn test_close_all_releases_connections() {
    let factory = FakeFactory::new();
    let state = factory.state();
    let gateway = gateway_with(factory);

    gateway.query(None, Some("host=a"), None).await.unwrap();
    gateway.query(None, Some("host=b"), None).await.unwrap();
    gateway.close_all().await;

    assert!(gateway.cache().is_empty().await);
    assert_eq!(state.closed(), 2);
}

// ==================== Serialization Tests ====================

#[tokio::test]
async fn test_result_serializes_as_row_maps() {
    let factory = FakeFactory::new().with_responder(|_, _| {
        Ok(Some(Box::new(VecCursor::from_values(
            vec!["id".into(), "name".into(), "active".into(), "note".into()],
            vec![
                vec![
                    DriverValue::Int64(1),
                    DriverValue::Text("alice".into()),
                    DriverValue::Bool(true),
                    DriverValue::Null,
                ],
                vec![
                    DriverValue::Int64(2),
                    DriverValue::Bytes(b"bob".to_vec()),
                    DriverValue::Bool(false),
                    DriverValue::Text("x".into()),
                ],
            ],
        )) as Box<dyn RowCursor>))
    });
    let gateway = gateway_with(factory);

    let table = gateway.query(None, None, None).await.unwrap();
    assert_eq!(
        serde_json::to_value(&table).unwrap(),
        json!([
            {"id": 1.0, "name": "alice", "active": true, "note": null},
            {"id": 2.0, "name": "bob", "active": false, "note": "x"}
        ])
    );
}

#[test]
fn test_gateway_debug_redacts_default_descriptor() {
    let config = GatewayConfig::default().with_default_descriptor("host=db password=hunter2");
    let gateway = Gateway::new(config, Arc::new(FakeFactory::new()));
    assert!(!format!("{gateway:?}").contains("hunter2"));
}
