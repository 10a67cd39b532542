//! Calls resolved through the registry.

mod common;

use calcnet::registry::RegistryClient;
use calcnet::{CallError, Endpoint};
use common::{client_config, connect, start_host, DIVISION_BY_ZERO, INTENTIONAL_FAILURE};

#[tokio::test]
async fn test_addition() {
    let host = start_host().await;
    let client = connect(&host.registry_endpoint()).await;

    assert_eq!(client.add(5, 3).await.unwrap(), 8);
    host.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_subtraction() {
    let host = start_host().await;
    let client = connect(&host.registry_endpoint()).await;

    assert_eq!(client.subtract(10, 4).await.unwrap(), 6);
}

#[tokio::test]
async fn test_multiplication() {
    let host = start_host().await;
    let client = connect(&host.registry_endpoint()).await;

    assert_eq!(client.multiply(6, 7).await.unwrap(), 42);
}

#[tokio::test]
async fn test_division() {
    let host = start_host().await;
    let client = connect(&host.registry_endpoint()).await;

    assert_eq!(client.divide(20, 5).await.unwrap(), 4);
}

#[tokio::test]
async fn test_division_by_zero() {
    let host = start_host().await;
    let client = connect(&host.registry_endpoint()).await;

    match client.divide(10, 0).await {
        Err(CallError::Service(err)) => {
            assert_eq!(err.message(), DIVISION_BY_ZERO);
            assert!(err.to_string().contains("Division by zero"));
        }
        other => panic!("expected a service error, got {other:?}"),
    }
}

#[tokio::test]
async fn test_trigger_failure() {
    let host = start_host().await;
    let client = connect(&host.registry_endpoint()).await;

    let err = client.trigger_failure().await.unwrap_err();
    let service = err.service_error().expect("service error");
    assert_eq!(service.message(), INTENTIONAL_FAILURE);
    assert!(service.to_string().contains("test exception"));
}

#[tokio::test]
async fn test_multiple_calls() {
    let host = start_host().await;
    let client = connect(&host.registry_endpoint()).await;

    assert_eq!(client.add(1, 1).await.unwrap(), 2);
    assert_eq!(client.multiply(3, 4).await.unwrap(), 12);
    assert_eq!(client.subtract(100, 50).await.unwrap(), 50);
    assert_eq!(client.divide(144, 12).await.unwrap(), 12);
    assert_eq!(client.add(999, 1).await.unwrap(), 1000);
}

#[tokio::test]
async fn test_domain_error_does_not_break_the_connection() {
    let host = start_host().await;
    let client = connect(&host.registry_endpoint()).await;

    assert!(client.divide(1, 0).await.unwrap_err().is_service());
    assert!(client.trigger_failure().await.unwrap_err().is_service());
    assert_eq!(client.add(2, 2).await.unwrap(), 4);
}

#[tokio::test]
async fn test_registry_resolves_to_the_direct_endpoint() {
    let host = start_host().await;
    let client = connect(&host.registry_endpoint()).await;

    assert_eq!(Endpoint::direct(client.addr()), host.direct_endpoint());
}

#[tokio::test]
async fn test_registry_lists_the_published_name() {
    let host = start_host().await;
    let registry = RegistryClient::connect(host.config().registry_addr, client_config())
        .await
        .unwrap();

    assert_eq!(
        registry.list().await.unwrap(),
        vec![host.config().service_name.clone()]
    );
    assert_eq!(
        registry.lookup(&host.config().service_name).await.unwrap(),
        host.config().service_addr
    );
}

#[tokio::test]
async fn test_endpoint_url_round_trip() {
    let host = start_host().await;
    let url = host.registry_endpoint().to_string();
    assert!(url.starts_with("registry://127.0.0.1:"));
    assert!(url.ends_with("/CalculatorService"));

    let client = connect(&url.parse().unwrap()).await;
    assert_eq!(client.add(40, 2).await.unwrap(), 42);
}
