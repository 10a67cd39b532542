#![allow(dead_code)]

use calcnet::calculator::{self, CalculatorClient};
use calcnet::host::ServiceHost;
use calcnet::{Endpoint, RpcConfig, ServiceConfig};
use std::time::Duration;

pub const DIVISION_BY_ZERO: &str = "Division by zero is not allowed";
pub const INTENTIONAL_FAILURE: &str = "This is a test exception triggered intentionally";

pub fn client_config() -> RpcConfig {
    RpcConfig::default()
        .with_call_timeout(Duration::from_secs(5))
        .with_connect_timeout(Duration::from_secs(2))
}

/// Starts both endpoints on ephemeral loopback ports.
pub async fn start_host() -> ServiceHost {
    ServiceHost::start(ServiceConfig::ephemeral().with_rpc_config(client_config()))
        .await
        .expect("service host should start")
}

pub async fn connect(endpoint: &Endpoint) -> CalculatorClient {
    calculator::connect(endpoint, client_config())
        .await
        .unwrap_or_else(|e| panic!("connect to {endpoint} failed: {e}"))
}
