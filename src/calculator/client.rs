use std::net::SocketAddr;

use serde::{de::DeserializeOwned, Serialize};
use tracing::debug;

use super::types::{BinaryOperands, Operation};
use crate::registry::RegistryClient;
use crate::{CallError, Endpoint, RpcClient, RpcConfig, RpcError};

/// Builds a client for `endpoint`.
///
/// A registry endpoint is resolved first: the registry is asked for the
/// location bound under the name and the client connects there. A direct
/// endpoint is connected to as is. An unknown name fails with
/// [`CallError::Resolution`]; an unreachable address with
/// [`CallError::Transport`].
pub async fn connect(
    endpoint: &Endpoint,
    config: RpcConfig,
) -> Result<CalculatorClient, CallError> {
    let addr = match endpoint {
        Endpoint::Direct { addr } => *addr,
        Endpoint::Registry {
            registry_addr,
            name,
        } => {
            let registry = RegistryClient::connect(*registry_addr, config.clone())
                .await
                .map_err(CallError::Transport)?;
            let addr = registry.lookup(name).await?;
            debug!("Resolved '{name}' to {addr} via {registry_addr}");
            addr
        }
    };

    CalculatorClient::connect(addr, config)
        .await
        .map_err(CallError::Transport)
}

/// Client-side proxy: each method is one remote call on a shared connection.
pub struct CalculatorClient {
    inner: RpcClient,
    addr: SocketAddr,
}

impl CalculatorClient {
    /// Connects to the service at the given address.
    pub async fn connect(addr: SocketAddr, config: RpcConfig) -> Result<Self, RpcError> {
        let inner = RpcClient::connect(addr, config).await?;
        Ok(Self { inner, addr })
    }

    /// The service address this client talks to.
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub async fn add(&self, a: i32, b: i32) -> Result<i32, CallError> {
        self.invoke(Operation::Add, &BinaryOperands::new(a, b)).await
    }

    pub async fn subtract(&self, a: i32, b: i32) -> Result<i32, CallError> {
        self.invoke(Operation::Subtract, &BinaryOperands::new(a, b)).await
    }

    pub async fn multiply(&self, a: i32, b: i32) -> Result<i32, CallError> {
        self.invoke(Operation::Multiply, &BinaryOperands::new(a, b)).await
    }

    pub async fn divide(&self, a: i32, b: i32) -> Result<i32, CallError> {
        self.invoke(Operation::Divide, &BinaryOperands::new(a, b)).await
    }

    pub async fn trigger_failure(&self) -> Result<(), CallError> {
        self.invoke(Operation::TriggerFailure, &()).await
    }

    async fn invoke<Req, Resp>(
        &self,
        operation: Operation,
        request: &Req,
    ) -> Result<Resp, CallError>
    where
        Req: Serialize,
        Resp: DeserializeOwned,
    {
        Ok(self.inner.call_typed(operation.method(), request).await?)
    }
}
