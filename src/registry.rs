//! Name registry: maps a published service name to the address it is served
//! on.
//!
//! Names are bound by the hosting process only. Remote clients get two
//! read-only methods, [`LOOKUP_METHOD`] and [`LIST_METHOD`].

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, PoisonError, RwLock};
use thiserror::Error;
use tokio::{net::TcpListener, sync::watch};
use tracing::{debug, info};

use crate::{
    CallError, ErrorCode, RemoteError, ResolutionError, RpcClient, RpcConfig, RpcError, RpcServer,
};

pub const LOOKUP_METHOD: &str = "Registry.lookup";
pub const LIST_METHOD: &str = "Registry.list";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("name already bound: {0}")]
    AlreadyBound(String),

    #[error("name not bound: {0}")]
    NotBound(String),
}

pub trait NameRegistry: Send + Sync {
    /// Fails if `name` is already bound.
    fn bind(&self, name: &str, addr: SocketAddr) -> Result<(), RegistryError>;
    /// Binds `name`, returning the address it replaced.
    fn rebind(&self, name: &str, addr: SocketAddr) -> Option<SocketAddr>;
    fn unbind(&self, name: &str) -> Result<SocketAddr, RegistryError>;
    fn lookup(&self, name: &str) -> Option<SocketAddr>;
    fn list(&self) -> Vec<String>;
}

#[derive(Clone, Default)]
pub struct SharedNameRegistry {
    inner: Arc<RwLock<HashMap<String, SocketAddr>>>,
}

impl SharedNameRegistry {
    pub fn new() -> Self {
        Self::default()
    }
}

impl NameRegistry for SharedNameRegistry {
    fn bind(&self, name: &str, addr: SocketAddr) -> Result<(), RegistryError> {
        let mut names = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        if names.contains_key(name) {
            return Err(RegistryError::AlreadyBound(name.to_string()));
        }
        names.insert(name.to_string(), addr);
        info!("Bound '{name}' to {addr}");
        Ok(())
    }

    fn rebind(&self, name: &str, addr: SocketAddr) -> Option<SocketAddr> {
        let mut names = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        info!("Rebound '{name}' to {addr}");
        names.insert(name.to_string(), addr)
    }

    fn unbind(&self, name: &str) -> Result<SocketAddr, RegistryError> {
        let mut names = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        names
            .remove(name)
            .ok_or_else(|| RegistryError::NotBound(name.to_string()))
    }

    fn lookup(&self, name: &str) -> Option<SocketAddr> {
        let names = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        names.get(name).copied()
    }

    fn list(&self) -> Vec<String> {
        let names = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        let mut list: Vec<String> = names.keys().cloned().collect();
        list.sort();
        list
    }
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct LookupRequest {
    pub name: String,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct LookupResponse {
    pub addr: SocketAddr,
}

/// Serves a [`NameRegistry`] over RPC.
pub struct RegistryServer<R: NameRegistry + 'static> {
    registry: Arc<R>,
    rpc_server: RpcServer,
}

impl<R: NameRegistry + 'static> RegistryServer<R> {
    pub fn new(registry: Arc<R>, config: RpcConfig) -> Self {
        Self {
            registry,
            rpc_server: RpcServer::new(config),
        }
    }

    pub fn registry(&self) -> &Arc<R> {
        &self.registry
    }

    pub fn rpc_server(&self) -> &RpcServer {
        &self.rpc_server
    }

    pub async fn register_all(&self) {
        {
            let registry = self.registry.clone();
            self.rpc_server
                .register_typed(LOOKUP_METHOD, move |request: LookupRequest| {
                    let registry = registry.clone();
                    async move {
                        match registry.lookup(&request.name) {
                            Some(addr) => {
                                debug!("Lookup '{}' -> {addr}", request.name);
                                Ok(LookupResponse { addr })
                            }
                            None => {
                                debug!("Lookup '{}' -> not bound", request.name);
                                Err(RpcError::Remote(RemoteError::not_bound(&request.name)))
                            }
                        }
                    }
                })
                .await;
        }
        {
            let registry = self.registry.clone();
            self.rpc_server
                .register_typed(LIST_METHOD, move |(): ()| {
                    let registry = registry.clone();
                    async move { Ok(registry.list()) }
                })
                .await;
        }
    }

    pub async fn bind(&mut self) -> Result<TcpListener, RpcError> {
        self.rpc_server.bind().await
    }

    pub async fn serve_until(
        &self,
        listener: TcpListener,
        shutdown: watch::Receiver<bool>,
    ) -> Result<(), RpcError> {
        self.rpc_server.serve_until(listener, shutdown).await
    }
}

/// Resolves names against a remote [`RegistryServer`].
pub struct RegistryClient {
    inner: RpcClient,
}

impl RegistryClient {
    pub async fn connect(addr: SocketAddr, config: RpcConfig) -> Result<Self, RpcError> {
        let inner = RpcClient::connect(addr, config).await?;
        Ok(Self { inner })
    }

    /// An unbound name is a [`CallError::Resolution`]; any other failure is a
    /// transport error.
    pub async fn lookup(&self, name: &str) -> Result<SocketAddr, CallError> {
        let request = LookupRequest {
            name: name.to_string(),
        };
        match self
            .inner
            .call_typed::<_, LookupResponse>(LOOKUP_METHOD, &request)
            .await
        {
            Ok(response) => Ok(response.addr),
            Err(RpcError::Remote(err)) if err.code == ErrorCode::NotBound => {
                Err(CallError::Resolution(ResolutionError::NotBound {
                    name: name.to_string(),
                }))
            }
            Err(err) => Err(CallError::Transport(err)),
        }
    }

    pub async fn list(&self) -> Result<Vec<String>, CallError> {
        self.inner
            .call_typed(LIST_METHOD, &())
            .await
            .map_err(CallError::Transport)
    }
}
