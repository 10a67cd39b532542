//! Process bootstrap: serves one calculator instance on the direct port and
//! publishes it in a registry served on the registry port.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::sync::Arc;

use tokio::{sync::watch, task::JoinHandle};
use tracing::info;

use crate::calculator::{CalculatorServer, CalculatorService, CalculatorServiceImpl};
use crate::config::{Endpoint, ServiceConfig};
use crate::registry::{NameRegistry, RegistryServer, SharedNameRegistry};
use crate::RpcError;

pub struct ServiceHost {
    config: ServiceConfig,
    registry: SharedNameRegistry,
    shutdown: watch::Sender<bool>,
    tasks: Vec<JoinHandle<Result<(), RpcError>>>,
}

impl ServiceHost {
    /// Starts both endpoints around a [`CalculatorServiceImpl`].
    pub async fn start(config: ServiceConfig) -> Result<Self, RpcError> {
        Self::start_with(config, Arc::new(CalculatorServiceImpl)).await
    }

    /// Binds the direct endpoint, publishes its address under the service name
    /// and binds the registry endpoint. Both are accepting connections when
    /// this returns.
    pub async fn start_with<H: CalculatorService>(
        config: ServiceConfig,
        handler: Arc<H>,
    ) -> Result<Self, RpcError> {
        config.validate()?;

        let mut service = CalculatorServer::new(
            handler,
            config
                .rpc
                .clone()
                .with_bind_address(config.service_addr.to_string()),
        );
        service.register_all().await;
        let service_listener = service.bind().await?;
        let service_addr = reachable(service_listener.local_addr()?);

        let registry = SharedNameRegistry::new();
        registry
            .bind(&config.service_name, service_addr)
            .map_err(|e| RpcError::ConfigError(e.to_string()))?;

        let mut registry_server = RegistryServer::new(
            Arc::new(registry.clone()),
            config
                .rpc
                .clone()
                .with_bind_address(config.registry_addr.to_string()),
        );
        registry_server.register_all().await;
        let registry_listener = registry_server.bind().await?;
        let registry_addr = reachable(registry_listener.local_addr()?);

        let (shutdown, shutdown_rx) = watch::channel(false);
        let service_task = {
            let shutdown_rx = shutdown_rx.clone();
            tokio::spawn(async move { service.serve_until(service_listener, shutdown_rx).await })
        };
        let registry_task = tokio::spawn(async move {
            registry_server
                .serve_until(registry_listener, shutdown_rx)
                .await
        });

        let config = ServiceConfig {
            registry_addr,
            service_addr,
            ..config
        };
        info!("Registry port: {}", config.registry_addr.port());
        info!("Calculator service port: {}", config.service_addr.port());
        info!("Service name: {}", config.service_name);
        info!("Service URL: {}", config.registry_endpoint());
        info!("Direct service URL: {}", config.direct_endpoint());

        Ok(Self {
            config,
            registry,
            shutdown,
            tasks: vec![service_task, registry_task],
        })
    }

    /// The configuration with the ports actually bound.
    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    pub fn registry(&self) -> &SharedNameRegistry {
        &self.registry
    }

    pub fn registry_endpoint(&self) -> Endpoint {
        self.config.registry_endpoint()
    }

    pub fn direct_endpoint(&self) -> Endpoint {
        self.config.direct_endpoint()
    }

    /// Stops accepting on both ports and waits for the accept loops to exit.
    pub async fn shutdown(self) -> Result<(), RpcError> {
        // Err only if both loops already exited.
        let _ = self.shutdown.send(true);
        for task in self.tasks {
            task.await
                .map_err(|e| RpcError::InternalError(format!("Server task failed: {e}")))??;
        }
        info!("Service '{}' stopped", self.config.service_name);
        Ok(())
    }
}

/// Listeners bound to the unspecified address are published as loopback.
fn reachable(addr: SocketAddr) -> SocketAddr {
    match addr.ip() {
        IpAddr::V4(ip) if ip.is_unspecified() => {
            SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), addr.port())
        }
        IpAddr::V6(ip) if ip.is_unspecified() => {
            SocketAddr::new(IpAddr::V6(Ipv6Addr::LOCALHOST), addr.port())
        }
        _ => addr,
    }
}
