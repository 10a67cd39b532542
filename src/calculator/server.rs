use std::{future::Future, sync::Arc};

use tokio::{net::TcpListener, sync::watch};

use super::service::CalculatorService;
use super::types::{BinaryOperands, Operation, ServiceError};
use crate::{RpcConfig, RpcError, RpcServer};

/// Registers every [`Operation`] of a [`CalculatorService`] on an
/// [`RpcServer`] and serves them.
pub struct CalculatorServer<H: CalculatorService> {
    handler: Arc<H>,
    rpc_server: RpcServer,
}

impl<H: CalculatorService> CalculatorServer<H> {
    /// The handler is shared: the same instance can back several servers.
    pub fn new(handler: Arc<H>, config: RpcConfig) -> Self {
        Self {
            handler,
            rpc_server: RpcServer::new(config),
        }
    }

    pub fn rpc_server(&self) -> &RpcServer {
        &self.rpc_server
    }

    pub async fn register_all(&self) {
        self.register_binary(Operation::Add, |h, ops| async move { h.add(ops.a, ops.b).await })
            .await;
        self.register_binary(Operation::Subtract, |h, ops| async move {
            h.subtract(ops.a, ops.b).await
        })
        .await;
        self.register_binary(Operation::Multiply, |h, ops| async move {
            h.multiply(ops.a, ops.b).await
        })
        .await;
        self.register_binary(Operation::Divide, |h, ops| async move {
            h.divide(ops.a, ops.b).await
        })
        .await;

        let handler = self.handler.clone();
        self.rpc_server
            .register_typed(Operation::TriggerFailure.method(), move |(): ()| {
                let handler = handler.clone();
                async move {
                    handler
                        .trigger_failure()
                        .await
                        .map_err(|e| RpcError::Remote(e.into()))
                }
            })
            .await;
    }

    async fn register_binary<F, Fut>(&self, operation: Operation, call: F)
    where
        F: Fn(Arc<H>, BinaryOperands) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<i32, ServiceError>> + Send + 'static,
    {
        let handler = self.handler.clone();
        self.rpc_server
            .register_typed(operation.method(), move |operands: BinaryOperands| {
                let result = call(handler.clone(), operands);
                async move { result.await.map_err(|e| RpcError::Remote(e.into())) }
            })
            .await;
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
