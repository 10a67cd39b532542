use async_trait::async_trait;
use tracing::debug;

use super::ops;
use super::types::ServiceError;

/// The operations the RPC layer dispatches to. Implementations must be
/// stateless or internally synchronised: one instance serves every connection
/// on both endpoints.
#[async_trait]
pub trait CalculatorService: Send + Sync + 'static {
    async fn add(&self, a: i32, b: i32) -> Result<i32, ServiceError>;
    async fn subtract(&self, a: i32, b: i32) -> Result<i32, ServiceError>;
    async fn multiply(&self, a: i32, b: i32) -> Result<i32, ServiceError>;
    async fn divide(&self, a: i32, b: i32) -> Result<i32, ServiceError>;
    async fn trigger_failure(&self) -> Result<(), ServiceError>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct CalculatorServiceImpl;

#[async_trait]
impl CalculatorService for CalculatorServiceImpl {
    async fn add(&self, a: i32, b: i32) -> Result<i32, ServiceError> {
        debug!("add({a}, {b})");
        Ok(ops::add(a, b))
    }

    async fn subtract(&self, a: i32, b: i32) -> Result<i32, ServiceError> {
        debug!("subtract({a}, {b})");
        Ok(ops::subtract(a, b))
    }

    async fn multiply(&self, a: i32, b: i32) -> Result<i32, ServiceError> {
        debug!("multiply({a}, {b})");
        Ok(ops::multiply(a, b))
    }

    async fn divide(&self, a: i32, b: i32) -> Result<i32, ServiceError> {
        debug!("divide({a}, {b})");
        Ok(ops::divide(a, b)?)
    }

    async fn trigger_failure(&self) -> Result<(), ServiceError> {
        debug!("trigger_failure()");
        Ok(ops::trigger_failure()?)
    }
}
