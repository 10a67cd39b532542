//! The calculator service: pure operations, the service implementation the
//! RPC layer dispatches to, wire types, and the server and client halves.

pub mod client;
pub mod ops;
pub mod server;
pub mod service;
pub mod types;

pub use client::{connect, CalculatorClient};
pub use ops::OperationError;
pub use server::CalculatorServer;
pub use service::{CalculatorService, CalculatorServiceImpl};
pub use types::{BinaryOperands, Operation, ServiceError, ServiceErrorKind};
