//! Type definitions for the service.
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use super::ops::OperationError;
use crate::errors::{ErrorCode, RemoteError};

/// Operands of add, subtract, multiply and divide.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct BinaryOperands {
    pub a: i32,
    pub b: i32,
}

impl BinaryOperands {
    pub fn new(a: i32, b: i32) -> Self {
        Self { a, b }
    }
}

/// The operations the service exposes, each under its own RPC method name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Add,
    Subtract,
    Multiply,
    Divide,
    TriggerFailure,
}

impl Operation {
    pub const ALL: [Operation; 5] = [
        Operation::Add,
        Operation::Subtract,
        Operation::Multiply,
        Operation::Divide,
        Operation::TriggerFailure,
    ];

    /// RPC method name, e.g. `Calculator.divide`.
    pub fn method(self) -> &'static str {
        match self {
            Operation::Add => "Calculator.add",
            Operation::Subtract => "Calculator.subtract",
            Operation::Multiply => "Calculator.multiply",
            Operation::Divide => "Calculator.divide",
            Operation::TriggerFailure => "Calculator.triggerFailure",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.method())
    }
}

/// There is one kind for every business failure; callers tell failures apart
/// by message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ServiceErrorKind {
    #[default]
    Service,
}

/// A business-logic failure raised by the calculator.
///
/// Displays as its message and nothing else, on the server and after the trip
/// to the client.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct ServiceError {
    kind: ServiceErrorKind,
    message: String,
    cause: Option<String>,
}

impl ServiceError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            kind: ServiceErrorKind::Service,
            message: message.into(),
            cause: None,
        }
    }

    /// Wraps `cause`, keeping its description alongside the message.
    pub fn with_cause(message: impl Into<String>, cause: &dyn std::error::Error) -> Self {
        Self {
            cause: Some(cause.to_string()),
            ..Self::new(message)
        }
    }

    pub fn kind(&self) -> ServiceErrorKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn cause(&self) -> Option<&str> {
        self.cause.as_deref()
    }
}

impl From<OperationError> for ServiceError {
    fn from(err: OperationError) -> Self {
        ServiceError::new(err.to_string())
    }
}

impl From<ServiceError> for RemoteError {
    fn from(err: ServiceError) -> Self {
        RemoteError {
            code: ErrorCode::Service,
            message: err.message,
            cause: err.cause,
        }
    }
}

impl From<RemoteError> for ServiceError {
    fn from(err: RemoteError) -> Self {
        ServiceError {
            kind: ServiceErrorKind::Service,
            message: err.message,
            cause: err.cause,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn method_names_are_unique() {
        let mut names: Vec<_> = Operation::ALL.iter().map(|op| op.method()).collect();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), Operation::ALL.len());
        assert!(names.iter().all(|name| name.starts_with("Calculator.")));
    }

    #[test]
    fn operation_error_message_is_preserved() {
        let err = ServiceError::from(OperationError::DivisionByZero);
        assert_eq!(err.message(), "Division by zero is not allowed");
        assert_eq!(err.to_string(), "Division by zero is not allowed");
        assert_eq!(err.kind(), ServiceErrorKind::Service);
        assert!(err.cause().is_none());
    }

    #[test]
    fn with_cause_keeps_message_and_records_cause() {
        let err =
            ServiceError::with_cause("Error during division", &OperationError::DivisionByZero);
        assert_eq!(err.to_string(), "Error during division");
        assert_eq!(err.cause(), Some("Division by zero is not allowed"));
    }

    #[test]
    fn remote_round_trip_is_lossless() {
        let original = ServiceError::with_cause("outer", &OperationError::Intentional);
        let remote = RemoteError::from(original.clone());
        assert_eq!(remote.code, ErrorCode::Service);

        let wire = bincode::serialize(&remote).unwrap();
        let decoded: RemoteError = bincode::deserialize(&wire).unwrap();
        assert_eq!(ServiceError::from(decoded), original);
    }
}
