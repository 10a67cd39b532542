use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::calculator::ServiceError;

// Core RPC error types
#[derive(Debug, Error)]
pub enum RpcError {
    #[error("Connection error: {0}")]
    ConnectionError(String),

    #[error("Stream error: {0}")]
    StreamError(String),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] bincode::Error),

    #[error("Request timeout")]
    Timeout,

    #[error("Frame of {size} bytes exceeds the {limit} byte limit")]
    FrameTooLarge { size: usize, limit: usize },

    #[error("Unknown method: {0}")]
    UnknownMethod(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    InternalError(String),

    /// An error raised by the remote handler and carried back in the response.
    #[error("{0}")]
    Remote(RemoteError),
}

impl RpcError {
    /// True when the error was produced by the remote handler rather than by
    /// the transport.
    pub fn is_remote(&self) -> bool {
        matches!(self, RpcError::Remote(_))
    }
}

/// Classifies an error response on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorCode {
    /// Business-logic failure raised by the service.
    Service,
    /// The registry has nothing bound under the requested name.
    NotBound,
    /// No handler registered for the method.
    MethodNotFound,
    /// Parameters could not be decoded.
    InvalidParams,
    /// Any other server-side failure.
    Internal,
}

/// Error envelope carried in [`crate::RpcResponse`].
///
/// `Display` prints the message alone so that a remote failure reads exactly
/// as it was produced on the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Error)]
#[error("{message}")]
pub struct RemoteError {
    pub code: ErrorCode,
    pub message: String,
    pub cause: Option<String>,
}

impl RemoteError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            cause: None,
        }
    }

    pub fn with_cause(mut self, cause: impl Into<String>) -> Self {
        self.cause = Some(cause.into());
        self
    }

    pub fn not_bound(name: &str) -> Self {
        Self::new(ErrorCode::NotBound, format!("Name not bound: {name}"))
    }

    pub fn method_not_found(method: &str) -> Self {
        Self::new(ErrorCode::MethodNotFound, method)
    }

    pub fn invalid_params(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidParams, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Internal, message)
    }
}

impl From<RpcError> for RemoteError {
    fn from(err: RpcError) -> Self {
        match err {
            RpcError::Remote(remote) => remote,
            RpcError::UnknownMethod(method) => RemoteError::method_not_found(&method),
            RpcError::SerializationError(e) => RemoteError::invalid_params(e.to_string()),
            other => RemoteError::internal(other.to_string()),
        }
    }
}

/// Raised when the registry has no location for a name.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResolutionError {
    #[error("no service bound under name '{name}'")]
    NotBound { name: String },
}

/// The three mutually exclusive outcomes of a failed client call.
#[derive(Debug, Error)]
pub enum CallError {
    /// Business-logic failure; the message is the one produced server-side.
    #[error(transparent)]
    Service(ServiceError),

    #[error("Resolution error: {0}")]
    Resolution(#[from] ResolutionError),

    #[error("Transport error: {0}")]
    Transport(RpcError),
}

impl CallError {
    pub fn is_service(&self) -> bool {
        matches!(self, CallError::Service(_))
    }

    pub fn is_resolution(&self) -> bool {
        matches!(self, CallError::Resolution(_))
    }

    pub fn is_transport(&self) -> bool {
        matches!(self, CallError::Transport(_))
    }

    /// Returns the domain error when the call failed in business logic.
    pub fn service_error(&self) -> Option<&ServiceError> {
        match self {
            CallError::Service(err) => Some(err),
            _ => None,
        }
    }
}

impl From<RpcError> for CallError {
    fn from(err: RpcError) -> Self {
        match err {
            RpcError::Remote(remote) if remote.code == ErrorCode::Service => {
                CallError::Service(ServiceError::from(remote))
            }
            other => CallError::Transport(other),
        }
    }
}
