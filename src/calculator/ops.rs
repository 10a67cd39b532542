//! Arithmetic on `i32` with two's-complement wraparound.

use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum OperationError {
    #[error("Division by zero is not allowed")]
    DivisionByZero,

    #[error("This is a test exception triggered intentionally")]
    Intentional,
}

pub fn add(a: i32, b: i32) -> i32 {
    a.wrapping_add(b)
}

pub fn subtract(a: i32, b: i32) -> i32 {
    a.wrapping_sub(b)
}

pub fn multiply(a: i32, b: i32) -> i32 {
    a.wrapping_mul(b)
}

/// Truncates toward zero. `i32::MIN / -1` wraps to `i32::MIN`.
pub fn divide(a: i32, b: i32) -> Result<i32, OperationError> {
    if b == 0 {
        return Err(OperationError::DivisionByZero);
    }
    Ok(a.wrapping_div(b))
}

/// Never succeeds.
pub fn trigger_failure() -> Result<(), OperationError> {
    Err(OperationError::Intentional)
}
