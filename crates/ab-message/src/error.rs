//! Message-subsystem error type.

use ab_core::AbError;
use ab_device::DeviceError;
use thiserror::Error;

/// Errors produced by `ab-message`.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum MessageError {
    #[error("message index for '{0}' used before init() or after free()")]
    NotInitialized(String),

    #[error("message index allocation failed: {0}")]
    OutOfMemory(#[from] DeviceError),

    #[error(transparent)]
    Core(#[from] AbError),
}

pub type MessageResult<T> = Result<T, MessageError>;
