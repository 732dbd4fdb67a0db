use ab_core::AbError;
use ab_device::DeviceError;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum AgentError {
    #[error(transparent)]
    Core(#[from] AbError),

    #[error("agent storage allocation failed: {0}")]
    Allocation(#[from] DeviceError),

    #[error("agent id space exhausted")]
    IdsExhausted,
}

pub type AgentResult<T> = Result<T, AgentError>;
