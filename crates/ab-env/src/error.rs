use ab_core::AbError;
use ab_device::DeviceError;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum EnvError {
    #[error(transparent)]
    Core(#[from] AbError),

    #[error("macro property allocation failed: {0}")]
    Allocation(#[from] DeviceError),

    #[error(
        "macro property '{name}' was written by an agent function in the current layer; \
         host reads must wait for the next layer"
    )]
    RaceCondition { name: String },

    #[error("macro property '{0}' has not been allocated")]
    NotAllocated(String),

    #[error("macro property '{0}' is mapped to a parent property that has been released")]
    Released(String),

    #[error("environment property '{0}' is read-only")]
    ReadOnly(String),
}

pub type EnvResult<T> = Result<T, EnvError>;
