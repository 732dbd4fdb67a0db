use ab_agent::AgentError;
use ab_core::AbError;
use ab_device::DeviceError;
use ab_env::EnvError;
use ab_message::MessageError;
use ab_model::ModelError;
use ab_runtime::RuntimeError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SimError {
    #[error(transparent)]
    Core(#[from] AbError),

    #[error(transparent)]
    Agent(#[from] AgentError),

    #[error(transparent)]
    Message(#[from] MessageError),

    #[error(transparent)]
    Env(#[from] EnvError),

    #[error(transparent)]
    Device(#[from] DeviceError),

    #[error(transparent)]
    Runtime(#[from] RuntimeError),

    #[error(transparent)]
    Model(#[from] ModelError),

    #[error("submodel '{name}' failed: {source}")]
    Submodel {
        name:   String,
        #[source]
        source: Box<SimError>,
    },
}

impl SimError {
    /// Shorthand for an [`AbError::InvalidArgument`].
    pub fn invalid(reason: impl Into<String>) -> Self {
        SimError::Core(AbError::InvalidArgument(reason.into()))
    }
}

pub type SimResult<T> = Result<T, SimError>;
