use ab_agent::AgentError;
use ab_core::AbError;
use ab_env::EnvError;
use ab_message::MessageError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error(transparent)]
    Core(#[from] AbError),

    #[error(transparent)]
    Agent(#[from] AgentError),

    #[error(transparent)]
    Message(#[from] MessageError),

    #[error(transparent)]
    Env(#[from] EnvError),

    #[error("agent function '{function}' killed an agent but was not declared with death enabled")]
    AgentDeathNotEnabled { function: String },

    #[error("device exception in agent function '{function}': {message}")]
    DeviceException { function: String, message: String },

    #[error("failed to compile agent function '{function}': {reason}")]
    Compile { function: String, reason: String },

    /// Raised by user host functions.
    #[error("host function '{function}' failed: {reason}")]
    Host { function: String, reason: String },
}

impl RuntimeError {
    /// Shorthand for a user host-function failure.
    pub fn host(function: impl Into<String>, reason: impl Into<String>) -> Self {
        RuntimeError::Host { function: function.into(), reason: reason.into() }
    }
}

pub type RuntimeResult<T> = Result<T, RuntimeError>;
