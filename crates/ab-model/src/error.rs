use ab_core::AbError;
use ab_message::MessageError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ModelError {
    #[error(transparent)]
    Core(#[from] AbError),

    #[error("invalid message type: {0}")]
    Message(#[from] MessageError),

    #[error("layer {layer} ('{name}'): {reason}")]
    Layer { layer: usize, name: String, reason: String },

    #[error("submodel '{name}': {reason}")]
    Submodel { name: String, reason: String },
}

pub type ModelResult<T> = Result<T, ModelError>;
