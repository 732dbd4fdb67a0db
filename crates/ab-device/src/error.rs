use ab_core::DeviceId;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum DeviceError {
    #[error("{device}: out of memory (requested {requested} bytes, {available} available)")]
    OutOfMemory {
        device:    DeviceId,
        requested: usize,
        available: usize,
    },

    #[error("{device} does not exist ({count} devices available)")]
    InvalidDevice { device: DeviceId, count: u32 },

    #[error("device is pinned to {pinned} and cannot change to {requested}")]
    DeviceChanged { pinned: DeviceId, requested: DeviceId },
}

pub type DeviceResult<T> = Result<T, DeviceError>;
