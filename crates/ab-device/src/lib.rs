//! `ab-device` — the simulated accelerator the runtime executes on.
//!
//! | Module        | Contents                                                        |
//! |---------------|-----------------------------------------------------------------|
//! | [`memory`]    | `DeviceMemory` budgeted pool, RAII `Allocation` handles         |
//! | [`stream`]    | `Stream` FIFO work queues, drained concurrently on synchronise  |
//! | [`registry`]  | process-wide `DeviceRegistry`, `DeviceLease` instance counting  |
//! | [`exception`] | `DeviceExceptionBuffer` — first device-side error per launch    |
//! | [`ensemble`]  | per-instance thread offsets and instance resolution             |
//! | [`error`]     | `DeviceError`, `DeviceResult`                                   |
//!
//! # Feature flags
//!
//! | Flag       | Effect                                                      |
//! |------------|-------------------------------------------------------------|
//! | `parallel` | *(default)* streams drain concurrently inside a Rayon scope |

pub mod ensemble;
pub mod error;
pub mod exception;
pub mod memory;
pub mod registry;
pub mod stream;


pub use ensemble::{instance_offsets, resolve_instance};
pub use error::{DeviceError, DeviceResult};
pub use exception::DeviceExceptionBuffer;
pub use memory::{Allocation, DEFAULT_DEVICE_MEMORY, DeviceMemory};
pub use registry::{DeviceLease, DeviceRegistry, SIMULATED_DEVICE_COUNT};
pub use stream::Stream;
