//! `ab-runtime` — the contract between user code and the scheduler.
//!
//! # Crate layout
//!
//! | Module       | Contents                                                          |
//! |--------------|-------------------------------------------------------------------|
//! | [`function`] | `AgentFunction`, `AgentCondition`, `HostFunction`, `ExitCondition` |
//! | [`status`]   | `AgentStatus`, `ExitStatus`                                       |
//! | [`device`]   | `DeviceApi` with message input/output and agent output            |
//! | [`host`]     | `HostApi`, `HostAgentApi`                                         |
//! | [`bindings`] | `VarBindings` — name-hash variable lookup bound per launch        |
//! | [`kernel`]   | input/output adaptors, `specialise`, `KernelTable`                |
//! | [`launch`]   | `LaunchContext`, `LaunchOutput`, single and ensemble launches     |
//! | [`compiler`] | `KernelCompiler` service, `KernelRegistry`                        |
//! | [`error`]    | `RuntimeError`, `RuntimeResult<T>`                                |
//!
//! # Design notes
//!
//! A launch never mutates simulation state.  Kernels read agents, messages
//! and the environment through shared borrows and return owned
//! [`LaunchOutput`]s; the scheduler applies them sequentially, in declared
//! order, after the layer's streams have joined.  This split is what lets
//! several launches of one layer run concurrently on separate streams.
//!
//! # Feature flags
//!
//! | Flag        | Effect                                                    |
//! |-------------|-----------------------------------------------------------|
//! | `parallel`  | *(default)* kernels run data-parallel over agents         |
//! | `seatbelts` | *(default)* macro-property race checks                    |

pub mod bindings;
pub mod compiler;
pub mod device;
pub mod error;
pub mod function;
pub mod host;
pub mod kernel;
pub mod launch;
pub mod status;

#[cfg(test)]
mod tests;

pub use bindings::VarBindings;
pub use compiler::{CompiledKernel, KernelCompiler, KernelRegistry};
pub use device::{DeviceApi, Message, MessageInput, Messages, OutputRow};
pub use error::{RuntimeError, RuntimeResult};
pub use function::{AgentCondition, AgentFunction, ExitCondition, HostFunction};
pub use host::{HostAgentApi, HostApi};
pub use kernel::{KernelFn, KernelKey, KernelTable, specialise};
pub use launch::{LaunchContext, LaunchOutput, ThreadResult, launch, launch_ensemble};
pub use status::{AgentStatus, ExitStatus};
