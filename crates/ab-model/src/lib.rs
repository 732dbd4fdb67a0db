//! `ab-model` — the immutable model schema.
//!
//! A model lists agents (variables, states, functions), message types,
//! environment and macro properties, the ordered execution layers, nested
//! submodels and the host hooks that run around every step.  It is built
//! once with [`ModelBuilder`], validated, and shared behind an `Arc` by every
//! simulation of it.
//!
//! | Module          | Contents                                                        |
//! |-----------------|-----------------------------------------------------------------|
//! | [`description`] | `ModelDescription` and the per-part description structs         |
//! | [`builder`]     | `ModelBuilder`, `AgentBuilder`, `AgentFunctionBuilder`, `LayerBuilder`, `SubmodelBuilder` |
//! | [`validate`]    | build-time checks, including the layer rules                    |
//! | [`error`]       | `ModelError`, `ModelResult<T>`                                  |

pub mod builder;
pub mod description;
pub mod error;
pub mod validate;

#[cfg(test)]
mod tests;

pub use builder::{
    AgentBuilder, AgentFunctionBuilder, DEFAULT_STATE, LayerBuilder, ModelBuilder, SubmodelBuilder,
};
pub use description::{
    AgentDescription, AgentFunctionDescription, ConditionHandle, EnvPropertyDescription,
    ExitConditionDescription, FunctionBody, FunctionRef, HostFunctionDescription, LayerDescription,
    MacroPropertyDescription, MessageDescription, ModelDescription, SubmodelDescription,
};
pub use error::{ModelError, ModelResult};
