//! `ab-env` — model-wide shared state.
//!
//! | Module         | Contents                                                          |
//! |----------------|-------------------------------------------------------------------|
//! | [`property`]   | `EnvironmentStore` — small typed properties, snapshot per launch  |
//! | [`macro_env`]  | `MacroEnvironmentStore` — 4-D device-resident arrays, race flags, host/device accessors |
//! | [`error`]      | `EnvError`, `EnvResult<T>`                                        |
//!
//! # Feature flags
//!
//! | Flag        | Effect                                                          |
//! |-------------|-----------------------------------------------------------------|
//! | `seatbelts` | *(default)* race-flag checks on host and device macro access    |
//! | `fx-hash`   | FxHash for the host accessor cache                              |
//! | `serde`     | Derives `Serialize`/`Deserialize` on public types               |

pub mod error;
pub mod macro_env;
pub mod property;

#[cfg(test)]
mod tests;

pub use error::{EnvError, EnvResult};
pub use macro_env::{
    DeviceMacroProperty, HostMacroProperty, MacroBuffer, MacroEnvironmentStore, MacroStorage,
    READ_FLAG, WRITE_FLAG,
};
pub use property::{EnvSnapshot, EnvironmentStore};
