//! `ab-core` — foundational types for the `rust_ab` agent runtime.
//!
//! This crate is a dependency of every other `ab-*` crate.  It intentionally
//! has no `ab-*` dependencies and minimal external ones (only `rand` and
//! `thiserror`, plus optional `serde`).
//!
//! # What lives here
//!
//! | Module          | Contents                                                   |
//! |-----------------|------------------------------------------------------------|
//! | [`ids`]         | `AgentId`, `DeviceId`, `StreamId`, `InstanceId`            |
//! | [`types`]       | `VarType`, `Scalar`, `Value`, `ColumnData`, `VariableSpec` |
//! | [`columns`]     | `Columns` — schema-bound SoA row store shared by agents and messages |
//! | [`hash`]        | `namespace_hash` — stable 32-bit name hashing              |
//! | [`rng`]         | `AgentRng` (per-thread), `SimRng` (host), seed mixing      |
//! | [`config`]      | `SimConfig`                                                |
//! | [`error`]       | `AbError`, `AbResult`                                      |
//!
//! # Feature flags
//!
//! | Flag    | Effect                                                     |
//! |---------|------------------------------------------------------------|
//! | `serde` | Adds `Serialize`/`Deserialize` to all public types.        |

pub mod columns;
pub mod config;
pub mod error;
pub mod hash;
pub mod ids;
pub mod rng;
pub mod types;

#[cfg(test)]
mod tests;

// ── Re-exports ────────────────────────────────────────────────────────────────

pub use columns::{Columns, Row};
pub use config::{DEFAULT_SORT_PERIOD, SimConfig};
pub use error::{AbError, AbResult};
pub use hash::{combine_hash, namespace_hash};
pub use ids::{AgentId, DeviceId, InstanceId, StreamId};
pub use rng::{AgentRng, SimRng, mix_seed, time_seed};
pub use types::{
    ColumnData, ID_VARIABLE, RESERVED_PREFIX, Scalar, Value, VarType, VariableSpec, is_reserved,
};
