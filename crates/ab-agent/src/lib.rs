//! `ab-agent` — agent population storage for the `rust_ab` runtime.
//!
//! # Crate layout
//!
//! | Module         | Contents                                                        |
//! |----------------|-----------------------------------------------------------------|
//! | [`state`]      | `AgentStateList` — one state's SoA columns, capacity, device charge |
//! | [`population`] | `AgentPopulation` — all states of one agent type plus pending births |
//! | [`vector`]     | `AgentVector` — host-side copy of a population for import/export |
//! | [`layout`]     | `VarLayout`, `NewAgentStorage`, `NewAgent` — byte-packed birth staging |
//! | [`ids`]        | `IdAllocator` — per-simulation monotonically increasing `AgentId`s |
//! | [`reduce`]     | `Reduction` — column reductions used by step logging             |
//!
//! # Feature flags
//!
//! | Flag    | Effect                                                 |
//! |---------|--------------------------------------------------------|
//! | `serde` | Derives `Serialize`/`Deserialize` on public enums.     |

pub mod error;
pub mod ids;
pub mod layout;
pub mod population;
pub mod reduce;
pub mod state;
pub mod vector;


pub use error::{AgentError, AgentResult};
pub use ids::IdAllocator;
pub use layout::{NewAgent, NewAgentStorage, VarLayout};
pub use population::AgentPopulation;
pub use reduce::Reduction;
pub use state::AgentStateList;
pub use vector::AgentVector;
