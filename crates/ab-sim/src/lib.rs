//! `ab-sim` — simulation driver for the rust_ab agent runtime.
//!
//! # One step
//!
//! ```text
//! step (step_count = s):
//!   ① Prepare   — bind the device and compile runtime functions on first
//!                 use; assign missing agent IDs; every `sort_period`
//!                 steps, sort spatially-queried states by grid bin.
//!   ② Layers    — for each layer in order: launch its agent functions,
//!                 join, apply outputs, publish messages, merge device
//!                 births, run its host functions (see `scheduler`).
//!   ③ Step fns  — macro race flags cleared; step functions run.
//!   ④ Exit      — exit conditions run in order; the first `Exit` stops
//!                 the run after this step.
//!   ⑤ Finish    — host births merged; step_count = s + 1; step log frame
//!                 captured if due; timing recorded.
//! ```
//!
//! `simulate()` runs init functions once, steps until the step limit or an
//! exit condition, then runs exit functions and captures the exit frame.
//!
//! # Lifecycle
//!
//! | Phase                   | Entered by                                    |
//! |-------------------------|-----------------------------------------------|
//! | `Created`               | `SimulationBuilder::build`                    |
//! | `SingletonsInitialized` | first step or macro-property access           |
//! | `RtcCompiled`           | runtime functions compiled after binding      |
//! | `Running`               | first step                                    |
//! | `Reset`                 | `reset()` after running                       |
//! | `Destroyed`             | `destroy()`; further steps fail               |
//!
//! # Cargo features
//!
//! | Feature     | Effect                                                       |
//! |-------------|--------------------------------------------------------------|
//! | `parallel`  | Agents run data-parallel on Rayon; layer streams drain on    |
//! |             | their own threads.                                           |
//! | `seatbelts` | Macro-property race checks on host and device.               |
//! | `fx-hash`   | FxHash for per-layer bookkeeping and the macro accessor cache.|
//! | `serde`     | Serialize/Deserialize on configs, plans and log frames.      |
//!
//! # Quick-start
//!
//! ```rust,ignore
//! use ab_core::SimConfig;
//! use ab_model::ModelBuilder;
//! use ab_sim::SimulationBuilder;
//!
//! let model = ModelBuilder::new("boids") /* agents, messages, layers */ .build()?;
//! let mut sim = SimulationBuilder::new(model)
//!     .config(SimConfig { steps: 100, random_seed: Some(42), ..SimConfig::default() })
//!     .build()?;
//! sim.set_population_data("bird", "default", &flock)?;
//! sim.simulate()?;
//! ```

pub mod builder;
pub mod ensemble;
pub mod error;
pub mod lifecycle;
pub mod logging;
pub mod observer;
pub mod plan;
pub(crate) mod scheduler;
pub mod sim;
pub mod submodel;


pub use builder::SimulationBuilder;
pub use ensemble::Ensemble;
pub use error::{SimError, SimResult};
pub use lifecycle::{AgentLifecycle, SortTarget};
pub use logging::{AgentLogConfig, AgentRecord, LogFrame, LoggingConfig, ReductionRecord, RunLog, StepLoggingConfig};
pub use observer::{NoopObserver, SimObserver};
pub use plan::RunPlan;
pub use sim::{SimPhase, Simulation};
pub use submodel::SubmodelInstance;
