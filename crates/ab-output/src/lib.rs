//! `ab-output` — run-log writers for the rust_ab agent runtime.
//!
//! Two backends are provided:
//!
//! | Backend | Writer       | Files created                                      |
//! |---------|--------------|----------------------------------------------------|
//! | CSV     | `CsvWriter`  | `environment.csv`, `agents.csv`, `timings.csv`     |
//! | JSON    | `JsonWriter` | `run_log.json`                                     |
//!
//! Both implement [`OutputWriter`] and are driven by [`SimOutputObserver`],
//! which implements `ab_sim::SimObserver`, or by [`write_run_log`] for a
//! log that is already complete.
//!
//! # Usage
//!
//! ```rust,ignore
//! use ab_output::{CsvWriter, SimOutputObserver};
//!
//! let writer = CsvWriter::new(Path::new("./output"))?;
//! let mut obs = SimOutputObserver::new(writer);
//! sim.simulate_with(&mut obs)?;
//! if let Some(e) = obs.take_error() {
//!     eprintln!("output error: {e}");
//! }
//! ```

pub mod csv;
pub mod error;
pub mod json;
pub mod observer;
pub mod row;
pub mod writer;

#[cfg(test)]
mod tests;

pub use crate::csv::CsvWriter;
pub use error::{OutputError, OutputResult};
pub use json::JsonWriter;
pub use observer::{SimOutputObserver, write_frame, write_run_log};
pub use row::{AgentRow, EnvironmentRow, FrameKind, TimingRow};
pub use writer::OutputWriter;
