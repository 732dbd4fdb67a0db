//! Simulation observer trait for progress reporting and data collection.

use crate::{LogFrame, RunLog};

/// Callbacks invoked by [`Simulation::simulate`][crate::Simulation::simulate]
/// at key points of the step loop.
///
/// All methods have default no-op implementations so implementors only need to
/// override what they care about.
///
/// # Example: progress printer
///
/// ```rust,ignore
/// struct ProgressPrinter { interval: u64 }
///
/// impl SimObserver for ProgressPrinter {
///     fn on_step_end(&mut self, step: u64, population: usize) {
///         if step % self.interval == 0 {
///             println!("step {step}: {population} agents");
///         }
///     }
/// }
/// ```
pub trait SimObserver {
    /// Called before any work of a step.  `step` counts completed steps.
    fn on_step_start(&mut self, _step: u64) {}

    /// Called after the step counter was incremented.
    ///
    /// `population` is the number of live agents across every agent type
    /// and state.
    fn on_step_end(&mut self, _step: u64, _population: usize) {}

    /// Called for every step or exit log frame as it is captured.
    fn on_log_frame(&mut self, _frame: &LogFrame) {}

    /// Called once after exit functions ran and the exit frame was captured.
    fn on_sim_end(&mut self, _log: &RunLog) {}
}

/// A [`SimObserver`] that does nothing.
pub struct NoopObserver;

impl SimObserver for NoopObserver {}
