//! The `OutputWriter` trait implemented by all backend writers.

use crate::{AgentRow, EnvironmentRow, OutputResult, TimingRow};

/// Trait implemented by the CSV and JSON writers.
///
/// All methods are infallible from the observer's perspective; errors are
/// stored internally and retrieved with
/// [`SimOutputObserver::take_error`][crate::SimOutputObserver::take_error].
pub trait OutputWriter {
    fn write_environment(&mut self, rows: &[EnvironmentRow]) -> OutputResult<()>;

    fn write_agents(&mut self, rows: &[AgentRow]) -> OutputResult<()>;

    fn write_timings(&mut self, rows: &[TimingRow]) -> OutputResult<()>;

    /// Flush and close all underlying file handles.
    ///
    /// Idempotent; safe to call more than once.
    fn finish(&mut self) -> OutputResult<()>;
}
