//! `SimOutputObserver<W>` — bridges `SimObserver` to an `OutputWriter`.

use ab_sim::{LogFrame, RunLog, SimObserver};

use crate::row::{FrameKind, agent_rows, environment_rows, timing_rows};
use crate::writer::OutputWriter;
use crate::{OutputError, OutputResult};

/// A [`SimObserver`] that writes every captured log frame and the run's
/// timings to any [`OutputWriter`] backend.
///
/// Errors from the writer are stored internally because `SimObserver` methods
/// have no return value.  After `sim.simulate_with()` returns, check for
/// errors with [`take_error`][Self::take_error].
pub struct SimOutputObserver<W: OutputWriter> {
    writer:     W,
    /// Between `on_step_start` and `on_step_end`; frames seen outside a
    /// step are exit frames.
    in_step:    bool,
    frames:     u64,
    last_error: Option<OutputError>,
}

impl<W: OutputWriter> SimOutputObserver<W> {
    pub fn new(writer: W) -> Self {
        Self { writer, in_step: false, frames: 0, last_error: None }
    }

    /// Take the stored write error (if any) after the run returns.
    ///
    /// Returns `None` if all writes succeeded.
    pub fn take_error(&mut self) -> Option<OutputError> {
        self.last_error.take()
    }

    /// Number of frames handed to the writer.
    pub fn frames(&self) -> u64 {
        self.frames
    }

    /// Unwrap the inner writer (e.g. to inspect files after the sim).
    pub fn into_writer(self) -> W {
        self.writer
    }

    fn store_err(&mut self, result: OutputResult<()>) {
        if let Err(e) = result {
            // Keep only the first error.
            if self.last_error.is_none() {
                self.last_error = Some(e);
            }
        }
    }
}

/// Write `frame` as environment and agent rows.
pub fn write_frame<W: OutputWriter + ?Sized>(writer: &mut W, kind: FrameKind, frame: &LogFrame) -> OutputResult<()> {
    let environment = environment_rows(kind, frame);
    if !environment.is_empty() {
        writer.write_environment(&environment)?;
    }
    let agents = agent_rows(kind, frame);
    if !agents.is_empty() {
        writer.write_agents(&agents)?;
    }
    Ok(())
}

/// Write a finished run's log (step frames, exit frame, timings) and finish
/// the writer.  Used for runs that were not observed while stepping, such as
/// ensemble instances.
pub fn write_run_log<W: OutputWriter + ?Sized>(writer: &mut W, log: &RunLog) -> OutputResult<()> {
    for frame in &log.steps {
        write_frame(writer, FrameKind::Step, frame)?;
    }
    if let Some(frame) = &log.exit {
        write_frame(writer, FrameKind::Exit, frame)?;
    }
    writer.write_timings(&timing_rows(log))?;
    writer.finish()
}

impl<W: OutputWriter> SimObserver for SimOutputObserver<W> {
    fn on_step_start(&mut self, _step: u64) {
        self.in_step = true;
    }

    fn on_step_end(&mut self, _step: u64, _population: usize) {
        self.in_step = false;
    }

    fn on_log_frame(&mut self, frame: &LogFrame) {
        let kind = if self.in_step { FrameKind::Step } else { FrameKind::Exit };
        self.frames += 1;
        let result = write_frame(&mut self.writer, kind, frame);
        self.store_err(result);
    }

    fn on_sim_end(&mut self, log: &RunLog) {
        let result = self.writer.write_timings(&timing_rows(log)).and_then(|()| self.writer.finish());
        self.store_err(result);
    }
}
