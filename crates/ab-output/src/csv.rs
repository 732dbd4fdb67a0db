//! CSV output backend.
//!
//! Creates three files in the configured output directory:
//! - `environment.csv`
//! - `agents.csv`
//! - `timings.csv`

use std::fs::File;
use std::path::Path;

use csv::Writer;
use tracing::debug;

use crate::writer::OutputWriter;
use crate::{AgentRow, EnvironmentRow, OutputError, OutputResult, TimingRow};

/// Writes a run log to three CSV files.
///
/// Missing values (the variable of a count, the value of a reduction over
/// an empty state, the step of a phase total) are written as empty fields.
pub struct CsvWriter {
    environment: Writer<File>,
    agents:      Writer<File>,
    timings:     Writer<File>,
    finished:    bool,
}

impl CsvWriter {
    /// Open (or create) the three CSV files in `dir` and write the header rows.
    pub fn new(dir: &Path) -> OutputResult<Self> {
        let mut environment = Writer::from_path(dir.join("environment.csv"))?;
        environment.write_record(["frame", "step", "property", "index", "value"])?;

        let mut agents = Writer::from_path(dir.join("agents.csv"))?;
        agents.write_record(["frame", "step", "agent", "state", "metric", "variable", "value"])?;

        let mut timings = Writer::from_path(dir.join("timings.csv"))?;
        timings.write_record(["phase", "step", "seconds"])?;

        Ok(Self { environment, agents, timings, finished: false })
    }

    fn check_open(&self) -> OutputResult<()> {
        if self.finished { Err(OutputError::Finished) } else { Ok(()) }
    }
}

fn opt<T: ToString>(v: Option<T>) -> String {
    v.map(|v| v.to_string()).unwrap_or_default()
}

impl OutputWriter for CsvWriter {
    fn write_environment(&mut self, rows: &[EnvironmentRow]) -> OutputResult<()> {
        self.check_open()?;
        for row in rows {
            self.environment.write_record(&[
                row.frame.name().to_string(),
                row.step.to_string(),
                row.property.clone(),
                row.index.to_string(),
                row.value.to_string(),
            ])?;
        }
        Ok(())
    }

    fn write_agents(&mut self, rows: &[AgentRow]) -> OutputResult<()> {
        self.check_open()?;
        for row in rows {
            self.agents.write_record(&[
                row.frame.name().to_string(),
                row.step.to_string(),
                row.agent.clone(),
                row.state.clone(),
                row.metric.clone(),
                opt(row.variable.as_deref()),
                opt(row.value),
            ])?;
        }
        Ok(())
    }

    fn write_timings(&mut self, rows: &[TimingRow]) -> OutputResult<()> {
        self.check_open()?;
        for row in rows {
            self.timings.write_record(&[row.phase.clone(), opt(row.step), row.seconds.to_string()])?;
        }
        Ok(())
    }

    fn finish(&mut self) -> OutputResult<()> {
        if self.finished {
            return Ok(());
        }
        self.finished = true;
        self.environment.flush()?;
        self.agents.flush()?;
        self.timings.flush()?;
        debug!("csv run log flushed");
        Ok(())
    }
}
