//! JSON output backend.
//!
//! Rows are buffered and written as one document to `run_log.json` when the
//! writer finishes:
//!
//! ```json
//! { "environment": [ ... ], "agents": [ ... ], "timings": [ ... ] }
//! ```

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::debug;

use crate::writer::OutputWriter;
use crate::{AgentRow, EnvironmentRow, OutputError, OutputResult, TimingRow};

#[derive(Serialize)]
struct Document<'a> {
    environment: &'a [EnvironmentRow],
    agents:      &'a [AgentRow],
    timings:     &'a [TimingRow],
}

pub struct JsonWriter {
    path:        PathBuf,
    /// `None` once finished.
    file:        Option<BufWriter<File>>,
    pretty:      bool,
    environment: Vec<EnvironmentRow>,
    agents:      Vec<AgentRow>,
    timings:     Vec<TimingRow>,
}

impl JsonWriter {
    /// Create `run_log.json` in `dir`.  The file stays empty until
    /// [`finish`][OutputWriter::finish].
    pub fn new(dir: &Path) -> OutputResult<Self> {
        let path = dir.join("run_log.json");
        let file = BufWriter::new(File::create(&path)?);
        Ok(Self {
            path,
            file:        Some(file),
            pretty:      false,
            environment: Vec::new(),
            agents:      Vec::new(),
            timings:     Vec::new(),
        })
    }

    /// Indent the document.
    pub fn pretty(mut self) -> Self {
        self.pretty = true;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn check_open(&self) -> OutputResult<()> {
        if self.file.is_none() { Err(OutputError::Finished) } else { Ok(()) }
    }
}

impl OutputWriter for JsonWriter {
    fn write_environment(&mut self, rows: &[EnvironmentRow]) -> OutputResult<()> {
        self.check_open()?;
        self.environment.extend_from_slice(rows);
        Ok(())
    }

    fn write_agents(&mut self, rows: &[AgentRow]) -> OutputResult<()> {
        self.check_open()?;
        self.agents.extend_from_slice(rows);
        Ok(())
    }

    fn write_timings(&mut self, rows: &[TimingRow]) -> OutputResult<()> {
        self.check_open()?;
        self.timings.extend_from_slice(rows);
        Ok(())
    }

    fn finish(&mut self) -> OutputResult<()> {
        let Some(mut file) = self.file.take() else {
            return Ok(());
        };
        let document = Document {
            environment: &self.environment,
            agents:      &self.agents,
            timings:     &self.timings,
        };
        if self.pretty {
            serde_json::to_writer_pretty(&mut file, &document)?;
        } else {
            serde_json::to_writer(&mut file, &document)?;
        }
        file.flush()?;
        debug!(
            path = %self.path.display(),
            environment = self.environment.len(),
            agents = self.agents.len(),
            timings = self.timings.len(),
            "json run log written"
        );
        Ok(())
    }
}
