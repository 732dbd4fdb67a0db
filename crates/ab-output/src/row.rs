//! Flat rows written by output backends.
//!
//! A [`LogFrame`] is nested (environment arrays, agent states, reductions);
//! backends write it as two row kinds so every line has a fixed shape.
//! Timings of a finished run become [`TimingRow`]s.

use std::time::Duration;

use ab_sim::{LogFrame, RunLog};
use serde::Serialize;

/// Whether a frame was captured during the step loop or at exit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FrameKind {
    Step,
    Exit,
}

impl FrameKind {
    pub fn name(self) -> &'static str {
        match self {
            FrameKind::Step => "step",
            FrameKind::Exit => "exit",
        }
    }
}

/// One element of a logged environment property.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EnvironmentRow {
    pub frame:    FrameKind,
    pub step:     u64,
    pub property: String,
    /// Element index; `0` for scalar properties.
    pub index:    usize,
    pub value:    f64,
}

/// One logged quantity of an agent state: its count or a reduction.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AgentRow {
    pub frame:    FrameKind,
    pub step:     u64,
    pub agent:    String,
    pub state:    String,
    /// `"count"` or the reduction name (`"mean"`, `"max"`, …).
    pub metric:   String,
    /// Reduced variable; `None` for counts.
    pub variable: Option<String>,
    /// `None` when a reduction ran over an empty state.
    pub value:    Option<f64>,
}

/// Wall-clock time of one phase of a run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TimingRow {
    /// `"step"`, `"rtc_init"`, `"init_functions"`, `"exit_functions"` or
    /// `"simulate"`.
    pub phase:   String,
    /// Step index (0-based) for `"step"` rows.
    pub step:    Option<u64>,
    pub seconds: f64,
}

/// Environment rows of `frame`, in property-name order.
pub fn environment_rows(kind: FrameKind, frame: &LogFrame) -> Vec<EnvironmentRow> {
    frame
        .environment
        .iter()
        .flat_map(|(property, values)| {
            values.iter().enumerate().map(move |(index, v)| EnvironmentRow {
                frame: kind,
                step: frame.step,
                property: property.clone(),
                index,
                value: v.as_f64(),
            })
        })
        .collect()
}

/// Agent rows of `frame`: per record its count (if logged) then its
/// reductions in configured order.
pub fn agent_rows(kind: FrameKind, frame: &LogFrame) -> Vec<AgentRow> {
    let mut rows = Vec::new();
    for record in &frame.agents {
        let row = |metric: &str, variable: Option<&str>, value: Option<f64>| AgentRow {
            frame:    kind,
            step:     frame.step,
            agent:    record.agent.clone(),
            state:    record.state.clone(),
            metric:   metric.to_string(),
            variable: variable.map(str::to_string),
            value,
        };
        if let Some(count) = record.count {
            rows.push(row("count", None, Some(count as f64)));
        }
        for r in &record.reductions {
            rows.push(row(r.reduction.name(), Some(&r.variable), r.value));
        }
    }
    rows
}

/// Step timings followed by the phase totals of `log`.
pub fn timing_rows(log: &RunLog) -> Vec<TimingRow> {
    let phase = |name: &str, step: Option<u64>, d: Duration| TimingRow {
        phase:   name.to_string(),
        step,
        seconds: d.as_secs_f64(),
    };
    let mut rows: Vec<TimingRow> = log
        .step_timings
        .iter()
        .enumerate()
        .map(|(i, d)| phase("step", Some(i as u64), *d))
        .collect();
    rows.push(phase("rtc_init", None, log.rtc_init));
    rows.push(phase("init_functions", None, log.init_functions));
    rows.push(phase("exit_functions", None, log.exit_functions));
    rows.push(phase("simulate", None, log.simulate));
    rows
}
