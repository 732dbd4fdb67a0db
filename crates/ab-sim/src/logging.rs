//! Step and exit logging.
//!
//! A [`LoggingConfig`] names what to capture: environment properties, and
//! per agent state a population count and variable reductions.  The
//! simulation captures one [`LogFrame`] every `frequency` steps (step
//! logging) and one when the run ends (exit logging), collecting them in a
//! [`RunLog`] together with the run's timings.
//!
//! ```rust,ignore
//! let logging = StepLoggingConfig::new(
//!     LoggingConfig::new()
//!         .environment("speed")
//!         .agent(AgentLogConfig::new("bird", "default").count().reduce("x", Reduction::Mean)),
//! )
//! .frequency(10);
//! ```

use std::collections::BTreeMap;
use std::time::Duration;

use ab_agent::{AgentPopulation, Reduction};
use ab_core::{AbError, Value};
use ab_env::EnvironmentStore;
use ab_model::ModelDescription;

use crate::SimResult;

// ── Configuration ─────────────────────────────────────────────────────────────

/// What to log for one agent state.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct AgentLogConfig {
    pub agent:      String,
    pub state:      String,
    pub count:      bool,
    pub reductions: Vec<(String, Reduction)>,
}

impl AgentLogConfig {
    pub fn new(agent: impl Into<String>, state: impl Into<String>) -> Self {
        Self { agent: agent.into(), state: state.into(), count: false, reductions: Vec::new() }
    }

    pub fn count(mut self) -> Self {
        self.count = true;
        self
    }

    pub fn reduce(mut self, variable: impl Into<String>, reduction: Reduction) -> Self {
        self.reductions.push((variable.into(), reduction));
        self
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct LoggingConfig {
    pub environment: Vec<String>,
    pub agents:      Vec<AgentLogConfig>,
}

impl LoggingConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn environment(mut self, name: impl Into<String>) -> Self {
        self.environment.push(name.into());
        self
    }

    pub fn agent(mut self, agent: AgentLogConfig) -> Self {
        self.agents.push(agent);
        self
    }

    /// Check every name against `model`.
    pub fn validate(&self, model: &ModelDescription) -> SimResult<()> {
        for name in &self.environment {
            if !model.environment.iter().any(|p| p.name == *name) {
                return Err(AbError::not_found("environment property", name).into());
            }
        }
        for a in &self.agents {
            let agent = model.agent(&a.agent).ok_or_else(|| AbError::InvalidAgent(a.agent.clone()))?;
            if !agent.has_state(&a.state) {
                return Err(AbError::InvalidState { agent: a.agent.clone(), state: a.state.clone() }.into());
            }
            for (variable, _) in &a.reductions {
                if !agent.schema.iter().any(|v| v.name == *variable) {
                    return Err(AbError::not_found("variable", variable).into());
                }
            }
        }
        Ok(())
    }

    /// Capture a frame from the current state.
    pub(crate) fn capture(
        &self,
        step:   u64,
        env:    &EnvironmentStore,
        agents: &[AgentPopulation],
    ) -> SimResult<LogFrame> {
        let mut environment = BTreeMap::new();
        for name in &self.environment {
            environment.insert(name.clone(), env.values(name)?);
        }
        let mut records = Vec::with_capacity(self.agents.len());
        for a in &self.agents {
            let population = agents
                .iter()
                .find(|p| p.name() == a.agent)
                .ok_or_else(|| AbError::InvalidAgent(a.agent.clone()))?;
            let state = population.state(&a.state)?;
            let mut reductions = Vec::with_capacity(a.reductions.len());
            for (variable, reduction) in &a.reductions {
                reductions.push(ReductionRecord {
                    variable:  variable.clone(),
                    reduction: *reduction,
                    value:     state.reduce(variable, *reduction)?,
                });
            }
            records.push(AgentRecord {
                agent: a.agent.clone(),
                state: a.state.clone(),
                count: a.count.then_some(state.len()),
                reductions,
            });
        }
        Ok(LogFrame { step, environment, agents: records })
    }
}

/// A [`LoggingConfig`] captured every `frequency` steps.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct StepLoggingConfig {
    pub logging:   LoggingConfig,
    pub frequency: u32,
}

impl StepLoggingConfig {
    /// Logs every step.
    pub fn new(logging: LoggingConfig) -> Self {
        Self { logging, frequency: 1 }
    }

    pub fn frequency(mut self, frequency: u32) -> Self {
        self.frequency = frequency;
        self
    }

    /// `true` if the step that just completed (1-based) should be logged.
    pub fn due(&self, completed: u64) -> bool {
        self.frequency != 0 && completed % self.frequency as u64 == 0
    }
}

// ── Records ───────────────────────────────────────────────────────────────────

#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ReductionRecord {
    pub variable:  String,
    pub reduction: Reduction,
    /// `None` for an empty state.
    pub value:     Option<f64>,
}

#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct AgentRecord {
    pub agent:      String,
    pub state:      String,
    pub count:      Option<usize>,
    pub reductions: Vec<ReductionRecord>,
}

/// Everything captured at one point of a run.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct LogFrame {
    /// Steps completed when the frame was taken.
    pub step:        u64,
    pub environment: BTreeMap<String, Vec<Value>>,
    pub agents:      Vec<AgentRecord>,
}

impl LogFrame {
    pub fn agent(&self, agent: &str, state: &str) -> Option<&AgentRecord> {
        self.agents.iter().find(|r| r.agent == agent && r.state == state)
    }
}

/// Log of one run.
#[derive(Clone, Debug, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct RunLog {
    pub steps:          Vec<LogFrame>,
    pub exit:           Option<LogFrame>,
    /// Wall-clock time of each step; recorded when timing is enabled.
    pub step_timings:   Vec<Duration>,
    pub rtc_init:       Duration,
    pub init_functions: Duration,
    pub exit_functions: Duration,
    pub simulate:       Duration,
}

impl RunLog {
    pub fn clear(&mut self) {
        *self = RunLog::default();
    }
}
