//! Kernel launches.
//!
//! A launch runs one agent function over every live agent of one state.
//! Everything the kernel reads is borrowed immutably through a
//! [`LaunchContext`]; each thread works on a private copy of its agent's row
//! and returns it in a [`ThreadResult`].  [`LaunchContext::collect`] folds the
//! thread results, in thread order, into an owned [`LaunchOutput`] that the
//! scheduler applies after the layer's streams have joined.
//!
//! Threads of one launch run data-parallel on Rayon's pool when the
//! `parallel` feature is enabled.
//!
//! # Ensembles
//!
//! [`launch_ensemble`] runs the same kernel over several instances in one
//! launch.  Instance `i` owns threads `offsets[i]..offsets[i+1]` and each
//! thread finds its instance by binary search.

use std::sync::Arc;

use ab_core::{AbError, AgentRng, Columns, Row, VariableSpec, namespace_hash};
use ab_device::{DeviceExceptionBuffer, instance_offsets, resolve_instance};
use ab_env::{EnvSnapshot, MacroEnvironmentStore};
use ab_message::MessageList;
use tracing::debug;

use crate::device::ApiParts;
use crate::{AgentCondition, AgentFunction, AgentStatus, KernelFn, RuntimeError, RuntimeResult, VarBindings};

// ── LaunchContext ─────────────────────────────────────────────────────────────

/// A declared message or agent output.
struct OutputTarget {
    schema:   Arc<[VariableSpec]>,
    bindings: VarBindings,
}

impl OutputTarget {
    fn new(schema: &Arc<[VariableSpec]>) -> Self {
        Self { bindings: VarBindings::new(schema), schema: Arc::clone(schema) }
    }

    fn parts(&self) -> (&[VariableSpec], &VarBindings) {
        (&self.schema, &self.bindings)
    }
}

/// Inputs of one agent-function launch over one agent state.
///
/// Built fluently:
///
/// ```rust,ignore
/// let ctx = LaunchContext::new("move", state.columns(), &env, &macros, &exceptions)
///     .with_message_in(&location_list)
///     .with_message_out(location_list.schema(), false)
///     .with_seed(seed, step);
/// ```
pub struct LaunchContext<'a> {
    function:        &'a str,
    function_hash:   u32,
    agents:          &'a Columns,
    agent_bindings:  VarBindings,
    env:             &'a EnvSnapshot,
    macros:          &'a MacroEnvironmentStore,
    exceptions:      &'a DeviceExceptionBuffer,
    message_in:      Option<(&'a MessageList, VarBindings)>,
    message_out:     Option<OutputTarget>,
    optional_output: bool,
    agent_out:       Option<OutputTarget>,
    condition:       Option<&'a dyn AgentCondition>,
    death_enabled:   bool,
    seed:            u64,
    step:            u64,
}

impl<'a> LaunchContext<'a> {
    pub fn new(
        function:   &'a str,
        agents:     &'a Columns,
        env:        &'a EnvSnapshot,
        macros:     &'a MacroEnvironmentStore,
        exceptions: &'a DeviceExceptionBuffer,
    ) -> Self {
        Self {
            function,
            function_hash: namespace_hash(function),
            agent_bindings: VarBindings::new(agents.schema()),
            agents,
            env,
            macros,
            exceptions,
            message_in: None,
            message_out: None,
            optional_output: false,
            agent_out: None,
            condition: None,
            death_enabled: false,
            seed: 0,
            step: 0,
        }
    }

    pub fn with_message_in(mut self, list: &'a MessageList) -> Self {
        self.message_in = Some((list, VarBindings::new(list.schema())));
        self
    }

    /// Declare a message output.  With `optional` set, only agents that
    /// set a message variable emit one; otherwise every agent that runs
    /// emits a message.
    pub fn with_message_out(mut self, schema: &Arc<[VariableSpec]>, optional: bool) -> Self {
        self.message_out = Some(OutputTarget::new(schema));
        self.optional_output = optional;
        self
    }

    pub fn with_agent_out(mut self, schema: &Arc<[VariableSpec]>) -> Self {
        self.agent_out = Some(OutputTarget::new(schema));
        self
    }

    pub fn with_condition(mut self, condition: &'a dyn AgentCondition) -> Self {
        self.condition = Some(condition);
        self
    }

    pub fn with_death(mut self, enabled: bool) -> Self {
        self.death_enabled = enabled;
        self
    }

    pub fn with_seed(mut self, seed: u64, step: u64) -> Self {
        self.seed = seed;
        self.step = step;
        self
    }

    pub fn function(&self) -> &str {
        self.function
    }

    /// Threads this launch runs: one per live agent.
    pub fn threads(&self) -> RuntimeResult<u32> {
        thread_count(self.function, self.agents.len())
    }

    pub(crate) fn agents(&self) -> &'a Columns {
        self.agents
    }

    pub(crate) fn exceptions(&self) -> &'a DeviceExceptionBuffer {
        self.exceptions
    }

    pub(crate) fn condition(&self) -> Option<&'a dyn AgentCondition> {
        self.condition
    }

    pub(crate) fn message_in(&self) -> Option<(&'a MessageList, &VarBindings)> {
        self.message_in.as_ref().map(|(list, b)| (*list, b))
    }

    pub(crate) fn message_out_schema(&self) -> Option<(&[VariableSpec], &VarBindings)> {
        self.message_out.as_ref().map(OutputTarget::parts)
    }

    pub(crate) fn optional_output(&self) -> bool {
        self.optional_output
    }

    /// Borrowed state for the API of thread `index`.
    pub(crate) fn api_parts(&self, index: u32) -> ApiParts<'_> {
        ApiParts {
            schema:      self.agents.schema(),
            bindings:    &self.agent_bindings,
            env:         self.env,
            macros:      self.macros,
            exceptions:  self.exceptions,
            message_out: self.message_out.as_ref().map(OutputTarget::parts),
            agent_out:   self.agent_out.as_ref().map(OutputTarget::parts),
            rng:         AgentRng::for_thread(self.seed, self.step as u32, self.function_hash, index),
            step:        self.step,
        }
    }

    /// Fold thread results (in thread order) into the launch output.
    ///
    /// Re-raises the first device exception, then rejects deaths from a
    /// function without death enabled.
    pub fn collect(&self, results: Vec<ThreadResult>) -> RuntimeResult<LaunchOutput> {
        if let Some(message) = self.exceptions.take() {
            return Err(RuntimeError::DeviceException { function: self.function.to_owned(), message });
        }
        let mut agents = Columns::new(Arc::clone(self.agents.schema()));
        let mut ran = Vec::with_capacity(results.len());
        let mut alive = Vec::with_capacity(results.len());
        let mut messages = self.message_out.as_ref().map(|t| Columns::new(Arc::clone(&t.schema)));
        let mut births = self.agent_out.as_ref().map(|t| Columns::new(Arc::clone(&t.schema)));
        let mut deaths = 0usize;

        for r in results {
            agents.push_row(&r.row);
            ran.push(r.ran);
            alive.push(r.status == AgentStatus::Alive);
            if r.status == AgentStatus::Dead {
                deaths += 1;
            }
            if let (Some(out), Some(row)) = (&mut messages, &r.message) {
                out.push_row(row);
            }
            if let (Some(out), Some(row)) = (&mut births, &r.birth) {
                out.push_row(row);
            }
        }

        if deaths > 0 && !self.death_enabled {
            return Err(RuntimeError::AgentDeathNotEnabled { function: self.function.to_owned() });
        }
        debug!(
            function = self.function,
            agents = agents.len(),
            deaths,
            messages = messages.as_ref().map_or(0, Columns::len),
            births = births.as_ref().map_or(0, Columns::len),
            "launch complete"
        );
        Ok(LaunchOutput {
            agents,
            ran,
            alive: self.death_enabled.then_some(alive),
            messages,
            births,
        })
    }
}

// ── Results ───────────────────────────────────────────────────────────────────

/// What one agent thread produced.
#[derive(Debug)]
pub struct ThreadResult {
    pub row:     Row,
    /// `false` if the agent failed the function's condition.
    pub ran:     bool,
    pub status:  AgentStatus,
    pub message: Option<Row>,
    pub birth:   Option<Row>,
}

impl ThreadResult {
    /// An agent that sat out the launch.
    pub fn skipped(row: Row) -> Self {
        Self { row, ran: false, status: AgentStatus::Alive, message: None, birth: None }
    }
}

/// Owned result of one launch, applied by the scheduler after the join.
#[derive(Debug)]
pub struct LaunchOutput {
    /// Every agent row after the function ran, in launch order.
    pub agents:   Columns,
    pub ran:      Vec<bool>,
    /// Alive flags; recorded only for functions with death enabled.
    pub alive:    Option<Vec<bool>>,
    pub messages: Option<Columns>,
    pub births:   Option<Columns>,
}

// ── Launch ────────────────────────────────────────────────────────────────────

/// `agents` as a launch thread count.
pub(crate) fn thread_count(function: &str, agents: usize) -> RuntimeResult<u32> {
    u32::try_from(agents).map_err(|_| {
        AbError::InvalidArgument(format!(
            "agent function '{function}' launched over {agents} agents, more than {} threads",
            u32::MAX
        ))
        .into()
    })
}

fn run_threads<R, F>(threads: u32, body: F) -> Vec<R>
where
    R: Send,
    F: Fn(u32) -> R + Send + Sync,
{
    #[cfg(feature = "parallel")]
    {
        use rayon::prelude::*;
        (0..threads).into_par_iter().map(body).collect()
    }
    #[cfg(not(feature = "parallel"))]
    {
        (0..threads).map(body).collect()
    }
}

/// Run `kernel` once per agent of `ctx`.
pub fn launch(kernel: KernelFn, ctx: &LaunchContext<'_>, function: &dyn AgentFunction) -> RuntimeResult<LaunchOutput> {
    let results = run_threads(ctx.threads()?, |tid| kernel(ctx, function, tid));
    ctx.collect(results)
}

/// Run `kernel` across several instances in one launch.  Returns one output
/// per context, in order; empty instances get empty outputs.
pub fn launch_ensemble(
    kernel:   KernelFn,
    ctxs:     &[LaunchContext<'_>],
    function: &dyn AgentFunction,
) -> RuntimeResult<Vec<LaunchOutput>> {
    let counts: Vec<u32> = ctxs.iter().map(LaunchContext::threads).collect::<RuntimeResult<_>>()?;
    let offsets = instance_offsets(&counts)?;
    let total = offsets.last().copied().unwrap_or(0);

    let results = run_threads(total, |tid| {
        let instance = resolve_instance(&offsets, tid);
        (instance, kernel(&ctxs[instance], function, tid - offsets[instance]))
    });

    let mut per_instance: Vec<Vec<ThreadResult>> =
        counts.iter().map(|&n| Vec::with_capacity(n as usize)).collect();
    for (instance, result) in results {
        per_instance[instance].push(result);
    }
    ctxs.iter().zip(per_instance).map(|(ctx, results)| ctx.collect(results)).collect()
}
