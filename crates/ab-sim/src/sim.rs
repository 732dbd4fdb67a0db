//! The `Simulation` struct and its step loop.

use std::sync::Arc;
use std::time::{Duration, Instant};

use ab_agent::{AgentPopulation, AgentVector};
use ab_core::{AbError, DeviceId, Scalar, SimConfig, SimRng, Value, is_reserved};
use ab_device::{DeviceError, DeviceLease, DeviceRegistry, Stream};
use ab_env::{EnvironmentStore, HostMacroProperty, MacroEnvironmentStore};
use ab_message::MessageList;
use ab_model::{FunctionBody, HostFunctionDescription, ModelDescription};
use ab_runtime::{CompiledKernel, ExitStatus, HostApi, KernelCompiler, RuntimeError};
use tracing::{debug, info, trace};

use crate::scheduler::{self, function_kinds};
use crate::{
    AgentLifecycle, LoggingConfig, NoopObserver, RunLog, RunPlan, SimError, SimObserver, SimResult,
    StepLoggingConfig, SubmodelInstance,
};

/// Where a simulation is in its lifecycle.
///
/// ```text
/// Created → SingletonsInitialized → RtcCompiled → Running ⇄ Reset
///                                                    ↓
///                                                Destroyed
/// ```
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum SimPhase {
    /// Host-side storage exists; no device is bound.
    Created,
    /// Device leased; environment, messages and agents allocated.
    SingletonsInitialized,
    /// Runtime-compiled functions resolved.
    RtcCompiled,
    Running,
    /// Reset after running; the next step resumes from step 0.
    Reset,
    /// Device resources released.  No further steps.
    Destroyed,
}

// ── Simulation ────────────────────────────────────────────────────────────────

/// One instance of a model.
///
/// Holds every agent population, message list, environment and macro
/// property of the model, the compiled kernels and the nested submodel
/// instances.  The device is bound lazily: the first step (or the first
/// macro-property access) leases the configured device, allocates device
/// storage and compiles runtime functions.
///
/// Create via [`SimulationBuilder`][crate::SimulationBuilder] or
/// [`Simulation::new`].
pub struct Simulation {
    pub(crate) model:      Arc<ModelDescription>,
    pub(crate) config:     SimConfig,
    pub(crate) phase:      SimPhase,
    pub(crate) agents:     Vec<AgentPopulation>,
    pub(crate) messages:   Vec<MessageList>,
    pub(crate) env:        EnvironmentStore,
    pub(crate) macros:     MacroEnvironmentStore,
    /// Per agent, per function; `None` until a runtime function compiles.
    pub(crate) kernels:    Vec<Vec<Option<CompiledKernel>>>,
    pub(crate) compiler:   Option<Arc<dyn KernelCompiler>>,
    pub(crate) lifecycle:  AgentLifecycle,
    pub(crate) submodels:  Vec<SubmodelInstance>,
    pub(crate) rng:        SimRng,
    pub(crate) step_count: u64,
    pub(crate) step_logging: Option<StepLoggingConfig>,
    pub(crate) exit_logging: Option<LoggingConfig>,
    pub(crate) log:        RunLog,
    pinned_device:         Option<DeviceId>,
    device_generation:     u64,
    /// Dropped last so every allocation above is returned before the
    /// registry considers tearing the device down.
    lease:                 Option<DeviceLease>,
}

impl Simulation {
    /// A simulation of `model` with `config` and no runtime compiler.
    pub fn new(model: Arc<ModelDescription>, config: SimConfig) -> SimResult<Self> {
        crate::SimulationBuilder::new(model).config(config).build()
    }

    #[allow(clippy::too_many_arguments)]
    pub(crate) fn from_parts(
        model:     Arc<ModelDescription>,
        config:    SimConfig,
        agents:    Vec<AgentPopulation>,
        messages:  Vec<MessageList>,
        env:       EnvironmentStore,
        macros:    MacroEnvironmentStore,
        kernels:   Vec<Vec<Option<CompiledKernel>>>,
        compiler:  Option<Arc<dyn KernelCompiler>>,
        submodels: Vec<SubmodelInstance>,
        rng:       SimRng,
    ) -> Self {
        Self {
            lifecycle: AgentLifecycle::new(&model),
            model,
            config,
            phase: SimPhase::Created,
            agents,
            messages,
            env,
            macros,
            kernels,
            compiler,
            submodels,
            rng,
            step_count: 0,
            step_logging: None,
            exit_logging: None,
            log: RunLog::default(),
            pinned_device: None,
            device_generation: 0,
            lease: None,
        }
    }

    // ── Accessors ─────────────────────────────────────────────────────────

    pub fn model(&self) -> &Arc<ModelDescription> {
        &self.model
    }

    pub fn config(&self) -> &SimConfig {
        &self.config
    }

    pub fn phase(&self) -> SimPhase {
        self.phase
    }

    /// Completed steps since creation or the last reset.
    pub fn step_count(&self) -> u64 {
        self.step_count
    }

    /// Seed the current run's random streams derive from.
    pub fn seed(&self) -> u64 {
        self.rng.seed()
    }

    /// Device the simulation is bound to, once bound.
    pub fn device(&self) -> Option<DeviceId> {
        self.pinned_device
    }

    pub fn submodel(&self, name: &str) -> Option<&SubmodelInstance> {
        self.submodels.iter().find(|s| s.name() == name)
    }

    pub fn run_log(&self) -> &RunLog {
        &self.log
    }

    pub fn elapsed_rtc_initialisation(&self) -> Duration {
        self.log.rtc_init
    }

    pub fn elapsed_init_functions(&self) -> Duration {
        self.log.init_functions
    }

    pub fn elapsed_exit_functions(&self) -> Duration {
        self.log.exit_functions
    }

    pub fn elapsed_simulate(&self) -> Duration {
        self.log.simulate
    }

    /// Per-step timings; recorded only with `SimConfig::timing`.
    pub fn elapsed_steps(&self) -> &[Duration] {
        &self.log.step_timings
    }

    /// Live agents across every agent type and state.
    pub fn population(&self) -> usize {
        self.agents.iter().map(AgentPopulation::total).sum()
    }

    pub(crate) fn agent_index(&self, agent: &str) -> SimResult<usize> {
        self.model.agent_index(agent).ok_or_else(|| AbError::InvalidAgent(agent.to_owned()).into())
    }

    pub(crate) fn message_index(&self, message: &str) -> SimResult<usize> {
        self.model.message_index(message).ok_or_else(|| AbError::not_found("message", message).into())
    }

    // ── Configuration ─────────────────────────────────────────────────────

    /// Replace the run configuration.
    ///
    /// Once a device is bound the device id is pinned; asking for another
    /// fails with `DeviceChanged`.  A changed seed reseeds immediately.
    pub fn apply_config(&mut self, config: SimConfig) -> SimResult<()> {
        if let Some(pinned) = self.pinned_device {
            if config.device_id != pinned {
                return Err(DeviceError::DeviceChanged { pinned, requested: config.device_id }.into());
            }
        }
        let reseed = config.random_seed != self.config.random_seed;
        self.config = config;
        if reseed {
            self.rng.reseed(self.config.resolve_seed());
            debug!(seed = self.rng.seed(), "simulation reseeded");
        }
        Ok(())
    }

    /// Validate and install a step logging configuration.
    pub fn set_step_logging(&mut self, logging: StepLoggingConfig) -> SimResult<()> {
        logging.logging.validate(&self.model)?;
        self.step_logging = Some(logging);
        Ok(())
    }

    /// Validate and install an exit logging configuration.
    pub fn set_exit_logging(&mut self, logging: LoggingConfig) -> SimResult<()> {
        logging.validate(&self.model)?;
        self.exit_logging = Some(logging);
        Ok(())
    }

    /// Apply `plan`'s step limit, seed and environment overrides.
    pub fn apply_plan(&mut self, plan: &RunPlan) -> SimResult<()> {
        if plan.model_id() != self.model.id {
            return Err(SimError::invalid(format!(
                "run plan belongs to model {}, not '{}' ({})",
                plan.model_id(),
                self.model.name,
                self.model.id
            )));
        }
        self.config.steps = plan.steps;
        if let Some(seed) = plan.seed {
            self.config.random_seed = Some(seed);
            self.rng.reseed(seed);
        }
        for (name, values) in &plan.environment {
            self.set_environment_array(name, values)?;
        }
        Ok(())
    }

    // ── Environment ───────────────────────────────────────────────────────

    pub fn get_environment<T: Scalar>(&self, name: &str) -> SimResult<T> {
        Ok(self.env.get::<T>(name)?)
    }

    pub fn get_environment_array<T: Scalar>(&self, name: &str) -> SimResult<Vec<T>> {
        Ok(self.env.get_array::<T>(name)?)
    }

    /// Set element 0 of `name`; returns the previous value.
    pub fn set_environment<T: Scalar>(&mut self, name: &str, value: T) -> SimResult<T> {
        if is_reserved(name) {
            return Err(AbError::ReservedName(name.to_owned()).into());
        }
        Ok(self.env.set::<T>(name, value)?)
    }

    pub fn set_environment_array(&mut self, name: &str, values: &[Value]) -> SimResult<()> {
        if is_reserved(name) {
            return Err(AbError::ReservedName(name.to_owned()).into());
        }
        Ok(self.env.override_values(name, values)?)
    }

    /// Host handle to macro property `name`.  Binds the device if needed.
    pub fn macro_property<T: Scalar>(&mut self, name: &str, dims: [u32; 4]) -> SimResult<HostMacroProperty<T>> {
        if self.phase == SimPhase::Created {
            self.init_singletons()?;
        }
        Ok(self.macros.get_accessor::<T>(name, dims)?)
    }

    // ── Populations ───────────────────────────────────────────────────────

    /// Replace the agents of `agent` in `state` with a copy of `vector`.
    pub fn set_population_data(&mut self, agent: &str, state: &str, vector: &AgentVector) -> SimResult<()> {
        let i = self.agent_index(agent)?;
        self.agents[i].set_population(state, vector)?;
        self.lifecycle.invalidate_ids();
        self.charge_agents()?;
        debug!(agent, state, count = vector.len(), "population imported");
        Ok(())
    }

    pub fn get_population_data(&self, agent: &str, state: &str) -> SimResult<AgentVector> {
        let i = self.agent_index(agent)?;
        Ok(self.agents[i].get_population(state)?)
    }

    pub fn agent_count(&self, agent: &str, state: &str) -> SimResult<usize> {
        let i = self.agent_index(agent)?;
        Ok(self.agents[i].count(state)?)
    }

    /// Run `f` with host access outside the step loop.  Agents it creates
    /// are merged before this returns.
    pub fn with_host<R>(&mut self, f: impl FnOnce(&mut HostApi<'_>) -> SimResult<R>) -> SimResult<R> {
        let mut api = HostApi::new(&mut self.agents, &self.env, &self.macros, &mut self.rng, self.step_count);
        let result = f(&mut api)?;
        if api.populations_replaced() {
            self.lifecycle.invalidate_ids();
        }
        self.lifecycle.flush_births(&mut self.agents)?;
        self.charge_agents()?;
        Ok(result)
    }

    // ── Lazy initialisation ───────────────────────────────────────────────

    pub(crate) fn ensure_ready(&mut self) -> SimResult<()> {
        if self.phase == SimPhase::Destroyed {
            return Err(AbError::NotInitialized("destroyed simulation").into());
        }
        if self.phase == SimPhase::Created {
            self.init_singletons()?;
        }
        if self.phase == SimPhase::SingletonsInitialized {
            self.compile_runtime_functions()?;
        }
        Ok(())
    }

    fn init_singletons(&mut self) -> SimResult<()> {
        let lease = DeviceRegistry::global().acquire(
            self.config.device_id,
            self.config.device_memory_limit,
            self.config.auto_device_reset,
        )?;
        let memory = Arc::clone(lease.memory());
        self.pinned_device = Some(lease.device());
        self.device_generation = memory.generation();
        self.lease = Some(lease);

        self.macros.allocate(&memory)?;
        for list in &mut self.messages {
            list.init(&memory)?;
        }
        self.charge_agents()?;

        for sub in &mut self.submodels {
            sub.bind(&self.macros)?;
        }
        self.phase = SimPhase::SingletonsInitialized;
        info!(model = %self.model.name, device = %memory.device(), "device bound");
        Ok(())
    }

    fn compile_runtime_functions(&mut self) -> SimResult<()> {
        let start = Instant::now();
        let model = Arc::clone(&self.model);
        let mut compiled = 0;
        for (a, agent) in model.agents.iter().enumerate() {
            for (f, function) in agent.functions.iter().enumerate() {
                let FunctionBody::Runtime { source } = &function.body else { continue };
                if self.kernels[a][f].is_some() {
                    continue;
                }
                let compiler = self.compiler.as_ref().ok_or_else(|| RuntimeError::Compile {
                    function: function.name.clone(),
                    reason:   "no kernel compiler configured".to_owned(),
                })?;
                let (input, output) = function_kinds(&model, function)?;
                self.kernels[a][f] = Some(compiler.compile(&function.name, source, input, output)?);
                compiled += 1;
            }
        }
        self.log.rtc_init = start.elapsed();
        self.phase = SimPhase::RtcCompiled;
        if compiled > 0 {
            info!(model = %model.name, compiled, elapsed = ?self.log.rtc_init, "runtime functions compiled");
        }
        Ok(())
    }

    pub(crate) fn charge_agents(&mut self) -> SimResult<()> {
        if let Some(lease) = &self.lease {
            for population in &mut self.agents {
                population.charge(lease.memory())?;
            }
        }
        Ok(())
    }

    // ── Host functions ────────────────────────────────────────────────────

    pub(crate) fn run_host(&mut self, functions: &[HostFunctionDescription]) -> SimResult<()> {
        if functions.is_empty() {
            return Ok(());
        }
        let mut api = HostApi::new(&mut self.agents, &self.env, &self.macros, &mut self.rng, self.step_count);
        for f in functions {
            trace!(function = %f.name, "host function");
            f.function.run(&mut api)?;
        }
        if api.populations_replaced() {
            self.lifecycle.invalidate_ids();
        }
        Ok(())
    }

    /// `true` if any exit condition asked to stop.
    fn check_exit_conditions(&mut self) -> SimResult<bool> {
        let model = Arc::clone(&self.model);
        let mut api = HostApi::new(&mut self.agents, &self.env, &self.macros, &mut self.rng, self.step_count);
        let mut exit = false;
        for c in &model.exit_conditions {
            if c.condition.check(&mut api)? == ExitStatus::Exit {
                debug!(condition = %c.name, step = self.step_count, "exit condition fired");
                exit = true;
                break;
            }
        }
        if api.populations_replaced() {
            self.lifecycle.invalidate_ids();
        }
        Ok(exit)
    }

    /// Clear every macro race flag and wait for the clear.
    pub(crate) fn reset_race_flags(&self) {
        let mut streams = Stream::set(1);
        self.macros.reset_race_flags(&mut streams);
        Stream::synchronize_all(&mut streams);
    }

    // ── Step loop ─────────────────────────────────────────────────────────

    /// Run init functions, then step until the step limit or an exit
    /// condition, then exit functions.
    pub fn simulate(&mut self) -> SimResult<()> {
        self.simulate_with(&mut NoopObserver)
    }

    /// [`apply_plan`](Self::apply_plan) then [`simulate`](Self::simulate).
    pub fn simulate_plan(&mut self, plan: &RunPlan) -> SimResult<()> {
        self.apply_plan(plan)?;
        self.simulate()
    }

    pub fn simulate_with<O: SimObserver + ?Sized>(&mut self, observer: &mut O) -> SimResult<()> {
        let start = Instant::now();
        self.begin_simulation()?;
        let mut completed: u32 = 0;
        while !self.config.step_limit_reached(completed) {
            let proceed = self.step_with(observer)?;
            completed = completed.saturating_add(1);
            if !proceed {
                break;
            }
        }
        self.finish_simulation(observer, start)
    }

    /// Run one step.  Returns `Ok(false)` when an exit condition fired.
    pub fn step(&mut self) -> SimResult<bool> {
        self.step_with(&mut NoopObserver)
    }

    pub fn step_with<O: SimObserver + ?Sized>(&mut self, observer: &mut O) -> SimResult<bool> {
        let started = self.begin_step(observer)?;
        for layer in 0..self.model.layers.len() {
            scheduler::run_layer(&mut [&mut *self], layer)?;
        }
        self.end_step(observer, started)
    }

    /// Bind the device, run init functions and merge their births.
    pub(crate) fn begin_simulation(&mut self) -> SimResult<()> {
        self.ensure_ready()?;
        info!(
            model = %self.model.name,
            steps = self.config.steps,
            seed = self.rng.seed(),
            "simulation started"
        );
        let model = Arc::clone(&self.model);
        let start = Instant::now();
        self.run_host(&model.init_functions)?;
        self.log.init_functions = start.elapsed();
        let born = self.lifecycle.flush_births(&mut self.agents)?;
        self.charge_agents()?;
        if born > 0 {
            debug!(born, "init births merged");
        }
        Ok(())
    }

    /// Run exit functions, capture the exit frame and notify the observer.
    pub(crate) fn finish_simulation<O: SimObserver + ?Sized>(&mut self, observer: &mut O, start: Instant) -> SimResult<()> {
        let model = Arc::clone(&self.model);
        let exit_start = Instant::now();
        self.run_host(&model.exit_functions)?;
        self.log.exit_functions = exit_start.elapsed();
        self.lifecycle.flush_births(&mut self.agents)?;
        self.charge_agents()?;

        if let Some(logging) = &self.exit_logging {
            let frame = logging.capture(self.step_count, &self.env, &self.agents)?;
            observer.on_log_frame(&frame);
            self.log.exit = Some(frame);
        }
        self.log.simulate = start.elapsed();
        info!(
            model = %self.model.name,
            steps = self.step_count,
            population = self.population(),
            elapsed = ?self.log.simulate,
            "simulation finished"
        );
        observer.on_sim_end(&self.log);
        Ok(())
    }

    /// Everything before the first layer: initialisation, ID checks and the
    /// periodic spatial sort.
    pub(crate) fn begin_step<O: SimObserver + ?Sized>(&mut self, observer: &mut O) -> SimResult<Instant> {
        self.ensure_ready()?;
        self.phase = SimPhase::Running;
        observer.on_step_start(self.step_count);
        let started = Instant::now();
        self.lifecycle.ensure_ids(&mut self.agents)?;
        let period = self.config.sort_period as u64;
        if period != 0 && self.step_count % period == 0 {
            let sorted = self.lifecycle.sort(&mut self.agents, &self.messages)?;
            if sorted > 0 {
                trace!(sorted, step = self.step_count, "agent states sorted");
            }
        }
        Ok(started)
    }

    /// Everything after the last layer: step functions, exit conditions,
    /// host births, the counter and logging.
    pub(crate) fn end_step<O: SimObserver + ?Sized>(&mut self, observer: &mut O, started: Instant) -> SimResult<bool> {
        let model = Arc::clone(&self.model);
        self.reset_race_flags();
        self.run_host(&model.step_functions)?;
        let exit = self.check_exit_conditions()?;
        let born = self.lifecycle.flush_births(&mut self.agents)?;
        self.charge_agents()?;
        self.step_count += 1;

        if let Some(logging) = &self.step_logging {
            if logging.due(self.step_count) {
                let frame = logging.logging.capture(self.step_count, &self.env, &self.agents)?;
                observer.on_log_frame(&frame);
                self.log.steps.push(frame);
            }
        }
        let elapsed = started.elapsed();
        if self.config.timing {
            self.log.step_timings.push(elapsed);
        }
        debug!(step = self.step_count, born, population = self.population(), ?elapsed, "step complete");
        observer.on_step_end(self.step_count, self.population());
        Ok(!exit)
    }

    // ── Submodels ─────────────────────────────────────────────────────────

    pub(crate) fn run_submodel(&mut self, name: &str) -> SimResult<()> {
        let sub = self
            .submodels
            .iter_mut()
            .find(|s| s.name() == name)
            .ok_or_else(|| AbError::not_found("submodel", name))?;
        let steps = sub.run()?;
        debug!(submodel = name, steps, "submodel complete");
        Ok(())
    }

    // ── Reset and teardown ────────────────────────────────────────────────

    /// Return to step 0: clear agents and messages, restore environment
    /// defaults, zero macro properties, reseed and clear the run log.
    pub fn reset(&mut self) -> SimResult<()> {
        self.reset_internal(false)
    }

    /// `submodel_reset` keeps mapped environment and macro properties (they
    /// belong to the parent) and keeps the random stream.
    pub(crate) fn reset_internal(&mut self, submodel_reset: bool) -> SimResult<()> {
        if self.phase == SimPhase::Destroyed {
            return Err(AbError::NotInitialized("destroyed simulation").into());
        }
        for population in &mut self.agents {
            population.clear();
        }
        for list in &mut self.messages {
            list.clear();
        }
        self.env.reset_to_defaults(submodel_reset);
        self.macros.zero_all();
        if !submodel_reset {
            self.rng.reseed(self.config.resolve_seed());
        }
        self.step_count = 0;
        self.lifecycle.reset();
        let rtc_init = self.log.rtc_init;
        self.log.clear();
        self.log.rtc_init = rtc_init;
        for sub in &mut self.submodels {
            sub.reset()?;
        }
        if self.phase == SimPhase::Running {
            self.phase = SimPhase::Reset;
        }
        debug!(model = %self.model.name, submodel_reset, "simulation reset");
        Ok(())
    }

    /// Release every device resource and the device lease.
    pub fn destroy(&mut self) {
        for sub in &mut self.submodels {
            sub.destroy();
        }
        if let Some(lease) = self.lease.take() {
            if lease.memory().generation() != self.device_generation {
                self.macros.purge();
            } else {
                self.macros.release();
            }
            for list in &mut self.messages {
                list.free();
            }
            for population in &mut self.agents {
                population.release();
            }
            drop(lease);
        }
        self.phase = SimPhase::Destroyed;
        debug!(model = %self.model.name, "simulation destroyed");
    }
}

impl std::fmt::Debug for Simulation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Simulation")
            .field("model", &self.model.name)
            .field("phase", &self.phase)
            .field("step_count", &self.step_count)
            .field("device", &self.pinned_device)
            .finish_non_exhaustive()
    }
}
