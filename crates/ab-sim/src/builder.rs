//! Fluent builder for constructing a [`Simulation`].

use std::sync::Arc;

use ab_agent::AgentPopulation;
use ab_core::{SimConfig, SimRng, namespace_hash};
use ab_env::{EnvironmentStore, MacroEnvironmentStore};
use ab_message::MessageList;
use ab_model::{FunctionBody, ModelDescription};
use ab_runtime::{CompiledKernel, KernelCompiler, KernelTable};
use tracing::info;

use crate::scheduler::function_kinds;
use crate::{LoggingConfig, SimResult, Simulation, StepLoggingConfig, SubmodelInstance};

/// Fluent builder for [`Simulation`].
///
/// # Required inputs
///
/// - `Arc<ModelDescription>` from [`ab_model::ModelBuilder::build`]
///
/// # Optional inputs (have defaults)
///
/// | Method               | Default                                        |
/// |----------------------|------------------------------------------------|
/// | `.config(c)`         | `SimConfig::default()`                         |
/// | `.compiler(c)`       | none; runtime functions fail to compile        |
/// | `.step_logging(l)`   | no step log                                    |
/// | `.exit_logging(l)`   | no exit log                                    |
///
/// # Example
///
/// ```rust,ignore
/// let mut sim = SimulationBuilder::new(model)
///     .config(SimConfig { steps: 100, random_seed: Some(7), ..SimConfig::default() })
///     .step_logging(StepLoggingConfig::new(logging).frequency(10))
///     .build()?;
/// sim.simulate()?;
/// ```
pub struct SimulationBuilder {
    model:        Arc<ModelDescription>,
    config:       SimConfig,
    compiler:     Option<Arc<dyn KernelCompiler>>,
    step_logging: Option<StepLoggingConfig>,
    exit_logging: Option<LoggingConfig>,
}

impl SimulationBuilder {
    pub fn new(model: Arc<ModelDescription>) -> Self {
        Self {
            model,
            config:       SimConfig::default(),
            compiler:     None,
            step_logging: None,
            exit_logging: None,
        }
    }

    pub fn config(mut self, config: SimConfig) -> Self {
        self.config = config;
        self
    }

    /// Service that resolves runtime-compiled agent functions.  Shared with
    /// every submodel.
    pub fn compiler(mut self, compiler: Arc<dyn KernelCompiler>) -> Self {
        self.compiler = Some(compiler);
        self
    }

    pub fn step_logging(mut self, logging: StepLoggingConfig) -> Self {
        self.step_logging = Some(logging);
        self
    }

    pub fn exit_logging(mut self, logging: LoggingConfig) -> Self {
        self.exit_logging = Some(logging);
        self
    }

    /// Allocate host-side storage and resolve native kernels.  No device is
    /// touched until the first step.
    pub fn build(self) -> SimResult<Simulation> {
        let model = self.model;
        if let Some(logging) = &self.step_logging {
            logging.logging.validate(&model)?;
        }
        if let Some(logging) = &self.exit_logging {
            logging.validate(&model)?;
        }

        let rng = SimRng::new(self.config.resolve_seed());

        let agents: Vec<AgentPopulation> = model
            .agents
            .iter()
            .map(|a| AgentPopulation::new(a.name.clone(), Arc::clone(&a.schema), &a.states))
            .collect();

        let messages = model
            .messages
            .iter()
            .map(|m| MessageList::new(m.name.clone(), m.message_type, Arc::clone(&m.schema)))
            .collect::<Result<Vec<_>, _>>()?;

        let mut env = EnvironmentStore::new();
        for p in &model.environment {
            env.declare(&p.name, &p.default, p.is_const)?;
        }
        let mut macros = MacroEnvironmentStore::new();
        for p in &model.macro_properties {
            macros.declare(&p.name, p.ty, p.dims)?;
        }

        // Native kernels are specialised up front; runtime ones stay empty
        // until the device is bound.
        let mut table = KernelTable::new();
        let mut kernels = Vec::with_capacity(model.agents.len());
        for agent in &model.agents {
            let mut per_agent = Vec::with_capacity(agent.functions.len());
            for function in &agent.functions {
                let kernel = match &function.body {
                    FunctionBody::Native(f) => {
                        let (input, output) = function_kinds(&model, function)?;
                        Some(CompiledKernel {
                            function:      Arc::clone(f),
                            entry:         table.register(&function.name, input, output),
                            function_hash: namespace_hash(&function.name),
                        })
                    }
                    FunctionBody::Runtime { .. } => None,
                };
                per_agent.push(kernel);
            }
            kernels.push(per_agent);
        }

        let submodels = model
            .submodels
            .iter()
            .enumerate()
            .map(|(i, s)| SubmodelInstance::new(s, &self.config, rng.seed(), i as u64, self.compiler.clone(), &env))
            .collect::<SimResult<Vec<_>>>()?;

        info!(
            model = %model.name,
            agents = model.agents.len(),
            layers = model.layers.len(),
            kernels = table.len(),
            submodels = submodels.len(),
            seed = rng.seed(),
            "simulation created"
        );

        let mut sim = Simulation::from_parts(
            model, self.config, agents, messages, env, macros, kernels, self.compiler, submodels, rng,
        );
        sim.step_logging = self.step_logging;
        sim.exit_logging = self.exit_logging;
        Ok(sim)
    }
}
