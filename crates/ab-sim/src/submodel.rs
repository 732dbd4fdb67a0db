//! Nested model instances.

use std::sync::Arc;

use ab_core::{SimConfig, mix_seed};
use ab_env::{EnvironmentStore, MacroEnvironmentStore};
use ab_model::SubmodelDescription;
use ab_runtime::KernelCompiler;

use crate::{SimError, SimResult, Simulation, SimulationBuilder};

/// A submodel owned by one parent simulation.
///
/// The child shares the parent's mapped environment properties from
/// construction and its mapped macro properties once the parent binds its
/// device.  Every invocation clears the child's agents and messages,
/// restores its unmapped environment and runs it to completion.
pub struct SubmodelInstance {
    name:          String,
    macro_mapping: Vec<(String, String)>,
    sim:           Box<Simulation>,
}

impl SubmodelInstance {
    pub(crate) fn new(
        description: &SubmodelDescription,
        parent:      &SimConfig,
        parent_seed: u64,
        ordinal:     u64,
        compiler:    Option<Arc<dyn KernelCompiler>>,
        parent_env:  &EnvironmentStore,
    ) -> SimResult<Self> {
        let config = SimConfig {
            steps: u32::try_from(description.max_steps).unwrap_or(u32::MAX),
            random_seed: Some(mix_seed(parent_seed, ordinal + 1)),
            ..parent.clone()
        };
        let wrap = |e| SimError::Submodel { name: description.name.clone(), source: Box::new(e) };

        let mut builder = SimulationBuilder::new(Arc::clone(&description.model)).config(config);
        if let Some(compiler) = compiler {
            builder = builder.compiler(compiler);
        }
        let mut sim = builder.build().map_err(wrap)?;
        for (sub_name, parent_name) in &description.env_mapping {
            sim.env.map_from(sub_name, parent_env, parent_name).map_err(|e| wrap(e.into()))?;
        }
        Ok(Self {
            name:          description.name.clone(),
            macro_mapping: description.macro_mapping.clone(),
            sim:           Box::new(sim),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn simulation(&self) -> &Simulation {
        &self.sim
    }

    fn wrap(&self, source: SimError) -> SimError {
        SimError::Submodel { name: self.name.clone(), source: Box::new(source) }
    }

    /// Alias mapped macro properties onto `parent` and bind the child.
    /// `parent` must already be allocated.
    pub(crate) fn bind(&mut self, parent: &MacroEnvironmentStore) -> SimResult<()> {
        let result = self
            .sim
            .macros
            .map_for_submodel(&self.macro_mapping, parent)
            .map_err(SimError::from)
            .and_then(|()| self.sim.ensure_ready());
        result.map_err(|e| self.wrap(e))
    }

    /// Run one invocation.  Returns the number of steps the child took.
    pub(crate) fn run(&mut self) -> SimResult<u64> {
        let result = self.sim.reset_internal(true).and_then(|()| self.sim.simulate());
        match result {
            Ok(()) => Ok(self.sim.step_count),
            Err(e) => Err(self.wrap(e)),
        }
    }

    pub(crate) fn reset(&mut self) -> SimResult<()> {
        let result = self.sim.reset_internal(true);
        result.map_err(|e| self.wrap(e))
    }

    pub(crate) fn destroy(&mut self) {
        self.sim.destroy();
    }
}

impl std::fmt::Debug for SubmodelInstance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubmodelInstance").field("name", &self.name).field("sim", &self.sim).finish()
    }
}
