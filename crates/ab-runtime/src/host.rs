//! The API host functions see.
//!
//! Host functions run on the host thread between joins, with exclusive
//! access to agent populations and read/write access to the environment.
//! Macro properties are reached through [`HostMacroProperty`] handles, which
//! fail with `RaceCondition` if an agent function wrote the property in the
//! current layer.

use ab_agent::{AgentPopulation, AgentVector, NewAgent, Reduction};
use ab_core::{AbError, Scalar, SimRng, is_reserved};
use ab_env::{EnvironmentStore, HostMacroProperty, MacroEnvironmentStore};

use crate::RuntimeResult;

pub struct HostApi<'a> {
    agents:   &'a mut [AgentPopulation],
    env:      &'a EnvironmentStore,
    macros:   &'a MacroEnvironmentStore,
    rng:      &'a mut SimRng,
    step:     u64,
    imported: bool,
}

impl<'a> HostApi<'a> {
    pub fn new(
        agents: &'a mut [AgentPopulation],
        env:    &'a EnvironmentStore,
        macros: &'a MacroEnvironmentStore,
        rng:    &'a mut SimRng,
        step:   u64,
    ) -> Self {
        Self { agents, env, macros, rng, step, imported: false }
    }

    /// Steps completed before the current one.
    pub fn step_count(&self) -> u64 {
        self.step
    }

    pub fn rng(&mut self) -> &mut SimRng {
        &mut *self.rng
    }

    /// Handle to agent type `name`.
    pub fn agent(&mut self, name: &str) -> RuntimeResult<HostAgentApi<'_>> {
        let population = self
            .agents
            .iter_mut()
            .find(|p| p.name() == name)
            .ok_or_else(|| AbError::InvalidAgent(name.to_owned()))?;
        Ok(HostAgentApi { population, imported: &mut self.imported })
    }

    /// `true` if a population was replaced through this API.  The driver
    /// then re-checks agent IDs before the next step.
    pub fn populations_replaced(&self) -> bool {
        self.imported
    }

    pub fn environment(&self) -> &EnvironmentStore {
        self.env
    }

    pub fn get_env<T: Scalar>(&self, name: &str) -> RuntimeResult<T> {
        Ok(self.env.get::<T>(name)?)
    }

    pub fn get_env_element<T: Scalar>(&self, name: &str, element: usize) -> RuntimeResult<T> {
        Ok(self.env.get_element::<T>(name, element)?)
    }

    pub fn get_env_array<T: Scalar>(&self, name: &str) -> RuntimeResult<Vec<T>> {
        Ok(self.env.get_array::<T>(name)?)
    }

    /// Set element 0 of `name`; returns the previous value.
    pub fn set_env<T: Scalar>(&self, name: &str, value: T) -> RuntimeResult<T> {
        self.set_env_element(name, 0, value)
    }

    pub fn set_env_element<T: Scalar>(&self, name: &str, element: usize, value: T) -> RuntimeResult<T> {
        if is_reserved(name) {
            return Err(AbError::ReservedName(name.to_owned()).into());
        }
        Ok(self.env.set_element::<T>(name, element, value)?)
    }

    /// Host handle to macro property `name` declared as `T` with shape `dims`.
    pub fn macro_property<T: Scalar>(&self, name: &str, dims: [u32; 4]) -> RuntimeResult<HostMacroProperty<T>> {
        Ok(self.macros.get_accessor::<T>(name, dims)?)
    }
}

/// Host access to one agent type.
pub struct HostAgentApi<'h> {
    population: &'h mut AgentPopulation,
    imported:   &'h mut bool,
}

impl HostAgentApi<'_> {
    pub fn name(&self) -> &str {
        self.population.name()
    }

    pub fn count(&self, state: &str) -> RuntimeResult<usize> {
        Ok(self.population.count(state)?)
    }

    pub fn total(&self) -> usize {
        self.population.total()
    }

    /// Stage a new agent in `state`.  It joins the population at the end of
    /// the step with a fresh ID.
    pub fn new_agent(&mut self, state: &str) -> RuntimeResult<NewAgent<'_>> {
        Ok(self.population.new_agent(state)?)
    }

    pub fn get_population(&self, state: &str) -> RuntimeResult<AgentVector> {
        Ok(self.population.get_population(state)?)
    }

    pub fn set_population(&mut self, state: &str, vector: &AgentVector) -> RuntimeResult<()> {
        self.population.set_population(state, vector)?;
        *self.imported = true;
        Ok(())
    }

    /// Reduce variable `name` over the agents in `state`.  `None` for an
    /// empty state.
    pub fn reduce(&self, state: &str, name: &str, reduction: Reduction) -> RuntimeResult<Option<f64>> {
        Ok(self.population.state(state)?.reduce(name, reduction)?)
    }
}
