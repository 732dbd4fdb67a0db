//! `AgentVector` — a host-side copy of a population.

use std::sync::Arc;

use ab_core::{AbError, AgentId, Columns, ID_VARIABLE, Scalar, VariableSpec};

use crate::AgentResult;

/// A detached, host-owned set of agents of one type.
///
/// Produced by `get_population_data` and consumed by `set_population_data`.
/// Agents pushed on the host start with the declared defaults and an unset
/// ID; the simulation assigns IDs before the next step.
#[derive(Clone, Debug)]
pub struct AgentVector {
    agent:   String,
    columns: Columns,
}

impl AgentVector {
    /// `count` default agents of type `agent`.
    pub fn new(agent: impl Into<String>, schema: Arc<[VariableSpec]>, count: usize) -> Self {
        Self { agent: agent.into(), columns: Columns::with_defaults(schema, count) }
    }

    pub fn from_columns(agent: impl Into<String>, columns: Columns) -> Self {
        Self { agent: agent.into(), columns }
    }

    pub fn agent_name(&self) -> &str {
        &self.agent
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// Append one default agent; returns its index.
    pub fn push(&mut self) -> usize {
        self.columns.push_defaults(1);
        self.columns.len() - 1
    }

    pub fn get<T: Scalar>(&self, index: usize, name: &str) -> AgentResult<T> {
        Ok(self.columns.get::<T>(name, index, 0)?)
    }

    pub fn get_element<T: Scalar>(&self, index: usize, name: &str, element: usize) -> AgentResult<T> {
        Ok(self.columns.get::<T>(name, index, element)?)
    }

    pub fn set<T: Scalar>(&mut self, index: usize, name: &str, value: T) -> AgentResult<()> {
        self.set_element(index, name, 0, value)
    }

    pub fn set_element<T: Scalar>(
        &mut self,
        index:   usize,
        name:    &str,
        element: usize,
        value:   T,
    ) -> AgentResult<()> {
        if name == ID_VARIABLE {
            return Err(AbError::ReservedName(name.to_owned()).into());
        }
        Ok(self.columns.set::<T>(name, index, element, value)?)
    }

    /// Give agent `index` a caller-chosen identifier.  Imported IDs are kept
    /// and the simulation's allocator continues past the largest one;
    /// `AgentId::UNSET` leaves the agent to be numbered before the next step.
    pub fn set_id(&mut self, index: usize, id: AgentId) -> AgentResult<()> {
        Ok(self.columns.set::<u32>(ID_VARIABLE, index, 0, id.0)?)
    }

    pub fn id(&self, index: usize) -> AgentResult<AgentId> {
        Ok(AgentId(self.columns.get::<u32>(ID_VARIABLE, index, 0)?))
    }

    pub fn columns(&self) -> &Columns {
        &self.columns
    }

    pub fn into_columns(self) -> Columns {
        self.columns
    }
}
