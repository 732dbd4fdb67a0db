//! `AgentPopulation` — every state of one agent type.

use std::sync::Arc;

use ab_core::{AbError, AgentId, VariableSpec};
use ab_device::DeviceMemory;
use tracing::trace;

use crate::{
    AgentResult, AgentStateList, AgentVector, IdAllocator, NewAgent, NewAgentStorage, VarLayout,
};

struct StateEntry {
    name:    String,
    list:    AgentStateList,
    pending: NewAgentStorage,
}

/// All storage for one agent type: one [`AgentStateList`] per declared
/// state plus the births staged for each state this step.
pub struct AgentPopulation {
    name:   String,
    schema: Arc<[VariableSpec]>,
    layout: Arc<VarLayout>,
    states: Vec<StateEntry>,
}

impl AgentPopulation {
    /// `schema` must already contain the reserved `_id` variable.
    pub fn new(name: impl Into<String>, schema: Arc<[VariableSpec]>, states: &[String]) -> Self {
        let layout = Arc::new(VarLayout::new(&schema));
        let states = states
            .iter()
            .map(|s| StateEntry {
                name:    s.clone(),
                list:    AgentStateList::new(Arc::clone(&schema)),
                pending: NewAgentStorage::new(Arc::clone(&layout)),
            })
            .collect();
        Self { name: name.into(), schema, layout, states }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn schema(&self) -> &Arc<[VariableSpec]> {
        &self.schema
    }

    pub fn layout(&self) -> &Arc<VarLayout> {
        &self.layout
    }

    pub fn state_names(&self) -> impl Iterator<Item = &str> {
        self.states.iter().map(|s| s.name.as_str())
    }

    pub fn state_count(&self) -> usize {
        self.states.len()
    }

    pub fn state_index(&self, state: &str) -> AgentResult<usize> {
        self.states.iter().position(|s| s.name == state).ok_or_else(|| {
            AbError::InvalidState { agent: self.name.clone(), state: state.to_owned() }.into()
        })
    }

    pub fn state(&self, state: &str) -> AgentResult<&AgentStateList> {
        let i = self.state_index(state)?;
        Ok(&self.states[i].list)
    }

    pub fn state_mut(&mut self, state: &str) -> AgentResult<&mut AgentStateList> {
        let i = self.state_index(state)?;
        Ok(&mut self.states[i].list)
    }

    #[inline]
    pub fn state_at(&self, index: usize) -> &AgentStateList {
        &self.states[index].list
    }

    #[inline]
    pub fn state_at_mut(&mut self, index: usize) -> &mut AgentStateList {
        &mut self.states[index].list
    }

    /// Live agents in `state`.
    pub fn count(&self, state: &str) -> AgentResult<usize> {
        Ok(self.state(state)?.len())
    }

    /// Live agents across all states.
    pub fn total(&self) -> usize {
        self.states.iter().map(|s| s.list.len()).sum()
    }

    /// Bulk replace the agents of `state` with a copy of `vector`.
    pub fn set_population(&mut self, state: &str, vector: &AgentVector) -> AgentResult<()> {
        if vector.agent_name() != self.name {
            return Err(AbError::type_mismatch(
                vector.agent_name(),
                format!("agent vector cannot populate agent '{}'", self.name),
            )
            .into());
        }
        let list = self.state_mut(state)?;
        list.replace(vector.columns().clone())
    }

    /// Copy the agents of `state` out to the host.
    pub fn get_population(&self, state: &str) -> AgentResult<AgentVector> {
        let list = self.state(state)?;
        Ok(AgentVector::from_columns(self.name.clone(), list.columns().clone()))
    }

    /// Stage a host-created agent in `state`.
    pub fn new_agent(&mut self, state: &str) -> AgentResult<NewAgent<'_>> {
        let i = self.state_index(state)?;
        Ok(self.states[i].pending.push())
    }

    /// Staged births across all states.
    pub fn pending(&self) -> usize {
        self.states.iter().map(|s| s.pending.len()).sum()
    }

    /// Scatter staged births into storage, assigning fresh IDs.
    pub fn flush_births(&mut self, ids: &mut IdAllocator) -> AgentResult<usize> {
        let mut total = 0;
        for entry in &mut self.states {
            if entry.pending.is_empty() {
                continue;
            }
            let mut born = entry.pending.to_columns(Arc::clone(&self.schema));
            for row in 0..born.len() {
                let id = ids.allocate()?;
                born.set::<u32>(ab_core::ID_VARIABLE, row, 0, id.0)?;
            }
            entry.list.append(&born)?;
            total += born.len();
            trace!(agent = %self.name, state = %entry.name, born = born.len(), "host births merged");
            entry.pending.clear();
        }
        Ok(total)
    }

    /// Discard staged births without merging them.
    pub fn clear_births(&mut self) {
        for entry in &mut self.states {
            entry.pending.clear();
        }
    }

    /// Advance `ids` past every ID already present in storage.
    pub fn observe_ids(&self, ids: &mut IdAllocator) -> AgentResult<()> {
        for entry in &self.states {
            for id in entry.list.ids()? {
                ids.observe(id);
            }
        }
        Ok(())
    }

    /// Assign IDs to agents imported without one.
    pub fn assign_missing_ids(&mut self, ids: &mut IdAllocator) -> AgentResult<usize> {
        let mut assigned = 0;
        for entry in &mut self.states {
            assigned += entry.list.assign_missing_ids(ids)?;
        }
        Ok(assigned)
    }

    /// `true` if any live agent still has an unset ID.
    pub fn has_missing_ids(&self) -> AgentResult<bool> {
        for entry in &self.states {
            if entry.list.ids()?.contains(&AgentId::UNSET) {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Bring every state's device charge in line with its capacity.
    pub fn charge(&mut self, memory: &Arc<DeviceMemory>) -> AgentResult<()> {
        for entry in &mut self.states {
            entry.list.charge(memory)?;
        }
        Ok(())
    }

    pub fn release(&mut self) {
        for entry in &mut self.states {
            entry.list.release();
        }
    }

    /// Remove every agent and staged birth.
    pub fn clear(&mut self) {
        for entry in &mut self.states {
            entry.list.clear();
            entry.pending.clear();
        }
    }
}
