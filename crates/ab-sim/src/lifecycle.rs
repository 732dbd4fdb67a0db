//! Agent lifecycle: IDs, births and spatial sorting.
//!
//! IDs are per simulation, start at 1 and only increase.  Importing a
//! population marks IDs dirty; before the next step the allocator is moved
//! past every imported ID and agents imported without one get a fresh ID.
//!
//! Host births are staged per agent state and merged once per step (and
//! once after init functions).  Device births arrive as launch output with
//! `_id` unset and are merged at the end of the layer that produced them.
//!
//! Agent states read by a function with a spatial message input are
//! periodically reordered by the message grid bin of each agent's location,
//! so agents that query the same bins sit next to each other in storage.

use ab_agent::{AgentPopulation, AgentStateList, IdAllocator};
use ab_core::{Columns, ID_VARIABLE, Scalar};
use ab_message::{LOCATION_VARIABLES, MessageList};
use ab_model::ModelDescription;
use tracing::{debug, trace};

use crate::SimResult;

/// A state sorted by the grid of `message`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SortTarget {
    pub agent:   usize,
    pub state:   String,
    pub message: usize,
}

#[derive(Debug)]
pub struct AgentLifecycle {
    ids:          IdAllocator,
    ids_ready:    bool,
    sort_targets: Vec<SortTarget>,
}

impl AgentLifecycle {
    pub fn new(model: &ModelDescription) -> Self {
        let sort_targets = model
            .spatial_sort_targets()
            .into_iter()
            .filter_map(|(agent, state, message)| {
                Some(SortTarget {
                    agent: model.agent_index(&agent)?,
                    state,
                    message: model.message_index(&message)?,
                })
            })
            .collect();
        Self { ids: IdAllocator::new(), ids_ready: false, sort_targets }
    }

    pub fn sort_targets(&self) -> &[SortTarget] {
        &self.sort_targets
    }

    pub fn ids_ready(&self) -> bool {
        self.ids_ready
    }

    /// The next ID that will be handed out.
    pub fn next_id(&self) -> u32 {
        self.ids.peek().0
    }

    /// A population was replaced; re-check IDs before the next step.
    pub fn invalidate_ids(&mut self) {
        self.ids_ready = false;
    }

    /// Observe every existing ID and assign the missing ones.  No-op while
    /// IDs are known to be consistent.
    pub fn ensure_ids(&mut self, agents: &mut [AgentPopulation]) -> SimResult<usize> {
        if self.ids_ready {
            return Ok(0);
        }
        for population in agents.iter() {
            population.observe_ids(&mut self.ids)?;
        }
        let mut assigned = 0;
        for population in agents.iter_mut() {
            assigned += population.assign_missing_ids(&mut self.ids)?;
        }
        self.ids_ready = true;
        if assigned > 0 {
            debug!(assigned, next = self.next_id(), "agent ids assigned");
        }
        Ok(assigned)
    }

    /// Merge staged host births into storage with fresh IDs.
    pub fn flush_births(&mut self, agents: &mut [AgentPopulation]) -> SimResult<usize> {
        if agents.iter().all(|p| p.pending() == 0) {
            return Ok(0);
        }
        self.ensure_ids(agents)?;
        let mut born = 0;
        for population in agents.iter_mut() {
            born += population.flush_births(&mut self.ids)?;
        }
        Ok(born)
    }

    /// Append device births to `list`, giving each a fresh ID.
    pub fn merge_births(&mut self, list: &mut AgentStateList, mut births: Columns) -> SimResult<usize> {
        for row in 0..births.len() {
            let id = self.ids.allocate()?;
            births.set::<u32>(ID_VARIABLE, row, 0, id.0)?;
        }
        list.append(&births)?;
        Ok(births.len())
    }

    /// Reorder every sort target by grid bin.  Returns the number of states
    /// sorted.
    pub fn sort(&self, agents: &mut [AgentPopulation], messages: &[MessageList]) -> SimResult<usize> {
        let mut sorted = 0;
        for target in &self.sort_targets {
            let Some(grid) = messages[target.message].index().map(|i| i.grid()) else {
                continue;
            };
            let list = agents[target.agent].state_mut(&target.state)?;
            if list.len() < 2 {
                continue;
            }
            let axes: Option<Vec<&[f32]>> = LOCATION_VARIABLES[..grid.dimensions()]
                .iter()
                .map(|axis| list.columns().column(axis).and_then(<f32 as Scalar>::slice))
                .collect();
            let Some(axes) = axes else {
                trace!(state = %target.state, "sort skipped: agent has no f32 location");
                continue;
            };
            let keys: Vec<u32> = (0..list.len())
                .map(|row| {
                    let mut pos = [0.0f32; 3];
                    for (a, values) in axes.iter().enumerate() {
                        pos[a] = values[row];
                    }
                    grid.bin_of(pos)
                })
                .collect();
            list.sort_by_keys(&keys);
            sorted += 1;
        }
        Ok(sorted)
    }

    pub fn reset(&mut self) {
        self.ids.reset();
        self.ids_ready = false;
    }
}
