//! One agent state's storage.
//!
//! An `AgentStateList` is the column store for every agent of one type that
//! is currently in one state.  Rows `0..len()` are live; there are no holes.
//! Births append, deaths compact, transitions move rows to another list.
//!
//! Capacity follows the device allocation model: it only grows, doubling
//! each time, and once a device is bound the whole capacity is charged
//! against the device's memory pool.

use std::sync::Arc;

use ab_core::{AgentId, Columns, ID_VARIABLE, Scalar, VariableSpec};
use ab_device::{Allocation, DeviceMemory};

use crate::{AgentResult, IdAllocator, Reduction};

#[derive(Debug)]
pub struct AgentStateList {
    columns:    Columns,
    capacity:   usize,
    allocation: Option<Allocation>,
}

impl AgentStateList {
    pub fn new(schema: Arc<[VariableSpec]>) -> Self {
        Self { columns: Columns::new(schema), capacity: 0, allocation: None }
    }

    /// Live agent count.
    #[inline]
    pub fn len(&self) -> usize {
        self.columns.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn columns(&self) -> &Columns {
        &self.columns
    }

    pub fn get<T: Scalar>(&self, name: &str, row: usize) -> AgentResult<T> {
        Ok(self.columns.get::<T>(name, row, 0)?)
    }

    pub fn set<T: Scalar>(&mut self, name: &str, row: usize, value: T) -> AgentResult<()> {
        Ok(self.columns.set::<T>(name, row, 0, value)?)
    }

    /// IDs of the live agents, in storage order.
    pub fn ids(&self) -> AgentResult<Vec<AgentId>> {
        Ok(self.columns.slice::<u32>(ID_VARIABLE)?.iter().map(|&id| AgentId(id)).collect())
    }

    /// Bytes currently charged against the device.
    pub fn charged_bytes(&self) -> usize {
        self.allocation.as_ref().map_or(0, Allocation::bytes)
    }

    /// Grow capacity (by doubling) to hold the live rows and bring the
    /// device charge in line with it.
    pub fn charge(&mut self, memory: &Arc<DeviceMemory>) -> AgentResult<()> {
        let mut capacity = self.capacity;
        while capacity < self.len() {
            capacity = (capacity * 2).max(1);
        }
        let bytes = capacity * self.columns.row_bytes();
        match &mut self.allocation {
            Some(alloc) if alloc.bytes() == bytes && alloc.is_live() => {}
            Some(alloc) => alloc.resize(bytes)?,
            None => self.allocation = Some(memory.allocate(bytes)?),
        }
        self.capacity = capacity;
        Ok(())
    }

    /// Drop the device charge.  Capacity is kept so a later `charge`
    /// re-reserves the same amount.
    pub fn release(&mut self) {
        self.allocation = None;
    }

    /// Replace every row with `columns` (bulk import).
    pub fn replace(&mut self, columns: Columns) -> AgentResult<()> {
        if !self.columns.same_layout(&columns) {
            return Err(ab_core::AbError::type_mismatch(
                "population",
                "imported rows have a different variable layout",
            )
            .into());
        }
        self.columns = columns;
        Ok(())
    }

    /// Append rows (births, incoming transitions).
    pub fn append(&mut self, rows: &Columns) -> AgentResult<()> {
        Ok(self.columns.append(rows)?)
    }

    /// Death compaction: keep the rows whose `alive` entry is `true`.
    pub fn retain(&mut self, alive: &[bool]) {
        self.columns.retain(alive);
    }

    /// Remove the rows whose `mask` entry is `true` and return them, in order.
    pub fn extract(&mut self, mask: &[bool]) -> Columns {
        let taken: Vec<usize> = (0..self.len()).filter(|&i| mask.get(i).copied().unwrap_or(false)).collect();
        let moved = self.columns.gather(&taken);
        let keep: Vec<bool> = (0..self.len()).map(|i| !mask.get(i).copied().unwrap_or(false)).collect();
        self.columns.retain(&keep);
        moved
    }

    /// Overwrite the live rows with `columns` after a kernel launch.
    ///
    /// `columns` must hold exactly `len()` rows of this list's layout.
    pub fn write_back(&mut self, columns: Columns) -> AgentResult<()> {
        if columns.len() != self.len() {
            return Err(ab_core::AbError::InvalidArgument(format!(
                "write-back of {} rows into a state holding {}",
                columns.len(),
                self.len()
            ))
            .into());
        }
        self.replace(columns)
    }

    /// Stable reorder of the live rows by ascending `keys[row]`.
    pub fn sort_by_keys(&mut self, keys: &[u32]) {
        let mut order: Vec<usize> = (0..self.len()).collect();
        order.sort_by_key(|&i| keys.get(i).copied().unwrap_or(u32::MAX));
        self.columns.permute(&order);
    }

    /// Give every agent whose `_id` is unset a fresh ID.  Returns how many
    /// were assigned.
    pub fn assign_missing_ids(&mut self, ids: &mut IdAllocator) -> AgentResult<usize> {
        let mut assigned = 0;
        for row in 0..self.len() {
            if self.columns.get::<u32>(ID_VARIABLE, row, 0)? == AgentId::UNSET.0 {
                let id = ids.allocate()?;
                self.columns.set::<u32>(ID_VARIABLE, row, 0, id.0)?;
                assigned += 1;
            }
        }
        Ok(assigned)
    }

    /// Reduce variable `name` over all live agents (and array elements).
    pub fn reduce(&self, name: &str, reduction: Reduction) -> AgentResult<Option<f64>> {
        let column = self
            .columns
            .column(name)
            .ok_or_else(|| ab_core::AbError::not_found("variable", name))?;
        Ok(reduction.apply(column))
    }

    pub fn clear(&mut self) {
        self.columns.clear();
    }

    /// Swap contents (rows, capacity and device charge) with `other`.
    pub fn swap(&mut self, other: &mut AgentStateList) {
        std::mem::swap(self, other);
    }
}
