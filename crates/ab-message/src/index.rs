//! The Partition Boundary Matrix (PBM) message index.
//!
//! # State machine
//!
//! ```text
//! Uninitialized ──init──▶ Allocated ──build_index──▶ Indexed
//!                             ▲                        │
//!                             └──────invalidate────────┘
//! any ──free──▶ Freed ──init──▶ Allocated
//! ```
//!
//! # Build
//!
//! 1. bin id per message from its location variables,
//! 2. histogram of messages per bin,
//! 3. exclusive prefix sum of the histogram → PBM (`bin_count + 1` entries),
//! 4. stable counting sort of message indices by bin → `keys`/`vals`.
//!
//! The histogram and PBM are sized once at `init`; the key/value scratch
//! grows to the largest message count seen and never shrinks.

use std::sync::Arc;

use ab_core::Columns;
use ab_device::{Allocation, DeviceMemory};
use tracing::trace;

use crate::{LOCATION_VARIABLES, MessageError, MessageResult, SpatialGrid};

/// Bytes of the fixed-size metadata record (grid origin, radius, dims, counts).
const METADATA_BYTES: usize = 3 * 4 + 4 + 3 * 4 + 2 * 4;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum IndexState {
    Uninitialized,
    Allocated,
    Indexed,
    Freed,
}

pub struct MessageIndex {
    name:           String,
    grid:           SpatialGrid,
    state:          IndexState,
    memory:         Option<Arc<DeviceMemory>>,
    metadata:       Option<Allocation>,
    histogram:      Vec<u32>,
    pbm:            Vec<u32>,
    bins_alloc:     Option<Allocation>,
    keys:           Vec<u32>,
    vals:           Vec<u32>,
    scratch_alloc:  Option<Allocation>,
    /// Messages covered by the current build.
    message_count:  usize,
}

impl MessageIndex {
    pub fn new(name: impl Into<String>, grid: SpatialGrid) -> Self {
        Self {
            name:          name.into(),
            grid,
            state:         IndexState::Uninitialized,
            memory:        None,
            metadata:      None,
            histogram:     Vec::new(),
            pbm:           Vec::new(),
            bins_alloc:    None,
            keys:          Vec::new(),
            vals:          Vec::new(),
            scratch_alloc: None,
            message_count: 0,
        }
    }

    pub fn state(&self) -> IndexState {
        self.state
    }

    pub fn grid(&self) -> &SpatialGrid {
        &self.grid
    }

    fn not_initialized(&self) -> MessageError {
        MessageError::NotInitialized(self.name.clone())
    }

    /// Allocate metadata, histogram and PBM.  The PBM describes an empty
    /// message list until the first build.
    pub fn init(&mut self, memory: &Arc<DeviceMemory>) -> MessageResult<()> {
        if matches!(self.state, IndexState::Allocated | IndexState::Indexed) {
            return Ok(());
        }
        let entries = self.grid.bin_count() as usize + 1;
        self.memory = Some(Arc::clone(memory));
        self.allocate_metadata()?;
        self.bins_alloc = Some(memory.allocate(2 * entries * size_of::<u32>())?);
        self.histogram = vec![0; entries];
        self.pbm = vec![0; entries];
        self.message_count = 0;
        self.state = IndexState::Allocated;
        Ok(())
    }

    /// Allocate the fixed-size metadata record.  No-op if already present.
    pub fn allocate_metadata(&mut self) -> MessageResult<()> {
        if self.metadata.is_some() {
            return Ok(());
        }
        let memory = self.memory.as_ref().ok_or_else(|| self.not_initialized())?;
        self.metadata = Some(memory.allocate(METADATA_BYTES)?);
        Ok(())
    }

    /// Release the metadata record; the next build re-allocates it.
    pub fn free_metadata(&mut self) {
        self.metadata = None;
    }

    pub fn has_metadata(&self) -> bool {
        self.metadata.is_some()
    }

    fn resize_keys_vals(&mut self, n: usize) -> MessageResult<()> {
        if n <= self.keys.len() {
            return Ok(());
        }
        let memory = self.memory.as_ref().ok_or_else(|| self.not_initialized())?;
        let bytes = 2 * n * size_of::<u32>();
        match &mut self.scratch_alloc {
            Some(alloc) => alloc.resize(bytes)?,
            None => self.scratch_alloc = Some(memory.allocate(bytes)?),
        }
        self.keys.resize(n, 0);
        self.vals.resize(n, 0);
        Ok(())
    }

    /// Rebuild the PBM and permutation over the location variables of
    /// `messages`.
    pub fn build_index(&mut self, messages: &Columns) -> MessageResult<()> {
        if matches!(self.state, IndexState::Uninitialized | IndexState::Freed) {
            return Err(self.not_initialized());
        }
        self.allocate_metadata()?;

        let n = messages.len();
        let dims = self.grid.dimensions();
        let mut axes: [&[f32]; 3] = [&[], &[], &[]];
        for (axis, name) in LOCATION_VARIABLES[..dims].iter().enumerate() {
            axes[axis] = messages.slice::<f32>(name)?;
        }
        self.resize_keys_vals(n)?;

        // (1) bin ids
        let mut bins = Vec::with_capacity(n);
        for i in 0..n {
            let mut pos = [0f32; 3];
            for axis in 0..dims {
                pos[axis] = axes[axis][i];
            }
            bins.push(self.grid.bin_of(pos));
        }

        // (2) histogram
        self.histogram.iter_mut().for_each(|h| *h = 0);
        for &b in &bins {
            self.histogram[b as usize] += 1;
        }

        // (3) exclusive prefix sum
        let mut running = 0u32;
        for (p, &h) in self.pbm.iter_mut().zip(&self.histogram) {
            *p = running;
            running += h;
        }

        // (4) stable counting sort
        let mut cursor = self.pbm.clone();
        for (i, &b) in bins.iter().enumerate() {
            let slot = cursor[b as usize] as usize;
            self.keys[slot] = b;
            self.vals[slot] = i as u32;
            cursor[b as usize] += 1;
        }

        self.message_count = n;
        self.state = IndexState::Indexed;
        trace!(message = %self.name, messages = n, bins = self.grid.bin_count(), "PBM built");
        Ok(())
    }

    /// Drop back to `Allocated` when a new output starts overwriting the
    /// indexed messages.
    pub fn invalidate(&mut self) {
        if self.state == IndexState::Indexed {
            self.state = IndexState::Allocated;
            self.message_count = 0;
            self.pbm.iter_mut().for_each(|p| *p = 0);
        }
    }

    /// Release everything.
    pub fn free(&mut self) {
        self.metadata = None;
        self.bins_alloc = None;
        self.scratch_alloc = None;
        self.histogram = Vec::new();
        self.pbm = Vec::new();
        self.keys = Vec::new();
        self.vals = Vec::new();
        self.message_count = 0;
        self.memory = None;
        self.state = IndexState::Freed;
    }

    fn check_ready(&self) -> MessageResult<()> {
        match self.state {
            IndexState::Allocated | IndexState::Indexed => Ok(()),
            _ => Err(self.not_initialized()),
        }
    }

    /// Bin start offsets, `bin_count + 1` entries.
    pub fn pbm(&self) -> MessageResult<&[u32]> {
        self.check_ready()?;
        Ok(&self.pbm)
    }

    /// Bin id of each sorted message.
    pub fn keys(&self) -> MessageResult<&[u32]> {
        self.check_ready()?;
        Ok(&self.keys[..self.message_count])
    }

    /// Message indices sorted by bin.
    pub fn vals(&self) -> MessageResult<&[u32]> {
        self.check_ready()?;
        Ok(&self.vals[..self.message_count])
    }

    /// Length of the key/value scratch (high-water mark).
    pub fn scratch_len(&self) -> usize {
        self.keys.len()
    }

    /// Indices of every message in the bins surrounding `pos`.
    pub fn neighbours(&self, pos: [f32; 3]) -> MessageResult<impl Iterator<Item = usize> + '_> {
        self.check_ready()?;
        let strips = self.grid.neighbourhood(pos);
        Ok(strips.into_iter().flat_map(move |(first, last)| {
            let start = self.pbm[first as usize] as usize;
            let end = self.pbm[last as usize + 1] as usize;
            self.vals[start..end].iter().map(|&v| v as usize)
        }))
    }
}

impl std::fmt::Debug for MessageIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MessageIndex")
            .field("name", &self.name)
            .field("state", &self.state)
            .field("bins", &self.grid.bin_count())
            .field("messages", &self.message_count)
            .finish()
    }
}

