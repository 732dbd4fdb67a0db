//! Agent identifier allocation.

use ab_core::AgentId;

use crate::{AgentError, AgentResult};

/// Hands out `AgentId`s in increasing order, starting at 1.
///
/// IDs are unique within one simulation instance.  Imported populations may
/// carry their own IDs; [`observe`](Self::observe) moves the cursor past
/// them so later allocations never collide.
#[derive(Clone, Debug)]
pub struct IdAllocator {
    next: u32,
}

impl IdAllocator {
    pub fn new() -> Self {
        Self { next: 1 }
    }

    pub fn allocate(&mut self) -> AgentResult<AgentId> {
        if self.next == u32::MAX {
            return Err(AgentError::IdsExhausted);
        }
        let id = AgentId(self.next);
        self.next += 1;
        Ok(id)
    }

    /// Make sure `id` is never handed out again.
    pub fn observe(&mut self, id: AgentId) {
        if id.is_set() && id.0 >= self.next {
            self.next = id.0.saturating_add(1);
        }
    }

    /// The ID the next call to `allocate` returns.
    pub fn peek(&self) -> AgentId {
        AgentId(self.next)
    }

    pub fn reset(&mut self) {
        self.next = 1;
    }
}

impl Default for IdAllocator {
    fn default() -> Self {
        Self::new()
    }
}
