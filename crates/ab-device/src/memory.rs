//! Budgeted device memory.
//!
//! Device buffers are ordinary host allocations; what the pool models is the
//! *budget*.  Every buffer that would live in device memory holds an
//! [`Allocation`] charged against its device's [`DeviceMemory`], so pool
//! exhaustion surfaces as `OutOfMemory` exactly where a real allocation
//! would fail.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use ab_core::DeviceId;

use crate::{DeviceError, DeviceResult};

/// Memory budget of a device when none is configured (1 GiB).
pub const DEFAULT_DEVICE_MEMORY: usize = 1 << 30;

/// The memory pool of one device.
#[derive(Debug)]
pub struct DeviceMemory {
    device:     DeviceId,
    limit:      usize,
    used:       AtomicUsize,
    /// Bumped on teardown; allocations from an older generation no longer
    /// count against the pool.
    generation: AtomicU64,
}

impl DeviceMemory {
    pub fn new(device: DeviceId, limit: usize) -> Arc<Self> {
        Arc::new(Self {
            device,
            limit,
            used:       AtomicUsize::new(0),
            generation: AtomicU64::new(0),
        })
    }

    pub fn device(&self) -> DeviceId {
        self.device
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    pub fn used(&self) -> usize {
        self.used.load(Ordering::Acquire)
    }

    pub fn available(&self) -> usize {
        self.limit.saturating_sub(self.used())
    }

    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    /// Charge `bytes` against the pool.
    pub fn allocate(self: &Arc<Self>, bytes: usize) -> DeviceResult<Allocation> {
        self.reserve(bytes)?;
        Ok(Allocation {
            memory:     Arc::clone(self),
            bytes,
            generation: self.generation(),
        })
    }

    fn reserve(&self, bytes: usize) -> DeviceResult<()> {
        let limit = self.limit;
        self.used
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |used| {
                used.checked_add(bytes).filter(|&total| total <= limit)
            })
            .map(|_| ())
            .map_err(|used| DeviceError::OutOfMemory {
                device:    self.device,
                requested: bytes,
                available: limit.saturating_sub(used),
            })
    }

    fn release(&self, bytes: usize) {
        let _ = self
            .used
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |used| Some(used.saturating_sub(bytes)));
    }

    /// Forget every outstanding allocation (device reset).
    pub(crate) fn teardown(&self) {
        self.generation.fetch_add(1, Ordering::AcqRel);
        self.used.store(0, Ordering::Release);
    }
}

/// An RAII charge against a [`DeviceMemory`].  Released on drop.
#[derive(Debug)]
pub struct Allocation {
    memory:     Arc<DeviceMemory>,
    bytes:      usize,
    generation: u64,
}

impl Allocation {
    pub fn bytes(&self) -> usize {
        self.bytes
    }

    pub fn device(&self) -> DeviceId {
        self.memory.device
    }

    /// `false` once the owning device has been torn down.
    pub fn is_live(&self) -> bool {
        self.generation == self.memory.generation()
    }

    /// Grow or shrink the charge in place.  On failure the old charge is kept.
    pub fn resize(&mut self, bytes: usize) -> DeviceResult<()> {
        if !self.is_live() {
            self.memory.reserve(bytes)?;
            self.generation = self.memory.generation();
        } else if bytes > self.bytes {
            self.memory.reserve(bytes - self.bytes)?;
        } else {
            self.memory.release(self.bytes - bytes);
        }
        self.bytes = bytes;
        Ok(())
    }
}

impl Drop for Allocation {
    fn drop(&mut self) {
        if self.is_live() {
            self.memory.release(self.bytes);
        }
    }
}
