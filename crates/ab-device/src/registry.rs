//! Process-wide device registry.
//!
//! Every simulation instance holds a [`DeviceLease`] for the device it runs
//! on.  The registry counts live leases per device; when the last lease on a
//! device is dropped and the lease asked for it, the device is torn down
//! (its memory pool is reset).  The teardown check runs under a per-device
//! mutex so two instances finishing at the same time cannot both reset, and
//! a reset cannot interleave with another instance's release.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, OnceLock, PoisonError};

use ab_core::DeviceId;
use tracing::{debug, warn};

use crate::{DEFAULT_DEVICE_MEMORY, DeviceError, DeviceMemory, DeviceResult};

/// Number of devices the simulated platform exposes.
pub const SIMULATED_DEVICE_COUNT: u32 = 8;

struct DeviceSlot {
    instances: usize,
    memory:    Arc<DeviceMemory>,
    teardown:  Arc<Mutex<()>>,
}

/// Live-instance bookkeeping for every device in the process.
pub struct DeviceRegistry {
    slots: Mutex<HashMap<DeviceId, DeviceSlot>>,
}

static GLOBAL: OnceLock<DeviceRegistry> = OnceLock::new();

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

impl DeviceRegistry {
    pub fn new() -> Self {
        Self { slots: Mutex::new(HashMap::new()) }
    }

    /// The registry shared by every simulation in the process.
    pub fn global() -> &'static DeviceRegistry {
        GLOBAL.get_or_init(DeviceRegistry::new)
    }

    pub fn device_count(&self) -> u32 {
        SIMULATED_DEVICE_COUNT
    }

    /// Register one more live instance on `device`.
    ///
    /// The first lease on a device creates its memory pool with
    /// `memory_limit` (or [`DEFAULT_DEVICE_MEMORY`]); later leases share
    /// that pool.
    pub fn acquire(
        &'static self,
        device:       DeviceId,
        memory_limit: Option<usize>,
        auto_reset:   bool,
    ) -> DeviceResult<DeviceLease> {
        if device.0 >= SIMULATED_DEVICE_COUNT {
            return Err(DeviceError::InvalidDevice { device, count: SIMULATED_DEVICE_COUNT });
        }
        let mut slots = lock(&self.slots);
        let slot = slots.entry(device).or_insert_with(|| DeviceSlot {
            instances: 0,
            memory:    DeviceMemory::new(device, memory_limit.unwrap_or(DEFAULT_DEVICE_MEMORY)),
            teardown:  Arc::new(Mutex::new(())),
        });
        if let Some(limit) = memory_limit {
            if limit != slot.memory.limit() {
                debug!(%device, requested = limit, existing = slot.memory.limit(),
                       "device already initialised; keeping existing memory limit");
            }
        }
        slot.instances += 1;
        Ok(DeviceLease {
            registry: self,
            device,
            memory: Arc::clone(&slot.memory),
            auto_reset,
        })
    }

    /// Number of live leases on `device`.
    pub fn instances(&self, device: DeviceId) -> usize {
        lock(&self.slots).get(&device).map_or(0, |s| s.instances)
    }

    fn release(&self, device: DeviceId, auto_reset: bool) {
        let (teardown, memory) = {
            let mut slots = lock(&self.slots);
            let Some(slot) = slots.get_mut(&device) else { return };
            slot.instances = slot.instances.saturating_sub(1);
            if slot.instances > 0 || !auto_reset {
                return;
            }
            (Arc::clone(&slot.teardown), Arc::clone(&slot.memory))
        };

        let _guard = lock(&teardown);
        let slots = lock(&self.slots);
        // Another instance may have acquired the device since the count hit zero.
        if slots.get(&device).is_some_and(|s| s.instances == 0) {
            if memory.used() > 0 {
                warn!(%device, leaked = memory.used(), "device reset with allocations outstanding");
            }
            memory.teardown();
            debug!(%device, "device reset");
        }
    }
}

impl Default for DeviceRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// A live instance's claim on a device.  Dropping it releases the claim.
pub struct DeviceLease {
    registry:   &'static DeviceRegistry,
    device:     DeviceId,
    memory:     Arc<DeviceMemory>,
    auto_reset: bool,
}

impl DeviceLease {
    pub fn device(&self) -> DeviceId {
        self.device
    }

    pub fn memory(&self) -> &Arc<DeviceMemory> {
        &self.memory
    }
}

impl Drop for DeviceLease {
    fn drop(&mut self) {
        self.registry.release(self.device, self.auto_reset);
    }
}

impl std::fmt::Debug for DeviceLease {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceLease")
            .field("device", &self.device)
            .field("auto_reset", &self.auto_reset)
            .finish()
    }
}
