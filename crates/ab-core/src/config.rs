//! Run configuration.

use crate::DeviceId;
use crate::rng::time_seed;

/// Default number of steps between spatial re-sorts of agent states.
pub const DEFAULT_SORT_PERIOD: u32 = 10;

/// Per-simulation run configuration.
///
/// Supplied at construction; changing it mid-run only takes effect through
/// an explicit `apply_config()` on the simulation.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SimConfig {
    /// Device the simulation allocates on.  Pinned after first allocation.
    pub device_id:            DeviceId,
    /// Issue the agent functions of a layer on separate streams.
    pub in_layer_concurrency: bool,
    /// Step limit for `simulate()`.  `0` runs until an exit condition fires.
    pub steps:                u32,
    /// Fixed seed; `None` seeds from the clock on every reseed.
    pub random_seed:          Option<u64>,
    /// Steps between spatial re-sorts of agent states.  `0` disables sorting.
    pub sort_period:          u32,
    /// Record per-step wall-clock timings.
    pub timing:               bool,
    /// Tear the device down when its last simulation is dropped.
    pub auto_device_reset:    bool,
    /// Device memory budget in bytes.  `None` uses the registry default.
    pub device_memory_limit:  Option<usize>,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            device_id:            DeviceId(0),
            in_layer_concurrency: true,
            steps:                1,
            random_seed:          None,
            sort_period:          DEFAULT_SORT_PERIOD,
            timing:               false,
            auto_device_reset:    true,
            device_memory_limit:  None,
        }
    }
}

impl SimConfig {
    /// The seed to use for the next (re)seed: the fixed seed if configured,
    /// otherwise a fresh clock-derived value.
    pub fn resolve_seed(&self) -> u64 {
        self.random_seed.unwrap_or_else(time_seed)
    }

    /// `true` if `simulate()` should stop after `completed` steps.
    pub fn step_limit_reached(&self, completed: u32) -> bool {
        self.steps != 0 && completed >= self.steps
    }
}
