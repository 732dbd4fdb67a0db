//! Deterministic per-thread and simulation-level RNG wrappers.
//!
//! # Determinism strategy
//!
//! Each agent-function thread gets its own independent `SmallRng` seeded by
//! mixing the simulation seed with the step, the function's namespace hash
//! and the thread index:
//!
//!   seed = mix(mix(mix(sim_seed, step), function_hash), thread_index)
//!
//! The mixing constant is the 64-bit fractional part of the golden ratio,
//! which spreads consecutive inputs uniformly across the seed space.
//! Streams therefore never share RNG state, and the values an agent draws
//! do not depend on how threads are scheduled.

use std::time::{SystemTime, UNIX_EPOCH};

use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};

/// 64-bit fractional golden-ratio constant for seed mixing.
const MIXING_CONSTANT: u64 = 0x9e37_79b9_7f4a_7c15;

/// Mix `value` into `seed` (splitmix64 finaliser).
#[inline]
pub const fn mix_seed(seed: u64, value: u64) -> u64 {
    let mut z = seed ^ value.wrapping_mul(MIXING_CONSTANT);
    z = (z ^ (z >> 30)).wrapping_mul(0xbf58_476d_1ce4_e5b9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94d0_49bb_1331_11eb);
    z ^ (z >> 31)
}

/// A seed derived from the wall clock, used when no fixed seed is configured.
pub fn time_seed() -> u64 {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or(0);
    mix_seed(nanos, std::process::id() as u64)
}

// ── AgentRng ──────────────────────────────────────────────────────────────────

/// Per-thread deterministic RNG handed to agent functions.
///
/// Created fresh for every (step, function, thread) so no state is carried
/// between launches and nothing is shared across threads.
pub struct AgentRng(SmallRng);

impl AgentRng {
    /// Seed for thread `index` of `function_hash` at `step`.
    pub fn for_thread(sim_seed: u64, step: u32, function_hash: u32, index: u32) -> Self {
        let seed = mix_seed(mix_seed(mix_seed(sim_seed, step as u64), function_hash as u64), index as u64);
        AgentRng(SmallRng::seed_from_u64(seed))
    }

    /// Expose the inner `SmallRng` for use with `rand` distribution types.
    #[inline]
    pub fn inner(&mut self) -> &mut SmallRng {
        &mut self.0
    }

    /// Sample a uniformly distributed value of any `Standard`-distributed type.
    #[inline]
    pub fn random<T>(&mut self) -> T
    where
        rand::distributions::Standard: rand::distributions::Distribution<T>,
    {
        self.0.r#gen()
    }

    /// Generate a value uniformly in `range`.
    #[inline]
    pub fn gen_range<T, R>(&mut self, range: R) -> T
    where
        T: rand::distributions::uniform::SampleUniform,
        R: rand::distributions::uniform::SampleRange<T>,
    {
        self.0.gen_range(range)
    }

    /// `true` with probability `p` (clamped to [0, 1]).
    #[inline]
    pub fn gen_bool(&mut self, p: f64) -> bool {
        self.0.gen_bool(p.clamp(0.0, 1.0))
    }
}

// ── SimRng ────────────────────────────────────────────────────────────────────

/// Simulation-level RNG used by host functions.
///
/// Only touched from the single host thread.  `seed()` reports the value the
/// generator was last (re)seeded with so agent-thread RNGs can be derived
/// from it.
pub struct SimRng {
    seed: u64,
    rng:  SmallRng,
}

impl SimRng {
    pub fn new(seed: u64) -> Self {
        SimRng { seed, rng: SmallRng::seed_from_u64(seed) }
    }

    /// Restart the stream from `seed`.
    pub fn reseed(&mut self, seed: u64) {
        *self = SimRng::new(seed);
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    #[inline]
    pub fn inner(&mut self) -> &mut SmallRng {
        &mut self.rng
    }

    #[inline]
    pub fn random<T>(&mut self) -> T
    where
        rand::distributions::Standard: rand::distributions::Distribution<T>,
    {
        self.rng.r#gen()
    }

    #[inline]
    pub fn gen_range<T, R>(&mut self, range: R) -> T
    where
        T: rand::distributions::uniform::SampleUniform,
        R: rand::distributions::uniform::SampleRange<T>,
    {
        self.rng.gen_range(range)
    }

    #[inline]
    pub fn gen_bool(&mut self, p: f64) -> bool {
        self.rng.gen_bool(p.clamp(0.0, 1.0))
    }
}
