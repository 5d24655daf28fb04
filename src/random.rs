//! Seedable random numbers shared by everything inside one simulation.
//!
//! Every draw in a run goes through the same `RandomHelper`, so the seed together with
//! the order of agent creation and draws fixes the whole trajectory.

use log::info;
use rand::rngs::StdRng;
use rand::{Rng, RngCore, SeedableRng};
use rand_distr::StandardNormal;
use std::sync::{Arc, Mutex};
use std::time::{SystemTime, UNIX_EPOCH};

const SECONDARY_SALT: u64 = 0x9E37_79B9_7F4A_7C15;
const WORKER_SALT: u64 = 0xD1B5_4A32_D192_ED03;

fn splitmix64(mut x: u64) -> u64 {
    x = x.wrapping_add(0x9E37_79B9_7F4A_7C15);
    x = (x ^ (x >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    x = (x ^ (x >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    x ^ (x >> 31)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stream {
    Primary,
    Secondary,
}

/// Two independent generator streams derived from one seed; draws use the active one.
///
/// The secondary stream isolates draws that must not perturb the primary sequence,
/// e.g. rank-local randomness in a distributed run.
#[derive(Debug, Clone)]
pub struct RandomHelper {
    seed: u64,
    time_seed: bool,
    primary: StdRng,
    secondary: StdRng,
    active: Stream,
}

impl RandomHelper {
    pub fn new(seed: u64) -> Self {
        RandomHelper {
            seed,
            time_seed: false,
            primary: StdRng::seed_from_u64(seed),
            secondary: StdRng::seed_from_u64(splitmix64(seed ^ SECONDARY_SALT)),
            active: Stream::Primary,
        }
    }

    /// Sets the seed used by the next `reset`.
    pub fn set_seed(&mut self, seed: u64) {
        self.seed = seed;
        self.time_seed = false;
    }

    /// The next `reset` seeds from the wall clock.
    pub fn set_time_seed(&mut self) {
        self.time_seed = true;
    }

    /// Re-derives both streams from the current seed and activates the primary one.
    ///
    /// Synchronized use across threads goes through [`RandomHelper::into_shared`].
    pub fn reset(&mut self) {
        if self.time_seed {
            self.seed = SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|d| d.as_nanos() as u64)
                .unwrap_or(0);
            self.time_seed = false;
            info!("Seeding random generator from clock: {}", self.seed);
        }
        self.primary = StdRng::seed_from_u64(self.seed);
        self.secondary = StdRng::seed_from_u64(splitmix64(self.seed ^ SECONDARY_SALT));
        self.active = Stream::Primary;
    }

    /// The seed the streams were last derived from (resolved when time-seeded).
    pub fn seed(&self) -> u64 {
        self.seed
    }

    pub fn active_stream(&self) -> Stream {
        self.active
    }

    pub fn use_primary_generator(&mut self) {
        self.active = Stream::Primary;
    }

    pub fn use_secondary_generator(&mut self) {
        self.active = Stream::Secondary;
    }

    #[inline]
    fn rng(&mut self) -> &mut StdRng {
        match self.active {
            Stream::Primary => &mut self.primary,
            Stream::Secondary => &mut self.secondary,
        }
    }

    /// Uniform in [0, 1).
    pub fn random(&mut self) -> f64 {
        self.rng().random::<f64>()
    }

    /// Uniform in [0, max).
    pub fn random_below(&mut self, max: f64) -> f64 {
        self.random() * max
    }

    /// Uniform in [a, b).
    pub fn random_range(&mut self, a: f64, b: f64) -> f64 {
        a + (b - a) * self.random()
    }

    /// Uniform integer in [0, n); 0 when `n == 0`.
    pub fn random_int(&mut self, n: u64) -> u64 {
        if n == 0 {
            return 0;
        }
        self.rng().random_range(0..n)
    }

    pub fn random_bool(&mut self, p: f64) -> bool {
        self.random() < p
    }

    /// Standard normal draw.
    pub fn normal(&mut self) -> f64 {
        self.rng().sample::<f64, _>(StandardNormal)
    }

    pub fn normal_with(&mut self, mean: f64, std_dev: f64) -> f64 {
        mean + std_dev * self.normal()
    }

    /// A reproducible generator for worker `worker`, independent of the draw history.
    pub fn worker_stream(&self, worker: u64) -> StdRng {
        StdRng::seed_from_u64(splitmix64(
            self.seed ^ WORKER_SALT.wrapping_mul(worker.wrapping_add(1)),
        ))
    }

    /// Switches to synchronized mode: the helper moves behind a lock and every draw
    /// through the returned handle is mutually exclusive with draws on other threads.
    pub fn into_shared(self) -> SharedRandom {
        SharedRandom(Arc::new(Mutex::new(self)))
    }
}

impl Default for RandomHelper {
    fn default() -> Self {
        RandomHelper::new(0)
    }
}

impl RngCore for RandomHelper {
    fn next_u32(&mut self) -> u32 {
        self.rng().next_u32()
    }

    fn next_u64(&mut self) -> u64 {
        self.rng().next_u64()
    }

    fn fill_bytes(&mut self, dst: &mut [u8]) {
        self.rng().fill_bytes(dst)
    }
}

/// Thread-safe handle; each call holds the lock for exactly one draw.
#[derive(Debug, Clone)]
pub struct SharedRandom(Arc<Mutex<RandomHelper>>);

impl SharedRandom {
    pub fn with<R>(&self, f: impl FnOnce(&mut RandomHelper) -> R) -> R {
        let mut guard = self.0.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        f(&mut guard)
    }

    pub fn random(&self) -> f64 {
        self.with(|r| r.random())
    }

    pub fn normal(&self) -> f64 {
        self.with(|r| r.normal())
    }

    pub fn random_int(&self, n: u64) -> u64 {
        self.with(|r| r.random_int(n))
    }

    pub fn reset(&self) {
        self.with(|r| r.reset())
    }
}
