use std::time::{SystemTime, UNIX_EPOCH};

/// Seeded per-cycle random source (mulberry32). One instance per cycle, threaded
/// through the cycle context; every probabilistic decision draws from it.
#[derive(Debug, Clone)]
pub struct CycleRng {
    seed: u32,
    state: u32,
    draws: u64,
}

impl CycleRng {
    pub fn from_seed(seed: u32) -> Self {
        Self {
            seed,
            state: seed,
            draws: 0,
        }
    }

    /// Seed derivation for a cycle: `base_seed ^ cycle`.
    pub fn for_cycle(base_seed: u32, cycle: u32) -> Self {
        Self::from_seed(cycle_seed(base_seed, cycle))
    }

    pub fn seed(&self) -> u32 {
        self.seed
    }

    pub fn draws(&self) -> u64 {
        self.draws
    }

    /// Uniform float in [0, 1).
    pub fn next_f64(&mut self) -> f64 {
        self.draws += 1;
        self.state = self.state.wrapping_add(0x6D2B_79F5);
        let mut t = self.state;
        t = (t ^ (t >> 15)).wrapping_mul(t | 1);
        t ^= t.wrapping_add((t ^ (t >> 7)).wrapping_mul(t | 61));
        f64::from(t ^ (t >> 14)) / 4_294_967_296.0
    }

    /// One draw; true when it lands under `probability`.
    pub fn chance(&mut self, probability: f64) -> bool {
        self.next_f64() < probability
    }

    /// Weighted pick over non-negative weights. Draws exactly once when any weight is positive.
    pub fn weighted_index(&mut self, weights: &[f64]) -> Option<usize> {
        let total: f64 = weights.iter().filter(|w| **w > 0.0).sum();
        if total <= 0.0 {
            return None;
        }
        let roll = self.next_f64() * total;
        let mut acc = 0.0;
        let mut last_positive = None;
        for (idx, weight) in weights.iter().enumerate() {
            if *weight <= 0.0 {
                continue;
            }
            acc += weight;
            last_positive = Some(idx);
            if roll < acc {
                return Some(idx);
            }
        }
        last_positive
    }
}

pub fn cycle_seed(base_seed: u32, cycle: u32) -> u32 {
    base_seed ^ cycle
}

/// Wall-clock entropy for runs without a configured base seed. The seed it
/// produces is recorded with the cycle, so replay never calls this.
pub fn entropy_seed() -> u32 {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_nanos())
        .unwrap_or(0);
    let mut hash = 0x811C_9DC5u32;
    for byte in nanos.to_le_bytes() {
        hash ^= u32::from(byte);
        hash = hash.wrapping_mul(0x0100_0193);
    }
    hash
}
