//! Strategies for ordering dataset indices.

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use std::sync::atomic::{AtomicU64, Ordering};

/// Produces the visiting order for one pass over a dataset.
pub trait Sampler: Send + Sync {
    /// Returns the indices for one epoch over a dataset of length `len`.
    fn sample(&self, len: usize) -> Vec<usize>;
}

/// Always visits items in storage order.
pub struct SequentialSampler;

impl Sampler for SequentialSampler {
    fn sample(&self, len: usize) -> Vec<usize> {
        (0..len).collect()
    }
}

/// Shuffles items with a per-epoch seed derived from a base seed.
///
/// Every call reshuffles with `seed mixed with an epoch counter`, so two
/// samplers built with the same seed produce identical epoch sequences.
/// Mirrored replicas rely on this: each replica materialises its own
/// stream and all of them must see the same batches.
pub struct RandomSampler {
    seed: u64,
    epoch: AtomicU64,
}

impl RandomSampler {
    pub fn new(seed: u64) -> Self {
        Self {
            seed,
            epoch: AtomicU64::new(0),
        }
    }
}

impl Sampler for RandomSampler {
    fn sample(&self, len: usize) -> Vec<usize> {
        let epoch = self.epoch.fetch_add(1, Ordering::Relaxed);
        let mut rng = StdRng::seed_from_u64(self.seed ^ epoch.wrapping_mul(0x9E37_79B9_7F4A_7C15));

        let mut indices: Vec<usize> = (0..len).collect();
        indices.shuffle(&mut rng);
        indices
    }
}
