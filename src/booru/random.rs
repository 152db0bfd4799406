use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};

use crate::booru::client::Post;

/// Randomness used by the search: page choice and post sampling.
pub trait RandomSource: Send + Sync {
    /// A page number drawn uniformly from `1..=upper`.
    fn page_in(&self, upper: u32) -> u32;

    /// Shuffle posts into a uniformly random order.
    fn shuffle(&self, posts: &mut [Post]);
}

/// Process-wide thread-local generator.
#[derive(Debug, Clone, Copy, Default)]
pub struct ThreadRandom;

impl RandomSource for ThreadRandom {
    fn page_in(&self, upper: u32) -> u32 {
        rand::thread_rng().gen_range(1..=upper.max(1))
    }

    fn shuffle(&self, posts: &mut [Post]) {
        posts.shuffle(&mut rand::thread_rng());
    }
}

/// Deterministic generator, for reproducible runs.
#[derive(Debug)]
pub struct SeededRandom {
    rng: Mutex<StdRng>,
}

impl SeededRandom {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }
}

impl RandomSource for SeededRandom {
    fn page_in(&self, upper: u32) -> u32 {
        self.rng.lock().gen_range(1..=upper.max(1))
    }

    fn shuffle(&self, posts: &mut [Post]) {
        posts.shuffle(&mut *self.rng.lock());
    }
}
