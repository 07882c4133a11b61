//! Explicit, splittable random generator state.
//!
//! Nothing in this crate calls `thread_rng()`. Every sampling function takes a
//! [`PrngKey`], and callers that need several independent streams split the key
//! instead of reusing it.

use nalgebra::{DMatrix, DVector};
use rand::{rngs::StdRng, seq::SliceRandom, Rng, SeedableRng};
use rand_distr::StandardNormal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrngKey {
    seed: u64,
}

impl PrngKey {
    pub fn new(seed: u64) -> Self {
        Self { seed }
    }

    /// Consume the key and derive two new, independent keys.
    pub fn split(self) -> (PrngKey, PrngKey) {
        let mut rng = self.rng();
        (PrngKey::new(rng.gen()), PrngKey::new(rng.gen()))
    }

    pub fn split_n(self, n: usize) -> Vec<PrngKey> {
        let mut rng = self.rng();
        (0..n).map(|_| PrngKey::new(rng.gen())).collect()
    }

    pub fn normal_matrix(self, rows: usize, cols: usize) -> DMatrix<f64> {
        let mut rng = self.rng();
        DMatrix::from_fn(rows, cols, |_, _| rng.sample(StandardNormal))
    }

    pub fn normal_vector(self, len: usize) -> DVector<f64> {
        let mut rng = self.rng();
        DVector::from_fn(len, |_, _| rng.sample(StandardNormal))
    }

    pub fn permutation(self, n: usize) -> Vec<usize> {
        let mut permutation = (0..n).collect::<Vec<_>>();
        permutation.shuffle(&mut self.rng());
        permutation
    }

    fn rng(&self) -> StdRng {
        StdRng::seed_from_u64(self.seed)
    }
}
