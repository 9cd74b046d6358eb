//! Randomized tester for the LUT normalization kernel.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use vtensor_ukernels::{KernelIo, U8Lut32NormFunction};

use crate::seed::test_seed;

/// Largest absolute difference allowed against the floating-point reference.
pub const TOLERANCE: f64 = 0.5;

#[derive(Debug, Clone)]
pub struct LutNormMicrokernelTester {
    n: usize,
    inplace: bool,
    iterations: usize,
    seed: u64,
}

impl Default for LutNormMicrokernelTester {
    fn default() -> Self {
        LutNormMicrokernelTester {
            n: 1,
            inplace: false,
            iterations: 15,
            seed: test_seed(),
        }
    }
}

impl LutNormMicrokernelTester {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn n(mut self, n: usize) -> Self {
        assert!(n != 0);
        self.n = n;
        self
    }

    pub fn inplace(mut self, inplace: bool) -> Self {
        self.inplace = inplace;
        self
    }

    pub fn iterations(mut self, iterations: usize) -> Self {
        self.iterations = iterations;
        self
    }

    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Largest table weight that keeps `256 * sum + sum / 2` within `u32`.
    pub fn max_weight(&self) -> u32 {
        let bound = u64::from(u32::MAX) / (257 * self.n as u64);
        bound.max(1) as u32
    }

    pub fn test(&self, kernel: U8Lut32NormFunction) {
        let n = self.n;
        let mut rng = StdRng::seed_from_u64(self.seed);
        let max_weight = self.max_weight();
        let mut x = vec![0u8; n];
        let mut y = vec![0u8; n];
        let mut table = [0u32; 256];

        for iteration in 0..self.iterations {
            rng.fill(x.as_mut_slice());
            for weight in table.iter_mut() {
                *weight = rng.gen_range(1..=max_weight);
            }

            if self.inplace {
                y.copy_from_slice(&x);
                kernel(n, &table, KernelIo::in_place(&mut y));
            } else {
                y.fill(0xA5);
                kernel(n, &table, KernelIo::separate(&x, &mut y));
            }

            let sum: f64 = x.iter().map(|&i| f64::from(table[usize::from(i)])).sum();
            for (i, (&index, &actual)) in x.iter().zip(&y).enumerate() {
                let expected = (256.0 * f64::from(table[usize::from(index)]) / sum).min(255.0);
                let diff = (f64::from(actual) - expected).abs();
                assert!(
                    diff <= TOLERANCE,
                    "output[{i}] = {actual}, expected {expected:.4} (|diff| {diff:.4} > {TOLERANCE}): \
                     n={n} inplace={} iteration={iteration} seed={}",
                    self.inplace,
                    self.seed
                );
            }
        }
    }
}
