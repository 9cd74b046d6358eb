//! Randomized tester for the interleave kernels.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use vtensor_ukernels::{KernelIo, XZipCFunction, XZipVFunction};

use crate::seed::test_seed;

/// Builder describing one batch of interleave checks.
///
/// Each iteration fills `g` planes of `n` random bytes, runs the kernel, and
/// compares every output byte with `x[j * n + i]`.
#[derive(Debug, Clone)]
pub struct ZipMicrokernelTester {
    n: usize,
    g: usize,
    inplace: bool,
    iterations: usize,
    seed: u64,
}

impl Default for ZipMicrokernelTester {
    fn default() -> Self {
        ZipMicrokernelTester {
            n: 1,
            g: 1,
            inplace: false,
            iterations: 15,
            seed: test_seed(),
        }
    }
}

impl ZipMicrokernelTester {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn n(mut self, n: usize) -> Self {
        assert!(n != 0);
        self.n = n;
        self
    }

    pub fn g(mut self, g: usize) -> Self {
        assert!(g != 0);
        self.g = g;
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

    /// Checks a fixed-group kernel; `g` must be 2, 3 or 4.
    pub fn test_xzc(&self, kernel: XZipCFunction) {
        assert!((2..=4).contains(&self.g), "fixed zip kernels take g in 2..=4");
        self.run(|n, io| kernel(n, io));
    }

    /// Checks a variable-group kernel; `g` is passed as `m` and must be >= 4.
    pub fn test_xzv(&self, kernel: XZipVFunction) {
        assert!(self.g >= 4, "variable zip kernels take g >= 4");
        let m = self.g;
        self.run(|n, io| kernel(n, m, io));
    }

    fn run(&self, kernel: impl Fn(usize, KernelIo<'_>)) {
        let (n, g) = (self.n, self.g);
        let mut rng = StdRng::seed_from_u64(self.seed);
        let mut x = vec![0u8; n * g];
        let mut y = vec![0u8; n * g];

        for iteration in 0..self.iterations {
            rng.fill(x.as_mut_slice());
            if self.inplace {
                y.copy_from_slice(&x);
                kernel(n, KernelIo::in_place(&mut y));
            } else {
                y.fill(0xA5);
                kernel(n, KernelIo::separate(&x, &mut y));
            }

            for i in 0..n {
                for j in 0..g {
                    assert_eq!(
                        y[i * g + j],
                        x[j * n + i],
                        "output[{}] (row {i}, plane {j}) mismatch: n={n} g={g} inplace={} \
                         iteration={iteration} seed={}",
                        i * g + j,
                        self.inplace,
                        self.seed
                    );
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn swapped_x2(n: usize, io: KernelIo<'_>) {
        if let KernelIo::Separate { input, output } = io {
            for i in 0..n {
                output[2 * i] = input[n + i];
                output[2 * i + 1] = input[i];
            }
        }
    }

    #[test]
    fn accepts_reference_kernel() {
        ZipMicrokernelTester::new()
            .n(9)
            .g(3)
            .seed(1)
            .test_xzc(vtensor_ukernels::zip::x3_scalar);
    }

    #[test]
    #[should_panic(expected = "seed=11")]
    fn reports_seed_on_mismatch() {
        ZipMicrokernelTester::new()
            .n(4)
            .g(2)
            .seed(11)
            .test_xzc(swapped_x2);
    }
}
