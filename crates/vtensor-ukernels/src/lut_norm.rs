//! Lookup-table normalization of quantized indices.
//!
//! Each input byte selects a 32-bit weight from a 256-entry table. Outputs
//! are the weights rescaled so the whole row sums to roughly 256:
//! `y[i] = min(255, round(256 * t[x[i]] / sum))` with `sum = Σ t[x[i]]`.
//!
//! Callers keep `256 * sum` within `u32`; the test harness draws weights from
//! `[1, u32::MAX / (257 * n)]` for that reason.

use crate::io::KernelIo;

fn prepare(kernel: &str, n: usize, io: &KernelIo<'_>) {
    assert!(n != 0, "{kernel}: n must be non-zero");
    io.check_len(kernel, n);
}

fn weight_sum(input: &[u8], table: &[u32; 256]) -> u64 {
    input.iter().map(|&x| u64::from(table[usize::from(x)])).sum()
}

/// Reference kernel using plain 64-bit division.
pub fn u8lut32norm_scalar(n: usize, table: &[u32; 256], io: KernelIo<'_>) {
    prepare("u8lut32norm", n, &io);
    match io {
        KernelIo::Separate { input, output } => {
            let sum = weight_sum(input, table);
            assert!(sum != 0, "u8lut32norm: weights sum to zero");
            for (out, &x) in output.iter_mut().zip(input) {
                *out = normalize(u64::from(table[usize::from(x)]), sum);
            }
        }
        KernelIo::InPlace(buffer) => {
            let sum = weight_sum(buffer, table);
            assert!(sum != 0, "u8lut32norm: weights sum to zero");
            for value in buffer.iter_mut() {
                *value = normalize(u64::from(table[usize::from(*value)]), sum);
            }
        }
    }
}

fn normalize(weight: u64, sum: u64) -> u8 {
    let q = ((weight << 8) + sum / 2) / sum;
    q.min(255) as u8
}

/// Kernel that replaces the per-element division with a multiply-shift
/// reciprocal of the row sum.
pub fn u8lut32norm(n: usize, table: &[u32; 256], io: KernelIo<'_>) {
    prepare("u8lut32norm", n, &io);
    match io {
        KernelIo::Separate { input, output } => {
            let divisor = RowDivisor::for_row(input, table);
            for (out, &x) in output.iter_mut().zip(input) {
                *out = divisor.normalize(table[usize::from(x)]);
            }
        }
        KernelIo::InPlace(buffer) => {
            let divisor = RowDivisor::for_row(buffer, table);
            for value in buffer.iter_mut() {
                *value = divisor.normalize(table[usize::from(*value)]);
            }
        }
    }
}

struct RowDivisor {
    sum: u32,
    reciprocal: Reciprocal,
}

impl RowDivisor {
    fn for_row(input: &[u8], table: &[u32; 256]) -> Self {
        let mut lanes = [0u64; 4];
        let mut chunks = input.chunks_exact(4);
        for chunk in &mut chunks {
            for (lane, &x) in lanes.iter_mut().zip(chunk) {
                *lane += u64::from(table[usize::from(x)]);
            }
        }
        let sum = lanes.iter().sum::<u64>() + weight_sum(chunks.remainder(), table);
        assert!(sum != 0, "u8lut32norm: weights sum to zero");
        assert!(
            sum <= u64::from(u32::MAX),
            "u8lut32norm: weight sum {sum} exceeds 32 bits"
        );
        let sum = sum as u32;
        RowDivisor {
            sum,
            reciprocal: Reciprocal::new(sum),
        }
    }

    fn normalize(&self, weight: u32) -> u8 {
        let numerator = (u64::from(weight) << 8) + u64::from(self.sum / 2);
        let q = match u32::try_from(numerator) {
            Ok(numerator) => self.reciprocal.divide(numerator),
            // Only reachable when the caller ignores the weight bound.
            Err(_) => (numerator / u64::from(self.sum)).min(255) as u32,
        };
        q.min(255) as u8
    }
}

/// Precomputed `n / d` for a fixed 32-bit divisor (Granlund–Montgomery).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Reciprocal {
    multiplier: u32,
    shift1: u32,
    shift2: u32,
}

impl Reciprocal {
    pub fn new(divisor: u32) -> Self {
        assert!(divisor != 0, "division by zero");
        if divisor == 1 {
            return Reciprocal {
                multiplier: 1,
                shift1: 0,
                shift2: 0,
            };
        }
        let log2_ceil_minus_1 = 31 - (divisor - 1).leading_zeros();
        let high = (2u64 << log2_ceil_minus_1) - u64::from(divisor);
        let multiplier = ((high << 32) / u64::from(divisor) + 1) as u32;
        Reciprocal {
            multiplier,
            shift1: 1,
            shift2: log2_ceil_minus_1,
        }
    }

    pub fn divide(&self, n: u32) -> u32 {
        let t = ((u64::from(n) * u64::from(self.multiplier)) >> 32) as u32;
        (t + ((n - t) >> self.shift1)) >> self.shift2
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn single_weight_saturates() {
        let mut table = [0u32; 256];
        table[3] = 5;
        let input = [3u8];
        let mut output = [0u8];
        u8lut32norm(1, &table, KernelIo::separate(&input, &mut output));
        assert_eq!(output, [255]);
    }

    #[test]
    fn uniform_weights_split_evenly() {
        let table = [1000u32; 256];
        for n in [2usize, 3, 4, 16, 100] {
            let input: Vec<u8> = (0..n).map(|i| i as u8).collect();
            let mut output = vec![0u8; n];
            u8lut32norm(n, &table, KernelIo::separate(&input, &mut output));
            let expected = ((256.0 / n as f64).round() as u32).min(255) as u8;
            assert!(output.iter().all(|&y| y == expected), "n={n}: {output:?}");
        }
    }

    #[test]
    fn in_place_reads_before_writing() {
        let table: [u32; 256] = std::array::from_fn(|i| i as u32 + 1);
        let input: Vec<u8> = (0..40).map(|i| (i * 13) as u8).collect();
        let mut expected = vec![0u8; input.len()];
        u8lut32norm_scalar(input.len(), &table, KernelIo::separate(&input, &mut expected));

        let mut buffer = input.clone();
        u8lut32norm(buffer.len(), &table, KernelIo::in_place(&mut buffer));
        assert_eq!(buffer, expected);
    }

    #[test]
    fn reciprocal_handles_edge_divisors() {
        for d in [1u32, 2, 3, 7, 255, 256, 257, 65_535, u32::MAX / 2 + 1, u32::MAX] {
            let r = Reciprocal::new(d);
            for n in [0u32, 1, d - 1, d, d.wrapping_add(1), u32::MAX / 3, u32::MAX] {
                assert_eq!(r.divide(n), n / d, "{n} / {d}");
            }
        }
    }

    #[test]
    #[should_panic(expected = "sum to zero")]
    fn zero_weights_are_a_contract_violation() {
        let table = [0u32; 256];
        let mut buffer = [1u8, 2];
        u8lut32norm(2, &table, KernelIo::in_place(&mut buffer));
    }

    proptest! {
        #[test]
        fn reciprocal_matches_division(d in 1u32.., n in any::<u32>()) {
            prop_assert_eq!(Reciprocal::new(d).divide(n), n / d);
        }

        #[test]
        fn optimized_matches_scalar(
            input in prop::collection::vec(any::<u8>(), 1..200),
            seed in any::<u32>(),
        ) {
            let n = input.len();
            let max_weight = u32::MAX / (257 * n as u32);
            let table: [u32; 256] = std::array::from_fn(|i| {
                (seed.wrapping_mul(2_654_435_761).wrapping_add(i as u32 * 40_503)) % max_weight + 1
            });
            let mut expected = vec![0u8; n];
            let mut actual = vec![0xA5u8; n];
            u8lut32norm_scalar(n, &table, KernelIo::separate(&input, &mut expected));
            u8lut32norm(n, &table, KernelIo::separate(&input, &mut actual));
            prop_assert_eq!(actual, expected);
        }
    }
}
