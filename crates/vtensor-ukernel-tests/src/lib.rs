pub mod lut_norm_tester;
pub mod seed;
pub mod storage;
pub mod zip_tester;

pub use anyhow;
pub use vtensor_ukernels;
pub use lut_norm_tester::LutNormMicrokernelTester;
pub use zip_tester::ZipMicrokernelTester;

/// Runs the storage conformance suite against a context constructor
/// returning `Arc<C>`.
#[macro_export]
macro_rules! define_context_tests {
    ($module:ident, $context_ctor:expr) => {
        #[cfg(test)]
        mod $module {
            #[allow(unused_imports)]
            use super::*;
            use $crate::storage;

            #[test]
            fn padding_invariants() -> $crate::anyhow::Result<()> {
                storage::padding_invariants(&($context_ctor)())
            }

            #[test]
            fn write_then_read_inserts_barrier() -> $crate::anyhow::Result<()> {
                storage::write_then_read_inserts_barrier(&($context_ctor)())
            }

            #[test]
            fn read_after_read_is_free() -> $crate::anyhow::Result<()> {
                storage::read_after_read_is_free(&($context_ctor)())
            }

            #[test]
            fn read_capability_leaves_record() -> $crate::anyhow::Result<()> {
                storage::read_capability_leaves_record(&($context_ctor)())
            }

            #[test]
            fn clones_share_access_record() -> $crate::anyhow::Result<()> {
                storage::clones_share_access_record(&($context_ctor)())
            }

            #[test]
            fn explicit_buffer_barrier_submits() -> $crate::anyhow::Result<()> {
                storage::explicit_buffer_barrier_submits(&($context_ctor)())
            }

            #[test]
            fn generic_round_trip() -> $crate::anyhow::Result<()> {
                storage::generic_round_trip(&($context_ctor)())
            }
        }
    };
}

/// Generates the size sweeps for one family of interleave kernels.
///
/// `threshold` is the row count the optimized path vectorizes over; scalar
/// kernels pass 1.
#[macro_export]
macro_rules! define_zip_tests {
    (
        $module:ident,
        x2: $x2:path,
        x3: $x3:path,
        x4: $x4:path,
        xm: $xm:path,
        threshold: $threshold:expr $(,)?
    ) => {
        #[cfg(test)]
        mod $module {
            #[allow(unused_imports)]
            use super::*;
            use $crate::ZipMicrokernelTester;

            const T: usize = $threshold;

            fn sweep_c(
                kernel: $crate::vtensor_ukernels::XZipCFunction,
                g: usize,
                ns: impl Iterator<Item = usize>,
            ) {
                for n in ns {
                    for inplace in [false, true] {
                        ZipMicrokernelTester::new()
                            .n(n)
                            .g(g)
                            .inplace(inplace)
                            .test_xzc(kernel);
                    }
                }
            }

            fn sweep_v(ns: impl Iterator<Item = usize>, ms: impl Iterator<Item = usize> + Clone) {
                for n in ns {
                    for m in ms.clone() {
                        for inplace in [false, true] {
                            ZipMicrokernelTester::new()
                                .n(n)
                                .g(m)
                                .inplace(inplace)
                                .test_xzv($xm);
                        }
                    }
                }
            }

            #[test]
            fn x2_n_eq() {
                sweep_c($x2, 2, std::iter::once(T));
            }

            #[test]
            fn x2_n_div() {
                sweep_c($x2, 2, (2 * T..=8 * T).step_by(T));
            }

            #[test]
            fn x2_n_gt() {
                sweep_c($x2, 2, T + 1..2 * T.max(8));
            }

            #[test]
            fn x2_n_lt() {
                sweep_c($x2, 2, 1..T);
            }

            #[test]
            fn x3_n_eq() {
                sweep_c($x3, 3, std::iter::once(T));
            }

            #[test]
            fn x3_n_div() {
                sweep_c($x3, 3, (2 * T..=8 * T).step_by(T));
            }

            #[test]
            fn x3_n_gt() {
                sweep_c($x3, 3, T + 1..2 * T.max(8));
            }

            #[test]
            fn x3_n_lt() {
                sweep_c($x3, 3, 1..T);
            }

            #[test]
            fn x4_n_eq() {
                sweep_c($x4, 4, std::iter::once(T));
            }

            #[test]
            fn x4_n_div() {
                sweep_c($x4, 4, (2 * T..=8 * T).step_by(T));
            }

            #[test]
            fn x4_n_gt() {
                sweep_c($x4, 4, T + 1..2 * T.max(8));
            }

            #[test]
            fn x4_n_lt() {
                sweep_c($x4, 4, 1..T);
            }

            #[test]
            fn xm_n_eq_m_eq_4() {
                sweep_v(std::iter::once(T), std::iter::once(4));
            }

            #[test]
            fn xm_n_eq_m_div_4() {
                sweep_v(std::iter::once(T), (4..32).step_by(4));
            }

            #[test]
            fn xm_n_eq_m_gt_4() {
                sweep_v(std::iter::once(T), 5..8);
            }

            #[test]
            fn xm_n_div_m_eq_4() {
                sweep_v((2 * T..=8 * T).step_by(T), std::iter::once(4));
            }

            #[test]
            fn xm_n_div_m_div_4() {
                sweep_v((2 * T..=8 * T).step_by(T), (4..32).step_by(4));
            }

            #[test]
            fn xm_n_div_m_gt_4() {
                sweep_v((2 * T..=8 * T).step_by(T), 5..8);
            }

            #[test]
            fn xm_n_gt_m_eq_4() {
                sweep_v(T + 1..2 * T.max(8), std::iter::once(4));
            }

            #[test]
            fn xm_n_gt_m_div_4() {
                sweep_v(T + 1..2 * T.max(8), (4..32).step_by(4));
            }

            #[test]
            fn xm_n_gt_m_gt_4() {
                sweep_v(T + 1..2 * T.max(8), 5..8);
            }

            #[test]
            fn xm_n_lt() {
                sweep_v(1..T, 4..12);
            }
        }
    };
}

/// Generates the size sweeps for a LUT normalization kernel.
#[macro_export]
macro_rules! define_lut_norm_tests {
    ($module:ident, $kernel:path, threshold: $threshold:expr $(,)?) => {
        #[cfg(test)]
        mod $module {
            #[allow(unused_imports)]
            use super::*;
            use $crate::LutNormMicrokernelTester;

            const T: usize = $threshold;

            fn sweep(ns: impl Iterator<Item = usize>, inplace: bool) {
                for n in ns {
                    LutNormMicrokernelTester::new()
                        .n(n)
                        .inplace(inplace)
                        .test($kernel);
                }
            }

            #[test]
            fn n_eq_1() {
                sweep(std::iter::once(1), false);
            }

            #[test]
            fn n_eq() {
                sweep(std::iter::once(T), false);
            }

            #[test]
            fn n_div() {
                sweep((2 * T..=8 * T).step_by(T), false);
            }

            #[test]
            fn n_gt() {
                sweep(T + 1..2 * T + 16, false);
            }

            #[test]
            fn n_lt() {
                sweep(1..T, false);
            }

            #[test]
            fn inplace() {
                sweep(1..2 * T + 16, true);
            }

            #[test]
            fn large_rows() {
                sweep([1000, 4097, 65_536].into_iter(), false);
            }
        }
    };
}
