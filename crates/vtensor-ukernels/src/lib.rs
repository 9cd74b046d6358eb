//! Byte-level microkernels used by quantized operators.
//!
//! Kernels are plain function pointers with no hidden state, so a test
//! harness can drive the scalar reference and the optimized variant through
//! the same signature.

mod io;
pub mod lut_norm;
pub mod zip;

pub use io::KernelIo;
pub use lut_norm::{u8lut32norm, u8lut32norm_scalar, Reciprocal};

/// Interleaves a fixed number of byte planes of length `n`.
pub type XZipCFunction = fn(n: usize, io: KernelIo<'_>);

/// Interleaves `m` byte planes of length `n`.
pub type XZipVFunction = fn(n: usize, m: usize, io: KernelIo<'_>);

/// Normalizes `n` table-weighted indices into bytes.
pub type U8Lut32NormFunction = fn(n: usize, table: &[u32; 256], io: KernelIo<'_>);
