//! Byte interleaving ("zip") kernels.
//!
//! Input is `g` contiguous planes of `n` bytes each; output row `i` holds
//! byte `i` of every plane: `y[i * g + j] = x[j * n + i]`.
//!
//! Each grouping factor has a scalar reference (`*_scalar`) and an optimized
//! kernel that works in blocks of [`BLOCK`] rows. Blocks use SSE2 unpacks on
//! x86_64 and NEON structured stores on aarch64; other targets and the
//! three-plane case on x86_64 use an unrolled portable block.

use crate::io::{KernelIo, Scratch};

/// Rows handled per vector block; sizes below it run only the scalar tail.
pub const BLOCK: usize = 16;

fn prepare(kernel: &str, n: usize, g: usize, io: &KernelIo<'_>) {
    assert!(n != 0, "{kernel}: n must be non-zero");
    let Some(len) = n.checked_mul(g) else {
        panic!("{kernel}: {n} x {g} bytes overflows usize");
    };
    io.check_len(kernel, len);
}

fn zip_scalar(kernel: &str, n: usize, g: usize, io: KernelIo<'_>) {
    prepare(kernel, n, g, &io);
    let mut scratch = Scratch::new();
    let (input, output) = io.split(&mut scratch);
    for (i, row) in output.chunks_exact_mut(g).enumerate() {
        for (j, out) in row.iter_mut().enumerate() {
            *out = input[j * n + i];
        }
    }
}

pub fn x2_scalar(n: usize, io: KernelIo<'_>) {
    zip_scalar("x8zip_x2", n, 2, io);
}

pub fn x3_scalar(n: usize, io: KernelIo<'_>) {
    zip_scalar("x8zip_x3", n, 3, io);
}

pub fn x4_scalar(n: usize, io: KernelIo<'_>) {
    zip_scalar("x8zip_x4", n, 4, io);
}

/// Scalar interleave of `m >= 4` planes.
pub fn xm_scalar(n: usize, m: usize, io: KernelIo<'_>) {
    assert!(m >= 4, "x8zip_xm: m must be at least 4, got {m}");
    zip_scalar("x8zip_xm", n, m, io);
}

pub fn x2(n: usize, io: KernelIo<'_>) {
    prepare("x8zip_x2", n, 2, &io);
    let mut scratch = Scratch::new();
    let (input, output) = io.split(&mut scratch);
    let (a, b) = input.split_at(n);

    let blocks = n / BLOCK;
    for (idx, out) in output.chunks_exact_mut(2 * BLOCK).take(blocks).enumerate() {
        let i = idx * BLOCK;
        zip2_block(&a[i..], &b[i..], out);
    }
    for i in blocks * BLOCK..n {
        output[2 * i] = a[i];
        output[2 * i + 1] = b[i];
    }
}

pub fn x3(n: usize, io: KernelIo<'_>) {
    prepare("x8zip_x3", n, 3, &io);
    let mut scratch = Scratch::new();
    let (input, output) = io.split(&mut scratch);
    let (a, rest) = input.split_at(n);
    let (b, c) = rest.split_at(n);

    let blocks = n / BLOCK;
    for (idx, out) in output.chunks_exact_mut(3 * BLOCK).take(blocks).enumerate() {
        let i = idx * BLOCK;
        zip3_block(&a[i..], &b[i..], &c[i..], out);
    }
    for i in blocks * BLOCK..n {
        output[3 * i] = a[i];
        output[3 * i + 1] = b[i];
        output[3 * i + 2] = c[i];
    }
}

pub fn x4(n: usize, io: KernelIo<'_>) {
    prepare("x8zip_x4", n, 4, &io);
    let mut scratch = Scratch::new();
    let (input, output) = io.split(&mut scratch);
    let planes = [&input[..n], &input[n..2 * n], &input[2 * n..3 * n], &input[3 * n..]];

    let blocks = n / BLOCK;
    for (idx, out) in output.chunks_exact_mut(4 * BLOCK).take(blocks).enumerate() {
        let i = idx * BLOCK;
        zip4_block(&planes[0][i..], &planes[1][i..], &planes[2][i..], &planes[3][i..], out);
    }
    for i in blocks * BLOCK..n {
        for (j, plane) in planes.iter().enumerate() {
            output[4 * i + j] = plane[i];
        }
    }
}

/// Interleaves `m >= 4` planes four at a time.
pub fn xm(n: usize, m: usize, io: KernelIo<'_>) {
    assert!(m >= 4, "x8zip_xm: m must be at least 4, got {m}");
    prepare("x8zip_xm", n, m, &io);
    let mut scratch = Scratch::new();
    let (input, output) = io.split(&mut scratch);
    let mut quads = [0u8; 4 * BLOCK];

    let mut k = 0;
    while k < m {
        // The last group is shifted back to stay in range; overlapped
        // columns are rewritten with identical bytes.
        let first = k.min(m - 4);
        let group = &input[first * n..(first + 4) * n];
        let (p0, rest) = group.split_at(n);
        let (p1, rest) = rest.split_at(n);
        let (p2, p3) = rest.split_at(n);

        let blocks = n / BLOCK;
        for block in 0..blocks {
            let i = block * BLOCK;
            zip4_block(&p0[i..], &p1[i..], &p2[i..], &p3[i..], &mut quads);
            for (r, quad) in quads.chunks_exact(4).enumerate() {
                let at = (i + r) * m + first;
                output[at..at + 4].copy_from_slice(quad);
            }
        }
        for i in blocks * BLOCK..n {
            let at = i * m + first;
            output[at] = p0[i];
            output[at + 1] = p1[i];
            output[at + 2] = p2[i];
            output[at + 3] = p3[i];
        }
        k += 4;
    }
}

fn check_block(planes: &[&[u8]], out: &[u8]) {
    assert!(planes.iter().all(|plane| plane.len() >= BLOCK));
    assert!(out.len() >= planes.len() * BLOCK);
}

#[cfg(target_arch = "x86_64")]
fn zip2_block(a: &[u8], b: &[u8], out: &mut [u8]) {
    use std::arch::x86_64::*;
    check_block(&[a, b], out);
    // SAFETY: SSE2 is part of the x86_64 baseline and every load and store
    // stays inside the lengths checked above.
    unsafe {
        let va = _mm_loadu_si128(a.as_ptr().cast());
        let vb = _mm_loadu_si128(b.as_ptr().cast());
        let dst = out.as_mut_ptr();
        _mm_storeu_si128(dst.cast(), _mm_unpacklo_epi8(va, vb));
        _mm_storeu_si128(dst.add(16).cast(), _mm_unpackhi_epi8(va, vb));
    }
}

#[cfg(target_arch = "x86_64")]
fn zip3_block(a: &[u8], b: &[u8], c: &[u8], out: &mut [u8]) {
    zip3_portable(a, b, c, out);
}

#[cfg(target_arch = "x86_64")]
fn zip4_block(a: &[u8], b: &[u8], c: &[u8], d: &[u8], out: &mut [u8]) {
    use std::arch::x86_64::*;
    check_block(&[a, b, c, d], out);
    // SAFETY: as in `zip2_block`.
    unsafe {
        let va = _mm_loadu_si128(a.as_ptr().cast());
        let vb = _mm_loadu_si128(b.as_ptr().cast());
        let vc = _mm_loadu_si128(c.as_ptr().cast());
        let vd = _mm_loadu_si128(d.as_ptr().cast());
        let ab_lo = _mm_unpacklo_epi8(va, vb);
        let ab_hi = _mm_unpackhi_epi8(va, vb);
        let cd_lo = _mm_unpacklo_epi8(vc, vd);
        let cd_hi = _mm_unpackhi_epi8(vc, vd);
        let dst = out.as_mut_ptr();
        _mm_storeu_si128(dst.cast(), _mm_unpacklo_epi16(ab_lo, cd_lo));
        _mm_storeu_si128(dst.add(16).cast(), _mm_unpackhi_epi16(ab_lo, cd_lo));
        _mm_storeu_si128(dst.add(32).cast(), _mm_unpacklo_epi16(ab_hi, cd_hi));
        _mm_storeu_si128(dst.add(48).cast(), _mm_unpackhi_epi16(ab_hi, cd_hi));
    }
}

#[cfg(target_arch = "aarch64")]
fn zip2_block(a: &[u8], b: &[u8], out: &mut [u8]) {
    use std::arch::aarch64::*;
    check_block(&[a, b], out);
    // SAFETY: NEON is part of the aarch64 baseline and every load and store
    // stays inside the lengths checked above.
    unsafe {
        let planes = uint8x16x2_t(vld1q_u8(a.as_ptr()), vld1q_u8(b.as_ptr()));
        vst2q_u8(out.as_mut_ptr(), planes);
    }
}

#[cfg(target_arch = "aarch64")]
fn zip3_block(a: &[u8], b: &[u8], c: &[u8], out: &mut [u8]) {
    use std::arch::aarch64::*;
    check_block(&[a, b, c], out);
    // SAFETY: as in `zip2_block`.
    unsafe {
        let planes = uint8x16x3_t(
            vld1q_u8(a.as_ptr()),
            vld1q_u8(b.as_ptr()),
            vld1q_u8(c.as_ptr()),
        );
        vst3q_u8(out.as_mut_ptr(), planes);
    }
}

#[cfg(target_arch = "aarch64")]
fn zip4_block(a: &[u8], b: &[u8], c: &[u8], d: &[u8], out: &mut [u8]) {
    use std::arch::aarch64::*;
    check_block(&[a, b, c, d], out);
    // SAFETY: as in `zip2_block`.
    unsafe {
        let planes = uint8x16x4_t(
            vld1q_u8(a.as_ptr()),
            vld1q_u8(b.as_ptr()),
            vld1q_u8(c.as_ptr()),
            vld1q_u8(d.as_ptr()),
        );
        vst4q_u8(out.as_mut_ptr(), planes);
    }
}

#[cfg(not(any(target_arch = "x86_64", target_arch = "aarch64")))]
fn zip2_block(a: &[u8], b: &[u8], out: &mut [u8]) {
    zip2_portable(a, b, out);
}

#[cfg(not(any(target_arch = "x86_64", target_arch = "aarch64")))]
fn zip3_block(a: &[u8], b: &[u8], c: &[u8], out: &mut [u8]) {
    zip3_portable(a, b, c, out);
}

#[cfg(not(any(target_arch = "x86_64", target_arch = "aarch64")))]
fn zip4_block(a: &[u8], b: &[u8], c: &[u8], d: &[u8], out: &mut [u8]) {
    zip4_portable(a, b, c, d, out);
}

#[cfg(any(test, not(any(target_arch = "x86_64", target_arch = "aarch64"))))]
fn zip2_portable(a: &[u8], b: &[u8], out: &mut [u8]) {
    check_block(&[a, b], out);
    for (i, pair) in out[..2 * BLOCK].chunks_exact_mut(2).enumerate() {
        pair[0] = a[i];
        pair[1] = b[i];
    }
}

#[cfg(any(test, not(target_arch = "aarch64")))]
fn zip3_portable(a: &[u8], b: &[u8], c: &[u8], out: &mut [u8]) {
    check_block(&[a, b, c], out);
    for (i, triple) in out[..3 * BLOCK].chunks_exact_mut(3).enumerate() {
        triple[0] = a[i];
        triple[1] = b[i];
        triple[2] = c[i];
    }
}

#[cfg(any(test, not(any(target_arch = "x86_64", target_arch = "aarch64"))))]
fn zip4_portable(a: &[u8], b: &[u8], c: &[u8], d: &[u8], out: &mut [u8]) {
    check_block(&[a, b, c, d], out);
    for (i, quad) in out[..4 * BLOCK].chunks_exact_mut(4).enumerate() {
        quad[0] = a[i];
        quad[1] = b[i];
        quad[2] = c[i];
        quad[3] = d[i];
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn planes(n: usize, g: usize) -> Vec<u8> {
        (0..n * g).map(|i| (i * 7 + 3) as u8).collect()
    }

    fn run_c(kernel: fn(usize, KernelIo<'_>), n: usize, g: usize) -> Vec<u8> {
        let input = planes(n, g);
        let mut output = vec![0xA5; n * g];
        kernel(n, KernelIo::separate(&input, &mut output));
        output
    }

    #[test]
    fn x2_interleaves_two_rows() {
        let input: Vec<u8> = (1..=8).chain(101..=108).collect();
        let mut output = vec![0; 16];
        x2(8, KernelIo::separate(&input, &mut output));
        assert_eq!(
            output,
            vec![1, 101, 2, 102, 3, 103, 4, 104, 5, 105, 6, 106, 7, 107, 8, 108]
        );
    }

    #[test]
    fn optimized_matches_scalar_across_block_boundaries() {
        let cases: [(fn(usize, KernelIo<'_>), fn(usize, KernelIo<'_>), usize); 3] =
            [(x2, x2_scalar, 2), (x3, x3_scalar, 3), (x4, x4_scalar, 4)];
        for (fast, reference, g) in cases {
            for n in 1..=3 * BLOCK + 1 {
                assert_eq!(run_c(fast, n, g), run_c(reference, n, g), "g={g} n={n}");
            }
        }
    }

    #[test]
    fn in_place_matches_out_of_place() {
        for n in [1, 7, BLOCK, BLOCK + 5, 4 * BLOCK] {
            let expected = run_c(x4_scalar, n, 4);
            let mut buffer = planes(n, 4);
            x4(n, KernelIo::in_place(&mut buffer));
            assert_eq!(buffer, expected, "n={n}");
        }
    }

    #[test]
    fn vector_blocks_match_portable_blocks() {
        let a: Vec<u8> = (0..16).collect();
        let b: Vec<u8> = (16..32).collect();
        let c: Vec<u8> = (32..48).collect();
        let d: Vec<u8> = (48..64).collect();

        let (mut fast, mut slow) = ([0u8; 64], [0u8; 64]);
        zip2_block(&a, &b, &mut fast);
        zip2_portable(&a, &b, &mut slow);
        assert_eq!(fast[..32], slow[..32]);
        zip3_block(&a, &b, &c, &mut fast);
        zip3_portable(&a, &b, &c, &mut slow);
        assert_eq!(fast[..48], slow[..48]);
        zip4_block(&a, &b, &c, &d, &mut fast);
        zip4_portable(&a, &b, &c, &d, &mut slow);
        assert_eq!(fast, slow);
    }

    #[test]
    #[should_panic(expected = "n must be non-zero")]
    fn zero_rows_is_a_contract_violation() {
        x2(0, KernelIo::separate(&[], &mut []));
    }

    #[test]
    #[should_panic(expected = "output length")]
    fn short_output_is_a_contract_violation() {
        let input = [0u8; 8];
        let mut output = [0u8; 7];
        x2(4, KernelIo::separate(&input, &mut output));
    }

    #[test]
    #[should_panic(expected = "at least 4")]
    fn xm_rejects_small_groups() {
        let mut buffer = [0u8; 6];
        xm(2, 3, KernelIo::in_place(&mut buffer));
    }

    proptest! {
        #[test]
        fn xm_matches_scalar(n in 1usize..70, m in 4usize..13, inplace in any::<bool>()) {
            let input = planes(n, m);
            let mut expected = vec![0; n * m];
            xm_scalar(n, m, KernelIo::separate(&input, &mut expected));

            let actual = if inplace {
                let mut buffer = input.clone();
                xm(n, m, KernelIo::in_place(&mut buffer));
                buffer
            } else {
                let mut output = vec![0xA5; n * m];
                xm(n, m, KernelIo::separate(&input, &mut output));
                output
            };
            prop_assert_eq!(actual, expected);
        }
    }
}
