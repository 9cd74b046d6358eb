use smallvec::SmallVec;

/// Scratch copy of an aliased input; small kernels stay on the stack.
pub(crate) type Scratch = SmallVec<[u8; 512]>;

/// Input and output bytes handed to a microkernel.
///
/// Rust cannot express an output slice overlapping a live input slice, so
/// in-place operation is its own variant instead of two aliasing pointers.
#[derive(Debug)]
pub enum KernelIo<'a> {
    Separate { input: &'a [u8], output: &'a mut [u8] },
    /// Output overwrites the input.
    InPlace(&'a mut [u8]),
}

impl<'a> KernelIo<'a> {
    pub fn separate(input: &'a [u8], output: &'a mut [u8]) -> Self {
        KernelIo::Separate { input, output }
    }

    pub fn in_place(buffer: &'a mut [u8]) -> Self {
        KernelIo::InPlace(buffer)
    }

    pub fn is_in_place(&self) -> bool {
        matches!(self, KernelIo::InPlace(_))
    }

    pub fn input_len(&self) -> usize {
        match self {
            KernelIo::Separate { input, .. } => input.len(),
            KernelIo::InPlace(buffer) => buffer.len(),
        }
    }

    pub fn output_len(&self) -> usize {
        match self {
            KernelIo::Separate { output, .. } => output.len(),
            KernelIo::InPlace(buffer) => buffer.len(),
        }
    }

    /// Panics unless both sides hold exactly `len` bytes.
    pub(crate) fn check_len(&self, kernel: &str, len: usize) {
        assert_eq!(self.input_len(), len, "{kernel}: input length");
        assert_eq!(self.output_len(), len, "{kernel}: output length");
    }

    /// Splits into disjoint input and output, staging an aliased input in
    /// `scratch`.
    pub(crate) fn split<'s>(self, scratch: &'s mut Scratch) -> (&'s [u8], &'s mut [u8])
    where
        'a: 's,
    {
        match self {
            KernelIo::Separate { input, output } => (input, output),
            KernelIo::InPlace(buffer) => {
                scratch.clear();
                scratch.extend_from_slice(buffer);
                (&scratch[..], buffer)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn separate_io_reports_both_sides() {
        let input = [1u8, 2, 3];
        let mut output = [0u8; 3];
        let io = KernelIo::separate(&input, &mut output);
        assert!(!io.is_in_place());
        assert_eq!((io.input_len(), io.output_len()), (3, 3));
    }

    #[test]
    fn in_place_split_stages_input() {
        let mut buffer = [4u8, 5, 6, 7];
        let io = KernelIo::in_place(&mut buffer);
        assert!(io.is_in_place());
        let mut scratch = Scratch::new();
        let (input, output) = io.split(&mut scratch);
        output.fill(0);
        assert_eq!(input, &[4, 5, 6, 7]);
        assert_eq!(buffer, [0; 4]);
    }

    #[test]
    #[should_panic(expected = "x2: output length")]
    fn length_mismatch_panics() {
        let input = [0u8; 4];
        let mut output = [0u8; 3];
        KernelIo::separate(&input, &mut output).check_len("x2", 4);
    }
}
