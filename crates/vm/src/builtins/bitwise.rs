//! Defines [`BitwiseBuiltin`], the normative example of a [`Builtin`](crate::builtin::Builtin).

use starknet_types_core::felt::Felt;

use crate::builtin::{Builtin, CannotDeduce};
use crate::memory::{Segment, Value};

/// Number of cells in a single block of the bitwise builtin's segment.
const CELLS_PER_BLOCK: usize = 5;

/// Number of input cells at the start of each block.
const INPUT_CELLS_PER_BLOCK: usize = 2;

/// A [`Builtin`] that partitions its segment into blocks of [`CELLS_PER_BLOCK`] cells, of which
/// the first [`INPUT_CELLS_PER_BLOCK`] are inputs `x` and `y`, and the remaining three are the
/// outputs `x & y`, `x ^ y` and `x | y` at block-relative offsets 2, 3 and 4 respectively.
///
/// Output cells are computed on demand from the block's input cells; the caller is expected to
/// memoize the computed value back into memory through the normal write-once path, so that
/// re-reads do not recompute it and a conflicting direct write is rejected.
#[derive(Debug, Default, Clone, Copy)]
pub struct BitwiseBuiltin {
    _private: (),
}

impl BitwiseBuiltin {
    /// Creates a new [`BitwiseBuiltin`].
    pub const fn new() -> Self {
        Self { _private: () }
    }
}

impl Builtin for BitwiseBuiltin {
    fn deduce(
        &self,
        offset: usize,
        segment: &Segment,
        result: &mut Value,
    ) -> Result<(), CannotDeduce> {
        let block_start = offset - offset % CELLS_PER_BLOCK;
        let cell_kind = offset - block_start;

        if cell_kind < INPUT_CELLS_PER_BLOCK {
            // Input cells carry no derived value; the caller must have written them directly.
            return Err(CannotDeduce);
        }

        let x = read_input(segment, block_start)?;
        let y = read_input(segment, block_start + 1)?;

        let x = x.to_bytes_be();
        let y = y.to_bytes_be();
        let mut out = [0u8; 32];

        match cell_kind {
            2 => {
                for i in 0..32 {
                    out[i] = x[i] & y[i];
                }
            }
            3 => {
                for i in 0..32 {
                    out[i] = x[i] ^ y[i];
                }
            }
            4 => {
                for i in 0..32 {
                    out[i] = x[i] | y[i];
                }
            }
            _ => return Err(CannotDeduce),
        }

        *result = Value::Scalar(Felt::from_bytes_be(&out));
        Ok(())
    }
}

/// Reads an input cell of the bitwise builtin's segment, failing if it is unknown or a pointer.
fn read_input(segment: &Segment, offset: usize) -> Result<Felt, CannotDeduce> {
    segment
        .get(offset)
        .and_then(|v| v.scalar().copied())
        .ok_or(CannotDeduce)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::ValueRef;

    fn block_segment(x: u64, y: u64) -> Segment {
        let mut segment = Segment::new();
        let addr = crate::memory::Pointer {
            segment: 0,
            offset: 0,
        };
        let xf = Felt::from(x);
        let yf = Felt::from(y);
        segment.assert_eq(0, ValueRef::Scalar(&xf), addr).unwrap();
        segment.assert_eq(1, ValueRef::Scalar(&yf), addr).unwrap();
        segment
    }

    #[test]
    fn and_xor_or() {
        let segment = block_segment(0b1100, 0b1010);
        let builtin = BitwiseBuiltin::new();

        let mut result = Value::Scalar(Felt::ZERO);
        builtin.deduce(2, &segment, &mut result).unwrap();
        assert_eq!(result, Value::Scalar(Felt::from(0b1000u64)));

        builtin.deduce(3, &segment, &mut result).unwrap();
        assert_eq!(result, Value::Scalar(Felt::from(0b0110u64)));

        builtin.deduce(4, &segment, &mut result).unwrap();
        assert_eq!(result, Value::Scalar(Felt::from(0b1110u64)));
    }

    #[test]
    fn input_cells_cannot_be_deduced() {
        let segment = block_segment(1, 2);
        let builtin = BitwiseBuiltin::new();
        let mut result = Value::Scalar(Felt::ZERO);
        assert!(builtin.deduce(0, &segment, &mut result).is_err());
        assert!(builtin.deduce(1, &segment, &mut result).is_err());
    }

    #[test]
    fn missing_inputs_cannot_be_deduced() {
        let segment = Segment::new();
        let builtin = BitwiseBuiltin::new();
        let mut result = Value::Scalar(Felt::ZERO);
        assert!(builtin.deduce(2, &segment, &mut result).is_err());
    }
}
