//! Defines the [`Pointer`] type.

use num_traits::ToPrimitive;
use starknet_types_core::felt::Felt;

use crate::error::Error;

/// A pointer within a [`Memory`](super::Memory) segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Pointer {
    /// The index of the segment in the memory.
    ///
    /// This can be thought of as the provenance of the pointer.
    pub segment: usize,
    /// The offset within the segment.
    pub offset: usize,
}

impl Pointer {
    /// Returns the signed distance between `self` and `other`, given that are refering to the
    /// same segment.
    pub fn subtract(&self, other: &Self) -> Result<isize, Error> {
        if self.segment != other.segment {
            Err(Error::IncoherentProvenance)
        } else {
            Ok(self.offset.wrapping_sub(other.offset) as isize)
        }
    }

    /// Adds `offset` to `self.offset` using wrapping arithmetic.
    #[inline(always)]
    pub fn wrapping_add(self, offset: usize) -> Self {
        Self {
            segment: self.segment,
            offset: self.offset.wrapping_add(offset),
        }
    }

    /// Subtracts `offset` from `self.offset` using wrapping arithmetic.
    #[inline(always)]
    pub fn wrapping_sub(self, offset: usize) -> Self {
        Self {
            segment: self.segment,
            offset: self.offset.wrapping_sub(offset),
        }
    }

    /// Adds the non-negative integer value of `felt` to this pointer's offset.
    ///
    /// Fails with [`Error::PointerTooLarge`] if `felt` does not fit in a [`usize`].
    pub fn add_felt(&self, felt: &Felt) -> Result<Self, Error> {
        let offset = felt.to_usize().ok_or(Error::PointerTooLarge)?;
        Ok(self.wrapping_add(offset))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subtract_same_segment() {
        let a = Pointer {
            segment: 1,
            offset: 10,
        };
        let b = Pointer {
            segment: 1,
            offset: 4,
        };
        assert_eq!(a.subtract(&b).unwrap(), 6);
    }

    #[test]
    fn subtract_cross_segment_fails() {
        let a = Pointer {
            segment: 1,
            offset: 10,
        };
        let b = Pointer {
            segment: 2,
            offset: 4,
        };
        assert!(matches!(
            a.subtract(&b),
            Err(Error::IncoherentProvenance)
        ));
    }
}
