//! Defines the [`Memory`] type, responsible for representing the memory of a Cairo virtual
//! machine.
//!
//! # Immutable Memory
//!
//! Note that the memory of a Cairo virtual machine does not work in the same way regular computer
//! memory do. Instead, it is mathematically immutable, and every operation that would normally
//! mutate memory instead *asserts* a memory cell to a specific value. The value was previously
//! unknown, and now it is defined to a specific value. Any access to that memory cell must now
//! confirm its value is the same as the one it was asserted to.
//!
//! # Segments
//!
//! Each cell of the memory holds an element of a field (in this case, the Starknet field is
//! used). And the total size of the memory is the size of that field. Because it's not possible
//! to represent a field of that size in a regular computer's memory, the Cairo language requires
//! programs to split their memory into *segments*. Each segment is a contiguous block of memory
//! that is located *somewhere* in the virtual machine's address space. The final location of
//! segments is not decided until the program has finished running, meaning that a program can
//! never rely on the final location of a segment.

mod pointer;
mod segment;
mod value;

pub use self::pointer::*;
pub use self::segment::*;
pub use self::value::*;

use crate::error::Error;

/// Represents the memory of the Cairo virtual machine.
///
/// More information on memory can be found in the [module-level documentation](self).
#[derive(Default, Debug, Clone)]
pub struct Memory {
    /// The segments that have been allocated in the memory.
    segments: Vec<Segment>,
}

impl Memory {
    /// Creates a new, empty [`Memory`] with no segments.
    #[inline(always)]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of segments currently allocated.
    #[inline(always)]
    pub fn segment_count(&self) -> usize {
        self.segments.len()
    }

    /// Appends a new, empty [`Segment`] to the memory and returns its index.
    pub fn add_segment(&mut self) -> usize {
        self.segments.push(Segment::new());
        self.segments.len() - 1
    }

    /// Reads the memory cell at `addr`, without requiring that it be already asserted.
    ///
    /// Fails with [`Error::SegmentOutOfBounds`] if `addr.segment` has not been allocated.
    pub fn get(&self, addr: Pointer) -> Result<Option<ValueRef>, Error> {
        Ok(self.segment(addr.segment)?.get(addr.offset))
    }

    /// Reads the memory cell at `addr`, failing with [`Error::UndefinedValue`] if it has not
    /// been asserted yet.
    pub fn get_required(&self, addr: Pointer) -> Result<ValueRef, Error> {
        self.get(addr)?.ok_or(Error::UndefinedValue { addr })
    }

    /// Asserts that the memory cell at `addr` has the given value.
    ///
    /// Succeeds as a no-op if the cell was already asserted to the same value. Fails with
    /// [`Error::Contradiction`] if it was asserted to a different one, and with
    /// [`Error::SegmentOutOfBounds`] if `addr.segment` has not been allocated.
    pub fn insert(&mut self, addr: Pointer, value: ValueRef) -> Result<(), Error> {
        self.segment_mut(addr.segment)?
            .assert_eq(addr.offset, value, addr)
    }

    /// Returns a [`Segment`] of the memory, checking that `segment` is in bounds.
    fn segment(&self, segment: usize) -> Result<&Segment, Error> {
        self.segments
            .get(segment)
            .ok_or(Error::SegmentOutOfBounds {
                segment,
                len: self.segments.len(),
            })
    }

    /// Returns a mutable [`Segment`] of the memory, checking that `segment` is in bounds.
    fn segment_mut(&mut self, segment: usize) -> Result<&mut Segment, Error> {
        let len = self.segments.len();
        self.segments
            .get_mut(segment)
            .ok_or(Error::SegmentOutOfBounds { segment, len })
    }

    /// Returns a [`Segment`] of the memory.
    ///
    /// # Safety
    ///
    /// The provided `segment` must have been allocated previously by this [`Memory`].
    #[inline(always)]
    pub(crate) unsafe fn segment_unchecked(&self, segment: usize) -> &Segment {
        unsafe { self.segments.get_unchecked(segment) }
    }

    /// Returns a mutable [`Segment`] of the memory.
    ///
    /// # Safety
    ///
    /// The provided `segment` must have been allocated previously by this [`Memory`].
    #[inline(always)]
    pub(crate) unsafe fn segment_unchecked_mut(&mut self, segment: usize) -> &mut Segment {
        unsafe { self.segments.get_unchecked_mut(segment) }
    }
}

#[cfg(test)]
mod tests {
    use starknet_types_core::felt::Felt;

    use super::*;

    fn addr(segment: usize, offset: usize) -> Pointer {
        Pointer { segment, offset }
    }

    #[test]
    fn write_once_accepts_repeated_equal_inserts() {
        let mut memory = Memory::new();
        memory.add_segment();

        let a = addr(0, 3);
        let v = Felt::from(42u64);

        for _ in 0..3 {
            memory
                .insert(a, ValueRef::Scalar(&v))
                .expect("repeated equal insert must succeed");
        }

        assert_eq!(memory.get_required(a).unwrap().copied(), Value::Scalar(v));
    }

    #[test]
    fn write_once_rejects_conflicting_insert() {
        let mut memory = Memory::new();
        memory.add_segment();

        let a = addr(0, 3);
        let v1 = Felt::from(1u64);
        let v2 = Felt::from(2u64);

        memory.insert(a, ValueRef::Scalar(&v1)).unwrap();
        let err = memory.insert(a, ValueRef::Scalar(&v2)).unwrap_err();
        assert!(matches!(err, Error::Contradiction { addr: got } if got == a));

        assert_eq!(
            memory.get_required(a).unwrap().copied(),
            Value::Scalar(v1)
        );
    }

    #[test]
    fn segment_out_of_bounds() {
        let memory = Memory::new();
        let err = memory.get(addr(0, 0)).unwrap_err();
        assert!(matches!(
            err,
            Error::SegmentOutOfBounds { segment: 0, len: 0 }
        ));
    }

    #[test]
    fn undefined_value() {
        let mut memory = Memory::new();
        memory.add_segment();
        let err = memory.get_required(addr(0, 0)).unwrap_err();
        assert!(matches!(err, Error::UndefinedValue { .. }));
    }
}
