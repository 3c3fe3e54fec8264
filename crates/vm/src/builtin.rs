//! Defines the [`Builtin`] trait responsible for executing built-in pre-defined functions.

use crate::error::Error;
use crate::memory::{Segment, Value};

/// An error that occurs when a [`Builtin`] is not able to deduce the value of a memory cell
/// from the given segment.
#[derive(Debug, Clone, Copy)]
pub struct CannotDeduce;

impl From<CannotDeduce> for Error {
    fn from(_value: CannotDeduce) -> Self {
        Error::Builtin
    }
}

/// A built-in that may be executed by the virtual machine.
///
/// Implementations only ever read from the builtin's own [`Segment`]; they never write to
/// memory directly. When a deduction succeeds, the caller is responsible for committing the
/// deduced value back to memory through [`Memory::insert`](crate::memory::Memory::insert), so
/// that the write-once semantics of memory still apply to memoized builtin cells.
pub trait Builtin {
    /// Attempts to deduce the value of a specific memory cell from the given segment.
    ///
    /// # Returns
    ///
    /// If the value could be successfully deduced, `Ok(_)` is returned and the value is written
    /// to `result`.
    ///
    /// Otherwise, [`CannotDeduce`] is returned.
    fn deduce(
        &self,
        offset: usize,
        segment: &Segment,
        result: &mut Value,
    ) -> Result<(), CannotDeduce>;
}
