//! Defines the [`Error`] type of the crate.

use crate::memory::Pointer;

/// An error that might occur when executing a Cairo program.
#[derive(Debug, Clone, thiserror::Error)]
pub enum Error {
    /// The Cairo VM ran out of physical memory to represent the running program's memory.
    #[error("out of memory")]
    OutOfMemory,
    /// A segment index was used that has not been allocated by [`Memory::add_segment`].
    ///
    /// [`Memory::add_segment`]: crate::memory::Memory::add_segment
    #[error("segment {segment} is out of bounds (memory has {len} segment(s))")]
    SegmentOutOfBounds {
        /// The segment index that was requested.
        segment: usize,
        /// The number of segments currently allocated.
        len: usize,
    },
    /// A memory cell that was required to be already asserted was still unknown.
    #[error("memory cell at {addr:?} is not defined")]
    UndefinedValue {
        /// The address of the cell that was required.
        addr: Pointer,
    },
    /// The program counter is pointing to an unknown memory cell, or the memory cell was
    /// known but contained a pointer rather than a scalar value.
    #[error("program counter does not point to a valid instruction cell")]
    ProgramCounterLost,
    /// The value of the first operand of an instruction could not be deduced from a builtin,
    /// a hint, or a previous assertion.
    #[error("cannot deduce the value of the first operand")]
    CantDeduceOp0,
    /// The value of the second operand of an instruction could not be deduced from a builtin,
    /// a hint, or a previous assertion.
    #[error("cannot deduce the value of the second operand")]
    CantDeduceOp1,
    /// A builtin failed to run correctly because of invalid input.
    #[error("a builtin failed to deduce a memory cell from its inputs")]
    Builtin,
    /// Attempted to construct a pointer from a value that cannot be represented within the
    /// physical memory of the Cairo VM.
    #[error("value does not fit in a memory offset")]
    PointerTooLarge,
    /// Attempted to subtract a pointer from a scalar, which makes no sense.
    #[error("cannot subtract a pointer from a scalar")]
    SubtractPointer,
    /// Attempted to add two pointers together, which makes no sense.
    #[error("cannot add two pointers together")]
    AddPointers,
    /// Attempted to multiply a value that involves a pointer.
    #[error("cannot multiply a pointer")]
    MultiplyPointer,
    /// Attempted to divide by a pointer.
    #[error("cannot divide by a pointer")]
    DivideByPointer,
    /// Attempted to divide a pointer.
    #[error("cannot divide a pointer")]
    DividePointer,
    /// Attempted to divide by zero.
    #[error("cannot divide by zero")]
    DivideByZero,
    /// Tried to perform a pointer operation on two pointers that had different provenances.
    #[error("cannot compare pointers from different segments")]
    IncoherentProvenance,
    /// A [`Value`](crate::memory::Value) was expected to be a scalar, but was a pointer.
    #[error("expected a scalar value at {addr:?}")]
    ExpectedScalar {
        /// The address at which a scalar was expected.
        addr: Pointer,
    },
    /// A [`Value`](crate::memory::Value) was expected to be a pointer, but was a scalar.
    #[error("expected a pointer value at {addr:?}")]
    ExpectedPointer {
        /// The address at which a pointer was expected.
        addr: Pointer,
    },

    /// The value of one of the memory cells contradicted a previous assertion on that same
    /// memory cell.
    ///
    /// This happens when an `AssertEq` instruction (or a builtin memoization) is used on a
    /// memory cell that has already been asserted to a different value.
    #[error("memory cell at {addr:?} was already asserted to a different value")]
    Contradiction {
        /// The address of the memory cell that was asserted twice.
        addr: Pointer,
    },

    // In most cases, it is recommended to abort the program and return an error to the user.
    //
    /// A memory cell supposed to contain an instruction to execute contained a field element
    /// that did not fit in a 64-bit unsigned integer.
    #[error("instruction word does not fit in 64 bits")]
    UndefinedInstruction,
    /// Bit 63 of the instruction word was set.
    #[error("bit 63 of the instruction word must be zero")]
    HighBitSet,
    /// The source of the second operand of an instruction was invalid.
    #[error("invalid op1_src encoding")]
    UndefinedOp1Source,
    /// The result logic of an instruction was invalid.
    #[error("invalid res_logic encoding")]
    UndefinedResultLogic,
    /// The update logic of the **Program Counter** of an instruction was invalid.
    #[error("invalid pc_update encoding")]
    UndefinedPcUpdate,
    /// The update logic of the **Allocation Pointer** of an instruction was invalid.
    #[error("invalid ap_update encoding")]
    UndefinedApUpdate,
    /// The OP code of an instruction was invalid.
    #[error("invalid opcode encoding")]
    UndefinedOpCode,
}
