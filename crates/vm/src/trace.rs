//! Defines the [`Trace`] trait, used to gather information about the execution of a Cairo
//! program within the virtual machine.

use crate::memory::{Pointer, Value};

/// A collection of callbacks to be called during the execution of a Cairo program.
///
/// Every method has a no-op default, so an implementation only needs to override the
/// callbacks it actually cares about.
#[allow(unused_variables)]
pub trait Trace {
    /// Called once for every memory cell a [`step`](crate::CairoVM::step) commits, in the
    /// order they were decided.
    fn cell_written(&mut self, addr: Pointer, value: Value) {}

    /// Called once per successful step, after every memory cell has been committed and the
    /// registers have been updated to their post-step values.
    fn step_committed(&mut self, pc: Pointer, ap: Pointer, fp: Pointer) {}
}

/// An implementation of [`Trace`] that does nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopTrace;
impl Trace for NoopTrace {}
