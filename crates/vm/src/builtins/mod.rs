//! Concrete [`Builtin`](crate::builtin::Builtin) implementations.

mod bitwise;

pub use self::bitwise::BitwiseBuiltin;
