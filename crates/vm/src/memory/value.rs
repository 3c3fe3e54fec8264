//! Defines the [`Value`] type.

use num_traits::ToPrimitive;
use starknet_types_core::felt::Felt;

use crate::error::Error;

use super::Pointer;

/// A value that may be stored in a [`Memory`](super::Memory) segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Value {
    /// A scalar with no provenance information.
    ///
    /// In that case, the value simply carries a specific value without any more information.
    Scalar(Felt),
    /// A pointer with an associated segment.
    ///
    /// In that case, the value is actually a pointer within a specific segment.
    Pointer(Pointer),
}

impl Value {
    /// Attempts to add two [`Value`]s together.
    ///
    /// Adding two pointers together makes no sense and fails with [`Error::AddPointers`].
    pub fn add(&self, other: &Self) -> Result<Self, Error> {
        match (self, other) {
            (Self::Scalar(left), Self::Scalar(right)) => Ok(Value::Scalar(left + right)),
            (Self::Pointer(left), Self::Scalar(right)) => Ok(left.add_felt(right)?.into()),
            (Self::Scalar(left), Self::Pointer(right)) => Ok(right.add_felt(left)?.into()),
            (Self::Pointer(_), Self::Pointer(_)) => Err(Error::AddPointers),
        }
    }

    /// Attempts to subtract two [`Value`]s.
    pub fn subtract(&self, other: &Self) -> Result<Self, Error> {
        match self {
            Self::Scalar(left) => match other {
                Self::Scalar(right) => Ok(Value::Scalar(left - right)),
                Self::Pointer(_) => Err(Error::SubtractPointer),
            },
            Self::Pointer(left) => match other {
                Self::Scalar(right) => match right.to_usize() {
                    Some(right) => Ok(left.wrapping_sub(right).into()),
                    None => Err(Error::PointerTooLarge),
                },
                Self::Pointer(right) => left
                    .subtract(right)
                    .map(|dist| Value::Scalar(Felt::from(dist))),
            },
        }
    }

    /// Attempts to multiply two values together.
    ///
    /// Both operands must be scalars; multiplying a pointer makes no sense and fails with
    /// [`Error::MultiplyPointer`].
    pub fn multiply(&self, other: &Self) -> Result<Self, Error> {
        match (self, other) {
            (Self::Scalar(left), Self::Scalar(right)) => Ok(Value::Scalar(left * right)),
            _ => Err(Error::MultiplyPointer),
        }
    }

    /// Attempts to divide two values.
    ///
    /// Note that only scalar can be used to divide other values.
    pub fn divide(&self, other: &Self) -> Result<Self, Error> {
        match other {
            Self::Scalar(other) => match other.try_into() {
                Ok(d) => match self {
                    Self::Scalar(n) => Ok(Value::Scalar(n.field_div(&d))),
                    Self::Pointer(_) => Err(Error::DividePointer),
                },
                Err(_) => Err(Error::DivideByZero),
            },
            Self::Pointer(_) => Err(Error::DivideByPointer),
        }
    }

    /// Returns this value as a [`Felt`], failing with `at` attached to
    /// [`Error::ExpectedScalar`] if it is actually a pointer.
    pub fn as_scalar(&self, at: Pointer) -> Result<Felt, Error> {
        match self {
            Self::Scalar(value) => Ok(*value),
            Self::Pointer(_) => Err(Error::ExpectedScalar { addr: at }),
        }
    }

    /// Returns this value as a [`Pointer`], failing with `at` attached to
    /// [`Error::ExpectedPointer`] if it is actually a scalar.
    pub fn as_pointer(&self, at: Pointer) -> Result<Pointer, Error> {
        match self {
            Self::Pointer(pointer) => Ok(*pointer),
            Self::Scalar(_) => Err(Error::ExpectedPointer { addr: at }),
        }
    }

    /// Borrows this value as a [`ValueRef`].
    #[inline(always)]
    pub fn as_ref(&self) -> ValueRef<'_> {
        match self {
            Self::Scalar(s) => ValueRef::Scalar(s),
            Self::Pointer(p) => ValueRef::Pointer(p),
        }
    }
}

impl From<Felt> for Value {
    #[inline(always)]
    fn from(value: Felt) -> Self {
        Self::Scalar(value)
    }
}

impl From<Pointer> for Value {
    #[inline(always)]
    fn from(value: Pointer) -> Self {
        Self::Pointer(value)
    }
}

impl PartialEq<Pointer> for Value {
    fn eq(&self, other: &Pointer) -> bool {
        match self {
            Self::Scalar(_) => false,
            Self::Pointer(pointer) => pointer == other,
        }
    }
}

impl PartialEq<Felt> for Value {
    fn eq(&self, other: &Felt) -> bool {
        match self {
            Self::Scalar(value) => value == other,
            Self::Pointer(_) => false,
        }
    }
}

/// A reference to a [`Value`] that holds the discriminant inline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueRef<'a> {
    /// A scalar with no provenance information.
    Scalar(&'a Felt),
    /// A pointer with an associated segment.
    Pointer(&'a Pointer),
}

impl<'a> ValueRef<'a> {
    /// Copy the referenced value in a concrete [`Value`] instance.
    #[inline(always)]
    pub const fn copied(self) -> Value {
        match self {
            Self::Scalar(element) => Value::Scalar(*element),
            Self::Pointer(pointer) => Value::Pointer(*pointer),
        }
    }

    /// Attempts to convert the reference to a scalar value.
    #[inline(always)]
    pub const fn scalar(self) -> Option<&'a Felt> {
        match self {
            Self::Scalar(element) => Some(element),
            Self::Pointer(_) => None,
        }
    }

    /// Attempts to convert the reference to a pointer value.
    #[inline(always)]
    pub const fn pointer(self) -> Option<&'a Pointer> {
        match self {
            Self::Scalar(_) => None,
            Self::Pointer(pointer) => Some(pointer),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_scalars() {
        let a = Value::Scalar(Felt::from(3u64));
        let b = Value::Scalar(Felt::from(4u64));
        assert_eq!(a.add(&b).unwrap(), Felt::from(7u64));
    }

    #[test]
    fn add_pointers_fails() {
        let p = Pointer {
            segment: 0,
            offset: 0,
        };
        let a = Value::Pointer(p);
        let b = Value::Pointer(p);
        assert!(matches!(a.add(&b), Err(Error::AddPointers)));
    }

    #[test]
    fn multiply_pointer_fails() {
        let p = Value::Pointer(Pointer {
            segment: 0,
            offset: 0,
        });
        let s = Value::Scalar(Felt::from(2u64));
        assert!(matches!(p.multiply(&s), Err(Error::MultiplyPointer)));
    }
}
