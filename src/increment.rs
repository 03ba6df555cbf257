use bytes::Bytes;

use crate::cmd::ToArg;

/// Amount passed to the increment operations.
///
/// The store has separate integer and floating point increment commands with different precision
/// and overflow rules, the variant decides which one runs.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Increment {
    Integer(i64),
    Float(f64),
}

impl Increment {
    /// Classifies a runtime number: formatted, parsed back as an integer and compared with the
    /// original. Only an exact match takes the integer path, so `3.0` is an integer while `1.5`,
    /// `1e300` and `NaN` are floats.
    pub fn classify(amount: f64) -> Increment {
        match amount.to_string().parse::<i64>() {
            Ok(integer) if integer as f64 == amount => Increment::Integer(integer),
            _ => Increment::Float(amount),
        }
    }

    pub fn is_integer(&self) -> bool {
        matches!(self, Increment::Integer(_))
    }
}

impl From<f64> for Increment {
    fn from(amount: f64) -> Self {
        Increment::classify(amount)
    }
}

impl From<i64> for Increment {
    fn from(amount: i64) -> Self {
        Increment::Integer(amount)
    }
}

impl From<i32> for Increment {
    fn from(amount: i32) -> Self {
        Increment::Integer(amount.into())
    }
}

impl From<u32> for Increment {
    fn from(amount: u32) -> Self {
        Increment::Integer(amount.into())
    }
}

impl ToArg for Increment {
    fn to_arg(&self) -> Bytes {
        match self {
            Increment::Integer(amount) => amount.to_arg(),
            Increment::Float(amount) => amount.to_arg(),
        }
    }
}
