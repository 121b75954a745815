//! Control flow types

use super::values::{ErrorKind, Val};
use crate::gate::GateDestroyed;

/* ===================== Control Flow ===================== */

/// Statement completion
///
/// When control != Normal, enclosing statements unwind until a loop or
/// function boundary consumes it.
#[derive(Debug, Clone, PartialEq)]
pub enum Control {
    Normal,
    Break,
    Continue,
    Return(Val),
}

/// Abrupt termination of evaluation
#[derive(Debug, Clone, PartialEq)]
pub enum Interrupt {
    /// A thrown script value, catchable by `try`/`catch`
    Throw(Val),
    /// The step gate was destroyed; unwinds every frame, never caught
    Halt,
}

pub type EvalResult<T> = Result<T, Interrupt>;

impl Interrupt {
    pub fn error(kind: ErrorKind, message: impl Into<String>) -> Self {
        Interrupt::Throw(Val::error(kind, message))
    }

    pub fn type_error(message: impl Into<String>) -> Self {
        Self::error(ErrorKind::TypeError, message)
    }

    pub fn reference_error(message: impl Into<String>) -> Self {
        Self::error(ErrorKind::ReferenceError, message)
    }

    pub fn range_error(message: impl Into<String>) -> Self {
        Self::error(ErrorKind::RangeError, message)
    }
}

impl From<GateDestroyed> for Interrupt {
    fn from(_: GateDestroyed) -> Self {
        Interrupt::Halt
    }
}
