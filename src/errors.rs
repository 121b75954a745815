//! Run failures as seen by the caller

use thiserror::Error;

use crate::executor::{ErrorKind, Val};
use crate::parser::ParseError;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum RunError {
    #[error("SyntaxError: {0}")]
    Syntax(#[from] ParseError),

    #[error("ReferenceError: {0}")]
    Reference(String),

    #[error("TypeError: {0}")]
    Type(String),

    #[error("RangeError: {0}")]
    Range(String),

    /// A thrown `Error` value
    #[error("Error: {0}")]
    Script(String),

    /// A thrown value that is not an error
    #[error("Uncaught {0}")]
    Uncaught(String),

    /// The run could not be started or its runtime failed
    #[error("Runtime failure: {0}")]
    Runtime(String),
}

impl RunError {
    /// Native error name of the failure
    pub fn kind_name(&self) -> &'static str {
        match self {
            RunError::Syntax(_) => "SyntaxError",
            RunError::Reference(_) => "ReferenceError",
            RunError::Type(_) => "TypeError",
            RunError::Range(_) => "RangeError",
            RunError::Script(_) | RunError::Uncaught(_) | RunError::Runtime(_) => "Error",
        }
    }

    pub fn message(&self) -> String {
        match self {
            RunError::Syntax(err) => err.message().to_string(),
            RunError::Reference(msg)
            | RunError::Type(msg)
            | RunError::Range(msg)
            | RunError::Script(msg)
            | RunError::Uncaught(msg)
            | RunError::Runtime(msg) => msg.clone(),
        }
    }
}

/// Recover the native error kind and message from a value thrown by a program
pub fn adapt_error(value: &Val) -> RunError {
    match value {
        Val::Error(info) => {
            let message = info.message.clone();
            match info.kind {
                ErrorKind::ReferenceError => RunError::Reference(message),
                ErrorKind::TypeError => RunError::Type(message),
                ErrorKind::RangeError => RunError::Range(message),
                ErrorKind::SyntaxError => RunError::Syntax(ParseError::BuildError(message)),
                ErrorKind::Error => RunError::Script(message),
            }
        }
        Val::Str(text) => RunError::Uncaught(text.clone()),
        Val::Obj(_) | Val::List(_) => RunError::Uncaught(value.to_json().to_string()),
        other => RunError::Uncaught(other.to_display()),
    }
}
