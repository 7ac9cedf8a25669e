//! Builder errors and their mapping onto [`BackendError`].

use std::fmt;

use kiln_backend_core::BackendError;

/// Errors raised while building a SPIR-V module.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A function-body instruction was emitted with no function open.
    #[error("no function is being built")]
    NotInFunction,
    /// `break` or `continue` with no enclosing construct to target.
    #[error("`break` or `continue` outside of a loop or switch")]
    NotInLoopOrSwitch,
    /// The IR uses something this backend cannot express.
    #[error("unsupported operation: {0}")]
    UnsupportedOperation(String),
    /// A builder invariant was broken, such as a block left open.
    #[error("internal consistency: {0}")]
    InternalConsistency(String),
    /// The IR itself is malformed.
    #[error(transparent)]
    Ir(#[from] kiln_ir::IrError),
    /// One or more functions failed; no words were produced.
    #[error("{} function(s) failed to lower", .0.len())]
    Aborted(Vec<FunctionError>),
}

impl Error {
    pub(crate) fn unsupported(what: impl Into<String>) -> Self {
        Self::UnsupportedOperation(what.into())
    }

    pub(crate) fn internal(what: impl Into<String>) -> Self {
        Self::InternalConsistency(what.into())
    }
}

/// A failure confined to one function.
#[derive(Debug)]
pub struct FunctionError {
    /// Name of the function or entry point.
    pub function: String,
    /// What went wrong in it.
    pub error: Error,
}

impl fmt::Display for FunctionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "in function `{}`: {}", self.function, self.error)
    }
}

impl From<Error> for BackendError {
    fn from(e: Error) -> Self {
        match e {
            Error::UnsupportedOperation(what) => BackendError::Unsupported(what),
            Error::Aborted(errors) => {
                let all_unsupported = errors
                    .iter()
                    .all(|fe| matches!(fe.error, Error::UnsupportedOperation(_)));
                let joined = errors
                    .iter()
                    .map(ToString::to_string)
                    .collect::<Vec<_>>()
                    .join("; ");
                if all_unsupported {
                    BackendError::Unsupported(joined)
                } else {
                    BackendError::Other(joined)
                }
            }
            other => BackendError::Other(other.to_string()),
        }
    }
}
