//! Error types for the script-thread engine

use core::fmt;

use crate::id::ThreadId;
use crate::status::ThreadStatus;

/// Result type for engine operations
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors that can occur in engine operations
///
/// Script-level failures are not errors at this boundary; they travel as
/// thread outcomes and are recovered at a joining parent. Everything
/// here is fatal to the operation that raised it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CoreError {
    /// Internal-consistency defect: an operation was attempted against
    /// the engine's own contracts. Always fatal, always logged.
    ContractViolation(&'static str),

    /// Resume was called on a thread whose status forbids it
    InvalidStatus { thread: ThreadId, status: ThreadStatus },

    /// No thread slots available for this connection
    NoThreadsAvailable,

    /// Too many pending waits for this connection
    TooManyWaits,

    /// The host refused a callback registration
    HostError(i32),
}

impl fmt::Display for CoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CoreError::ContractViolation(what) => {
                write!(f, "contract violation: {}", what)
            }
            CoreError::InvalidStatus { thread, status } => {
                write!(f, "thread {} not resumable (status: {})", thread, status)
            }
            CoreError::NoThreadsAvailable => write!(f, "no thread slots available"),
            CoreError::TooManyWaits => write!(f, "too many pending waits"),
            CoreError::HostError(code) => write!(f, "host error: {}", code),
        }
    }
}

impl std::error::Error for CoreError {}
