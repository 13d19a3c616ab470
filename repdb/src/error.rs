use serde_derive::{Deserialize, Serialize};

/// A crate-wide result type, returning [`Error`].
pub type CResult<T> = std::result::Result<T, Error>;

/// Simulator errors.
///
/// Lock refusals and transient site unavailability are not errors; they are
/// reported through boolean returns and requeued operations. Errors are
/// reserved for the two terminal cases: bad input, and a broken internal
/// invariant. Both end the run with a nonzero exit in the driver.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Error {
    /// A malformed command, or a command referencing a transaction the
    /// manager does not know (or knows already).
    InvalidCommand(String),

    /// An internal invariant no longer holds, e.g. a read without a granted
    /// lock or a commit that still has queued lock requests.
    Internal(String),
}

impl Error {
    pub fn invalid_command(message: impl Into<String>) -> Error {
        Error::InvalidCommand(message.into())
    }

    pub fn internal(message: impl Into<String>) -> Error {
        Error::Internal(message.into())
    }
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::InvalidCommand(message) => write!(f, "invalid command: {}", message),
            Error::Internal(message) => write!(f, "internal state inconsistent: {}", message),
        }
    }
}

impl std::error::Error for Error {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display() {
        assert_eq!(
            Error::invalid_command("no such transaction T9").to_string(),
            "invalid command: no such transaction T9"
        );
        assert_eq!(
            Error::internal("lock table out of sync").to_string(),
            "internal state inconsistent: lock table out of sync"
        );
    }
}
