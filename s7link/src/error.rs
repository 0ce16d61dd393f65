//! Error type shared by the driver loader, the translator and the partner.

use std::fmt;
use std::path::PathBuf;

use crate::params::Parameter;
use crate::translator::Role;

/// Which half of a partner's transfer machinery an error refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Send,
    Recv,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Send => f.write_str("send"),
            Direction::Recv => f.write_str("receive"),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// No candidate location held a loadable snap7 library.
    #[error("can't find snap7 library (tried: {}); if installed, try running ldconfig", join_paths(.tried))]
    DriverNotFound { tried: Vec<PathBuf> },

    #[error("failed to load snap7 library {}: {source}", .path.display())]
    DriverLoad {
        path: PathBuf,
        #[source]
        source: libloading::Error,
    },

    #[error("snap7 library does not export {name}")]
    MissingSymbol { name: &'static str },

    #[error("unknown context {0:?}, should be either client, server or partner")]
    InvalidRole(String),

    #[error("driver returned a null partner object")]
    AllocationFailed,

    /// A native call returned a hard error code.
    #[error("{role} error 0x{code:08x}: {message}")]
    Driver {
        code: i32,
        role: Role,
        message: String,
    },

    #[error("operation did not complete within {timeout_ms} ms")]
    Timeout { timeout_ms: u32 },

    #[error("no asynchronous {0} in flight")]
    NoPendingOperation(Direction),

    #[error("an asynchronous {0} is already in flight")]
    OperationPending(Direction),

    #[error("parameter {param:?}: {reason}")]
    InvalidParameter {
        param: Parameter,
        reason: &'static str,
    },

    #[error("partner endpoint has been destroyed")]
    EndpointDestroyed,

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl Error {
    /// The native result code, for errors that came out of the driver.
    pub fn code(&self) -> Option<i32> {
        match self {
            Error::Driver { code, .. } => Some(*code),
            _ => None,
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, Error::Timeout { .. })
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

fn join_paths(paths: &[PathBuf]) -> String {
    if paths.is_empty() {
        return "nothing".to_string();
    }
    paths
        .iter()
        .map(|p| p.display().to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_driver_error_display() {
        let err = Error::Driver {
            code: 0x0050_0000,
            role: Role::Partner,
            message: "Partner not linked".to_string(),
        };
        assert_eq!(err.to_string(), "partner error 0x00500000: Partner not linked");
        assert_eq!(err.code(), Some(0x0050_0000));
    }

    #[test]
    fn test_not_found_lists_candidates() {
        let err = Error::DriverNotFound {
            tried: vec![PathBuf::from("/opt/lib/libsnap7.so"), PathBuf::from("libsnap7.so")],
        };
        let text = err.to_string();
        assert!(text.contains("/opt/lib/libsnap7.so, libsnap7.so"));
        assert_eq!(err.code(), None);
    }

    #[test]
    fn test_pending_direction_display() {
        assert_eq!(
            Error::NoPendingOperation(Direction::Send).to_string(),
            "no asynchronous send in flight"
        );
        assert!(Error::Timeout { timeout_ms: 10 }.is_timeout());
    }
}
