//! Result-code policy applied to every native call.
//!
//! [`ErrorTranslator::check`] is the single place where a raw code becomes
//! either data ([`Status`]) or a typed failure ([`Error::Driver`]).

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use crate::codes::{self, CodeKind};
use crate::driver::Driver;
use crate::error::{Error, Result};

/// Size of the buffer handed to the driver's error-text entry points.
pub const ERROR_TEXT_LEN: usize = 1024;

/// Endpoint role. Each role has its own error-text entry point in the driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    Client,
    Server,
    Partner,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::Client => "client",
            Role::Server => "server",
            Role::Partner => "partner",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "client" => Ok(Role::Client),
            "server" => Ok(Role::Server),
            "partner" => Ok(Role::Partner),
            other => Err(Error::InvalidRole(other.to_string())),
        }
    }
}

/// Classified result of a native call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Success,
    /// Accepted and still in progress. Not an error.
    SoftStatus,
    HardError { code: i32, message: String },
}

impl Outcome {
    pub fn is_hard_error(&self) -> bool {
        matches!(self, Outcome::HardError { .. })
    }
}

/// Non-failing result of a checked native call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Success,
    SoftStatus,
}

impl Status {
    /// The raw code this status was classified from.
    pub fn code(self) -> i32 {
        match self {
            Status::Success => codes::OK,
            Status::SoftStatus => codes::SOFT_STATUS,
        }
    }

    pub fn is_in_progress(self) -> bool {
        self == Status::SoftStatus
    }
}

/// Applies the code policy for one role against one driver.
#[derive(Clone)]
pub struct ErrorTranslator {
    driver: Arc<dyn Driver>,
    role: Role,
}

impl fmt::Debug for ErrorTranslator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ErrorTranslator")
            .field("role", &self.role)
            .finish_non_exhaustive()
    }
}

impl ErrorTranslator {
    pub fn new(driver: Arc<dyn Driver>, role: Role) -> Self {
        Self { driver, role }
    }

    /// Build a translator from a context name (`"client"`, `"server"` or
    /// `"partner"`).
    pub fn for_context(driver: Arc<dyn Driver>, context: &str) -> Result<Self> {
        Ok(Self::new(driver, context.parse()?))
    }

    pub fn role(&self) -> Role {
        self.role
    }

    /// Textual explanation of `code` as reported by the driver.
    pub fn error_text(&self, code: i32) -> String {
        tracing::debug!("error text for {code:#x}");
        let mut text = [0u8; ERROR_TEXT_LEN];
        self.driver.error_text(self.role, code, &mut text);
        decode_text(&text)
    }

    pub fn classify(&self, code: i32) -> Outcome {
        match codes::kind(code) {
            CodeKind::Success => Outcome::Success,
            CodeKind::SoftStatus => Outcome::SoftStatus,
            CodeKind::HardError => Outcome::HardError {
                code,
                message: self.error_text(code),
            },
        }
    }

    /// Pass success and soft status through, turn hard errors into
    /// [`Error::Driver`].
    pub fn check(&self, code: i32) -> Result<Status> {
        match self.classify(code) {
            Outcome::Success => Ok(Status::Success),
            Outcome::SoftStatus => Ok(Status::SoftStatus),
            Outcome::HardError { code, message } => Err(self.failure(code, message)),
        }
    }

    /// Build the failure for a hard error code, including codes produced
    /// locally rather than returned by a native call.
    pub(crate) fn hard_error(&self, code: i32) -> Error {
        self.failure(code, self.error_text(code))
    }

    fn failure(&self, code: i32, message: String) -> Error {
        tracing::error!("{message}");
        Error::Driver {
            code,
            role: self.role,
            message,
        }
    }
}

/// Decode a NUL-terminated driver buffer.
pub(crate) fn decode_text(buf: &[u8]) -> String {
    let end = buf.iter().position(|&b| b == 0).unwrap_or(buf.len());
    String::from_utf8_lossy(&buf[..end]).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::mock::MockDriver;

    fn translator(role: Role) -> ErrorTranslator {
        ErrorTranslator::new(Arc::new(MockDriver::new()), role)
    }

    #[test]
    fn test_role_parse() {
        assert_eq!("client".parse::<Role>().unwrap(), Role::Client);
        assert_eq!("server".parse::<Role>().unwrap(), Role::Server);
        assert_eq!("partner".parse::<Role>().unwrap(), Role::Partner);
        assert!(matches!(
            "plc".parse::<Role>(),
            Err(Error::InvalidRole(ref s)) if s == "plc"
        ));
    }

    #[test]
    fn test_for_context_rejects_unknown_role() {
        let driver: Arc<dyn Driver> = Arc::new(MockDriver::new());
        assert!(ErrorTranslator::for_context(driver.clone(), "partner").is_ok());
        assert!(matches!(
            ErrorTranslator::for_context(driver, "Partner"),
            Err(Error::InvalidRole(_))
        ));
    }

    #[test]
    fn test_classify_tri_state() {
        let t = translator(Role::Partner);
        assert_eq!(t.classify(0), Outcome::Success);
        assert_eq!(t.classify(1), Outcome::SoftStatus);
        match t.classify(codes::ERR_ISO_CONNECT) {
            Outcome::HardError { code, message } => {
                assert_eq!(code, 0x0001_0000);
                assert!(!message.is_empty());
            }
            other => panic!("expected hard error, got {other:?}"),
        }
    }

    #[test]
    fn test_check_preserves_soft_status() {
        let t = translator(Role::Partner);
        assert_eq!(t.check(0).unwrap(), Status::Success);
        let status = t.check(1).unwrap();
        assert_eq!(status, Status::SoftStatus);
        assert_eq!(status.code(), 1);
        assert!(status.is_in_progress());
    }

    #[test]
    fn test_check_raises_hard_error_with_role() {
        let t = translator(Role::Client);
        let err = t.check(codes::ERR_TCP_CONNECTION_TIMEOUT).unwrap_err();
        match err {
            Error::Driver { code, role, message } => {
                assert_eq!(code, codes::ERR_TCP_CONNECTION_TIMEOUT);
                assert_eq!(role, Role::Client);
                assert!(message.contains("Timeout"));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_roles_use_their_own_text() {
        let partner = translator(Role::Partner).error_text(0x0020_0000);
        let client = translator(Role::Client).error_text(0x0020_0000);
        let server = translator(Role::Server).error_text(0x0020_0000);
        assert_ne!(partner, client);
        assert_ne!(client, server);
    }

    #[test]
    fn test_decode_text_stops_at_nul() {
        assert_eq!(decode_text(b"ISO : Connection error\0garbage"), "ISO : Connection error");
        assert_eq!(decode_text(b"no terminator"), "no terminator");
        assert_eq!(decode_text(&[0u8; 8]), "");
    }
}
