use std::fmt;

use thiserror::Error;

use crate::entities::AccountId;

/// Detailed login rejection reported by the remote service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthRejection {
    InvalidCredentials,
    InvalidGuardCode,
    RateLimited,
    AccountLocked,
    Unknown(String),
}

impl fmt::Display for AuthRejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidCredentials => write!(f, "invalid account name or password"),
            Self::InvalidGuardCode => write!(f, "invalid guard code"),
            Self::RateLimited => write!(f, "too many login attempts"),
            Self::AccountLocked => write!(f, "account is locked"),
            Self::Unknown(msg) => write!(f, "{}", msg),
        }
    }
}

/// Problems with a stored secret, detected before any use.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SecretError {
    #[error("not valid base64: {0}")]
    Malformed(String),

    #[error("decodes to {actual} bytes, expected {expected}")]
    WrongLength { expected: usize, actual: usize },
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("account '{0}' not found")]
    AccountNotFound(AccountId),

    #[error("account record invalid: {}", .0.join("; "))]
    AccountInvalid(Vec<String>),

    #[error("invalid secret: {0}")]
    InvalidSecret(#[from] SecretError),

    #[error("account '{0}' has no authenticator secrets")]
    SecretsMissing(AccountId),

    #[error("clock sync failed: {0}")]
    ClockSync(String),

    #[error("login rejected: {0}")]
    AuthRejected(AuthRejection),

    /// The remote service refused the current session tokens. Internal signal;
    /// the engine converts it into `SessionExpired` after one refresh attempt.
    #[error("session tokens were not accepted")]
    Unauthorized,

    #[error("session expired")]
    SessionExpired,

    #[error("account '{0}' is not logged in")]
    NotAuthenticated(AccountId),

    #[error("rate limited by the remote service")]
    RateLimited,

    #[error("confirmation could not be acted on")]
    ConfirmationRejected,

    #[error("remote service unavailable: {0}")]
    RemoteUnavailable(String),

    #[error("unexpected response from server: {0}")]
    Protocol(String),

    #[error("account storage error: {0}")]
    Storage(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

impl From<String> for Error {
    fn from(s: String) -> Self {
        Error::Other(s)
    }
}

impl From<&str> for Error {
    fn from(s: &str) -> Self {
        Error::Other(s.to_string())
    }
}
