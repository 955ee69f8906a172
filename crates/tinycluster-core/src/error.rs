//! Error taxonomy
//!
//! Every layer below the transport adapters reports failures as [`Error`].
//! Callers branch on [`Error::kind`] (or the numeric [`Error::code`]) rather
//! than on the payload; `Other` keeps the underlying cause reachable through
//! [`std::error::Error::source`].

use strum::{Display, IntoStaticStr};
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("the item does not exist")]
    NotFound,

    #[error("the item has already existed")]
    AlreadyExists,

    #[error("the operation timed out")]
    TimedOut,

    /// Reserved for an authentication layer in front of the store.
    #[error("authentication failed")]
    AuthFailed,

    /// Reserved for an authorization layer in front of the store.
    #[error("permission denied")]
    PermissionDenied,

    #[error("context canceled")]
    ContextCanceled,

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("{context}: {source}")]
    Other {
        context: String,
        #[source]
        source: BoxError,
    },
}

/// Payload-free discriminant of [`Error`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, IntoStaticStr)]
#[strum(serialize_all = "snake_case")]
pub enum ErrorKind {
    Other,
    NotFound,
    TimedOut,
    AlreadyExists,
    AuthFailed,
    PermissionDenied,
    ContextCanceled,
    InvalidArgument,
}

impl ErrorKind {
    /// Stable numeric code for transport adapters.
    pub fn code(self) -> u32 {
        match self {
            ErrorKind::Other => 0,
            ErrorKind::NotFound => 1,
            ErrorKind::TimedOut => 2,
            ErrorKind::AlreadyExists => 3,
            ErrorKind::AuthFailed => 4,
            ErrorKind::PermissionDenied => 5,
            ErrorKind::ContextCanceled => 6,
            ErrorKind::InvalidArgument => 7,
        }
    }
}

impl Error {
    /// Wrap an underlying failure, keeping it as the source.
    pub fn other(context: impl Into<String>, source: impl Into<BoxError>) -> Self {
        Error::Other {
            context: context.into(),
            source: source.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::NotFound => ErrorKind::NotFound,
            Error::AlreadyExists => ErrorKind::AlreadyExists,
            Error::TimedOut => ErrorKind::TimedOut,
            Error::AuthFailed => ErrorKind::AuthFailed,
            Error::PermissionDenied => ErrorKind::PermissionDenied,
            Error::ContextCanceled => ErrorKind::ContextCanceled,
            Error::InvalidArgument(_) => ErrorKind::InvalidArgument,
            Error::Other { .. } => ErrorKind::Other,
        }
    }

    pub fn code(&self) -> u32 {
        self.kind().code()
    }
}
