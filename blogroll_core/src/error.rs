use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Failure categories exposed at the crate boundary. The transport layer maps
/// these to its own responses (redirect to login, forbidden, not found, ...).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    NotFound,
    ValidationFailed,
    PermissionDenied,
    AuthenticationRequired,
    AlreadyExists,
    SelfReferenceRejected,
    Infrastructure,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::NotFound => "not found",
            ErrorKind::ValidationFailed => "validation failed",
            ErrorKind::PermissionDenied => "permission denied",
            ErrorKind::AuthenticationRequired => "authentication required",
            ErrorKind::AlreadyExists => "already exists",
            ErrorKind::SelfReferenceRejected => "self reference rejected",
            ErrorKind::Infrastructure => "infrastructure failure",
        };
        f.write_str(name)
    }
}

/// Service errors converted for the boundary layer.
#[derive(Debug, Error)]
#[error("{kind}: {source}")]
pub struct ResourceError {
    kind: ErrorKind,
    #[source]
    source: Box<dyn std::error::Error + Send + Sync>,
}

impl ResourceError {
    pub fn new<E>(kind: ErrorKind, error: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self {
            kind,
            source: Box::new(error),
        }
    }

    pub fn infra<E>(error: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::new(ErrorKind::Infrastructure, error)
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// Whether the caller can fix the request and try again.
    pub fn is_recoverable(&self) -> bool {
        self.kind == ErrorKind::ValidationFailed
    }
}
