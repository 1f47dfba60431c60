use std::fmt;

/// Protocol-visible failure classes. The HTTP layer maps each to a status code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Unauthorized,
    NotFound,
    Gone,
    Conflict,
    Internal,
    Io,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorKind::Unauthorized => "unauthorized",
            ErrorKind::NotFound => "not_found",
            ErrorKind::Gone => "gone",
            ErrorKind::Conflict => "conflict",
            ErrorKind::Internal => "internal",
            ErrorKind::Io => "io",
        };
        f.write_str(s)
    }
}

/// Every failure a lifecycle operation can return.
///
/// Messages are safe to show to the platform: they name public ids and the
/// failing step, never provisioner-internal ids or secrets.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BrokerError {
    /// Missing or unusable basic-auth credentials.
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// The referenced instance is unknown.
    #[error("service instance '{instance_id}' not found")]
    NotFound { instance_id: String },

    /// The instance was already removed.
    #[error("service instance '{instance_id}' does not exist")]
    Gone { instance_id: String },

    /// Duplicate id, or the provisioner reported a collision.
    #[error("conflict: {0}")]
    Conflict(String),

    /// A collaborator (provisioner, issuer, snapshot store) failed at `step`.
    #[error("{step} failed: {message}")]
    Internal { step: &'static str, message: String },

    /// The catalog document could not be read.
    #[error("catalog unavailable: {0}")]
    Io(String),
}

impl BrokerError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            BrokerError::Unauthorized(_) => ErrorKind::Unauthorized,
            BrokerError::NotFound { .. } => ErrorKind::NotFound,
            BrokerError::Gone { .. } => ErrorKind::Gone,
            BrokerError::Conflict(_) => ErrorKind::Conflict,
            BrokerError::Internal { .. } => ErrorKind::Internal,
            BrokerError::Io(_) => ErrorKind::Io,
        }
    }

    pub(crate) fn internal(step: &'static str, message: impl fmt::Display) -> Self {
        BrokerError::Internal {
            step,
            message: message.to_string(),
        }
    }
}
