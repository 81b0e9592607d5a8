use std::fmt;

/// Failure reported by an [`ObjectClient`](crate::ObjectClient).
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// The write was rejected because the object changed since it was read.
    #[error("conflict: {0}")]
    Conflict(String),

    /// A create raced with another creator of the same name.
    #[error("already exists: {0}")]
    AlreadyExists(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("api error: {0}")]
    Api(#[from] kube::Error),

    #[error("transport error: {0}")]
    Transport(String),
}

impl ClientError {
    /// Both variants mean another writer won the race; the cycle can be redone.
    pub fn is_conflict(&self) -> bool {
        matches!(self, ClientError::Conflict(_) | ClientError::AlreadyExists(_))
    }
}

/// Returned by a mutate function when the desired state cannot be satisfied.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{0}")]
pub struct MutateError(String);

impl MutateError {
    pub fn invalid(msg: impl Into<String>) -> Self {
        MutateError(msg.into())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("conflict persisted after {attempts} attempts")]
    Conflict { attempts: u32 },

    #[error(
        "object is already controlled by {owner_kind}/{owner_name} (uid {owner_uid})"
    )]
    AdoptionConflict {
        owner_kind: String,
        owner_name: String,
        owner_uid: String,
    },

    #[error("network error: {0}")]
    Network(#[source] ClientError),

    #[error("sync cancelled")]
    Cancelled,
}

impl SyncError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            SyncError::Validation(_) => ErrorKind::Validation,
            SyncError::Conflict { .. } => ErrorKind::Conflict,
            SyncError::AdoptionConflict { .. } => ErrorKind::AdoptionConflict,
            SyncError::Network(_) => ErrorKind::Network,
            SyncError::Cancelled => ErrorKind::Cancelled,
        }
    }
}

impl From<MutateError> for SyncError {
    fn from(e: MutateError) -> Self {
        SyncError::Validation(e.to_string())
    }
}

/// Coarse classification of a [`SyncError`], suitable for status and metrics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Validation,
    Conflict,
    AdoptionConflict,
    Network,
    Cancelled,
}

impl ErrorKind {
    /// Whether a prompt requeue has a reasonable chance of succeeding.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ErrorKind::Conflict | ErrorKind::Network | ErrorKind::Cancelled
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Validation => "ValidationError",
            ErrorKind::Conflict => "ConflictError",
            ErrorKind::AdoptionConflict => "AdoptionConflict",
            ErrorKind::Network => "NetworkError",
            ErrorKind::Cancelled => "Cancelled",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conflict_like_client_errors() {
        assert!(ClientError::Conflict("rv".into()).is_conflict());
        assert!(ClientError::AlreadyExists("web".into()).is_conflict());
        assert!(!ClientError::Transport("reset".into()).is_conflict());
        assert!(!ClientError::NotFound("web".into()).is_conflict());
    }

    #[test]
    fn kinds_and_transience() {
        let err = SyncError::Network(ClientError::Transport("eof".into()));
        assert_eq!(err.kind(), ErrorKind::Network);
        assert!(err.kind().is_transient());
        assert!(ErrorKind::Conflict.is_transient());
        assert!(ErrorKind::Cancelled.is_transient());
        assert!(!ErrorKind::Validation.is_transient());
        assert!(!ErrorKind::AdoptionConflict.is_transient());
        assert_eq!(ErrorKind::AdoptionConflict.to_string(), "AdoptionConflict");
    }

    #[test]
    fn mutate_error_becomes_validation() {
        let err: SyncError = MutateError::invalid("no containers").into();
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert_eq!(err.to_string(), "validation failed: no containers");
    }
}
