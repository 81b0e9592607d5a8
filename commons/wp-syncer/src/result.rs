use std::fmt;

use crate::error::{ErrorKind, SyncError};
use crate::object::ObjectKey;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Created,
    Updated,
    Unchanged,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operation::Created => write!(f, "created"),
            Operation::Updated => write!(f, "updated"),
            Operation::Unchanged => write!(f, "unchanged"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    Normal,
    Warning,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Normal => "Normal",
            EventKind::Warning => "Warning",
        }
    }
}

/// Event payload describing one sync outcome, meant to be recorded on the
/// owner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncEvent {
    pub kind: EventKind,
    pub reason: String,
    pub message: String,
}

/// Outcome of one [`SyncEngine::sync`](crate::SyncEngine::sync) call.
#[derive(Debug)]
pub struct SyncResult {
    pub kind: String,
    pub key: ObjectKey,
    pub operation: Operation,
    /// Number of fetch-mutate-persist cycles that ran.
    pub attempts: u32,
    pub error: Option<SyncError>,
}

impl SyncResult {
    pub fn ok(kind: String, key: ObjectKey, operation: Operation, attempts: u32) -> Self {
        Self {
            kind,
            key,
            operation,
            attempts,
            error: None,
        }
    }

    pub fn failed(kind: String, key: ObjectKey, error: SyncError, attempts: u32) -> Self {
        Self {
            kind,
            key,
            operation: Operation::Unchanged,
            attempts,
            error: Some(error),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }

    pub fn error_kind(&self) -> Option<ErrorKind> {
        self.error.as_ref().map(SyncError::kind)
    }

    /// Failures and actual writes are worth an event; quiet no-ops are not.
    pub fn should_report(&self) -> bool {
        self.error.is_some() || self.operation != Operation::Unchanged
    }

    pub fn event(&self) -> SyncEvent {
        match &self.error {
            Some(err) => SyncEvent {
                kind: EventKind::Warning,
                reason: format!("{}SyncFailed", self.kind),
                message: format!("{} {} failed syncing: {}", self.kind, self.key, err),
            },
            None => SyncEvent {
                kind: EventKind::Normal,
                reason: format!("{}SyncSuccessful", self.kind),
                message: format!(
                    "{} {} {} successfully",
                    self.kind, self.key, self.operation
                ),
            },
        }
    }

    pub fn into_result(self) -> Result<Operation, SyncError> {
        match self.error {
            Some(e) => Err(e),
            None => Ok(self.operation),
        }
    }
}

/// Results of every managed kind for one parent reconciliation.
#[derive(Debug, Default)]
pub struct SyncSummary {
    results: Vec<SyncResult>,
}

impl SyncSummary {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, result: SyncResult) {
        self.results.push(result);
    }

    pub fn results(&self) -> &[SyncResult] {
        &self.results
    }

    pub fn count(&self, op: Operation) -> usize {
        self.results
            .iter()
            .filter(|r| r.is_ok() && r.operation == op)
            .count()
    }

    pub fn errors(&self) -> impl Iterator<Item = &SyncResult> {
        self.results.iter().filter(|r| !r.is_ok())
    }

    pub fn is_failed(&self) -> bool {
        self.errors().next().is_some()
    }

    /// The most recent failure, which is what the parent's status reports.
    pub fn last_error(&self) -> Option<&SyncResult> {
        self.results.iter().rev().find(|r| !r.is_ok())
    }

    /// Whether every failure is worth a prompt requeue.
    pub fn is_transient(&self) -> bool {
        self.errors()
            .filter_map(SyncResult::error_kind)
            .all(|k| k.is_transient())
    }

    pub fn message(&self) -> String {
        match self.last_error() {
            Some(r) => r.event().message,
            None => format!(
                "synced {} objects: {} created, {} updated, {} unchanged",
                self.results.len(),
                self.count(Operation::Created),
                self.count(Operation::Updated),
                self.count(Operation::Unchanged)
            ),
        }
    }
}

impl FromIterator<SyncResult> for SyncSummary {
    fn from_iter<T: IntoIterator<Item = SyncResult>>(iter: T) -> Self {
        Self {
            results: iter.into_iter().collect(),
        }
    }
}
