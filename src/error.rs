//! Crate-wide error type.
//!
//! Every operation exposed by [`crate::engine::MemoryEngine`] returns
//! `Result<T, MemoryError>`. Each variant carries the stable [`ErrorKind`]
//! plus optional correlation identifiers so a transport layer can log and
//! retry without inspecting the message text.

use thiserror::Error;

use crate::scope::ScopeHash;
use crate::schema::MemoryId;

/// Stable, transport-agnostic error classification (`spec.md` §7).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    InvalidInput,
    NotFound,
    Contended,
    EmbedderUnavailable,
    ExtractorUnavailable,
    VectorStoreUnavailable,
    GraphStoreUnavailable,
    LockManagerUnavailable,
    Timeout,
    ConflictUnresolved,
    Internal,
}

impl ErrorKind {
    /// Whether the transport layer may retry with backoff (`spec.md` §7).
    pub fn is_retryable(self) -> bool {
        matches!(
            self,
            ErrorKind::Contended
                | ErrorKind::Timeout
                | ErrorKind::EmbedderUnavailable
                | ErrorKind::ExtractorUnavailable
                | ErrorKind::VectorStoreUnavailable
                | ErrorKind::GraphStoreUnavailable
                | ErrorKind::LockManagerUnavailable
        )
    }
}

#[derive(Debug, Error)]
#[error("{kind:?}: {message}")]
pub struct MemoryError {
    pub kind: ErrorKind,
    pub message: String,
    pub id: Option<MemoryId>,
    pub scope_hash: Option<ScopeHash>,
    #[source]
    pub source: Option<anyhow::Error>,
}

impl MemoryError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            id: None,
            scope_hash: None,
            source: None,
        }
    }

    pub fn with_id(mut self, id: MemoryId) -> Self {
        self.id = Some(id);
        self
    }

    pub fn with_scope(mut self, scope_hash: ScopeHash) -> Self {
        self.scope_hash = Some(scope_hash);
        self
    }

    pub fn with_source(mut self, source: anyhow::Error) -> Self {
        self.source = Some(source);
        self
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn is_retryable(&self) -> bool {
        self.kind.is_retryable()
    }

    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidInput, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::NotFound, message)
    }

    pub fn contended(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Contended, message)
    }

    pub fn conflict_unresolved(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::ConflictUnresolved, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Internal, message)
    }
}

pub type Result<T> = std::result::Result<T, MemoryError>;
