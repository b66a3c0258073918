//! Error taxonomy for the symbol database
//!
//! Every failure the store can report falls into one of four categories:
//! format (corrupt persisted state), reference (unknown ID passed by the
//! caller), duplicate (uniqueness violation) and consistency (broken
//! bookkeeping inside the store). Storage errors from SQLite and JSON
//! are wrapped so callers only ever match on [`StoreError`].

use std::fmt;

use crate::error_codes;

/// The kind of row an error refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityKind {
    File,
    Topic,
    Link,
    Class,
    Context,
}

impl EntityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::File => "file",
            EntityKind::Topic => "topic",
            EntityKind::Link => "link",
            EntityKind::Class => "class",
            EntityKind::Context => "context",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors produced by the symbol database.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Persisted state (NumberSet string, version, context string) cannot be parsed.
    ///
    /// Recoverable by discarding the database and rebuilding it.
    #[error("malformed {what}: {reason}")]
    Format { what: String, reason: String },

    /// The caller passed an ID the store does not know about.
    #[error("unknown {kind} id {id}")]
    Reference { kind: EntityKind, id: u32 },

    /// An insert would violate a uniqueness invariant; the store is unchanged.
    #[error("duplicate {kind}: {key}")]
    Duplicate { kind: EntityKind, key: String },

    /// Reference count or ID allocator invariant violated.
    #[error("consistency violation: {0}")]
    Consistency(String),

    /// A consistency violation happened earlier; the store refuses further writes.
    #[error("store is poisoned by an earlier consistency violation")]
    Poisoned,

    #[error("sqlite: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("json: {0}")]
    Json(#[from] serde_json::Error),

    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}

impl StoreError {
    pub(crate) fn format(what: impl Into<String>, reason: impl Into<String>) -> Self {
        StoreError::Format {
            what: what.into(),
            reason: reason.into(),
        }
    }

    pub(crate) fn reference(kind: EntityKind, id: u32) -> Self {
        StoreError::Reference { kind, id }
    }

    pub(crate) fn duplicate(kind: EntityKind, key: impl Into<String>) -> Self {
        StoreError::Duplicate {
            kind,
            key: key.into(),
        }
    }

    /// Turn an error raised while a mutation was half applied into a
    /// consistency violation. Validation runs before the first write, so
    /// anything failing afterwards means the store's own bookkeeping broke.
    pub(crate) fn escalate(self) -> Self {
        if self.is_fatal() {
            self
        } else {
            StoreError::Consistency(format!("mutation failed after validation: {}", self))
        }
    }

    /// Whether the error must abort the whole update batch and poison the store.
    pub fn is_fatal(&self) -> bool {
        matches!(self, StoreError::Consistency(_) | StoreError::Poisoned)
    }

    /// Whether the error means the persisted database should be rebuilt.
    pub fn is_format(&self) -> bool {
        matches!(self, StoreError::Format { .. })
    }

    /// Stable error code for diagnostics.
    pub fn code(&self) -> &'static str {
        match self {
            StoreError::Format { .. } => error_codes::CDB_FMT_001_MALFORMED_STATE,
            StoreError::Reference { .. } => error_codes::CDB_REF_001_UNKNOWN_ID,
            StoreError::Duplicate { .. } => error_codes::CDB_DUP_001_UNIQUENESS,
            StoreError::Consistency(_) => error_codes::CDB_CON_001_REFCOUNT,
            StoreError::Poisoned => error_codes::CDB_CON_002_POISONED,
            StoreError::Sqlite(_) | StoreError::Io(_) => error_codes::CDB_IO_001_STORAGE,
            StoreError::Json(_) => error_codes::CDB_FMT_002_PAYLOAD,
        }
    }
}

pub type StoreResult<T> = Result<T, StoreError>;
