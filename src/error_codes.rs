//! Codedb error codes
//!
//! Error codes follow the pattern: CDB-{CATEGORY}-{3-digit number}
//!
//! Categories (2-3 uppercase letters):
//! - FMT: Persisted state cannot be parsed (rebuild the database)
//! - REF: Caller referenced an unknown file, topic, link, class or context
//! - DUP: Uniqueness invariant violated on insert
//! - CON: Reference count or ID allocator invariant violated
//! - IO: Storage backend failures
//!
//! Each error code is stable and should not be reused.

/// Malformed NumberSet, version or context string
pub const CDB_FMT_001_MALFORMED_STATE: &str = "CDB-FMT-001";

/// Malformed JSON payload column
pub const CDB_FMT_002_PAYLOAD: &str = "CDB-FMT-002";

/// Unknown ID passed to the store
pub const CDB_REF_001_UNKNOWN_ID: &str = "CDB-REF-001";

/// Uniqueness violation
pub const CDB_DUP_001_UNIQUENESS: &str = "CDB-DUP-001";

/// Reference count underflow or dangling ID
pub const CDB_CON_001_REFCOUNT: &str = "CDB-CON-001";

/// Store refused a write after an earlier consistency violation
pub const CDB_CON_002_POISONED: &str = "CDB-CON-002";

/// SQLite or filesystem failure
pub const CDB_IO_001_STORAGE: &str = "CDB-IO-001";

/// Error code documentation
///
/// | Code | Description | Remediation |
/// |------|-------------|-------------|
/// | CDB-FMT-001 | Malformed persisted state | Delete the database; it is rebuilt on next open |
/// | CDB-FMT-002 | Malformed JSON column | Delete the database; it is rebuilt on next open |
/// | CDB-REF-001 | Unknown ID | Caller bug: register the file or check the ID before use |
/// | CDB-DUP-001 | Uniqueness violation | Caller bug: deduplicate the batch |
/// | CDB-CON-001 | Reference count underflow | Internal bug; the batch was aborted |
/// | CDB-CON-002 | Store poisoned | Reopen the project; the last saved database is intact |
/// | CDB-IO-001 | Storage failure | Check permissions and disk space |
pub const ERROR_CODE_DOCUMENTATION: &str = "Error code documentation available in source";
