//! Codedb: symbol database and link resolution for documentation generators
//!
//! Parsers feed codedb the documented symbols (topics) and the references
//! to them (links) found in each source file. Codedb stores them, keeps the
//! shared class and context rows reference-counted, and resolves every link
//! to the best matching topic. Re-scanning a file only re-resolves the links
//! its changes could affect.
//!
//! # Conventions
//!
//! - **IDs**: positive `u32`; 0 never names a row and stands for "none" in
//!   the database
//! - **Symbols**: components joined with `.`; `::` and `->` are normalized
//!   on input
//! - **Ending symbols**: last symbol component, lowercased for
//!   case-insensitive languages
//!
//! # Layers
//!
//! - [`store::SymbolStore`]: the tables and their indexes, single-threaded
//! - [`resolver::LinkResolver`]: scoring and incremental resolve passes
//! - [`shared::SharedStore`]: many readers, one writer
//! - [`persist::Database`]: SQLite snapshot with rebuild on corruption
//! - [`pipeline`] and [`project::Project`]: batch merging for hosts

pub mod config;
pub mod error;
pub mod error_codes;
pub mod ids;
pub mod intern;
pub mod persist;
pub mod pipeline;
pub mod project;
pub mod resolver;
pub mod schema;
pub mod shared;
pub mod store;
pub mod symbols;
pub mod verify;

pub use config::{LanguageRules, StoreConfig};
pub use error::{EntityKind, StoreError, StoreResult};
pub use ids::{ClassId, ContextId, FileId, LanguageId, LinkId, NumberSet, TopicId};
pub use intern::Interner;
pub use persist::{Database, LoadOutcome, CODEDB_SCHEMA_VERSION};
pub use pipeline::{merge_batches, prepare_batches, FileBatch, FileMerge, MergeReport};
pub use project::Project;
pub use resolver::{LinkResolver, ResolveReport};
pub use schema::{
    AccessLevel, ClassInfo, ClassInput, CommentType, ContextInfo, Hierarchy, Link, LinkInput,
    LinkType, Topic, TopicInput,
};
pub use shared::{CancelFlag, SharedStore};
pub use store::{
    ChangeTracker, FileRemoval, LinkChanges, Rejected, StoreStats, SymbolStore, TopicChanges,
};
pub use symbols::{Context, UsingStatement};
pub use verify::{verify_store, VerifyReport};
