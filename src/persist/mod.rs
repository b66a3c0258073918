//! SQLite persistence for the symbol database
//!
//! The database is a snapshot: [`Database::save`] writes every table of a
//! [`SymbolStore`] in one transaction and [`Database::load`] rebuilds the
//! store from it, re-deriving all in-memory indexes. Anything that does not
//! parse or does not add up is a `Format` error, and
//! [`Database::open_or_rebuild`] answers those by starting from an empty
//! database.

pub mod schema;

use rusqlite::{params, Connection, ErrorCode, OptionalExtension};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::config::StoreConfig;
use crate::error::{StoreError, StoreResult};
use crate::ids::{LinkId, NumberSet};
use crate::schema::{ClassKey, Hierarchy, Link, LinkType, Topic};
use crate::store::{StoreParts, SymbolStore};

pub use schema::CODEDB_SCHEMA_VERSION;

const MEMORY_PATH: &str = ":memory:";

/// How [`Database::open_or_rebuild`] got its store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum LoadOutcome {
    /// Existing database loaded and verified
    Loaded,
    /// No database existed; an empty one was created
    Created,
    /// The existing database was unusable and has been replaced by an empty one
    Rebuilt { reason: String },
}

impl LoadOutcome {
    /// Whether the store starts empty, so every link needs resolving once
    /// files are merged again.
    pub fn is_fresh(&self) -> bool {
        !matches!(self, LoadOutcome::Loaded)
    }
}

/// An open SQLite database.
pub struct Database {
    conn: Connection,
    path: PathBuf,
    created: bool,
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database")
            .field("path", &self.path)
            .field("created", &self.created)
            .finish()
    }
}

impl Database {
    /// Open the database at `path`, creating the schema if the file is new.
    ///
    /// `":memory:"` opens a private in-memory database.
    pub fn open(path: &Path) -> StoreResult<Self> {
        let conn = if path == Path::new(MEMORY_PATH) {
            Connection::open_in_memory()?
        } else {
            Connection::open(path)?
        };
        let mut db = Self {
            conn,
            path: path.to_path_buf(),
            created: false,
        };
        if !db.has_schema().map_err(corruption_to_format)? {
            db.reset()?;
            db.created = true;
        }
        Ok(db)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether `open` had to create the schema.
    pub fn was_created(&self) -> bool {
        self.created
    }

    fn is_memory(&self) -> bool {
        self.path == Path::new(MEMORY_PATH)
    }

    fn has_schema(&self) -> StoreResult<bool> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = 'System'",
            [],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    /// Drop every table and create an empty schema.
    pub fn reset(&self) -> StoreResult<()> {
        let tx = self.conn.unchecked_transaction()?;
        for table in schema::TABLES.iter().rev() {
            tx.execute(&format!("DROP TABLE IF EXISTS {}", table), [])?;
        }
        for statement in schema::CREATE_STATEMENTS {
            tx.execute(statement, [])?;
        }
        let empty = NumberSet::new().to_string();
        tx.execute(
            "INSERT INTO System (Version, UsedTopicIDs, UsedLinkIDs, UsedClassIDs, UsedContextIDs,
                PendingLinkIDs)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![CODEDB_SCHEMA_VERSION, empty, empty, empty, empty, empty],
        )?;
        tx.commit()?;
        debug!(path = %self.path.display(), "created empty schema");
        Ok(())
    }

    /// Load the saved store.
    ///
    /// # Errors
    /// `Format` for a wrong schema version, unparseable columns or rows
    /// that fail verification.
    pub fn load(&self, config: StoreConfig) -> StoreResult<SymbolStore> {
        let parts = self.read_parts().map_err(corruption_to_format)?;
        let store = SymbolStore::from_parts(config, parts)?;
        debug!(
            path = %self.path.display(),
            topics = store.topic_count(),
            links = store.link_count(),
            "loaded symbol database"
        );
        Ok(store)
    }

    fn read_parts(&self) -> StoreResult<StoreParts> {
        let version: Option<i64> = self
            .conn
            .query_row("SELECT Version FROM System", [], |row| row.get(0))
            .optional()?;
        match version {
            None => return Err(StoreError::format("System table", "missing row")),
            Some(CODEDB_SCHEMA_VERSION) => {}
            Some(other) => {
                return Err(StoreError::format(
                    "schema version",
                    format!("found {}, expected {}", other, CODEDB_SCHEMA_VERSION),
                ))
            }
        }

        let (topic_ids, link_ids, class_ids, context_ids, pending_ids): (
            String,
            String,
            String,
            String,
            String,
        ) = self.conn.query_row(
            "SELECT UsedTopicIDs, UsedLinkIDs, UsedClassIDs, UsedContextIDs, PendingLinkIDs
             FROM System",
            [],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?, row.get(4)?)),
        )?;

        let mut parts = StoreParts {
            used_topic_ids: topic_ids.parse()?,
            used_link_ids: link_ids.parse()?,
            used_class_ids: class_ids.parse()?,
            used_context_ids: context_ids.parse()?,
            pending_link_ids: pending_ids.parse()?,
            ..StoreParts::default()
        };

        let mut stmt = self.conn.prepare_cached("SELECT FileID FROM Files ORDER BY FileID")?;
        parts.files = stmt
            .query_map([], |row| row.get(0))?
            .collect::<Result<Vec<_>, _>>()?;

        let mut stmt = self.conn.prepare_cached(
            "SELECT ClassID, Hierarchy, LanguageID, Symbol, ReferenceCount FROM Classes ORDER BY ClassID",
        )?;
        let classes = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, u32>(0)?,
                    row.get::<_, i64>(1)?,
                    row.get::<_, u32>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, u32>(4)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;
        for (id, hierarchy, language_id, symbol, count) in classes {
            let key = ClassKey {
                hierarchy: Hierarchy::from_i64(hierarchy)?,
                symbol,
            };
            parts.classes.push((id, key, language_id, count));
        }

        let mut stmt = self.conn.prepare_cached(
            "SELECT ContextID, ContextString, ReferenceCount FROM Contexts ORDER BY ContextID",
        )?;
        parts.contexts = stmt
            .query_map([], |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)))?
            .collect::<Result<Vec<_>, _>>()?;

        let mut stmt = self.conn.prepare_cached(
            "SELECT TopicID, Title, Body, Summary, Prototype, Symbol, SymbolDefinitionNumber,
                    ClassID, IsEmbedded, EndingSymbol, CommentType, AccessLevel, Tags, FileID,
                    CommentLineNumber, CodeLineNumber, LanguageID, PrototypeContextID, BodyContextID
             FROM Topics ORDER BY TopicID",
        )?;
        let rows = stmt
            .query_map([], |row| {
                let class_id: u32 = row.get(7)?;
                let comment_type: String = row.get(10)?;
                let access_level: String = row.get(11)?;
                let tags: String = row.get(12)?;
                let topic = Topic {
                    id: row.get(0)?,
                    title: row.get(1)?,
                    body: row.get(2)?,
                    summary: row.get(3)?,
                    prototype: row.get(4)?,
                    symbol: row.get(5)?,
                    symbol_definition_number: row.get(6)?,
                    class_id: (class_id != 0).then_some(class_id),
                    is_embedded: row.get(8)?,
                    ending_symbol: row.get(9)?,
                    comment_type: Default::default(),
                    access_level: Default::default(),
                    tags: Vec::new(),
                    file_id: row.get(13)?,
                    comment_line_number: row.get(14)?,
                    code_line_number: row.get(15)?,
                    language_id: row.get(16)?,
                    prototype_context_id: row.get(17)?,
                    body_context_id: row.get(18)?,
                };
                Ok((topic, comment_type, access_level, tags))
            })?
            .collect::<Result<Vec<_>, _>>()?;
        for (mut topic, comment_type, access_level, tags) in rows {
            topic.comment_type = parse_json("CommentType", &comment_type)?;
            topic.access_level = parse_json("AccessLevel", &access_level)?;
            topic.tags = parse_json("Tags", &tags)?;
            parts.topics.push(topic);
        }

        let mut alternates: BTreeMap<LinkId, Vec<String>> = BTreeMap::new();
        let mut stmt = self.conn.prepare_cached(
            "SELECT LinkID, EndingSymbol FROM AlternateLinkEndingSymbols ORDER BY LinkID, EndingSymbol",
        )?;
        let rows = stmt
            .query_map([], |row| Ok((row.get::<_, u32>(0)?, row.get::<_, String>(1)?)))?
            .collect::<Result<Vec<_>, _>>()?;
        for (link_id, ending) in rows {
            alternates.entry(link_id).or_default().push(ending);
        }

        let mut stmt = self.conn.prepare_cached(
            "SELECT LinkID, Type, TextOrSymbol, ContextID, FileID, LanguageID, EndingSymbol,
                    TargetTopicID, TargetScore
             FROM Links ORDER BY LinkID",
        )?;
        let rows = stmt
            .query_map([], |row| {
                let target: u32 = row.get(7)?;
                let link = Link {
                    id: row.get(0)?,
                    link_type: LinkType::Reference,
                    text_or_symbol: row.get(2)?,
                    context_id: row.get(3)?,
                    file_id: row.get(4)?,
                    language_id: row.get(5)?,
                    ending_symbol: row.get(6)?,
                    alternate_ending_symbols: Vec::new(),
                    target_topic_id: (target != 0).then_some(target),
                    target_score: row.get(8)?,
                };
                Ok((link, row.get::<_, i64>(1)?))
            })?
            .collect::<Result<Vec<_>, _>>()?;
        for (mut link, link_type) in rows {
            link.link_type = LinkType::from_i64(link_type)?;
            link.alternate_ending_symbols = alternates.remove(&link.id).unwrap_or_default();
            parts.links.push(link);
        }
        if let Some(orphan) = alternates.keys().next() {
            return Err(StoreError::format(
                "AlternateLinkEndingSymbols",
                format!("rows for missing link {}", orphan),
            ));
        }

        Ok(parts)
    }

    /// Write `store` out, replacing the previous contents in one transaction.
    ///
    /// # Errors
    /// `Poisoned` if the store saw a consistency violation; the last good
    /// snapshot stays on disk.
    pub fn save(&self, store: &SymbolStore) -> StoreResult<()> {
        if store.is_poisoned() {
            return Err(StoreError::Poisoned);
        }
        let parts = store.to_parts();

        let tx = self.conn.unchecked_transaction()?;
        for table in schema::TABLES {
            tx.execute(&format!("DELETE FROM {}", table), [])?;
        }

        tx.execute(
            "INSERT INTO System (Version, UsedTopicIDs, UsedLinkIDs, UsedClassIDs, UsedContextIDs,
                PendingLinkIDs)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                CODEDB_SCHEMA_VERSION,
                parts.used_topic_ids.to_string(),
                parts.used_link_ids.to_string(),
                parts.used_class_ids.to_string(),
                parts.used_context_ids.to_string(),
                parts.pending_link_ids.to_string(),
            ],
        )?;

        {
            let mut stmt = tx.prepare_cached("INSERT INTO Files (FileID) VALUES (?1)")?;
            for file_id in &parts.files {
                stmt.execute(params![file_id])?;
            }

            let mut stmt = tx.prepare_cached(
                "INSERT INTO Classes (ClassID, Hierarchy, LanguageID, Symbol, ReferenceCount)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
            )?;
            for (id, key, language_id, count) in &parts.classes {
                stmt.execute(params![id, key.hierarchy.as_i64(), language_id, key.symbol, count])?;
            }

            let mut stmt = tx.prepare_cached(
                "INSERT INTO Contexts (ContextID, ContextString, ReferenceCount) VALUES (?1, ?2, ?3)",
            )?;
            for (id, context_string, count) in &parts.contexts {
                stmt.execute(params![id, context_string, count])?;
            }

            let mut stmt = tx.prepare_cached(
                "INSERT INTO Topics (TopicID, Title, Body, Summary, Prototype, Symbol,
                    SymbolDefinitionNumber, ClassID, IsEmbedded, EndingSymbol, CommentType,
                    AccessLevel, Tags, FileID, CommentLineNumber, CodeLineNumber, LanguageID,
                    PrototypeContextID, BodyContextID)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18, ?19)",
            )?;
            for topic in &parts.topics {
                stmt.execute(params![
                    topic.id,
                    topic.title,
                    topic.body,
                    topic.summary,
                    topic.prototype,
                    topic.symbol,
                    topic.symbol_definition_number,
                    topic.class_id.unwrap_or(0),
                    topic.is_embedded,
                    topic.ending_symbol,
                    serde_json::to_string(&topic.comment_type)?,
                    serde_json::to_string(&topic.access_level)?,
                    serde_json::to_string(&topic.tags)?,
                    topic.file_id,
                    topic.comment_line_number,
                    topic.code_line_number,
                    topic.language_id,
                    topic.prototype_context_id,
                    topic.body_context_id,
                ])?;
            }

            let mut links = tx.prepare_cached(
                "INSERT INTO Links (LinkID, Type, TextOrSymbol, ContextID, FileID, LanguageID,
                    EndingSymbol, TargetTopicID, TargetScore)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            )?;
            let mut alternates = tx.prepare_cached(
                "INSERT INTO AlternateLinkEndingSymbols (LinkID, EndingSymbol) VALUES (?1, ?2)",
            )?;
            for link in &parts.links {
                links.execute(params![
                    link.id,
                    link.link_type.as_i64(),
                    link.text_or_symbol,
                    link.context_id,
                    link.file_id,
                    link.language_id,
                    link.ending_symbol,
                    link.target_topic_id.unwrap_or(0),
                    link.target_score,
                ])?;
                for ending in &link.alternate_ending_symbols {
                    alternates.execute(params![link.id, ending])?;
                }
            }
        }

        tx.commit()?;
        debug!(
            path = %self.path.display(),
            topics = parts.topics.len(),
            links = parts.links.len(),
            "saved symbol database"
        );
        Ok(())
    }

    /// Open and load the database named by `config`, starting over with an
    /// empty one if the existing file is unusable.
    ///
    /// # Returns
    /// The open database, the loaded store and how it was obtained
    pub fn open_or_rebuild(config: &StoreConfig) -> StoreResult<(Database, SymbolStore, LoadOutcome)> {
        let attempt = Database::open(&config.db_path).and_then(|db| {
            let store = db.load(config.clone())?;
            Ok((db, store))
        });

        match attempt {
            Ok((db, store)) => {
                let outcome = if db.created {
                    LoadOutcome::Created
                } else {
                    LoadOutcome::Loaded
                };
                info!(path = %db.path.display(), ?outcome, "opened symbol database");
                Ok((db, store, outcome))
            }
            Err(err) if err.is_format() => {
                warn!(
                    path = %config.db_path.display(),
                    code = err.code(),
                    error = %err,
                    "symbol database unusable, rebuilding"
                );
                let db = Self::recreate(&config.db_path)?;
                let store = db.load(config.clone())?;
                Ok((db, store, LoadOutcome::Rebuilt {
                    reason: err.to_string(),
                }))
            }
            Err(err) => Err(err),
        }
    }

    fn recreate(path: &Path) -> StoreResult<Database> {
        if path != Path::new(MEMORY_PATH) {
            match std::fs::remove_file(path) {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }
        let db = Database::open(path)?;
        if !db.created {
            db.reset()?;
        }
        Ok(db)
    }

    /// Close the connection, reporting any error SQLite raises while
    /// flushing.
    pub fn close(self) -> StoreResult<()> {
        let memory = self.is_memory();
        self.conn.close().map_err(|(_, e)| StoreError::Sqlite(e))?;
        if !memory {
            debug!(path = %self.path.display(), "closed symbol database");
        }
        Ok(())
    }
}

fn parse_json<T: DeserializeOwned>(column: &str, text: &str) -> StoreResult<T> {
    serde_json::from_str(text).map_err(|e| StoreError::format(column, e.to_string()))
}

/// Treat damage SQLite reports while reading as unparseable state.
fn corruption_to_format(err: StoreError) -> StoreError {
    match err {
        StoreError::Sqlite(rusqlite::Error::SqliteFailure(failure, message))
            if matches!(failure.code, ErrorCode::NotADatabase | ErrorCode::DatabaseCorrupt) =>
        {
            StoreError::format(
                "database file",
                message.unwrap_or_else(|| failure.to_string()),
            )
        }
        StoreError::Sqlite(
            e @ (rusqlite::Error::InvalidColumnType(..)
            | rusqlite::Error::IntegralValueOutOfRange(..)
            | rusqlite::Error::FromSqlConversionFailure(..)),
        ) => StoreError::format("database column", e.to_string()),
        other => other,
    }
}
