//! SQLite schema for the symbol database
//!
//! IDs are never 0, so `ClassID` and `TargetTopicID` use 0 for "none"
//! instead of NULL.

/// Bumped whenever a table or column changes. A database written with any
/// other version is rebuilt.
pub const CODEDB_SCHEMA_VERSION: i64 = 5;

/// Tables in dependency order; dropped in reverse by `Database::reset`.
pub const TABLES: [&str; 7] = [
    "System",
    "Files",
    "Classes",
    "Contexts",
    "Topics",
    "Links",
    "AlternateLinkEndingSymbols",
];

pub const CREATE_STATEMENTS: [&str; 16] = [
    "CREATE TABLE IF NOT EXISTS System (
        Version INTEGER NOT NULL,
        UsedTopicIDs TEXT NOT NULL,
        UsedLinkIDs TEXT NOT NULL,
        UsedClassIDs TEXT NOT NULL,
        UsedContextIDs TEXT NOT NULL,
        PendingLinkIDs TEXT NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS Files (
        FileID INTEGER PRIMARY KEY NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS Classes (
        ClassID INTEGER PRIMARY KEY NOT NULL,
        Hierarchy INTEGER NOT NULL,
        LanguageID INTEGER NOT NULL,
        Symbol TEXT NOT NULL,
        ReferenceCount INTEGER NOT NULL
    )",
    "CREATE UNIQUE INDEX IF NOT EXISTS ClassesByHierarchyAndSymbol ON Classes (Hierarchy, Symbol)",
    "CREATE TABLE IF NOT EXISTS Contexts (
        ContextID INTEGER PRIMARY KEY NOT NULL,
        ContextString TEXT NOT NULL,
        ReferenceCount INTEGER NOT NULL
    )",
    "CREATE UNIQUE INDEX IF NOT EXISTS ContextsByContextString ON Contexts (ContextString)",
    "CREATE TABLE IF NOT EXISTS Topics (
        TopicID INTEGER PRIMARY KEY NOT NULL,
        Title TEXT NOT NULL,
        Body TEXT,
        Summary TEXT,
        Prototype TEXT,
        Symbol TEXT NOT NULL,
        SymbolDefinitionNumber INTEGER NOT NULL,
        ClassID INTEGER NOT NULL,
        IsEmbedded INTEGER NOT NULL,
        EndingSymbol TEXT NOT NULL,
        CommentType TEXT NOT NULL,
        AccessLevel TEXT NOT NULL,
        Tags TEXT NOT NULL,
        FileID INTEGER NOT NULL,
        CommentLineNumber INTEGER NOT NULL,
        CodeLineNumber INTEGER NOT NULL,
        LanguageID INTEGER NOT NULL,
        PrototypeContextID INTEGER NOT NULL,
        BodyContextID INTEGER NOT NULL
    )",
    "CREATE INDEX IF NOT EXISTS TopicsByFile ON Topics (FileID, CommentLineNumber)",
    "CREATE INDEX IF NOT EXISTS TopicsByClass ON Topics (ClassID)",
    "CREATE INDEX IF NOT EXISTS TopicsByEndingSymbol ON Topics (EndingSymbol)",
    "CREATE TABLE IF NOT EXISTS Links (
        LinkID INTEGER PRIMARY KEY NOT NULL,
        Type INTEGER NOT NULL,
        TextOrSymbol TEXT NOT NULL,
        ContextID INTEGER NOT NULL,
        FileID INTEGER NOT NULL,
        LanguageID INTEGER NOT NULL,
        EndingSymbol TEXT NOT NULL,
        TargetTopicID INTEGER NOT NULL,
        TargetScore INTEGER NOT NULL
    )",
    "CREATE UNIQUE INDEX IF NOT EXISTS LinksByProperties
        ON Links (FileID, ContextID, Type, LanguageID, TextOrSymbol)",
    "CREATE INDEX IF NOT EXISTS LinksByEndingSymbols ON Links (EndingSymbol)",
    "CREATE INDEX IF NOT EXISTS LinksByTargetTopicID ON Links (TargetTopicID)",
    "CREATE TABLE IF NOT EXISTS AlternateLinkEndingSymbols (
        LinkID INTEGER NOT NULL,
        EndingSymbol TEXT NOT NULL,
        PRIMARY KEY (LinkID, EndingSymbol)
    )",
    "CREATE INDEX IF NOT EXISTS AlternateLinkEndingSymbolsBySymbol
        ON AlternateLinkEndingSymbols (EndingSymbol)",
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_table_has_a_create_statement() {
        for table in TABLES {
            let needle = format!("CREATE TABLE IF NOT EXISTS {} (", table);
            assert!(
                CREATE_STATEMENTS.iter().any(|sql| sql.starts_with(&needle)),
                "missing {}",
                table
            );
        }
    }
}
