//! Save/load round trips and rebuild on corruption
//!
//! Every test works on an on-disk database inside a TempDir.

use codedb::{
    AccessLevel, ClassInput, CommentType, Context, Database, FileBatch, Hierarchy, LinkInput,
    LinkResolver, LinkType, LoadOutcome, Project, StoreConfig, SymbolStore, TopicInput,
};
use rusqlite::Connection;
use std::path::Path;
use tempfile::TempDir;

fn config_at(path: &Path) -> StoreConfig {
    StoreConfig {
        db_path: path.to_path_buf(),
        ..StoreConfig::default()
    }
    .with_language(2, "SQL", false)
}

fn sample_store(config: StoreConfig) -> SymbolStore {
    let mut store = SymbolStore::new(config);
    store.add_file(1).unwrap();
    store.add_file(2).unwrap();

    let mut run = TopicInput::new("Run", "Job::Run", 1)
        .with_class(ClassInput::new(Hierarchy::Class, 1, "Job"))
        .with_comment_type(CommentType::Function)
        .with_prototype("void Run()")
        .with_contexts(Context::scoped("Job"), Context::scoped("Job"))
        .with_lines(12, 14)
        .with_summary("Runs the job once");
    run.access_level = AccessLevel::Public;
    run.tags = vec!["core".to_string(), "async".to_string()];
    store.add_topic(1, run).unwrap();
    store
        .add_topic(
            2,
            TopicInput::new("Customers", "Customers", 2)
                .with_class(ClassInput::new(Hierarchy::Database, 2, "Customers"))
                .with_comment_type(CommentType::Other("Table".to_string()))
                .embedded(),
        )
        .unwrap();

    store
        .add_link(1, LinkInput::reference("Run", Context::scoped("Job"), 1))
        .unwrap();
    store
        .add_link(2, LinkInput::reference("CUSTOMERS", Context::global(), 2))
        .unwrap();
    store
        .add_link(
            1,
            LinkInput::new(LinkType::Url, "https://example.org", Context::global(), 1),
        )
        .unwrap();
    LinkResolver::default().resolve_pending(&mut store).unwrap();
    store
}

#[test]
fn test_round_trip_reproduces_every_table() {
    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir.path().join("codedb.sqlite");
    let config = config_at(&db_path);

    let store = sample_store(config.clone());
    let db = Database::open(&db_path).unwrap();
    db.save(&store).unwrap();
    db.close().unwrap();

    let (_db, loaded, outcome) = Database::open_or_rebuild(&config).unwrap();
    assert_eq!(outcome, LoadOutcome::Loaded);

    assert_eq!(loaded.topics().collect::<Vec<_>>(), store.topics().collect::<Vec<_>>());
    assert_eq!(loaded.links().collect::<Vec<_>>(), store.links().collect::<Vec<_>>());
    assert_eq!(loaded.classes().collect::<Vec<_>>(), store.classes().collect::<Vec<_>>());
    assert_eq!(loaded.contexts().collect::<Vec<_>>(), store.contexts().collect::<Vec<_>>());
    assert_eq!(loaded.used_topic_ids(), store.used_topic_ids());
    assert_eq!(loaded.used_link_ids(), store.used_link_ids());
    assert_eq!(loaded.used_class_ids(), store.used_class_ids());
    assert_eq!(loaded.used_context_ids(), store.used_context_ids());
    assert_eq!(loaded.files().collect::<Vec<_>>(), vec![1, 2]);
    assert_eq!(loaded.stats().resolved_links, 2);

    let sql_link = loaded.links_in_file(2).next().unwrap();
    assert_eq!(sql_link.ending_symbol, "customers");

    let run = loaded.topics_in_file(1).next().unwrap();
    assert_eq!(run.summary.as_deref(), Some("Runs the job once"));
    assert!(!run.is_embedded);
    assert!(loaded.topics_in_file(2).next().unwrap().is_embedded);
}

#[test]
fn test_loaded_store_keeps_resolving_incrementally() {
    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir.path().join("codedb.sqlite");
    let config = config_at(&db_path);
    {
        let db = Database::open(&db_path).unwrap();
        db.save(&sample_store(config.clone())).unwrap();
    }

    let db = Database::open(&db_path).unwrap();
    let mut store = db.load(config).unwrap();
    assert!(store.changes().is_empty());

    let waiting = store
        .add_link(2, LinkInput::reference("Stop", Context::scoped("Job"), 1))
        .unwrap();
    let stop = store
        .add_topic(
            1,
            TopicInput::new("Stop", "Job.Stop", 1)
                .with_class(ClassInput::new(Hierarchy::Class, 1, "Job")),
        )
        .unwrap();
    let report = LinkResolver::default().resolve_pending(&mut store).unwrap();
    assert_eq!(report.examined, 1);
    assert_eq!(store.link(waiting).unwrap().target_topic_id, Some(stop));
}

#[test]
fn test_corrupt_system_row_triggers_rebuild() {
    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir.path().join("codedb.sqlite");
    let config = config_at(&db_path);
    {
        let db = Database::open(&db_path).unwrap();
        db.save(&sample_store(config.clone())).unwrap();
    }
    {
        let conn = Connection::open(&db_path).unwrap();
        conn.execute("UPDATE System SET UsedTopicIDs = '3-1,x'", []).unwrap();
    }

    let (_db, store, outcome) = Database::open_or_rebuild(&config).unwrap();
    match outcome {
        LoadOutcome::Rebuilt { reason } => assert!(reason.contains("NumberSet"), "{}", reason),
        other => panic!("expected rebuild, got {:?}", other),
    }
    assert_eq!(store.topic_count(), 0);
    assert_eq!(store.link_count(), 0);
}

#[test]
fn test_reference_count_mismatch_triggers_rebuild() {
    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir.path().join("codedb.sqlite");
    let config = config_at(&db_path);
    {
        let db = Database::open(&db_path).unwrap();
        db.save(&sample_store(config.clone())).unwrap();
    }
    {
        let conn = Connection::open(&db_path).unwrap();
        conn.execute("UPDATE Classes SET ReferenceCount = ReferenceCount + 1", [])
            .unwrap();
    }

    let (_db, _store, outcome) = Database::open_or_rebuild(&config).unwrap();
    assert!(matches!(outcome, LoadOutcome::Rebuilt { .. }));
}

#[test]
fn test_project_rebuild_then_reapply() {
    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir.path().join("codedb.sqlite");
    std::fs::write(&db_path, vec![0u8; 2048]).unwrap();

    let mut project = Project::open(config_at(&db_path)).unwrap();
    assert!(project.load_outcome().is_fresh());

    let report = project
        .apply(vec![
            FileBatch::new(1).with_topic(TopicInput::new("Entry", "Entry", 1)),
            FileBatch::new(2).with_link(LinkInput::reference("Entries", Context::global(), 1)),
        ])
        .unwrap();
    assert_eq!(report.resolve.resolved, 1);
    project.close().unwrap();

    let project = Project::open(config_at(&db_path)).unwrap();
    assert_eq!(project.load_outcome(), &LoadOutcome::Loaded);
    assert_eq!(project.stats().unwrap().resolved_links, 1);
}

#[test]
fn test_cancelled_resolve_resumes_after_reopen() {
    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir.path().join("codedb.sqlite");
    let batches = || {
        vec![
            FileBatch::new(1).with_topic(TopicInput::new("Target", "Target", 1)),
            FileBatch::new(2).with_link(LinkInput::reference("Target", Context::global(), 1)),
        ]
    };

    let mut project = Project::open(config_at(&db_path)).unwrap();
    project.cancel_flag().cancel();
    let report = project.apply(batches()).unwrap();
    assert!(report.resolve.cancelled);
    assert_eq!(report.resolve.pending, vec![1]);
    project.close().unwrap();

    let mut project = Project::open(config_at(&db_path)).unwrap();
    assert_eq!(project.load_outcome(), &LoadOutcome::Loaded);
    assert_eq!(project.stats().unwrap().resolved_links, 0);
    let pending = project
        .shared()
        .with_read(|store| store.changes().link_ids().collect::<Vec<_>>())
        .unwrap();
    assert_eq!(pending, vec![1]);

    let report = project.apply(vec![batches().remove(0)]).unwrap();
    assert_eq!(report.topics_added(), 0);
    assert_eq!(report.resolve.examined, 1);
    assert_eq!(project.stats().unwrap().resolved_links, 1);
    project.close().unwrap();

    let project = Project::open(config_at(&db_path)).unwrap();
    assert_eq!(project.stats().unwrap().resolved_links, 1);
    assert!(project
        .shared()
        .with_read(|store| store.changes().is_empty())
        .unwrap());
}
