//! Shared store under concurrent readers and a cancelling host
//!
//! Readers take the read lock while a writer merges batches. Because a
//! merge holds the write lock from the first file to the end of its resolve
//! pass, every snapshot a reader sees must verify clean and have every
//! resolvable link resolved.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

use codedb::{
    merge_batches, CancelFlag, Context, FileBatch, LinkInput, LinkResolver, SharedStore,
    StoreConfig, SymbolStore, TopicInput,
};

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn round(generation: u32) -> Vec<FileBatch> {
    (1..=8)
        .map(|file| {
            let name = format!("Item{}", (file + generation) % 8);
            FileBatch::new(file)
                .with_topic(TopicInput::new(&name, &format!("Module{}.{}", file, name), 1))
                .with_link(LinkInput::reference(
                    &format!("Item{}", (file + 1) % 8),
                    Context::scoped(&format!("Module{}", file)),
                    1,
                ))
        })
        .collect()
}

#[test]
fn test_readers_never_see_half_merged_state() {
    init_tracing();
    let shared = SharedStore::new(SymbolStore::new(StoreConfig::in_memory()));
    let done = Arc::new(AtomicBool::new(false));

    let readers: Vec<_> = (0..4)
        .map(|_| {
            let shared = shared.clone();
            let done = Arc::clone(&done);
            thread::spawn(move || {
                let mut snapshots = 0;
                while !done.load(Ordering::SeqCst) {
                    let store = shared.read().unwrap();
                    let report = store.verify();
                    assert!(report.is_clean(), "{}", report.summary());
                    assert!(store.changes().is_empty());
                    snapshots += 1;
                }
                snapshots
            })
        })
        .collect();

    let resolver = LinkResolver::default();
    for generation in 0..20 {
        merge_batches(&shared, round(generation), &resolver).unwrap();
    }
    done.store(true, Ordering::SeqCst);

    for reader in readers {
        reader.join().unwrap();
    }

    let store = shared.read().unwrap();
    assert_eq!(store.topic_count(), 8);
    assert_eq!(store.link_count(), 8);
    assert!(store.verify().is_clean());
}

#[test]
fn test_cancelled_merge_leaves_links_pending() {
    init_tracing();
    let shared = SharedStore::new(SymbolStore::new(StoreConfig::in_memory()));
    let cancel = CancelFlag::new();
    let resolver = LinkResolver::new(cancel.clone());

    cancel.cancel();
    let report = merge_batches(
        &shared,
        vec![
            FileBatch::new(1).with_topic(TopicInput::new("Target", "Target", 1)),
            FileBatch::new(2).with_link(LinkInput::reference("Target", Context::global(), 1)),
        ],
        &resolver,
    )
    .unwrap();
    assert!(report.resolve.cancelled);
    assert_eq!(report.resolve.pending.len(), 1);
    assert_eq!(shared.with_read(|s| s.stats().resolved_links).unwrap(), 0);

    cancel.reset();
    let report = shared
        .with_write(|store| resolver.resolve_pending(store))
        .unwrap();
    assert!(report.is_complete());
    assert_eq!(report.resolved, 1);
}

#[test]
fn test_cancel_from_another_thread() {
    init_tracing();
    let cancel = CancelFlag::new();
    let remote = cancel.clone();
    thread::spawn(move || remote.cancel()).join().unwrap();

    let mut store = SymbolStore::new(StoreConfig::in_memory());
    store.add_file(1).unwrap();
    for i in 0..10 {
        store
            .add_link(1, LinkInput::reference(&format!("Missing{}", i), Context::global(), 1))
            .unwrap();
    }
    let report = LinkResolver::new(cancel).resolve_pending(&mut store).unwrap();
    assert_eq!(report.examined, 0);
    assert_eq!(report.pending.len(), 10);
    assert_eq!(store.changes().link_ids().count(), 10);
}
