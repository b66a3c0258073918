//! Batch merge pipeline
//!
//! Parsers hand over one [`FileBatch`] per scanned file. Canonicalizing the
//! batches is pure and runs in parallel with rayon; merging them runs under
//! the store's write lock, in FileID order, and ends with a single
//! incremental resolve pass.
//!
//! Topics can move between files of the same batch set. Every file's stale
//! topics are therefore removed before any file's new topics are merged,
//! otherwise the destination file would see the key as owned elsewhere.

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{EntityKind, StoreError, StoreResult};
use crate::ids::{FileId, TopicId};
use crate::resolver::{LinkResolver, ResolveReport};
use crate::schema::{LinkInput, TopicInput};
use crate::shared::SharedStore;
use crate::store::{LinkChanges, TopicChanges};
use crate::symbols::normalize_symbol;

/// Everything one parse of a file produced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileBatch {
    pub file_id: FileId,
    pub topics: Vec<TopicInput>,
    pub links: Vec<LinkInput>,
}

impl FileBatch {
    pub fn new(file_id: FileId) -> Self {
        Self {
            file_id,
            topics: Vec::new(),
            links: Vec::new(),
        }
    }

    pub fn with_topic(mut self, topic: TopicInput) -> Self {
        self.topics.push(topic);
        self
    }

    pub fn with_link(mut self, link: LinkInput) -> Self {
        self.links.push(link);
        self
    }

    fn canonicalize(mut self) -> Self {
        for topic in &mut self.topics {
            topic.symbol = normalize_symbol(&topic.symbol);
            topic.symbol_definition_number = topic.symbol_definition_number.max(1);
            if let Some(class) = &mut topic.class {
                class.symbol = normalize_symbol(&class.symbol);
            }
            topic.prototype_context = topic.prototype_context.canonicalized();
            topic.body_context = topic.body_context.canonicalized();
        }
        for link in &mut self.links {
            link.context = link.context.canonicalized();
        }
        self
    }
}

/// Result of merging one file.
#[derive(Debug)]
pub struct FileMerge {
    pub file_id: FileId,
    pub topics: TopicChanges,
    pub links: LinkChanges,
}

/// Result of [`merge_batches`].
#[derive(Debug, Default)]
pub struct MergeReport {
    pub files: Vec<FileMerge>,
    /// Topics removed before merging because their file no longer declares them
    pub stale_topics: Vec<TopicId>,
    pub resolve: ResolveReport,
}

impl MergeReport {
    pub fn topics_added(&self) -> usize {
        self.files.iter().map(|f| f.topics.added.len()).sum()
    }

    pub fn topics_removed(&self) -> usize {
        self.stale_topics.len() + self.files.iter().map(|f| f.topics.removed.len()).sum::<usize>()
    }

    pub fn topics_modified(&self) -> usize {
        self.files.iter().map(|f| f.topics.modified.len()).sum()
    }

    pub fn links_added(&self) -> usize {
        self.files.iter().map(|f| f.links.added.len()).sum()
    }

    pub fn links_removed(&self) -> usize {
        self.files.iter().map(|f| f.links.removed.len()).sum()
    }

    /// Inputs skipped because their key was already taken.
    pub fn rejected(&self) -> usize {
        self.files.iter().map(|f| f.topics.rejected.len()).sum()
    }
}

/// Canonicalize batches in parallel and order them by FileID.
///
/// # Errors
/// - `Reference` for file ID 0
/// - `Duplicate` if two batches name the same file
pub fn prepare_batches(batches: Vec<FileBatch>) -> StoreResult<Vec<FileBatch>> {
    if batches.iter().any(|batch| batch.file_id == 0) {
        return Err(StoreError::reference(EntityKind::File, 0));
    }

    let mut prepared: Vec<FileBatch> = batches.into_par_iter().map(FileBatch::canonicalize).collect();
    prepared.sort_by_key(|batch| batch.file_id);

    if let Some(pair) = prepared.windows(2).find(|w| w[0].file_id == w[1].file_id) {
        return Err(StoreError::duplicate(
            EntityKind::File,
            format!("batch for file {}", pair[0].file_id),
        ));
    }
    Ok(prepared)
}

/// Merge prepared batches into the shared store and resolve what changed.
///
/// The write lock is held for the whole merge. Fatal errors poison the
/// store and abort; rejected topic inputs are only reported.
pub fn merge_batches(
    shared: &SharedStore,
    batches: Vec<FileBatch>,
    resolver: &LinkResolver,
) -> StoreResult<MergeReport> {
    let batches = prepare_batches(batches)?;
    let mut store = shared.write()?;
    let mut report = MergeReport::default();

    for batch in &batches {
        store.add_file(batch.file_id)?;
    }
    for batch in &batches {
        let stale = store.remove_stale_topics(batch.file_id, &batch.topics)?;
        report.stale_topics.extend(stale);
    }

    for batch in batches {
        let file_id = batch.file_id;
        let topics = store.update_file_topics(file_id, batch.topics)?;
        let links = store.update_file_links(file_id, batch.links)?;
        debug!(
            file_id,
            topics_added = topics.added.len(),
            topics_removed = topics.removed.len(),
            topics_modified = topics.modified.len(),
            links_added = links.added.len(),
            links_removed = links.removed.len(),
            "merged file"
        );
        report.files.push(FileMerge {
            file_id,
            topics,
            links,
        });
    }

    report.resolve = resolver.resolve_pending(&mut store)?;

    info!(
        files = report.files.len(),
        topics_added = report.topics_added(),
        topics_removed = report.topics_removed(),
        links_added = report.links_added(),
        resolved = report.resolve.resolved,
        cancelled = report.resolve.cancelled,
        "merge complete"
    );
    Ok(report)
}
