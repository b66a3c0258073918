//! In-memory symbol database
//!
//! [`SymbolStore`] owns the topic and link tables, the interned classes and
//! contexts, the file registry and every secondary index the resolver and
//! renderers need. Mutations go through the methods in the submodules:
//!
//! - `files` registers and drops whole files
//! - `topics` adds, removes and diffs topics per file
//! - `links` does the same for links and owns the link target fields
//!
//! Every mutator validates its input before touching any table, so a
//! `Reference` or `Duplicate` error leaves the store exactly as it was. A
//! `Consistency` error means internal bookkeeping is broken; the store is
//! poisoned and refuses further writes and saves.

pub mod changes;
pub mod files;
pub mod index;
pub mod links;
pub mod restore;
pub mod topics;

use std::collections::{BTreeMap, BTreeSet, HashMap};

use serde::{Deserialize, Serialize};

use crate::config::StoreConfig;
use crate::error::{EntityKind, StoreError, StoreResult};
use crate::ids::{ClassId, ContextId, FileId, LanguageId, LinkId, NumberSet, TopicId};
use crate::intern::Interner;
use crate::schema::{ClassInfo, ClassKey, ContextInfo, Link, Topic};
use crate::symbols::{fold_ending, symbols_equal, Context};

pub use changes::ChangeTracker;
pub use files::FileRemoval;
pub use index::MultiIndex;
pub use links::LinkChanges;
pub use restore::StoreParts;
pub use topics::{Rejected, TopicChanges};

pub(crate) use links::LinkKey;
pub(crate) use topics::TopicKey;

/// Row counts, as reported by [`SymbolStore::stats`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreStats {
    pub files: usize,
    pub topics: usize,
    pub links: usize,
    pub resolved_links: usize,
    pub alternate_ending_symbols: usize,
    pub classes: usize,
    pub contexts: usize,
    pub generation: u64,
}

/// The symbol database of one documentation project.
#[derive(Debug, Clone)]
pub struct SymbolStore {
    pub(crate) config: StoreConfig,
    pub(crate) generation: u64,
    pub(crate) poisoned: bool,

    pub(crate) files: BTreeSet<FileId>,
    pub(crate) topics: BTreeMap<TopicId, Topic>,
    pub(crate) links: BTreeMap<LinkId, Link>,
    pub(crate) used_topic_ids: NumberSet,
    pub(crate) used_link_ids: NumberSet,
    /// Keyed by (hierarchy, symbol); payload is the language of the first user.
    pub(crate) classes: Interner<ClassKey, LanguageId>,
    /// Keyed by context string; payload is the parsed context.
    pub(crate) contexts: Interner<String, Context>,

    // Ending-symbol indexes are keyed by `fold_ending`.
    pub(crate) topics_by_ending: MultiIndex<String, TopicId>,
    pub(crate) topics_by_file: MultiIndex<FileId, (u32, TopicId)>,
    pub(crate) topics_by_class: MultiIndex<ClassId, TopicId>,
    pub(crate) topic_keys: HashMap<TopicKey, TopicId>,
    pub(crate) links_by_ending: MultiIndex<String, LinkId>,
    pub(crate) links_by_file: MultiIndex<FileId, LinkId>,
    pub(crate) links_by_target: MultiIndex<TopicId, LinkId>,
    pub(crate) link_keys: HashMap<LinkKey, LinkId>,

    pub(crate) changes: ChangeTracker,
}

impl SymbolStore {
    pub fn new(config: StoreConfig) -> Self {
        Self {
            config,
            generation: 0,
            poisoned: false,
            files: BTreeSet::new(),
            topics: BTreeMap::new(),
            links: BTreeMap::new(),
            used_topic_ids: NumberSet::new(),
            used_link_ids: NumberSet::new(),
            classes: Interner::new(EntityKind::Class),
            contexts: Interner::new(EntityKind::Context),
            topics_by_ending: MultiIndex::default(),
            topics_by_file: MultiIndex::default(),
            topics_by_class: MultiIndex::default(),
            topic_keys: HashMap::new(),
            links_by_ending: MultiIndex::default(),
            links_by_file: MultiIndex::default(),
            links_by_target: MultiIndex::default(),
            link_keys: HashMap::new(),
            changes: ChangeTracker::new(),
        }
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// Bumped by every successful mutation. Iteration order of the finder
    /// methods is stable while it stays the same.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn is_poisoned(&self) -> bool {
        self.poisoned
    }

    pub fn is_case_sensitive(&self, language: LanguageId) -> bool {
        self.config.is_case_sensitive(language)
    }

    pub(crate) fn ensure_writable(&self) -> StoreResult<()> {
        if self.poisoned {
            Err(StoreError::Poisoned)
        } else {
            Ok(())
        }
    }

    /// Record the outcome of a mutation: bump the generation on success,
    /// poison the store on a fatal error.
    pub(crate) fn finish<T>(&mut self, result: StoreResult<T>) -> StoreResult<T> {
        match &result {
            Ok(_) => self.generation += 1,
            Err(e) if e.is_fatal() => {
                if !self.poisoned {
                    tracing::error!(error = %e, code = e.code(), "symbol store poisoned");
                }
                self.poisoned = true;
            }
            Err(_) => {}
        }
        result
    }

    /// Take the accumulated changes, leaving an empty tracker behind.
    pub fn take_changes(&mut self) -> ChangeTracker {
        std::mem::take(&mut self.changes)
    }

    pub fn changes(&self) -> &ChangeTracker {
        &self.changes
    }

    /// Queue links for the next resolve pass.
    pub fn note_links_pending<I: IntoIterator<Item = LinkId>>(&mut self, ids: I) {
        for id in ids {
            self.changes.note_link_changed(id);
        }
    }

    pub fn topic(&self, id: TopicId) -> Option<&Topic> {
        self.topics.get(&id)
    }

    pub fn link(&self, id: LinkId) -> Option<&Link> {
        self.links.get(&id)
    }

    /// All topics in ascending ID order.
    pub fn topics(&self) -> impl Iterator<Item = &Topic> + '_ {
        self.topics.values()
    }

    /// All links in ascending ID order.
    pub fn links(&self) -> impl Iterator<Item = &Link> + '_ {
        self.links.values()
    }

    pub fn topic_count(&self) -> usize {
        self.topics.len()
    }

    pub fn link_count(&self) -> usize {
        self.links.len()
    }

    /// Topics of a file ordered by comment line, then ID.
    pub fn topics_in_file(&self, file_id: FileId) -> impl Iterator<Item = &Topic> + '_ {
        self.topics_by_file
            .get(&file_id)
            .filter_map(move |(_, id)| self.topics.get(&id))
    }

    pub fn links_in_file(&self, file_id: FileId) -> impl Iterator<Item = &Link> + '_ {
        self.links_by_file
            .get(&file_id)
            .filter_map(move |id| self.links.get(&id))
    }

    /// Links currently resolved to `topic_id`.
    pub fn links_to_topic(&self, topic_id: TopicId) -> impl Iterator<Item = &Link> + '_ {
        self.links_by_target
            .get(&topic_id)
            .filter_map(move |id| self.links.get(&id))
    }

    pub fn topics_in_class(&self, class_id: ClassId) -> impl Iterator<Item = &Topic> + '_ {
        self.topics_by_class
            .get(&class_id)
            .filter_map(move |id| self.topics.get(&id))
    }

    /// Topics whose ending symbol is `ending_symbol` under their language's
    /// case rule, in ascending ID order.
    pub fn find_topics_by_ending_symbol<'a>(
        &'a self,
        ending_symbol: &'a str,
    ) -> impl Iterator<Item = &'a Topic> + 'a {
        let key = fold_ending(ending_symbol);
        let ids: Vec<TopicId> = self.topics_by_ending.get(key.as_str()).collect();
        ids.into_iter()
            .filter_map(move |id| self.topics.get(&id))
            .filter(move |topic| {
                symbols_equal(
                    &topic.ending_symbol,
                    ending_symbol,
                    self.is_case_sensitive(topic.language_id),
                )
            })
    }

    /// Links reachable by `ending_symbol` through their primary or
    /// alternate ending symbols, in ascending ID order.
    pub fn find_links_by_ending_symbol<'a>(
        &'a self,
        ending_symbol: &'a str,
    ) -> impl Iterator<Item = &'a Link> + 'a {
        let key = fold_ending(ending_symbol);
        let ids: Vec<LinkId> = self.links_by_ending.get(key.as_str()).collect();
        ids.into_iter()
            .filter_map(move |id| self.links.get(&id))
            .filter(move |link| {
                let case_sensitive = self.is_case_sensitive(link.language_id);
                link.all_ending_symbols()
                    .any(|e| symbols_equal(e, ending_symbol, case_sensitive))
            })
    }

    pub fn class(&self, id: ClassId) -> Option<ClassInfo> {
        self.classes.get(id).map(|row| ClassInfo {
            id,
            hierarchy: row.key.hierarchy,
            language_id: row.payload,
            symbol: row.key.symbol.clone(),
            reference_count: row.reference_count,
        })
    }

    pub fn class_id_of(&self, key: &ClassKey) -> Option<ClassId> {
        self.classes.id_of(key)
    }

    pub fn classes(&self) -> impl Iterator<Item = ClassInfo> + '_ {
        self.classes.iter().filter_map(move |(id, _)| self.class(id))
    }

    pub fn context(&self, id: ContextId) -> Option<ContextInfo> {
        self.contexts.get(id).map(|row| ContextInfo {
            id,
            context_string: row.key.clone(),
            reference_count: row.reference_count,
        })
    }

    /// Parsed form of an interned context.
    pub fn context_value(&self, id: ContextId) -> Option<&Context> {
        self.contexts.get(id).map(|row| &row.payload)
    }

    pub fn context_id_of(&self, context_string: &str) -> Option<ContextId> {
        self.contexts.id_of(context_string)
    }

    pub fn contexts(&self) -> impl Iterator<Item = ContextInfo> + '_ {
        self.contexts.iter().filter_map(move |(id, _)| self.context(id))
    }

    pub fn used_topic_ids(&self) -> &NumberSet {
        &self.used_topic_ids
    }

    pub fn used_link_ids(&self) -> &NumberSet {
        &self.used_link_ids
    }

    pub fn used_class_ids(&self) -> &NumberSet {
        self.classes.used_ids()
    }

    pub fn used_context_ids(&self) -> &NumberSet {
        self.contexts.used_ids()
    }

    pub fn stats(&self) -> StoreStats {
        StoreStats {
            files: self.files.len(),
            topics: self.topics.len(),
            links: self.links.len(),
            resolved_links: self.links.values().filter(|l| l.is_resolved()).count(),
            alternate_ending_symbols: self
                .links
                .values()
                .map(|l| l.alternate_ending_symbols.len())
                .sum(),
            classes: self.classes.len(),
            contexts: self.contexts.len(),
            generation: self.generation,
        }
    }

    pub(crate) fn class_symbol(&self, class_id: Option<ClassId>) -> Option<&str> {
        class_id
            .and_then(|id| self.classes.get(id))
            .map(|row| row.key.symbol.as_str())
    }

    pub(crate) fn context_string(&self, id: ContextId) -> StoreResult<&str> {
        self.contexts
            .get(id)
            .map(|row| row.key.as_str())
            .ok_or_else(|| StoreError::reference(EntityKind::Context, id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{LinkInput, TopicInput};

    #[test]
    fn test_new_store_is_empty() {
        let store = SymbolStore::new(StoreConfig::in_memory());
        assert_eq!(store.stats(), StoreStats::default());
        assert!(!store.is_poisoned());
        assert!(store.changes().is_empty());
    }

    #[test]
    fn test_find_by_ending_respects_case_rules() {
        let config = StoreConfig::in_memory().with_language(2, "SQL", false);
        let mut store = SymbolStore::new(config);
        store.add_file(1).unwrap();
        let cs = store.add_topic(1, TopicInput::new("Bar", "Foo.Bar", 1)).unwrap();
        let ci = store.add_topic(1, TopicInput::new("bar", "Db.BAR", 2)).unwrap();

        let exact: Vec<_> = store.find_topics_by_ending_symbol("Bar").map(|t| t.id).collect();
        assert_eq!(exact, vec![cs, ci]);
        let lower: Vec<_> = store.find_topics_by_ending_symbol("bar").map(|t| t.id).collect();
        assert_eq!(lower, vec![ci]);

        let link = store
            .add_link(1, LinkInput::reference("Bars", Context::global(), 1))
            .unwrap();
        let found: Vec<_> = store.find_links_by_ending_symbol("Bar").map(|l| l.id).collect();
        assert_eq!(found, vec![link]);
    }

    #[test]
    fn test_generation_advances_on_mutation() {
        let mut store = SymbolStore::new(StoreConfig::in_memory());
        let before = store.generation();
        store.add_file(1).unwrap();
        assert!(store.generation() > before);
        let failed = store.add_topic(9, TopicInput::new("x", "x", 1));
        assert!(failed.is_err());
        assert_eq!(store.generation(), before + 1);
    }
}
