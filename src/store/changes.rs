//! Change tracking between a merge and the following resolve pass
//!
//! The tracker remembers the folded ending symbols of every topic that was
//! added, removed or modified in a resolution-relevant way, plus the links
//! that were added or lost their target. Ending symbols are captured when
//! the change is noted, so a removed topic still identifies the links that
//! may have pointed at it.

use std::collections::{BTreeMap, BTreeSet};

use crate::ids::{LinkId, TopicId};
use crate::store::SymbolStore;
use crate::symbols::fold_ending;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChangeTracker {
    topics: BTreeMap<TopicId, BTreeSet<String>>,
    links: BTreeSet<LinkId>,
}

impl ChangeTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn note_topic_added(&mut self, id: TopicId, ending_symbol: &str) {
        self.note_topic(id, ending_symbol);
    }

    pub fn note_topic_removed(&mut self, id: TopicId, ending_symbol: &str) {
        self.note_topic(id, ending_symbol);
    }

    pub fn note_topic_modified(&mut self, id: TopicId, ending_symbol: &str) {
        self.note_topic(id, ending_symbol);
    }

    /// A link was added, or its target was taken away.
    pub fn note_link_changed(&mut self, id: LinkId) {
        self.links.insert(id);
    }

    fn note_topic(&mut self, id: TopicId, ending_symbol: &str) {
        if ending_symbol.is_empty() {
            return;
        }
        self.topics
            .entry(id)
            .or_default()
            .insert(fold_ending(ending_symbol));
    }

    pub fn topic_ids(&self) -> impl Iterator<Item = TopicId> + '_ {
        self.topics.keys().copied()
    }

    pub fn link_ids(&self) -> impl Iterator<Item = LinkId> + '_ {
        self.links.iter().copied()
    }

    /// Folded ending symbols recorded for `id`, including past ones.
    pub fn endings_of(&self, id: TopicId) -> impl Iterator<Item = &str> + '_ {
        self.topics
            .get(&id)
            .into_iter()
            .flat_map(|endings| endings.iter().map(String::as_str))
    }

    pub fn ending_symbols(&self) -> BTreeSet<&str> {
        self.topics
            .values()
            .flat_map(|endings| endings.iter().map(String::as_str))
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.topics.is_empty() && self.links.is_empty()
    }

    pub fn clear(&mut self) {
        self.topics.clear();
        self.links.clear();
    }

    /// Every live link the next resolve pass must look at.
    ///
    /// That is each link whose ending symbol or alternates meet a tracked
    /// ending symbol, plus each tracked link that still exists.
    pub fn pending_links(&self, store: &SymbolStore) -> BTreeSet<LinkId> {
        let mut affected: BTreeSet<LinkId> = self
            .ending_symbols()
            .into_iter()
            .flat_map(|ending| store.links_by_ending.get(ending))
            .collect();
        affected.extend(self.links.iter().copied().filter(|id| store.links.contains_key(id)));
        affected
    }

    /// [`pending_links`](Self::pending_links), then forget everything.
    pub fn affected_links(&mut self, store: &SymbolStore) -> BTreeSet<LinkId> {
        let affected = self.pending_links(store);
        self.clear();
        affected
    }
}
