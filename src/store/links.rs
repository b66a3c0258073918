//! Link operations
//!
//! Links are identified by `(file, context, type, language, text)`. The
//! target fields are written only by the resolver through
//! [`SymbolStore::set_link_target`]; merges never touch them, so a link
//! that survives a re-scan keeps its resolution.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use serde::{Deserialize, Serialize};

use crate::error::{EntityKind, StoreError, StoreResult};
use crate::ids::{FileId, LanguageId, LinkId, TopicId};
use crate::resolver::interpret::interpretations;
use crate::schema::{Link, LinkInput, LinkType, UNRESOLVED_SCORE};
use crate::store::SymbolStore;
use crate::symbols::{ending_symbol, fold_ending};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub(crate) struct LinkKey {
    pub file_id: FileId,
    pub context: String,
    pub link_type: LinkType,
    pub language_id: LanguageId,
    pub text: String,
}

impl LinkKey {
    fn describe(&self) -> String {
        format!(
            "{:?} {:?} in file {} context {:?}",
            self.link_type, self.text, self.file_id, self.context
        )
    }
}

/// Outcome of [`SymbolStore::update_file_links`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkChanges {
    pub added: Vec<LinkId>,
    pub removed: Vec<LinkId>,
    /// Present before and after; resolution untouched
    pub kept: Vec<LinkId>,
    /// How many times each link of the batch occurred in it
    pub occurrences: BTreeMap<LinkId, u32>,
}

impl LinkChanges {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty()
    }
}

struct PreparedLink {
    key: LinkKey,
    input: LinkInput,
    ending_symbol: String,
    alternates: Vec<String>,
}

impl SymbolStore {
    /// Add one link to a registered file. The link starts unresolved and
    /// is queued for the next resolve pass.
    ///
    /// # Errors
    /// - `Reference` if the file is not registered
    /// - `Duplicate` if the file already has this link in this context
    pub fn add_link(&mut self, file_id: FileId, link: LinkInput) -> StoreResult<LinkId> {
        self.ensure_writable()?;
        self.require_file(file_id)?;
        let prepared = self.prepare_link(file_id, link)?;
        if self.link_keys.contains_key(&prepared.key) {
            return Err(StoreError::duplicate(EntityKind::Link, prepared.key.describe()));
        }
        let result = self.insert_link(prepared).map_err(StoreError::escalate);
        self.finish(result)
    }

    pub fn remove_link(&mut self, id: LinkId) -> StoreResult<()> {
        self.ensure_writable()?;
        if !self.links.contains_key(&id) {
            return Err(StoreError::reference(EntityKind::Link, id));
        }
        let result = self
            .detach_link(id)
            .map(|_| ())
            .map_err(StoreError::escalate);
        self.finish(result)
    }

    /// Replace the links of `file_id` with `links`.
    ///
    /// Repeated identical links collapse into one row; the repeat count is
    /// reported in [`LinkChanges::occurrences`].
    pub fn update_file_links(
        &mut self,
        file_id: FileId,
        links: Vec<LinkInput>,
    ) -> StoreResult<LinkChanges> {
        self.ensure_writable()?;
        self.require_file(file_id)?;
        let result = self.merge_file_links(file_id, links);
        self.finish(result)
    }

    fn merge_file_links(&mut self, file_id: FileId, links: Vec<LinkInput>) -> StoreResult<LinkChanges> {
        let mut plan: Vec<(PreparedLink, u32)> = Vec::new();
        let mut positions: HashMap<LinkKey, usize> = HashMap::new();
        for input in links {
            let prepared = self.prepare_link(file_id, input)?;
            match positions.get(&prepared.key) {
                Some(&at) => plan[at].1 += 1,
                None => {
                    positions.insert(prepared.key.clone(), plan.len());
                    plan.push((prepared, 1));
                }
            }
        }

        let mut changes = LinkChanges::default();
        self.apply_link_plan(file_id, &positions, plan, &mut changes)
            .map_err(StoreError::escalate)?;

        tracing::debug!(
            file_id,
            added = changes.added.len(),
            removed = changes.removed.len(),
            kept = changes.kept.len(),
            "merged file links"
        );
        Ok(changes)
    }

    fn apply_link_plan(
        &mut self,
        file_id: FileId,
        planned: &HashMap<LinkKey, usize>,
        plan: Vec<(PreparedLink, u32)>,
        changes: &mut LinkChanges,
    ) -> StoreResult<()> {
        let mut stale = Vec::new();
        for id in self.links_by_file.get(&file_id) {
            let link = self
                .links
                .get(&id)
                .ok_or_else(|| StoreError::reference(EntityKind::Link, id))?;
            if !planned.contains_key(&self.link_key(link)?) {
                stale.push(id);
            }
        }
        for id in stale {
            self.detach_link(id)?;
            changes.removed.push(id);
        }

        for (prepared, count) in plan {
            let id = match self.link_keys.get(&prepared.key).copied() {
                Some(id) => {
                    changes.kept.push(id);
                    id
                }
                None => {
                    let id = self.insert_link(prepared)?;
                    changes.added.push(id);
                    id
                }
            };
            changes.occurrences.insert(id, count);
        }
        Ok(())
    }

    /// Store a resolution. Returns whether the target changed.
    ///
    /// # Errors
    /// `Reference` if the link or the target topic does not exist.
    pub(crate) fn set_link_target(
        &mut self,
        link_id: LinkId,
        target: Option<TopicId>,
        score: i64,
    ) -> StoreResult<bool> {
        self.ensure_writable()?;
        if let Some(topic_id) = target {
            if !self.topics.contains_key(&topic_id) {
                return Err(StoreError::reference(EntityKind::Topic, topic_id));
            }
        }
        let link = self
            .links
            .get_mut(&link_id)
            .ok_or_else(|| StoreError::reference(EntityKind::Link, link_id))?;

        let score = if target.is_some() { score } else { UNRESOLVED_SCORE };
        if link.target_topic_id == target && link.target_score == score {
            return Ok(false);
        }
        let previous = link.target_topic_id;
        link.target_topic_id = target;
        link.target_score = score;

        if let Some(old) = previous {
            self.links_by_target.remove(&old, &link_id);
        }
        if let Some(new) = target {
            self.links_by_target.insert(new, link_id);
        }
        self.generation += 1;
        Ok(previous != target)
    }

    fn prepare_link(&self, file_id: FileId, mut input: LinkInput) -> StoreResult<PreparedLink> {
        input.context = input.context.canonicalized();
        let context = input.context.to_context_string()?;

        let (primary, alternates) =
            self.link_endings(&input.text_or_symbol, input.link_type, input.language_id);

        Ok(PreparedLink {
            key: LinkKey {
                file_id,
                context,
                link_type: input.link_type,
                language_id: input.language_id,
                text: input.text_or_symbol.clone(),
            },
            input,
            ending_symbol: primary,
            alternates,
        })
    }

    /// Primary ending symbol of a link and its sorted alternates.
    pub(crate) fn link_endings(
        &self,
        text: &str,
        link_type: LinkType,
        language_id: LanguageId,
    ) -> (String, Vec<String>) {
        let case_sensitive = self.is_case_sensitive(language_id);
        let mut endings = interpretations(text, link_type)
            .into_iter()
            .map(|interpretation| ending_symbol(&interpretation.text, case_sensitive));
        let primary = endings.next().unwrap_or_default();
        let alternates: BTreeSet<String> = endings.filter(|e| *e != primary).collect();
        (primary, alternates.into_iter().collect())
    }

    fn insert_link(&mut self, prepared: PreparedLink) -> StoreResult<LinkId> {
        let PreparedLink {
            key,
            input,
            ending_symbol,
            alternates,
        } = prepared;

        let context_id = self
            .contexts
            .acquire(key.context.clone(), || input.context.clone())?
            .id;
        let id = self
            .used_link_ids
            .allocate()
            .ok_or_else(|| StoreError::Consistency("link ID space exhausted".to_string()))?;

        let link = Link {
            id,
            link_type: input.link_type,
            text_or_symbol: input.text_or_symbol,
            context_id,
            file_id: key.file_id,
            language_id: input.language_id,
            ending_symbol,
            alternate_ending_symbols: alternates,
            target_topic_id: None,
            target_score: UNRESOLVED_SCORE,
        };

        self.index_link(&link);
        self.link_keys.insert(key, id);
        self.changes.note_link_changed(id);
        self.links.insert(id, link);
        Ok(id)
    }

    pub(crate) fn detach_link(&mut self, id: LinkId) -> StoreResult<Link> {
        let key = {
            let link = self
                .links
                .get(&id)
                .ok_or_else(|| StoreError::reference(EntityKind::Link, id))?;
            self.link_key(link)?
        };
        let link = self
            .links
            .remove(&id)
            .ok_or_else(|| StoreError::reference(EntityKind::Link, id))?;

        self.unindex_link(&link);
        self.link_keys.remove(&key);
        self.contexts.release(link.context_id)?;
        if !self.used_link_ids.remove(id) {
            return Err(StoreError::Consistency(format!(
                "link {} was live but not in the used ID set",
                id
            )));
        }
        Ok(link)
    }

    pub(crate) fn link_key(&self, link: &Link) -> StoreResult<LinkKey> {
        let context = self
            .contexts
            .get(link.context_id)
            .map(|row| row.key.clone())
            .ok_or_else(|| {
                StoreError::Consistency(format!(
                    "link {} points at missing context {}",
                    link.id, link.context_id
                ))
            })?;
        Ok(LinkKey {
            file_id: link.file_id,
            context,
            link_type: link.link_type,
            language_id: link.language_id,
            text: link.text_or_symbol.clone(),
        })
    }

    fn folded_endings(link: &Link) -> BTreeSet<String> {
        link.all_ending_symbols().map(fold_ending).collect()
    }

    pub(crate) fn index_link(&mut self, link: &Link) {
        for ending in Self::folded_endings(link) {
            self.links_by_ending.insert(ending, link.id);
        }
        self.links_by_file.insert(link.file_id, link.id);
        if let Some(target) = link.target_topic_id {
            self.links_by_target.insert(target, link.id);
        }
    }

    fn unindex_link(&mut self, link: &Link) {
        for ending in Self::folded_endings(link) {
            self.links_by_ending.remove(ending.as_str(), &link.id);
        }
        self.links_by_file.remove(&link.file_id, &link.id);
        if let Some(target) = link.target_topic_id {
            self.links_by_target.remove(&target, &link.id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StoreConfig;
    use crate::schema::TopicInput;
    use crate::symbols::Context;

    fn store_with_file(file_id: FileId) -> SymbolStore {
        let mut store = SymbolStore::new(StoreConfig::in_memory());
        store.add_file(file_id).unwrap();
        store
    }

    #[test]
    fn test_add_link_computes_endings() {
        let mut store = store_with_file(1);
        let id = store
            .add_link(1, LinkInput::reference("Widgets", Context::global(), 1))
            .unwrap();
        let link = store.link(id).unwrap();
        assert_eq!(link.ending_symbol, "Widgets");
        assert_eq!(link.alternate_ending_symbols, vec!["Widget"]);
        assert!(!link.is_resolved());
        assert_eq!(link.target_score, UNRESOLVED_SCORE);
    }

    #[test]
    fn test_url_links_have_no_endings() {
        let mut store = store_with_file(1);
        let id = store
            .add_link(
                1,
                LinkInput::new(LinkType::Url, "https://example.com", Context::global(), 1),
            )
            .unwrap();
        assert_eq!(store.link(id).unwrap().ending_symbol, "");
        assert!(store.links_by_ending.is_empty());
    }

    #[test]
    fn test_duplicate_link_rejected() {
        let mut store = store_with_file(1);
        let link = LinkInput::reference("Bar", Context::scoped("Foo"), 1);
        store.add_link(1, link.clone()).unwrap();
        let before = store.stats();
        assert!(matches!(
            store.add_link(1, link),
            Err(StoreError::Duplicate { kind: EntityKind::Link, .. })
        ));
        assert_eq!(store.stats(), before);
    }

    #[test]
    fn test_batch_counts_occurrences() {
        let mut store = store_with_file(1);
        let bar = LinkInput::reference("Bar", Context::global(), 1);
        let baz = LinkInput::reference("Baz", Context::global(), 1);
        let changes = store
            .update_file_links(1, vec![bar.clone(), baz, bar.clone(), bar])
            .unwrap();
        assert_eq!(changes.added, vec![1, 2]);
        assert_eq!(changes.occurrences.get(&1), Some(&3));
        assert_eq!(changes.occurrences.get(&2), Some(&1));
        assert_eq!(store.context_id_of("").map(|id| store.context(id).unwrap().reference_count), Some(2));
    }

    #[test]
    fn test_kept_link_keeps_resolution() {
        let mut store = store_with_file(1);
        let topic = store.add_topic(1, TopicInput::new("Bar", "Bar", 1)).unwrap();
        let input = LinkInput::reference("Bar", Context::global(), 1);
        let changes = store.update_file_links(1, vec![input.clone()]).unwrap();
        let link = changes.added[0];
        assert!(store.set_link_target(link, Some(topic), 42).unwrap());

        let again = store.update_file_links(1, vec![input]).unwrap();
        assert!(again.is_empty());
        assert_eq!(again.kept, vec![link]);
        assert_eq!(store.link(link).unwrap().target_topic_id, Some(topic));
        assert_eq!(store.links_to_topic(topic).count(), 1);
    }

    #[test]
    fn test_removing_target_unresolves_link() {
        let mut store = store_with_file(1);
        let topic = store.add_topic(1, TopicInput::new("Bar", "Bar", 1)).unwrap();
        let link = store
            .add_link(1, LinkInput::reference("Bar", Context::global(), 1))
            .unwrap();
        store.set_link_target(link, Some(topic), 42).unwrap();
        store.take_changes();

        store.remove_topic(topic).unwrap();
        let link_row = store.link(link).unwrap();
        assert_eq!(link_row.target_topic_id, None);
        assert_eq!(link_row.target_score, UNRESOLVED_SCORE);
        assert!(store.changes().link_ids().eq([link]));
    }

    #[test]
    fn test_set_target_rejects_unknown_topic() {
        let mut store = store_with_file(1);
        let link = store
            .add_link(1, LinkInput::reference("Bar", Context::global(), 1))
            .unwrap();
        assert!(matches!(
            store.set_link_target(link, Some(9), 1),
            Err(StoreError::Reference { kind: EntityKind::Topic, id: 9 })
        ));
        assert!(!store.set_link_target(link, None, 0).unwrap());
    }

    #[test]
    fn test_update_removes_missing_links() {
        let mut store = store_with_file(1);
        store
            .update_file_links(
                1,
                vec![
                    LinkInput::reference("A", Context::global(), 1),
                    LinkInput::reference("B", Context::global(), 1),
                ],
            )
            .unwrap();
        let changes = store
            .update_file_links(1, vec![LinkInput::reference("B", Context::global(), 1)])
            .unwrap();
        assert_eq!(changes.removed, vec![1]);
        assert_eq!(changes.kept, vec![2]);
        assert_eq!(store.used_link_ids().to_string(), "2");
    }
}
