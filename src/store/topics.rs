//! Topic operations
//!
//! A topic is identified by `(class, symbol, symbol_definition_number)`
//! across the whole project. Re-scanning a file diffs its new topic list
//! against the stored one by that key, so unchanged topics keep their IDs
//! and the links resolved to them stay valid.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::error::{EntityKind, StoreError, StoreResult};
use crate::ids::{FileId, TopicId};
use crate::schema::{ClassInput, ClassKey, Topic, TopicInput, UNRESOLVED_SCORE};
use crate::store::SymbolStore;
use crate::symbols::{ending_symbol, fold_ending, normalize_symbol};

/// Global identity of a topic.
///
/// Uses the class key rather than the class ID so new topics can be
/// checked before their class is interned; live class keys and IDs map
/// one to one.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub(crate) struct TopicKey {
    pub class: Option<ClassKey>,
    pub symbol: String,
    pub definition_number: u32,
}

impl TopicKey {
    pub fn of_input(input: &TopicInput) -> Self {
        Self {
            class: input.class.as_ref().map(ClassInput::key),
            symbol: normalize_symbol(&input.symbol),
            definition_number: input.symbol_definition_number.max(1),
        }
    }

    fn describe(&self) -> String {
        match &self.class {
            Some(class) => format!(
                "{} #{} in class {}",
                self.symbol, self.definition_number, class.symbol
            ),
            None => format!("{} #{}", self.symbol, self.definition_number),
        }
    }
}

/// An input the batch merge skipped.
#[derive(Debug)]
pub struct Rejected {
    /// Position of the input in the batch
    pub index: usize,
    pub error: StoreError,
}

/// Outcome of [`SymbolStore::update_file_topics`].
#[derive(Debug, Default)]
pub struct TopicChanges {
    pub added: Vec<TopicId>,
    pub removed: Vec<TopicId>,
    /// Kept their ID but some content changed
    pub modified: Vec<TopicId>,
    pub unchanged: usize,
    pub rejected: Vec<Rejected>,
}

impl TopicChanges {
    /// True when the merge changed nothing.
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty() && self.modified.is_empty()
    }

    /// Added, removed and modified IDs together, ascending.
    pub fn changed_ids(&self) -> Vec<TopicId> {
        let mut ids: Vec<TopicId> = self
            .added
            .iter()
            .chain(&self.removed)
            .chain(&self.modified)
            .copied()
            .collect();
        ids.sort_unstable();
        ids.dedup();
        ids
    }
}

/// A validated input, ready to be written.
struct PreparedTopic {
    key: TopicKey,
    input: TopicInput,
    ending_symbol: String,
    prototype_context: String,
    body_context: String,
}

impl SymbolStore {
    /// Add one topic to a registered file.
    ///
    /// # Errors
    /// - `Reference` if the file is not registered
    /// - `Duplicate` if a topic with the same class, symbol and definition
    ///   number exists anywhere in the store
    pub fn add_topic(&mut self, file_id: FileId, topic: TopicInput) -> StoreResult<TopicId> {
        self.ensure_writable()?;
        self.require_file(file_id)?;
        let prepared = self.prepare_topic(topic)?;
        if self.topic_keys.contains_key(&prepared.key) {
            return Err(StoreError::duplicate(
                EntityKind::Topic,
                prepared.key.describe(),
            ));
        }
        let result = self
            .insert_topic(file_id, prepared)
            .map_err(StoreError::escalate);
        self.finish(result)
    }

    /// Remove one topic. Links that targeted it become unresolved and are
    /// queued for re-resolution.
    pub fn remove_topic(&mut self, id: TopicId) -> StoreResult<()> {
        self.ensure_writable()?;
        if !self.topics.contains_key(&id) {
            return Err(StoreError::reference(EntityKind::Topic, id));
        }
        let result = self
            .detach_topic(id)
            .map(|_| ())
            .map_err(StoreError::escalate);
        self.finish(result)
    }

    /// Replace the topics of `file_id` with `topics`.
    ///
    /// Topics present before and after keep their ID and are refreshed in
    /// place; the rest are added or removed. An input whose key repeats an
    /// earlier input, or belongs to a topic of another file, is skipped and
    /// reported in [`TopicChanges::rejected`]; the remaining inputs are
    /// still applied.
    ///
    /// # Errors
    /// `Reference` if the file is not registered. Context serialization
    /// errors abort the whole update before anything is written.
    pub fn update_file_topics(
        &mut self,
        file_id: FileId,
        topics: Vec<TopicInput>,
    ) -> StoreResult<TopicChanges> {
        self.ensure_writable()?;
        self.require_file(file_id)?;
        let result = self.merge_file_topics(file_id, topics);
        self.finish(result)
    }

    /// Remove the topics of `file_id` whose key is absent from `topics`.
    ///
    /// The batch pipeline runs this for every file before merging any of
    /// them, so a topic that moved between two files in the same batch is
    /// freed before its new owner claims the key.
    pub fn remove_stale_topics(
        &mut self,
        file_id: FileId,
        topics: &[TopicInput],
    ) -> StoreResult<Vec<TopicId>> {
        self.ensure_writable()?;
        self.require_file(file_id)?;
        let keep: HashSet<TopicKey> = topics.iter().map(TopicKey::of_input).collect();
        let result = self
            .stale_topics(file_id, &keep)
            .and_then(|stale| {
                for &id in &stale {
                    self.detach_topic(id)?;
                }
                Ok(stale)
            })
            .map_err(StoreError::escalate);
        self.finish(result)
    }

    fn merge_file_topics(
        &mut self,
        file_id: FileId,
        topics: Vec<TopicInput>,
    ) -> StoreResult<TopicChanges> {
        let mut changes = TopicChanges::default();
        let mut planned: HashSet<TopicKey> = HashSet::new();
        let mut plan: Vec<PreparedTopic> = Vec::new();

        for (index, input) in topics.into_iter().enumerate() {
            let prepared = self.prepare_topic(input)?;
            let owned_elsewhere = self
                .topic_keys
                .get(&prepared.key)
                .and_then(|id| self.topics.get(id))
                .is_some_and(|owner| owner.file_id != file_id);

            if owned_elsewhere || planned.contains(&prepared.key) {
                changes.rejected.push(Rejected {
                    index,
                    error: StoreError::duplicate(EntityKind::Topic, prepared.key.describe()),
                });
                continue;
            }
            planned.insert(prepared.key.clone());
            plan.push(prepared);
        }

        self.apply_topic_plan(file_id, &planned, plan, &mut changes)
            .map_err(StoreError::escalate)?;

        for rejected in &changes.rejected {
            tracing::warn!(file_id, index = rejected.index, error = %rejected.error, "topic rejected");
        }
        tracing::debug!(
            file_id,
            added = changes.added.len(),
            removed = changes.removed.len(),
            modified = changes.modified.len(),
            unchanged = changes.unchanged,
            "merged file topics"
        );
        Ok(changes)
    }

    fn apply_topic_plan(
        &mut self,
        file_id: FileId,
        planned: &HashSet<TopicKey>,
        plan: Vec<PreparedTopic>,
        changes: &mut TopicChanges,
    ) -> StoreResult<()> {
        for id in self.stale_topics(file_id, planned)? {
            self.detach_topic(id)?;
            changes.removed.push(id);
        }

        for prepared in plan {
            match self.topic_keys.get(&prepared.key).copied() {
                Some(id) => {
                    if self.refresh_topic(id, prepared)? {
                        changes.modified.push(id);
                    } else {
                        changes.unchanged += 1;
                    }
                }
                None => changes.added.push(self.insert_topic(file_id, prepared)?),
            }
        }
        Ok(())
    }

    /// Topics of `file_id` whose key is not in `keep`, ascending.
    fn stale_topics(&self, file_id: FileId, keep: &HashSet<TopicKey>) -> StoreResult<Vec<TopicId>> {
        let mut stale = Vec::new();
        for (_, id) in self.topics_by_file.get(&file_id) {
            let topic = self
                .topics
                .get(&id)
                .ok_or_else(|| StoreError::reference(EntityKind::Topic, id))?;
            if !keep.contains(&self.topic_key(topic)?) {
                stale.push(id);
            }
        }
        stale.sort_unstable();
        Ok(stale)
    }

    fn prepare_topic(&self, mut input: TopicInput) -> StoreResult<PreparedTopic> {
        let key = TopicKey::of_input(&input);
        input.symbol = key.symbol.clone();
        input.symbol_definition_number = key.definition_number;
        input.class = input
            .class
            .map(|class| ClassInput::new(class.hierarchy, class.language_id, &class.symbol));
        input.prototype_context = input.prototype_context.canonicalized();
        input.body_context = input.body_context.canonicalized();

        let ending_symbol = ending_symbol(&input.symbol, self.is_case_sensitive(input.language_id));
        let prototype_context = input.prototype_context.to_context_string()?;
        let body_context = input.body_context.to_context_string()?;

        Ok(PreparedTopic {
            key,
            input,
            ending_symbol,
            prototype_context,
            body_context,
        })
    }

    fn insert_topic(&mut self, file_id: FileId, prepared: PreparedTopic) -> StoreResult<TopicId> {
        let PreparedTopic {
            key,
            input,
            ending_symbol,
            prototype_context,
            body_context,
        } = prepared;

        let class_id = match &input.class {
            Some(class) => Some(self.classes.acquire(class.key(), || class.language_id)?.id),
            None => None,
        };
        let prototype_context_id = self
            .contexts
            .acquire(prototype_context, || input.prototype_context.clone())?
            .id;
        let body_context_id = self
            .contexts
            .acquire(body_context, || input.body_context.clone())?
            .id;
        let id = self
            .used_topic_ids
            .allocate()
            .ok_or_else(|| StoreError::Consistency("topic ID space exhausted".to_string()))?;

        let topic = Topic {
            id,
            title: input.title,
            body: input.body,
            summary: input.summary,
            prototype: input.prototype,
            symbol: input.symbol,
            symbol_definition_number: input.symbol_definition_number,
            class_id,
            is_embedded: input.is_embedded,
            ending_symbol,
            comment_type: input.comment_type,
            access_level: input.access_level,
            tags: input.tags,
            file_id,
            comment_line_number: input.comment_line_number,
            code_line_number: input.code_line_number,
            language_id: input.language_id,
            prototype_context_id,
            body_context_id,
        };

        self.index_topic(&topic);
        self.topic_keys.insert(key, id);
        self.changes.note_topic_added(id, &topic.ending_symbol);
        self.topics.insert(id, topic);
        Ok(id)
    }

    /// Overwrite the content of a kept topic. Returns whether anything
    /// changed.
    fn refresh_topic(&mut self, id: TopicId, prepared: PreparedTopic) -> StoreResult<bool> {
        let current = self
            .topics
            .get(&id)
            .cloned()
            .ok_or_else(|| StoreError::reference(EntityKind::Topic, id))?;
        let PreparedTopic {
            input,
            ending_symbol,
            prototype_context,
            body_context,
            ..
        } = prepared;

        let prototype_changed = self.context_string(current.prototype_context_id)? != prototype_context;
        let body_changed = self.context_string(current.body_context_id)? != body_context;

        let mut next = Topic {
            id,
            title: input.title,
            body: input.body,
            summary: input.summary,
            prototype: input.prototype,
            symbol: input.symbol,
            symbol_definition_number: input.symbol_definition_number,
            class_id: current.class_id,
            is_embedded: input.is_embedded,
            ending_symbol,
            comment_type: input.comment_type,
            access_level: input.access_level,
            tags: input.tags,
            file_id: current.file_id,
            comment_line_number: input.comment_line_number,
            code_line_number: input.code_line_number,
            language_id: input.language_id,
            prototype_context_id: current.prototype_context_id,
            body_context_id: current.body_context_id,
        };

        if next == current && !prototype_changed && !body_changed {
            return Ok(false);
        }

        if prototype_changed {
            let context = input.prototype_context;
            next.prototype_context_id = self.contexts.acquire(prototype_context, || context)?.id;
            self.contexts.release(current.prototype_context_id)?;
        }
        if body_changed {
            let context = input.body_context;
            next.body_context_id = self.contexts.acquire(body_context, || context)?.id;
            self.contexts.release(current.body_context_id)?;
        }

        if next.language_id != current.language_id || next.ending_symbol != current.ending_symbol {
            self.changes.note_topic_modified(id, &current.ending_symbol);
            self.changes.note_topic_modified(id, &next.ending_symbol);
        }

        self.unindex_topic(&current);
        self.index_topic(&next);
        self.topics.insert(id, next);
        Ok(true)
    }

    /// Delete a topic and everything that hangs off it.
    pub(crate) fn detach_topic(&mut self, id: TopicId) -> StoreResult<Topic> {
        let key = {
            let topic = self
                .topics
                .get(&id)
                .ok_or_else(|| StoreError::reference(EntityKind::Topic, id))?;
            self.topic_key(topic)?
        };
        let topic = self
            .topics
            .remove(&id)
            .ok_or_else(|| StoreError::reference(EntityKind::Topic, id))?;

        self.unindex_topic(&topic);
        self.topic_keys.remove(&key);
        if let Some(class_id) = topic.class_id {
            self.classes.release(class_id)?;
        }
        self.contexts.release(topic.prototype_context_id)?;
        self.contexts.release(topic.body_context_id)?;
        if !self.used_topic_ids.remove(id) {
            return Err(StoreError::Consistency(format!(
                "topic {} was live but not in the used ID set",
                id
            )));
        }

        for link_id in self.links_by_target.take(&id) {
            if let Some(link) = self.links.get_mut(&link_id) {
                link.target_topic_id = None;
                link.target_score = UNRESOLVED_SCORE;
            }
            self.changes.note_link_changed(link_id);
        }
        self.changes.note_topic_removed(id, &topic.ending_symbol);
        Ok(topic)
    }

    pub(crate) fn topic_key(&self, topic: &Topic) -> StoreResult<TopicKey> {
        let class = match topic.class_id {
            Some(class_id) => Some(
                self.classes
                    .get(class_id)
                    .map(|row| row.key.clone())
                    .ok_or_else(|| {
                        StoreError::Consistency(format!(
                            "topic {} points at missing class {}",
                            topic.id, class_id
                        ))
                    })?,
            ),
            None => None,
        };
        Ok(TopicKey {
            class,
            symbol: topic.symbol.clone(),
            definition_number: topic.symbol_definition_number,
        })
    }

    pub(crate) fn index_topic(&mut self, topic: &Topic) {
        if !topic.ending_symbol.is_empty() {
            self.topics_by_ending
                .insert(fold_ending(&topic.ending_symbol), topic.id);
        }
        self.topics_by_file
            .insert(topic.file_id, (topic.comment_line_number, topic.id));
        if let Some(class_id) = topic.class_id {
            self.topics_by_class.insert(class_id, topic.id);
        }
    }

    fn unindex_topic(&mut self, topic: &Topic) {
        if !topic.ending_symbol.is_empty() {
            self.topics_by_ending
                .remove(fold_ending(&topic.ending_symbol).as_str(), &topic.id);
        }
        self.topics_by_file
            .remove(&topic.file_id, &(topic.comment_line_number, topic.id));
        if let Some(class_id) = topic.class_id {
            self.topics_by_class.remove(&class_id, &topic.id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StoreConfig;
    use crate::resolver::LinkResolver;
    use crate::schema::{Hierarchy, LinkInput};
    use crate::symbols::Context;

    fn store_with_file(file_id: FileId) -> SymbolStore {
        let mut store = SymbolStore::new(StoreConfig::in_memory());
        store.add_file(file_id).unwrap();
        store
    }

    fn widget_class() -> ClassInput {
        ClassInput::new(Hierarchy::Class, 1, "Widget")
    }

    #[test]
    fn test_add_topic_derives_ending_symbol() {
        let mut store = store_with_file(1);
        let id = store.add_topic(1, TopicInput::new("Bar", "Foo::Bar", 1)).unwrap();
        let topic = store.topic(id).unwrap();
        assert_eq!(topic.symbol, "Foo.Bar");
        assert_eq!(topic.ending_symbol, "Bar");
        assert_eq!(topic.symbol_definition_number, 1);
    }

    #[test]
    fn test_duplicate_topic_leaves_store_unchanged() {
        let mut store = store_with_file(1);
        store.add_topic(1, TopicInput::new("Bar", "Foo.Bar", 1)).unwrap();
        let before = store.stats();

        let err = store.add_topic(1, TopicInput::new("Bar again", "Foo.Bar", 1)).unwrap_err();
        assert!(matches!(err, StoreError::Duplicate { kind: EntityKind::Topic, .. }));
        assert_eq!(store.stats(), before);
        assert_eq!(store.context(1).unwrap().reference_count, 2);

        store
            .add_topic(1, TopicInput::new("Overload", "Foo.Bar", 1).with_definition_number(2))
            .unwrap();
    }

    #[test]
    fn test_update_twice_reports_nothing_the_second_time() {
        let mut store = store_with_file(1);
        let batch = vec![
            TopicInput::new("A", "Foo.A", 1).with_lines(3, 4),
            TopicInput::new("B", "Foo.B", 1).with_lines(10, 11),
        ];
        let first = store.update_file_topics(1, batch.clone()).unwrap();
        assert_eq!(first.added, vec![1, 2]);

        let second = store.update_file_topics(1, batch).unwrap();
        assert!(second.is_empty());
        assert_eq!(second.unchanged, 2);
        assert!(store.changes().topic_ids().eq([1, 2]));
    }

    #[test]
    fn test_update_refreshes_content_in_place() {
        let mut store = store_with_file(1);
        store
            .update_file_topics(1, vec![TopicInput::new("A", "Foo.A", 1).with_body("old")])
            .unwrap();
        store.take_changes();

        let changes = store
            .update_file_topics(
                1,
                vec![TopicInput::new("A", "Foo.A", 1).with_body("new").with_lines(7, 8)],
            )
            .unwrap();
        assert_eq!(changes.modified, vec![1]);
        let topic = store.topic(1).unwrap();
        assert_eq!(topic.body.as_deref(), Some("new"));
        assert_eq!(topic.comment_line_number, 7);
        // Body edits do not affect resolution.
        assert!(store.changes().is_empty());
    }

    #[test]
    fn test_language_change_renotes_both_ending_symbols() {
        let config = StoreConfig::in_memory().with_language(2, "SQL", false);
        let mut store = SymbolStore::new(config);
        store.add_file(1).unwrap();
        store
            .update_file_topics(1, vec![TopicInput::new("Customers", "Customers", 1)])
            .unwrap();
        let link = store
            .add_link(1, LinkInput::reference("customers", Context::global(), 1))
            .unwrap();
        let resolver = LinkResolver::default();
        resolver.resolve_pending(&mut store).unwrap();
        assert_eq!(store.link(link).unwrap().target_topic_id, None);

        let changes = store
            .update_file_topics(1, vec![TopicInput::new("Customers", "Customers", 2)])
            .unwrap();
        assert_eq!(changes.modified, vec![1]);
        assert_eq!(store.topic(1).unwrap().ending_symbol, "customers");
        assert_eq!(store.changes().endings_of(1).collect::<Vec<_>>(), vec!["customers"]);

        let report = resolver.resolve_pending(&mut store).unwrap();
        assert_eq!(report.examined, 1);
        assert_eq!(store.link(link).unwrap().target_topic_id, Some(1));
    }

    #[test]
    fn test_update_removes_then_adds_with_lowest_free_id() {
        let mut store = store_with_file(1);
        store
            .update_file_topics(
                1,
                vec![
                    TopicInput::new("A", "A", 1),
                    TopicInput::new("B", "B", 1),
                    TopicInput::new("C", "C", 1),
                ],
            )
            .unwrap();

        let changes = store
            .update_file_topics(
                1,
                vec![
                    TopicInput::new("A", "A", 1),
                    TopicInput::new("C", "C", 1),
                    TopicInput::new("D", "D", 1),
                ],
            )
            .unwrap();
        assert_eq!(changes.removed, vec![2]);
        assert_eq!(changes.added, vec![2]);
        assert_eq!(store.topic(2).unwrap().symbol, "D");
    }

    #[test]
    fn test_batch_duplicates_are_rejected_individually() {
        let mut store = store_with_file(1);
        store.add_file(2).unwrap();
        store.add_topic(2, TopicInput::new("Owned", "Owned", 1)).unwrap();

        let changes = store
            .update_file_topics(
                1,
                vec![
                    TopicInput::new("X", "X", 1),
                    TopicInput::new("X again", "X", 1),
                    TopicInput::new("Owned", "Owned", 1),
                    TopicInput::new("Y", "Y", 1),
                ],
            )
            .unwrap();
        let rejected: Vec<usize> = changes.rejected.iter().map(|r| r.index).collect();
        assert_eq!(rejected, vec![1, 2]);
        assert_eq!(changes.added.len(), 2);
        assert_eq!(store.topics_in_file(1).count(), 2);
    }

    #[test]
    fn test_class_reference_counts() {
        let mut store = store_with_file(1);
        let a = store
            .add_topic(1, TopicInput::new("a", "Widget.a", 1).with_class(widget_class()))
            .unwrap();
        let b = store
            .add_topic(1, TopicInput::new("b", "Widget.b", 1).with_class(widget_class()))
            .unwrap();
        let class_id = store.topic(a).unwrap().class_id.unwrap();
        assert_eq!(store.class(class_id).unwrap().reference_count, 2);
        assert_eq!(store.topics_in_class(class_id).count(), 2);

        store.remove_topic(a).unwrap();
        assert_eq!(store.class(class_id).unwrap().reference_count, 1);
        store.remove_topic(b).unwrap();
        assert!(store.class(class_id).is_none());
        assert!(store.used_class_ids().is_empty());
    }

    #[test]
    fn test_context_change_moves_reference() {
        let mut store = store_with_file(1);
        store
            .update_file_topics(1, vec![TopicInput::new("A", "A", 1)])
            .unwrap();
        let global = store.context_id_of("").unwrap();
        assert_eq!(store.context(global).unwrap().reference_count, 2);

        store
            .update_file_topics(
                1,
                vec![TopicInput::new("A", "A", 1).with_contexts(Context::scoped("Foo"), Context::global())],
            )
            .unwrap();
        assert_eq!(store.context(global).unwrap().reference_count, 1);
        let scoped = store.topic(1).unwrap().prototype_context_id;
        assert_eq!(store.context_value(scoped).unwrap().scope_symbol(), "Foo");
    }

    #[test]
    fn test_remove_stale_topics_frees_key_for_other_file() {
        let mut store = store_with_file(1);
        store.add_file(2).unwrap();
        store.update_file_topics(1, vec![TopicInput::new("M", "Moved", 1)]).unwrap();

        let stale = store.remove_stale_topics(1, &[]).unwrap();
        assert_eq!(stale, vec![1]);
        let changes = store
            .update_file_topics(2, vec![TopicInput::new("M", "Moved", 1)])
            .unwrap();
        assert!(changes.rejected.is_empty());
        assert_eq!(store.topic(1).unwrap().file_id, 2);
    }

    #[test]
    fn test_remove_unknown_topic() {
        let mut store = store_with_file(1);
        assert!(matches!(
            store.remove_topic(5),
            Err(StoreError::Reference { kind: EntityKind::Topic, id: 5 })
        ));
    }
}
