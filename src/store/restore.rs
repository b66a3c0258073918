//! Rebuilding a store from persisted rows

use crate::config::StoreConfig;
use crate::error::{EntityKind, StoreError, StoreResult};
use crate::ids::{ClassId, ContextId, FileId, LanguageId, NumberSet};
use crate::schema::{ClassKey, Link, Topic};
use crate::store::SymbolStore;
use crate::symbols::Context;
use crate::verify::verify_store;

/// Everything a saved database holds.
#[derive(Debug, Clone, Default)]
pub struct StoreParts {
    pub files: Vec<FileId>,
    pub topics: Vec<Topic>,
    pub links: Vec<Link>,
    /// (id, key, language, reference count)
    pub classes: Vec<(ClassId, ClassKey, LanguageId, u32)>,
    /// (id, context string, reference count)
    pub contexts: Vec<(ContextId, String, u32)>,
    pub used_topic_ids: NumberSet,
    pub used_link_ids: NumberSet,
    pub used_class_ids: NumberSet,
    pub used_context_ids: NumberSet,
    /// Links a cancelled or unfinished resolve pass left behind
    pub pending_link_ids: NumberSet,
}

fn corrupt(kind: EntityKind, reason: impl Into<String>) -> StoreError {
    StoreError::format(format!("persisted {}", kind), reason)
}

impl SymbolStore {
    /// Rebuild the in-memory tables and indexes from saved rows.
    ///
    /// # Errors
    /// `Format` if the rows contradict each other: duplicate keys, ID sets
    /// that do not match the rows, wrong reference counts, dangling IDs or
    /// stale ending symbols. The caller should discard the database.
    pub fn from_parts(config: StoreConfig, parts: StoreParts) -> StoreResult<Self> {
        let mut store = SymbolStore::new(config);

        for (id, key, language_id, count) in parts.classes {
            store.classes.restore(id, key, language_id, count)?;
        }
        for (id, context_string, count) in parts.contexts {
            let context = Context::parse(&context_string)?;
            if context.to_context_string()? != context_string {
                return Err(corrupt(
                    EntityKind::Context,
                    format!("context {} is not in canonical form", id),
                ));
            }
            store.contexts.restore(id, context_string, context, count)?;
        }
        if store.classes.used_ids() != &parts.used_class_ids {
            return Err(corrupt(EntityKind::Class, "used ID set does not match rows"));
        }
        if store.contexts.used_ids() != &parts.used_context_ids {
            return Err(corrupt(EntityKind::Context, "used ID set does not match rows"));
        }

        store.files = parts.files.into_iter().collect();

        for topic in parts.topics {
            let key = store
                .topic_key(&topic)
                .map_err(|e| corrupt(EntityKind::Topic, e.to_string()))?;
            if store.topic_keys.insert(key, topic.id).is_some() {
                return Err(corrupt(
                    EntityKind::Topic,
                    format!("topic {} repeats an existing identity", topic.id),
                ));
            }
            store.index_topic(&topic);
            if let Some(previous) = store.topics.insert(topic.id, topic) {
                return Err(corrupt(
                    EntityKind::Topic,
                    format!("topic {} stored twice", previous.id),
                ));
            }
        }

        for link in parts.links {
            let key = store
                .link_key(&link)
                .map_err(|e| corrupt(EntityKind::Link, e.to_string()))?;
            if store.link_keys.insert(key, link.id).is_some() {
                return Err(corrupt(
                    EntityKind::Link,
                    format!("link {} repeats an existing identity", link.id),
                ));
            }
            store.index_link(&link);
            if let Some(previous) = store.links.insert(link.id, link) {
                return Err(corrupt(
                    EntityKind::Link,
                    format!("link {} stored twice", previous.id),
                ));
            }
        }

        store.used_topic_ids = parts.used_topic_ids;
        store.used_link_ids = parts.used_link_ids;

        if let Some(missing) = parts
            .pending_link_ids
            .iter()
            .find(|id| !store.links.contains_key(id))
        {
            return Err(corrupt(
                EntityKind::Link,
                format!("pending link {} does not exist", missing),
            ));
        }
        store.note_links_pending(parts.pending_link_ids.iter());

        let report = verify_store(&store);
        if !report.is_clean() {
            return Err(StoreError::format("persisted database", report.summary()));
        }
        Ok(store)
    }

    /// The store's rows, ready to be written out.
    pub fn to_parts(&self) -> StoreParts {
        StoreParts {
            files: self.files.iter().copied().collect(),
            topics: self.topics.values().cloned().collect(),
            links: self.links.values().cloned().collect(),
            classes: self
                .classes
                .iter()
                .map(|(id, row)| (id, row.key.clone(), row.payload, row.reference_count))
                .collect(),
            contexts: self
                .contexts
                .iter()
                .map(|(id, row)| (id, row.key.clone(), row.reference_count))
                .collect(),
            used_topic_ids: self.used_topic_ids.clone(),
            used_link_ids: self.used_link_ids.clone(),
            used_class_ids: self.classes.used_ids().clone(),
            used_context_ids: self.contexts.used_ids().clone(),
            pending_link_ids: NumberSet::from_members(self.changes.pending_links(self)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{ClassInput, Hierarchy, LinkInput, TopicInput};

    fn populated() -> SymbolStore {
        let mut store = SymbolStore::new(StoreConfig::in_memory());
        store.add_file(1).unwrap();
        store
            .add_topic(
                1,
                TopicInput::new("Run", "Job.Run", 1)
                    .with_class(ClassInput::new(Hierarchy::Class, 1, "Job"))
                    .with_contexts(Context::scoped("Job"), Context::scoped("Job")),
            )
            .unwrap();
        store
            .add_link(1, LinkInput::reference("Runs", Context::scoped("Job"), 1))
            .unwrap();
        store
    }

    #[test]
    fn test_parts_round_trip() {
        let store = populated();
        let rebuilt = SymbolStore::from_parts(StoreConfig::in_memory(), store.to_parts()).unwrap();
        assert_eq!(rebuilt.stats().topics, 1);
        assert_eq!(rebuilt.topic(1), store.topic(1));
        assert_eq!(rebuilt.link(1), store.link(1));
        assert_eq!(rebuilt.find_links_by_ending_symbol("Run").count(), 1);
        assert_eq!(rebuilt.context(1), store.context(1));
    }

    #[test]
    fn test_pending_links_survive_round_trip() {
        let store = populated();
        let parts = store.to_parts();
        assert_eq!(parts.pending_link_ids.to_string(), "1");

        let rebuilt = SymbolStore::from_parts(StoreConfig::in_memory(), parts).unwrap();
        assert_eq!(rebuilt.changes().link_ids().collect::<Vec<_>>(), vec![1]);
    }

    #[test]
    fn test_pending_link_must_exist() {
        let mut parts = populated().to_parts();
        parts.pending_link_ids.add(9);
        assert!(SymbolStore::from_parts(StoreConfig::in_memory(), parts)
            .unwrap_err()
            .is_format());
    }

    #[test]
    fn test_wrong_reference_count_is_format_error() {
        let mut parts = populated().to_parts();
        parts.contexts[0].2 += 1;
        let err = SymbolStore::from_parts(StoreConfig::in_memory(), parts).unwrap_err();
        assert!(err.is_format());
    }

    #[test]
    fn test_id_set_mismatch_is_format_error() {
        let mut parts = populated().to_parts();
        parts.used_topic_ids.add(7);
        assert!(SymbolStore::from_parts(StoreConfig::in_memory(), parts)
            .unwrap_err()
            .is_format());

        let mut parts = populated().to_parts();
        parts.used_class_ids.clear();
        assert!(SymbolStore::from_parts(StoreConfig::in_memory(), parts)
            .unwrap_err()
            .is_format());
    }

    #[test]
    fn test_dangling_class_is_format_error() {
        let mut parts = populated().to_parts();
        parts.topics[0].class_id = Some(42);
        assert!(SymbolStore::from_parts(StoreConfig::in_memory(), parts)
            .unwrap_err()
            .is_format());
    }
}
