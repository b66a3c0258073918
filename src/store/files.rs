//! File registry
//!
//! Topics and links belong to a registered file. Removing a file drops
//! everything it contributed.

use serde::{Deserialize, Serialize};

use crate::error::{EntityKind, StoreError, StoreResult};
use crate::ids::{FileId, LinkId, TopicId};
use crate::store::SymbolStore;

/// What [`SymbolStore::remove_file`] deleted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRemoval {
    pub file_id: FileId,
    pub topics: Vec<TopicId>,
    pub links: Vec<LinkId>,
}

impl SymbolStore {
    /// Register a file. Returns false if it was already registered.
    ///
    /// # Errors
    /// `Reference` for file ID 0, which is never a valid ID.
    pub fn add_file(&mut self, file_id: FileId) -> StoreResult<bool> {
        self.ensure_writable()?;
        if file_id == 0 {
            return Err(StoreError::reference(EntityKind::File, file_id));
        }
        let added = self.files.insert(file_id);
        if added {
            self.generation += 1;
        }
        Ok(added)
    }

    /// Drop a file with all of its topics and links.
    ///
    /// Links elsewhere that targeted the removed topics are unresolved and
    /// queued for the next resolve pass.
    pub fn remove_file(&mut self, file_id: FileId) -> StoreResult<FileRemoval> {
        self.ensure_writable()?;
        self.require_file(file_id)?;
        let result = self.remove_file_contents(file_id);
        self.finish(result)
    }

    fn remove_file_contents(&mut self, file_id: FileId) -> StoreResult<FileRemoval> {
        let links: Vec<LinkId> = self.links_by_file.get(&file_id).collect();
        for &id in &links {
            self.detach_link(id)?;
        }

        let mut topics: Vec<TopicId> = self.topics_by_file.get(&file_id).map(|(_, id)| id).collect();
        topics.sort_unstable();
        for &id in &topics {
            self.detach_topic(id)?;
        }

        self.files.remove(&file_id);
        tracing::debug!(file_id, topics = topics.len(), links = links.len(), "removed file");
        Ok(FileRemoval {
            file_id,
            topics,
            links,
        })
    }

    pub fn has_file(&self, file_id: FileId) -> bool {
        self.files.contains(&file_id)
    }

    /// Registered files in ascending order.
    pub fn files(&self) -> impl Iterator<Item = FileId> + '_ {
        self.files.iter().copied()
    }

    pub(crate) fn require_file(&self, file_id: FileId) -> StoreResult<()> {
        if self.files.contains(&file_id) {
            Ok(())
        } else {
            Err(StoreError::reference(EntityKind::File, file_id))
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::config::StoreConfig;
    use crate::error::StoreError;
    use crate::schema::{LinkInput, TopicInput};
    use crate::store::SymbolStore;
    use crate::symbols::Context;

    #[test]
    fn test_add_file_is_idempotent() {
        let mut store = SymbolStore::new(StoreConfig::in_memory());
        assert!(store.add_file(4).unwrap());
        assert!(!store.add_file(4).unwrap());
        assert_eq!(store.files().collect::<Vec<_>>(), vec![4]);
        assert!(store.add_file(0).is_err());
    }

    #[test]
    fn test_remove_file_drops_contents_and_frees_ids() {
        let mut store = SymbolStore::new(StoreConfig::in_memory());
        store.add_file(1).unwrap();
        let topic = store.add_topic(1, TopicInput::new("Bar", "Foo.Bar", 1)).unwrap();
        let link = store
            .add_link(1, LinkInput::reference("Bar", Context::scoped("Foo"), 1))
            .unwrap();

        let removal = store.remove_file(1).unwrap();
        assert_eq!(removal.topics, vec![topic]);
        assert_eq!(removal.links, vec![link]);
        assert!(!store.has_file(1));
        assert!(store.used_topic_ids().is_empty());
        assert!(store.used_link_ids().is_empty());
        assert!(store.used_context_ids().is_empty());
    }

    #[test]
    fn test_unknown_file_is_reference_error() {
        let mut store = SymbolStore::new(StoreConfig::in_memory());
        let err = store.remove_file(7).unwrap_err();
        assert!(matches!(err, StoreError::Reference { id: 7, .. }));
    }
}
