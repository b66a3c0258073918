//! Shared access to one store
//!
//! [`SharedStore`] is the single-writer / many-readers wrapper: merges and
//! resolve passes hold the write lock for a whole file batch, so readers
//! never see a half-merged file. [`CancelFlag`] lets another thread stop a
//! long resolve pass between links.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::error::{StoreError, StoreResult};
use crate::store::SymbolStore;

/// Cooperative cancellation flag, cheap to clone across threads.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag {
    cancelled: Arc<AtomicBool>,
}

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn reset(&self) {
        self.cancelled.store(false, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone)]
pub struct SharedStore {
    inner: Arc<RwLock<SymbolStore>>,
}

impl SharedStore {
    pub fn new(store: SymbolStore) -> Self {
        Self {
            inner: Arc::new(RwLock::new(store)),
        }
    }

    /// Shared read access.
    ///
    /// # Errors
    /// `Poisoned` if a writer panicked while holding the lock, or if a
    /// fatal error left the store half updated.
    pub fn read(&self) -> StoreResult<RwLockReadGuard<'_, SymbolStore>> {
        let guard = self.inner.read().map_err(|_| StoreError::Poisoned)?;
        if guard.is_poisoned() {
            return Err(StoreError::Poisoned);
        }
        Ok(guard)
    }

    /// Exclusive write access.
    pub fn write(&self) -> StoreResult<RwLockWriteGuard<'_, SymbolStore>> {
        self.inner.write().map_err(|_| StoreError::Poisoned)
    }

    pub fn with_read<T>(&self, f: impl FnOnce(&SymbolStore) -> T) -> StoreResult<T> {
        let guard = self.read()?;
        Ok(f(&guard))
    }

    pub fn with_write<T>(&self, f: impl FnOnce(&mut SymbolStore) -> StoreResult<T>) -> StoreResult<T> {
        let mut guard = self.write()?;
        f(&mut guard)
    }

    /// Unwrap the store if this is the last handle.
    pub fn try_into_inner(self) -> Result<SymbolStore, Self> {
        match Arc::try_unwrap(self.inner) {
            Ok(lock) => lock.into_inner().map_err(|poisoned| Self::new(poisoned.into_inner())),
            Err(inner) => Err(Self { inner }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StoreConfig;
    use std::thread;

    #[test]
    fn test_cancel_flag_is_shared() {
        let flag = CancelFlag::new();
        let other = flag.clone();
        assert!(!flag.is_cancelled());
        other.cancel();
        assert!(flag.is_cancelled());
        flag.reset();
        assert!(!other.is_cancelled());
    }

    #[test]
    fn test_readers_see_committed_writes() {
        let shared = SharedStore::new(SymbolStore::new(StoreConfig::in_memory()));
        let writer = shared.clone();
        thread::spawn(move || writer.with_write(|store| store.add_file(3)).unwrap())
            .join()
            .unwrap();
        assert!(shared.with_read(|store| store.has_file(3)).unwrap());
    }

    #[test]
    fn test_poisoned_store_is_not_readable() {
        let mut store = SymbolStore::new(StoreConfig::in_memory());
        store.add_file(1).unwrap();
        store.poisoned = true;
        let shared = SharedStore::new(store);

        assert!(matches!(shared.read(), Err(StoreError::Poisoned)));
        assert!(shared.with_read(|store| store.has_file(1)).is_err());
        assert!(shared.write().is_ok());
    }

    #[test]
    fn test_try_into_inner() {
        let shared = SharedStore::new(SymbolStore::new(StoreConfig::in_memory()));
        let second = shared.clone();
        let shared = shared.try_into_inner().unwrap_err();
        drop(second);
        assert!(shared.try_into_inner().is_ok());
    }
}
