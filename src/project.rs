//! Project facade
//!
//! Ties the pieces together for a host: opens (or rebuilds) the database,
//! owns the shared store and the resolver, merges parser output, and saves
//! on clean shutdown. Errors are reported with `anyhow` context.

use anyhow::{Context, Result};
use tracing::{info, warn};

use crate::config::StoreConfig;
use crate::ids::FileId;
use crate::persist::{Database, LoadOutcome};
use crate::pipeline::{merge_batches, FileBatch, MergeReport};
use crate::resolver::{LinkResolver, ResolveReport};
use crate::shared::{CancelFlag, SharedStore};
use crate::store::{FileRemoval, StoreStats};
use crate::verify::VerifyReport;

/// An open documentation project database.
#[derive(Debug)]
pub struct Project {
    config: StoreConfig,
    db: Database,
    shared: SharedStore,
    resolver: LinkResolver,
    outcome: LoadOutcome,
    needs_full_resolve: bool,
}

impl Project {
    /// Open the database named by `config`.
    ///
    /// A missing or unusable database is replaced by an empty one; check
    /// [`Project::load_outcome`] to tell the cases apart.
    pub fn open(config: StoreConfig) -> Result<Self> {
        let (db, store, outcome) = Database::open_or_rebuild(&config).with_context(|| {
            format!("Failed to open symbol database {}", config.db_path.display())
        })?;

        let needs_full_resolve =
            matches!(outcome, LoadOutcome::Rebuilt { .. }) && config.resolve_all_after_rebuild;
        let resolver = LinkResolver::for_config(&config, CancelFlag::new());

        Ok(Self {
            config,
            db,
            shared: SharedStore::new(store),
            resolver,
            outcome,
            needs_full_resolve,
        })
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    pub fn load_outcome(&self) -> &LoadOutcome {
        &self.outcome
    }

    /// Handle for readers on other threads.
    pub fn shared(&self) -> SharedStore {
        self.shared.clone()
    }

    /// Flag that stops the current and future resolve passes until reset.
    pub fn cancel_flag(&self) -> CancelFlag {
        self.resolver.cancel_flag().clone()
    }

    /// Merge parser output and resolve the links it affects.
    ///
    /// The first apply after a rebuild re-resolves every link once.
    pub fn apply(&mut self, batches: Vec<FileBatch>) -> Result<MergeReport> {
        let files = batches.len();
        let mut report = merge_batches(&self.shared, batches, &self.resolver)
            .with_context(|| format!("Failed to merge {} file batches", files))?;

        if self.needs_full_resolve && report.resolve.is_complete() {
            report.resolve = self.resolve_all()?;
            self.needs_full_resolve = false;
        }
        Ok(report)
    }

    /// Remove a file and re-resolve links that pointed into it.
    pub fn remove_file(&mut self, file_id: FileId) -> Result<(FileRemoval, ResolveReport)> {
        let mut store = self
            .shared
            .write()
            .map_err(|e| anyhow::anyhow!("Failed to lock symbol store: {}", e))?;
        let removal = store
            .remove_file(file_id)
            .with_context(|| format!("Failed to remove file {}", file_id))?;
        let resolve = self
            .resolver
            .resolve_pending(&mut store)
            .context("Failed to resolve links after file removal")?;
        info!(
            file_id,
            topics = removal.topics.len(),
            links = removal.links.len(),
            "removed file"
        );
        Ok((removal, resolve))
    }

    /// Resolve every link, ignoring the change tracker.
    pub fn resolve_all(&self) -> Result<ResolveReport> {
        let mut store = self
            .shared
            .write()
            .map_err(|e| anyhow::anyhow!("Failed to lock symbol store: {}", e))?;
        self.resolver
            .resolve_all(&mut store)
            .context("Failed to resolve all links")
    }

    pub fn stats(&self) -> Result<StoreStats> {
        self.shared
            .with_read(|store| store.stats())
            .context("Failed to read store statistics")
    }

    pub fn verify(&self) -> Result<VerifyReport> {
        self.shared
            .with_read(|store| store.verify())
            .context("Failed to verify symbol store")
    }

    /// Write the store to the database.
    pub fn save(&self) -> Result<()> {
        let store = self
            .shared
            .read()
            .map_err(|e| anyhow::anyhow!("Failed to lock symbol store: {}", e))?;
        self.db
            .save(&store)
            .with_context(|| format!("Failed to save symbol database {}", self.db.path().display()))
    }

    /// Save and close. A poisoned store is not saved, leaving the last good
    /// snapshot on disk.
    pub fn close(self) -> Result<()> {
        let poisoned = self.shared.read().is_err();
        if poisoned {
            warn!(
                path = %self.db.path().display(),
                "symbol store poisoned, closing without saving"
            );
        } else {
            self.save()?;
        }
        self.db.close().context("Failed to close symbol database")
    }
}
