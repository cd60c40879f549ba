//! Persistence driver: ties the in-memory ledger to its file and writer.

use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use dexuse_config::{log_persist_debug, log_persist_warn};
use dexuse_index::UserId;
use parking_lot::Mutex;

use crate::file::LedgerFile;
use crate::ledger::UsageLedger;
use crate::record::LedgerSnapshot;
use crate::writer::{WriteScheduler, WriteStats};
use crate::Result;

/// Usage ledger with durable storage.
///
/// Synchronous and background writes serialize on one write lock, and each
/// takes its snapshot while holding it, so the file never goes backwards.
pub struct UsageStore {
    ledger: Arc<UsageLedger>,
    file: LedgerFile,
    write_lock: Arc<Mutex<()>>,
    scheduler: WriteScheduler,
}

impl UsageStore {
    /// Open a store backed by `path`. Nothing is read until [`load`](Self::load).
    pub fn open(path: impl AsRef<Path>, debounce: Duration) -> Result<Self> {
        let ledger = Arc::new(UsageLedger::new());
        let file = LedgerFile::new(path.as_ref());
        let write_lock = Arc::new(Mutex::new(()));

        let scheduler = {
            let ledger = ledger.clone();
            let file = file.clone();
            let write_lock = write_lock.clone();
            WriteScheduler::spawn(debounce, move || {
                let _guard = write_lock.lock();
                file.write(&ledger.snapshot())
            })?
        };

        Ok(Self {
            ledger,
            file,
            write_lock,
            scheduler,
        })
    }

    /// Replace the in-memory ledger with the file contents.
    ///
    /// A missing file yields an empty ledger. An unreadable or invalid file is
    /// discarded with a warning and also yields an empty ledger.
    pub fn load(&self) -> LedgerSnapshot {
        match self.file.read() {
            Ok(Some(snapshot)) => {
                log_persist_debug!(
                    "Loaded ledger",
                    packages = snapshot.len(),
                    records = snapshot.record_count()
                );
                self.ledger.replace(snapshot);
            }
            Ok(None) => {
                log_persist_debug!("No ledger file, starting empty");
                self.ledger.clear();
            }
            Err(e) => {
                log_persist_warn!(
                    "Discarding unreadable ledger",
                    path = tracing::field::display(self.file.path().display()),
                    error = tracing::field::display(&e)
                );
                self.ledger.clear();
            }
        }
        self.ledger.snapshot()
    }

    /// Write the current ledger and wait for it to reach disk.
    pub fn write_now(&self) -> Result<()> {
        let _guard = self.write_lock.lock();
        self.file.write(&self.ledger.snapshot())
    }

    /// Schedule a background write when `changed` is true.
    pub fn maybe_write_async(&self, changed: bool) -> bool {
        changed && self.scheduler.schedule()
    }

    /// Drop entries for packages or users that are no longer installed and
    /// schedule a write if anything was pruned.
    pub fn sync_with_installed(&self, installed: &HashMap<String, HashSet<UserId>>) -> bool {
        let changed = self.ledger.sync_data(installed);
        self.maybe_write_async(changed);
        changed
    }

    /// Wait for every scheduled write to be attempted.
    pub fn flush(&self) {
        self.scheduler.flush();
    }

    pub fn ledger(&self) -> &Arc<UsageLedger> {
        &self.ledger
    }

    pub fn path(&self) -> &Path {
        self.file.path()
    }

    pub fn stats(&self) -> WriteStats {
        self.scheduler.stats()
    }
}
