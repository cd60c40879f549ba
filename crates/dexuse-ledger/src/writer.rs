//! Background ledger writer.
//!
//! A single named worker thread owns all scheduled writes. Triggers that
//! arrive while a write is already pending are absorbed, so a burst of load
//! notifications costs one write. The worker waits `debounce` after the first
//! trigger before writing, unless a flush cuts the wait short.
//!
//! ```text
//! schedule() ──► pending? ──yes──► coalesced
//!                  │ no
//!                  ▼
//!        channel ─► worker ─► wait debounce ─► write_fn()
//! ```

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender, TrySendError};
use dexuse_config::{log_persist_debug, log_persist_error};

use crate::Result;

const CHANNEL_CAPACITY: usize = 64;

enum Command {
    Write,
    /// Write now if anything is pending, then acknowledge
    Flush(Sender<()>),
}

/// Writer statistics
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct WriteStats {
    pub requested: u64,
    pub coalesced: u64,
    pub written: u64,
    pub failed: u64,
}

#[derive(Default)]
struct Counters {
    requested: AtomicU64,
    coalesced: AtomicU64,
    written: AtomicU64,
    failed: AtomicU64,
}

impl Counters {
    fn snapshot(&self) -> WriteStats {
        WriteStats {
            requested: self.requested.load(Ordering::Relaxed),
            coalesced: self.coalesced.load(Ordering::Relaxed),
            written: self.written.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
        }
    }
}

/// Handle to the background writer. Dropping it performs a final write of
/// anything pending and joins the worker.
pub struct WriteScheduler {
    tx: Option<Sender<Command>>,
    pending: Arc<AtomicBool>,
    counters: Arc<Counters>,
    handle: Option<JoinHandle<()>>,
}

impl WriteScheduler {
    /// Start the worker. `write_fn` is only ever called from the worker thread.
    pub fn spawn<F>(debounce: Duration, write_fn: F) -> Result<Self>
    where
        F: FnMut() -> Result<()> + Send + 'static,
    {
        let (tx, rx) = bounded(CHANNEL_CAPACITY);
        let pending = Arc::new(AtomicBool::new(false));
        let counters = Arc::new(Counters::default());

        let worker = Worker {
            rx,
            debounce,
            pending: pending.clone(),
            counters: counters.clone(),
            write_fn,
        };
        let handle = thread::Builder::new()
            .name("dexuse-writer".into())
            .spawn(move || worker.run())?;

        Ok(Self {
            tx: Some(tx),
            pending,
            counters,
            handle: Some(handle),
        })
    }

    /// Request an asynchronous write. Returns false if the request was folded
    /// into one already pending.
    pub fn schedule(&self) -> bool {
        self.counters.requested.fetch_add(1, Ordering::Relaxed);
        if self.pending.swap(true, Ordering::AcqRel) {
            self.counters.coalesced.fetch_add(1, Ordering::Relaxed);
            return false;
        }
        let Some(tx) = &self.tx else {
            self.pending.store(false, Ordering::Release);
            return false;
        };
        match tx.try_send(Command::Write) {
            // A full queue holds flushes, each of which writes what is pending
            Ok(()) | Err(TrySendError::Full(_)) => true,
            Err(TrySendError::Disconnected(_)) => {
                self.pending.store(false, Ordering::Release);
                false
            }
        }
    }

    /// Block until every write requested so far has been attempted.
    pub fn flush(&self) {
        let Some(tx) = &self.tx else { return };
        let (ack_tx, ack_rx) = bounded(1);
        if tx.send(Command::Flush(ack_tx)).is_ok() {
            let _ = ack_rx.recv();
        }
    }

    pub fn is_pending(&self) -> bool {
        self.pending.load(Ordering::Acquire)
    }

    pub fn stats(&self) -> WriteStats {
        self.counters.snapshot()
    }
}

impl Drop for WriteScheduler {
    fn drop(&mut self) {
        if let Some(tx) = self.tx.take() {
            let (ack_tx, ack_rx) = bounded(1);
            if tx.send(Command::Flush(ack_tx)).is_ok() {
                let _ = ack_rx.recv();
            }
        }
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

struct Worker<F> {
    rx: Receiver<Command>,
    debounce: Duration,
    pending: Arc<AtomicBool>,
    counters: Arc<Counters>,
    write_fn: F,
}

impl<F> Worker<F>
where
    F: FnMut() -> Result<()>,
{
    fn run(mut self) {
        while let Ok(cmd) = self.rx.recv() {
            match cmd {
                Command::Write => {
                    if let Some(ack) = self.wait_debounce() {
                        self.write_pending();
                        let _ = ack.send(());
                    }
                }
                Command::Flush(ack) => {
                    self.write_pending();
                    let _ = ack.send(());
                }
            }
        }
        // Channel closed without a final flush
        self.write_pending();
        log_persist_debug!("Writer stopped");
    }

    /// Wait out the debounce window, then write. Returns a flush ack that
    /// arrived during the wait.
    fn wait_debounce(&mut self) -> Option<Sender<()>> {
        let deadline = Instant::now() + self.debounce;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                self.write_pending();
                return None;
            }
            match self.rx.recv_timeout(remaining) {
                // Already pending; nothing extra to do
                Ok(Command::Write) => continue,
                Ok(Command::Flush(ack)) => return Some(ack),
                Err(RecvTimeoutError::Timeout) => {
                    self.write_pending();
                    return None;
                }
                Err(RecvTimeoutError::Disconnected) => {
                    self.write_pending();
                    return None;
                }
            }
        }
    }

    fn write_pending(&mut self) {
        // Clear first so triggers during the write schedule another one
        if !self.pending.swap(false, Ordering::AcqRel) {
            return;
        }
        match (self.write_fn)() {
            Ok(()) => {
                self.counters.written.fetch_add(1, Ordering::Relaxed);
                log_persist_debug!("Ledger written");
            }
            Err(e) => {
                self.counters.failed.fetch_add(1, Ordering::Relaxed);
                log_persist_error!("Failed to write ledger", error = tracing::field::display(&e));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::LedgerError;
    use std::sync::atomic::AtomicUsize;

    fn counting(debounce: Duration) -> (WriteScheduler, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let c = calls.clone();
        let scheduler = WriteScheduler::spawn(debounce, move || {
            c.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
        .unwrap();
        (scheduler, calls)
    }

    #[test]
    fn test_burst_coalesces_into_one_write() {
        let (scheduler, calls) = counting(Duration::from_secs(60));
        assert!(scheduler.schedule());
        for _ in 0..99 {
            assert!(!scheduler.schedule());
        }
        scheduler.flush();

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        let stats = scheduler.stats();
        assert_eq!(stats.requested, 100);
        assert_eq!(stats.coalesced, 99);
        assert_eq!(stats.written, 1);
        assert!(!scheduler.is_pending());
    }

    #[test]
    fn test_debounce_elapses_without_flush() {
        let (scheduler, calls) = counting(Duration::from_millis(5));
        scheduler.schedule();
        let deadline = Instant::now() + Duration::from_secs(5);
        while calls.load(Ordering::SeqCst) == 0 && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(5));
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_flush_without_pending_does_not_write() {
        let (scheduler, calls) = counting(Duration::from_millis(5));
        scheduler.flush();
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_drop_writes_pending() {
        let (scheduler, calls) = counting(Duration::from_secs(60));
        scheduler.schedule();
        drop(scheduler);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_failed_write_is_counted() {
        let scheduler = WriteScheduler::spawn(Duration::from_millis(1), || {
            Err(LedgerError::Corrupt("disk full".into()))
        })
        .unwrap();
        scheduler.schedule();
        scheduler.flush();
        assert_eq!(scheduler.stats().failed, 1);
        assert_eq!(scheduler.stats().written, 0);
    }
}
