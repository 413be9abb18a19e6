//! Delayed promotion and persistence.
//!
//! A single worker thread owns a min-heap of jobs keyed by due time.
//! Indexing schedules a hot-layer promotion and a shard write for each
//! file; the worker runs them once they are due.

use std::cmp::Ordering as CmpOrdering;
use std::collections::BinaryHeap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use crate::db::DocumentRecord;
use crate::{AppError, Result};

/// Work run by the scheduler once due.
#[derive(Debug, Clone, PartialEq)]
pub enum Job {
    /// Move a file from the immediate to the hot layer
    PromoteToHot { file_path: String, content: String },
    /// Write a document into its shard
    Persist(DocumentRecord),
}

struct Delayed {
    due: Instant,
    seq: u64,
    job: Job,
}

impl PartialEq for Delayed {
    fn eq(&self, other: &Self) -> bool {
        self.due == other.due && self.seq == other.seq
    }
}

impl Eq for Delayed {}

impl PartialOrd for Delayed {
    fn partial_cmp(&self, other: &Self) -> Option<CmpOrdering> {
        Some(self.cmp(other))
    }
}

impl Ord for Delayed {
    // Reversed so BinaryHeap pops the earliest job
    fn cmp(&self, other: &Self) -> CmpOrdering {
        other
            .due
            .cmp(&self.due)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

enum Command {
    Schedule(Delayed),
    Flush(Sender<()>),
    Shutdown,
}

/// Handle to the scheduler thread.
pub struct Scheduler {
    tx: Mutex<Sender<Command>>,
    handle: Mutex<Option<JoinHandle<()>>>,
    pending: Arc<AtomicUsize>,
    seq: AtomicUsize,
}

impl Scheduler {
    /// Start the worker thread. `handler` runs every job on that thread.
    pub fn start<F>(handler: F) -> Result<Self>
    where
        F: FnMut(Job) + Send + 'static,
    {
        let (tx, rx) = mpsc::channel::<Command>();
        let pending = Arc::new(AtomicUsize::new(0));
        let worker_pending = Arc::clone(&pending);

        let handle = std::thread::Builder::new()
            .name("livefind-scheduler".to_string())
            .spawn(move || {
                let mut handler = handler;
                let mut heap: BinaryHeap<Delayed> = BinaryHeap::new();

                loop {
                    let timeout = heap
                        .peek()
                        .map(|next| next.due.saturating_duration_since(Instant::now()))
                        .unwrap_or(Duration::from_secs(3600));

                    match rx.recv_timeout(timeout) {
                        Ok(Command::Schedule(delayed)) => heap.push(delayed),
                        Ok(Command::Flush(ack)) => {
                            run_all(&mut heap, &mut handler, &worker_pending);
                            let _ = ack.send(());
                        }
                        Ok(Command::Shutdown) | Err(RecvTimeoutError::Disconnected) => {
                            run_all(&mut heap, &mut handler, &worker_pending);
                            break;
                        }
                        Err(RecvTimeoutError::Timeout) => {}
                    }

                    let now = Instant::now();
                    while heap.peek().is_some_and(|next| next.due <= now) {
                        if let Some(delayed) = heap.pop() {
                            handler(delayed.job);
                            worker_pending.fetch_sub(1, Ordering::SeqCst);
                        }
                    }
                }

                tracing::debug!("Scheduler loop exited");
            })
            .map_err(|e| AppError::Indexing(format!("Failed to start scheduler: {}", e)))?;

        Ok(Self {
            tx: Mutex::new(tx),
            handle: Mutex::new(Some(handle)),
            pending,
            seq: AtomicUsize::new(0),
        })
    }

    fn send(&self, command: Command) -> Result<()> {
        let tx = self
            .tx
            .lock()
            .map_err(|_| AppError::Indexing("Scheduler lock poisoned".to_string()))?;
        tx.send(command)
            .map_err(|_| AppError::Indexing("Scheduler has stopped".to_string()))
    }

    /// Run `job` after `delay`.
    pub fn schedule(&self, delay: Duration, job: Job) -> Result<()> {
        let delayed = Delayed {
            due: Instant::now() + delay,
            seq: self.seq.fetch_add(1, Ordering::SeqCst) as u64,
            job,
        };
        self.pending.fetch_add(1, Ordering::SeqCst);
        if let Err(e) = self.send(Command::Schedule(delayed)) {
            self.pending.fetch_sub(1, Ordering::SeqCst);
            return Err(e);
        }
        Ok(())
    }

    /// Run every pending job now and wait for them to finish.
    pub fn flush(&self) -> Result<()> {
        let (ack_tx, ack_rx) = mpsc::channel();
        self.send(Command::Flush(ack_tx))?;
        ack_rx
            .recv()
            .map_err(|_| AppError::Indexing("Scheduler stopped during flush".to_string()))
    }

    /// Jobs scheduled but not yet run.
    pub fn pending(&self) -> usize {
        self.pending.load(Ordering::SeqCst)
    }

    /// Run remaining jobs and stop the worker thread.
    pub fn shutdown(&self) {
        let handle = match self.handle.lock() {
            Ok(mut guard) => guard.take(),
            Err(_) => None,
        };
        let Some(handle) = handle else {
            return;
        };

        if let Err(e) = self.send(Command::Shutdown) {
            tracing::debug!("Scheduler shutdown signal not delivered: {}", e);
        }
        match handle.join() {
            Ok(()) => tracing::info!("Scheduler thread stopped"),
            Err(_) => tracing::error!("Scheduler thread panicked"),
        }
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn run_all<F: FnMut(Job)>(heap: &mut BinaryHeap<Delayed>, handler: &mut F, pending: &AtomicUsize) {
    while let Some(delayed) = heap.pop() {
        handler(delayed.job);
        pending.fetch_sub(1, Ordering::SeqCst);
    }
}
