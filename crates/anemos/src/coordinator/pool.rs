//! Fixed pool of threads executing queued write actions.
//!
//! Jobs are taken from a single FIFO channel, bounded when the engine is
//! configured with a queue capacity. The pool does not order writes itself:
//! callers reserve a [`WriteTicket`](super::WriteTicket) before queueing, and
//! the coordinator admits tickets in reservation order.

use crate::error::{AnemosError, Result};
use std::panic::{self, AssertUnwindSafe};
use std::sync::mpsc::{self, Receiver, SendError, Sender, SyncSender};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use tracing::{debug, error};

type Job = Box<dyn FnOnce() + Send + 'static>;

enum JobSender {
    Bounded(SyncSender<Job>),
    Unbounded(Sender<Job>),
}

impl JobSender {
    fn send(&self, job: Job) -> std::result::Result<(), SendError<Job>> {
        match self {
            Self::Bounded(sender) => sender.send(job),
            Self::Unbounded(sender) => sender.send(job),
        }
    }
}

/// Worker threads consuming a shared job queue.
pub struct WorkerPool {
    sender: Option<JobSender>,
    workers: Vec<JoinHandle<()>>,
}

impl std::fmt::Debug for WorkerPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerPool")
            .field("workers", &self.workers.len())
            .field("open", &self.sender.is_some())
            .finish()
    }
}

impl WorkerPool {
    /// Spawns `workers` threads (at least one).
    pub fn new(workers: usize, capacity: Option<usize>) -> Result<Self> {
        let (sender, receiver) = match capacity {
            Some(capacity) => {
                let (tx, rx) = mpsc::sync_channel(capacity);
                (JobSender::Bounded(tx), rx)
            }
            None => {
                let (tx, rx) = mpsc::channel();
                (JobSender::Unbounded(tx), rx)
            }
        };
        let receiver = Arc::new(Mutex::new(receiver));

        let mut handles = Vec::with_capacity(workers.max(1));
        for index in 0..workers.max(1) {
            let receiver = Arc::clone(&receiver);
            let handle = thread::Builder::new()
                .name(format!("anemos-writer-{}", index))
                .spawn(move || run_worker(index, receiver))?;
            handles.push(handle);
        }
        debug!("Started {} write workers", handles.len());

        Ok(Self {
            sender: Some(sender),
            workers: handles,
        })
    }

    /// Number of worker threads.
    pub fn size(&self) -> usize {
        self.workers.len()
    }

    /// Queues a job, blocking while a bounded queue is full.
    pub fn execute<F>(&self, job: F) -> Result<()>
    where
        F: FnOnce() + Send + 'static,
    {
        let sender = self
            .sender
            .as_ref()
            .ok_or_else(|| AnemosError::Coordinator("worker pool is shut down".to_string()))?;
        sender
            .send(Box::new(job))
            .map_err(|_| AnemosError::Coordinator("worker pool is shut down".to_string()))
    }

    /// Closes the queue and waits for queued jobs to finish.
    pub fn shutdown(&mut self) {
        self.sender.take();
        for handle in self.workers.drain(..) {
            if handle.join().is_err() {
                error!("Write worker terminated abnormally");
            }
        }
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn run_worker(index: usize, receiver: Arc<Mutex<Receiver<Job>>>) {
    loop {
        let job = {
            let receiver = receiver.lock().unwrap_or_else(|err| err.into_inner());
            receiver.recv()
        };
        match job {
            Ok(job) => {
                if panic::catch_unwind(AssertUnwindSafe(job)).is_err() {
                    error!(worker = index, "Write action panicked");
                }
            }
            Err(_) => break,
        }
    }
    debug!("Write worker {} stopped", index);
}

/// Completion handle for a queued write.
#[derive(Debug)]
pub struct PendingWrite {
    receiver: Receiver<Result<()>>,
}

impl PendingWrite {
    pub(crate) fn channel() -> (Sender<Result<()>>, Self) {
        let (sender, receiver) = mpsc::channel();
        (sender, Self { receiver })
    }

    /// Blocks until the write has finished and returns its outcome.
    pub fn wait(self) -> Result<()> {
        self.receiver.recv().unwrap_or_else(|_| {
            Err(AnemosError::Coordinator(
                "write action ended without reporting a result".to_string(),
            ))
        })
    }

    /// Returns the outcome if the write has already finished.
    pub fn try_wait(&self) -> Option<Result<()>> {
        self.receiver.try_recv().ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_jobs_run_and_shutdown_drains_queue() {
        let counter = Arc::new(AtomicUsize::new(0));
        let mut pool = WorkerPool::new(2, Some(4)).unwrap();
        for _ in 0..10 {
            let counter = Arc::clone(&counter);
            pool.execute(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            })
            .unwrap();
        }
        pool.shutdown();
        assert_eq!(counter.load(Ordering::SeqCst), 10);
        assert!(pool.execute(|| ()).is_err());
    }

    #[test]
    fn test_panicking_job_keeps_worker_alive() {
        let pool = WorkerPool::new(1, None).unwrap();
        pool.execute(|| panic!("boom")).unwrap();

        let (tx, pending) = PendingWrite::channel();
        pool.execute(move || {
            let _ = tx.send(Ok(()));
        })
        .unwrap();
        assert!(pending.wait().is_ok());
    }

    #[test]
    fn test_dropped_sender_reports_error() {
        let (tx, pending) = PendingWrite::channel();
        drop(tx);
        assert!(matches!(pending.wait(), Err(AnemosError::Coordinator(_))));
    }

    #[test]
    fn test_zero_workers_spawns_one() {
        let pool = WorkerPool::new(0, None).unwrap();
        assert_eq!(pool.size(), 1);
    }
}
