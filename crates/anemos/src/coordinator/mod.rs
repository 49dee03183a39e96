//! Database-wide read/write coordination.
//!
//! # Architecture
//!
//! A single [`Phase`] guarded by one mutex and condition variable:
//!
//! ```text
//!                 write reserved                 reads drained
//! AcceptingReads ───────────────▶ Draining ───────────────────▶ Writing
//!       ▲                            ▲                              │
//!       │   queue empty              │   more writes queued         │
//!       └────────────────────────────┴──────────────────────────────┘
//! ```
//!
//! - Reads are admitted only in `AcceptingReads` and run concurrently.
//! - A reserved write moves the coordinator to `Draining`; new reads wait.
//! - Writes run one at a time in reservation (FIFO) order.
//! - Guards release their slot on drop, including during unwinding.
//!
//! # Example
//!
//! ```rust,ignore
//! use alopex_anemos::coordinator::Coordinator;
//!
//! let coordinator = Coordinator::new();
//! let rows = coordinator.read(|| db.request(&request));
//! coordinator.write(|| db.update_table("T1", rows))??;
//! ```

pub mod pool;

use crate::error::{AnemosError, Result};
use std::collections::VecDeque;
use std::sync::{Condvar, Mutex, MutexGuard};
use tracing::{debug, error};

/// Coordinator state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Reads are admitted immediately.
    AcceptingReads,
    /// A write is pending; in-flight reads finish, new reads wait.
    Draining,
    /// Exactly one write is executing.
    Writing,
}

/// A reserved position in the write queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[must_use = "a reserved write must be executed or abandoned"]
pub struct WriteTicket(u64);

#[derive(Debug)]
struct State {
    phase: Phase,
    active_reads: usize,
    pending_writes: VecDeque<u64>,
    next_ticket: u64,
}

impl State {
    fn settle(&mut self) {
        let next = if self.pending_writes.is_empty() {
            Phase::AcceptingReads
        } else {
            Phase::Draining
        };
        if next != self.phase {
            debug!("Coordinator {:?} -> {:?}", self.phase, next);
            self.phase = next;
        }
    }
}

/// Gates reads and writes over a whole database.
#[derive(Debug)]
pub struct Coordinator {
    state: Mutex<State>,
    changed: Condvar,
}

impl Default for Coordinator {
    fn default() -> Self {
        Self::new()
    }
}

impl Coordinator {
    /// Creates a coordinator accepting reads.
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State {
                phase: Phase::AcceptingReads,
                active_reads: 0,
                pending_writes: VecDeque::new(),
                next_ticket: 0,
            }),
            changed: Condvar::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|err| err.into_inner())
    }

    fn wait<'a>(&self, guard: MutexGuard<'a, State>) -> MutexGuard<'a, State> {
        self.changed
            .wait(guard)
            .unwrap_or_else(|err| err.into_inner())
    }

    /// Current phase.
    pub fn phase(&self) -> Phase {
        self.lock().phase
    }

    /// Number of reads currently admitted.
    pub fn active_reads(&self) -> usize {
        self.lock().active_reads
    }

    /// Number of reserved writes, including one executing.
    pub fn pending_writes(&self) -> usize {
        self.lock().pending_writes.len()
    }

    /// Blocks until a read is admitted.
    pub fn begin_read(&self) -> ReadGuard<'_> {
        let mut state = self.lock();
        while state.phase != Phase::AcceptingReads {
            state = self.wait(state);
        }
        state.active_reads += 1;
        ReadGuard { coordinator: self }
    }

    /// Runs `f` as an admitted read.
    pub fn read<T, F: FnOnce() -> T>(&self, f: F) -> T {
        let _guard = self.begin_read();
        f()
    }

    /// Appends a write to the queue and stops admitting new reads.
    pub fn reserve_write(&self) -> WriteTicket {
        let mut state = self.lock();
        let ticket = state.next_ticket;
        state.next_ticket += 1;
        state.pending_writes.push_back(ticket);
        if state.phase == Phase::AcceptingReads {
            debug!("Coordinator AcceptingReads -> Draining");
            state.phase = Phase::Draining;
        }
        WriteTicket(ticket)
    }

    /// Blocks until `ticket` is first in the queue and all reads have drained.
    pub fn begin_write(&self, ticket: WriteTicket) -> Result<WriteGuard<'_>> {
        let mut state = self.lock();
        loop {
            if !state.pending_writes.contains(&ticket.0) {
                return Err(AnemosError::Coordinator(format!(
                    "write ticket {} is not queued",
                    ticket.0
                )));
            }
            let first = state.pending_writes.front() == Some(&ticket.0);
            if first && state.phase != Phase::Writing && state.active_reads == 0 {
                break;
            }
            state = self.wait(state);
        }
        debug!("Coordinator {:?} -> Writing (ticket {})", state.phase, ticket.0);
        state.phase = Phase::Writing;
        Ok(WriteGuard {
            coordinator: self,
            ticket: ticket.0,
        })
    }

    /// Drops a reserved write that will never run.
    pub fn abandon_write(&self, ticket: WriteTicket) {
        let mut state = self.lock();
        state.pending_writes.retain(|&t| t != ticket.0);
        if state.phase != Phase::Writing {
            state.settle();
        }
        drop(state);
        self.changed.notify_all();
    }

    /// Runs `f` as the next exclusive write.
    pub fn write<T, F: FnOnce() -> T>(&self, f: F) -> Result<T> {
        let ticket = self.reserve_write();
        let _guard = self.begin_write(ticket)?;
        Ok(f())
    }
}

/// An admitted read; releases its slot on drop.
#[derive(Debug)]
pub struct ReadGuard<'a> {
    coordinator: &'a Coordinator,
}

impl Drop for ReadGuard<'_> {
    fn drop(&mut self) {
        let mut state = self.coordinator.lock();
        match state.active_reads.checked_sub(1) {
            Some(remaining) => state.active_reads = remaining,
            None => error!("Coordinator read count underflow"),
        }
        let drained = state.active_reads == 0;
        drop(state);
        if drained {
            self.coordinator.changed.notify_all();
        }
    }
}

/// The executing write; hands over to the next write or to reads on drop.
#[derive(Debug)]
pub struct WriteGuard<'a> {
    coordinator: &'a Coordinator,
    ticket: u64,
}

impl Drop for WriteGuard<'_> {
    fn drop(&mut self) {
        let mut state = self.coordinator.lock();
        match state.pending_writes.pop_front() {
            Some(ticket) if ticket == self.ticket => {}
            other => error!(
                "Coordinator finished write {} but queue head was {:?}",
                self.ticket, other
            ),
        }
        state.settle();
        drop(state);
        self.coordinator.changed.notify_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::{mpsc, Arc};
    use std::thread;
    use std::time::Duration;

    #[test]
    fn test_write_without_reads_runs_immediately() {
        let coordinator = Coordinator::new();
        let phase = coordinator.write(|| coordinator_phase_inside(&coordinator)).unwrap();
        assert_eq!(phase, Phase::Writing);
        assert_eq!(coordinator.phase(), Phase::AcceptingReads);
    }

    fn coordinator_phase_inside(coordinator: &Coordinator) -> Phase {
        coordinator.lock().phase
    }

    #[test]
    fn test_pending_write_blocks_new_reads() {
        let coordinator = Arc::new(Coordinator::new());
        let read = coordinator.begin_read();
        let ticket = coordinator.reserve_write();
        assert_eq!(coordinator.phase(), Phase::Draining);

        let admitted = Arc::new(AtomicBool::new(false));
        let reader = {
            let coordinator = Arc::clone(&coordinator);
            let admitted = Arc::clone(&admitted);
            thread::spawn(move || {
                coordinator.read(|| admitted.store(true, Ordering::SeqCst));
            })
        };
        thread::sleep(Duration::from_millis(50));
        assert!(!admitted.load(Ordering::SeqCst));

        drop(read);
        let guard = coordinator.begin_write(ticket).unwrap();
        assert_eq!(coordinator.active_reads(), 0);
        drop(guard);
        reader.join().unwrap();
        assert!(admitted.load(Ordering::SeqCst));
        assert_eq!(coordinator.phase(), Phase::AcceptingReads);
    }

    #[test]
    fn test_writes_run_in_fifo_order() {
        let coordinator = Arc::new(Coordinator::new());
        let hold = coordinator.begin_read();
        let tickets: Vec<WriteTicket> = (0..4).map(|_| coordinator.reserve_write()).collect();

        let (tx, rx) = mpsc::channel();
        let handles: Vec<_> = tickets
            .into_iter()
            .enumerate()
            .rev()
            .map(|(index, ticket)| {
                let coordinator = Arc::clone(&coordinator);
                let tx = tx.clone();
                thread::spawn(move || {
                    let _guard = coordinator.begin_write(ticket).unwrap();
                    tx.send(index).unwrap();
                })
            })
            .collect();
        drop(tx);
        thread::sleep(Duration::from_millis(20));
        drop(hold);

        for handle in handles {
            handle.join().unwrap();
        }
        let order: Vec<usize> = rx.iter().collect();
        assert_eq!(order, vec![0, 1, 2, 3]);
    }

    #[test]
    fn test_panicking_write_releases_slot() {
        let coordinator = Arc::new(Coordinator::new());
        let result = {
            let coordinator = Arc::clone(&coordinator);
            thread::spawn(move || {
                coordinator
                    .write(|| panic!("write failed"))
                    .map(|_: ()| ())
            })
            .join()
        };
        assert!(result.is_err());
        assert_eq!(coordinator.phase(), Phase::AcceptingReads);
        assert_eq!(coordinator.pending_writes(), 0);
        assert_eq!(coordinator.read(|| 7), 7);
    }

    #[test]
    fn test_panicking_read_releases_slot() {
        let coordinator = Arc::new(Coordinator::new());
        let result = {
            let coordinator = Arc::clone(&coordinator);
            thread::spawn(move || coordinator.read(|| panic!("read failed"))).join()
        };
        assert!(result.is_err());
        assert_eq!(coordinator.active_reads(), 0);
        assert!(coordinator.write(|| ()).is_ok());
    }

    #[test]
    fn test_abandoned_ticket_unblocks_reads() {
        let coordinator = Coordinator::new();
        let ticket = coordinator.reserve_write();
        coordinator.abandon_write(ticket);
        assert_eq!(coordinator.phase(), Phase::AcceptingReads);
        assert!(matches!(
            coordinator.begin_write(ticket),
            Err(AnemosError::Coordinator(_))
        ));
    }

    #[test]
    fn test_concurrent_reads_overlap() {
        let coordinator = Arc::new(Coordinator::new());
        let peak = Arc::new(AtomicUsize::new(0));
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let coordinator = Arc::clone(&coordinator);
                let peak = Arc::clone(&peak);
                thread::spawn(move || {
                    coordinator.read(|| {
                        peak.fetch_max(coordinator.active_reads(), Ordering::SeqCst);
                        thread::sleep(Duration::from_millis(50));
                    })
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert!(peak.load(Ordering::SeqCst) > 1);
    }
}
