use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::time::Duration;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tokio::sync::Notify;
use tracing::debug;

use crate::JobId;

/// A job released by the delay queue
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueuedJob {
    pub job_id: JobId,
    pub due_at: DateTime<Utc>,
}

#[derive(Debug, PartialEq, Eq, PartialOrd, Ord)]
struct Entry {
    due_at: DateTime<Utc>,
    seq: u64,
    job_id: JobId,
}

#[derive(Default)]
struct QueueState {
    heap: BinaryHeap<Reverse<Entry>>,
    seq: u64,
    closed: bool,
}

/// Holds job ids until their due time.
///
/// Only ids and due times live here; the job store stays the source of
/// truth, so the queue can always be rebuilt from it after a restart.
/// Jobs sharing a due time are released in no particular order.
pub struct DelayQueue {
    state: Mutex<QueueState>,
    notify: Notify,
    poll_interval: Duration,
}

impl DelayQueue {
    /// `poll_interval` bounds how late a due job can be noticed
    pub fn new(poll_interval: Duration) -> Self {
        Self {
            state: Mutex::new(QueueState::default()),
            notify: Notify::new(),
            poll_interval,
        }
    }

    /// Admit a job. A due time at or before now means due immediately.
    pub fn admit(&self, job_id: JobId, due_at: DateTime<Utc>) {
        {
            let mut state = self.state.lock();
            state.seq += 1;
            let seq = state.seq;
            state.heap.push(Reverse(Entry { due_at, seq, job_id }));
        }
        self.notify.notify_waiters();
    }

    /// Pop the earliest job if it is due at `now`
    pub fn pop_due(&self, now: DateTime<Utc>) -> Option<QueuedJob> {
        let mut state = self.state.lock();
        let due = matches!(state.heap.peek(), Some(Reverse(entry)) if entry.due_at <= now);
        if !due {
            return None;
        }
        state.heap.pop().map(|Reverse(entry)| QueuedJob {
            job_id: entry.job_id,
            due_at: entry.due_at,
        })
    }

    /// Wait for the next due job. Returns `None` once the queue is closed.
    pub async fn take(&self) -> Option<QueuedJob> {
        loop {
            let notified = self.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            let wait = {
                let mut state = self.state.lock();
                if state.closed {
                    return None;
                }

                let now = Utc::now();
                match state.heap.peek().map(|Reverse(entry)| entry.due_at) {
                    Some(due_at) if due_at <= now => {
                        if let Some(Reverse(entry)) = state.heap.pop() {
                            return Some(QueuedJob {
                                job_id: entry.job_id,
                                due_at: entry.due_at,
                            });
                        }
                        Duration::ZERO
                    }
                    Some(due_at) => (due_at - now)
                        .to_std()
                        .unwrap_or_default()
                        .min(self.poll_interval),
                    None => self.poll_interval,
                }
            };

            tokio::select! {
                _ = &mut notified => {}
                _ = tokio::time::sleep(wait) => {}
            }
        }
    }

    /// Stop releasing jobs; pending `take` calls return `None`
    pub fn close(&self) {
        self.state.lock().closed = true;
        self.notify.notify_waiters();
        debug!("Delay queue closed");
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    /// Drop every entry (used before rebuilding from the store)
    pub fn clear(&self) {
        self.state.lock().heap.clear();
    }

    pub fn len(&self) -> usize {
        self.state.lock().heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Due time of the earliest entry
    pub fn next_due_at(&self) -> Option<DateTime<Utc>> {
        self.state.lock().heap.peek().map(|Reverse(entry)| entry.due_at)
    }
}
