//! Deadline monitor (spec §4.3): a single driver task that wakes exactly
//! when the next scheduled deadline elapses, instead of polling every
//! proposal on a fixed tick the way `refreshProposalState` did in the
//! original scheduler. Entries are kept in a min-heap ordered by `when`,
//! with insertion sequence as a tie-break so same-millisecond deadlines
//! fire in the order they were registered.

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use parking_lot::Mutex;
use tokio::sync::Notify;

use crate::ids::{PartyId, ProposalId};

pub fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system clock before unix epoch")
        .as_millis() as u64
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DeadlineKey {
    pub proposal_id: ProposalId,
    pub party_id: PartyId,
}

struct Entry {
    when: u64,
    seq: u64,
    key: DeadlineKey,
}

impl PartialEq for Entry {
    fn eq(&self, other: &Self) -> bool {
        self.when == other.when && self.seq == other.seq
    }
}
impl Eq for Entry {}

impl Ord for Entry {
    fn cmp(&self, other: &Self) -> Ordering {
        // BinaryHeap is a max-heap; reverse so the earliest `when` sorts first.
        other
            .when
            .cmp(&self.when)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

impl PartialOrd for Entry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Min-heap of pending deadlines plus a `Notify` the driver loop waits on,
/// so inserting an earlier deadline than the current sleep wakes it
/// immediately instead of waiting for the stale one to elapse.
pub struct Monitor {
    heap: Mutex<BinaryHeap<Entry>>,
    seq: AtomicU64,
    notify: Notify,
}

impl Monitor {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            heap: Mutex::new(BinaryHeap::new()),
            seq: AtomicU64::new(0),
            notify: Notify::new(),
        })
    }

    /// Schedule (or reschedule) a wake-up for `key` at `when` (ms since
    /// epoch). Proposals naturally get a fresh entry each time they advance
    /// to their next period; stale entries for already-finished parties are
    /// simply skipped by the driver when they pop (spec §4.3).
    pub fn schedule(&self, key: DeadlineKey, when: u64) {
        let seq = self.seq.fetch_add(1, AtomicOrdering::Relaxed);
        let wake_sooner = self
            .heap
            .lock()
            .peek()
            .map(|top| when < top.when)
            .unwrap_or(true);
        self.heap.lock().push(Entry { when, seq, key });
        if wake_sooner {
            self.notify.notify_one();
        }
    }

    /// Pop the next due entry if its `when` has elapsed, otherwise return
    /// how long the driver should sleep before checking again.
    fn pop_due(&self) -> PopResult {
        let mut heap = self.heap.lock();
        match heap.peek() {
            None => PopResult::Empty,
            Some(top) => {
                let now = now_ms();
                if top.when <= now {
                    let entry = heap.pop().expect("peeked entry must pop");
                    PopResult::Due(entry.key)
                } else {
                    PopResult::NotYet(top.when - now)
                }
            }
        }
    }

    /// Drive the monitor forever, invoking `on_due` for each elapsed
    /// deadline. Runs as a single background task owned by the engine.
    pub async fn run<F, Fut>(self: Arc<Self>, on_due: F)
    where
        F: Fn(DeadlineKey) -> Fut,
        Fut: Future<Output = ()>,
    {
        loop {
            match self.pop_due() {
                PopResult::Empty => {
                    self.notify.notified().await;
                }
                PopResult::NotYet(remaining) => {
                    tokio::select! {
                        _ = tokio::time::sleep(std::time::Duration::from_millis(remaining)) => {}
                        _ = self.notify.notified() => {}
                    }
                }
                PopResult::Due(key) => {
                    on_due(key).await;
                }
            }
        }
    }

    pub fn pending_count(&self) -> usize {
        self.heap.lock().len()
    }
}

enum PopResult {
    Empty,
    NotYet(u64),
    Due(DeadlineKey),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::{PartyId, ProposalId};

    fn key(n: u8) -> DeadlineKey {
        DeadlineKey {
            proposal_id: ProposalId([n; 32]),
            party_id: PartyId(vec![n]),
        }
    }

    #[test]
    fn earlier_deadline_pops_first() {
        let monitor = Monitor::new();
        monitor.schedule(key(2), 200);
        monitor.schedule(key(1), 100);
        let top = monitor.heap.lock().peek().unwrap().key.clone();
        assert_eq!(top, key(1));
    }

    #[test]
    fn tie_break_uses_insertion_order() {
        let monitor = Monitor::new();
        monitor.schedule(key(1), 100);
        monitor.schedule(key(2), 100);
        let top = monitor.heap.lock().peek().unwrap().key.clone();
        assert_eq!(top, key(1));
    }
}
