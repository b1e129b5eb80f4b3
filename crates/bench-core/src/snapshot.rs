use crate::report::WindowReport;
use crate::stats::{CounterValues, StatCounters};
use parking_lot::RwLock;
use std::sync::Arc;
use tokio::time::Instant;

/// Number of snapshots retained; the report window spans oldest to newest.
pub const SNAPSHOT_CAPACITY: usize = 10;

/// Counter values stamped with the instant they were read.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Snapshot {
    pub values: CounterValues,
    pub taken_at: Instant,
}

impl Snapshot {
    pub fn new(values: CounterValues, taken_at: Instant) -> Self {
        Self { values, taken_at }
    }
}

#[derive(Debug)]
struct RingState {
    slots: [Option<Snapshot>; SNAPSHOT_CAPACITY],
    head: usize,
    len: usize,
}

impl RingState {
    fn push(&mut self, snapshot: Snapshot) {
        let tail = (self.head + self.len) % SNAPSHOT_CAPACITY;
        self.slots[tail] = Some(snapshot);
        if self.len == SNAPSHOT_CAPACITY {
            // tail overwrote the oldest slot
            self.head = (self.head + 1) % SNAPSHOT_CAPACITY;
        } else {
            self.len += 1;
        }
    }

    fn oldest(&self) -> Option<Snapshot> {
        if self.len == 0 {
            return None;
        }
        self.slots[self.head]
    }

    fn newest(&self) -> Option<Snapshot> {
        if self.len == 0 {
            return None;
        }
        self.slots[(self.head + self.len - 1) % SNAPSHOT_CAPACITY]
    }
}

/// Bounded history of counter snapshots.
///
/// Workers never touch the lock here: the snapshot task is the only writer
/// and the report task the only reader.
#[derive(Debug)]
pub struct SnapshotRing {
    counters: Arc<StatCounters>,
    state: RwLock<RingState>,
}

impl SnapshotRing {
    pub fn new(counters: Arc<StatCounters>) -> Self {
        Self {
            counters,
            state: RwLock::new(RingState {
                slots: [None; SNAPSHOT_CAPACITY],
                head: 0,
                len: 0,
            }),
        }
    }

    pub fn counters(&self) -> &Arc<StatCounters> {
        &self.counters
    }

    /// Copy the live counters into the ring, evicting the oldest entry when full.
    pub fn take_snapshot(&self) {
        let snapshot = Snapshot::new(self.counters.load(), Instant::now());
        self.push(snapshot);
    }

    pub fn push(&self, snapshot: Snapshot) {
        self.state.write().push(snapshot);
    }

    pub fn len(&self) -> usize {
        self.state.read().len
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_full(&self) -> bool {
        self.len() == SNAPSHOT_CAPACITY
    }

    pub fn oldest(&self) -> Option<Snapshot> {
        self.state.read().oldest()
    }

    pub fn newest(&self) -> Option<Snapshot> {
        self.state.read().newest()
    }

    /// Diff the oldest and newest snapshot.
    ///
    /// Returns `None` until the ring holds a full window. Max RT is read from
    /// the live counters, so it is the whole-run maximum rather than the
    /// window's.
    pub fn window_report(&self) -> Option<WindowReport> {
        let state = self.state.read();
        if state.len < SNAPSHOT_CAPACITY {
            return None;
        }
        let first = state.oldest()?;
        let last = state.newest()?;
        let max_rt = self.counters.max_rt();
        drop(state);

        Some(WindowReport::between(&first, &last, max_rt))
    }
}
