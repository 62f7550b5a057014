//! Ordered set of queued timers.
//!
//! Keys order by the absolute tick they fire at, counted without wrapping
//! since the scheduler was created, then by insertion sequence so two timers
//! sharing a deadline still have a strict order and fire in the order they
//! were scheduled.

use core::cmp::Ordering;
use std::collections::BTreeSet;

use crate::timing::scheduler::TimerHandle;
use crate::timing::tick::Tick;

/// Position of one queued timer in the set.
#[derive(Debug, Clone, Copy)]
pub(crate) struct QueueKey {
    /// Elapsed-tick count at which the timer is due.
    pub at: u64,
    /// Unique per insertion; breaks deadline ties.
    pub seq: u64,
    /// `at` on the wrapping counter.
    pub deadline: Tick,
    pub handle: TimerHandle,
}

impl PartialEq for QueueKey {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for QueueKey {}

impl PartialOrd for QueueKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for QueueKey {
    fn cmp(&self, other: &Self) -> Ordering {
        self.at.cmp(&other.at).then(self.seq.cmp(&other.seq))
    }
}

/// The pending-timer set.
#[derive(Default)]
pub(crate) struct TimerQueue {
    set: BTreeSet<QueueKey>,
}

impl TimerQueue {
    pub fn insert(&mut self, key: QueueKey) {
        let inserted = self.set.insert(key);
        debug_assert!(inserted, "queue key {key:?} inserted twice");
    }

    /// Removes `key`; returns whether it was present.
    pub fn remove(&mut self, key: &QueueKey) -> bool {
        self.set.remove(key)
    }

    /// The timer that fires next, if any.
    pub fn first(&self) -> Option<&QueueKey> {
        self.set.first()
    }

    pub fn len(&self) -> usize {
        self.set.len()
    }

    /// Queued timers in firing order.
    pub fn iter(&self) -> impl Iterator<Item = &QueueKey> + '_ {
        self.set.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::timing::slab::SlabIndex;

    fn key(at: u64, seq: u64) -> QueueKey {
        #[allow(clippy::cast_possible_truncation)]
        let deadline = Tick::new(at as i32);
        QueueKey {
            at,
            seq,
            deadline,
            handle: TimerHandle::from_parts(0, SlabIndex::from(0u32), 0),
        }
    }

    #[test]
    fn first_is_earliest_deadline() {
        let mut q = TimerQueue::default();
        q.insert(key(30, 0));
        q.insert(key(10, 1));
        q.insert(key(20, 2));
        assert_eq!(q.first().map(|k| k.at), Some(10));
        assert_eq!(q.len(), 3);
    }

    #[test]
    fn ties_break_by_sequence() {
        let mut q = TimerQueue::default();
        q.insert(key(5, 7));
        q.insert(key(5, 3));
        let seqs: Vec<u64> = q.iter().map(|k| k.seq).collect();
        assert_eq!(seqs, vec![3, 7]);
    }

    #[test]
    fn overdue_key_stays_ahead_of_maximum_delay() {
        // Counter at 1, one timer due at 0 and one a full i32::MAX out: their
        // wrapping deadlines differ by more than half the range.
        let mut q = TimerQueue::default();
        let far = QueueKey {
            deadline: Tick::new(1).wrapping_add(i32::MAX),
            ..key(1 + u64::from(i32::MAX.unsigned_abs()), 1)
        };
        q.insert(far);
        q.insert(key(0, 0));
        assert_eq!(q.first().map(|k| k.at), Some(0));
        assert!(q.remove(&far));
        assert_eq!(q.len(), 1);
    }

    #[test]
    fn remove_reports_presence() {
        let mut q = TimerQueue::default();
        let k = key(1, 0);
        q.insert(k);
        assert!(q.remove(&k));
        assert!(!q.remove(&k));
        assert!(q.first().is_none());
    }
}
