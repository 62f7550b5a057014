//! The timer scheduler: one ordered set of pending one-shot timers, a wrapping
//! tick counter, and the lock that guards both.
//!
//! # Protocol
//!
//! - The tick source calls [`TimerScheduler::tick_advance`] once per tick. It
//!   only bumps the counter and reports that a drain is due.
//! - A lower-priority context then calls [`TimerScheduler::drain`], which pops
//!   due timers one at a time from the front of the set and runs each
//!   callback with the lock released.
//! - Any thread, callbacks included, may [`schedule`](TimerScheduler::schedule)
//!   or [`cancel`](TimerScheduler::cancel) at any time.
//!
//! # Deadlines
//!
//! A deadline is `now + delay` in wrapping arithmetic; that is the value
//! handed out by [`TimerScheduler::deadline`] and shown in snapshots. The set
//! itself is ordered by a second, non-wrapping `u64` count of ticks advanced
//! since the scheduler was created. An overdue timer and one scheduled
//! `i32::MAX` ticks out can sit in the set together, which is more than half
//! the `i32` range apart, so their wrapping difference alone cannot order them.
//!
//! # Cancellation race
//!
//! `drain` dequeues a timer before releasing the lock to run its callback. A
//! `cancel` that arrives after that point finds nothing to remove and returns
//! `false` while the callback runs (or is about to).

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use parking_lot::{Mutex, MutexGuard};
use serde::{Deserialize, Serialize};

use crate::config::ClockConfig;
use crate::timing::queue::{QueueKey, TimerQueue};
use crate::timing::slab::{Slab, SlabIndex};
use crate::timing::snapshot::{PendingSnapshot, PendingTimer};
use crate::timing::tick::Tick;
use crate::timing::time::{self, Duration, TimeUnit};
use crate::trace::{debug, error, trace};

/// Function run when a timer expires.
///
/// It receives the scheduler that fired it and its own handle, so it can
/// reschedule itself. Anything else it needs is captured by the closure.
pub type Callback = Arc<dyn Fn(&TimerScheduler, TimerHandle) + Send + Sync>;

/// Source of scheduler ids stamped into every handle.
static NEXT_SCHEDULER_ID: AtomicU32 = AtomicU32::new(0);

/// Handle to a bound timer.
///
/// Carries the id of the scheduler that issued it plus the slot index and
/// generation, so stale handles and handles from another scheduler are both
/// detected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimerHandle {
    owner: u32,
    idx: SlabIndex<TimerEntry>,
    generation: u32,
}

impl TimerHandle {
    pub(crate) const fn from_parts(
        owner: u32,
        idx: SlabIndex<TimerEntry>,
        generation: u32,
    ) -> Self {
        Self {
            owner,
            idx,
            generation,
        }
    }

    /// Id of the scheduler that issued this handle.
    #[must_use]
    pub const fn owner(self) -> u32 {
        self.owner
    }

    /// Arena slot this handle points at.
    #[must_use]
    pub fn slot(self) -> u32 {
        u32::from(self.idx)
    }

    /// Generation of the slot occupant this handle was issued for.
    #[must_use]
    pub const fn generation(self) -> u32 {
        self.generation
    }
}

/// Externally visible state of a timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TimerState {
    /// Never bound, or released.
    Uninitialized,
    /// Bound but not queued.
    Idle,
    /// Waiting in the set for its deadline.
    Queued,
    /// Dequeued by a drain and handed to its callback.
    Triggered,
}

/// Scheduling state of a bound entry. The deadline only exists while queued.
#[derive(Debug, Clone, Copy)]
enum EntryState {
    Idle,
    Queued { key: QueueKey },
    Triggered,
}

pub(crate) struct TimerEntry {
    callback: Callback,
    state: EntryState,
}

/// Everything behind the scheduler lock.
struct Inner {
    id: u32,
    now: Tick,
    /// Ticks advanced since creation; orders the set.
    elapsed: u64,
    queue: TimerQueue,
    entries: Slab<TimerEntry>,
    next_seq: u64,
}

impl Inner {
    /// The entry behind `handle`, if it is bound to this scheduler.
    fn entry(&self, handle: TimerHandle) -> Option<&TimerEntry> {
        if handle.owner != self.id {
            return None;
        }
        self.entries.get(handle.idx, handle.generation)
    }

    fn entry_mut(&mut self, handle: TimerHandle) -> Option<&mut TimerEntry> {
        if handle.owner != self.id {
            return None;
        }
        self.entries.get_mut(handle.idx, handle.generation)
    }

    /// Takes the timer out of the set if it is queued. Returns `None` for an
    /// unbound handle, otherwise whether a removal happened.
    fn cancel(&mut self, handle: TimerHandle) -> Option<bool> {
        let entry = self.entry_mut(handle)?;
        let removed = match core::mem::replace(&mut entry.state, EntryState::Idle) {
            EntryState::Queued { key } => {
                let found = self.queue.remove(&key);
                debug_assert!(found, "queued timer {handle:?} missing from the set");
                true
            }
            EntryState::Idle | EntryState::Triggered => false,
        };
        Some(removed)
    }

    /// (Re)queues the timer `ticks` from now. Returns the deadline, or `None`
    /// for an unbound handle.
    fn schedule(&mut self, handle: TimerHandle, ticks: i32) -> Option<Tick> {
        self.cancel(handle)?;
        let key = QueueKey {
            at: self.elapsed + u64::from(ticks.unsigned_abs()),
            seq: self.next_seq,
            deadline: self.now.wrapping_add(ticks),
            handle,
        };
        self.next_seq += 1;
        let entry = self.entry_mut(handle)?;
        entry.state = EntryState::Queued { key };
        self.queue.insert(key);
        trace!(?handle, ticks, deadline = %key.deadline, "timer scheduled");
        Some(key.deadline)
    }

    /// Dequeues the earliest timer if it is due and marks it triggered.
    fn expire_next(&mut self) -> Option<(TimerHandle, Callback)> {
        let key = *self.queue.first()?;
        if key.at > self.elapsed {
            return None;
        }
        let late = self.elapsed - key.at;
        debug_assert!(
            late > u64::from(i32::MAX.unsigned_abs()) || key.deadline.is_due(self.now),
            "{key:?} due by count but not on the counter"
        );
        if late > 0 {
            debug!(handle = ?key.handle, late, "timer fired late");
        }
        self.queue.remove(&key);
        let Some(entry) = self.entry_mut(key.handle) else {
            unreachable!("queued key {key:?} refers to an unbound timer");
        };
        entry.state = EntryState::Triggered;
        Some((key.handle, Arc::clone(&entry.callback)))
    }
}

/// Shared scheduler for tick-driven one-shot timers.
///
/// Typically wrapped in an [`Arc`] and shared between the tick source, the
/// drain context, and the application.
pub struct TimerScheduler {
    inner: Mutex<Inner>,
    hz: u32,
}

impl TimerScheduler {
    /// Creates a scheduler whose counter starts at `config.initial_tick`.
    #[must_use]
    pub fn new(config: &ClockConfig) -> Self {
        Self {
            inner: Mutex::new(Inner {
                id: NEXT_SCHEDULER_ID.fetch_add(1, Ordering::Relaxed),
                now: Tick::new(config.initial_tick),
                elapsed: 0,
                queue: TimerQueue::default(),
                entries: Slab::with_capacity(config.initial_capacity),
                next_seq: 0,
            }),
            hz: config.hz(),
        }
    }

    /// Ticks per second used for real-time conversions.
    #[must_use]
    pub const fn hz(&self) -> u32 {
        self.hz
    }

    /// Binds a new idle timer to `callback`.
    pub fn bind<F>(&self, callback: F) -> TimerHandle
    where
        F: Fn(&TimerScheduler, TimerHandle) + Send + Sync + 'static,
    {
        let mut inner = self.inner.lock();
        let (idx, generation) = inner.entries.alloc(TimerEntry {
            callback: Arc::new(callback),
            state: EntryState::Idle,
        });
        let handle = TimerHandle::from_parts(inner.id, idx, generation);
        trace!(?handle, "timer bound");
        handle
    }

    /// Cancels the timer if queued and frees its slot. The handle goes stale.
    ///
    /// Returns `false` if the handle was not bound. A callback already
    /// dequeued by a drain still runs.
    pub fn release(&self, handle: TimerHandle) -> bool {
        let mut inner = self.inner.lock();
        if inner.cancel(handle).is_none() {
            return false;
        }
        inner.entries.free(handle.idx, handle.generation);
        trace!(?handle, "timer released");
        true
    }

    /// Queues the timer to fire `ticks` ticks from now.
    ///
    /// A timer that is already queued is moved, never duplicated. Clears the
    /// triggered state. A delay of zero fires on the next drain.
    ///
    /// # Panics
    ///
    /// Panics if `ticks` is negative, and in debug builds if `handle` is not
    /// bound to this scheduler.
    pub fn schedule(&self, handle: TimerHandle, ticks: i32) {
        assert!(ticks >= 0, "schedule: negative delay ({ticks} ticks)");
        let mut inner = self.inner.lock();
        if inner.schedule(handle, ticks).is_none() {
            drop(inner);
            unbound("schedule", handle);
        }
    }

    /// Queues the timer after a real-time delay, rounded down to whole ticks
    /// and capped at `i32::MAX` ticks.
    pub fn schedule_after<U: TimeUnit>(&self, handle: TimerHandle, delay: Duration<U>) {
        self.schedule(handle, time::ticks_for(delay, self.hz));
    }

    /// [`schedule_after`](Self::schedule_after) for a [`std::time::Duration`].
    pub fn schedule_for(&self, handle: TimerHandle, delay: std::time::Duration) {
        self.schedule(handle, time::nanos_to_ticks(delay.as_nanos(), self.hz));
    }

    /// Removes the timer from the set.
    ///
    /// Returns whether it was queued. Always clears the triggered state.
    ///
    /// # Panics
    ///
    /// Panics in debug builds if `handle` is not bound to this scheduler.
    pub fn cancel(&self, handle: TimerHandle) -> bool {
        let mut inner = self.inner.lock();
        match inner.cancel(handle) {
            Some(removed) => {
                trace!(?handle, removed, "timer cancelled");
                removed
            }
            None => {
                drop(inner);
                unbound("cancel", handle);
                false
            }
        }
    }

    /// Advances the tick counter by one.
    ///
    /// Called once per tick by the tick source. Returns `true` when a
    /// [`drain`](Self::drain) should be scheduled, which is after every tick.
    pub fn tick_advance(&self) -> bool {
        let mut inner = self.inner.lock();
        inner.now = inner.now.next();
        inner.elapsed += 1;
        true
    }

    /// Fires every timer that is due, earliest deadline first.
    ///
    /// The set is re-examined after each callback, so timers queued by a
    /// callback with delay zero, and ticks advanced meanwhile, are handled
    /// before returning. Returns the number of callbacks run.
    pub fn drain(&self) -> usize {
        let mut fired = 0;
        let mut inner = self.inner.lock();
        while let Some((handle, callback)) = inner.expire_next() {
            MutexGuard::unlocked(&mut inner, || callback(self, handle));
            fired += 1;
        }
        fired
    }

    /// Current value of the tick counter.
    #[must_use]
    pub fn now(&self) -> Tick {
        self.inner.lock().now
    }

    /// State of the timer behind `handle`.
    #[must_use]
    pub fn state(&self, handle: TimerHandle) -> TimerState {
        let inner = self.inner.lock();
        match inner.entry(handle) {
            None => TimerState::Uninitialized,
            Some(entry) => match entry.state {
                EntryState::Idle => TimerState::Idle,
                EntryState::Queued { .. } => TimerState::Queued,
                EntryState::Triggered => TimerState::Triggered,
            },
        }
    }

    /// Whether the timer is queued.
    #[must_use]
    pub fn is_pending(&self, handle: TimerHandle) -> bool {
        self.state(handle) == TimerState::Queued
    }

    /// Whether the timer has fired and not been rescheduled or cancelled since.
    #[must_use]
    pub fn is_triggered(&self, handle: TimerHandle) -> bool {
        self.state(handle) == TimerState::Triggered
    }

    /// Whether `handle` refers to a bound timer.
    #[must_use]
    pub fn is_bound(&self, handle: TimerHandle) -> bool {
        self.state(handle) != TimerState::Uninitialized
    }

    /// Deadline of the timer while it is queued.
    #[must_use]
    pub fn deadline(&self, handle: TimerHandle) -> Option<Tick> {
        let inner = self.inner.lock();
        match inner.entry(handle)?.state {
            EntryState::Queued { key } => Some(key.deadline),
            EntryState::Idle | EntryState::Triggered => None,
        }
    }

    /// Number of queued timers.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.inner.lock().queue.len()
    }

    /// Number of bound timers, queued or not.
    #[must_use]
    pub fn bound_count(&self) -> usize {
        self.inner.lock().entries.len()
    }

    /// Copies out every queued timer in firing order.
    #[must_use]
    pub fn snapshot(&self) -> PendingSnapshot {
        let inner = self.inner.lock();
        let now = inner.now;
        let timers = inner
            .queue
            .iter()
            .map(|key| PendingTimer {
                owner: key.handle.owner,
                slot: key.handle.slot(),
                generation: key.handle.generation,
                deadline: key.deadline,
                remaining: remaining_ticks(key.at, inner.elapsed),
            })
            .collect();
        PendingSnapshot { now, timers }
    }
}

impl Default for TimerScheduler {
    fn default() -> Self {
        Self::new(&ClockConfig::default())
    }
}

/// `at - elapsed`, clamped to the `i32` range.
fn remaining_ticks(at: u64, elapsed: u64) -> i32 {
    if at >= elapsed {
        i32::try_from(at - elapsed).unwrap_or(i32::MAX)
    } else {
        i32::try_from(elapsed - at).map_or(i32::MIN, |late| -late)
    }
}

/// Reports use of a handle that is not bound here: fatal in debug builds.
fn unbound(op: &'static str, handle: TimerHandle) {
    error!(op, ?handle, "operation on unbound timer");
    if cfg!(debug_assertions) {
        panic!("{op}: timer {handle:?} is not bound to this scheduler");
    }
}
