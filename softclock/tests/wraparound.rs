//! Due-ness across counter overflow.

use std::sync::Arc;

use parking_lot::Mutex;
use proptest::prelude::*;
use softclock::{ClockConfig, Tick, TimerScheduler};

proptest! {
    /// A deadline `d` ticks out is not due after any `k < d` advances and is
    /// due after exactly `d`, wherever the counter starts.
    #[test]
    fn due_exactly_after_delay(t0 in any::<i32>(), d in 0..=i32::MAX, k in 0..=i32::MAX) {
        let now = Tick::new(t0);
        let deadline = now.wrapping_add(d);
        let later = now.wrapping_add(k);
        prop_assert_eq!(deadline.is_due(later), k >= d);
        prop_assert!(deadline.is_due(now.wrapping_add(d)));
    }

    /// Relative order of two deadlines matches the order of their delays.
    #[test]
    fn deadlines_order_like_delays(t0 in any::<i32>(), a in 0..=i32::MAX, b in 0..=i32::MAX) {
        let now = Tick::new(t0);
        let (da, db) = (now.wrapping_add(a), now.wrapping_add(b));
        prop_assert_eq!(da.cmp_relative(db), a.cmp(&b));
    }

    /// Driving the scheduler tick by tick from an arbitrary start fires the
    /// timer on exactly the `d`-th advance.
    #[test]
    fn scheduler_fires_on_dth_tick(t0 in any::<i32>(), d in 0..64i32) {
        let s = TimerScheduler::new(&ClockConfig::default().with_initial_tick(t0));
        let h = s.bind(|_, _| {});
        s.schedule(h, d);
        if d == 0 {
            prop_assert_eq!(s.drain(), 1);
        } else {
            for _ in 1..d {
                s.tick_advance();
                prop_assert_eq!(s.drain(), 0);
            }
            s.tick_advance();
            prop_assert_eq!(s.drain(), 1);
        }
        prop_assert!(s.is_triggered(h));
    }

    /// Overdue timers, near-term timers and timers close to the maximum delay
    /// share the set: every due timer fires, in due order, and every far one
    /// can still be cancelled.
    #[test]
    fn large_delays_mix_with_overdue_timers(
        t0 in any::<i32>(),
        overdue in proptest::collection::vec(0..8i32, 1..6),
        lag in 8..40usize,
        near in proptest::collection::vec(0..8i32, 0..6),
        far in proptest::collection::vec((i32::MAX - 1_000)..=i32::MAX, 1..6),
    ) {
        let s = TimerScheduler::new(&ClockConfig::default().with_initial_tick(t0));
        let fired = Arc::new(Mutex::new(Vec::new()));
        let bind = |tag: (u8, usize)| {
            let fired = Arc::clone(&fired);
            s.bind(move |sched, _| fired.lock().push((tag, sched.now())))
        };

        for (i, &d) in overdue.iter().enumerate() {
            s.schedule(bind((0, i)), d);
        }
        // Ticks pass with no drain: all of the first batch is now overdue.
        for _ in 0..lag {
            s.tick_advance();
        }
        let far_handles: Vec<_> = far
            .iter()
            .enumerate()
            .map(|(i, &d)| {
                let h = bind((2, i));
                s.schedule(h, d);
                h
            })
            .collect();
        for (i, &d) in near.iter().enumerate() {
            s.schedule(bind((1, i)), d);
        }

        prop_assert_eq!(s.drain(), overdue.len() + near.iter().filter(|&&d| d == 0).count());
        for _ in 0..8 {
            s.tick_advance();
            s.drain();
        }
        let log = fired.lock().clone();
        prop_assert_eq!(log.len(), overdue.len() + near.len());
        prop_assert!(log.iter().all(|((group, _), _)| *group != 2));
        // The overdue batch fires first, ahead of anything scheduled later.
        prop_assert!(log[..overdue.len()].iter().all(|((group, _), _)| *group == 0));

        prop_assert_eq!(s.pending_count(), far.len());
        for h in far_handles {
            prop_assert!(s.cancel(h));
        }
        prop_assert_eq!(s.pending_count(), 0);
    }
}

#[test]
fn overdue_timer_and_maximum_delay_across_the_wrap() {
    let s = TimerScheduler::new(&ClockConfig::default().with_initial_tick(i32::MAX - 1));
    let order = Arc::new(Mutex::new(Vec::new()));
    let bind = |name: &'static str| {
        let order = Arc::clone(&order);
        s.bind(move |_, _| order.lock().push(name))
    };
    let overdue = bind("overdue");
    let far = bind("far");
    s.schedule(overdue, 1);
    for _ in 0..3 {
        s.tick_advance();
    }
    s.schedule(far, i32::MAX);

    assert_eq!(s.drain(), 1);
    assert_eq!(*order.lock(), vec!["overdue"]);
    assert_eq!(s.deadline(far), Some(s.now().wrapping_add(i32::MAX)));
    let snap = s.snapshot();
    assert_eq!(snap.timers.len(), 1);
    assert_eq!(snap.timers[0].remaining, i32::MAX);
    assert!(s.cancel(far));
    assert_eq!(s.pending_count(), 0);
}

#[test]
fn near_max_start_wraps_and_fires() {
    let s = TimerScheduler::new(&ClockConfig::default().with_initial_tick(i32::MAX));
    let h = s.bind(|_, _| {});
    s.schedule(h, 1);
    s.tick_advance();
    assert_eq!(s.now(), Tick::new(i32::MIN));
    assert_eq!(s.drain(), 1);
}
