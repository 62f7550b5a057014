//! Userspace clock driver: a periodic tick source plus a deferred drain context.
//!
//! # Architecture
//!
//! [`Clock::spawn`] starts two threads around a shared [`TimerScheduler`]:
//! - **Hard thread** (`softclock-hard`): wakes once per tick, calls
//!   [`TimerScheduler::tick_advance`] and, when it asks for one, raises the
//!   pending-drain flag. It never runs callbacks, so slow callbacks cannot make
//!   it lose ticks. Between ticks it waits on a condition variable, so
//!   shutdown does not have to sit out the rest of a long tick.
//! - **Soft thread** (`softclock-soft`): sleeps until the flag is raised, clears
//!   it and calls [`TimerScheduler::drain`]. Requests raised while a drain is
//!   running collapse into one more drain, which is enough because every
//!   drain fires everything due at the moment it looks. A callback that
//!   panics is logged and counted; the thread keeps draining.
//!
//! The scheduler stays usable from any other thread while the clock runs.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use softclock::{Clock, ClockConfig, TimerScheduler};
//!
//! let config = ClockConfig::new(1000)?;
//! let scheduler = Arc::new(TimerScheduler::new(&config));
//! let clock = Clock::spawn(Arc::clone(&scheduler), &config)?;
//!
//! let timer = scheduler.bind(|_, _| println!("fired"));
//! scheduler.schedule(timer, 5);
//!
//! clock.shutdown();
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::thread::{self, JoinHandle};

use minstant::Instant;
use parking_lot::{Condvar, Mutex};
use serde::{Deserialize, Serialize};

use crate::config::ClockConfig;
use crate::timing::TimerScheduler;
use crate::trace::{debug, error, info, warn};

/// Error starting the clock.
#[derive(Debug, thiserror::Error)]
pub enum ClockError {
    /// The OS refused to create one of the clock threads.
    #[error("failed to spawn {thread} thread: {source}")]
    Spawn {
        thread: &'static str,
        #[source]
        source: std::io::Error,
    },
}

/// Counters kept by the clock threads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ClockStats {
    /// Ticks delivered to the scheduler.
    pub ticks: u64,
    /// Drains run by the soft thread.
    pub drains: u64,
    /// Callbacks fired by drains that ran to completion.
    pub fired: u64,
    /// Drains cut short by a panicking callback.
    pub panics: u64,
}

/// State shared between the handle and both threads.
struct Shared {
    scheduler: Arc<TimerScheduler>,
    shutdown: AtomicBool,
    /// Set by the hard thread, cleared by the soft thread before draining.
    drain_pending: Mutex<bool>,
    /// Wakes the soft thread.
    wake: Condvar,
    /// Wakes the hard thread early on shutdown.
    tick_wake: Condvar,
    ticks: AtomicU64,
    drains: AtomicU64,
    fired: AtomicU64,
    panics: AtomicU64,
}

impl Shared {
    fn new(scheduler: Arc<TimerScheduler>) -> Self {
        Self {
            scheduler,
            shutdown: AtomicBool::new(false),
            drain_pending: Mutex::new(false),
            wake: Condvar::new(),
            tick_wake: Condvar::new(),
            ticks: AtomicU64::new(0),
            drains: AtomicU64::new(0),
            fired: AtomicU64::new(0),
            panics: AtomicU64::new(0),
        }
    }

    fn request_drain(&self) {
        let mut pending = self.drain_pending.lock();
        if !*pending {
            *pending = true;
            self.wake.notify_one();
        }
    }

    fn request_shutdown(&self) {
        self.shutdown.store(true, Ordering::Release);
        // Take the lock so neither thread can miss the wakeup between
        // checking the flag and parking.
        let _pending = self.drain_pending.lock();
        self.wake.notify_all();
        self.tick_wake.notify_all();
    }

    fn is_shutdown(&self) -> bool {
        self.shutdown.load(Ordering::Acquire)
    }

    fn run_hard(&self, tick: std::time::Duration) {
        let mut next = Instant::now() + tick;
        let mut lagging = false;
        while !self.is_shutdown() {
            let now = Instant::now();
            if now < next {
                lagging = false;
                let mut pending = self.drain_pending.lock();
                if !self.is_shutdown() {
                    self.tick_wake.wait_for(&mut pending, next.duration_since(now));
                }
                continue;
            }
            // A late wakeup delivers the missed ticks back to back.
            if !lagging && now.duration_since(next) >= tick {
                lagging = true;
                warn!(
                    behind_ns = now.duration_since(next).as_nanos(),
                    "hard thread fell behind, catching up"
                );
            }
            next += tick;
            self.ticks.fetch_add(1, Ordering::Relaxed);
            if self.scheduler.tick_advance() {
                self.request_drain();
            }
        }
    }

    fn run_soft(&self) {
        loop {
            {
                let mut pending = self.drain_pending.lock();
                while !*pending && !self.is_shutdown() {
                    self.wake.wait(&mut pending);
                }
                if self.is_shutdown() {
                    return;
                }
                *pending = false;
            }
            let scheduler = &self.scheduler;
            match panic::catch_unwind(AssertUnwindSafe(|| scheduler.drain())) {
                Ok(fired) => {
                    self.drains.fetch_add(1, Ordering::Relaxed);
                    self.fired.fetch_add(fired as u64, Ordering::Relaxed);
                }
                Err(payload) => {
                    self.panics.fetch_add(1, Ordering::Relaxed);
                    error!(
                        panic = panic_message(payload.as_ref()),
                        "timer callback panicked"
                    );
                    drop(payload);
                    // Timers still due behind the panicking one get another pass.
                    self.request_drain();
                }
            }
        }
    }
}

#[cfg_attr(not(feature = "tracing"), allow(dead_code))]
fn panic_message(payload: &(dyn std::any::Any + Send)) -> &str {
    if let Some(msg) = payload.downcast_ref::<&'static str>() {
        msg
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg
    } else {
        "<non-string panic payload>"
    }
}

/// Handle to a running clock.
///
/// Dropping the handle signals shutdown but does not wait for the threads.
/// Use [`Clock::shutdown`] to stop and join them.
pub struct Clock {
    shared: Arc<Shared>,
    hard_handle: Option<JoinHandle<()>>,
    soft_handle: Option<JoinHandle<()>>,
}

impl Clock {
    /// Starts ticking `scheduler` at `config.hz()`.
    ///
    /// # Errors
    ///
    /// Returns an error if either thread cannot be spawned. Nothing is left
    /// running in that case.
    pub fn spawn(scheduler: Arc<TimerScheduler>, config: &ClockConfig) -> Result<Self, ClockError> {
        let tick = config.tick_duration();
        info!(hz = config.hz(), tick_ns = config.tick_nanos(), "clock starting");

        let shared = Arc::new(Shared::new(scheduler));

        debug!("spawning soft thread");
        let soft = Arc::clone(&shared);
        let soft_handle = thread::Builder::new()
            .name("softclock-soft".into())
            .spawn(move || {
                info!("soft thread started");
                soft.run_soft();
                info!("soft thread exiting");
            })
            .map_err(|source| {
                error!(error = %source, "failed to spawn soft thread");
                ClockError::Spawn {
                    thread: "soft",
                    source,
                }
            })?;

        debug!("spawning hard thread");
        let hard = Arc::clone(&shared);
        let hard_handle = match thread::Builder::new()
            .name("softclock-hard".into())
            .spawn(move || {
                info!("hard thread started");
                hard.run_hard(tick);
                info!("hard thread exiting");
            }) {
            Ok(handle) => handle,
            Err(source) => {
                error!(error = %source, "failed to spawn hard thread");
                shared.request_shutdown();
                let _ = soft_handle.join();
                return Err(ClockError::Spawn {
                    thread: "hard",
                    source,
                });
            }
        };

        info!("clock started");
        Ok(Self {
            shared,
            hard_handle: Some(hard_handle),
            soft_handle: Some(soft_handle),
        })
    }

    /// The scheduler this clock drives.
    #[must_use]
    pub fn scheduler(&self) -> &Arc<TimerScheduler> {
        &self.shared.scheduler
    }

    /// Current counters.
    #[must_use]
    pub fn stats(&self) -> ClockStats {
        ClockStats {
            ticks: self.shared.ticks.load(Ordering::Relaxed),
            drains: self.shared.drains.load(Ordering::Relaxed),
            fired: self.shared.fired.load(Ordering::Relaxed),
            panics: self.shared.panics.load(Ordering::Relaxed),
        }
    }

    /// Stops both threads and waits for them to exit.
    ///
    /// A drain in progress finishes first; queued timers stay queued.
    pub fn shutdown(mut self) {
        info!("clock shutdown initiated");
        self.shared.request_shutdown();

        if let Some(handle) = self.hard_handle.take() {
            debug!("waiting for hard thread to exit");
            if handle.join().is_err() {
                error!("hard thread panicked");
            }
        }
        if let Some(handle) = self.soft_handle.take() {
            debug!("waiting for soft thread to exit");
            if handle.join().is_err() {
                error!("soft thread panicked");
            }
        }

        info!("clock shutdown complete");
    }
}

impl Drop for Clock {
    fn drop(&mut self) {
        self.shared.request_shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn shutdown_joins_promptly() {
        let config = ClockConfig::new(1000).unwrap();
        let scheduler = Arc::new(TimerScheduler::new(&config));
        let clock = Clock::spawn(scheduler, &config).unwrap();
        thread::sleep(Duration::from_millis(20));
        let stats = clock.stats();
        assert!(stats.ticks > 0, "hard thread should be ticking");
        clock.shutdown();
    }

    #[test]
    fn shutdown_does_not_wait_out_a_slow_tick() {
        let config = ClockConfig::new(1).unwrap();
        let scheduler = Arc::new(TimerScheduler::new(&config));
        let clock = Clock::spawn(scheduler, &config).unwrap();
        thread::sleep(Duration::from_millis(20));

        let started = std::time::Instant::now();
        clock.shutdown();
        assert!(
            started.elapsed() < Duration::from_millis(500),
            "shutdown took {:?} at 1 Hz",
            started.elapsed()
        );
    }

    #[test]
    fn threads_are_named() {
        let config = ClockConfig::default();
        let clock = Clock::spawn(Arc::new(TimerScheduler::new(&config)), &config).unwrap();
        let name = |h: &Option<JoinHandle<()>>| {
            h.as_ref()
                .and_then(|h| h.thread().name().map(str::to_owned))
        };
        assert_eq!(name(&clock.hard_handle).as_deref(), Some("softclock-hard"));
        assert_eq!(name(&clock.soft_handle).as_deref(), Some("softclock-soft"));
        clock.shutdown();
    }

    #[test]
    fn drain_requests_coalesce() {
        let shared = Shared::new(Arc::new(TimerScheduler::default()));
        shared.request_drain();
        shared.request_drain();
        assert!(*shared.drain_pending.lock());
        shared.request_shutdown();
        // Soft loop observes shutdown and returns without draining.
        shared.run_soft();
        assert_eq!(shared.drains.load(Ordering::Relaxed), 0);
    }

    #[test]
    fn panic_payload_text() {
        let boxed: Box<dyn std::any::Any + Send> = Box::new(String::from("boom"));
        assert_eq!(panic_message(boxed.as_ref()), "boom");
        let boxed: Box<dyn std::any::Any + Send> = Box::new("static");
        assert_eq!(panic_message(boxed.as_ref()), "static");
        let boxed: Box<dyn std::any::Any + Send> = Box::new(7u8);
        assert_eq!(panic_message(boxed.as_ref()), "<non-string panic payload>");
    }
}
