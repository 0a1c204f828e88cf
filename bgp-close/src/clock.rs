// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use close_common::lock;
use slog::{debug, Logger};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::{spawn, JoinHandle};
use std::time::{Duration, Instant};

/// A named one-shot cancellable timer.
///
/// Arming the timer spawns a worker thread that waits out the interval and
/// then runs the callback. Re-arming or cancelling invalidates any earlier
/// arming by bumping a generation counter; a superseded worker wakes up,
/// notices the bump and exits without firing. Zero-length intervals are the
/// mechanism used to hop work onto a timer callback context.
///
/// Cancellation does not join workers, because it runs while the caller
/// holds its own state lock (possibly from inside a callback of this very
/// timer). A worker that already passed its deadline check can therefore
/// still deliver a fire after `cancel` returns; callbacks must re-check
/// state and treat such deliveries as no-ops. Dropping the timer cancels
/// and then joins every worker, so no callback survives the owner.
pub struct Timer {
    name: String,
    inner: Arc<TimerInner>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    log: Logger,
}

struct TimerInner {
    state: Mutex<TimerState>,
    cv: Condvar,
}

struct TimerState {
    /// Bumped on every start/cancel. A worker only fires while its own
    /// generation is still current.
    generation: u64,

    /// When the current arming started. `None` while idle.
    started: Option<Instant>,
}

impl Timer {
    pub fn new(name: &str, log: Logger) -> Self {
        Self {
            name: name.to_string(),
            inner: Arc::new(TimerInner {
                state: Mutex::new(TimerState {
                    generation: 0,
                    started: None,
                }),
                cv: Condvar::new(),
            }),
            workers: Mutex::new(Vec::new()),
            log,
        }
    }

    /// Arm the timer, replacing any previous arming.
    pub fn start<F>(&self, interval: Duration, callback: F)
    where
        F: FnOnce() + Send + 'static,
    {
        let deadline = Instant::now() + interval;
        let generation = {
            let mut ts = lock!(self.inner.state);
            ts.generation += 1;
            ts.started = Some(Instant::now());
            ts.generation
        };
        self.inner.cv.notify_all();
        self.reap();

        let inner = Arc::clone(&self.inner);
        let handle = spawn(move || {
            let mut ts = lock!(inner.state);
            loop {
                if ts.generation != generation {
                    return;
                }
                let now = Instant::now();
                if now >= deadline {
                    break;
                }
                let (guard, _timeout) = inner
                    .cv
                    .wait_timeout(ts, deadline - now)
                    .expect("poisoned lock");
                ts = guard;
            }
            // Deadline reached with this arming still current. The callback
            // runs outside the timer lock so it may re-arm freely.
            drop(ts);
            callback();
        });
        lock!(self.workers).push(handle);
    }

    /// Disarm the timer. See the cancellation caveat on [`Timer`].
    pub fn cancel(&self) {
        {
            let mut ts = lock!(self.inner.state);
            ts.generation += 1;
            ts.started = None;
        }
        self.inner.cv.notify_all();
        debug!(self.log, "timer cancelled"; "timer" => &self.name);
    }

    /// Time since the current arming started, zero while idle.
    pub fn elapsed(&self) -> Duration {
        lock!(self.inner.state)
            .started
            .map(|t| t.elapsed())
            .unwrap_or_default()
    }

    fn reap(&self) {
        lock!(self.workers).retain(|h| !h.is_finished());
    }
}

impl Drop for Timer {
    fn drop(&mut self) {
        {
            let mut ts = lock!(self.inner.state);
            ts.generation += 1;
            ts.started = None;
        }
        self.inner.cv.notify_all();
        for h in lock!(self.workers).drain(..) {
            let _ = h.join();
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::log::init_logger;
    use std::sync::mpsc::channel;

    #[test]
    fn one_shot_fire() {
        let t = Timer::new("fire", init_logger());
        let (tx, rx) = channel();
        t.start(Duration::from_millis(20), move || {
            tx.send("fired").unwrap();
        });
        assert_eq!(rx.recv_timeout(Duration::from_secs(5)).unwrap(), "fired");
        // one-shot: nothing else arrives
        assert!(rx.recv_timeout(Duration::from_millis(100)).is_err());
    }

    #[test]
    fn cancel_suppresses_fire() {
        let t = Timer::new("cancel", init_logger());
        let (tx, rx) = channel();
        t.start(Duration::from_millis(100), move || {
            tx.send(()).unwrap();
        });
        t.cancel();
        assert_eq!(t.elapsed(), Duration::ZERO);
        assert!(rx.recv_timeout(Duration::from_millis(300)).is_err());
    }

    #[test]
    fn rearm_replaces_previous() {
        let t = Timer::new("rearm", init_logger());
        let (tx, rx) = channel();
        let tx1 = tx.clone();
        t.start(Duration::from_millis(50), move || {
            tx1.send(1).unwrap();
        });
        t.start(Duration::from_millis(10), move || {
            tx.send(2).unwrap();
        });
        assert_eq!(rx.recv_timeout(Duration::from_secs(5)).unwrap(), 2);
        assert!(rx.recv_timeout(Duration::from_millis(200)).is_err());
    }

    #[test]
    fn elapsed_tracks_arming() {
        let t = Timer::new("elapsed", init_logger());
        assert_eq!(t.elapsed(), Duration::ZERO);
        t.start(Duration::from_secs(60), || {});
        std::thread::sleep(Duration::from_millis(50));
        assert!(t.elapsed() >= Duration::from_millis(50));
        t.cancel();
        assert_eq!(t.elapsed(), Duration::ZERO);
    }

    #[test]
    fn zero_interval_fires_immediately() {
        let t = Timer::new("zero", init_logger());
        let (tx, rx) = channel();
        t.start(Duration::ZERO, move || {
            tx.send(()).unwrap();
        });
        assert!(rx.recv_timeout(Duration::from_secs(5)).is_ok());
    }
}
