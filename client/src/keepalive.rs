//! Periodic liveness signaling for the client session.

use std::time::{Duration, Instant};

/// Tick-confined repeating timer for the keep-alive command.
///
/// The session starts the timer exactly once, on the first Connect event,
/// and polls it every tick; a fire means "enqueue a keep-alive now". The
/// first fire happens one full interval after starting. Starting while
/// already running is a no-op and never creates a second concurrent timer;
/// the timer must be stopped before the session is torn down so it cannot
/// fire against a stale connection.
#[derive(Debug)]
pub struct KeepAliveTimer {
    interval: Duration,
    running: bool,
    last_fired: Instant,
}

impl KeepAliveTimer {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            running: false,
            last_fired: Instant::now(),
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Starts the timer; no-op when it is already running.
    pub fn start(&mut self) {
        if self.running {
            return;
        }
        self.running = true;
        self.last_fired = Instant::now();
    }

    pub fn stop(&mut self) {
        self.running = false;
    }

    /// True when a full interval has elapsed since the last fire. The fire
    /// time is consumed, so a single elapsed interval yields exactly one
    /// fire no matter how often the timer is polled.
    pub fn poll(&mut self) -> bool {
        if !self.running {
            return false;
        }
        if self.last_fired.elapsed() >= self.interval {
            self.last_fired = Instant::now();
            return true;
        }
        false
    }
}
