// Single-shot wakeup signal.
//
// The client's threads park on condition-style events rather than polling:
// the command sender waits for "game started" and "command acked", the
// application thread waits for "handshake done" and "terminate". `Event` is
// the one primitive behind all of those — a boolean under a mutex with a
// condvar, where `wait` consumes the flag so each `set` releases one wait
// cycle. Every event here has a single dedicated waiter.
//
// Locks tolerate poisoning (`into_inner`) so that a panicking thread during
// teardown cannot wedge the waits that shutdown depends on.

use std::sync::{Condvar, Mutex, PoisonError};
use std::time::{Duration, Instant};

#[derive(Default)]
pub struct Event {
    flag: Mutex<bool>,
    cond: Condvar,
}

impl Event {
    pub fn new() -> Self {
        Self::default()
    }

    /// Signal the event, waking the waiter.
    pub fn set(&self) {
        let mut flag = self.flag.lock().unwrap_or_else(PoisonError::into_inner);
        *flag = true;
        self.cond.notify_all();
    }

    /// Reset the event without waking anyone. Used to discard a stale signal
    /// before starting a new wait cycle (e.g. at game start).
    pub fn clear(&self) {
        let mut flag = self.flag.lock().unwrap_or_else(PoisonError::into_inner);
        *flag = false;
    }

    /// Block until the event is set, then consume the signal.
    pub fn wait(&self) {
        let mut flag = self.flag.lock().unwrap_or_else(PoisonError::into_inner);
        while !*flag {
            flag = self.cond.wait(flag).unwrap_or_else(PoisonError::into_inner);
        }
        *flag = false;
    }

    /// Block until the event is set or the timeout elapses. Returns whether
    /// the event fired (and was consumed).
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut flag = self.flag.lock().unwrap_or_else(PoisonError::into_inner);
        while !*flag {
            let Some(remaining) = deadline.checked_duration_since(Instant::now()) else {
                return false;
            };
            let (guard, _timed_out) = self
                .cond
                .wait_timeout(flag, remaining)
                .unwrap_or_else(PoisonError::into_inner);
            flag = guard;
        }
        *flag = false;
        true
    }
}
