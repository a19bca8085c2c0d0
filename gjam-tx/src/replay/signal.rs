//! Readiness signal: single-bit back-pressure from the tick handler to the replay thread
//!
//! The tick handler raises it when its buffered data runs low; the replay thread
//! clears it once it has no free chunk left to fill. Raising is non-blocking and never fails,
//! so it is safe on the real-time tick path. Repeated raises before a clear
//! coalesce into one outstanding request.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Mutex;
use std::thread::{self, Thread, ThreadId};
use std::time::Duration;

#[derive(Debug, Default)]
pub struct ReadinessSignal {
    ready: AtomicBool,
    /// Replay thread to wake on raise
    waiter: Mutex<Option<Thread>>,
    /// Raises that found the flag clear (diagnostics)
    requests: AtomicU64,
}

impl ReadinessSignal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request the next chunk
    ///
    /// **REAL-TIME SAFE**: atomics plus a `try_lock`; if the waiter slot is
    /// momentarily locked the replay thread still sees the flag on its next poll.
    pub fn raise(&self) {
        if !self.ready.swap(true, Ordering::AcqRel) {
            self.requests.fetch_add(1, Ordering::Relaxed);
        }
        if let Ok(waiter) = self.waiter.try_lock() {
            if let Some(thread) = waiter.as_ref() {
                thread.unpark();
            }
        }
    }

    /// Acknowledge the request (replay thread, once the pool is full)
    pub fn clear(&self) {
        self.ready.store(false, Ordering::Release);
    }

    pub fn is_raised(&self) -> bool {
        self.ready.load(Ordering::Acquire)
    }

    /// Number of distinct requests raised so far
    pub fn requests(&self) -> u64 {
        self.requests.load(Ordering::Relaxed)
    }

    /// Register the calling thread as the one to wake
    pub(crate) fn register_current(&self) {
        if let Ok(mut waiter) = self.waiter.lock() {
            *waiter = Some(thread::current());
        }
    }

    /// Drop the registration if it still belongs to `id`
    pub(crate) fn unregister(&self, id: ThreadId) {
        if let Ok(mut waiter) = self.waiter.lock() {
            if waiter.as_ref().map(Thread::id) == Some(id) {
                *waiter = None;
            }
        }
    }

    /// Block the calling (registered) thread until raised or `timeout` elapses
    ///
    /// Returns whether the signal is raised. Spurious wakeups just return early.
    pub(crate) fn wait(&self, timeout: Duration) -> bool {
        if self.is_raised() {
            return true;
        }
        thread::park_timeout(timeout);
        self.is_raised()
    }
}
