//! Broadcast shutdown signalling.
//!
//! A [`ShutdownToken`] fans one "stop" signal out to any number of observers.
//! Signalling is idempotent: the first `request_stop` wakes every waiter and
//! later calls are no-ops. Debug builds record the caller location of each
//! stop request as a diagnostic aid.

use parking_lot::{Condvar, Mutex};
use std::sync::Arc;

#[cfg(debug_assertions)]
use std::panic::Location;

struct Inner {
    stopped: Mutex<bool>,
    cond: Condvar,
    #[cfg(debug_assertions)]
    origins: Mutex<Vec<&'static Location<'static>>>,
}

/// A cloneable, idempotent stop signal shared between threads.
#[derive(Clone)]
pub struct ShutdownToken {
    inner: Arc<Inner>,
}

impl Default for ShutdownToken {
    fn default() -> Self {
        Self::new()
    }
}

impl ShutdownToken {
    /// Create a token in the running (not stopped) state.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                stopped: Mutex::new(false),
                cond: Condvar::new(),
                #[cfg(debug_assertions)]
                origins: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Signal shutdown. Wakes all current and future waiters. Repeated calls
    /// are no-ops.
    #[track_caller]
    pub fn request_stop(&self) {
        #[cfg(debug_assertions)]
        self.inner.origins.lock().push(Location::caller());

        let mut stopped = self.inner.stopped.lock();
        if !*stopped {
            *stopped = true;
            self.inner.cond.notify_all();
        }
    }

    /// Block until shutdown has been requested. Returns immediately if it
    /// already has.
    pub fn wait(&self) {
        let mut stopped = self.inner.stopped.lock();
        while !*stopped {
            self.inner.cond.wait(&mut stopped);
        }
    }

    /// Whether shutdown has been requested.
    pub fn is_stopped(&self) -> bool {
        *self.inner.stopped.lock()
    }

    /// Caller locations of every `request_stop` so far. Debug builds only.
    #[cfg(debug_assertions)]
    pub fn stop_origins(&self) -> Vec<&'static Location<'static>> {
        self.inner.origins.lock().clone()
    }
}
