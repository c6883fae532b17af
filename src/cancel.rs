// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// Process-local cancellation for blocking waits: a quit flag plus a condvar
// so sleeping waiters wake immediately on cancel.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::time::{Duration, Instant};

/// Upper bound on one sleep slice, so a linked signal flag is noticed promptly.
const SLICE: Duration = Duration::from_millis(100);

struct Inner {
    quit: AtomicBool,
    lock: Mutex<()>,
    cond: Condvar,
    linked: Option<&'static AtomicBool>,
}

/// Cloneable cancellation handle shared by a waiter and whoever stops it.
#[derive(Clone)]
pub struct CancelToken {
    inner: Arc<Inner>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::build(None)
    }

    /// A token that also reports cancelled once `flag` is set, e.g. from a
    /// signal handler that must not touch locks.
    pub fn linked_to(flag: &'static AtomicBool) -> Self {
        Self::build(Some(flag))
    }

    fn build(linked: Option<&'static AtomicBool>) -> Self {
        Self {
            inner: Arc::new(Inner {
                quit: AtomicBool::new(false),
                lock: Mutex::new(()),
                cond: Condvar::new(),
                linked,
            }),
        }
    }

    pub fn cancel(&self) {
        self.inner.quit.store(true, Ordering::Release);
        // Barrier: a waiter between its flag check and cond wait holds the lock.
        let _g = self.inner.lock.lock().unwrap_or_else(|e| e.into_inner());
        self.inner.cond.notify_all();
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.quit.load(Ordering::Acquire)
            || self.inner.linked.is_some_and(|f| f.load(Ordering::Acquire))
    }

    /// Sleep for `dur` or until cancelled. Returns `true` if cancelled.
    pub fn sleep(&self, dur: Duration) -> bool {
        let deadline = Instant::now() + dur;
        let mut guard = self.inner.lock.lock().unwrap_or_else(|e| e.into_inner());
        loop {
            if self.is_cancelled() {
                return true;
            }
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            let slice = (deadline - now).min(SLICE);
            guard = match self.inner.cond.wait_timeout(guard, slice) {
                Ok((g, _)) => g,
                Err(e) => e.into_inner().0,
            };
        }
    }
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}
