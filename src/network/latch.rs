//! Termination latch
//!
//! A one-way, process-wide stop flag. Accept loops poll it between accepts
//! and sleep on it while idle, so tripping it wakes them immediately.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Condvar, Mutex};

#[derive(Default)]
struct LatchInner {
    flag: AtomicBool,
    lock: Mutex<()>,
    signal: Condvar,
}

/// Shared stop flag: false until [`terminate`](Self::terminate), then true forever
#[derive(Clone, Default)]
pub struct TerminationLatch {
    inner: Arc<LatchInner>,
}

impl TerminationLatch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Trip the latch and wake every waiter
    ///
    /// Returns true if this call did the tripping.
    pub fn terminate(&self) -> bool {
        let first = !self.inner.flag.swap(true, Ordering::SeqCst);
        let _guard = self.inner.lock.lock();
        self.inner.signal.notify_all();
        first
    }

    pub fn is_terminated(&self) -> bool {
        self.inner.flag.load(Ordering::SeqCst)
    }

    /// Sleep up to `timeout`, returning early once the latch trips
    ///
    /// Returns the latch state on wake-up.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let mut guard = self.inner.lock.lock();
        if self.is_terminated() {
            return true;
        }
        self.inner.signal.wait_for(&mut guard, timeout);
        self.is_terminated()
    }
}

impl std::fmt::Debug for TerminationLatch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TerminationLatch")
            .field("terminated", &self.is_terminated())
            .finish()
    }
}
