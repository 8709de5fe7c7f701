//! Engine-wide busy flag.
//!
//! Long-running environment operations (profile provisioning) hold the
//! flag while they run; `start` refuses to race them. The guard clears
//! the flag on drop, so a failed operation can never leave the engine
//! stuck busy.

use std::sync::Arc;

use parking_lot::Mutex;

#[derive(Clone, Default)]
pub struct BusyFlag {
    reason: Arc<Mutex<Option<String>>>,
}

impl BusyFlag {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark the engine busy. `None` when it already is.
    pub fn try_acquire(&self, reason: impl Into<String>) -> Option<BusyGuard> {
        let mut slot = self.reason.lock();
        if slot.is_some() {
            return None;
        }
        *slot = Some(reason.into());
        Some(BusyGuard { flag: self.clone() })
    }

    pub fn is_busy(&self) -> bool {
        self.reason.lock().is_some()
    }

    pub fn reason(&self) -> Option<String> {
        self.reason.lock().clone()
    }
}

/// Clears the busy flag when dropped.
pub struct BusyGuard {
    flag: BusyFlag,
}

impl Drop for BusyGuard {
    fn drop(&mut self) {
        self.flag.reason.lock().take();
    }
}
