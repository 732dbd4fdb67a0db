//! Device-side exception capture.
//!
//! Agent threads cannot return errors mid-launch.  Misuse detected inside a
//! kernel (unknown variable, out-of-range array index, read-after-write on a
//! macro property, …) is reported here instead; the first report wins and
//! the host re-raises it at the next join, tagged with the launching
//! function.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, PoisonError};

#[derive(Debug, Default)]
pub struct DeviceExceptionBuffer {
    raised: AtomicBool,
    first:  Mutex<Option<String>>,
}

impl DeviceExceptionBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `message` unless an earlier report already exists.
    pub fn report(&self, message: impl Into<String>) {
        if self.raised.swap(true, Ordering::AcqRel) {
            return;
        }
        let mut slot = self.first.lock().unwrap_or_else(PoisonError::into_inner);
        *slot = Some(message.into());
    }

    pub fn is_raised(&self) -> bool {
        self.raised.load(Ordering::Acquire)
    }

    /// Remove and return the recorded exception, re-arming the buffer.
    pub fn take(&self) -> Option<String> {
        let mut slot = self.first.lock().unwrap_or_else(PoisonError::into_inner);
        let message = slot.take();
        self.raised.store(false, Ordering::Release);
        message
    }
}
