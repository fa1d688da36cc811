//! Scoped "current device" selection.
//!
//! Accelerator APIs keep the active device in thread-local state. Every index
//! operation enters a [`DeviceScope`] for its own device; dropping the scope
//! restores whatever was current before, on success and error paths alike.

use std::cell::Cell;
use std::marker::PhantomData;

thread_local! {
    static CURRENT_DEVICE: Cell<Option<i32>> = const { Cell::new(None) };
}

/// Device currently active on this thread, if any.
pub fn current_device() -> Option<i32> {
    CURRENT_DEVICE.with(|d| d.get())
}

/// RAII guard that makes a device current for the lifetime of the guard.
///
/// Not `Send`: the previous device belongs to the thread that entered.
#[derive(Debug)]
#[must_use = "the device is only current while the scope is alive"]
pub struct DeviceScope {
    previous: Option<i32>,
    device_id: i32,
    _not_send: PhantomData<*const ()>,
}

impl DeviceScope {
    /// Make `device_id` current on this thread.
    pub fn enter(device_id: i32) -> Self {
        let previous = CURRENT_DEVICE.with(|d| d.replace(Some(device_id)));
        Self {
            previous,
            device_id,
            _not_send: PhantomData,
        }
    }

    /// Device made current by this scope.
    #[inline]
    pub fn device_id(&self) -> i32 {
        self.device_id
    }
}

impl Drop for DeviceScope {
    fn drop(&mut self) {
        CURRENT_DEVICE.with(|d| d.set(self.previous));
    }
}
