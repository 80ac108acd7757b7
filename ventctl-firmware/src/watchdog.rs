//! Task watchdog integration for monitoring the control loop's health.
//!
//! A thin wrapper around ESP-IDF's Task Watchdog Timer (TWDT) for
//! registering the control thread and feeding the watchdog once per tick.

use esp_idf_svc::sys::{
    esp_task_wdt_add_user, esp_task_wdt_delete_user, esp_task_wdt_reset_user,
    esp_task_wdt_user_handle_t,
};
use log::{debug, error};
use std::ffi::CStr;

/// A handle to a registered watchdog user. Automatically unregisters on drop.
pub struct WatchdogHandle {
    handle: esp_task_wdt_user_handle_t,
    name: &'static CStr,
}

impl WatchdogHandle {
    /// Register a new watchdog user with the given name.
    ///
    /// # Panics
    /// Panics if registration fails (critical system error).
    pub fn register(name: &'static CStr) -> Self {
        let mut handle: esp_task_wdt_user_handle_t = std::ptr::null_mut();

        let result = unsafe { esp_task_wdt_add_user(name.as_ptr(), &mut handle) };

        if result == 0 {
            debug!("Watchdog: registered user '{name:?}'");
            Self { handle, name }
        } else {
            panic!("Watchdog: failed to register user '{name:?}': error code {result}");
        }
    }

    /// Feed the watchdog to prevent timeout. Must be called once per tick.
    pub fn feed(&self) {
        let result = unsafe { esp_task_wdt_reset_user(self.handle) };
        if result != 0 {
            error!("Watchdog: failed to feed '{:?}'", self.name);
        }
    }
}

impl Drop for WatchdogHandle {
    fn drop(&mut self) {
        debug!("Watchdog: unregistering user '{:?}'", self.name);
        let result = unsafe { esp_task_wdt_delete_user(self.handle) };
        if result != 0 {
            error!(
                "Watchdog: failed to unregister '{:?}': error code {result}",
                self.name
            );
        }
    }
}
