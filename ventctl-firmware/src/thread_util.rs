//! Helper for spawning threads with FreeRTOS task names.
//!
//! `std::thread::Builder::name()` sets the pthread name after creation, but
//! ESP-IDF creates the FreeRTOS task at pthread creation time with the
//! default name. This module uses `ThreadSpawnConfiguration` to set the name
//! before spawning.

use esp_idf_hal::task::thread::ThreadSpawnConfiguration;
use std::ffi::CStr;
use std::thread::JoinHandle;

/// Spawn a thread with a FreeRTOS task name.
///
/// FreeRTOS task names are limited to 16 characters including the null terminator.
pub fn spawn_named<F, T>(name: &'static CStr, f: F) -> JoinHandle<T>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    let prev_conf = ThreadSpawnConfiguration::get();

    let conf = ThreadSpawnConfiguration {
        name: Some(name.to_bytes_with_nul()),
        ..Default::default()
    };
    conf.set()
        .expect("Failed to set thread spawn configuration");

    let handle = std::thread::spawn(f);

    if let Some(prev) = prev_conf {
        prev.set()
            .expect("Failed to restore thread spawn configuration");
    }

    handle
}
