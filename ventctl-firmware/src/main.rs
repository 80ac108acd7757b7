use anyhow::Result;
use esp_idf_hal::delay::FreeRtos;
use esp_idf_hal::i2c::{I2cConfig, I2cDriver};
use esp_idf_hal::prelude::*;
use esp_idf_svc::eventloop::EspSystemEventLoop;
use esp_idf_svc::nvs::EspDefaultNvsPartition;
use log::{info, warn};

mod config;
mod thread_util;
mod watchdog;

use ventctl_core::bus::EmbeddedHalBus;
use ventctl_core::control::FanControlHandle;
use ventctl_core::evaluator::SensorData;
use ventctl_core::FanControlCore;
use watchdog::WatchdogHandle;

/// Control loop tick period. The fan control core's timers and debounce
/// windows are all specified in wall-clock milliseconds, so any period that
/// divides evenly into one second keeps `remaining_seconds` display-accurate.
const TICK_MS: u32 = 200;

fn monotonic_ms() -> u32 {
    // esp_timer_get_time() returns microseconds since boot as i64; this wraps
    // in roughly 71 minutes, which the core's deadline comparisons already
    // tolerate (see `control::snapshot::time_reached`).
    (unsafe { esp_idf_svc::sys::esp_timer_get_time() } / 1000) as u32
}

fn control_task(
    mut core: FanControlCore<EmbeddedHalBus<I2cDriver<'static>>>,
    handle: FanControlHandle,
    auto_mode_preference: bool,
) {
    let wdt = WatchdogHandle::register(c"ventctl_core");
    let mut last_save_mode = auto_mode_preference;

    loop {
        let now = monotonic_ms();
        // No external sensor stack is wired up yet; the evaluator still runs
        // every tick so auto mode degrades safely (zero demand) rather than
        // freezing on stale readings.
        let sensor_data = SensorData::default();
        core.poll(now, Some(&sensor_data), false);
        wdt.feed();

        let snapshot = handle.snapshot();
        let now_auto = snapshot.mode == ventctl_core::Mode::Auto;
        if now_auto != last_save_mode {
            last_save_mode = now_auto;
            if let Err(e) = config::save(last_save_mode, &snapshot.auto_config) {
                warn!("Failed to persist config: {e}");
            }
        }

        FreeRtos::delay_ms(TICK_MS);
    }
}

fn main() -> Result<()> {
    esp_idf_svc::sys::link_patches();
    esp_idf_svc::log::EspLogger::initialize_default();

    info!("Starting ventctl firmware...");

    let peripherals = esp_idf_hal::peripherals::Peripherals::take()?;
    let _sys_loop = EspSystemEventLoop::take()?;
    let nvs_partition = EspDefaultNvsPartition::take()?;
    config::init_nvs(nvs_partition)?;

    let boot_config = config::load_or_default();

    let i2c_config = I2cConfig::new().baudrate(100.kHz().into());
    let i2c = I2cDriver::new(
        peripherals.i2c0,
        peripherals.pins.gpio21,
        peripherals.pins.gpio22,
        &i2c_config,
    )?;
    let bus = EmbeddedHalBus::new(i2c);

    let (mut core, handle) = FanControlCore::new(bus, boot_config.auto_mode_preference, monotonic_ms());
    handle.set_auto_config(boot_config.auto_config);
    // Drain the config push before handing the core to the control thread so
    // the first tick already reflects the persisted auto-mode settings.
    core.poll(monotonic_ms(), Some(&SensorData::default()), false);

    let auto_mode_preference = boot_config.auto_mode_preference;
    let status_handle = handle.clone();
    thread_util::spawn_named(c"ventctl_ctrl", move || {
        control_task(core, handle, auto_mode_preference);
    });

    status_task(status_handle);
}

fn status_task(handle: FanControlHandle) -> ! {
    loop {
        let snap = handle.snapshot();
        info!(
            "status={} mode={:?} output={}% running={}",
            snap.status_label().as_str(),
            snap.mode,
            snap.output_percent(),
            snap.running
        );
        FreeRtos::delay_ms(5_000);
    }
}
