//! Fan control core (C4): the state machine arbitrating mode, manual level,
//! timer, start/stop, auto demand, driver health, and fault recovery.

use std::sync::{Arc, Mutex};

use log::{debug, info, warn};

use crate::autoconfig::AutoConfig;
use crate::bus::I2cBus;
use crate::control::commands::{Mode, PendingCommands, StartStopRequest};
use crate::control::snapshot::{time_reached, Snapshot};
use crate::dac::{Dac, CHANNEL_VOUT0, FULL_SCALE_MV};
use crate::evaluator::{self, SensorData};

/// Default I2C address of the DAC.
pub const DAC_I2C_ADDR_DEFAULT: u8 = 0x58;
/// Voltage emitted whenever the controller is in a STOPPED state and the DAC
/// is available. Also the value written at boot by `tryInitialize`.
pub const SAFE_ERROR_MV: u16 = 0;
/// Boot-time default output, written once `tryInitialize` succeeds.
pub const SAFE_DEFAULT_MV: u16 = SAFE_ERROR_MV;
/// Minimum interval between recovery attempts while the DAC is unavailable.
pub const RECOVER_COOLDOWN_MS: u32 = 5_000;
/// Interval between health probes while available and not running.
pub const HEALTH_CHECK_MS: u32 = 2_000;
/// Consecutive probe failures before declaring a fault.
pub const HEALTH_FAIL_THRESHOLD: u8 = 3;

const DAC_FEATURE_ENABLED: bool = cfg!(feature = "dac");

struct Shared {
    pending: PendingCommands,
    snapshot: Snapshot,
}

/// Cheaply-cloneable, thread-safe handle used by the UI task to submit
/// commands and read the latest snapshot. Never touches the control task's
/// private state directly.
#[derive(Clone)]
pub struct FanControlHandle {
    shared: Arc<Mutex<Shared>>,
}

impl FanControlHandle {
    pub fn set_mode(&self, mode: Mode) {
        self.shared.lock().unwrap().pending.set_mode(mode);
    }

    pub fn set_manual_step(&self, step: u8) {
        self.shared.lock().unwrap().pending.set_manual_step(step);
    }

    pub fn set_timer_seconds(&self, seconds: u32) {
        self.shared.lock().unwrap().pending.set_timer_seconds(seconds);
    }

    pub fn request_start(&self) {
        self.shared.lock().unwrap().pending.request_start();
    }

    pub fn request_stop(&self) {
        self.shared.lock().unwrap().pending.request_stop();
    }

    pub fn request_auto_start(&self) {
        self.shared.lock().unwrap().pending.request_auto_start();
    }

    pub fn set_auto_config(&self, config: AutoConfig) {
        self.shared.lock().unwrap().pending.set_auto_config(config);
    }

    /// A copy of the state as of the end of the most recent tick.
    #[must_use]
    pub fn snapshot(&self) -> Snapshot {
        self.shared.lock().unwrap().snapshot.clone()
    }
}

/// The fan control state machine. Owns the DAC driver and all private
/// control-loop state; only the thread that calls [`FanControlCore::poll`]
/// may touch it. Cross-thread communication happens exclusively through the
/// paired [`FanControlHandle`].
pub struct FanControlCore<B: I2cBus> {
    dac: Dac<B>,
    shared: Arc<Mutex<Shared>>,

    auto_config: AutoConfig,
    mode: Mode,
    manual_step: u8,
    selected_timer_s: u32,
    start_requested: bool,
    stop_requested: bool,

    available: bool,
    running: bool,
    faulted: bool,
    output_known: bool,
    manual_override_active: bool,
    output_mv: u16,
    stop_at_ms: u32,

    manual_step_update_pending: bool,
    timer_update_pending: bool,
    last_recover_attempt_ms: u32,
    last_health_check_ms: u32,
    health_probe_fail_count: u8,
    boot_missing_lockout: bool,
    auto_resume_blocked: bool,
}

impl<B: I2cBus> FanControlCore<B> {
    /// Build the core and its paired handle, then perform the boot-time
    /// `tryInitialize` attempt. `now_ms` is the monotonic clock reading at
    /// the moment of construction.
    pub fn new(bus: B, auto_mode_preference: bool, now_ms: u32) -> (Self, FanControlHandle) {
        let shared = Arc::new(Mutex::new(Shared {
            pending: PendingCommands::default(),
            snapshot: Snapshot::default(),
        }));
        let mut core = Self {
            dac: Dac::new(bus),
            shared: Arc::clone(&shared),
            auto_config: AutoConfig::default(),
            mode: if auto_mode_preference {
                Mode::Auto
            } else {
                Mode::Manual
            },
            manual_step: 1,
            selected_timer_s: 0,
            start_requested: false,
            stop_requested: false,
            available: false,
            running: false,
            faulted: false,
            output_known: true,
            manual_override_active: false,
            output_mv: 0,
            stop_at_ms: 0,
            manual_step_update_pending: false,
            timer_update_pending: false,
            last_recover_attempt_ms: 0,
            last_health_check_ms: 0,
            health_probe_fail_count: 0,
            boot_missing_lockout: false,
            auto_resume_blocked: false,
        };
        core.apply_stop_state(true);

        if !DAC_FEATURE_ENABLED {
            info!("FanControl: DAC feature disabled at compile time");
            core.publish_snapshot();
            return (core, FanControlHandle { shared });
        }

        if core.try_initialize(now_ms) {
            info!("FanControl: DAC ready at {DAC_I2C_ADDR_DEFAULT:#04x}");
        } else {
            warn!("FanControl: DAC not detected at boot, retry only after restart");
            core.boot_missing_lockout = true;
            core.output_known = false;
        }
        core.publish_snapshot();
        (core, FanControlHandle { shared })
    }

    /// One invocation of the control loop: drain pending commands, run
    /// recovery/health checks, then apply stop, start, pending updates,
    /// auto demand, and timer expiry in that fixed order.
    pub fn poll(&mut self, now_ms: u32, sensor_data: Option<&SensorData>, gas_warmup: bool) {
        let pending = self.drain_pending_commands();

        if let Some(config) = pending.auto_config {
            self.apply_auto_config(config);
        }
        if let Some(mode) = pending.mode {
            self.apply_mode(mode);
        }
        if let Some(step) = pending.manual_step {
            self.apply_manual_step(step);
        }
        if let Some(seconds) = pending.timer_seconds {
            self.apply_timer_seconds(seconds);
        }
        match pending.start_stop {
            StartStopRequest::Start => self.apply_request_start(),
            StartStopRequest::Stop => self.apply_request_stop(),
            StartStopRequest::AutoStart => self.apply_request_auto_start(),
            StartStopRequest::None => {}
        }

        if !DAC_FEATURE_ENABLED {
            self.available = false;
            self.faulted = false;
            self.apply_stop_state(true);
            self.publish_snapshot();
            return;
        }

        self.run_recovery_and_health(now_ms);

        if self.stop_requested {
            self.stop_requested = false;
            if self.available && !self.write_output(SAFE_ERROR_MV) {
                self.handle_dac_fault("safe stop write failed", now_ms);
                self.publish_snapshot();
                return;
            }
            self.apply_stop_state(self.available);
            if self.mode == Mode::Auto {
                self.auto_resume_blocked = true;
            }
        }

        if self.start_requested {
            self.start_requested = false;
            if self.mode != Mode::Manual || !self.available {
                self.publish_snapshot();
                return;
            }
            let target_mv = Self::step_to_millivolts(self.manual_step);
            if !self.write_output(target_mv) {
                self.handle_dac_fault("start write failed", now_ms);
                self.publish_snapshot();
                return;
            }
            self.running = true;
            self.manual_override_active = true;
            self.output_mv = target_mv;
            self.manual_step_update_pending = false;
            self.stop_at_ms = if self.selected_timer_s > 0 {
                now_ms + self.selected_timer_s * 1000
            } else {
                0
            };
            self.timer_update_pending = false;
        }

        if self.manual_step_update_pending {
            self.manual_step_update_pending = false;
            if self.running && self.manual_override_active && self.available {
                let target_mv = Self::step_to_millivolts(self.manual_step);
                if !self.write_output(target_mv) {
                    self.handle_dac_fault("manual level update failed", now_ms);
                    self.publish_snapshot();
                    return;
                }
                self.output_mv = target_mv;
            }
        }

        if self.timer_update_pending {
            self.timer_update_pending = false;
            if self.running && self.manual_override_active {
                self.stop_at_ms = if self.selected_timer_s > 0 {
                    now_ms + self.selected_timer_s * 1000
                } else {
                    0
                };
            }
        }

        if self.mode == Mode::Auto
            && self.available
            && !self.manual_override_active
            && !self.auto_resume_blocked
        {
            let demand_percent = if self.auto_config.enabled {
                sensor_data.map_or(0, |data| evaluator::evaluate(data, gas_warmup, &self.auto_config))
            } else {
                0
            };
            let target_mv = Self::percent_to_millivolts(demand_percent);

            if target_mv == 0 {
                if self.running || !self.output_known || self.output_mv != SAFE_ERROR_MV {
                    if !self.write_output(SAFE_ERROR_MV) {
                        self.handle_dac_fault("auto stop write failed", now_ms);
                        self.publish_snapshot();
                        return;
                    }
                    self.apply_stop_state(true);
                } else {
                    self.output_known = true;
                    self.output_mv = SAFE_ERROR_MV;
                }
            } else {
                if !self.running || self.output_mv != target_mv {
                    if !self.write_output(target_mv) {
                        self.handle_dac_fault("auto level write failed", now_ms);
                        self.publish_snapshot();
                        return;
                    }
                }
                self.running = true;
                self.output_known = true;
                self.output_mv = target_mv;
                self.stop_at_ms = 0;
            }
        }

        if self.running && self.stop_at_ms != 0 && time_reached(now_ms, self.stop_at_ms) {
            if self.available && !self.write_output(SAFE_ERROR_MV) {
                self.handle_dac_fault("timer stop write failed", now_ms);
                self.publish_snapshot();
                return;
            }
            let auto_resume_on_timer_end =
                self.available && self.auto_config.enabled && !self.auto_resume_blocked;
            self.apply_stop_state(self.available);
            if auto_resume_on_timer_end {
                self.mode = Mode::Auto;
            }
        }

        self.publish_snapshot();
    }

    fn run_recovery_and_health(&mut self, now_ms: u32) {
        if !self.available {
            if !self.boot_missing_lockout
                && now_ms.wrapping_sub(self.last_recover_attempt_ms) >= RECOVER_COOLDOWN_MS
            {
                self.last_recover_attempt_ms = now_ms;
                if self.try_initialize(now_ms) {
                    info!("FanControl: DAC recovered");
                }
            }
        } else if !self.running
            && now_ms.wrapping_sub(self.last_health_check_ms) >= HEALTH_CHECK_MS
        {
            self.last_health_check_ms = now_ms;
            if self.dac.probe().is_err() {
                self.health_probe_fail_count = self.health_probe_fail_count.saturating_add(1);
                if self.health_probe_fail_count >= HEALTH_FAIL_THRESHOLD {
                    self.handle_dac_fault("probe failed", now_ms);
                } else {
                    warn!(
                        "FanControl: DAC probe failed ({}/{})",
                        self.health_probe_fail_count, HEALTH_FAIL_THRESHOLD
                    );
                }
            } else {
                self.health_probe_fail_count = 0;
            }
        }
    }

    fn drain_pending_commands(&self) -> PendingCommands {
        let mut shared = self.shared.lock().unwrap();
        std::mem::take(&mut shared.pending)
    }

    fn publish_snapshot(&self) {
        let mut shared = self.shared.lock().unwrap();
        shared.snapshot = Snapshot {
            available: self.available,
            running: self.running,
            faulted: self.faulted,
            output_known: self.output_known,
            manual_override_active: self.manual_override_active,
            auto_resume_blocked: self.auto_resume_blocked,
            mode: self.mode,
            manual_step: self.manual_step,
            selected_timer_s: self.selected_timer_s,
            output_mv: self.output_mv,
            stop_at_ms: self.stop_at_ms,
            auto_config: self.auto_config,
        };
    }

    fn apply_mode(&mut self, mode: Mode) {
        if mode == Mode::Auto {
            // Selecting auto is an explicit re-arm, even if already in auto.
            self.auto_resume_blocked = false;
        }
        if self.mode == mode {
            return;
        }
        self.mode = mode;
        if self.mode == Mode::Auto && !self.manual_override_active {
            self.manual_step_update_pending = false;
            self.timer_update_pending = false;
        }
    }

    fn apply_manual_step(&mut self, step: u8) {
        let step = step.clamp(1, 10);
        if self.manual_step != step {
            self.manual_step = step;
            self.manual_step_update_pending = true;
        }
    }

    fn apply_timer_seconds(&mut self, seconds: u32) {
        if self.selected_timer_s != seconds {
            self.selected_timer_s = seconds;
            self.timer_update_pending = true;
        }
    }

    fn apply_request_start(&mut self) {
        self.stop_requested = false;
        self.start_requested = true;
    }

    fn apply_request_stop(&mut self) {
        self.start_requested = false;
        self.stop_requested = true;
    }

    fn apply_request_auto_start(&mut self) {
        self.apply_mode(Mode::Auto);
        self.start_requested = false;
        self.stop_requested = false;
        self.manual_override_active = false;
        self.stop_at_ms = 0;
        self.manual_step_update_pending = false;
        self.timer_update_pending = false;
        self.auto_resume_blocked = false;
    }

    fn apply_auto_config(&mut self, mut config: AutoConfig) {
        config.sanitize();
        self.auto_config = config;
    }

    fn try_initialize(&mut self, now_ms: u32) -> bool {
        if self.dac.begin(DAC_I2C_ADDR_DEFAULT).is_err() {
            self.available = false;
            return false;
        }
        if self.dac.set_output_range_10v().is_err() {
            self.available = false;
            return false;
        }
        if self
            .dac
            .write_channel_millivolts(CHANNEL_VOUT0, SAFE_DEFAULT_MV)
            .is_err()
        {
            self.available = false;
            return false;
        }

        self.available = true;
        self.faulted = false;
        self.running = false;
        self.manual_override_active = false;
        self.output_known = true;
        self.output_mv = SAFE_DEFAULT_MV;
        self.stop_at_ms = 0;
        self.manual_step_update_pending = false;
        self.timer_update_pending = false;
        self.last_health_check_ms = now_ms;
        self.health_probe_fail_count = 0;
        self.auto_resume_blocked = false;
        true
    }

    fn write_output(&mut self, millivolts: u16) -> bool {
        self.dac
            .write_channel_millivolts(CHANNEL_VOUT0, millivolts)
            .is_ok()
    }

    fn handle_dac_fault(&mut self, reason: &str, now_ms: u32) {
        warn!("FanControl: DAC error: {reason}");
        self.available = false;
        self.faulted = true;
        self.apply_stop_state(false);
        self.health_probe_fail_count = 0;
        self.last_recover_attempt_ms = now_ms;
    }

    fn apply_stop_state(&mut self, output_known: bool) {
        self.running = false;
        self.manual_override_active = false;
        self.output_known = output_known;
        if self.output_known {
            self.output_mv = SAFE_ERROR_MV;
        }
        self.stop_at_ms = 0;
        self.manual_step_update_pending = false;
        self.timer_update_pending = false;
    }

    fn step_to_millivolts(step: u8) -> u16 {
        let step = step.clamp(1, 10);
        (u16::from(step) * 1000).min(FULL_SCALE_MV)
    }

    fn percent_to_millivolts(percent: u8) -> u16 {
        let percent = percent.min(100);
        ((u32::from(percent) * u32::from(FULL_SCALE_MV) + 50) / 100) as u16
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::test_support::FakeBus;

    fn boot(auto_mode_preference: bool) -> (FanControlCore<FakeBus>, FanControlHandle) {
        debug!("booting test fan control core");
        FanControlCore::new(FakeBus::new(), auto_mode_preference, 0)
    }

    fn enable_auto(handle: &FanControlHandle) {
        let mut cfg = AutoConfig::default();
        cfg.enabled = true;
        handle.set_auto_config(cfg);
    }

    #[test]
    fn boot_with_good_bus_becomes_available_and_stopped() {
        let (_core, handle) = boot(false);
        let snap = handle.snapshot();
        assert!(snap.available);
        assert!(!snap.running);
        assert!(snap.output_known);
        assert_eq!(snap.output_mv, SAFE_ERROR_MV);
    }

    // S1 — manual start/stop.
    #[test]
    fn s1_manual_start_then_stop() {
        let (mut core, handle) = boot(false);
        handle.set_mode(Mode::Manual);
        handle.set_manual_step(3);
        handle.request_start();
        core.poll(1000, None, false);

        let snap = handle.snapshot();
        assert!(snap.running);
        assert_eq!(snap.output_mv, 3000);
        assert_eq!(snap.output_percent(), 30);
        assert_eq!(snap.stop_at_ms, 0);

        handle.request_stop();
        core.poll(1100, None, false);
        let snap = handle.snapshot();
        assert!(!snap.running);
        assert_eq!(snap.output_mv, SAFE_ERROR_MV);
    }

    // S2 — manual with 30s timer, falls back to auto on expiry.
    #[test]
    fn s2_manual_timer_expiry_falls_back_to_auto() {
        let (mut core, handle) = boot(false);
        enable_auto(&handle);
        handle.set_mode(Mode::Manual);
        handle.set_manual_step(5);
        handle.set_timer_seconds(30);
        handle.request_start();
        core.poll(0, None, false);

        let snap = handle.snapshot();
        assert!(snap.running);
        assert_eq!(snap.remaining_seconds(29_999), 1);

        core.poll(29_999, None, false);
        assert_eq!(handle.snapshot().remaining_seconds(29_999), 1);

        core.poll(30_000, None, false);
        let snap = handle.snapshot();
        assert!(!snap.running);
        assert_eq!(snap.output_mv, SAFE_ERROR_MV);
        assert_eq!(snap.mode, Mode::Auto);
    }

    // S3 — auto demand from CO2.
    #[test]
    fn s3_auto_demand_from_co2() {
        let (mut core, handle) = boot(true);
        enable_auto(&handle);
        handle.set_mode(Mode::Auto);
        let mut data = SensorData::default();
        data.co2_valid = true;
        data.co2 = 1200;
        core.poll(1000, Some(&data), false);

        let snap = handle.snapshot();
        assert!(snap.running);
        assert_eq!(snap.output_mv, 7000);
    }

    // S4 — explicit stop in auto arms the resume block.
    #[test]
    fn s4_explicit_stop_in_auto_arms_resume_block() {
        let (mut core, handle) = boot(true);
        enable_auto(&handle);
        handle.set_mode(Mode::Auto);
        let mut data = SensorData::default();
        data.co2_valid = true;
        data.co2 = 1200;
        core.poll(0, Some(&data), false);
        assert!(handle.snapshot().running);

        handle.request_stop();
        core.poll(100, Some(&data), false);
        let snap = handle.snapshot();
        assert!(!snap.running);
        assert!(snap.auto_resume_blocked);

        // Sensor worsens, but demand stays suppressed until re-armed.
        data.co2 = 5000;
        core.poll(200, Some(&data), false);
        let snap = handle.snapshot();
        assert!(!snap.running);
        assert!(snap.auto_resume_blocked);

        handle.set_mode(Mode::Auto);
        core.poll(300, Some(&data), false);
        let snap = handle.snapshot();
        assert!(snap.running);
        assert!(!snap.auto_resume_blocked);
    }

    // S5 — bus failure during manual start.
    #[test]
    fn s5_bus_failure_during_manual_start_faults_and_blocks_recovery() {
        let (mut core, handle) = boot(false);
        handle.set_mode(Mode::Manual);
        handle.set_manual_step(4);
        handle.request_start();
        core.dac.bus_mut().fail_writes(1);
        core.poll(1000, None, false);

        let snap = handle.snapshot();
        assert!(!snap.available);
        assert!(snap.faulted);
        assert!(!snap.output_known);

        // Second tick within cooldown: no recovery attempted.
        core.poll(1000 + RECOVER_COOLDOWN_MS - 1, None, false);
        assert!(!handle.snapshot().available);
    }

    // S6 — boot-missing lockout.
    #[test]
    fn s6_boot_missing_lockout_never_retries() {
        let mut bus = FakeBus::new();
        bus.fail_reads(1);
        let (mut core, handle) = FanControlCore::new(bus, false, 0);
        assert!(!handle.snapshot().available);

        core.poll(RECOVER_COOLDOWN_MS * 10, None, false);
        assert!(!handle.snapshot().available);
        core.poll(RECOVER_COOLDOWN_MS * 100, None, false);
        assert!(!handle.snapshot().available);
    }

    #[test]
    fn manual_start_ignored_in_auto_mode() {
        let (mut core, handle) = boot(true);
        handle.request_start();
        core.poll(1000, None, false);
        assert!(!handle.snapshot().running);
    }

    #[test]
    fn pending_manual_step_change_updates_running_output() {
        let (mut core, handle) = boot(false);
        handle.set_mode(Mode::Manual);
        handle.set_manual_step(2);
        handle.request_start();
        core.poll(0, None, false);
        assert_eq!(handle.snapshot().output_mv, 2000);

        handle.set_manual_step(6);
        core.poll(100, None, false);
        assert_eq!(handle.snapshot().output_mv, 6000);
    }

    #[test]
    fn health_probe_failures_escalate_to_fault_at_threshold() {
        let (mut core, handle) = boot(false);
        // running = false, so health checks happen on this cadence.
        for i in 1..=HEALTH_FAIL_THRESHOLD {
            core.dac.bus_mut().fail_reads(1);
            core.poll(u32::from(i) * HEALTH_CHECK_MS, None, false);
        }
        let snap = handle.snapshot();
        assert!(snap.faulted);
        assert!(!snap.available);
    }
}
