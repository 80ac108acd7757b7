//! Read-only state published to the UI task at the end of every tick.

use crate::autoconfig::AutoConfig;
use crate::control::commands::Mode;
use crate::dac::FULL_SCALE_MV;

/// Read-only view of the fan control core's state, as of the end of the
/// most recent tick. Cheap to clone; intended to be copied out under the
/// shared mutex and read without holding it.
#[derive(Debug, Clone)]
pub struct Snapshot {
    pub available: bool,
    pub running: bool,
    pub faulted: bool,
    pub output_known: bool,
    pub manual_override_active: bool,
    pub auto_resume_blocked: bool,
    pub mode: Mode,
    pub manual_step: u8,
    pub selected_timer_s: u32,
    pub output_mv: u16,
    pub stop_at_ms: u32,
    pub auto_config: AutoConfig,
}

impl Default for Snapshot {
    fn default() -> Self {
        Self {
            available: false,
            running: false,
            faulted: false,
            output_known: true,
            manual_override_active: false,
            auto_resume_blocked: false,
            mode: Mode::Manual,
            manual_step: 1,
            selected_timer_s: 0,
            output_mv: 0,
            stop_at_ms: 0,
            auto_config: AutoConfig::default(),
        }
    }
}

/// The user-visible status strings: "STOPPED", "RUNNING", "FAULT", or
/// "OFFLINE".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusLabel {
    Stopped,
    Running,
    Fault,
    Offline,
}

impl StatusLabel {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Stopped => "STOPPED",
            Self::Running => "RUNNING",
            Self::Fault => "FAULT",
            Self::Offline => "OFFLINE",
        }
    }
}

impl Snapshot {
    /// Output voltage rounded to the nearest percent of full scale.
    #[must_use]
    pub fn output_percent(&self) -> u8 {
        if FULL_SCALE_MV == 0 {
            return 0;
        }
        let percent = (u32::from(self.output_mv) * 100 + u32::from(FULL_SCALE_MV) / 2)
            / u32::from(FULL_SCALE_MV);
        percent.min(100) as u8
    }

    /// Ceiling of the time remaining until `stop_at_ms`, in seconds, or 0
    /// when not running, no deadline is set, or the deadline has passed.
    #[must_use]
    pub fn remaining_seconds(&self, now_ms: u32) -> u32 {
        if !self.running || self.stop_at_ms == 0 || time_reached(now_ms, self.stop_at_ms) {
            return 0;
        }
        (self.stop_at_ms - now_ms + 999) / 1000
    }

    /// The status label an external UI should show for the current state.
    #[must_use]
    pub fn status_label(&self) -> StatusLabel {
        if self.faulted || !self.available {
            if self.faulted {
                StatusLabel::Fault
            } else {
                StatusLabel::Offline
            }
        } else if self.running {
            StatusLabel::Running
        } else {
            StatusLabel::Stopped
        }
    }
}

/// Wrapping-safe "has the monotonic clock reached this deadline" check,
/// matching the original's `(int32_t)(now - deadline) >= 0` idiom.
pub(crate) fn time_reached(now_ms: u32, deadline_ms: u32) -> bool {
    (now_ms.wrapping_sub(deadline_ms) as i32) >= 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn output_percent_rounds_to_nearest() {
        let mut snap = Snapshot::default();
        snap.output_mv = 3000;
        assert_eq!(snap.output_percent(), 30);
        snap.output_mv = 10_000;
        assert_eq!(snap.output_percent(), 100);
        snap.output_mv = 0;
        assert_eq!(snap.output_percent(), 0);
    }

    #[test]
    fn remaining_seconds_zero_when_not_running() {
        let snap = Snapshot::default();
        assert_eq!(snap.remaining_seconds(1000), 0);
    }

    #[test]
    fn remaining_seconds_ceils_and_clears_after_deadline() {
        let mut snap = Snapshot::default();
        snap.running = true;
        snap.stop_at_ms = 30_000;
        assert_eq!(snap.remaining_seconds(29_999), 1);
        assert_eq!(snap.remaining_seconds(30_000), 0);
    }

    #[test]
    fn status_label_priorities_fault_over_offline() {
        let mut snap = Snapshot::default();
        snap.faulted = true;
        snap.available = false;
        assert_eq!(snap.status_label(), StatusLabel::Fault);
    }
}
