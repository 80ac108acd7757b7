//! Command surface and the pending-command batch the control task drains.

use crate::autoconfig::AutoConfig;

/// The operating mode selected by the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Manual,
    Auto,
}

/// A single start/stop action. At most one is latched per tick; a newer
/// request overwrites an older one that hasn't been applied yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StartStopRequest {
    #[default]
    None,
    Start,
    Stop,
    AutoStart,
}

/// A batch of at-most-one-of-each pending mutation, submitted by the UI task
/// and drained by the control task at the start of every tick. Overwriting a
/// field before it is drained is last-writer-wins.
#[derive(Debug, Clone, Default)]
pub struct PendingCommands {
    pub mode: Option<Mode>,
    pub manual_step: Option<u8>,
    pub timer_seconds: Option<u32>,
    pub auto_config: Option<AutoConfig>,
    pub start_stop: StartStopRequest,
}

impl PendingCommands {
    pub fn set_mode(&mut self, mode: Mode) {
        self.mode = Some(mode);
        if mode == Mode::Manual && self.start_stop == StartStopRequest::AutoStart {
            self.start_stop = StartStopRequest::None;
        }
    }

    pub fn set_manual_step(&mut self, step: u8) {
        self.manual_step = Some(step.clamp(1, 10));
    }

    pub fn set_timer_seconds(&mut self, seconds: u32) {
        self.timer_seconds = Some(seconds);
    }

    pub fn request_start(&mut self) {
        self.start_stop = StartStopRequest::Start;
    }

    pub fn request_stop(&mut self) {
        self.start_stop = StartStopRequest::Stop;
    }

    pub fn request_auto_start(&mut self) {
        self.start_stop = StartStopRequest::AutoStart;
        self.mode = Some(Mode::Auto);
    }

    pub fn set_auto_config(&mut self, mut config: AutoConfig) {
        config.sanitize();
        self.auto_config = Some(config);
    }
}
