//! Control task (C4): command intake, the fan control state machine, and the
//! snapshot published back to the UI task.

mod commands;
mod core;
mod snapshot;

pub use commands::{Mode, PendingCommands, StartStopRequest};
pub use core::{
    FanControlCore, FanControlHandle, DAC_I2C_ADDR_DEFAULT, HEALTH_CHECK_MS,
    HEALTH_FAIL_THRESHOLD, RECOVER_COOLDOWN_MS, SAFE_DEFAULT_MV, SAFE_ERROR_MV,
};
pub use snapshot::{Snapshot, StatusLabel};
