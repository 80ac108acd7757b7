//! Ventilation fan-control core: a DAC driver, an auto-demand evaluator, an
//! auto-config codec, and the state machine tying them together behind a
//! single shared mutex.
//!
//! This crate has no knowledge of any particular board or sensor stack. A
//! firmware binary supplies an [`bus::I2cBus`] implementation (or uses
//! [`bus::EmbeddedHalBus`] to adapt any `embedded-hal` I2C peripheral),
//! drives [`control::FanControlCore::poll`] on a fixed tick, and publishes
//! sensor readings into that tick via [`evaluator::SensorData`].

pub mod autoconfig;
pub mod bus;
pub mod control;
pub mod dac;
pub mod error;
pub mod evaluator;

pub use autoconfig::AutoConfig;
pub use control::{FanControlCore, FanControlHandle, Mode, Snapshot, StatusLabel};
pub use dac::Dac;
pub use error::{BusError, DacError, InvalidParameter};
pub use evaluator::SensorData;
