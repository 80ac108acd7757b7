//! Error types for the ventilation controller core.

/// I2C transport failure or timeout, reported by an [`crate::bus::I2cBus`] implementor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BusError {
    detail: &'static str,
}

impl BusError {
    #[must_use]
    pub const fn new(detail: &'static str) -> Self {
        Self { detail }
    }
}

impl std::fmt::Display for BusError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "I2C bus error: {}", self.detail)
    }
}

impl std::error::Error for BusError {}

/// Rejected locally before any bus transaction is attempted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InvalidParameter {
    /// `writeChannelRaw12`/`writeChannelMillivolts` called with a channel id that
    /// doesn't map to a known register.
    UnknownChannel(u8),
    /// A write payload longer than the two bytes the register map supports.
    PayloadTooLong(usize),
    /// An operation was attempted before `begin()` assigned a bus address.
    Uninitialized,
}

impl std::fmt::Display for InvalidParameter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UnknownChannel(c) => write!(f, "unknown DAC channel {c}"),
            Self::PayloadTooLong(n) => write!(f, "payload of {n} bytes exceeds the 2-byte limit"),
            Self::Uninitialized => write!(f, "DAC driver has no bus address assigned"),
        }
    }
}

impl std::error::Error for InvalidParameter {}

/// Failure of a DAC-level operation: either the parameters were rejected locally,
/// or the bus transaction itself failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DacError {
    Invalid(InvalidParameter),
    Bus(BusError),
}

impl std::fmt::Display for DacError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Invalid(e) => write!(f, "{e}"),
            Self::Bus(e) => write!(f, "{e}"),
        }
    }
}

impl std::error::Error for DacError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Invalid(e) => Some(e),
            Self::Bus(e) => Some(e),
        }
    }
}

impl From<InvalidParameter> for DacError {
    fn from(e: InvalidParameter) -> Self {
        Self::Invalid(e)
    }
}

impl From<BusError> for DacError {
    fn from(e: BusError) -> Self {
        Self::Bus(e)
    }
}
