//! I2C register peer (C1): byte-exact read/write against a fixed bus port,
//! bounded by a per-transaction timeout.
//!
//! This is a trait rather than a concrete type so the [`crate::dac::Dac`] driver
//! can be exercised in tests without real hardware, per the "no dynamic
//! polymorphism in the core, except at the bus boundary" design note.

use crate::error::BusError;

/// Default per-transaction timeout, in milliseconds, for the real I2C transport.
pub const DEFAULT_TIMEOUT_MS: u32 = 50;

/// A byte-exact I2C register peer. No retries happen at this layer; a single
/// transport fault or timeout is reported as [`BusError`].
pub trait I2cBus {
    /// Transmit `[reg, payload...]` as a single master write. `payload.len()`
    /// must be 0, 1, or 2; longer payloads are a caller bug, not a bus fault,
    /// and are rejected by [`crate::dac::Dac`] before reaching this trait.
    fn write(&mut self, address: u8, reg: u8, payload: &[u8]) -> Result<(), BusError>;

    /// Transmit `[reg]`, then read `out.len()` bytes into `out`.
    fn write_read(&mut self, address: u8, reg: u8, out: &mut [u8]) -> Result<(), BusError>;
}

/// Adapts a blocking `embedded-hal` [`embedded_hal::i2c::I2c`] implementor to
/// [`I2cBus`]. The per-transaction timeout bound is a property of the
/// underlying HAL implementation (e.g. the platform's I2C peripheral driver);
/// this adapter does not add its own timeout layer, it only translates errors.
pub struct EmbeddedHalBus<I2C> {
    i2c: I2C,
}

impl<I2C> EmbeddedHalBus<I2C> {
    pub const fn new(i2c: I2C) -> Self {
        Self { i2c }
    }

    pub fn into_inner(self) -> I2C {
        self.i2c
    }
}

impl<I2C> I2cBus for EmbeddedHalBus<I2C>
where
    I2C: embedded_hal::i2c::I2c,
{
    fn write(&mut self, address: u8, reg: u8, payload: &[u8]) -> Result<(), BusError> {
        let mut frame = [0u8; 3];
        frame[0] = reg;
        frame[1..1 + payload.len()].copy_from_slice(payload);
        self.i2c
            .write(address, &frame[..1 + payload.len()])
            .map_err(|_| BusError::new("write transaction failed"))
    }

    fn write_read(&mut self, address: u8, reg: u8, out: &mut [u8]) -> Result<(), BusError> {
        self.i2c
            .write_read(address, &[reg], out)
            .map_err(|_| BusError::new("write-read transaction failed"))
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;

    /// In-memory fake bus for unit and integration tests. Records every
    /// transaction and can be told to fail the next N writes or reads.
    #[derive(Default)]
    pub struct FakeBus {
        pub registers: std::collections::HashMap<(u8, u8), Vec<u8>>,
        pub fail_next_writes: usize,
        pub fail_next_reads: usize,
        pub write_log: Vec<(u8, u8, Vec<u8>)>,
    }

    impl FakeBus {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn fail_writes(&mut self, n: usize) {
            self.fail_next_writes = n;
        }

        pub fn fail_reads(&mut self, n: usize) {
            self.fail_next_reads = n;
        }
    }

    impl I2cBus for FakeBus {
        fn write(&mut self, address: u8, reg: u8, payload: &[u8]) -> Result<(), BusError> {
            if self.fail_next_writes > 0 {
                self.fail_next_writes -= 1;
                return Err(BusError::new("simulated write failure"));
            }
            self.write_log.push((address, reg, payload.to_vec()));
            self.registers.insert((address, reg), payload.to_vec());
            Ok(())
        }

        fn write_read(&mut self, address: u8, reg: u8, out: &mut [u8]) -> Result<(), BusError> {
            if self.fail_next_reads > 0 {
                self.fail_next_reads -= 1;
                return Err(BusError::new("simulated read failure"));
            }
            let stored = self.registers.get(&(address, reg));
            for (i, byte) in out.iter_mut().enumerate() {
                *byte = stored.and_then(|v| v.get(i).copied()).unwrap_or(0);
            }
            Ok(())
        }
    }
}
