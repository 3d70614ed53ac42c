#![cfg_attr(not(test), no_std)]
#![doc = include_str!("../README.md")]
//!
//! ## Design Principles
//!
//! - **Owned device context**: every piece of mutable device state (power
//!   state, calibration, FIFO selection) lives in one [`Bmi160`] value.
//! - **Async-first**: Built on `embedded-hal-async` I2C and delay traits
//! - **Pure where possible**: axis remapping and FIFO decoding are plain
//!   functions over values and byte slices
//!
//! ## Module Organization
//!
//! - [`power`]: Power-mode state machine with settle delays
//! - [`remap`]: Axis remapping for the physical mounting orientation
//! - [`calib`]: Accelerometer zero-offset calibration and persistence
//! - [`frame`]: FIFO frame decoder
//! - [`fifo`]: FIFO configuration and draining
//! - [`sampler`]: Periodic sampling with back-fill
//! - [`accel`], [`gyro`], [`mag`]: Sensor configuration and data reading
//! - [`features`]: Step counter, step detector, significant motion
//! - [`offset`]: On-chip offset registers and fast offset compensation
//!
//! ## Basic Usage
//!
//! ```no_run
//! # async fn example<I, D, E>(i2c: I, delay: D) -> Result<(), bmi160::Error<E>>
//! # where I: embedded_hal_async::i2c::I2c<Error = E>, D: embedded_hal_async::delay::DelayNs {
//! use bmi160::{Bmi160, PowerMode, Sensor};
//!
//! let mut imu = Bmi160::new(i2c, delay);
//! imu.init().await?;
//! imu.set_power_mode(Sensor::Accel, PowerMode::Normal).await?;
//! let accel = imu.get_raw_accel_data().await?;
//! # Ok(())
//! # }
//! ```

use embedded_hal_async::{delay::DelayNs, i2c::*};

#[macro_use]
mod fmt;

pub mod accel;
pub mod calib;
mod defs;
pub mod features;
pub mod fifo;
pub mod frame;
pub mod gyro;
pub mod mag;
pub mod offset;
pub mod power;
pub mod remap;
pub(crate) mod rw;
pub mod sampler;
#[cfg(test)]
mod testing;
mod types;

use defs::*;

pub use calib::{CalibrationOffset, CalibrationStorage};
pub use fifo::FifoSelector;
pub use frame::{decode, DecodeError, FifoFrame, FifoFrames};
pub use power::{PowerMode, PowerState};
pub use remap::AxisRemap;
pub use sampler::{Clock, SampleKind, SampleSink, Sampler, SamplerControl, SharedBmi160};
pub use types::*;

/// Driver error type.
///
/// Wraps the underlying I2C error and adds BMI160-specific error
/// conditions.
#[derive(Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Error<E> {
  /// I2C communication error (register transaction failed)
  I2c(E),
  /// Chip ID mismatch (expected 0xD1, 0xD3 or 0xD4)
  InvalidChipId(u8),
  /// Parameter or mode not valid for the addressed sensor
  InvalidArgument,
  /// No calibration record persisted (or the record is all zero)
  NotFound,
  /// Calibration was computed and applied but could not be persisted
  NotPersisted(CalibrationOffset),
  /// Malformed FIFO content
  Decode(DecodeError),
  /// Data error (e.g., register content failed to unpack, or timeout)
  Data,
}

impl<E> From<DecodeError> for Error<E> {
  fn from(e: DecodeError) -> Self {
    Error::Decode(e)
  }
}

/// BMI160 device driver instance.
///
/// Owns the I2C bus and delay provider and carries the device session state:
/// tracked power modes, the mounting remap, the accelerometer calibration and
/// the current FIFO selection.
///
/// # Type Parameters
///
/// - `I`: I2C implementation (must implement `embedded_hal_async::i2c::I2c`)
/// - `D`: Delay provider (must implement `embedded_hal_async::delay::DelayNs`)
pub struct Bmi160<I, D> {
  i2c: I,
  delay: D,
  address: u8,
  power: PowerState,
  remap: AxisRemap,
  calibration: CalibrationOffset,
  fifo_selector: FifoSelector,
  fifo_header: bool,
  sig_motion: bool,
}

impl<I, D> Bmi160<I, D> {
  /// Create a new driver on the primary I2C address (0x68) with no axis remap.
  pub fn new(i2c: I, delay: D) -> Self {
    Self {
      i2c,
      delay,
      address: ADDR_I2C_PRIM,
      power: PowerState::default(),
      remap: AxisRemap::IDENTITY,
      calibration: CalibrationOffset::ZERO,
      fifo_selector: FifoSelector::NONE,
      fifo_header: true,
      sig_motion: false,
    }
  }

  /// Use the alternate I2C address (0x69, SDO pulled high).
  pub fn with_alternate_address(mut self) -> Self {
    self.address = ADDR_I2C_ALT;
    self
  }

  /// Fix the mounting remap. Only available at construction.
  pub fn with_remap(mut self, remap: AxisRemap) -> Self {
    self.remap = remap;
    self
  }

  pub fn remap(&self) -> AxisRemap {
    self.remap
  }

  /// Release the bus and delay provider.
  pub fn release(self) -> (I, D) {
    (self.i2c, self.delay)
  }
}

impl<I, D, E> Bmi160<I, D>
where
  I: I2c<SevenBitAddress, Error = E>,
  D: DelayNs,
{
  /// Read the chip ID register.
  pub async fn get_id(&mut self) -> Result<u8, Error<E>> {
    self.read_u8(Reg::ChipId).await
  }

  /// Soft reset, then verify the chip ID.
  ///
  /// After reset every sensor is suspended, so the tracked power state is
  /// reset to match.
  pub async fn init(&mut self) -> Result<(), Error<E>> {
    self.soft_reset().await?;
    let id = self.get_id().await?;
    if !BMI160_CHIP_IDS.contains(&id) {
      warn!("unexpected chip id {:#x}", id);
      return Err(Error::InvalidChipId(id));
    }
    info!("bmi160 chip id {:#x}", id);
    Ok(())
  }

  /// Perform a soft reset of the sensor.
  pub async fn soft_reset(&mut self) -> Result<(), Error<E>> {
    self.command(Command::SoftReset).await?;
    self.power = PowerState::default();
    self.fifo_selector = FifoSelector::NONE;
    self.fifo_header = true;
    self.sig_motion = false;
    self.delay.delay_ms(SOFT_RESET_DELAY_MS).await;
    Ok(())
  }

  /// Read `ERR_REG` (raw bits per datasheet).
  pub async fn get_error(&mut self) -> Result<u8, Error<E>> {
    self.read_u8(Reg::Err).await
  }

  /// Read the data-ready and calibration status flags.
  pub async fn get_status(&mut self) -> Result<Status, Error<E>> {
    self.read(Reg::Status).await
  }

  /// Read raw temperature register (0 = 23 °C, 1/512 K per LSB).
  pub async fn get_temperature_raw(&mut self) -> Result<i16, Error<E>> {
    let raw = self.read_u16(Reg::Temperature).await?;
    Ok(raw as i16)
  }

  /// Read 24-bit sensor time counter (wraps at 2^24).
  pub async fn get_sensor_time(&mut self) -> Result<SensorTime, Error<E>> {
    let mut b = [0u8; 3];
    self.read_bytes(Reg::SensorTime0, &mut b).await?;
    Ok(SensorTime::from_le_bytes(b))
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[packbits::pack(bytes = 1)]
pub struct Status {
  #[skip(1)]
  pub gyr_self_test_ok: bool,
  pub mag_man_op: bool,
  pub foc_rdy: bool,
  pub nvm_rdy: bool,
  pub drdy_mag: bool,
  pub drdy_gyr: bool,
  pub drdy_acc: bool,
}
