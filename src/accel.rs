//! Accelerometer configuration and data reading.
//!
//! # Examples
//!
//! ```no_run
//! # async fn example<I, D, E>(imu: &mut bmi160::Bmi160<I, D>) -> Result<(), bmi160::Error<E>>
//! # where I: embedded_hal_async::i2c::I2c<Error = E>, D: embedded_hal_async::delay::DelayNs {
//! use bmi160::accel::{AccelConfig, AccelRange};
//! use bmi160::OutputDataRate;
//!
//! imu.set_accel_conf(AccelConfig { odr: OutputDataRate::Hz200, ..Default::default() }).await?;
//! imu.set_accel_range(AccelRange::G4).await?;
//!
//! // Acceleration in g
//! let accel = imu.get_accel_data().await?;
//! # Ok(())
//! # }
//! ```

use embedded_hal_async::{delay::DelayNs, i2c::*};
use micromath::vector::Vector3d;

use super::{defs::*, AxisSample, Bmi160, Error};

impl<I, D, E> Bmi160<I, D>
where
  I: I2c<SevenBitAddress, Error = E>,
  D: DelayNs,
{
  pub async fn get_accel_conf(&mut self) -> Result<AccelConfig, Error<E>> {
    self.read(Reg::AccConf).await
  }

  /// Set output data rate and filter. Rates above 1600 Hz are rejected.
  pub async fn set_accel_conf(&mut self, cfg: AccelConfig) -> Result<(), Error<E>> {
    if cfg.odr == crate::OutputDataRate::Hz3200 {
      return Err(Error::InvalidArgument);
    }
    self.write(Reg::AccConf, cfg).await
  }

  pub async fn get_accel_range(&mut self) -> Result<AccelRange, Error<E>> {
    let raw = self.read_u8(Reg::AccRange).await?;
    AccelRange::try_from(raw & 0x0F).map_err(|_| Error::Data)
  }

  pub async fn set_accel_range(&mut self, range: AccelRange) -> Result<(), Error<E>> {
    self.write_u8(Reg::AccRange, range.into()).await
  }

  /// Read raw accelerometer data (16-bit signed integers, chip frame).
  ///
  /// Use [`get_accel_data`](Self::get_accel_data) for values in g, or
  /// [`get_corrected_accel`](Self::get_corrected_accel) for remapped and
  /// calibrated counts.
  pub async fn get_raw_accel_data(&mut self) -> Result<AxisSample, Error<E>> {
    self.read(Reg::AccDataX).await
  }

  /// Read accelerometer data scaled to g for the configured range.
  pub async fn get_accel_data(&mut self) -> Result<Vector3d<f32>, Error<E>> {
    let raw = self.get_raw_accel_data().await?;
    let m = self.get_accel_range().await?.multiplier();

    Ok(Vector3d { x: raw.x as f32 * m, y: raw.y as f32 * m, z: raw.z as f32 * m })
  }

  /// Read one sample in the device frame (after the mounting remap).
  pub(crate) async fn get_remapped_accel(&mut self) -> Result<AxisSample, Error<E>> {
    let raw = self.get_raw_accel_data().await?;
    Ok(self.remap.apply(raw))
  }

  /// Read one sample remapped to the device frame with the calibration offset
  /// subtracted.
  pub async fn get_corrected_accel(&mut self) -> Result<AxisSample, Error<E>> {
    let raw = self.get_raw_accel_data().await?;
    Ok(self.correct_accel(raw))
  }
}

/// `ACC_CONF` register.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[packbits::pack(bytes = 1)]
pub struct AccelConfig {
  /// Output data rate (0.78 Hz to 1600 Hz).
  #[bits(4)]
  pub odr: crate::OutputDataRate,
  /// Filter mode, or averaging cycles when `undersampling` is set.
  #[bits(3)]
  pub bwp: AccelBandwidth,
  /// Undersampling, required for low-power operation.
  pub undersampling: bool,
}

impl Default for AccelConfig {
  fn default() -> Self {
    AccelConfig { odr: crate::OutputDataRate::Hz100, bwp: AccelBandwidth::Normal, undersampling: false }
  }
}

/// `acc_bwp`. Without undersampling only the first three are valid; with
/// undersampling the value selects 2^n averaged samples.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum AccelBandwidth {
  /// 4x oversampling / 1 sample averaged
  Osr4 = 0,
  /// 2x oversampling / 2 samples averaged
  Osr2 = 1,
  /// Normal filter / 4 samples averaged
  Normal = 2,
  Avg8 = 3,
  Avg16 = 4,
  Avg32 = 5,
  Avg64 = 6,
  Avg128 = 7,
}

impl From<AccelBandwidth> for u8 {
  fn from(value: AccelBandwidth) -> Self {
    value as u8
  }
}

impl TryFrom<u8> for AccelBandwidth {
  type Error = ();

  fn try_from(value: u8) -> Result<Self, Self::Error> {
    match value {
      0 => Ok(AccelBandwidth::Osr4),
      1 => Ok(AccelBandwidth::Osr2),
      2 => Ok(AccelBandwidth::Normal),
      3 => Ok(AccelBandwidth::Avg8),
      4 => Ok(AccelBandwidth::Avg16),
      5 => Ok(AccelBandwidth::Avg32),
      6 => Ok(AccelBandwidth::Avg64),
      7 => Ok(AccelBandwidth::Avg128),
      _ => Err(()),
    }
  }
}

/// Accelerometer measurement range (`ACC_RANGE`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum AccelRange {
  /// ±2g range
  #[default]
  G2 = 0x03,
  /// ±4g range
  G4 = 0x05,
  /// ±8g range
  G8 = 0x08,
  /// ±16g range
  G16 = 0x0C,
}

impl AccelRange {
  /// Counts per g.
  pub const fn lsb_per_g(self) -> i32 {
    match self {
      AccelRange::G2 => 16384,
      AccelRange::G4 => 8192,
      AccelRange::G8 => 4096,
      AccelRange::G16 => 2048,
    }
  }

  pub(crate) fn multiplier(self) -> f32 {
    1. / self.lsb_per_g() as f32
  }
}

impl From<AccelRange> for u8 {
  fn from(value: AccelRange) -> Self {
    value as u8
  }
}

impl TryFrom<u8> for AccelRange {
  type Error = ();

  fn try_from(value: u8) -> Result<Self, Self::Error> {
    match value {
      0x03 => Ok(AccelRange::G2),
      0x05 => Ok(AccelRange::G4),
      0x08 => Ok(AccelRange::G8),
      0x0C => Ok(AccelRange::G16),
      _ => Err(()),
    }
  }
}
