//! Gyroscope configuration and data reading.
//!
//! # Examples
//!
//! ```no_run
//! # async fn example<I, D, E>(imu: &mut bmi160::Bmi160<I, D>) -> Result<(), bmi160::Error<E>>
//! # where I: embedded_hal_async::i2c::I2c<Error = E>, D: embedded_hal_async::delay::DelayNs {
//! use bmi160::gyro::{GyroConfig, GyroRange};
//! use bmi160::OutputDataRate;
//!
//! imu.set_gyro_conf(GyroConfig { odr: OutputDataRate::Hz400, ..Default::default() }).await?;
//! imu.set_gyro_range(GyroRange::DPS500).await?;
//!
//! // Angular rate in degrees per second
//! let gyro = imu.get_gyro_data().await?;
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
  /// Read the current gyroscope configuration.
  pub async fn get_gyro_conf(&mut self) -> Result<GyroConfig, Error<E>> {
    self.read(Reg::GyrConf).await
  }

  /// Set the gyroscope output data rate and filter. Rates below 25 Hz are
  /// not supported by the gyroscope.
  pub async fn set_gyro_conf(&mut self, cfg: GyroConfig) -> Result<(), Error<E>> {
    if (cfg.odr as u8) < crate::OutputDataRate::Hz25 as u8 {
      return Err(Error::InvalidArgument);
    }
    self.write(Reg::GyrConf, cfg).await
  }

  pub async fn get_gyro_range(&mut self) -> Result<GyroRange, Error<E>> {
    let raw = self.read_u8(Reg::GyrRange).await?;
    GyroRange::try_from(raw & 0x07).map_err(|_| Error::Data)
  }

  pub async fn set_gyro_range(&mut self, range: GyroRange) -> Result<(), Error<E>> {
    self.write_u8(Reg::GyrRange, range.into()).await
  }

  /// Read raw gyroscope data (16-bit signed integers, chip frame).
  pub async fn get_raw_gyro_data(&mut self) -> Result<AxisSample, Error<E>> {
    self.read(Reg::GyrDataX).await
  }

  /// Read gyroscope data scaled to degrees per second (°/s).
  pub async fn get_gyro_data(&mut self) -> Result<Vector3d<f32>, Error<E>> {
    let raw = self.get_raw_gyro_data().await?;
    let m = self.get_gyro_range().await?.multiplier();

    Ok(Vector3d { x: raw.x as f32 * m, y: raw.y as f32 * m, z: raw.z as f32 * m })
  }

  /// Read one sample in the device frame (after the mounting remap).
  pub async fn get_remapped_gyro(&mut self) -> Result<AxisSample, Error<E>> {
    let raw = self.get_raw_gyro_data().await?;
    Ok(self.remap.apply(raw))
  }
}

/// `GYR_CONF` register.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[packbits::pack(bytes = 1)]
pub struct GyroConfig {
  /// Output data rate (25 Hz to 3200 Hz).
  #[bits(4)]
  pub odr: crate::OutputDataRate,
  /// Low-pass filter mode.
  #[bits(2)]
  pub bwp: GyroBandwidth,
}

impl Default for GyroConfig {
  fn default() -> Self {
    GyroConfig { odr: crate::OutputDataRate::Hz100, bwp: GyroBandwidth::Normal }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum GyroBandwidth {
  Osr4 = 0,
  Osr2 = 1,
  Normal = 2,
}

impl From<GyroBandwidth> for u8 {
  fn from(value: GyroBandwidth) -> Self {
    value as u8
  }
}

impl TryFrom<u8> for GyroBandwidth {
  type Error = ();

  fn try_from(value: u8) -> Result<Self, Self::Error> {
    match value {
      0 => Ok(GyroBandwidth::Osr4),
      1 => Ok(GyroBandwidth::Osr2),
      2 => Ok(GyroBandwidth::Normal),
      _ => Err(()),
    }
  }
}

/// Gyroscope measurement ranges (`GYR_RANGE`)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum GyroRange {
  /// ±2000 degrees per second
  #[default]
  DPS2000 = 0,
  /// ±1000 degrees per second
  DPS1000 = 1,
  /// ±500 degrees per second
  DPS500 = 2,
  /// ±250 degrees per second
  DPS250 = 3,
  /// ±125 degrees per second
  DPS125 = 4,
}

impl GyroRange {
  pub fn dps(&self) -> f32 {
    match self {
      GyroRange::DPS125 => 125.0,
      GyroRange::DPS250 => 250.0,
      GyroRange::DPS500 => 500.0,
      GyroRange::DPS1000 => 1000.0,
      GyroRange::DPS2000 => 2000.0,
    }
  }

  pub fn multiplier(&self) -> f32 {
    self.dps() / 32768.0
  }
}

impl From<GyroRange> for u8 {
  fn from(value: GyroRange) -> Self {
    value as u8
  }
}

impl TryFrom<u8> for GyroRange {
  type Error = ();

  fn try_from(value: u8) -> Result<Self, Self::Error> {
    match value {
      0 => Ok(GyroRange::DPS2000),
      1 => Ok(GyroRange::DPS1000),
      2 => Ok(GyroRange::DPS500),
      3 => Ok(GyroRange::DPS250),
      4 => Ok(GyroRange::DPS125),
      _ => Err(()),
    }
  }
}
