//! Power-mode state machine.
//!
//! Every sensor is switched through the command register and then needs a
//! mode dependent settle time before its output can be trusted. The driver
//! tracks the last commanded mode per sensor and only records a new mode once
//! the command write went through.
//!
//! # Examples
//!
//! ```no_run
//! # async fn example<I, D, E>(imu: &mut bmi160::Bmi160<I, D>) -> Result<(), bmi160::Error<E>>
//! # where I: embedded_hal_async::i2c::I2c<Error = E>, D: embedded_hal_async::delay::DelayNs {
//! use bmi160::{PowerMode, Sensor};
//!
//! imu.set_power_mode(Sensor::Accel, PowerMode::Normal).await?;
//! imu.set_power_mode(Sensor::Gyro, PowerMode::FastStart).await?;
//! assert_eq!(imu.power_state().gyro, PowerMode::FastStart);
//! # Ok(())
//! # }
//! ```

use embedded_hal_async::{delay::DelayNs, i2c::*};

use super::{defs::*, Bmi160, Error, Sensor};

impl<I, D, E> Bmi160<I, D>
where
  I: I2c<SevenBitAddress, Error = E>,
  D: DelayNs,
{
  /// Switch `sensor` to `mode` and wait for it to settle.
  ///
  /// - `FastStart` is gyro only, `LowPower1`/`LowPower2` are accel/mag only;
  ///   anything else fails with [`Error::InvalidArgument`].
  /// - Accel `Suspend` is silently skipped while the step counter, step
  ///   detector or significant motion is enabled.
  /// - On a failed command write the tracked state is left untouched.
  pub async fn set_power_mode(&mut self, sensor: Sensor, mode: PowerMode) -> Result<(), Error<E>> {
    let (cmd, settle_ms) = transition(sensor, mode).ok_or(Error::InvalidArgument)?;

    if sensor == Sensor::Accel && mode == PowerMode::Suspend && self.accel_suspend_blocked().await? {
      info!("accel suspend refused: motion features active");
      return Ok(());
    }

    self.command(cmd).await?;
    match sensor {
      Sensor::Accel => self.power.accel = mode,
      Sensor::Gyro => self.power.gyro = mode,
      Sensor::Mag => self.power.mag = mode,
    }
    debug!("{:?} -> {:?}", sensor, mode);
    self.delay.delay_ms(settle_ms).await;
    Ok(())
  }

  pub async fn set_accel_power_mode(&mut self, mode: PowerMode) -> Result<(), Error<E>> {
    self.set_power_mode(Sensor::Accel, mode).await
  }

  pub async fn set_gyro_power_mode(&mut self, mode: PowerMode) -> Result<(), Error<E>> {
    self.set_power_mode(Sensor::Gyro, mode).await
  }

  pub async fn set_mag_power_mode(&mut self, mode: PowerMode) -> Result<(), Error<E>> {
    self.set_power_mode(Sensor::Mag, mode).await
  }

  /// Read `PMU_STATUS`, the chip's own view of the power modes.
  pub async fn get_pmu_status(&mut self) -> Result<PmuStatus, Error<E>> {
    let raw = self.read_u8(Reg::PmuStatus).await?;
    Ok(PmuStatus::from_bits(raw))
  }
}

impl<I, D> Bmi160<I, D> {
  /// Last successfully commanded power modes.
  pub fn power_state(&self) -> PowerState {
    self.power
  }
}

/// Command byte and settle time in ms for a requested transition.
fn transition(sensor: Sensor, mode: PowerMode) -> Option<(Command, u32)> {
  use PowerMode::*;
  Some(match (sensor, mode) {
    (Sensor::Accel, Normal) => (Command::AccNormal, 10),
    // LP1 and LP2 share the low-power command; they differ in undersampling config.
    (Sensor::Accel, LowPower1) => (Command::AccLowPower, 3),
    (Sensor::Accel, LowPower2) => (Command::AccLowPower, 3),
    (Sensor::Accel, Suspend) => (Command::AccSuspend, 10),
    (Sensor::Gyro, Normal) => (Command::GyrNormal, 60),
    (Sensor::Gyro, FastStart) => (Command::GyrFastStart, 60),
    (Sensor::Gyro, Suspend) => (Command::GyrSuspend, 60),
    (Sensor::Mag, Normal) => (Command::MagNormal, 5),
    (Sensor::Mag, LowPower1) => (Command::MagLowPower, 5),
    // No second low-power mode on the mag interface; LP2 parks it.
    (Sensor::Mag, Suspend | LowPower2) => (Command::MagSuspend, 5),
    _ => return None,
  })
}

/// Power mode of a single sensor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum PowerMode {
  Normal = 0,
  LowPower1 = 1,
  Suspend = 2,
  /// Accel and mag only
  LowPower2 = 3,
  /// Gyro only
  FastStart = 4,
}

impl From<PowerMode> for u8 {
  fn from(value: PowerMode) -> Self {
    value as u8
  }
}

impl TryFrom<u8> for PowerMode {
  type Error = ();

  fn try_from(value: u8) -> Result<Self, Self::Error> {
    match value {
      0 => Ok(PowerMode::Normal),
      1 => Ok(PowerMode::LowPower1),
      2 => Ok(PowerMode::Suspend),
      3 => Ok(PowerMode::LowPower2),
      4 => Ok(PowerMode::FastStart),
      _ => Err(()),
    }
  }
}

/// Tracked power mode of every sensor. All suspended after power-on reset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PowerState {
  pub accel: PowerMode,
  pub gyro: PowerMode,
  pub mag: PowerMode,
}

impl Default for PowerState {
  fn default() -> Self {
    Self { accel: PowerMode::Suspend, gyro: PowerMode::Suspend, mag: PowerMode::Suspend }
  }
}

impl PowerState {
  pub(crate) fn any_normal(&self) -> bool {
    [self.accel, self.gyro, self.mag].iter().any(|m| matches!(m, PowerMode::Normal | PowerMode::FastStart))
  }
}

/// Raw `PMU_STATUS` codes: 0 suspend, 1 normal, 2 low power (accel/mag),
/// 3 fast start-up (gyro).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PmuStatus {
  pub mag: u8,
  pub gyro: u8,
  pub accel: u8,
}

impl PmuStatus {
  pub(crate) const fn from_bits(raw: u8) -> Self {
    Self { mag: raw & 0b11, gyro: (raw >> 2) & 0b11, accel: (raw >> 4) & 0b11 }
  }

  pub const fn accel_normal(&self) -> bool {
    self.accel == 1
  }

  pub const fn gyro_normal(&self) -> bool {
    self.gyro == 1
  }
}
