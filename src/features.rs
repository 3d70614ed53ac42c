//! Step counter, step detector and significant motion.
//!
//! All three keep the accelerometer busy in the background, so the power
//! controller refuses to suspend the accelerometer while any of them is on.
//! Step counter and step detector state is read back from the chip; the
//! significant motion flag is tracked by the driver because its interrupt
//! routing is owned by the host.

use embedded_hal_async::{delay::DelayNs, i2c::*};

use crate::{defs::*, Bmi160, Error};

impl<I, D, E> Bmi160<I, D>
where
  I: I2c<SevenBitAddress, Error = E>,
  D: DelayNs,
{
  /// Enable or disable the step counter (`STEP_CONF_1.step_cnt_en`).
  pub async fn set_step_counter_enabled(&mut self, enable: bool) -> Result<(), Error<E>> {
    let v = if enable { STEP_CONF1_STEP_CNT_EN } else { 0 };
    self.update_bits(Reg::StepConf1, STEP_CONF1_STEP_CNT_EN, v).await
  }

  pub async fn is_step_counter_enabled(&mut self) -> Result<bool, Error<E>> {
    Ok(self.read_u8(Reg::StepConf1).await? & STEP_CONF1_STEP_CNT_EN != 0)
  }

  /// Enable or disable the step detector interrupt (`INT_EN_2.step_detector_en`).
  pub async fn set_step_detector_enabled(&mut self, enable: bool) -> Result<(), Error<E>> {
    let v = if enable { INT_EN2_STEP_DETECTOR } else { 0 };
    self.update_bits(Reg::IntEn2, INT_EN2_STEP_DETECTOR, v).await
  }

  pub async fn is_step_detector_enabled(&mut self) -> Result<bool, Error<E>> {
    Ok(self.read_u8(Reg::IntEn2).await? & INT_EN2_STEP_DETECTOR != 0)
  }

  /// Select significant motion on the any-motion engine and record it as active.
  pub async fn set_sig_motion_enabled(&mut self, enable: bool) -> Result<(), Error<E>> {
    let v = if enable { INT_MOTION3_SIG_MOT_SEL } else { 0 };
    self.update_bits(Reg::IntMotion3, INT_MOTION3_SIG_MOT_SEL, v).await?;
    self.sig_motion = enable;
    Ok(())
  }

  pub fn is_sig_motion_enabled(&self) -> bool {
    self.sig_motion
  }

  /// Step count accumulated since the last reset.
  pub async fn get_step_count(&mut self) -> Result<u16, Error<E>> {
    self.read_u16(Reg::StepCnt0).await
  }

  /// Reset the step counter to zero.
  pub async fn reset_step_counter(&mut self) -> Result<(), Error<E>> {
    self.command(Command::StepCntClr).await
  }

  /// Program the step counter sensitivity preset.
  pub async fn set_step_mode(&mut self, mode: StepMode) -> Result<(), Error<E>> {
    let [conf0, conf1] = mode.config();
    self.write_u8(Reg::StepConf0, conf0).await?;
    self.update_bits(Reg::StepConf1, 0x07, conf1).await
  }

  /// True while any feature that needs a running accelerometer is enabled.
  pub(crate) async fn accel_suspend_blocked(&mut self) -> Result<bool, Error<E>> {
    if self.sig_motion {
      return Ok(true);
    }
    Ok(self.is_step_counter_enabled().await? || self.is_step_detector_enabled().await?)
  }
}

/// Step detection presets from the datasheet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum StepMode {
  /// Balance between false positives and missed steps
  #[default]
  Normal,
  /// Fewer false positives, may miss light steps
  Robust,
  /// Catches light steps, more false positives
  Sensitive,
}

impl StepMode {
  /// `STEP_CONF_0` value and `STEP_CONF_1.min_step_buf`.
  const fn config(self) -> [u8; 2] {
    match self {
      StepMode::Normal => [0x15, 0x03],
      StepMode::Sensitive => [0x2D, 0x00],
      StepMode::Robust => [0x1D, 0x07],
    }
  }
}

#[cfg(test)]
mod tests {
  use futures::executor::block_on;

  use super::*;
  use crate::testing::{FakeBus, FakeDelay};

  #[test]
  fn step_counter_flag_preserves_other_bits() {
    let bus = FakeBus::default().with_reg(Reg::StepConf1, 0x03);
    let mut imu = Bmi160::new(bus, FakeDelay::default());
    block_on(imu.set_step_counter_enabled(true)).unwrap();
    assert_eq!(imu.i2c.reg(Reg::StepConf1), 0x0B);
    assert!(block_on(imu.is_step_counter_enabled()).unwrap());
    block_on(imu.set_step_counter_enabled(false)).unwrap();
    assert_eq!(imu.i2c.reg(Reg::StepConf1), 0x03);
  }

  #[test]
  fn step_count_and_reset() {
    let bus = FakeBus::default().with_bytes(Reg::StepCnt0, &[0x34, 0x12]);
    let mut imu = Bmi160::new(bus, FakeDelay::default());
    assert_eq!(block_on(imu.get_step_count()).unwrap(), 0x1234);
    block_on(imu.reset_step_counter()).unwrap();
    assert_eq!(imu.i2c.commands(), [0xB2]);
  }

  #[test]
  fn step_mode_programs_both_registers() {
    let bus = FakeBus::default().with_reg(Reg::StepConf1, STEP_CONF1_STEP_CNT_EN);
    let mut imu = Bmi160::new(bus, FakeDelay::default());
    block_on(imu.set_step_mode(StepMode::Robust)).unwrap();
    assert_eq!(imu.i2c.reg(Reg::StepConf0), 0x1D);
    assert_eq!(imu.i2c.reg(Reg::StepConf1), STEP_CONF1_STEP_CNT_EN | 0x07);
  }

  #[test]
  fn suspend_blocked_by_any_feature() {
    let mut imu = Bmi160::new(FakeBus::default(), FakeDelay::default());
    assert!(!block_on(imu.accel_suspend_blocked()).unwrap());
    block_on(imu.set_step_detector_enabled(true)).unwrap();
    assert!(block_on(imu.accel_suspend_blocked()).unwrap());
    block_on(imu.set_step_detector_enabled(false)).unwrap();
    block_on(imu.set_sig_motion_enabled(true)).unwrap();
    assert!(block_on(imu.accel_suspend_blocked()).unwrap());
  }
}
