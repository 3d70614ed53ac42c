//! On-chip offset compensation.
//!
//! Separate from the host-side [`calib`](crate::calib) offset: these registers
//! are applied by the chip itself before data reaches the data registers and
//! the FIFO. Fast offset compensation (FOC) lets the chip estimate them.

use embedded_hal_async::{delay::DelayNs, i2c::*};

use crate::{defs::*, Bmi160, Error, PowerMode, Status};

const FOC_POLL_MS: u32 = 10;
const FOC_MAX_POLLS: u32 = 50;

const OFFSET6_ACC_EN: u8 = 1 << 6;
const OFFSET6_GYR_EN: u8 = 1 << 7;

impl<I, D, E> Bmi160<I, D>
where
  I: I2c<SevenBitAddress, Error = E>,
  D: DelayNs,
{
  pub async fn get_hw_offset(&mut self) -> Result<HwOffset, Error<E>> {
    let mut b = [0u8; 7];
    self.read_bytes(Reg::Offset0, &mut b).await?;
    Ok(HwOffset::from_bytes(&b))
  }

  pub async fn set_hw_offset(&mut self, v: HwOffset) -> Result<(), Error<E>> {
    self.write_bytes(Reg::Offset0, &v.to_bytes()).await
  }

  /// Toggle on-chip offset compensation without touching the offset values.
  pub async fn set_hw_offset_enabled(&mut self, accel: bool, gyro: bool) -> Result<(), Error<E>> {
    let mut v = 0;
    if accel {
      v |= OFFSET6_ACC_EN;
    }
    if gyro {
      v |= OFFSET6_GYR_EN;
    }
    self.update_bits(Reg::Offset6, OFFSET6_ACC_EN | OFFSET6_GYR_EN, v).await
  }

  /// Run fast offset compensation and enable the resulting offsets.
  ///
  /// The sensors being compensated must be in normal mode and at rest in the
  /// orientation described by `cfg`. Times out with [`Error::Data`].
  pub async fn run_foc(&mut self, cfg: FocConfig) -> Result<HwOffset, Error<E>> {
    let accel = cfg.accel_enabled();
    if (accel && self.power.accel != PowerMode::Normal) || (cfg.gyr_en && self.power.gyro != PowerMode::Normal) {
      return Err(Error::InvalidArgument);
    }
    if !accel && !cfg.gyr_en {
      return Err(Error::InvalidArgument);
    }

    self.write(Reg::FocConf, cfg).await?;
    self.command(Command::StartFoc).await?;

    let mut polls = 0;
    loop {
      let st: Status = self.read(Reg::Status).await?;
      if st.foc_rdy {
        break;
      }
      if polls >= FOC_MAX_POLLS {
        warn!("foc timed out");
        return Err(Error::Data);
      }
      self.delay.delay_ms(FOC_POLL_MS).await;
      polls += 1;
    }

    let current = self.get_hw_offset().await?;
    self.set_hw_offset_enabled(accel || current.accel_en, cfg.gyr_en || current.gyro_en).await?;
    let offset = self.get_hw_offset().await?;
    debug!("foc done: {:?}", offset);
    Ok(offset)
  }
}

/// Contents of `OFFSET_0..OFFSET_6`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct HwOffset {
  /// Accelerometer offsets, 3.9 mg per LSB.
  pub accel: [i8; 3],
  /// Gyroscope offsets, 10-bit signed, 0.061 °/s per LSB.
  pub gyro: [i16; 3],
  pub accel_en: bool,
  pub gyro_en: bool,
}

impl HwOffset {
  pub(crate) fn from_bytes(b: &[u8; 7]) -> Self {
    let hi = b[6];
    let gyro = core::array::from_fn(|i| {
      let raw = (u16::from((hi >> (2 * i)) & 0x03) << 8) | u16::from(b[3 + i]);
      // sign-extend 10 bits
      ((raw << 6) as i16) >> 6
    });
    Self {
      accel: [b[0] as i8, b[1] as i8, b[2] as i8],
      gyro,
      accel_en: hi & OFFSET6_ACC_EN != 0,
      gyro_en: hi & OFFSET6_GYR_EN != 0,
    }
  }

  pub(crate) fn to_bytes(&self) -> [u8; 7] {
    let mut b = [0u8; 7];
    for i in 0..3 {
      b[i] = self.accel[i] as u8;
      let g = (self.gyro[i].clamp(-512, 511) as u16) & 0x03FF;
      b[3 + i] = g as u8;
      b[6] |= ((g >> 8) as u8) << (2 * i);
    }
    if self.accel_en {
      b[6] |= OFFSET6_ACC_EN;
    }
    if self.gyro_en {
      b[6] |= OFFSET6_GYR_EN;
    }
    b
  }
}

/// `FOC_CONF` register.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[packbits::pack(bytes = 1)]
pub struct FocConfig {
  #[bits(2)]
  pub acc_z: FocTarget,
  #[bits(2)]
  pub acc_y: FocTarget,
  #[bits(2)]
  pub acc_x: FocTarget,
  pub gyr_en: bool,
}

impl Default for FocConfig {
  /// Device flat, face up: x and y at 0 g, z at +1 g, gyro at rest.
  fn default() -> Self {
    FocConfig { acc_z: FocTarget::PlusOneG, acc_y: FocTarget::ZeroG, acc_x: FocTarget::ZeroG, gyr_en: true }
  }
}

impl FocConfig {
  fn accel_enabled(&self) -> bool {
    [self.acc_x, self.acc_y, self.acc_z].iter().any(|t| *t != FocTarget::Disabled)
  }
}

/// Expected reading of an accelerometer axis during FOC.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum FocTarget {
  Disabled = 0,
  PlusOneG = 1,
  MinusOneG = 2,
  ZeroG = 3,
}

impl From<FocTarget> for u8 {
  fn from(value: FocTarget) -> Self {
    value as u8
  }
}

impl TryFrom<u8> for FocTarget {
  type Error = ();

  fn try_from(value: u8) -> Result<Self, Self::Error> {
    match value {
      0 => Ok(FocTarget::Disabled),
      1 => Ok(FocTarget::PlusOneG),
      2 => Ok(FocTarget::MinusOneG),
      3 => Ok(FocTarget::ZeroG),
      _ => Err(()),
    }
  }
}
