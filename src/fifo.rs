//! FIFO buffer configuration and draining.
//!
//! The BMI160 holds 1 KB of FIFO that can be filled with accelerometer,
//! gyroscope and magnetometer frames, optionally header tagged and followed by
//! a sensor time frame. Draining reads the fill level plus one extra frame so
//! the trailing sensor time (or the over-read pattern) is always captured.
//!
//! # Examples
//!
//! ```no_run
//! # async fn example<I, D, E>(imu: &mut bmi160::Bmi160<I, D>) -> Result<(), bmi160::Error<E>>
//! # where I: embedded_hal_async::i2c::I2c<Error = E>, D: embedded_hal_async::delay::DelayNs {
//! use bmi160::{FifoFrame, FifoSelector};
//!
//! imu.set_fifo_selector(FifoSelector::ACCEL | FifoSelector::GYRO).await?;
//! imu.set_fifo_watermark(520).await?;
//!
//! let mut buf = [0u8; 1024];
//! imu.read_fifo_frames(&mut buf, |frame| {
//!   if let FifoFrame::Accel(a) = frame {
//!     let _ = a.x;
//!   }
//! }).await?;
//! # Ok(())
//! # }
//! ```

use core::ops::BitOr;

use embedded_hal_async::{delay::DelayNs, i2c::*};

use super::{defs::*, frame, Bmi160, Error, FifoFrame};

/// FIFO byte capacity.
pub const FIFO_CAPACITY: usize = 1024;

/// Set of sensors routed into the FIFO.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct FifoSelector(u8);

impl FifoSelector {
  pub const NONE: FifoSelector = FifoSelector(0);
  pub const ACCEL: FifoSelector = FifoSelector(1 << 0);
  pub const GYRO: FifoSelector = FifoSelector(1 << 1);
  pub const MAG: FifoSelector = FifoSelector(1 << 2);

  /// Build from the low three bits (accel, gyro, mag); higher bits are ignored.
  pub const fn from_bits(bits: u8) -> Self {
    Self(bits & 0x07)
  }

  pub const fn bits(self) -> u8 {
    self.0
  }

  pub const fn is_empty(self) -> bool {
    self.0 == 0
  }

  pub const fn contains(self, other: FifoSelector) -> bool {
    self.0 & other.0 == other.0
  }

  /// Sensor bytes in one frame: 6 per accel/gyro, 8 for mag.
  pub const fn payload_len(self) -> usize {
    let mut n = 0;
    if self.0 & Self::ACCEL.0 != 0 {
      n += 6;
    }
    if self.0 & Self::GYRO.0 != 0 {
      n += 6;
    }
    if self.0 & Self::MAG.0 != 0 {
      n += 8;
    }
    n
  }

  /// Header plus payload: 7, 13, 9, 15 or 21 bytes; 0 with nothing selected.
  pub const fn frame_width(self) -> usize {
    match self.payload_len() {
      0 => 0,
      n => n + 1,
    }
  }

  /// Narrowest frame this selector can produce.
  pub const fn min_width(self) -> usize {
    if self.0 & (Self::ACCEL.0 | Self::GYRO.0) != 0 {
      7
    } else if self.0 & Self::MAG.0 != 0 {
      9
    } else {
      0
    }
  }
}

impl BitOr for FifoSelector {
  type Output = FifoSelector;

  fn bitor(self, rhs: Self) -> Self::Output {
    FifoSelector(self.0 | rhs.0)
  }
}

impl<I, D, E> Bmi160<I, D>
where
  I: I2c<SevenBitAddress, Error = E>,
  D: DelayNs,
{
  pub async fn get_fifo_config(&mut self) -> Result<FifoConfig, Error<E>> {
    self.read(Reg::FifoConfig1).await
  }

  /// Write `FIFO_CONFIG_1` as is and track the selector and header mode it implies.
  pub async fn set_fifo_config(&mut self, cfg: FifoConfig) -> Result<(), Error<E>> {
    self.write(Reg::FifoConfig1, cfg).await?;
    self.fifo_selector = cfg.selector();
    self.fifo_header = cfg.header_en;
    Ok(())
  }

  /// Route the selected sensors into the FIFO, then flush it so no frames of
  /// the previous layout remain.
  pub async fn set_fifo_selector(&mut self, selector: FifoSelector) -> Result<(), Error<E>> {
    let mut cfg = self.get_fifo_config().await?;
    cfg.acc_en = selector.contains(FifoSelector::ACCEL);
    cfg.gyr_en = selector.contains(FifoSelector::GYRO);
    cfg.mag_en = selector.contains(FifoSelector::MAG);
    self.set_fifo_config(cfg).await?;
    self.fifo_flush().await?;
    info!("fifo selector {:#x}", selector.bits());
    Ok(())
  }

  /// Enable or disable per-frame header tags.
  pub async fn set_fifo_header_enabled(&mut self, enable: bool) -> Result<(), Error<E>> {
    let mut cfg = self.get_fifo_config().await?;
    cfg.header_en = enable;
    self.set_fifo_config(cfg).await
  }

  /// Set the watermark in bytes. The register counts 4-byte units, so the
  /// level is rounded down and saturates at 1020 bytes.
  pub async fn set_fifo_watermark(&mut self, level_bytes: u16) -> Result<(), Error<E>> {
    let units = core::cmp::min(level_bytes / 4, u8::MAX as u16) as u8;
    self.write_u8(Reg::FifoConfig0, units).await
  }

  /// Watermark level in bytes.
  pub async fn get_fifo_watermark(&mut self) -> Result<u16, Error<E>> {
    Ok(u16::from(self.read_u8(Reg::FifoConfig0).await?) * 4)
  }

  /// Current FIFO fill level in bytes.
  pub async fn get_fifo_length(&mut self) -> Result<u16, Error<E>> {
    Ok(self.read_u16(Reg::FifoLength).await? & 0x07FF)
  }

  /// Drop all FIFO content (configuration is preserved).
  pub async fn fifo_flush(&mut self) -> Result<(), Error<E>> {
    self.command(Command::FifoFlush).await
  }

  /// Read the FIFO content into `out`; returns bytes read.
  ///
  /// In header mode reads the fill level plus one frame width, so the burst
  /// ends on the over-read tag. Headerless reads stop at the fill level. The
  /// count is capped to `out.len()` and read in bursts of at most 256 bytes.
  /// A failed burst flushes the FIFO.
  pub async fn read_fifo_bytes(&mut self, out: &mut [u8]) -> Result<usize, Error<E>> {
    if out.is_empty() {
      return Ok(0);
    }
    let level = self.get_fifo_length().await? as usize;
    if level == 0 {
      return Ok(0);
    }
    let extra = if self.fifo_header { self.fifo_selector.frame_width() } else { 0 };
    let n = core::cmp::min(level + extra, out.len());

    for chunk in out[..n].chunks_mut(BURST_READ_MAX_LEN) {
      if let Err(e) = self.read_bytes(Reg::FifoData, chunk).await {
        warn!("fifo burst read failed, flushing");
        let _ = self.fifo_flush().await;
        return Err(e);
      }
    }
    trace!("fifo read {} of {} bytes", n, level);
    Ok(n)
  }

  /// Drain the FIFO through `buf` and hand every decoded frame to `f`.
  ///
  /// Stops at the over-read marker, which is expected after the last real
  /// frame. Returns the number of frames delivered.
  pub async fn read_fifo_frames<F>(&mut self, buf: &mut [u8], mut f: F) -> Result<usize, Error<E>>
  where
    F: FnMut(FifoFrame),
  {
    let n = self.read_fifo_bytes(buf).await?;
    let mut frames = frame::decode(&buf[..n], self.fifo_selector, self.fifo_header);
    let mut count = 0;
    for item in frames.by_ref() {
      match item {
        Ok(FifoFrame::Overread) => break,
        Ok(fr) => {
          f(fr);
          count += 1;
        }
        Err(e) => {
          warn!("fifo decode stopped: {:?}", e);
          return Err(e.into());
        }
      }
    }
    if frames.skipped() > 0 {
      debug!("fifo skipped {} frames", frames.skipped());
    }
    Ok(count)
  }
}

impl<I, D> Bmi160<I, D> {
  /// Sensors currently routed into the FIFO.
  pub fn fifo_selector(&self) -> FifoSelector {
    self.fifo_selector
  }
}

/// `FIFO_CONFIG_1` register.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[packbits::pack(bytes = 1)]
pub struct FifoConfig {
  #[skip(1)]
  /// Append a sensor time frame after the last data frame
  pub time_en: bool,
  /// Tag frames with the INT2 pin level
  pub tag_int2_en: bool,
  /// Tag frames with the INT1 pin level
  pub tag_int1_en: bool,
  /// Header mode (frames start with a tag byte)
  pub header_en: bool,
  pub mag_en: bool,
  pub acc_en: bool,
  pub gyr_en: bool,
}

impl Default for FifoConfig {
  fn default() -> Self {
    FifoConfig {
      time_en: true,
      tag_int2_en: false,
      tag_int1_en: false,
      header_en: true,
      mag_en: false,
      acc_en: false,
      gyr_en: false,
    }
  }
}

impl FifoConfig {
  pub fn selector(&self) -> FifoSelector {
    let mut bits = 0;
    if self.acc_en {
      bits |= FifoSelector::ACCEL.bits();
    }
    if self.gyr_en {
      bits |= FifoSelector::GYRO.bits();
    }
    if self.mag_en {
      bits |= FifoSelector::MAG.bits();
    }
    FifoSelector::from_bits(bits)
  }
}
