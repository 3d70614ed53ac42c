//! Accelerometer zero-offset calibration.
//!
//! The offset is a per-axis bias in LSB that is subtracted from every
//! accelerometer sample after remapping. It is estimated by averaging a short
//! burst of samples with the device lying flat, then persisted through a
//! host-supplied [`CalibrationStorage`].
//!
//! A persisted record of all zeros is treated exactly like a missing record.
//! A genuine zero bias is therefore indistinguishable from "never
//! calibrated"; callers relying on this should keep it in mind.

use embedded_hal_async::{delay::DelayNs, i2c::*};

use crate::{AxisSample, Bmi160, Error};

/// Samples averaged by [`Bmi160::calibrate`].
pub const CALIBRATION_SAMPLES: u32 = 20;
/// Spacing between calibration samples.
pub const CALIBRATION_INTERVAL_MS: u32 = 20;
/// One g in LSB at the ±4 g range used while sampling.
pub const ONE_G_LSB: i32 = 8192;

/// Bias subtracted from remapped accelerometer samples.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct CalibrationOffset {
  pub x: i16,
  pub y: i16,
  pub z: i16,
}

impl CalibrationOffset {
  pub const ZERO: CalibrationOffset = CalibrationOffset { x: 0, y: 0, z: 0 };

  pub const fn new(x: i16, y: i16, z: i16) -> Self {
    Self { x, y, z }
  }

  pub fn is_zero(&self) -> bool {
    *self == Self::ZERO
  }

  /// Persisted layout: x, y, z as little-endian `i16`.
  pub fn to_bytes(&self) -> [u8; 6] {
    let mut b = [0u8; 6];
    b[0..2].copy_from_slice(&self.x.to_le_bytes());
    b[2..4].copy_from_slice(&self.y.to_le_bytes());
    b[4..6].copy_from_slice(&self.z.to_le_bytes());
    b
  }

  pub fn from_bytes(b: &[u8; 6]) -> Self {
    Self {
      x: i16::from_le_bytes([b[0], b[1]]),
      y: i16::from_le_bytes([b[2], b[3]]),
      z: i16::from_le_bytes([b[4], b[5]]),
    }
  }

  /// Offset from per-axis sums over `count` samples.
  ///
  /// Averages truncate toward zero. Gravity is assumed on z after remap, so
  /// exactly one g is taken off the z average in the direction of its sign.
  pub fn from_sums(sum: [i32; 3], count: i32) -> Self {
    let avg = sum.map(|s| s / count.max(1));
    let z = match avg[2] {
      z if z > 0 => z - ONE_G_LSB,
      z if z < 0 => z + ONE_G_LSB,
      _ => 0,
    };
    Self { x: saturate(avg[0]), y: saturate(avg[1]), z: saturate(z) }
  }
}

fn saturate(v: i32) -> i16 {
  v.clamp(i16::MIN as i32, i16::MAX as i32) as i16
}

/// Subtract `offset` from a remapped sample.
pub fn apply_calibration(sample: AxisSample, offset: &CalibrationOffset) -> AxisSample {
  AxisSample::new(
    sample.x.wrapping_sub(offset.x),
    sample.y.wrapping_sub(offset.y),
    sample.z.wrapping_sub(offset.z),
  )
}

/// Host storage for the calibration record (flash page, EEPROM, file...).
#[allow(async_fn_in_trait)]
pub trait CalibrationStorage {
  type Error;

  /// Return the stored record, or `None` if nothing was ever saved.
  async fn load(&mut self) -> Result<Option<[u8; 6]>, Self::Error>;

  async fn save(&mut self, record: &[u8; 6]) -> Result<(), Self::Error>;
}

impl<I, D, E> Bmi160<I, D>
where
  I: I2c<SevenBitAddress, Error = E>,
  D: DelayNs,
{
  /// Estimate the accelerometer bias, adopt it, and persist it.
  ///
  /// Reads [`CALIBRATION_SAMPLES`] remapped samples [`CALIBRATION_INTERVAL_MS`]
  /// apart. The accelerometer must be running at ±4 g.
  ///
  /// If saving fails the new offset is still in effect and is returned inside
  /// [`Error::NotPersisted`]. A bus error while sampling leaves the driver
  /// uncalibrated.
  pub async fn calibrate<S: CalibrationStorage>(&mut self, storage: &mut S) -> Result<CalibrationOffset, Error<E>> {
    self.calibration = CalibrationOffset::ZERO;

    let mut sum = [0i32; 3];
    for _ in 0..CALIBRATION_SAMPLES {
      let s = self.get_remapped_accel().await?;
      sum[0] += i32::from(s.x);
      sum[1] += i32::from(s.y);
      sum[2] += i32::from(s.z);
      self.delay.delay_ms(CALIBRATION_INTERVAL_MS).await;
    }

    let offset = CalibrationOffset::from_sums(sum, CALIBRATION_SAMPLES as i32);
    self.calibration = offset;
    info!("accel calibration {} {} {}", offset.x, offset.y, offset.z);

    match storage.save(&offset.to_bytes()).await {
      Ok(()) => Ok(offset),
      Err(_) => {
        warn!("accel calibration not persisted");
        Err(Error::NotPersisted(offset))
      }
    }
  }

  /// Load the persisted offset and adopt it.
  ///
  /// Missing, unreadable or all-zero records yield [`Error::NotFound`] and
  /// leave the driver uncalibrated.
  pub async fn load_calibration<S: CalibrationStorage>(&mut self, storage: &mut S) -> Result<CalibrationOffset, Error<E>> {
    let record = match storage.load().await {
      Ok(Some(record)) => record,
      Ok(None) | Err(_) => {
        info!("no accel calibration");
        self.calibration = CalibrationOffset::ZERO;
        return Err(Error::NotFound);
      }
    };

    let offset = CalibrationOffset::from_bytes(&record);
    self.calibration = offset;
    if offset.is_zero() {
      return Err(Error::NotFound);
    }
    info!("loaded accel calibration {} {} {}", offset.x, offset.y, offset.z);
    Ok(offset)
  }

  /// Drop the active offset and overwrite the persisted record with zeros,
  /// which later loads report as [`Error::NotFound`].
  ///
  /// The in-memory offset is cleared even if saving fails.
  pub async fn reset_calibration<S: CalibrationStorage>(&mut self, storage: &mut S) -> Result<(), Error<E>> {
    self.calibration = CalibrationOffset::ZERO;
    match storage.save(&CalibrationOffset::ZERO.to_bytes()).await {
      Ok(()) => {
        info!("accel calibration reset");
        Ok(())
      }
      Err(_) => {
        warn!("accel calibration reset not persisted");
        Err(Error::NotPersisted(CalibrationOffset::ZERO))
      }
    }
  }
}

impl<I, D> Bmi160<I, D> {
  /// Offset currently applied to accelerometer samples (zero when uncalibrated).
  pub fn calibration(&self) -> CalibrationOffset {
    self.calibration
  }

  /// Drop the active offset in memory only. See [`Bmi160::reset_calibration`]
  /// to also erase the persisted record.
  pub fn clear_calibration(&mut self) {
    self.calibration = CalibrationOffset::ZERO;
  }

  /// Remap then subtract the active calibration.
  pub(crate) fn correct_accel(&self, raw: AxisSample) -> AxisSample {
    apply_calibration(self.remap.apply(raw), &self.calibration)
  }
}

#[cfg(test)]
mod tests {
  use futures::executor::block_on;

  use super::*;
  use crate::{defs::Reg, remap::AxisRemap, testing::*};

  #[derive(Default)]
  struct MemStorage {
    record: Option<[u8; 6]>,
    fail: bool,
    saves: usize,
  }

  impl CalibrationStorage for MemStorage {
    type Error = ();

    async fn load(&mut self) -> Result<Option<[u8; 6]>, ()> {
      if self.fail {
        return Err(());
      }
      Ok(self.record)
    }

    async fn save(&mut self, record: &[u8; 6]) -> Result<(), ()> {
      self.saves += 1;
      if self.fail {
        return Err(());
      }
      self.record = Some(*record);
      Ok(())
    }
  }

  fn accel_bus(x: i16, y: i16, z: i16) -> FakeBus {
    let mut b = [0u8; 6];
    b[0..2].copy_from_slice(&x.to_le_bytes());
    b[2..4].copy_from_slice(&y.to_le_bytes());
    b[4..6].copy_from_slice(&z.to_le_bytes());
    FakeBus::default().with_bytes(Reg::AccDataX, &b)
  }

  #[test]
  fn z_bias_removes_one_g_toward_sign() {
    assert_eq!(CalibrationOffset::from_sums([0, 0, 9000 * 20], 20).z, 808);
    assert_eq!(CalibrationOffset::from_sums([0, 0, -9000 * 20], 20).z, -808);
    assert_eq!(CalibrationOffset::from_sums([0, 0, 0], 20).z, 0);
  }

  #[test]
  fn averages_truncate_toward_zero() {
    let off = CalibrationOffset::from_sums([39, -39, 8192 * 20 + 19], 20);
    assert_eq!(off, CalibrationOffset::new(1, -1, 0));
  }

  #[test]
  fn calibrate_samples_remapped_data_and_persists() {
    let bus = accel_bus(100, -50, 9000);
    let mut imu = Bmi160::new(bus, FakeDelay::default()).with_remap(AxisRemap::from_placement(1));
    let mut storage = MemStorage::default();

    let off = block_on(imu.calibrate(&mut storage)).expect("calibrate");

    // P1 maps (x, y, z) to (y, -x, z)
    assert_eq!(off, CalibrationOffset::new(-50, -100, 808));
    assert_eq!(imu.calibration(), off);
    assert_eq!(storage.record, Some(off.to_bytes()));
    assert_eq!(imu.i2c.reads().iter().filter(|(r, _)| *r == u8::from(Reg::AccDataX)).count(), 20);
    assert_eq!(imu.delay.settle_ms(), [20; 20]);
  }

  #[test]
  fn failed_persist_still_applies_offset() {
    let mut imu = Bmi160::new(accel_bus(0, 0, -9000), FakeDelay::default());
    let mut storage = MemStorage { fail: true, ..Default::default() };

    match block_on(imu.calibrate(&mut storage)) {
      Err(Error::NotPersisted(off)) => assert_eq!(off.z, -808),
      other => panic!("unexpected {other:?}"),
    }
    assert_eq!(imu.calibration().z, -808);
    assert_eq!(storage.saves, 1);
  }

  #[test]
  fn bus_error_leaves_driver_uncalibrated() {
    let mut imu = Bmi160::new(accel_bus(1, 1, 1), FakeDelay::default());
    imu.calibration = CalibrationOffset::new(3, 3, 3);
    imu.i2c.fail_reads = true;
    let mut storage = MemStorage::default();
    assert!(matches!(block_on(imu.calibrate(&mut storage)), Err(Error::I2c(_))));
    assert!(imu.calibration().is_zero());
    assert_eq!(storage.saves, 0);
  }

  #[test]
  fn load_treats_zero_record_as_missing() {
    let mut imu = Bmi160::new(FakeBus::default(), FakeDelay::default());

    let mut empty = MemStorage::default();
    assert!(matches!(block_on(imu.load_calibration(&mut empty)), Err(Error::NotFound)));

    let mut zero = MemStorage { record: Some([0; 6]), ..Default::default() };
    assert!(matches!(block_on(imu.load_calibration(&mut zero)), Err(Error::NotFound)));

    let mut broken = MemStorage { fail: true, ..Default::default() };
    assert!(matches!(block_on(imu.load_calibration(&mut broken)), Err(Error::NotFound)));

    let stored = CalibrationOffset::new(12, -7, 300);
    let mut good = MemStorage { record: Some(stored.to_bytes()), ..Default::default() };
    assert_eq!(block_on(imu.load_calibration(&mut good)).unwrap(), stored);
    assert_eq!(imu.calibration(), stored);
  }

  #[test]
  fn reset_erases_persisted_record() {
    let mut imu = Bmi160::new(accel_bus(40, -40, 8300), FakeDelay::default());
    let mut storage = MemStorage::default();
    block_on(imu.calibrate(&mut storage)).expect("calibrate");
    assert!(!imu.calibration().is_zero());

    block_on(imu.reset_calibration(&mut storage)).expect("reset");

    assert!(imu.calibration().is_zero());
    assert_eq!(storage.record, Some([0; 6]));
    assert!(matches!(block_on(imu.load_calibration(&mut storage)), Err(Error::NotFound)));
  }

  #[test]
  fn failed_reset_still_clears_memory() {
    let mut imu = Bmi160::new(FakeBus::default(), FakeDelay::default());
    imu.calibration = CalibrationOffset::new(5, 5, 5);
    let mut storage = MemStorage { fail: true, ..Default::default() };
    assert!(matches!(block_on(imu.reset_calibration(&mut storage)), Err(Error::NotPersisted(off)) if off.is_zero()));
    assert!(imu.calibration().is_zero());
  }

  #[test]
  fn apply_subtracts_after_remap() {
    let imu = Bmi160::new(FakeBus::default(), FakeDelay::default()).with_remap(AxisRemap::from_placement(2));
    let mut imu = imu;
    imu.calibration = CalibrationOffset::new(1, 2, 3);
    assert_eq!(imu.correct_accel(AxisSample::new(10, 20, 30)), AxisSample::new(-11, -22, 27));
    assert_eq!(apply_calibration(AxisSample::new(5, 5, 5), &CalibrationOffset::new(5, 0, -5)), AxisSample::new(0, 5, 10));
  }
}
