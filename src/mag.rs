//! Magnetometer data as mirrored through the secondary interface.
//!
//! The BMI160 polls an external magnetometer (typically a BMM150) and copies
//! its raw registers into `DATA_0..DATA_7`. Compensation of those raw values
//! is magnetometer specific and left to the caller.

use embedded_hal_async::{delay::DelayNs, i2c::*};

use super::{defs::*, Bmi160, Error, MagSample, OutputDataRate};

impl<I, D, E> Bmi160<I, D>
where
  I: I2c<SevenBitAddress, Error = E>,
  D: DelayNs,
{
  /// Read the raw magnetometer frame (x, y, z, hall resistance).
  pub async fn get_raw_mag_data(&mut self) -> Result<MagSample, Error<E>> {
    let mut b = [0u8; 8];
    self.read_bytes(Reg::MagDataX, &mut b).await?;
    Ok(MagSample::from_le_bytes(&b))
  }

  pub async fn get_mag_odr(&mut self) -> Result<OutputDataRate, Error<E>> {
    let raw = self.read_u8(Reg::MagConf).await?;
    OutputDataRate::try_from(raw & 0x0F).map_err(|_| Error::Data)
  }

  /// Set the secondary interface polling rate (at most 800 Hz).
  pub async fn set_mag_odr(&mut self, odr: OutputDataRate) -> Result<(), Error<E>> {
    if odr as u8 > OutputDataRate::Hz800 as u8 {
      return Err(Error::InvalidArgument);
    }
    self.update_bits(Reg::MagConf, 0x0F, odr.into()).await
  }
}
