use embedded_hal_async::{delay::DelayNs, i2c::*};

use crate::{defs::*, Bmi160, Error};

impl<I, D, E> Bmi160<I, D>
where
  I: I2c<SevenBitAddress, Error = E>,
  D: DelayNs,
{
  pub(crate) async fn read<const N: usize, T: TryFrom<[u8; N]>>(&mut self, reg: Reg) -> Result<T, Error<E>> {
    let mut b = [0u8; N];
    self.read_bytes(reg, &mut b).await?;
    TryFrom::try_from(b).map_err(|_| Error::Data)
  }

  pub(crate) async fn read_u8(&mut self, reg: Reg) -> Result<u8, Error<E>> {
    let mut b = [0u8; 1];
    self.read_bytes(reg, &mut b).await?;
    Ok(b[0])
  }

  pub(crate) async fn read_u16(&mut self, reg: Reg) -> Result<u16, Error<E>> {
    let mut b = [0u8; 2];
    self.read_bytes(reg, &mut b).await?;
    Ok(u16::from_le_bytes(b))
  }

  pub(crate) async fn read_bytes(&mut self, reg: Reg, buf: &mut [u8]) -> Result<(), Error<E>> {
    self.i2c.write_read(self.address, &[reg.into()], buf).await.map_err(Error::I2c)
  }

  pub(crate) async fn write<const N: usize, T: TryInto<[u8; N]>>(&mut self, reg: Reg, v: T) -> Result<(), Error<E>> {
    let b = v.try_into().map_err(|_| Error::Data)?;
    self.write_bytes(reg, &b).await
  }

  pub(crate) async fn write_u8(&mut self, reg: Reg, value: u8) -> Result<(), Error<E>> {
    self.write_bytes(reg, &[value]).await
  }

  /// Read-modify-write of the bits selected by `mask`.
  pub(crate) async fn update_bits(&mut self, reg: Reg, mask: u8, value: u8) -> Result<(), Error<E>> {
    let current = self.read_u8(reg).await?;
    self.write_u8(reg, (current & !mask) | (value & mask)).await
  }

  pub(crate) async fn command(&mut self, cmd: Command) -> Result<(), Error<E>> {
    self.write_u8(Reg::Cmd, cmd.into()).await
  }

  pub(crate) async fn write_bytes(&mut self, reg: Reg, data: &[u8]) -> Result<(), Error<E>> {
    debug_assert!(data.len() <= 15, "write_bytes buffer too large");
    let mut buf = [0u8; 16];
    let len = 1 + data.len();
    buf[0] = reg.into();
    buf[1..len].copy_from_slice(data);
    self.i2c.write(self.address, &buf[..len]).await.map_err(Error::I2c)?;
    // Register writes need a longer idle gap while nothing is in normal mode.
    let idle = if self.power.any_normal() { WRITE_IDLE_NORMAL_US } else { WRITE_IDLE_SUSPEND_US };
    self.delay.delay_us(idle).await;
    Ok(())
  }
}
