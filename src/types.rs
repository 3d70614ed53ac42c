/// One 3-axis reading (accelerometer, gyroscope, or raw magnetometer), in LSB.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[packbits::pack(bytes = 6)]
pub struct AxisSample {
  #[bits(16)]
  pub x: i16,
  #[bits(16)]
  pub y: i16,
  #[bits(16)]
  pub z: i16,
}

impl AxisSample {
  pub const fn new(x: i16, y: i16, z: i16) -> Self {
    Self { x, y, z }
  }

  /// Axes as an array indexed 0 = x, 1 = y, 2 = z.
  pub const fn to_array(self) -> [i16; 3] {
    [self.x, self.y, self.z]
  }

  pub const fn from_array(v: [i16; 3]) -> Self {
    Self { x: v[0], y: v[1], z: v[2] }
  }
}

/// Raw magnetometer frame as mirrored by the secondary interface: three axes
/// followed by the hall resistance word.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct MagSample {
  pub xyz: AxisSample,
  pub rhall: u16,
}

impl MagSample {
  pub(crate) fn from_le_bytes(b: &[u8; 8]) -> Self {
    let xyz = AxisSample::new(
      i16::from_le_bytes([b[0], b[1]]),
      i16::from_le_bytes([b[2], b[3]]),
      i16::from_le_bytes([b[4], b[5]]),
    );
    Self { xyz, rhall: u16::from_le_bytes([b[6], b[7]]) }
  }
}

/// Output data rates for accel/gyro/mag. Not every rate is valid for every
/// sensor: accel tops out at 1600 Hz, mag at 800 Hz.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum OutputDataRate {
  Hz0_78 = 0x01,
  Hz1_56 = 0x02,
  Hz3_12 = 0x03,
  Hz6_25 = 0x04,
  Hz12_5 = 0x05,
  Hz25 = 0x06,
  Hz50 = 0x07,
  Hz100 = 0x08,
  Hz200 = 0x09,
  Hz400 = 0x0A,
  Hz800 = 0x0B,
  Hz1600 = 0x0C,
  Hz3200 = 0x0D,
}

impl OutputDataRate {
  /// Sample period expressed in sensor-time ticks.
  ///
  /// Each halving of the rate doubles the period, starting from 16 ticks
  /// (625 µs) at 1600 Hz.
  pub const fn sensor_time_ticks(self) -> u32 {
    match self {
      // 3200 Hz is gyro only and shares the 1600 Hz timestamp granularity.
      OutputDataRate::Hz3200 => 0x10,
      _ => 0x10 << (OutputDataRate::Hz1600 as u32 - self as u32),
    }
  }

  /// Sample period in microseconds.
  pub const fn period_us(self) -> u32 {
    self.sensor_time_ticks() * 625 / 16
  }
}

impl From<OutputDataRate> for u8 {
  fn from(odr: OutputDataRate) -> Self {
    odr as u8
  }
}

impl TryFrom<u8> for OutputDataRate {
  type Error = ();

  fn try_from(value: u8) -> Result<Self, Self::Error> {
    match value {
      0x01 => Ok(OutputDataRate::Hz0_78),
      0x02 => Ok(OutputDataRate::Hz1_56),
      0x03 => Ok(OutputDataRate::Hz3_12),
      0x04 => Ok(OutputDataRate::Hz6_25),
      0x05 => Ok(OutputDataRate::Hz12_5),
      0x06 => Ok(OutputDataRate::Hz25),
      0x07 => Ok(OutputDataRate::Hz50),
      0x08 => Ok(OutputDataRate::Hz100),
      0x09 => Ok(OutputDataRate::Hz200),
      0x0A => Ok(OutputDataRate::Hz400),
      0x0B => Ok(OutputDataRate::Hz800),
      0x0C => Ok(OutputDataRate::Hz1600),
      0x0D => Ok(OutputDataRate::Hz3200),
      _ => Err(()),
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Sensor {
  Accel,
  Gyro,
  Mag,
}

/// Value of the 24-bit free running sensor-time counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct SensorTime(u32);

impl SensorTime {
  pub const MASK: u32 = 0x00FF_FFFF;

  pub const fn new(raw: u32) -> Self {
    Self(raw & Self::MASK)
  }

  pub(crate) fn from_le_bytes(b: [u8; 3]) -> Self {
    Self::new(u32::from(b[2]) << 16 | u32::from(b[1]) << 8 | u32::from(b[0]))
  }

  pub const fn ticks(self) -> u32 {
    self.0
  }

  /// Ticks elapsed from `earlier` to `self`, assuming at most one wrap.
  pub const fn ticks_since(self, earlier: SensorTime) -> u32 {
    self.0.wrapping_sub(earlier.0) & Self::MASK
  }

  /// Nanoseconds elapsed from `earlier` to `self`. One tick is 39.0625 µs.
  pub const fn nanos_since(self, earlier: SensorTime) -> u64 {
    self.ticks_since(earlier) as u64 * 625_000 / 16
  }
}
