#![allow(dead_code)]

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub(crate) enum Reg {
  ChipId = 0x00,
  Err = 0x02,
  PmuStatus = 0x03,
  MagDataX = 0x04,
  GyrDataX = 0x0C,
  AccDataX = 0x12,
  SensorTime0 = 0x18,
  Status = 0x1B,
  Temperature = 0x20,
  FifoLength = 0x22,
  FifoData = 0x24,
  AccConf = 0x40,
  AccRange = 0x41,
  GyrConf = 0x42,
  GyrRange = 0x43,
  MagConf = 0x44,
  FifoConfig0 = 0x46,
  FifoConfig1 = 0x47,
  IntEn2 = 0x52,
  IntMotion3 = 0x62,
  FocConf = 0x69,
  Offset0 = 0x71,
  Offset6 = 0x77,
  StepCnt0 = 0x78,
  StepConf0 = 0x7A,
  StepConf1 = 0x7B,
  Cmd = 0x7E,
}

impl From<Reg> for u8 {
  #[inline]
  fn from(r: Reg) -> Self {
    r as u8
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub(crate) enum Command {
  StartFoc = 0x03,
  AccSuspend = 0x10,
  AccNormal = 0x11,
  AccLowPower = 0x12,
  GyrSuspend = 0x14,
  GyrNormal = 0x15,
  GyrFastStart = 0x17,
  MagSuspend = 0x18,
  MagNormal = 0x19,
  MagLowPower = 0x1A,
  FifoFlush = 0xB0,
  StepCntClr = 0xB2,
  SoftReset = 0xB6,
}

impl From<Command> for u8 {
  #[inline]
  fn from(c: Command) -> Self {
    c as u8
  }
}

// Accepted chip ids (BMI160/162AB, C2, C3)
pub(crate) const BMI160_CHIP_IDS: [u8; 3] = [0xD1, 0xD3, 0xD4];
pub(crate) const SOFT_RESET_DELAY_MS: u32 = 10;

// I2C addresses
pub(crate) const ADDR_I2C_PRIM: u8 = 0x68;
pub(crate) const ADDR_I2C_ALT: u8 = 0x69;

// Interface idle time after a write, per datasheet
pub(crate) const WRITE_IDLE_NORMAL_US: u32 = 2;
pub(crate) const WRITE_IDLE_SUSPEND_US: u32 = 450;

// Largest single burst the bus collaborator is asked for
pub(crate) const BURST_READ_MAX_LEN: usize = 256;

// Step detector / significant motion bits
pub(crate) const INT_EN2_STEP_DETECTOR: u8 = 1 << 3;
pub(crate) const INT_MOTION3_SIG_MOT_SEL: u8 = 1 << 1;
pub(crate) const STEP_CONF1_STEP_CNT_EN: u8 = 1 << 3;
