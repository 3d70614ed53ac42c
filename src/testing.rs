//! In-memory register file and recording delay used by the unit tests.

use std::{cell::Cell, collections::VecDeque, rc::Rc, vec::Vec};

use embedded_hal_async::{
  delay::DelayNs,
  i2c::{ErrorKind, ErrorType, I2c, Operation, SevenBitAddress},
};

use crate::defs::Reg;

#[derive(Debug)]
pub(crate) struct FakeBus {
  regs: [u8; 256],
  fifo: VecDeque<u8>,
  writes: Vec<(u8, Vec<u8>)>,
  reads: Vec<(u8, usize)>,
  last_address: Option<u8>,
  pub(crate) fail_writes: bool,
  pub(crate) fail_reads: bool,
  pub(crate) fail_fifo_reads: bool,
}

impl Default for FakeBus {
  fn default() -> Self {
    Self {
      regs: [0; 256],
      fifo: VecDeque::new(),
      writes: Vec::new(),
      reads: Vec::new(),
      last_address: None,
      fail_writes: false,
      fail_reads: false,
      fail_fifo_reads: false,
    }
  }
}

impl FakeBus {
  pub(crate) fn with_reg(mut self, reg: Reg, value: u8) -> Self {
    self.set_reg(reg, value);
    self
  }

  pub(crate) fn with_bytes(mut self, reg: Reg, bytes: &[u8]) -> Self {
    let base = u8::from(reg) as usize;
    self.regs[base..base + bytes.len()].copy_from_slice(bytes);
    self
  }

  /// Queue bytes behind `FIFO_DATA` and update `FIFO_LENGTH` to match.
  pub(crate) fn with_fifo(mut self, bytes: &[u8]) -> Self {
    self.fifo.extend(bytes.iter().copied());
    let len = (self.fifo.len() as u16).to_le_bytes();
    self.with_bytes(Reg::FifoLength, &len)
  }

  pub(crate) fn set_reg(&mut self, reg: Reg, value: u8) {
    self.regs[u8::from(reg) as usize] = value;
  }

  pub(crate) fn reg(&self, reg: Reg) -> u8 {
    self.regs[u8::from(reg) as usize]
  }

  /// Every payload written, as (register, bytes).
  pub(crate) fn writes(&self) -> &[(u8, Vec<u8>)] {
    &self.writes
  }

  /// Every burst read issued, as (register, length).
  pub(crate) fn reads(&self) -> &[(u8, usize)] {
    &self.reads
  }

  /// Bytes written to the command register, in order.
  pub(crate) fn commands(&self) -> Vec<u8> {
    self
      .writes
      .iter()
      .filter(|(reg, _)| *reg == u8::from(Reg::Cmd))
      .flat_map(|(_, b)| b.iter().copied())
      .collect()
  }

  pub(crate) fn last_address(&self) -> Option<u8> {
    self.last_address
  }
}

impl ErrorType for FakeBus {
  type Error = ErrorKind;
}

impl I2c<SevenBitAddress> for FakeBus {
  async fn transaction(&mut self, address: u8, operations: &mut [Operation<'_>]) -> Result<(), Self::Error> {
    self.last_address = Some(address);
    let mut pointer: Option<u8> = None;
    for op in operations.iter_mut() {
      match op {
        Operation::Write(data) => {
          let (&reg, payload) = data.split_first().ok_or(ErrorKind::Other)?;
          if payload.is_empty() {
            pointer = Some(reg);
            continue;
          }
          if self.fail_writes {
            return Err(ErrorKind::Other);
          }
          self.writes.push((reg, payload.to_vec()));
          for (i, b) in payload.iter().enumerate() {
            self.regs[reg as usize + i] = *b;
          }
        }
        Operation::Read(buf) => {
          let reg = pointer.ok_or(ErrorKind::Other)?;
          if self.fail_reads || (self.fail_fifo_reads && reg == u8::from(Reg::FifoData)) {
            return Err(ErrorKind::Other);
          }
          self.reads.push((reg, buf.len()));
          if reg == u8::from(Reg::FifoData) {
            // An empty FIFO reads back the over-read pattern.
            for b in buf.iter_mut() {
              *b = self.fifo.pop_front().unwrap_or(0x80);
            }
          } else {
            let base = reg as usize;
            buf.copy_from_slice(&self.regs[base..base + buf.len()]);
          }
        }
      }
    }
    Ok(())
  }
}

/// Delay that returns immediately and records every request in nanoseconds.
#[derive(Debug, Default)]
pub(crate) struct FakeDelay {
  calls: Vec<u64>,
}

impl FakeDelay {
  pub(crate) fn calls_ns(&self) -> &[u64] {
    &self.calls
  }

  /// Delays of at least one millisecond, in ms. Filters out write idle gaps.
  pub(crate) fn settle_ms(&self) -> Vec<u64> {
    self.calls.iter().filter(|ns| **ns >= 1_000_000).map(|ns| ns / 1_000_000).collect()
  }

  fn record(&mut self, ns: u64) {
    self.calls.push(ns);
  }
}

impl DelayNs for FakeDelay {
  async fn delay_ns(&mut self, ns: u32) {
    self.record(u64::from(ns));
  }

  async fn delay_us(&mut self, us: u32) {
    self.record(u64::from(us) * 1_000);
  }

  async fn delay_ms(&mut self, ms: u32) {
    self.record(u64::from(ms) * 1_000_000);
  }
}

/// Shared monotonic clock in nanoseconds.
#[derive(Debug, Clone, Default)]
pub(crate) struct FakeClock(Rc<Cell<u64>>);

impl FakeClock {
  pub(crate) fn at(ns: u64) -> Self {
    Self(Rc::new(Cell::new(ns)))
  }

  pub(crate) fn advance(&self, ns: u64) {
    self.0.set(self.0.get() + ns);
  }
}

impl crate::sampler::Clock for FakeClock {
  fn now_ns(&self) -> u64 {
    self.0.get()
  }
}
