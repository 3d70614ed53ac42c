//! FIFO frame decoder.
//!
//! Turns a burst read from `FIFO_DATA` into typed frames. Decoding is lazy,
//! never allocates and can be restarted by cloning the iterator.
//!
//! In header mode every frame starts with a tag byte:
//!
//! | Tag          | Frame                         | Payload           |
//! |--------------|-------------------------------|-------------------|
//! | `0b100s_ss00`| data, `sss` = mag/gyro/accel  | per enabled sensor|
//! | `0x80`       | over-read (FIFO empty)        | none              |
//! | `0x40`       | skip, dropped frame count     | 1 byte            |
//! | `0x44`       | sensor time, last in a burst  | 3 bytes           |
//! | `0x48`       | input config changed          | 1 byte            |
//!
//! Sensor payloads of a data frame are laid out accel, gyro, mag and frames
//! are yielded in that order.
//!
//! ```
//! use bmi160::{decode, AxisSample, FifoFrame, FifoSelector};
//!
//! let buf = [0x84, 0x10, 0x00, 0x20, 0x00, 0x30, 0x00];
//! let mut frames = decode(&buf, FifoSelector::ACCEL, true);
//! assert_eq!(frames.next(), Some(Ok(FifoFrame::Accel(AxisSample::new(16, 32, 48)))));
//! assert_eq!(frames.next(), None);
//! ```

use crate::{fifo::FifoSelector, AxisSample, MagSample, SensorTime};

const TAG_MODE_MASK: u8 = 0xC0;
const TAG_REGULAR: u8 = 0x80;
const TAG_CONTROL: u8 = 0x40;
const TAG_EXT_MASK: u8 = 0x03;

const TAG_OVERREAD: u8 = 0x80;
const TAG_SKIP: u8 = 0x40;
const TAG_SENSOR_TIME: u8 = 0x44;
const TAG_INPUT_CONFIG: u8 = 0x48;

/// One decoded FIFO frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum FifoFrame {
  Accel(AxisSample),
  Gyro(AxisSample),
  Mag(MagSample),
  /// Sensor time at the moment the FIFO was read. Always last.
  SensorTime(SensorTime),
  /// Read went past the FIFO fill level or a frame was cut short.
  Overread,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum DecodeError {
  /// Header byte matching no known frame class (or a data frame naming a
  /// sensor outside the selector).
  UnexpectedTag(u8),
}

/// Decode `buf` as FIFO content for `selector`.
///
/// A non-empty buffer shorter than one frame (tag plus payload in header
/// mode, payload alone otherwise) yields a single [`FifoFrame::Overread`].
pub fn decode(buf: &[u8], selector: FifoSelector, header_enabled: bool) -> FifoFrames<'_> {
  FifoFrames { buf, pos: 0, selector, header: header_enabled, pending: Pending::default(), skipped: 0, done: false }
}

/// Iterator returned by [`decode`].
#[derive(Debug, Clone)]
pub struct FifoFrames<'a> {
  buf: &'a [u8],
  pos: usize,
  selector: FifoSelector,
  header: bool,
  pending: Pending,
  skipped: u32,
  done: bool,
}

/// Frames split out of one multi-sensor data frame, waiting to be yielded.
#[derive(Debug, Clone, Copy, Default)]
struct Pending {
  frames: [Option<FifoFrame>; 3],
  next: usize,
}

impl Pending {
  fn pop(&mut self) -> Option<FifoFrame> {
    while self.next < self.frames.len() {
      let f = self.frames[self.next].take();
      self.next += 1;
      if f.is_some() {
        return f;
      }
    }
    None
  }
}

impl<'a> FifoFrames<'a> {
  /// Skip frames consumed so far.
  pub fn skipped(&self) -> u32 {
    self.skipped
  }

  /// Bytes consumed so far.
  pub fn position(&self) -> usize {
    self.pos
  }

  fn remaining(&self) -> &'a [u8] {
    &self.buf[self.pos..]
  }

  fn overread(&mut self) -> Option<Result<FifoFrame, DecodeError>> {
    self.done = true;
    Some(Ok(FifoFrame::Overread))
  }

  fn fail(&mut self, tag: u8) -> Option<Result<FifoFrame, DecodeError>> {
    self.done = true;
    Some(Err(DecodeError::UnexpectedTag(tag)))
  }

  /// Split a payload into per-sensor frames and queue them.
  fn queue_payload(&mut self, sensors: FifoSelector, payload: &[u8]) {
    let mut frames = [None; 3];
    let mut at = 0;
    if sensors.contains(FifoSelector::ACCEL) {
      frames[0] = Some(FifoFrame::Accel(axis(&payload[at..at + 6])));
      at += 6;
    }
    if sensors.contains(FifoSelector::GYRO) {
      frames[1] = Some(FifoFrame::Gyro(axis(&payload[at..at + 6])));
      at += 6;
    }
    if sensors.contains(FifoSelector::MAG) {
      let mut b = [0u8; 8];
      b.copy_from_slice(&payload[at..at + 8]);
      frames[2] = Some(FifoFrame::Mag(MagSample::from_le_bytes(&b)));
    }
    self.pending = Pending { frames, next: 0 };
  }

  fn next_headerless(&mut self) -> Option<Result<FifoFrame, DecodeError>> {
    let len = self.selector.payload_len();
    if self.remaining().len() < len {
      return self.overread();
    }
    let payload = &self.remaining()[..len];
    self.pos += len;
    self.queue_payload(self.selector, payload);
    self.pending.pop().map(Ok)
  }

  fn next_tagged(&mut self) -> Option<Result<FifoFrame, DecodeError>> {
    loop {
      let rest = self.remaining();
      let tag = *rest.first()?;

      match tag & TAG_MODE_MASK {
        TAG_REGULAR if tag == TAG_OVERREAD => return self.overread(),
        TAG_REGULAR => {
          if tag & TAG_EXT_MASK != 0 {
            return self.fail(tag);
          }
          let sensors = FifoSelector::from_bits((tag >> 2) & 0x07);
          if !self.selector.contains(sensors) {
            return self.fail(tag);
          }
          let len = sensors.payload_len();
          if rest.len() < 1 + len {
            return self.overread();
          }
          self.pos += 1 + len;
          self.queue_payload(sensors, &rest[1..1 + len]);
          return self.pending.pop().map(Ok);
        }
        TAG_CONTROL => match tag {
          TAG_SKIP | TAG_INPUT_CONFIG => {
            if rest.len() < 2 {
              return self.overread();
            }
            if tag == TAG_SKIP {
              self.skipped += 1;
            }
            self.pos += 2;
          }
          TAG_SENSOR_TIME => {
            if rest.len() < 4 {
              return self.overread();
            }
            self.done = true;
            let t = SensorTime::from_le_bytes([rest[1], rest[2], rest[3]]);
            self.pos += 4;
            return Some(Ok(FifoFrame::SensorTime(t)));
          }
          _ => return self.fail(tag),
        },
        _ => return self.fail(tag),
      }
    }
  }
}

impl<'a> Iterator for FifoFrames<'a> {
  type Item = Result<FifoFrame, DecodeError>;

  fn next(&mut self) -> Option<Self::Item> {
    if let Some(f) = self.pending.pop() {
      return Some(Ok(f));
    }
    if self.done {
      return None;
    }

    let width = self.selector.frame_width();
    if width == 0 || self.pos >= self.buf.len() {
      self.done = true;
      return None;
    }
    let min = if self.header { width } else { self.selector.payload_len() };
    if self.pos == 0 && self.buf.len() < min {
      return self.overread();
    }

    if self.header {
      self.next_tagged()
    } else {
      self.next_headerless()
    }
  }
}

fn axis(b: &[u8]) -> AxisSample {
  AxisSample::new(
    i16::from_le_bytes([b[0], b[1]]),
    i16::from_le_bytes([b[2], b[3]]),
    i16::from_le_bytes([b[4], b[5]]),
  )
}
