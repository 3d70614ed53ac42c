//! Axis remapping for the physical mounting orientation.
//!
//! A board places the chip in one of eight orientations (P0..P7, Bosch
//! convention). Each placement maps to a fixed permutation and sign per axis
//! that brings sensor axes into the device frame.
//!
//! ```
//! use bmi160::{AxisRemap, AxisSample};
//!
//! let remap = AxisRemap::from_placement(1);
//! let s = AxisSample::new(1, 2, 3);
//! assert_eq!(remap.apply(s), AxisSample::new(2, -1, 3));
//! assert_eq!(remap.inverse().apply(remap.apply(s)), s);
//! ```

use crate::AxisSample;

/// Source axis and sign for each output axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct AxisRemap {
  /// Input axis feeding output x, y, z (a permutation of 0, 1, 2).
  pub source: [u8; 3],
  /// +1 or -1 per output axis.
  pub sign: [i8; 3],
}

impl Default for AxisRemap {
  fn default() -> Self {
    Self::IDENTITY
  }
}

/// Bosch default placement table.
const PLACEMENTS: [AxisRemap; 8] = [
  AxisRemap::new([0, 1, 2], [1, 1, 1]),
  AxisRemap::new([1, 0, 2], [1, -1, 1]),
  AxisRemap::new([0, 1, 2], [-1, -1, 1]),
  AxisRemap::new([1, 0, 2], [-1, 1, 1]),
  AxisRemap::new([0, 1, 2], [-1, 1, -1]),
  AxisRemap::new([1, 0, 2], [-1, -1, -1]),
  AxisRemap::new([0, 1, 2], [1, -1, -1]),
  AxisRemap::new([1, 0, 2], [1, 1, -1]),
];

impl AxisRemap {
  pub const IDENTITY: AxisRemap = AxisRemap::new([0, 1, 2], [1, 1, 1]);

  pub const fn new(source: [u8; 3], sign: [i8; 3]) -> Self {
    Self { source, sign }
  }

  /// Table entry for a board placement. Placement 0 and anything outside the
  /// table mean "no remap".
  pub const fn from_placement(place: u8) -> Self {
    if place == 0 || place as usize >= PLACEMENTS.len() {
      return Self::IDENTITY;
    }
    PLACEMENTS[place as usize]
  }

  pub fn is_identity(&self) -> bool {
    *self == Self::IDENTITY
  }

  /// `out[i] = in[source[i]] * sign[i]`.
  ///
  /// Negation wraps, so `i16::MIN` stays `i16::MIN` instead of overflowing.
  pub fn apply(&self, sample: AxisSample) -> AxisSample {
    if self.is_identity() {
      return sample;
    }
    let v = sample.to_array();
    let mut out = [0i16; 3];
    for (i, o) in out.iter_mut().enumerate() {
      let s = v[(self.source[i] % 3) as usize];
      *o = if self.sign[i] < 0 { s.wrapping_neg() } else { s };
    }
    AxisSample::from_array(out)
  }

  /// Table undoing this one: `inverse().apply(apply(s)) == s`.
  pub fn inverse(&self) -> Self {
    let mut source = [0u8; 3];
    let mut sign = [1i8; 3];
    for i in 0..3 {
      let src = (self.source[i] % 3) as usize;
      source[src] = i as u8;
      sign[src] = self.sign[i];
    }
    Self { source, sign }
  }
}

/// Free-function form of [`AxisRemap::apply`].
pub fn remap(sample: AxisSample, table: &AxisRemap) -> AxisSample {
  table.apply(sample)
}
