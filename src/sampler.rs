//! Periodic sampling with back-fill.
//!
//! One [`SamplerControl`] per sensor kind owns the enable state and poll
//! period of that source. Each tick reads a live sample, brings it into the
//! device frame and hands it to a [`SampleSink`] with a timestamp from the
//! injected [`Clock`].
//!
//! When a tick arrives late (more than 1.8 periods after the previous one)
//! the gap is filled with copies of the new sample spaced one period apart,
//! stopping half a period short of the current time. Consumers that expect a
//! steady cadence then keep seeing one.
//!
//! ```no_run
//! # async fn example<I, D, E, S, C, K, W>(
//! #   device: &bmi160::SharedBmi160<embassy_sync::blocking_mutex::raw::NoopRawMutex, I, D>,
//! #   storage: &mut S, clock: &C, sink: &mut K, delay: &mut W,
//! # ) -> Result<(), bmi160::Error<E>>
//! # where I: embedded_hal_async::i2c::I2c<Error = E>, D: embedded_hal_async::delay::DelayNs,
//! #   S: bmi160::CalibrationStorage, C: bmi160::Clock, K: bmi160::SampleSink, W: embedded_hal_async::delay::DelayNs {
//! use bmi160::{SampleKind, SamplerControl};
//! use embassy_sync::blocking_mutex::raw::NoopRawMutex;
//!
//! let accel = SamplerControl::<NoopRawMutex>::new(SampleKind::Accel);
//! accel.set_delay::<E>(20).await?;
//! accel.enable(device, storage).await?;
//! accel.run(device, clock, delay, sink).await?;
//! # Ok(())
//! # }
//! ```

use embassy_sync::{blocking_mutex::raw::RawMutex, mutex::Mutex};
use embedded_hal_async::{delay::DelayNs, i2c::*};

use crate::{accel::AccelRange, AxisSample, Bmi160, CalibrationStorage, Error, PowerMode, Sensor};

/// Shortest accepted poll period.
pub const MIN_DELAY_MS: u32 = 5;
/// Longest accepted poll period, also the default.
pub const MAX_DELAY_MS: u32 = 200;
pub const DEFAULT_DELAY_MS: u32 = MAX_DELAY_MS;

// 1.8 periods, in ns per ms of period.
const BACKFILL_THRESHOLD_NS_PER_MS: u64 = 1_800_000;
// Ticks are counted at the configured period, not wall time.
const LOG_INTERVAL_MS: u64 = 15_000;

/// Device shared between the sampling tasks and everything else.
pub type SharedBmi160<M, I, D> = Mutex<M, Bmi160<I, D>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SampleKind {
  Accel,
  Gyro,
}

impl SampleKind {
  fn sensor(self) -> Sensor {
    match self {
      SampleKind::Accel => Sensor::Accel,
      SampleKind::Gyro => Sensor::Gyro,
    }
  }
}

/// Monotonic time source.
pub trait Clock {
  fn now_ns(&self) -> u64;
}

/// Receiver of timestamped samples, real or back-filled.
pub trait SampleSink {
  fn emit(&mut self, kind: SampleKind, sample: AxisSample, timestamp_ns: u64);
}

impl<F> SampleSink for F
where
  F: FnMut(SampleKind, AxisSample, u64),
{
  fn emit(&mut self, kind: SampleKind, sample: AxisSample, timestamp_ns: u64) {
    self(kind, sample, timestamp_ns)
  }
}

/// Timing state of one source.
#[derive(Debug, Clone)]
pub struct Sampler {
  kind: SampleKind,
  delay_ms: u32,
  last_ns: Option<u64>,
  log_ticks: u32,
}

impl Sampler {
  pub const fn new(kind: SampleKind) -> Self {
    Self { kind, delay_ms: DEFAULT_DELAY_MS, last_ns: None, log_ticks: 0 }
  }

  pub fn kind(&self) -> SampleKind {
    self.kind
  }

  pub fn delay_ms(&self) -> u32 {
    self.delay_ms
  }

  /// Set the poll period, clamped to [`MIN_DELAY_MS`]..=[`MAX_DELAY_MS`].
  /// Zero is rejected. Returns the period actually in effect.
  pub fn set_delay<E>(&mut self, delay_ms: u32) -> Result<u32, Error<E>> {
    if delay_ms == 0 {
      return Err(Error::InvalidArgument);
    }
    self.delay_ms = delay_ms.clamp(MIN_DELAY_MS, MAX_DELAY_MS);
    Ok(self.delay_ms)
  }

  /// Forget the previous timestamp so the next sample starts a new series.
  pub fn reset(&mut self) {
    self.last_ns = None;
    self.log_ticks = 0;
  }

  /// Timestamp of the last emitted sample.
  pub fn last_timestamp_ns(&self) -> Option<u64> {
    self.last_ns
  }

  /// Emit `sample` taken at `now_ns`, back-filling a late gap first.
  ///
  /// Timestamps never go backwards: a clock behind the last emitted sample is
  /// clamped to it. Every 15 s worth of pushes at the current period the
  /// sample is logged. Returns the number of samples emitted.
  pub fn push<S: SampleSink>(&mut self, sample: AxisSample, now_ns: u64, sink: &mut S) -> usize {
    let now = match self.last_ns {
      Some(last) if now_ns < last => last,
      _ => now_ns,
    };

    let mut emitted = 0;
    if let Some(last) = self.last_ns {
      let period = u64::from(self.delay_ms) * 1_000_000;
      if now - last > u64::from(self.delay_ms) * BACKFILL_THRESHOLD_NS_PER_MS {
        let mut t = last + period;
        while t < now - period / 2 {
          sink.emit(self.kind, sample, t);
          emitted += 1;
          t += period;
        }
        trace!("{:?} back-filled {} samples", self.kind, emitted);
      }
    }

    sink.emit(self.kind, sample, now);
    self.last_ns = Some(now);

    self.log_ticks += 1;
    if u64::from(self.delay_ms) * u64::from(self.log_ticks) >= LOG_INTERVAL_MS {
      info!("{:?} {} {} {}", self.kind, sample.x, sample.y, sample.z);
      self.log_ticks = 0;
    }

    emitted + 1
  }

  /// Read one live sample from `device` and push it.
  ///
  /// Accelerometer samples are remapped and calibrated, gyroscope samples
  /// only remapped.
  pub async fn tick<I, D, E, C, S>(&mut self, device: &mut Bmi160<I, D>, clock: &C, sink: &mut S) -> Result<usize, Error<E>>
  where
    I: I2c<SevenBitAddress, Error = E>,
    D: DelayNs,
    C: Clock,
    S: SampleSink,
  {
    let sample = match self.kind {
      SampleKind::Accel => device.get_corrected_accel().await?,
      SampleKind::Gyro => device.get_remapped_gyro().await?,
    };
    Ok(self.push(sample, clock.now_ns(), sink))
  }
}

#[derive(Debug)]
struct SourceState {
  enabled: bool,
  sampler: Sampler,
}

/// Lifecycle of one sampling source behind its own lock.
///
/// Enable, disable and period changes for a source are serialized here; the
/// device lock is only taken for the register traffic they cause.
pub struct SamplerControl<M: RawMutex> {
  kind: SampleKind,
  state: Mutex<M, SourceState>,
}

impl<M: RawMutex> SamplerControl<M> {
  pub const fn new(kind: SampleKind) -> Self {
    Self { kind, state: Mutex::new(SourceState { enabled: false, sampler: Sampler::new(kind) }) }
  }

  pub fn kind(&self) -> SampleKind {
    self.kind
  }

  pub async fn is_enabled(&self) -> bool {
    self.state.lock().await.enabled
  }

  pub async fn delay_ms(&self) -> u32 {
    self.state.lock().await.sampler.delay_ms()
  }

  /// See [`Sampler::set_delay`].
  pub async fn set_delay<E>(&self, delay_ms: u32) -> Result<u32, Error<E>> {
    self.state.lock().await.sampler.set_delay(delay_ms)
  }

  /// Power the sensor up and start accepting ticks.
  ///
  /// For the accelerometer this first loads the persisted calibration when
  /// none is in memory (a missing record is not an error), then selects
  /// normal mode and the ±4 g range. `storage` is not used for the gyroscope.
  pub async fn enable<DM, I, D, E, S>(&self, device: &SharedBmi160<DM, I, D>, storage: &mut S) -> Result<(), Error<E>>
  where
    DM: RawMutex,
    I: I2c<SevenBitAddress, Error = E>,
    D: DelayNs,
    S: CalibrationStorage,
  {
    let mut st = self.state.lock().await;
    if st.enabled {
      return Ok(());
    }

    let mut dev = device.lock().await;
    match self.kind {
      SampleKind::Accel => {
        if dev.calibration().is_zero() {
          match dev.load_calibration(storage).await {
            Ok(_) | Err(Error::NotFound) => {}
            Err(e) => return Err(e),
          }
        }
        dev.set_power_mode(Sensor::Accel, PowerMode::Normal).await?;
        dev.set_accel_range(AccelRange::G4).await?;
      }
      SampleKind::Gyro => dev.set_power_mode(Sensor::Gyro, PowerMode::Normal).await?,
    }

    st.sampler.reset();
    st.enabled = true;
    info!("{:?} sampling enabled, {} ms", self.kind, st.sampler.delay_ms());
    Ok(())
  }

  /// Suspend the sensor and stop accepting ticks.
  ///
  /// Accelerometer suspend is subject to the motion feature rule in
  /// [`Bmi160::set_power_mode`]. If the suspend fails the source stays
  /// enabled.
  pub async fn disable<DM, I, D, E>(&self, device: &SharedBmi160<DM, I, D>) -> Result<(), Error<E>>
  where
    DM: RawMutex,
    I: I2c<SevenBitAddress, Error = E>,
    D: DelayNs,
  {
    let mut st = self.state.lock().await;
    if !st.enabled {
      return Ok(());
    }

    device.lock().await.set_power_mode(self.kind.sensor(), PowerMode::Suspend).await?;
    st.enabled = false;
    st.sampler.reset();
    info!("{:?} sampling disabled", self.kind);
    Ok(())
  }

  /// Run a single tick if the source is enabled. Returns samples emitted.
  pub async fn poll_once<DM, I, D, E, C, S>(
    &self,
    device: &SharedBmi160<DM, I, D>,
    clock: &C,
    sink: &mut S,
  ) -> Result<usize, Error<E>>
  where
    DM: RawMutex,
    I: I2c<SevenBitAddress, Error = E>,
    D: DelayNs,
    C: Clock,
    S: SampleSink,
  {
    let mut st = self.state.lock().await;
    if !st.enabled {
      return Ok(0);
    }
    let mut dev = device.lock().await;
    st.sampler.tick(&mut *dev, clock, sink).await
  }

  /// Tick every period until the source is disabled.
  ///
  /// No lock is held while waiting, so `disable` and `set_delay` from other
  /// tasks take effect at the next tick.
  ///
  /// A failed tick disables the source, makes one attempt to suspend the
  /// sensor and returns the tick's error.
  pub async fn run<DM, I, D, E, C, W, S>(
    &self,
    device: &SharedBmi160<DM, I, D>,
    clock: &C,
    delay: &mut W,
    sink: &mut S,
  ) -> Result<(), Error<E>>
  where
    DM: RawMutex,
    I: I2c<SevenBitAddress, Error = E>,
    D: DelayNs,
    C: Clock,
    W: DelayNs,
    S: SampleSink,
  {
    while self.is_enabled().await {
      if let Err(e) = self.poll_once(device, clock, sink).await {
        warn!("{:?} sampling stopped on bus error", self.kind);
        let mut st = self.state.lock().await;
        st.enabled = false;
        st.sampler.reset();
        let _ = device.lock().await.set_power_mode(self.kind.sensor(), PowerMode::Suspend).await;
        return Err(e);
      }
      let ms = self.delay_ms().await;
      delay.delay_ms(ms).await;
    }
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use embassy_sync::blocking_mutex::raw::NoopRawMutex;
  use futures::executor::block_on;

  use super::*;
  use crate::{
    calib::CalibrationOffset,
    defs::Reg,
    remap::AxisRemap,
    testing::{FakeBus, FakeClock, FakeDelay},
  };

  const MS: u64 = 1_000_000;

  type Shared = SharedBmi160<NoopRawMutex, FakeBus, FakeDelay>;

  #[derive(Default)]
  struct Recorder(Vec<(SampleKind, AxisSample, u64)>);

  impl SampleSink for Recorder {
    fn emit(&mut self, kind: SampleKind, sample: AxisSample, timestamp_ns: u64) {
      self.0.push((kind, sample, timestamp_ns));
    }
  }

  impl Recorder {
    fn times(&self) -> Vec<u64> {
      self.0.iter().map(|(_, _, t)| *t).collect()
    }
  }

  struct Storage(Option<[u8; 6]>);

  impl CalibrationStorage for Storage {
    type Error = ();

    async fn load(&mut self) -> Result<Option<[u8; 6]>, ()> {
      Ok(self.0)
    }

    async fn save(&mut self, record: &[u8; 6]) -> Result<(), ()> {
      self.0 = Some(*record);
      Ok(())
    }
  }

  fn shared(bus: FakeBus) -> Shared {
    Mutex::new(Bmi160::new(bus, FakeDelay::default()))
  }

  #[test]
  fn delay_is_clamped() {
    let mut s = Sampler::new(SampleKind::Accel);
    assert_eq!(s.delay_ms(), DEFAULT_DELAY_MS);
    assert!(matches!(s.set_delay::<()>(0), Err(Error::InvalidArgument)));
    assert_eq!(s.set_delay::<()>(1).unwrap(), MIN_DELAY_MS);
    assert_eq!(s.set_delay::<()>(1000).unwrap(), MAX_DELAY_MS);
    assert_eq!(s.set_delay::<()>(20).unwrap(), 20);
  }

  #[test]
  fn late_tick_is_back_filled() {
    let mut s = Sampler::new(SampleKind::Accel);
    s.set_delay::<()>(20).unwrap();
    let mut rec = Recorder::default();
    let t0 = 1_000 * MS;
    let old = AxisSample::new(1, 1, 1);
    let new = AxisSample::new(7, 8, 9);

    s.push(old, t0, &mut rec);
    let n = s.push(new, t0 + 100 * MS, &mut rec);

    assert_eq!(n, 5);
    assert_eq!(rec.times(), [t0, t0 + 20 * MS, t0 + 40 * MS, t0 + 60 * MS, t0 + 80 * MS, t0 + 100 * MS]);
    assert!(rec.0[1..].iter().all(|(_, s, _)| *s == new));
  }

  #[test]
  fn gap_under_threshold_is_not_filled() {
    let mut s = Sampler::new(SampleKind::Gyro);
    s.set_delay::<()>(20).unwrap();
    let mut rec = Recorder::default();
    s.push(AxisSample::default(), 0, &mut rec);
    assert_eq!(s.push(AxisSample::default(), 36 * MS, &mut rec), 1);
    // Just past 1.8 periods: one fill sample at +20, since 40 is inside the half-period margin.
    assert_eq!(s.push(AxisSample::default(), 36 * MS + 37 * MS, &mut rec), 2);
    assert_eq!(rec.times(), [0, 36 * MS, 56 * MS, 73 * MS]);
  }

  #[test]
  fn first_sample_is_never_filled() {
    let mut s = Sampler::new(SampleKind::Accel);
    let mut rec = Recorder::default();
    assert_eq!(s.push(AxisSample::default(), 10_000 * MS, &mut rec), 1);
  }

  #[test]
  fn timestamps_never_go_backwards() {
    let mut s = Sampler::new(SampleKind::Accel);
    let mut rec = Recorder::default();
    s.push(AxisSample::default(), 500 * MS, &mut rec);
    s.push(AxisSample::default(), 400 * MS, &mut rec);
    assert_eq!(rec.times(), [500 * MS, 500 * MS]);
  }

  #[test]
  fn periodic_log_counts_ticks() {
    let mut s = Sampler::new(SampleKind::Accel);
    s.set_delay::<()>(200).unwrap();
    let mut rec = Recorder::default();
    for i in 0..74 {
      s.push(AxisSample::default(), i * 200 * MS, &mut rec);
    }
    assert_eq!(s.log_ticks, 74);
    s.push(AxisSample::default(), 74 * 200 * MS, &mut rec);
    assert_eq!(s.log_ticks, 0);

    // A long stall is still one tick.
    s.push(AxisSample::default(), 3_600_000 * MS, &mut rec);
    assert_eq!(s.log_ticks, 1);
  }

  #[test]
  fn closures_are_sinks() {
    let mut s = Sampler::new(SampleKind::Gyro);
    let mut seen = 0;
    s.push(AxisSample::default(), 0, &mut |_: SampleKind, _: AxisSample, _: u64| seen += 1);
    assert_eq!(seen, 1);
  }

  #[test]
  fn accel_enable_loads_calibration_and_powers_up() {
    let device = shared(FakeBus::default());
    let control = SamplerControl::<NoopRawMutex>::new(SampleKind::Accel);
    let stored = CalibrationOffset::new(4, -4, 100);
    let mut storage = Storage(Some(stored.to_bytes()));

    block_on(control.enable(&device, &mut storage)).unwrap();

    assert!(block_on(control.is_enabled()));
    let dev = block_on(device.lock());
    assert_eq!(dev.calibration(), stored);
    assert_eq!(dev.power_state().accel, PowerMode::Normal);
    assert_eq!(dev.i2c.commands(), [0x11]);
    assert_eq!(dev.i2c.reg(Reg::AccRange), 0x05);
  }

  #[test]
  fn accel_enable_keeps_in_memory_calibration() {
    let device = shared(FakeBus::default());
    let kept = CalibrationOffset::new(1, 2, 3);
    block_on(device.lock()).calibration = kept;
    let control = SamplerControl::<NoopRawMutex>::new(SampleKind::Accel);
    let mut storage = Storage(Some(CalibrationOffset::new(9, 9, 9).to_bytes()));

    block_on(control.enable(&device, &mut storage)).unwrap();
    assert_eq!(block_on(device.lock()).calibration(), kept);
  }

  #[test]
  fn accel_enable_without_record_still_succeeds() {
    let device = shared(FakeBus::default());
    let control = SamplerControl::<NoopRawMutex>::new(SampleKind::Accel);
    block_on(control.enable(&device, &mut Storage(None))).unwrap();
    assert!(block_on(device.lock()).calibration().is_zero());
  }

  #[test]
  fn gyro_enable_disable() {
    let device = shared(FakeBus::default());
    let control = SamplerControl::<NoopRawMutex>::new(SampleKind::Gyro);
    block_on(control.enable(&device, &mut Storage(None))).unwrap();
    block_on(control.enable(&device, &mut Storage(None))).unwrap();
    block_on(control.disable(&device)).unwrap();
    block_on(control.disable(&device)).unwrap();
    assert_eq!(block_on(device.lock()).i2c.commands(), [0x15, 0x14]);
    assert!(!block_on(control.is_enabled()));
  }

  #[test]
  fn poll_reads_calibrated_remapped_accel() {
    let bus = FakeBus::default().with_bytes(Reg::AccDataX, &[10, 0, 20, 0, 30, 0]);
    let device: Shared = Mutex::new(Bmi160::new(bus, FakeDelay::default()).with_remap(AxisRemap::from_placement(1)));
    block_on(device.lock()).calibration = CalibrationOffset::new(1, 1, 1);
    let control = SamplerControl::<NoopRawMutex>::new(SampleKind::Accel);
    let clock = FakeClock::at(5 * MS);
    let mut rec = Recorder::default();

    assert_eq!(block_on(control.poll_once(&device, &clock, &mut rec)).unwrap(), 0);

    block_on(control.enable(&device, &mut Storage(None))).unwrap();
    assert_eq!(block_on(control.poll_once(&device, &clock, &mut rec)).unwrap(), 1);
    assert_eq!(rec.0, [(SampleKind::Accel, AxisSample::new(19, -11, 29), 5 * MS)]);
  }

  #[test]
  fn failed_suspend_keeps_source_enabled() {
    let device = shared(FakeBus::default());
    let control = SamplerControl::<NoopRawMutex>::new(SampleKind::Gyro);
    block_on(control.enable(&device, &mut Storage(None))).unwrap();
    block_on(device.lock()).i2c.fail_writes = true;

    assert!(matches!(block_on(control.disable(&device)), Err(Error::I2c(_))));
    assert!(block_on(control.is_enabled()));
    assert_eq!(block_on(device.lock()).power_state().gyro, PowerMode::Normal);

    block_on(device.lock()).i2c.fail_writes = false;
    block_on(control.disable(&device)).unwrap();
    assert!(!block_on(control.is_enabled()));
  }

  #[test]
  fn bus_error_stops_run_and_disables() {
    let device = shared(FakeBus::default());
    let control = SamplerControl::<NoopRawMutex>::new(SampleKind::Gyro);
    block_on(control.enable(&device, &mut Storage(None))).unwrap();
    block_on(device.lock()).i2c.fail_reads = true;
    let clock = FakeClock::at(0);
    let mut rec = Recorder::default();

    let res = block_on(control.run(&device, &clock, &mut FakeDelay::default(), &mut rec));

    assert!(matches!(res, Err(Error::I2c(_))));
    assert!(!block_on(control.is_enabled()));
    assert!(rec.0.is_empty());
    let dev = block_on(device.lock());
    assert_eq!(dev.i2c.commands(), [0x15, 0x14]);
    assert_eq!(dev.power_state().gyro, PowerMode::Suspend);
  }

  /// Delay that advances the clock and disables the source after `left` waits.
  struct StopAfter<'a> {
    left: usize,
    clock: FakeClock,
    control: &'a SamplerControl<NoopRawMutex>,
    device: &'a Shared,
  }

  impl DelayNs for StopAfter<'_> {
    async fn delay_ns(&mut self, ns: u32) {
      self.clock.advance(u64::from(ns));
      if self.left == 0 {
        self.control.disable(self.device).await.unwrap();
      } else {
        self.left -= 1;
      }
    }
  }

  #[test]
  fn run_ticks_until_disabled() {
    let device = shared(FakeBus::default().with_bytes(Reg::GyrDataX, &[1, 0, 2, 0, 3, 0]));
    let control = SamplerControl::<NoopRawMutex>::new(SampleKind::Gyro);
    block_on(control.set_delay::<embedded_hal_async::i2c::ErrorKind>(10)).unwrap();
    block_on(control.enable(&device, &mut Storage(None))).unwrap();
    let clock = FakeClock::at(0);
    let mut delay = StopAfter { left: 2, clock: clock.clone(), control: &control, device: &device };
    let mut rec = Recorder::default();

    block_on(control.run(&device, &clock, &mut delay, &mut rec)).unwrap();

    assert_eq!(rec.times(), [0, 10 * MS, 20 * MS]);
    assert_eq!(block_on(device.lock()).power_state().gyro, PowerMode::Suspend);
  }
}
