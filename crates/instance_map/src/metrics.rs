//! Frame counters and stage timings of the mapping server.
//!
//! Feature-gated and runtime-toggled; without the `metrics` feature every
//! `record_*` call is a no-op.
//!
//! # Usage
//!
//! ```ignore
//! use instance_map::metrics::COLLECT_METRICS;
//!
//! // Compile with --features metrics
//! // Runtime toggle:
//! COLLECT_METRICS.store(false, Ordering::Relaxed);
//!
//! let metrics = server.metrics();
//! println!("integrate avg {:.0}us", metrics.integrate_timings.average());
//! ```

use std::collections::{BTreeMap, VecDeque};
#[cfg(feature = "metrics")]
use std::sync::atomic::Ordering;
use std::sync::atomic::AtomicBool;

/// Runtime toggle for metrics collection.
pub static COLLECT_METRICS: AtomicBool = AtomicBool::new(true);

/// Check if metrics collection is enabled (both compile-time and runtime).
#[inline]
pub fn is_enabled() -> bool {
  #[cfg(feature = "metrics")]
  {
    COLLECT_METRICS.load(Ordering::Relaxed)
  }
  #[cfg(not(feature = "metrics"))]
  {
    false
  }
}

/// Most recent stage durations in microseconds.
#[derive(Debug, Clone)]
pub struct TimingWindow {
  samples: VecDeque<u64>,
  capacity: usize,
}

impl TimingWindow {
  pub fn new(capacity: usize) -> Self {
    Self {
      samples: VecDeque::with_capacity(capacity),
      capacity,
    }
  }

  /// Record a duration, dropping the oldest once full.
  pub fn push(&mut self, micros: u64) {
    if self.samples.len() == self.capacity {
      self.samples.pop_front();
    }
    self.samples.push_back(micros);
  }

  pub fn len(&self) -> usize {
    self.samples.len()
  }

  pub fn is_empty(&self) -> bool {
    self.samples.is_empty()
  }

  pub fn clear(&mut self) {
    self.samples.clear();
  }

  /// Mean duration, 0 when empty.
  pub fn average(&self) -> f64 {
    if self.samples.is_empty() {
      return 0.0;
    }
    self.samples.iter().sum::<u64>() as f64 / self.samples.len() as f64
  }
}

impl Default for TimingWindow {
  fn default() -> Self {
    Self::new(128)
  }
}

/// Pipeline stage with its own timing window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
  Render,
  Integrate,
  Extract,
}

/// Server-level statistics, updated once per frame.
#[derive(Debug, Clone, Default)]
pub struct MapMetrics {
  /// Frames that reached the end of integration.
  pub frames_processed: u64,
  /// Dropped frames keyed by `FrameError::code`.
  pub frames_dropped: BTreeMap<&'static str, u64>,
  /// Frames rendered remotely.
  pub remote_renders: u64,
  /// Remote render failures that fell back to local rendering.
  pub remote_fallbacks: u64,

  pub render_timings: TimingWindow,
  pub integrate_timings: TimingWindow,
  pub extract_timings: TimingWindow,

  /// Wall time of the last full frame in microseconds.
  pub last_frame_us: u64,
}

impl MapMetrics {
  pub fn new() -> Self {
    Self::default()
  }

  /// Clear timings and counters. Called on map reset.
  pub fn reset(&mut self) {
    self.render_timings.clear();
    self.integrate_timings.clear();
    self.extract_timings.clear();
    self.last_frame_us = 0;
    // frame counters are cumulative over the process lifetime
  }

  pub fn timings(&self, stage: Stage) -> &TimingWindow {
    match stage {
      Stage::Render => &self.render_timings,
      Stage::Integrate => &self.integrate_timings,
      Stage::Extract => &self.extract_timings,
    }
  }

  pub fn record_stage(&mut self, stage: Stage, timing_us: u64) {
    if !is_enabled() {
      return;
    }
    let window = match stage {
      Stage::Render => &mut self.render_timings,
      Stage::Integrate => &mut self.integrate_timings,
      Stage::Extract => &mut self.extract_timings,
    };
    window.push(timing_us);
  }

  pub fn record_frame(&mut self, timing_us: u64) {
    if is_enabled() {
      self.frames_processed += 1;
      self.last_frame_us = timing_us;
    }
  }

  pub fn record_drop(&mut self, code: &'static str) {
    if is_enabled() {
      *self.frames_dropped.entry(code).or_default() += 1;
    }
  }

  pub fn record_remote_render(&mut self, fell_back: bool) {
    if !is_enabled() {
      return;
    }
    self.remote_renders += 1;
    if fell_back {
      self.remote_fallbacks += 1;
    }
  }

  pub fn total_dropped(&self) -> u64 {
    self.frames_dropped.values().sum()
  }
}
