//! Core data types shared by the occupancy index and the frame pipeline.

use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;

use glam::{DAffine3, DVec3};
use serde::{Deserialize, Serialize};
use web_time::SystemTime;

/// Identifier of a tracked object instance.
///
/// Non-negative values are object instances. Two negative values are reserved:
/// [`BACKGROUND`] and [`UNCERTAIN`].
pub type InstanceId = i32;

/// Instance ID of the background / free-space index.
pub const BACKGROUND: InstanceId = -1;

/// Instance ID of uncertain pixels (e.g. object boundaries). Never indexed.
pub const UNCERTAIN: InstanceId = -2;

/// Object class identifier assigned by the external detector.
pub type ClassId = u32;

/// Mapping from instance ID to class ID for one frame.
pub type ClassMap = BTreeMap<InstanceId, ClassId>;

/// Returns true for IDs of tracked objects (not background, not uncertain).
#[inline]
pub fn is_foreground(instance_id: InstanceId) -> bool {
  instance_id >= 0
}

// =============================================================================
// Timestamp
// =============================================================================

/// Frame timestamp in nanoseconds since the Unix epoch.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Timestamp(pub u64);

impl Timestamp {
  /// Current wall-clock time.
  pub fn now() -> Self {
    let since_epoch = SystemTime::now()
      .duration_since(SystemTime::UNIX_EPOCH)
      .unwrap_or_default();
    Self::from_duration(since_epoch)
  }

  pub fn from_nanos(nanos: u64) -> Self {
    Self(nanos)
  }

  pub fn from_duration(duration: Duration) -> Self {
    Self(duration.as_nanos().min(u64::MAX as u128) as u64)
  }

  pub fn from_secs_f64(secs: f64) -> Self {
    Self((secs.max(0.0) * 1e9) as u64)
  }

  pub fn as_secs_f64(&self) -> f64 {
    self.0 as f64 * 1e-9
  }
}

// =============================================================================
// Aabb3
// =============================================================================

/// Double-precision axis-aligned bounding box.
///
/// Used for per-instance bounding regions in world coordinates. A box built
/// from a single point is degenerate (`min == max`) and still valid.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Aabb3 {
  /// Minimum corner (inclusive).
  pub min: DVec3,
  /// Maximum corner (inclusive).
  pub max: DVec3,
}

impl Aabb3 {
  /// Create a new AABB from min and max corners.
  ///
  /// # Panics
  /// Debug-asserts that min <= max on all axes.
  pub fn new(min: DVec3, max: DVec3) -> Self {
    debug_assert!(
      min.x <= max.x && min.y <= max.y && min.z <= max.z,
      "AABB min must be <= max on all axes"
    );
    Self { min, max }
  }

  /// Degenerate box containing exactly one point.
  pub fn from_point(point: DVec3) -> Self {
    Self {
      min: point,
      max: point,
    }
  }

  /// Create AABB with inverted extents (ready for encapsulation).
  pub fn empty() -> Self {
    Self {
      min: DVec3::splat(f64::INFINITY),
      max: DVec3::splat(f64::NEG_INFINITY),
    }
  }

  /// Tight box around `points`, or `None` when there are no points.
  pub fn from_points<'a>(points: impl IntoIterator<Item = &'a DVec3>) -> Option<Self> {
    let mut aabb = Self::empty();
    for point in points {
      aabb.encapsulate(*point);
    }
    aabb.is_valid().then_some(aabb)
  }

  /// Expand AABB to include a point.
  #[inline]
  pub fn encapsulate(&mut self, point: DVec3) {
    self.min = self.min.min(point);
    self.max = self.max.max(point);
  }

  /// Smallest box containing both `self` and `other`.
  #[inline]
  pub fn union(&self, other: &Aabb3) -> Aabb3 {
    Aabb3 {
      min: self.min.min(other.min),
      max: self.max.max(other.max),
    }
  }

  /// Check if this AABB contains a point (boundary inclusive).
  #[inline]
  pub fn contains_point(&self, point: DVec3) -> bool {
    point.cmpge(self.min).all() && point.cmple(self.max).all()
  }

  /// True when `other` lies entirely inside `self`.
  #[inline]
  pub fn contains(&self, other: &Aabb3) -> bool {
    other.min.cmpge(self.min).all() && other.max.cmple(self.max).all()
  }

  /// Check if AABB is valid (min <= max on all axes).
  pub fn is_valid(&self) -> bool {
    self.min.cmple(self.max).all()
  }

  /// Get the size of the AABB (max - min).
  #[inline]
  pub fn size(&self) -> DVec3 {
    self.max - self.min
  }

  /// Get the center of the AABB.
  #[inline]
  pub fn center(&self) -> DVec3 {
    (self.min + self.max) * 0.5
  }
}

impl Default for Aabb3 {
  fn default() -> Self {
    Self::empty()
  }
}

// =============================================================================
// Camera
// =============================================================================

/// Pinhole camera intrinsics (K matrix entries).
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct CameraIntrinsics {
  pub fx: f64,
  pub fy: f64,
  pub cx: f64,
  pub cy: f64,
}

impl CameraIntrinsics {
  pub fn new(fx: f64, fy: f64, cx: f64, cy: f64) -> Self {
    Self { fx, fy, cx, cy }
  }

  /// Back-project pixel (`col`, `row`) to a sensor-frame point at `depth`.
  #[inline]
  pub fn back_project(&self, col: usize, row: usize, depth: f64) -> DVec3 {
    DVec3::new(
      depth * (col as f64 - self.cx) / self.fx,
      depth * (row as f64 - self.cy) / self.fy,
      depth,
    )
  }
}

// =============================================================================
// Images
// =============================================================================

/// Organised point cloud: one 3D point per pixel, NaN coordinates mark
/// missing depth.
#[derive(Clone, Debug, PartialEq)]
pub struct PointImage {
  pub width: usize,
  pub height: usize,
  /// Row-major points (`row * width + col`).
  pub points: Vec<DVec3>,
}

impl PointImage {
  pub fn new(width: usize, height: usize, points: Vec<DVec3>) -> Self {
    debug_assert_eq!(points.len(), width * height, "point count must match image size");
    Self {
      width,
      height,
      points,
    }
  }

  /// Image of the given size with every point missing.
  pub fn missing(width: usize, height: usize) -> Self {
    Self::new(width, height, vec![DVec3::NAN; width * height])
  }

  #[inline]
  pub fn get(&self, row: usize, col: usize) -> DVec3 {
    self.points[row * self.width + col]
  }

  #[inline]
  pub fn set(&mut self, row: usize, col: usize, point: DVec3) {
    self.points[row * self.width + col] = point;
  }

  /// Buffer length matches `width * height`.
  pub fn is_complete(&self) -> bool {
    self.points.len() == self.width * self.height
  }

  /// Returns true when `point` carries a depth measurement.
  #[inline]
  pub fn is_valid(point: DVec3) -> bool {
    point.is_finite()
  }

  /// Apply a rigid transform to every valid point. Missing points stay NaN.
  pub fn transformed(&self, transform: &DAffine3) -> PointImage {
    let points = self
      .points
      .iter()
      .map(|&p| {
        if Self::is_valid(p) {
          transform.transform_point3(p)
        } else {
          p
        }
      })
      .collect();
    PointImage::new(self.width, self.height, points)
  }
}

/// Per-pixel instance labels.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LabelImage {
  pub width: usize,
  pub height: usize,
  /// Row-major labels (`row * width + col`).
  pub labels: Vec<InstanceId>,
}

impl LabelImage {
  pub fn new(width: usize, height: usize, labels: Vec<InstanceId>) -> Self {
    debug_assert_eq!(labels.len(), width * height, "label count must match image size");
    Self {
      width,
      height,
      labels,
    }
  }

  /// Image of the given size with every pixel set to `value`.
  pub fn filled(width: usize, height: usize, value: InstanceId) -> Self {
    Self::new(width, height, vec![value; width * height])
  }

  #[inline]
  pub fn get(&self, row: usize, col: usize) -> InstanceId {
    self.labels[row * self.width + col]
  }

  #[inline]
  pub fn set(&mut self, row: usize, col: usize, value: InstanceId) {
    self.labels[row * self.width + col] = value;
  }

  /// Distinct labels present in the image, ascending.
  pub fn unique(&self) -> BTreeSet<InstanceId> {
    self.labels.iter().copied().collect()
  }

  /// Buffer length matches `width * height`.
  pub fn is_complete(&self) -> bool {
    self.labels.len() == self.width * self.height
  }

  /// Same dimensions as `points`, with both buffers fully populated.
  pub fn same_shape(&self, points: &PointImage) -> bool {
    self.width == points.width && self.height == points.height && self.is_complete() && points.is_complete()
  }
}

#[cfg(test)]
#[path = "types_test.rs"]
mod types_test;
