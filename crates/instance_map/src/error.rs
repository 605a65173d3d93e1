//! Error types. Every kind is frame- or request-scoped: none of them leaves
//! the registry in a partially updated state.

use thiserror::Error;

use crate::types::{InstanceId, LabelImage, PointImage, Timestamp};

/// Why a frame was not applied.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum FrameError {
  #[error("frame stamped {stamp:?} predates the last reset at {reset:?}")]
  StaleFrame { stamp: Timestamp, reset: Timestamp },

  #[error("no transform from '{source_frame}' to '{target_frame}' at {stamp:?}")]
  MissingTransform {
    target_frame: String,
    source_frame: String,
    stamp: Timestamp,
  },

  #[error("instance {instance_id} is labelled but has no class entry")]
  UnknownInstanceClass { instance_id: InstanceId },

  #[error(
    "label image is {labels_width}x{labels_height} ({labels_len} labels) but point image is \
     {points_width}x{points_height} ({points_len} points)"
  )]
  ShapeMismatch {
    labels_width: usize,
    labels_height: usize,
    labels_len: usize,
    points_width: usize,
    points_height: usize,
    points_len: usize,
  },
}

impl FrameError {
  pub fn shape_mismatch(labels: &LabelImage, points: &PointImage) -> Self {
    FrameError::ShapeMismatch {
      labels_width: labels.width,
      labels_height: labels.height,
      labels_len: labels.labels.len(),
      points_width: points.width,
      points_height: points.height,
      points_len: points.points.len(),
    }
  }

  /// Short reason code for logs and counters.
  pub fn code(&self) -> &'static str {
    match self {
      FrameError::StaleFrame { .. } => "stale_frame",
      FrameError::MissingTransform { .. } => "missing_transform",
      FrameError::UnknownInstanceClass { .. } => "unknown_instance_class",
      FrameError::ShapeMismatch { .. } => "shape_mismatch",
    }
  }
}

/// Map snapshot encode/decode failures.
#[derive(Debug, Error)]
pub enum SnapshotError {
  #[error("background map is empty")]
  EmptyMap,

  #[error("snapshot truncated: needed {needed} bytes, {available} available")]
  Truncated { needed: usize, available: usize },

  #[error("not a map snapshot (bad magic)")]
  BadMagic,

  #[error("unsupported tree depth {0}")]
  UnsupportedDepth(u32),

  #[error("snapshot kind {found} does not match the requested decoder")]
  KindMismatch { found: u32 },

  #[error("snapshot declares {declared} nodes but {decoded} were decoded")]
  NodeCountMismatch { declared: u64, decoded: u64 },

  #[error("invalid resolution {0} in snapshot header")]
  InvalidResolution(f64),

  #[error(transparent)]
  Io(#[from] std::io::Error),
}

/// Failure reported by a remote render service.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RenderServiceError {
  #[error("render service unavailable: {0}")]
  Unavailable(String),

  #[error(
    "render service returned a {width}x{height} image with {len} labels, expected {expected_width}x{expected_height}"
  )]
  ShapeMismatch {
    width: usize,
    height: usize,
    len: usize,
    expected_width: usize,
    expected_height: usize,
  },
}

/// Invalid mapper configuration.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
  #[error("{name} must be a probability in (0, 1), got {value}")]
  InvalidProbability { name: &'static str, value: f64 },

  #[error("{0}")]
  InvalidOrdering(String),

  #[error("resolution must be positive and finite, got {0}")]
  InvalidResolution(f64),

  #[error("pitch for class {class_id} must be positive and finite, got {pitch}")]
  InvalidPitch { class_id: u32, pitch: f64 },

  #[error("max_range must be positive when set, got {0}")]
  InvalidMaxRange(f64),
}
