//! MapperConfig - mapping parameters and the per-class voxel pitch table.

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::octree::SensorModel;
use crate::pipeline::NoEntryPolicy;
use crate::types::{is_foreground, ClassId, InstanceId};

/// Voxel pitch used for instances of one class.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct ClassPitch {
  pub class_id: ClassId,
  pub pitch: f64,
}

/// Mapping parameters.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MapperConfig {
  /// Base voxel size. Used for the background and for classes missing from
  /// `class_pitch`.
  pub resolution: f64,

  /// Rays longer than this are truncated and commit no endpoint.
  /// `None` disables the limit.
  pub max_range: Option<f64>,

  pub sensor_model: SensorModel,

  /// Prune every index after each integrated frame.
  pub compress_map: bool,

  /// Render through the configured remote service instead of locally.
  pub use_render_service: bool,

  /// Drop isolated finest-depth cells from occupancy cube listings.
  pub filter_speckles: bool,

  /// Frame the map is expressed in.
  pub world_frame: String,

  /// Frame of the depth sensor.
  pub sensor_frame: String,

  /// Initial no-entry policy. Can be changed at runtime.
  pub no_entry: NoEntryPolicy,

  /// Per-class voxel pitch.
  pub class_pitch: Vec<ClassPitch>,
}

impl Default for MapperConfig {
  fn default() -> Self {
    Self {
      resolution: 0.05,
      max_range: None,
      sensor_model: SensorModel::default(),
      compress_map: false,
      use_render_service: false,
      filter_speckles: false,
      world_frame: "map".to_string(),
      sensor_frame: "camera_color_optical_frame".to_string(),
      no_entry: NoEntryPolicy::default(),
      class_pitch: Vec::new(),
    }
  }
}

impl MapperConfig {
  pub fn validate(&self) -> Result<(), ConfigError> {
    if !(self.resolution.is_finite() && self.resolution > 0.0) {
      return Err(ConfigError::InvalidResolution(self.resolution));
    }
    if let Some(range) = self.max_range {
      if !(range > 0.0) {
        return Err(ConfigError::InvalidMaxRange(range));
      }
    }
    self.sensor_model.validate()?;
    for entry in &self.class_pitch {
      if !(entry.pitch.is_finite() && entry.pitch > 0.0) {
        return Err(ConfigError::InvalidPitch {
          class_id: entry.class_id,
          pitch: entry.pitch,
        });
      }
    }
    Ok(())
  }

  /// Voxel pitch of a class, falling back to the base resolution.
  pub fn class_pitch(&self, class_id: ClassId) -> f64 {
    self
      .class_pitch
      .iter()
      .find(|entry| entry.class_id == class_id)
      .map_or(self.resolution, |entry| entry.pitch)
  }

  /// Voxel pitch of a new index for `instance_id`.
  pub fn pitch_for(&self, instance_id: InstanceId, class_id: ClassId) -> f64 {
    if is_foreground(instance_id) {
      self.class_pitch(class_id)
    } else {
      self.resolution
    }
  }

  /// Builder-style pitch entry.
  pub fn with_class_pitch(mut self, class_id: ClassId, pitch: f64) -> Self {
    self.class_pitch.retain(|entry| entry.class_id != class_id);
    self.class_pitch.push(ClassPitch { class_id, pitch });
    self
  }
}

#[cfg(test)]
#[path = "config_test.rs"]
mod config_test;
