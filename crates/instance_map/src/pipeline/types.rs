//! Pipeline I/O types.

use glam::{DAffine3, DVec3};
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use crate::constants::{coord_to_index, index_to_coord, GRID_SIZE, GRID_SIZE_CB};
use crate::types::{is_foreground, CameraIntrinsics, ClassId, InstanceId, LabelImage};

// =============================================================================
// Sensor pose
// =============================================================================

/// Camera pose and intrinsics for one frame.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SensorPose {
  /// Sensor to world transform.
  pub sensor_to_world: DAffine3,
  pub intrinsics: CameraIntrinsics,
}

impl SensorPose {
  pub fn new(sensor_to_world: DAffine3, intrinsics: CameraIntrinsics) -> Self {
    Self {
      sensor_to_world,
      intrinsics,
    }
  }

  /// Sensor origin in world coordinates.
  #[inline]
  pub fn origin(&self) -> DVec3 {
    self.sensor_to_world.translation
  }
}

// =============================================================================
// No-entry policy
// =============================================================================

/// Runtime-tunable rules that mark cells as no-entry.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NoEntryPolicy {
  /// Cells below the world ground plane (z < 0) are no-entry.
  pub ground_as_no_entry: bool,
  /// Cells the background reports free are no-entry.
  pub free_as_no_entry: bool,
}

// =============================================================================
// VoxelGrid
// =============================================================================

/// Sparse 32³ occupancy grid anchored on an instance centroid.
///
/// Only cells with a value are listed; the lattice always has
/// `GRID_SIZE_CB` positions.
#[derive(Clone, Debug, PartialEq)]
pub struct VoxelGrid {
  pub instance_id: InstanceId,
  pub class_id: ClassId,
  pub pitch: f64,
  /// Position of lattice cell (0, 0, 0) in the grid's frame.
  pub origin: DVec3,
  /// Flattened lattice indices, ascending.
  pub indices: Vec<u32>,
  /// Value for each entry of `indices`.
  pub values: Vec<f64>,
}

impl VoxelGrid {
  pub fn new(instance_id: InstanceId, class_id: ClassId, pitch: f64, origin: DVec3) -> Self {
    Self {
      instance_id,
      class_id,
      pitch,
      origin,
      indices: Vec::new(),
      values: Vec::new(),
    }
  }

  /// Lattice dimensions (always 32 on every axis).
  pub fn dims(&self) -> [usize; 3] {
    [GRID_SIZE; 3]
  }

  /// Number of lattice positions, regardless of how many are listed.
  pub fn lattice_len(&self) -> usize {
    GRID_SIZE_CB
  }

  /// Number of listed cells.
  pub fn len(&self) -> usize {
    self.indices.len()
  }

  pub fn is_empty(&self) -> bool {
    self.indices.is_empty()
  }

  #[inline]
  pub fn push(&mut self, index: usize, value: f64) {
    debug_assert!(index < GRID_SIZE_CB);
    self.indices.push(index as u32);
    self.values.push(value);
  }

  /// Position of lattice cell `(i, j, k)` in the grid's frame.
  #[inline]
  pub fn cell_position(&self, i: usize, j: usize, k: usize) -> DVec3 {
    self.origin + DVec3::new(i as f64, j as f64, k as f64) * self.pitch
  }

  /// Position of the lattice cell at flattened `index`.
  pub fn index_position(&self, index: usize) -> DVec3 {
    let (i, j, k) = index_to_coord(index);
    self.cell_position(i, j, k)
  }

  /// Value at lattice cell `(i, j, k)`, if listed.
  pub fn value_at(&self, i: usize, j: usize, k: usize) -> Option<f64> {
    let index = coord_to_index(i, j, k) as u32;
    self
      .indices
      .binary_search(&index)
      .ok()
      .map(|pos| self.values[pos])
  }

  /// Dense lattice with 0.0 for unlisted cells.
  pub fn to_dense(&self) -> Vec<f64> {
    let mut dense = vec![0.0; GRID_SIZE_CB];
    for (&index, &value) in self.indices.iter().zip(&self.values) {
      dense[index as usize] = value;
    }
    dense
  }
}

/// Object grid and no-entry grid of one instance in the sensor frame.
#[derive(Clone, Debug, PartialEq)]
pub struct GridPair {
  pub object: VoxelGrid,
  pub no_entry: VoxelGrid,
}

// =============================================================================
// Stage outputs
// =============================================================================

/// Output of the ray-cast renderer.
#[derive(Clone, Debug, PartialEq)]
pub struct RenderOutput {
  /// Expected instance label per pixel, `UNCERTAIN` where nothing was hit.
  pub labels: LabelImage,
  /// Distance from the sensor to the winning hit, NaN where nothing was hit.
  pub depth: Vec<f64>,
}

impl RenderOutput {
  /// Instances that won at least one pixel, ascending.
  pub fn active_instances(&self) -> Vec<InstanceId> {
    self.labels.unique().into_iter().filter(|&id| is_foreground(id)).collect()
  }
}

/// Summary of one integrated frame.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct IntegrationStats {
  /// Valid labelled points integrated.
  pub points: usize,
  /// Background cells updated as free.
  pub free_cells: usize,
  /// Cells updated as occupied, over all instances.
  pub occupied_cells: usize,
  /// Instance indices created by this frame, ascending.
  pub new_instances: SmallVec<[InstanceId; 8]>,
  /// Nodes removed by pruning (0 when compression is off).
  pub pruned_nodes: usize,
}
