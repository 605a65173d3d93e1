//! Stage 4: Extract
//!
//! Samples a 32³ lattice around each tracked object's centroid.
//!
//! ```text
//! origin = centroid - 15.5 * pitch          (centroid between cells 15 and 16)
//! cell(i, j, k) = origin + (i, j, k) * pitch
//! ```
//!
//! World grids are axis-aligned to the world frame. Sensor grids are
//! axis-aligned to the sensor frame: the centroid is moved into the sensor
//! frame and every lattice cell is moved back to world for lookup.
//!
//! # No-entry rules
//!
//! A sensor grid cell not occupied by its own instance is tested against,
//! in order, first match wins:
//!
//! 1. ground: world z < 0 (when enabled), value = clamp max
//! 2. background free (when enabled), value = 1 - occupancy
//! 3. any other index at its clamp max, value = occupancy

use glam::{DAffine3, DVec3};
use rayon::prelude::*;

use super::types::{GridPair, NoEntryPolicy, VoxelGrid};
use crate::constants::{coord_to_index, GRID_CENTER_OFFSET, GRID_SIZE};
use crate::registry::{InstanceRecord, Registry};

/// World-frame occupancy grid of every tracked object with a centroid.
#[tracing::instrument(skip_all, name = "pipeline::world_grids")]
pub fn world_grids(registry: &Registry) -> Vec<VoxelGrid> {
  let records: Vec<&InstanceRecord> = registry.foreground().filter(|r| r.centroid.is_some()).collect();
  records.par_iter().filter_map(|record| world_grid(record)).collect()
}

/// World-frame grid of one instance.
pub fn world_grid(record: &InstanceRecord) -> Option<VoxelGrid> {
  let centroid = record.centroid?;
  let pitch = record.pitch();
  let origin = centroid - DVec3::splat(GRID_CENTER_OFFSET * pitch);
  let mut grid = VoxelGrid::new(record.instance_id, record.class_id, pitch, origin);

  for_each_cell(|i, j, k| {
    let position = grid.cell_position(i, j, k);
    if let Some(node) = record.index.search(position, 0) {
      if node.is_occupied() {
        grid.push(coord_to_index(i, j, k), node.occupancy());
      }
    }
  });
  Some(grid)
}

/// Sensor-frame object and no-entry grids of every tracked object.
#[tracing::instrument(skip_all, name = "pipeline::sensor_grids")]
pub fn sensor_grids(registry: &Registry, sensor_to_world: &DAffine3, policy: NoEntryPolicy) -> Vec<GridPair> {
  let records: Vec<&InstanceRecord> = registry.foreground().filter(|r| r.centroid.is_some()).collect();
  records
    .par_iter()
    .filter_map(|record| sensor_grid(registry, record, sensor_to_world, policy))
    .collect()
}

/// Sensor-frame grid pair of one instance.
pub fn sensor_grid(
  registry: &Registry,
  record: &InstanceRecord,
  sensor_to_world: &DAffine3,
  policy: NoEntryPolicy,
) -> Option<GridPair> {
  let centroid = sensor_to_world.inverse().transform_point3(record.centroid?);
  let pitch = record.pitch();
  let origin = centroid - DVec3::splat(GRID_CENTER_OFFSET * pitch);
  let mut object = VoxelGrid::new(record.instance_id, record.class_id, pitch, origin);
  let mut no_entry = VoxelGrid::new(record.instance_id, record.class_id, pitch, origin);

  for_each_cell(|i, j, k| {
    let index = coord_to_index(i, j, k);
    let world = sensor_to_world.transform_point3(object.cell_position(i, j, k));

    if let Some(node) = record.index.search(world, 0) {
      if node.is_occupied() {
        object.push(index, node.occupancy());
        return;
      }
    }
    if let Some(value) = no_entry_value(registry, record, world, policy) {
      no_entry.push(index, value);
    }
  });
  Some(GridPair { object, no_entry })
}

/// Value of the first matching no-entry rule at `world`.
fn no_entry_value(registry: &Registry, own: &InstanceRecord, world: DVec3, policy: NoEntryPolicy) -> Option<f64> {
  if policy.ground_as_no_entry && world.z < 0.0 {
    return Some(own.index.sensor_model().clamp_max);
  }

  if policy.free_as_no_entry {
    let free = registry
      .background()
      .and_then(|bg| bg.index.search(world, 0))
      .filter(|node| node.log_odds() < 0.0);
    if let Some(node) = free {
      return Some(1.0 - node.occupancy());
    }
  }

  registry
    .iter()
    .filter(|other| other.instance_id != own.instance_id)
    .find_map(|other| {
      let node = other.index.search(world, 0)?;
      let confident = other.index.log_odds_model().is_confident(node.log_odds());
      confident.then(|| node.occupancy())
    })
}

/// Visit every lattice cell, X slowest and Z fastest.
#[inline]
fn for_each_cell(mut f: impl FnMut(usize, usize, usize)) {
  for i in 0..GRID_SIZE {
    for j in 0..GRID_SIZE {
      for k in 0..GRID_SIZE {
        f(i, j, k);
      }
    }
  }
}

#[cfg(test)]
#[path = "extract_test.rs"]
mod extract_test;
