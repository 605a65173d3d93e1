//! Occupancy cubes for visualization.
//!
//! Leaves of every index grouped by tree depth, so each layer holds cubes of
//! a single edge length.

use glam::DVec3;
use rayon::prelude::*;

use crate::constants::TREE_DEPTH;
use crate::octree::{CellKey, Leaf, OccupancyOctree};
use crate::registry::{InstanceRecord, Registry};
use crate::types::{ClassId, InstanceId};

/// Cube centres of one tree depth.
#[derive(Clone, Debug, PartialEq)]
pub struct CubeLayer {
  /// Tree depth, `TREE_DEPTH` is the finest.
  pub depth: u8,
  /// Edge length of every cube in the layer.
  pub size: f64,
  pub centers: Vec<DVec3>,
}

/// Occupied (and, for the background, free) cubes of one index.
#[derive(Clone, Debug, PartialEq)]
pub struct InstanceCubes {
  pub instance_id: InstanceId,
  pub class_id: ClassId,
  /// Non-empty layers, ascending depth.
  pub occupied: Vec<CubeLayer>,
  /// Free layers; only filled for the background.
  pub free: Vec<CubeLayer>,
}

impl InstanceCubes {
  /// Total occupied cubes over all layers.
  pub fn occupied_count(&self) -> usize {
    self.occupied.iter().map(|l| l.centers.len()).sum()
  }

  pub fn free_count(&self) -> usize {
    self.free.iter().map(|l| l.centers.len()).sum()
  }
}

/// Cubes of every index in the registry, ascending instance ID.
///
/// Background cubes whose centre is occupied by any foreground index are
/// left out. With `filter_speckles`, finest-depth occupied cells without an
/// occupied 26-neighbour in the same index are dropped.
#[tracing::instrument(skip_all, name = "pipeline::occupancy_cubes")]
pub fn occupancy_cubes(registry: &Registry, filter_speckles: bool) -> Vec<InstanceCubes> {
  let records: Vec<&InstanceRecord> = registry.iter().collect();
  records
    .par_iter()
    .map(|record| instance_cubes(registry, record, filter_speckles))
    .collect()
}

fn instance_cubes(registry: &Registry, record: &InstanceRecord, filter_speckles: bool) -> InstanceCubes {
  let index = &record.index;
  let background = record.is_background();
  let mut occupied = empty_layers(index);
  let mut free = empty_layers(index);

  index.for_each_leaf(|leaf| {
    if leaf.is_occupied() {
      if filter_speckles && leaf.depth == TREE_DEPTH && is_speckle(index, leaf) {
        return;
      }
      if background && occupied_by_foreground(registry, leaf.center) {
        return;
      }
      occupied[leaf.depth as usize].centers.push(leaf.center);
    } else if background {
      free[leaf.depth as usize].centers.push(leaf.center);
    }
  });

  occupied.retain(|l| !l.centers.is_empty());
  free.retain(|l| !l.centers.is_empty());
  InstanceCubes {
    instance_id: record.instance_id,
    class_id: record.class_id,
    occupied,
    free,
  }
}

fn empty_layers(index: &OccupancyOctree) -> Vec<CubeLayer> {
  (0..=TREE_DEPTH)
    .map(|depth| CubeLayer {
      depth,
      size: index.resolution() * f64::from(1u32 << (TREE_DEPTH - depth)),
      centers: Vec::new(),
    })
    .collect()
}

fn occupied_by_foreground(registry: &Registry, center: DVec3) -> bool {
  registry
    .foreground()
    .filter_map(|r| r.index.search(center, 0))
    .any(|node| node.occupancy() > 0.5)
}

/// True when no cell of the 26-neighbourhood is occupied.
fn is_speckle(index: &OccupancyOctree, leaf: &Leaf) -> bool {
  let key: CellKey = leaf.key;
  for dz in -1..=1 {
    for dy in -1..=1 {
      for dx in -1..=1 {
        if (dx, dy, dz) == (0, 0, 0) {
          continue;
        }
        let occupied = key
          .offset(dx, dy, dz)
          .and_then(|neighbour| index.search_key(neighbour, 0))
          .is_some_and(|node| node.is_occupied());
        if occupied {
          return false;
        }
      }
    }
  }
  true
}

#[cfg(test)]
#[path = "cubes_test.rs"]
mod cubes_test;
