//! Stage 3: Integrate
//!
//! Carves free space into the background index and commits occupied
//! endpoints into each instance's index.
//!
//! ```text
//! ┌────────────┐   validate    ┌───────────────┐  par fold   ┌──────────────────┐
//! │ labels +   ├──────────────►│ ensure indices├────────────►│ FrameAccumulator │
//! │ class map  │ (no mutation  └───────────────┘  per row    │ free / occupied  │
//! └────────────┘  on failure)                     reduce     │ points per id    │
//!                                                            └────────┬─────────┘
//!                                                                     │ apply
//!                                                                     ▼
//!                               background free  (minus background occupied,
//!                                                 plus foreground endpoints)
//!                               instance occupied (background skips keys
//!                                                  claimed by foreground)
//!                               bounds union, centroid replace, prune
//! ```

use std::collections::{BTreeMap, HashSet};

use glam::DVec3;
use rayon::prelude::*;
use smallvec::SmallVec;

use super::types::IntegrationStats;
use crate::config::MapperConfig;
use crate::constants::PIXEL_STRIDE;
use crate::error::FrameError;
use crate::octree::CellKey;
use crate::registry::Registry;
use crate::types::{is_foreground, Aabb3, ClassMap, InstanceId, LabelImage, PointImage, BACKGROUND, UNCERTAIN};

/// Class recorded for the background index.
const BACKGROUND_CLASS: u32 = 0;

/// Per-worker key sets and point lists, merged after the parallel phase.
#[derive(Debug, Default)]
struct FrameAccumulator {
  /// Background cells traversed by rays.
  free_bg: HashSet<CellKey>,
  /// Foreground endpoints, in background key space.
  endpoints_bg: HashSet<CellKey>,
  /// Endpoint keys per instance, in that instance's key space.
  occupied: BTreeMap<InstanceId, HashSet<CellKey>>,
  /// Integrated points per instance.
  points: BTreeMap<InstanceId, Vec<DVec3>>,
  point_count: usize,
}

impl FrameAccumulator {
  fn merge(mut self, other: FrameAccumulator) -> FrameAccumulator {
    self.free_bg.extend(other.free_bg);
    self.endpoints_bg.extend(other.endpoints_bg);
    for (id, keys) in other.occupied {
      self.occupied.entry(id).or_default().extend(keys);
    }
    for (id, points) in other.points {
      self.points.entry(id).or_default().extend(points);
    }
    self.point_count += other.point_count;
    self
  }
}

/// Integrate one frame of world-frame points and resolved instance labels.
///
/// Every labelled foreground instance must have a class in `classes`;
/// otherwise the frame is rejected before any index is touched.
#[tracing::instrument(skip_all, name = "pipeline::integrate")]
pub fn integrate(
  registry: &mut Registry,
  config: &MapperConfig,
  origin: DVec3,
  points: &PointImage,
  labels: &LabelImage,
  classes: &ClassMap,
) -> Result<IntegrationStats, FrameError> {
  if !labels.same_shape(points) {
    return Err(FrameError::shape_mismatch(labels, points));
  }

  // Validate every label before mutating anything.
  let mut labelled: SmallVec<[(InstanceId, u32); 8]> = SmallVec::new();
  for instance_id in labels.unique() {
    if instance_id == UNCERTAIN || instance_id == BACKGROUND {
      continue;
    }
    let Some(&class_id) = classes.get(&instance_id) else {
      tracing::error!(instance_id, "labelled instance has no class entry, dropping frame");
      return Err(FrameError::UnknownInstanceClass { instance_id });
    };
    labelled.push((instance_id, class_id));
  }

  let mut stats = IntegrationStats::default();
  let sensor_model = config.sensor_model;
  let (_, created) = registry.ensure_instance(BACKGROUND, BACKGROUND_CLASS, config.resolution, sensor_model);
  if created {
    stats.new_instances.push(BACKGROUND);
  }
  for &(instance_id, class_id) in &labelled {
    let pitch = config.pitch_for(instance_id, class_id);
    let (_, created) = registry.ensure_instance(instance_id, class_id, pitch, sensor_model);
    if created {
      stats.new_instances.push(instance_id);
    }
  }

  let acc = {
    let _span = tracing::info_span!("accumulate").entered();
    accumulate(registry, config.max_range, origin, points, labels)
  };
  stats.points = acc.point_count;

  {
    let _span = tracing::info_span!("apply_updates").entered();
    apply(registry, &acc, &mut stats);
    update_extents(registry, &acc);
  }

  if config.compress_map {
    stats.pruned_nodes = registry.iter_mut().map(|r| r.index.prune()).sum();
  }

  tracing::debug!(
    points = stats.points,
    free = stats.free_cells,
    occupied = stats.occupied_cells,
    new_instances = stats.new_instances.len(),
    "integrated frame"
  );
  Ok(stats)
}

/// Parallel pass over subsampled pixels collecting key sets and points.
fn accumulate(
  registry: &Registry,
  max_range: Option<f64>,
  origin: DVec3,
  points: &PointImage,
  labels: &LabelImage,
) -> FrameAccumulator {
  let Some(background) = registry.background() else {
    return FrameAccumulator::default();
  };
  let bg = &background.index;

  (0..points.height)
    .into_par_iter()
    .step_by(PIXEL_STRIDE)
    .fold(FrameAccumulator::default, |mut acc, row| {
      for col in (0..points.width).step_by(PIXEL_STRIDE) {
        let instance_id = labels.get(row, col);
        let point = points.get(row, col);
        if instance_id == UNCERTAIN || !PointImage::is_valid(point) {
          continue;
        }
        acc.points.entry(instance_id).or_default().push(point);
        acc.point_count += 1;

        let range = point.distance(origin);
        match max_range {
          Some(limit) if range > limit => {
            let end = origin + (point - origin) / range * limit;
            if let Some(ray) = bg.compute_ray_keys(origin, end) {
              acc.free_bg.extend(ray);
            }
          }
          _ => {
            if let Some(ray) = bg.compute_ray_keys(origin, point) {
              acc.free_bg.extend(ray);
            }
            let key = registry
              .get(instance_id)
              .and_then(|r| r.index.coord_to_key_checked(point));
            if let Some(key) = key {
              acc.occupied.entry(instance_id).or_default().insert(key);
            }
            if instance_id != BACKGROUND {
              if let Some(key) = bg.coord_to_key_checked(point) {
                acc.endpoints_bg.insert(key);
              }
            }
          }
        }
      }
      acc
    })
    .reduce(FrameAccumulator::default, FrameAccumulator::merge)
}

/// Commit accumulated updates.
///
/// A background cell that is a foreground endpoint this frame is updated
/// free, never occupied. Otherwise background occupied beats background free.
fn apply(registry: &mut Registry, acc: &FrameAccumulator, stats: &mut IntegrationStats) {
  let empty = HashSet::new();
  let occupied_bg = acc.occupied.get(&BACKGROUND).unwrap_or(&empty);

  if let Some(background) = registry.get_mut(BACKGROUND) {
    let free = acc
      .free_bg
      .iter()
      .filter(|key| !occupied_bg.contains(key))
      .chain(acc.endpoints_bg.iter().filter(|key| !acc.free_bg.contains(key) || occupied_bg.contains(key)));
    for &key in free {
      background.index.update_free(key);
      stats.free_cells += 1;
    }
  }

  for (&instance_id, keys) in &acc.occupied {
    let Some(record) = registry.get_mut(instance_id) else {
      continue;
    };
    for &key in keys {
      if instance_id == BACKGROUND && acc.endpoints_bg.contains(&key) {
        continue;
      }
      record.index.update_occupied(key);
      stats.occupied_cells += 1;
    }
  }
}

/// Grow bounding boxes and replace centroids of observed foreground
/// instances.
fn update_extents(registry: &mut Registry, acc: &FrameAccumulator) {
  for (&instance_id, points) in &acc.points {
    if !is_foreground(instance_id) {
      continue;
    }
    let (Some(record), Some(extent)) = (registry.get_mut(instance_id), Aabb3::from_points(points)) else {
      continue;
    };
    record.index.expand_bounds(extent.min, extent.max);
    let sum: DVec3 = points.iter().copied().sum();
    record.centroid = Some(sum / points.len() as f64);
  }
}

#[cfg(test)]
#[path = "integrate_test.rs"]
mod integrate_test;
