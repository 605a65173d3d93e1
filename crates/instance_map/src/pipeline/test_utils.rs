//! Test utilities for pipeline tests.
//!
//! Provides camera fixtures, synthetic point images and registries filled
//! with box-shaped objects.

use glam::{DAffine3, DVec3};

use super::types::SensorPose;
use crate::octree::{OccupancyOctree, SensorModel};
use crate::registry::Registry;
use crate::types::{Aabb3, CameraIntrinsics, ClassId, InstanceId, LabelImage, PointImage, BACKGROUND};

// =============================================================================
// Camera fixtures
// =============================================================================

/// Square-pixel intrinsics with focal length equal to the width and the
/// principal point at the image centre.
pub fn test_intrinsics(width: usize, height: usize) -> CameraIntrinsics {
  CameraIntrinsics::new(
    width as f64,
    width as f64,
    (width as f64 - 1.0) / 2.0,
    (height as f64 - 1.0) / 2.0,
  )
}

/// Camera at the world origin looking down +Z.
pub fn identity_pose(width: usize, height: usize) -> SensorPose {
  SensorPose::new(DAffine3::IDENTITY, test_intrinsics(width, height))
}

// =============================================================================
// Point fixtures
// =============================================================================

/// World-frame points of a fronto-parallel plane at sensor depth `depth`.
pub fn plane_points(pose: &SensorPose, width: usize, height: usize, depth: f64) -> PointImage {
  let mut points = PointImage::missing(width, height);
  for row in 0..height {
    for col in 0..width {
      let sensor = pose.intrinsics.back_project(col, row, depth);
      points.set(row, col, pose.sensor_to_world.transform_point3(sensor));
    }
  }
  points
}

/// 1x1 frame holding a single labelled point.
pub fn single_point_frame(point: DVec3, label: InstanceId) -> (PointImage, LabelImage) {
  (
    PointImage::new(1, 1, vec![point]),
    LabelImage::new(1, 1, vec![label]),
  )
}

/// Frame of several labelled points laid out on the subsampled pixels of a
/// single row, so every point is integrated.
pub fn points_frame(entries: &[(DVec3, InstanceId)]) -> (PointImage, LabelImage) {
  let width = entries.len() * 2;
  let mut points = PointImage::missing(width, 1);
  let mut labels = LabelImage::filled(width, 1, crate::types::UNCERTAIN);
  for (i, &(point, label)) in entries.iter().enumerate() {
    points.set(0, i * 2, point);
    labels.set(0, i * 2, label);
  }
  (points, labels)
}

// =============================================================================
// Registry fixtures
// =============================================================================

/// Mark every finest cell whose centre lies in `[min, max]` occupied.
pub fn fill_box(index: &mut OccupancyOctree, min: DVec3, max: DVec3) {
  let (Some(lo), Some(hi)) = (index.coord_to_key_checked(min), index.coord_to_key_checked(max)) else {
    panic!("box outside addressable range");
  };
  for x in lo.x..=hi.x {
    for y in lo.y..=hi.y {
      for z in lo.z..=hi.z {
        index.update_occupied(crate::octree::CellKey::new(x, y, z));
      }
    }
  }
  index.expand_bounds(min, max);
}

/// Registry with a background index and one box-shaped object per entry.
pub fn box_registry(boxes: &[(InstanceId, ClassId, DVec3, DVec3)], pitch: f64) -> Registry {
  let mut registry = Registry::new();
  registry.ensure_instance(BACKGROUND, 0, pitch, SensorModel::default());
  for &(instance_id, class_id, min, max) in boxes {
    let (record, _) = registry.ensure_instance(instance_id, class_id, pitch, SensorModel::default());
    fill_box(&mut record.index, min, max);
    record.centroid = Some(Aabb3::new(min, max).center());
  }
  registry
}
