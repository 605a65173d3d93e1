//! Stage 1: Render
//!
//! Predicts the instance label image for the current pose by casting rays
//! against every foreground index.
//!
//! Each instance is rendered independently in parallel into a private hit
//! list. Hit lists are then merged in ascending instance ID order; only a
//! strictly closer hit replaces the current winner, so equal distances keep
//! the lowest instance ID.

use rayon::prelude::*;

use super::types::{RenderOutput, SensorPose};
use crate::constants::PIXEL_STRIDE;
use crate::registry::{InstanceRecord, Registry};
use crate::types::{InstanceId, LabelImage, PointImage, UNCERTAIN};

/// Range slack applied to the distance of each target point.
const RANGE_SLACK: f64 = 1.1;

/// Depth used when back-projecting pixels with no measurement.
const SYNTHETIC_DEPTH: f64 = 1.0;

/// One ray hit of one instance.
#[derive(Clone, Copy, Debug, PartialEq)]
struct Hit {
  row: usize,
  col: usize,
  distance: f64,
}

/// Render the expected instance label image.
///
/// `points` are world-frame points aligned with the camera image.
#[tracing::instrument(skip_all, name = "pipeline::render")]
pub fn render(registry: &Registry, pose: &SensorPose, points: &PointImage) -> RenderOutput {
  let records: Vec<&InstanceRecord> = registry.foreground().collect();
  let hits: Vec<(InstanceId, Vec<Hit>)> = records
    .par_iter()
    .map(|record| (record.instance_id, render_instance(record, pose, points)))
    .collect();

  let mut output = RenderOutput {
    labels: LabelImage::filled(points.width, points.height, UNCERTAIN),
    depth: vec![f64::NAN; points.width * points.height],
  };
  for (instance_id, instance_hits) in &hits {
    for hit in instance_hits {
      merge_hit(&mut output, *instance_id, hit);
    }
  }

  tracing::debug!(
    instances = records.len(),
    hits = hits.iter().map(|(_, h)| h.len()).sum::<usize>(),
    "rendered labels"
  );
  output
}

/// Cast one ray per subsampled pixel against a single instance index.
fn render_instance(record: &InstanceRecord, pose: &SensorPose, points: &PointImage) -> Vec<Hit> {
  let index = &record.index;
  let origin = pose.origin();
  let mut hits = Vec::new();

  for row in (0..points.height).step_by(PIXEL_STRIDE) {
    for col in (0..points.width).step_by(PIXEL_STRIDE) {
      let measured = points.get(row, col);
      let (target, bounds_checkable) = if PointImage::is_valid(measured) {
        (measured, true)
      } else {
        let ray = pose.intrinsics.back_project(col, row, SYNTHETIC_DEPTH);
        (pose.sensor_to_world.transform_point3(ray), false)
      };

      if bounds_checkable && !index.in_bounds(target) {
        continue;
      }

      let direction = target - origin;
      let max_range = direction.length() * RANGE_SLACK;
      let Some(hit) = index.cast_ray(origin, direction, true, max_range) else {
        continue;
      };
      hits.push(Hit {
        row,
        col,
        distance: hit.distance(origin),
      });
    }
  }
  hits
}

/// Record `hit` if it is closer than the pixel's current winner, painting the
/// pixel and its row/column successors.
fn merge_hit(output: &mut RenderOutput, instance_id: InstanceId, hit: &Hit) {
  let width = output.labels.width;
  let height = output.labels.height;
  let slot = &mut output.depth[hit.row * width + hit.col];
  if !(slot.is_nan() || hit.distance < *slot) {
    return;
  }
  *slot = hit.distance;

  for row in hit.row..(hit.row + PIXEL_STRIDE).min(height) {
    for col in hit.col..(hit.col + PIXEL_STRIDE).min(width) {
      output.labels.set(row, col, instance_id);
    }
  }
}

#[cfg(test)]
#[path = "render_test.rs"]
mod render_test;
