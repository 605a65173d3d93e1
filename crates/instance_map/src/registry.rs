//! Registry - owned store of per-instance occupancy indices.
//!
//! Exactly one index exists per instance ID observed since the last reset.
//! Indices are created the first time an ID is integrated and only removed
//! by [`Registry::reset`], which also bumps the [`Epoch`].

use std::collections::BTreeMap;

use glam::DVec3;

use crate::octree::{OccupancyOctree, SensorModel};
use crate::types::{is_foreground, Aabb3, ClassId, ClassMap, InstanceId, BACKGROUND};

// =============================================================================
// Epoch
// =============================================================================

/// Reset generation counter.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Epoch(pub u64);

impl Epoch {
  pub fn new() -> Self {
    Self(0)
  }

  /// Increment the epoch (called on every reset).
  pub fn increment(&mut self) {
    self.0 += 1;
  }
}

// =============================================================================
// InstanceRecord
// =============================================================================

/// One tracked instance: its class, occupancy index and centroid.
///
/// The bounding box lives on the index (`index.bounds()`).
#[derive(Clone, Debug)]
pub struct InstanceRecord {
  pub instance_id: InstanceId,
  pub class_id: ClassId,
  pub index: OccupancyOctree,
  /// Centroid of the most recent frame's points. `None` for the background
  /// and for instances whose index exists but have not yet been observed
  /// with a valid point.
  pub centroid: Option<DVec3>,
}

impl InstanceRecord {
  pub fn new(instance_id: InstanceId, class_id: ClassId, pitch: f64, sensor_model: SensorModel) -> Self {
    Self {
      instance_id,
      class_id,
      index: OccupancyOctree::new(pitch, sensor_model),
      centroid: None,
    }
  }

  pub fn is_background(&self) -> bool {
    self.instance_id == BACKGROUND
  }

  pub fn bounds(&self) -> Option<&Aabb3> {
    self.index.bounds()
  }

  /// Voxel pitch of this instance's index.
  pub fn pitch(&self) -> f64 {
    self.index.resolution()
  }
}

// =============================================================================
// Registry
// =============================================================================

#[derive(Clone, Debug, Default)]
pub struct Registry {
  records: BTreeMap<InstanceId, InstanceRecord>,
  epoch: Epoch,
  /// Next instance ID handed out by the associator.
  instance_counter: InstanceId,
}

impl Registry {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn len(&self) -> usize {
    self.records.len()
  }

  pub fn is_empty(&self) -> bool {
    self.records.is_empty()
  }

  pub fn contains(&self, instance_id: InstanceId) -> bool {
    self.records.contains_key(&instance_id)
  }

  pub fn get(&self, instance_id: InstanceId) -> Option<&InstanceRecord> {
    self.records.get(&instance_id)
  }

  pub fn get_mut(&mut self, instance_id: InstanceId) -> Option<&mut InstanceRecord> {
    self.records.get_mut(&instance_id)
  }

  pub fn background(&self) -> Option<&InstanceRecord> {
    self.records.get(&BACKGROUND)
  }

  /// All records in ascending instance ID order (background first).
  pub fn iter(&self) -> impl Iterator<Item = &InstanceRecord> {
    self.records.values()
  }

  /// Records of tracked objects, ascending.
  pub fn foreground(&self) -> impl Iterator<Item = &InstanceRecord> {
    self.records.values().filter(|r| is_foreground(r.instance_id))
  }

  pub(crate) fn iter_mut(&mut self) -> impl Iterator<Item = &mut InstanceRecord> {
    self.records.values_mut()
  }

  /// Get the record for `instance_id`, creating it on first sight.
  ///
  /// Returns the record and whether it was created.
  pub fn ensure_instance(
    &mut self,
    instance_id: InstanceId,
    class_id: ClassId,
    pitch: f64,
    sensor_model: SensorModel,
  ) -> (&mut InstanceRecord, bool) {
    let mut created = false;
    let record = self.records.entry(instance_id).or_insert_with(|| {
      created = true;
      tracing::debug!(instance_id, class_id, pitch, "created instance index");
      InstanceRecord::new(instance_id, class_id, pitch, sensor_model)
    });
    (record, created)
  }

  /// Clear every record, restart instance numbering and bump the epoch.
  pub fn reset(&mut self) -> Epoch {
    self.records.clear();
    self.instance_counter = 0;
    self.epoch.increment();
    self.epoch
  }

  pub fn epoch(&self) -> Epoch {
    self.epoch
  }

  /// Counter used by the associator to allocate new instance IDs.
  pub fn instance_counter_mut(&mut self) -> &mut InstanceId {
    &mut self.instance_counter
  }

  /// Class of every registered instance, background included.
  pub fn class_map(&self) -> ClassMap {
    self
      .records
      .values()
      .map(|r| (r.instance_id, r.class_id))
      .collect()
  }

  /// `(instance_id, class_id)` of every tracked object, ascending.
  pub fn classes(&self) -> Vec<(InstanceId, ClassId)> {
    self.foreground().map(|r| (r.instance_id, r.class_id)).collect()
  }

  /// Add classes of already-registered instances missing from `classes`.
  pub fn merge_known_classes(&self, classes: &mut ClassMap) {
    for record in self.records.values() {
      classes.entry(record.instance_id).or_insert(record.class_id);
    }
  }
}

#[cfg(test)]
#[path = "registry_test.rs"]
mod registry_test;
