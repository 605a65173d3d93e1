//! OccupancyOctree - sparse probabilistic occupancy index.
//!
//! # Coordinate Math
//!
//! ```text
//! key        = floor(coord / resolution) + KEY_CENTER      (checked)
//! coord      = (key - KEY_CENTER + 0.5) * resolution       (cell centre)
//! node_size  = resolution * 2^(TREE_DEPTH - depth)
//! ```
//!
//! Depth 0 passed to the query functions means "finest" (`TREE_DEPTH`).

use glam::DVec3;

use super::key::CellKey;
use super::node::OccupancyNode;
use super::sensor_model::{probability, LogOddsModel, SensorModel};
use crate::constants::{KEY_CENTER, KEY_RANGE, TREE_DEPTH};
use crate::types::Aabb3;

/// A leaf of the tree as seen by iteration.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Leaf {
  /// Minimum-corner key of the node.
  pub key: CellKey,
  pub depth: u8,
  /// World-space centre of the node.
  pub center: DVec3,
  /// Edge length in world units.
  pub size: f64,
  pub log_odds: f32,
}

impl Leaf {
  pub fn occupancy(&self) -> f64 {
    probability(self.log_odds)
  }

  pub fn is_occupied(&self) -> bool {
    self.log_odds > 0.0
  }
}

#[derive(Clone, Debug)]
pub struct OccupancyOctree {
  resolution: f64,
  sensor_model: SensorModel,
  model: LogOddsModel,
  root: Option<OccupancyNode>,
  bounds: Option<Aabb3>,
}

impl OccupancyOctree {
  /// Create an empty tree with the given finest cell size.
  pub fn new(resolution: f64, sensor_model: SensorModel) -> Self {
    debug_assert!(resolution > 0.0, "resolution must be positive");
    Self {
      resolution,
      sensor_model,
      model: sensor_model.log_odds(),
      root: None,
      bounds: None,
    }
  }

  #[inline]
  pub fn resolution(&self) -> f64 {
    self.resolution
  }

  pub fn sensor_model(&self) -> &SensorModel {
    &self.sensor_model
  }

  pub fn log_odds_model(&self) -> &LogOddsModel {
    &self.model
  }

  pub fn is_empty(&self) -> bool {
    self.root.is_none()
  }

  pub fn node_count(&self) -> usize {
    self.root.as_ref().map_or(0, OccupancyNode::count_nodes)
  }

  pub fn clear(&mut self) {
    self.root = None;
    self.bounds = None;
  }

  pub(crate) fn root(&self) -> Option<&OccupancyNode> {
    self.root.as_ref()
  }

  pub(crate) fn set_root(&mut self, root: Option<OccupancyNode>) {
    self.root = root;
  }

  // ===========================================================================
  // Coordinate conversion
  // ===========================================================================

  /// Key of the finest cell containing `point`, or `None` when the point is
  /// outside the addressable range (or not finite).
  pub fn coord_to_key_checked(&self, point: DVec3) -> Option<CellKey> {
    Some(CellKey::new(
      self.axis_to_key(point.x)?,
      self.axis_to_key(point.y)?,
      self.axis_to_key(point.z)?,
    ))
  }

  #[inline]
  fn axis_to_key(&self, coord: f64) -> Option<u16> {
    let key = (coord / self.resolution).floor() + KEY_CENTER as f64;
    (key.is_finite() && key >= 0.0 && key < KEY_RANGE as f64).then_some(key as u16)
  }

  /// Centre of the finest cell addressed by `key`.
  #[inline]
  pub fn key_to_coord(&self, key: CellKey) -> DVec3 {
    let axis = |k: u16| (k as f64 - KEY_CENTER as f64 + 0.5) * self.resolution;
    DVec3::new(axis(key.x), axis(key.y), axis(key.z))
  }

  /// Centre of the node at `depth` containing `key`.
  pub fn key_to_coord_at_depth(&self, key: CellKey, depth: u8) -> DVec3 {
    let depth = resolve_depth(depth);
    self.node_center(key.at_depth(depth), depth)
  }

  /// Edge length of a node at `depth`.
  #[inline]
  pub fn node_size(&self, depth: u8) -> f64 {
    self.size_at(resolve_depth(depth))
  }

  fn size_at(&self, depth: u8) -> f64 {
    self.resolution * (1u32 << (TREE_DEPTH - depth)) as f64
  }

  /// Centre of the node at tree depth `depth` with minimum corner `base`.
  fn node_center(&self, base: CellKey, depth: u8) -> DVec3 {
    let half_cells = (1u32 << (TREE_DEPTH - depth)) as f64 * 0.5;
    let axis = |k: u16| (k as f64 - KEY_CENTER as f64 + half_cells) * self.resolution;
    DVec3::new(axis(base.x), axis(base.y), axis(base.z))
  }

  // ===========================================================================
  // Updates
  // ===========================================================================

  /// Integrate a hit at `key`. Returns the cell's new log-odds.
  pub fn update_occupied(&mut self, key: CellKey) -> f32 {
    self.update_node(key, true)
  }

  /// Integrate a miss at `key`. Returns the cell's new log-odds.
  pub fn update_free(&mut self, key: CellKey) -> f32 {
    self.update_node(key, false)
  }

  pub fn update_node(&mut self, key: CellKey, occupied: bool) -> f32 {
    let created = self.root.is_none();
    let root = self.root.get_or_insert_with(OccupancyNode::default);
    update_recurs(root, created, key, 0, occupied, &self.model)
  }

  // ===========================================================================
  // Queries
  // ===========================================================================

  /// Deepest existing node containing `point`, down to `depth`.
  ///
  /// `None` means unknown space.
  pub fn search(&self, point: DVec3, depth: u8) -> Option<&OccupancyNode> {
    let key = self.coord_to_key_checked(point)?;
    self.search_key(key, depth)
  }

  pub fn search_key(&self, key: CellKey, depth: u8) -> Option<&OccupancyNode> {
    let max_depth = resolve_depth(depth);
    let mut node = self.root.as_ref()?;
    for d in 0..max_depth {
      if !node.has_children() {
        // pruned leaf covering the whole subtree
        return Some(node);
      }
      node = node.child(key.child_index(d))?;
    }
    Some(node)
  }

  /// Occupancy probability at `point`, `None` when unknown.
  pub fn occupancy_at(&self, point: DVec3) -> Option<f64> {
    self.search(point, 0).map(OccupancyNode::occupancy)
  }

  // ===========================================================================
  // Bounding region
  // ===========================================================================

  pub fn bounds(&self) -> Option<&Aabb3> {
    self.bounds.as_ref()
  }

  /// Grow the bounding region to include `[min, max]`.
  pub fn expand_bounds(&mut self, min: DVec3, max: DVec3) {
    let extent = Aabb3::new(min, max);
    self.bounds = Some(match self.bounds {
      Some(current) => current.union(&extent),
      None => extent,
    });
  }

  /// True when `point` lies inside the bounding region. A tree without one
  /// has global extent.
  pub fn in_bounds(&self, point: DVec3) -> bool {
    self.bounds.map_or(true, |b| b.contains_point(point))
  }

  // ===========================================================================
  // Maintenance
  // ===========================================================================

  /// Collapse every inner node whose eight children are identical leaves.
  ///
  /// Returns the number of nodes removed. Query results are unchanged.
  pub fn prune(&mut self) -> usize {
    self.root.as_mut().map_or(0, prune_recurs)
  }

  /// Visit every leaf with its depth, centre and size.
  pub fn for_each_leaf(&self, mut f: impl FnMut(&Leaf)) {
    if let Some(root) = self.root.as_ref() {
      self.visit_leaves(root, CellKey::new(0, 0, 0), 0, &mut f);
    }
  }

  pub fn leaves(&self) -> Vec<Leaf> {
    let mut leaves = Vec::new();
    self.for_each_leaf(|leaf| leaves.push(*leaf));
    leaves
  }

  fn visit_leaves(&self, node: &OccupancyNode, key: CellKey, depth: u8, f: &mut impl FnMut(&Leaf)) {
    if depth < TREE_DEPTH && node.has_children() {
      for octant in 0..8 {
        if let Some(child) = node.child(octant) {
          self.visit_leaves(child, key.child_key(octant, depth), depth + 1, f);
        }
      }
      return;
    }
    f(&Leaf {
      key,
      depth,
      center: self.node_center(key, depth),
      size: self.size_at(depth),
      log_odds: node.log_odds(),
    });
  }
}

/// Map the "0 = finest" query convention onto tree depth.
#[inline]
fn resolve_depth(depth: u8) -> u8 {
  if depth == 0 || depth > TREE_DEPTH {
    TREE_DEPTH
  } else {
    depth
  }
}

fn update_recurs(
  node: &mut OccupancyNode,
  created: bool,
  key: CellKey,
  depth: u8,
  occupied: bool,
  model: &LogOddsModel,
) -> f32 {
  if depth == TREE_DEPTH {
    let value = model.apply(node.log_odds(), occupied);
    node.set_log_odds(value);
    return value;
  }

  if !node.has_children() && !created {
    node.expand();
  }
  let (child, child_created) = node.child_or_insert(key.child_index(depth));
  let value = update_recurs(child, child_created, key, depth + 1, occupied, model);
  if let Some(max) = node.max_child_log_odds() {
    node.set_log_odds(max);
  }
  value
}

fn prune_recurs(node: &mut OccupancyNode) -> usize {
  let Some(children) = node.children_mut() else {
    return 0;
  };
  let mut removed = 0;
  for child in children.iter_mut().flatten() {
    removed += prune_recurs(child);
  }
  if node.is_collapsible() {
    node.collapse();
    removed += 8;
  }
  removed
}

#[cfg(test)]
#[path = "tree_test.rs"]
mod tree_test;
