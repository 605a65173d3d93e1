//! OccupancyNode - one node of an occupancy octree.
//!
//! A node stores a log-odds value and, when it is an inner node, a boxed
//! array of eight optional children. A missing child is unknown space.
//! Inner node values track the maximum of their children.

use super::sensor_model::probability;

pub type Children = [Option<OccupancyNode>; 8];

#[derive(Clone, Debug, Default, PartialEq)]
pub struct OccupancyNode {
  log_odds: f32,
  children: Option<Box<Children>>,
}

impl OccupancyNode {
  pub fn new(log_odds: f32) -> Self {
    Self {
      log_odds,
      children: None,
    }
  }

  #[inline]
  pub fn log_odds(&self) -> f32 {
    self.log_odds
  }

  #[inline]
  pub(crate) fn set_log_odds(&mut self, value: f32) {
    self.log_odds = value;
  }

  /// Occupancy probability in (0, 1).
  #[inline]
  pub fn occupancy(&self) -> f64 {
    probability(self.log_odds)
  }

  /// Occupied iff occupancy > 0.5, i.e. log-odds > 0.
  #[inline]
  pub fn is_occupied(&self) -> bool {
    self.log_odds > 0.0
  }

  #[inline]
  pub fn has_children(&self) -> bool {
    self.children.is_some()
  }

  pub fn child(&self, octant: usize) -> Option<&OccupancyNode> {
    self.children.as_ref().and_then(|c| c[octant].as_ref())
  }

  pub(crate) fn children_mut(&mut self) -> Option<&mut Children> {
    self.children.as_deref_mut()
  }

  /// Get the child at `octant`, creating it with log-odds 0 when missing.
  ///
  /// Returns the child and whether it was created.
  pub(crate) fn child_or_insert(&mut self, octant: usize) -> (&mut OccupancyNode, bool) {
    let children = self.children.get_or_insert_with(|| Box::new(Default::default()));
    let created = children[octant].is_none();
    let child = children[octant].get_or_insert_with(|| OccupancyNode::new(0.0));
    (child, created)
  }

  /// Give a pruned leaf eight children carrying its own value.
  pub(crate) fn expand(&mut self) {
    debug_assert!(!self.has_children());
    let value = self.log_odds;
    let children: Children = std::array::from_fn(|_| Some(OccupancyNode::new(value)));
    self.children = Some(Box::new(children));
  }

  /// Maximum log-odds over existing children.
  pub(crate) fn max_child_log_odds(&self) -> Option<f32> {
    self
      .children
      .as_ref()?
      .iter()
      .flatten()
      .map(|c| c.log_odds)
      .reduce(f32::max)
  }

  /// True when all eight children exist, are leaves, and share one value.
  pub(crate) fn is_collapsible(&self) -> bool {
    let Some(children) = self.children.as_ref() else {
      return false;
    };
    let Some(first) = children[0].as_ref() else {
      return false;
    };
    children.iter().all(|c| {
      c.as_ref()
        .is_some_and(|c| !c.has_children() && c.log_odds == first.log_odds)
    })
  }

  /// Replace the children by this node's own value.
  pub(crate) fn collapse(&mut self) {
    if let Some(value) = self.max_child_log_odds() {
      self.log_odds = value;
    }
    self.children = None;
  }

  /// Number of nodes in this subtree, including self.
  pub fn count_nodes(&self) -> usize {
    1 + self
      .children
      .as_ref()
      .map_or(0, |c| c.iter().flatten().map(OccupancyNode::count_nodes).sum())
  }
}

#[cfg(test)]
#[path = "node_test.rs"]
mod node_test;
