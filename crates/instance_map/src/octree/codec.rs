//! Map snapshot codec.
//!
//! Two encodings share one header:
//!
//! ```text
//! ┌───────────────────────── header (32 bytes) ─────────────────────────┐
//! │ magic [u8; 8] │ resolution f64 │ tree_depth u32 │ kind u32 │ nodes u64 │
//! └──────────────────────────────────────────────────────────────────────┘
//!
//! Binary (lossy): the tree is pruned first, then every inner node writes
//! two bytes holding 2 bits per child, followed by its inner children:
//!   00 unknown   01 occupied leaf   10 free leaf   11 inner node
//! Occupied leaves decode to the clamp-max value, free leaves to clamp-min.
//!
//! Full (lossless): every node writes its log-odds (f32) and a child mask
//! (u8), followed by its children in octant order.
//! ```
//!
//! All values are in native byte order.

use bytemuck::{Pod, Zeroable};
use serde::{Deserialize, Serialize};

use super::node::OccupancyNode;
use super::sensor_model::{LogOddsModel, SensorModel};
use super::tree::OccupancyOctree;
use crate::constants::TREE_DEPTH;
use crate::error::SnapshotError;

/// Leading bytes of every snapshot.
pub const SNAPSHOT_MAGIC: [u8; 8] = *b"IMAPOCT1";

const CHILD_UNKNOWN: u8 = 0b00;
const CHILD_OCCUPIED: u8 = 0b01;
const CHILD_FREE: u8 = 0b10;
const CHILD_INNER: u8 = 0b11;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SnapshotKind {
  /// Pruned, occupied/free only.
  Binary,
  /// Every node with its log-odds value.
  Full,
}

impl SnapshotKind {
  fn code(self) -> u32 {
    match self {
      SnapshotKind::Binary => 0,
      SnapshotKind::Full => 1,
    }
  }
}

#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
struct SnapshotHeader {
  magic: [u8; 8],
  resolution: f64,
  tree_depth: u32,
  kind: u32,
  node_count: u64,
}

pub const HEADER_SIZE: usize = std::mem::size_of::<SnapshotHeader>();

/// An encoded map.
#[derive(Clone, Debug, PartialEq)]
pub struct MapSnapshot {
  pub kind: SnapshotKind,
  pub resolution: f64,
  pub node_count: u64,
  pub bytes: Vec<u8>,
}

/// Encode `tree` with the given encoding.
pub fn encode(tree: &OccupancyOctree, kind: SnapshotKind) -> Result<MapSnapshot, SnapshotError> {
  let root = tree.root().ok_or(SnapshotError::EmptyMap)?;
  let mut body = Vec::new();
  let node_count = match kind {
    SnapshotKind::Binary => {
      let mut pruned = root.clone();
      prune_node(&mut pruned);
      if !pruned.has_children() {
        // the root is always written as an inner node
        pruned.expand();
      }
      1 + write_binary_node(&pruned, &mut body)
    }
    SnapshotKind::Full => write_full_node(root, &mut body),
  };

  let header = SnapshotHeader {
    magic: SNAPSHOT_MAGIC,
    resolution: tree.resolution(),
    tree_depth: TREE_DEPTH as u32,
    kind: kind.code(),
    node_count,
  };
  let mut bytes = Vec::with_capacity(HEADER_SIZE + body.len());
  bytes.extend_from_slice(bytemuck::bytes_of(&header));
  bytes.extend_from_slice(&body);

  Ok(MapSnapshot {
    kind,
    resolution: tree.resolution(),
    node_count,
    bytes,
  })
}

pub fn write_binary(tree: &OccupancyOctree) -> Result<MapSnapshot, SnapshotError> {
  encode(tree, SnapshotKind::Binary)
}

pub fn write_full(tree: &OccupancyOctree) -> Result<MapSnapshot, SnapshotError> {
  encode(tree, SnapshotKind::Full)
}

/// Decode a binary snapshot. Leaves take the clamping values of
/// `sensor_model`.
pub fn read_binary(bytes: &[u8], sensor_model: SensorModel) -> Result<OccupancyOctree, SnapshotError> {
  let (header, mut body) = read_header(bytes, SnapshotKind::Binary)?;
  let mut tree = OccupancyOctree::new(header.resolution, sensor_model);
  let model = *tree.log_odds_model();

  let mut root = OccupancyNode::default();
  let decoded = 1 + read_binary_node(&mut root, &mut body, &model, 0)?;
  check_count(&header, decoded)?;
  tree.set_root(Some(root));
  Ok(tree)
}

/// Decode a full snapshot.
pub fn read_full(bytes: &[u8], sensor_model: SensorModel) -> Result<OccupancyOctree, SnapshotError> {
  let (header, mut body) = read_header(bytes, SnapshotKind::Full)?;
  let mut tree = OccupancyOctree::new(header.resolution, sensor_model);
  let (root, decoded) = read_full_node(&mut body, 0)?;
  check_count(&header, decoded)?;
  tree.set_root(Some(root));
  Ok(tree)
}

// =============================================================================
// Encoding
// =============================================================================

fn prune_node(node: &mut OccupancyNode) {
  if let Some(children) = node.children_mut() {
    children.iter_mut().flatten().for_each(prune_node);
  }
  if node.is_collapsible() {
    node.collapse();
  }
}

/// Write the child bits of `node` and recurse into inner children.
/// Returns the number of child nodes written.
fn write_binary_node(node: &OccupancyNode, out: &mut Vec<u8>) -> u64 {
  let mut bits = [0u8; 2];
  let mut count = 0;
  for octant in 0..8 {
    let code = match node.child(octant) {
      None => CHILD_UNKNOWN,
      Some(child) if child.has_children() => CHILD_INNER,
      Some(child) if child.is_occupied() => CHILD_OCCUPIED,
      Some(_) => CHILD_FREE,
    };
    if code != CHILD_UNKNOWN {
      count += 1;
    }
    bits[octant / 4] |= code << ((octant % 4) * 2);
  }
  out.extend_from_slice(&bits);

  for octant in 0..8 {
    if let Some(child) = node.child(octant).filter(|c| c.has_children()) {
      count += write_binary_node(child, out);
    }
  }
  count
}

/// Write `node` and its subtree. Returns the number of nodes written.
fn write_full_node(node: &OccupancyNode, out: &mut Vec<u8>) -> u64 {
  let mut mask = 0u8;
  for octant in 0..8 {
    if node.child(octant).is_some() {
      mask |= 1 << octant;
    }
  }
  out.extend_from_slice(&node.log_odds().to_ne_bytes());
  out.push(mask);

  let mut count = 1;
  for octant in 0..8 {
    if let Some(child) = node.child(octant) {
      count += write_full_node(child, out);
    }
  }
  count
}

// =============================================================================
// Decoding
// =============================================================================

fn read_header(bytes: &[u8], expected: SnapshotKind) -> Result<(SnapshotHeader, &[u8]), SnapshotError> {
  if bytes.len() < HEADER_SIZE {
    return Err(SnapshotError::Truncated {
      needed: HEADER_SIZE,
      available: bytes.len(),
    });
  }
  let (head, body) = bytes.split_at(HEADER_SIZE);
  let header: SnapshotHeader = bytemuck::pod_read_unaligned(head);

  if header.magic != SNAPSHOT_MAGIC {
    return Err(SnapshotError::BadMagic);
  }
  if header.tree_depth != TREE_DEPTH as u32 {
    return Err(SnapshotError::UnsupportedDepth(header.tree_depth));
  }
  if header.kind != expected.code() {
    return Err(SnapshotError::KindMismatch { found: header.kind });
  }
  if !(header.resolution.is_finite() && header.resolution > 0.0) {
    return Err(SnapshotError::InvalidResolution(header.resolution));
  }
  Ok((header, body))
}

fn check_count(header: &SnapshotHeader, decoded: u64) -> Result<(), SnapshotError> {
  if decoded != header.node_count {
    return Err(SnapshotError::NodeCountMismatch {
      declared: header.node_count,
      decoded,
    });
  }
  Ok(())
}

fn take<'a>(input: &mut &'a [u8], n: usize) -> Result<&'a [u8], SnapshotError> {
  if input.len() < n {
    return Err(SnapshotError::Truncated {
      needed: n,
      available: input.len(),
    });
  }
  let (head, rest) = input.split_at(n);
  *input = rest;
  Ok(head)
}

fn read_binary_node(
  node: &mut OccupancyNode,
  input: &mut &[u8],
  model: &LogOddsModel,
  depth: u8,
) -> Result<u64, SnapshotError> {
  if depth >= TREE_DEPTH {
    return Err(SnapshotError::UnsupportedDepth(depth as u32 + 1));
  }
  let bits = take(input, 2)?;
  let codes: [u8; 8] = std::array::from_fn(|octant| (bits[octant / 4] >> ((octant % 4) * 2)) & 0b11);

  let mut count = 0;
  for (octant, &code) in codes.iter().enumerate() {
    let value = match code {
      CHILD_OCCUPIED => model.max,
      CHILD_FREE => model.min,
      CHILD_INNER => 0.0,
      _ => continue,
    };
    node.child_or_insert(octant).0.set_log_odds(value);
    count += 1;
  }

  if let Some(children) = node.children_mut() {
    for (octant, &code) in codes.iter().enumerate() {
      if code != CHILD_INNER {
        continue;
      }
      if let Some(child) = children[octant].as_mut() {
        count += read_binary_node(child, input, model, depth + 1)?;
      }
    }
  }
  if let Some(max) = node.max_child_log_odds() {
    node.set_log_odds(max);
  }
  Ok(count)
}

fn read_full_node(input: &mut &[u8], depth: u8) -> Result<(OccupancyNode, u64), SnapshotError> {
  let value_bytes = take(input, 4)?;
  let log_odds = f32::from_ne_bytes([value_bytes[0], value_bytes[1], value_bytes[2], value_bytes[3]]);
  let mask = take(input, 1)?[0];

  let mut node = OccupancyNode::new(log_odds);
  if mask != 0 && depth >= TREE_DEPTH {
    return Err(SnapshotError::UnsupportedDepth(depth as u32 + 1));
  }
  let mut count = 1;
  for octant in 0..8 {
    if mask & (1 << octant) == 0 {
      continue;
    }
    let (child, child_count) = read_full_node(input, depth + 1)?;
    *node.child_or_insert(octant).0 = child;
    count += child_count;
  }
  Ok((node, count))
}

#[cfg(test)]
#[path = "codec_test.rs"]
mod codec_test;
