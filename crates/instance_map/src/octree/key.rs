//! CellKey - discrete address of a finest-depth octree cell.
//!
//! Keys are 16 bits per axis. The tree is addressed top-down: at depth `d`
//! (root = 0) the child octant is selected by bit `TREE_DEPTH - 1 - d` of
//! each axis.

use crate::constants::TREE_DEPTH;

/// Finest-depth cell address.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, PartialOrd, Ord)]
pub struct CellKey {
  pub x: u16,
  pub y: u16,
  pub z: u16,
}

impl CellKey {
  pub fn new(x: u16, y: u16, z: u16) -> Self {
    Self { x, y, z }
  }

  /// Component along `axis` (0 = X, 1 = Y, 2 = Z).
  #[inline]
  pub fn axis(&self, axis: usize) -> u16 {
    match axis {
      0 => self.x,
      1 => self.y,
      _ => self.z,
    }
  }

  /// Octant of the child containing this key when descending from `depth`.
  ///
  /// Octant bits: X (bit 0), Y (bit 1), Z (bit 2).
  #[inline]
  pub fn child_index(&self, depth: u8) -> usize {
    debug_assert!(depth < TREE_DEPTH);
    let bit = TREE_DEPTH - 1 - depth;
    let cx = ((self.x >> bit) & 1) as usize;
    let cy = ((self.y >> bit) & 1) as usize;
    let cz = ((self.z >> bit) & 1) as usize;
    cx | (cy << 1) | (cz << 2)
  }

  /// Minimum-corner key of the ancestor node at `depth`.
  #[inline]
  pub fn at_depth(&self, depth: u8) -> CellKey {
    if depth >= TREE_DEPTH {
      return *self;
    }
    let shift = TREE_DEPTH - depth;
    // Shifting a u16 by 16 overflows, handle the root separately.
    if shift >= 16 {
      return CellKey::new(0, 0, 0);
    }
    let mask = !((1u16 << shift) - 1);
    CellKey::new(self.x & mask, self.y & mask, self.z & mask)
  }

  /// Minimum-corner key of the child `octant` of a node at `depth` whose
  /// minimum corner is `self`.
  #[inline]
  pub fn child_key(&self, octant: usize, depth: u8) -> CellKey {
    debug_assert!(depth < TREE_DEPTH);
    let half = 1u16 << (TREE_DEPTH - 1 - depth);
    CellKey::new(
      self.x + if octant & 1 != 0 { half } else { 0 },
      self.y + if octant & 2 != 0 { half } else { 0 },
      self.z + if octant & 4 != 0 { half } else { 0 },
    )
  }

  /// Neighbouring key, or `None` when it falls outside the key range.
  pub fn offset(&self, dx: i32, dy: i32, dz: i32) -> Option<CellKey> {
    let shift = |v: u16, d: i32| u16::try_from(v as i32 + d).ok();
    Some(CellKey::new(
      shift(self.x, dx)?,
      shift(self.y, dy)?,
      shift(self.z, dz)?,
    ))
  }
}

#[cfg(test)]
#[path = "key_test.rs"]
mod key_test;
