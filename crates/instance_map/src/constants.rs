//! Layout constants for the 32³ instance grids and the occupancy octree.
//!
//! # Grid Layout
//!
//! Every extracted grid is a dense 32×32×32 lattice, stored sparsely as
//! (flattened index, occupancy) pairs.
//!
//! ```text
//! Lattice index:  0     1     2    ...    15    16   ...    31
//!                 │                        │     │           │
//!                 origin            centroid lies between    last
//!                                   15 and 16 on every axis
//!
//! origin = centroid - (GRID_SIZE / 2 - 0.5) * pitch
//! ```
//!
//! # Memory Layout
//!
//! ```text
//! index = i << 10 | j << 5 | k
//!       = i * 1024 + j * 32 + k
//!
//! i = X (slowest), j = Y, k = Z (fastest)
//! ```
//!
//! # Octree Keys
//!
//! Cell keys are 16 bits per axis. Key `KEY_CENTER` maps to the cell whose
//! minimum corner is the world origin, so the addressable range per axis is
//! `[-KEY_CENTER, KEY_CENTER) * resolution`.

/// Number of lattice cells per grid axis (must be 32 for bit-shift indexing)
pub const GRID_SIZE: usize = 32;

/// Grid cells squared (32² = 1024)
pub const GRID_SIZE_SQ: usize = GRID_SIZE * GRID_SIZE;

/// Total lattice positions in a grid (32³ = 32768)
pub const GRID_SIZE_CB: usize = GRID_SIZE * GRID_SIZE * GRID_SIZE;

/// Bit shift for Y coordinate indexing (log2(32) = 5)
pub const Y_SHIFT: u32 = 5;

/// Bit shift for X coordinate indexing (log2(1024) = 10)
pub const X_SHIFT: u32 = 10;

/// Mask for extracting single axis from index (0x1F = 31)
pub const INDEX_MASK: usize = 0x1F;

/// Lattice offset of the centroid from the grid origin, in cells.
pub const GRID_CENTER_OFFSET: f64 = GRID_SIZE as f64 / 2.0 - 0.5;

/// Octree depth. Depth `TREE_DEPTH` is the finest level.
pub const TREE_DEPTH: u8 = 16;

/// Key of the cell whose minimum corner sits at the world origin.
pub const KEY_CENTER: u32 = 1 << (TREE_DEPTH - 1);

/// Number of keys per axis (2^16).
pub const KEY_RANGE: u32 = 1 << TREE_DEPTH;

/// Stride used when subsampling image pixels for rendering and integration.
pub const PIXEL_STRIDE: usize = 2;

/// Convert 3D lattice coordinates to a flattened index using bit shifts.
///
/// Layout: X is major axis (stride 1024), Y is middle (stride 32), Z is minor
/// (stride 1)
#[inline(always)]
pub const fn coord_to_index(x: usize, y: usize, z: usize) -> usize {
  (x << X_SHIFT) | (y << Y_SHIFT) | z
}

/// Convert a flattened index back to lattice coordinates.
#[inline(always)]
pub const fn index_to_coord(idx: usize) -> (usize, usize, usize) {
  let x = idx >> X_SHIFT;
  let y = (idx >> Y_SHIFT) & INDEX_MASK;
  let z = idx & INDEX_MASK;
  (x, y, z)
}

#[cfg(test)]
#[path = "constants_test.rs"]
mod constants_test;
