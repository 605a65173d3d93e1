//! Probabilistic occupancy octree.
//!
//! One [`OccupancyOctree`] is kept per tracked instance plus one for the
//! background. Cells hold clamped log-odds values; a cell is occupied iff
//! its occupancy is above 0.5.
//!
//! # Depth Convention
//!
//! Tree depth 0 is the root, `TREE_DEPTH` (16) the finest level. Query
//! functions take depth 0 to mean "finest".
//!
//! ```text
//! Node Size = resolution * 2^(TREE_DEPTH - depth)
//! ```
//!
//! # Module Structure
//!
//! - [`key`]: `CellKey` - 16-bit per axis cell address
//! - [`sensor_model`]: `SensorModel` - hit/miss probabilities and clamping
//! - [`node`]: `OccupancyNode` - log-odds value plus optional children
//! - [`tree`]: `OccupancyOctree` - updates, search, bounds, pruning
//! - [`raycast`]: ray key traversal and first-hit ray casting
//! - [`codec`]: binary and full map snapshots

pub mod codec;
pub mod key;
pub mod node;
pub mod raycast;
pub mod sensor_model;
pub mod tree;

// Re-exports
pub use codec::{MapSnapshot, SnapshotKind};
pub use key::CellKey;
pub use node::OccupancyNode;
pub use raycast::KeyRay;
pub use sensor_model::{logodds, probability, LogOddsModel, SensorModel};
pub use tree::{Leaf, OccupancyOctree};
