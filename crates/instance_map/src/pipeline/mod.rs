//! Instance Mapping Pipeline
//!
//! Per-frame stages over the instance registry, parallelised with rayon.
//!
//! ```text
//! ┌────────┐     ┌───────────┐     ┌───────────┐     ┌─────────┐
//! │ Render ├────►│ Associate ├────►│ Integrate ├────►│ Extract │
//! └────────┘     └───────────┘     └───────────┘     └─────────┘
//!      │               │                 │                │
//! RenderOutput    tracked labels   IntegrationStats   GridPair
//! (labels+depth)  + class map      (indices updated)  (object + no-entry)
//! ```
//!
//! # Pipeline Stages
//!
//! 1. **Render**: Ray-casts every object index from the sensor to predict
//!    which instance each pixel should see
//! 2. **Associate**: External; maps detector labels onto registry IDs
//! 3. **Integrate**: Carves free space into the background, commits
//!    endpoints into instance indices, grows bounds and centroids
//! 4. **Extract**: Samples 32³ grids around each centroid, in the world or
//!    the sensor frame, with no-entry cells
//!
//! [`cubes`] is a read-only query for visualization and is not part of the
//! per-frame path.

pub mod types;

// Stage implementations
pub mod cubes;
pub mod extract;
pub mod integrate;
pub mod render;

// Test utilities
#[cfg(test)]
pub mod test_utils;


// Re-exports
pub use types::{GridPair, IntegrationStats, NoEntryPolicy, RenderOutput, SensorPose, VoxelGrid};

pub use cubes::{occupancy_cubes, CubeLayer, InstanceCubes};
pub use extract::{sensor_grid, sensor_grids, world_grid, world_grids};
pub use integrate::integrate;
pub use render::render;
