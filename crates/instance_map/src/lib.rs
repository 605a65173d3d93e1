//! instance_map - Instance-segmented probabilistic occupancy mapping
//!
//! This crate maintains one sparse occupancy octree per observed object
//! instance plus one for the static background, fed by depth frames whose
//! pixels carry instance labels.
//!
//! # Features
//!
//! - **Per-instance octrees**: log-odds occupancy with clamping and pruning
//! - **Label rendering**: ray-casts the map to predict which instance each
//!   pixel should see, used for frame-to-frame association
//! - **Free-space carving**: rays carve the background; endpoints commit to
//!   the labelled instance's index
//! - **32³ object grids**: dense lattices around each object centroid in the
//!   world or sensor frame, with no-entry cells for planning
//! - **Map snapshots**: compact (pruned, lossy) and full (lossless) encodings
//!   of the background index
//!
//! # Example
//!
//! ```ignore
//! use instance_map::{MapperConfig, MappingServer, FrameInput};
//!
//! let server = MappingServer::new(MapperConfig::default())?;
//! let output = server.process_frame(&frame)?;
//!
//! for pair in &output.grids {
//!     println!("instance {} has {} occupied cells",
//!         pair.object.instance_id, pair.object.len());
//! }
//! ```

pub mod config;
pub mod constants;
pub mod error;
pub mod types;

// Re-export commonly used items
pub use config::{ClassPitch, MapperConfig};
pub use constants::{coord_to_index, index_to_coord, GRID_SIZE, GRID_SIZE_CB, GRID_SIZE_SQ};
pub use error::{ConfigError, FrameError, RenderServiceError, SnapshotError};
pub use types::{
  Aabb3, CameraIntrinsics, ClassId, ClassMap, InstanceId, LabelImage, PointImage, Timestamp, BACKGROUND,
  UNCERTAIN,
};

// Occupancy octree with ray casting and snapshot codec
pub mod octree;
pub use octree::{CellKey, MapSnapshot, OccupancyOctree, SensorModel, SnapshotKind};

// Instance registry
pub mod registry;
pub use registry::{Epoch, InstanceRecord, Registry};

// Per-frame pipeline stages
pub mod pipeline;
pub use pipeline::{GridPair, IntegrationStats, NoEntryPolicy, RenderOutput, SensorPose, VoxelGrid};

// Frame-level entry point
pub mod server;
pub use server::{
  FrameInput, FrameOutput, InstanceAssociator, MappingServer, PassthroughAssociator, RenderRequest, RenderService,
  StaticTransform, TransformSource,
};

// Metrics collection (feature-gated)
pub mod metrics;
pub use metrics::MapMetrics;
