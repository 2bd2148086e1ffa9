//! World sizing, noise sampling, worldgen parameters and the terrain sampler.
#![forbid(unsafe_code)]

mod chunk_coord;
mod gen_ctx;
pub mod noise;
pub mod planet;
pub mod sampler;
pub mod spline;
pub mod structure;
pub mod worldgen;

pub use chunk_coord::ChunkCoord;
pub use gen_ctx::{ColumnSample, GenCtx, PassCounters};
pub use noise::NoiseField;
pub use planet::{BiomeDef, Lode, PlanetInfo, PlanetProfile};
pub use sampler::TerrainSampler;
pub use spline::{SplineCurve, SplinePoint};
pub use structure::{PendingEdit, StructureDef, StructureJob, StructureKind, StructureSize};
pub use worldgen::{ConfigError, WorldGenConfig, WorldGenParams, load_config_from_path};

/// Horizontal edge length of a chunk in voxels.
pub const CHUNK_WIDTH: usize = 16;
/// Vertical size of a chunk column in voxels.
pub const CHUNK_HEIGHT: usize = 96;
/// Voxels at the top of a column that terrain never reaches.
pub const TOP_MARGIN: usize = 16;
