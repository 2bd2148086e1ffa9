//! Voxel cell types and the material property table.
#![forbid(unsafe_code)]

pub mod material;
pub mod types;

pub use material::{
    FaceTextures, MaterialDef, MaterialProperties, MaterialTable, MaterialTableError,
};
pub use types::{FaceRole, MaterialId, VoxelCell, ids};
