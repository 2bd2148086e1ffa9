//! Structure descriptions produced by the sampler and consumed by the planner.

use serde::{Deserialize, Serialize};
use strata_blocks::MaterialId;

use crate::ChunkCoord;

/// A deferred voxel override, applied exactly once to the owning grid.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct PendingEdit {
    pub position: (i32, i32, i32),
    pub material: MaterialId,
}

impl PendingEdit {
    #[inline]
    pub const fn new(x: i32, y: i32, z: i32, material: MaterialId) -> Self {
        Self {
            position: (x, y, z),
            material,
        }
    }

    #[inline]
    pub fn chunk(&self) -> ChunkCoord {
        ChunkCoord::from_world(self.position.0, self.position.2)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StructureKind {
    /// Single vertical column.
    Trunk { material: MaterialId },
    /// Trunk topped with a cuboid leaf volume.
    Tree { trunk: MaterialId, leaves: MaterialId },
    /// Trunk topped with a noise-perforated leaf sphere.
    PorousTree {
        trunk: MaterialId,
        leaves: MaterialId,
        porosity: f32,
    },
    /// Solid square pillar.
    Monolith { material: MaterialId },
    /// Noise-perforated sphere resting on the surface.
    Boulder { material: MaterialId, porosity: f32 },
    /// Clears space for an externally supplied model and marks it with one sentinel voxel.
    BaseImport { sentinel: MaterialId, asset: String },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StructureSize {
    Small,
    Medium,
    Large,
}

impl StructureSize {
    pub const SMALL_MAX: f32 = 0.4;
    pub const MEDIUM_MAX: f32 = 0.6;

    /// Buckets the mean of fertility and percolation into a size category.
    pub fn bucket(fertility: f32, percolation: f32) -> Self {
        let m = (fertility + percolation) * 0.5;
        if m < Self::SMALL_MAX {
            StructureSize::Small
        } else if m < Self::MEDIUM_MAX {
            StructureSize::Medium
        } else {
            StructureSize::Large
        }
    }
}

/// Placement rule attached to a biome.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StructureDef {
    pub size: StructureSize,
    pub zone_offset: f32,
    pub zone_scale: f32,
    pub zone_threshold: f32,
    pub placement_offset: f32,
    pub placement_scale: f32,
    pub placement_threshold: f32,
    pub min_height: i32,
    pub max_height: i32,
    pub min_radius: i32,
    pub max_radius: i32,
    pub kind: StructureKind,
}

/// One queued planner invocation for a surface column.
#[derive(Clone, Debug, PartialEq)]
pub struct StructureJob {
    pub kind: StructureKind,
    pub origin: (i32, i32, i32),
    pub min_height: i32,
    pub max_height: i32,
    pub min_radius: i32,
    pub max_radius: i32,
    pub fertility: f32,
    pub habitable: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn size_buckets_use_strict_upper_bounds() {
        assert_eq!(StructureSize::bucket(0.0, 0.0), StructureSize::Small);
        assert_eq!(StructureSize::bucket(0.4, 0.4), StructureSize::Medium);
        assert_eq!(StructureSize::bucket(0.3, 0.5), StructureSize::Medium);
        assert_eq!(StructureSize::bucket(0.6, 0.6), StructureSize::Large);
        assert_eq!(StructureSize::bucket(1.0, 0.9), StructureSize::Large);
    }

    #[test]
    fn pending_edit_resolves_owning_chunk() {
        let e = PendingEdit::new(-1, 40, 17, MaterialId(3));
        assert_eq!(e.chunk(), ChunkCoord::new(-1, 1));
    }
}
