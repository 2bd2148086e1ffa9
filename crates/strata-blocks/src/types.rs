use serde::{Deserialize, Serialize};

/// Index into the material table. 256 ids are addressable; the compact
/// chunk codec only supports the first 56.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MaterialId(pub u8);

impl MaterialId {
    pub const AIR: MaterialId = MaterialId(ids::AIR);
    pub const BARRIER: MaterialId = MaterialId(ids::BARRIER);

    #[inline]
    pub const fn new(id: u8) -> Self {
        Self(id)
    }

    #[inline]
    pub fn is_air(self) -> bool {
        self.0 == ids::AIR
    }

    /// Barrier cells are never replaced by gameplay edits or structure plans.
    #[inline]
    pub fn is_barrier(self) -> bool {
        self.0 == ids::BARRIER
    }
}

impl From<u8> for MaterialId {
    fn from(value: u8) -> Self {
        Self(value)
    }
}

/// Builtin material ids shipped with the default table.
pub mod ids {
    pub const AIR: u8 = 0;
    pub const BARRIER: u8 = 1;
    pub const STONE: u8 = 2;
    pub const DIRT: u8 = 3;
    pub const GRASS: u8 = 4;
    pub const SAND: u8 = 5;
    pub const WATER: u8 = 6;
    pub const LOG: u8 = 7;
    pub const LEAVES: u8 = 8;
    pub const CLOUD: u8 = 9;
    pub const COAL_ORE: u8 = 10;
    pub const IRON_ORE: u8 = 11;
    pub const GOLD_ORE: u8 = 12;
    pub const GRAVEL: u8 = 13;
    pub const SNOW: u8 = 14;
    pub const CRYSTAL: u8 = 15;
    pub const BASALT: u8 = 16;
    pub const CACTUS: u8 = 17;
    pub const IMPORT_SENTINEL: u8 = 18;
    pub const GLASS: u8 = 19;
    pub const PLANKS: u8 = 20;
    pub const MOSS: u8 = 21;
    pub const ASH: u8 = 22;
    pub const LAVA: u8 = 23;
}

/// One voxel: material plus an orientation byte set by placement edits.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct VoxelCell {
    pub material: MaterialId,
    pub orientation: u8,
}

impl VoxelCell {
    pub const AIR: VoxelCell = VoxelCell {
        material: MaterialId::AIR,
        orientation: 0,
    };

    #[inline]
    pub const fn new(material: MaterialId) -> Self {
        Self {
            material,
            orientation: 0,
        }
    }

    #[inline]
    pub const fn with_orientation(material: MaterialId, orientation: u8) -> Self {
        Self {
            material,
            orientation,
        }
    }
}

/// Which texture slot of a material a face samples from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FaceRole {
    Top,
    Bottom,
    Side,
}
