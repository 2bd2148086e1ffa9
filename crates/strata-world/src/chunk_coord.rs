use serde::{Deserialize, Serialize};

use crate::CHUNK_WIDTH;

/// Grid index of a chunk column (not world units).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ChunkCoord {
    pub cx: i32,
    pub cz: i32,
}

impl ChunkCoord {
    #[inline]
    pub const fn new(cx: i32, cz: i32) -> Self {
        Self { cx, cz }
    }

    /// Chunk containing the world voxel column `(wx, wz)`.
    #[inline]
    pub fn from_world(wx: i32, wz: i32) -> Self {
        let w = CHUNK_WIDTH as i32;
        Self {
            cx: wx.div_euclid(w),
            cz: wz.div_euclid(w),
        }
    }

    /// Chunk containing a floating-point world position (e.g. a viewer).
    #[inline]
    pub fn from_world_f32(x: f32, z: f32) -> Self {
        Self::from_world(x.floor() as i32, z.floor() as i32)
    }

    #[inline]
    pub fn offset(self, dx: i32, dz: i32) -> Self {
        Self {
            cx: self.cx + dx,
            cz: self.cz + dz,
        }
    }

    /// World x of the chunk's local origin.
    #[inline]
    pub fn base_x(self) -> i32 {
        self.cx * CHUNK_WIDTH as i32
    }

    /// World z of the chunk's local origin.
    #[inline]
    pub fn base_z(self) -> i32 {
        self.cz * CHUNK_WIDTH as i32
    }

    /// Square-ring distance used by the view/draw/undraw radii.
    #[inline]
    pub fn chebyshev(self, other: ChunkCoord) -> i32 {
        (self.cx - other.cx).abs().max((self.cz - other.cz).abs())
    }

    #[inline]
    pub fn neighbors4(self) -> [ChunkCoord; 4] {
        [
            self.offset(-1, 0),
            self.offset(1, 0),
            self.offset(0, -1),
            self.offset(0, 1),
        ]
    }
}

impl From<(i32, i32)> for ChunkCoord {
    fn from(value: (i32, i32)) -> Self {
        Self::new(value.0, value.1)
    }
}

impl From<ChunkCoord> for (i32, i32) {
    fn from(value: ChunkCoord) -> Self {
        (value.cx, value.cz)
    }
}
