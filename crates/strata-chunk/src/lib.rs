//! Voxel grid storage, population and the compact chunk codec.
#![forbid(unsafe_code)]

pub mod codec;

use strata_blocks::VoxelCell;
use strata_world::{
    CHUNK_HEIGHT, CHUNK_WIDTH, ChunkCoord, GenCtx, PassCounters, PendingEdit, StructureJob,
    TerrainSampler,
};

pub use codec::{CodecError, decode, decode_with_dims, encode};

/// Dense `sx * sy * sz` cell array for one chunk column. Dimensions are fixed at construction.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VoxelGrid {
    pub coord: ChunkCoord,
    sx: usize,
    sy: usize,
    sz: usize,
    cells: Vec<VoxelCell>,
}

impl VoxelGrid {
    pub fn new(coord: ChunkCoord) -> Self {
        Self::with_dims(coord, CHUNK_WIDTH, CHUNK_HEIGHT, CHUNK_WIDTH)
    }

    pub fn with_dims(coord: ChunkCoord, sx: usize, sy: usize, sz: usize) -> Self {
        Self {
            coord,
            sx,
            sy,
            sz,
            cells: vec![VoxelCell::AIR; sx * sy * sz],
        }
    }

    /// Wraps an existing cell array; short input is padded with air.
    pub fn from_cells(
        coord: ChunkCoord,
        sx: usize,
        sy: usize,
        sz: usize,
        cells: Vec<VoxelCell>,
    ) -> Self {
        let mut cells = cells;
        cells.resize(sx * sy * sz, VoxelCell::AIR);
        Self {
            coord,
            sx,
            sy,
            sz,
            cells,
        }
    }

    #[inline]
    pub fn dims(&self) -> (usize, usize, usize) {
        (self.sx, self.sy, self.sz)
    }

    #[inline]
    pub fn idx(&self, x: usize, y: usize, z: usize) -> usize {
        (y * self.sz + z) * self.sx + x
    }

    #[inline]
    pub fn cells(&self) -> &[VoxelCell] {
        &self.cells
    }

    #[inline]
    pub fn get_local(&self, x: usize, y: usize, z: usize) -> VoxelCell {
        self.cells[self.idx(x, y, z)]
    }

    #[inline]
    pub fn set_local(&mut self, x: usize, y: usize, z: usize, cell: VoxelCell) {
        let i = self.idx(x, y, z);
        self.cells[i] = cell;
    }

    #[inline]
    pub fn base(&self) -> (i32, i32) {
        (
            self.coord.cx * self.sx as i32,
            self.coord.cz * self.sz as i32,
        )
    }

    /// Local coordinates of a world position, if this grid owns it.
    pub fn local_of(&self, wx: i32, wy: i32, wz: i32) -> Option<(usize, usize, usize)> {
        let (bx, bz) = self.base();
        let (lx, lz) = (wx - bx, wz - bz);
        if lx < 0 || lz < 0 || wy < 0 {
            return None;
        }
        let (lx, ly, lz) = (lx as usize, wy as usize, lz as usize);
        (lx < self.sx && ly < self.sy && lz < self.sz).then_some((lx, ly, lz))
    }

    #[inline]
    pub fn get_world(&self, wx: i32, wy: i32, wz: i32) -> Option<VoxelCell> {
        self.local_of(wx, wy, wz)
            .map(|(x, y, z)| self.get_local(x, y, z))
    }

    /// Writes a cell unless the target is barrier. Returns whether the grid changed.
    pub fn set_world(&mut self, wx: i32, wy: i32, wz: i32, cell: VoxelCell) -> bool {
        let Some((x, y, z)) = self.local_of(wx, wy, wz) else {
            return false;
        };
        let i = self.idx(x, y, z);
        if self.cells[i].material.is_barrier() || self.cells[i] == cell {
            return false;
        }
        self.cells[i] = cell;
        true
    }

    #[inline]
    pub fn apply_edit(&mut self, edit: &PendingEdit) -> bool {
        let (x, y, z) = edit.position;
        self.set_world(x, y, z, VoxelCell::new(edit.material))
    }

    #[inline]
    pub fn is_all_air(&self) -> bool {
        self.cells.iter().all(|c| c.material.is_air())
    }

    /// Runs the sampler over every cell and returns the structure jobs it queued.
    pub fn populate(&mut self, sampler: &TerrainSampler, ctx: &mut GenCtx) -> Vec<StructureJob> {
        let (bx, bz) = self.base();
        for z in 0..self.sz {
            for x in 0..self.sx {
                let (wx, wz) = (bx + x as i32, bz + z as i32);
                for y in 0..self.sy {
                    let material = sampler.material_at(ctx, wx, y as i32, wz);
                    let i = self.idx(x, y, z);
                    self.cells[i] = VoxelCell::new(material);
                }
            }
        }
        ctx.take_structure_jobs()
    }
}

#[derive(Clone, Debug)]
pub struct GenerateResult {
    pub grid: VoxelGrid,
    pub structure_jobs: Vec<StructureJob>,
    pub counters: PassCounters,
}

pub fn generate_chunk(sampler: &TerrainSampler, coord: ChunkCoord) -> GenerateResult {
    let mut ctx = sampler.make_gen_ctx();
    let mut grid = VoxelGrid::new(coord);
    let structure_jobs = grid.populate(sampler, &mut ctx);
    GenerateResult {
        grid,
        structure_jobs,
        counters: ctx.counters,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strata_blocks::{MaterialId, ids};

    #[test]
    fn world_positions_map_into_owning_grid() {
        let g = VoxelGrid::new(ChunkCoord::new(-1, 2));
        assert_eq!(g.local_of(-16, 0, 32), Some((0, 0, 0)));
        assert_eq!(g.local_of(-1, 95, 47), Some((15, 95, 15)));
        assert_eq!(g.local_of(0, 5, 40), None);
        assert_eq!(g.local_of(-5, 96, 40), None);
        assert_eq!(g.local_of(-5, -1, 40), None);
    }

    #[test]
    fn barrier_cells_reject_edits() {
        let mut g = VoxelGrid::new(ChunkCoord::new(0, 0));
        g.set_local(3, 0, 3, VoxelCell::new(MaterialId::BARRIER));
        assert!(!g.apply_edit(&PendingEdit::new(3, 0, 3, MaterialId(ids::DIRT))));
        assert!(g.apply_edit(&PendingEdit::new(3, 1, 3, MaterialId(ids::DIRT))));
        assert!(!g.apply_edit(&PendingEdit::new(3, 1, 3, MaterialId(ids::DIRT))));
        assert_eq!(g.get_local(3, 1, 3).material, MaterialId(ids::DIRT));
        assert!(!g.apply_edit(&PendingEdit::new(20, 1, 3, MaterialId(ids::DIRT))));
    }
}
