//! CPU chunk mesher: face culling against neighbour transparency with
//! opaque/transparent submesh routing.
#![forbid(unsafe_code)]

mod atlas;
mod face;
mod mesh_build;

pub use atlas::{ATLAS_TILES, tile_uv};
pub use face::Face;
pub use mesh_build::{ChunkMesh, MeshBuild, MeshError, Submesh};

use strata_blocks::{MaterialId, MaterialProperties, VoxelCell};
use strata_chunk::VoxelGrid;
use strata_world::ChunkCoord;

/// What a mesher sees across a chunk border.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Neighbor {
    Cell(VoxelCell),
    /// The owning chunk is not resident yet; the face is skipped for now.
    Pending,
}

/// Resolves voxels outside the grid being meshed. Implementations must not
/// mesh the neighbour themselves, so lookups never recurse.
pub trait NeighborLookup {
    fn neighbor(&self, wx: i32, wy: i32, wz: i32) -> Neighbor;
}

impl<F> NeighborLookup for F
where
    F: Fn(i32, i32, i32) -> Neighbor,
{
    fn neighbor(&self, wx: i32, wy: i32, wz: i32) -> Neighbor {
        self(wx, wy, wz)
    }
}

/// Per-chunk seed for texture variant picks.
pub fn variant_seed(world_seed: i32, coord: ChunkCoord) -> u64 {
    let s = world_seed as u32 as u64;
    let x = coord.cx as u32 as u64;
    let z = coord.cz as u32 as u64;
    s.wrapping_mul(0x9E37_79B9_7F4A_7C15)
        ^ x.wrapping_mul(0xC2B2_AE3D_27D4_EB4F)
        ^ z.rotate_left(32)
}

pub fn build_chunk_mesh<M, N>(
    grid: &VoxelGrid,
    materials: &M,
    neighbors: &N,
    seed: u64,
) -> Result<ChunkMesh, MeshError>
where
    M: MaterialProperties + ?Sized,
    N: NeighborLookup + ?Sized,
{
    let (sx, sy, sz) = grid.dims();
    let (bx, bz) = grid.base();
    let mut rng = fastrand::Rng::with_seed(seed);
    let mut out = MeshBuild::default();
    let mut incomplete = false;

    for y in 0..sy {
        for z in 0..sz {
            for x in 0..sx {
                let here = grid.get_local(x, y, z).material;
                if !materials.is_drawn(here) {
                    continue;
                }
                let (wx, wy, wz) = (bx + x as i32, y as i32, bz + z as i32);
                for face in Face::ALL {
                    let (dx, dy, dz) = face.delta();
                    let (nx, ny, nz) = (wx + dx, wy + dy, wz + dz);
                    let there = match grid.get_world(nx, ny, nz) {
                        Some(cell) => cell.material,
                        // floor of the world is solid, sky above is open
                        None if ny < 0 => MaterialId::BARRIER,
                        None if ny >= sy as i32 => MaterialId::AIR,
                        None => match neighbors.neighbor(nx, ny, nz) {
                            Neighbor::Cell(cell) => cell.material,
                            Neighbor::Pending => {
                                incomplete = true;
                                continue;
                            }
                        },
                    };
                    if !materials.is_transparent(there) {
                        continue;
                    }
                    let submesh = if !materials.is_opaque(here)
                        || (materials.is_drawn(there) && !materials.is_opaque(there))
                    {
                        Submesh::Transparent
                    } else {
                        Submesh::Opaque
                    };
                    let variants = materials.texture_variants(here).max(1);
                    let variant = if variants > 1 {
                        rng.u8(0..variants) as u16
                    } else {
                        0
                    };
                    let tile = materials
                        .texture_index_for_face(here, face.role())
                        .wrapping_add(variant);
                    out.add_face(
                        face,
                        [wx as f32, wy as f32, wz as f32],
                        tile_uv(tile),
                        submesh,
                    );
                }
            }
        }
    }

    if incomplete {
        log::trace!(target: "mesh", "chunk {:?} meshed with pending neighbours", grid.coord);
    }
    out.finish(grid.coord, incomplete)
}
