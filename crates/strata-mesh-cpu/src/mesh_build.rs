use strata_world::ChunkCoord;
use thiserror::Error;

use crate::face::Face;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum MeshError {
    #[error("mesh has no triangles")]
    Empty,
    #[error("mesh arrays disagree: {positions} positions, {normals} normals, {uvs} uvs")]
    Mismatched {
        positions: usize,
        normals: usize,
        uvs: usize,
    },
}

/// Which index list a quad lands in.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Submesh {
    Opaque,
    Transparent,
}

/// Growable vertex/index buffers shared by both submeshes.
#[derive(Default, Clone, Debug)]
pub struct MeshBuild {
    pub positions: Vec<f32>,
    pub normals: Vec<f32>,
    pub uvs: Vec<f32>,
    pub opaque_indices: Vec<u32>,
    pub transparent_indices: Vec<u32>,
}

impl MeshBuild {
    #[inline]
    pub fn reserve_quads(&mut self, n_quads: usize) {
        self.positions.reserve(n_quads * 4 * 3);
        self.normals.reserve(n_quads * 4 * 3);
        self.uvs.reserve(n_quads * 4 * 2);
    }

    /// Appends one face as two triangles `(0,1,2)` and `(0,2,3)`.
    pub fn add_face(
        &mut self,
        face: Face,
        origin: [f32; 3],
        uv: (f32, f32, f32, f32),
        submesh: Submesh,
    ) {
        let base = (self.positions.len() / 3) as u32;
        let n = face.normal();
        let (u0, v0, u1, v1) = uv;
        let uvs = [(u0, v0), (u1, v0), (u1, v1), (u0, v1)];
        for (corner, (u, v)) in face.corners(origin[0], origin[1], origin[2]).into_iter().zip(uvs) {
            self.positions.extend_from_slice(&corner);
            self.normals.extend_from_slice(&n);
            self.uvs.extend_from_slice(&[u, v]);
        }
        let idx = match submesh {
            Submesh::Opaque => &mut self.opaque_indices,
            Submesh::Transparent => &mut self.transparent_indices,
        };
        idx.extend_from_slice(&[base, base + 1, base + 2, base, base + 2, base + 3]);
    }

    pub fn vertex_count(&self) -> usize {
        self.positions.len() / 3
    }

    pub fn triangle_count(&self) -> usize {
        (self.opaque_indices.len() + self.transparent_indices.len()) / 3
    }

    /// Rejects empty or inconsistent buffers before they reach a renderer.
    pub fn finish(self, coord: ChunkCoord, incomplete: bool) -> Result<ChunkMesh, MeshError> {
        let verts = self.positions.len() / 3;
        if self.positions.len() % 3 != 0
            || self.normals.len() != self.positions.len()
            || self.uvs.len() != verts * 2
        {
            return Err(MeshError::Mismatched {
                positions: self.positions.len(),
                normals: self.normals.len(),
                uvs: self.uvs.len(),
            });
        }
        if self.triangle_count() == 0 {
            return Err(MeshError::Empty);
        }
        Ok(ChunkMesh {
            coord,
            positions: self.positions,
            normals: self.normals,
            uvs: self.uvs,
            opaque_indices: self.opaque_indices,
            transparent_indices: self.transparent_indices,
            incomplete,
        })
    }
}

/// A validated chunk surface ready for upload.
#[derive(Clone, Debug, PartialEq)]
pub struct ChunkMesh {
    pub coord: ChunkCoord,
    pub positions: Vec<f32>,
    pub normals: Vec<f32>,
    pub uvs: Vec<f32>,
    pub opaque_indices: Vec<u32>,
    pub transparent_indices: Vec<u32>,
    /// Some neighbour faces were skipped because the neighbour was not resident.
    pub incomplete: bool,
}

impl ChunkMesh {
    pub fn vertex_count(&self) -> usize {
        self.positions.len() / 3
    }

    pub fn triangle_count(&self) -> usize {
        (self.opaque_indices.len() + self.transparent_indices.len()) / 3
    }
}
