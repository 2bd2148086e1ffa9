use hashbrown::{HashMap, HashSet};
use strata_mesh_cpu::ChunkMesh;
use strata_world::ChunkCoord;
use thiserror::Error;

pub type MeshHandle = u64;

/// Receives finished meshes on the main thread. A renderer uploads them; a
/// headless host just keeps count.
pub trait MeshSink {
    fn upload(&mut self, mesh: &ChunkMesh) -> MeshHandle;
    fn release(&mut self, handle: MeshHandle);
    fn set_visible(&mut self, handle: MeshHandle, visible: bool) {
        let _ = (handle, visible);
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ImportError {
    #[error("no asset named {name:?}")]
    MissingAsset { name: String },
}

/// Places an externally supplied model at a base-import site.
pub trait ImportBinder {
    fn bind(&mut self, asset: &str, origin: (i32, i32, i32)) -> Result<(), ImportError>;
}

impl<F> ImportBinder for F
where
    F: FnMut(&str, (i32, i32, i32)) -> Result<(), ImportError>,
{
    fn bind(&mut self, asset: &str, origin: (i32, i32, i32)) -> Result<(), ImportError> {
        self(asset, origin)
    }
}

/// Binder that knows no assets at all.
#[derive(Default, Debug, Clone, Copy)]
pub struct NoImports;

impl ImportBinder for NoImports {
    fn bind(&mut self, asset: &str, _origin: (i32, i32, i32)) -> Result<(), ImportError> {
        Err(ImportError::MissingAsset {
            name: asset.to_string(),
        })
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct UploadedMesh {
    pub coord: ChunkCoord,
    pub vertices: usize,
    pub triangles: usize,
    pub visible: bool,
    pub incomplete: bool,
}

/// In-memory sink for tools and tests.
#[derive(Default, Debug)]
pub struct HeadlessSink {
    next: MeshHandle,
    live: HashMap<MeshHandle, UploadedMesh>,
    pub uploads: usize,
    pub releases: usize,
    uploaded_coords: Vec<ChunkCoord>,
}

impl HeadlessSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn live(&self) -> impl Iterator<Item = &UploadedMesh> {
        self.live.values()
    }

    pub fn live_count(&self) -> usize {
        self.live.len()
    }

    pub fn mesh_for(&self, coord: ChunkCoord) -> Option<&UploadedMesh> {
        self.live.values().find(|m| m.coord == coord)
    }

    /// Every coordinate ever uploaded, in upload order.
    pub fn upload_log(&self) -> &[ChunkCoord] {
        &self.uploaded_coords
    }

    pub fn visible_coords(&self) -> HashSet<ChunkCoord> {
        self.live
            .values()
            .filter(|m| m.visible)
            .map(|m| m.coord)
            .collect()
    }
}

impl MeshSink for HeadlessSink {
    fn upload(&mut self, mesh: &ChunkMesh) -> MeshHandle {
        self.next += 1;
        self.uploads += 1;
        self.uploaded_coords.push(mesh.coord);
        self.live.insert(
            self.next,
            UploadedMesh {
                coord: mesh.coord,
                vertices: mesh.vertex_count(),
                triangles: mesh.triangle_count(),
                visible: true,
                incomplete: mesh.incomplete,
            },
        );
        self.next
    }

    fn release(&mut self, handle: MeshHandle) {
        if self.live.remove(&handle).is_some() {
            self.releases += 1;
        }
    }

    fn set_visible(&mut self, handle: MeshHandle, visible: bool) {
        if let Some(m) = self.live.get_mut(&handle) {
            m.visible = visible;
        }
    }
}
