use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use hashbrown::HashMap;
use strata_blocks::{MaterialId, VoxelCell};
use strata_chunk::VoxelGrid;
use strata_edit::ModifiedSet;
use strata_io::{PersistError, SaveRoot};
use strata_mesh_cpu::Neighbor;
use strata_structures::edits_for_chunk;
use strata_world::{ChunkCoord, GenCtx, PendingEdit, StructureJob};

use crate::context::WorldContext;

/// Where a resident grid came from.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ChunkOrigin {
    Generated,
    Disk,
    Joined,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum EditOutcome {
    Applied,
    Unchanged,
    /// The target voxel is barrier and immutable.
    Protected,
    NotResident,
    /// The owning chunk lies past the world edge.
    OutOfWorld,
}

pub struct Fetched {
    pub grid: Arc<VoxelGrid>,
    pub origin: ChunkOrigin,
    /// Jobs this chunk queued itself; only set when it was freshly generated.
    pub structure_jobs: Vec<StructureJob>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FlushReport {
    pub written: Vec<ChunkCoord>,
    pub failed: Vec<(ChunkCoord, String)>,
}

impl FlushReport {
    #[inline]
    pub fn is_ok(&self) -> bool {
        self.failed.is_empty()
    }
}

struct Entry {
    grid: Arc<VoxelGrid>,
    origin: ChunkOrigin,
}

/// Resident grids keyed by coordinate. Grids are shared as `Arc` snapshots;
/// a write clones a grid only while a mesher or flusher still holds the old one.
///
/// Every chunk file write happens under `io`. Lock order is `io`, then
/// `grids`, then `modified`.
pub struct ChunkStore {
    ctx: Arc<WorldContext>,
    grids: RwLock<HashMap<ChunkCoord, Entry>>,
    modified: Mutex<ModifiedSet>,
    io: Mutex<()>,
}

pub(crate) fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

impl ChunkStore {
    pub fn new(ctx: Arc<WorldContext>) -> Self {
        Self {
            ctx,
            grids: RwLock::new(HashMap::new()),
            modified: Mutex::new(ModifiedSet::new()),
            io: Mutex::new(()),
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<ChunkCoord, Entry>> {
        self.grids.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<ChunkCoord, Entry>> {
        self.grids.write().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn get(&self, coord: ChunkCoord) -> Option<Arc<VoxelGrid>> {
        self.read().get(&coord).map(|e| Arc::clone(&e.grid))
    }

    pub fn origin(&self, coord: ChunkCoord) -> Option<ChunkOrigin> {
        self.read().get(&coord).map(|e| e.origin)
    }

    #[inline]
    pub fn is_resident(&self, coord: ChunkCoord) -> bool {
        self.read().contains_key(&coord)
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    /// Voxel lookup for meshing across a border. Never generates or meshes:
    /// a chunk that is not resident reads as pending, past the world edge is air.
    pub fn lookup(&self, wx: i32, wy: i32, wz: i32) -> Neighbor {
        let coord = ChunkCoord::from_world(wx, wz);
        if !self.ctx.sampler.chunk_in_bounds(coord) {
            return Neighbor::Cell(VoxelCell::AIR);
        }
        match self.read().get(&coord) {
            Some(e) => e
                .grid
                .get_world(wx, wy, wz)
                .map_or(Neighbor::Cell(VoxelCell::AIR), Neighbor::Cell),
            None => Neighbor::Pending,
        }
    }

    pub fn material_at(&self, wx: i32, wy: i32, wz: i32) -> Option<MaterialId> {
        let coord = ChunkCoord::from_world(wx, wz);
        self.read()
            .get(&coord)
            .and_then(|e| e.grid.get_world(wx, wy, wz))
            .map(|c| c.material)
    }

    /// Cache, then disk, then the sampler. A malformed save file is logged and
    /// regenerated over. Structure jobs are only returned for fresh generation.
    pub fn grid_or_generate(&self, coord: ChunkCoord, gen_ctx: &mut GenCtx) -> Fetched {
        if let Some(e) = self.read().get(&coord) {
            return Fetched {
                grid: Arc::clone(&e.grid),
                origin: e.origin,
                structure_jobs: Vec::new(),
            };
        }

        let (grid, origin, mut structure_jobs) = match self.load_from_disk(coord) {
            Some(g) => (g, ChunkOrigin::Disk, Vec::new()),
            None => {
                let (g, jobs) = self.generate(coord, gen_ctx);
                (g, ChunkOrigin::Generated, jobs)
            }
        };

        let mut map = self.write();
        let mut inserted = false;
        let entry = map.entry(coord).or_insert_with(|| {
            inserted = true;
            Entry {
                grid: Arc::new(grid),
                origin,
            }
        });
        if !inserted {
            // another caller got there first; its grid stands
            structure_jobs.clear();
        }
        Fetched {
            grid: Arc::clone(&entry.grid),
            origin: entry.origin,
            structure_jobs,
        }
    }

    /// Populates a grid and bakes in every structure voxel that lands in it,
    /// including those grown by neighbours. The result depends only on the
    /// seed and coordinate, so an evicted chunk regenerates identically.
    pub fn generate(
        &self,
        coord: ChunkCoord,
        gen_ctx: &mut GenCtx,
    ) -> (VoxelGrid, Vec<StructureJob>) {
        let mut grid = VoxelGrid::new(coord);
        gen_ctx.reset_counters();
        let jobs = grid.populate(&self.ctx.sampler, gen_ctx);
        log::trace!(
            target: "gen",
            "generated {coord:?}: {} voxels, {} air short-circuits, {} structure jobs",
            gen_ctx.counters.voxels,
            gen_ctx.counters.air_short_circuits,
            jobs.len()
        );
        let edits = edits_for_chunk(&self.ctx.sampler, gen_ctx, coord, &jobs);
        let baked = edits.iter().filter(|e| write_unprotected(&mut grid, e)).count();
        log::trace!(target: "gen", "{coord:?}: baked {baked} of {} structure voxels", edits.len());
        (grid, jobs)
    }

    fn load_from_disk(&self, coord: ChunkCoord) -> Option<VoxelGrid> {
        let save = self.ctx.save.as_ref()?;
        match save.load_chunk(coord) {
            Ok(found) => found,
            Err(e) => {
                log::warn!(target: "io", "discarding unreadable chunk {coord:?}: {e}");
                None
            }
        }
    }

    /// Inserts or replaces a grid. Joined grids are marked modified so they persist locally.
    pub fn insert(&self, grid: VoxelGrid, origin: ChunkOrigin) {
        let coord = grid.coord;
        self.write().insert(
            coord,
            Entry {
                grid: Arc::new(grid),
                origin,
            },
        );
        if origin == ChunkOrigin::Joined {
            lock(&self.modified).mark(coord);
        }
    }

    /// Drops a grid, writing it first when it is modified and a save root
    /// exists. On a failed write the grid stays resident and marked. Holds
    /// the grid map for the whole write so no edit lands in between.
    pub fn evict(&self, coord: ChunkCoord) -> Result<bool, PersistError> {
        let _io = lock(&self.io);
        let mut map = self.write();
        if let (Some(save), Some(e)) = (self.ctx.save.as_ref(), map.get(&coord))
            && lock(&self.modified).contains(coord)
        {
            save.save_chunk(&e.grid)?;
        }
        let removed = map.remove(&coord).is_some();
        if lock(&self.modified).forget(coord) && self.ctx.save.is_none() {
            log::debug!(target: "io", "dropping edits to {coord:?}: no save root");
        }
        Ok(removed)
    }

    /// Direct write from the main thread. Marks the owner modified when the cell changed.
    pub fn set_voxel(&self, wx: i32, wy: i32, wz: i32, cell: VoxelCell) -> EditOutcome {
        let coord = ChunkCoord::from_world(wx, wz);
        if !self.ctx.sampler.chunk_in_bounds(coord) {
            return EditOutcome::OutOfWorld;
        }
        let mut map = self.write();
        let Some(entry) = map.get_mut(&coord) else {
            return EditOutcome::NotResident;
        };
        let Some(current) = entry.grid.get_world(wx, wy, wz) else {
            return EditOutcome::Unchanged;
        };
        if current.material.is_barrier() {
            return EditOutcome::Protected;
        }
        if current == cell {
            return EditOutcome::Unchanged;
        }
        Arc::make_mut(&mut entry.grid).set_world(wx, wy, wz, cell);
        lock(&self.modified).mark(coord);
        EditOutcome::Applied
    }

    #[inline]
    pub fn apply_edit(&self, edit: &PendingEdit) -> EditOutcome {
        let (x, y, z) = edit.position;
        self.set_voxel(x, y, z, VoxelCell::new(edit.material))
    }

    /// Applies edits to a chunk that is not resident. The saved grid, or a
    /// freshly generated one, is edited and written straight back. Returns
    /// how many voxels changed; nothing is written when none did.
    pub fn write_back(
        &self,
        coord: ChunkCoord,
        edits: &[PendingEdit],
        gen_ctx: &mut GenCtx,
    ) -> Result<usize, PersistError> {
        let Some(save) = self.ctx.save.as_ref() else {
            return Ok(0);
        };
        let mut grid = match self.load_from_disk(coord) {
            Some(g) => g,
            None => self.generate(coord, gen_ctx).0,
        };
        let changed = edits.iter().filter(|e| write_unprotected(&mut grid, e)).count();
        if changed > 0 {
            let _io = lock(&self.io);
            save.save_chunk(&grid)?;
        }
        Ok(changed)
    }

    #[inline]
    pub fn is_modified(&self, coord: ChunkCoord) -> bool {
        lock(&self.modified).contains(coord)
    }

    pub fn modified_count(&self) -> usize {
        lock(&self.modified).len()
    }

    /// Grids that differ from their generated baseline.
    pub fn modified_grids(&self) -> Vec<Arc<VoxelGrid>> {
        let snapshot = lock(&self.modified).snapshot();
        let map = self.read();
        snapshot
            .into_iter()
            .filter_map(|(c, _)| map.get(&c).map(|e| Arc::clone(&e.grid)))
            .collect()
    }

    /// Writes one chunk if it is modified. Reads the stamp and grid under the
    /// io lock, so a concurrent eviction either wrote this chunk already or
    /// has not started.
    fn write_modified(&self, save: &SaveRoot, coord: ChunkCoord) -> Result<bool, PersistError> {
        let _io = lock(&self.io);
        let Some(stamp) = lock(&self.modified).stamp(coord) else {
            return Ok(false);
        };
        let Some(grid) = self.get(coord) else {
            return Ok(false);
        };
        save.save_chunk(&grid)?;
        lock(&self.modified).clear_if_unchanged(coord, stamp);
        Ok(true)
    }

    /// Writes every chunk that was modified when the flush started. Entries
    /// that fail stay marked, as do entries edited again while the flush ran.
    pub fn flush(&self) -> FlushReport {
        let mut report = FlushReport::default();
        let Some(save) = self.ctx.save.as_ref() else {
            return report;
        };
        let snapshot = lock(&self.modified).snapshot();
        for (coord, _) in snapshot {
            match self.write_modified(save, coord) {
                Ok(true) => report.written.push(coord),
                Ok(false) => {}
                Err(e) => {
                    if matches!(e, PersistError::Codec(_)) {
                        log::error!(target: "io", "chunk {coord:?} cannot be encoded: {e}");
                    }
                    report.failed.push((coord, e.to_string()));
                }
            }
        }
        if !report.failed.is_empty() {
            log::warn!(
                target: "io",
                "flush left {} of {} chunks unsaved",
                report.failed.len(),
                report.failed.len() + report.written.len()
            );
        }
        report
    }
}

/// Structure and write-back edits never replace barrier.
fn write_unprotected(grid: &mut VoxelGrid, edit: &PendingEdit) -> bool {
    let (x, y, z) = edit.position;
    match grid.get_world(x, y, z) {
        Some(c) if !c.material.is_barrier() && c.material != edit.material => {
            grid.apply_edit(edit)
        }
        _ => false,
    }
}
