use std::sync::Arc;
use std::time::Duration;

use crossbeam_channel::{Receiver, bounded};
use hashbrown::{HashMap, HashSet};
use rayon::{ThreadPool, ThreadPoolBuilder};
use strata_blocks::{MaterialId, VoxelCell};
use strata_edit::EditTracker;
use strata_io::{JoinPayload, PersistError, build_join_payload};
use strata_mesh_cpu::MeshError;
use strata_world::{ChunkCoord, PendingEdit};
use thiserror::Error;

use crate::settings::{SchedulerSettings, SettingsError};
use crate::sink::{ImportBinder, MeshHandle, MeshSink, NoImports};
use crate::store::{ChunkOrigin, ChunkStore, EditOutcome, FlushReport, lock};
use crate::{Job, JobOut, Runtime, Shared, WorldContext};

#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error(transparent)]
    Settings(#[from] SettingsError),
    #[error(transparent)]
    Persist(#[from] PersistError),
    #[error("join payload is for seed {seed} planet {planet}")]
    JoinMismatch { seed: i32, planet: u32 },
}

/// Residency of one chunk. Only `Resident` chunks can be evicted; a chunk
/// that is still loading finishes first.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ChunkState {
    Unloaded,
    Loading,
    Resident { active: bool },
}

/// What a renderer needs to know about a chunk.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct ChunkRenderState {
    pub in_load_range: bool,
    pub in_draw_range: bool,
    pub active: bool,
}

#[derive(Clone, Debug, Default)]
pub struct SchedulerStats {
    pub loads_requested: u64,
    pub generated: u64,
    pub restored: u64,
    pub meshes_uploaded: u64,
    pub empty_meshes: u64,
    pub stale_meshes: u64,
    pub evicted: u64,
    pub evictions_deferred: u64,
    pub imports_bound: u64,
    pub imports_missing: u64,
    /// Parked edits written into saved chunks that were not loading.
    pub edits_written_back: u64,
    /// Parked edits discarded because they had nowhere to go.
    pub edits_dropped: u64,
}

#[derive(Clone, Copy, Debug)]
struct MeshRecord {
    handle: Option<MeshHandle>,
    incomplete: bool,
}

/// Owns the per-chunk state machine, turns viewer positions into load and
/// evict decisions, and routes worker output to the mesh sink.
pub struct WorldScheduler<S: MeshSink, B: ImportBinder = NoImports> {
    ctx: Arc<WorldContext>,
    shared: Arc<Shared>,
    runtime: Runtime,
    settings: SchedulerSettings,
    states: HashMap<ChunkCoord, ChunkState>,
    meshes: HashMap<ChunkCoord, MeshRecord>,
    tracker: EditTracker,
    viewers: Vec<ChunkCoord>,
    sink: S,
    binder: B,
    io_pool: Arc<ThreadPool>,
    stats: SchedulerStats,
}

impl<S: MeshSink> WorldScheduler<S, NoImports> {
    pub fn new(
        ctx: Arc<WorldContext>,
        settings: SchedulerSettings,
        sink: S,
    ) -> Result<Self, SchedulerError> {
        Self::with_binder(ctx, settings, sink, NoImports)
    }
}

impl<S: MeshSink, B: ImportBinder> WorldScheduler<S, B> {
    pub fn with_binder(
        ctx: Arc<WorldContext>,
        settings: SchedulerSettings,
        sink: S,
        binder: B,
    ) -> Result<Self, SchedulerError> {
        settings.validate()?;
        let shared = Arc::new(Shared::new(Arc::clone(&ctx)));
        let runtime = Runtime::new(Arc::clone(&shared), settings.cooperative);
        let io_pool = Arc::new(
            ThreadPoolBuilder::new()
                .num_threads(1)
                .thread_name(|i| format!("strata-io-{i}"))
                .build()
                .expect("io pool"),
        );
        Ok(Self {
            ctx,
            shared,
            runtime,
            settings,
            states: HashMap::new(),
            meshes: HashMap::new(),
            tracker: EditTracker::new(),
            viewers: Vec::new(),
            sink,
            binder,
            io_pool,
            stats: SchedulerStats::default(),
        })
    }

    #[inline]
    pub fn context(&self) -> &WorldContext {
        &self.ctx
    }

    #[inline]
    pub fn settings(&self) -> &SchedulerSettings {
        &self.settings
    }

    #[inline]
    pub fn store(&self) -> &ChunkStore {
        &self.shared.store
    }

    #[inline]
    pub fn sink(&self) -> &S {
        &self.sink
    }

    #[inline]
    pub fn sink_mut(&mut self) -> &mut S {
        &mut self.sink
    }

    #[inline]
    pub fn stats(&self) -> &SchedulerStats {
        &self.stats
    }

    pub fn state_of(&self, coord: ChunkCoord) -> ChunkState {
        self.states.get(&coord).copied().unwrap_or(ChunkState::Unloaded)
    }

    pub fn resident(&self) -> Vec<ChunkCoord> {
        let mut v: Vec<_> = self
            .states
            .iter()
            .filter(|(_, s)| matches!(s, ChunkState::Resident { .. }))
            .map(|(c, _)| *c)
            .collect();
        v.sort_unstable();
        v
    }

    fn viewer_distance(&self, coord: ChunkCoord) -> Option<i32> {
        self.viewers.iter().map(|v| v.chebyshev(coord)).min()
    }

    pub fn render_state(&self, coord: ChunkCoord) -> ChunkRenderState {
        let d = self.viewer_distance(coord);
        ChunkRenderState {
            in_load_range: d.is_some_and(|d| d <= self.settings.load_distance),
            in_draw_range: d.is_some_and(|d| d <= self.settings.draw_distance),
            active: matches!(self.state_of(coord), ChunkState::Resident { active: true }),
        }
    }

    /// Whether a mesh job for `coord` is still outstanding at the latest revision.
    pub fn needs_mesh(&self, coord: ChunkCoord) -> bool {
        self.tracker.needs_rebuild(coord)
    }

    fn active_for(&self, d: Option<i32>) -> bool {
        !self.settings.unloads_aggressively(self.viewers.len())
            || d.is_some_and(|d| d <= self.settings.draw_distance)
    }

    /// One frame: request loads around `viewers` (world-space x, z), update
    /// activity, evict what left the undraw radius, then apply worker output.
    pub fn update(&mut self, viewers: &[(f32, f32)]) {
        if !viewers.is_empty() {
            self.viewers = viewers
                .iter()
                .map(|&(x, z)| ChunkCoord::from_world_f32(x, z))
                .collect();
            self.request_loads();
            self.refresh_residency();
        }
        if self.runtime.is_cooperative() {
            self.runtime.pump(self.settings.cooperative_budget);
        }
        self.drain();
        self.settle_parked();
    }

    fn request_loads(&mut self) {
        let r = self.settings.load_distance;
        let mut wanted: HashSet<ChunkCoord> = HashSet::new();
        for v in &self.viewers {
            for dz in -r..=r {
                for dx in -r..=r {
                    let c = v.offset(dx, dz);
                    if self.ctx.sampler.chunk_in_bounds(c) && !self.states.contains_key(&c) {
                        wanted.insert(c);
                    }
                }
            }
        }
        let mut wanted: Vec<_> = wanted.into_iter().collect();
        wanted.sort_unstable_by_key(|c| (self.viewer_distance(*c).unwrap_or(i32::MAX), *c));
        for coord in wanted {
            log::trace!(target: "sched", "{coord:?}: unloaded -> loading");
            self.states.insert(coord, ChunkState::Loading);
            self.runtime.submit(Job::Load { coord });
            self.stats.loads_requested += 1;
        }
    }

    fn refresh_residency(&mut self) {
        let mut evict = Vec::new();
        let mut flips = Vec::new();
        for (&coord, &state) in &self.states {
            let ChunkState::Resident { active } = state else {
                continue;
            };
            let d = self.viewer_distance(coord);
            if d.is_none_or(|d| d > self.settings.undraw_distance) {
                evict.push(coord);
                continue;
            }
            let want = self.active_for(d);
            if want != active {
                flips.push((coord, want));
            }
        }
        for (coord, active) in flips {
            log::trace!(target: "sched", "{coord:?}: resident active={active}");
            self.states.insert(coord, ChunkState::Resident { active });
            if let Some(h) = self.meshes.get(&coord).and_then(|m| m.handle) {
                self.sink.set_visible(h, active);
            }
        }
        evict.sort_unstable();
        for coord in evict {
            self.evict(coord);
        }
    }

    /// Flushes a modified chunk and drops it. A failed flush keeps it resident
    /// so the edits are retried on the next frame.
    fn evict(&mut self, coord: ChunkCoord) {
        if let Err(e) = self.shared.store.evict(coord) {
            log::warn!(target: "sched", "keeping {coord:?} resident, flush failed: {e}");
            self.stats.evictions_deferred += 1;
            return;
        }
        if let Some(h) = self.meshes.remove(&coord).and_then(|m| m.handle) {
            self.sink.release(h);
        }
        self.tracker.forget(coord);
        self.states.remove(&coord);
        self.stats.evicted += 1;
        log::trace!(target: "sched", "{coord:?}: resident -> unloaded");
    }

    /// Hands back edits parked for chunks that are no longer loading. With a
    /// save root they are written into the saved chunk, otherwise dropped.
    /// Parked edits therefore never outlive the load they waited on.
    fn settle_parked(&mut self) {
        let mut settled: Vec<(ChunkCoord, Vec<PendingEdit>)> = {
            let mut parked = lock(&self.shared.parked);
            if parked.is_empty() {
                return;
            }
            let ready: Vec<ChunkCoord> = parked
                .keys()
                .copied()
                .filter(|c| self.state_of(*c) != ChunkState::Loading)
                .collect();
            ready
                .into_iter()
                .filter_map(|c| parked.remove(&c).map(|edits| (c, edits)))
                .collect()
        };
        settled.sort_unstable_by_key(|(c, _)| *c);
        for (coord, edits) in settled {
            if self.shared.store.is_resident(coord) {
                lock(&self.shared.pending).extend(edits);
                self.runtime.submit(Job::ApplyPending);
            } else if self.ctx.save.is_some() {
                let n = edits.len();
                log::debug!(target: "sched", "{coord:?}: writing back {n} parked edits");
                self.runtime.submit(Job::WriteBack { coord, edits });
            } else {
                log::warn!(
                    target: "sched",
                    "dropping {} edits for unloaded {coord:?}: no save root",
                    edits.len()
                );
                self.stats.edits_dropped += edits.len() as u64;
            }
        }
    }

    /// Every face neighbour is resident or lies past the world edge.
    fn borders_ready(&self, coord: ChunkCoord) -> bool {
        coord.neighbors4().into_iter().all(|n| {
            !self.ctx.sampler.chunk_in_bounds(n) || self.shared.store.is_resident(n)
        })
    }

    fn queue_mesh(&mut self, coord: ChunkCoord) {
        if !matches!(self.state_of(coord), ChunkState::Resident { .. }) {
            return;
        }
        let rev = self.tracker.bump(coord);
        self.runtime.submit(Job::Mesh { coord, rev });
    }

    /// Applies everything the worker has finished. Returns how many results were handled.
    pub fn drain(&mut self) -> usize {
        let results = self.runtime.drain_worker_results();
        let n = results.len();
        for out in results {
            match out {
                JobOut::Loaded {
                    coord,
                    origin,
                    imports,
                    touched,
                    t_total_ms,
                } => {
                    let active = self.active_for(self.viewer_distance(coord));
                    self.states.insert(coord, ChunkState::Resident { active });
                    match origin {
                        ChunkOrigin::Generated => self.stats.generated += 1,
                        ChunkOrigin::Disk | ChunkOrigin::Joined => self.stats.restored += 1,
                    }
                    log::trace!(
                        target: "sched",
                        "{coord:?}: loading -> resident ({origin:?}, {t_total_ms}ms)"
                    );
                    for req in imports {
                        match self.binder.bind(&req.asset, req.origin) {
                            Ok(()) => self.stats.imports_bound += 1,
                            Err(e) => {
                                log::warn!(target: "sched", "base import at {:?}: {e}", req.origin);
                                self.stats.imports_missing += 1;
                            }
                        }
                    }
                    let mut remesh: Vec<ChunkCoord> = vec![coord];
                    remesh.extend(touched);
                    remesh.extend(coord.neighbors4().into_iter().filter(|n| {
                        self.meshes.get(n).is_some_and(|m| m.incomplete)
                    }));
                    remesh.sort_unstable();
                    remesh.dedup();
                    for c in remesh {
                        self.queue_mesh(c);
                    }
                }
                JobOut::Meshed {
                    coord,
                    rev,
                    mesh,
                    t_mesh_ms,
                } => {
                    if !self.tracker.is_current(coord, rev) {
                        self.stats.stale_meshes += 1;
                        continue;
                    }
                    let ChunkState::Resident { active } = self.state_of(coord) else {
                        continue;
                    };
                    let Some(mesh) = mesh else {
                        continue;
                    };
                    let old = self.meshes.remove(&coord).and_then(|m| m.handle);
                    match mesh {
                        Ok(mesh) => {
                            if let Some(h) = old {
                                self.sink.release(h);
                            }
                            let h = self.sink.upload(&mesh);
                            self.sink.set_visible(h, active);
                            self.meshes.insert(
                                coord,
                                MeshRecord {
                                    handle: Some(h),
                                    incomplete: mesh.incomplete,
                                },
                            );
                            self.stats.meshes_uploaded += 1;
                            log::trace!(
                                target: "sched",
                                "{coord:?}: mesh rev {rev} {} tris in {t_mesh_ms}ms",
                                mesh.triangle_count()
                            );
                            if mesh.incomplete && self.borders_ready(coord) {
                                // neighbours arrived while this mesh was in flight
                                self.tracker.mark_built(coord, rev);
                                self.queue_mesh(coord);
                                continue;
                            }
                        }
                        Err(MeshError::Empty) => {
                            if let Some(h) = old {
                                self.sink.release(h);
                            }
                            self.meshes.insert(
                                coord,
                                MeshRecord {
                                    handle: None,
                                    incomplete: false,
                                },
                            );
                            self.stats.empty_meshes += 1;
                        }
                        Err(e) => {
                            log::error!(target: "sched", "{coord:?}: mesh build failed: {e}");
                            if let Some(h) = old {
                                self.meshes.insert(
                                    coord,
                                    MeshRecord {
                                        handle: Some(h),
                                        incomplete: true,
                                    },
                                );
                            }
                        }
                    }
                    self.tracker.mark_built(coord, rev);
                }
                JobOut::EditsApplied { touched } => {
                    for c in touched {
                        self.queue_mesh(c);
                    }
                }
                JobOut::WrittenBack {
                    coord,
                    edits,
                    result,
                } => match result {
                    Ok(changed) => {
                        log::trace!(
                            target: "sched",
                            "{coord:?}: {changed} of {edits} edits written back"
                        );
                        self.stats.edits_written_back += changed as u64;
                    }
                    Err(e) => {
                        log::warn!(
                            target: "sched",
                            "{coord:?}: dropping {edits} edits, write-back failed: {e}"
                        );
                        self.stats.edits_dropped += edits as u64;
                    }
                },
            }
        }
        n
    }

    /// Writes one voxel of a resident chunk immediately and schedules remeshes
    /// for the owner and any border neighbour. Later writes to the same voxel win.
    pub fn edit_voxel(&mut self, wx: i32, wy: i32, wz: i32, material: MaterialId) -> EditOutcome {
        let outcome = self
            .shared
            .store
            .set_voxel(wx, wy, wz, VoxelCell::new(material));
        if outcome == EditOutcome::Applied {
            let (_, affected) = self.tracker.bump_region_around(wx, wz);
            for c in affected {
                if matches!(self.state_of(c), ChunkState::Resident { .. }) {
                    let rev = self.tracker.get_rev(c);
                    self.runtime.submit(Job::Mesh { coord: c, rev });
                }
            }
        }
        outcome
    }

    /// Defers a player edit to the worker, e.g. one that arrived over the network.
    pub fn queue_edit(&self, edit: PendingEdit) {
        lock(&self.shared.pending).push_back(edit);
        self.runtime.submit(Job::ApplyPending);
    }

    /// Seeds the store from a host's join payload before normal loading.
    pub fn apply_join_payload(&mut self, payload: JoinPayload) -> Result<usize, SchedulerError> {
        if payload.seed != self.ctx.seed || i64::from(payload.planet) != self.ctx.planet.planet {
            return Err(SchedulerError::JoinMismatch {
                seed: payload.seed,
                planet: payload.planet,
            });
        }
        let n = payload.chunks.len();
        for grid in payload.chunks {
            let coord = grid.coord;
            self.shared.store.insert(grid, ChunkOrigin::Joined);
            self.queue_mesh(coord);
        }
        log::info!(target: "sched", "seeded {n} chunks from join payload");
        Ok(n)
    }

    /// Payload for a joining participant: every modified resident chunk plus
    /// every chunk persisted on disk.
    pub fn join_payload(&self) -> Result<String, SchedulerError> {
        let mut grids: Vec<_> = self
            .shared
            .store
            .modified_grids()
            .iter()
            .map(|g| g.as_ref().clone())
            .collect();
        if let Some(save) = &self.ctx.save {
            let have: HashSet<_> = grids.iter().map(|g| g.coord).collect();
            for coord in save.list_chunks()? {
                if have.contains(&coord) {
                    continue;
                }
                match save.load_chunk(coord) {
                    Ok(Some(g)) => grids.push(g),
                    Ok(None) => {}
                    Err(e) => {
                        log::warn!(target: "io", "skipping chunk {coord:?} in join payload: {e}")
                    }
                }
            }
        }
        grids.sort_unstable_by_key(|g| g.coord);
        Ok(build_join_payload(
            self.ctx.seed,
            self.ctx.planet.planet as u32,
            grids.iter(),
        )?)
    }

    /// Fire-and-forget flush on the io thread. The receiver yields one report.
    pub fn save(&self) -> Receiver<FlushReport> {
        let (tx, rx) = bounded(1);
        let shared = Arc::clone(&self.shared);
        self.io_pool.spawn(move || {
            let _ = tx.send(flush_all(&shared));
        });
        rx
    }

    pub fn save_blocking(&self) -> FlushReport {
        flush_all(&self.shared)
    }

    /// No chunk is loading and the worker has nothing queued or unread.
    pub fn is_idle(&self) -> bool {
        !self.states.values().any(|s| *s == ChunkState::Loading)
            && self.runtime.is_idle()
            && lock(&self.shared.pending).is_empty()
            && lock(&self.shared.parked).is_empty()
    }

    /// Runs frames until idle or `max_frames` elapse. Returns whether it went idle.
    pub fn run_until_idle(&mut self, viewers: &[(f32, f32)], max_frames: usize) -> bool {
        for _ in 0..max_frames {
            self.update(viewers);
            if self.is_idle() {
                return true;
            }
            if !self.runtime.is_cooperative() {
                std::thread::sleep(Duration::from_millis(1));
            }
        }
        self.is_idle()
    }
}

fn flush_all(shared: &Shared) -> FlushReport {
    if let Some(save) = &shared.ctx.save {
        if let Err(e) = save.save_meta(&shared.ctx.meta()) {
            log::warn!(target: "io", "failed to write world metadata: {e}");
        }
    }
    let report = shared.store.flush();
    log::debug!(target: "io", "flushed {} chunks", report.written.len());
    report
}
