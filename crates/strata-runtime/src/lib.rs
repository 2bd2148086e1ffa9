//! Chunk residency, the generation worker and the per-frame scheduler.
#![forbid(unsafe_code)]

mod context;
mod scheduler;
mod settings;
mod sink;
mod store;

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;

use crossbeam_channel::{Receiver, Sender, unbounded};
use hashbrown::{HashMap, HashSet};
use rayon::{ThreadPool, ThreadPoolBuilder};
use strata_edit::affected_chunks;
use strata_io::PersistError;
use strata_mesh_cpu::{ChunkMesh, MeshError, build_chunk_mesh, variant_seed};
use strata_world::{ChunkCoord, GenCtx, PendingEdit, StructureKind};

pub use context::{ContextError, WorldContext};
pub use scheduler::{
    ChunkRenderState, ChunkState, SchedulerError, SchedulerStats, WorldScheduler,
};
pub use settings::{SchedulerSettings, SettingsError};
pub use sink::{
    HeadlessSink, ImportBinder, ImportError, MeshHandle, MeshSink, NoImports, UploadedMesh,
};
pub use store::{ChunkOrigin, ChunkStore, EditOutcome, Fetched, FlushReport};

use crate::store::lock;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Job {
    /// Load or generate a chunk, then apply the edits parked for it.
    Load { coord: ChunkCoord },
    Mesh { coord: ChunkCoord, rev: u64 },
    /// Apply queued edits without loading anything.
    ApplyPending,
    /// Write parked edits into the saved copy of a chunk that is not loading.
    WriteBack {
        coord: ChunkCoord,
        edits: Vec<PendingEdit>,
    },
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ImportRequest {
    pub asset: String,
    pub origin: (i32, i32, i32),
}

pub enum JobOut {
    Loaded {
        coord: ChunkCoord,
        origin: ChunkOrigin,
        imports: Vec<ImportRequest>,
        /// Resident chunks whose voxels changed while applying pending edits.
        touched: Vec<ChunkCoord>,
        t_total_ms: u32,
    },
    Meshed {
        coord: ChunkCoord,
        rev: u64,
        /// `None` when the chunk was evicted before the job ran.
        mesh: Option<Result<ChunkMesh, MeshError>>,
        t_mesh_ms: u32,
    },
    EditsApplied {
        touched: Vec<ChunkCoord>,
    },
    WrittenBack {
        coord: ChunkCoord,
        edits: usize,
        result: Result<usize, PersistError>,
    },
}

/// State the worker and the main thread share.
pub(crate) struct Shared {
    pub ctx: Arc<WorldContext>,
    pub store: ChunkStore,
    pub pending: Mutex<VecDeque<PendingEdit>>,
    /// Edits aimed at chunks that were not resident. The scheduler hands each
    /// entry back once its chunk is no longer loading.
    pub parked: Mutex<HashMap<ChunkCoord, Vec<PendingEdit>>>,
}

impl Shared {
    pub fn new(ctx: Arc<WorldContext>) -> Self {
        Self {
            store: ChunkStore::new(Arc::clone(&ctx)),
            ctx,
            pending: Mutex::new(VecDeque::new()),
            parked: Mutex::new(HashMap::new()),
        }
    }
}

#[inline]
fn elapsed_ms(t0: Instant) -> u32 {
    t0.elapsed().as_millis().min(u128::from(u32::MAX)) as u32
}

/// Drains the pending queue once. Edits for resident chunks are applied in
/// arrival order, edits past the world edge are dropped and the rest are
/// parked under their owning chunk.
fn apply_pending(shared: &Shared) -> Vec<ChunkCoord> {
    let queued = std::mem::take(&mut *lock(&shared.pending));
    if queued.is_empty() {
        return Vec::new();
    }
    let mut touched = HashSet::new();
    let mut park = Vec::new();
    for edit in queued {
        match shared.store.apply_edit(&edit) {
            EditOutcome::Applied => {
                let (x, _, z) = edit.position;
                touched.extend(
                    affected_chunks(x, z)
                        .into_iter()
                        .filter(|c| shared.store.is_resident(*c)),
                );
            }
            EditOutcome::NotResident => park.push(edit),
            EditOutcome::OutOfWorld => {
                let at = edit.position;
                log::debug!(target: "gen", "dropping edit past the world edge at {at:?}");
            }
            EditOutcome::Unchanged | EditOutcome::Protected => {}
        }
    }
    if !park.is_empty() {
        let mut parked = lock(&shared.parked);
        for edit in park {
            parked.entry(edit.chunk()).or_default().push(edit);
        }
    }
    let mut out: Vec<_> = touched.into_iter().collect();
    out.sort_unstable();
    out
}

fn process_job(job: Job, shared: &Shared, gen_ctx: &mut GenCtx, tx: &Sender<JobOut>) {
    let t0 = Instant::now();
    match job {
        Job::Load { coord } => {
            let fetched = shared.store.grid_or_generate(coord, gen_ctx);
            let imports = fetched
                .structure_jobs
                .iter()
                .filter_map(|sj| match &sj.kind {
                    StructureKind::BaseImport { asset, .. } => Some(ImportRequest {
                        asset: asset.clone(),
                        origin: sj.origin,
                    }),
                    _ => None,
                })
                .collect();
            if let Some(waiting) = lock(&shared.parked).remove(&coord) {
                lock(&shared.pending).extend(waiting);
            }
            let touched = apply_pending(shared);
            let _ = tx.send(JobOut::Loaded {
                coord,
                origin: fetched.origin,
                imports,
                touched,
                t_total_ms: elapsed_ms(t0),
            });
        }
        Job::Mesh { coord, rev } => {
            let mesh = shared.store.get(coord).map(|grid| {
                let lookup = |x, y, z| shared.store.lookup(x, y, z);
                build_chunk_mesh(
                    grid.as_ref(),
                    shared.ctx.materials.as_ref(),
                    &lookup,
                    variant_seed(shared.ctx.seed, coord),
                )
            });
            let _ = tx.send(JobOut::Meshed {
                coord,
                rev,
                mesh,
                t_mesh_ms: elapsed_ms(t0),
            });
        }
        Job::ApplyPending => {
            let touched = apply_pending(shared);
            let _ = tx.send(JobOut::EditsApplied { touched });
        }
        Job::WriteBack { coord, edits } => {
            if shared.store.is_resident(coord) {
                lock(&shared.pending).extend(edits);
                let touched = apply_pending(shared);
                let _ = tx.send(JobOut::EditsApplied { touched });
                return;
            }
            let result = shared.store.write_back(coord, &edits, gen_ctx);
            let _ = tx.send(JobOut::WrittenBack {
                coord,
                edits: edits.len(),
                result,
            });
        }
    }
}

/// Job queue in front of one generation worker. In cooperative mode there is
/// no worker and `pump` runs jobs on the caller's thread.
pub struct Runtime {
    shared: Arc<Shared>,
    job_tx: Sender<Job>,
    job_rx: Receiver<Job>,
    res_tx: Sender<JobOut>,
    res_rx: Receiver<JobOut>,
    _gen_pool: Option<Arc<ThreadPool>>,
    coop_ctx: Option<Mutex<GenCtx>>,
    queued: Arc<AtomicUsize>,
    inflight: Arc<AtomicUsize>,
}

impl Runtime {
    pub(crate) fn new(shared: Arc<Shared>, cooperative: bool) -> Self {
        let (job_tx, job_rx) = unbounded::<Job>();
        let (res_tx, res_rx) = unbounded::<JobOut>();
        let queued = Arc::new(AtomicUsize::new(0));
        let inflight = Arc::new(AtomicUsize::new(0));

        let (gen_pool, coop_ctx) = if cooperative {
            log::info!(target: "gen", "cooperative generation on the calling thread");
            (None, Some(Mutex::new(shared.ctx.sampler.make_gen_ctx())))
        } else {
            let pool = Arc::new(
                ThreadPoolBuilder::new()
                    .num_threads(1)
                    .thread_name(|i| format!("strata-gen-{i}"))
                    .build()
                    .expect("gen pool"),
            );
            let rx = job_rx.clone();
            let tx = res_tx.clone();
            let shared = Arc::clone(&shared);
            let q = Arc::clone(&queued);
            let inflight_ctr = Arc::clone(&inflight);
            pool.spawn(move || {
                let mut gen_ctx = shared.ctx.sampler.make_gen_ctx();
                log::debug!(target: "gen", "generation worker started");
                while let Ok(job) = rx.recv() {
                    inflight_ctr.fetch_add(1, Ordering::Relaxed);
                    q.fetch_sub(1, Ordering::Relaxed);
                    process_job(job, shared.as_ref(), &mut gen_ctx, &tx);
                    inflight_ctr.fetch_sub(1, Ordering::Relaxed);
                }
                log::debug!(target: "gen", "generation worker stopped");
            });
            (Some(pool), None)
        };

        Self {
            shared,
            job_tx,
            job_rx,
            res_tx,
            res_rx,
            _gen_pool: gen_pool,
            coop_ctx,
            queued,
            inflight,
        }
    }

    pub fn submit(&self, job: Job) {
        self.queued.fetch_add(1, Ordering::Relaxed);
        let _ = self.job_tx.send(job);
    }

    #[inline]
    pub fn is_cooperative(&self) -> bool {
        self.coop_ctx.is_some()
    }

    /// Runs up to `budget` queued jobs inline. No-op when a worker owns the queue.
    pub fn pump(&self, budget: usize) -> usize {
        let Some(ctx) = &self.coop_ctx else {
            return 0;
        };
        let mut gen_ctx = lock(ctx);
        let mut ran = 0;
        while ran < budget {
            let Ok(job) = self.job_rx.try_recv() else {
                break;
            };
            self.queued.fetch_sub(1, Ordering::Relaxed);
            process_job(job, self.shared.as_ref(), &mut gen_ctx, &self.res_tx);
            ran += 1;
        }
        ran
    }

    pub fn drain_worker_results(&self) -> Vec<JobOut> {
        self.res_rx.try_iter().collect()
    }

    #[inline]
    pub fn queue_len(&self) -> usize {
        self.queued.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn inflight(&self) -> usize {
        self.inflight.load(Ordering::Relaxed)
    }

    pub fn is_idle(&self) -> bool {
        self.queue_len() == 0 && self.inflight() == 0 && self.res_rx.is_empty()
    }
}
