use crate::structure::StructureJob;

/// Call counts per sampler pass. Tests use these to prove short circuits.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PassCounters {
    pub voxels: u64,
    pub air_short_circuits: u64,
    pub spline_evals: u64,
    pub carve_tests: u64,
    pub lode_tests: u64,
    pub surface_tests: u64,
    pub structure_jobs: u64,
}

/// Cached per-column results, reused for every voxel of the column.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ColumnSample {
    pub x: i32,
    pub z: i32,
    pub height: i32,
    pub weirdness: f32,
    pub biome: usize,
}

/// Per-worker scratch state for the sampler. Never shared between threads.
#[derive(Debug, Default)]
pub struct GenCtx {
    pub counters: PassCounters,
    pub column: Option<ColumnSample>,
    /// Surface-object jobs found while sampling; drained by the caller.
    pub structure_jobs: Vec<StructureJob>,
}

impl GenCtx {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn take_structure_jobs(&mut self) -> Vec<StructureJob> {
        std::mem::take(&mut self.structure_jobs)
    }

    pub fn reset_counters(&mut self) {
        self.counters = PassCounters::default();
    }
}
