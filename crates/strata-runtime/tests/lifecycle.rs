use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use strata_blocks::{MaterialId, MaterialTable, ids};
use strata_io::{SaveRoot, parse_join_payload};
use strata_runtime::{
    ChunkOrigin, ChunkState, EditOutcome, HeadlessSink, SchedulerError, SchedulerSettings,
    WorldContext, WorldScheduler,
};
use strata_world::{
    ChunkCoord, PendingEdit, SplineCurve, StructureDef, StructureKind, StructureSize,
    WorldGenConfig,
};

static NEXT: AtomicUsize = AtomicUsize::new(0);

struct TempDir(PathBuf);

impl TempDir {
    fn new() -> Self {
        let n = NEXT.fetch_add(1, Ordering::Relaxed);
        let p = std::env::temp_dir().join(format!("strata-runtime-{}-{n}", std::process::id()));
        let _ = std::fs::remove_dir_all(&p);
        Self(p)
    }
}

impl Drop for TempDir {
    fn drop(&mut self) {
        let _ = std::fs::remove_dir_all(&self.0);
    }
}

const SEED: i32 = 1234;
const PLANET: u32 = 3;
const CENTER: (f32, f32) = (8.0, 8.0);

fn context(save: Option<SaveRoot>) -> Arc<WorldContext> {
    context_with(SEED, &WorldGenConfig::default(), save)
}

fn context_with(seed: i32, cfg: &WorldGenConfig, save: Option<SaveRoot>) -> Arc<WorldContext> {
    Arc::new(
        WorldContext::new(seed, PLANET, cfg, Arc::new(MaterialTable::builtin()), save, false)
            .unwrap(),
    )
}

/// Flat ground with a tree on every column, so leaves cross every border.
fn forest_config() -> WorldGenConfig {
    let mut cfg = WorldGenConfig::default();
    for layer in [
        &mut cfg.height.continentalness,
        &mut cfg.height.erosion,
        &mut cfg.height.peaks_valleys,
    ] {
        layer.spline = SplineCurve::constant(0.5);
    }
    cfg.carve.density_threshold = 1.0;
    let tree = |size| StructureDef {
        size,
        zone_offset: 0.0,
        zone_scale: 1.0,
        zone_threshold: -1.0,
        placement_offset: 0.0,
        placement_scale: 1.0,
        placement_threshold: -1.0,
        min_height: 4,
        max_height: 4,
        min_radius: 2,
        max_radius: 2,
        kind: StructureKind::Tree {
            trunk: MaterialId(ids::LOG),
            leaves: MaterialId(ids::LEAVES),
        },
    };
    for biome in &mut cfg.biomes.habitable {
        biome.living = true;
        biome.structures = vec![
            tree(StructureSize::Small),
            tree(StructureSize::Medium),
            tree(StructureSize::Large),
        ];
    }
    cfg
}

fn settings(draw: i32, load: i32, undraw: i32) -> SchedulerSettings {
    SchedulerSettings {
        draw_distance: draw,
        load_distance: load,
        undraw_distance: undraw,
        cooperative: true,
        cooperative_budget: 64,
        ..SchedulerSettings::default()
    }
}

fn scheduler(save: Option<SaveRoot>, s: SchedulerSettings) -> WorldScheduler<HeadlessSink> {
    WorldScheduler::new(context(save), s, HeadlessSink::new()).unwrap()
}

#[test]
fn cooperative_frames_load_and_mesh_the_load_radius() {
    let mut w = scheduler(None, settings(1, 1, 2));
    assert!(w.run_until_idle(&[CENTER], 100));
    assert_eq!(w.resident().len(), 9);
    assert_eq!(w.sink().live_count(), 9);
    let center = w.sink().mesh_for(ChunkCoord::new(0, 0)).unwrap();
    assert!(!center.incomplete);
    let edge = w.sink().mesh_for(ChunkCoord::new(1, 1)).unwrap();
    assert!(edge.incomplete, "ring two is not resident");
    assert_eq!(w.stats().generated, 9);
}

#[test]
fn threaded_worker_reaches_the_same_residency() {
    let s = SchedulerSettings {
        cooperative: false,
        ..settings(1, 1, 2)
    };
    let mut w = scheduler(None, s);
    assert!(w.run_until_idle(&[CENTER], 20_000));
    assert_eq!(w.resident().len(), 9);
    assert!(!w.sink().mesh_for(ChunkCoord::new(0, 0)).unwrap().incomplete);
}

#[test]
fn border_edit_remeshes_the_face_neighbour() {
    let mut w = scheduler(None, settings(1, 1, 2));
    assert!(w.run_until_idle(&[CENTER], 100));

    // local x == 0 of chunk (0, 0)
    let outcome = w.edit_voxel(0, 60, 5, MaterialId(ids::GLASS));
    assert_eq!(outcome, EditOutcome::Applied);
    assert!(w.needs_mesh(ChunkCoord::new(0, 0)));
    assert!(w.needs_mesh(ChunkCoord::new(-1, 0)));
    assert!(!w.needs_mesh(ChunkCoord::new(1, 0)));
    assert!(!w.needs_mesh(ChunkCoord::new(0, -1)));

    let before = w.sink().uploads;
    assert!(w.run_until_idle(&[CENTER], 100));
    assert_eq!(w.sink().uploads, before + 2);
    let log = w.sink().upload_log();
    let tail = &log[log.len() - 2..];
    assert!(tail.contains(&ChunkCoord::new(-1, 0)));
    assert!(tail.contains(&ChunkCoord::new(0, 0)));
    assert!(w.store().is_modified(ChunkCoord::new(0, 0)));
    assert!(!w.store().is_modified(ChunkCoord::new(-1, 0)));
}

#[test]
fn later_writes_to_a_voxel_win() {
    let mut w = scheduler(None, settings(0, 0, 1));
    assert!(w.run_until_idle(&[CENTER], 100));

    w.edit_voxel(5, 60, 5, MaterialId(ids::STONE));
    w.edit_voxel(5, 60, 5, MaterialId(ids::GLASS));
    assert_eq!(w.store().material_at(5, 60, 5), Some(MaterialId(ids::GLASS)));

    w.queue_edit(PendingEdit::new(6, 60, 6, MaterialId(ids::DIRT)));
    w.queue_edit(PendingEdit::new(6, 60, 6, MaterialId(ids::SAND)));
    assert!(w.run_until_idle(&[CENTER], 100));
    assert_eq!(w.store().material_at(6, 60, 6), Some(MaterialId(ids::SAND)));
}

#[test]
fn superseded_meshes_are_dropped() {
    let mut w = scheduler(None, settings(0, 0, 1));
    assert!(w.run_until_idle(&[CENTER], 100));
    let stale = w.stats().stale_meshes;
    let uploads = w.sink().uploads;

    assert_eq!(w.edit_voxel(5, 60, 5, MaterialId(ids::GLASS)), EditOutcome::Applied);
    assert_eq!(w.edit_voxel(6, 60, 5, MaterialId(ids::GLASS)), EditOutcome::Applied);
    assert!(w.run_until_idle(&[CENTER], 100));

    assert_eq!(w.stats().stale_meshes, stale + 1);
    assert_eq!(w.sink().uploads, uploads + 1);
    assert!(!w.needs_mesh(ChunkCoord::new(0, 0)));
}

#[test]
fn aggressive_unload_hides_chunks_outside_draw_radius() {
    let mut w = scheduler(None, settings(0, 1, 2));
    assert!(w.run_until_idle(&[CENTER], 100));
    assert_eq!(
        w.state_of(ChunkCoord::new(1, 0)),
        ChunkState::Resident { active: false }
    );
    let rs = w.render_state(ChunkCoord::new(1, 0));
    assert!(rs.in_load_range && !rs.in_draw_range && !rs.active);
    assert_eq!(w.sink().visible_coords().len(), 1);

    let mut quality = settings(0, 1, 2);
    quality.max_quality = true;
    let mut w = scheduler(None, quality);
    assert!(w.run_until_idle(&[CENTER], 100));
    assert_eq!(
        w.state_of(ChunkCoord::new(1, 0)),
        ChunkState::Resident { active: true }
    );
}

#[test]
fn eviction_flushes_modified_chunks_and_reload_restores_them() {
    let tmp = TempDir::new();
    let save = SaveRoot::new(&tmp.0, SEED, PLANET);
    let mut w = scheduler(Some(save.clone()), settings(0, 0, 1));
    let origin = ChunkCoord::new(0, 0);
    assert!(w.run_until_idle(&[CENTER], 100));
    assert_eq!(w.edit_voxel(8, 60, 8, MaterialId(ids::GLASS)), EditOutcome::Applied);
    assert!(!save.chunk_path(origin).exists());

    let far = (8.0 + 16.0 * 10.0, 8.0);
    assert!(w.run_until_idle(&[far], 100));
    assert_eq!(w.state_of(origin), ChunkState::Unloaded);
    assert!(save.chunk_path(origin).exists());
    assert!(!w.store().is_modified(origin));

    assert!(w.run_until_idle(&[CENTER], 100));
    assert_eq!(w.store().origin(origin), Some(ChunkOrigin::Disk));
    assert_eq!(w.store().material_at(8, 60, 8), Some(MaterialId(ids::GLASS)));
}

fn round_trip_keeps_grids(seed: i32, cfg: &WorldGenConfig) {
    let ctx = context_with(seed, cfg, None);
    let mut w = WorldScheduler::new(ctx, settings(1, 1, 1), HeadlessSink::new()).unwrap();
    assert!(w.run_until_idle(&[CENTER], 200));
    let before: Vec<_> = w
        .resident()
        .into_iter()
        .map(|c| (c, w.store().get(c).unwrap()))
        .collect();
    assert_eq!(before.len(), 9);

    let away = (40.0, 8.0);
    assert!(w.run_until_idle(&[away], 200));
    let origin = ChunkCoord::new(0, 0);
    assert_eq!(w.state_of(origin), ChunkState::Unloaded);
    assert!(w.store().is_resident(ChunkCoord::new(1, 0)));

    assert!(w.run_until_idle(&[CENTER], 200));
    assert!(w.stats().evicted >= 6);
    assert_eq!(w.store().origin(origin), Some(ChunkOrigin::Generated));
    for (coord, grid) in before {
        let now = w.store().get(coord).unwrap();
        assert!(now == grid, "seed {seed}: {coord:?} changed after eviction and reload");
    }
}

#[test]
fn evicted_chunks_regenerate_identically() {
    for seed in 1..=4 {
        round_trip_keeps_grids(seed, &WorldGenConfig::default());
    }
    round_trip_keeps_grids(1, &forest_config());
}

#[test]
fn parked_edits_for_unloaded_chunks_are_written_back() {
    let tmp = TempDir::new();
    let save = SaveRoot::new(&tmp.0, SEED, PLANET);
    let mut w = scheduler(Some(save.clone()), settings(0, 0, 1));
    assert!(w.run_until_idle(&[CENTER], 100));

    // chunk (5, 0) is never loaded around the viewer
    let far = ChunkCoord::new(5, 0);
    w.queue_edit(PendingEdit::new(88, 90, 8, MaterialId(ids::GLASS)));
    assert!(w.run_until_idle(&[CENTER], 100));
    assert_eq!(w.state_of(far), ChunkState::Unloaded);
    assert_eq!(w.stats().edits_written_back, 1);
    let saved = save.load_chunk(far).unwrap().unwrap();
    assert_eq!(saved.get_world(88, 90, 8).map(|c| c.material), Some(MaterialId(ids::GLASS)));

    // the write-back is what the chunk loads from later
    assert!(w.run_until_idle(&[(88.0, 8.0)], 100));
    assert_eq!(w.store().origin(far), Some(ChunkOrigin::Disk));
    assert_eq!(w.store().material_at(88, 90, 8), Some(MaterialId(ids::GLASS)));
}

#[test]
fn parked_edits_without_a_save_are_dropped() {
    let mut w = scheduler(None, settings(0, 0, 1));
    assert!(w.run_until_idle(&[CENTER], 100));
    w.queue_edit(PendingEdit::new(88, 90, 8, MaterialId(ids::GLASS)));
    let edge = w.context().params().radius_chunks * 16;
    w.queue_edit(PendingEdit::new(edge + 3, 60, 0, MaterialId(ids::GLASS)));
    assert!(w.run_until_idle(&[CENTER], 100));
    assert_eq!(w.stats().edits_dropped, 1);
    assert!(w.is_idle());
}

#[test]
fn malformed_chunk_file_is_regenerated() {
    let tmp = TempDir::new();
    let save = SaveRoot::new(&tmp.0, SEED, PLANET);
    let path = save.chunk_path(ChunkCoord::new(0, 0));
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(&path, b"0,0:zz9/").unwrap();

    let mut w = scheduler(Some(save), settings(0, 0, 0));
    assert!(w.run_until_idle(&[CENTER], 100));
    assert_eq!(w.store().origin(ChunkCoord::new(0, 0)), Some(ChunkOrigin::Generated));

    let mut fresh = scheduler(None, settings(0, 0, 0));
    assert!(fresh.run_until_idle(&[CENTER], 100));
    assert_eq!(
        w.store().get(ChunkCoord::new(0, 0)),
        fresh.store().get(ChunkCoord::new(0, 0))
    );
}

#[test]
fn save_writes_modified_chunks_once() {
    let tmp = TempDir::new();
    let save = SaveRoot::new(&tmp.0, SEED, PLANET);
    let mut w = scheduler(Some(save.clone()), settings(0, 0, 1));
    assert!(w.run_until_idle(&[CENTER], 100));
    w.edit_voxel(3, 60, 3, MaterialId(ids::PLANKS));

    let report = w.save().recv().unwrap();
    assert!(report.is_ok());
    assert_eq!(report.written, vec![ChunkCoord::new(0, 0)]);
    assert!(save.load_meta().unwrap().is_some());

    let again = w.save_blocking();
    assert!(again.written.is_empty());
}

#[test]
fn join_payload_seeds_a_fresh_participant() {
    let mut host = scheduler(None, settings(0, 0, 1));
    assert!(host.run_until_idle(&[CENTER], 100));
    host.edit_voxel(4, 60, 4, MaterialId(ids::GLASS));
    let payload = parse_join_payload(&host.join_payload().unwrap()).unwrap();
    assert_eq!(payload.chunks.len(), 1);

    let mut guest = scheduler(None, settings(0, 0, 1));
    assert_eq!(guest.apply_join_payload(payload.clone()).unwrap(), 1);
    assert!(guest.run_until_idle(&[CENTER], 100));
    let origin = ChunkCoord::new(0, 0);
    assert_eq!(guest.store().origin(origin), Some(ChunkOrigin::Joined));
    assert!(guest.store().is_modified(origin));
    assert_eq!(guest.store().material_at(4, 60, 4), Some(MaterialId(ids::GLASS)));
    assert_eq!(guest.stats().generated, 0);

    let mut wrong = payload;
    wrong.seed += 1;
    assert!(matches!(
        guest.apply_join_payload(wrong),
        Err(SchedulerError::JoinMismatch { .. })
    ));
}

#[test]
fn settings_with_inverted_radii_are_refused() {
    let err = WorldScheduler::new(context(None), settings(3, 2, 4), HeadlessSink::new());
    assert!(matches!(err, Err(SchedulerError::Settings(_))));
}
