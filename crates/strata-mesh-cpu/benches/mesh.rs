use std::hint::black_box;
use std::sync::Arc;

use criterion::{Criterion, criterion_group, criterion_main};
use strata_blocks::{MaterialTable, VoxelCell};
use strata_chunk::generate_chunk;
use strata_mesh_cpu::{Neighbor, build_chunk_mesh, variant_seed};
use strata_world::{ChunkCoord, PlanetInfo, TerrainSampler, WorldGenConfig, WorldGenParams};

fn bench_mesh_generated(c: &mut Criterion) {
    let params =
        WorldGenParams::from_config(&WorldGenConfig::default(), &PlanetInfo::new(3)).unwrap();
    let sampler = TerrainSampler::new(1337, Arc::new(params));
    let table = MaterialTable::builtin();
    let coord = ChunkCoord::new(0, 0);
    let grid = generate_chunk(&sampler, coord).grid;
    let open = |_: i32, _: i32, _: i32| Neighbor::Cell(VoxelCell::AIR);
    c.bench_function("mesh_generated_16x96x16", |b| {
        b.iter(|| {
            black_box(build_chunk_mesh(&grid, &table, &open, variant_seed(1337, coord)).unwrap())
        })
    });
}

criterion_group!(benches, bench_mesh_generated);
criterion_main!(benches);
