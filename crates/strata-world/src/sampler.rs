//! Per-voxel material selection. Passes run cheapest first and return early.

use std::sync::Arc;

use strata_blocks::MaterialId;

use crate::gen_ctx::{ColumnSample, GenCtx};
use crate::noise::NoiseField;
use crate::planet::BiomeDef;
use crate::structure::{StructureJob, StructureSize};
use crate::worldgen::{NoiseLayer, WorldGenParams};
use crate::{CHUNK_WIDTH, ChunkCoord};

pub struct TerrainSampler {
    noise: NoiseField,
    params: Arc<WorldGenParams>,
}

impl TerrainSampler {
    pub fn new(seed: i32, params: Arc<WorldGenParams>) -> Self {
        Self {
            noise: NoiseField::new(seed),
            params,
        }
    }

    #[inline]
    pub fn seed(&self) -> i32 {
        self.noise.seed()
    }

    #[inline]
    pub fn noise(&self) -> &NoiseField {
        &self.noise
    }

    #[inline]
    pub fn params(&self) -> &WorldGenParams {
        &self.params
    }

    pub fn make_gen_ctx(&self) -> GenCtx {
        GenCtx::new()
    }

    /// Whether a chunk lies inside the finite world extent.
    pub fn chunk_in_bounds(&self, coord: ChunkCoord) -> bool {
        let r = self.params.radius_chunks;
        (-r..r).contains(&coord.cx) && (-r..r).contains(&coord.cz)
    }

    #[inline]
    fn layer(&self, layer: &NoiseLayer, x: i32, z: i32) -> (f32, f32) {
        let n = self.noise.sample_2d(x as f32, z as f32, layer.offset, layer.scale);
        (n, layer.spline.evaluate(n))
    }

    /// Normalised terrain height for a column, weighted by the raw noise values.
    pub fn height_fraction(&self, x: i32, z: i32) -> f32 {
        let p = &*self.params;
        let layers = [
            self.layer(&p.continentalness, x, z),
            self.layer(&p.erosion, x, z),
            self.layer(&p.peaks_valleys, x, z),
        ];
        let weight: f32 = layers.iter().map(|(n, _)| n).sum();
        if weight == 0.0 {
            return layers.iter().map(|(_, s)| s).sum::<f32>() / layers.len() as f32;
        }
        layers.iter().map(|(n, s)| s * n).sum::<f32>() / weight
    }

    pub fn terrain_height(&self, x: i32, z: i32) -> i32 {
        let ceiling = self.params.ceiling;
        let h = (self.height_fraction(x, z) * ceiling as f32).floor() as i32;
        h.clamp(1, ceiling - 1)
    }

    /// Biomes come in bands along x, cycling through the planet's table.
    pub fn biome_index(&self, x: i32) -> usize {
        let count = self.params.profile.biomes.len().max(1) as i32;
        x.div_euclid(self.params.biome_band_width).rem_euclid(count) as usize
    }

    pub fn biome_at(&self, x: i32) -> &BiomeDef {
        &self.params.profile.biomes[self.biome_index(x)]
    }

    fn column(&self, ctx: &mut GenCtx, x: i32, z: i32) -> ColumnSample {
        if let Some(col) = ctx.column
            && col.x == x
            && col.z == z
        {
            return col;
        }
        ctx.counters.spline_evals += 1;
        let carve = &self.params.carve;
        let col = ColumnSample {
            x,
            z,
            height: self.terrain_height(x, z),
            weirdness: self.noise.sample_2d(
                x as f32,
                z as f32,
                carve.weirdness_offset,
                carve.weirdness_scale,
            ),
            biome: self.biome_index(x),
        };
        ctx.column = Some(col);
        col
    }

    /// Samples with a throwaway context. Prefer [`Self::material_at`] in loops.
    pub fn material_at_fresh(&self, x: i32, y: i32, z: i32) -> MaterialId {
        let mut ctx = self.make_gen_ctx();
        self.material_at(&mut ctx, x, y, z)
    }

    pub fn material_at(&self, ctx: &mut GenCtx, x: i32, y: i32, z: i32) -> MaterialId {
        let p = &*self.params;
        ctx.counters.voxels += 1;

        // bounds
        if y < 0 || y >= p.chunk_height {
            return MaterialId::AIR;
        }
        if !self.chunk_in_bounds(ChunkCoord::from_world(x, z)) {
            return MaterialId::AIR;
        }

        // air
        if y > p.ceiling {
            ctx.counters.air_short_circuits += 1;
            if p.profile.clouds && y == p.clouds.altitude && self.is_cloud(x, z) {
                return p.profile.cloud;
            }
            return MaterialId::AIR;
        }

        // height
        let col = self.column(ctx, x, z);
        let h = col.height;
        if y > h {
            return MaterialId::AIR;
        }

        // carve
        if y > 0 && y < h && col.weirdness > p.carve.density_threshold {
            ctx.counters.carve_tests += 1;
            let threshold = p.carve.base - p.carve.falloff * (h - y) as f32 / p.ceiling as f32;
            if !self.noise.sample_3d(
                x as f32,
                y as f32,
                z as f32,
                p.carve.offset,
                p.carve.scale,
                threshold,
            ) {
                return MaterialId::AIR;
            }
        }

        // biome and depth bands
        let biome = &p.profile.biomes[col.biome];
        let material = if y == 0 {
            p.profile.core
        } else if y == h {
            if h > p.sea_level {
                biome.surface
            } else {
                p.profile.liquid
            }
        } else if y > h - biome.subsurface_depth {
            biome.subsurface
        } else {
            p.profile.stone
        };

        // lodes
        if p.profile.lodes && material == p.profile.stone && y < h - p.lode_margin {
            for lode in &p.lodes {
                if y > lode.min_height && y < lode.max_height {
                    ctx.counters.lode_tests += 1;
                    if self.noise.sample_3d(
                        x as f32,
                        y as f32,
                        z as f32,
                        lode.offset,
                        lode.scale,
                        lode.threshold,
                    ) {
                        return lode.material;
                    }
                }
            }
        }

        // surface objects
        if y == h && self.grows_surface_objects(col) {
            self.queue_surface_objects(ctx, biome, x, h, z);
        }

        material
    }

    #[inline]
    fn grows_surface_objects(&self, col: ColumnSample) -> bool {
        let p = &*self.params;
        col.height > p.sea_level && p.profile.flora && p.profile.biomes[col.biome].living
    }

    /// The structure jobs populating `coord` would queue, without sampling any
    /// voxel below or above the surface. Jobs come out in population order.
    pub fn structure_jobs_in(&self, coord: ChunkCoord, ctx: &mut GenCtx) -> Vec<StructureJob> {
        if !self.chunk_in_bounds(coord) {
            return Vec::new();
        }
        let mut jobs = std::mem::take(&mut ctx.structure_jobs);
        for lz in 0..CHUNK_WIDTH as i32 {
            for lx in 0..CHUNK_WIDTH as i32 {
                let (x, z) = (coord.base_x() + lx, coord.base_z() + lz);
                let col = self.column(ctx, x, z);
                if self.grows_surface_objects(col) {
                    let biome = &self.params.profile.biomes[col.biome];
                    self.queue_surface_objects(ctx, biome, x, col.height, z);
                }
            }
        }
        std::mem::swap(&mut jobs, &mut ctx.structure_jobs);
        jobs
    }

    /// Chebyshev radius, in chunks, within which another chunk's structures
    /// can land voxels in a given chunk.
    pub fn structure_reach_chunks(&self) -> i32 {
        let reach = self.params.structure_reach();
        (reach + CHUNK_WIDTH as i32 - 1) / CHUNK_WIDTH as i32
    }

    fn is_cloud(&self, x: i32, z: i32) -> bool {
        let so = &self.params.surface_objects;
        let clouds = &self.params.clouds;
        let humidity = self
            .noise
            .sample_2d(x as f32, z as f32, so.fertility_offset, so.fertility_scale);
        if humidity <= clouds.humidity_threshold {
            return false;
        }
        let temperature = self
            .noise
            .sample_2d(x as f32, z as f32, so.percolation_offset, so.percolation_scale);
        temperature < clouds.temperature_max
    }

    fn queue_surface_objects(&self, ctx: &mut GenCtx, biome: &BiomeDef, x: i32, h: i32, z: i32) {
        ctx.counters.surface_tests += 1;
        let so = &self.params.surface_objects;
        let (fx, fz) = (x as f32, z as f32);
        let fertility = self
            .noise
            .sample_2d(fx, fz, so.fertility_offset, so.fertility_scale);
        let percolation = self
            .noise
            .sample_2d(fx, fz, so.percolation_offset, so.percolation_scale);
        let size = StructureSize::bucket(fertility, percolation);
        for def in biome.structures.iter().filter(|d| d.size == size) {
            let zone = self
                .noise
                .sample_2d(fx, fz, def.zone_offset, def.zone_scale);
            if zone <= def.zone_threshold {
                continue;
            }
            let placement = self
                .noise
                .sample_2d(fx, fz, def.placement_offset, def.placement_scale);
            if placement <= def.placement_threshold {
                continue;
            }
            ctx.counters.structure_jobs += 1;
            ctx.structure_jobs.push(StructureJob {
                kind: def.kind.clone(),
                origin: (x, h, z),
                min_height: def.min_height,
                max_height: def.max_height,
                min_radius: def.min_radius,
                max_radius: def.max_radius,
                fertility,
                habitable: self.params.profile.habitable,
            });
        }
    }

    /// Heights for every column of a chunk, row-major over `(x, z)`.
    pub fn column_heights(&self, coord: ChunkCoord) -> Vec<i32> {
        let mut out = Vec::with_capacity(CHUNK_WIDTH * CHUNK_WIDTH);
        for lz in 0..CHUNK_WIDTH as i32 {
            for lx in 0..CHUNK_WIDTH as i32 {
                out.push(self.terrain_height(coord.base_x() + lx, coord.base_z() + lz));
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::planet::PlanetInfo;
    use crate::spline::SplineCurve;
    use crate::structure::{StructureDef, StructureKind};
    use crate::worldgen::WorldGenConfig;
    use crate::{CHUNK_HEIGHT, Lode};
    use strata_blocks::ids;

    fn flat_config() -> WorldGenConfig {
        let mut cfg = WorldGenConfig::default();
        for layer in [
            &mut cfg.height.continentalness,
            &mut cfg.height.erosion,
            &mut cfg.height.peaks_valleys,
        ] {
            layer.spline = SplineCurve::constant(0.5);
        }
        cfg.carve.density_threshold = 1.0;
        cfg
    }

    fn sampler(cfg: &WorldGenConfig, planet: u32) -> TerrainSampler {
        let params = WorldGenParams::from_config(cfg, &PlanetInfo::new(planet)).unwrap();
        TerrainSampler::new(1, Arc::new(params))
    }

    #[test]
    fn constant_splines_give_half_ceiling() {
        let s = sampler(&flat_config(), 3);
        for x in [-40, 0, 7, 300] {
            assert_eq!(s.terrain_height(x, x * 3), 40);
        }
    }

    #[test]
    fn bounds_and_air_return_empty() {
        let s = sampler(&flat_config(), 3);
        assert_eq!(s.material_at_fresh(0, -1, 0), MaterialId::AIR);
        assert_eq!(s.material_at_fresh(0, CHUNK_HEIGHT as i32, 0), MaterialId::AIR);
        let edge = 1024 * CHUNK_WIDTH as i32;
        assert_eq!(s.material_at_fresh(edge, 10, 0), MaterialId::AIR);
        assert_eq!(s.material_at_fresh(0, 10, -edge - 1), MaterialId::AIR);
        assert_ne!(s.material_at_fresh(edge - 1, 10, -edge), MaterialId::AIR);
        assert_eq!(s.material_at_fresh(0, 41, 0), MaterialId::AIR);
    }

    #[test]
    fn depth_bands_follow_biome() {
        let s = sampler(&flat_config(), 3);
        let mut ctx = s.make_gen_ctx();
        assert_eq!(s.biome_at(0).name, "grassland");
        assert_eq!(s.material_at(&mut ctx, 0, 0, 0), MaterialId::BARRIER);
        assert_eq!(s.material_at(&mut ctx, 0, 40, 0), MaterialId(ids::GRASS));
        assert_eq!(s.material_at(&mut ctx, 0, 37, 0), MaterialId(ids::DIRT));
        assert_eq!(ctx.counters.spline_evals, 1);

        let mut cfg = flat_config();
        cfg.extent.sea_level = 40;
        let s = sampler(&cfg, 3);
        assert_eq!(s.material_at_fresh(0, 40, 0), MaterialId(ids::WATER));
    }

    #[test]
    fn biomes_cycle_in_bands() {
        let s = sampler(&flat_config(), 3);
        assert_eq!(s.biome_index(0), 0);
        assert_eq!(s.biome_index(127), 0);
        assert_eq!(s.biome_index(128), 1);
        assert_eq!(s.biome_index(4 * 128), 0);
        assert_eq!(s.biome_index(-1), 3);
    }

    #[test]
    fn lode_bounds_are_strict() {
        let mut cfg = flat_config();
        cfg.lodes = vec![
            Lode {
                name: "gold".into(),
                material: MaterialId(ids::GOLD_ORE),
                min_height: 10,
                max_height: 20,
                offset: 0.0,
                scale: 0.3,
                threshold: -1.0,
            },
            Lode {
                name: "iron".into(),
                material: MaterialId(ids::IRON_ORE),
                min_height: 0,
                max_height: 30,
                offset: 0.0,
                scale: 0.3,
                threshold: -1.0,
            },
        ];
        let s = sampler(&cfg, 3);
        let mut ctx = s.make_gen_ctx();
        assert_eq!(s.material_at(&mut ctx, 5, 10, 5), MaterialId(ids::IRON_ORE));
        assert_eq!(s.material_at(&mut ctx, 5, 11, 5), MaterialId(ids::GOLD_ORE));
        assert_eq!(s.material_at(&mut ctx, 5, 19, 5), MaterialId(ids::GOLD_ORE));
        assert_eq!(s.material_at(&mut ctx, 5, 20, 5), MaterialId(ids::IRON_ORE));
        assert_eq!(s.material_at(&mut ctx, 5, 30, 5), MaterialId(ids::STONE));
    }

    #[test]
    fn air_pass_skips_splines_and_lodes() {
        let mut cfg = WorldGenConfig::default();
        cfg.features.clouds = false;
        let s = sampler(&cfg, 3);
        let mut ctx = s.make_gen_ctx();
        for y in 81..CHUNK_HEIGHT as i32 {
            for x in -20..20 {
                assert_eq!(s.material_at(&mut ctx, x, y, x * 2), MaterialId::AIR);
            }
        }
        assert_eq!(ctx.counters.spline_evals, 0);
        assert_eq!(ctx.counters.lode_tests, 0);
        assert_eq!(ctx.counters.carve_tests, 0);
        assert_eq!(ctx.counters.air_short_circuits, ctx.counters.voxels);
    }

    #[test]
    fn clouds_only_at_their_altitude() {
        let mut cfg = flat_config();
        cfg.clouds.humidity_threshold = -1.0;
        cfg.clouds.temperature_max = 2.0;
        let s = sampler(&cfg, 3);
        assert_eq!(s.material_at_fresh(3, 88, 3), MaterialId(ids::CLOUD));
        assert_eq!(s.material_at_fresh(3, 87, 3), MaterialId::AIR);
        assert_eq!(s.material_at_fresh(3, 89, 3), MaterialId::AIR);

        let barren = sampler(&cfg, 9);
        assert_eq!(barren.material_at_fresh(3, 88, 3), MaterialId::AIR);
    }

    #[test]
    fn surface_column_queues_structure_job() {
        let mut cfg = flat_config();
        let always = |size| StructureDef {
            size,
            zone_offset: 0.0,
            zone_scale: 1.0,
            zone_threshold: -1.0,
            placement_offset: 0.0,
            placement_scale: 1.0,
            placement_threshold: -1.0,
            min_height: 3,
            max_height: 5,
            min_radius: 1,
            max_radius: 2,
            kind: StructureKind::Trunk {
                material: MaterialId(ids::LOG),
            },
        };
        cfg.biomes.habitable[0].structures = vec![
            always(StructureSize::Small),
            always(StructureSize::Medium),
            always(StructureSize::Large),
        ];
        let s = sampler(&cfg, 3);
        let mut ctx = s.make_gen_ctx();
        for y in 0..=40 {
            s.material_at(&mut ctx, 2, y, 9);
        }
        let jobs = ctx.take_structure_jobs();
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].origin, (2, 40, 9));
        assert!(jobs[0].habitable);
        assert_eq!(ctx.counters.surface_tests, 1);

        cfg.features.flora = false;
        let s = sampler(&cfg, 3);
        let mut ctx = s.make_gen_ctx();
        s.material_at(&mut ctx, 2, 40, 9);
        assert!(ctx.structure_jobs.is_empty());
    }

    #[test]
    fn carve_never_runs_above_terrain() {
        let mut cfg = flat_config();
        cfg.carve.density_threshold = -1.0;
        cfg.carve.base = 2.0;
        cfg.carve.falloff = 0.0;
        let s = sampler(&cfg, 3);
        let mut ctx = s.make_gen_ctx();
        assert_eq!(s.material_at(&mut ctx, 1, 20, 1), MaterialId::AIR);
        assert_eq!(s.material_at(&mut ctx, 1, 0, 1), MaterialId::BARRIER);
        assert_eq!(s.material_at(&mut ctx, 1, 40, 1), MaterialId(ids::GRASS));
        assert_eq!(ctx.counters.carve_tests, 1);
    }
}
