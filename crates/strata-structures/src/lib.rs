//! Turns structure jobs into ordered queues of voxel overrides.
#![forbid(unsafe_code)]

use std::collections::VecDeque;

use strata_blocks::MaterialId;
use strata_world::{
    CHUNK_HEIGHT, ChunkCoord, GenCtx, NoiseField, PendingEdit, StructureJob, StructureKind,
    TerrainSampler,
};

/// Noise layer for perforating leaf volumes and boulders.
const PORE_OFFSET: f32 = 4000.0;
const PORE_SCALE: f32 = 0.45;

#[inline]
fn lerp_i(min: i32, max: i32, t: f32) -> i32 {
    min + ((max - min) as f32 * t.clamp(0.0, 1.0)).round() as i32
}

/// Plans are pure functions of the job and the noise seed.
pub struct StructurePlanner<'n> {
    noise: &'n NoiseField,
}

impl<'n> StructurePlanner<'n> {
    pub fn new(noise: &'n NoiseField) -> Self {
        Self { noise }
    }

    pub fn plan(&self, job: &StructureJob) -> VecDeque<PendingEdit> {
        let mut out = Plan::default();
        let height = lerp_i(job.min_height, job.max_height, job.fertility).max(1);
        let radius = lerp_i(job.min_radius, job.max_radius, job.fertility).max(0);
        let (ox, oy, oz) = job.origin;
        match &job.kind {
            StructureKind::Trunk { material } => {
                out.column(ox, oy + 1, oy + height, oz, *material);
            }
            StructureKind::Tree { trunk, leaves } => {
                out.column(ox, oy + 1, oy + height, oz, *trunk);
                if job.habitable {
                    let top = oy + height;
                    for y in top - 1..=top + 1 {
                        for z in oz - radius..=oz + radius {
                            for x in ox - radius..=ox + radius {
                                if x == ox && z == oz && y <= top {
                                    continue;
                                }
                                out.push(x, y, z, *leaves);
                            }
                        }
                    }
                    if radius > 1 {
                        for z in oz - radius + 1..oz + radius {
                            for x in ox - radius + 1..ox + radius {
                                out.push(x, top + 2, z, *leaves);
                            }
                        }
                    }
                }
            }
            StructureKind::PorousTree {
                trunk,
                leaves,
                porosity,
            } => {
                out.column(ox, oy + 1, oy + height, oz, *trunk);
                if job.habitable {
                    let top = oy + height;
                    let trunk_cell = |x, y, z| x == ox && z == oz && y <= top;
                    let r = radius.max(1);
                    self.porous_sphere(&mut out, (ox, top, oz), r, *leaves, *porosity, trunk_cell);
                }
            }
            StructureKind::Monolith { material } => {
                for z in oz - radius..=oz + radius {
                    for x in ox - radius..=ox + radius {
                        out.column(x, oy + 1, oy + height, z, *material);
                    }
                }
            }
            StructureKind::Boulder { material, porosity } => {
                let r = radius.max(1);
                let center = (ox, oy + r - 1, oz);
                self.porous_sphere(&mut out, center, r, *material, *porosity, |_, _, _| false);
            }
            StructureKind::BaseImport { sentinel, .. } => {
                for y in oy..=oy + height {
                    for z in oz - radius..=oz + radius {
                        for x in ox - radius..=ox + radius {
                            if (x, y, z) != (ox, oy, oz) {
                                out.push(x, y, z, MaterialId::AIR);
                            }
                        }
                    }
                }
                out.push(ox, oy, oz, *sentinel);
            }
        }
        out.edits
    }

    /// Appends the planned voxels of `jobs` that fall inside `coord`.
    pub fn landing_in(&self, coord: ChunkCoord, jobs: &[StructureJob], out: &mut Vec<PendingEdit>) {
        for job in jobs {
            out.extend(self.plan(job).into_iter().filter(|e| e.chunk() == coord));
        }
    }

    /// Sphere whose shell is perforated where 3D noise rises above `porosity`.
    /// The inner core (distance <= 1) is always filled so shapes stay anchored.
    fn porous_sphere(
        &self,
        out: &mut Plan,
        center: (i32, i32, i32),
        radius: i32,
        material: MaterialId,
        porosity: f32,
        skip: impl Fn(i32, i32, i32) -> bool,
    ) {
        let (cx, cy, cz) = center;
        let r2 = radius * radius;
        for y in cy - radius..=cy + radius {
            for z in cz - radius..=cz + radius {
                for x in cx - radius..=cx + radius {
                    let (dx, dy, dz) = (x - cx, y - cy, z - cz);
                    let d2 = dx * dx + dy * dy + dz * dz;
                    if d2 > r2 || skip(x, y, z) {
                        continue;
                    }
                    if d2 > 1
                        && self.noise.sample_3d(
                            x as f32,
                            y as f32,
                            z as f32,
                            PORE_OFFSET,
                            PORE_SCALE,
                            porosity,
                        )
                    {
                        continue;
                    }
                    out.push(x, y, z, material);
                }
            }
        }
    }
}

/// Every structure voxel that lands in `coord`, whichever chunk grew it.
/// Source chunks are visited in coordinate order and their jobs in sampling
/// order, so the result never depends on which neighbours happen to be loaded.
/// `own` holds the jobs `coord` queued while it was populated.
pub fn edits_for_chunk(
    sampler: &TerrainSampler,
    ctx: &mut GenCtx,
    coord: ChunkCoord,
    own: &[StructureJob],
) -> Vec<PendingEdit> {
    let planner = StructurePlanner::new(sampler.noise());
    let r = sampler.structure_reach_chunks();
    let mut sources: Vec<ChunkCoord> = (-r..=r)
        .flat_map(|dz| (-r..=r).map(move |dx| coord.offset(dx, dz)))
        .collect();
    sources.sort_unstable();
    let mut out = Vec::new();
    for src in sources {
        if src == coord {
            planner.landing_in(coord, own, &mut out);
        } else {
            let jobs = sampler.structure_jobs_in(src, ctx);
            planner.landing_in(coord, &jobs, &mut out);
        }
    }
    out
}

#[derive(Default)]
struct Plan {
    edits: VecDeque<PendingEdit>,
}

impl Plan {
    #[inline]
    fn push(&mut self, x: i32, y: i32, z: i32, material: MaterialId) {
        if (0..CHUNK_HEIGHT as i32).contains(&y) {
            self.edits.push_back(PendingEdit::new(x, y, z, material));
        }
    }

    fn column(&mut self, x: i32, y0: i32, y1: i32, z: i32, material: MaterialId) {
        for y in y0..=y1 {
            self.push(x, y, z, material);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strata_blocks::ids;

    fn job(kind: StructureKind, habitable: bool) -> StructureJob {
        StructureJob {
            kind,
            origin: (5, 40, -3),
            min_height: 4,
            max_height: 8,
            min_radius: 1,
            max_radius: 3,
            fertility: 0.5,
            habitable,
        }
    }

    #[test]
    fn trunk_is_a_single_column_above_origin() {
        let noise = NoiseField::new(1);
        let edits = StructurePlanner::new(&noise).plan(&job(
            StructureKind::Trunk {
                material: MaterialId(ids::CACTUS),
            },
            true,
        ));
        let ys: Vec<i32> = edits.iter().map(|e| e.position.1).collect();
        assert_eq!(ys, vec![41, 42, 43, 44, 45, 46]);
        assert!(edits.iter().all(|e| e.position.0 == 5 && e.position.2 == -3));
    }

    #[test]
    fn barren_planets_grow_bare_trunks() {
        let noise = NoiseField::new(1);
        let planner = StructurePlanner::new(&noise);
        let kind = StructureKind::Tree {
            trunk: MaterialId(ids::LOG),
            leaves: MaterialId(ids::LEAVES),
        };
        let bare = planner.plan(&job(kind.clone(), false));
        assert!(bare.iter().all(|e| e.material == MaterialId(ids::LOG)));
        let leafy = planner.plan(&job(kind, true));
        assert!(leafy.iter().any(|e| e.material == MaterialId(ids::LEAVES)));
        assert!(leafy.len() > bare.len());
    }

    #[test]
    fn base_import_clears_then_marks_origin() {
        let noise = NoiseField::new(1);
        let edits = StructurePlanner::new(&noise).plan(&job(
            StructureKind::BaseImport {
                sentinel: MaterialId(ids::IMPORT_SENTINEL),
                asset: "outpost".into(),
            },
            true,
        ));
        // radius 2, height 6: 5x5 footprint over 7 layers
        assert_eq!(edits.len(), 5 * 5 * 7);
        let last = edits.back().unwrap();
        assert_eq!(last.position, (5, 40, -3));
        assert_eq!(last.material, MaterialId(ids::IMPORT_SENTINEL));
        assert_eq!(
            edits.iter().filter(|e| e.material.is_air()).count(),
            5 * 5 * 7 - 1
        );
    }

    #[test]
    fn leaves_past_the_edge_land_in_the_neighbour() {
        let noise = NoiseField::new(2);
        let planner = StructurePlanner::new(&noise);
        let mut j = job(
            StructureKind::Tree {
                trunk: MaterialId(ids::LOG),
                leaves: MaterialId(ids::LEAVES),
            },
            true,
        );
        j.origin = (15, 40, 3);
        let mut east = Vec::new();
        planner.landing_in(ChunkCoord::new(1, 0), std::slice::from_ref(&j), &mut east);
        assert!(!east.is_empty());
        assert!(east.iter().all(|e| e.material == MaterialId(ids::LEAVES)));
        assert!(east.iter().all(|e| (16..=17).contains(&e.position.0)));
        let mut home = Vec::new();
        planner.landing_in(ChunkCoord::new(0, 0), std::slice::from_ref(&j), &mut home);
        assert_eq!(home.len() + east.len(), planner.plan(&j).len());
    }

    #[test]
    fn edits_stay_inside_vertical_range() {
        let noise = NoiseField::new(9);
        let mut j = job(
            StructureKind::Monolith {
                material: MaterialId(ids::BASALT),
            },
            true,
        );
        j.origin = (0, 90, 0);
        let edits = StructurePlanner::new(&noise).plan(&j);
        assert!(!edits.is_empty());
        assert!(edits.iter().all(|e| e.position.1 < CHUNK_HEIGHT as i32));
    }
}
