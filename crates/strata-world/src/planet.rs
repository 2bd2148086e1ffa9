//! Per-planet identity and the generation profile persisted with a world.

use serde::{Deserialize, Serialize};
use strata_blocks::MaterialId;

use crate::structure::StructureDef;

/// Astronomical coordinates derived from the planet number by fixed integer arithmetic.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanetInfo {
    pub planet: i64,
    pub galaxy: i64,
    pub system: i64,
    pub distance_to_star: i64,
}

impl PlanetInfo {
    pub const PLANETS_PER_GALAXY: i64 = 64;
    pub const PLANETS_PER_SYSTEM: i64 = 8;

    pub fn new(planet: u32) -> Self {
        let planet = i64::from(planet);
        let galaxy = ceil_div(planet, Self::PLANETS_PER_GALAXY);
        let system = ceil_div(planet, Self::PLANETS_PER_SYSTEM);
        let distance_to_star = planet - Self::PLANETS_PER_SYSTEM * (system - 1);
        Self {
            planet,
            galaxy,
            system,
            distance_to_star,
        }
    }

    /// Third and fourth orbits carry liquid water, clouds and leafy flora.
    #[inline]
    pub fn is_habitable(&self) -> bool {
        (3..=4).contains(&self.distance_to_star)
    }
}

#[inline]
fn ceil_div(n: i64, d: i64) -> i64 {
    (n + d - 1).div_euclid(d)
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Lode {
    pub name: String,
    pub material: MaterialId,
    pub min_height: i32,
    pub max_height: i32,
    pub offset: f32,
    pub scale: f32,
    pub threshold: f32,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BiomeDef {
    pub name: String,
    pub surface: MaterialId,
    pub subsurface: MaterialId,
    pub subsurface_depth: i32,
    /// Only living biomes run the surface-object pass.
    pub living: bool,
    #[serde(default)]
    pub structures: Vec<StructureDef>,
}

/// The biome material table and feature flags for one planet.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PlanetProfile {
    pub habitable: bool,
    pub flora: bool,
    pub clouds: bool,
    pub lodes: bool,
    pub stone: MaterialId,
    pub core: MaterialId,
    pub liquid: MaterialId,
    pub cloud: MaterialId,
    pub biomes: Vec<BiomeDef>,
}
