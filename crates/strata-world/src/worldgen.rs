use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use strata_blocks::{MaterialId, ids};
use thiserror::Error;

use crate::planet::{BiomeDef, Lode, PlanetInfo, PlanetProfile};
use crate::spline::SplineCurve;
use crate::structure::{StructureDef, StructureKind, StructureSize};
use crate::{CHUNK_HEIGHT, TOP_MARGIN};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read worldgen config: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse worldgen config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid worldgen config: {0}")]
    Invalid(String),
}

#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct WorldGenConfig {
    #[serde(default)]
    pub extent: Extent,
    #[serde(default)]
    pub features: Features,
    #[serde(default)]
    pub height: Height,
    #[serde(default)]
    pub carve: Carve,
    #[serde(default)]
    pub clouds: Clouds,
    #[serde(default)]
    pub surface_objects: SurfaceObjects,
    #[serde(default = "default_lodes")]
    pub lodes: Vec<Lode>,
    #[serde(default)]
    pub biomes: Biomes,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct Extent {
    #[serde(default = "default_radius_chunks")]
    pub radius_chunks: i32,
    #[serde(default = "default_sea_level")]
    pub sea_level: i32,
}
fn default_radius_chunks() -> i32 {
    1024
}
fn default_sea_level() -> i32 {
    30
}
impl Default for Extent {
    fn default() -> Self {
        Self {
            radius_chunks: default_radius_chunks(),
            sea_level: default_sea_level(),
        }
    }
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct Features {
    #[serde(default = "default_true")]
    pub flora: bool,
    #[serde(default = "default_true")]
    pub clouds: bool,
    #[serde(default = "default_true")]
    pub lodes: bool,
}
fn default_true() -> bool {
    true
}
impl Default for Features {
    fn default() -> Self {
        Self {
            flora: true,
            clouds: true,
            lodes: true,
        }
    }
}

/// One spline-mapped 2D noise layer feeding the height fraction.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct NoiseLayer {
    pub offset: f32,
    pub scale: f32,
    pub spline: SplineCurve,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct Height {
    #[serde(default = "default_continentalness")]
    pub continentalness: NoiseLayer,
    #[serde(default = "default_erosion")]
    pub erosion: NoiseLayer,
    #[serde(default = "default_peaks_valleys")]
    pub peaks_valleys: NoiseLayer,
}
fn default_continentalness() -> NoiseLayer {
    NoiseLayer {
        offset: 100.0,
        scale: 0.12,
        spline: SplineCurve::new([(0.0, 0.2), (0.3, 0.3), (0.5, 0.45), (0.7, 0.6), (1.0, 0.75)]),
    }
}
fn default_erosion() -> NoiseLayer {
    NoiseLayer {
        offset: 300.0,
        scale: 0.2,
        spline: SplineCurve::new([(0.0, 0.7), (0.5, 0.45), (1.0, 0.3)]),
    }
}
fn default_peaks_valleys() -> NoiseLayer {
    NoiseLayer {
        offset: 500.0,
        scale: 0.45,
        spline: SplineCurve::new([(0.0, 0.35), (0.5, 0.5), (0.8, 0.62), (1.0, 0.8)]),
    }
}
impl Default for Height {
    fn default() -> Self {
        Self {
            continentalness: default_continentalness(),
            erosion: default_erosion(),
            peaks_valleys: default_peaks_valleys(),
        }
    }
}

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct Carve {
    pub weirdness_offset: f32,
    pub weirdness_scale: f32,
    /// Weirdness must be strictly above this for carving to be considered.
    pub density_threshold: f32,
    pub offset: f32,
    pub scale: f32,
    /// 3D threshold right at the surface.
    pub base: f32,
    /// Threshold drop across the full terrain ceiling.
    pub falloff: f32,
}
impl Default for Carve {
    fn default() -> Self {
        Self {
            weirdness_offset: 700.0,
            weirdness_scale: 0.25,
            density_threshold: 0.6,
            offset: 900.0,
            scale: 0.08,
            base: 0.46,
            falloff: 0.3,
        }
    }
}

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct Clouds {
    pub altitude: i32,
    pub humidity_threshold: f32,
    pub temperature_max: f32,
    pub material: MaterialId,
}
impl Default for Clouds {
    fn default() -> Self {
        Self {
            altitude: 88,
            humidity_threshold: 0.55,
            temperature_max: 0.6,
            material: MaterialId(ids::CLOUD),
        }
    }
}

/// Humidity/temperature layers reused as fertility and percolation.
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct SurfaceObjects {
    pub fertility_offset: f32,
    pub fertility_scale: f32,
    pub percolation_offset: f32,
    pub percolation_scale: f32,
}
impl Default for SurfaceObjects {
    fn default() -> Self {
        Self {
            fertility_offset: 1300.0,
            fertility_scale: 0.35,
            percolation_offset: 1700.0,
            percolation_scale: 0.35,
        }
    }
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct Biomes {
    #[serde(default = "default_band_width")]
    pub band_width: i32,
    #[serde(default = "default_lode_margin")]
    pub lode_margin: i32,
    #[serde(default = "default_habitable_biomes")]
    pub habitable: Vec<BiomeDef>,
    #[serde(default = "default_barren_biomes")]
    pub barren: Vec<BiomeDef>,
}
fn default_band_width() -> i32 {
    128
}
fn default_lode_margin() -> i32 {
    4
}
impl Default for Biomes {
    fn default() -> Self {
        Self {
            band_width: default_band_width(),
            lode_margin: default_lode_margin(),
            habitable: default_habitable_biomes(),
            barren: default_barren_biomes(),
        }
    }
}

fn lode(name: &str, material: u8, heights: (i32, i32), noise: (f32, f32, f32)) -> Lode {
    let (offset, scale, threshold) = noise;
    Lode {
        name: name.to_string(),
        material: MaterialId(material),
        min_height: heights.0,
        max_height: heights.1,
        offset,
        scale,
        threshold,
    }
}

fn default_lodes() -> Vec<Lode> {
    vec![
        lode("gravel", ids::GRAVEL, (1, 70), (30.0, 0.1, 0.55)),
        lode("coal", ids::COAL_ORE, (4, 64), (60.0, 0.15, 0.58)),
        lode("iron", ids::IRON_ORE, (2, 40), (90.0, 0.2, 0.6)),
        lode("gold", ids::GOLD_ORE, (1, 20), (120.0, 0.25, 0.63)),
    ]
}

/// `thresholds` is `(zone, placement)`.
fn structure(
    size: StructureSize,
    salt: f32,
    thresholds: (f32, f32),
    heights: (i32, i32),
    radii: (i32, i32),
    kind: StructureKind,
) -> StructureDef {
    let (zone_threshold, placement_threshold) = thresholds;
    StructureDef {
        size,
        zone_offset: 2000.0 + salt,
        zone_scale: 0.6,
        zone_threshold,
        placement_offset: 2500.0 + salt,
        placement_scale: 12.0,
        placement_threshold,
        min_height: heights.0,
        max_height: heights.1,
        min_radius: radii.0,
        max_radius: radii.1,
        kind,
    }
}

fn default_habitable_biomes() -> Vec<BiomeDef> {
    let oak = StructureKind::Tree {
        trunk: MaterialId(ids::LOG),
        leaves: MaterialId(ids::LEAVES),
    };
    let bushy = StructureKind::PorousTree {
        trunk: MaterialId(ids::LOG),
        leaves: MaterialId(ids::LEAVES),
        porosity: 0.5,
    };
    vec![
        BiomeDef {
            name: "grassland".into(),
            surface: MaterialId(ids::GRASS),
            subsurface: MaterialId(ids::DIRT),
            subsurface_depth: 4,
            living: true,
            structures: vec![
                structure(StructureSize::Medium, 0.0, (0.5, 0.8), (4, 7), (2, 2), oak.clone()),
                structure(StructureSize::Large, 11.0, (0.45, 0.78), (6, 9), (2, 3), bushy.clone()),
                structure(
                    StructureSize::Small,
                    23.0,
                    (0.55, 0.82),
                    (2, 3),
                    (1, 2),
                    StructureKind::Boulder {
                        material: MaterialId(ids::STONE),
                        porosity: 0.45,
                    },
                ),
            ],
        },
        BiomeDef {
            name: "desert".into(),
            surface: MaterialId(ids::SAND),
            subsurface: MaterialId(ids::SAND),
            subsurface_depth: 6,
            living: true,
            structures: vec![structure(
                StructureSize::Small,
                37.0,
                (0.5, 0.83),
                (2, 4),
                (0, 0),
                StructureKind::Trunk {
                    material: MaterialId(ids::CACTUS),
                },
            )],
        },
        BiomeDef {
            name: "forest".into(),
            surface: MaterialId(ids::GRASS),
            subsurface: MaterialId(ids::DIRT),
            subsurface_depth: 4,
            living: true,
            structures: vec![
                structure(StructureSize::Small, 41.0, (0.4, 0.75), (4, 6), (2, 2), oak),
                structure(StructureSize::Medium, 53.0, (0.4, 0.72), (5, 8), (2, 3), bushy.clone()),
                structure(StructureSize::Large, 67.0, (0.35, 0.7), (7, 11), (3, 4), bushy),
            ],
        },
        BiomeDef {
            name: "tundra".into(),
            surface: MaterialId(ids::SNOW),
            subsurface: MaterialId(ids::DIRT),
            subsurface_depth: 3,
            living: true,
            structures: vec![structure(
                StructureSize::Large,
                79.0,
                (0.6, 0.9),
                (8, 14),
                (1, 2),
                StructureKind::Monolith {
                    material: MaterialId(ids::BASALT),
                },
            )],
        },
    ]
}

fn default_barren_biomes() -> Vec<BiomeDef> {
    vec![
        BiomeDef {
            name: "ashland".into(),
            surface: MaterialId(ids::ASH),
            subsurface: MaterialId(ids::BASALT),
            subsurface_depth: 5,
            living: false,
            structures: Vec::new(),
        },
        BiomeDef {
            name: "crystal_fields".into(),
            surface: MaterialId(ids::GRAVEL),
            subsurface: MaterialId(ids::STONE),
            subsurface_depth: 3,
            living: true,
            structures: vec![
                structure(
                    StructureSize::Medium,
                    89.0,
                    (0.5, 0.8),
                    (3, 8),
                    (0, 1),
                    StructureKind::Monolith {
                        material: MaterialId(ids::CRYSTAL),
                    },
                ),
                structure(
                    StructureSize::Large,
                    97.0,
                    (0.65, 0.93),
                    (6, 8),
                    (3, 4),
                    StructureKind::BaseImport {
                        sentinel: MaterialId(ids::IMPORT_SENTINEL),
                        asset: "outpost".into(),
                    },
                ),
            ],
        },
    ]
}

/// Flattened snapshot of the config for one planet, used in the per-voxel loop.
#[derive(Clone, Debug)]
pub struct WorldGenParams {
    pub chunk_height: i32,
    /// Highest voxel the terrain surface may reach (`chunk_height - TOP_MARGIN`).
    pub ceiling: i32,
    pub sea_level: i32,
    pub radius_chunks: i32,
    pub continentalness: NoiseLayer,
    pub erosion: NoiseLayer,
    pub peaks_valleys: NoiseLayer,
    pub carve: Carve,
    pub clouds: Clouds,
    pub surface_objects: SurfaceObjects,
    pub lodes: Vec<Lode>,
    pub lode_margin: i32,
    pub biome_band_width: i32,
    pub profile: PlanetProfile,
}

impl WorldGenParams {
    pub fn from_config(cfg: &WorldGenConfig, planet: &PlanetInfo) -> Result<Self, ConfigError> {
        let habitable = planet.is_habitable();
        let profile = PlanetProfile {
            habitable,
            flora: cfg.features.flora,
            clouds: cfg.features.clouds && habitable,
            lodes: cfg.features.lodes,
            stone: MaterialId(if habitable { ids::STONE } else { ids::BASALT }),
            core: MaterialId::BARRIER,
            liquid: MaterialId(if habitable { ids::WATER } else { ids::LAVA }),
            cloud: cfg.clouds.material,
            biomes: if habitable {
                cfg.biomes.habitable.clone()
            } else {
                cfg.biomes.barren.clone()
            },
        };
        Self::with_profile(cfg, profile)
    }

    /// Builds params around an explicit profile, e.g. one restored from world metadata.
    pub fn with_profile(cfg: &WorldGenConfig, profile: PlanetProfile) -> Result<Self, ConfigError> {
        let chunk_height = CHUNK_HEIGHT as i32;
        let ceiling = chunk_height - TOP_MARGIN as i32;
        let params = Self {
            chunk_height,
            ceiling,
            sea_level: cfg.extent.sea_level,
            radius_chunks: cfg.extent.radius_chunks,
            continentalness: cfg.height.continentalness.clone(),
            erosion: cfg.height.erosion.clone(),
            peaks_valleys: cfg.height.peaks_valleys.clone(),
            carve: cfg.carve.clone(),
            clouds: cfg.clouds.clone(),
            surface_objects: cfg.surface_objects.clone(),
            lodes: cfg.lodes.clone(),
            lode_margin: cfg.biomes.lode_margin,
            biome_band_width: cfg.biomes.band_width,
            profile,
        };
        params.validate()?;
        Ok(params)
    }

    /// Farthest horizontal distance, in voxels, a planned structure can reach
    /// from its root column.
    pub fn structure_reach(&self) -> i32 {
        self.profile
            .biomes
            .iter()
            .flat_map(|b| &b.structures)
            .map(|d| d.max_radius.max(d.min_radius).max(1))
            .max()
            .unwrap_or(0)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.profile.biomes.is_empty() {
            return Err(ConfigError::Invalid("at least one biome is required".into()));
        }
        if self.biome_band_width <= 0 {
            return Err(ConfigError::Invalid("biome band width must be positive".into()));
        }
        if self.radius_chunks <= 0 {
            return Err(ConfigError::Invalid("world radius must be positive".into()));
        }
        if self.lode_margin < 0 {
            return Err(ConfigError::Invalid("lode margin must not be negative".into()));
        }
        if self.clouds.altitude <= self.ceiling || self.clouds.altitude >= self.chunk_height {
            return Err(ConfigError::Invalid(format!(
                "cloud altitude {} must lie in ({}, {})",
                self.clouds.altitude, self.ceiling, self.chunk_height
            )));
        }
        for biome in &self.profile.biomes {
            for def in &biome.structures {
                if def.min_height > def.max_height || def.min_radius > def.max_radius {
                    return Err(ConfigError::Invalid(format!(
                        "structure in biome {} has inverted height/radius range",
                        biome.name
                    )));
                }
            }
        }
        Ok(())
    }
}

pub fn load_config_from_path(path: &Path) -> Result<WorldGenConfig, ConfigError> {
    let s = fs::read_to_string(path)?;
    let cfg = toml::from_str(&s)?;
    log::debug!(target: "worldgen", "loaded worldgen config from {}", path.display());
    Ok(cfg)
}
