use std::sync::Arc;

use strata_blocks::MaterialProperties;
use strata_io::{PersistError, SaveRoot, WorldMeta};
use strata_world::{ConfigError, PlanetInfo, TerrainSampler, WorldGenConfig, WorldGenParams};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ContextError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Persist(#[from] PersistError),
    #[error("save metadata is for seed {found_seed} planet {found_planet}")]
    SaveMismatch { found_seed: i32, found_planet: u32 },
}

/// Everything a component needs to know about the world it serves.
/// Passed explicitly to every constructor; there is no global world.
pub struct WorldContext {
    pub seed: i32,
    pub planet: PlanetInfo,
    pub creative: bool,
    pub sampler: TerrainSampler,
    pub materials: Arc<dyn MaterialProperties>,
    pub save: Option<SaveRoot>,
}

impl WorldContext {
    /// Builds a context, restoring the planet profile from `world.toml` when the save has one.
    pub fn new(
        seed: i32,
        planet: u32,
        cfg: &WorldGenConfig,
        materials: Arc<dyn MaterialProperties>,
        save: Option<SaveRoot>,
        creative: bool,
    ) -> Result<Self, ContextError> {
        let info = PlanetInfo::new(planet);
        let stored = match &save {
            Some(s) => s.load_meta()?,
            None => None,
        };
        let (params, creative) = match stored {
            Some(meta) => {
                if meta.seed != seed || meta.planet != planet {
                    return Err(ContextError::SaveMismatch {
                        found_seed: meta.seed,
                        found_planet: meta.planet,
                    });
                }
                log::info!("restoring planet {planet} profile from save");
                (WorldGenParams::with_profile(cfg, meta.profile)?, meta.creative)
            }
            None => (WorldGenParams::from_config(cfg, &info)?, creative),
        };
        log::info!(
            "world seed={seed} planet={planet} galaxy={} system={} orbit={} habitable={}",
            info.galaxy,
            info.system,
            info.distance_to_star,
            params.profile.habitable
        );
        Ok(Self {
            seed,
            planet: info,
            creative,
            sampler: TerrainSampler::new(seed, Arc::new(params)),
            materials,
            save,
        })
    }

    #[inline]
    pub fn params(&self) -> &WorldGenParams {
        self.sampler.params()
    }

    pub fn meta(&self) -> WorldMeta {
        WorldMeta::new(
            self.seed,
            self.planet.planet as u32,
            self.creative,
            self.params().profile.clone(),
        )
    }
}
