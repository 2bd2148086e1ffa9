use std::collections::HashMap;
use std::fs;
use std::ops::Range;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::types::{FaceRole, MaterialId, ids};

/// Read-only material properties the mesher and sampler consult.
pub trait MaterialProperties: Send + Sync {
    /// Whether voxels of this material emit any geometry.
    fn is_drawn(&self, id: MaterialId) -> bool;
    /// Whether the material fully hides what is behind it (alpha-wise).
    fn is_opaque(&self, id: MaterialId) -> bool;
    /// Whether faces of neighbouring voxels are rendered through this material.
    fn is_transparent(&self, id: MaterialId) -> bool;
    /// Atlas tile index for the given face role.
    fn texture_index_for_face(&self, id: MaterialId, role: FaceRole) -> u16;
    /// Number of consecutive atlas tiles a face may pick from.
    fn texture_variants(&self, id: MaterialId) -> u8 {
        let _ = id;
        1
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FaceTextures {
    pub top: u16,
    pub bottom: u16,
    pub side: u16,
}

impl FaceTextures {
    pub const fn uniform(tile: u16) -> Self {
        Self {
            top: tile,
            bottom: tile,
            side: tile,
        }
    }

    #[inline]
    pub fn for_role(&self, role: FaceRole) -> u16 {
        match role {
            FaceRole::Top => self.top,
            FaceRole::Bottom => self.bottom,
            FaceRole::Side => self.side,
        }
    }

    #[inline]
    pub fn tiles(&self) -> [u16; 3] {
        [self.top, self.bottom, self.side]
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MaterialDef {
    pub id: MaterialId,
    pub name: String,
    #[serde(default = "default_true")]
    pub drawn: bool,
    #[serde(default = "default_true")]
    pub opaque: bool,
    #[serde(default)]
    pub transparent: bool,
    #[serde(default)]
    pub textures: FaceTextures,
    #[serde(default = "default_variants")]
    pub variants: u8,
}

fn default_true() -> bool {
    true
}

fn default_variants() -> u8 {
    1
}

impl MaterialDef {
    /// Atlas tiles each face may sample, base tile first.
    pub fn tile_spans(&self) -> [Range<u16>; 3] {
        let n = u16::from(self.variants.max(1));
        self.textures.tiles().map(|t| t..t.saturating_add(n))
    }

    fn solid(id: u8, name: &str, textures: FaceTextures) -> Self {
        Self {
            id: MaterialId(id),
            name: name.to_string(),
            drawn: true,
            opaque: true,
            transparent: false,
            textures,
            variants: 1,
        }
    }

    fn see_through(id: u8, name: &str, tile: u16, opaque: bool) -> Self {
        Self {
            id: MaterialId(id),
            name: name.to_string(),
            drawn: true,
            opaque,
            transparent: true,
            textures: FaceTextures::uniform(tile),
            variants: 1,
        }
    }

    fn hidden(id: u8, name: &str) -> Self {
        Self {
            id: MaterialId(id),
            name: name.to_string(),
            drawn: false,
            opaque: false,
            transparent: true,
            textures: FaceTextures::default(),
            variants: 1,
        }
    }
}

#[derive(Debug, Error)]
pub enum MaterialTableError {
    #[error("failed to read material table: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse material table: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("material id {0} is defined more than once")]
    DuplicateId(u8),
    #[error("material id 0 must stay air")]
    AirRedefined,
    #[error("variant tile {tile} of material {variant_of} is also used by material {owner}")]
    VariantOverlap { variant_of: u8, owner: u8, tile: u16 },
}

#[derive(Deserialize)]
struct MaterialsConfig {
    #[serde(default)]
    materials: Vec<MaterialDef>,
}

/// Dense id-indexed material table. Ids without a definition behave like air.
#[derive(Clone, Debug)]
pub struct MaterialTable {
    defs: Vec<Option<MaterialDef>>,
    by_name: HashMap<String, MaterialId>,
}

impl Default for MaterialTable {
    fn default() -> Self {
        Self::builtin()
    }
}

impl MaterialTable {
    pub fn empty() -> Self {
        let mut table = Self {
            defs: vec![None; 256],
            by_name: HashMap::new(),
        };
        table.insert(MaterialDef::hidden(ids::AIR, "air"));
        table
    }

    /// The default planet palette. Atlas tiles are laid out row-major, 16 per row.
    pub fn builtin() -> Self {
        let mut t = Self::empty();
        t.insert(MaterialDef::solid(ids::BARRIER, "barrier", FaceTextures::uniform(0)));
        t.insert(MaterialDef {
            variants: 3,
            ..MaterialDef::solid(ids::STONE, "stone", FaceTextures::uniform(25))
        });
        t.insert(MaterialDef::solid(ids::DIRT, "dirt", FaceTextures::uniform(2)));
        t.insert(MaterialDef::solid(
            ids::GRASS,
            "grass",
            FaceTextures {
                top: 3,
                bottom: 2,
                side: 4,
            },
        ));
        t.insert(MaterialDef::solid(ids::SAND, "sand", FaceTextures::uniform(5)));
        t.insert(MaterialDef::see_through(ids::WATER, "water", 6, false));
        t.insert(MaterialDef::solid(
            ids::LOG,
            "log",
            FaceTextures {
                top: 8,
                bottom: 8,
                side: 7,
            },
        ));
        t.insert(MaterialDef::see_through(ids::LEAVES, "leaves", 9, true));
        t.insert(MaterialDef::see_through(ids::CLOUD, "cloud", 10, false));
        t.insert(MaterialDef::solid(ids::COAL_ORE, "coal_ore", FaceTextures::uniform(11)));
        t.insert(MaterialDef::solid(ids::IRON_ORE, "iron_ore", FaceTextures::uniform(12)));
        t.insert(MaterialDef::solid(ids::GOLD_ORE, "gold_ore", FaceTextures::uniform(13)));
        t.insert(MaterialDef::solid(ids::GRAVEL, "gravel", FaceTextures::uniform(14)));
        t.insert(MaterialDef::solid(ids::SNOW, "snow", FaceTextures::uniform(15)));
        t.insert(MaterialDef::see_through(ids::CRYSTAL, "crystal", 16, false));
        t.insert(MaterialDef::solid(ids::BASALT, "basalt", FaceTextures::uniform(17)));
        t.insert(MaterialDef::solid(
            ids::CACTUS,
            "cactus",
            FaceTextures {
                top: 19,
                bottom: 19,
                side: 18,
            },
        ));
        t.insert(MaterialDef::hidden(ids::IMPORT_SENTINEL, "import_sentinel"));
        t.insert(MaterialDef::see_through(ids::GLASS, "glass", 20, false));
        t.insert(MaterialDef::solid(ids::PLANKS, "planks", FaceTextures::uniform(21)));
        t.insert(MaterialDef::solid(ids::MOSS, "moss", FaceTextures::uniform(22)));
        t.insert(MaterialDef::solid(ids::ASH, "ash", FaceTextures::uniform(23)));
        t.insert(MaterialDef::see_through(ids::LAVA, "lava", 24, true));
        t
    }

    fn insert(&mut self, def: MaterialDef) {
        let id = def.id;
        if let Some(old) = self.defs[id.0 as usize].take() {
            self.by_name.remove(&old.name);
        }
        self.by_name.insert(def.name.clone(), id);
        self.defs[id.0 as usize] = Some(def);
    }

    /// Applies definitions from TOML on top of the builtin palette.
    pub fn from_toml_str(toml_str: &str) -> Result<Self, MaterialTableError> {
        let cfg: MaterialsConfig = toml::from_str(toml_str)?;
        let mut table = Self::builtin();
        let mut seen = [false; 256];
        for def in cfg.materials {
            let ix = def.id.0 as usize;
            if def.id.is_air() {
                return Err(MaterialTableError::AirRedefined);
            }
            if seen[ix] {
                return Err(MaterialTableError::DuplicateId(def.id.0));
            }
            seen[ix] = true;
            table.insert(def);
        }
        table.check_variant_tiles()?;
        Ok(table)
    }

    /// Variant tiles past a face's base tile must not belong to another
    /// material. Base tiles may be shared (grass reuses dirt underneath).
    pub fn check_variant_tiles(&self) -> Result<(), MaterialTableError> {
        let drawn: Vec<&MaterialDef> = self.defs.iter().flatten().filter(|d| d.drawn).collect();
        for a in &drawn {
            for span in a.tile_spans() {
                for tile in span.start.saturating_add(1)..span.end {
                    let owner = drawn
                        .iter()
                        .find(|b| b.id != a.id && b.tile_spans().iter().any(|s| s.contains(&tile)));
                    if let Some(owner) = owner {
                        return Err(MaterialTableError::VariantOverlap {
                            variant_of: a.id.0,
                            owner: owner.id.0,
                            tile,
                        });
                    }
                }
            }
        }
        Ok(())
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, MaterialTableError> {
        let s = fs::read_to_string(path)?;
        Self::from_toml_str(&s)
    }

    #[inline]
    pub fn get(&self, id: MaterialId) -> Option<&MaterialDef> {
        self.defs[id.0 as usize].as_ref()
    }

    pub fn id_by_name(&self, name: &str) -> Option<MaterialId> {
        self.by_name.get(name).copied()
    }

    pub fn len(&self) -> usize {
        self.by_name.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_name.is_empty()
    }
}

impl MaterialProperties for MaterialTable {
    #[inline]
    fn is_drawn(&self, id: MaterialId) -> bool {
        self.get(id).is_some_and(|d| d.drawn)
    }

    #[inline]
    fn is_opaque(&self, id: MaterialId) -> bool {
        self.get(id).is_some_and(|d| d.opaque)
    }

    #[inline]
    fn is_transparent(&self, id: MaterialId) -> bool {
        self.get(id).is_none_or(|d| d.transparent)
    }

    #[inline]
    fn texture_index_for_face(&self, id: MaterialId, role: FaceRole) -> u16 {
        self.get(id).map_or(0, |d| d.textures.for_role(role))
    }

    #[inline]
    fn texture_variants(&self, id: MaterialId) -> u8 {
        self.get(id).map_or(1, |d| d.variants.max(1))
    }
}
