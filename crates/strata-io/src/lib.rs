//! On-disk layout for one planet save plus the network join payload.
#![forbid(unsafe_code)]

mod join;
mod player;

use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};
use strata_chunk::{CodecError, VoxelGrid, decode, encode};
use strata_world::{ChunkCoord, PlanetInfo, PlanetProfile};
use thiserror::Error;

pub use join::{JoinPayload, build_join_payload, parse_join_payload};
pub use player::{INVENTORY_SLOTS, PlayerRecord};

#[derive(Debug, Error)]
pub enum PersistError {
    #[error("io error: {0}")]
    Io(#[from] io::Error),
    #[error("failed to parse world metadata: {0}")]
    TomlDe(#[from] toml::de::Error),
    #[error("failed to serialise world metadata: {0}")]
    TomlSer(#[from] toml::ser::Error),
    #[error(transparent)]
    Codec(#[from] CodecError),
    #[error("bad player record: {0}")]
    BadPlayerRecord(String),
    #[error("bad join payload: {0}")]
    BadJoinPayload(String),
}

pub const WORLD_FILE: &str = "world.toml";
pub const CHUNK_EXT: &str = "chunk";
pub const PLAYER_EXT: &str = "player";

/// Everything needed to restore a planet besides its chunks.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct WorldMeta {
    pub seed: i32,
    pub planet: u32,
    pub creative: bool,
    pub galaxy: i64,
    pub system: i64,
    pub distance_to_star: i64,
    pub profile: PlanetProfile,
}

impl WorldMeta {
    pub fn new(seed: i32, planet: u32, creative: bool, profile: PlanetProfile) -> Self {
        let info = PlanetInfo::new(planet);
        Self {
            seed,
            planet,
            creative,
            galaxy: info.galaxy,
            system: info.system,
            distance_to_star: info.distance_to_star,
            profile,
        }
    }
}

/// `{root}/{seed}_{planet}/` with `world.toml`, `chunks/` and `players/`.
#[derive(Clone, Debug)]
pub struct SaveRoot {
    dir: PathBuf,
    seed: i32,
    planet: u32,
}

impl SaveRoot {
    pub fn new(root: impl AsRef<Path>, seed: i32, planet: u32) -> Self {
        Self {
            dir: root.as_ref().join(format!("{seed}_{planet}")),
            seed,
            planet,
        }
    }

    #[inline]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    #[inline]
    pub fn seed(&self) -> i32 {
        self.seed
    }

    #[inline]
    pub fn planet(&self) -> u32 {
        self.planet
    }

    fn chunks_dir(&self) -> PathBuf {
        self.dir.join("chunks")
    }

    fn players_dir(&self) -> PathBuf {
        self.dir.join("players")
    }

    pub fn chunk_path(&self, coord: ChunkCoord) -> PathBuf {
        self.chunks_dir()
            .join(format!("{}-{}.{CHUNK_EXT}", coord.cx, coord.cz))
    }

    pub fn save_meta(&self, meta: &WorldMeta) -> Result<(), PersistError> {
        let text = toml::to_string(meta)?;
        write_atomic(&self.dir.join(WORLD_FILE), text.as_bytes())?;
        Ok(())
    }

    pub fn load_meta(&self) -> Result<Option<WorldMeta>, PersistError> {
        let path = self.dir.join(WORLD_FILE);
        if !path.exists() {
            return Ok(None);
        }
        let text = fs::read_to_string(path)?;
        Ok(Some(toml::from_str(&text)?))
    }

    /// Encodes before touching disk, so an out-of-range material leaves no file behind.
    pub fn save_chunk(&self, grid: &VoxelGrid) -> Result<(), PersistError> {
        let bytes = encode(grid)?;
        write_atomic(&self.chunk_path(grid.coord), &bytes)?;
        log::trace!(target: "io", "wrote chunk {:?} ({} bytes)", grid.coord, bytes.len());
        Ok(())
    }

    /// `Ok(None)` when no file exists. A payload whose header names a
    /// different chunk is reported as malformed.
    pub fn load_chunk(&self, coord: ChunkCoord) -> Result<Option<VoxelGrid>, PersistError> {
        let bytes = match fs::read(self.chunk_path(coord)) {
            Ok(b) => b,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let grid = decode(&bytes)?;
        if grid.coord != coord {
            return Err(CodecError::MalformedSave(format!(
                "file for {coord:?} holds {:?}",
                grid.coord
            ))
            .into());
        }
        Ok(Some(grid))
    }

    pub fn remove_chunk(&self, coord: ChunkCoord) -> Result<(), PersistError> {
        match fs::remove_file(self.chunk_path(coord)) {
            Err(e) if e.kind() != io::ErrorKind::NotFound => Err(e.into()),
            _ => Ok(()),
        }
    }

    /// Coordinates of every chunk file, sorted.
    pub fn list_chunks(&self) -> Result<Vec<ChunkCoord>, PersistError> {
        let dir = self.chunks_dir();
        if !dir.exists() {
            return Ok(Vec::new());
        }
        let mut out = Vec::new();
        for entry in fs::read_dir(dir)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some(CHUNK_EXT) {
                continue;
            }
            match path.file_stem().and_then(|s| s.to_str()).and_then(parse_chunk_stem) {
                Some(c) => out.push(c),
                None => log::warn!(target: "io", "ignoring stray chunk file {}", path.display()),
            }
        }
        out.sort_unstable();
        Ok(out)
    }

    fn player_path(&self, name: &str) -> Result<PathBuf, PersistError> {
        let valid = !name.is_empty()
            && name
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
        if !valid {
            return Err(PersistError::BadPlayerRecord(format!(
                "invalid player name {name:?}"
            )));
        }
        Ok(self.players_dir().join(format!("{name}.{PLAYER_EXT}")))
    }

    /// Slot 0 is the creative slot and is written as zeros outside creative mode.
    pub fn save_player(
        &self,
        name: &str,
        record: &PlayerRecord,
        creative: bool,
    ) -> Result<(), PersistError> {
        let path = self.player_path(name)?;
        let mut record = record.clone();
        if !creative {
            record.inventory[0] = (0, 0);
        }
        write_atomic(&path, &record.to_bytes())?;
        Ok(())
    }

    pub fn load_player(&self, name: &str) -> Result<Option<PlayerRecord>, PersistError> {
        let path = self.player_path(name)?;
        match fs::read(path) {
            Ok(b) => PlayerRecord::from_bytes(&b).map(Some),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Join payload built from every persisted chunk. Unreadable files are skipped with a warning.
    pub fn join_payload(&self) -> Result<String, PersistError> {
        let mut grids = Vec::new();
        for coord in self.list_chunks()? {
            match self.load_chunk(coord) {
                Ok(Some(g)) => grids.push(g),
                Ok(None) => {}
                Err(e) => log::warn!(target: "io", "skipping chunk {coord:?} in join payload: {e}"),
            }
        }
        build_join_payload(self.seed, self.planet, grids.iter())
    }
}

/// Parses `"{cx}-{cz}"`, where either value may itself be negative.
fn parse_chunk_stem(stem: &str) -> Option<ChunkCoord> {
    stem.char_indices()
        .filter(|&(i, c)| c == '-' && i > 0)
        .find_map(|(i, _)| {
            let cx = stem[..i].parse().ok()?;
            let cz = stem[i + 1..].parse().ok()?;
            Some(ChunkCoord::new(cx, cz))
        })
}

static TMP_SEQ: AtomicU64 = AtomicU64::new(0);

/// Sibling temp name unique to this process and call, so concurrent writers
/// of the same file never share a temp file.
fn tmp_path(path: &Path) -> PathBuf {
    let seq = TMP_SEQ.fetch_add(1, Ordering::Relaxed);
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(format!(".{}.{seq}.tmp", std::process::id()));
    PathBuf::from(tmp)
}

/// Writes to a sibling temp file and renames it over `path`.
fn write_atomic(path: &Path, bytes: &[u8]) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let tmp = tmp_path(path);
    let written = File::create(&tmp).and_then(|mut file| {
        file.write_all(bytes)?;
        file.sync_all()
    });
    if let Err(e) = written {
        let _ = fs::remove_file(&tmp);
        return Err(e);
    }
    fs::rename(&tmp, path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chunk_stems_parse_with_negatives() {
        assert_eq!(parse_chunk_stem("3-4"), Some(ChunkCoord::new(3, 4)));
        assert_eq!(parse_chunk_stem("-1--2"), Some(ChunkCoord::new(-1, -2)));
        assert_eq!(parse_chunk_stem("-7-0"), Some(ChunkCoord::new(-7, 0)));
        assert_eq!(parse_chunk_stem("12--9"), Some(ChunkCoord::new(12, -9)));
        assert_eq!(parse_chunk_stem("12"), None);
        assert_eq!(parse_chunk_stem("a-b"), None);
    }

    #[test]
    fn temp_names_never_repeat() {
        let path = Path::new("chunks/0-0.chunk");
        let a = tmp_path(path);
        let b = tmp_path(path);
        assert_ne!(a, b);
        assert!(a.to_string_lossy().starts_with("chunks/0-0.chunk."));
        assert_eq!(a.extension().and_then(|e| e.to_str()), Some("tmp"));
    }
}
