//! Compact ASCII chunk format.
//!
//! A payload is `"{cx},{cz}:"` followed by one column per `(x, z)` pair
//! (x outer, z inner), each column listing its cells bottom to top as one
//! alphabet symbol per cell and ending in [`COLUMN_SEP`]. The body is then
//! run-length encoded: a run of `n > 1` identical symbols becomes `{n}{symbol}`.
//! Separators are always literal and never counted. Orientation bytes are not
//! stored; decoded cells carry orientation 0.

use strata_blocks::{MaterialId, VoxelCell};
use strata_world::{CHUNK_HEIGHT, CHUNK_WIDTH, ChunkCoord};
use thiserror::Error;

use crate::VoxelGrid;

pub const ALPHABET: &[u8; 56] = b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ!#$%";
pub const COLUMN_SEP: char = '/';
pub const HEADER_SEP: char = ':';
/// Reserved between chunks when many payloads are concatenated.
pub const JOIN_DELIM: char = '~';

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CodecError {
    #[error("malformed chunk payload: {0}")]
    MalformedSave(String),
    #[error("material {material} at ({x},{y},{z}) is outside the codec alphabet")]
    OutOfRangeMaterial {
        material: u8,
        x: usize,
        y: usize,
        z: usize,
    },
}

fn malformed(msg: impl Into<String>) -> CodecError {
    CodecError::MalformedSave(msg.into())
}

#[inline]
pub fn symbol_for(material: MaterialId) -> Option<char> {
    ALPHABET.get(material.0 as usize).map(|&b| b as char)
}

#[inline]
pub fn material_for(symbol: char) -> Option<MaterialId> {
    if !symbol.is_ascii() {
        return None;
    }
    ALPHABET
        .iter()
        .position(|&b| b == symbol as u8)
        .map(|i| MaterialId(i as u8))
}

/// Run-length encodes `input`, splitting runs longer than `max_run`.
pub fn rle_encode(input: &str, max_run: usize) -> String {
    let max_run = max_run.max(1);
    let mut out = String::with_capacity(input.len() / 2);
    let mut chars = input.chars().peekable();
    while let Some(c) = chars.next() {
        if c == COLUMN_SEP {
            out.push(c);
            continue;
        }
        let mut run = 1;
        while run < max_run && chars.peek() == Some(&c) {
            chars.next();
            run += 1;
        }
        if run > 1 {
            out.push_str(&run.to_string());
        }
        out.push(c);
    }
    out
}

/// Expands `{count}{symbol}` runs. Counts must be in `1..=max_run` and
/// may not be attached to a separator.
pub fn rle_decode(input: &str, max_run: usize) -> Result<String, CodecError> {
    let mut out = String::with_capacity(input.len() * 4);
    let mut count: Option<usize> = None;
    for c in input.chars() {
        if let Some(d) = c.to_digit(10) {
            let n = count.unwrap_or(0) * 10 + d as usize;
            if n > max_run {
                return Err(malformed(format!("run longer than {max_run}")));
            }
            count = Some(n);
            continue;
        }
        match count.take() {
            Some(_) if c == COLUMN_SEP => {
                return Err(malformed("run count attached to column separator"));
            }
            Some(0) => return Err(malformed("zero-length run")),
            Some(n) => out.extend(std::iter::repeat_n(c, n)),
            None => out.push(c),
        }
    }
    if count.is_some() {
        return Err(malformed("truncated run"));
    }
    Ok(out)
}

pub fn encode(grid: &VoxelGrid) -> Result<Vec<u8>, CodecError> {
    let (sx, sy, sz) = grid.dims();
    let mut raw = String::with_capacity(sx * sz * (sy + 1));
    for x in 0..sx {
        for z in 0..sz {
            for y in 0..sy {
                let material = grid.get_local(x, y, z).material;
                let symbol = symbol_for(material).ok_or(CodecError::OutOfRangeMaterial {
                    material: material.0,
                    x,
                    y,
                    z,
                })?;
                raw.push(symbol);
            }
            raw.push(COLUMN_SEP);
        }
    }
    let mut out = format!("{},{}{}", grid.coord.cx, grid.coord.cz, HEADER_SEP);
    out.push_str(&rle_encode(&raw, sy));
    Ok(out.into_bytes())
}

/// Reads only the coordinate header.
pub fn decode_coord(bytes: &[u8]) -> Result<ChunkCoord, CodecError> {
    split_header(bytes).map(|(coord, _)| coord)
}

fn split_header(bytes: &[u8]) -> Result<(ChunkCoord, &str), CodecError> {
    let text = std::str::from_utf8(bytes).map_err(|_| malformed("payload is not ASCII"))?;
    let (header, body) = text
        .split_once(HEADER_SEP)
        .ok_or_else(|| malformed("missing coordinate header"))?;
    let (cx, cz) = header
        .split_once(',')
        .ok_or_else(|| malformed("coordinate header needs two values"))?;
    let cx = cx
        .parse::<i32>()
        .map_err(|e| malformed(format!("bad chunk x: {e}")))?;
    let cz = cz
        .parse::<i32>()
        .map_err(|e| malformed(format!("bad chunk z: {e}")))?;
    Ok((ChunkCoord::new(cx, cz), body))
}

pub fn decode(bytes: &[u8]) -> Result<VoxelGrid, CodecError> {
    decode_with_dims(bytes, CHUNK_WIDTH, CHUNK_HEIGHT, CHUNK_WIDTH)
}

pub fn decode_with_dims(
    bytes: &[u8],
    sx: usize,
    sy: usize,
    sz: usize,
) -> Result<VoxelGrid, CodecError> {
    let (coord, body) = split_header(bytes)?;
    let raw = rle_decode(body, sy)?;
    let Some(raw) = raw.strip_suffix(COLUMN_SEP) else {
        return Err(malformed("payload does not end with a column"));
    };
    let mut grid = VoxelGrid::with_dims(coord, sx, sy, sz);
    let mut columns = raw.split(COLUMN_SEP);
    for x in 0..sx {
        for z in 0..sz {
            let column = columns
                .next()
                .ok_or_else(|| malformed(format!("missing column ({x},{z})")))?;
            if column.len() != sy {
                return Err(malformed(format!(
                    "column ({x},{z}) has {} cells, expected {sy}",
                    column.len()
                )));
            }
            for (y, symbol) in column.chars().enumerate() {
                let material = material_for(symbol)
                    .ok_or_else(|| malformed(format!("unknown symbol {symbol:?}")))?;
                grid.set_local(x, y, z, VoxelCell::new(material));
            }
        }
    }
    if columns.next().is_some() {
        return Err(malformed("trailing columns"));
    }
    Ok(grid)
}

#[cfg(test)]
mod tests {
    use super::*;
    use strata_blocks::ids;

    #[test]
    fn literal_runs_round_trip() {
        assert_eq!(rle_encode("aaaaabbbbacaa", 96), "5a4bac2a");
        assert_eq!(rle_decode("5a4bac2a", 96).unwrap(), "aaaaabbbbacaa");
    }

    #[test]
    fn separator_is_never_counted() {
        let raw = "aaaaabbbbacaa/aa//";
        let enc = rle_encode(raw, 96);
        assert_eq!(enc, "5a4bac2a/2a//");
        assert_eq!(rle_decode(&enc, 96).unwrap(), raw);
    }

    #[test]
    fn runs_split_at_max_length() {
        let raw = "a".repeat(7);
        assert_eq!(rle_encode(&raw, 3), "3a3aa");
        assert_eq!(rle_decode("3a3aa", 3).unwrap(), raw);
        assert!(rle_decode("4a", 3).is_err());
        assert!(rle_decode("0a", 3).is_err());
        assert!(rle_decode("2/", 3).is_err());
        assert!(rle_decode("2", 3).is_err());
    }

    #[test]
    fn header_leads_payload() {
        let g = VoxelGrid::new(ChunkCoord::new(-3, 12));
        let bytes = encode(&g).unwrap();
        assert!(bytes.starts_with(b"-3,12:"));
        assert_eq!(decode_coord(&bytes).unwrap(), ChunkCoord::new(-3, 12));
        // every column is a single full-height run of air
        let body = &bytes[6..];
        assert_eq!(body, "96a/".repeat(256).as_bytes());
    }

    #[test]
    fn alphabet_bound_is_enforced() {
        let mut g = VoxelGrid::with_dims(ChunkCoord::new(0, 0), 2, 4, 2);
        g.set_local(1, 2, 0, VoxelCell::new(MaterialId(55)));
        assert!(encode(&g).is_ok());
        g.set_local(1, 3, 1, VoxelCell::new(MaterialId(56)));
        assert_eq!(
            encode(&g),
            Err(CodecError::OutOfRangeMaterial {
                material: 56,
                x: 1,
                y: 3,
                z: 1
            })
        );
    }

    #[test]
    fn malformed_payloads_are_rejected() {
        let mut g = VoxelGrid::with_dims(ChunkCoord::new(1, 1), 2, 3, 2);
        g.set_local(0, 0, 0, VoxelCell::new(MaterialId(ids::STONE)));
        let good = String::from_utf8(encode(&g).unwrap()).unwrap();
        assert_eq!(decode_with_dims(good.as_bytes(), 2, 3, 2).unwrap(), g);

        for bad in [
            "1,1",
            "x,1:3a/3a/3a/3a/",
            "1;1:3a/3a/3a/3a/",
            "1,1:3a/3a/3a/",
            "1,1:3a/3a/3a/3a",
            "1,1:3a/3a/3a/3a/3a/",
            "1,1:3a/3a/3a/2a/",
            "1,1:3a/3a/3a/2a~/",
            "1,1:3a/3a/3a/aa\u{e9}/",
        ] {
            assert!(
                matches!(
                    decode_with_dims(bad.as_bytes(), 2, 3, 2),
                    Err(CodecError::MalformedSave(_))
                ),
                "{bad} should not decode"
            );
        }
    }
}
