use strata_chunk::codec::JOIN_DELIM;
use strata_chunk::{VoxelGrid, decode, encode};

use crate::PersistError;

/// World state handed to a newly joined participant.
#[derive(Clone, Debug, PartialEq)]
pub struct JoinPayload {
    pub seed: i32,
    pub planet: u32,
    pub chunks: Vec<VoxelGrid>,
}

/// `"{seed}~{planet}~{chunk}~{chunk}..."`.
pub fn build_join_payload<'a>(
    seed: i32,
    planet: u32,
    grids: impl IntoIterator<Item = &'a VoxelGrid>,
) -> Result<String, PersistError> {
    let mut out = format!("{seed}{JOIN_DELIM}{planet}");
    for grid in grids {
        let bytes = encode(grid)?;
        out.push(JOIN_DELIM);
        // codec output is ASCII
        out.push_str(&String::from_utf8_lossy(&bytes));
    }
    Ok(out)
}

pub fn parse_join_payload(payload: &str) -> Result<JoinPayload, PersistError> {
    let mut parts = payload.split(JOIN_DELIM);
    let seed = parts
        .next()
        .and_then(|s| s.parse().ok())
        .ok_or_else(|| PersistError::BadJoinPayload("missing seed".into()))?;
    let planet = parts
        .next()
        .and_then(|s| s.parse().ok())
        .ok_or_else(|| PersistError::BadJoinPayload("missing planet".into()))?;
    let chunks = parts
        .map(|c| decode(c.as_bytes()))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(JoinPayload {
        seed,
        planet,
        chunks,
    })
}
