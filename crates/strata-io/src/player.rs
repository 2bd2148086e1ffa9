use crate::PersistError;

pub const INVENTORY_SLOTS: usize = 9;
const RECORD_INTS: usize = 4 + INVENTORY_SLOTS * 2;

/// Position, health and nine `(material, quantity)` inventory slots.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PlayerRecord {
    pub x: i32,
    pub y: i32,
    pub z: i32,
    pub hp: i32,
    pub inventory: [(u8, i32); INVENTORY_SLOTS],
}

impl PlayerRecord {
    /// 22 little-endian `i32`s.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut ints = Vec::with_capacity(RECORD_INTS);
        ints.extend([self.x, self.y, self.z, self.hp]);
        for (material, qty) in self.inventory {
            ints.push(i32::from(material));
            ints.push(qty);
        }
        ints.into_iter().flat_map(i32::to_le_bytes).collect()
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, PersistError> {
        if bytes.len() != RECORD_INTS * 4 {
            return Err(PersistError::BadPlayerRecord(format!(
                "expected {} bytes, found {}",
                RECORD_INTS * 4,
                bytes.len()
            )));
        }
        let ints: Vec<i32> = bytes
            .chunks_exact(4)
            .map(|b| i32::from_le_bytes([b[0], b[1], b[2], b[3]]))
            .collect();
        let mut inventory = [(0u8, 0i32); INVENTORY_SLOTS];
        for (slot, pair) in inventory.iter_mut().zip(ints[4..].chunks_exact(2)) {
            let material = u8::try_from(pair[0]).map_err(|_| {
                PersistError::BadPlayerRecord(format!("material id {} out of range", pair[0]))
            })?;
            *slot = (material, pair[1]);
        }
        Ok(Self {
            x: ints[0],
            y: ints[1],
            z: ints[2],
            hp: ints[3],
            inventory,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layout_is_fixed_little_endian() {
        let mut r = PlayerRecord {
            x: -5,
            y: 64,
            z: 1,
            hp: 20,
            ..Default::default()
        };
        r.inventory[1] = (4, 32);
        let bytes = r.to_bytes();
        assert_eq!(bytes.len(), 88);
        assert_eq!(&bytes[0..4], &(-5i32).to_le_bytes());
        assert_eq!(&bytes[24..28], &4i32.to_le_bytes());
        assert_eq!(&bytes[28..32], &32i32.to_le_bytes());
        assert_eq!(PlayerRecord::from_bytes(&bytes).unwrap(), r);
        assert!(PlayerRecord::from_bytes(&bytes[..84]).is_err());
    }
}
