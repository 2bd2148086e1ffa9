/// Tiles per atlas row and column.
pub const ATLAS_TILES: u16 = 16;

/// `(u0, v0, u1, v1)` for a tile. Row 0 is the top of the image, so V is flipped.
#[inline]
pub fn tile_uv(index: u16) -> (f32, f32, f32, f32) {
    let n = ATLAS_TILES as f32;
    let col = (index % ATLAS_TILES) as f32;
    let row = (index / ATLAS_TILES) as f32;
    let u0 = col / n;
    let u1 = (col + 1.0) / n;
    let v0 = 1.0 - (row + 1.0) / n;
    let v1 = 1.0 - row / n;
    (u0, v0, u1, v1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_tile_sits_at_top_left() {
        assert_eq!(tile_uv(0), (0.0, 0.9375, 0.0625, 1.0));
        assert_eq!(tile_uv(17), (0.0625, 0.875, 0.125, 0.9375));
        assert_eq!(tile_uv(255), (0.9375, 0.0, 1.0, 0.0625));
    }
}
