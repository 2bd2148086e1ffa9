use strata_blocks::FaceRole;

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum Face {
    PosY = 0,
    NegY = 1,
    PosX = 2,
    NegX = 3,
    PosZ = 4,
    NegZ = 5,
}

impl Face {
    pub const ALL: [Face; 6] = [
        Face::PosY,
        Face::NegY,
        Face::PosX,
        Face::NegX,
        Face::PosZ,
        Face::NegZ,
    ];

    #[inline]
    pub fn index(self) -> usize {
        self as usize
    }

    #[inline]
    pub fn normal(self) -> [f32; 3] {
        let (dx, dy, dz) = self.delta();
        [dx as f32, dy as f32, dz as f32]
    }

    /// Grid step `(dx,dy,dz)` out of this face.
    #[inline]
    pub fn delta(self) -> (i32, i32, i32) {
        match self {
            Face::PosY => (0, 1, 0),
            Face::NegY => (0, -1, 0),
            Face::PosX => (1, 0, 0),
            Face::NegX => (-1, 0, 0),
            Face::PosZ => (0, 0, 1),
            Face::NegZ => (0, 0, -1),
        }
    }

    #[inline]
    pub fn role(self) -> FaceRole {
        match self {
            Face::PosY => FaceRole::Top,
            Face::NegY => FaceRole::Bottom,
            _ => FaceRole::Side,
        }
    }

    /// Corners of the unit cube face at `(x,y,z)`, counter-clockwise seen from outside.
    pub fn corners(self, x: f32, y: f32, z: f32) -> [[f32; 3]; 4] {
        let (x1, y1, z1) = (x + 1.0, y + 1.0, z + 1.0);
        match self {
            Face::PosY => [[x, y1, z], [x, y1, z1], [x1, y1, z1], [x1, y1, z]],
            Face::NegY => [[x, y, z], [x1, y, z], [x1, y, z1], [x, y, z1]],
            Face::PosX => [[x1, y, z], [x1, y1, z], [x1, y1, z1], [x1, y, z1]],
            Face::NegX => [[x, y, z], [x, y, z1], [x, y1, z1], [x, y1, z]],
            Face::PosZ => [[x, y, z1], [x1, y, z1], [x1, y1, z1], [x, y1, z1]],
            Face::NegZ => [[x, y, z], [x, y1, z], [x1, y1, z], [x1, y, z]],
        }
    }
}
