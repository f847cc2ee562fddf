//! World-space geometry: continuous positions, block coordinates, facing.
//!
//! Levels are the integer Y of a block coordinate. Every "same floor"
//! comparison in the workspace is done on levels, while movement checks use
//! squared distances on [`Vec3`] so no square roots are taken in hot paths.

use serde::{Deserialize, Serialize};

/// Height of the agent's eyes above its feet.
pub const AGENT_EYE_HEIGHT: f64 = 1.62;

/// Floor a coordinate into a block index.
///
/// `as` saturates out-of-range values and maps `NaN` to zero, which is the
/// behaviour we want for positions coming from an untrusted host.
#[allow(clippy::cast_possible_truncation)]
pub fn floor_to_i32(value: f64) -> i32 {
    value.floor() as i32
}

/// A continuous position in world space.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Vec3 {
    /// East-west axis.
    pub x: f64,
    /// Vertical axis.
    pub y: f64,
    /// North-south axis.
    pub z: f64,
}

impl Vec3 {
    /// The origin.
    pub const ZERO: Self = Self::new(0.0, 0.0, 0.0);

    /// Build a position from its components.
    pub const fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    /// Squared straight-line distance to `other`.
    pub fn distance_sq(self, other: Self) -> f64 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        let dz = self.z - other.z;
        dz.mul_add(dz, dx.mul_add(dx, dy * dy))
    }

    /// Squared distance ignoring the vertical axis.
    pub fn horizontal_distance_sq(self, other: Self) -> f64 {
        let dx = self.x - other.x;
        let dz = self.z - other.z;
        dx.mul_add(dx, dz * dz)
    }

    /// Return a copy shifted by the given deltas.
    pub fn offset(self, dx: f64, dy: f64, dz: f64) -> Self {
        Self::new(self.x + dx, self.y + dy, self.z + dz)
    }

    /// The block containing this position.
    pub fn block_pos(self) -> BlockPos {
        BlockPos::new(floor_to_i32(self.x), floor_to_i32(self.y), floor_to_i32(self.z))
    }

    /// The level (block Y) this position stands on.
    pub fn level(self) -> i32 {
        floor_to_i32(self.y)
    }
}

/// Integer block coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct BlockPos {
    /// East-west axis.
    pub x: i32,
    /// Vertical axis (the level).
    pub y: i32,
    /// North-south axis.
    pub z: i32,
}

impl BlockPos {
    /// Build a block position from its components.
    pub const fn new(x: i32, y: i32, z: i32) -> Self {
        Self { x, y, z }
    }

    /// Shift by the given deltas, saturating at the coordinate bounds.
    pub const fn offset(self, dx: i32, dy: i32, dz: i32) -> Self {
        Self::new(
            self.x.saturating_add(dx),
            self.y.saturating_add(dy),
            self.z.saturating_add(dz),
        )
    }

    /// The block directly above.
    pub const fn above(self) -> Self {
        self.offset(0, 1, 0)
    }

    /// The block directly below.
    pub const fn below(self) -> Self {
        self.offset(0, -1, 0)
    }

    /// Move `steps` blocks along a cardinal direction.
    pub const fn step(self, direction: Cardinal, steps: i32) -> Self {
        let (dx, dz) = direction.unit();
        self.offset(dx.saturating_mul(steps), 0, dz.saturating_mul(steps))
    }

    /// Centre of the block.
    pub fn center(self) -> Vec3 {
        Vec3::new(
            f64::from(self.x) + 0.5,
            f64::from(self.y) + 0.5,
            f64::from(self.z) + 0.5,
        )
    }

    /// Centre of the block's bottom face, where an agent standing in it has
    /// its feet.
    pub fn bottom_center(self) -> Vec3 {
        Vec3::new(f64::from(self.x) + 0.5, f64::from(self.y), f64::from(self.z) + 0.5)
    }
}

impl core::fmt::Display for BlockPos {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}, {}, {}", self.x, self.y, self.z)
    }
}

/// The four horizontal compass directions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Cardinal {
    /// Negative Z.
    North,
    /// Positive Z.
    South,
    /// Positive X.
    East,
    /// Negative X.
    West,
}

impl Cardinal {
    /// All four directions in a fixed order.
    pub const ALL: [Self; 4] = [Self::North, Self::South, Self::East, Self::West];

    /// Unit `(dx, dz)` step for this direction.
    pub const fn unit(self) -> (i32, i32) {
        match self {
            Self::North => (0, -1),
            Self::South => (0, 1),
            Self::East => (1, 0),
            Self::West => (-1, 0),
        }
    }
}

/// Look direction in degrees.
///
/// Yaw 0 faces south (+Z) and grows clockwise seen from above; pitch is
/// positive when looking down.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Facing {
    /// Horizontal rotation in degrees.
    pub yaw: f64,
    /// Vertical rotation in degrees.
    pub pitch: f64,
}

impl Facing {
    /// The facing that looks from `from` straight at `to`.
    pub fn towards(from: Vec3, to: Vec3) -> Self {
        let dx = to.x - from.x;
        let dy = to.y - from.y;
        let dz = to.z - from.z;
        let horizontal = dx.hypot(dz);
        Self {
            yaw: dz.atan2(dx).to_degrees() - 90.0,
            pitch: -dy.atan2(horizontal).to_degrees(),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn block_pos_floors_negative_coordinates() {
        let pos = Vec3::new(-0.2, 64.9, 3.0).block_pos();
        assert_eq!(pos, BlockPos::new(-1, 64, 3));
        assert_eq!(Vec3::new(0.5, -0.1, 0.5).level(), -1);
    }

    #[test]
    fn floor_to_i32_saturates() {
        assert_eq!(floor_to_i32(f64::MAX), i32::MAX);
        assert_eq!(floor_to_i32(f64::NAN), 0);
    }

    #[test]
    fn step_moves_along_cardinals() {
        let origin = BlockPos::new(10, 64, 10);
        assert_eq!(origin.step(Cardinal::North, 2), BlockPos::new(10, 64, 8));
        assert_eq!(origin.step(Cardinal::East, 2), BlockPos::new(12, 64, 10));
    }

    #[test]
    fn horizontal_distance_ignores_height() {
        let a = Vec3::new(0.0, 0.0, 0.0);
        let b = Vec3::new(3.0, 100.0, 4.0);
        assert!((a.horizontal_distance_sq(b) - 25.0).abs() < 1e-9);
        assert!(a.distance_sq(b) > 10_000.0);
    }

    #[test]
    fn facing_south_is_zero_yaw() {
        let facing = Facing::towards(Vec3::ZERO, Vec3::new(0.0, 0.0, 5.0));
        assert!(facing.yaw.abs() < 1e-9);
        assert!(facing.pitch.abs() < 1e-9);

        let east = Facing::towards(Vec3::ZERO, Vec3::new(5.0, 0.0, 0.0));
        assert!((east.yaw + 90.0).abs() < 1e-9);

        let down = Facing::towards(Vec3::ZERO, Vec3::new(0.0, -1.0, 1.0));
        assert!(down.pitch > 0.0);
    }
}
