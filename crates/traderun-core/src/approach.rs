//! Approach tile search around a target.
//!
//! Straight tiles (two blocks out along a cardinal axis) are preferred
//! because the agent faces the target squarely from them. When none is
//! usable the search widens to three blocks out with a one-level band, then
//! to a 5x5 ring on the target's level, then a 7x7 ring with the band.

use traderun_types::{AGENT_EYE_HEIGHT, BlockPos, Cardinal, TargetSnapshot, Vec3};

use crate::world::WorldQuery;

/// Floor blocks that trap or tip the agent in tight spaces.
const AWKWARD_FLOORS: [&str; 4] = ["brewing_stand", "cauldron", "bed", "composter"];

/// Tallest collision shape a tile may have and still count as walkable.
const MAX_TILE_COLLISION: f64 = 0.3;

/// Preferred straight distance from the target.
const STRAIGHT_STEPS: i32 = 2;

/// Fallback straight distance from the target.
const WIDE_STRAIGHT_STEPS: i32 = 3;

/// Half-width of the first ring.
const RING_RADIUS: i32 = 2;

/// Half-width of the wide ring.
const WIDE_RING_RADIUS: i32 = 3;

/// A chosen tile to stand on while trading.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ApproachTile {
    /// The block the agent stands in.
    pub pos: BlockPos,
    /// Whether the tile is off the four straight two-step tiles, so the
    /// agent may need a nudge to face the target.
    pub diagonal: bool,
}

impl ApproachTile {
    fn new(target: &TargetSnapshot, pos: BlockPos) -> Self {
        Self {
            pos,
            diagonal: is_diagonal(target.position.block_pos(), pos),
        }
    }
}

/// Best tile for `target`: straight first, then the rings.
pub fn find_approach(
    world: &(impl WorldQuery + ?Sized),
    target: &TargetSnapshot,
) -> Option<ApproachTile> {
    find_straight(world, target)
        .or_else(|| find_ring(world, target, None))
        .map(|pos| ApproachTile::new(target, pos))
}

/// Any ring tile other than `exclude`, for when the first tile hung.
pub fn find_alternate(
    world: &(impl WorldQuery + ?Sized),
    target: &TargetSnapshot,
    exclude: BlockPos,
) -> Option<ApproachTile> {
    find_ring(world, target, Some(exclude)).map(|pos| ApproachTile::new(target, pos))
}

/// The closest usable straight tile.
pub fn find_straight(
    world: &(impl WorldQuery + ?Sized),
    target: &TargetSnapshot,
) -> Option<BlockPos> {
    let base = target.position.block_pos();
    let agent = world.agent_position();

    let near: Vec<BlockPos> = Cardinal::ALL
        .iter()
        .map(|dir| base.step(*dir, STRAIGHT_STEPS))
        .filter(|pos| is_valid_tile(world, target, *pos))
        .collect();
    if !near.is_empty() {
        return closest_to(&near, agent);
    }

    let wide: Vec<BlockPos> = (-1..=1)
        .flat_map(|dy| {
            Cardinal::ALL
                .iter()
                .map(move |dir| base.step(*dir, WIDE_STRAIGHT_STEPS).offset(0, dy, 0))
        })
        .filter(|pos| is_valid_tile(world, target, *pos))
        .collect();
    closest_to(&wide, agent)
}

/// The closest usable ring tile, skipping `exclude`.
pub fn find_ring(
    world: &(impl WorldQuery + ?Sized),
    target: &TargetSnapshot,
    exclude: Option<BlockPos>,
) -> Option<BlockPos> {
    let base = target.position.block_pos();
    let agent = world.agent_position();
    let usable = |pos: &BlockPos| Some(*pos) != exclude && is_valid_tile(world, target, *pos);

    let ring: Vec<BlockPos> = square(RING_RADIUS)
        .filter(|(dx, dz)| *dx != 0 || *dz != 0)
        .map(|(dx, dz)| base.offset(dx, 0, dz))
        .filter(usable)
        .collect();
    if !ring.is_empty() {
        return closest_to(&ring, agent);
    }

    let wide: Vec<BlockPos> = (-1..=1)
        .flat_map(|dy| square(WIDE_RING_RADIUS).map(move |(dx, dz)| (dx, dy, dz)))
        // The same-level inner square was searched above.
        .filter(|(dx, dy, dz)| {
            *dy != 0 || dx.abs() > RING_RADIUS || dz.abs() > RING_RADIUS
        })
        .map(|(dx, dy, dz)| base.offset(dx, dy, dz))
        .filter(usable)
        .collect();
    closest_to(&wide, agent)
}

/// Whether the agent can stand on `tile` and see `target` from it.
///
/// The block below must be a non-awkward floor, the tile itself must not
/// obstruct (carpets and pressure plates are fine, slabs are not), the
/// head block must be free and the line from the agent's eye on the tile
/// to the target's eye must be clear.
pub fn is_valid_tile(
    world: &(impl WorldQuery + ?Sized),
    target: &TargetSnapshot,
    tile: BlockPos,
) -> bool {
    let floor = world.block_at(tile.below());
    if floor.air || AWKWARD_FLOORS.iter().any(|name| floor.name.contains(name)) {
        return false;
    }

    let feet = world.block_at(tile);
    if feet.solid || (!feet.air && feet.collision_top > MAX_TILE_COLLISION) {
        return false;
    }

    if world.block_at(tile.above()).solid {
        return false;
    }

    let eye = tile.bottom_center().offset(0.0, AGENT_EYE_HEIGHT, 0.0);
    world.line_of_sight(eye, target.eye_position())
}

/// Whether `tile` is anything but one of the four straight two-step tiles
/// around `target_block`.
pub fn is_diagonal(target_block: BlockPos, tile: BlockPos) -> bool {
    !Cardinal::ALL
        .iter()
        .any(|dir| target_block.step(*dir, STRAIGHT_STEPS) == tile)
}

fn square(radius: i32) -> impl Iterator<Item = (i32, i32)> {
    (-radius..=radius).flat_map(move |dx| (-radius..=radius).map(move |dz| (dx, dz)))
}

fn closest_to(candidates: &[BlockPos], agent: Vec3) -> Option<BlockPos> {
    candidates
        .iter()
        .min_by(|a, b| {
            a.bottom_center()
                .distance_sq(agent)
                .total_cmp(&b.bottom_center().distance_sq(agent))
        })
        .copied()
}
