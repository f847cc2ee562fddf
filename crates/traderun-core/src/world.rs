//! The host boundary: everything the controller reads from or does to the
//! world goes through these traits.
//!
//! A host implements [`WorldQuery`], [`ContainerInteraction`] and
//! [`InputDriver`], which together make a [`Host`]. Pathfinding is an
//! optional capability reached through [`Host::navigator`]; hosts without
//! one get the controller's direct-walk fallback.

use traderun_types::{
    BlockInfo, BlockPos, Facing, ItemStack, ScreenKind, Signal, SlotView, TargetSnapshot,
    ToleranceClass, Vec3,
};

/// Read-only view of the world around the agent.
pub trait WorldQuery {
    /// The agent's feet position.
    fn agent_position(&self) -> Vec3;

    /// The agent's eye position.
    fn agent_eye_position(&self) -> Vec3;

    /// Live targets within `radius` of `center`.
    fn entities_within(&self, center: Vec3, radius: f64) -> Vec<TargetSnapshot>;

    /// The block at `pos`.
    fn block_at(&self, pos: BlockPos) -> BlockInfo;

    /// Whether nothing solid lies between two points.
    fn line_of_sight(&self, from: Vec3, to: Vec3) -> bool;

    /// World time of day in ticks, `None` when the world has no day cycle.
    fn time_of_day(&self) -> Option<u64>;

    /// The agent's main inventory slots.
    fn inventory(&self) -> Vec<Option<ItemStack>>;

    /// The screen currently shown, if any.
    fn open_screen(&self) -> Option<ScreenKind>;

    /// Whether the host is paused (menu open, window unfocused).
    fn is_paused(&self) -> bool;

    /// Whether the operator has taken over the agent's controls.
    fn override_requested(&self) -> bool;
}

/// Interaction with an opened storage container.
pub trait ContainerInteraction {
    /// Try to open the container at `anchor`. Returns whether the attempt
    /// was made; the screen appears on a later tick.
    fn open_at(&mut self, anchor: BlockPos) -> bool;

    /// Every slot of the open container screen, container slots first.
    /// Empty when no container is open.
    fn slots(&self) -> Vec<SlotView>;

    /// Quick-move the stack in slot `index` to the other side.
    fn transfer_slot(&mut self, index: usize);

    /// Close whatever screen is open.
    fn close(&mut self);
}

/// Simulated player input.
pub trait InputDriver {
    /// Hold a signal down.
    fn press(&mut self, signal: Signal);

    /// Let go of a signal.
    fn release(&mut self, signal: Signal);

    /// Let go of every signal.
    fn release_all(&mut self);

    /// Turn the agent.
    fn set_facing(&mut self, facing: Facing);
}

/// An external pathfinder.
pub trait Navigator {
    /// Start pathing to `goal`. Returns whether a path search was started.
    fn set_goal(&mut self, goal: BlockPos, tolerance: ToleranceClass) -> bool;

    /// Stop pathing.
    fn cancel(&mut self);

    /// Whether a path is being followed.
    fn is_pathing(&self) -> bool;
}

/// Everything the controller needs from its environment.
pub trait Host: WorldQuery + ContainerInteraction + InputDriver {
    /// The pathfinder, when the host has one.
    fn navigator(&mut self) -> Option<&mut dyn Navigator> {
        None
    }
}
