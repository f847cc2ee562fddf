//! One bounded withdraw or deposit interaction with a storage container.
//!
//! A [`ContainerSession`] opens the container, learns the site's item from
//! the top-left external slot, moves stacks one throttled click at a time
//! and finishes with exactly one [`SessionOutcome`]. Once it has finished
//! it closes the screen and ignores further ticks.

use rand::Rng;
use tracing::{debug, info};
use traderun_types::{
    BlockPos, Deadline, ItemId, ItemStack, ScreenKind, SlotOwner, SlotView, Timer, Timestamp,
};

use crate::config::ContainerConfig;
use crate::inventory::{count_item, empty_slots};
use crate::world::Host;

/// What a session moves.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransferMode {
    /// Take the site's item until `reserved_empty` agent slots remain free.
    Withdraw {
        /// Agent slots to leave empty.
        reserved_empty: u32,
        /// Count the agent should end up with; zero for no minimum.
        desired_min: u32,
    },
    /// Put every carried stack of the site's item into the container.
    DepositSelected,
    /// Put every carried stack of a given item into the container.
    DepositSpecific(ItemId),
}

impl TransferMode {
    const fn is_withdraw(&self) -> bool {
        matches!(self, Self::Withdraw { .. })
    }
}

/// How a session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionOutcome {
    /// Everything that should move moved.
    Completed,
    /// A deposit stopped making progress with items still carried.
    Full {
        /// Items left in the agent's inventory.
        remainder: u32,
    },
    /// The site's item has never been seen in its top-left slot.
    UnknownItem,
    /// A withdraw found nothing to take and the agent is below its minimum.
    ContainerEmpty,
    /// A withdraw ran out of agent space before reaching its minimum.
    InventoryFull {
        /// Items still missing.
        short_by: u32,
    },
    /// The container never opened.
    NotOpened,
    /// The session outlived its timeout.
    TimedOut,
    /// The screen closed and stayed closed.
    Closed,
}

impl SessionOutcome {
    /// Whether the session moved everything it set out to move.
    pub const fn is_success(self) -> bool {
        matches!(self, Self::Completed)
    }
}

impl core::fmt::Display for SessionOutcome {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::Completed => f.write_str("completed"),
            Self::Full { remainder } => write!(f, "container full, {remainder} left"),
            Self::UnknownItem => {
                f.write_str("item unknown: put it in the container's first slot once")
            }
            Self::ContainerEmpty => f.write_str("container empty"),
            Self::InventoryFull { short_by } => write!(f, "inventory full, short by {short_by}"),
            Self::NotOpened => f.write_str("container did not open"),
            Self::TimedOut => f.write_str("container session timed out"),
            Self::Closed => f.write_str("container screen closed unexpectedly"),
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum Phase {
    Opening {
        started: Timer,
    },
    Transferring {
        started: Timer,
        last_progress: Timestamp,
        last_count: u32,
        last_empty: u32,
        closed_since: Option<Timestamp>,
    },
    Done(SessionOutcome),
}

/// A single container interaction.
#[derive(Debug, Clone)]
pub struct ContainerSession {
    config: ContainerConfig,
    mode: TransferMode,
    anchor: BlockPos,
    item: Option<ItemId>,
    phase: Phase,
    next_click: Deadline,
    moved: u32,
}

impl ContainerSession {
    /// Start a session against the container at `anchor`.
    ///
    /// `known_item` preseeds the site's item; the top-left slot overrides
    /// it once the container is open.
    pub fn new(
        config: ContainerConfig,
        mode: TransferMode,
        anchor: BlockPos,
        known_item: Option<ItemId>,
        now: Timestamp,
    ) -> Self {
        let item = match &mode {
            TransferMode::DepositSpecific(item) => Some(item.clone()),
            _ => known_item,
        };
        Self {
            config,
            mode,
            anchor,
            item,
            phase: Phase::Opening {
                started: Timer::start(now),
            },
            next_click: Deadline::PASSED,
            moved: 0,
        }
    }

    /// The container this session works on.
    pub const fn anchor(&self) -> BlockPos {
        self.anchor
    }

    /// The transfer mode.
    pub const fn mode(&self) -> &TransferMode {
        &self.mode
    }

    /// The item the session is moving, once known.
    pub const fn item(&self) -> Option<&ItemId> {
        self.item.as_ref()
    }

    /// Clicks that moved something.
    pub const fn moved(&self) -> u32 {
        self.moved
    }

    /// The outcome, once finished.
    pub const fn outcome(&self) -> Option<SessionOutcome> {
        match self.phase {
            Phase::Done(outcome) => Some(outcome),
            _ => None,
        }
    }

    /// Whether the container screen has been seen open.
    pub const fn is_open(&self) -> bool {
        matches!(self.phase, Phase::Transferring { .. })
    }

    /// Advance the session by one frame. Returns the outcome on the tick it
    /// finishes and on every tick after.
    pub fn tick(
        &mut self,
        host: &mut dyn Host,
        rng: &mut impl Rng,
        now: Timestamp,
    ) -> Option<SessionOutcome> {
        let outcome = match self.phase {
            Phase::Done(outcome) => return Some(outcome),
            Phase::Opening { started } => self.tick_opening(host, rng, now, started),
            Phase::Transferring { .. } => self.tick_transferring(host, rng, now),
        };
        if let Some(outcome) = outcome {
            self.finish(host, outcome);
        }
        outcome
    }

    /// Close the screen and end the session without an outcome of its own.
    pub fn abort(&mut self, host: &mut dyn Host) {
        if !matches!(self.phase, Phase::Done(_)) {
            self.finish(host, SessionOutcome::Closed);
        }
    }

    fn finish(&mut self, host: &mut dyn Host, outcome: SessionOutcome) {
        if host.open_screen().is_some() {
            host.close();
        }
        self.phase = Phase::Done(outcome);
        info!(
            anchor = %self.anchor,
            item = ?self.item.as_ref().map(ItemId::as_str),
            moved = self.moved,
            %outcome,
            "Container session finished"
        );
    }

    fn tick_opening(
        &mut self,
        host: &mut dyn Host,
        rng: &mut impl Rng,
        now: Timestamp,
        started: Timer,
    ) -> Option<SessionOutcome> {
        if host.open_screen() == Some(ScreenKind::Container) {
            let inventory = host.inventory();
            self.phase = Phase::Transferring {
                started: Timer::start(now),
                last_progress: now,
                last_count: self.carried(&inventory),
                last_empty: empty_slots(&inventory),
                closed_since: None,
            };
            debug!(anchor = %self.anchor, "Container open");
            return None;
        }
        if started.has_elapsed(now, self.config.open_timeout_ms) {
            return Some(SessionOutcome::NotOpened);
        }
        if self.can_click(rng, now) {
            host.open_at(self.anchor);
        }
        None
    }

    fn tick_transferring(
        &mut self,
        host: &mut dyn Host,
        rng: &mut impl Rng,
        now: Timestamp,
    ) -> Option<SessionOutcome> {
        let Phase::Transferring {
            started,
            mut last_progress,
            mut last_count,
            mut last_empty,
            mut closed_since,
        } = self.phase
        else {
            return None;
        };

        if started.has_elapsed(now, self.config.session_timeout_ms) {
            return Some(SessionOutcome::TimedOut);
        }

        if host.open_screen() == Some(ScreenKind::Container) {
            closed_since = None;
        } else {
            let since = *closed_since.get_or_insert(now);
            self.phase = Phase::Transferring {
                started,
                last_progress,
                last_count,
                last_empty,
                closed_since,
            };
            if now.millis_since(since) >= self.config.closed_grace_ms {
                return Some(SessionOutcome::Closed);
            }
            return None;
        }

        let slots = host.slots();
        let inventory = host.inventory();
        if self.learn_top_left(&slots) {
            last_count = self.carried(&inventory);
        }

        let count = self.carried(&inventory);
        let empty = empty_slots(&inventory);
        if count != last_count || empty != last_empty {
            if count != last_count {
                self.moved = self.moved.saturating_add(1);
            }
            last_progress = now;
            last_count = count;
            last_empty = empty;
        }
        self.phase = Phase::Transferring {
            started,
            last_progress,
            last_count,
            last_empty,
            closed_since,
        };
        let stalled_for = now.millis_since(last_progress);

        if self.mode.is_withdraw() {
            self.step_withdraw(host, &slots, count, empty, stalled_for, rng, now)
        } else {
            self.step_deposit(host, &slots, count, stalled_for, rng, now)
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn step_withdraw(
        &mut self,
        host: &mut dyn Host,
        slots: &[SlotView],
        count: u32,
        empty: u32,
        stalled_for: u64,
        rng: &mut impl Rng,
        now: Timestamp,
    ) -> Option<SessionOutcome> {
        let TransferMode::Withdraw {
            reserved_empty,
            desired_min,
        } = self.mode
        else {
            return None;
        };
        let short_or_done = |count: u32| {
            if count < desired_min {
                SessionOutcome::InventoryFull {
                    short_by: desired_min.saturating_sub(count),
                }
            } else {
                SessionOutcome::Completed
            }
        };

        let Some(item) = self.item.as_ref() else {
            let external_empty = slots
                .iter()
                .filter(|s| s.owner == SlotOwner::External)
                .all(SlotView::is_empty);
            return Some(if external_empty {
                SessionOutcome::ContainerEmpty
            } else {
                SessionOutcome::UnknownItem
            });
        };

        if empty <= reserved_empty {
            return Some(short_or_done(count));
        }

        let largest = slots
            .iter()
            .filter(|s| s.owner == SlotOwner::External && s.holds(item))
            .max_by_key(|s| s.count());
        let Some(source) = largest else {
            return Some(if count < desired_min && count == 0 {
                SessionOutcome::ContainerEmpty
            } else {
                SessionOutcome::Completed
            });
        };

        if stalled_for > self.config.withdraw_stall_ms {
            return Some(short_or_done(count));
        }

        if self.can_click(rng, now) {
            host.transfer_slot(source.index);
        }
        None
    }

    fn step_deposit(
        &mut self,
        host: &mut dyn Host,
        slots: &[SlotView],
        count: u32,
        stalled_for: u64,
        rng: &mut impl Rng,
        now: Timestamp,
    ) -> Option<SessionOutcome> {
        let Some(item) = self.item.as_ref() else {
            return Some(SessionOutcome::UnknownItem);
        };

        if count > 0 && stalled_for > self.config.deposit_stall_ms {
            return Some(SessionOutcome::Full { remainder: count });
        }

        let source = slots
            .iter()
            .find(|s| s.owner == SlotOwner::Agent && s.holds(item));
        let Some(source) = source else {
            return Some(SessionOutcome::Completed);
        };

        if self.can_click(rng, now) {
            host.transfer_slot(source.index);
        }
        None
    }

    /// The top-left external slot defines the site's item; an empty slot
    /// keeps whatever was known. Returns whether the item changed.
    fn learn_top_left(&mut self, slots: &[SlotView]) -> bool {
        if matches!(self.mode, TransferMode::DepositSpecific(_)) {
            return false;
        }
        let Some(item) = top_left_item(slots) else {
            return false;
        };
        if self.item.as_ref() == Some(&item) {
            return false;
        }
        debug!(anchor = %self.anchor, item = %item, "Learned container item");
        self.item = Some(item);
        true
    }

    fn carried(&self, inventory: &[Option<ItemStack>]) -> u32 {
        self.item
            .as_ref()
            .map_or(0, |item| count_item(inventory, item))
    }

    fn can_click(&mut self, rng: &mut impl Rng, now: Timestamp) -> bool {
        if !self.next_click.is_reached(now) {
            return false;
        }
        let jitter = rng.random_range(0..=self.config.click_jitter_ms);
        self.next_click =
            Deadline::after(now, self.config.click_interval_ms.saturating_add(jitter));
        true
    }
}

/// The item in the top-left external slot of an open container, if any.
pub fn top_left_item(slots: &[SlotView]) -> Option<ItemId> {
    slots
        .iter()
        .filter(|s| s.owner == SlotOwner::External)
        .min_by_key(|s| (s.row, s.column))
        .and_then(|s| s.stack.as_ref())
        .filter(|stack| stack.count > 0)
        .map(|stack| stack.item.clone())
}
