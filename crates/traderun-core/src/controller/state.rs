//! Per-state data of the controller and the data that lives for a run.
//!
//! Each [`ControllerState`] variant owns exactly what its state needs, so
//! leaving a state drops its target, goal and container session with it.

use std::collections::BTreeMap;

use traderun_types::{
    BlockPos, Deadline, ItemId, Role, RunId, StateTag, StorageSite, TargetSnapshot, Timer,
    Timestamp, TransitionEdge, Vec3,
};

use crate::approach::ApproachTile;
use crate::container::ContainerSession;
use crate::report::RunStats;

/// The controller's state with its own data.
#[derive(Debug, Default)]
pub(crate) enum ControllerState {
    /// Not running.
    #[default]
    Idle,
    /// Choosing what to do next.
    Seeking,
    /// Walking to a target's approach tile.
    Approaching(Approach),
    /// Aiming at a target and pulsing the interact signal.
    Interacting(Interaction),
    /// A short forward step after a diagonal approach.
    NudgeAdjust(Nudge),
    /// The trade screen is open.
    AwaitClose(AwaitClose),
    /// Fetching input from the input site.
    RestockDetour(Visit),
    /// Depositing output at the output site.
    DumpDetour(Visit),
    /// Returning surplus input before a location switch.
    ReturnExcessInput(ReturnInput),
    /// Travelling to another level.
    LocationTransition(Transition),
}

impl ControllerState {
    /// The state's tag.
    pub(crate) const fn tag(&self) -> StateTag {
        match self {
            Self::Idle => StateTag::Idle,
            Self::Seeking => StateTag::Seeking,
            Self::Approaching(_) => StateTag::Approaching,
            Self::Interacting(_) => StateTag::Interacting,
            Self::NudgeAdjust(_) => StateTag::NudgeAdjust,
            Self::AwaitClose(_) => StateTag::AwaitClose,
            Self::RestockDetour(_) => StateTag::RestockDetour,
            Self::DumpDetour(_) => StateTag::DumpDetour,
            Self::ReturnExcessInput(_) => StateTag::ReturnExcessInput,
            Self::LocationTransition(_) => StateTag::LocationTransition,
        }
    }

    /// The target the state is working on.
    pub(crate) const fn target(&self) -> Option<&TargetSnapshot> {
        match self {
            Self::Approaching(a) => Some(&a.target),
            Self::Interacting(i) => Some(&i.target),
            Self::NudgeAdjust(n) => Some(&n.target),
            Self::AwaitClose(w) => Some(&w.target),
            _ => None,
        }
    }

    /// The storage visit of a detour state.
    pub(crate) const fn visit_mut(&mut self) -> Option<&mut Visit> {
        match self {
            Self::RestockDetour(v) | Self::DumpDetour(v) => Some(v),
            Self::ReturnExcessInput(r) => Some(&mut r.visit),
            _ => None,
        }
    }

    /// Whether a container session is running.
    pub(crate) const fn in_container_session(&self) -> bool {
        match self {
            Self::RestockDetour(v) | Self::DumpDetour(v) => v.in_session(),
            Self::ReturnExcessInput(r) => r.visit.in_session(),
            _ => false,
        }
    }
}

// ---------------------------------------------------------------------------
// Target states
// ---------------------------------------------------------------------------

/// Walking to a target.
#[derive(Debug, Clone)]
pub(crate) struct Approach {
    pub target: TargetSnapshot,
    pub tile: BlockPos,
    pub diagonal: bool,
    pub started: Timer,
    pub start_pos: Vec3,
    pub start_goal_dist_sq: f64,
    pub tried_alternate: bool,
    pub stuck_check: Timer,
    pub stuck_pos: Vec3,
    pub stuck_fails: u32,
    /// After an escape the tile goal is reissued once this passes.
    pub escape_until: Option<Deadline>,
}

impl Approach {
    pub(crate) fn new(target: TargetSnapshot, tile: ApproachTile, agent: Vec3, now: Timestamp) -> Self {
        let mut approach = Self {
            target,
            tile: tile.pos,
            diagonal: tile.diagonal,
            started: Timer::start(now),
            start_pos: agent,
            start_goal_dist_sq: 0.0,
            tried_alternate: false,
            stuck_check: Timer::start(now),
            stuck_pos: agent,
            stuck_fails: 0,
            escape_until: None,
        };
        approach.reset_tracking(agent, now);
        approach
    }

    /// Restart the timers and progress baselines, e.g. after switching tile.
    pub(crate) fn reset_tracking(&mut self, agent: Vec3, now: Timestamp) {
        self.started = Timer::start(now);
        self.start_pos = agent;
        self.start_goal_dist_sq = agent.distance_sq(self.tile.bottom_center());
        self.stuck_check = Timer::start(now);
        self.stuck_pos = agent;
        self.stuck_fails = 0;
    }
}

/// Trying to open the trade screen.
#[derive(Debug, Clone)]
pub(crate) struct Interaction {
    pub target: TargetSnapshot,
    pub diagonal: bool,
    pub started: Timer,
    pub last_aim: Option<Timestamp>,
    pub use_held: bool,
    pub last_use_toggle: Option<Timestamp>,
    pub nudges: u32,
}

impl Interaction {
    pub(crate) const fn new(target: TargetSnapshot, diagonal: bool, nudges: u32, now: Timestamp) -> Self {
        Self {
            target,
            diagonal,
            started: Timer::start(now),
            last_aim: None,
            use_held: false,
            last_use_toggle: None,
            nudges,
        }
    }
}

/// Stepping towards a target seen from a diagonal tile.
#[derive(Debug, Clone)]
pub(crate) struct Nudge {
    pub target: TargetSnapshot,
    pub start_pos: Vec3,
    pub ticks_left: u32,
    pub nudges: u32,
}

/// The trade screen is open; watching the inventory for an exchange.
#[derive(Debug, Clone)]
pub(crate) struct AwaitClose {
    pub target: TargetSnapshot,
    /// Item counts when the screen opened.
    pub baseline: BTreeMap<ItemId, u32>,
    pub opened: Timer,
    pub received: Option<Timestamp>,
}

// ---------------------------------------------------------------------------
// Storage visits
// ---------------------------------------------------------------------------

/// One trip to a storage site.
#[derive(Debug)]
pub(crate) struct Visit {
    pub site: StorageSite,
    pub started: Timer,
    pub leg: Leg,
}

impl Visit {
    pub(crate) const fn new(site: StorageSite, now: Timestamp) -> Self {
        Self {
            site,
            started: Timer::start(now),
            leg: Leg::Pending,
        }
    }

    pub(crate) const fn role(&self) -> Role {
        self.site.role
    }

    pub(crate) const fn in_session(&self) -> bool {
        matches!(self.leg, Leg::Container(_))
    }

    /// The goal being walked to, if walking.
    pub(crate) const fn walk_goal(&self) -> Option<BlockPos> {
        match &self.leg {
            Leg::Walking(walk) => Some(walk.goal),
            _ => None,
        }
    }
}

/// Where a visit is.
#[derive(Debug)]
pub(crate) enum Leg {
    /// No goal issued yet.
    Pending,
    /// Walking to the stance, the anchor or a waypoint target.
    Walking(Walk),
    /// At the container.
    Container(Box<ContainerSession>),
}

/// Progress of a walk to a storage site.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Walk {
    pub goal: BlockPos,
    pub started: Timer,
    /// Currently walking to a target instead of the site.
    pub via_target: bool,
    /// The detour via a target has been used.
    pub retried_via_target: bool,
    /// The stance was reached out of range, so the anchor is the goal.
    pub direct_to_anchor: bool,
    /// The goal has to be issued again (set by stall recovery).
    pub reissue: bool,
}

impl Walk {
    pub(crate) const fn new(goal: BlockPos, now: Timestamp) -> Self {
        Self {
            goal,
            started: Timer::start(now),
            via_target: false,
            retried_via_target: false,
            direct_to_anchor: false,
            reissue: false,
        }
    }
}

/// Depositing surplus input before switching to `next_index`.
#[derive(Debug)]
pub(crate) struct ReturnInput {
    pub visit: Visit,
    pub item: ItemId,
    pub next_index: usize,
}

// ---------------------------------------------------------------------------
// Travel
// ---------------------------------------------------------------------------

/// Travelling to `level`.
#[derive(Debug, Clone)]
pub(crate) struct Transition {
    pub level: i32,
    pub destination: BlockPos,
    pub start_level: i32,
    pub started: Timer,
    pub leg_started: Timer,
    pub edge: Option<TransitionEdge>,
    /// Detouring via a nearby target since this time, from this position.
    pub waypoint: Option<(Timer, Vec3)>,
    /// Standing over the destination on the wrong level since this time.
    pub wrong_level: Option<Timer>,
    pub retries: u32,
}

impl Transition {
    pub(crate) const fn new(
        level: i32,
        destination: BlockPos,
        start_level: i32,
        edge: Option<TransitionEdge>,
        now: Timestamp,
    ) -> Self {
        Self {
            level,
            destination,
            start_level,
            started: Timer::start(now),
            leg_started: Timer::start(now),
            edge,
            waypoint: None,
            wrong_level: None,
            retries: 0,
        }
    }

    /// Whether `level` counts as arrived, in the direction of travel.
    pub(crate) const fn arrived_at(&self, level: i32) -> bool {
        if self.level > self.start_level {
            level >= self.level
        } else {
            level <= self.level
        }
    }

    /// The goal to walk to next.
    pub(crate) fn goal(&self) -> BlockPos {
        self.edge.map_or(self.destination, |edge| edge.anchor)
    }
}

// ---------------------------------------------------------------------------
// Run data
// ---------------------------------------------------------------------------

/// A wait for a storage site to change.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Wait {
    pub role: Role,
    pub since: Timer,
    pub last_check: Timestamp,
}

/// Movement bookkeeping of the watchdogs.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Watch {
    pub move_pos: Option<Vec3>,
    pub last_move: Timestamp,
    pub first_stall: Option<Timestamp>,
    pub last_recover: Option<Timestamp>,
    pub global_pos: Option<Vec3>,
    pub global_since: Timestamp,
    pub global_retries: u32,
    pub last_tag: StateTag,
}

impl Watch {
    pub(crate) const fn new(now: Timestamp) -> Self {
        Self {
            move_pos: None,
            last_move: now,
            first_stall: None,
            last_recover: None,
            global_pos: None,
            global_since: now,
            global_retries: 0,
            last_tag: StateTag::Idle,
        }
    }
}

/// Everything that lives exactly as long as one run.
#[derive(Debug, Clone)]
pub(crate) struct Run {
    pub id: RunId,
    /// Active location levels in rotation order.
    pub levels: Vec<i32>,
    pub active: usize,
    /// Arrival on the active location, for the minimum dwell.
    pub arrived: Timer,
    pub learned_input: Option<ItemId>,
    pub learned_output: Option<ItemId>,
    pub output_full: bool,
    pub wait: Option<Wait>,
    /// The input site was found empty; recheck it once this passes.
    pub input_recheck: Option<Deadline>,
    pub empty_cycles: u32,
    pub empty_switches: u32,
    pub empty_rotations: u32,
    pub cooldown_wait: Option<Timer>,
    pub next_cooldown_restock: Deadline,
    pub next_dump: Deadline,
    /// No container is opened before this.
    pub container_block: Deadline,
    pub seek_after: Deadline,
    pub last_notice: Option<Timestamp>,
    pub floor_returns: u32,
    /// Last container problem, for abort reports.
    pub last_error: Option<String>,
    pub stats: RunStats,
    pub watch: Watch,
}

impl Run {
    pub(crate) fn new(levels: Vec<i32>, now: Timestamp) -> Self {
        Self {
            id: RunId::new(),
            levels,
            active: 0,
            arrived: Timer::start(now),
            learned_input: None,
            learned_output: None,
            output_full: false,
            wait: None,
            input_recheck: None,
            empty_cycles: 0,
            empty_switches: 0,
            empty_rotations: 0,
            cooldown_wait: None,
            next_cooldown_restock: Deadline::PASSED,
            next_dump: Deadline::PASSED,
            container_block: Deadline::PASSED,
            seek_after: Deadline::PASSED,
            last_notice: None,
            floor_returns: 0,
            last_error: None,
            stats: RunStats::default(),
            watch: Watch::new(now),
        }
    }

    /// The active location's level.
    pub(crate) fn active_level(&self) -> Option<i32> {
        self.levels.get(self.active).copied()
    }

    /// Position of `level` in the rotation.
    pub(crate) fn index_of(&self, level: i32) -> Option<usize> {
        self.levels.iter().position(|l| *l == level)
    }

    /// Whether more than one location is cycled.
    pub(crate) const fn is_multi(&self) -> bool {
        self.levels.len() > 1
    }

    /// Whether the controller is deliberately standing still.
    pub(crate) const fn is_waiting(&self) -> bool {
        self.wait.is_some() || self.cooldown_wait.is_some()
    }

    /// Start waiting on `role` unless already doing so.
    pub(crate) fn enter_wait(&mut self, role: Role, now: Timestamp) -> bool {
        if self.wait.is_some_and(|w| w.role == role) {
            return false;
        }
        self.wait = Some(Wait {
            role,
            since: Timer::start(now),
            last_check: now,
        });
        true
    }

    /// Stop waiting on `role`.
    pub(crate) fn leave_wait(&mut self, role: Role) -> bool {
        if self.wait.is_some_and(|w| w.role == role) {
            self.wait = None;
            return true;
        }
        false
    }
}
