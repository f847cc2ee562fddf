//! Navigation goal arbitration and the direct-walk fallback.
//!
//! Every goal the controller wants to reach goes through the
//! [`NavigationGoalManager`]. It rate-limits reissues, enforces the goal's
//! [`ToleranceClass`], hands the goal to the host's [`Navigator`] when there
//! is one, and walks straight at the goal itself when there is not, or when
//! the navigator fails to move the agent within a short grace period.
//!
//! [`Navigator`]: crate::world::Navigator

use rand::Rng;
use tracing::debug;
use traderun_types::{
    BlockPos, Facing, Signal, Timer, Timestamp, ToleranceClass, Vec3, floor_to_i32,
};

use crate::config::NavigationConfig;
use crate::world::{Host, WorldQuery};

/// Levels a same-floor goal may differ from the agent's level.
const EXACT_FLOOR_SLACK: u32 = 1;

/// Vertical distance below which a goal counts as on the walk's own floor.
const SAME_FLOOR_GOAL_HEIGHT: f64 = 1.5;

/// How far ahead of the agent the floor is probed.
const HOLE_PROBE_DISTANCE: f64 = 0.8;

/// Random tiles tried per escape.
const ESCAPE_ATTEMPTS: u32 = 24;

/// Why a goal was refused or a walk stopped short.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum NavigationError {
    /// A same-floor goal lies on another level.
    #[error("goal on different floor (goal level {goal_level}, agent level {agent_level})")]
    DifferentFloor {
        /// Level of the refused goal.
        goal_level: i32,
        /// Level of the agent.
        agent_level: i32,
    },

    /// A platform goal lies beyond the platform band.
    #[error("goal too far vertically (goal level {goal_level}, agent level {agent_level})")]
    TooFarVertically {
        /// Level of the refused goal.
        goal_level: i32,
        /// Level of the agent.
        agent_level: i32,
    },

    /// The agent dropped while walking to a same-floor goal.
    #[error("level dropped")]
    LevelDropped,

    /// The agent stepped up onto something while walking to a same-floor goal.
    #[error("climbed onto block")]
    ClimbedOntoBlock,

    /// The floor ends in front of the agent.
    #[error("hole ahead")]
    HoleAhead,

    /// The walk did not arrive in time.
    #[error("direct walk timeout")]
    WalkTimeout,

    /// The walk stopped making progress.
    #[error("direct walk stuck")]
    WalkStuck,
}

/// What became of a goal request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GoalRequest {
    /// The goal is now active.
    Issued,
    /// The request came too soon after the previous one and was dropped.
    RateLimited,
    /// The goal violates its tolerance class.
    Rejected(NavigationError),
}

impl GoalRequest {
    /// Whether the goal is now active.
    pub const fn is_issued(self) -> bool {
        matches!(self, Self::Issued)
    }
}

#[derive(Debug, Clone, Copy)]
struct ActiveGoal {
    pos: BlockPos,
    tolerance: ToleranceClass,
    issued: Timer,
    start_pos: Vec3,
    /// The navigator accepted the goal and has not yet been superseded.
    via_navigator: bool,
    /// The navigator's grace period has been checked.
    grace_checked: bool,
}

#[derive(Debug, Clone, Copy)]
struct DirectWalk {
    started: Timer,
    start_y: f64,
    /// Same-floor goal: abort on falls, climbs and holes.
    guarded: bool,
    last_pos: Vec3,
    last_move: Timestamp,
}

/// Single owner of the agent's movement goal.
#[derive(Debug, Clone)]
pub struct NavigationGoalManager {
    config: NavigationConfig,
    active: Option<ActiveGoal>,
    walk: Option<DirectWalk>,
    last_goal: Option<BlockPos>,
    last_issue: Option<Timestamp>,
    last_error: Option<NavigationError>,
}

impl NavigationGoalManager {
    /// Create a manager with no goal.
    pub const fn new(config: NavigationConfig) -> Self {
        Self {
            config,
            active: None,
            walk: None,
            last_goal: None,
            last_issue: None,
            last_error: None,
        }
    }

    // -----------------------------------------------------------------------
    // Goals
    // -----------------------------------------------------------------------

    /// Ask to move to `goal`.
    ///
    /// The same goal within the debounce window, or any goal within the
    /// minimum reissue interval, is dropped. A goal that violates its
    /// tolerance class is refused and clears the active goal.
    pub fn request(
        &mut self,
        host: &mut dyn Host,
        goal: BlockPos,
        tolerance: ToleranceClass,
        now: Timestamp,
    ) -> GoalRequest {
        if let Some(last) = self.last_issue {
            let since = now.millis_since(last);
            if self.last_goal == Some(goal) && since < self.config.debounce_ms {
                return GoalRequest::RateLimited;
            }
            if since < self.config.min_reissue_ms {
                return GoalRequest::RateLimited;
            }
        }

        self.halt(host);

        let agent = host.agent_position();
        let agent_level = agent.level();
        let spread = goal.y.abs_diff(agent_level);
        let refused = match tolerance {
            ToleranceClass::ExactFloor if spread > EXACT_FLOOR_SLACK => {
                Some(NavigationError::DifferentFloor {
                    goal_level: goal.y,
                    agent_level,
                })
            }
            ToleranceClass::Platform if spread > self.config.platform_tolerance => {
                Some(NavigationError::TooFarVertically {
                    goal_level: goal.y,
                    agent_level,
                })
            }
            _ => None,
        };
        if let Some(error) = refused {
            debug!(goal = %goal, %error, "Goal refused");
            self.active = None;
            self.last_error = Some(error);
            return GoalRequest::Rejected(error);
        }

        let via_navigator = host
            .navigator()
            .is_some_and(|navigator| navigator.set_goal(goal, tolerance));
        self.active = Some(ActiveGoal {
            pos: goal,
            tolerance,
            issued: Timer::start(now),
            start_pos: agent,
            via_navigator,
            grace_checked: false,
        });
        self.last_goal = Some(goal);
        self.last_issue = Some(now);
        self.last_error = None;
        if !via_navigator {
            self.start_walk(host, now);
        }
        debug!(goal = %goal, ?tolerance, via_navigator, "Goal issued");
        GoalRequest::Issued
    }

    /// Forget the rate-limit memory so the next request goes through.
    pub const fn clear_rate_limit(&mut self) {
        self.last_goal = None;
        self.last_issue = None;
    }

    /// Cancel the navigator and the walk and drop the goal.
    pub fn stop(&mut self, host: &mut dyn Host) {
        self.halt(host);
        self.active = None;
    }

    /// The goal being worked on.
    pub fn active_goal(&self) -> Option<BlockPos> {
        self.active.map(|g| g.pos)
    }

    /// Tolerance of the active goal.
    pub fn active_tolerance(&self) -> Option<ToleranceClass> {
        self.active.map(|g| g.tolerance)
    }

    /// Why the last goal was refused or the last walk stopped, if it did.
    pub const fn last_error(&self) -> Option<NavigationError> {
        self.last_error
    }

    /// Forget the last error.
    pub const fn clear_error(&mut self) {
        self.last_error = None;
    }

    /// Whether the direct walk is driving the agent.
    pub const fn is_walking(&self) -> bool {
        self.walk.is_some()
    }

    // -----------------------------------------------------------------------
    // Per-tick driving
    // -----------------------------------------------------------------------

    /// Advance the navigator grace check and the direct walk.
    pub fn tick(&mut self, host: &mut dyn Host, now: Timestamp) {
        self.check_navigator_grace(host, now);

        let Some(goal) = self.active else {
            return;
        };
        let Some(mut walk) = self.walk else {
            return;
        };
        let pos = host.agent_position();

        if walk.guarded {
            let dy = pos.y - walk.start_y;
            if dy < -self.config.fall_threshold {
                self.fail_walk(host, NavigationError::LevelDropped);
                return;
            }
            if dy > self.config.climb_threshold {
                self.fail_walk(host, NavigationError::ClimbedOntoBlock);
                return;
            }
        }

        let target = goal.pos.bottom_center();
        let dx = target.x - pos.x;
        let dz = target.z - pos.z;
        let distance_sq = dx.mul_add(dx, dz * dz);
        let arrive = self.config.arrive_distance;
        if distance_sq < arrive * arrive {
            self.stop_walk(host);
            return;
        }

        if walk.started.has_elapsed(now, self.config.direct_walk_timeout_ms) {
            self.fail_walk(host, NavigationError::WalkTimeout);
            return;
        }

        let min_move = self.config.walk_min_move;
        if pos.horizontal_distance_sq(walk.last_pos) > min_move * min_move {
            walk.last_pos = pos;
            walk.last_move = now;
        } else if now.millis_since(walk.last_move) > self.config.stuck_window_ms {
            self.fail_walk(host, NavigationError::WalkStuck);
            return;
        }

        if walk.guarded && hole_ahead(host, pos, dx, dz, distance_sq) {
            self.fail_walk(host, NavigationError::HoleAhead);
            return;
        }

        self.walk = Some(walk);
        host.set_facing(Facing {
            yaw: dz.atan2(dx).to_degrees() - 90.0,
            pitch: 0.0,
        });
        host.press(Signal::Forward);
    }

    /// Walk to a random standable tile a few blocks away, on any level.
    ///
    /// Returns the chosen tile, or `None` when no tile was found or the
    /// goal could not be issued.
    pub fn escape(
        &mut self,
        host: &mut dyn Host,
        rng: &mut impl Rng,
        now: Timestamp,
    ) -> Option<BlockPos> {
        let agent = host.agent_position();
        let near = self.config.escape_min;
        let far = self.config.escape_max.max(near);
        let tile = (0..ESCAPE_ATTEMPTS).find_map(|_| {
            let angle = rng.random_range(0.0..std::f64::consts::TAU);
            let distance = f64::from(rng.random_range(near..=far));
            let x = floor_to_i32(angle.cos().mul_add(distance, agent.x));
            let z = floor_to_i32(angle.sin().mul_add(distance, agent.z));
            [0, 1, -1]
                .into_iter()
                .map(|dy| BlockPos::new(x, agent.level().saturating_add(dy), z))
                .find(|pos| is_standable(host, *pos))
        })?;
        self.clear_rate_limit();
        let request = self.request(host, tile, ToleranceClass::Unrestricted, now);
        debug!(tile = %tile, ?request, "Escape attempted");
        request.is_issued().then_some(tile)
    }

    fn check_navigator_grace(&mut self, host: &mut dyn Host, now: Timestamp) {
        let Some(goal) = self.active.as_mut() else {
            return;
        };
        if !goal.via_navigator
            || goal.grace_checked
            || !goal.issued.has_elapsed(now, self.config.navigator_grace_ms)
        {
            return;
        }
        goal.grace_checked = true;
        let min_move = self.config.navigator_min_move;
        if host.agent_position().horizontal_distance_sq(goal.start_pos) >= min_move * min_move {
            return;
        }
        goal.via_navigator = false;
        debug!(goal = %goal.pos, "Navigator made no progress, walking directly");
        if let Some(navigator) = host.navigator() {
            navigator.cancel();
        }
        self.start_walk(host, now);
    }

    fn start_walk(&mut self, host: &dyn Host, now: Timestamp) {
        let Some(goal) = self.active else {
            return;
        };
        let pos = host.agent_position();
        let guarded = goal.tolerance != ToleranceClass::Unrestricted
            && (f64::from(goal.pos.y) - pos.y).abs() < SAME_FLOOR_GOAL_HEIGHT;
        self.walk = Some(DirectWalk {
            started: Timer::start(now),
            start_y: pos.y,
            guarded,
            last_pos: pos,
            last_move: now,
        });
    }

    fn stop_walk(&mut self, host: &mut dyn Host) {
        if self.walk.take().is_some() {
            host.release(Signal::Forward);
        }
    }

    fn fail_walk(&mut self, host: &mut dyn Host, error: NavigationError) {
        debug!(%error, "Direct walk stopped");
        self.stop_walk(host);
        self.last_error = Some(error);
    }

    fn halt(&mut self, host: &mut dyn Host) {
        self.stop_walk(host);
        if let Some(navigator) = host.navigator() {
            navigator.cancel();
        }
    }
}

/// Whether a block can be stood in: floor below, room for feet and head.
pub fn is_standable(world: &(impl WorldQuery + ?Sized), pos: BlockPos) -> bool {
    let floor = world.block_at(pos.below());
    let feet = world.block_at(pos);
    !floor.air && !feet.solid && feet.collision_top <= 0.5 && !world.block_at(pos.above()).solid
}

fn hole_ahead(
    world: &(impl WorldQuery + ?Sized),
    pos: Vec3,
    dx: f64,
    dz: f64,
    distance_sq: f64,
) -> bool {
    let distance = distance_sq.sqrt();
    // Too close to the goal for the probe to land anywhere but on it.
    if distance <= HOLE_PROBE_DISTANCE {
        return false;
    }
    let scale = HOLE_PROBE_DISTANCE / distance;
    let ahead = pos.offset(dx * scale, 0.0, dz * scale).block_pos();
    world.block_at(ahead).air && world.block_at(ahead.below()).air
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use rand::SeedableRng;
    use rand::rngs::SmallRng;
    use traderun_types::BlockInfo;

    use super::*;
    use crate::testing::MockHost;

    fn at(millis: u64) -> Timestamp {
        Timestamp::from_millis(millis)
    }

    fn make_manager() -> NavigationGoalManager {
        NavigationGoalManager::new(NavigationConfig::default())
    }

    #[test]
    fn identical_goal_is_debounced_and_any_goal_rate_limited() {
        let mut host = MockHost::new(Vec3::new(0.5, 64.0, 0.5));
        let mut nav = make_manager();
        let goal = BlockPos::new(5, 64, 0);

        assert_eq!(nav.request(&mut host, goal, ToleranceClass::ExactFloor, at(0)), GoalRequest::Issued);
        assert_eq!(
            nav.request(&mut host, goal, ToleranceClass::ExactFloor, at(1_000)),
            GoalRequest::RateLimited
        );
        assert_eq!(
            nav.request(&mut host, BlockPos::new(6, 64, 0), ToleranceClass::ExactFloor, at(100)),
            GoalRequest::RateLimited
        );
        assert!(nav.request(&mut host, BlockPos::new(6, 64, 0), ToleranceClass::ExactFloor, at(300)).is_issued());
        assert!(nav.request(&mut host, goal, ToleranceClass::ExactFloor, at(1_600)).is_issued());

        nav.clear_rate_limit();
        assert!(nav.request(&mut host, goal, ToleranceClass::ExactFloor, at(1_601)).is_issued());
    }

    #[test]
    fn tolerance_classes_bound_the_goal_level() {
        let mut host = MockHost::new(Vec3::new(0.5, 64.0, 0.5));
        let mut nav = make_manager();

        let request = nav.request(&mut host, BlockPos::new(5, 66, 0), ToleranceClass::ExactFloor, at(0));
        assert!(matches!(request, GoalRequest::Rejected(NavigationError::DifferentFloor { .. })));
        assert!(nav.active_goal().is_none());
        assert!(nav.last_error().is_some());

        assert!(nav.request(&mut host, BlockPos::new(5, 68, 0), ToleranceClass::Platform, at(0)).is_issued());
        nav.clear_rate_limit();
        assert!(matches!(
            nav.request(&mut host, BlockPos::new(5, 69, 0), ToleranceClass::Platform, at(0)),
            GoalRequest::Rejected(NavigationError::TooFarVertically { .. })
        ));
        nav.clear_rate_limit();
        assert!(nav.request(&mut host, BlockPos::new(5, 120, 0), ToleranceClass::Unrestricted, at(0)).is_issued());
        assert!(nav.last_error().is_none());
    }

    #[test]
    fn direct_walk_faces_goal_and_arrives() {
        let mut host = MockHost::new(Vec3::new(0.5, 64.0, 0.5));
        let mut nav = make_manager();
        nav.request(&mut host, BlockPos::new(4, 64, 0), ToleranceClass::ExactFloor, at(0));
        assert!(nav.is_walking());

        for now in (0..1_000).step_by(50) {
            nav.tick(&mut host, at(now));
            host.walk(0.25);
        }
        assert!(!nav.is_walking());
        assert!(!host.is_pressed(Signal::Forward));
        assert!(host.agent.horizontal_distance_sq(Vec3::new(4.5, 64.0, 0.5)) < 0.25);
        assert!(nav.last_error().is_none());
    }

    #[test]
    fn direct_walk_detects_stuck_and_timeout() {
        let mut host = MockHost::new(Vec3::new(0.5, 64.0, 0.5));
        let mut nav = make_manager();
        nav.request(&mut host, BlockPos::new(8, 64, 0), ToleranceClass::ExactFloor, at(0));
        nav.tick(&mut host, at(100));
        nav.tick(&mut host, at(700));
        assert_eq!(nav.last_error(), Some(NavigationError::WalkStuck));
        assert!(!host.is_pressed(Signal::Forward));
    }

    #[test]
    fn vertical_guard_stops_same_floor_walks() {
        let mut host = MockHost::new(Vec3::new(0.5, 64.0, 0.5));
        let mut nav = make_manager();
        nav.request(&mut host, BlockPos::new(8, 64, 0), ToleranceClass::ExactFloor, at(0));
        host.agent = Vec3::new(1.5, 64.5, 0.5);
        nav.tick(&mut host, at(50));
        assert_eq!(nav.last_error(), Some(NavigationError::ClimbedOntoBlock));

        // Unrestricted goals never trip the guard.
        nav.clear_rate_limit();
        nav.request(&mut host, BlockPos::new(8, 64, 0), ToleranceClass::Unrestricted, at(100));
        host.agent = Vec3::new(2.5, 63.0, 0.5);
        nav.tick(&mut host, at(150));
        assert!(nav.last_error().is_none());
        assert!(nav.is_walking());
    }

    #[test]
    fn hole_ahead_stops_the_walk() {
        let mut host = MockHost::new(Vec3::new(0.5, 64.0, 0.5));
        host.blocks.insert(BlockPos::new(1, 63, 0), BlockInfo::air());
        let mut nav = make_manager();
        nav.request(&mut host, BlockPos::new(6, 64, 0), ToleranceClass::ExactFloor, at(0));
        nav.tick(&mut host, at(50));
        assert_eq!(nav.last_error(), Some(NavigationError::HoleAhead));
        assert!(!nav.is_walking());
    }

    #[test]
    fn navigator_is_superseded_when_agent_does_not_move() {
        let mut host = MockHost::new(Vec3::new(0.5, 64.0, 0.5)).with_navigator();
        let mut nav = make_manager();
        nav.request(&mut host, BlockPos::new(6, 64, 0), ToleranceClass::ExactFloor, at(0));
        assert!(!nav.is_walking());
        assert_eq!(host.navigator.as_ref().unwrap().goals.len(), 1);

        nav.tick(&mut host, at(500));
        assert!(!nav.is_walking());
        nav.tick(&mut host, at(900));
        assert!(nav.is_walking());
        assert!(!host.navigator.as_ref().unwrap().pathing);
        assert!(host.is_pressed(Signal::Forward));
    }

    #[test]
    fn working_navigator_is_left_alone() {
        let mut host = MockHost::new(Vec3::new(0.5, 64.0, 0.5)).with_navigator();
        let mut nav = make_manager();
        nav.request(&mut host, BlockPos::new(6, 64, 0), ToleranceClass::ExactFloor, at(0));
        host.agent = Vec3::new(1.5, 64.0, 0.5);
        nav.tick(&mut host, at(900));
        assert!(!nav.is_walking());
        nav.tick(&mut host, at(5_000));
        assert!(!nav.is_walking());
    }

    #[test]
    fn escape_picks_a_standable_tile_in_range() {
        let mut host = MockHost::new(Vec3::new(0.5, 64.0, 0.5));
        let mut nav = make_manager();
        let mut rng = SmallRng::seed_from_u64(7);
        let tile = nav.escape(&mut host, &mut rng, at(0)).unwrap();
        let distance_sq = tile.bottom_center().horizontal_distance_sq(host.agent);
        assert!(distance_sq >= 4.0 && distance_sq <= 50.0);
        assert_eq!(tile.y, 64);
        assert_eq!(nav.active_tolerance(), Some(ToleranceClass::Unrestricted));
    }
}
