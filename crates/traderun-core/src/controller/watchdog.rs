//! Movement watchdogs: stall recovery, the absolute stall limit and the
//! global no-movement abort.

use tracing::{info, warn};
use traderun_types::{Deadline, ScreenKind, StateTag, Timestamp};

use super::Controller;
use super::state::{ControllerState, Leg};
use crate::error::FailureKind;
use crate::world::{Host, WorldQuery};

/// A storage walk this close (squared, horizontal) to its goal is not stalled.
const WALK_NEAR_GOAL_SQ: f64 = 1.0;

impl Controller {
    /// Track horizontal movement for the stall watchdogs.
    pub(super) fn watch_movement(&mut self, world: &(impl WorldQuery + ?Sized), now: Timestamp) {
        let agent = world.agent_position();
        let epsilon = self.config.watchdog.movement_epsilon;
        let watch = &mut self.run.watch;
        let moved = watch
            .move_pos
            .is_none_or(|p| agent.horizontal_distance_sq(p) >= epsilon * epsilon);
        if moved {
            watch.move_pos = Some(agent);
            watch.last_move = now;
            watch.first_stall = None;
        }
    }

    /// Reset the stall clocks on a state change and note when a stall began.
    pub(super) fn note_state_change(&mut self, now: Timestamp) {
        let recover_ms = self.config.watchdog.recover_ms;
        let watch = &mut self.run.watch;
        if watch.last_tag != self.current {
            watch.last_tag = self.current;
            watch.last_move = now;
            watch.first_stall = None;
            watch.last_recover = None;
        }
        if watch.first_stall.is_none() && now.millis_since(watch.last_move) >= recover_ms {
            watch.first_stall = Some(now);
        }
    }

    /// Recover from a short stall: give up on an approach that stopped
    /// short of its tile, or reissue a stalled storage walk.
    pub(super) fn recover_stall(&mut self, host: &mut dyn Host, now: Timestamp) -> bool {
        if host.open_screen().is_some() {
            return false;
        }
        let recover_ms = self.config.watchdog.recover_ms;
        let watch = self.run.watch;
        if now.millis_since(watch.last_move) < recover_ms {
            return false;
        }
        if watch
            .last_recover
            .is_some_and(|at| now.millis_since(at) < recover_ms)
        {
            return false;
        }

        let agent = host.agent_position();
        if let ControllerState::Approaching(approach) = &self.state {
            let range = self.config.approach.goal_range;
            if agent.distance_sq(approach.tile.bottom_center()) <= range * range {
                return false;
            }
            let target = approach.target.id;
            self.run.watch.last_recover = Some(now);
            self.failures.mark_failure(target, now);
            self.nav.stop(host);
            host.release_all();
            self.run.seek_after =
                Deadline::after(now, self.config.trading.seek_delay_after_recover_ms);
            warn!(run_id = %self.run.id, %target, "Approach stalled, giving up");
            self.note(now, &format!("approach to {target} stalled"));
            self.state = ControllerState::Seeking;
            return true;
        }

        let Some(visit) = self.state.visit_mut() else {
            return false;
        };
        let Leg::Walking(walk) = &mut visit.leg else {
            return false;
        };
        if agent.horizontal_distance_sq(walk.goal.bottom_center()) <= WALK_NEAR_GOAL_SQ {
            return false;
        }
        walk.reissue = true;
        self.nav.stop(host);
        self.nav.clear_rate_limit();
        self.run.watch.last_recover = Some(now);
        self.run.watch.first_stall = None;
        self.note(now, "storage walk stalled, reissuing");
        false
    }

    /// Abort once the agent has been stalled for the absolute limit outside
    /// of the states where standing still is expected.
    pub(super) fn check_absolute_fail(&mut self, host: &mut dyn Host, now: Timestamp) -> bool {
        let Some(first) = self.run.watch.first_stall else {
            return false;
        };
        if matches!(self.current, StateTag::Idle | StateTag::Seeking)
            || self.state.in_container_session()
            || host.open_screen() == Some(ScreenKind::Container)
        {
            return false;
        }
        let stalled = now.millis_since(first);
        if stalled < self.config.watchdog.absolute_fail_ms {
            return false;
        }
        self.abort_session(host);
        let reason = format!(
            "stalled in {} for {}s",
            self.current,
            stalled.checked_div(1_000).unwrap_or(0)
        );
        self.fail(host, now, FailureKind::Stall, &reason);
        true
    }

    /// The global no-movement watchdog.
    ///
    /// While the agent makes no progress, escapes and target suppression are
    /// tried at a fixed interval; once the global limit passes the run is
    /// aborted. Deliberate waits do not count.
    pub(super) fn check_global_stuck(&mut self, host: &mut dyn Host, now: Timestamp) -> bool {
        let agent = host.agent_position();
        let waiting = self.run.is_waiting();
        let settings = &self.config.watchdog;
        let watch = &mut self.run.watch;
        let reach = settings.global_stuck_distance * settings.global_stuck_distance;
        let moved = watch.global_pos.is_none_or(|p| agent.distance_sq(p) >= reach);
        if moved || waiting {
            watch.global_pos = Some(agent);
            watch.global_since = now;
            watch.global_retries = 0;
            return false;
        }

        let stalled = now.millis_since(watch.global_since);
        if stalled >= settings.global_stuck_ms {
            self.abort_session(host);
            let reason = format!(
                "no movement for {}s",
                stalled.checked_div(1_000).unwrap_or(0)
            );
            self.fail(host, now, FailureKind::Stall, &reason);
            return true;
        }

        let due = stalled
            .checked_div(settings.global_retry_interval_ms)
            .unwrap_or(0);
        if due <= u64::from(watch.global_retries)
            || watch.global_retries >= settings.global_max_retries
            || !matches!(self.current, StateTag::Approaching | StateTag::Seeking)
        {
            return false;
        }
        watch.global_retries = watch.global_retries.saturating_add(1);
        let retry = watch.global_retries;
        info!(run_id = %self.run.id, retry, stalled_ms = stalled, "No progress, retrying");
        self.global_retry(host, retry, now)
    }

    /// Odd early retries escape; the others suppress the target or move on.
    fn global_retry(&mut self, host: &mut dyn Host, retry: u32, now: Timestamp) -> bool {
        if matches!(retry, 1 | 3) {
            if self.nav.escape(host, &mut self.rng, now).is_some() {
                self.run.stats.escapes = self.run.stats.escapes.saturating_add(1);
                let until = Deadline::after(now, self.config.approach.stuck_check_ms);
                if let ControllerState::Approaching(approach) = &mut self.state {
                    approach.escape_until = Some(until);
                }
                self.note(now, "no progress, escaping");
            }
            return false;
        }

        if let Some(target) = self.state.target().map(|t| t.id) {
            self.failures.mark_escalating(target, now);
            self.nav.stop(host);
            host.release_all();
            self.note(now, &format!("no progress, dropping {target}"));
            self.state = ControllerState::Seeking;
            return true;
        }
        if let Some(next) = self.try_next_location(host, now) {
            self.state = next;
            return true;
        }
        false
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use traderun_types::{ItemStack, Role, Vec3};

    use super::*;
    use crate::controller::state::{Visit, Walk};
    use crate::testing::make_setup;

    #[test]
    fn standing_still_with_no_targets_aborts() {
        let (mut controller, mut host) = make_setup();
        *host.inventory.get_mut(0).unwrap() = Some(ItemStack::new("minecraft:wheat", 64));
        host.targets.clear();
        controller.start(&["farm"], &mut host, Timestamp::ZERO).unwrap();

        for now in (1_000..=121_000).step_by(1_000) {
            controller.tick(&mut host, Timestamp::from_millis(now));
            host.agent = Vec3::new(0.5, 64.0, 0.5);
            if !controller.is_active() {
                break;
            }
        }
        assert_eq!(controller.state(), StateTag::Idle);
        let abort = controller.last_abort().unwrap();
        assert_eq!(abort.kind, FailureKind::Stall);
        assert!(abort.at >= Timestamp::from_millis(120_000));
    }

    #[test]
    fn still_approach_is_given_up() {
        let (mut controller, mut host) = make_setup();
        *host.inventory.get_mut(0).unwrap() = Some(ItemStack::new("minecraft:wheat", 64));
        controller.start(&["farm"], &mut host, Timestamp::ZERO).unwrap();
        controller.tick(&mut host, Timestamp::from_millis(100));
        assert_eq!(controller.state(), StateTag::Approaching);
        let target = controller.current_target().unwrap().id;

        let given_up = (2..=30_u64).map(|i| i.saturating_mul(100)).find(|&now| {
            controller.tick(&mut host, Timestamp::from_millis(now));
            controller.state() == StateTag::Seeking
        });
        assert!(given_up.is_some_and(|now| now <= 2_200));
        assert!(controller.failures().suppressed_until(target).is_some());
    }

    #[test]
    fn stalled_travel_hits_the_absolute_limit() {
        let (mut controller, mut host) = make_setup();
        *host.inventory.get_mut(0).unwrap() = Some(ItemStack::new("minecraft:wheat", 64));
        host.agent = Vec3::new(20.5, 80.0, 20.5);
        controller.start(&["farm"], &mut host, Timestamp::ZERO).unwrap();

        for now in (500..=40_000).step_by(500) {
            controller.tick(&mut host, Timestamp::from_millis(now));
            host.agent = Vec3::new(20.5, 80.0, 20.5);
            if !controller.is_active() {
                break;
            }
        }
        let abort = controller.last_abort().unwrap();
        assert_eq!(abort.kind, FailureKind::Stall);
        assert!(abort.at >= Timestamp::from_millis(32_000));
        assert!(abort.at < Timestamp::from_millis(35_000));
    }

    #[test]
    fn storage_walk_recovery_restarts_the_absolute_clock() {
        let (mut controller, mut host) = make_setup();
        controller.start(&["farm"], &mut host, Timestamp::ZERO).unwrap();
        let site = controller.storage().get(64, Role::Input).cloned().unwrap();
        let goal = site.stance.block_pos();
        let mut visit = Visit::new(site, Timestamp::ZERO);
        visit.leg = Leg::Walking(Walk::new(goal, Timestamp::ZERO));
        controller.state = ControllerState::RestockDetour(visit);
        controller.run.watch.first_stall = Some(Timestamp::from_millis(2_000));

        assert!(!controller.recover_stall(&mut host, Timestamp::from_millis(5_000)));
        assert!(controller.run.watch.first_stall.is_none());
        assert_eq!(controller.run.watch.last_recover, Some(Timestamp::from_millis(5_000)));
        let walking = controller.state.visit_mut().map(|v| &v.leg);
        assert!(matches!(walking, Some(Leg::Walking(walk)) if walk.reissue));
    }
}
