//! Travel between levels and the floor lock that brings the agent back to
//! the active location.

use tracing::{debug, info, warn};
use traderun_types::{BlockPos, ScreenKind, StateTag, Timer, Timestamp, ToleranceClass};

use super::Controller;
use super::state::{ControllerState, Transition};
use crate::error::FailureKind;
use crate::inventory::count_known;
use crate::selector::nearest_any_adult;
use crate::world::Host;

/// A leg that moved less than this (squared, horizontal) made no progress.
const MIN_LEG_PROGRESS_SQ: f64 = 4.0;

impl Controller {
    /// Head for `destination` on `level`, via a registered transition edge
    /// when there is one.
    pub(super) fn travel_to(
        &mut self,
        host: &mut dyn Host,
        level: i32,
        destination: BlockPos,
        now: Timestamp,
    ) -> ControllerState {
        self.nav.stop(host);
        host.release_all();
        let agent_level = host.agent_position().level();
        let edge = self.locations.find_transition(agent_level, level);
        let transition = Transition::new(level, destination, agent_level, edge, now);
        self.nav.clear_rate_limit();
        let request = self
            .nav
            .request(host, transition.goal(), ToleranceClass::Unrestricted, now);
        debug!(
            from = agent_level,
            to = level,
            goal = %transition.goal(),
            via_edge = edge.is_some(),
            ?request,
            "Travelling"
        );
        self.note(now, &format!("travel {agent_level} -> {level}"));
        ControllerState::LocationTransition(transition)
    }

    pub(super) fn tick_transition(
        &mut self,
        mut transition: Transition,
        host: &mut dyn Host,
        now: Timestamp,
    ) -> ControllerState {
        let agent = host.agent_position();
        if transition.arrived_at(agent.level()) {
            return self.arrive(host, transition.level, now);
        }

        let settings = &self.config.transition;
        if transition.started.has_elapsed(now, settings.timeout_ms) {
            return self.abandon_travel(host, &transition, "travel timed out", now);
        }
        if transition.retries >= settings.max_retries {
            return self.abandon_travel(host, &transition, "travel retries exhausted", now);
        }

        let near = settings.anchor_distance * settings.anchor_distance;
        let over_destination = agent
            .horizontal_distance_sq(transition.destination.bottom_center())
            <= near
            && agent.level().abs_diff(transition.level) > 1;
        if over_destination {
            let since = *transition.wrong_level.get_or_insert_with(|| Timer::start(now));
            if since.has_elapsed(now, settings.wrong_level_timeout_ms) {
                return self.abandon_travel(
                    host,
                    &transition,
                    "above or below the destination with no way there",
                    now,
                );
            }
        } else {
            transition.wrong_level = None;
        }

        if let Some(edge) = transition.edge {
            if agent.horizontal_distance_sq(edge.anchor.bottom_center()) <= near {
                debug!(anchor = %edge.anchor, "Transition anchor reached");
                transition.edge = None;
                transition.leg_started.restart(now);
                self.nav.clear_rate_limit();
            }
        }

        self.drive_leg(&mut transition, host, now);

        if transition.waypoint.is_none() {
            let goal = transition.goal();
            if self.nav.active_goal() != Some(goal) || self.nav.last_error().is_some() {
                self.nav.clear_error();
                self.nav.request(host, goal, ToleranceClass::Unrestricted, now);
            }
        }
        ControllerState::LocationTransition(transition)
    }

    /// A leg without arrival detours via the nearest target; a detour
    /// without progress escapes; either way the leg is then retried.
    fn drive_leg(&mut self, transition: &mut Transition, host: &mut dyn Host, now: Timestamp) {
        let retry_ms = self.config.transition.retry_ms;
        let agent = host.agent_position();
        match transition.waypoint {
            None => {
                if !transition.leg_started.has_elapsed(now, retry_ms) {
                    return;
                }
                let targets = self.scan(&*host);
                if let Some(waypoint) = nearest_any_adult(&targets, agent) {
                    let goal = waypoint.position.block_pos();
                    self.nav.clear_rate_limit();
                    self.nav.request(host, goal, ToleranceClass::Unrestricted, now);
                    self.note(now, &format!("travel stalled, going via {}", waypoint.id));
                }
                transition.waypoint = Some((Timer::start(now), agent));
            }
            Some((since, from)) => {
                if !since.has_elapsed(now, retry_ms) {
                    return;
                }
                transition.retries = transition.retries.saturating_add(1);
                transition.edge = self.locations.find_transition(agent.level(), transition.level);
                transition.leg_started.restart(now);
                let stuck = agent.horizontal_distance_sq(from) < MIN_LEG_PROGRESS_SQ;
                if stuck && self.nav.escape(host, &mut self.rng, now).is_some() {
                    self.run.stats.escapes = self.run.stats.escapes.saturating_add(1);
                    self.note(now, "travel stuck, escaping");
                    transition.waypoint = Some((Timer::start(now), agent));
                } else {
                    transition.waypoint = None;
                    self.nav.clear_rate_limit();
                }
                debug!(retries = transition.retries, "Travel retried");
            }
        }
    }

    fn arrive(&mut self, host: &mut dyn Host, level: i32, now: Timestamp) -> ControllerState {
        self.nav.stop(host);
        host.release_all();
        self.run.arrived.restart(now);
        self.run.floor_returns = 0;
        info!(run_id = %self.run.id, level, "Arrived");
        self.note(now, &format!("arrived on {level}"));

        let item = self.input_item(level);
        let have = count_known(&host.inventory(), item.as_ref());
        if item.is_some() && have < self.config.storage.arrival_restock_threshold {
            return self.begin_restock(host, level, now);
        }
        ControllerState::Seeking
    }

    fn abandon_travel(
        &mut self,
        host: &mut dyn Host,
        transition: &Transition,
        reason: &str,
        now: Timestamp,
    ) -> ControllerState {
        warn!(
            run_id = %self.run.id,
            to = transition.level,
            retries = transition.retries,
            reason,
            "Travel abandoned"
        );
        self.run.last_error = Some(format!("travel to {}: {reason}", transition.level));
        self.note(now, &format!("travel abandoned: {reason}"));
        self.nav.stop(host);
        host.release_all();
        self.fall_back_to_current(host.agent_position().level(), transition.start_level, now);
        ControllerState::Seeking
    }

    /// Make the run location the agent is standing on active again, or the
    /// one the travel left from.
    fn fall_back_to_current(&mut self, agent_level: i32, start_level: i32, now: Timestamp) {
        self.run.arrived.restart(now);
        let Some(index) = self
            .run
            .index_of(agent_level)
            .or_else(|| self.run.index_of(start_level))
        else {
            return;
        };
        if index == self.run.active {
            return;
        }
        self.run.active = index;
        self.run.learned_input = None;
        self.run.learned_output = None;
        if let Some(level) = self.run.active_level() {
            self.apply_location_categories(level);
            info!(run_id = %self.run.id, level, "Continuing on the current location");
        }
    }

    /// Send the agent back when it has dropped below the active level while
    /// working on targets. Returns whether the tick was consumed.
    pub(super) fn enforce_floor_lock(&mut self, host: &mut dyn Host, now: Timestamp) -> bool {
        if !matches!(
            self.current,
            StateTag::Seeking
                | StateTag::Approaching
                | StateTag::Interacting
                | StateTag::NudgeAdjust
                | StateTag::AwaitClose
        ) {
            return false;
        }
        let Some(level) = self.run.active_level() else {
            return false;
        };
        let agent_level = host.agent_position().level();
        let tolerance = i32::try_from(self.config.watchdog.floor_lock_tolerance).unwrap_or(i32::MAX);
        if agent_level >= level.saturating_sub(tolerance) {
            return false;
        }

        self.run.floor_returns = self.run.floor_returns.saturating_add(1);
        if self.run.floor_returns > self.config.watchdog.max_floor_returns {
            let reason = format!("left level {level} {} times", self.run.floor_returns);
            self.state = self.fail(host, now, FailureKind::Navigation, &reason);
            return true;
        }
        warn!(
            run_id = %self.run.id,
            level,
            agent_level,
            returns = self.run.floor_returns,
            "Left the active level, returning"
        );
        if host.open_screen() == Some(ScreenKind::Trade) {
            host.close();
        }
        let destination = self.destination_on(level);
        self.state = self.travel_to(host, level, destination, now);
        true
    }
}
