//! The target side of a run: approach, interaction, nudge and the open
//! trade screen.

use tracing::{debug, info};
use traderun_types::{Deadline, ScreenKind, Signal, TargetSnapshot, Timer, Timestamp, ToleranceClass};

use super::state::{Approach, AwaitClose, ControllerState, Interaction, Nudge};
use super::{Controller, Persist};
use crate::approach::find_alternate;
use crate::inventory::{gained_items, item_counts};
use crate::world::Host;

/// Shortest interval between two interact pulses.
const MIN_USE_INTERVAL_MS: u64 = 150;

/// How a target is given up on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum GiveUp {
    /// Short suppression.
    Plain,
    /// Short suppression, longer when it keeps happening.
    Escalating,
}

impl Controller {
    pub(super) fn tick_approaching(
        &mut self,
        mut approach: Approach,
        host: &mut dyn Host,
        now: Timestamp,
    ) -> ControllerState {
        if let Some(error) = self.nav.last_error() {
            self.nav.clear_error();
            let reason = format!("navigation: {error}");
            return self.give_up(host, &approach.target, GiveUp::Escalating, &reason, now);
        }
        let Some(live) = self.refresh(&*host, &approach.target) else {
            self.note(now, &format!("target {} gone", approach.target.id));
            self.nav.stop(host);
            return ControllerState::Seeking;
        };
        approach.target = live;

        let settings = &self.config.approach;
        let agent = host.agent_position();
        let goal_range = settings.goal_range;
        if agent.distance_sq(approach.tile.bottom_center()) <= goal_range * goal_range {
            self.nav.stop(host);
            host.release_all();
            debug!(target = %approach.target.id, tile = %approach.tile, "Approach tile reached");
            return ControllerState::Interacting(Interaction::new(
                approach.target,
                approach.diagonal,
                0,
                now,
            ));
        }

        if !approach.tried_alternate && approach.started.has_elapsed(now, settings.hang_ms) {
            let progress = settings.hang_min_progress;
            let displaced = agent.distance_sq(approach.start_pos) >= progress * progress;
            let improved = approach.start_goal_dist_sq
                - agent.distance_sq(approach.tile.bottom_center())
                >= settings.hang_min_improve_sq;
            if !displaced && !improved {
                approach.tried_alternate = true;
                if let Some(tile) = find_alternate(&*host, &approach.target, approach.tile) {
                    debug!(from = %approach.tile, to = %tile.pos, "Approach hung, trying another tile");
                    approach.tile = tile.pos;
                    approach.diagonal = tile.diagonal;
                    approach.reset_tracking(agent, now);
                    self.nav.clear_rate_limit();
                }
            }
        }

        if let Some(next) = self.check_rolling_stuck(&mut approach, host, now) {
            return next;
        }

        if approach.started.has_elapsed(now, self.config.approach.approach_timeout_ms) {
            return self.give_up(host, &approach.target, GiveUp::Plain, "approach timed out", now);
        }

        let escaping = approach.escape_until.is_some_and(|until| !until.is_reached(now));
        if !escaping && self.nav.active_goal() != Some(approach.tile) {
            self.nav
                .request(host, approach.tile, ToleranceClass::ExactFloor, now);
        }
        ControllerState::Approaching(approach)
    }

    /// Sample progress every stuck interval. Two bad samples in a row
    /// trigger one escape, a second time the target is abandoned.
    fn check_rolling_stuck(
        &mut self,
        approach: &mut Approach,
        host: &mut dyn Host,
        now: Timestamp,
    ) -> Option<ControllerState> {
        let settings = &self.config.approach;
        if !approach.stuck_check.has_elapsed(now, settings.stuck_check_ms) {
            return None;
        }
        let agent = host.agent_position();
        let min_move = settings.stuck_min_move;
        if agent.distance_sq(approach.stuck_pos) < min_move * min_move {
            approach.stuck_fails = approach.stuck_fails.saturating_add(1);
        } else {
            approach.stuck_fails = 0;
        }
        approach.stuck_pos = agent;
        approach.stuck_check.restart(now);
        if approach.stuck_fails < settings.stuck_threshold {
            return None;
        }

        let window = settings.stuck_check_ms;
        if approach.escape_until.is_none() {
            if let Some(tile) = self.nav.escape(host, &mut self.rng, now) {
                self.run.stats.escapes = self.run.stats.escapes.saturating_add(1);
                self.note(now, &format!("stuck approaching, escaping to {tile}"));
                approach.escape_until = Some(Deadline::after(now, window));
                approach.stuck_fails = 0;
                return None;
            }
        }
        self.run.stats.abandoned = self.run.stats.abandoned.saturating_add(1);
        Some(self.give_up(
            host,
            &approach.target,
            GiveUp::Escalating,
            "stuck while approaching",
            now,
        ))
    }

    pub(super) fn tick_interacting(
        &mut self,
        mut interaction: Interaction,
        host: &mut dyn Host,
        now: Timestamp,
    ) -> ControllerState {
        let Some(live) = self.refresh(&*host, &interaction.target) else {
            host.release(Signal::Use);
            self.note(now, &format!("target {} gone", interaction.target.id));
            return ControllerState::Seeking;
        };
        interaction.target = live;

        if host.open_screen() == Some(ScreenKind::Trade) {
            host.release(Signal::Use);
            let baseline = item_counts(&host.inventory());
            debug!(target = %interaction.target.id, kinds = baseline.len(), "Trade screen open");
            return ControllerState::AwaitClose(AwaitClose {
                target: interaction.target,
                baseline,
                opened: Timer::start(now),
                received: None,
            });
        }

        let settings = &self.config.approach;
        let range = settings.interact_range;
        let eye = interaction.target.eye_position();
        if host.agent_eye_position().distance_sq(eye) > range * range {
            host.release(Signal::Use);
            return self.give_up(host, &interaction.target, GiveUp::Plain, "out of range", now);
        }
        if interaction.started.has_elapsed(now, settings.open_timeout_ms) {
            host.release(Signal::Use);
            return self.give_up(
                host,
                &interaction.target,
                GiveUp::Plain,
                "trade screen did not open",
                now,
            );
        }

        if interaction.diagonal && interaction.started.has_elapsed(now, settings.diagonal_retry_ms)
        {
            host.release(Signal::Use);
            if interaction.nudges >= settings.max_nudges {
                return self.give_up(
                    host,
                    &interaction.target,
                    GiveUp::Escalating,
                    "no trade from a diagonal tile",
                    now,
                );
            }
            return ControllerState::NudgeAdjust(Nudge {
                start_pos: host.agent_position(),
                ticks_left: settings.nudge_max_ticks,
                nudges: interaction.nudges.saturating_add(1),
                target: interaction.target,
            });
        }

        let aim_due = interaction
            .last_aim
            .is_none_or(|at| now.millis_since(at) >= settings.aim_delay_ms);
        if aim_due {
            Self::face(host, eye);
            interaction.last_aim = Some(now);
        }

        let press_ms = settings.use_press_ms;
        let interval = self.config.trading.click_rate_ms.max(MIN_USE_INTERVAL_MS);
        let since_toggle = interaction.last_use_toggle.map(|at| now.millis_since(at));
        if interaction.use_held {
            if since_toggle.is_none_or(|ms| ms >= press_ms) {
                host.release(Signal::Use);
                interaction.use_held = false;
                interaction.last_use_toggle = Some(now);
            }
        } else if since_toggle.is_none_or(|ms| ms >= interval) {
            host.press(Signal::Use);
            interaction.use_held = true;
            interaction.last_use_toggle = Some(now);
        }
        ControllerState::Interacting(interaction)
    }

    pub(super) fn tick_nudge(
        &mut self,
        mut nudge: Nudge,
        host: &mut dyn Host,
        now: Timestamp,
    ) -> ControllerState {
        if host.open_screen() == Some(ScreenKind::Trade) {
            host.release(Signal::Forward);
            let baseline = item_counts(&host.inventory());
            return ControllerState::AwaitClose(AwaitClose {
                target: nudge.target,
                baseline,
                opened: Timer::start(now),
                received: None,
            });
        }

        let distance = self.config.approach.nudge_distance;
        let moved = host.agent_position().horizontal_distance_sq(nudge.start_pos)
            >= distance * distance;
        if moved || nudge.ticks_left == 0 {
            host.release(Signal::Forward);
            debug!(target = %nudge.target.id, moved, "Nudge finished");
            return ControllerState::Interacting(Interaction::new(
                nudge.target,
                true,
                nudge.nudges,
                now,
            ));
        }
        Self::face(host, nudge.target.eye_position());
        host.press(Signal::Forward);
        nudge.ticks_left = nudge.ticks_left.saturating_sub(1);
        ControllerState::NudgeAdjust(nudge)
    }

    pub(super) fn tick_await_close(
        &mut self,
        mut wait: AwaitClose,
        host: &mut dyn Host,
        now: Timestamp,
    ) -> ControllerState {
        if wait.received.is_none() && gained_items(&wait.baseline, &host.inventory()) {
            wait.received = Some(now);
        }
        let done = match wait.received {
            Some(at) => now.millis_since(at) >= self.config.trading.trade_close_grace_ms,
            None => wait
                .opened
                .has_elapsed(now, self.config.trading.no_trade_timeout_ms),
        };
        let open = host.open_screen() == Some(ScreenKind::Trade);
        if open && !done {
            return ControllerState::AwaitClose(wait);
        }
        if open {
            host.close();
        }

        let target = wait.target.id;
        self.cooldowns.start(target, now, host.time_of_day());
        self.visited.mark(target);
        self.persist_or_warn(Persist::Cooldowns(now));
        if wait.received.is_some() {
            self.failures.clear_all();
            self.run.stats.trades = self.run.stats.trades.saturating_add(1);
            self.last_trade = Some(now);
            info!(run_id = %self.run.id, %target, trades = self.run.stats.trades, "Trade completed");
            self.note(now, &format!("traded with {target}"));
        } else {
            self.run.stats.no_trade_closes = self.run.stats.no_trade_closes.saturating_add(1);
            self.note(now, &format!("no trade with {target}"));
        }

        self.nav.stop(host);
        self.nav.clear_error();
        host.release_all();
        self.run.seek_after =
            Deadline::after(now, self.config.trading.seek_delay_after_trade_ms);
        ControllerState::Seeking
    }

    /// Stop working on `target`, suppress it and seek again after a pause.
    pub(super) fn give_up(
        &mut self,
        host: &mut dyn Host,
        target: &TargetSnapshot,
        how: GiveUp,
        reason: &str,
        now: Timestamp,
    ) -> ControllerState {
        self.nav.stop(host);
        host.release_all();
        match how {
            GiveUp::Plain => self.failures.mark_failure(target.id, now),
            GiveUp::Escalating => {
                if self.failures.mark_escalating(target.id, now) {
                    debug!(target = %target.id, "Failure escalated");
                }
            }
        }
        self.note(now, &format!("gave up on {}: {reason}", target.id));
        self.run.seek_after =
            Deadline::after(now, self.config.trading.seek_delay_after_failure_ms);
        ControllerState::Seeking
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use traderun_types::{ItemStack, StateTag};

    use super::*;
    use crate::testing::{MockHost, make_setup};

    fn approach_tile(controller: &Controller) -> Option<traderun_types::BlockPos> {
        match &controller.state {
            ControllerState::Approaching(approach) => Some(approach.tile),
            _ => None,
        }
    }

    fn make_stocked() -> (Controller, MockHost) {
        let (controller, mut host) = make_setup();
        *host.inventory.get_mut(0).unwrap() = Some(ItemStack::new("minecraft:wheat", 64));
        (controller, host)
    }

    #[test]
    fn full_trade_cycle_starts_a_cooldown() {
        let (mut controller, mut host) = make_stocked();
        controller.start(&["farm"], &mut host, Timestamp::ZERO).unwrap();
        controller.tick(&mut host, Timestamp::from_millis(50));
        let tile = approach_tile(&controller).unwrap();
        let target = controller.current_target().unwrap().id;

        host.agent = tile.bottom_center();
        controller.tick(&mut host, Timestamp::from_millis(100));
        assert_eq!(controller.state(), StateTag::Interacting);

        controller.tick(&mut host, Timestamp::from_millis(150));
        assert!(host.is_pressed(Signal::Use));

        host.screen = Some(ScreenKind::Trade);
        controller.tick(&mut host, Timestamp::from_millis(200));
        assert_eq!(controller.state(), StateTag::AwaitClose);
        assert!(!host.is_pressed(Signal::Use));

        *host.inventory.get_mut(5).unwrap() = Some(ItemStack::new("minecraft:emerald", 1));
        controller.tick(&mut host, Timestamp::from_millis(250));
        assert_eq!(controller.state(), StateTag::AwaitClose);
        controller.tick(&mut host, Timestamp::from_millis(500));
        assert_eq!(controller.state(), StateTag::Seeking);

        assert!(host.screen.is_none());
        assert_eq!(controller.stats().trades, 1);
        assert_eq!(controller.stats().visited, 1);
        assert!(controller.cooldowns().contains(target));
        assert!(controller.visited().contains(target));
    }

    #[test]
    fn closing_without_an_exchange_still_cools_down() {
        let (mut controller, mut host) = make_stocked();
        controller.start(&["farm"], &mut host, Timestamp::ZERO).unwrap();
        controller.tick(&mut host, Timestamp::from_millis(50));
        let target = controller.current_target().unwrap().clone();
        host.screen = Some(ScreenKind::Trade);
        controller.state = ControllerState::AwaitClose(AwaitClose {
            target: target.clone(),
            baseline: item_counts(&host.inventory),
            opened: Timer::start(Timestamp::from_millis(100)),
            received: None,
        });
        controller.tick(&mut host, Timestamp::from_millis(500));
        assert_eq!(controller.state(), StateTag::Seeking);
        assert_eq!(controller.stats().no_trade_closes, 1);
        assert!(controller.cooldowns().contains(target.id));
    }

    #[test]
    fn diagonal_tile_gets_one_nudge_then_gives_up() {
        let (mut controller, mut host) = make_stocked();
        controller.start(&["farm"], &mut host, Timestamp::ZERO).unwrap();
        let target = host.targets.first().unwrap().clone();
        host.agent = traderun_types::Vec3::new(8.5, 64.0, 8.5);
        controller.state = ControllerState::Interacting(Interaction::new(
            target.clone(),
            true,
            0,
            Timestamp::ZERO,
        ));

        controller.tick(&mut host, Timestamp::from_millis(450));
        assert_eq!(controller.state(), StateTag::NudgeAdjust);
        controller.tick(&mut host, Timestamp::from_millis(500));
        assert!(host.is_pressed(Signal::Forward));
        host.walk(0.5);
        controller.tick(&mut host, Timestamp::from_millis(550));
        assert_eq!(controller.state(), StateTag::Interacting);
        assert!(!host.is_pressed(Signal::Forward));

        controller.tick(&mut host, Timestamp::from_millis(1_000));
        assert_eq!(controller.state(), StateTag::Seeking);
        assert!(controller.failures().failure_count(target.id) > 0);
    }

    #[test]
    fn vanished_target_returns_to_seeking() {
        let (mut controller, mut host) = make_stocked();
        controller.start(&["farm"], &mut host, Timestamp::ZERO).unwrap();
        controller.tick(&mut host, Timestamp::from_millis(50));
        assert_eq!(controller.state(), StateTag::Approaching);
        host.targets.clear();
        controller.tick(&mut host, Timestamp::from_millis(100));
        assert_eq!(controller.state(), StateTag::Seeking);
    }
}
