//! Seeking: carried thresholds, target choice and location rotation.

use tracing::{debug, info};
use traderun_types::{Deadline, Role, ScreenKind, TargetSnapshot, Timer, Timestamp, ToleranceClass};

use super::Controller;
use super::state::{Approach, ControllerState, ReturnInput, Visit};
use crate::approach::find_approach;
use crate::error::FailureKind;
use crate::inventory::{count_item, count_known, empty_slots};
use crate::navigation::GoalRequest;
use crate::selector::Suppression;
use crate::world::Host;

impl Controller {
    pub(super) fn tick_seeking(&mut self, host: &mut dyn Host, now: Timestamp) -> ControllerState {
        match host.open_screen() {
            // The operator may be refilling a site we wait on.
            Some(ScreenKind::Container) if self.run.wait.is_some() => {
                return ControllerState::Seeking;
            }
            Some(ScreenKind::Container | ScreenKind::Trade) => {
                host.close();
                return ControllerState::Seeking;
            }
            _ => {}
        }
        if !self.run.seek_after.is_reached(now) {
            return ControllerState::Seeking;
        }

        let level = self.floor(&*host);
        let targets = self.scan(&*host);
        if self.run.is_multi()
            && self
                .selector
                .count_on_floor(&targets, host.agent_position(), level)
                == 0
        {
            if let Some(next) = self.try_next_location(host, now) {
                return next;
            }
        }

        if let Some(next) = self.check_input(host, level, now) {
            return next;
        }
        if let Some(next) = self.check_output(host, level, &targets, now) {
            return next;
        }
        self.pick_target(host, level, &targets, now)
    }

    // -----------------------------------------------------------------------
    // Thresholds
    // -----------------------------------------------------------------------

    /// Restock when short of input. While the input site is known to be
    /// empty, keep trading what is carried, rotate, or wait.
    fn check_input(
        &mut self,
        host: &mut dyn Host,
        level: i32,
        now: Timestamp,
    ) -> Option<ControllerState> {
        let item = self.input_item(level);
        let have = count_known(&host.inventory(), item.as_ref());
        if item.is_some() && have >= self.config.trading.input_min.max(1) {
            if self.run.leave_wait(Role::Input) {
                self.note(now, "input available again");
            }
            self.run.input_recheck = None;
            self.run.empty_cycles = 0;
            self.run.empty_switches = 0;
            self.run.empty_rotations = 0;
            return None;
        }

        let confirmed_empty = self.run.input_recheck.is_some_and(|d| !d.is_reached(now));
        if !confirmed_empty {
            return Some(self.begin_restock(host, level, now));
        }
        if have > 0 {
            return None;
        }

        if self.run.is_multi() {
            if let Some(index) = self.next_location_index(now) {
                if self.note_empty_switch() {
                    let reason = format!(
                        "input sites empty through {} rotations",
                        self.config.trading.max_rotations
                    );
                    return Some(self.fail(host, now, FailureKind::Exhaustion, &reason));
                }
                return Some(self.leave_for(host, index, now));
            }
        }

        if self.run.enter_wait(Role::Input, now) {
            info!(run_id = %self.run.id, level, "Input site empty, waiting");
            self.note(now, "input site empty, waiting for a refill");
        }
        let timed_out = self.run.wait.is_some_and(|w| {
            w.role == Role::Input && w.since.has_elapsed(now, self.config.storage.wait_timeout_ms)
        });
        if timed_out {
            return Some(self.fail(
                host,
                now,
                FailureKind::Exhaustion,
                "input site stayed empty for the whole wait",
            ));
        }
        Some(ControllerState::Seeking)
    }

    /// Count one switch away from an empty location. Returns whether the
    /// rotation limit is reached.
    fn note_empty_switch(&mut self) -> bool {
        self.run.empty_switches = self.run.empty_switches.saturating_add(1);
        let per_rotation = u32::try_from(self.run.levels.len()).unwrap_or(u32::MAX);
        if self.run.empty_switches >= per_rotation {
            self.run.empty_switches = 0;
            self.run.empty_rotations = self.run.empty_rotations.saturating_add(1);
        }
        self.run.empty_rotations >= self.config.trading.max_rotations
    }

    /// Dump when carrying enough output or running out of slots.
    fn check_output(
        &mut self,
        host: &mut dyn Host,
        level: i32,
        targets: &[TargetSnapshot],
        now: Timestamp,
    ) -> Option<ControllerState> {
        let inventory = host.inventory();
        let empty = empty_slots(&inventory);
        let item = self.output_item(level);
        let carried = count_known(&inventory, item.as_ref());

        if empty == 0 && item.is_none() {
            return Some(self.fail(
                host,
                now,
                FailureKind::RegistryMiss,
                "inventory full and the output item was never learned",
            ));
        }

        if self.run.output_full {
            if empty > 0 {
                self.run.output_full = false;
                if self.run.leave_wait(Role::Output) {
                    self.note(now, "inventory has room again");
                }
            } else {
                return Some(self.wait_for_output_room(host, level, now));
            }
        }

        let storage = &self.config.storage;
        let wants_dump = carried > 0
            && (carried >= self.config.trading.output_min
                || empty <= storage.dump_trigger_empty_slots);
        if !wants_dump || !self.run.next_dump.is_reached(now) {
            return None;
        }
        if self.holds_output_for_next(&*host, targets, level, now) {
            debug!(carried, "Holding output for the next location");
            return None;
        }
        Some(self.begin_dump(host, level, now))
    }

    fn wait_for_output_room(
        &mut self,
        host: &mut dyn Host,
        level: i32,
        now: Timestamp,
    ) -> ControllerState {
        if self.run.enter_wait(Role::Output, now) {
            info!(run_id = %self.run.id, level, "Output site full, waiting");
            self.note(now, "output site full and inventory full, waiting");
        }
        let Some(wait) = self.run.wait.as_mut() else {
            return ControllerState::Seeking;
        };
        if wait.since.has_elapsed(now, self.config.storage.wait_timeout_ms) {
            return self.fail(
                host,
                now,
                FailureKind::Exhaustion,
                "output site stayed full for the whole wait",
            );
        }
        if now.millis_since(wait.last_check) >= self.config.storage.wait_check_ms {
            wait.last_check = now;
            return self.begin_dump(host, level, now);
        }
        ControllerState::Seeking
    }

    /// Whether to carry output to the next location, which takes it as
    /// input, instead of dumping it here.
    fn holds_output_for_next(
        &mut self,
        world: &dyn Host,
        targets: &[TargetSnapshot],
        level: i32,
        now: Timestamp,
    ) -> bool {
        if !self.run.is_multi() {
            return false;
        }
        let Some(output) = self.output_item(level) else {
            return false;
        };
        let next = self
            .run
            .levels
            .iter()
            .cycle()
            .nth(self.run.active.saturating_add(1))
            .copied();
        let Some(next) = next else {
            return false;
        };
        if self.storage.remembered_item(next, Role::Input) != Some(&output) {
            return false;
        }
        self.find_target(world, targets, level, now).is_none()
    }

    // -----------------------------------------------------------------------
    // Targets
    // -----------------------------------------------------------------------

    fn pick_target(
        &mut self,
        host: &mut dyn Host,
        level: i32,
        targets: &[TargetSnapshot],
        now: Timestamp,
    ) -> ControllerState {
        let mut target = self.find_target(&*host, targets, level, now);
        if target.is_none() && self.failures.suppressed_count() > 0 {
            debug!("No eligible target, clearing failure suppressions");
            self.failures.clear_all();
            target = self.find_target(&*host, targets, level, now);
        }
        let Some(target) = target else {
            return self.no_target(host, level, targets, now);
        };
        self.run.cooldown_wait = None;

        let Some(tile) = find_approach(&*host, &target) else {
            self.failures.mark_no_approach(target.id, now);
            self.note(now, &format!("no approach tile for {}", target.id));
            self.run.seek_after =
                Deadline::after(now, self.config.trading.seek_delay_no_approach_ms);
            return ControllerState::Seeking;
        };

        self.nav.clear_rate_limit();
        match self.nav.request(host, tile.pos, ToleranceClass::ExactFloor, now) {
            GoalRequest::Rejected(error) => {
                self.failures.mark_failure(target.id, now);
                self.note(now, &format!("approach goal refused: {error}"));
                self.run.seek_after =
                    Deadline::after(now, self.config.trading.seek_delay_after_failure_ms);
                ControllerState::Seeking
            }
            GoalRequest::Issued | GoalRequest::RateLimited => {
                debug!(
                    target = %target.id,
                    tile = %tile.pos,
                    diagonal = tile.diagonal,
                    "Approaching target"
                );
                self.note(now, &format!("approach {} via {}", target.id, tile.pos));
                let agent = host.agent_position();
                ControllerState::Approaching(Approach::new(target, tile, agent, now))
            }
        }
    }

    /// Nothing eligible: tell "all cooling down" from "nothing here".
    fn no_target(
        &mut self,
        host: &mut dyn Host,
        level: i32,
        targets: &[TargetSnapshot],
        now: Timestamp,
    ) -> ControllerState {
        let agent = host.agent_position();
        let total = self.selector.count_on_floor(targets, agent, level);
        let mut suppression = Suppression {
            cooldowns: &mut self.cooldowns,
            failures: &mut self.failures,
            now,
            time_of_day: host.time_of_day(),
        };
        let counts = self.selector.counts(targets, agent, level, &mut suppression);
        let some_free = self
            .selector
            .has_without_cooldown(targets, agent, level, &mut suppression);

        if total > 0 && some_free {
            // Busy or unreachable targets: look again shortly.
            self.run.seek_after = Deadline::after(now, self.config.trading.seek_delay_suppressed_ms);
            return ControllerState::Seeking;
        }

        if let Some(next) = self.try_relocate(host, targets, now) {
            return next;
        }

        if total == 0 {
            if let Some(next) = self.try_next_location(host, now) {
                return next;
            }
            self.notice(now, &format!("no targets here ({counts})"));
            self.run.seek_after = Deadline::after(now, self.config.trading.seek_delay_suppressed_ms);
            return ControllerState::Seeking;
        }

        // Every target is cooling down.
        if let Some(next) = self.try_next_location(host, now) {
            return next;
        }
        if let Some(next) = self.cooldown_restock(host, level, now) {
            return next;
        }
        let timeout = self.config.storage.cooldown_wait_timeout_ms;
        let waited = *self.run.cooldown_wait.get_or_insert_with(|| Timer::start(now));
        if waited.has_elapsed(now, timeout) {
            return self.fail(
                host,
                now,
                FailureKind::Exhaustion,
                "every target stayed on cooldown for the whole wait",
            );
        }
        self.notice(now, &format!("all targets cooling down ({counts})"));
        self.run.seek_after = Deadline::after(now, self.config.trading.seek_delay_suppressed_ms);
        ControllerState::Seeking
    }

    /// Top up input while every target is cooling down.
    fn cooldown_restock(
        &mut self,
        host: &mut dyn Host,
        level: i32,
        now: Timestamp,
    ) -> Option<ControllerState> {
        let storage = &self.config.storage;
        if !self.run.next_cooldown_restock.is_reached(now)
            || empty_slots(&host.inventory()) <= storage.cooldown_restock_min_empty
            || self.storage.get(level, Role::Input).is_none()
        {
            return None;
        }
        self.run.next_cooldown_restock =
            Deadline::after(now, storage.cooldown_restock_interval_ms);
        self.note(now, "restocking while targets cool down");
        Some(self.begin_restock(host, level, now))
    }

    /// Log a line at most once per notice interval.
    pub(super) fn notice(&mut self, now: Timestamp, message: &str) {
        let due = self
            .run
            .last_notice
            .is_none_or(|at| now.millis_since(at) >= self.config.storage.no_site_notice_ms);
        if due {
            self.run.last_notice = Some(now);
            info!(run_id = %self.run.id, "{message}");
            self.log.push(now, message);
        }
    }

    // -----------------------------------------------------------------------
    // Location rotation
    // -----------------------------------------------------------------------

    /// Move to a level holding more eligible targets of the wanted
    /// categories, when it is a usable location.
    fn try_relocate(
        &mut self,
        host: &mut dyn Host,
        targets: &[TargetSnapshot],
        now: Timestamp,
    ) -> Option<ControllerState> {
        let mut suppression = Suppression {
            cooldowns: &mut self.cooldowns,
            failures: &mut self.failures,
            now,
            time_of_day: host.time_of_day(),
        };
        let level =
            self.selector
                .best_level_to_move_to(targets, host.agent_position(), &mut suppression)?;
        let key = self
            .locations
            .nearest_registered(level)
            .filter(|l| l.level.abs_diff(level) <= 1)
            .map(|l| l.level)?;
        if !self.storage.has_both(key) {
            return None;
        }
        let index = if let Some(index) = self.run.levels.iter().position(|l| *l == key) {
            index
        } else {
            self.run.levels.push(key);
            self.run.levels.len().saturating_sub(1)
        };
        info!(run_id = %self.run.id, level = key, "Relocating to a richer level");
        Some(self.switch_location(host, index, now))
    }

    /// Rotate to the next usable location, if the dwell time allows it.
    pub(super) fn try_next_location(
        &mut self,
        host: &mut dyn Host,
        now: Timestamp,
    ) -> Option<ControllerState> {
        let index = self.next_location_index(now)?;
        Some(self.leave_for(host, index, now))
    }

    fn next_location_index(&self, now: Timestamp) -> Option<usize> {
        if !self.run.is_multi()
            || !self.run.arrived.has_elapsed(now, self.config.trading.min_dwell_ms)
        {
            return None;
        }
        let current = self.run.active_level();
        let len = self.run.levels.len();
        (1..len)
            .filter_map(|step| self.run.active.saturating_add(step).checked_rem(len))
            .find(|index| {
                self.run
                    .levels
                    .get(*index)
                    .is_some_and(|l| Some(*l) != current && self.storage.has_both(*l))
            })
    }

    /// Leave for the location at `index`, returning surplus input first.
    fn leave_for(&mut self, host: &mut dyn Host, index: usize, now: Timestamp) -> ControllerState {
        let level = self.floor(&*host);
        if let Some(item) = self.input_item(level) {
            let carried = count_item(&host.inventory(), &item);
            if carried > self.config.trading.return_input_threshold && !self.run.output_full {
                if let Some(site) = self.storage.get(level, Role::Input).cloned() {
                    self.note(
                        now,
                        &format!("returning {carried} surplus input before switching"),
                    );
                    self.nav.stop(host);
                    return ControllerState::ReturnExcessInput(ReturnInput {
                        visit: Visit::new(site, now),
                        item,
                        next_index: index,
                    });
                }
            }
        }
        self.switch_location(host, index, now)
    }

    /// Make the location at `index` active and travel there.
    pub(super) fn switch_location(
        &mut self,
        host: &mut dyn Host,
        index: usize,
        now: Timestamp,
    ) -> ControllerState {
        let Some(level) = self.run.levels.get(index).copied() else {
            return ControllerState::Seeking;
        };
        self.run.active = index;
        self.run.arrived.restart(now);
        self.run.learned_input = None;
        self.run.learned_output = None;
        self.run.cooldown_wait = None;
        self.run.input_recheck = None;
        self.run.wait = None;
        self.run.stats.rotations = self.run.stats.rotations.saturating_add(1);
        self.apply_location_categories(level);

        let name = self
            .locations
            .get(level)
            .map_or_else(|| format!("Y={level}"), |l| l.display_name());
        info!(run_id = %self.run.id, level, location = %name, "Switching location");
        self.note(now, &format!("switching to {name}"));
        let destination = self.destination_on(level);
        self.travel_to(host, level, destination, now)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use traderun_types::{ItemStack, StateTag};

    use super::*;
    use crate::testing::{INPUT_STANCE, make_setup, make_two_locations};

    #[test]
    fn missing_input_starts_a_restock() {
        let (mut controller, mut host) = make_setup();
        controller.start(&["farm"], &mut host, Timestamp::ZERO).unwrap();
        controller.tick(&mut host, Timestamp::from_millis(50));
        assert_eq!(controller.state(), StateTag::RestockDetour);
    }

    #[test]
    fn stocked_agent_approaches_the_nearest_target() {
        let (mut controller, mut host) = make_setup();
        host.fill_inventory(0, &ItemStack::new("minecraft:wheat", 64));
        controller.start(&["farm"], &mut host, Timestamp::ZERO).unwrap();
        controller.tick(&mut host, Timestamp::from_millis(50));
        assert_eq!(controller.state(), StateTag::Approaching);
        let target = controller.current_target().unwrap();
        assert!((target.position.x - 10.5).abs() < f64::EPSILON);
    }

    #[test]
    fn full_output_triggers_a_dump() {
        let (mut controller, mut host) = make_setup();
        host.fill_inventory(0, &ItemStack::new("minecraft:wheat", 64));
        for slot in host.inventory.iter_mut().skip(1) {
            *slot = Some(ItemStack::new("minecraft:emerald", 64));
        }
        controller.start(&["farm"], &mut host, Timestamp::ZERO).unwrap();
        controller.tick(&mut host, Timestamp::from_millis(50));
        assert_eq!(controller.state(), StateTag::DumpDetour);
    }

    #[test]
    fn all_targets_cooling_waits_then_gives_up() {
        let (mut controller, mut host) = make_setup();
        host.fill_inventory(0, &ItemStack::new("minecraft:wheat", 64));
        for target in &host.targets {
            controller.cooldowns.start(target.id, Timestamp::ZERO, None);
        }
        // Standing still is fine while waiting on cooldowns.
        controller.start(&["farm"], &mut host, Timestamp::ZERO).unwrap();
        controller.tick(&mut host, Timestamp::from_millis(50));
        assert_eq!(controller.state(), StateTag::Seeking);
        assert!(controller.run.cooldown_wait.is_some());

        let timeout = controller.config.storage.cooldown_wait_timeout_ms;
        controller.tick(&mut host, Timestamp::from_millis(timeout.saturating_add(100)));
        assert_eq!(controller.state(), StateTag::Idle);
        assert_eq!(controller.last_abort().unwrap().kind, FailureKind::Exhaustion);
    }

    #[test]
    fn rotation_waits_for_dwell_time_and_returns_surplus_input() {
        let (mut controller, mut host) = make_two_locations();
        host.targets.clear();
        host.fill_inventory(0, &ItemStack::new("minecraft:wheat", 64));
        controller.start(&["farm", "upper"], &mut host, Timestamp::ZERO).unwrap();

        controller.tick(&mut host, Timestamp::from_millis(50));
        assert_eq!(controller.state(), StateTag::Seeking);

        let dwell = controller.config.trading.min_dwell_ms;
        controller.tick(&mut host, Timestamp::from_millis(dwell.saturating_add(100)));
        assert_eq!(controller.state(), StateTag::ReturnExcessInput);
        assert_eq!(controller.run.active, 0);
    }

    #[test]
    fn rotation_switches_and_travels() {
        let (mut controller, mut host) = make_two_locations();
        host.targets.clear();
        host.agent = INPUT_STANCE;
        controller.start(&["farm", "upper"], &mut host, Timestamp::ZERO).unwrap();
        let dwell = controller.config.trading.min_dwell_ms;
        controller.tick(&mut host, Timestamp::from_millis(dwell.saturating_add(100)));
        assert_eq!(controller.state(), StateTag::LocationTransition);
        assert_eq!(controller.active_level(), Some(80));
        assert_eq!(controller.stats().rotations, 1);
    }
}
