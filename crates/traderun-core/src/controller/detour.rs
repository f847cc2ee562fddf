//! Storage detours: restock at the input site, dump at the output site and
//! return surplus input before a location switch.
//!
//! Every detour is a [`Visit`]: walk to the site's stance, then run one
//! [`ContainerSession`]. The walk retries through a nearby target when it
//! makes no progress and falls back to walking at the container itself
//! when the stance turns out to be out of reach.

use tracing::{debug, info};
use traderun_types::{Deadline, ItemId, Role, ScreenKind, Timestamp, ToleranceClass};

use super::Controller;
use super::state::{ControllerState, Leg, ReturnInput, Visit, Walk};
use crate::container::{ContainerSession, SessionOutcome, TransferMode};
use crate::error::FailureKind;
use crate::inventory::{count_item, count_known, empty_slots};
use crate::selector::nearest_any_adult;
use crate::world::Host;

/// Squared distance at which a waypoint target counts as reached.
const WAYPOINT_REACHED_SQ: f64 = 4.0;

/// Squared horizontal distance at which a walk goal counts as reached.
const GOAL_REACHED_SQ: f64 = 1.0;

/// How a visit ended.
#[derive(Debug)]
pub(super) enum VisitEnd {
    /// The container session finished.
    Finished {
        outcome: SessionOutcome,
        item: Option<ItemId>,
    },
    /// The container could not be reached.
    Unreachable(&'static str),
}

impl Controller {
    // -----------------------------------------------------------------------
    // Entering detours
    // -----------------------------------------------------------------------

    /// Head for the input site of `level`, dumping first when carrying a
    /// lot of output.
    pub(super) fn begin_restock(
        &mut self,
        host: &mut dyn Host,
        level: i32,
        now: Timestamp,
    ) -> ControllerState {
        if !self.run.output_full && self.storage.get(level, Role::Output).is_some() {
            let output = count_known(&host.inventory(), self.output_item(level).as_ref());
            if output > self.config.storage.restock_while_here_threshold
                && self.run.next_dump.is_reached(now)
            {
                debug!(output, "Dumping before restocking");
                return self.begin_dump(host, level, now);
            }
        }

        let site = self
            .storage
            .get(level, Role::Input)
            .or_else(|| self.storage.nearest_with(Role::Input, level))
            .cloned();
        let Some(site) = site else {
            return self.fail(host, now, FailureKind::RegistryMiss, "no input site registered");
        };
        self.nav.stop(host);
        host.release_all();
        self.note(now, &format!("restock at {}", site.anchor));
        ControllerState::RestockDetour(Visit::new(site, now))
    }

    /// Head for the output site of `level`.
    pub(super) fn begin_dump(
        &mut self,
        host: &mut dyn Host,
        level: i32,
        now: Timestamp,
    ) -> ControllerState {
        if !self.run.next_dump.is_reached(now) {
            return ControllerState::Seeking;
        }
        let site = self
            .storage
            .get(level, Role::Output)
            .or_else(|| self.storage.nearest_with(Role::Output, level))
            .cloned();
        let Some(site) = site else {
            if empty_slots(&host.inventory()) <= self.config.storage.dump_trigger_empty_slots {
                return self.fail(
                    host,
                    now,
                    FailureKind::RegistryMiss,
                    "inventory filling up and no output site registered",
                );
            }
            self.run.next_dump = Deadline::after(now, self.config.storage.backoff_ms);
            self.notice(now, "no output site registered");
            return ControllerState::Seeking;
        };
        self.nav.stop(host);
        host.release_all();
        self.note(now, &format!("dump at {}", site.anchor));
        ControllerState::DumpDetour(Visit::new(site, now))
    }

    // -----------------------------------------------------------------------
    // Detour states
    // -----------------------------------------------------------------------

    pub(super) fn tick_restock(
        &mut self,
        mut visit: Visit,
        host: &mut dyn Host,
        now: Timestamp,
    ) -> ControllerState {
        let mode = TransferMode::Withdraw {
            reserved_empty: self.config.storage.restock_reserved_slots,
            desired_min: self.config.trading.input_min,
        };
        let Some(end) = self.drive_visit(&mut visit, &mode, host, now) else {
            return ControllerState::RestockDetour(visit);
        };

        let (outcome, item) = match end {
            VisitEnd::Unreachable(reason) => {
                self.run.last_error = Some(format!("input site: {reason}"));
                self.note(now, &format!("input site unreachable: {reason}"));
                self.nav.stop(host);
                self.run.seek_after = Deadline::after(now, self.config.storage.backoff_ms);
                return ControllerState::Seeking;
            }
            VisitEnd::Finished { outcome, item } => (outcome, item),
        };

        let level = visit.site.level;
        if let Some(item) = &item {
            self.learn(level, Role::Input, item);
        }
        let active = self.floor(&*host);
        let item = item.or_else(|| self.input_item(active));
        let have = count_known(&host.inventory(), item.as_ref());
        self.note(now, &format!("restock: {outcome}, carrying {have}"));
        self.run.seek_after =
            Deadline::after(now, self.config.trading.seek_delay_after_trade_ms);

        match outcome {
            SessionOutcome::UnknownItem => self.fail(
                host,
                now,
                FailureKind::RegistryMiss,
                "input item unknown: put it in the input container's first slot",
            ),
            SessionOutcome::InventoryFull { .. }
                if !self.run.output_full && self.storage.get(level, Role::Output).is_some() =>
            {
                self.begin_dump(host, level, now)
            }
            SessionOutcome::Completed
            | SessionOutcome::ContainerEmpty
            | SessionOutcome::InventoryFull { .. } => {
                if have < self.config.trading.input_min {
                    return self.enter_input_wait(host, now);
                }
                self.run.stats.restocks = self.run.stats.restocks.saturating_add(1);
                ControllerState::Seeking
            }
            SessionOutcome::Full { .. }
            | SessionOutcome::NotOpened
            | SessionOutcome::TimedOut
            | SessionOutcome::Closed => {
                self.run.last_error = Some(format!("input site: {outcome}"));
                self.run.seek_after = Deadline::after(now, self.config.storage.backoff_ms);
                ControllerState::Seeking
            }
        }
    }

    /// The input site came up short: recheck it later.
    fn enter_input_wait(&mut self, host: &mut dyn Host, now: Timestamp) -> ControllerState {
        self.run.input_recheck = Some(Deadline::after(now, self.config.storage.wait_check_ms));
        if !self.run.is_multi() {
            self.run.empty_cycles = self.run.empty_cycles.saturating_add(1);
            if self.run.empty_cycles > self.config.trading.max_empty_cycles {
                let reason = format!(
                    "input site empty on {} consecutive checks",
                    self.run.empty_cycles
                );
                return self.fail(host, now, FailureKind::Exhaustion, &reason);
            }
        }
        ControllerState::Seeking
    }

    pub(super) fn tick_dump(
        &mut self,
        mut visit: Visit,
        host: &mut dyn Host,
        now: Timestamp,
    ) -> ControllerState {
        if visit.started.has_elapsed(now, self.config.storage.dump_timeout_ms) {
            if let Leg::Container(session) = &mut visit.leg {
                session.abort(host);
            }
            self.nav.stop(host);
            self.run.last_error = Some(String::from("output site: dump timed out"));
            self.note(now, "dump timed out");
            self.run.next_dump = Deadline::after(now, self.config.storage.backoff_ms);
            return ControllerState::Seeking;
        }

        let Some(end) = self.drive_visit(&mut visit, &TransferMode::DepositSelected, host, now)
        else {
            return ControllerState::DumpDetour(visit);
        };

        let (outcome, item) = match end {
            VisitEnd::Unreachable(reason) => {
                self.run.last_error = Some(format!("output site: {reason}"));
                self.note(now, &format!("output site unreachable: {reason}"));
                self.nav.stop(host);
                self.run.next_dump = Deadline::after(now, self.config.storage.backoff_ms);
                return ControllerState::Seeking;
            }
            VisitEnd::Finished { outcome, item } => (outcome, item),
        };

        if let Some(item) = &item {
            self.learn(visit.site.level, Role::Output, item);
        }
        self.note(now, &format!("dump: {outcome}"));
        self.run.seek_after =
            Deadline::after(now, self.config.trading.seek_delay_after_trade_ms);

        match outcome {
            SessionOutcome::UnknownItem => self.fail(
                host,
                now,
                FailureKind::RegistryMiss,
                "output item unknown: put it in the output container's first slot",
            ),
            SessionOutcome::Full { remainder } => {
                info!(run_id = %self.run.id, remainder, "Output site full");
                self.run.output_full = true;
                self.run.next_dump =
                    Deadline::after(now, self.config.storage.output_full_retry_ms);
                ControllerState::Seeking
            }
            SessionOutcome::Completed => {
                self.run.output_full = false;
                self.run.leave_wait(Role::Output);
                self.run.stats.dumps = self.run.stats.dumps.saturating_add(1);
                ControllerState::Seeking
            }
            SessionOutcome::ContainerEmpty
            | SessionOutcome::InventoryFull { .. }
            | SessionOutcome::NotOpened
            | SessionOutcome::TimedOut
            | SessionOutcome::Closed => {
                self.run.last_error = Some(format!("output site: {outcome}"));
                self.run.next_dump = Deadline::after(now, self.config.storage.backoff_ms);
                ControllerState::Seeking
            }
        }
    }

    pub(super) fn tick_return(
        &mut self,
        mut ret: ReturnInput,
        host: &mut dyn Host,
        now: Timestamp,
    ) -> ControllerState {
        if !ret.visit.in_session() && count_item(&host.inventory(), &ret.item) == 0 {
            return self.switch_location(host, ret.next_index, now);
        }
        let mode = TransferMode::DepositSpecific(ret.item.clone());
        match self.drive_visit(&mut ret.visit, &mode, host, now) {
            None => ControllerState::ReturnExcessInput(ret),
            Some(VisitEnd::Finished { outcome, .. }) => {
                self.note(now, &format!("surplus return: {outcome}"));
                self.switch_location(host, ret.next_index, now)
            }
            Some(VisitEnd::Unreachable(reason)) => {
                self.note(now, &format!("surplus return skipped: {reason}"));
                self.switch_location(host, ret.next_index, now)
            }
        }
    }

    // -----------------------------------------------------------------------
    // Visits
    // -----------------------------------------------------------------------

    /// Walk to the site and run one session in `mode`. Returns how the
    /// visit ended once it has.
    fn drive_visit(
        &mut self,
        visit: &mut Visit,
        mode: &TransferMode,
        host: &mut dyn Host,
        now: Timestamp,
    ) -> Option<VisitEnd> {
        if let Leg::Container(session) = &mut visit.leg {
            let outcome = session.tick(host, &mut self.rng, now)?;
            let item = session.item().cloned();
            self.run.container_block =
                Deadline::after(now, self.config.storage.post_close_delay_ms);
            return Some(VisitEnd::Finished { outcome, item });
        }
        if !self.run.container_block.is_reached(now) {
            return None;
        }

        let anchor = visit.site.anchor;
        let range = self.config.storage.container_range;
        let in_range = host.agent_eye_position().distance_sq(anchor.center()) <= range * range;
        if in_range || host.open_screen() == Some(ScreenKind::Container) {
            self.nav.stop(host);
            host.release_all();
            Self::face(host, anchor.center());
            let known = self
                .storage
                .remembered_item(visit.site.level, visit.role())
                .cloned()
                .or_else(|| self.learned(visit.role()));
            let session = ContainerSession::new(
                self.config.container.clone(),
                mode.clone(),
                anchor,
                known,
                now,
            );
            debug!(anchor = %anchor, role = %visit.role(), "Container session started");
            visit.leg = Leg::Container(Box::new(session));
            return None;
        }

        if matches!(visit.leg, Leg::Pending) {
            let goal = visit.site.stance.block_pos();
            self.nav.clear_rate_limit();
            self.nav.request(host, goal, ToleranceClass::Platform, now);
            visit.leg = Leg::Walking(Walk::new(goal, now));
            return None;
        }
        let Leg::Walking(walk) = &mut visit.leg else {
            return None;
        };

        let storage = &self.config.storage;
        if visit.started.has_elapsed(now, storage.nav_timeout_ms) {
            return Some(VisitEnd::Unreachable("walk timed out"));
        }

        let agent = host.agent_position();
        if walk.via_target {
            if agent.distance_sq(walk.goal.bottom_center()) < WAYPOINT_REACHED_SQ {
                debug!("Waypoint reached, back to the site");
                walk.via_target = false;
                walk.goal = visit.site.stance.block_pos();
                walk.reissue = true;
            }
        } else if !walk.retried_via_target
            && walk.started.has_elapsed(now, storage.retry_via_target_ms)
        {
            let targets = self.scan(&*host);
            if let Some(waypoint) = nearest_any_adult(&targets, agent) {
                debug!(waypoint = %waypoint.id, "No progress to the site, going via a target");
                walk.via_target = true;
                walk.retried_via_target = true;
                walk.goal = waypoint.position.block_pos();
                walk.reissue = true;
            }
        } else if agent.horizontal_distance_sq(walk.goal.bottom_center()) <= GOAL_REACHED_SQ {
            if walk.direct_to_anchor {
                return Some(VisitEnd::Unreachable("container out of reach from its stance"));
            }
            debug!(anchor = %anchor, "Stance out of range, walking at the container");
            walk.direct_to_anchor = true;
            walk.goal = anchor;
            walk.reissue = true;
        }

        if self.nav.last_error().is_some() {
            self.nav.clear_error();
            walk.reissue = true;
        }
        if walk.reissue || self.nav.active_goal() != Some(walk.goal) {
            let tolerance = if walk.via_target {
                ToleranceClass::Unrestricted
            } else {
                ToleranceClass::Platform
            };
            self.nav.clear_rate_limit();
            if self.nav.request(host, walk.goal, tolerance, now).is_issued() {
                walk.reissue = false;
            }
        }
        None
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use traderun_types::{ItemStack, StateTag};

    use super::*;
    use crate::testing::{OUTPUT_STANCE, make_setup};

    /// Tick every 50 ms until the state leaves `tag` or `limit_ms` passes.
    fn run_while(
        controller: &mut Controller,
        host: &mut crate::testing::MockHost,
        tag: StateTag,
        from_ms: u64,
        limit_ms: u64,
    ) -> u64 {
        let mut at = from_ms;
        while controller.state() == tag && at < from_ms.saturating_add(limit_ms) {
            at = at.saturating_add(50);
            controller.tick(host, Timestamp::from_millis(at));
        }
        at
    }

    #[test]
    fn restock_withdraws_from_the_input_site() {
        let (mut controller, mut host) = make_setup();
        for slot in host.chest.iter_mut().take(3) {
            *slot = Some(ItemStack::new("minecraft:wheat", 64));
        }
        controller.start(&["farm"], &mut host, Timestamp::ZERO).unwrap();
        controller.tick(&mut host, Timestamp::from_millis(50));
        assert_eq!(controller.state(), StateTag::RestockDetour);

        run_while(&mut controller, &mut host, StateTag::RestockDetour, 50, 12_000);
        assert_eq!(controller.state(), StateTag::Seeking);
        assert_eq!(controller.stats().restocks, 1);
        let wheat = ItemId::new("minecraft:wheat");
        assert_eq!(count_item(&host.inventory, &wheat), 192);
        assert!(host.screen.is_none());
    }

    #[test]
    fn empty_input_site_enters_wait_mode() {
        let (mut controller, mut host) = make_setup();
        controller.start(&["farm"], &mut host, Timestamp::ZERO).unwrap();
        controller.tick(&mut host, Timestamp::from_millis(50));
        let at = run_while(&mut controller, &mut host, StateTag::RestockDetour, 50, 12_000);
        assert_eq!(controller.state(), StateTag::Seeking);
        assert!(controller.run.input_recheck.is_some());

        controller.tick(&mut host, Timestamp::from_millis(at.saturating_add(1_000)));
        assert_eq!(controller.state(), StateTag::Seeking);
        assert_eq!(controller.run.wait.unwrap().role, Role::Input);
        assert_eq!(controller.stats().restocks, 0);
    }

    #[test]
    fn full_output_site_is_remembered() {
        let (mut controller, mut host) = make_setup();
        host.agent = OUTPUT_STANCE;
        host.fill_inventory(0, &ItemStack::new("minecraft:wheat", 64));
        for slot in host.inventory.iter_mut().skip(1).take(3) {
            *slot = Some(ItemStack::new("minecraft:emerald", 64));
        }
        *host.chest.get_mut(0).unwrap() = Some(ItemStack::new("minecraft:emerald", 64));
        for slot in host.chest.iter_mut().skip(1).take(25) {
            *slot = Some(ItemStack::new("minecraft:cobblestone", 64));
        }
        controller.start(&["farm"], &mut host, Timestamp::ZERO).unwrap();
        controller.state = controller.begin_dump(&mut host, 64, Timestamp::ZERO);
        assert_eq!(controller.state(), StateTag::DumpDetour);

        run_while(&mut controller, &mut host, StateTag::DumpDetour, 0, 15_000);
        assert_eq!(controller.state(), StateTag::Seeking);
        assert!(controller.run.output_full);
        assert_eq!(controller.stats().dumps, 0);
        assert!(!controller.run.next_dump.is_reached(Timestamp::from_millis(12_000)));
    }

    #[test]
    fn missing_output_site_with_space_backs_off() {
        let (mut controller, mut host) = make_setup();
        controller.start(&["farm"], &mut host, Timestamp::ZERO).unwrap();
        controller.storage.remove(64, Role::Output);
        let next = controller.begin_dump(&mut host, 64, Timestamp::ZERO);
        assert!(matches!(next, ControllerState::Seeking));
        assert!(!controller.run.next_dump.is_reached(Timestamp::from_millis(100)));

        host.fill_inventory(0, &ItemStack::new("minecraft:emerald", 64));
        let later = Timestamp::from_millis(10_000);
        let next = controller.begin_dump(&mut host, 64, later);
        assert!(matches!(next, ControllerState::Idle));
        assert_eq!(controller.last_abort().unwrap().kind, FailureKind::RegistryMiss);
    }
}
