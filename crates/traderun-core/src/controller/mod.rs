//! The trade-run controller.
//!
//! [`Controller`] owns the registries and drives one run at a time through
//! a tick-driven state machine. Every [`Controller::tick`] first runs the
//! watchdogs (global stuck, floor lock, stall recovery, absolute fail) and
//! then hands the current state to its handler, which returns the next
//! state. Handlers own their state's data by value, so nothing from a
//! previous state survives a transition.
//!
//! # Submodules
//!
//! - `state` - per-state data and the run bookkeeping
//! - `seek` - threshold checks, target choice and location rotation
//! - `trade` - approach, interaction, nudge and trade-screen handling
//! - `detour` - restock, dump and surplus-return visits to storage
//! - `transition` - travel between levels and the floor lock
//! - `watchdog` - movement watch, stall recovery and stuck detection

mod detour;
mod seek;
mod state;
mod trade;
mod transition;
mod watchdog;

use std::path::Path;

use rand::SeedableRng;
use rand::rngs::SmallRng;
use tracing::{debug, error, info, warn};
use traderun_registry::{
    CooldownTracker, FailureTracker, LocationRegistry, StorageMemory, Store, StoreError,
    VisitedSet,
};
use traderun_types::{
    BlockPos, Facing, ItemId, Location, Role, ScreenKind, StateTag, StorageSite, TargetId,
    TargetSnapshot, Timestamp, TransitionEdge, Vec3,
};

use crate::config::TradeRunConfig;
use crate::container::top_left_item;
use crate::error::{ControllerError, FailureKind};
use crate::log::{RollingLog, write_diagnostics};
use crate::navigation::NavigationGoalManager;
use crate::report::{AbortReport, RunStats, StartReport};
use crate::selector::{Suppression, TargetSelector};
use crate::world::{ContainerInteraction, Host, WorldQuery};

use self::state::{ControllerState, Leg, Run};

/// Radius around a restock signal in which a cooled target is cleared.
const RESTOCK_SIGNAL_RADIUS: f64 = 1.5;

/// Restock signals this soon after a trade come from the trade itself.
const RESTOCK_SIGNAL_IGNORE_MS: u64 = 5_000;

/// The registries a controller works with.
///
/// Built empty from the configuration, or loaded from a [`Store`].
#[derive(Debug, Clone)]
pub struct Registries {
    /// Registered locations.
    pub locations: LocationRegistry,
    /// Storage sites per location.
    pub storage: StorageMemory,
    /// Trade cooldowns.
    pub cooldowns: CooldownTracker,
    /// Failure suppressions.
    pub failures: FailureTracker,
}

impl Registries {
    /// Empty registries sized by `config`.
    pub const fn from_config(config: &TradeRunConfig) -> Self {
        Self {
            locations: LocationRegistry::new(
                config.registry.scan_radius,
                config.registry.cluster_distance,
            ),
            storage: StorageMemory::new(config.storage.level_tolerance),
            cooldowns: CooldownTracker::new(
                config.trading.cooldown_ms,
                config.trading.night_extension,
            ),
            failures: FailureTracker::new(
                config.registry.failure_short_ms,
                config.registry.failure_long_ms,
            ),
        }
    }

    /// Registries restored from `store`.
    ///
    /// # Errors
    ///
    /// Returns an error if a snapshot exists but cannot be read or parsed.
    pub fn load(
        config: &TradeRunConfig,
        store: &dyn Store,
        now: Timestamp,
    ) -> Result<Self, StoreError> {
        let mut registries = Self::from_config(config);
        registries.locations.restore(&store.load_locations()?);
        registries.storage.restore(&store.load_storage()?);
        registries.cooldowns.restore(&store.load_cooldowns()?, now);
        info!(
            locations = registries.locations.len(),
            inputs = registries.storage.count(Role::Input),
            outputs = registries.storage.count(Role::Output),
            cooldowns = registries.cooldowns.count(),
            "Registries loaded"
        );
        Ok(registries)
    }
}

/// Which registry to write back.
#[derive(Debug, Clone, Copy)]
enum Persist {
    Locations,
    Storage,
    Cooldowns(Timestamp),
}

/// The trade-run state machine and everything it owns.
pub struct Controller {
    config: TradeRunConfig,
    locations: LocationRegistry,
    storage: StorageMemory,
    cooldowns: CooldownTracker,
    failures: FailureTracker,
    visited: VisitedSet,
    store: Option<Box<dyn Store>>,
    selector: TargetSelector,
    nav: NavigationGoalManager,
    rng: SmallRng,
    log: RollingLog,
    state: ControllerState,
    /// Tag of the state being processed this tick.
    current: StateTag,
    run: Run,
    last_trade: Option<Timestamp>,
    last_abort: Option<AbortReport>,
}

impl core::fmt::Debug for Controller {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Controller")
            .field("state", &self.state.tag())
            .field("run_id", &self.run.id)
            .field("levels", &self.run.levels)
            .field("locations", &self.locations.len())
            .field("persistent", &self.store.is_some())
            .finish_non_exhaustive()
    }
}

impl Controller {
    /// Create an idle controller over `registries`.
    pub fn new(config: TradeRunConfig, registries: Registries) -> Self {
        let selector = TargetSelector::new(
            &config.trading.categories,
            config.registry.scan_radius,
            config.registry.relocation_min_candidates,
        );
        let nav = NavigationGoalManager::new(config.navigation.clone());
        let log = RollingLog::new(config.logging.rolling_lines);
        Self {
            config,
            locations: registries.locations,
            storage: registries.storage,
            cooldowns: registries.cooldowns,
            failures: registries.failures,
            visited: VisitedSet::new(),
            store: None,
            selector,
            nav,
            rng: SmallRng::from_os_rng(),
            log,
            state: ControllerState::Idle,
            current: StateTag::Idle,
            run: Run::new(Vec::new(), Timestamp::ZERO),
            last_trade: None,
            last_abort: None,
        }
    }

    /// Write registry changes through to `store`.
    #[must_use]
    pub fn with_store(mut self, store: Box<dyn Store>) -> Self {
        self.store = Some(store);
        self
    }

    /// Use a seeded random source, for reproducible escapes and click jitter.
    #[must_use]
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = SmallRng::seed_from_u64(seed);
        self
    }

    // -----------------------------------------------------------------------
    // Run control
    // -----------------------------------------------------------------------

    /// Start a run over the named locations, in the given order.
    ///
    /// Names that do not resolve, or whose location lacks an input or an
    /// output site, are skipped and reported. Levels named twice are cycled
    /// once. When the agent is more than one level away from the first
    /// location the run begins by travelling there.
    ///
    /// # Errors
    ///
    /// [`ControllerError::AlreadyRunning`] while a run is active, and
    /// [`ControllerError::NoUsableLocation`] when no name is usable. The
    /// controller stays idle in both cases.
    pub fn start(
        &mut self,
        names: &[&str],
        host: &mut dyn Host,
        now: Timestamp,
    ) -> Result<StartReport, ControllerError> {
        if self.is_active() {
            return Err(ControllerError::AlreadyRunning);
        }

        let mut levels: Vec<i32> = Vec::new();
        let mut skipped = Vec::new();
        for name in names {
            let Some(location) = self.locations.by_name(name) else {
                skipped.push(((*name).to_owned(), String::from("not registered")));
                continue;
            };
            if !self.storage.has_both(location.level) {
                skipped.push((
                    (*name).to_owned(),
                    format!("{} lacks an input or output site", location.display_name()),
                ));
                continue;
            }
            if levels.contains(&location.level) {
                debug!(name, level = location.level, "Duplicate location skipped");
                continue;
            }
            levels.push(location.level);
        }
        let Some(first) = levels.first().copied() else {
            return Err(ControllerError::NoUsableLocation {
                requested: names.iter().map(|n| (*n).to_owned()).collect(),
            });
        };

        self.halt(host);
        self.nav.clear_error();
        self.nav.clear_rate_limit();
        self.visited.clear();
        self.failures.clear_all();
        self.log.clear();
        self.last_abort = None;
        self.run = Run::new(levels, now);
        self.apply_location_categories(first);

        let agent_level = host.agent_position().level();
        let travelling = agent_level.abs_diff(first) > 1;
        self.state = if travelling {
            let destination = self.destination_on(first);
            self.travel_to(host, first, destination, now)
        } else {
            ControllerState::Seeking
        };
        self.current = self.state.tag();

        info!(
            run_id = %self.run.id,
            levels = ?self.run.levels,
            skipped = skipped.len(),
            travelling,
            "Run started"
        );
        self.log.push(
            now,
            format!("start levels={:?} travelling={travelling}", self.run.levels),
        );
        Ok(StartReport {
            run_id: self.run.id,
            levels: self.run.levels.clone(),
            skipped,
            travelling,
        })
    }

    /// Stop the run: cancel navigation, release every input, close any open
    /// container or trade screen and go idle.
    pub fn stop(&mut self, host: &mut dyn Host) {
        if !self.is_active() {
            return;
        }
        self.abort_session(host);
        self.halt(host);
        info!(run_id = %self.run.id, stats = %self.run.stats, "Run stopped");
        self.state = ControllerState::Idle;
        self.current = StateTag::Idle;
    }

    /// End the run as an operator abort, recording an [`AbortReport`].
    pub fn abort(&mut self, host: &mut dyn Host, now: Timestamp, reason: &str) {
        if !self.is_active() {
            return;
        }
        self.current = self.state.tag();
        self.abort_session(host);
        self.fail(host, now, FailureKind::Operator, reason);
    }

    /// Advance the controller by one frame.
    pub fn tick(&mut self, host: &mut dyn Host, now: Timestamp) {
        if !self.is_active() {
            return;
        }
        if host.is_paused() {
            host.release_all();
            return;
        }
        self.current = self.state.tag();

        if self.check_global_stuck(host, now) {
            return;
        }
        if host.override_requested() {
            self.abort_session(host);
            self.fail(host, now, FailureKind::Operator, "operator took over the controls");
            return;
        }

        self.nav.tick(host, now);
        self.watch_movement(&*host, now);
        if self.enforce_floor_lock(host, now) {
            return;
        }
        self.note_state_change(now);
        if self.recover_stall(host, now) {
            return;
        }
        if self.check_absolute_fail(host, now) {
            return;
        }

        let state = std::mem::take(&mut self.state);
        self.current = state.tag();
        self.state = self.step(state, host, now);
    }

    fn step(
        &mut self,
        state: ControllerState,
        host: &mut dyn Host,
        now: Timestamp,
    ) -> ControllerState {
        match state {
            ControllerState::Idle => ControllerState::Idle,
            ControllerState::Seeking => self.tick_seeking(host, now),
            ControllerState::Approaching(approach) => self.tick_approaching(approach, host, now),
            ControllerState::Interacting(interaction) => {
                self.tick_interacting(interaction, host, now)
            }
            ControllerState::NudgeAdjust(nudge) => self.tick_nudge(nudge, host, now),
            ControllerState::AwaitClose(wait) => self.tick_await_close(wait, host, now),
            ControllerState::RestockDetour(visit) => self.tick_restock(visit, host, now),
            ControllerState::DumpDetour(visit) => self.tick_dump(visit, host, now),
            ControllerState::ReturnExcessInput(ret) => self.tick_return(ret, host, now),
            ControllerState::LocationTransition(transition) => {
                self.tick_transition(transition, host, now)
            }
        }
    }

    // -----------------------------------------------------------------------
    // Read access
    // -----------------------------------------------------------------------

    /// The current state.
    pub const fn state(&self) -> StateTag {
        self.state.tag()
    }

    /// Whether a run is active.
    pub const fn is_active(&self) -> bool {
        !matches!(self.state, ControllerState::Idle)
    }

    /// The last `n` rolling-log lines, oldest first.
    pub fn recent_log(&self, n: usize) -> Vec<String> {
        self.log.recent(n)
    }

    /// Counters of the current (or last) run.
    pub fn stats(&self) -> RunStats {
        RunStats {
            visited: u32::try_from(self.visited.len()).unwrap_or(u32::MAX),
            ..self.run.stats
        }
    }

    /// The report of the last abnormal end, if the last run had one.
    pub const fn last_abort(&self) -> Option<&AbortReport> {
        self.last_abort.as_ref()
    }

    /// The level of the active location while running.
    pub fn active_level(&self) -> Option<i32> {
        if self.is_active() {
            self.run.active_level()
        } else {
            None
        }
    }

    /// The target being worked on.
    pub const fn current_target(&self) -> Option<&TargetSnapshot> {
        self.state.target()
    }

    /// The configuration.
    pub const fn config(&self) -> &TradeRunConfig {
        &self.config
    }

    /// Registered locations.
    pub const fn locations(&self) -> &LocationRegistry {
        &self.locations
    }

    /// Storage sites.
    pub const fn storage(&self) -> &StorageMemory {
        &self.storage
    }

    /// Trade cooldowns.
    pub const fn cooldowns(&self) -> &CooldownTracker {
        &self.cooldowns
    }

    /// Failure suppressions.
    pub const fn failures(&self) -> &FailureTracker {
        &self.failures
    }

    /// Targets traded with during the current run.
    pub const fn visited(&self) -> &VisitedSet {
        &self.visited
    }

    // -----------------------------------------------------------------------
    // Registration
    // -----------------------------------------------------------------------

    /// Register the location the agent stands on from the targets of
    /// `category` around it.
    ///
    /// # Errors
    ///
    /// Returns a registry error when no target of `category` is nearby and
    /// a store error when the registry cannot be saved.
    pub fn register_location(
        &mut self,
        world: &(impl WorldQuery + ?Sized),
        category: &str,
        name: Option<&str>,
    ) -> Result<Location, ControllerError> {
        let agent = world.agent_position();
        let candidates = world.entities_within(agent, self.locations.scan_radius());
        let location = self
            .locations
            .register(agent.level(), agent, &candidates, category, name)?
            .clone();
        self.persist(Persist::Locations)?;
        Ok(location)
    }

    /// Remember the container at `anchor` as the `role` site of the
    /// location the agent stands on, reachable from where the agent stands.
    ///
    /// # Errors
    ///
    /// [`ControllerError::NotOnLocation`] when the agent is not on a
    /// registered location, or a store error.
    pub fn set_storage(
        &mut self,
        world: &(impl WorldQuery + ?Sized),
        role: Role,
        anchor: BlockPos,
    ) -> Result<StorageSite, ControllerError> {
        let agent = world.agent_position();
        let level = self.location_key(agent.level())?;
        self.storage.set(level, role, anchor, agent, None);
        self.persist(Persist::Storage)?;
        self.storage
            .get(level, role)
            .cloned()
            .ok_or(ControllerError::NotOnLocation { level })
    }

    /// Learn the `role` site's item from the container the operator has
    /// open.
    ///
    /// # Errors
    ///
    /// [`ControllerError::NoContainerOpen`] without an open container,
    /// [`ControllerError::NotOnLocation`] when no `role` site is near the
    /// agent, or a store error.
    pub fn learn_item(
        &mut self,
        host: &(impl WorldQuery + ContainerInteraction + ?Sized),
        role: Role,
    ) -> Result<Option<ItemId>, ControllerError> {
        if host.open_screen() != Some(ScreenKind::Container) {
            return Err(ControllerError::NoContainerOpen { role });
        }
        let level = self.location_key(host.agent_position().level())?;
        let Some(site) = self.storage.get(level, role) else {
            return Err(ControllerError::NotOnLocation { level });
        };
        let site_level = site.level;
        let item = top_left_item(&host.slots());
        if self.storage.update_item(site_level, role, item.as_ref()) {
            self.persist(Persist::Storage)?;
        }
        Ok(item)
    }

    /// Record a stair or ramp from the agent's level towards `to_level`,
    /// starting where the agent stands.
    ///
    /// # Errors
    ///
    /// Returns a registry error when the agent is not on a registered
    /// location, or a store error.
    pub fn add_transition(
        &mut self,
        world: &(impl WorldQuery + ?Sized),
        to_level: i32,
    ) -> Result<TransitionEdge, ControllerError> {
        let agent = world.agent_position();
        let edge = self
            .locations
            .add_transition(agent.level(), to_level, agent.block_pos())?;
        self.persist(Persist::Locations)?;
        Ok(edge)
    }

    /// Forget a location and its storage sites.
    ///
    /// # Errors
    ///
    /// Returns a registry error for an unknown name, or a store error.
    pub fn remove_location(&mut self, name: &str) -> Result<Location, ControllerError> {
        let location = self.locations.remove_by_name(name)?;
        self.storage.remove_level(location.level);
        self.persist(Persist::Locations)?;
        self.persist(Persist::Storage)?;
        Ok(location)
    }

    /// Learn a site's item from a container the operator opened by hand.
    ///
    /// Works while idle. Returns the learned item when `anchor` is a
    /// registered site and its top-left slot holds something.
    pub fn observe_container(
        &mut self,
        host: &(impl ContainerInteraction + ?Sized),
        anchor: BlockPos,
    ) -> Option<ItemId> {
        let (level, role) = self
            .storage
            .find_by_anchor(anchor)
            .map(|site| (site.level, site.role))?;
        let item = top_left_item(&host.slots())?;
        if self.storage.update_item(level, role, Some(&item)) {
            info!(level, %role, item = %item, "Site item learned");
            self.persist_or_warn(Persist::Storage);
        }
        Some(item)
    }

    /// A target near `position` restocked its offers: clear its cooldown.
    ///
    /// Signals within a few seconds of a trade are ignored, since the
    /// trade itself produces them.
    pub fn observe_restock(
        &mut self,
        world: &(impl WorldQuery + ?Sized),
        position: Vec3,
        now: Timestamp,
    ) -> Option<TargetId> {
        if self
            .last_trade
            .is_some_and(|at| now.millis_since(at) < RESTOCK_SIGNAL_IGNORE_MS)
        {
            return None;
        }
        let id = world
            .entities_within(position, RESTOCK_SIGNAL_RADIUS)
            .into_iter()
            .filter(|t| self.cooldowns.contains(t.id))
            .min_by(|a, b| {
                a.position
                    .distance_sq(position)
                    .total_cmp(&b.position.distance_sq(position))
            })
            .map(|t| t.id)?;
        self.cooldowns.clear(id);
        debug!(target = %id, "Cooldown cleared by restock");
        self.persist_or_warn(Persist::Cooldowns(now));
        Some(id)
    }

    // -----------------------------------------------------------------------
    // Shared helpers
    // -----------------------------------------------------------------------

    /// The key level of the registered location at `level`.
    fn location_key(&self, level: i32) -> Result<i32, ControllerError> {
        self.locations
            .nearest_registered(level)
            .filter(|l| l.level.abs_diff(level) <= 1)
            .map(|l| l.level)
            .ok_or(ControllerError::NotOnLocation { level })
    }

    /// The active level, or the agent's own outside a run.
    fn floor(&self, world: &(impl WorldQuery + ?Sized)) -> i32 {
        self.run
            .active_level()
            .unwrap_or_else(|| world.agent_position().level())
    }

    /// The input item of `level`. Item ids learned during the run only
    /// count when a single location is cycled.
    fn input_item(&self, level: i32) -> Option<ItemId> {
        self.storage
            .remembered_item(level, Role::Input)
            .cloned()
            .or_else(|| self.learned(Role::Input))
    }

    /// The output item of `level`, with the same fallback as inputs.
    fn output_item(&self, level: i32) -> Option<ItemId> {
        self.storage
            .remembered_item(level, Role::Output)
            .cloned()
            .or_else(|| self.learned(Role::Output))
    }

    fn learned(&self, role: Role) -> Option<ItemId> {
        if self.run.is_multi() {
            return None;
        }
        match role {
            Role::Input => self.run.learned_input.clone(),
            Role::Output => self.run.learned_output.clone(),
        }
    }

    /// Remember `item` as the item of the `role` site on `level`.
    fn learn(&mut self, level: i32, role: Role, item: &ItemId) {
        match role {
            Role::Input => self.run.learned_input = Some(item.clone()),
            Role::Output => self.run.learned_output = Some(item.clone()),
        }
        if self.storage.update_item(level, role, Some(item)) {
            self.persist_or_warn(Persist::Storage);
        }
    }

    fn apply_location_categories(&mut self, level: i32) {
        let categories: Vec<String> = self
            .locations
            .get(level)
            .map(|l| l.categories.iter().cloned().collect())
            .filter(|c: &Vec<String>| !c.is_empty())
            .unwrap_or_else(|| self.config.trading.categories.clone());
        self.selector.set_categories(&categories);
    }

    /// A walkable point on `level`: the input stance, the output stance,
    /// or the cluster centroid.
    fn destination_on(&self, level: i32) -> BlockPos {
        [Role::Input, Role::Output]
            .into_iter()
            .find_map(|role| self.storage.get(level, role))
            .map(|site| site.stance.block_pos())
            .or_else(|| self.locations.get(level).map(|l| l.cluster.centroid))
            .unwrap_or_else(|| BlockPos::new(0, level, 0))
    }

    fn scan(&self, world: &(impl WorldQuery + ?Sized)) -> Vec<TargetSnapshot> {
        world.entities_within(world.agent_position(), self.selector.scan_radius())
    }

    /// The nearest eligible target on `level`.
    fn find_target(
        &mut self,
        world: &(impl WorldQuery + ?Sized),
        targets: &[TargetSnapshot],
        level: i32,
        now: Timestamp,
    ) -> Option<TargetSnapshot> {
        let mut suppression = Suppression {
            cooldowns: &mut self.cooldowns,
            failures: &mut self.failures,
            now,
            time_of_day: world.time_of_day(),
        };
        self.selector
            .find_best(targets, world.agent_position(), level, &mut suppression)
    }

    /// The live snapshot of `target`, if it is still around.
    fn refresh(
        &self,
        world: &(impl WorldQuery + ?Sized),
        target: &TargetSnapshot,
    ) -> Option<TargetSnapshot> {
        self.scan(world).into_iter().find(|t| t.id == target.id)
    }

    fn face(host: &mut dyn Host, point: Vec3) {
        let facing = Facing::towards(host.agent_eye_position(), point);
        host.set_facing(facing);
    }

    /// Append a line to the rolling log and the debug log.
    fn note(&mut self, now: Timestamp, message: &str) {
        debug!(run_id = %self.run.id, state = %self.current, "{message}");
        self.log.push(now, message);
    }

    // -----------------------------------------------------------------------
    // Cleanup, aborts and persistence
    // -----------------------------------------------------------------------

    /// Cancel navigation, release inputs and close our screens.
    fn halt(&mut self, host: &mut dyn Host) {
        self.nav.stop(host);
        host.release_all();
        if matches!(
            host.open_screen(),
            Some(ScreenKind::Trade | ScreenKind::Container)
        ) {
            host.close();
        }
    }

    fn abort_session(&mut self, host: &mut dyn Host) {
        if let Some(visit) = self.state.visit_mut() {
            if let Leg::Container(session) = &mut visit.leg {
                session.abort(host);
            }
        }
    }

    /// End the run abnormally and record why. Returns the idle state.
    fn fail(
        &mut self,
        host: &mut dyn Host,
        now: Timestamp,
        kind: FailureKind,
        reason: &str,
    ) -> ControllerState {
        let last_error = self
            .nav
            .last_error()
            .map(|e| e.to_string())
            .or_else(|| self.run.last_error.clone());
        self.halt(host);
        self.log.push(now, format!("abort ({kind}): {reason}"));
        error!(
            run_id = %self.run.id,
            %kind,
            state = %self.current,
            reason,
            "Run aborted"
        );

        let report = AbortReport {
            run_id: self.run.id,
            at: now,
            kind,
            reason: reason.to_owned(),
            state: self.current,
            last_error,
            stats: self.stats(),
            log_tail: self.log.recent(self.config.logging.rolling_lines),
        };
        if let Some(dir) = &self.config.persistence.diagnostics_dir {
            match write_diagnostics(Path::new(dir), &report) {
                Ok(path) => info!(path = %path.display(), "Diagnostics written"),
                Err(e) => warn!(error = %e, "Failed to write diagnostics"),
            }
        }
        self.last_abort = Some(report);
        self.state = ControllerState::Idle;
        ControllerState::Idle
    }

    fn persist(&mut self, what: Persist) -> Result<(), StoreError> {
        let Some(store) = self.store.as_mut() else {
            return Ok(());
        };
        match what {
            Persist::Locations => store.save_locations(&self.locations.snapshot()),
            Persist::Storage => store.save_storage(&self.storage.snapshot()),
            Persist::Cooldowns(now) => store.save_cooldowns(&self.cooldowns.snapshot(now)),
        }
    }

    fn persist_or_warn(&mut self, what: Persist) {
        if let Err(e) = self.persist(what) {
            warn!(error = %e, ?what, "Failed to persist registry");
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use traderun_registry::MemoryStore;
    use traderun_types::{ItemStack, Signal};

    use super::*;
    use crate::world::InputDriver;
    use crate::testing::{INPUT_ANCHOR, MockHost, OUTPUT_ANCHOR, make_setup, make_target};

    #[test]
    fn start_rejects_unknown_and_incomplete_locations() {
        let (mut controller, mut host) = make_setup();
        let err = controller
            .start(&["nowhere"], &mut host, Timestamp::ZERO)
            .unwrap_err();
        assert!(matches!(err, ControllerError::NoUsableLocation { .. }));
        assert_eq!(controller.state(), StateTag::Idle);

        let report = controller
            .start(&["nowhere", "farm", "farm"], &mut host, Timestamp::ZERO)
            .unwrap();
        assert_eq!(report.levels, vec![64]);
        assert_eq!(report.skipped.len(), 1);
        assert!(!report.travelling);
        assert_eq!(controller.state(), StateTag::Seeking);

        let again = controller.start(&["farm"], &mut host, Timestamp::ZERO);
        assert!(matches!(again, Err(ControllerError::AlreadyRunning)));
    }

    #[test]
    fn start_far_from_location_travels_first() {
        let (mut controller, mut host) = make_setup();
        host.agent = Vec3::new(0.5, 80.0, 0.5);
        let report = controller.start(&["farm"], &mut host, Timestamp::ZERO).unwrap();
        assert!(report.travelling);
        assert_eq!(controller.state(), StateTag::LocationTransition);
    }

    #[test]
    fn stop_releases_everything() {
        let (mut controller, mut host) = make_setup();
        controller.start(&["farm"], &mut host, Timestamp::ZERO).unwrap();
        host.press(Signal::Forward);
        host.screen = Some(ScreenKind::Trade);
        controller.stop(&mut host);
        assert_eq!(controller.state(), StateTag::Idle);
        assert!(host.pressed.is_empty());
        assert!(host.screen.is_none());
        assert!(controller.last_abort().is_none());
    }

    #[test]
    fn pause_releases_inputs_and_keeps_state() {
        let (mut controller, mut host) = make_setup();
        controller.start(&["farm"], &mut host, Timestamp::ZERO).unwrap();
        host.paused = true;
        host.press(Signal::Forward);
        controller.tick(&mut host, Timestamp::from_millis(50));
        assert!(host.pressed.is_empty());
        assert_eq!(controller.state(), StateTag::Seeking);
    }

    #[test]
    fn override_aborts_the_run() {
        let (mut controller, mut host) = make_setup();
        controller.start(&["farm"], &mut host, Timestamp::ZERO).unwrap();
        host.override_requested = true;
        controller.tick(&mut host, Timestamp::from_millis(50));
        assert_eq!(controller.state(), StateTag::Idle);
        let report = controller.last_abort().unwrap();
        assert_eq!(report.kind, FailureKind::Operator);
        assert!(!report.log_tail.is_empty());
    }

    #[test]
    fn registration_persists_to_store() {
        let config = TradeRunConfig::default();
        let mut controller = Controller::new(config.clone(), Registries::from_config(&config))
            .with_store(Box::new(MemoryStore::new()));
        let mut host = MockHost::new(Vec3::new(0.5, 64.0, 0.5));
        host.targets = vec![make_target(10.5, 10.5), make_target(12.5, 10.5)];

        let location = controller
            .register_location(&host, "farmer", Some("farm"))
            .unwrap();
        assert_eq!(location.level, 64);
        assert_eq!(location.cluster.members, 2);

        let site = controller.set_storage(&host, Role::Input, INPUT_ANCHOR).unwrap();
        assert_eq!(site.stance, host.agent);
        assert!(controller.learn_item(&host, Role::Input).is_err());

        host.agent = Vec3::new(0.5, 90.0, 0.5);
        let err = controller.set_storage(&host, Role::Output, OUTPUT_ANCHOR);
        assert!(matches!(err, Err(ControllerError::NotOnLocation { level: 90 })));

        let removed = controller.remove_location("farm").unwrap();
        assert_eq!(removed.level, 64);
        assert!(controller.storage().get(64, Role::Input).is_none());
    }

    #[test]
    fn manual_container_open_teaches_the_item() {
        let (mut controller, mut host) = make_setup();
        controller.storage.clear_item(64, Role::Input);
        host.screen = Some(ScreenKind::Container);
        *host.chest.get_mut(0).unwrap() = Some(ItemStack::new("minecraft:carrot", 12));
        let item = controller.observe_container(&host, INPUT_ANCHOR).unwrap();
        assert_eq!(item.as_str(), "minecraft:carrot");
        assert_eq!(
            controller.storage().remembered_item(64, Role::Input),
            Some(&item)
        );
        assert!(controller.observe_container(&host, BlockPos::new(99, 64, 99)).is_none());
    }

    #[test]
    fn restock_signal_clears_nearest_cooldown() {
        let (mut controller, host) = make_setup();
        let target = host.targets.first().unwrap().clone();
        controller.cooldowns.start(target.id, Timestamp::ZERO, None);

        controller.last_trade = Some(Timestamp::from_millis(1_000));
        assert!(
            controller
                .observe_restock(&host, target.position, Timestamp::from_millis(2_000))
                .is_none()
        );

        let cleared = controller.observe_restock(&host, target.position, Timestamp::from_millis(9_000));
        assert_eq!(cleared, Some(target.id));
        assert!(!controller.cooldowns().contains(target.id));
    }
}
