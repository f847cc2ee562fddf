//! Configuration loading and typed config structures for the trade-run
//! controller.
//!
//! Every threshold the controller compares against lives here. The YAML
//! file mirrors these structs section by section; any field (or whole
//! section) left out takes its default, so an empty file is a valid
//! configuration.

use std::path::Path;

use serde::Deserialize;

/// Environment variable that overrides [`PersistenceConfig::store_dir`].
pub const STORE_DIR_ENV: &str = "TRADERUN_STORE_DIR";

/// Errors that can occur when loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read the configuration file from disk.
    #[error("failed to read config file: {source}")]
    Io {
        /// The underlying I/O error.
        #[from]
        source: std::io::Error,
    },

    /// Failed to parse YAML content.
    #[error("failed to parse config YAML: {source}")]
    Yaml {
        /// The underlying YAML parse error.
        source: serde_yml::Error,
    },
}

impl From<serde_yml::Error> for ConfigError {
    fn from(source: serde_yml::Error) -> Self {
        Self::Yaml { source }
    }
}

/// Top-level controller configuration.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct TradeRunConfig {
    /// Trade thresholds, cooldowns and seek pacing.
    #[serde(default)]
    pub trading: TradingConfig,

    /// Walking up to a target and triggering the trade.
    #[serde(default)]
    pub approach: ApproachConfig,

    /// Restock and dump detours.
    #[serde(default)]
    pub storage: StorageConfig,

    /// Stall, absolute-fail and global-stuck watchdogs.
    #[serde(default)]
    pub watchdog: WatchdogConfig,

    /// Travel between locations.
    #[serde(default)]
    pub transition: TransitionConfig,

    /// Goal arbitration and the direct-walk fallback.
    #[serde(default)]
    pub navigation: NavigationConfig,

    /// Container transfer protocol.
    #[serde(default)]
    pub container: ContainerConfig,

    /// Location registration and failure windows.
    #[serde(default)]
    pub registry: RegistryConfig,

    /// Snapshot and diagnostics locations.
    #[serde(default)]
    pub persistence: PersistenceConfig,

    /// Log output.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl TradeRunConfig {
    /// Load configuration from a YAML file at the given path.
    ///
    /// `TRADERUN_STORE_DIR` overrides `persistence.store_dir`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Io`] if the file cannot be read, or
    /// [`ConfigError::Yaml`] if the content is not valid YAML.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::parse(&contents)
    }

    /// Parse configuration from a YAML string.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Yaml`] if the string is not valid YAML.
    pub fn parse(yaml: &str) -> Result<Self, ConfigError> {
        // serde_yml reads an empty document as unit, not as an empty map.
        let mut config: Self = if yaml.trim().is_empty() {
            Self::default()
        } else {
            serde_yml::from_str(yaml)?
        };
        config.persistence.apply_env_overrides();
        Ok(config)
    }
}

// =========================================================================
// Sections
// =========================================================================

/// Trade thresholds and seek pacing.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TradingConfig {
    /// Target categories to trade with; empty means any.
    #[serde(default)]
    pub categories: Vec<String>,

    /// Restock when carrying fewer input items than this.
    #[serde(default = "default_input_min")]
    pub input_min: u32,

    /// Dump when carrying this many output items or more.
    #[serde(default = "default_output_min")]
    pub output_min: u32,

    /// Minimum gap between two interact presses.
    #[serde(default = "default_click_rate_ms")]
    pub click_rate_ms: u64,

    /// Cooldown started on a target after a trade.
    #[serde(default = "default_cooldown_ms")]
    pub cooldown_ms: u64,

    /// Keep expired cooldowns while it is night.
    #[serde(default = "default_true")]
    pub night_extension: bool,

    /// Carried input above which a location switch first returns the
    /// surplus to storage.
    #[serde(default = "default_return_input_threshold")]
    pub return_input_threshold: u32,

    /// Minimum time on a location before rotating away.
    #[serde(default = "default_min_dwell_ms")]
    pub min_dwell_ms: u64,

    /// Delay between a detected exchange and closing the trade screen.
    #[serde(default = "default_trade_close_grace_ms")]
    pub trade_close_grace_ms: u64,

    /// Close the trade screen when nothing was exchanged within this time.
    #[serde(default = "default_no_trade_timeout_ms")]
    pub no_trade_timeout_ms: u64,

    /// Location rotations without progress before the run fails.
    #[serde(default = "default_max_rotations")]
    pub max_rotations: u32,

    /// Empty restock cycles on a single location before the run fails.
    #[serde(default = "default_max_empty_cycles")]
    pub max_empty_cycles: u32,

    /// Seek delay after a completed trade.
    #[serde(default = "default_seek_delay_after_trade_ms")]
    pub seek_delay_after_trade_ms: u64,

    /// Seek delay after an approach or navigation failure.
    #[serde(default = "default_seek_delay_after_failure_ms")]
    pub seek_delay_after_failure_ms: u64,

    /// Seek delay when targets exist but are all suppressed by failures.
    #[serde(default = "default_seek_delay_suppressed_ms")]
    pub seek_delay_suppressed_ms: u64,

    /// Seek delay when the chosen target has no approach tile.
    #[serde(default = "default_seek_delay_no_approach_ms")]
    pub seek_delay_no_approach_ms: u64,

    /// Seek delay after a stall recovery.
    #[serde(default = "default_seek_delay_after_recover_ms")]
    pub seek_delay_after_recover_ms: u64,
}

impl Default for TradingConfig {
    fn default() -> Self {
        Self {
            categories: Vec::new(),
            input_min: default_input_min(),
            output_min: default_output_min(),
            click_rate_ms: default_click_rate_ms(),
            cooldown_ms: default_cooldown_ms(),
            night_extension: true,
            return_input_threshold: default_return_input_threshold(),
            min_dwell_ms: default_min_dwell_ms(),
            trade_close_grace_ms: default_trade_close_grace_ms(),
            no_trade_timeout_ms: default_no_trade_timeout_ms(),
            max_rotations: default_max_rotations(),
            max_empty_cycles: default_max_empty_cycles(),
            seek_delay_after_trade_ms: default_seek_delay_after_trade_ms(),
            seek_delay_after_failure_ms: default_seek_delay_after_failure_ms(),
            seek_delay_suppressed_ms: default_seek_delay_suppressed_ms(),
            seek_delay_no_approach_ms: default_seek_delay_no_approach_ms(),
            seek_delay_after_recover_ms: default_seek_delay_after_recover_ms(),
        }
    }
}

/// Approach and interaction timing.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ApproachConfig {
    /// Distance from the approach tile that counts as arrived.
    #[serde(default = "default_goal_range")]
    pub goal_range: f64,

    /// Maximum eye distance to a target while interacting.
    #[serde(default = "default_interact_range")]
    pub interact_range: f64,

    /// Give up interacting after this long without a trade screen.
    #[serde(default = "default_open_timeout_ms")]
    pub open_timeout_ms: u64,

    /// Give up approaching after this long.
    #[serde(default = "default_approach_timeout_ms")]
    pub approach_timeout_ms: u64,

    /// How long one interact press is held.
    #[serde(default = "default_use_press_ms")]
    pub use_press_ms: u64,

    /// Minimum gap between re-aims at the target.
    #[serde(default = "default_aim_delay_ms")]
    pub aim_delay_ms: u64,

    /// Window after which a motionless approach counts as hung.
    #[serde(default = "default_hang_ms")]
    pub hang_ms: u64,

    /// Minimum displacement within the hang window.
    #[serde(default = "default_hang_min_progress")]
    pub hang_min_progress: f64,

    /// Minimum squared-distance improvement within the hang window.
    #[serde(default = "default_hang_min_improve_sq")]
    pub hang_min_improve_sq: f64,

    /// Time on a diagonal tile before nudging forward.
    #[serde(default = "default_diagonal_retry_ms")]
    pub diagonal_retry_ms: u64,

    /// Distance a nudge walks forward.
    #[serde(default = "default_nudge_distance")]
    pub nudge_distance: f64,

    /// Ticks a nudge may take.
    #[serde(default = "default_nudge_max_ticks")]
    pub nudge_max_ticks: u32,

    /// Nudges allowed per target.
    #[serde(default = "default_max_nudges")]
    pub max_nudges: u32,

    /// Interval of the rolling stuck sample.
    #[serde(default = "default_stuck_check_ms")]
    pub stuck_check_ms: u64,

    /// Movement below which a stuck sample counts.
    #[serde(default = "default_stuck_min_move")]
    pub stuck_min_move: f64,

    /// Consecutive stuck samples before escaping.
    #[serde(default = "default_stuck_threshold")]
    pub stuck_threshold: u32,
}

impl Default for ApproachConfig {
    fn default() -> Self {
        Self {
            goal_range: default_goal_range(),
            interact_range: default_interact_range(),
            open_timeout_ms: default_open_timeout_ms(),
            approach_timeout_ms: default_approach_timeout_ms(),
            use_press_ms: default_use_press_ms(),
            aim_delay_ms: default_aim_delay_ms(),
            hang_ms: default_hang_ms(),
            hang_min_progress: default_hang_min_progress(),
            hang_min_improve_sq: default_hang_min_improve_sq(),
            diagonal_retry_ms: default_diagonal_retry_ms(),
            nudge_distance: default_nudge_distance(),
            nudge_max_ticks: default_nudge_max_ticks(),
            max_nudges: default_max_nudges(),
            stuck_check_ms: default_stuck_check_ms(),
            stuck_min_move: default_stuck_min_move(),
            stuck_threshold: default_stuck_threshold(),
        }
    }
}

/// Restock and dump detours.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct StorageConfig {
    /// Eye distance to a container block that allows opening it.
    #[serde(default = "default_container_range")]
    pub container_range: f64,

    /// Dump when this few empty slots remain.
    #[serde(default = "default_dump_trigger_empty_slots")]
    pub dump_trigger_empty_slots: u32,

    /// Empty slots a withdraw leaves free.
    #[serde(default = "default_restock_reserved_slots")]
    pub restock_reserved_slots: u32,

    /// Pause after a container closes before acting on it.
    #[serde(default = "default_post_close_delay_ms")]
    pub post_close_delay_ms: u64,

    /// Give up walking to a storage site after this long.
    #[serde(default = "default_storage_nav_timeout_ms")]
    pub nav_timeout_ms: u64,

    /// Walk via the nearest target when a storage walk stalls this long.
    #[serde(default = "default_retry_via_target_ms")]
    pub retry_via_target_ms: u64,

    /// Stop waiting for an empty input site to be refilled after this long.
    #[serde(default = "default_wait_timeout_ms")]
    pub wait_timeout_ms: u64,

    /// Recheck interval while waiting on a site.
    #[serde(default = "default_wait_check_ms")]
    pub wait_check_ms: u64,

    /// Stop waiting for cooldowns on a single location after this long.
    #[serde(default = "default_cooldown_wait_timeout_ms")]
    pub cooldown_wait_timeout_ms: u64,

    /// Opportunistic restock interval while waiting for cooldowns.
    #[serde(default = "default_cooldown_restock_interval_ms")]
    pub cooldown_restock_interval_ms: u64,

    /// Opportunistic restock needs more empty slots than this.
    #[serde(default = "default_cooldown_restock_min_empty")]
    pub cooldown_restock_min_empty: u32,

    /// Give up a dump detour after this long.
    #[serde(default = "default_dump_timeout_ms")]
    pub dump_timeout_ms: u64,

    /// A restock first dumps when carrying more output than this.
    #[serde(default = "default_restock_while_here_threshold")]
    pub restock_while_here_threshold: u32,

    /// Restock on arrival at a location carrying less input than this.
    #[serde(default = "default_arrival_restock_threshold")]
    pub arrival_restock_threshold: u32,

    /// Level tolerance of storage lookups.
    #[serde(default = "default_level_tolerance")]
    pub level_tolerance: u32,

    /// Minimum gap between "no storage site" notices.
    #[serde(default = "default_no_site_notice_ms")]
    pub no_site_notice_ms: u64,

    /// Back-off after a storage walk timed out.
    #[serde(default = "default_storage_backoff_ms")]
    pub backoff_ms: u64,

    /// Block further dumps for this long after the output site filled up.
    #[serde(default = "default_output_full_retry_ms")]
    pub output_full_retry_ms: u64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            container_range: default_container_range(),
            dump_trigger_empty_slots: default_dump_trigger_empty_slots(),
            restock_reserved_slots: default_restock_reserved_slots(),
            post_close_delay_ms: default_post_close_delay_ms(),
            nav_timeout_ms: default_storage_nav_timeout_ms(),
            retry_via_target_ms: default_retry_via_target_ms(),
            wait_timeout_ms: default_wait_timeout_ms(),
            wait_check_ms: default_wait_check_ms(),
            cooldown_wait_timeout_ms: default_cooldown_wait_timeout_ms(),
            cooldown_restock_interval_ms: default_cooldown_restock_interval_ms(),
            cooldown_restock_min_empty: default_cooldown_restock_min_empty(),
            dump_timeout_ms: default_dump_timeout_ms(),
            restock_while_here_threshold: default_restock_while_here_threshold(),
            arrival_restock_threshold: default_arrival_restock_threshold(),
            level_tolerance: default_level_tolerance(),
            no_site_notice_ms: default_no_site_notice_ms(),
            backoff_ms: default_storage_backoff_ms(),
            output_full_retry_ms: default_output_full_retry_ms(),
        }
    }
}

/// Watchdog thresholds.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct WatchdogConfig {
    /// Time without movement before a stall recovery.
    #[serde(default = "default_recover_ms")]
    pub recover_ms: u64,

    /// Time since the first stall before the run is aborted.
    #[serde(default = "default_absolute_fail_ms")]
    pub absolute_fail_ms: u64,

    /// Horizontal displacement that counts as movement.
    #[serde(default = "default_movement_epsilon")]
    pub movement_epsilon: f64,

    /// Abort when the agent has not left a small area for this long.
    #[serde(default = "default_global_stuck_ms")]
    pub global_stuck_ms: u64,

    /// Size of that area.
    #[serde(default = "default_global_stuck_distance")]
    pub global_stuck_distance: f64,

    /// Escape or rotate this often while globally stuck.
    #[serde(default = "default_global_retry_interval_ms")]
    pub global_retry_interval_ms: u64,

    /// Escape or rotate at most this many times.
    #[serde(default = "default_global_max_retries")]
    pub global_max_retries: u32,

    /// Levels below the active location tolerated before returning.
    #[serde(default = "default_floor_lock_tolerance")]
    pub floor_lock_tolerance: u32,

    /// Returns to the active level before the run is aborted.
    #[serde(default = "default_max_floor_returns")]
    pub max_floor_returns: u32,
}

impl Default for WatchdogConfig {
    fn default() -> Self {
        Self {
            recover_ms: default_recover_ms(),
            absolute_fail_ms: default_absolute_fail_ms(),
            movement_epsilon: default_movement_epsilon(),
            global_stuck_ms: default_global_stuck_ms(),
            global_stuck_distance: default_global_stuck_distance(),
            global_retry_interval_ms: default_global_retry_interval_ms(),
            global_max_retries: default_global_max_retries(),
            floor_lock_tolerance: default_floor_lock_tolerance(),
            max_floor_returns: default_max_floor_returns(),
        }
    }
}

/// Travel between locations.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct TransitionConfig {
    /// Give up a transition after this long.
    #[serde(default = "default_transition_timeout_ms")]
    pub timeout_ms: u64,

    /// Detour via a waypoint after this long without arriving.
    #[serde(default = "default_transition_retry_ms")]
    pub retry_ms: u64,

    /// Detours before giving up.
    #[serde(default = "default_transition_max_retries")]
    pub max_retries: u32,

    /// Horizontal distance to the anchor that counts as being at it.
    #[serde(default = "default_anchor_distance")]
    pub anchor_distance: f64,

    /// Give up after standing at the anchor on the wrong level this long.
    #[serde(default = "default_wrong_level_timeout_ms")]
    pub wrong_level_timeout_ms: u64,
}

impl Default for TransitionConfig {
    fn default() -> Self {
        Self {
            timeout_ms: default_transition_timeout_ms(),
            retry_ms: default_transition_retry_ms(),
            max_retries: default_transition_max_retries(),
            anchor_distance: default_anchor_distance(),
            wrong_level_timeout_ms: default_wrong_level_timeout_ms(),
        }
    }
}

/// Goal arbitration and the direct-walk fallback.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct NavigationConfig {
    /// An identical goal within this window is ignored.
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,

    /// Any goal within this window of the previous one is ignored.
    #[serde(default = "default_min_reissue_ms")]
    pub min_reissue_ms: u64,

    /// Time the navigator gets to move the agent before the direct walk
    /// takes over.
    #[serde(default = "default_navigator_grace_ms")]
    pub navigator_grace_ms: u64,

    /// Displacement that proves the navigator is working.
    #[serde(default = "default_navigator_min_move")]
    pub navigator_min_move: f64,

    /// Give up a direct walk after this long.
    #[serde(default = "default_direct_walk_timeout_ms")]
    pub direct_walk_timeout_ms: u64,

    /// Horizontal distance at which a direct walk has arrived.
    #[serde(default = "default_arrive_distance")]
    pub arrive_distance: f64,

    /// A direct walk without movement for this long is stuck.
    #[serde(default = "default_stuck_window_ms")]
    pub stuck_window_ms: u64,

    /// Displacement that resets the direct-walk stuck window.
    #[serde(default = "default_walk_min_move")]
    pub walk_min_move: f64,

    /// Drop below the start height that aborts a same-floor walk.
    #[serde(default = "default_fall_threshold")]
    pub fall_threshold: f64,

    /// Rise above the start height that aborts a same-floor walk.
    #[serde(default = "default_climb_threshold")]
    pub climb_threshold: f64,

    /// Level band of platform goals.
    #[serde(default = "default_platform_tolerance")]
    pub platform_tolerance: u32,

    /// Closest escape tile.
    #[serde(default = "default_escape_min")]
    pub escape_min: i32,

    /// Furthest escape tile.
    #[serde(default = "default_escape_max")]
    pub escape_max: i32,
}

impl Default for NavigationConfig {
    fn default() -> Self {
        Self {
            debounce_ms: default_debounce_ms(),
            min_reissue_ms: default_min_reissue_ms(),
            navigator_grace_ms: default_navigator_grace_ms(),
            navigator_min_move: default_navigator_min_move(),
            direct_walk_timeout_ms: default_direct_walk_timeout_ms(),
            arrive_distance: default_arrive_distance(),
            stuck_window_ms: default_stuck_window_ms(),
            walk_min_move: default_walk_min_move(),
            fall_threshold: default_fall_threshold(),
            climb_threshold: default_climb_threshold(),
            platform_tolerance: default_platform_tolerance(),
            escape_min: default_escape_min(),
            escape_max: default_escape_max(),
        }
    }
}

/// Container transfer protocol.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ContainerConfig {
    /// Base gap between two transfer clicks.
    #[serde(default = "default_click_interval_ms")]
    pub click_interval_ms: u64,

    /// Random extra gap added to each click, up to this much.
    #[serde(default = "default_click_jitter_ms")]
    pub click_jitter_ms: u64,

    /// A withdraw without progress for this long is done.
    #[serde(default = "default_withdraw_stall_ms")]
    pub withdraw_stall_ms: u64,

    /// A deposit without progress for this long is done (container full).
    #[serde(default = "default_deposit_stall_ms")]
    pub deposit_stall_ms: u64,

    /// Give up opening the container after this long.
    #[serde(default = "default_container_open_timeout_ms")]
    pub open_timeout_ms: u64,

    /// Hard limit of one session.
    #[serde(default = "default_session_timeout_ms")]
    pub session_timeout_ms: u64,

    /// How long a closed screen may stay closed mid-session.
    #[serde(default = "default_closed_grace_ms")]
    pub closed_grace_ms: u64,
}

impl Default for ContainerConfig {
    fn default() -> Self {
        Self {
            click_interval_ms: default_click_interval_ms(),
            click_jitter_ms: default_click_jitter_ms(),
            withdraw_stall_ms: default_withdraw_stall_ms(),
            deposit_stall_ms: default_deposit_stall_ms(),
            open_timeout_ms: default_container_open_timeout_ms(),
            session_timeout_ms: default_session_timeout_ms(),
            closed_grace_ms: default_closed_grace_ms(),
        }
    }
}

/// Location registration and failure windows.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RegistryConfig {
    /// Radius scanned for targets.
    #[serde(default = "default_scan_radius")]
    pub scan_radius: f64,

    /// Link distance of the registration clustering.
    #[serde(default = "default_cluster_distance")]
    pub cluster_distance: f64,

    /// Eligible targets another level needs before relocating to it.
    #[serde(default = "default_relocation_min_candidates")]
    pub relocation_min_candidates: u32,

    /// Ordinary failure suppression.
    #[serde(default = "default_failure_short_ms")]
    pub failure_short_ms: u64,

    /// Escalated and "no approach" failure suppression.
    #[serde(default = "default_failure_long_ms")]
    pub failure_long_ms: u64,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            scan_radius: default_scan_radius(),
            cluster_distance: default_cluster_distance(),
            relocation_min_candidates: default_relocation_min_candidates(),
            failure_short_ms: default_failure_short_ms(),
            failure_long_ms: default_failure_long_ms(),
        }
    }
}

/// Snapshot and diagnostics locations.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PersistenceConfig {
    /// Directory of the JSON snapshots.
    #[serde(default = "default_store_dir")]
    pub store_dir: String,

    /// Directory that receives an error report on every abort.
    #[serde(default)]
    pub diagnostics_dir: Option<String>,
}

impl PersistenceConfig {
    /// Apply environment variable overrides.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(val) = std::env::var(STORE_DIR_ENV) {
            self.store_dir = val;
        }
    }
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            store_dir: default_store_dir(),
            diagnostics_dir: None,
        }
    }
}

/// Output format of the log subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable lines.
    #[default]
    Text,
    /// One JSON object per line.
    Json,
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Subscriber output format.
    #[serde(default)]
    pub format: LogFormat,

    /// Lines kept in the controller's rolling log.
    #[serde(default = "default_rolling_lines")]
    pub rolling_lines: usize,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::Text,
            rolling_lines: default_rolling_lines(),
        }
    }
}

// =========================================================================
// Default value functions
// =========================================================================

const fn default_input_min() -> u32 {
    32
}

const fn default_output_min() -> u32 {
    672
}

const fn default_click_rate_ms() -> u64 {
    170
}

const fn default_cooldown_ms() -> u64 {
    600_000
}

const fn default_return_input_threshold() -> u32 {
    192
}

const fn default_min_dwell_ms() -> u64 {
    5_000
}

const fn default_trade_close_grace_ms() -> u64 {
    200
}

const fn default_no_trade_timeout_ms() -> u64 {
    300
}

const fn default_max_rotations() -> u32 {
    6
}

const fn default_max_empty_cycles() -> u32 {
    6
}

const fn default_seek_delay_after_trade_ms() -> u64 {
    150
}

const fn default_seek_delay_after_failure_ms() -> u64 {
    300
}

const fn default_seek_delay_suppressed_ms() -> u64 {
    400
}

const fn default_seek_delay_no_approach_ms() -> u64 {
    500
}

const fn default_seek_delay_after_recover_ms() -> u64 {
    1_500
}

const fn default_goal_range() -> f64 {
    0.75
}

const fn default_interact_range() -> f64 {
    7.0
}

const fn default_open_timeout_ms() -> u64 {
    7_000
}

const fn default_approach_timeout_ms() -> u64 {
    8_000
}

const fn default_use_press_ms() -> u64 {
    80
}

const fn default_aim_delay_ms() -> u64 {
    80
}

const fn default_hang_ms() -> u64 {
    800
}

const fn default_hang_min_progress() -> f64 {
    0.02
}

const fn default_hang_min_improve_sq() -> f64 {
    0.04
}

const fn default_diagonal_retry_ms() -> u64 {
    400
}

const fn default_nudge_distance() -> f64 {
    0.40
}

const fn default_nudge_max_ticks() -> u32 {
    10
}

const fn default_max_nudges() -> u32 {
    1
}

const fn default_stuck_check_ms() -> u64 {
    1_500
}

const fn default_stuck_min_move() -> f64 {
    0.1
}

const fn default_stuck_threshold() -> u32 {
    2
}

const fn default_container_range() -> f64 {
    5.0
}

const fn default_dump_trigger_empty_slots() -> u32 {
    2
}

const fn default_restock_reserved_slots() -> u32 {
    1
}

const fn default_post_close_delay_ms() -> u64 {
    800
}

const fn default_storage_nav_timeout_ms() -> u64 {
    12_000
}

const fn default_retry_via_target_ms() -> u64 {
    8_000
}

const fn default_wait_timeout_ms() -> u64 {
    600_000
}

const fn default_wait_check_ms() -> u64 {
    20_000
}

const fn default_cooldown_wait_timeout_ms() -> u64 {
    600_000
}

const fn default_cooldown_restock_interval_ms() -> u64 {
    30_000
}

const fn default_cooldown_restock_min_empty() -> u32 {
    3
}

const fn default_dump_timeout_ms() -> u64 {
    15_000
}

const fn default_restock_while_here_threshold() -> u32 {
    64
}

const fn default_arrival_restock_threshold() -> u32 {
    32
}

const fn default_level_tolerance() -> u32 {
    3
}

const fn default_no_site_notice_ms() -> u64 {
    10_000
}

const fn default_storage_backoff_ms() -> u64 {
    3_500
}

const fn default_output_full_retry_ms() -> u64 {
    20_000
}

const fn default_recover_ms() -> u64 {
    2_000
}

const fn default_absolute_fail_ms() -> u64 {
    30_000
}

const fn default_movement_epsilon() -> f64 {
    0.05
}

const fn default_global_stuck_ms() -> u64 {
    120_000
}

const fn default_global_stuck_distance() -> f64 {
    2.0
}

const fn default_global_retry_interval_ms() -> u64 {
    15_000
}

const fn default_global_max_retries() -> u32 {
    5
}

const fn default_floor_lock_tolerance() -> u32 {
    1
}

const fn default_max_floor_returns() -> u32 {
    3
}

const fn default_transition_timeout_ms() -> u64 {
    45_000
}

const fn default_transition_retry_ms() -> u64 {
    10_000
}

const fn default_transition_max_retries() -> u32 {
    5
}

const fn default_anchor_distance() -> f64 {
    2.0
}

const fn default_wrong_level_timeout_ms() -> u64 {
    22_500
}

const fn default_debounce_ms() -> u64 {
    1_500
}

const fn default_min_reissue_ms() -> u64 {
    250
}

const fn default_navigator_grace_ms() -> u64 {
    800
}

const fn default_navigator_min_move() -> f64 {
    0.1
}

const fn default_direct_walk_timeout_ms() -> u64 {
    8_000
}

const fn default_arrive_distance() -> f64 {
    0.5
}

const fn default_stuck_window_ms() -> u64 {
    600
}

const fn default_walk_min_move() -> f64 {
    0.1
}

const fn default_fall_threshold() -> f64 {
    0.5
}

const fn default_climb_threshold() -> f64 {
    0.4
}

const fn default_platform_tolerance() -> u32 {
    4
}

const fn default_escape_min() -> i32 {
    3
}

const fn default_escape_max() -> i32 {
    6
}

const fn default_click_interval_ms() -> u64 {
    220
}

const fn default_click_jitter_ms() -> u64 {
    40
}

const fn default_withdraw_stall_ms() -> u64 {
    1_200
}

const fn default_deposit_stall_ms() -> u64 {
    3_000
}

const fn default_container_open_timeout_ms() -> u64 {
    3_000
}

const fn default_session_timeout_ms() -> u64 {
    10_000
}

const fn default_closed_grace_ms() -> u64 {
    3_000
}

const fn default_scan_radius() -> f64 {
    48.0
}

const fn default_cluster_distance() -> f64 {
    5.0
}

const fn default_relocation_min_candidates() -> u32 {
    2
}

const fn default_failure_short_ms() -> u64 {
    5_000
}

const fn default_failure_long_ms() -> u64 {
    15_000
}

fn default_store_dir() -> String {
    "traderun".to_owned()
}

fn default_log_level() -> String {
    "info".to_owned()
}

const fn default_rolling_lines() -> usize {
    50
}

const fn default_true() -> bool {
    true
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::float_cmp)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = TradeRunConfig::default();
        assert_eq!(config.trading.input_min, 32);
        assert_eq!(config.trading.output_min, 672);
        assert_eq!(config.trading.cooldown_ms, 600_000);
        assert!(config.trading.night_extension);
        assert_eq!(config.approach.goal_range, 0.75);
        assert_eq!(config.watchdog.global_stuck_ms, 120_000);
        assert_eq!(config.container.click_interval_ms, 220);
        assert_eq!(config.logging.rolling_lines, 50);
    }

    #[test]
    fn parse_full_yaml() {
        let yaml = r#"
trading:
  categories: [librarian, cleric]
  input_min: 16
  output_min: 320
  cooldown_ms: 60000
  night_extension: false

approach:
  interact_range: 5.5
  stuck_threshold: 3

storage:
  restock_reserved_slots: 2

watchdog:
  global_stuck_ms: 60000

navigation:
  platform_tolerance: 6
  escape_min: 2
  escape_max: 4

container:
  click_jitter_ms: 0

persistence:
  diagnostics_dir: "diag"

logging:
  level: "debug"
  format: json
  rolling_lines: 20
"#;
        let config = TradeRunConfig::parse(yaml).unwrap();
        assert_eq!(config.trading.categories, vec!["librarian", "cleric"]);
        assert_eq!(config.trading.input_min, 16);
        assert!(!config.trading.night_extension);
        assert_eq!(config.approach.interact_range, 5.5);
        assert_eq!(config.approach.stuck_threshold, 3);
        assert_eq!(config.storage.restock_reserved_slots, 2);
        assert_eq!(config.watchdog.global_stuck_ms, 60_000);
        assert_eq!(config.navigation.platform_tolerance, 6);
        assert_eq!(config.container.click_jitter_ms, 0);
        assert_eq!(config.persistence.diagnostics_dir.as_deref(), Some("diag"));
        assert_eq!(config.logging.format, LogFormat::Json);
        assert_eq!(config.logging.rolling_lines, 20);
        // Untouched fields keep their defaults.
        assert_eq!(config.approach.goal_range, 0.75);
        assert_eq!(config.transition.timeout_ms, 45_000);
    }

    #[test]
    fn parse_minimal_yaml() {
        let yaml = "trading:\n  input_min: 8\n";
        let config = TradeRunConfig::parse(yaml).unwrap();
        assert_eq!(config.trading.input_min, 8);
        assert_eq!(config.trading.output_min, 672);
        assert_eq!(config.storage.wait_check_ms, 20_000);
    }

    #[test]
    fn parse_empty_yaml() {
        assert!(TradeRunConfig::parse("").is_ok());
    }

    #[test]
    fn invalid_yaml_is_rejected() {
        let result = TradeRunConfig::parse("trading: [not, a, map]");
        assert!(matches!(result, Err(ConfigError::Yaml { .. })));
    }
}
