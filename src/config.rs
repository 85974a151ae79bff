//! Fleet and session configuration

use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::types::Permission;

/// Process-wide configuration shared by every session
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct GlobalConfig {
    /// Minimum spacing between login attempts across the fleet, 0 disables
    #[serde(default = "default_login_limiter_delay_secs")]
    pub login_limiter_delay_secs: u64,
    /// Minimum spacing between gift-like free actions across the fleet, 0 disables
    #[serde(default = "default_gifts_limiter_delay_secs")]
    pub gifts_limiter_delay_secs: u64,
    /// Connection timeout; failure-timer and heartbeat thresholds derive from it
    #[serde(default = "default_connection_timeout_secs")]
    pub connection_timeout_secs: u64,
    /// Cooldown after the remote service rate-limits a login
    #[serde(default = "default_login_cooldown_mins")]
    pub login_cooldown_mins: u64,
    /// Cooldown before reconnecting after a transient network failure
    #[serde(default = "default_reconnect_delay_secs")]
    pub reconnect_delay_secs: u64,
    /// Delay added when the account was occupied during our disconnect,
    /// to not kick the other client session too soon
    #[serde(default = "default_blocked_ttl_secs")]
    pub blocked_ttl_secs: u64,
    #[serde(default)]
    pub optimization_mode: OptimizationMode,
    /// Fleet owner network id; receives diagnostics nobody else gets
    #[serde(default)]
    pub owner_id: u64,
}

impl Default for GlobalConfig {
    fn default() -> Self {
        Self {
            login_limiter_delay_secs: default_login_limiter_delay_secs(),
            gifts_limiter_delay_secs: default_gifts_limiter_delay_secs(),
            connection_timeout_secs: default_connection_timeout_secs(),
            login_cooldown_mins: default_login_cooldown_mins(),
            reconnect_delay_secs: default_reconnect_delay_secs(),
            blocked_ttl_secs: default_blocked_ttl_secs(),
            optimization_mode: OptimizationMode::default(),
            owner_id: 0,
        }
    }
}

impl GlobalConfig {
    /// Load from an optional TOML file with `FLEET_*` environment overrides
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let mut builder = config::Config::builder();

        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path).required(false));
        }

        let settings = builder
            .add_source(config::Environment::with_prefix("FLEET").try_parsing(true))
            .build()?;

        Ok(settings.try_deserialize()?)
    }

    /// Delay before the connection-failure timer declares the attempt dead
    pub fn connection_failure_delay(&self) -> Duration {
        // A fraction of the configured timeout, minimum one minute
        let minutes = (self.connection_timeout_secs as f64 / 30.0).ceil() as u64;
        Duration::from_secs(minutes.max(1) * 60)
    }

    /// Consecutive heartbeat failures tolerated before a forced reconnect
    pub fn max_heartbeat_failures(&self) -> u8 {
        ((self.connection_timeout_secs as f64 / 10.0).ceil() as u8).max(1)
    }

    /// Transport silence tolerated before the heartbeat actively probes
    pub fn heartbeat_ttl(&self) -> Duration {
        Duration::from_secs(self.connection_timeout_secs)
    }

    pub fn login_limiter_delay(&self) -> Duration {
        Duration::from_secs(self.login_limiter_delay_secs)
    }

    pub fn gifts_limiter_delay(&self) -> Duration {
        Duration::from_secs(self.gifts_limiter_delay_secs)
    }

    pub fn login_cooldown(&self) -> Duration {
        Duration::from_secs(self.login_cooldown_mins * 60)
    }

    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_secs(self.reconnect_delay_secs)
    }

    pub fn blocked_ttl(&self) -> Duration {
        Duration::from_secs(self.blocked_ttl_secs)
    }
}

/// Dispatch/reconciliation execution strategy
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Default)]
#[serde(rename_all = "snake_case")]
pub enum OptimizationMode {
    /// Run per-session work fully concurrently
    #[default]
    MaxPerformance,
    /// Run per-session work one at a time to cap peak memory
    MinMemoryUsage,
}

/// When to accept incoming trade proposals without operator involvement
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Default)]
#[serde(rename_all = "snake_case")]
pub enum TradeAcceptMode {
    /// Never accept automatically
    #[default]
    None,
    /// Accept anything proposed by a master
    Master,
    /// Accept from masters, plus any proposal that is diversity-neutral or better
    Fair,
}

impl TradeAcceptMode {
    pub fn accepts_from_master(self) -> bool {
        !matches!(self, TradeAcceptMode::None)
    }

    pub fn requires_fairness(self) -> bool {
        matches!(self, TradeAcceptMode::Fair)
    }
}

/// Per-account configuration for one session
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SessionConfig {
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Account login; interactive input is requested when absent
    #[serde(default)]
    pub login: Option<String>,
    /// Account password; interactive input is requested when absent
    #[serde(default)]
    pub password: Option<String>,
    /// Caller network id -> permission rank, account-scoped
    #[serde(default)]
    pub permissions: HashMap<u64, Permission>,
    /// Group chat rejoined after every successful login, 0 = none
    #[serde(default)]
    pub group_chat_id: u64,
    #[serde(default)]
    pub trade_accept: TradeAcceptMode,
    /// Hours between automatic loot runs to the first master, 0 disables
    #[serde(default)]
    pub send_trade_period_hours: u64,
    /// Loot to the first master whenever a farming round finishes
    #[serde(default)]
    pub send_on_farming_finished: bool,
    #[serde(default)]
    pub paused: bool,
    /// Stop the session once farming reports there is nothing left to do
    #[serde(default)]
    pub shutdown_on_farming_finished: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            login: None,
            password: None,
            permissions: HashMap::new(),
            group_chat_id: 0,
            trade_accept: TradeAcceptMode::default(),
            send_trade_period_hours: 0,
            send_on_farming_finished: false,
            paused: false,
            shutdown_on_farming_finished: false,
        }
    }
}

impl SessionConfig {
    /// Lowest-id master configured for this account, the loot recipient
    pub fn first_master_id(&self) -> Option<u64> {
        self.permissions
            .iter()
            .filter(|(id, permission)| **id != 0 && **permission == Permission::Master)
            .map(|(id, _)| *id)
            .min()
    }

    pub fn permission_for(&self, caller_id: u64) -> Permission {
        self.permissions
            .get(&caller_id)
            .copied()
            .unwrap_or(Permission::None)
    }

    pub fn send_trade_period(&self) -> Option<Duration> {
        (self.send_trade_period_hours > 0)
            .then(|| Duration::from_secs(self.send_trade_period_hours * 3600))
    }
}

fn default_login_limiter_delay_secs() -> u64 {
    10
}

fn default_gifts_limiter_delay_secs() -> u64 {
    60
}

fn default_connection_timeout_secs() -> u64 {
    60
}

fn default_login_cooldown_mins() -> u64 {
    // Remote captcha throttling clears after around 20 minutes
    25
}

fn default_reconnect_delay_secs() -> u64 {
    5
}

fn default_blocked_ttl_secs() -> u64 {
    60
}

fn default_enabled() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_global_defaults() {
        let config = GlobalConfig::default();
        assert_eq!(config.login_limiter_delay_secs, 10);
        assert_eq!(config.connection_timeout_secs, 60);
        assert_eq!(config.optimization_mode, OptimizationMode::MaxPerformance);
        assert_eq!(config.connection_failure_delay(), Duration::from_secs(120));
        assert_eq!(config.max_heartbeat_failures(), 6);
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::with_suffix(".toml").unwrap();
        writeln!(
            file,
            "connection_timeout_secs = 90\noptimization_mode = \"min_memory_usage\"\nowner_id = 7"
        )
        .unwrap();

        let config = GlobalConfig::load(Some(file.path())).unwrap();
        assert_eq!(config.connection_timeout_secs, 90);
        assert_eq!(config.optimization_mode, OptimizationMode::MinMemoryUsage);
        assert_eq!(config.owner_id, 7);
        // Untouched fields keep their defaults
        assert_eq!(config.login_cooldown_mins, 25);
    }

    #[test]
    fn test_first_master_is_lowest_id() {
        let mut config = SessionConfig::default();
        config.permissions.insert(9, Permission::Master);
        config.permissions.insert(4, Permission::Master);
        config.permissions.insert(2, Permission::Operator);
        assert_eq!(config.first_master_id(), Some(4));
    }

    #[test]
    fn test_missing_file_falls_back_to_defaults() {
        let config = GlobalConfig::load(Some(Path::new("/nonexistent/fleet.toml"))).unwrap();
        assert_eq!(config.connection_timeout_secs, 60);
    }
}
