//! Application-level configuration loading: gameplay defaults and runtime limits.

use std::{env, fs, io::ErrorKind, path::PathBuf, time::Duration};

use serde::Deserialize;
use serde_with::{DurationSeconds, serde_as};
use tracing::{info, warn};

use crate::dao::models::RoomConfig;

/// Default location on disk where the server looks for the JSON configuration.
const DEFAULT_CONFIG_PATH: &str = "config/app.json";
/// Environment variable that overrides [`DEFAULT_CONFIG_PATH`].
const CONFIG_PATH_ENV: &str = "LIVE_QUIZ_BACK_CONFIG_PATH";

const DEFAULT_TIME_LIMIT_SECS: u32 = 30;
const DEFAULT_LEADERBOARD_SIZE: usize = 5;
const DEFAULT_PODIUM_SIZE: usize = 3;
const DEFAULT_STREAK_THRESHOLD: u32 = 2;
const DEFAULT_PIN_ATTEMPTS: u32 = 20;
const DEFAULT_BUS_CAPACITY: usize = 64;
const DEFAULT_TRANSITION_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone)]
/// Immutable runtime configuration shared across the application.
pub struct AppConfig {
    default_time_limit_secs: u32,
    leaderboard_size: usize,
    podium_size: usize,
    streak_threshold: u32,
    pin_attempts: u32,
    bus_capacity: usize,
    transition_timeout: Duration,
    default_room_config: RoomConfig,
}

impl AppConfig {
    /// Load the application configuration from disk, falling back to built-in defaults.
    pub fn load() -> Self {
        let path = resolve_config_path();
        match fs::read_to_string(&path) {
            Ok(contents) => match serde_json::from_str::<RawConfig>(&contents) {
                Ok(raw) => {
                    let app_config: Self = raw.into();
                    info!(
                        path = %path.display(),
                        leaderboard_size = app_config.leaderboard_size,
                        default_time_limit_secs = app_config.default_time_limit_secs,
                        "loaded config"
                    );
                    app_config
                }
                Err(err) => {
                    warn!(
                        path = %path.display(),
                        error = %err,
                        "failed to parse config; falling back to defaults"
                    );
                    Self::default()
                }
            },
            Err(err) if err.kind() == ErrorKind::NotFound => {
                info!(
                    path = %path.display(),
                    "config file not found; using built-in defaults"
                );
                Self::default()
            }
            Err(err) => {
                warn!(
                    path = %path.display(),
                    error = %err,
                    "failed to read config; falling back to defaults"
                );
                Self::default()
            }
        }
    }

    /// Seconds given to a question that carries no time limit of its own.
    pub fn default_time_limit_secs(&self) -> u32 {
        self.default_time_limit_secs
    }

    /// Number of rows shown on the intermediate leaderboard.
    pub fn leaderboard_size(&self) -> usize {
        self.leaderboard_size
    }

    /// Number of players on the final podium.
    pub fn podium_size(&self) -> usize {
        self.podium_size
    }

    /// Streak above which a player is flagged as on fire.
    pub fn streak_threshold(&self) -> u32 {
        self.streak_threshold
    }

    /// How many random PINs are tried before room creation gives up.
    pub fn pin_attempts(&self) -> u32 {
        self.pin_attempts
    }

    /// Capacity of each room topic on the change bus.
    pub fn bus_capacity(&self) -> usize {
        self.bus_capacity
    }

    /// Upper bound for the store write backing a transition.
    pub fn transition_timeout(&self) -> Duration {
        self.transition_timeout
    }

    /// Settings applied to rooms created without an explicit config.
    pub fn default_room_config(&self) -> &RoomConfig {
        &self.default_room_config
    }

    #[cfg(test)]
    pub fn with_pin_attempts(mut self, attempts: u32) -> Self {
        self.pin_attempts = attempts;
        self
    }

    #[cfg(test)]
    pub fn with_transition_timeout(mut self, limit: Duration) -> Self {
        self.transition_timeout = limit;
        self
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            default_time_limit_secs: DEFAULT_TIME_LIMIT_SECS,
            leaderboard_size: DEFAULT_LEADERBOARD_SIZE,
            podium_size: DEFAULT_PODIUM_SIZE,
            streak_threshold: DEFAULT_STREAK_THRESHOLD,
            pin_attempts: DEFAULT_PIN_ATTEMPTS,
            bus_capacity: DEFAULT_BUS_CAPACITY,
            transition_timeout: DEFAULT_TRANSITION_TIMEOUT,
            default_room_config: RoomConfig::default(),
        }
    }
}

#[serde_as]
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
/// JSON representation of the configuration file located at [`DEFAULT_CONFIG_PATH`].
struct RawConfig {
    default_time_limit_secs: Option<u32>,
    leaderboard_size: Option<usize>,
    podium_size: Option<usize>,
    streak_threshold: Option<u32>,
    pin_attempts: Option<u32>,
    bus_capacity: Option<usize>,
    #[serde_as(as = "Option<DurationSeconds<u64>>")]
    transition_timeout_secs: Option<Duration>,
    default_room_config: Option<RoomConfig>,
}

impl From<RawConfig> for AppConfig {
    fn from(value: RawConfig) -> Self {
        let defaults = Self::default();
        Self {
            default_time_limit_secs: value
                .default_time_limit_secs
                .filter(|secs| *secs > 0)
                .unwrap_or(defaults.default_time_limit_secs),
            leaderboard_size: value.leaderboard_size.unwrap_or(defaults.leaderboard_size),
            podium_size: value.podium_size.unwrap_or(defaults.podium_size),
            streak_threshold: value.streak_threshold.unwrap_or(defaults.streak_threshold),
            pin_attempts: value
                .pin_attempts
                .filter(|attempts| *attempts > 0)
                .unwrap_or(defaults.pin_attempts),
            bus_capacity: value
                .bus_capacity
                .filter(|capacity| *capacity > 0)
                .unwrap_or(defaults.bus_capacity),
            transition_timeout: value
                .transition_timeout_secs
                .filter(|timeout| !timeout.is_zero())
                .unwrap_or(defaults.transition_timeout),
            default_room_config: value
                .default_room_config
                .unwrap_or(defaults.default_room_config),
        }
    }
}

/// Resolve the configuration path taking the environment override into account.
fn resolve_config_path() -> PathBuf {
    env::var_os(CONFIG_PATH_ENV)
        .map(PathBuf::from)
        .filter(|path| !path.as_os_str().is_empty())
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH))
}
