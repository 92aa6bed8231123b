//! Application-level configuration loading, including the AI opponent catalog.

use std::{env, fs, io::ErrorKind, path::PathBuf, time::Duration};

use serde::Deserialize;
use tracing::{info, warn};

use crate::state::session::Difficulty;

/// Default location on disk where the server looks for the JSON configuration.
const DEFAULT_CONFIG_PATH: &str = "config/app.json";
/// Environment variable that overrides [`DEFAULT_CONFIG_PATH`].
const CONFIG_PATH_ENV: &str = "QUIZ_ARENA_CONFIG_PATH";

/// Immutable runtime configuration shared across the application.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Per-question time limit used when a quiz does not set its own.
    pub default_time_limit_seconds: u32,
    /// Capacity of open multiplayer rooms.
    pub max_open_players: usize,
    /// Delay between match completion and session teardown, long enough for
    /// the completion broadcast to be delivered.
    pub completion_grace: Duration,
    /// TTL applied to session snapshots in the store.
    pub snapshot_ttl: Duration,
    opponents: Vec<AiOpponent>,
}

/// Static catalog entry describing a scripted AI opponent.
#[derive(Debug, Clone)]
pub struct AiOpponent {
    /// Catalog id. The AI player's user id is the negation of this.
    pub id: i64,
    /// Display name.
    pub name: String,
    /// Tier the opponent is pitched at.
    pub tier: Difficulty,
    /// Fastest plausible response, in seconds.
    pub response_min_seconds: f64,
    /// Slowest plausible response, in seconds.
    pub response_max_seconds: f64,
    /// Probability (percent) of picking the correct answer.
    pub accuracy_percent: u8,
    /// Avatar asset name.
    pub avatar: String,
}

impl AppConfig {
    /// Load the application configuration from disk, falling back to the
    /// baked-in defaults when the file is absent or malformed.
    pub fn load() -> Self {
        let path = resolve_config_path();
        match fs::read_to_string(&path) {
            Ok(contents) => match serde_json::from_str::<RawConfig>(&contents) {
                Ok(raw) => {
                    let config: Self = raw.into();
                    info!(
                        path = %path.display(),
                        opponents = config.opponents.len(),
                        "loaded configuration"
                    );
                    config
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

    /// The full AI opponent roster.
    pub fn opponents(&self) -> &[AiOpponent] {
        &self.opponents
    }

    /// Look up an opponent by catalog id.
    pub fn opponent(&self, id: i64) -> Option<&AiOpponent> {
        self.opponents.iter().find(|opponent| opponent.id == id)
    }

    /// Opponent used when a solo match does not name one.
    pub fn default_opponent(&self) -> Option<&AiOpponent> {
        self.opponents.first()
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            default_time_limit_seconds: 30,
            max_open_players: 8,
            completion_grace: Duration::from_secs(1),
            snapshot_ttl: Duration::from_secs(60 * 60),
            opponents: default_opponents(),
        }
    }
}

/// JSON representation of the configuration file.
#[derive(Debug, Deserialize)]
struct RawConfig {
    #[serde(default)]
    default_time_limit_seconds: Option<u32>,
    #[serde(default)]
    max_open_players: Option<usize>,
    #[serde(default)]
    opponents: Vec<RawOpponent>,
}

impl From<RawConfig> for AppConfig {
    fn from(value: RawConfig) -> Self {
        let defaults = AppConfig::default();
        let opponents = if value.opponents.is_empty() {
            defaults.opponents
        } else {
            value.opponents.into_iter().map(Into::into).collect()
        };
        Self {
            default_time_limit_seconds: value
                .default_time_limit_seconds
                .unwrap_or(defaults.default_time_limit_seconds),
            max_open_players: value.max_open_players.unwrap_or(defaults.max_open_players),
            completion_grace: defaults.completion_grace,
            snapshot_ttl: defaults.snapshot_ttl,
            opponents,
        }
    }
}

/// JSON representation of a single opponent entry.
#[derive(Debug, Deserialize)]
struct RawOpponent {
    id: i64,
    name: String,
    tier: Difficulty,
    response_min_seconds: f64,
    response_max_seconds: f64,
    accuracy_percent: u8,
    #[serde(default)]
    avatar: Option<String>,
}

impl From<RawOpponent> for AiOpponent {
    fn from(value: RawOpponent) -> Self {
        Self {
            id: value.id,
            name: value.name,
            tier: value.tier,
            response_min_seconds: value.response_min_seconds,
            response_max_seconds: value.response_max_seconds,
            accuracy_percent: value.accuracy_percent.min(100),
            avatar: value.avatar.unwrap_or_else(|| "robot".into()),
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

/// Built-in opponent roster shipped with the binary.
fn default_opponents() -> Vec<AiOpponent> {
    vec![
        AiOpponent {
            id: 1,
            name: "Rusty".into(),
            tier: Difficulty::Easy,
            response_min_seconds: 5.0,
            response_max_seconds: 12.0,
            accuracy_percent: 45,
            avatar: "rusty".into(),
        },
        AiOpponent {
            id: 2,
            name: "Ada".into(),
            tier: Difficulty::Medium,
            response_min_seconds: 3.0,
            response_max_seconds: 9.0,
            accuracy_percent: 65,
            avatar: "ada".into(),
        },
        AiOpponent {
            id: 3,
            name: "Turing".into(),
            tier: Difficulty::Hard,
            response_min_seconds: 2.0,
            response_max_seconds: 6.0,
            accuracy_percent: 85,
            avatar: "turing".into(),
        },
    ]
}
