//! Application-level configuration loading: scoring, sync cadence, readiness gate and timers.

use std::{env, fs, io::ErrorKind, path::PathBuf, time::Duration};

use serde::Deserialize;
use serde_with::{DurationMilliSeconds, serde_as};
use tracing::{info, warn};

/// Default location on disk where the server looks for the JSON configuration.
const DEFAULT_CONFIG_PATH: &str = "config/app.json";
/// Environment variable that overrides [`DEFAULT_CONFIG_PATH`].
const CONFIG_PATH_ENV: &str = "QUIZ_LIVE_BACK_CONFIG_PATH";

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
/// Immutable runtime configuration shared across the application.
pub struct AppConfig {
    /// Points per correct answer.
    pub scoring: ScoringConfig,
    /// Client poll cadence.
    pub sync: SyncConfig,
    /// Wait for results after the session ends.
    pub results_gate: ResultsGateConfig,
    /// Local countdown behaviour.
    pub timer: TimerConfig,
    /// Server-side session handling.
    pub sessions: SessionsConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
/// Scoring rules.
pub struct ScoringConfig {
    /// Points added to a participant's score for each correct first answer.
    pub correct_answer_points: i64,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            correct_answer_points: 100,
        }
    }
}

/// Poll cadence of the client sync loop, tiered by volatility.
#[serde_as]
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Participants and scores.
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    pub presence_poll: Duration,
    /// Session row and the controller's answer tally.
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    pub session_poll: Duration,
    /// Local countdown refresh.
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    pub timer_tick: Duration,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            presence_poll: Duration::from_millis(200),
            session_poll: Duration::from_millis(1_000),
            timer_tick: Duration::from_millis(1_000),
        }
    }
}

/// Bounds of the wait for final results after a session ends.
#[serde_as]
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ResultsGateConfig {
    /// Delay between two reads.
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    pub interval: Duration,
    /// Reads before giving up.
    pub max_attempts: u32,
    /// Overall bound, whichever comes first.
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    pub timeout: Duration,
}

impl Default for ResultsGateConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(1_500),
            max_attempts: 10,
            timeout: Duration::from_secs(15),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
/// Local countdown behaviour.
pub struct TimerConfig {
    /// Reveal the correct option once the local countdown reaches zero.
    pub reveal_on_timeout: bool,
}

impl Default for TimerConfig {
    fn default() -> Self {
        Self {
            reveal_on_timeout: true,
        }
    }
}

#[serde_as]
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
/// Server-side session handling.
pub struct SessionsConfig {
    /// Attempts at drawing an unused join code before giving up.
    pub join_code_attempts: u32,
    /// Upper bound on one controller transition.
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    pub transition_timeout: Duration,
}

impl Default for SessionsConfig {
    fn default() -> Self {
        Self {
            join_code_attempts: 5,
            transition_timeout: Duration::from_secs(5),
        }
    }
}

impl AppConfig {
    /// Load the application configuration from disk, falling back to built-in defaults.
    pub fn load() -> Self {
        let path = resolve_config_path();
        match fs::read_to_string(&path) {
            Ok(contents) => match Self::from_json(&contents) {
                Ok(app_config) => {
                    info!(path = %path.display(), "loaded configuration file");
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

    /// Parse a JSON document; absent sections and fields keep their defaults.
    pub fn from_json(contents: &str) -> serde_json::Result<Self> {
        serde_json::from_str(contents)
    }
}

/// Resolve the configuration path taking the environment override into account.
fn resolve_config_path() -> PathBuf {
    env::var_os(CONFIG_PATH_ENV)
        .map(PathBuf::from)
        .filter(|path| !path.as_os_str().is_empty())
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_yields_defaults() {
        let config = AppConfig::from_json("{}").unwrap();
        assert_eq!(config, AppConfig::default());
        assert_eq!(config.scoring.correct_answer_points, 100);
        assert_eq!(config.sync.presence_poll, Duration::from_millis(200));
        assert_eq!(config.results_gate.interval, Duration::from_millis(1_500));
    }

    #[test]
    fn partial_sections_override_only_given_fields() {
        let config = AppConfig::from_json(
            r#"{
                "sync": { "session_poll": 2500 },
                "results_gate": { "max_attempts": 3 },
                "timer": { "reveal_on_timeout": false }
            }"#,
        )
        .unwrap();

        assert_eq!(config.sync.session_poll, Duration::from_millis(2_500));
        assert_eq!(config.sync.presence_poll, Duration::from_millis(200));
        assert_eq!(config.results_gate.max_attempts, 3);
        assert_eq!(config.results_gate.timeout, Duration::from_secs(15));
        assert!(!config.timer.reveal_on_timeout);
    }

    #[test]
    fn malformed_durations_are_rejected() {
        assert!(AppConfig::from_json(r#"{ "sync": { "presence_poll": "fast" } }"#).is_err());
    }
}
