//! Application-level configuration loading: countdowns, view cadence, limits and the
//! question generator upstream.

use std::{env, fs, io::ErrorKind, path::PathBuf, time::Duration};

use serde::Deserialize;
use serde_with::{DurationMilliSeconds, DurationSeconds, serde_as};
use tracing::{info, warn};

/// Default location on disk where the server looks for the JSON configuration.
const DEFAULT_CONFIG_PATH: &str = "config/app.json";
/// Environment variable that overrides [`DEFAULT_CONFIG_PATH`].
const CONFIG_PATH_ENV: &str = "GOLEK_QUIZ_BACK_CONFIG_PATH";
/// Environment variable carrying the generation API key; never read from the file.
const GENERATION_API_KEY_ENV: &str = "GENERATION_API_KEY";

/// Immutable runtime configuration shared across the application.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Pre-game countdown for hosted sessions.
    pub hosted_countdown: Duration,
    /// Pre-game countdown for solo and practice sessions.
    pub solo_countdown: Duration,
    /// Cadence at which session views recompute and push the clock.
    pub view_tick: Duration,
    /// Polling fallback cadence for session views.
    pub view_poll: Duration,
    /// How many random PINs to try before giving up.
    pub pin_generation_attempts: u32,
    /// Latency recorded when a client does not report one.
    pub nominal_response_ms: u64,
    /// Grace period after the deadline during which in-flight answers are still accepted.
    pub clock_tolerance: Duration,
    /// Upper bound for a session budget.
    pub max_total_time_minutes: u32,
    /// Question generator upstream.
    pub generation: GenerationConfig,
}

/// Settings for the OpenAI-compatible completion endpoint used to draft questions.
#[derive(Debug, Clone)]
pub struct GenerationConfig {
    /// Base URL, e.g. `https://api.openai.com/v1`.
    pub api_base_url: String,
    /// Model name sent with each request.
    pub model: String,
    /// Hard cap on questions per request.
    pub max_questions: u32,
    /// Upstream request timeout.
    pub timeout: Duration,
    /// Bearer token, taken from the environment.
    pub api_key: Option<String>,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            api_base_url: "https://api.openai.com/v1".into(),
            model: "gpt-4o-mini".into(),
            max_questions: 20,
            timeout: Duration::from_secs(60),
            api_key: None,
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            hosted_countdown: Duration::from_secs(10),
            solo_countdown: Duration::from_secs(5),
            view_tick: Duration::from_millis(1_000),
            view_poll: Duration::from_millis(2_500),
            pin_generation_attempts: 16,
            nominal_response_ms: 1_000,
            clock_tolerance: Duration::from_millis(2_000),
            max_total_time_minutes: 180,
            generation: GenerationConfig::default(),
        }
    }
}

impl AppConfig {
    /// Load the application configuration from disk, falling back to built-in defaults.
    pub fn load() -> Self {
        let path = resolve_config_path();
        let mut config = match fs::read_to_string(&path) {
            Ok(contents) => match serde_json::from_str::<RawConfig>(&contents) {
                Ok(raw) => {
                    info!(path = %path.display(), "loaded configuration file");
                    raw.into()
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
        };

        config.generation.api_key = env::var(GENERATION_API_KEY_ENV)
            .ok()
            .filter(|key| !key.trim().is_empty());
        config
    }
}

/// JSON representation of the configuration file located at [`DEFAULT_CONFIG_PATH`].
#[serde_as]
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawConfig {
    #[serde_as(as = "Option<DurationSeconds<u64>>")]
    hosted_countdown_seconds: Option<Duration>,
    #[serde_as(as = "Option<DurationSeconds<u64>>")]
    solo_countdown_seconds: Option<Duration>,
    #[serde_as(as = "Option<DurationMilliSeconds<u64>>")]
    view_tick_ms: Option<Duration>,
    #[serde_as(as = "Option<DurationMilliSeconds<u64>>")]
    view_poll_ms: Option<Duration>,
    pin_generation_attempts: Option<u32>,
    nominal_response_ms: Option<u64>,
    #[serde_as(as = "Option<DurationMilliSeconds<u64>>")]
    clock_tolerance_ms: Option<Duration>,
    max_total_time_minutes: Option<u32>,
    generation: Option<RawGenerationConfig>,
}

#[serde_as]
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawGenerationConfig {
    api_base_url: Option<String>,
    model: Option<String>,
    max_questions: Option<u32>,
    #[serde_as(as = "Option<DurationSeconds<u64>>")]
    timeout_secs: Option<Duration>,
}

impl From<RawConfig> for AppConfig {
    fn from(raw: RawConfig) -> Self {
        let defaults = AppConfig::default();
        let generation = raw.generation.unwrap_or_default();
        let generation_defaults = defaults.generation.clone();

        Self {
            hosted_countdown: raw.hosted_countdown_seconds.unwrap_or(defaults.hosted_countdown),
            solo_countdown: raw.solo_countdown_seconds.unwrap_or(defaults.solo_countdown),
            view_tick: raw
                .view_tick_ms
                .filter(|tick| !tick.is_zero())
                .unwrap_or(defaults.view_tick),
            view_poll: raw
                .view_poll_ms
                .filter(|poll| !poll.is_zero())
                .unwrap_or(defaults.view_poll),
            pin_generation_attempts: raw
                .pin_generation_attempts
                .filter(|attempts| *attempts > 0)
                .unwrap_or(defaults.pin_generation_attempts),
            nominal_response_ms: raw
                .nominal_response_ms
                .unwrap_or(defaults.nominal_response_ms),
            clock_tolerance: raw.clock_tolerance_ms.unwrap_or(defaults.clock_tolerance),
            max_total_time_minutes: raw
                .max_total_time_minutes
                .filter(|minutes| *minutes > 0)
                .unwrap_or(defaults.max_total_time_minutes),
            generation: GenerationConfig {
                api_base_url: generation
                    .api_base_url
                    .unwrap_or(generation_defaults.api_base_url),
                model: generation.model.unwrap_or(generation_defaults.model),
                max_questions: generation
                    .max_questions
                    .unwrap_or(generation_defaults.max_questions),
                timeout: generation.timeout_secs.unwrap_or(generation_defaults.timeout),
                api_key: None,
            },
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_file_keeps_other_defaults() {
        let raw: RawConfig = serde_json::from_str(
            r#"{ "hosted_countdown_seconds": 7, "view_poll_ms": 3000, "generation": { "model": "local" } }"#,
        )
        .unwrap();
        let config: AppConfig = raw.into();

        assert_eq!(config.hosted_countdown, Duration::from_secs(7));
        assert_eq!(config.solo_countdown, Duration::from_secs(5));
        assert_eq!(config.view_poll, Duration::from_millis(3_000));
        assert_eq!(config.view_tick, Duration::from_millis(1_000));
        assert_eq!(config.generation.model, "local");
        assert_eq!(config.generation.max_questions, 20);
    }

    #[test]
    fn zero_cadence_is_ignored() {
        let raw: RawConfig = serde_json::from_str(r#"{ "view_tick_ms": 0 }"#).unwrap();
        let config: AppConfig = raw.into();
        assert_eq!(config.view_tick, Duration::from_millis(1_000));
    }
}
