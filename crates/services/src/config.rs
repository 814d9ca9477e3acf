use std::time::Duration;

use url::Url;

use crate::error::ConfigError;

pub const DEFAULT_DB_URL: &str = "sqlite://lesson.sqlite3?mode=rwc";
pub const DEFAULT_PREFERENCE_OWNER: &str = "default";
pub const DEFAULT_TICK_MS: u64 = 1_000;
pub const DEFAULT_AUTO_ADVANCE_MS: u64 = 300;

/// Runtime configuration of the lesson engine.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EngineConfig {
    pub database_url: String,
    /// Key for playback preferences (user or device).
    pub preference_owner: String,
    pub tick_interval: Duration,
    pub auto_advance_delay: Duration,
    /// Enables the HTTP audio resolver when set.
    pub audio_base_url: Option<Url>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            database_url: DEFAULT_DB_URL.to_owned(),
            preference_owner: DEFAULT_PREFERENCE_OWNER.to_owned(),
            tick_interval: Duration::from_millis(DEFAULT_TICK_MS),
            auto_advance_delay: Duration::from_millis(DEFAULT_AUTO_ADVANCE_MS),
            audio_base_url: None,
        }
    }
}

impl EngineConfig {
    /// Loads configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` if a variable is set but unparsable.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Same as [`EngineConfig::from_env`] with an injectable variable source.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` if a variable is set but unparsable.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let var = |name: &str| lookup(name).filter(|value| !value.trim().is_empty());

        let database_url = var("LESSON_DB_URL").unwrap_or(defaults.database_url);
        let preference_owner = var("LESSON_PREFERENCE_OWNER").unwrap_or(defaults.preference_owner);
        let tick_interval = match var("LESSON_TICK_MS") {
            Some(raw) => millis("LESSON_TICK_MS", &raw)?,
            None => defaults.tick_interval,
        };
        let auto_advance_delay = match var("LESSON_AUTO_ADVANCE_MS") {
            Some(raw) => millis("LESSON_AUTO_ADVANCE_MS", &raw)?,
            None => defaults.auto_advance_delay,
        };
        let audio_base_url = var("LESSON_AUDIO_BASE_URL")
            .map(|raw| {
                Url::parse(raw.trim()).map_err(|e| ConfigError::InvalidValue {
                    name: "LESSON_AUDIO_BASE_URL",
                    reason: e.to_string(),
                })
            })
            .transpose()?;

        if tick_interval.is_zero() {
            return Err(ConfigError::InvalidValue {
                name: "LESSON_TICK_MS",
                reason: "must be positive".into(),
            });
        }

        Ok(Self {
            database_url,
            preference_owner,
            tick_interval,
            auto_advance_delay,
            audio_base_url,
        })
    }
}

fn millis(name: &'static str, raw: &str) -> Result<Duration, ConfigError> {
    raw.trim()
        .parse::<u64>()
        .map(Duration::from_millis)
        .map_err(|e| ConfigError::InvalidValue {
            name,
            reason: format!("'{raw}': {e}"),
        })
}
