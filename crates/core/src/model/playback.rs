use std::fmt;
use std::num::NonZeroU32;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const MIN_PLAYBACK_SPEED: f32 = 0.5;
pub const MAX_PLAYBACK_SPEED: f32 = 1.0;
pub const MAX_PAUSE_BETWEEN_REPEATS_MS: u32 = 5_000;

#[derive(Debug, Error, Clone, PartialEq)]
#[non_exhaustive]
pub enum PlaybackSettingsError {
    #[error("playback speed must be between 0.5 and 1.0, got {0}")]
    InvalidSpeed(f32),

    #[error("pause between repeats must be at most 5000ms, got {0}ms")]
    InvalidPause(u32),

    #[error("repeat count must be positive")]
    InvalidRepeatCount,
}

/// How many times each card plays before the scheduler advances.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RepeatCount {
    Finite(NonZeroU32),
    /// Every end of audio advances; the loop only stops on pause or leave.
    Infinite,
}

impl RepeatCount {
    /// # Errors
    ///
    /// Returns `PlaybackSettingsError::InvalidRepeatCount` for zero.
    pub fn finite(count: u32) -> Result<Self, PlaybackSettingsError> {
        NonZeroU32::new(count)
            .map(Self::Finite)
            .ok_or(PlaybackSettingsError::InvalidRepeatCount)
    }

    /// Storage form: `None` stands for infinite.
    #[must_use]
    pub fn as_option(self) -> Option<u32> {
        match self {
            RepeatCount::Finite(n) => Some(n.get()),
            RepeatCount::Infinite => None,
        }
    }

    /// # Errors
    ///
    /// Returns `PlaybackSettingsError::InvalidRepeatCount` for `Some(0)`.
    pub fn from_option(raw: Option<u32>) -> Result<Self, PlaybackSettingsError> {
        raw.map_or(Ok(Self::Infinite), Self::finite)
    }
}

impl fmt::Display for RepeatCount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RepeatCount::Finite(n) => write!(f, "{n}"),
            RepeatCount::Infinite => f.write_str("infinite"),
        }
    }
}

/// Listener preferences for the vocabulary drill.
///
/// These follow the user across lessons, not the lesson itself.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PlaybackSettings {
    playback_speed: f32,
    pause_between_repeats_ms: u32,
    repeat_count: RepeatCount,
    random_mode: bool,
}

impl PlaybackSettings {
    /// # Errors
    ///
    /// Returns `PlaybackSettingsError` if speed or pause are out of range.
    pub fn new(
        playback_speed: f32,
        pause_between_repeats: Duration,
        repeat_count: RepeatCount,
        random_mode: bool,
    ) -> Result<Self, PlaybackSettingsError> {
        if !playback_speed.is_finite()
            || !(MIN_PLAYBACK_SPEED..=MAX_PLAYBACK_SPEED).contains(&playback_speed)
        {
            return Err(PlaybackSettingsError::InvalidSpeed(playback_speed));
        }
        let pause_ms = u32::try_from(pause_between_repeats.as_millis()).unwrap_or(u32::MAX);
        if pause_ms > MAX_PAUSE_BETWEEN_REPEATS_MS {
            return Err(PlaybackSettingsError::InvalidPause(pause_ms));
        }
        Ok(Self {
            playback_speed,
            pause_between_repeats_ms: pause_ms,
            repeat_count,
            random_mode,
        })
    }

    #[must_use]
    pub fn playback_speed(&self) -> f32 {
        self.playback_speed
    }

    #[must_use]
    pub fn pause_between_repeats(&self) -> Duration {
        Duration::from_millis(u64::from(self.pause_between_repeats_ms))
    }

    #[must_use]
    pub fn repeat_count(&self) -> RepeatCount {
        self.repeat_count
    }

    #[must_use]
    pub fn random_mode(&self) -> bool {
        self.random_mode
    }

    /// # Errors
    ///
    /// Returns `PlaybackSettingsError::InvalidSpeed` if out of range.
    pub fn with_speed(self, speed: f32) -> Result<Self, PlaybackSettingsError> {
        Self::new(
            speed,
            self.pause_between_repeats(),
            self.repeat_count,
            self.random_mode,
        )
    }

    /// # Errors
    ///
    /// Returns `PlaybackSettingsError::InvalidPause` if longer than five seconds.
    pub fn with_pause(self, pause: Duration) -> Result<Self, PlaybackSettingsError> {
        Self::new(self.playback_speed, pause, self.repeat_count, self.random_mode)
    }

    #[must_use]
    pub fn with_repeat_count(mut self, repeat_count: RepeatCount) -> Self {
        self.repeat_count = repeat_count;
        self
    }

    #[must_use]
    pub fn with_random_mode(mut self, random_mode: bool) -> Self {
        self.random_mode = random_mode;
        self
    }
}

impl Default for PlaybackSettings {
    fn default() -> Self {
        Self {
            playback_speed: 1.0,
            pause_between_repeats_ms: 1_000,
            repeat_count: RepeatCount::Finite(NonZeroU32::MIN.saturating_add(1)),
            random_mode: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let s = PlaybackSettings::default();
        assert_eq!(s.repeat_count(), RepeatCount::finite(2).unwrap());
        assert_eq!(s.pause_between_repeats(), Duration::from_secs(1));
        assert!(
            PlaybackSettings::new(
                s.playback_speed(),
                s.pause_between_repeats(),
                s.repeat_count(),
                s.random_mode()
            )
            .is_ok()
        );
    }

    #[test]
    fn speed_and_pause_are_bounded() {
        let s = PlaybackSettings::default();
        assert!(matches!(
            s.with_speed(1.5),
            Err(PlaybackSettingsError::InvalidSpeed(_))
        ));
        assert!(matches!(
            s.with_speed(f32::NAN),
            Err(PlaybackSettingsError::InvalidSpeed(_))
        ));
        assert!(s.with_speed(0.5).is_ok());
        assert!(matches!(
            s.with_pause(Duration::from_secs(6)),
            Err(PlaybackSettingsError::InvalidPause(6_000))
        ));
        assert!(s.with_pause(Duration::ZERO).is_ok());
    }

    #[test]
    fn repeat_count_storage_form() {
        assert_eq!(RepeatCount::Infinite.as_option(), None);
        assert_eq!(RepeatCount::from_option(None), Ok(RepeatCount::Infinite));
        assert_eq!(
            RepeatCount::from_option(Some(0)),
            Err(PlaybackSettingsError::InvalidRepeatCount)
        );
        assert_eq!(RepeatCount::finite(3).unwrap().to_string(), "3");
    }
}
