use std::time::Duration;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::model::{PlaybackSettings, RepeatCount};

/// Delay between advancing to a new card and auto-playing it.
pub const DEFAULT_AUTO_ADVANCE_DELAY: Duration = Duration::from_millis(300);

//
// ─── TIMERS ────────────────────────────────────────────────────────────────────
//

/// Handle of a scheduled continuation.
///
/// Only the most recently issued token is live; a fired token that no longer
/// matches is dropped, which is what makes cancellation win over callbacks that
/// were already queued.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimerToken(u64);

impl TimerToken {
    #[must_use]
    pub fn value(self) -> u64 {
        self.0
    }
}

/// What a scheduled timer does when it fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Continuation {
    /// Replay the current card (next repeat of the cycle).
    Repeat,
    /// Move to `to` and play it.
    Advance { to: usize },
    /// Play the card that is already current.
    PlayCurrent,
}

//
// ─── INPUTS / EFFECTS ──────────────────────────────────────────────────────────
//

/// Everything that can happen to the player.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PlaybackInput {
    TogglePlayPause,
    Next,
    Previous,
    Select(usize),
    /// The media element started playing without being asked (e.g. media keys).
    MediaPlaying,
    /// The media element paused without being asked. Not sent on natural end.
    MediaPaused,
    MediaEnded { card_index: usize },
    MediaError { card_index: usize },
    TimerFired(TimerToken),
    Settings(PlaybackSettings),
    /// The vocabulary task is no longer active.
    Leave,
}

/// Instructions for the host that owns the media element and the timers.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PlaybackEffect {
    Play { card_index: usize, speed: f32 },
    Stop,
    SetSpeed(f32),
    Schedule {
        token: TimerToken,
        delay: Duration,
        continuation: Continuation,
    },
    Cancel(TimerToken),
}

//
// ─── STATE ─────────────────────────────────────────────────────────────────────
//

/// Transient player state. Discarded when the task is left.
#[derive(Debug, Clone, PartialEq)]
pub struct PlaybackState {
    pub current_card_index: usize,
    /// The repeat loop is running, including the pauses between repeats.
    pub is_playing: bool,
    pub repeat_index: u32,
    pub settings: PlaybackSettings,
    /// Set by a deliberate stop; scheduled continuations never override it.
    pub user_paused: bool,
}

//
// ─── SCHEDULER ─────────────────────────────────────────────────────────────────
//

/// Drives a list of audio cards through play / repeat / advance cycles.
///
/// The scheduler never sleeps or touches audio itself. Each input returns the
/// effects the host must carry out, and timers come back as
/// [`PlaybackInput::TimerFired`].
///
/// # Examples
///
/// ```
/// # use lesson_core::scheduler::{PlaybackEffect, PlaybackInput, PlaybackScheduler};
/// # use lesson_core::model::PlaybackSettings;
/// let mut player = PlaybackScheduler::new(3, PlaybackSettings::default());
/// let effects = player.handle(PlaybackInput::TogglePlayPause);
/// assert!(matches!(effects[..], [PlaybackEffect::Play { card_index: 0, .. }]));
///
/// // The first end of audio schedules a repeat after the configured pause.
/// let effects = player.handle(PlaybackInput::MediaEnded { card_index: 0 });
/// let Some(PlaybackEffect::Schedule { token, .. }) = effects.last().copied() else {
///     panic!("expected a scheduled repeat");
/// };
///
/// // A pause before the timer fires wins.
/// player.handle(PlaybackInput::TogglePlayPause);
/// assert!(player.handle(PlaybackInput::TimerFired(token)).is_empty());
/// ```
#[derive(Debug, Clone)]
pub struct PlaybackScheduler {
    state: PlaybackState,
    card_count: usize,
    audio_available: Vec<bool>,
    pending: Option<(TimerToken, Continuation)>,
    next_token: u64,
    advance_delay: Duration,
    rng: StdRng,
}

impl PlaybackScheduler {
    #[must_use]
    pub fn new(card_count: usize, settings: PlaybackSettings) -> Self {
        Self::with_rng(card_count, settings, StdRng::from_os_rng())
    }

    /// Deterministic card order for random mode.
    #[must_use]
    pub fn with_seed(card_count: usize, settings: PlaybackSettings, seed: u64) -> Self {
        Self::with_rng(card_count, settings, StdRng::seed_from_u64(seed))
    }

    fn with_rng(card_count: usize, settings: PlaybackSettings, rng: StdRng) -> Self {
        Self {
            state: PlaybackState {
                current_card_index: 0,
                is_playing: false,
                repeat_index: 0,
                settings,
                user_paused: false,
            },
            card_count,
            audio_available: vec![true; card_count],
            pending: None,
            next_token: 0,
            advance_delay: DEFAULT_AUTO_ADVANCE_DELAY,
            rng,
        }
    }

    #[must_use]
    pub fn with_advance_delay(mut self, delay: Duration) -> Self {
        self.advance_delay = delay;
        self
    }

    #[must_use]
    pub fn state(&self) -> &PlaybackState {
        &self.state
    }

    #[must_use]
    pub fn card_count(&self) -> usize {
        self.card_count
    }

    /// The live timer, if a continuation is waiting.
    #[must_use]
    pub fn pending(&self) -> Option<(TimerToken, Continuation)> {
        self.pending
    }

    /// Record whether the resolver found audio for a card.
    ///
    /// Cards without audio behave as if their audio ended instantly.
    pub fn set_audio_available(&mut self, card_index: usize, available: bool) {
        if let Some(slot) = self.audio_available.get_mut(card_index) {
            *slot = available;
        }
    }

    #[must_use]
    pub fn has_audio(&self, card_index: usize) -> bool {
        self.audio_available.get(card_index).copied().unwrap_or(false)
    }

    /// Apply one input and return the effects the host must perform, in order.
    pub fn handle(&mut self, input: PlaybackInput) -> Vec<PlaybackEffect> {
        let mut effects = Vec::new();
        if self.card_count == 0 {
            return effects;
        }

        match input {
            PlaybackInput::TogglePlayPause => {
                if self.state.is_playing {
                    self.stop(&mut effects);
                } else {
                    self.cancel_pending(&mut effects);
                    self.state.is_playing = true;
                    self.state.user_paused = false;
                    self.state.repeat_index = 0;
                    self.start_current(&mut effects);
                }
            }
            PlaybackInput::Next => {
                let target = (self.state.current_card_index + 1).min(self.card_count - 1);
                self.navigate(target, &mut effects);
            }
            PlaybackInput::Previous => {
                let target = self.state.current_card_index.saturating_sub(1);
                self.navigate(target, &mut effects);
            }
            PlaybackInput::Select(target) => {
                if target < self.card_count {
                    self.navigate(target, &mut effects);
                }
            }
            PlaybackInput::MediaPlaying => {
                if !self.state.is_playing {
                    self.cancel_pending(&mut effects);
                    self.state.is_playing = true;
                    self.state.user_paused = false;
                }
            }
            PlaybackInput::MediaPaused => {
                if self.state.is_playing {
                    self.cancel_pending(&mut effects);
                    self.state.is_playing = false;
                    self.state.user_paused = true;
                }
            }
            PlaybackInput::MediaEnded { card_index } => {
                if self.is_live_media_event(card_index) {
                    self.on_ended(&mut effects);
                }
            }
            PlaybackInput::MediaError { card_index } => {
                self.set_audio_available(card_index, false);
                if self.is_live_media_event(card_index) {
                    self.on_ended(&mut effects);
                }
            }
            PlaybackInput::TimerFired(token) => self.on_timer(token, &mut effects),
            PlaybackInput::Settings(settings) => {
                let old_speed = self.state.settings.playback_speed();
                self.state.settings = settings;
                if self.state.is_playing && (settings.playback_speed() - old_speed).abs() > f32::EPSILON
                {
                    effects.push(PlaybackEffect::SetSpeed(settings.playback_speed()));
                }
            }
            PlaybackInput::Leave => {
                self.stop(&mut effects);
                self.state.repeat_index = 0;
            }
        }

        effects
    }

    // ─── transitions ───

    fn stop(&mut self, effects: &mut Vec<PlaybackEffect>) {
        self.cancel_pending(effects);
        if self.state.is_playing {
            effects.push(PlaybackEffect::Stop);
        }
        self.state.is_playing = false;
        self.state.user_paused = true;
    }

    fn navigate(&mut self, target: usize, effects: &mut Vec<PlaybackEffect>) {
        self.stop(effects);
        self.state.repeat_index = 0;
        self.state.current_card_index = target;
    }

    /// Media events only count while the loop runs, for the current card, and
    /// when no continuation is already waiting.
    fn is_live_media_event(&self, card_index: usize) -> bool {
        self.state.is_playing
            && card_index == self.state.current_card_index
            && self.pending.is_none()
    }

    fn start_current(&mut self, effects: &mut Vec<PlaybackEffect>) {
        let card_index = self.state.current_card_index;
        if self.has_audio(card_index) {
            effects.push(PlaybackEffect::Play {
                card_index,
                speed: self.state.settings.playback_speed(),
            });
        } else if self.audio_available.contains(&true) {
            self.on_ended(effects);
        } else {
            // nothing left to play; the loop would only spin on timers
            self.cancel_pending(effects);
            self.state.is_playing = false;
            self.state.repeat_index = 0;
        }
    }

    fn on_ended(&mut self, effects: &mut Vec<PlaybackEffect>) {
        let pause = self.state.settings.pause_between_repeats();
        match self.state.settings.repeat_count() {
            RepeatCount::Finite(limit) => {
                self.state.repeat_index = self.state.repeat_index.saturating_add(1);
                if self.state.repeat_index < limit.get() {
                    self.schedule(pause, Continuation::Repeat, effects);
                } else {
                    self.state.current_card_index = self.next_auto_index();
                    self.state.repeat_index = 0;
                    if !self.state.user_paused {
                        self.schedule(self.advance_delay, Continuation::PlayCurrent, effects);
                    }
                }
            }
            RepeatCount::Infinite => {
                let to = self.next_auto_index();
                self.schedule(pause, Continuation::Advance { to }, effects);
            }
        }
    }

    fn on_timer(&mut self, token: TimerToken, effects: &mut Vec<PlaybackEffect>) {
        let continuation = match self.pending {
            Some((live, continuation)) if live == token => continuation,
            _ => return,
        };
        self.pending = None;
        if !self.state.is_playing || self.state.user_paused {
            return;
        }

        match continuation {
            Continuation::Repeat | Continuation::PlayCurrent => {}
            Continuation::Advance { to } => {
                self.state.current_card_index = to;
                self.state.repeat_index = 0;
            }
        }
        self.start_current(effects);
    }

    fn schedule(
        &mut self,
        delay: Duration,
        continuation: Continuation,
        effects: &mut Vec<PlaybackEffect>,
    ) {
        self.cancel_pending(effects);
        self.next_token += 1;
        let token = TimerToken(self.next_token);
        self.pending = Some((token, continuation));
        effects.push(PlaybackEffect::Schedule {
            token,
            delay,
            continuation,
        });
    }

    fn cancel_pending(&mut self, effects: &mut Vec<PlaybackEffect>) {
        if let Some((token, _)) = self.pending.take() {
            effects.push(PlaybackEffect::Cancel(token));
        }
    }

    fn next_auto_index(&mut self) -> usize {
        if self.state.settings.random_mode() {
            self.rng.random_range(0..self.card_count)
        } else {
            (self.state.current_card_index + 1) % self.card_count
        }
    }
}
