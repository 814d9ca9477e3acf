use std::collections::HashMap;
use std::time::Duration;

use lesson_core::model::{PlaybackSettings, VocabularyCard};
use lesson_core::scheduler::{
    PlaybackEffect, PlaybackInput, PlaybackScheduler, PlaybackState, TimerToken,
};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use url::Url;

use crate::audio::AudioCache;

/// The host's media element.
///
/// Calls must return quickly. The host reports back through
/// [`PlaybackHandle::media_ended`] and friends.
pub trait AudioOutput: Send + 'static {
    fn play(&mut self, card_index: usize, url: &Url, speed: f32);
    fn stop(&mut self);
    fn set_speed(&mut self, speed: f32);
}

/// Handle to a running vocabulary player.
///
/// Dropping it stops the player and every pending continuation.
pub struct PlaybackHandle {
    inputs: mpsc::UnboundedSender<PlaybackInput>,
    state: watch::Receiver<PlaybackState>,
    actor: JoinHandle<()>,
}

impl PlaybackHandle {
    /// Resolve audio for every card, then start the player.
    ///
    /// Cards whose audio cannot be resolved are played as if they ended instantly.
    pub async fn spawn(
        cards: &[VocabularyCard],
        settings: PlaybackSettings,
        audio: &AudioCache,
        output: impl AudioOutput,
        auto_advance_delay: Duration,
    ) -> Self {
        let urls = audio
            .resolve_all(cards.iter().map(VocabularyCard::audio_key))
            .await;
        let scheduler =
            PlaybackScheduler::new(cards.len(), settings).with_advance_delay(auto_advance_delay);
        Self::start(scheduler, urls, output)
    }

    /// Start a player around an existing scheduler and pre-resolved URLs.
    #[must_use]
    pub fn start(
        mut scheduler: PlaybackScheduler,
        urls: Vec<Option<Url>>,
        output: impl AudioOutput,
    ) -> Self {
        for index in 0..scheduler.card_count() {
            let available = urls.get(index).is_some_and(Option::is_some);
            scheduler.set_audio_available(index, available);
        }
        let (inputs, inbox) = mpsc::unbounded_channel();
        let (state_tx, state) = watch::channel(scheduler.state().clone());
        let actor = PlayerActor {
            scheduler,
            urls,
            output,
            timers: Timers::default(),
            state_tx,
        };
        let actor = tokio::spawn(actor.run(inbox));
        Self {
            inputs,
            state,
            actor,
        }
    }

    fn send(&self, input: PlaybackInput) {
        if self.inputs.send(input).is_err() {
            tracing::debug!(?input, "player already stopped");
        }
    }

    pub fn toggle_play_pause(&self) {
        self.send(PlaybackInput::TogglePlayPause);
    }

    pub fn next(&self) {
        self.send(PlaybackInput::Next);
    }

    pub fn previous(&self) {
        self.send(PlaybackInput::Previous);
    }

    pub fn select(&self, card_index: usize) {
        self.send(PlaybackInput::Select(card_index));
    }

    pub fn media_playing(&self) {
        self.send(PlaybackInput::MediaPlaying);
    }

    pub fn media_paused(&self) {
        self.send(PlaybackInput::MediaPaused);
    }

    pub fn media_ended(&self, card_index: usize) {
        self.send(PlaybackInput::MediaEnded { card_index });
    }

    pub fn media_error(&self, card_index: usize) {
        self.send(PlaybackInput::MediaError { card_index });
    }

    pub fn update_settings(&self, settings: PlaybackSettings) {
        self.send(PlaybackInput::Settings(settings));
    }

    /// Stop playback and cancel everything pending. The handle stays usable.
    pub fn leave(&self) {
        self.send(PlaybackInput::Leave);
    }

    /// Snapshots published after every input.
    #[must_use]
    pub fn state(&self) -> watch::Receiver<PlaybackState> {
        self.state.clone()
    }
}

impl Drop for PlaybackHandle {
    fn drop(&mut self) {
        self.actor.abort();
    }
}

//
// ─── ACTOR ─────────────────────────────────────────────────────────────────────
//

/// Sleep tasks for scheduled continuations, aborted on cancel or drop.
#[derive(Default)]
struct Timers {
    pending: HashMap<TimerToken, JoinHandle<()>>,
}

impl Timers {
    fn schedule(&mut self, token: TimerToken, delay: Duration, fired: mpsc::UnboundedSender<TimerToken>) {
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = fired.send(token);
        });
        self.pending.insert(token, handle);
    }

    fn cancel(&mut self, token: TimerToken) {
        if let Some(handle) = self.pending.remove(&token) {
            handle.abort();
        }
    }

    fn fired(&mut self, token: TimerToken) {
        self.pending.remove(&token);
    }
}

impl Drop for Timers {
    fn drop(&mut self) {
        for (_, handle) in self.pending.drain() {
            handle.abort();
        }
    }
}

struct PlayerActor<O: AudioOutput> {
    scheduler: PlaybackScheduler,
    urls: Vec<Option<Url>>,
    output: O,
    timers: Timers,
    state_tx: watch::Sender<PlaybackState>,
}

impl<O: AudioOutput> PlayerActor<O> {
    async fn run(mut self, mut inbox: mpsc::UnboundedReceiver<PlaybackInput>) {
        let (fired_tx, mut fired_rx) = mpsc::unbounded_channel();
        loop {
            let input = tokio::select! {
                input = inbox.recv() => match input {
                    Some(input) => input,
                    None => break,
                },
                Some(token) = fired_rx.recv() => {
                    self.timers.fired(token);
                    PlaybackInput::TimerFired(token)
                }
            };
            let effects = self.scheduler.handle(input);
            for effect in effects {
                self.apply(effect, &fired_tx);
            }
            self.state_tx.send_replace(self.scheduler.state().clone());
        }
    }

    fn apply(&mut self, effect: PlaybackEffect, fired: &mpsc::UnboundedSender<TimerToken>) {
        match effect {
            PlaybackEffect::Play { card_index, speed } => {
                match self.urls.get(card_index).and_then(Option::as_ref) {
                    Some(url) => self.output.play(card_index, url, speed),
                    None => tracing::debug!(card_index, "no audio to play"),
                }
            }
            PlaybackEffect::Stop => self.output.stop(),
            PlaybackEffect::SetSpeed(speed) => self.output.set_speed(speed),
            PlaybackEffect::Schedule {
                token,
                delay,
                continuation,
            } => {
                tracing::trace!(token = token.value(), ?delay, ?continuation, "scheduled");
                self.timers.schedule(token, delay, fired.clone());
            }
            PlaybackEffect::Cancel(token) => self.timers.cancel(token),
        }
    }
}

// Runs when the loop ends and when the task is aborted mid-await.
impl<O: AudioOutput> Drop for PlayerActor<O> {
    fn drop(&mut self) {
        self.output.stop();
        tracing::debug!("player stopped");
    }
}
