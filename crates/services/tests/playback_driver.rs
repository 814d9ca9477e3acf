use std::sync::{Arc, Mutex};
use std::time::Duration;

use lesson_core::model::{PlaybackSettings, RepeatCount, VocabularyCard};
use lesson_core::scheduler::PlaybackScheduler;
use services::{AudioCache, AudioOutput, PlaybackHandle, StaticAudioResolver};
use url::Url;

#[derive(Debug, Clone, PartialEq)]
enum Event {
    Play(usize, String),
    Stop,
    Speed(f32),
}

#[derive(Clone, Default)]
struct Recorder {
    events: Arc<Mutex<Vec<Event>>>,
}

impl Recorder {
    fn events(&self) -> Vec<Event> {
        self.events.lock().unwrap().clone()
    }

    fn plays(&self) -> Vec<usize> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                Event::Play(index, _) => Some(index),
                _ => None,
            })
            .collect()
    }
}

impl AudioOutput for Recorder {
    fn play(&mut self, card_index: usize, url: &Url, _speed: f32) {
        self.events
            .lock()
            .unwrap()
            .push(Event::Play(card_index, url.to_string()));
    }

    fn stop(&mut self) {
        self.events.lock().unwrap().push(Event::Stop);
    }

    fn set_speed(&mut self, speed: f32) {
        self.events.lock().unwrap().push(Event::Speed(speed));
    }
}

fn url(key: &str) -> Url {
    Url::parse(&format!("https://cdn.example.com/{key}.mp3")).unwrap()
}

fn settings(repeats: RepeatCount, pause_ms: u64) -> PlaybackSettings {
    PlaybackSettings::default()
        .with_pause(Duration::from_millis(pause_ms))
        .unwrap()
        .with_repeat_count(repeats)
}

fn start(
    cards: usize,
    settings: PlaybackSettings,
    urls: Vec<Option<Url>>,
) -> (PlaybackHandle, Recorder) {
    let scheduler = PlaybackScheduler::with_seed(cards, settings, 7)
        .with_advance_delay(Duration::from_millis(300));
    let recorder = Recorder::default();
    (PlaybackHandle::start(scheduler, urls, recorder.clone()), recorder)
}

async fn settle() {
    tokio::time::sleep(Duration::from_millis(10)).await;
}

#[tokio::test(start_paused = true)]
async fn repeats_then_advances() {
    let finite = RepeatCount::finite(2).unwrap();
    let (player, out) = start(
        2,
        settings(finite, 1_000),
        vec![Some(url("uno")), Some(url("dos"))],
    );

    player.toggle_play_pause();
    settle().await;
    assert_eq!(out.plays(), vec![0]);

    player.media_ended(0);
    settle().await;
    assert_eq!(player.state().borrow().repeat_index, 1);
    tokio::time::sleep(Duration::from_millis(1_100)).await;
    assert_eq!(out.plays(), vec![0, 0]);

    player.media_ended(0);
    settle().await;
    assert_eq!(player.state().borrow().current_card_index, 1);
    tokio::time::sleep(Duration::from_millis(400)).await;
    assert_eq!(out.plays(), vec![0, 0, 1]);
    assert_eq!(
        out.events().last(),
        Some(&Event::Play(1, url("dos").to_string()))
    );
}

#[tokio::test(start_paused = true)]
async fn pause_cancels_pending_repeat() {
    let finite = RepeatCount::finite(3).unwrap();
    let (player, out) = start(1, settings(finite, 2_000), vec![Some(url("uno"))]);

    player.toggle_play_pause();
    player.media_ended(0);
    settle().await;
    player.toggle_play_pause();
    tokio::time::sleep(Duration::from_secs(10)).await;

    assert_eq!(out.events(), vec![Event::Play(0, url("uno").to_string()), Event::Stop]);
    let state = player.state().borrow().clone();
    assert!(!state.is_playing);
    assert!(state.user_paused);
}

#[tokio::test(start_paused = true)]
async fn infinite_mode_loops_until_left() {
    let (player, out) = start(
        3,
        settings(RepeatCount::Infinite, 500),
        vec![Some(url("a")), Some(url("b")), Some(url("c"))],
    );

    player.toggle_play_pause();
    settle().await;
    for step in 0..4 {
        let current = player.state().borrow().current_card_index;
        player.media_ended(current);
        tokio::time::sleep(Duration::from_millis(600)).await;
        assert_eq!(player.state().borrow().current_card_index, (step + 1) % 3);
    }
    assert_eq!(out.plays(), vec![0, 1, 2, 0, 1]);

    player.media_ended(1);
    settle().await;
    player.leave();
    tokio::time::sleep(Duration::from_secs(5)).await;
    assert_eq!(out.plays().len(), 5);
    assert_eq!(out.events().last(), Some(&Event::Stop));
}

#[tokio::test(start_paused = true)]
async fn cards_without_audio_are_skipped() {
    let once = RepeatCount::finite(1).unwrap();
    let (player, out) = start(2, settings(once, 0), vec![None, Some(url("dos"))]);

    player.toggle_play_pause();
    tokio::time::sleep(Duration::from_millis(400)).await;
    assert_eq!(out.plays(), vec![1]);
}

#[tokio::test(start_paused = true)]
async fn manual_navigation_stops_without_autoplay() {
    let finite = RepeatCount::finite(2).unwrap();
    let (player, out) = start(
        3,
        settings(finite, 1_000),
        vec![Some(url("a")), Some(url("b")), Some(url("c"))],
    );

    player.toggle_play_pause();
    player.media_ended(0);
    settle().await;
    player.next();
    tokio::time::sleep(Duration::from_secs(5)).await;

    assert_eq!(out.plays(), vec![0]);
    let state = player.state().borrow().clone();
    assert_eq!(state.current_card_index, 1);
    assert_eq!(state.repeat_index, 0);
    assert!(!state.is_playing);
}

#[tokio::test(start_paused = true)]
async fn speed_change_reaches_the_output_while_playing() {
    let (player, out) = start(1, PlaybackSettings::default(), vec![Some(url("a"))]);
    player.toggle_play_pause();
    player.update_settings(PlaybackSettings::default().with_speed(0.5).unwrap());
    settle().await;
    assert_eq!(out.events().last(), Some(&Event::Speed(0.5)));
}

#[tokio::test(start_paused = true)]
async fn dropping_the_handle_cancels_everything() {
    let finite = RepeatCount::finite(2).unwrap();
    let (player, out) = start(1, settings(finite, 1_000), vec![Some(url("a"))]);
    player.toggle_play_pause();
    player.media_ended(0);
    settle().await;
    drop(player);
    tokio::time::sleep(Duration::from_secs(5)).await;
    assert_eq!(out.plays(), vec![0]);
    assert_eq!(out.events().last(), Some(&Event::Stop));
}

#[tokio::test(start_paused = true)]
async fn dropping_the_handle_silences_playing_audio() {
    let (player, out) = start(1, PlaybackSettings::default(), vec![Some(url("a"))]);
    player.toggle_play_pause();
    settle().await;
    drop(player);
    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(
        out.events(),
        vec![Event::Play(0, url("a").to_string()), Event::Stop]
    );
}

#[tokio::test(start_paused = true)]
async fn spawn_resolves_audio_through_the_cache() {
    let resolver = StaticAudioResolver::new().with("gato", url("gato"));
    let cache = AudioCache::new(Arc::new(resolver));
    let cards = [VocabularyCard::new("perro"), VocabularyCard::new("gato")];
    let out = Recorder::default();
    let once = RepeatCount::finite(1).unwrap();

    let player = PlaybackHandle::spawn(
        &cards,
        settings(once, 0),
        &cache,
        out.clone(),
        Duration::from_millis(300),
    )
    .await;
    player.toggle_play_pause();
    tokio::time::sleep(Duration::from_millis(400)).await;

    assert_eq!(out.events(), vec![Event::Play(1, url("gato").to_string())]);
}
