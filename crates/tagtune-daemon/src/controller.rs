//! PlaybackController — the tag-driven playback state machine.
//!
//! ```text
//!            observe(t), t resolves              tick, volume = 1
//!   Idle ───────────────────────────▶ FadingIn ───────────────────▶ Playing
//!    ▲                                   │                            │
//!    │ tick, volume = 0,                 │ observe(t')                │ observe(t')
//!    │ t' unresolved                     ▼                            │
//!    └──────────────────────────────  FadingOut ◀─────────────────────┘
//!                                        │ tick, volume = 0, t' resolves
//!                                        └──────────────────────────▶ FadingIn
//! ```
//!
//! The controller owns no timer.  While a fade is running it exposes a timer
//! generation via [`PlaybackController::fade_timer`]; the owner arms one
//! interval for that generation and calls [`PlaybackController::on_fade_tick`]
//! on every tick.  A new generation means the old interval is cancelled.

use tagtune_proto::error::PlaybackError;
use tagtune_proto::protocol::PlaybackPhase;
use tagtune_proto::status_log::Logger;
use tagtune_proto::tag_map::TagMap;
use tracing::{debug, warn};

use crate::fade::{self, FadeDirection};
use crate::sink::AudioSink;

pub struct PlaybackController<S, L> {
    sink: S,
    log: L,
    map: TagMap,
    fade_step: f32,
    current_tag: Option<String>,
    /// Locator loaded for `current_tag`, kept for interaction retries.
    current_locator: Option<String>,
    phase: PlaybackPhase,
    volume: f32,
    /// Target captured when the running fade-out was requested.
    fade_out_target: Option<String>,
    fade_timer: Option<u64>,
    next_timer: u64,
    /// A start was rejected; retry on the next user interaction.
    awaiting_interaction: bool,
    /// Last tag that resolved to nothing, so it is reported once.
    unmapped_tag: Option<String>,
}

impl<S: AudioSink, L: Logger> PlaybackController<S, L> {
    pub fn new(sink: S, log: L, fade_step: f32) -> Self {
        Self {
            sink,
            log,
            map: TagMap::new(),
            fade_step,
            current_tag: None,
            current_locator: None,
            phase: PlaybackPhase::Idle,
            volume: 0.0,
            fade_out_target: None,
            fade_timer: None,
            next_timer: 1,
            awaiting_interaction: false,
            unmapped_tag: None,
        }
    }

    pub fn current_tag(&self) -> Option<&str> {
        self.current_tag.as_deref()
    }

    pub fn phase(&self) -> PlaybackPhase {
        self.phase
    }

    pub fn volume(&self) -> f32 {
        self.volume
    }

    pub fn awaiting_interaction(&self) -> bool {
        self.awaiting_interaction
    }

    pub fn map(&self) -> &TagMap {
        &self.map
    }

    /// Generation of the active fade timer, `None` when no fade runs.
    pub fn fade_timer(&self) -> Option<u64> {
        self.fade_timer
    }

    /// Replace the tag map.  Playback is not touched; the next observation
    /// resolves against the new map.
    pub fn update_map(&mut self, text: &str) {
        let n = self.map.update(text);
        self.unmapped_tag = None;
        self.log.log(&format!("Music map updated: {} items", n));
    }

    /// Feed one scan result.
    pub async fn on_observed_tag(&mut self, tag: Option<String>) {
        if tag == self.current_tag {
            return;
        }
        if self.phase == PlaybackPhase::FadingOut && tag == self.fade_out_target {
            return;
        }
        if tag.is_some() && tag == self.unmapped_tag && !self.phase.is_audible() {
            return;
        }
        self.unmapped_tag = None;
        self.log
            .log(&format!("Tag observed: {}", tag.as_deref().unwrap_or("none")));

        self.cancel_fade();

        if self.phase.is_audible() {
            self.log.log(&format!(
                "Fading out: {}",
                self.current_tag.as_deref().unwrap_or("none")
            ));
            self.fade_out_target = tag;
            self.phase = PlaybackPhase::FadingOut;
            self.arm_fade();
        } else {
            self.settle(tag).await;
        }
    }

    /// One fade timer tick.  Ignored when no fade is running.
    pub async fn on_fade_tick(&mut self) {
        let direction = match self.phase {
            PlaybackPhase::FadingIn => FadeDirection::In,
            PlaybackPhase::FadingOut => FadeDirection::Out,
            PlaybackPhase::Idle | PlaybackPhase::Playing => {
                self.cancel_fade();
                return;
            }
        };

        let next = fade::step(direction, self.volume, self.fade_step);
        self.apply_volume(next.volume).await;
        if !next.finished {
            return;
        }

        self.cancel_fade();
        match direction {
            FadeDirection::In => {
                self.phase = PlaybackPhase::Playing;
                self.log.log("Fade in complete.");
            }
            FadeDirection::Out => {
                self.release_source().await;
                self.phase = PlaybackPhase::Idle;
                self.log.log("Fade out complete.");
                let target = self.fade_out_target.take();
                self.settle(target).await;
            }
        }
    }

    /// User-interaction signal: retry a rejected start once, for whatever
    /// tag is current now.
    pub async fn on_interaction(&mut self) {
        if !self.awaiting_interaction {
            debug!("interaction ignored: nothing deferred");
            return;
        }
        let (Some(tag), Some(locator)) = (self.current_tag.clone(), self.current_locator.clone())
        else {
            self.awaiting_interaction = false;
            return;
        };

        self.log.log("Interaction received, retrying play...");
        match self.load_and_play(&locator).await {
            Ok(()) => {
                self.awaiting_interaction = false;
                self.log.log(&format!("Retry play successful for {}", tag));
                self.begin_fade_in();
            }
            Err(e) => {
                self.log.log(&format!("Retry play failed: {}", e));
            }
        }
    }

    /// The player reports that a source stopped by itself.  `source` is the
    /// player's id for it, when known; reports about anything but the loaded
    /// source are dropped.  `error` is set when it could not be played.
    pub async fn on_source_ended(&mut self, source: Option<u64>, error: Option<String>) {
        if self.current_tag.is_none() || self.current_locator.is_none() || !self.phase.is_audible()
        {
            return;
        }
        if let Some(ended) = source {
            if self.sink.source_id() != Some(ended) {
                debug!("stale end of source {} ignored", ended);
                return;
            }
        }
        self.cancel_fade();
        if self.phase == PlaybackPhase::FadingOut {
            // Silence came early; finish the pending transition.
            self.release_source().await;
            self.apply_volume(0.0).await;
            self.phase = PlaybackPhase::Idle;
            let target = self.fade_out_target.take();
            self.settle(target).await;
            return;
        }

        self.phase = PlaybackPhase::Idle;
        match error {
            Some(reason) => self.defer(PlaybackError::Rejected(reason)),
            // current_tag is kept so re-observing it stays a no-op.
            None => self.log.log(&format!(
                "Track finished: {}",
                self.current_tag.as_deref().unwrap_or("none")
            )),
        }
    }

    /// Resolve `tag` and either start it or go silent.  Only called when
    /// nothing is audible.
    async fn settle(&mut self, tag: Option<String>) {
        let resolved = tag
            .as_deref()
            .and_then(|t| self.map.resolve(t))
            .map(str::to_string);

        match (tag, resolved) {
            (Some(tag), Some(locator)) => self.start_track(tag, locator).await,
            (tag, _) => {
                if self.current_locator.is_some() {
                    // A deferred start left a source loaded.
                    self.release_source().await;
                }
                self.current_tag = None;
                self.phase = PlaybackPhase::Idle;
                self.awaiting_interaction = false;
                match tag {
                    Some(tag) => {
                        self.log.log("Tag not in map, music stopped.");
                        self.unmapped_tag = Some(tag);
                    }
                    None => debug!("no tag in view, staying silent"),
                }
            }
        }
    }

    async fn start_track(&mut self, tag: String, locator: String) {
        self.log
            .log(&format!("Starting new track: {} -> {}", tag, locator));
        self.current_tag = Some(tag.clone());
        self.current_locator = Some(locator.clone());
        self.awaiting_interaction = false;

        match self.load_and_play(&locator).await {
            Ok(()) => {
                self.log.log(&format!("Play started for {}", tag));
                self.begin_fade_in();
            }
            Err(e) => {
                self.phase = PlaybackPhase::Idle;
                self.defer(e);
            }
        }
    }

    async fn load_and_play(&mut self, locator: &str) -> Result<(), PlaybackError> {
        self.sink.set_source(Some(locator)).await?;
        self.apply_volume(0.0).await;
        self.sink.play().await
    }

    fn defer(&mut self, error: PlaybackError) {
        self.awaiting_interaction = true;
        self.log.log(&format!("Play failed: {}", error));
        self.log.log("Interact (press Enter) to try playing audio");
    }

    fn begin_fade_in(&mut self) {
        self.log.log("Fading in...");
        self.phase = PlaybackPhase::FadingIn;
        self.arm_fade();
    }

    async fn release_source(&mut self) {
        if let Err(e) = self.sink.pause().await {
            warn!("sink pause failed: {}", e);
        }
        if let Err(e) = self.sink.set_source(None).await {
            warn!("sink release failed: {}", e);
        }
        self.current_locator = None;
    }

    async fn apply_volume(&mut self, volume: f32) {
        self.volume = volume;
        if let Err(e) = self.sink.set_volume(volume).await {
            warn!("sink volume failed: {}", e);
        }
    }

    fn arm_fade(&mut self) {
        self.fade_timer = Some(self.next_timer);
        self.next_timer += 1;
    }

    fn cancel_fade(&mut self) {
        self.fade_timer = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::testing::{RecordingSink, SinkEvent};
    use tagtune_proto::status_log::StatusLog;

    type Controller = PlaybackController<RecordingSink, StatusLog>;

    fn controller(map: &str) -> (Controller, RecordingSink, StatusLog) {
        let sink = RecordingSink::new();
        let log = StatusLog::new();
        let mut c = PlaybackController::new(sink.clone(), log.clone(), 0.1);
        c.update_map(map);
        (c, sink, log)
    }

    async fn tick_until_settled(c: &mut Controller) -> usize {
        let mut ticks = 0;
        while c.fade_timer().is_some() {
            c.on_fade_tick().await;
            ticks += 1;
            assert!(ticks < 100, "fade never finished");
        }
        ticks
    }

    async fn observe(c: &mut Controller, tag: Option<&str>) {
        c.on_observed_tag(tag.map(str::to_string)).await;
    }

    #[tokio::test]
    async fn test_start_from_idle_fades_in_to_playing() {
        let (mut c, sink, _) = controller("cat:cat.mp3");
        observe(&mut c, Some("cat")).await;

        assert_eq!(c.current_tag(), Some("cat"));
        assert_eq!(c.phase(), PlaybackPhase::FadingIn);
        assert_eq!(c.volume(), 0.0);
        assert_eq!(sink.source().as_deref(), Some("cat.mp3"));
        assert!(!sink.is_paused());

        let ticks = tick_until_settled(&mut c).await;
        assert_eq!(ticks, 10);
        assert_eq!(c.phase(), PlaybackPhase::Playing);
        assert_eq!(c.volume(), 1.0);
        let volumes = sink.volumes();
        assert!(volumes.windows(2).all(|w| w[1] >= w[0]));
    }

    #[tokio::test]
    async fn test_repeated_observation_is_noop() {
        let (mut c, sink, _) = controller("cat:cat.mp3");
        observe(&mut c, None).await;
        observe(&mut c, None).await;
        assert!(sink.events().is_empty());
        assert_eq!(c.fade_timer(), None);

        observe(&mut c, Some("cat")).await;
        let timer = c.fade_timer();
        observe(&mut c, Some("cat")).await;
        assert_eq!(c.fade_timer(), timer, "same tag must not re-arm the fade");

        tick_until_settled(&mut c).await;
        sink.take_events();
        observe(&mut c, Some("cat")).await;
        assert!(sink.events().is_empty());
        assert_eq!(c.phase(), PlaybackPhase::Playing);
    }

    #[tokio::test]
    async fn test_switch_fades_out_then_starts_next() {
        let (mut c, sink, _) = controller("cat:cat.mp3\ndog:dog.mp3");
        observe(&mut c, Some("cat")).await;
        tick_until_settled(&mut c).await;
        sink.take_events();

        observe(&mut c, Some("dog")).await;
        // current_tag only changes once silence is reached.
        assert_eq!(c.phase(), PlaybackPhase::FadingOut);
        assert_eq!(c.current_tag(), Some("cat"));

        // Drive the fade-out only.
        while c.phase() == PlaybackPhase::FadingOut {
            c.on_fade_tick().await;
        }
        let events = sink.take_events();
        let volumes: Vec<f32> = events
            .iter()
            .filter_map(|e| match e {
                SinkEvent::Volume(v) => Some(*v),
                _ => None,
            })
            .collect();
        assert!(volumes.windows(2).all(|w| w[1] <= w[0]));
        let pause_at = events.iter().position(|e| *e == SinkEvent::Pause).unwrap();
        let dog_at = events
            .iter()
            .position(|e| *e == SinkEvent::Source(Some("dog.mp3".into())))
            .unwrap();
        assert!(pause_at < dog_at, "old source must stop before the new one loads");
        assert_eq!(c.current_tag(), Some("dog"));
        assert_eq!(c.phase(), PlaybackPhase::FadingIn);
    }

    #[tokio::test]
    async fn test_superseded_request_leaves_single_track() {
        let (mut c, sink, _) = controller("a:a.mp3\nb:b.mp3");
        observe(&mut c, Some("a")).await;
        c.on_fade_tick().await;
        c.on_fade_tick().await;
        let first_timer = c.fade_timer();

        observe(&mut c, Some("b")).await;
        assert_ne!(c.fade_timer(), first_timer);
        assert_eq!(c.phase(), PlaybackPhase::FadingOut);

        tick_until_settled(&mut c).await;
        assert_eq!(c.current_tag(), Some("b"));
        assert_eq!(c.phase(), PlaybackPhase::Playing);
        assert_eq!(sink.source().as_deref(), Some("b.mp3"));
        assert_eq!(c.fade_timer(), None);

        // b only became audible after a was released.
        let events = sink.events();
        let release = events
            .iter()
            .position(|e| *e == SinkEvent::Source(None))
            .unwrap();
        let b_loaded = events
            .iter()
            .position(|e| *e == SinkEvent::Source(Some("b.mp3".into())))
            .unwrap();
        assert!(release < b_loaded);
    }

    #[tokio::test]
    async fn test_newest_target_wins_during_fade_out() {
        let (mut c, sink, _) = controller("a:a.mp3\nb:b.mp3\nc:c.mp3");
        observe(&mut c, Some("a")).await;
        tick_until_settled(&mut c).await;

        observe(&mut c, Some("b")).await;
        c.on_fade_tick().await;
        let volume_at_cancel = c.volume();
        observe(&mut c, Some("c")).await;
        // Restarted fade continues from where the old one stopped.
        assert_eq!(c.volume(), volume_at_cancel);

        tick_until_settled(&mut c).await;
        assert_eq!(c.current_tag(), Some("c"));
        assert!(!sink
            .events()
            .contains(&SinkEvent::Source(Some("b.mp3".into()))));
    }

    #[tokio::test]
    async fn test_observing_fade_out_target_again_is_noop() {
        let (mut c, _, _) = controller("a:a.mp3\nb:b.mp3");
        observe(&mut c, Some("a")).await;
        tick_until_settled(&mut c).await;
        observe(&mut c, Some("b")).await;
        let timer = c.fade_timer();
        observe(&mut c, Some("b")).await;
        assert_eq!(c.fade_timer(), timer);
    }

    #[tokio::test]
    async fn test_stop_locator_silences_like_unresolved() {
        let (mut c, sink, _) = controller("x:x.mp3\nsilence:stop");
        observe(&mut c, Some("x")).await;
        tick_until_settled(&mut c).await;

        observe(&mut c, Some("silence")).await;
        tick_until_settled(&mut c).await;
        assert_eq!(c.phase(), PlaybackPhase::Idle);
        assert_eq!(c.current_tag(), None);
        assert_eq!(sink.source(), None);
        assert!(sink.is_paused());
        assert_eq!(c.volume(), 0.0);
    }

    #[tokio::test]
    async fn test_absent_tag_fades_to_idle() {
        let (mut c, sink, _) = controller("x:x.mp3");
        observe(&mut c, Some("x")).await;
        tick_until_settled(&mut c).await;
        observe(&mut c, None).await;
        tick_until_settled(&mut c).await;
        assert_eq!(c.phase(), PlaybackPhase::Idle);
        assert_eq!(c.current_tag(), None);
        assert_eq!(sink.source(), None);
    }

    #[tokio::test]
    async fn test_rejected_play_waits_for_interaction() {
        let (mut c, sink, log) = controller("cat:cat.mp3");
        sink.reject_next_play("NotAllowedError");
        observe(&mut c, Some("cat")).await;

        assert_eq!(c.phase(), PlaybackPhase::Idle);
        assert_eq!(c.current_tag(), Some("cat"));
        assert!(c.awaiting_interaction());
        assert_eq!(c.fade_timer(), None);
        assert!(log.entries().iter().any(|l| l.contains("Play failed")));

        // No automatic retry on repeated observations.
        observe(&mut c, Some("cat")).await;
        assert!(!sink.events().contains(&SinkEvent::Play));

        c.on_interaction().await;
        assert!(!c.awaiting_interaction());
        assert_eq!(c.phase(), PlaybackPhase::FadingIn);
        tick_until_settled(&mut c).await;
        assert_eq!(c.phase(), PlaybackPhase::Playing);
        assert_eq!(
            sink.events()
                .iter()
                .filter(|e| **e == SinkEvent::Play)
                .count(),
            1
        );
    }

    #[tokio::test]
    async fn test_deferred_retry_targets_latest_tag() {
        let (mut c, sink, _) = controller("cat:cat.mp3\ndog:dog.mp3");
        sink.reject_next_play("NotAllowedError");
        observe(&mut c, Some("cat")).await;
        sink.reject_next_play("NotAllowedError");
        observe(&mut c, Some("dog")).await;
        assert_eq!(c.current_tag(), Some("dog"));
        assert!(c.awaiting_interaction());

        c.on_interaction().await;
        assert_eq!(sink.source().as_deref(), Some("dog.mp3"));
        assert_eq!(c.phase(), PlaybackPhase::FadingIn);
    }

    #[tokio::test]
    async fn test_failed_retry_keeps_waiting_without_looping() {
        let (mut c, sink, _) = controller("cat:cat.mp3");
        sink.reject_next_play("NotAllowedError");
        sink.reject_next_play("NotAllowedError");
        observe(&mut c, Some("cat")).await;
        c.on_interaction().await;
        assert!(c.awaiting_interaction());
        assert_eq!(c.phase(), PlaybackPhase::Idle);

        c.on_interaction().await;
        assert!(!c.awaiting_interaction());
        assert_eq!(c.phase(), PlaybackPhase::FadingIn);
    }

    #[tokio::test]
    async fn test_deferred_then_unresolved_releases_source() {
        let (mut c, sink, _) = controller("cat:cat.mp3");
        sink.reject_next_play("NotAllowedError");
        observe(&mut c, Some("cat")).await;
        observe(&mut c, Some("xyz")).await;
        assert!(!c.awaiting_interaction());
        assert_eq!(c.current_tag(), None);
        assert_eq!(sink.source(), None);

        c.on_interaction().await;
        assert!(!sink.events().contains(&SinkEvent::Play));
    }

    #[tokio::test]
    async fn test_interaction_without_deferral_is_ignored() {
        let (mut c, sink, _) = controller("cat:cat.mp3");
        c.on_interaction().await;
        assert!(sink.events().is_empty());
    }

    #[tokio::test]
    async fn test_player_error_defers_until_interaction() {
        let (mut c, sink, _) = controller("cat:cat.mp3");
        observe(&mut c, Some("cat")).await;
        c.on_source_ended(sink.source_id(), Some("file not found".into()))
            .await;
        assert_eq!(c.phase(), PlaybackPhase::Idle);
        assert_eq!(c.fade_timer(), None);
        assert!(c.awaiting_interaction());

        sink.take_events();
        c.on_interaction().await;
        assert_eq!(
            sink.events()[0],
            SinkEvent::Source(Some("cat.mp3".into()))
        );
        assert_eq!(c.phase(), PlaybackPhase::FadingIn);
    }

    #[tokio::test]
    async fn test_natural_end_keeps_tag() {
        let (mut c, sink, _) = controller("cat:cat.mp3");
        observe(&mut c, Some("cat")).await;
        tick_until_settled(&mut c).await;
        c.on_source_ended(sink.source_id(), None).await;
        assert_eq!(c.phase(), PlaybackPhase::Idle);
        assert_eq!(c.current_tag(), Some("cat"));
        assert!(!c.awaiting_interaction());
    }

    #[tokio::test]
    async fn test_late_end_of_previous_track_is_ignored() {
        let (mut c, sink, _) = controller("cat:cat.mp3\ndog:dog.mp3");
        observe(&mut c, Some("cat")).await;
        tick_until_settled(&mut c).await;
        let cat_id = sink.source_id();

        observe(&mut c, Some("dog")).await;
        while c.phase() == PlaybackPhase::FadingOut {
            c.on_fade_tick().await;
        }
        assert_eq!(c.phase(), PlaybackPhase::FadingIn);
        let timer = c.fade_timer();

        // cat's end-of-file shows up after dog was loaded.
        c.on_source_ended(cat_id, None).await;
        assert_eq!(c.phase(), PlaybackPhase::FadingIn);
        assert_eq!(c.fade_timer(), timer);

        tick_until_settled(&mut c).await;
        assert_eq!(c.phase(), PlaybackPhase::Playing);
        assert_eq!(c.volume(), 1.0);
        assert_eq!(sink.source().as_deref(), Some("dog.mp3"));
    }

    #[tokio::test]
    async fn test_end_after_release_is_ignored() {
        let (mut c, sink, _) = controller("cat:cat.mp3");
        observe(&mut c, Some("cat")).await;
        tick_until_settled(&mut c).await;
        let cat_id = sink.source_id();
        observe(&mut c, None).await;
        tick_until_settled(&mut c).await;

        sink.take_events();
        c.on_source_ended(cat_id, None).await;
        c.on_source_ended(None, Some("stopped".into())).await;
        assert!(sink.events().is_empty());
        assert_eq!(c.phase(), PlaybackPhase::Idle);
        assert!(!c.awaiting_interaction());
    }

    #[tokio::test]
    async fn test_source_ending_during_fade_out_starts_target() {
        let (mut c, sink, _) = controller("cat:cat.mp3\ndog:dog.mp3");
        observe(&mut c, Some("cat")).await;
        tick_until_settled(&mut c).await;

        observe(&mut c, Some("dog")).await;
        c.on_fade_tick().await;
        c.on_fade_tick().await;
        let fade_out_timer = c.fade_timer();
        assert!(fade_out_timer.is_some());

        c.on_source_ended(sink.source_id(), None).await;
        assert_eq!(c.current_tag(), Some("dog"));
        assert_eq!(c.phase(), PlaybackPhase::FadingIn);
        assert_eq!(c.volume(), 0.0);
        assert_eq!(sink.source().as_deref(), Some("dog.mp3"));
        assert_ne!(c.fade_timer(), fade_out_timer);

        tick_until_settled(&mut c).await;
        assert_eq!(c.phase(), PlaybackPhase::Playing);
        assert_eq!(c.fade_timer(), None);
    }

    #[tokio::test]
    async fn test_source_ending_during_fade_to_silence_leaves_no_timer() {
        let (mut c, sink, _) = controller("cat:cat.mp3");
        observe(&mut c, Some("cat")).await;
        tick_until_settled(&mut c).await;

        observe(&mut c, None).await;
        c.on_fade_tick().await;
        c.on_source_ended(sink.source_id(), None).await;
        assert_eq!(c.phase(), PlaybackPhase::Idle);
        assert_eq!(c.current_tag(), None);
        assert_eq!(c.fade_timer(), None);
        assert_eq!(sink.source(), None);
    }

    #[tokio::test]
    async fn test_unmapped_tag_in_view_is_reported_once() {
        let (mut c, _, log) = controller("cat:cat.mp3");
        for _ in 0..5 {
            observe(&mut c, Some("xyz")).await;
        }
        let reports = log
            .entries()
            .iter()
            .filter(|l| l.starts_with("Tag not in map"))
            .count();
        assert_eq!(reports, 1);

        // A map that now knows the tag starts it on the next scan.
        c.update_map("xyz:xyz.mp3");
        observe(&mut c, Some("xyz")).await;
        assert_eq!(c.current_tag(), Some("xyz"));
        assert_eq!(c.phase(), PlaybackPhase::FadingIn);
    }

    #[tokio::test]
    async fn test_map_update_applies_to_next_observation() {
        let (mut c, sink, _) = controller("cat:old.mp3");
        c.update_map("cat:new.mp3");
        observe(&mut c, Some("cat")).await;
        assert_eq!(sink.source().as_deref(), Some("new.mp3"));
        assert_eq!(c.map().len(), 1);
    }

    #[tokio::test]
    async fn test_end_to_end_observation_sequence() {
        let (mut c, sink, _) = controller("cat:cat.mp3\ndog:dog.mp3");
        let sequence = [None, Some("cat"), Some("cat"), Some("dog"), Some("xyz")];
        for tag in sequence {
            observe(&mut c, tag).await;
            tick_until_settled(&mut c).await;
        }

        let transitions: Vec<SinkEvent> = sink
            .events()
            .into_iter()
            .filter(|e| !matches!(e, SinkEvent::Volume(_)))
            .collect();
        assert_eq!(
            transitions,
            vec![
                SinkEvent::Source(Some("cat.mp3".into())),
                SinkEvent::Play,
                SinkEvent::Pause,
                SinkEvent::Source(None),
                SinkEvent::Source(Some("dog.mp3".into())),
                SinkEvent::Play,
                SinkEvent::Pause,
                SinkEvent::Source(None),
            ]
        );
        assert_eq!(c.phase(), PlaybackPhase::Idle);
        assert_eq!(c.current_tag(), None);
        assert_eq!(c.fade_timer(), None);
    }
}
