use std::collections::HashSet;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::EngineConfig;
use crate::error::Result;
use crate::playback::{Click, Metronome, PlaybackEngine, ProgressivePractice};
use crate::score::{select_section, Hand, NoteEvent, Song};
use crate::scoring::{HitResult, HitTracker, SessionStats};
use crate::session::io::{AudioSink, InputSource, ProgressStore};
use crate::session::plugins::{Plugin, PluginRegistry};

/// Everything that happened during one tick.
#[derive(Serialize, Clone, Debug, Default)]
pub struct TickReport {
    pub newly_due: Vec<NoteEvent>,
    pub results: Vec<HitResult>,
    pub clicks: Vec<Click>,
    pub position: f64,
    /// The session is over; call `finish`.
    pub finished: bool,
    pub loop_restarted: bool,
}

/// One practice run over a song: playback, grading, looping and the
/// optional collaborators, advanced together by `tick`.
pub struct PracticeSession {
    config: EngineConfig,
    song: Song,
    engine: PlaybackEngine,
    tracker: HitTracker,
    metronome: Option<Metronome>,
    progressive: Option<ProgressivePractice>,
    pressed: HashSet<u8>,
    audio: Option<Box<dyn AudioSink>>,
    store: Option<Box<dyn ProgressStore>>,
    plugins: PluginRegistry,
    section: (u32, u32),
    looping: bool,
    loop_accuracies: Vec<f64>,
    /// Results from passes that have been replaced by a restart or loop.
    past_results: Vec<HitResult>,
    complete: bool,
    saved: bool,
}

impl PracticeSession {
    pub fn new(song: Song, config: EngineConfig) -> Self {
        let config = config.normalized();
        let engine = PlaybackEngine::with_config(song.clone(), &config);
        let tracker = HitTracker::with_windows(
            song.title.clone(),
            song.notes_for_hand(Hand::Both),
            config.timing,
        );
        let metronome = config
            .metronome
            .enabled
            .then(|| Metronome::with_config(song.initial_bpm(), config.metronome.clone()));

        info!(
            song = %song.title,
            notes = song.notes.len(),
            duration = song.duration,
            "practice session started"
        );

        PracticeSession {
            config,
            song,
            engine,
            tracker,
            metronome,
            progressive: None,
            pressed: HashSet::new(),
            audio: None,
            store: None,
            plugins: PluginRegistry::new(),
            section: (1, 4),
            looping: false,
            loop_accuracies: Vec::new(),
            past_results: Vec::new(),
            complete: false,
            saved: false,
        }
    }

    pub fn with_audio(mut self, audio: Box<dyn AudioSink>) -> Self {
        self.audio = Some(audio);
        self
    }

    pub fn with_store(mut self, store: Box<dyn ProgressStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn register_plugin(&mut self, plugin: Plugin) -> Result<()> {
        self.plugins.register(plugin)
    }

    pub fn add_input(&mut self, source: Box<dyn InputSource>) -> Result<()> {
        self.plugins.register(Plugin::Input(source))
    }

    /// Advance the session by `dt` seconds of wall-clock time.
    pub fn tick(&mut self, dt: f64) -> TickReport {
        let mut report = TickReport::default();
        if self.complete {
            report.finished = true;
            report.position = self.engine.position();
            return report;
        }

        let note_ons = self.drain_inputs();

        // Wait mode grades against the gate the player is working on.
        let gate_time = self.engine.next_note_time();
        report.newly_due = self.engine.update(dt, &self.pressed);

        let active_hand = self.engine.active_hand();
        if let Some(audio) = self.audio.as_mut() {
            for note in &report.newly_due {
                if !active_hand.plays(note.hand) {
                    audio.play_note_event(note);
                }
            }
        }

        // Wait mode does not grade timing: presses count at the gate's start.
        let clock = if self.engine.wait_mode() {
            gate_time.unwrap_or_else(|| self.engine.position())
        } else {
            self.engine.position()
        };

        for pitch in note_ons {
            if let Some(result) = self.tracker.feed(pitch, clock) {
                report.results.push(result);
            }
        }

        // Nothing is left to gate once wait mode runs out of notes.
        let flush_at = if self.engine.wait_mode() && self.engine.finished() {
            f64::INFINITY
        } else {
            clock
        };
        report.results.extend(self.tracker.flush_misses(flush_at));

        // Scoring sees every graded result, paused or not.
        for plugin in self.plugins.scoring_mut() {
            for result in &report.results {
                plugin.on_hit(result);
            }
        }

        if !self.engine.is_paused() {
            if !self.engine.wait_mode() {
                if let Some(metronome) = self.metronome.as_mut() {
                    report.clicks = metronome.update(dt, self.engine.tempo_scale());
                }
                if let Some(audio) = self.audio.as_mut() {
                    for click in &report.clicks {
                        audio.click(click);
                    }
                }
            }
            for plugin in self.plugins.scoring_mut() {
                plugin.on_frame(dt);
            }
            let position = self.engine.position();
            for plugin in self.plugins.visualizations_mut() {
                plugin.observe(self.engine.song(), position);
            }
        }

        if self.engine.finished() && self.tracker.is_complete() {
            if self.looping && !self.engine.song().notes.is_empty() {
                self.complete_loop();
                report.loop_restarted = true;
            } else {
                if self.looping {
                    warn!(section = ?self.section, "loop section has no notes, finishing");
                }
                info!(song = %self.song.title, "song finished");
                self.complete = true;
                report.finished = true;
            }
        }

        report.position = self.engine.position();
        report
    }

    fn drain_inputs(&mut self) -> Vec<u8> {
        let mut note_ons = Vec::new();
        for source in self.plugins.inputs_mut() {
            while let Some(event) = source.poll() {
                if event.is_note_on {
                    self.pressed.insert(event.pitch);
                    note_ons.push(event.pitch);
                    if let Some(audio) = self.audio.as_mut() {
                        audio.note_on(event.pitch, event.velocity);
                    }
                } else {
                    self.pressed.remove(&event.pitch);
                    if let Some(audio) = self.audio.as_mut() {
                        audio.note_off(event.pitch);
                    }
                }
            }
        }
        note_ons
    }

    fn complete_loop(&mut self) {
        // A pass with nothing for the active hand judges nothing.
        if self.tracker.expected_len() > 0 {
            let accuracy = self.tracker.get_stats().accuracy_pct;
            self.loop_accuracies.push(accuracy);
            if let Some(progressive) = self.progressive.as_mut() {
                let scale = progressive.on_loop_complete(accuracy);
                self.engine.set_tempo_scale(scale);
            }
            info!(
                loop_number = self.loop_accuracies.len(),
                accuracy,
                tempo = self.engine.tempo_scale(),
                "loop restarted"
            );
        }
        self.rebuild();
    }

    /// Start a fresh pass over the full song or the loop section, keeping the
    /// current tempo, mode and hand.
    fn rebuild(&mut self) {
        self.past_results.extend_from_slice(self.tracker.results());

        let song = if self.looping {
            let (start, end) = self.section;
            let bar_length = self.song.beat_duration() * self.config.metronome.beats_per_bar as f64;
            select_section(&self.song, start, end, bar_length)
        } else {
            self.song.clone()
        };

        let mut engine = PlaybackEngine::with_config(song, &self.config);
        engine.set_tempo_scale(self.engine.tempo_scale());
        engine.set_wait_mode(self.engine.wait_mode());
        engine.set_active_hand(self.engine.active_hand());
        engine.set_paused(self.engine.is_paused());

        self.tracker = HitTracker::with_windows(
            self.song.title.clone(),
            engine.song().notes_for_hand(engine.active_hand()),
            self.config.timing,
        );
        if engine.song().notes.is_empty() {
            warn!(section = ?self.section, "pass has no notes");
        }
        self.engine = engine;
        if let Some(metronome) = self.metronome.as_mut() {
            metronome.reset();
        }
        self.complete = false;
    }

    pub fn restart(&mut self) {
        debug!("restart requested");
        self.rebuild();
    }

    pub fn toggle_pause(&mut self) {
        self.engine.toggle_pause();
    }

    pub fn set_paused(&mut self, paused: bool) {
        self.engine.set_paused(paused);
    }

    pub fn toggle_wait_mode(&mut self) {
        let wait = !self.engine.wait_mode();
        self.engine.set_wait_mode(wait);
    }

    pub fn set_wait_mode(&mut self, wait_mode: bool) {
        self.engine.set_wait_mode(wait_mode);
    }

    pub fn set_tempo_scale(&mut self, scale: f64) {
        self.engine.set_tempo_scale(scale);
    }

    pub fn tempo_up(&mut self) {
        self.engine
            .set_tempo_scale(self.engine.tempo_scale() + self.config.tempo_step);
    }

    pub fn tempo_down(&mut self) {
        self.engine
            .set_tempo_scale(self.engine.tempo_scale() - self.config.tempo_step);
    }

    pub fn reset_tempo(&mut self) {
        self.engine.set_tempo_scale(1.0);
    }

    /// Change which hand is graded. Restarts the current pass.
    pub fn set_active_hand(&mut self, hand: Hand) {
        if hand == self.engine.active_hand() {
            return;
        }
        self.engine.set_active_hand(hand);
        self.rebuild();
    }

    /// Set the loop section in 1-indexed bars; bounds are normalized so that
    /// `1 <= start <= end`.
    pub fn set_loop_section(&mut self, start_bar: u32, end_bar: u32) {
        let start = start_bar.max(1);
        let end = end_bar.max(start);
        if (start, end) != (start_bar, end_bar) {
            debug!(start_bar, end_bar, start, end, "loop section normalized");
        }
        self.section = (start, end);
        if self.looping {
            self.rebuild();
        }
    }

    pub fn set_looping(&mut self, looping: bool) {
        if looping == self.looping {
            return;
        }
        self.looping = looping;
        if looping && self.config.progressive.enabled {
            let progressive = ProgressivePractice::new(self.config.progressive.clone());
            self.engine.set_tempo_scale(progressive.scale());
            self.progressive = Some(progressive);
        } else if !looping {
            self.progressive = None;
        }
        self.rebuild();
    }

    pub fn toggle_loop(&mut self) {
        self.set_looping(!self.looping);
    }

    /// Statistics over every note resolved so far, across all passes.
    pub fn stats(&self) -> SessionStats {
        let mut results = self.past_results.clone();
        results.extend_from_slice(self.tracker.results());
        SessionStats::from_results(self.song.title.clone(), &results)
    }

    /// End the session: silence audio, close inputs and store the final
    /// statistics. Saving happens once; later calls only return the stats.
    pub fn finish(&mut self) -> Result<SessionStats> {
        let stats = self.stats();
        if let Some(audio) = self.audio.as_mut() {
            audio.all_notes_off();
        }
        self.plugins.close_inputs();
        self.complete = true;

        if !self.saved {
            if let Some(store) = self.store.as_mut() {
                store.save_session(&stats)?;
            }
            self.saved = true;
            info!(
                song = %stats.song_title,
                total = stats.total_notes,
                accuracy = stats.accuracy_pct,
                "session finished"
            );
        }
        Ok(stats)
    }

    pub fn song(&self) -> &Song {
        &self.song
    }

    pub fn engine(&self) -> &PlaybackEngine {
        &self.engine
    }

    pub fn tracker(&self) -> &HitTracker {
        &self.tracker
    }

    pub fn pressed(&self) -> &HashSet<u8> {
        &self.pressed
    }

    pub fn plugins(&self) -> &PluginRegistry {
        &self.plugins
    }

    pub fn store(&self) -> Option<&dyn ProgressStore> {
        self.store.as_deref()
    }

    pub fn is_looping(&self) -> bool {
        self.looping
    }

    pub fn loop_section(&self) -> (u32, u32) {
        self.section
    }

    pub fn loop_count(&self) -> usize {
        self.loop_accuracies.len()
    }

    pub fn loop_accuracies(&self) -> &[f64] {
        &self.loop_accuracies
    }

    pub fn is_complete(&self) -> bool {
        self.complete
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scoring::HitGrade;
    use crate::session::io::{AudioCommand, AudioCommandLog, LiveNoteEvent, QueuedInput};
    use crate::session::plugins::ComboScorer;

    fn session_with_input(song: Song, config: EngineConfig) -> (PracticeSession, QueuedInput) {
        let input = QueuedInput::new("keys");
        let mut session = PracticeSession::new(song, config);
        session.add_input(Box::new(input.clone())).unwrap();
        (session, input)
    }

    fn press(input: &QueuedInput, pitch: u8) {
        input.push(LiveNoteEvent::note_on(pitch, 90, 0.0));
    }

    fn release(input: &QueuedInput, pitch: u8) {
        input.push(LiveNoteEvent::note_off(pitch, 0.0));
    }

    #[test]
    fn test_free_mode_hit_and_miss() {
        let song = Song::from_notes(
            "two",
            vec![NoteEvent::new(60, 1.0, 0.5), NoteEvent::new(62, 2.0, 0.5)],
        );
        let (mut session, input) = session_with_input(song, EngineConfig::default());

        session.tick(0.5);
        session.tick(0.5);
        press(&input, 60);
        let report = session.tick(0.02);
        assert_eq!(report.results.len(), 1);
        assert_eq!(report.results[0].grade, HitGrade::Perfect);

        // Never play 62; it ages out after the window
        let mut finished = false;
        for _ in 0..20 {
            let report = session.tick(0.1);
            finished |= report.finished;
        }
        assert!(finished);
        let stats = session.stats();
        assert_eq!(stats.total_notes, 2);
        assert_eq!(stats.perfect, 1);
        assert_eq!(stats.missed, 1);
        assert_eq!(stats.accuracy_pct, 50.0);
    }

    #[test]
    fn test_wait_mode_gate_and_grading() {
        let song = Song::from_notes(
            "chord",
            vec![
                NoteEvent::new(60, 1.0, 0.5),
                NoteEvent::new(64, 1.0, 0.5),
                NoteEvent::new(67, 1.0, 0.5),
            ],
        );
        let (mut session, input) = session_with_input(song, EngineConfig::default());
        session.set_wait_mode(true);

        press(&input, 60);
        press(&input, 64);
        let report = session.tick(0.016);
        assert!(report.newly_due.is_empty());
        assert_eq!(report.results.len(), 2);

        press(&input, 67);
        let report = session.tick(0.016);
        assert_eq!(report.newly_due.len(), 3);
        assert!(report.finished);
        let stats = session.stats();
        assert_eq!(stats.perfect, 3);
        assert_eq!(stats.accuracy_pct, 100.0);
    }

    #[test]
    fn test_released_keys_leave_pressed_set() {
        let (mut session, input) =
            session_with_input(Song::from_notes("s", vec![NoteEvent::new(60, 5.0, 1.0)]), EngineConfig::default());
        press(&input, 60);
        press(&input, 64);
        release(&input, 60);
        session.tick(0.01);
        let pressed: Vec<u8> = session.pressed().iter().copied().collect();
        assert_eq!(pressed, vec![64]);
    }

    #[test]
    fn test_inactive_hand_is_auto_played() {
        let song = Song::from_notes(
            "hands",
            vec![
                NoteEvent::new(48, 0.1, 0.5).with_hand(Hand::Left),
                NoteEvent::new(72, 0.1, 0.5).with_hand(Hand::Right),
            ],
        );
        let log = AudioCommandLog::new();
        let mut session =
            PracticeSession::new(song, EngineConfig::default()).with_audio(Box::new(log.clone()));
        session.set_active_hand(Hand::Right);
        assert_eq!(session.tracker().expected_len(), 1);

        session.tick(0.2);
        let commands = log.drain();
        assert_eq!(commands, vec![AudioCommand::NoteOn { pitch: 48, velocity: 80 }]);
    }

    #[test]
    fn test_loop_section_normalized() {
        let mut session = PracticeSession::new(Song::empty("e"), EngineConfig::default());
        session.set_loop_section(0, 0);
        assert_eq!(session.loop_section(), (1, 1));
        session.set_loop_section(5, 2);
        assert_eq!(session.loop_section(), (5, 5));
    }

    #[test]
    fn test_loop_restarts_with_progressive_tempo() {
        // 120 bpm, 4/4: bar 1 is [0, 2) seconds
        let song = Song::from_notes(
            "loop",
            vec![NoteEvent::new(60, 0.5, 0.25), NoteEvent::new(62, 2.5, 0.25)],
        );
        let mut config = EngineConfig::default();
        config.progressive.enabled = true;
        let (mut session, input) = session_with_input(song, config);
        session.set_loop_section(1, 1);
        session.set_looping(true);
        assert_eq!(session.engine().song().notes.len(), 1);
        assert_eq!(session.engine().tempo_scale(), 0.7);

        let mut restarted = false;
        for i in 0..40 {
            if i == 7 {
                press(&input, 60);
            }
            let report = session.tick(0.1);
            assert!(!report.finished);
            if report.loop_restarted {
                restarted = true;
                break;
            }
        }
        assert!(restarted);
        assert_eq!(session.loop_count(), 1);
        assert_eq!(session.loop_accuracies(), &[100.0]);
        assert!(session.engine().tempo_scale() > 0.7);
        assert_eq!(session.engine().position(), 0.0);
    }

    #[test]
    fn test_empty_loop_section_finishes() {
        let song = Song::from_notes("short", vec![NoteEvent::new(60, 0.5, 0.25)]);
        let mut config = EngineConfig::default();
        config.progressive.enabled = true;
        let mut session = PracticeSession::new(song, config);
        session.set_loop_section(9, 9);
        session.set_looping(true);
        assert!(session.engine().song().notes.is_empty());

        let first = session.tick(0.016);
        assert!(first.finished);
        assert!(!first.loop_restarted);
        for _ in 0..9 {
            assert!(session.tick(0.016).finished);
        }
        assert_eq!(session.loop_count(), 0);
        assert!(session.loop_accuracies().is_empty());
        assert_eq!(session.engine().tempo_scale(), 0.7);
    }

    #[test]
    fn test_loop_without_graded_notes_records_nothing() {
        let song = Song::from_notes(
            "accompaniment",
            vec![NoteEvent::new(48, 0.5, 0.25).with_hand(Hand::Left)],
        );
        let mut config = EngineConfig::default();
        config.progressive.enabled = true;
        let mut session = PracticeSession::new(song, config);
        session.set_active_hand(Hand::Right);
        session.set_loop_section(1, 1);
        session.set_looping(true);
        assert_eq!(session.tracker().expected_len(), 0);

        let mut restarted = false;
        for _ in 0..10 {
            restarted |= session.tick(0.1).loop_restarted;
        }
        assert!(restarted);
        assert!(session.loop_accuracies().is_empty());
        assert_eq!(session.engine().tempo_scale(), 0.7);
    }

    #[test]
    fn test_presses_while_paused_reach_scoring() {
        let song = Song::from_notes("s", vec![NoteEvent::new(60, 1.0, 0.5)]);
        let (mut session, input) = session_with_input(song, EngineConfig::default());
        session
            .register_plugin(Plugin::Scoring(Box::new(ComboScorer::new())))
            .unwrap();

        session.tick(1.0);
        session.set_paused(true);
        press(&input, 60);
        let report = session.tick(0.016);
        assert_eq!(report.results.len(), 1);
        assert_eq!(report.results[0].grade, HitGrade::Perfect);
        assert_eq!(session.stats().perfect, 1);
        assert_eq!(session.plugins().scores(), vec![("combo".to_string(), 300)]);
    }

    #[test]
    fn test_tempo_controls() {
        let mut session = PracticeSession::new(Song::empty("e"), EngineConfig::default());
        session.tempo_down();
        assert!((session.engine().tempo_scale() - 0.95).abs() < 1e-9);
        session.set_tempo_scale(9.0);
        assert_eq!(session.engine().tempo_scale(), 2.0);
        session.reset_tempo();
        assert_eq!(session.engine().tempo_scale(), 1.0);
    }

    #[test]
    fn test_paused_session_does_not_advance() {
        let song = Song::from_notes("s", vec![NoteEvent::new(60, 0.1, 0.5)]);
        let mut session = PracticeSession::new(song, EngineConfig::default());
        session.toggle_pause();
        for _ in 0..10 {
            let report = session.tick(0.5);
            assert!(report.newly_due.is_empty());
            assert!(report.results.is_empty());
        }
        assert_eq!(session.engine().position(), 0.0);
    }

    #[test]
    fn test_metronome_clicks_reach_audio() {
        let mut config = EngineConfig::default();
        config.metronome.enabled = true;
        let log = AudioCommandLog::new();
        let song = Song::from_notes("s", vec![NoteEvent::new(60, 10.0, 0.5)]);
        let mut session = PracticeSession::new(song, config).with_audio(Box::new(log.clone()));

        let report = session.tick(1.1);
        assert_eq!(report.clicks.len(), 2);
        let clicks = log
            .drain()
            .into_iter()
            .filter(|c| matches!(c, AudioCommand::Click { .. }))
            .count();
        assert_eq!(clicks, 2);
    }
}
