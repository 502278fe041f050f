use std::collections::HashSet;

use tracing::{debug, warn};

use crate::config::{EngineConfig, CHORD_TOLERANCE_S};
use crate::score::{Hand, NoteEvent, Song};

/// Drives song playback, advancing in real time or gated on correct input.
///
/// In free mode the position moves with wall-clock time scaled by the tempo.
/// In wait mode the next chord (notes within the chord tolerance of each
/// other) blocks until every required key of it is held at once.
#[derive(Clone, Debug)]
pub struct PlaybackEngine {
    song: Song,
    position: f64,
    note_index: usize,
    wait_mode: bool,
    tempo_scale: f64,
    paused: bool,
    active_hand: Hand,
    chord_tolerance: f64,
    tempo_min: f64,
    tempo_max: f64,
}

impl PlaybackEngine {
    pub fn new(song: Song) -> Self {
        PlaybackEngine::with_config(song, &EngineConfig::default())
    }

    pub fn with_config(song: Song, config: &EngineConfig) -> Self {
        let (tempo_min, tempo_max) = config.tempo_bounds();
        let chord_tolerance = if config.chord_tolerance_s.is_finite() {
            config.chord_tolerance_s.max(0.0)
        } else {
            CHORD_TOLERANCE_S
        };
        PlaybackEngine {
            song,
            position: 0.0,
            note_index: 0,
            wait_mode: false,
            tempo_scale: 1.0f64.clamp(tempo_min, tempo_max),
            paused: false,
            active_hand: Hand::Both,
            chord_tolerance,
            tempo_min,
            tempo_max,
        }
    }

    /// Set tempo scale, clamped to the configured range ([0.25, 2.0] by default).
    pub fn set_tempo_scale(&mut self, scale: f64) {
        let clamped = if scale.is_nan() {
            1.0f64.clamp(self.tempo_min, self.tempo_max)
        } else {
            scale.clamp(self.tempo_min, self.tempo_max)
        };
        if clamped != scale {
            debug!(requested = scale, clamped, "tempo scale clamped");
        }
        self.tempo_scale = clamped;
    }

    /// Advance playback by `dt` seconds. Returns the notes that became due.
    pub fn update(&mut self, dt: f64, pressed_pitches: &HashSet<u8>) -> Vec<NoteEvent> {
        if self.paused {
            return Vec::new();
        }

        if self.wait_mode {
            self.advance_wait_mode(pressed_pitches)
        } else {
            if dt.is_finite() && dt > 0.0 {
                self.position += dt * self.tempo_scale;
            } else if dt != 0.0 {
                warn!(dt, "ignoring invalid frame delta");
            }
            self.collect_active_notes()
        }
    }

    fn advance_wait_mode(&mut self, pressed_pitches: &HashSet<u8>) -> Vec<NoteEvent> {
        let upcoming = self.simultaneous_notes();
        if upcoming.is_empty() {
            return Vec::new();
        }

        let required: HashSet<u8> = upcoming
            .iter()
            .filter(|n| self.active_hand.plays(n.hand))
            .map(|n| n.pitch)
            .collect();

        // A group with nothing for the active hand to play passes straight through.
        if !required.is_subset(pressed_pitches) {
            return Vec::new();
        }

        self.note_index += upcoming.len();
        if let Some(last) = upcoming.last() {
            self.position = self.position.max(last.end_time());
        }
        debug!(
            notes = upcoming.len(),
            auto = required.is_empty(),
            position = self.position,
            "wait gate cleared"
        );
        upcoming
    }

    fn collect_active_notes(&mut self) -> Vec<NoteEvent> {
        let mut active = Vec::new();
        while let Some(note) = self.song.notes.get(self.note_index) {
            if note.start_time > self.position {
                break;
            }
            active.push(*note);
            self.note_index += 1;
        }
        active
    }

    /// The notes starting within the chord tolerance of the next note.
    pub fn simultaneous_notes(&self) -> Vec<NoteEvent> {
        let Some(first) = self.song.notes.get(self.note_index) else {
            return Vec::new();
        };
        self.song.notes[self.note_index..]
            .iter()
            .take_while(|n| (n.start_time - first.start_time).abs() <= self.chord_tolerance)
            .copied()
            .collect()
    }

    /// Start time of the next note that has not become due.
    pub fn next_note_time(&self) -> Option<f64> {
        self.song.notes.get(self.note_index).map(|n| n.start_time)
    }

    /// Rewind to the start of the song for a new pass.
    pub fn restart(&mut self) {
        self.position = 0.0;
        self.note_index = 0;
    }

    pub fn finished(&self) -> bool {
        self.note_index >= self.song.notes.len()
    }

    pub fn song(&self) -> &Song {
        &self.song
    }

    pub fn position(&self) -> f64 {
        self.position
    }

    pub fn note_index(&self) -> usize {
        self.note_index
    }

    pub fn tempo_scale(&self) -> f64 {
        self.tempo_scale
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    pub fn set_paused(&mut self, paused: bool) {
        self.paused = paused;
    }

    pub fn toggle_pause(&mut self) {
        self.paused = !self.paused;
    }

    pub fn wait_mode(&self) -> bool {
        self.wait_mode
    }

    pub fn set_wait_mode(&mut self, wait_mode: bool) {
        self.wait_mode = wait_mode;
    }

    pub fn active_hand(&self) -> Hand {
        self.active_hand
    }

    pub fn set_active_hand(&mut self, hand: Hand) {
        self.active_hand = hand;
    }
}
