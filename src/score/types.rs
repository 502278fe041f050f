use serde::{Deserialize, Serialize};

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "lowercase")]
pub enum Hand {
    Left,
    Right,
    #[default]
    Both,
}

impl Hand {
    pub fn parse(s: &str) -> Option<Hand> {
        match s.trim().to_ascii_lowercase().as_str() {
            "left" | "lh" | "l" => Some(Hand::Left),
            "right" | "rh" | "r" => Some(Hand::Right),
            "both" | "b" => Some(Hand::Both),
            _ => None,
        }
    }

    /// Whether a note tagged `note_hand` must be played when this hand is active.
    pub fn plays(self, note_hand: Hand) -> bool {
        self == Hand::Both || note_hand == self
    }
}

/// One note of a score. Times are in seconds from the start of the song.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq)]
pub struct NoteEvent {
    pub pitch: u8,
    pub start_time: f64,
    pub duration: f64,
    #[serde(default = "default_velocity")]
    pub velocity: u8,
    #[serde(default)]
    pub hand: Hand,
    #[serde(default)]
    pub track: u32,
}

fn default_velocity() -> u8 {
    80
}

impl NoteEvent {
    pub fn new(pitch: u8, start_time: f64, duration: f64) -> Self {
        NoteEvent {
            pitch,
            start_time,
            duration,
            velocity: default_velocity(),
            hand: Hand::Both,
            track: 0,
        }
    }

    pub fn with_hand(mut self, hand: Hand) -> Self {
        self.hand = hand;
        self
    }

    pub fn with_velocity(mut self, velocity: u8) -> Self {
        self.velocity = velocity;
        self
    }

    pub fn end_time(&self) -> f64 {
        self.start_time + self.duration
    }
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq)]
pub struct TempoChange {
    pub time: f64,
    pub bpm: f64,
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq)]
pub struct TimeSignature {
    pub time: f64,
    pub numerator: u8,
    pub denominator: u8,
}

/// A loaded score. Notes are kept sorted by `start_time`; `duration` is the
/// latest note end. Derived songs are new values, never edits of the source.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Song {
    pub title: String,
    pub notes: Vec<NoteEvent>,
    #[serde(default)]
    pub tempo_changes: Vec<TempoChange>,
    #[serde(default)]
    pub time_signatures: Vec<TimeSignature>,
    #[serde(default = "default_ticks_per_beat")]
    pub ticks_per_beat: u32,
    #[serde(default)]
    pub duration: f64,
}

fn default_ticks_per_beat() -> u32 {
    480
}

pub const DEFAULT_BPM: f64 = 120.0;

impl Song {
    pub fn new(
        title: impl Into<String>,
        mut notes: Vec<NoteEvent>,
        mut tempo_changes: Vec<TempoChange>,
        mut time_signatures: Vec<TimeSignature>,
    ) -> Self {
        notes.sort_by(|a, b| a.start_time.total_cmp(&b.start_time));
        tempo_changes.sort_by(|a, b| a.time.total_cmp(&b.time));
        time_signatures.sort_by(|a, b| a.time.total_cmp(&b.time));
        let duration = end_of(&notes);
        Song {
            title: title.into(),
            notes,
            tempo_changes,
            time_signatures,
            ticks_per_beat: default_ticks_per_beat(),
            duration,
        }
    }

    pub fn from_notes(title: impl Into<String>, notes: Vec<NoteEvent>) -> Self {
        Song::new(title, notes, Vec::new(), Vec::new())
    }

    pub fn empty(title: impl Into<String>) -> Self {
        Song::from_notes(title, Vec::new())
    }

    /// A new song sharing this song's metadata, with `notes` as its content.
    pub fn derive(&self, title: impl Into<String>, notes: Vec<NoteEvent>) -> Song {
        let mut song = Song::new(
            title,
            notes,
            self.tempo_changes.clone(),
            self.time_signatures.clone(),
        );
        song.ticks_per_beat = self.ticks_per_beat;
        song
    }

    /// Re-establish the ordering and duration invariants, e.g. after deserializing.
    pub fn normalize(mut self) -> Self {
        self.notes.sort_by(|a, b| a.start_time.total_cmp(&b.start_time));
        self.tempo_changes.sort_by(|a, b| a.time.total_cmp(&b.time));
        self.duration = end_of(&self.notes);
        self
    }

    pub fn initial_bpm(&self) -> f64 {
        self.tempo_changes
            .first()
            .map(|t| t.bpm)
            .filter(|bpm| bpm.is_finite() && *bpm > 0.0)
            .unwrap_or(DEFAULT_BPM)
    }

    pub fn beat_duration(&self) -> f64 {
        60.0 / self.initial_bpm()
    }

    pub fn notes_for_hand(&self, hand: Hand) -> Vec<NoteEvent> {
        self.notes
            .iter()
            .filter(|n| hand.plays(n.hand))
            .copied()
            .collect()
    }

    /// Number of bars spanned, counting a partial trailing bar.
    pub fn total_bars(&self, beats_per_bar: u32) -> usize {
        let bar = self.beat_duration() * beats_per_bar.max(1) as f64;
        (self.duration / bar) as usize + 1
    }

    pub fn is_sorted(&self) -> bool {
        self.notes
            .windows(2)
            .all(|w| w[0].start_time <= w[1].start_time)
    }
}

fn end_of(notes: &[NoteEvent]) -> f64 {
    notes.iter().map(NoteEvent::end_time).fold(0.0_f64, f64::max)
}
