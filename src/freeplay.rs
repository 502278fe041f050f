use std::collections::{BTreeMap, BTreeSet};

use tracing::{debug, info};

use crate::score::{NoteEvent, Song};
use crate::session::io::LiveNoteEvent;

const NOTE_NAMES: [&str; 12] = [
    "C", "C#", "D", "D#", "E", "F", "F#", "G", "G#", "A", "A#", "B",
];

/// Interval sets above the root, with the suffix appended to the root name.
const CHORD_TEMPLATES: [(&[u8], &str); 11] = [
    (&[0, 4, 7], ""),
    (&[0, 3, 7], "m"),
    (&[0, 3, 6], "dim"),
    (&[0, 4, 8], "aug"),
    (&[0, 4, 7, 10], "7"),
    (&[0, 4, 7, 11], "maj7"),
    (&[0, 3, 7, 10], "m7"),
    (&[0, 3, 6, 10], "m7b5"),
    (&[0, 3, 6, 9], "dim7"),
    (&[0, 5, 7], "sus4"),
    (&[0, 2, 7], "sus2"),
];

const MIN_RECORDED_DURATION: f64 = 0.01;

/// Name the chord formed by a set of MIDI pitches, e.g. "C", "Am7", "Gsus4".
///
/// Every root and template is tried; a template must be fully present and
/// the best one maximizes matched minus unmatched pitch classes. Earlier
/// roots and templates win ties.
pub fn detect_chord<I>(pitches: I) -> Option<String>
where
    I: IntoIterator<Item = u8>,
{
    let pitch_classes: BTreeSet<u8> = pitches.into_iter().map(|p| p % 12).collect();
    if pitch_classes.len() < 2 {
        return None;
    }

    let mut best: Option<String> = None;
    let mut best_score = 0i32;

    for root in 0..12u8 {
        let intervals: BTreeSet<u8> = pitch_classes.iter().map(|pc| (pc + 12 - root) % 12).collect();
        for (template, suffix) in CHORD_TEMPLATES {
            let matched = template.iter().filter(|&&i| intervals.contains(&i)).count();
            let unmatched = intervals.len() - matched;
            let score = matched as i32 - unmatched as i32;
            if matched >= template.len() && score > best_score {
                best_score = score;
                best = Some(format!("{}{}", NOTE_NAMES[root as usize], suffix));
            }
        }
    }
    best
}

/// Ungraded playing: tracks held keys, names the current chord and can
/// record what is played into a new song. Timestamps come from the caller.
#[derive(Clone, Debug, Default)]
pub struct FreePlay {
    pressed: BTreeSet<u8>,
    chord: Option<String>,
    recording: bool,
    record_start: f64,
    held: BTreeMap<u8, (f64, u8)>,
    recorded: Vec<NoteEvent>,
}

impl FreePlay {
    pub fn new() -> Self {
        FreePlay::default()
    }

    pub fn handle(&mut self, event: &LiveNoteEvent) {
        if event.is_note_on {
            self.note_on(event.pitch, event.velocity, event.timestamp);
        } else {
            self.note_off(event.pitch, event.timestamp);
        }
    }

    pub fn note_on(&mut self, pitch: u8, velocity: u8, timestamp: f64) {
        self.pressed.insert(pitch);
        self.chord = detect_chord(self.pressed.iter().copied());
        if self.recording {
            self.held
                .insert(pitch, ((timestamp - self.record_start).max(0.0), velocity));
        }
    }

    pub fn note_off(&mut self, pitch: u8, timestamp: f64) {
        self.pressed.remove(&pitch);
        self.chord = detect_chord(self.pressed.iter().copied());
        if self.recording {
            if let Some((start, velocity)) = self.held.remove(&pitch) {
                let elapsed = timestamp - self.record_start;
                self.recorded.push(recorded_note(pitch, start, elapsed, velocity));
            }
        }
    }

    pub fn active_chord(&self) -> Option<&str> {
        self.chord.as_deref()
    }

    pub fn pressed(&self) -> impl Iterator<Item = u8> + '_ {
        self.pressed.iter().copied()
    }

    pub fn start_recording(&mut self, timestamp: f64) {
        info!(timestamp, "recording started");
        self.recording = true;
        self.record_start = timestamp;
        self.held.clear();
        self.recorded.clear();
    }

    /// Stop recording and return the take as a song titled "Recording".
    /// Keys still held are closed at `timestamp`.
    pub fn stop_recording(&mut self, timestamp: f64) -> Song {
        self.recording = false;
        let elapsed = timestamp - self.record_start;
        for (pitch, (start, velocity)) in std::mem::take(&mut self.held) {
            self.recorded.push(recorded_note(pitch, start, elapsed, velocity));
        }
        let notes = std::mem::take(&mut self.recorded);
        debug!(notes = notes.len(), "recording stopped");
        Song::from_notes("Recording", notes)
    }

    pub fn is_recording(&self) -> bool {
        self.recording
    }
}

fn recorded_note(pitch: u8, start: f64, elapsed: f64, velocity: u8) -> NoteEvent {
    NoteEvent::new(pitch, start, (elapsed - start).max(MIN_RECORDED_DURATION)).with_velocity(velocity)
}
