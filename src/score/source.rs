use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::{info, warn};

use crate::error::LoadError;
use crate::score::types::{Hand, NoteEvent, Song, TempoChange, TimeSignature};

/// Produces a validated `Song` from a score file.
pub trait ScoreSource {
    fn load(&self, path: &Path) -> Result<Song, LoadError>;
}

/// How notes without an explicit hand are assigned one.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum HandSplitStrategy {
    /// Even tracks are the right hand, odd tracks the left.
    #[default]
    ByTrack,
    /// Split at middle C: 60 and above is the right hand.
    ByPitch,
    /// Even channels are the right hand, odd channels the left.
    ByChannel,
}

impl HandSplitStrategy {
    pub fn assign(self, pitch: u8, track: u32, channel: u8) -> Hand {
        match self {
            HandSplitStrategy::ByPitch => {
                if pitch >= 60 {
                    Hand::Right
                } else {
                    Hand::Left
                }
            }
            HandSplitStrategy::ByChannel => {
                if channel % 2 == 1 {
                    Hand::Left
                } else {
                    Hand::Right
                }
            }
            HandSplitStrategy::ByTrack => {
                if track % 2 == 1 {
                    Hand::Left
                } else {
                    Hand::Right
                }
            }
        }
    }
}

#[derive(Deserialize, Debug)]
struct SongDocument {
    title: Option<String>,
    #[serde(default)]
    notes: Vec<NoteDocument>,
    #[serde(default)]
    tempo_changes: Vec<TempoChange>,
    #[serde(default)]
    time_signatures: Vec<TimeSignature>,
    ticks_per_beat: Option<u32>,
}

// Numeric fields are wide so out-of-range values are reported, not truncated.
#[derive(Deserialize, Debug)]
struct NoteDocument {
    pitch: i64,
    start_time: f64,
    duration: f64,
    velocity: Option<i64>,
    hand: Option<Hand>,
    #[serde(default)]
    track: u32,
    #[serde(default)]
    channel: u8,
}

/// Loads `.json` song documents.
#[derive(Clone, Debug, Default)]
pub struct JsonScoreSource {
    pub hand_split: HandSplitStrategy,
}

impl JsonScoreSource {
    pub fn new(hand_split: HandSplitStrategy) -> Self {
        JsonScoreSource { hand_split }
    }

    /// Parse a document already in memory. `origin` is only used for errors
    /// and as the fallback title.
    pub fn parse_str(&self, json: &str, origin: &Path) -> Result<Song, LoadError> {
        let doc: SongDocument =
            serde_json::from_str(json).map_err(|e| LoadError::Malformed {
                path: origin.to_path_buf(),
                reason: e.to_string(),
            })?;

        let mut notes = Vec::with_capacity(doc.notes.len());
        for (index, n) in doc.notes.iter().enumerate() {
            notes.push(self.validate_note(n, index, origin)?);
        }

        for t in &doc.tempo_changes {
            if !(t.bpm.is_finite() && t.bpm > 0.0) {
                return Err(LoadError::Malformed {
                    path: origin.to_path_buf(),
                    reason: format!("invalid tempo {} bpm at {}s", t.bpm, t.time),
                });
            }
        }

        let title = doc.title.unwrap_or_else(|| {
            origin
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_else(|| "Untitled".to_string())
        });

        let mut song = Song::new(title, notes, doc.tempo_changes, doc.time_signatures);
        if let Some(tpb) = doc.ticks_per_beat {
            song.ticks_per_beat = tpb;
        }
        Ok(song)
    }

    fn validate_note(
        &self,
        n: &NoteDocument,
        index: usize,
        origin: &Path,
    ) -> Result<NoteEvent, LoadError> {
        let invalid = |reason: String| LoadError::InvalidNote {
            path: origin.to_path_buf(),
            index,
            reason,
        };

        if !(0..=127).contains(&n.pitch) {
            return Err(invalid(format!("pitch {} outside 0-127", n.pitch)));
        }
        if !(n.start_time.is_finite() && n.start_time >= 0.0) {
            return Err(invalid(format!("start_time {} must be >= 0", n.start_time)));
        }
        if !(n.duration.is_finite() && n.duration > 0.0) {
            return Err(invalid(format!("duration {} must be > 0", n.duration)));
        }
        let velocity = n.velocity.unwrap_or(80);
        if !(0..=127).contains(&velocity) {
            return Err(invalid(format!("velocity {} outside 0-127", velocity)));
        }

        let pitch = n.pitch as u8;
        let hand = n
            .hand
            .unwrap_or_else(|| self.hand_split.assign(pitch, n.track, n.channel));

        Ok(NoteEvent {
            pitch,
            start_time: n.start_time,
            duration: n.duration,
            velocity: velocity as u8,
            hand,
            track: n.track,
        })
    }
}

impl ScoreSource for JsonScoreSource {
    fn load(&self, path: &Path) -> Result<Song, LoadError> {
        let extension = path
            .extension()
            .map(|e| e.to_string_lossy().to_ascii_lowercase())
            .unwrap_or_default();
        if extension != "json" {
            warn!(path = %path.display(), %extension, "unsupported score format");
            return Err(LoadError::UnsupportedFormat {
                path: PathBuf::from(path),
                extension,
            });
        }

        let json = std::fs::read_to_string(path).map_err(|source| LoadError::Io {
            path: PathBuf::from(path),
            source,
        })?;
        let song = self.parse_str(&json, path).map_err(|e| {
            warn!(error = %e, "score failed to load");
            e
        })?;
        info!(title = %song.title, notes = song.notes.len(), "score loaded");
        Ok(song)
    }
}
