use serde::{Deserialize, Serialize};

use crate::score::NoteEvent;

/// Ordered best to worst. `Miss` also covers wrong pitch and unplayed notes.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum HitGrade {
    Perfect,
    Good,
    Ok,
    Miss,
}

impl HitGrade {
    pub fn is_hit(self) -> bool {
        self != HitGrade::Miss
    }
}

// Performance tracking types

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct HitResult {
    pub expected: NoteEvent,
    /// `None` when the note was never attempted.
    pub played_pitch: Option<u8>,
    pub grade: HitGrade,
    /// Negative = early, positive = late.
    pub timing_offset_ms: f64,
}

impl HitResult {
    pub fn unplayed(expected: NoteEvent) -> Self {
        HitResult {
            expected,
            played_pitch: None,
            grade: HitGrade::Miss,
            timing_offset_ms: 0.0,
        }
    }

    /// A graded attempt, as opposed to an aged-out note.
    pub fn was_played_hit(&self) -> bool {
        self.grade.is_hit() && self.played_pitch.is_some()
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
pub struct SessionStats {
    pub song_title: String,
    pub total_notes: u32,
    pub perfect: u32,
    pub good: u32,
    pub ok: u32,
    pub missed: u32,
    pub max_streak: u32,
    pub accuracy_pct: f64,
}

impl SessionStats {
    pub fn new(song_title: impl Into<String>) -> Self {
        SessionStats {
            song_title: song_title.into(),
            ..SessionStats::default()
        }
    }

    /// Aggregate a result log. Every resolved note counts toward the total.
    pub fn from_results(song_title: impl Into<String>, results: &[HitResult]) -> Self {
        let mut stats = SessionStats::new(song_title);
        let mut streak = 0;
        for r in results {
            stats.count(r.grade);
            if r.grade.is_hit() {
                streak += 1;
                stats.max_streak = stats.max_streak.max(streak);
            } else {
                streak = 0;
            }
        }
        stats.update_accuracy();
        stats
    }

    fn count(&mut self, grade: HitGrade) {
        match grade {
            HitGrade::Perfect => self.perfect += 1,
            HitGrade::Good => self.good += 1,
            HitGrade::Ok => self.ok += 1,
            HitGrade::Miss => self.missed += 1,
        }
    }

    pub fn hits(&self) -> u32 {
        self.perfect + self.good + self.ok
    }

    fn update_accuracy(&mut self) {
        let hit = self.hits();
        self.total_notes = hit + self.missed;
        self.accuracy_pct = if self.total_notes > 0 {
            let pct = hit as f64 / self.total_notes as f64 * 100.0;
            (pct * 10.0).round() / 10.0
        } else {
            0.0
        };
    }
}
