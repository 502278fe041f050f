use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::score::{Hand, Song};

/// Per-dimension difficulty, each in [0, 1].
#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq)]
pub struct DifficultyFactors {
    pub note_density: f64,
    pub pitch_range: f64,
    pub hand_independence: f64,
    pub interval_complexity: f64,
    pub rhythmic_complexity: f64,
    pub tempo: f64,
    pub key_complexity: f64,
    pub chord_density: f64,
}

impl DifficultyFactors {
    pub fn compute(song: &Song) -> Self {
        DifficultyFactors {
            note_density: note_density_score(song),
            pitch_range: pitch_range_score(song),
            hand_independence: hand_independence_score(song),
            interval_complexity: interval_complexity_score(song),
            rhythmic_complexity: rhythmic_complexity_score(song),
            tempo: tempo_score(song),
            key_complexity: key_complexity_score(song),
            chord_density: chord_density_score(song),
        }
    }

    pub fn named(&self) -> [(&'static str, f64); 8] {
        [
            ("note_density", self.note_density),
            ("pitch_range", self.pitch_range),
            ("hand_independence", self.hand_independence),
            ("interval_complexity", self.interval_complexity),
            ("rhythmic_complexity", self.rhythmic_complexity),
            ("tempo", self.tempo),
            ("key_complexity", self.key_complexity),
            ("chord_density", self.chord_density),
        ]
    }

    pub fn weighted_sum(&self) -> f64 {
        self.note_density * 0.20
            + self.pitch_range * 0.08
            + self.hand_independence * 0.18
            + self.interval_complexity * 0.12
            + self.rhythmic_complexity * 0.15
            + self.tempo * 0.10
            + self.key_complexity * 0.07
            + self.chord_density * 0.10
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct DifficultyReport {
    /// 1 to 18, aligned with conservatory grade scales.
    pub overall_level: u8,
    pub overall_label: String,
    pub factors: DifficultyFactors,
    /// 1-indexed, hardest first.
    pub hardest_bars: Vec<usize>,
    pub description: String,
}

pub fn label_for_level(level: u8) -> &'static str {
    match level {
        0..=3 => "Beginner",
        4..=6 => "Early Intermediate",
        7..=9 => "Intermediate",
        10..=12 => "Late Intermediate",
        13..=15 => "Advanced",
        _ => "Expert",
    }
}

/// Estimate how hard a song is to sight-read.
pub fn estimate(song: &Song) -> DifficultyReport {
    let factors = DifficultyFactors::compute(song);

    let level = ((factors.weighted_sum() * 17.0).round_ties_even() as i64 + 1).clamp(1, 18) as u8;
    let label = label_for_level(level);
    let hardest_bars = find_hardest_bars(song, song.beat_duration(), 4);

    let mut ranked = factors.named();
    ranked.sort_by(|a, b| b.1.total_cmp(&a.1));
    let challenges: Vec<String> = ranked
        .iter()
        .take(3)
        .map(|(name, value)| format!("{} ({:.0}%)", name.replace('_', " "), value * 100.0))
        .collect();

    let mut description = format!(
        "Level {}/18 ({}). Primary challenges: {}.",
        level,
        label,
        challenges.join(", ")
    );
    if !hardest_bars.is_empty() {
        let bars: Vec<String> = hardest_bars.iter().map(|b| b.to_string()).collect();
        description.push_str(&format!(" Hardest bars: {}.", bars.join(", ")));
    }

    DifficultyReport {
        overall_level: level,
        overall_label: label.to_string(),
        factors,
        hardest_bars,
        description,
    }
}

/// Notes per second of the busier hand: 1 nps or less is 0, 8 nps or more is 1.
fn note_density_score(song: &Song) -> f64 {
    if song.notes.is_empty() || song.duration <= 0.0 {
        return 0.0;
    }
    let left = song
        .notes
        .iter()
        .filter(|n| matches!(n.hand, Hand::Left | Hand::Both))
        .count();
    let right = song
        .notes
        .iter()
        .filter(|n| matches!(n.hand, Hand::Right | Hand::Both))
        .count();
    let densest = left.max(right) as f64 / song.duration;
    ((densest - 1.0) / 7.0).clamp(0.0, 1.0)
}

/// Total span: one octave or less is 0, five octaves or more is 1.
fn pitch_range_score(song: &Song) -> f64 {
    let lowest = song.notes.iter().map(|n| n.pitch).min();
    let highest = song.notes.iter().map(|n| n.pitch).max();
    let (Some(lo), Some(hi)) = (lowest, highest) else {
        return 0.0;
    };
    (((hi - lo) as f64 - 12.0) / 48.0).clamp(0.0, 1.0)
}

/// How much both hands are active at once with comparable amounts of onsets.
fn hand_independence_score(song: &Song) -> f64 {
    let mut left: HashSet<i64> = HashSet::new();
    let mut right: HashSet<i64> = HashSet::new();
    // 50ms onset buckets
    for n in &song.notes {
        let bucket = (n.start_time / 0.05).round_ties_even() as i64;
        match n.hand {
            Hand::Left => {
                left.insert(bucket);
            }
            Hand::Right => {
                right.insert(bucket);
            }
            Hand::Both => {
                left.insert(bucket);
                right.insert(bucket);
            }
        }
    }
    if left.is_empty() || right.is_empty() {
        return 0.0;
    }

    let overlap = left.intersection(&right).count() as f64;
    let total = left.union(&right).count() as f64;
    let size_ratio = left.len().min(right.len()) as f64 / left.len().max(right.len()) as f64;
    (overlap / total * size_ratio * 2.0).min(1.0)
}

/// Share of consecutive same-hand intervals wider than an octave; 20% saturates.
fn interval_complexity_score(song: &Song) -> f64 {
    if song.notes.len() < 2 {
        return 0.0;
    }
    let mut left = Vec::new();
    let mut right = Vec::new();
    for n in &song.notes {
        match n.hand {
            Hand::Left => left.push(n.pitch),
            Hand::Right => right.push(n.pitch),
            Hand::Both => {
                left.push(n.pitch);
                right.push(n.pitch);
            }
        }
    }

    let mut leaps = 0usize;
    let mut intervals = 0usize;
    for pitches in [&left, &right] {
        for pair in pitches.windows(2) {
            intervals += 1;
            if pair[0].abs_diff(pair[1]) > 12 {
                leaps += 1;
            }
        }
    }
    if intervals == 0 {
        return 0.0;
    }
    (leaps as f64 / intervals as f64 * 5.0).min(1.0)
}

/// Half duration variety, half off-beat onsets.
fn rhythmic_complexity_score(song: &Song) -> f64 {
    if song.notes.is_empty() {
        return 0.0;
    }
    let durations: HashSet<i64> = song
        .notes
        .iter()
        .map(|n| (n.duration * 1000.0).round_ties_even() as i64)
        .collect();
    let variety = (durations.len() as f64 / 12.0).min(1.0);

    let beat = song.beat_duration();
    let offbeat = song
        .notes
        .iter()
        .filter(|n| {
            let phase = (n.start_time % beat) / beat;
            phase > 0.1 && (phase - 0.5).abs() > 0.1
        })
        .count();
    let syncopation = offbeat as f64 / song.notes.len() as f64;

    (variety * 0.5 + syncopation * 0.5).min(1.0)
}

/// 60 bpm or slower is 0, 180 bpm or faster is 1.
fn tempo_score(song: &Song) -> f64 {
    ((song.initial_bpm() - 60.0) / 120.0).clamp(0.0, 1.0)
}

/// Seven pitch classes (a diatonic key) is 0, all twelve is 1.
fn key_complexity_score(song: &Song) -> f64 {
    if song.notes.is_empty() {
        return 0.0;
    }
    let classes: HashSet<u8> = song.notes.iter().map(|n| n.pitch % 12).collect();
    ((classes.len() as f64 - 7.0) / 5.0).clamp(0.0, 1.0)
}

/// Mean notes per 10ms onset bucket: single notes 0, six-note chords 1.
fn chord_density_score(song: &Song) -> f64 {
    if song.notes.is_empty() {
        return 0.0;
    }
    let mut onsets: HashMap<i64, usize> = HashMap::new();
    for n in &song.notes {
        *onsets
            .entry((n.start_time / 0.01).round_ties_even() as i64)
            .or_insert(0) += 1;
    }
    let mean = song.notes.len() as f64 / onsets.len() as f64;
    ((mean - 1.0) / 5.0).clamp(0.0, 1.0)
}

/// Up to five bars ranked by local density and widest jump.
pub fn find_hardest_bars(song: &Song, beat_duration: f64, beats_per_bar: u32) -> Vec<usize> {
    if song.notes.is_empty() || !(beat_duration > 0.0) {
        return Vec::new();
    }
    let bar_duration = beat_duration * beats_per_bar as f64;
    let total_bars = (song.duration / bar_duration) as usize + 1;

    let mut scored: Vec<(f64, usize)> = Vec::new();
    for bar in 0..total_bars {
        let t_start = bar as f64 * bar_duration;
        let t_end = t_start + bar_duration;
        let pitches: Vec<u8> = song
            .notes
            .iter()
            .filter(|n| t_start <= n.start_time && n.start_time < t_end)
            .map(|n| n.pitch)
            .collect();
        if pitches.is_empty() {
            continue;
        }

        let density = pitches.len() as f64 / bar_duration;
        let max_jump = pitches
            .windows(2)
            .map(|w| w[0].abs_diff(w[1]))
            .max()
            .unwrap_or(0);
        let score = density * 0.7 + (max_jump as f64 / 24.0) * 0.3;
        scored.push((score, bar + 1));
    }

    scored.sort_by(|a, b| b.0.total_cmp(&a.0).then(b.1.cmp(&a.1)));
    scored.into_iter().take(5).map(|(_, bar)| bar).collect()
}
