use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::Result;

pub const PERFECT_WINDOW_MS: f64 = 50.0;
pub const GOOD_WINDOW_MS: f64 = 100.0;
pub const OK_WINDOW_MS: f64 = 200.0;

/// Notes starting within this many seconds of each other form one chord gate.
pub const CHORD_TOLERANCE_S: f64 = 0.05;

pub const TEMPO_SCALE_MIN: f64 = 0.25;
pub const TEMPO_SCALE_MAX: f64 = 2.0;

// Standard 88 keys: A0 = 21, C8 = 108
pub const MIDI_NOTE_MIN: u8 = 21;
pub const MIDI_NOTE_MAX: u8 = 108;

/// Nested grading windows, in milliseconds of absolute timing offset.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq)]
#[serde(default)]
pub struct TimingWindows {
    pub perfect_ms: f64,
    pub good_ms: f64,
    pub ok_ms: f64,
}

impl Default for TimingWindows {
    fn default() -> Self {
        TimingWindows {
            perfect_ms: PERFECT_WINDOW_MS,
            good_ms: GOOD_WINDOW_MS,
            ok_ms: OK_WINDOW_MS,
        }
    }
}

impl TimingWindows {
    /// The OK window in seconds; doubles as the tracker's admission/expiry window.
    pub fn ok_window_s(&self) -> f64 {
        self.ok_ms / 1000.0
    }

    /// Repair windows so that perfect <= good <= ok and all are positive.
    pub fn normalized(self) -> Self {
        let defaults = TimingWindows::default();
        let pick = |v: f64, d: f64| if v.is_finite() && v > 0.0 { v } else { d };
        let mut w = [
            pick(self.perfect_ms, defaults.perfect_ms),
            pick(self.good_ms, defaults.good_ms),
            pick(self.ok_ms, defaults.ok_ms),
        ];
        w.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
        let fixed = TimingWindows {
            perfect_ms: w[0],
            good_ms: w[1],
            ok_ms: w[2],
        };
        if fixed != self {
            warn!(original = ?self, ?fixed, "timing windows normalized");
        }
        fixed
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct MetronomeConfig {
    pub enabled: bool,
    pub beats_per_bar: u32,
    pub accent_pitch: u8,
    pub accent_velocity: u8,
    pub click_pitch: u8,
    pub click_velocity: u8,
}

impl Default for MetronomeConfig {
    fn default() -> Self {
        // GM percussion: 76 = hi wood block, 77 = low wood block
        MetronomeConfig {
            enabled: false,
            beats_per_bar: 4,
            accent_pitch: 76,
            accent_velocity: 127,
            click_pitch: 77,
            click_velocity: 90,
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct ProgressiveConfig {
    pub enabled: bool,
    pub start_scale: f64,
    pub floor: f64,
    pub ceiling: f64,
    pub step: f64,
    /// Loop accuracy (percent) needed to speed up.
    pub accuracy_threshold: f64,
}

impl Default for ProgressiveConfig {
    fn default() -> Self {
        ProgressiveConfig {
            enabled: false,
            start_scale: 0.7,
            floor: TEMPO_SCALE_MIN,
            ceiling: 1.0,
            step: 0.05,
            accuracy_threshold: 90.0,
        }
    }
}

impl ProgressiveConfig {
    /// Repair invalid or inverted bounds and steps; `start_scale` ends up
    /// inside `[floor, ceiling]`.
    pub fn normalized(mut self) -> Self {
        if !(self.floor.is_finite() && self.floor > 0.0) {
            self.floor = TEMPO_SCALE_MIN;
        }
        if !(self.ceiling.is_finite() && self.ceiling > 0.0) {
            self.ceiling = 1.0;
        }
        if self.floor > self.ceiling {
            warn!(floor = self.floor, ceiling = self.ceiling, "progressive bounds inverted, swapping");
            std::mem::swap(&mut self.floor, &mut self.ceiling);
        }
        self.start_scale = if self.start_scale.is_finite() {
            self.start_scale.clamp(self.floor, self.ceiling)
        } else {
            self.floor
        };
        if !(self.step.is_finite() && self.step > 0.0 && self.step < 1.0) {
            self.step = 0.05;
        }
        self
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct EngineConfig {
    pub timing: TimingWindows,
    pub chord_tolerance_s: f64,
    pub tempo_scale_min: f64,
    pub tempo_scale_max: f64,
    pub tempo_step: f64,
    pub metronome: MetronomeConfig,
    pub progressive: ProgressiveConfig,
    pub midi_note_min: u8,
    pub midi_note_max: u8,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            timing: TimingWindows::default(),
            chord_tolerance_s: CHORD_TOLERANCE_S,
            tempo_scale_min: TEMPO_SCALE_MIN,
            tempo_scale_max: TEMPO_SCALE_MAX,
            tempo_step: 0.05,
            metronome: MetronomeConfig::default(),
            progressive: ProgressiveConfig::default(),
            midi_note_min: MIDI_NOTE_MIN,
            midi_note_max: MIDI_NOTE_MAX,
        }
    }
}

impl EngineConfig {
    /// Parse a JSON config; missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: EngineConfig = serde_json::from_str(json)?;
        Ok(config.normalized())
    }

    /// Clamp and reorder user-supplied values instead of rejecting them.
    pub fn normalized(mut self) -> Self {
        self.timing = self.timing.normalized();

        if !(self.chord_tolerance_s.is_finite() && self.chord_tolerance_s >= 0.0) {
            warn!(value = self.chord_tolerance_s, "invalid chord tolerance, using default");
            self.chord_tolerance_s = CHORD_TOLERANCE_S;
        }

        let (lo, hi) = self.tempo_bounds();
        if (lo, hi) != (self.tempo_scale_min, self.tempo_scale_max) {
            warn!(
                min = self.tempo_scale_min,
                max = self.tempo_scale_max,
                lo,
                hi,
                "tempo bounds repaired"
            );
        }
        self.tempo_scale_min = lo;
        self.tempo_scale_max = hi;
        if !(self.tempo_step.is_finite() && self.tempo_step > 0.0) {
            self.tempo_step = 0.05;
        }

        if self.metronome.beats_per_bar == 0 {
            self.metronome.beats_per_bar = 4;
        }

        let p = &mut self.progressive;
        p.floor = if p.floor.is_finite() { p.floor.clamp(lo, hi) } else { lo };
        p.ceiling = if p.ceiling.is_finite() { p.ceiling.clamp(lo, hi) } else { 1.0f64.clamp(lo, hi) };
        self.progressive = self.progressive.clone().normalized();

        if self.midi_note_min > self.midi_note_max {
            std::mem::swap(&mut self.midi_note_min, &mut self.midi_note_max);
        }
        self
    }

    /// `(min, max)` tempo scale with non-positive or inverted bounds repaired.
    pub fn tempo_bounds(&self) -> (f64, f64) {
        let valid = |v: f64, fallback: f64| if v.is_finite() && v > 0.0 { v } else { fallback };
        let lo = valid(self.tempo_scale_min, TEMPO_SCALE_MIN);
        let hi = valid(self.tempo_scale_max, TEMPO_SCALE_MAX);
        if lo <= hi {
            (lo, hi)
        } else {
            (hi, lo)
        }
    }

    pub fn clamp_tempo(&self, scale: f64) -> f64 {
        let (lo, hi) = self.tempo_bounds();
        if scale.is_nan() {
            return 1.0f64.clamp(lo, hi);
        }
        scale.clamp(lo, hi)
    }
}
