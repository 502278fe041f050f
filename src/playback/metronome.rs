use serde::Serialize;

use crate::config::MetronomeConfig;

/// One metronome tick, ready to hand to an audio sink.
#[derive(Serialize, Clone, Copy, Debug, PartialEq)]
pub struct Click {
    /// Zero-based beat number since the metronome started.
    pub beat: u64,
    pub beat_in_bar: u32,
    pub accented: bool,
    pub pitch: u8,
    pub velocity: u8,
}

/// Beat clock driven by frame deltas.
///
/// Elapsed time (scaled by tempo) accumulates; every full beat duration in
/// the accumulator emits one click and subtracts exactly one beat, so the
/// sub-beat phase carries over between frames and a long frame can yield
/// several clicks.
#[derive(Clone, Debug)]
pub struct Metronome {
    bpm: f64,
    beat_duration: f64,
    accumulator: f64,
    beat_count: u64,
    config: MetronomeConfig,
}

impl Metronome {
    pub fn new(bpm: f64, beats_per_bar: u32) -> Self {
        let config = MetronomeConfig {
            beats_per_bar,
            ..MetronomeConfig::default()
        };
        Metronome::with_config(bpm, config)
    }

    pub fn with_config(bpm: f64, mut config: MetronomeConfig) -> Self {
        let bpm = if bpm.is_finite() && bpm > 0.0 { bpm } else { 120.0 };
        config.beats_per_bar = config.beats_per_bar.max(1);
        Metronome {
            bpm,
            beat_duration: 60.0 / bpm,
            accumulator: 0.0,
            beat_count: 0,
            config,
        }
    }

    pub fn update(&mut self, dt: f64, tempo_scale: f64) -> Vec<Click> {
        let mut clicks = Vec::new();
        if !(dt.is_finite() && dt > 0.0 && tempo_scale > 0.0) {
            return clicks;
        }

        self.accumulator += dt * tempo_scale;
        while self.accumulator >= self.beat_duration {
            self.accumulator -= self.beat_duration;
            clicks.push(self.next_click());
        }
        clicks
    }

    fn next_click(&mut self) -> Click {
        let beat_in_bar = (self.beat_count % self.config.beats_per_bar as u64) as u32;
        let accented = beat_in_bar == 0;
        let click = Click {
            beat: self.beat_count,
            beat_in_bar,
            accented,
            pitch: if accented {
                self.config.accent_pitch
            } else {
                self.config.click_pitch
            },
            velocity: if accented {
                self.config.accent_velocity
            } else {
                self.config.click_velocity
            },
        };
        self.beat_count += 1;
        click
    }

    pub fn reset(&mut self) {
        self.accumulator = 0.0;
        self.beat_count = 0;
    }

    pub fn bpm(&self) -> f64 {
        self.bpm
    }

    pub fn beat_duration(&self) -> f64 {
        self.beat_duration
    }

    /// Fraction of the current beat already elapsed, in [0, 1).
    pub fn phase(&self) -> f64 {
        self.accumulator / self.beat_duration
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_one_click_per_beat() {
        // 120 bpm = 0.5s per beat
        let mut m = Metronome::new(120.0, 4);
        assert!(m.update(0.4, 1.0).is_empty());
        let clicks = m.update(0.2, 1.0);
        assert_eq!(clicks.len(), 1);
        assert!(clicks[0].accented);
        assert_relative_eq!(m.phase(), 0.2, epsilon = 1e-9);
    }

    #[test]
    fn test_phase_preserved_across_frames() {
        let mut m = Metronome::new(60.0, 4);
        let mut total = 0;
        for _ in 0..100 {
            total += m.update(0.1, 1.0).len();
        }
        // 10 seconds at 60 bpm, allowing for float accumulation at the boundary
        assert!((9..=10).contains(&total), "got {}", total);
    }

    #[test]
    fn test_large_dt_emits_multiple_clicks() {
        let mut m = Metronome::new(120.0, 3);
        let clicks = m.update(2.1, 1.0);
        assert_eq!(clicks.len(), 4);
        let accents: Vec<bool> = clicks.iter().map(|c| c.accented).collect();
        assert_eq!(accents, vec![true, false, false, true]);
        assert_eq!(clicks[3].beat_in_bar, 0);
        assert_eq!(clicks[2].beat, 2);
    }

    #[test]
    fn test_accent_uses_configured_sound() {
        let mut m = Metronome::new(120.0, 2);
        let clicks = m.update(1.0, 1.0);
        assert_eq!(clicks[0].pitch, 76);
        assert_eq!(clicks[0].velocity, 127);
        assert_eq!(clicks[1].pitch, 77);
        assert_eq!(clicks[1].velocity, 90);
    }

    #[test]
    fn test_tempo_scale_speeds_clicks() {
        let mut m = Metronome::new(120.0, 4);
        assert_eq!(m.update(0.5, 2.0).len(), 2);
    }

    #[test]
    fn test_degenerate_input() {
        let mut m = Metronome::new(0.0, 0);
        assert_eq!(m.bpm(), 120.0);
        assert!(m.update(-1.0, 1.0).is_empty());
        assert!(m.update(1.0, 0.0).is_empty());
        // beats_per_bar of zero is treated as one: every click accented
        assert!(m.update(1.0, 1.0).iter().all(|c| c.accented));
    }
}
