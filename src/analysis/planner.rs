use serde::{Deserialize, Serialize};

use crate::score::{Hand, Song};
use crate::session::io::SessionRecord;

pub const DEFAULT_TARGET_ACCURACY: f64 = 0.95;
pub const DEFAULT_MAX_STEPS: usize = 8;

const RECENT_SESSIONS: usize = 5;
const WINDOW_BARS: usize = 4;
const BEATS_PER_BAR: f64 = 4.0;

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct PracticeStep {
    /// 0-indexed start bar, exclusive end bar.
    pub bar_range: (u32, u32),
    pub hand: Hand,
    /// Percent of the written tempo.
    pub tempo_pct: u32,
    pub repetitions: u32,
    pub focus: String,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct PracticePlan {
    pub song_title: String,
    pub steps: Vec<PracticeStep>,
    pub estimated_sessions: u32,
    pub current_mastery_pct: f64,
}

/// A passage flagged by structure alone.
#[derive(Clone, Debug, PartialEq)]
struct WeakSection {
    start_bar: u32,
    end_bar: u32,
    reason: String,
    hand: Hand,
}

/// Build a practice plan from the song's structure and its recent history.
///
/// `history` is most-recent-first, as `ProgressStore::history` returns it;
/// only records for this song are considered. `target_accuracy` is a ratio
/// in [0, 1].
pub fn generate_plan(
    song: &Song,
    history: &[SessionRecord],
    target_accuracy: f64,
    max_steps: usize,
) -> PracticePlan {
    let mut plan = PracticePlan {
        song_title: song.title.clone(),
        steps: Vec::new(),
        estimated_sessions: 1,
        current_mastery_pct: 0.0,
    };

    if song.notes.is_empty() {
        plan.steps.push(PracticeStep {
            bar_range: (0, 0),
            hand: Hand::Both,
            tempo_pct: 100,
            repetitions: 1,
            focus: "No notes found in this song".to_string(),
        });
        return plan;
    }

    let beat_duration = song.beat_duration();
    let (mastery, sessions_played) = mastery_from_history(history, &song.title);
    plan.current_mastery_pct = mastery * 100.0;

    let base_tempo: u32 = if sessions_played == 0 {
        60
    } else if mastery < 0.5 {
        50
    } else if mastery < 0.7 {
        65
    } else if mastery < 0.85 {
        80
    } else if mastery < target_accuracy {
        90
    } else {
        100
    };
    let slow_tempo = base_tempo.saturating_sub(10).max(40);

    let total_bars = bar_for_time(song.duration, beat_duration) + 1;

    for section in weak_sections(song, beat_duration).into_iter().take(max_steps / 2) {
        let bars = format!("bars {}-{}", section.start_bar + 1, section.end_bar);
        let range = (section.start_bar, section.end_bar);
        if section.hand == Hand::Both {
            plan.steps.push(PracticeStep {
                bar_range: range,
                hand: Hand::Right,
                tempo_pct: slow_tempo,
                repetitions: 3,
                focus: format!("RH alone: {} ({})", section.reason, bars),
            });
            plan.steps.push(PracticeStep {
                bar_range: range,
                hand: Hand::Left,
                tempo_pct: slow_tempo,
                repetitions: 3,
                focus: format!("LH alone: {} ({})", section.reason, bars),
            });
            plan.steps.push(PracticeStep {
                bar_range: range,
                hand: Hand::Both,
                tempo_pct: base_tempo,
                repetitions: 3,
                focus: format!("Hands together: {} ({})", section.reason, bars),
            });
        } else {
            plan.steps.push(PracticeStep {
                bar_range: range,
                hand: section.hand,
                tempo_pct: slow_tempo,
                repetitions: 4,
                focus: format!("{} ({})", section.reason, bars),
            });
        }
    }

    if plan.steps.len() < max_steps {
        plan.steps.push(PracticeStep {
            bar_range: (0, total_bars),
            hand: Hand::Both,
            tempo_pct: base_tempo,
            repetitions: 2,
            focus: "Full run-through at practice tempo".to_string(),
        });
    }

    if mastery >= target_accuracy * 0.85 && plan.steps.len() < max_steps {
        plan.steps.push(PracticeStep {
            bar_range: (0, total_bars),
            hand: Hand::Both,
            tempo_pct: 100,
            repetitions: 1,
            focus: "Performance run at full tempo".to_string(),
        });
    }

    plan.steps.truncate(max_steps);

    plan.estimated_sessions = if mastery >= target_accuracy {
        0
    } else {
        let gap = target_accuracy - mastery;
        ((gap / 0.05) as u32 + 1).max(1)
    };

    plan
}

/// Mean accuracy of the latest sessions for `title` as a ratio, plus how many
/// sessions exist for it in total.
fn mastery_from_history(history: &[SessionRecord], title: &str) -> (f64, usize) {
    let relevant: Vec<&SessionRecord> = history
        .iter()
        .filter(|r| r.stats.song_title == title)
        .collect();
    if relevant.is_empty() {
        return (0.0, 0);
    }
    let latest = &relevant[..relevant.len().min(RECENT_SESSIONS)];
    let overall = latest.iter().map(|r| r.stats.accuracy_pct).sum::<f64>() / latest.len() as f64;
    // Accuracy is stored in percent; tolerate ratios too.
    let mastery = if overall > 1.0 { overall / 100.0 } else { overall };
    (mastery, relevant.len())
}

fn bar_for_time(time: f64, beat_duration: f64) -> u32 {
    if beat_duration <= 0.0 {
        return 0;
    }
    (time / (beat_duration * BEATS_PER_BAR)) as u32
}

/// Scan 4-bar windows for density spikes, wide leaps and busy hands.
fn weak_sections(song: &Song, beat_duration: f64) -> Vec<WeakSection> {
    let bar_duration = beat_duration * BEATS_PER_BAR;
    let total_bars = bar_for_time(song.duration, beat_duration) + 1;

    let mut sections = Vec::new();
    for bar in (0..total_bars).step_by(WINDOW_BARS) {
        let bar_end = (bar + WINDOW_BARS as u32).min(total_bars);
        let t_start = bar as f64 * bar_duration;
        let t_end = bar_end as f64 * bar_duration;

        let notes: Vec<_> = song
            .notes
            .iter()
            .filter(|n| t_start <= n.start_time && n.start_time < t_end)
            .collect();
        if notes.is_empty() {
            continue;
        }

        let density = notes.len() as f64 / (t_end - t_start).max(0.01);

        let mut pitches: Vec<u8> = notes.iter().map(|n| n.pitch).collect();
        pitches.sort_unstable();
        pitches.dedup();
        let max_jump = pitches.windows(2).map(|w| w[1] - w[0]).max().unwrap_or(0);
        let lowest = pitches[0];
        let highest = pitches[pitches.len() - 1];

        let left = notes.iter().filter(|n| n.hand == Hand::Left).count();
        let right = notes.iter().filter(|n| n.hand == Hand::Right).count();

        if density > 4.0 {
            sections.push(WeakSection {
                start_bar: bar,
                end_bar: bar_end,
                reason: format!("High note density ({:.1} notes/sec)", density),
                hand: Hand::Both,
            });
        } else if max_jump > 12 {
            // Blame the hand that owns the extreme the leap reaches.
            let owns = |hand: Hand, edge: u8| {
                notes
                    .iter()
                    .filter(|n| n.pitch.abs_diff(edge) < 3)
                    .all(|n| n.hand == hand)
            };
            let hand = if owns(Hand::Left, lowest) {
                Hand::Left
            } else if owns(Hand::Right, highest) {
                Hand::Right
            } else {
                Hand::Both
            };
            sections.push(WeakSection {
                start_bar: bar,
                end_bar: bar_end,
                reason: format!("Large interval leap ({} semitones)", max_jump),
                hand,
            });
        } else if left > 2 && right > 2 {
            sections.push(WeakSection {
                start_bar: bar,
                end_bar: bar_end,
                reason: "Complex hand independence".to_string(),
                hand: Hand::Both,
            });
        }
    }
    sections
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::score::NoteEvent;
    use crate::scoring::SessionStats;

    fn record(title: &str, sequence: u64, accuracy: f64) -> SessionRecord {
        SessionRecord {
            sequence,
            stats: SessionStats {
                accuracy_pct: accuracy,
                ..SessionStats::new(title)
            },
        }
    }

    /// Quarter notes at 120 bpm: 2 nps, narrow range, one hand.
    fn easy_song(bars: usize) -> Song {
        let notes = (0..bars * 4)
            .map(|i| NoteEvent::new(60 + (i % 5) as u8, i as f64 * 0.5, 0.5).with_hand(Hand::Right))
            .collect();
        Song::from_notes("easy", notes)
    }

    #[test]
    fn test_empty_song() {
        let plan = generate_plan(&Song::empty("e"), &[], DEFAULT_TARGET_ACCURACY, DEFAULT_MAX_STEPS);
        assert_eq!(plan.steps.len(), 1);
        assert_eq!(plan.steps[0].focus, "No notes found in this song");
        assert_eq!(plan.estimated_sessions, 1);
    }

    #[test]
    fn test_no_history_plan() {
        let song = easy_song(4);
        let plan = generate_plan(&song, &[], DEFAULT_TARGET_ACCURACY, DEFAULT_MAX_STEPS);
        assert_eq!(plan.current_mastery_pct, 0.0);
        assert_eq!(plan.steps.len(), 1);
        let step = &plan.steps[0];
        assert_eq!(step.tempo_pct, 60);
        assert_eq!(step.repetitions, 2);
        // 16 quarters end at 8.0s: int(8 / 2) + 1 = 5 bars
        assert_eq!(step.bar_range, (0, 5));
        // 0.95 / 0.05 truncates to 18, plus one
        assert_eq!(plan.estimated_sessions, 19);
    }

    #[test]
    fn test_mastery_uses_latest_five_for_this_song() {
        let mut history: Vec<SessionRecord> = (0..5).map(|i| record("easy", 10 - i, 90.0)).collect();
        history.push(record("easy", 1, 0.0));
        history.push(record("other", 0, 10.0));
        let plan = generate_plan(&easy_song(4), &history, DEFAULT_TARGET_ACCURACY, DEFAULT_MAX_STEPS);
        assert!((plan.current_mastery_pct - 90.0).abs() < 1e-9);
        // 0.85 <= 0.9 < 0.95
        assert_eq!(plan.steps[0].tempo_pct, 90);
        // 0.9 >= 0.95 * 0.85 adds the performance pass
        assert_eq!(plan.steps.len(), 2);
        assert_eq!(plan.steps[1].tempo_pct, 100);
        assert_eq!(plan.estimated_sessions, 1);
    }

    #[test]
    fn test_mastered_song() {
        let history = vec![record("easy", 0, 99.0)];
        let plan = generate_plan(&easy_song(2), &history, DEFAULT_TARGET_ACCURACY, DEFAULT_MAX_STEPS);
        assert_eq!(plan.steps[0].tempo_pct, 100);
        assert_eq!(plan.estimated_sessions, 0);
    }

    #[test]
    fn test_dense_window_splits_hands() {
        // 12 notes per second across the only window
        let notes = (0..96)
            .map(|i| NoteEvent::new(60 + (i % 3) as u8, i as f64 / 12.0, 0.05))
            .collect();
        let song = Song::from_notes("dense", notes);
        let plan = generate_plan(&song, &[], DEFAULT_TARGET_ACCURACY, DEFAULT_MAX_STEPS);
        let hands: Vec<Hand> = plan.steps.iter().map(|s| s.hand).collect();
        assert_eq!(hands, vec![Hand::Right, Hand::Left, Hand::Both, Hand::Both]);
        assert_eq!(plan.steps[0].tempo_pct, 50);
        assert_eq!(plan.steps[0].bar_range, (0, 4));
        assert!(plan.steps[0].focus.starts_with("RH alone: High note density (12.0 notes/sec)"));
        assert!(plan.steps[0].focus.ends_with("(bars 1-4)"));
        assert_eq!(plan.steps[2].tempo_pct, 60);
    }

    #[test]
    fn test_leap_blamed_on_left_hand() {
        let notes = vec![
            NoteEvent::new(36, 0.0, 0.5).with_hand(Hand::Left),
            NoteEvent::new(60, 0.5, 0.5).with_hand(Hand::Right),
            NoteEvent::new(62, 1.0, 0.5).with_hand(Hand::Right),
        ];
        let plan = generate_plan(&Song::from_notes("leap", notes), &[], DEFAULT_TARGET_ACCURACY, DEFAULT_MAX_STEPS);
        assert_eq!(plan.steps[0].hand, Hand::Left);
        assert_eq!(plan.steps[0].repetitions, 4);
        assert_eq!(plan.steps[0].focus, "Large interval leap (24 semitones) (bars 1-1)");
    }

    #[test]
    fn test_max_steps_respected() {
        let notes = (0..400)
            .map(|i| NoteEvent::new(60, i as f64 / 10.0, 0.05))
            .collect();
        let song = Song::from_notes("long", notes);
        let plan = generate_plan(&song, &[], DEFAULT_TARGET_ACCURACY, 5);
        // Two weak windows allowed, each expanding to three steps, then trimmed
        assert_eq!(plan.steps.len(), 5);
        assert!(plan.steps.iter().all(|s| s.focus.contains("High note density")));
    }
}
