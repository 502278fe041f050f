use std::collections::VecDeque;

use tracing::debug;

use crate::config::TimingWindows;
use crate::score::NoteEvent;
use crate::scoring::evaluator::evaluate_hit_with;
use crate::scoring::types::{HitGrade, HitResult, SessionStats};

/// Matches a live stream of key presses against the expected notes of a song.
///
/// Notes are admitted to the pending set once they are within the OK window
/// of the current time, and leave it exactly once: either matched by `feed`
/// or expired as a miss by `flush_misses`. Each press consumes at most one note.
#[derive(Clone, Debug)]
pub struct HitTracker {
    song_title: String,
    expected: Vec<NoteEvent>,
    next_index: usize,
    /// (index into `expected`, note), in admission order
    pending: VecDeque<(usize, NoteEvent)>,
    results: Vec<HitResult>,
    streak: u32,
    max_streak: u32,
    windows: TimingWindows,
}

impl HitTracker {
    /// `expected` must be sorted by start time, as `Song::notes` is.
    pub fn new(song_title: impl Into<String>, expected: Vec<NoteEvent>) -> Self {
        HitTracker::with_windows(song_title, expected, TimingWindows::default())
    }

    pub fn with_windows(
        song_title: impl Into<String>,
        expected: Vec<NoteEvent>,
        windows: TimingWindows,
    ) -> Self {
        HitTracker {
            song_title: song_title.into(),
            expected,
            next_index: 0,
            pending: VecDeque::new(),
            results: Vec::new(),
            streak: 0,
            max_streak: 0,
            windows,
        }
    }

    fn window_s(&self) -> f64 {
        self.windows.ok_window_s()
    }

    /// Admit every note starting at or before `current_time + window`.
    pub fn activate_pending(&mut self, current_time: f64) {
        let horizon = current_time + self.window_s();
        while let Some(note) = self.expected.get(self.next_index) {
            if note.start_time > horizon {
                break;
            }
            self.pending.push_back((self.next_index, *note));
            self.next_index += 1;
        }
    }

    /// Match a key press to the nearest pending note of the same pitch.
    /// Returns `None` for a press that matches nothing; such presses are not
    /// recorded and leave the pending set untouched.
    pub fn feed(&mut self, played_pitch: u8, played_time: f64) -> Option<HitResult> {
        self.activate_pending(played_time);

        let mut best: Option<(usize, f64)> = None;
        for (pos, (_, note)) in self.pending.iter().enumerate() {
            if note.pitch != played_pitch {
                continue;
            }
            let dist = (played_time - note.start_time).abs();
            if best.map_or(true, |(_, d)| dist < d) {
                best = Some((pos, dist));
            }
        }

        let (pos, _) = best?;
        let (index, note) = self.pending.remove(pos)?;
        let result = evaluate_hit_with(&note, played_pitch, played_time, &self.windows);
        debug!(
            index,
            pitch = played_pitch,
            grade = ?result.grade,
            offset_ms = result.timing_offset_ms,
            "note matched"
        );
        self.record(result.clone());
        Some(result)
    }

    /// Expire pending notes older than the window as unplayed misses.
    pub fn flush_misses(&mut self, current_time: f64) -> Vec<HitResult> {
        self.activate_pending(current_time);

        let window = self.window_s();
        let mut missed = Vec::new();
        let mut kept = VecDeque::with_capacity(self.pending.len());
        while let Some((index, note)) = self.pending.pop_front() {
            if current_time - note.start_time > window {
                debug!(index, pitch = note.pitch, "note expired");
                missed.push(HitResult::unplayed(note));
            } else {
                kept.push_back((index, note));
            }
        }
        self.pending = kept;

        for result in &missed {
            self.record(result.clone());
        }
        missed
    }

    fn record(&mut self, result: HitResult) {
        if result.grade == HitGrade::Miss {
            self.streak = 0;
        } else {
            self.streak += 1;
            self.max_streak = self.max_streak.max(self.streak);
        }
        self.results.push(result);
    }

    pub fn get_stats(&self) -> SessionStats {
        let mut stats = SessionStats::from_results(self.song_title.clone(), &self.results);
        stats.max_streak = self.max_streak;
        stats
    }

    pub fn results(&self) -> &[HitResult] {
        &self.results
    }

    pub fn pending(&self) -> impl Iterator<Item = &NoteEvent> {
        self.pending.iter().map(|(_, n)| n)
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    pub fn streak(&self) -> u32 {
        self.streak
    }

    pub fn max_streak(&self) -> u32 {
        self.max_streak
    }

    /// Every expected note has been resolved.
    pub fn is_complete(&self) -> bool {
        self.next_index >= self.expected.len() && self.pending.is_empty()
    }

    pub fn expected_len(&self) -> usize {
        self.expected.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tracker(notes: Vec<NoteEvent>) -> HitTracker {
        HitTracker::new("test", notes)
    }

    #[test]
    fn test_feed_perfect() {
        let mut t = tracker(vec![NoteEvent::new(60, 1.0, 0.5)]);
        let result = t.feed(60, 1.02).unwrap();
        assert_eq!(result.grade, HitGrade::Perfect);
        let stats = t.get_stats();
        assert_eq!(stats.total_notes, 1);
        assert_eq!(stats.perfect, 1);
        assert_eq!(stats.accuracy_pct, 100.0);
        assert!(t.is_complete());
    }

    #[test]
    fn test_note_not_admitted_too_early() {
        let mut t = tracker(vec![NoteEvent::new(60, 1.0, 0.5)]);
        // 0.7 + 0.2 window < 1.0, the note is not yet playable
        assert!(t.feed(60, 0.7).is_none());
        assert_eq!(t.pending_len(), 0);
        assert!(t.results().is_empty());
    }

    #[test]
    fn test_unmatched_pitch_does_not_mutate() {
        let mut t = tracker(vec![NoteEvent::new(60, 1.0, 0.5), NoteEvent::new(64, 1.0, 0.5)]);
        t.activate_pending(1.0);
        assert_eq!(t.pending_len(), 2);
        assert!(t.feed(61, 1.0).is_none());
        assert_eq!(t.pending_len(), 2);
        assert!(t.results().is_empty());
        assert_eq!(t.streak(), 0);
    }

    #[test]
    fn test_nearest_note_of_same_pitch_wins() {
        let mut t = tracker(vec![NoteEvent::new(60, 1.0, 0.1), NoteEvent::new(60, 1.15, 0.1)]);
        let result = t.feed(60, 1.14).unwrap();
        assert_eq!(result.expected.start_time, 1.15);
        assert_eq!(result.grade, HitGrade::Perfect);
        let pending: Vec<f64> = t.pending().map(|n| n.start_time).collect();
        assert_eq!(pending, vec![1.0]);
    }

    #[test]
    fn test_chord_in_any_order() {
        let mut t = tracker(vec![
            NoteEvent::new(60, 2.0, 1.0),
            NoteEvent::new(64, 2.0, 1.0),
            NoteEvent::new(67, 2.0, 1.0),
        ]);
        for pitch in [67, 60, 64] {
            assert_eq!(t.feed(pitch, 2.01).unwrap().grade, HitGrade::Perfect);
        }
        // A repeated press finds nothing left to consume
        assert!(t.feed(60, 2.02).is_none());
        assert_eq!(t.get_stats().perfect, 3);
        assert_eq!(t.max_streak(), 3);
    }

    #[test]
    fn test_flush_expires_after_window() {
        let mut t = tracker(vec![NoteEvent::new(60, 1.0, 0.5), NoteEvent::new(62, 2.0, 0.5)]);
        assert!(t.flush_misses(1.2).is_empty());
        assert_eq!(t.pending_len(), 1);
        let missed = t.flush_misses(1.21);
        assert_eq!(missed.len(), 1);
        assert_eq!(missed[0].expected.pitch, 60);
        assert!(missed[0].played_pitch.is_none());
        assert_eq!(missed[0].grade, HitGrade::Miss);
        assert_eq!(t.pending_len(), 0);
    }

    #[test]
    fn test_matched_note_is_never_flushed() {
        let mut t = tracker(vec![NoteEvent::new(60, 1.0, 0.5)]);
        t.feed(60, 1.1).unwrap();
        assert!(t.flush_misses(5.0).is_empty());
        assert_eq!(t.results().len(), 1);
    }

    #[test]
    fn test_flushed_note_cannot_be_matched() {
        let mut t = tracker(vec![NoteEvent::new(60, 1.0, 0.5)]);
        assert_eq!(t.flush_misses(1.5).len(), 1);
        assert!(t.feed(60, 1.5).is_none());
        assert_eq!(t.results().len(), 1);
    }

    #[test]
    fn test_streak_reset_by_flush() {
        let mut t = tracker(vec![
            NoteEvent::new(60, 0.0, 0.1),
            NoteEvent::new(62, 0.5, 0.1),
            NoteEvent::new(64, 1.0, 0.1),
            NoteEvent::new(65, 1.5, 0.1),
        ]);
        t.feed(60, 0.0);
        t.feed(62, 0.5);
        assert_eq!(t.streak(), 2);
        t.flush_misses(1.3);
        assert_eq!(t.streak(), 0);
        t.feed(65, 1.5);
        assert_eq!(t.streak(), 1);
        let stats = t.get_stats();
        assert_eq!(stats.max_streak, 2);
        assert_eq!(stats.missed, 1);
        assert_eq!(stats.total_notes, 4);
        assert_eq!(stats.accuracy_pct, 75.0);
    }

    #[test]
    fn test_each_note_resolved_at_most_once() {
        let notes: Vec<NoteEvent> = (0..20)
            .map(|i| NoteEvent::new(60 + (i % 3) as u8, i as f64 * 0.25, 0.2))
            .collect();
        let mut t = tracker(notes.clone());
        let mut time = 0.0;
        for i in 0..60 {
            time += 0.1;
            if i % 2 == 0 {
                t.feed(60 + (i % 3) as u8, time);
            }
            t.flush_misses(time);
        }
        t.flush_misses(100.0);
        assert!(t.is_complete());
        assert_eq!(t.results().len(), notes.len());
        let stats = t.get_stats();
        assert_eq!(stats.total_notes as usize, notes.len());
        assert_eq!(stats.perfect + stats.good + stats.ok + stats.missed, stats.total_notes);
    }

    #[test]
    fn test_late_feed_before_flush_grades_miss() {
        let mut t = tracker(vec![NoteEvent::new(60, 1.0, 0.5)]);
        t.activate_pending(1.0);
        let result = t.feed(60, 1.25).unwrap();
        assert_eq!(result.grade, HitGrade::Miss);
        assert_eq!(result.played_pitch, Some(60));
    }

    #[test]
    fn test_empty_tracker_is_complete() {
        let mut t = tracker(vec![]);
        assert!(t.is_complete());
        assert!(t.feed(60, 0.0).is_none());
        assert!(t.flush_misses(10.0).is_empty());
        assert_eq!(t.get_stats().accuracy_pct, 0.0);
    }
}
