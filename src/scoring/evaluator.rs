use crate::config::TimingWindows;
use crate::score::NoteEvent;
use crate::scoring::types::{HitGrade, HitResult};

/// Grade one played note against one expected note with the default windows.
pub fn evaluate_hit(expected: &NoteEvent, played_pitch: u8, played_time: f64) -> HitResult {
    evaluate_hit_with(expected, played_pitch, played_time, &TimingWindows::default())
}

/// Pitch mismatch is always a miss; otherwise the smallest window containing
/// `|offset|` decides the grade. Window edges are inclusive.
pub fn evaluate_hit_with(
    expected: &NoteEvent,
    played_pitch: u8,
    played_time: f64,
    windows: &TimingWindows,
) -> HitResult {
    let offset_ms = (played_time - expected.start_time) * 1000.0;

    let grade = if played_pitch != expected.pitch {
        HitGrade::Miss
    } else {
        grade_offset(offset_ms, windows)
    };

    HitResult {
        expected: *expected,
        played_pitch: Some(played_pitch),
        grade,
        timing_offset_ms: offset_ms,
    }
}

pub fn grade_offset(offset_ms: f64, windows: &TimingWindows) -> HitGrade {
    let abs_offset = offset_ms.abs();
    if abs_offset <= windows.perfect_ms {
        HitGrade::Perfect
    } else if abs_offset <= windows.good_ms {
        HitGrade::Good
    } else if abs_offset <= windows.ok_ms {
        HitGrade::Ok
    } else {
        HitGrade::Miss
    }
}
