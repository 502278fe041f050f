use crate::score::types::{Hand, NoteEvent, Song};

/// Split a song into `(left, right)` parts. BOTH-tagged notes go to the right
/// hand part; no note lands in both outputs.
pub fn split_hands(song: &Song) -> (Song, Song) {
    let (left, right): (Vec<NoteEvent>, Vec<NoteEvent>) =
        song.notes.iter().partition(|n| n.hand == Hand::Left);
    (
        song.derive(song.title.clone(), left),
        song.derive(song.title.clone(), right),
    )
}

/// Extract bars `start_bar..=end_bar` (1-indexed) as a new song whose notes
/// start at zero. Bar length is `beats_per_bar` time units.
pub fn select_section(song: &Song, start_bar: u32, end_bar: u32, beats_per_bar: f64) -> Song {
    let start_time = start_bar.saturating_sub(1) as f64 * beats_per_bar;
    let end_time = end_bar as f64 * beats_per_bar;

    let notes = song
        .notes
        .iter()
        .filter(|n| start_time <= n.start_time && n.start_time < end_time)
        .map(|n| NoteEvent {
            start_time: n.start_time - start_time,
            ..*n
        })
        .collect();

    song.derive(
        format!("{} (bars {}-{})", song.title, start_bar, end_bar),
        notes,
    )
}
