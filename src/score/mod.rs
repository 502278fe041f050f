pub mod source;
pub mod transform;
pub mod types;

pub use source::{HandSplitStrategy, JsonScoreSource, ScoreSource};
pub use transform::{select_section, split_hands};
pub use types::{Hand, NoteEvent, Song, TempoChange, TimeSignature};
