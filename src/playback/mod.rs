//! Timeline: the playback cursor plus the generators that ride the same clock.

pub mod engine;
pub mod metronome;
pub mod progressive;

pub use engine::PlaybackEngine;
pub use metronome::{Click, Metronome};
pub use progressive::ProgressivePractice;
