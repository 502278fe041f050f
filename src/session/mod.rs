pub mod io;
pub mod plugins;
pub mod practice;

pub use io::{
    AudioCommand, AudioCommandLog, AudioSink, InputSource, LiveNoteEvent, MemoryProgressStore,
    ProgressStore, QueuedInput, SessionRecord,
};
pub use plugins::{ComboScorer, Plugin, PluginRegistry, ScoringPlugin, VisualizationPlugin};
pub use practice::{PracticeSession, TickReport};

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::generate_plan;
    use crate::config::EngineConfig;
    use crate::score::{Hand, JsonScoreSource, NoteEvent, ScoreSource, Song};
    use crate::scoring::HitGrade;
    use std::io::Write;

    fn session_with(
        song: Song,
        store: MemoryProgressStore,
    ) -> (PracticeSession, QueuedInput, AudioCommandLog) {
        let input = QueuedInput::new("keyboard");
        let audio = AudioCommandLog::new();
        let mut session = PracticeSession::new(song, EngineConfig::default())
            .with_audio(Box::new(audio.clone()))
            .with_store(Box::new(store));
        session.add_input(Box::new(input.clone())).unwrap();
        (session, input, audio)
    }

    #[test]
    fn test_single_note_played_on_time() {
        let song = Song::from_notes("One", vec![NoteEvent::new(60, 1.0, 0.5)]);
        let (mut session, input, _) = session_with(song, MemoryProgressStore::new());

        let report = session.tick(1.0);
        assert_eq!(report.newly_due.len(), 1);
        assert!(!report.finished);

        input.push(LiveNoteEvent::note_on(60, 100, 1.02));
        let report = session.tick(0.02);
        assert_eq!(report.results.len(), 1);
        assert_eq!(report.results[0].grade, HitGrade::Perfect);
        assert!(report.finished);

        let stats = session.finish().unwrap();
        assert_eq!(stats.total_notes, 1);
        assert_eq!(stats.perfect, 1);
        assert_eq!(stats.accuracy_pct, 100.0);
        assert!(input.is_closed());
    }

    #[test]
    fn test_history_feeds_practice_plan() {
        let song = Song::from_notes(
            "Study",
            vec![NoteEvent::new(60, 0.5, 0.25), NoteEvent::new(62, 1.0, 0.25)],
        );

        // First run: the second note is never played.
        let (mut session, input, _) = session_with(song.clone(), MemoryProgressStore::new());
        session.tick(0.5);
        input.push(LiveNoteEvent::note_on(60, 90, 0.51));
        session.tick(0.01);
        let report = session.tick(1.0);
        assert!(report.finished);
        assert_eq!(report.results[0].grade, HitGrade::Miss);
        assert_eq!(session.finish().unwrap().accuracy_pct, 50.0);

        let exported = session
            .store()
            .unwrap()
            .history(None, usize::MAX)
            .unwrap();
        assert_eq!(exported.len(), 1);

        // Second run, against the restored store.
        let store = MemoryProgressStore::from_records(exported);
        let (mut session, input, _) = session_with(song.clone(), store);
        input.push(LiveNoteEvent::note_on(60, 90, 0.5));
        session.tick(0.5);
        input.push(LiveNoteEvent::note_on(62, 90, 1.0));
        let report = session.tick(0.5);
        assert!(report.finished);
        assert_eq!(session.finish().unwrap().accuracy_pct, 100.0);

        let history = session.store().unwrap().history(Some("Study"), 10).unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].sequence, 1);
        assert_eq!(history[0].stats.accuracy_pct, 100.0);

        let plan = generate_plan(&song, &history, 0.95, 8);
        assert_eq!(plan.song_title, "Study");
        assert_eq!(plan.current_mastery_pct, 75.0);
        assert!(!plan.steps.is_empty());
    }

    #[test]
    fn test_loaded_song_in_wait_mode_for_right_hand() {
        let mut file = tempfile::Builder::new().suffix(".json").tempfile().unwrap();
        write!(
            file,
            r#"{{
                "title": "Chords",
                "notes": [
                    {{"pitch": 60, "start_time": 1.0, "duration": 0.5, "hand": "right"}},
                    {{"pitch": 64, "start_time": 1.0, "duration": 0.5, "hand": "right"}},
                    {{"pitch": 67, "start_time": 1.0, "duration": 0.5, "hand": "right"}},
                    {{"pitch": 48, "start_time": 2.0, "duration": 0.5, "hand": "left"}}
                ]
            }}"#
        )
        .unwrap();
        let song = JsonScoreSource::default().load(file.path()).unwrap();
        assert_eq!(song.title, "Chords");

        let (mut session, input, audio) = session_with(song, MemoryProgressStore::new());
        session.set_wait_mode(true);
        session.set_active_hand(Hand::Right);
        assert_eq!(session.tracker().expected_len(), 3);

        // The gate holds until the whole chord is down.
        let report = session.tick(0.5);
        assert!(report.newly_due.is_empty());
        assert!(report.results.is_empty());

        for pitch in [60, 64, 67] {
            input.push(LiveNoteEvent::note_on(pitch, 100, 1.0));
        }
        let report = session.tick(0.016);
        assert_eq!(report.newly_due.len(), 3);
        assert_eq!(report.results.len(), 3);
        assert!(report
            .results
            .iter()
            .all(|r| r.grade == HitGrade::Perfect));

        // The left-hand note is not graded; it passes through and is played.
        let report = session.tick(0.016);
        assert_eq!(report.newly_due.len(), 1);
        assert!(report.finished);
        assert!(audio
            .drain()
            .contains(&AudioCommand::NoteOn { pitch: 48, velocity: 80 }));

        let stats = session.finish().unwrap();
        assert_eq!(stats.total_notes, 3);
        assert_eq!(stats.perfect, 3);
    }
}
