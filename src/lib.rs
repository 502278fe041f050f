use wasm_bindgen::prelude::*;

pub mod analysis;
pub mod config;
pub mod error;
pub mod freeplay;
pub mod playback;
pub mod score;
pub mod scoring;
pub mod session;

use config::EngineConfig;
use score::{Hand, NoteEvent, Song};
use scoring::HitResult;
use session::{
    AudioCommandLog, ComboScorer, LiveNoteEvent, MemoryProgressStore, Plugin, PracticeSession,
    ProgressStore, QueuedInput, SessionRecord,
};

fn to_js<T: serde::Serialize>(value: &T) -> Result<JsValue, JsValue> {
    serde_wasm_bindgen::to_value(value).map_err(|e| JsValue::from_str(&e.to_string()))
}

fn from_js<T: serde::de::DeserializeOwned>(value: JsValue) -> Result<T, JsValue> {
    serde_wasm_bindgen::from_value(value).map_err(|e| JsValue::from_str(&e.to_string()))
}

fn song_from_js(song_js: JsValue) -> Result<Song, JsValue> {
    let song: Song = from_js(song_js)?;
    Ok(song.normalize())
}

/// Grade one key press against one expected note.
#[wasm_bindgen]
pub fn evaluate_hit(expected_js: JsValue, played_pitch: u8, played_time: f64) -> Result<JsValue, JsValue> {
    let expected: NoteEvent = from_js(expected_js)?;
    to_js(&scoring::evaluate_hit(&expected, played_pitch, played_time))
}

#[wasm_bindgen]
pub fn estimate_difficulty(song_js: JsValue) -> Result<JsValue, JsValue> {
    let song = song_from_js(song_js)?;
    to_js(&analysis::estimate(&song))
}

/// Technique insights for a list of hit results, most severe first.
#[wasm_bindgen]
pub fn analyze_technique(results_js: JsValue) -> Result<JsValue, JsValue> {
    let results: Vec<HitResult> = from_js(results_js)?;
    to_js(&analysis::analyze(&results))
}

/// Build a practice plan. `history_js` is a list of stored session records,
/// most recent first; null or undefined means no history.
#[wasm_bindgen]
pub fn generate_practice_plan(
    song_js: JsValue,
    history_js: JsValue,
    target_accuracy: Option<f64>,
    max_steps: Option<usize>,
) -> Result<JsValue, JsValue> {
    let song = song_from_js(song_js)?;
    let history: Vec<SessionRecord> = if history_js.is_null() || history_js.is_undefined() {
        Vec::new()
    } else {
        from_js(history_js)?
    };
    let plan = analysis::generate_plan(
        &song,
        &history,
        target_accuracy.unwrap_or(analysis::planner::DEFAULT_TARGET_ACCURACY),
        max_steps.unwrap_or(analysis::planner::DEFAULT_MAX_STEPS),
    );
    to_js(&plan)
}

/// Returns `[left, right]`.
#[wasm_bindgen]
pub fn split_hands(song_js: JsValue) -> Result<JsValue, JsValue> {
    let song = song_from_js(song_js)?;
    let (left, right) = score::split_hands(&song);
    let pair = js_sys::Array::new();
    pair.push(&to_js(&left)?);
    pair.push(&to_js(&right)?);
    Ok(pair.into())
}

#[wasm_bindgen]
pub fn select_section(
    song_js: JsValue,
    start_bar: u32,
    end_bar: u32,
    beats_per_bar: f64,
) -> Result<JsValue, JsValue> {
    let song = song_from_js(song_js)?;
    to_js(&score::select_section(&song, start_bar, end_bar, beats_per_bar))
}

#[wasm_bindgen]
pub fn detect_chord(pitches: &[u8]) -> Option<String> {
    freeplay::detect_chord(pitches.iter().copied())
}

/// A practice session driven from JavaScript once per animation frame.
///
/// Key events are pushed with `note_on`/`note_off`, `tick` advances the
/// session and returns a report, and `drain_audio` hands over the synth
/// commands produced since the last call.
#[wasm_bindgen]
pub struct KeyfallSession {
    session: PracticeSession,
    input: QueuedInput,
    audio: AudioCommandLog,
}

#[wasm_bindgen]
impl KeyfallSession {
    /// `config_js` may be null or undefined for the defaults. `history_json`
    /// restores the records exported by `progress_json`.
    #[wasm_bindgen(constructor)]
    pub fn new(
        song_js: JsValue,
        config_js: JsValue,
        history_json: Option<String>,
    ) -> Result<KeyfallSession, JsValue> {
        let song = song_from_js(song_js)?;
        let config: EngineConfig = if config_js.is_null() || config_js.is_undefined() {
            EngineConfig::default()
        } else {
            from_js(config_js)?
        };
        let store = match history_json {
            Some(json) => {
                let records: Vec<SessionRecord> =
                    serde_json::from_str(&json).map_err(|e| JsValue::from_str(&e.to_string()))?;
                MemoryProgressStore::from_records(records)
            }
            None => MemoryProgressStore::new(),
        };

        let input = QueuedInput::new("host");
        let audio = AudioCommandLog::new();
        let mut session = PracticeSession::new(song, config)
            .with_audio(Box::new(audio.clone()))
            .with_store(Box::new(store));
        session
            .add_input(Box::new(input.clone()))
            .map_err(|e| JsValue::from_str(&e.to_string()))?;
        session
            .register_plugin(Plugin::Scoring(Box::new(ComboScorer::new())))
            .map_err(|e| JsValue::from_str(&e.to_string()))?;

        Ok(KeyfallSession { session, input, audio })
    }

    pub fn note_on(&self, pitch: u8, velocity: u8, timestamp: f64) {
        self.input.push(LiveNoteEvent::note_on(pitch, velocity, timestamp));
    }

    pub fn note_off(&self, pitch: u8, timestamp: f64) {
        self.input.push(LiveNoteEvent::note_off(pitch, timestamp));
    }

    pub fn tick(&mut self, dt: f64) -> Result<JsValue, JsValue> {
        to_js(&self.session.tick(dt))
    }

    pub fn stats(&self) -> Result<JsValue, JsValue> {
        to_js(&self.session.stats())
    }

    /// Final stats; also records them in the progress store.
    pub fn finish(&mut self) -> Result<JsValue, JsValue> {
        let stats = self
            .session
            .finish()
            .map_err(|e| JsValue::from_str(&e.to_string()))?;
        to_js(&stats)
    }

    pub fn drain_audio(&self) -> Result<JsValue, JsValue> {
        to_js(&self.audio.drain())
    }

    /// Stored sessions for this song, most recent first.
    pub fn history(&self, limit: usize) -> Result<JsValue, JsValue> {
        let Some(store) = self.session.store() else {
            return to_js(&Vec::<SessionRecord>::new());
        };
        let records = store
            .history(Some(&self.session.song().title), limit)
            .map_err(|e| JsValue::from_str(&e.to_string()))?;
        to_js(&records)
    }

    /// Every stored session as JSON, for the host to persist.
    pub fn progress_json(&self) -> Result<String, JsValue> {
        let Some(store) = self.session.store() else {
            return Ok("[]".to_string());
        };
        let records = store
            .history(None, usize::MAX)
            .map_err(|e| JsValue::from_str(&e.to_string()))?;
        serde_json::to_string(&records).map_err(|e| JsValue::from_str(&e.to_string()))
    }

    pub fn combo_score(&self) -> i64 {
        self.session
            .plugins()
            .scoring()
            .iter()
            .find(|p| p.name() == "combo")
            .map_or(0, |p| p.score())
    }

    pub fn toggle_pause(&mut self) {
        self.session.toggle_pause();
    }

    pub fn toggle_wait_mode(&mut self) {
        self.session.toggle_wait_mode();
    }

    pub fn tempo_up(&mut self) {
        self.session.tempo_up();
    }

    pub fn tempo_down(&mut self) {
        self.session.tempo_down();
    }

    pub fn reset_tempo(&mut self) {
        self.session.reset_tempo();
    }

    pub fn tempo_scale(&self) -> f64 {
        self.session.engine().tempo_scale()
    }

    /// "left", "right" or "both".
    pub fn set_active_hand(&mut self, hand: &str) -> Result<(), JsValue> {
        let hand = Hand::parse(hand)
            .ok_or_else(|| JsValue::from_str(&format!("unknown hand '{}'", hand)))?;
        self.session.set_active_hand(hand);
        Ok(())
    }

    pub fn set_loop_section(&mut self, start_bar: u32, end_bar: u32) {
        self.session.set_loop_section(start_bar, end_bar);
    }

    pub fn toggle_loop(&mut self) {
        self.session.toggle_loop();
    }

    pub fn restart(&mut self) {
        self.session.restart();
    }

    pub fn position(&self) -> f64 {
        self.session.engine().position()
    }
}
