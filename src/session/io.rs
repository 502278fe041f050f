use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{KeyfallError, Result};
use crate::playback::Click;
use crate::score::NoteEvent;
use crate::scoring::SessionStats;

/// A key press or release from a live keyboard.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq)]
pub struct LiveNoteEvent {
    pub pitch: u8,
    pub velocity: u8,
    /// Host clock, seconds. Informational for graded play.
    pub timestamp: f64,
    pub is_note_on: bool,
}

impl LiveNoteEvent {
    pub fn note_on(pitch: u8, velocity: u8, timestamp: f64) -> Self {
        LiveNoteEvent {
            pitch,
            velocity,
            timestamp,
            is_note_on: true,
        }
    }

    pub fn note_off(pitch: u8, timestamp: f64) -> Self {
        LiveNoteEvent {
            pitch,
            velocity: 0,
            timestamp,
            is_note_on: false,
        }
    }
}

/// Non-blocking source of live note events, polled every tick until empty.
pub trait InputSource {
    fn name(&self) -> &str;

    /// Next event in arrival order, or `None` when nothing is waiting.
    fn poll(&mut self) -> Option<LiveNoteEvent>;

    fn close(&mut self) {}
}

/// FIFO input fed by the host. Clones share one queue, so the host keeps a
/// handle to push into while the session owns another to poll.
#[derive(Clone, Debug)]
pub struct QueuedInput {
    name: String,
    queue: Rc<RefCell<VecDeque<LiveNoteEvent>>>,
    closed: Rc<RefCell<bool>>,
}

impl QueuedInput {
    pub fn new(name: impl Into<String>) -> Self {
        QueuedInput {
            name: name.into(),
            queue: Rc::new(RefCell::new(VecDeque::new())),
            closed: Rc::new(RefCell::new(false)),
        }
    }

    pub fn push(&self, event: LiveNoteEvent) {
        if *self.closed.borrow() {
            debug!(source = %self.name, "dropping event for closed input");
            return;
        }
        self.queue.borrow_mut().push_back(event);
    }

    pub fn len(&self) -> usize {
        self.queue.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.borrow().is_empty()
    }

    pub fn is_closed(&self) -> bool {
        *self.closed.borrow()
    }
}

impl InputSource for QueuedInput {
    fn name(&self) -> &str {
        &self.name
    }

    fn poll(&mut self) -> Option<LiveNoteEvent> {
        self.queue.borrow_mut().pop_front()
    }

    fn close(&mut self) {
        *self.closed.borrow_mut() = true;
        self.queue.borrow_mut().clear();
    }
}

/// Fire-and-forget synthesizer commands.
pub trait AudioSink {
    fn note_on(&mut self, pitch: u8, velocity: u8);
    fn note_off(&mut self, pitch: u8);
    fn all_notes_off(&mut self);

    fn play_note_event(&mut self, note: &NoteEvent) {
        self.note_on(note.pitch, note.velocity);
    }

    fn click(&mut self, click: &Click) {
        self.note_on(click.pitch, click.velocity);
    }
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AudioCommand {
    NoteOn { pitch: u8, velocity: u8 },
    NoteOff { pitch: u8 },
    Click { pitch: u8, velocity: u8, accented: bool },
    AllNotesOff,
}

/// Records audio commands for a host to drain and perform. Clones share
/// the same buffer.
#[derive(Clone, Debug, Default)]
pub struct AudioCommandLog {
    commands: Rc<RefCell<Vec<AudioCommand>>>,
}

impl AudioCommandLog {
    pub fn new() -> Self {
        AudioCommandLog::default()
    }

    pub fn drain(&self) -> Vec<AudioCommand> {
        std::mem::take(&mut *self.commands.borrow_mut())
    }

    pub fn len(&self) -> usize {
        self.commands.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.borrow().is_empty()
    }

    fn push(&self, command: AudioCommand) {
        self.commands.borrow_mut().push(command);
    }
}

impl AudioSink for AudioCommandLog {
    fn note_on(&mut self, pitch: u8, velocity: u8) {
        self.push(AudioCommand::NoteOn { pitch, velocity });
    }

    fn note_off(&mut self, pitch: u8) {
        self.push(AudioCommand::NoteOff { pitch });
    }

    fn all_notes_off(&mut self) {
        self.push(AudioCommand::AllNotesOff);
    }

    fn click(&mut self, click: &Click) {
        self.push(AudioCommand::Click {
            pitch: click.pitch,
            velocity: click.velocity,
            accented: click.accented,
        });
    }
}

/// One stored session. `sequence` orders records by save time.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct SessionRecord {
    pub sequence: u64,
    #[serde(flatten)]
    pub stats: SessionStats,
}

pub trait ProgressStore {
    fn save_session(&mut self, stats: &SessionStats) -> Result<()>;

    /// Stored sessions, most recent first, optionally only for one song.
    fn history(&self, song_title: Option<&str>, limit: usize) -> Result<Vec<SessionRecord>>;
}

#[derive(Serialize, Deserialize, Clone, Debug, Default)]
pub struct MemoryProgressStore {
    records: Vec<SessionRecord>,
    next_sequence: u64,
}

impl MemoryProgressStore {
    pub fn new() -> Self {
        MemoryProgressStore::default()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        let store: MemoryProgressStore = serde_json::from_str(json)?;
        let next_sequence = store.next_sequence;
        let mut store = MemoryProgressStore::from_records(store.records);
        store.next_sequence = store.next_sequence.max(next_sequence);
        Ok(store)
    }

    /// Rebuild a store from exported records, in any order.
    pub fn from_records(mut records: Vec<SessionRecord>) -> Self {
        records.sort_by_key(|r| r.sequence);
        let next_sequence = records.last().map_or(0, |r| r.sequence + 1);
        MemoryProgressStore {
            records,
            next_sequence,
        }
    }
}

impl ProgressStore for MemoryProgressStore {
    fn save_session(&mut self, stats: &SessionStats) -> Result<()> {
        if stats.song_title.is_empty() {
            return Err(KeyfallError::Storage(
                "session has no song title".to_string(),
            ));
        }
        let record = SessionRecord {
            sequence: self.next_sequence,
            stats: stats.clone(),
        };
        self.next_sequence += 1;
        debug!(
            sequence = record.sequence,
            song = %record.stats.song_title,
            accuracy = record.stats.accuracy_pct,
            "session saved"
        );
        self.records.push(record);
        Ok(())
    }

    fn history(&self, song_title: Option<&str>, limit: usize) -> Result<Vec<SessionRecord>> {
        let mut records: Vec<SessionRecord> = self
            .records
            .iter()
            .filter(|r| song_title.map_or(true, |t| r.stats.song_title == t))
            .cloned()
            .collect();
        records.sort_by(|a, b| b.sequence.cmp(&a.sequence));
        records.truncate(limit);
        Ok(records)
    }
}
