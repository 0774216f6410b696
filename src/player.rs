//! MIDI file playback thread body.
//!
//! Turns a standard MIDI file into the same `MidiEvent` stream the
//! hardware receiver produces, so everything downstream of the queue
//! cannot tell file playback from live input.

use crate::controller::Shared;
use crate::error::MidiError;
use crate::types::{MidiEvent, SessionClock};
use crossbeam_channel::Sender;
use log::{error, info};
use midly::{MetaMessage, MidiMessage, Smf, Timing, TrackEventKind};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::thread;
use std::time::Duration;

/// Tempo assumed until the file says otherwise, in µs per quarter note.
pub const DEFAULT_TEMPO: u32 = 500_000;

/// Poll interval while idle or unconfigured.
const IDLE_POLL: Duration = Duration::from_millis(100);

/// Resumable playback position: the next tick to play and the tempo in
/// effect when it was saved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Checkpoint {
    pub tick: u64,
    pub tempo_us: u32,
}

impl Default for Checkpoint {
    fn default() -> Self {
        Self {
            tick: 0,
            tempo_us: DEFAULT_TEMPO,
        }
    }
}

// ─── Parsed file ────────────────────────────────────────────────────────────

/// A flattened MIDI file: every track's messages on one absolute-tick
/// timeline.
///
/// Merging is by stable sort on absolute tick, so messages sharing a tick
/// across tracks keep track-declaration-then-in-track order. Tempo and
/// note messages tied at the same tick are therefore ordered by where
/// their tracks appear in the file, not by independent per-track timing —
/// a known limitation, kept deliberately.
#[derive(Debug, Clone)]
pub struct Score {
    pub ticks_per_beat: u32,
    pub events: Vec<ScoreEvent>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScoreEvent {
    pub tick: u64,
    pub kind: ScoreEventKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScoreEventKind {
    /// `set_tempo` payload in µs per quarter note. Updates the running
    /// tempo during playback; never enqueued.
    Tempo(u32),
    /// A channel message already translated to the queue wire shape.
    Channel { status: u8, data1: u8, data2: u8 },
}

impl Score {
    pub fn load(path: &Path) -> Result<Self, MidiError> {
        let bytes = fs::read(path)?;
        Self::parse(&bytes)
    }

    pub fn parse(bytes: &[u8]) -> Result<Self, MidiError> {
        let smf = Smf::parse(bytes)?;

        let ticks_per_beat = match smf.header.timing {
            Timing::Metrical(tpb) => tpb.as_int() as u32,
            Timing::Timecode(..) => return Err(MidiError::UnsupportedTiming),
        };

        let mut events = Vec::new();
        for track in &smf.tracks {
            let mut tick = 0u64;
            for te in track {
                tick += u64::from(te.delta.as_int());
                match te.kind {
                    TrackEventKind::Midi { channel, message } => {
                        let ch = channel.as_int() & 0x0F;
                        let kind = match message {
                            MidiMessage::NoteOn { key, vel } if vel.as_int() == 0 => {
                                // Running-status convention: velocity-0
                                // Note On is a Note Off.
                                ScoreEventKind::Channel {
                                    status: 0x80 | ch,
                                    data1: key.as_int(),
                                    data2: 0,
                                }
                            }
                            MidiMessage::NoteOn { key, vel } => ScoreEventKind::Channel {
                                status: 0x90 | ch,
                                data1: key.as_int(),
                                data2: vel.as_int(),
                            },
                            MidiMessage::NoteOff { key, .. } => ScoreEventKind::Channel {
                                status: 0x80 | ch,
                                data1: key.as_int(),
                                data2: 0,
                            },
                            MidiMessage::Controller { controller, value } => {
                                ScoreEventKind::Channel {
                                    status: 0xB0 | ch,
                                    data1: controller.as_int(),
                                    data2: value.as_int(),
                                }
                            }
                            _ => continue,
                        };
                        events.push(ScoreEvent { tick, kind });
                    }
                    TrackEventKind::Meta(MetaMessage::Tempo(tempo)) => {
                        events.push(ScoreEvent {
                            tick,
                            kind: ScoreEventKind::Tempo(tempo.as_int()),
                        });
                    }
                    _ => {}
                }
            }
        }

        // Stable: same-tick events keep their track-then-in-track order.
        events.sort_by_key(|e| e.tick);

        Ok(Self {
            ticks_per_beat,
            events,
        })
    }
}

/// Delta ticks → wall-clock seconds at the given tempo.
pub fn ticks_to_seconds(delta_ticks: u64, ticks_per_beat: u32, tempo_us: u32) -> f64 {
    delta_ticks as f64 * tempo_us as f64 / (ticks_per_beat.max(1) as f64 * 1_000_000.0)
}

// ─── Player ─────────────────────────────────────────────────────────────────

#[derive(Debug, Default)]
struct PlayerState {
    file: Option<PathBuf>,
    looping: bool,
    playing: bool,
    paused: bool,
    checkpoint: Checkpoint,
}

/// Plays the configured MIDI file into the shared event queue.
///
/// States: Idle → Playing → {Paused, Idle}; Paused → Playing (resume) →
/// Idle. Pause keeps the checkpoint and takes effect at the next event
/// boundary — an in-progress inter-event sleep is never interrupted.
/// Resume reloads the file from disk, skips every event whose tick is
/// below the checkpoint and starts from the checkpoint's tempo.
pub struct MidiFilePlayer {
    queue: Sender<MidiEvent>,
    shared: Shared,
    clock: SessionClock,
    state: Mutex<PlayerState>,
}

impl MidiFilePlayer {
    pub fn new(queue: Sender<MidiEvent>, shared: Shared, clock: SessionClock) -> Self {
        Self {
            queue,
            shared,
            clock,
            state: Mutex::new(PlayerState::default()),
        }
    }

    /// Main loop. Blocks the calling thread until `ending`.
    pub fn run(&self) {
        loop {
            if self.shared.lock().unwrap().ending {
                break;
            }

            let job = {
                let state = self.state.lock().unwrap();
                if state.playing {
                    state.file.clone()
                } else {
                    None
                }
            };

            match job {
                Some(path) => self.play_file(&path),
                None => thread::sleep(IDLE_POLL),
            }
        }
        info!("midi file player thread exit");
    }

    /// Configure the file to play. Resets the checkpoint: a new file
    /// starts from its beginning.
    pub fn set_file(&self, path: impl Into<PathBuf>) {
        let mut state = self.state.lock().unwrap();
        state.file = Some(path.into());
        state.checkpoint = Checkpoint::default();
    }

    pub fn set_loop(&self, looping: bool) {
        self.state.lock().unwrap().looping = looping;
    }

    /// Request playback. Returns false when no file is configured.
    pub fn play(&self) -> bool {
        let mut state = self.state.lock().unwrap();
        if state.file.is_none() {
            return false;
        }
        state.playing = true;
        state.paused = false;
        true
    }

    /// Pause at the next event boundary, keeping the checkpoint.
    pub fn pause(&self) {
        let mut state = self.state.lock().unwrap();
        if state.playing {
            state.playing = false;
            state.paused = true;
        }
    }

    /// Resume from the saved checkpoint.
    pub fn resume(&self) {
        let mut state = self.state.lock().unwrap();
        if state.paused {
            state.paused = false;
            state.playing = true;
        }
    }

    /// Stop playback and forget the position.
    pub fn stop(&self) {
        let mut state = self.state.lock().unwrap();
        state.playing = false;
        state.paused = false;
        state.checkpoint = Checkpoint::default();
    }

    pub fn is_playing(&self) -> bool {
        self.state.lock().unwrap().playing
    }

    pub fn is_paused(&self) -> bool {
        self.state.lock().unwrap().paused
    }

    pub fn checkpoint(&self) -> Checkpoint {
        self.state.lock().unwrap().checkpoint
    }

    /// Play the configured file once, or repeatedly in loop mode.
    fn play_file(&self, path: &Path) {
        loop {
            if self.shared.lock().unwrap().ending {
                return;
            }
            if !self.state.lock().unwrap().playing {
                return;
            }

            let score = match Score::load(path) {
                Ok(score) => score,
                Err(e) => {
                    error!("failed to load midi file {:?}: {}", path, e);
                    self.stop();
                    return;
                }
            };

            if !self.play_events(&score) {
                // Paused, stopped, or ending; state is already settled.
                return;
            }

            // Exhausted every event: rewind, then either loop or go idle.
            let mut state = self.state.lock().unwrap();
            state.checkpoint = Checkpoint::default();
            if !(state.looping && state.playing) {
                state.playing = false;
                state.paused = false;
                return;
            }
        }
    }

    /// Emit one pass over the score from the current checkpoint.
    /// Returns true when the score was exhausted, false when interrupted.
    fn play_events(&self, score: &Score) -> bool {
        let (start_tick, mut tempo_us) = {
            let state = self.state.lock().unwrap();
            (state.checkpoint.tick, state.checkpoint.tempo_us)
        };
        let mut prev_tick = start_tick;

        for event in &score.events {
            if event.tick < start_tick {
                // Resume path: everything below the checkpoint already
                // played before the pause.
                continue;
            }

            // The checkpoint names the next unplayed message, so a pause
            // observed just below resumes from exactly here without
            // emitting anything twice.
            {
                let mut state = self.state.lock().unwrap();
                state.checkpoint = Checkpoint {
                    tick: event.tick,
                    tempo_us,
                };
                if !state.playing {
                    return false;
                }
            }
            if self.shared.lock().unwrap().ending {
                return false;
            }

            let delta_ticks = event.tick - prev_tick;
            if delta_ticks > 0 {
                let seconds = ticks_to_seconds(delta_ticks, score.ticks_per_beat, tempo_us);
                if seconds > 0.0 {
                    thread::sleep(Duration::from_secs_f64(seconds));
                }
            }
            prev_tick = event.tick;

            match event.kind {
                ScoreEventKind::Tempo(tempo) => tempo_us = tempo,
                ScoreEventKind::Channel {
                    status,
                    data1,
                    data2,
                } => {
                    let _ = self.queue.send(MidiEvent::new(
                        status,
                        data1,
                        data2,
                        self.clock.now_us(),
                    ));
                }
            }
        }

        true
    }
}
