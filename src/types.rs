use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Instant;

// ─── MIDI event wire shape ──────────────────────────────────────────────────

/// Key states posted to the on-screen keyboard alongside a note name.
pub const KEY_ACTIVE: &str = "active";
pub const KEY_NORMAL: &str = "normal";

/// Sustain pedal controller number.
pub const CC_SUSTAIN: u8 = 0x40;

/// One raw MIDI event as it travels through the shared queue.
///
/// Both producers — the hardware receiver and the file player — emit the
/// same shape: `[status, data1, data2, 0]` plus a session timestamp, so
/// everything downstream of the queue is source-agnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MidiEvent {
    /// `[status, data1, data2, 0]`; the fourth byte is reserved.
    pub data: [u8; 4],
    /// Microseconds since session start.
    pub timestamp_us: u64,
}

impl MidiEvent {
    pub fn new(status: u8, data1: u8, data2: u8, timestamp_us: u64) -> Self {
        Self {
            data: [status, data1, data2, 0],
            timestamp_us,
        }
    }

    /// Note On, channel 0.
    pub fn note_on(note: u8, velocity: u8, timestamp_us: u64) -> Self {
        Self::new(0x90, note, velocity, timestamp_us)
    }

    /// Note Off, channel 0. Velocity is always 0 on this path.
    pub fn note_off(note: u8, timestamp_us: u64) -> Self {
        Self::new(0x80, note, 0, timestamp_us)
    }

    /// Control Change, channel 0.
    pub fn control_change(controller: u8, value: u8, timestamp_us: u64) -> Self {
        Self::new(0xB0, controller, value, timestamp_us)
    }

    pub fn status(&self) -> u8 {
        self.data[0]
    }

    pub fn data1(&self) -> u8 {
        self.data[1]
    }

    pub fn data2(&self) -> u8 {
        self.data[2]
    }

    /// Event class from the status nibble. The channel nibble is ignored.
    pub fn kind(&self) -> MidiEventKind {
        match self.data[0] & 0xF0 {
            0x80 => MidiEventKind::NoteOff,
            0x90 => MidiEventKind::NoteOn,
            0xB0 => MidiEventKind::ControlChange,
            _ => MidiEventKind::Other,
        }
    }
}

impl fmt::Display for MidiEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "t={:>10}µs  [{:#04X} {:3} {:3}]",
            self.timestamp_us, self.data[0], self.data[1], self.data[2],
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MidiEventKind {
    NoteOff,
    NoteOn,
    ControlChange,
    Other,
}

// ─── Device description ─────────────────────────────────────────────────────

/// Description of one enumerated MIDI device.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceInfo {
    /// Backend name, e.g. "midir" or "fake".
    pub interface: String,
    pub name: String,
    pub input: bool,
    pub output: bool,
    pub opened: bool,
}

impl fmt::Display for DeviceInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let dir = match (self.input, self.output) {
            (true, true) => "in/out",
            (true, false) => "in",
            (false, true) => "out",
            (false, false) => "-",
        };
        write!(
            f,
            "{:<28} [{:>6}] ({}{})",
            self.name,
            dir,
            self.interface,
            if self.opened { ", opened" } else { "" },
        )
    }
}

// ─── Session clock ──────────────────────────────────────────────────────────

/// Monotonic clock for the session; every producer stamps events with it.
#[derive(Clone)]
pub struct SessionClock {
    start: Instant,
}

impl SessionClock {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    pub fn now_us(&self) -> u64 {
        self.start.elapsed().as_micros() as u64
    }
}

impl Default for SessionClock {
    fn default() -> Self {
        Self::new()
    }
}
