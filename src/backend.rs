//! Backend capability: device enumeration and device-object creation.
//!
//! `MidiController` talks to hardware only through these traits, so the
//! whole pipeline runs unchanged against `MidirBackend` (real devices,
//! feature `hardware`) or `FakeBackend` (scripted devices, tests and
//! `--fake` runs).

use crate::error::MidiError;
use crate::types::{DeviceInfo, MidiEvent};

pub trait MidiBackend: Send {
    /// Initialize the backend and refresh device enumeration.
    fn init(&mut self) -> Result<(), MidiError>;

    /// Shut the backend down. Safe to call repeatedly, and `init` may be
    /// called again afterwards (the controller's restart path does both).
    fn quit(&mut self);

    /// Number of enumerated devices. Ids run `0..count` over one id space
    /// covering both directions.
    fn device_count(&self) -> usize;

    /// Default input device id; `None` means no input device.
    fn default_input_id(&self) -> Option<usize>;

    /// Default output device id; `None` means no output device.
    fn default_output_id(&self) -> Option<usize>;

    fn device_info(&self, id: usize) -> Option<DeviceInfo>;

    fn create_input(&mut self, id: usize) -> Result<Box<dyn MidiInputDevice>, MidiError>;

    fn create_output(&mut self, id: usize) -> Result<Box<dyn MidiOutputDevice>, MidiError>;
}

/// An opened input device, polled by `MidiReceiver`.
pub trait MidiInputDevice: Send {
    /// True when at least one event is waiting.
    fn poll(&mut self) -> bool;

    /// Read up to `max` pending events. May return fewer, never blocks.
    fn read(&mut self, max: usize) -> Vec<MidiEvent>;

    fn close(&mut self) -> Result<(), MidiError>;
}

/// An opened output device, written by `MidiHandler`.
pub trait MidiOutputDevice: Send {
    fn note_on(&mut self, note: u8, velocity: u8) -> Result<(), MidiError>;

    fn note_off(&mut self, note: u8) -> Result<(), MidiError>;

    /// Write a raw three-byte message.
    fn write_short(&mut self, status: u8, data1: u8, data2: u8) -> Result<(), MidiError>;

    fn close(&mut self) -> Result<(), MidiError>;
}
