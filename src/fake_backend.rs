//! Fully substitutable backend: scripted input, recording output.
//!
//! Serves the same role the simulator serves in a hardware capture rig —
//! the entire pipeline runs against it with no devices attached. Scripted
//! events can carry due-times so a `--fake --demo` run paces like a real
//! performance; tests use zero offsets and read the recording output.

use crate::backend::{MidiBackend, MidiInputDevice, MidiOutputDevice};
use crate::error::MidiError;
use crate::types::{DeviceInfo, MidiEvent};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// What a fake output device was asked to play.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SentMessage {
    NoteOn { note: u8, velocity: u8 },
    NoteOff { note: u8 },
    Raw(u8, u8, u8),
}

/// An input event that becomes readable `after` the device is opened.
#[derive(Debug, Clone)]
pub struct ScriptedEvent {
    pub after: Duration,
    pub event: MidiEvent,
}

impl ScriptedEvent {
    /// Immediately-due event, the common case in tests.
    pub fn now(event: MidiEvent) -> Self {
        Self {
            after: Duration::ZERO,
            event,
        }
    }
}

pub struct FakeBackend {
    devices: Vec<DeviceInfo>,
    default_input: Option<usize>,
    default_output: Option<usize>,
    script: Vec<ScriptedEvent>,
    sent: Arc<Mutex<Vec<SentMessage>>>,
    input_closed: Arc<AtomicBool>,
    output_closed: Arc<AtomicBool>,
    fail_input: bool,
    fail_output: bool,
    init_calls: Arc<AtomicUsize>,
    quit_calls: Arc<AtomicUsize>,
}

impl FakeBackend {
    /// One input and one output device, both set as defaults.
    pub fn new() -> Self {
        Self {
            devices: vec![
                DeviceInfo {
                    interface: "fake".into(),
                    name: "Fake Keyboard In".into(),
                    input: true,
                    output: false,
                    opened: false,
                },
                DeviceInfo {
                    interface: "fake".into(),
                    name: "Fake Synth Out".into(),
                    input: false,
                    output: true,
                    opened: false,
                },
            ],
            default_input: Some(0),
            default_output: Some(1),
            script: Vec::new(),
            sent: Arc::new(Mutex::new(Vec::new())),
            input_closed: Arc::new(AtomicBool::new(false)),
            output_closed: Arc::new(AtomicBool::new(false)),
            fail_input: false,
            fail_output: false,
            init_calls: Arc::new(AtomicUsize::new(0)),
            quit_calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// A backend with nothing attached: no devices, no defaults.
    pub fn empty() -> Self {
        Self {
            devices: Vec::new(),
            default_input: None,
            default_output: None,
            ..Self::new()
        }
    }

    /// Events the next opened input device will deliver.
    pub fn with_script(mut self, script: Vec<ScriptedEvent>) -> Self {
        self.script = script;
        self
    }

    /// Make `create_input` fail, for exercising `connect()`'s false path.
    pub fn with_input_failure(mut self) -> Self {
        self.fail_input = true;
        self
    }

    pub fn with_output_failure(mut self) -> Self {
        self.fail_output = true;
        self
    }

    /// Handle to everything fake outputs were asked to play.
    pub fn sent_messages(&self) -> Arc<Mutex<Vec<SentMessage>>> {
        self.sent.clone()
    }

    /// True once an input created by this backend has been closed.
    pub fn input_closed_flag(&self) -> Arc<AtomicBool> {
        self.input_closed.clone()
    }

    pub fn output_closed_flag(&self) -> Arc<AtomicBool> {
        self.output_closed.clone()
    }

    /// Counter handles; usable after the backend moves into a controller.
    pub fn init_counter(&self) -> Arc<AtomicUsize> {
        self.init_calls.clone()
    }

    pub fn quit_counter(&self) -> Arc<AtomicUsize> {
        self.quit_calls.clone()
    }
}

impl Default for FakeBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl MidiBackend for FakeBackend {
    fn init(&mut self) -> Result<(), MidiError> {
        self.init_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn quit(&mut self) {
        self.quit_calls.fetch_add(1, Ordering::SeqCst);
        for dev in &mut self.devices {
            dev.opened = false;
        }
    }

    fn device_count(&self) -> usize {
        self.devices.len()
    }

    fn default_input_id(&self) -> Option<usize> {
        self.default_input
    }

    fn default_output_id(&self) -> Option<usize> {
        self.default_output
    }

    fn device_info(&self, id: usize) -> Option<DeviceInfo> {
        self.devices.get(id).cloned()
    }

    fn create_input(&mut self, id: usize) -> Result<Box<dyn MidiInputDevice>, MidiError> {
        if self.fail_input {
            return Err(MidiError::DeviceOpen {
                id,
                reason: "injected input failure".into(),
            });
        }
        let dev = self.devices.get_mut(id).ok_or(MidiError::NoSuchDevice(id))?;
        if !dev.input {
            return Err(MidiError::WrongDirection(id));
        }
        dev.opened = true;
        Ok(Box::new(FakeInputDevice {
            script: self.script.clone().into(),
            opened_at: Instant::now(),
            closed: self.input_closed.clone(),
        }))
    }

    fn create_output(&mut self, id: usize) -> Result<Box<dyn MidiOutputDevice>, MidiError> {
        if self.fail_output {
            return Err(MidiError::DeviceOpen {
                id,
                reason: "injected output failure".into(),
            });
        }
        let dev = self.devices.get_mut(id).ok_or(MidiError::NoSuchDevice(id))?;
        if !dev.output {
            return Err(MidiError::WrongDirection(id));
        }
        dev.opened = true;
        Ok(Box::new(FakeOutputDevice {
            sent: self.sent.clone(),
            closed: self.output_closed.clone(),
        }))
    }
}

struct FakeInputDevice {
    script: VecDeque<ScriptedEvent>,
    opened_at: Instant,
    closed: Arc<AtomicBool>,
}

impl MidiInputDevice for FakeInputDevice {
    fn poll(&mut self) -> bool {
        match self.script.front() {
            Some(ev) => self.opened_at.elapsed() >= ev.after,
            None => false,
        }
    }

    fn read(&mut self, max: usize) -> Vec<MidiEvent> {
        let mut out = Vec::new();
        while out.len() < max {
            match self.script.front() {
                Some(ev) if self.opened_at.elapsed() >= ev.after => {
                    out.push(self.script.pop_front().unwrap().event);
                }
                _ => break,
            }
        }
        out
    }

    fn close(&mut self) -> Result<(), MidiError> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

struct FakeOutputDevice {
    sent: Arc<Mutex<Vec<SentMessage>>>,
    closed: Arc<AtomicBool>,
}

impl MidiOutputDevice for FakeOutputDevice {
    fn note_on(&mut self, note: u8, velocity: u8) -> Result<(), MidiError> {
        self.sent
            .lock()
            .unwrap()
            .push(SentMessage::NoteOn { note, velocity });
        Ok(())
    }

    fn note_off(&mut self, note: u8) -> Result<(), MidiError> {
        self.sent.lock().unwrap().push(SentMessage::NoteOff { note });
        Ok(())
    }

    fn write_short(&mut self, status: u8, data1: u8, data2: u8) -> Result<(), MidiError> {
        self.sent
            .lock()
            .unwrap()
            .push(SentMessage::Raw(status, data1, data2));
        Ok(())
    }

    fn close(&mut self) -> Result<(), MidiError> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_enumeration_and_defaults() {
        let backend = FakeBackend::new();
        assert_eq!(backend.device_count(), 2);
        assert_eq!(backend.default_input_id(), Some(0));
        assert_eq!(backend.default_output_id(), Some(1));
        let info = backend.device_info(0).unwrap();
        assert!(info.input && !info.output && !info.opened);
        assert!(backend.device_info(2).is_none());
    }

    #[test]
    fn test_open_marks_device_opened() {
        let mut backend = FakeBackend::new();
        backend.init().unwrap();
        let _input = backend.create_input(0).unwrap();
        assert!(backend.device_info(0).unwrap().opened);
        backend.quit();
        assert!(!backend.device_info(0).unwrap().opened);
    }

    #[test]
    fn test_wrong_direction_rejected() {
        let mut backend = FakeBackend::new();
        assert!(matches!(
            backend.create_input(1),
            Err(MidiError::WrongDirection(1))
        ));
        assert!(matches!(
            backend.create_output(0),
            Err(MidiError::WrongDirection(0))
        ));
    }

    #[test]
    fn test_scripted_input_reads_in_order() {
        let script = vec![
            ScriptedEvent::now(MidiEvent::note_on(60, 100, 0)),
            ScriptedEvent::now(MidiEvent::note_off(60, 1)),
        ];
        let mut backend = FakeBackend::new().with_script(script);
        let mut input = backend.create_input(0).unwrap();

        assert!(input.poll());
        let events = input.read(8);
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].data, [0x90, 60, 100, 0]);
        assert_eq!(events[1].data, [0x80, 60, 0, 0]);
        assert!(!input.poll());
    }

    #[test]
    fn test_timed_script_not_due_yet() {
        let script = vec![ScriptedEvent {
            after: Duration::from_secs(60),
            event: MidiEvent::note_on(60, 100, 0),
        }];
        let mut backend = FakeBackend::new().with_script(script);
        let mut input = backend.create_input(0).unwrap();
        assert!(!input.poll());
        assert!(input.read(8).is_empty());
    }

    #[test]
    fn test_output_records() {
        let mut backend = FakeBackend::new();
        let sent = backend.sent_messages();
        let mut output = backend.create_output(1).unwrap();
        output.note_on(72, 64).unwrap();
        output.note_off(72).unwrap();
        output.write_short(0xB0, 0x40, 127).unwrap();

        let sent = sent.lock().unwrap();
        assert_eq!(
            *sent,
            vec![
                SentMessage::NoteOn { note: 72, velocity: 64 },
                SentMessage::NoteOff { note: 72 },
                SentMessage::Raw(0xB0, 0x40, 127),
            ]
        );
    }
}
