//! Hardware backend over `midir`.
//!
//! Enumerates real ports into one id space (inputs first, then outputs,
//! so a single id names a device regardless of direction). midir delivers
//! input through a callback; the poll/read surface the receiver expects
//! is recovered by parking decoded events in an internal channel.

use crate::backend::{MidiBackend, MidiInputDevice, MidiOutputDevice};
use crate::error::MidiError;
use crate::types::{DeviceInfo, MidiEvent, SessionClock};
use crossbeam_channel::{unbounded, Receiver};
use log::info;
use midir::{Ignore, MidiInput, MidiInputConnection, MidiOutput, MidiOutputConnection};

const CLIENT_NAME: &str = "keystream";

pub struct MidirBackend {
    inputs: Vec<String>,
    outputs: Vec<String>,
    opened: Vec<bool>,
    clock: SessionClock,
}

impl MidirBackend {
    pub fn new(clock: SessionClock) -> Self {
        Self {
            inputs: Vec::new(),
            outputs: Vec::new(),
            opened: Vec::new(),
            clock,
        }
    }

    fn port_name(&self, id: usize) -> Result<&str, MidiError> {
        self.inputs
            .iter()
            .chain(self.outputs.iter())
            .nth(id)
            .map(String::as_str)
            .ok_or(MidiError::NoSuchDevice(id))
    }
}

impl MidiBackend for MidirBackend {
    fn init(&mut self) -> Result<(), MidiError> {
        let midi_in =
            MidiInput::new(CLIENT_NAME).map_err(|e| MidiError::Init(e.to_string()))?;
        let midi_out =
            MidiOutput::new(CLIENT_NAME).map_err(|e| MidiError::Init(e.to_string()))?;

        self.inputs = midi_in
            .ports()
            .iter()
            .filter_map(|p| midi_in.port_name(p).ok())
            .collect();
        self.outputs = midi_out
            .ports()
            .iter()
            .filter_map(|p| midi_out.port_name(p).ok())
            .collect();
        self.opened = vec![false; self.inputs.len() + self.outputs.len()];

        info!(
            "midir: {} inputs, {} outputs",
            self.inputs.len(),
            self.outputs.len()
        );
        Ok(())
    }

    fn quit(&mut self) {
        self.inputs.clear();
        self.outputs.clear();
        self.opened.clear();
    }

    fn device_count(&self) -> usize {
        self.inputs.len() + self.outputs.len()
    }

    fn default_input_id(&self) -> Option<usize> {
        if self.inputs.is_empty() {
            None
        } else {
            Some(0)
        }
    }

    fn default_output_id(&self) -> Option<usize> {
        if self.outputs.is_empty() {
            None
        } else {
            Some(self.inputs.len())
        }
    }

    fn device_info(&self, id: usize) -> Option<DeviceInfo> {
        let is_input = id < self.inputs.len();
        let name = self
            .inputs
            .iter()
            .chain(self.outputs.iter())
            .nth(id)?
            .clone();
        Some(DeviceInfo {
            interface: "midir".into(),
            name,
            input: is_input,
            output: !is_input,
            opened: self.opened.get(id).copied().unwrap_or(false),
        })
    }

    fn create_input(&mut self, id: usize) -> Result<Box<dyn MidiInputDevice>, MidiError> {
        if id >= self.inputs.len() {
            return if id < self.device_count() {
                Err(MidiError::WrongDirection(id))
            } else {
                Err(MidiError::NoSuchDevice(id))
            };
        }
        let name = self.port_name(id)?.to_string();

        let mut midi_in =
            MidiInput::new(CLIENT_NAME).map_err(|e| MidiError::Init(e.to_string()))?;
        midi_in.ignore(Ignore::None);

        // Ports can disappear between enumeration and open; match by name.
        let port = midi_in
            .ports()
            .into_iter()
            .find(|p| midi_in.port_name(p).ok().as_deref() == Some(name.as_str()))
            .ok_or_else(|| MidiError::DeviceOpen {
                id,
                reason: format!("port '{}' no longer present", name),
            })?;

        let (tx, rx) = unbounded();
        let clock = self.clock.clone();
        let conn = midi_in
            .connect(
                &port,
                CLIENT_NAME,
                move |_stamp, message, _| {
                    if let Some(event) = decode_message(message, clock.now_us()) {
                        let _ = tx.send(event);
                    }
                },
                (),
            )
            .map_err(|e| MidiError::DeviceOpen {
                id,
                reason: e.to_string(),
            })?;

        self.opened[id] = true;
        info!("midir: opened input '{}'", name);
        Ok(Box::new(MidirInputDevice {
            conn: Some(conn),
            rx,
        }))
    }

    fn create_output(&mut self, id: usize) -> Result<Box<dyn MidiOutputDevice>, MidiError> {
        if id >= self.device_count() {
            return Err(MidiError::NoSuchDevice(id));
        }
        if id < self.inputs.len() {
            return Err(MidiError::WrongDirection(id));
        }
        let name = self.port_name(id)?.to_string();

        let midi_out =
            MidiOutput::new(CLIENT_NAME).map_err(|e| MidiError::Init(e.to_string()))?;
        let port = midi_out
            .ports()
            .into_iter()
            .find(|p| midi_out.port_name(p).ok().as_deref() == Some(name.as_str()))
            .ok_or_else(|| MidiError::DeviceOpen {
                id,
                reason: format!("port '{}' no longer present", name),
            })?;

        let conn = midi_out
            .connect(&port, CLIENT_NAME)
            .map_err(|e| MidiError::DeviceOpen {
                id,
                reason: e.to_string(),
            })?;

        self.opened[id] = true;
        info!("midir: opened output '{}'", name);
        Ok(Box::new(MidirOutputDevice { conn: Some(conn) }))
    }
}

/// Decode a raw midir message into the queue wire shape. System messages
/// (status ≥ 0xF0) carry no key state and are dropped.
fn decode_message(message: &[u8], timestamp_us: u64) -> Option<MidiEvent> {
    let (&status, rest) = message.split_first()?;
    if status >= 0xF0 {
        return None;
    }
    let data1 = rest.first().copied().unwrap_or(0);
    let data2 = rest.get(1).copied().unwrap_or(0);
    Some(MidiEvent::new(status, data1, data2, timestamp_us))
}

struct MidirInputDevice {
    conn: Option<MidiInputConnection<()>>,
    rx: Receiver<MidiEvent>,
}

impl MidiInputDevice for MidirInputDevice {
    fn poll(&mut self) -> bool {
        !self.rx.is_empty()
    }

    fn read(&mut self, max: usize) -> Vec<MidiEvent> {
        self.rx.try_iter().take(max).collect()
    }

    fn close(&mut self) -> Result<(), MidiError> {
        if let Some(conn) = self.conn.take() {
            conn.close();
        }
        Ok(())
    }
}

struct MidirOutputDevice {
    conn: Option<MidiOutputConnection>,
}

impl MidirOutputDevice {
    fn send(&mut self, message: &[u8]) -> Result<(), MidiError> {
        match self.conn.as_mut() {
            Some(conn) => conn
                .send(message)
                .map_err(|e| MidiError::Send(e.to_string())),
            None => Err(MidiError::Send("output already closed".into())),
        }
    }
}

impl MidiOutputDevice for MidirOutputDevice {
    fn note_on(&mut self, note: u8, velocity: u8) -> Result<(), MidiError> {
        self.send(&[0x90, note & 0x7F, velocity & 0x7F])
    }

    fn note_off(&mut self, note: u8) -> Result<(), MidiError> {
        self.send(&[0x80, note & 0x7F, 0])
    }

    fn write_short(&mut self, status: u8, data1: u8, data2: u8) -> Result<(), MidiError> {
        self.send(&[status, data1, data2])
    }

    fn close(&mut self) -> Result<(), MidiError> {
        if let Some(conn) = self.conn.take() {
            conn.close();
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_note_on() {
        let ev = decode_message(&[0x91, 60, 100], 42).unwrap();
        assert_eq!(ev.data, [0x91, 60, 100, 0]);
        assert_eq!(ev.timestamp_us, 42);
    }

    #[test]
    fn test_decode_short_message_pads() {
        let ev = decode_message(&[0xC0, 5], 0).unwrap();
        assert_eq!(ev.data, [0xC0, 5, 0, 0]);
    }

    #[test]
    fn test_decode_drops_system_and_empty() {
        assert!(decode_message(&[0xF8], 0).is_none());
        assert!(decode_message(&[], 0).is_none());
    }
}
