//! The pipeline's only queue consumer.
//!
//! Drains the shared event queue, forwards to the output device when one
//! is attached, and mirrors key/sustain state onto the UI — always through
//! the dispatcher, never by touching a UI object directly. Output device,
//! dispatcher, and the registered keyboard are all optional; whatever is
//! absent is simply skipped.

use crate::controller::Shared;
use crate::dispatcher::UiDispatcher;
use crate::notes;
use crate::types::{MidiEvent, MidiEventKind, CC_SUSTAIN, KEY_ACTIVE, KEY_NORMAL};
use crossbeam_channel::{Receiver, RecvTimeoutError};
use log::{info, warn};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Queue read timeout; `ending` is only checked this often when idle.
const RECV_TIMEOUT: Duration = Duration::from_secs(1);

/// Name the on-screen keyboard registers under.
pub const KEYBOARD_TARGET: &str = "keyboard";

pub struct MidiHandler {
    queue: Receiver<MidiEvent>,
    shared: Shared,
    dispatcher: Mutex<Option<Arc<UiDispatcher>>>,
}

impl MidiHandler {
    pub fn new(queue: Receiver<MidiEvent>, shared: Shared) -> Self {
        Self {
            queue,
            shared,
            dispatcher: Mutex::new(None),
        }
    }

    /// Attach (or replace) the UI dispatcher. Callable at any time, from
    /// any thread.
    pub fn set_dispatcher(&self, dispatcher: Arc<UiDispatcher>) {
        *self.dispatcher.lock().unwrap() = Some(dispatcher);
    }

    /// Main handler loop. Blocks the calling thread until `ending`.
    pub fn run(&self) {
        loop {
            match self.queue.recv_timeout(RECV_TIMEOUT) {
                Ok(event) => self.dispatch(event),
                Err(RecvTimeoutError::Timeout) => {
                    if self.shared.lock().unwrap().ending {
                        break;
                    }
                }
                Err(RecvTimeoutError::Disconnected) => break,
            }
        }
        info!("midi process thread exit");
    }

    /// Route one event by status nibble. Anything unrecognized is dropped.
    pub fn dispatch(&self, event: MidiEvent) {
        match event.kind() {
            MidiEventKind::NoteOff => self.note_off(event.data1()),
            MidiEventKind::NoteOn => self.note_on(event.data1(), event.data2()),
            MidiEventKind::ControlChange => {
                if event.data1() == CC_SUSTAIN {
                    self.sustain_change(event.status(), event.data2());
                }
            }
            MidiEventKind::Other => {}
        }
    }

    fn note_on(&self, key: u8, velocity: u8) {
        let Some(name) = notes::note_name(key) else {
            return;
        };

        if let Some(output) = self.shared.lock().unwrap().output.as_mut() {
            if let Err(e) = output.note_on(key, velocity) {
                warn!("output note_on failed: {}", e);
            }
        }

        self.post_key_state(name, KEY_ACTIVE);
    }

    fn note_off(&self, key: u8) {
        let Some(name) = notes::note_name(key) else {
            return;
        };

        if let Some(output) = self.shared.lock().unwrap().output.as_mut() {
            if let Err(e) = output.note_off(key) {
                warn!("output note_off failed: {}", e);
            }
        }

        self.post_key_state(name, KEY_NORMAL);
    }

    fn sustain_change(&self, status: u8, value: u8) {
        if let Some(output) = self.shared.lock().unwrap().output.as_mut() {
            if let Err(e) = output.write_short(status, CC_SUSTAIN, value) {
                warn!("output sustain write failed: {}", e);
            }
        }

        if let Some(dispatcher) = self.dispatcher.lock().unwrap().as_ref() {
            dispatcher.post_to(KEYBOARD_TARGET, "set_sustain", vec![(value > 0).into()]);
        }
    }

    fn post_key_state(&self, name: &str, state: &str) {
        if let Some(dispatcher) = self.dispatcher.lock().unwrap().as_ref() {
            dispatcher.post_to(
                KEYBOARD_TARGET,
                "set_key_state",
                vec![name.into(), state.into()],
            );
        }
    }
}
