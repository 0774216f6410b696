//! Terminal stand-in for the on-screen keyboard.
//!
//! Implements the same two-method surface a real keyboard widget exposes
//! (`set_key_state`, `set_sustain`) and is reached the same way — only by
//! name through the dispatcher. Useful for headless runs and tests.

use crate::dispatcher::{UiTarget, UiValue};
use crate::notes;
use crate::types::KEY_ACTIVE;
use log::info;
use std::sync::Mutex;

struct KeyboardState {
    active: [bool; 128],
    sustain: bool,
}

impl Default for KeyboardState {
    fn default() -> Self {
        Self {
            active: [false; 128],
            sustain: false,
        }
    }
}

pub struct ConsoleKeyboard {
    state: Mutex<KeyboardState>,
}

impl ConsoleKeyboard {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(KeyboardState::default()),
        }
    }

    /// Names of currently pressed keys, lowest first.
    pub fn pressed_keys(&self) -> Vec<&'static str> {
        let state = self.state.lock().unwrap();
        (0u8..=127)
            .filter(|&k| state.active[k as usize])
            .filter_map(notes::note_name)
            .collect()
    }

    pub fn sustain(&self) -> bool {
        self.state.lock().unwrap().sustain
    }

    fn set_key_state(&self, name: &str, active: bool) {
        let Some(key) = notes::note_number(name) else {
            return;
        };
        let mut state = self.state.lock().unwrap();
        state.active[key as usize] = active;
        let line = render_line(&state);
        drop(state);
        info!("keys: {}", line);
    }

    fn set_sustain(&self, pressed: bool) {
        let mut state = self.state.lock().unwrap();
        state.sustain = pressed;
        let line = render_line(&state);
        drop(state);
        info!("keys: {}", line);
    }
}

impl Default for ConsoleKeyboard {
    fn default() -> Self {
        Self::new()
    }
}

impl UiTarget for ConsoleKeyboard {
    fn responds_to(&self, method: &str) -> bool {
        matches!(method, "set_key_state" | "set_sustain")
    }

    fn invoke(&self, method: &str, args: &[UiValue]) {
        match method {
            "set_key_state" => {
                let (Some(name), Some(state)) = (
                    args.first().and_then(UiValue::as_str),
                    args.get(1).and_then(UiValue::as_str),
                ) else {
                    return;
                };
                self.set_key_state(name, state == KEY_ACTIVE);
            }
            "set_sustain" => {
                let Some(pressed) = args.first().and_then(UiValue::as_bool) else {
                    return;
                };
                self.set_sustain(pressed);
            }
            _ => {}
        }
    }
}

fn render_line(state: &KeyboardState) -> String {
    let mut names: Vec<&str> = (0u8..=127)
        .filter(|&k| state.active[k as usize])
        .filter_map(notes::note_name)
        .collect();
    if names.is_empty() {
        names.push("-");
    }
    let mut line = names.join(" ");
    if state.sustain {
        line.push_str("  [sustain]");
    }
    line
}
