//! Pipeline orchestrator.
//!
//! `MidiController` owns the shared event queue and the single mutex
//! guarding lifecycle flags and device handles. It builds the receiver,
//! handler, and file player against that shared state, opens devices
//! through the backend, and runs the worker threads.

use crate::backend::{MidiBackend, MidiInputDevice, MidiOutputDevice};
use crate::dispatcher::UiDispatcher;
use crate::handler::MidiHandler;
use crate::notes;
use crate::player::MidiFilePlayer;
use crate::receiver::MidiReceiver;
use crate::types::{DeviceInfo, MidiEvent, SessionClock};
use crossbeam_channel::{unbounded, Sender};
use log::{error, info, warn};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};

/// Lifecycle flags and opened device handles, all behind one mutex.
///
/// `ending` is monotonic: once set it never reverts, and it is the only
/// termination signal the worker loops ever see.
#[derive(Default)]
pub struct SharedState {
    pub started: bool,
    pub ending: bool,
    pub input: Option<Box<dyn MidiInputDevice>>,
    pub output: Option<Box<dyn MidiOutputDevice>>,
}

pub type Shared = Arc<Mutex<SharedState>>;

pub struct MidiController {
    backend: Mutex<Box<dyn MidiBackend>>,
    shared: Shared,
    queue: Sender<MidiEvent>,
    clock: SessionClock,
    devices: Vec<DeviceInfo>,
    input_id: Option<usize>,
    output_id: Option<usize>,
    receiver: Arc<MidiReceiver>,
    handler: Arc<MidiHandler>,
    player: Arc<MidiFilePlayer>,
    handles: Mutex<Vec<JoinHandle<()>>>,
}

impl MidiController {
    /// Initialize the backend, enumerate devices, resolve default ids,
    /// build the workers, and connect.
    pub fn new(mut backend: Box<dyn MidiBackend>, dispatcher: Arc<UiDispatcher>) -> Self {
        if let Err(e) = backend.init() {
            error!("midi backend init failed: {}", e);
        }

        let devices: Vec<DeviceInfo> = (0..backend.device_count())
            .filter_map(|id| backend.device_info(id))
            .collect();
        let input_id = backend.default_input_id();
        let output_id = backend.default_output_id();

        let clock = SessionClock::new();
        let shared: Shared = Arc::new(Mutex::new(SharedState::default()));
        let (queue_tx, queue_rx) = unbounded::<MidiEvent>();

        let receiver = Arc::new(MidiReceiver::new(queue_tx.clone(), shared.clone()));
        let handler = Arc::new(MidiHandler::new(queue_rx, shared.clone()));
        handler.set_dispatcher(dispatcher);
        let player = Arc::new(MidiFilePlayer::new(
            queue_tx.clone(),
            shared.clone(),
            clock.clone(),
        ));

        let controller = Self {
            backend: Mutex::new(backend),
            shared,
            queue: queue_tx,
            clock,
            devices,
            input_id,
            output_id,
            receiver,
            handler,
            player,
            handles: Mutex::new(Vec::new()),
        };

        controller.connect();
        controller
    }

    /// Open the configured devices and arm the pipeline.
    ///
    /// Callable at any time; when already started it tears the backend
    /// down and reinitializes it first (the restart path). Opens are best
    /// effort — one device failing does not prevent the other — and the
    /// opened handles land in the shared state for the workers. Returns
    /// false if any configured open failed; never panics.
    pub fn connect(&self) -> bool {
        let mut state = self.shared.lock().unwrap();
        let mut backend = self.backend.lock().unwrap();

        if state.started {
            state.started = false;
            state.input = None;
            state.output = None;
            backend.quit();
            if let Err(e) = backend.init() {
                error!("midi backend reinit failed: {}", e);
                return false;
            }
            info!("midi controller restart");
        }

        let mut ok = true;

        state.input = match self.input_id {
            Some(id) => match backend.create_input(id) {
                Ok(device) => Some(device),
                Err(e) => {
                    warn!("{}", e);
                    ok = false;
                    None
                }
            },
            None => None,
        };

        state.output = match self.output_id {
            Some(id) => match backend.create_output(id) {
                Ok(device) => Some(device),
                Err(e) => {
                    warn!("{}", e);
                    ok = false;
                    None
                }
            },
            None => None,
        };

        state.started = true;
        ok
    }

    /// Synthetic-input entry point for the on-screen keyboard: it acts as
    /// a virtual device by feeding the same queue as the real producers.
    /// Unknown note names are a silent no-op.
    pub fn add_key_event(&self, key_name: &str, is_note_on: bool, velocity: u8) {
        let Some(note) = notes::note_number(key_name) else {
            return;
        };

        let event = if is_note_on {
            MidiEvent::note_on(note, velocity, self.clock.now_us())
        } else {
            MidiEvent::note_off(note, self.clock.now_us())
        };
        let _ = self.queue.send(event);
    }

    /// Spawn the receiver, handler, and player threads. Idempotent.
    pub fn start(&self) {
        let mut handles = self.handles.lock().unwrap();
        if !handles.is_empty() {
            return;
        }

        let receiver = self.receiver.clone();
        handles.push(
            thread::Builder::new()
                .name("midi-recv".into())
                .spawn(move || receiver.run())
                .unwrap(),
        );

        let handler = self.handler.clone();
        handles.push(
            thread::Builder::new()
                .name("midi-handler".into())
                .spawn(move || handler.run())
                .unwrap(),
        );

        let player = self.player.clone();
        handles.push(
            thread::Builder::new()
                .name("midi-player".into())
                .spawn(move || player.run())
                .unwrap(),
        );
    }

    /// Cooperative shutdown: set `ending` and join the workers. Each loop
    /// observes the flag within one poll/timeout cycle.
    pub fn shutdown(&self) {
        self.shared.lock().unwrap().ending = true;
        for handle in self.handles.lock().unwrap().drain(..) {
            let _ = handle.join();
        }

        // The receiver closes the input on its way out; whatever is left
        // (normally just the output) is closed here before the backend
        // goes down.
        {
            let mut state = self.shared.lock().unwrap();
            if let Some(mut input) = state.input.take() {
                let _ = input.close();
            }
            if let Some(mut output) = state.output.take() {
                let _ = output.close();
            }
        }
        self.backend.lock().unwrap().quit();
    }

    /// Replace the dispatcher the handler posts UI updates through.
    pub fn set_dispatcher(&self, dispatcher: Arc<UiDispatcher>) {
        self.handler.set_dispatcher(dispatcher);
    }

    /// Select the input device for the next `connect`.
    pub fn set_input_id(&mut self, id: Option<usize>) {
        self.input_id = id;
    }

    /// Select the output device for the next `connect`.
    pub fn set_output_id(&mut self, id: Option<usize>) {
        self.output_id = id;
    }

    pub fn input_id(&self) -> Option<usize> {
        self.input_id
    }

    pub fn output_id(&self) -> Option<usize> {
        self.output_id
    }

    pub fn devices(&self) -> &[DeviceInfo] {
        &self.devices
    }

    pub fn player(&self) -> &Arc<MidiFilePlayer> {
        &self.player
    }

    pub fn shared(&self) -> &Shared {
        &self.shared
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fake_backend::{FakeBackend, SentMessage};
    use std::sync::atomic::Ordering;
    use std::time::{Duration, Instant};

    fn wait_for<F: Fn() -> bool>(cond: F, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        while Instant::now() < deadline {
            if cond() {
                return true;
            }
            thread::sleep(Duration::from_millis(5));
        }
        cond()
    }

    #[test]
    fn test_construction_enumerates_and_connects() {
        let backend = FakeBackend::new();
        let controller =
            MidiController::new(Box::new(backend), Arc::new(UiDispatcher::new()));

        assert_eq!(controller.devices().len(), 2);
        assert_eq!(controller.input_id(), Some(0));
        assert_eq!(controller.output_id(), Some(1));

        let state = controller.shared().lock().unwrap();
        assert!(state.started);
        assert!(state.input.is_some());
        assert!(state.output.is_some());
    }

    #[test]
    fn test_connect_with_no_devices_succeeds() {
        let backend = FakeBackend::empty();
        let controller =
            MidiController::new(Box::new(backend), Arc::new(UiDispatcher::new()));
        let state = controller.shared().lock().unwrap();
        assert!(state.started);
        assert!(state.input.is_none());
        assert!(state.output.is_none());
    }

    #[test]
    fn test_connect_input_failure_still_opens_output() {
        let backend = FakeBackend::new().with_input_failure();
        let controller =
            MidiController::new(Box::new(backend), Arc::new(UiDispatcher::new()));

        // Construction already ran connect once; run it again for the
        // explicit boolean.
        assert!(!controller.connect());
        let state = controller.shared().lock().unwrap();
        assert!(state.input.is_none());
        assert!(state.output.is_some(), "output opened despite input failure");
        assert!(state.started);
    }

    #[test]
    fn test_reconnect_restarts_backend() {
        let backend = FakeBackend::new();
        let inits = backend.init_counter();
        let quits = backend.quit_counter();
        let controller =
            MidiController::new(Box::new(backend), Arc::new(UiDispatcher::new()));

        assert_eq!(inits.load(Ordering::SeqCst), 1);
        assert_eq!(quits.load(Ordering::SeqCst), 0);

        assert!(controller.connect());
        assert_eq!(quits.load(Ordering::SeqCst), 1, "restart quits the backend");
        assert_eq!(inits.load(Ordering::SeqCst), 2, "and reinitializes it");
        assert!(controller.shared().lock().unwrap().started);
    }

    #[test]
    fn test_add_key_event_reaches_output_device() {
        let backend = FakeBackend::new();
        let sent = backend.sent_messages();
        let controller =
            MidiController::new(Box::new(backend), Arc::new(UiDispatcher::new()));
        controller.start();

        controller.add_key_event("C4", true, 64);
        controller.add_key_event("C4", false, 0);

        assert!(wait_for(
            || sent.lock().unwrap().len() == 2,
            Duration::from_secs(2)
        ));
        assert_eq!(
            *sent.lock().unwrap(),
            vec![
                SentMessage::NoteOn { note: 72, velocity: 64 },
                SentMessage::NoteOff { note: 72 },
            ]
        );

        controller.shutdown();
    }

    #[test]
    fn test_add_key_event_unknown_name_is_noop() {
        let backend = FakeBackend::new();
        let sent = backend.sent_messages();
        let controller =
            MidiController::new(Box::new(backend), Arc::new(UiDispatcher::new()));
        controller.start();

        controller.add_key_event("H9", true, 64);
        controller.add_key_event("", true, 64);
        controller.add_key_event("A4", true, 80);

        // Only the valid name produces output; A4 = key 81.
        assert!(wait_for(
            || !sent.lock().unwrap().is_empty(),
            Duration::from_secs(2)
        ));
        thread::sleep(Duration::from_millis(50));
        assert_eq!(
            *sent.lock().unwrap(),
            vec![SentMessage::NoteOn { note: 81, velocity: 80 }]
        );

        controller.shutdown();
    }

    #[test]
    fn test_shutdown_joins_workers_promptly() {
        let controller =
            MidiController::new(Box::new(FakeBackend::new()), Arc::new(UiDispatcher::new()));
        controller.start();
        thread::sleep(Duration::from_millis(30));

        let started = Instant::now();
        controller.shutdown();
        assert!(
            started.elapsed() < Duration::from_secs(3),
            "workers observed ending within one poll/timeout cycle"
        );
    }
}
