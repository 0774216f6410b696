use keystream::backend::MidiBackend;
use keystream::console_keyboard::ConsoleKeyboard;
use keystream::controller::MidiController;
use keystream::dispatcher::{UiDispatcher, PUMP_PERIOD};
use keystream::fake_backend::{FakeBackend, ScriptedEvent};
#[cfg(feature = "hardware")]
use keystream::midir_backend::MidirBackend;
use keystream::handler::KEYBOARD_TARGET;
use keystream::types::{MidiEvent, CC_SUSTAIN};

use clap::Parser;
use log::{error, info};
use std::path::PathBuf;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

#[derive(Parser)]
#[command(name = "keystream")]
#[command(about = "Concurrent MIDI event pipeline driving an on-screen piano keyboard")]
struct Cli {
    /// List MIDI devices and exit
    #[arg(long)]
    list_devices: bool,

    /// Print the device list as JSON (with --list-devices)
    #[arg(long)]
    json: bool,

    /// Input device id (overrides the backend default)
    #[arg(long)]
    input: Option<usize>,

    /// Output device id (overrides the backend default)
    #[arg(long)]
    output: Option<usize>,

    /// Do not open any input device
    #[arg(long)]
    no_input: bool,

    /// Do not open any output device
    #[arg(long)]
    no_output: bool,

    /// Use the fake backend (no hardware required)
    #[arg(long)]
    fake: bool,

    /// Feed the fake input a short scripted performance
    #[arg(long)]
    demo: bool,

    /// MIDI file to play through the pipeline
    #[arg(long)]
    play: Option<PathBuf>,

    /// Loop file playback
    #[arg(long = "loop")]
    loop_playback: bool,

    /// Dispatcher pump period in milliseconds
    #[arg(long, default_value_t = PUMP_PERIOD.as_millis() as u64)]
    pump_ms: u64,

    /// Run duration in seconds (0 = run until Ctrl+C)
    #[arg(long, default_value_t = 0)]
    duration: u64,
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    let cli = Cli::parse();

    let fake = cli.fake || !cfg!(feature = "hardware");

    info!("═══════════════════════════════════════════════");
    info!("  KEYSTREAM v{}", env!("CARGO_PKG_VERSION"));
    info!("  Backend: {}", if fake { "FAKE" } else { "HARDWARE (midir)" });
    info!("═══════════════════════════════════════════════");

    let backend: Box<dyn MidiBackend> = if fake {
        let mut backend = FakeBackend::new();
        if cli.demo {
            backend = backend.with_script(demo_script());
        }
        Box::new(backend)
    } else {
        hardware_backend()
    };

    let dispatcher = Arc::new(UiDispatcher::new());
    let keyboard = Arc::new(ConsoleKeyboard::new());
    dispatcher.register(KEYBOARD_TARGET, &keyboard);

    let mut controller = MidiController::new(backend, dispatcher.clone());

    if cli.list_devices {
        if cli.json {
            println!(
                "{}",
                serde_json::to_string_pretty(controller.devices()).unwrap_or_default()
            );
        } else {
            for (id, device) in controller.devices().iter().enumerate() {
                println!("{:>3}  {}", id, device);
            }
        }
        return;
    }

    // CLI id overrides go through the reconnect (restart) path.
    let mut override_ids = false;
    if cli.no_input {
        controller.set_input_id(None);
        override_ids = true;
    } else if cli.input.is_some() {
        controller.set_input_id(cli.input);
        override_ids = true;
    }
    if cli.no_output {
        controller.set_output_id(None);
        override_ids = true;
    } else if cli.output.is_some() {
        controller.set_output_id(cli.output);
        override_ids = true;
    }
    if override_ids && !controller.connect() {
        error!("one or more MIDI devices failed to open; continuing without them");
    }

    info!("  Input:  {}", describe(&controller, controller.input_id()));
    info!("  Output: {}", describe(&controller, controller.output_id()));

    controller.start();

    if let Some(path) = &cli.play {
        let player = controller.player();
        player.set_file(path);
        player.set_loop(cli.loop_playback);
        if player.play() {
            info!("Playing {:?}{}", path, if cli.loop_playback { " (loop)" } else { "" });
        }
    }

    // The main thread is the UI thread: it owns the recurring pump.
    info!("Running. Press Ctrl+C to stop.");
    let started = Instant::now();
    let pump_period = Duration::from_millis(cli.pump_ms.max(1));
    loop {
        dispatcher.pump();
        thread::sleep(pump_period);

        if cli.duration > 0 && started.elapsed() >= Duration::from_secs(cli.duration) {
            info!("Duration elapsed.");
            break;
        }
        // A one-shot file run exits once the player goes idle.
        if cli.play.is_some()
            && !cli.loop_playback
            && !controller.player().is_playing()
            && !controller.player().is_paused()
        {
            info!("Playback finished.");
            break;
        }
    }

    controller.shutdown();
    dispatcher.pump();
}

#[cfg(feature = "hardware")]
fn hardware_backend() -> Box<dyn MidiBackend> {
    Box::new(MidirBackend::new(keystream::types::SessionClock::new()))
}

#[cfg(not(feature = "hardware"))]
fn hardware_backend() -> Box<dyn MidiBackend> {
    unreachable!("fake is forced when the hardware feature is off")
}

fn describe(controller: &MidiController, id: Option<usize>) -> String {
    match id {
        Some(id) => match controller.devices().get(id) {
            Some(device) => format!("{} — {}", id, device.name),
            None => format!("{} (unknown)", id),
        },
        None => "none".into(),
    }
}

/// A few bars of scripted input so `--fake --demo` exercises the whole
/// pipeline: a C major arpeggio under sustain, then release.
fn demo_script() -> Vec<ScriptedEvent> {
    let mut script = Vec::new();
    let mut at = Duration::from_millis(300);
    let mut push = |after: Duration, event: MidiEvent| {
        script.push(ScriptedEvent { after, event });
    };

    push(at, MidiEvent::control_change(CC_SUSTAIN, 127, 0));
    for (i, key) in [72u8, 76, 79, 84].into_iter().enumerate() {
        at += Duration::from_millis(400);
        push(at, MidiEvent::note_on(key, 80 + i as u8 * 10, 0));
        push(at + Duration::from_millis(350), MidiEvent::note_off(key, 0));
    }
    at += Duration::from_millis(900);
    push(at, MidiEvent::control_change(CC_SUSTAIN, 0, 0));
    script
}
