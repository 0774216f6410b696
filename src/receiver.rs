//! Hardware input polling thread body.

use crate::controller::Shared;
use crate::types::MidiEvent;
use crossbeam_channel::Sender;
use log::{debug, info};
use std::thread;
use std::time::Duration;

/// Events taken per read when the device reports data ready. The queue
/// absorbs bursts, so the batch only bounds time spent under the lock.
const READ_BATCH: usize = 8;

/// Wait between checks for the `started` flag.
const CONNECT_POLL: Duration = Duration::from_millis(100);

/// Idle gap between device polls while running.
const POLL_SLEEP: Duration = Duration::from_millis(1);

/// Polls the opened input device and pushes raw events onto the shared
/// queue. Decouples hardware polling cadence from downstream processing.
pub struct MidiReceiver {
    queue: Sender<MidiEvent>,
    shared: Shared,
}

impl MidiReceiver {
    pub fn new(queue: Sender<MidiEvent>, shared: Shared) -> Self {
        Self { queue, shared }
    }

    /// Main receive loop. Blocks the calling thread until `ending`.
    pub fn run(&self) {
        loop {
            if self.shared.lock().unwrap().ending {
                break;
            }

            if !self.wait_connect() {
                break;
            }

            {
                let mut state = self.shared.lock().unwrap();
                if let Some(input) = state.input.as_mut() {
                    if input.poll() {
                        for event in input.read(READ_BATCH) {
                            let _ = self.queue.send(event);
                        }
                    }
                }
            }

            thread::sleep(POLL_SLEEP);
        }

        // Close the input on the way out; close errors are of no use to
        // anyone at shutdown.
        let mut state = self.shared.lock().unwrap();
        if let Some(mut input) = state.input.take() {
            if let Err(e) = input.close() {
                debug!("receiver: input close failed: {}", e);
            }
        }
        info!("midi receive thread exit");
    }

    /// Coarse-wait until the controller arms `started`, or `ending`.
    /// Returns false on `ending`.
    fn wait_connect(&self) -> bool {
        loop {
            {
                let state = self.shared.lock().unwrap();
                if state.ending {
                    return false;
                }
                if state.started {
                    return true;
                }
            }
            thread::sleep(CONNECT_POLL);
        }
    }
}
