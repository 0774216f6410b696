//! Thread-safety boundary between the MIDI worker threads and UI-owned
//! objects.
//!
//! Background threads never touch a UI target directly. They call
//! [`UiDispatcher::post_to`], which resolves a registered name to a
//! non-owning handle and enqueues the call. The UI thread drains the queue
//! with [`UiDispatcher::pump`] on its event loop at a fixed period
//! (default 10ms); queued calls run FIFO, strictly on that thread.

use crossbeam_channel::{unbounded, Receiver, Sender};
use log::{debug, error};
use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;

/// Default pump period.
pub const PUMP_PERIOD: Duration = Duration::from_millis(10);

/// Argument values carried by a posted call.
#[derive(Debug, Clone, PartialEq)]
pub enum UiValue {
    Str(String),
    Bool(bool),
    Int(i64),
}

impl UiValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            UiValue::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            UiValue::Bool(b) => Some(*b),
            _ => None,
        }
    }
}

impl From<&str> for UiValue {
    fn from(s: &str) -> Self {
        UiValue::Str(s.to_string())
    }
}

impl From<String> for UiValue {
    fn from(s: String) -> Self {
        UiValue::Str(s)
    }
}

impl From<bool> for UiValue {
    fn from(b: bool) -> Self {
        UiValue::Bool(b)
    }
}

impl From<i64> for UiValue {
    fn from(i: i64) -> Self {
        UiValue::Int(i)
    }
}

/// A UI-owned object reachable by name through the dispatcher.
///
/// `invoke` runs only on the UI thread (inside `pump`). Unknown methods
/// must be ignored; `responds_to` lets `post_to` drop them at post time.
pub trait UiTarget: Send + Sync {
    fn responds_to(&self, method: &str) -> bool;

    fn invoke(&self, method: &str, args: &[UiValue]);
}

struct QueuedCall {
    name: String,
    target: Weak<dyn UiTarget>,
    method: String,
    args: Vec<UiValue>,
}

/// Single-threaded, UI-affine callback queue.
///
/// `post_to` is safe from any thread. `pump` must only ever be called
/// from the UI thread; drains are non-reentrant by construction because
/// that thread is the sole caller.
pub struct UiDispatcher {
    tx: Sender<QueuedCall>,
    rx: Receiver<QueuedCall>,
    registry: Mutex<HashMap<String, Weak<dyn UiTarget>>>,
}

impl UiDispatcher {
    pub fn new() -> Self {
        let (tx, rx) = unbounded();
        Self {
            tx,
            rx,
            registry: Mutex::new(HashMap::new()),
        }
    }

    /// Register `target` under `name`. Only a weak handle is stored, so
    /// the dispatcher never extends a UI object's lifetime.
    pub fn register<T: UiTarget + 'static>(&self, name: &str, target: &Arc<T>) {
        let target: Arc<dyn UiTarget> = target.clone();
        let weak: Weak<dyn UiTarget> = Arc::downgrade(&target);
        self.registry.lock().unwrap().insert(name.to_string(), weak);
    }

    pub fn unregister(&self, name: &str) {
        self.registry.lock().unwrap().remove(name);
    }

    /// Post `target.method(args)` for the next drain.
    ///
    /// Unresolvable names, dead targets, and unknown methods are silent
    /// no-ops: posters are background threads with no way to act on the
    /// failure. A dead handle found here is pruned from the registry.
    pub fn post_to(&self, name: &str, method: &str, args: Vec<UiValue>) {
        let weak = {
            let mut registry = self.registry.lock().unwrap();
            let Some(weak) = registry.get(name).cloned() else {
                return;
            };
            if weak.upgrade().is_none() {
                registry.remove(name);
                debug!("dispatcher: pruned dead target '{}'", name);
                return;
            }
            weak
        };

        // Resolve the method now, matching post-time lookup semantics;
        // the target can still die before the drain, which is treated
        // identically to an unregistered name.
        match weak.upgrade() {
            Some(target) if target.responds_to(method) => {
                let _ = self.tx.send(QueuedCall {
                    name: name.to_string(),
                    target: weak,
                    method: method.to_string(),
                    args,
                });
            }
            _ => {}
        }
    }

    /// Drain the entire pending queue, invoking each call in FIFO order.
    ///
    /// Must be called from the UI thread. A panicking callback is caught
    /// and logged; the drain continues and the recurring schedule is
    /// unaffected.
    pub fn pump(&self) {
        while let Ok(call) = self.rx.try_recv() {
            let Some(target) = call.target.upgrade() else {
                continue;
            };
            let result = catch_unwind(AssertUnwindSafe(|| {
                target.invoke(&call.method, &call.args);
            }));
            if result.is_err() {
                error!(
                    "dispatcher: callback panicked: target='{}' method='{}'",
                    call.name, call.method,
                );
            }
        }
    }

    /// Number of calls waiting for the next drain.
    pub fn pending(&self) -> usize {
        self.rx.len()
    }
}

impl Default for UiDispatcher {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct Probe {
        calls: Mutex<Vec<(String, Vec<UiValue>)>>,
        panics: AtomicUsize,
    }

    impl UiTarget for Probe {
        fn responds_to(&self, method: &str) -> bool {
            matches!(method, "set_key_state" | "set_sustain" | "explode")
        }

        fn invoke(&self, method: &str, args: &[UiValue]) {
            if method == "explode" {
                self.panics.fetch_add(1, Ordering::SeqCst);
                panic!("boom");
            }
            self.calls
                .lock()
                .unwrap()
                .push((method.to_string(), args.to_vec()));
        }
    }

    #[test]
    fn test_post_and_pump_fifo() {
        let dispatcher = UiDispatcher::new();
        let probe = Arc::new(Probe::default());
        dispatcher.register("keyboard", &probe);

        dispatcher.post_to("keyboard", "set_key_state", vec!["C4".into(), "active".into()]);
        dispatcher.post_to("keyboard", "set_sustain", vec![true.into()]);
        assert_eq!(dispatcher.pending(), 2);
        dispatcher.pump();

        let calls = probe.calls.lock().unwrap();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].0, "set_key_state");
        assert_eq!(calls[0].1[0], UiValue::Str("C4".into()));
        assert_eq!(calls[1].0, "set_sustain");
        assert_eq!(calls[1].1[0], UiValue::Bool(true));
    }

    #[test]
    fn test_unregistered_name_is_noop() {
        let dispatcher = UiDispatcher::new();
        dispatcher.post_to("nobody", "set_sustain", vec![true.into()]);
        assert_eq!(dispatcher.pending(), 0);
        dispatcher.pump();
    }

    #[test]
    fn test_unknown_method_is_noop() {
        let dispatcher = UiDispatcher::new();
        let probe = Arc::new(Probe::default());
        dispatcher.register("keyboard", &probe);
        dispatcher.post_to("keyboard", "no_such_method", vec![]);
        assert_eq!(dispatcher.pending(), 0);
    }

    #[test]
    fn test_dead_target_pruned() {
        let dispatcher = UiDispatcher::new();
        let probe = Arc::new(Probe::default());
        dispatcher.register("keyboard", &probe);
        drop(probe);

        dispatcher.post_to("keyboard", "set_sustain", vec![false.into()]);
        assert_eq!(dispatcher.pending(), 0);
        // Entry was pruned: a second post takes the unregistered path.
        assert!(!dispatcher.registry.lock().unwrap().contains_key("keyboard"));
    }

    #[test]
    fn test_unregister() {
        let dispatcher = UiDispatcher::new();
        let probe = Arc::new(Probe::default());
        dispatcher.register("keyboard", &probe);
        dispatcher.unregister("keyboard");
        dispatcher.post_to("keyboard", "set_sustain", vec![true.into()]);
        assert_eq!(dispatcher.pending(), 0);
    }

    #[test]
    fn test_panicking_callback_does_not_stop_drain() {
        let dispatcher = UiDispatcher::new();
        let probe = Arc::new(Probe::default());
        dispatcher.register("keyboard", &probe);

        dispatcher.post_to("keyboard", "explode", vec![]);
        dispatcher.post_to("keyboard", "set_sustain", vec![true.into()]);
        dispatcher.pump();

        assert_eq!(probe.panics.load(Ordering::SeqCst), 1);
        let calls = probe.calls.lock().unwrap();
        assert_eq!(calls.len(), 1, "call after the panicking one still ran");
        assert_eq!(calls[0].0, "set_sustain");
    }

    #[test]
    fn test_post_from_background_thread() {
        let dispatcher = Arc::new(UiDispatcher::new());
        let probe = Arc::new(Probe::default());
        dispatcher.register("keyboard", &probe);

        let d = dispatcher.clone();
        std::thread::spawn(move || {
            d.post_to("keyboard", "set_key_state", vec!["A4".into(), "normal".into()]);
        })
        .join()
        .unwrap();

        dispatcher.pump();
        assert_eq!(probe.calls.lock().unwrap().len(), 1);
    }
}
