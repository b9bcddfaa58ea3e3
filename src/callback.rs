//! Fire-and-forget delivery of batch results.

use std::sync::mpsc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, error};

use crate::encoder::Payload;
use crate::types::{Sentinel, Terminal};

/// Body of a delivered callback event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallbackResponse {
    pub payload: Payload,
}

/// A delivered event: callback name plus response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallbackEvent {
    pub name: String,
    pub response: CallbackResponse,
}

/// Sink for named events on the scripting side.
///
/// Delivery is best effort: there is no acknowledgement and nothing is
/// retried.
pub trait EventEmitter: Send + Sync {
    fn emit(&self, name: &str, response: CallbackResponse);
}

impl<F> EventEmitter for F
where
    F: Fn(&str, CallbackResponse) + Send + Sync,
{
    fn emit(&self, name: &str, response: CallbackResponse) {
        self(name, response)
    }
}

/// Drops every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullEmitter;

impl EventEmitter for NullEmitter {
    fn emit(&self, name: &str, _response: CallbackResponse) {
        debug!(callback = name, "no emitter attached, dropping event");
    }
}

/// Forwards events into a channel. A closed receiver is logged, not retried.
#[derive(Debug)]
pub struct ChannelEmitter {
    tx: Mutex<mpsc::Sender<CallbackEvent>>,
}

impl ChannelEmitter {
    /// Emitter plus the receiving end of its channel.
    pub fn new() -> (Self, mpsc::Receiver<CallbackEvent>) {
        let (tx, rx) = mpsc::channel();
        (Self { tx: Mutex::new(tx) }, rx)
    }
}

impl EventEmitter for ChannelEmitter {
    fn emit(&self, name: &str, response: CallbackResponse) {
        let event = CallbackEvent {
            name: name.to_string(),
            response,
        };
        if self.tx.lock().send(event).is_err() {
            debug!(callback = name, "event receiver gone, dropping event");
        }
    }
}

/// Keeps every event in memory.
#[derive(Debug, Default)]
pub struct RecordingEmitter {
    events: Mutex<Vec<CallbackEvent>>,
}

impl RecordingEmitter {
    /// Empty recorder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of everything recorded so far.
    pub fn events(&self) -> Vec<CallbackEvent> {
        self.events.lock().clone()
    }

    /// Remove and return everything recorded so far.
    pub fn take(&self) -> Vec<CallbackEvent> {
        std::mem::take(&mut *self.events.lock())
    }
}

impl EventEmitter for RecordingEmitter {
    fn emit(&self, name: &str, response: CallbackResponse) {
        self.events.lock().push(CallbackEvent {
            name: name.to_string(),
            response,
        });
    }
}

/// Whether a result should be delivered under `callback`.
///
/// Requires a non-empty name and a terminal that names a live-range handle.
pub fn should_deliver(callback: Option<&str>, terminal: Terminal) -> bool {
    matches!(callback, Some(name) if !name.is_empty()) && terminal.handle().is_some()
}

/// Deliver `payload` under `callback`, or log why nothing was delivered.
///
/// Returns whether an event was emitted.
pub fn send_callback_data(
    emitter: &dyn EventEmitter,
    callback: Option<&str>,
    terminal: Terminal,
    payload: impl FnOnce() -> Option<Payload>,
) -> bool {
    if should_deliver(callback, terminal) {
        if let (Some(name), Some(payload)) = (callback, payload()) {
            emitter.emit(name, CallbackResponse { payload });
            return true;
        }
        return false;
    }

    if let Terminal::Sentinel(sentinel) = terminal {
        let cause = match sentinel {
            Sentinel::Security => "method resolution was refused",
            Sentinel::Access => "method could not be called with the given arguments",
            Sentinel::InvocationTarget => "method raised while running",
        };
        error!(
            code = sentinel.code(),
            callback = callback.unwrap_or(""),
            "{}; check the method name and parameters",
            cause
        );
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handles::Handle;

    fn handle(n: i64) -> Terminal {
        Terminal::Handle(Handle::new(n).unwrap())
    }

    #[test]
    fn test_delivery_gate() {
        assert!(should_deliver(Some("done"), handle(0)));
        assert!(should_deliver(Some("done"), handle(999)));
        assert!(!should_deliver(Some(""), handle(1)));
        assert!(!should_deliver(None, handle(1)));
        assert!(!should_deliver(Some("done"), Terminal::None));
        assert!(!should_deliver(
            Some("done"),
            Terminal::Sentinel(Sentinel::Access)
        ));
    }

    #[test]
    fn test_send_records_event() {
        let emitter = RecordingEmitter::new();
        let sent = send_callback_data(&emitter, Some("done"), handle(3), || {
            Some(Payload::Scalar(1.0))
        });
        assert!(sent);
        let events = emitter.take();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].name, "done");
        assert_eq!(events[0].response.payload, Payload::Scalar(1.0));
        assert!(emitter.events().is_empty());
    }

    #[test]
    fn test_sentinel_is_not_delivered() {
        let emitter = RecordingEmitter::new();
        let sent = send_callback_data(
            &emitter,
            Some("done"),
            Terminal::Sentinel(Sentinel::InvocationTarget),
            || panic!("payload must not be computed"),
        );
        assert!(!sent);
        assert!(emitter.events().is_empty());
    }

    #[test]
    fn test_channel_emitter() {
        let (emitter, rx) = ChannelEmitter::new();
        emitter.emit(
            "evt",
            CallbackResponse {
                payload: Payload::empty(),
            },
        );
        assert_eq!(rx.recv().unwrap().name, "evt");
        drop(rx);
        // A closed receiver must not panic.
        emitter.emit(
            "evt",
            CallbackResponse {
                payload: Payload::empty(),
            },
        );
    }

    #[test]
    fn test_closure_emitter() {
        let seen = Mutex::new(Vec::new());
        let f = |name: &str, _r: CallbackResponse| seen.lock().push(name.to_string());
        f.emit("a", CallbackResponse { payload: Payload::empty() });
        assert_eq!(*seen.lock(), vec!["a".to_string()]);
    }
}
