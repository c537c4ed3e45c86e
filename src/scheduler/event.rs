//! Scheduler events delivered to the dispatch layer.
//!
//! Events go out on an unbounded tokio channel so pool threads never block
//! on a slow consumer, while the transport side can await them.

use serde::Serialize;
use tokio::sync::mpsc;

use super::request::{Origin, RequestHandle};
use crate::error::ErrorCode;

/// Progress notification for one request.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "signal", rename_all = "kebab-case")]
pub enum SchedulerEvent {
    Started {
        handle: RequestHandle,
        origin: Origin,
    },
    Ready {
        handle: RequestHandle,
        origin: Origin,
        uris: Vec<String>,
    },
    Error {
        handle: RequestHandle,
        origin: Origin,
        uris: Vec<String>,
        code: ErrorCode,
        message: String,
    },
    Finished {
        handle: RequestHandle,
        origin: Origin,
    },
}

impl SchedulerEvent {
    pub fn handle(&self) -> RequestHandle {
        match self {
            Self::Started { handle, .. }
            | Self::Ready { handle, .. }
            | Self::Error { handle, .. }
            | Self::Finished { handle, .. } => *handle,
        }
    }

    pub fn origin(&self) -> &Origin {
        match self {
            Self::Started { origin, .. }
            | Self::Ready { origin, .. }
            | Self::Error { origin, .. }
            | Self::Finished { origin, .. } => origin,
        }
    }

    pub fn is_finished(&self) -> bool {
        matches!(self, Self::Finished { .. })
    }
}

pub type EventSender = mpsc::UnboundedSender<SchedulerEvent>;
pub type EventReceiver = mpsc::UnboundedReceiver<SchedulerEvent>;

pub fn event_channel() -> (EventSender, EventReceiver) {
    mpsc::unbounded_channel()
}

/// Typed emitter over an [`EventSender`].
#[derive(Debug, Clone)]
pub struct Signals {
    tx: EventSender,
}

impl Signals {
    pub fn new(tx: EventSender) -> Self {
        Self { tx }
    }

    pub fn started(&self, handle: RequestHandle, origin: &Origin) {
        self.emit(SchedulerEvent::Started { handle, origin: origin.clone() });
    }

    /// Emit a ready batch. Empty batches are dropped.
    pub fn ready(&self, handle: RequestHandle, origin: &Origin, uris: Vec<String>) {
        if uris.is_empty() {
            return;
        }
        self.emit(SchedulerEvent::Ready { handle, origin: origin.clone(), uris });
    }

    /// Emit an error batch. Empty batches are dropped.
    pub fn error(
        &self,
        handle: RequestHandle,
        origin: &Origin,
        uris: Vec<String>,
        code: ErrorCode,
        message: String,
    ) {
        if uris.is_empty() {
            return;
        }
        self.emit(SchedulerEvent::Error { handle, origin: origin.clone(), uris, code, message });
    }

    pub fn finished(&self, handle: RequestHandle, origin: &Origin) {
        self.emit(SchedulerEvent::Finished { handle, origin: origin.clone() });
    }

    fn emit(&self, event: SchedulerEvent) {
        if self.tx.send(event).is_err() {
            tracing::trace!("event receiver dropped, discarding event");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_batches_are_not_sent() {
        let (tx, mut rx) = event_channel();
        let signals = Signals::new(tx);
        let handle = RequestHandle::allocate();
        let origin = Origin::new("client");

        signals.ready(handle, &origin, vec![]);
        signals.error(handle, &origin, vec![], ErrorCode::Unsupported, String::new());
        signals.finished(handle, &origin);

        assert!(rx.try_recv().unwrap().is_finished());
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn events_serialize_with_signal_tag() {
        let event = SchedulerEvent::Ready {
            handle: RequestHandle::allocate(),
            origin: Origin::new(":1.7"),
            uris: vec!["file:///a.png".into()],
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["signal"], "ready");
        assert_eq!(json["origin"], ":1.7");
        assert_eq!(json["uris"][0], "file:///a.png");
    }

    #[test]
    fn send_after_receiver_drop_is_silent() {
        let (tx, rx) = event_channel();
        drop(rx);
        Signals::new(tx).started(RequestHandle::allocate(), &Origin::new("gone"));
    }
}
