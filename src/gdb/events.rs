//! Session events and their fan-out to subscribers

use crate::gdb::breakpoints::{BreakpointKey, InvalidReason};
use crate::gdb::parser::decode_stream_text;
use crate::gdb::transport::AsyncListener;
use crate::gdb::types::{AsyncKind, AsyncRecord, OutputChannel, SessionState};
use serde::Serialize;
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex, PoisonError};

/// Events published by the session
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum SessionEvent {
    StateChanged {
        from: SessionState,
        to: SessionState,
    },
    BreakpointInvalidated {
        key: BreakpointKey,
        reason: InvalidReason,
    },
    BackendUnresponsive {
        command: String,
    },
    Output {
        channel: OutputChannel,
        text: String,
    },
}

/// Multi-subscriber event queue; dead subscribers are pruned on publish.
#[derive(Clone, Default)]
pub struct EventBus {
    subscribers: Arc<Mutex<Vec<Sender<SessionEvent>>>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self) -> Receiver<SessionEvent> {
        let (tx, rx) = mpsc::channel();
        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(tx);
        rx
    }

    pub fn publish(&self, event: SessionEvent) {
        let mut subscribers = self
            .subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        subscribers.retain(|tx| tx.send(event.clone()).is_ok());
    }
}

/// Console/target/log stream records become `Output` events.
impl AsyncListener for EventBus {
    fn on_record(&self, record: &AsyncRecord) {
        if let AsyncKind::Stream(channel) = record.kind {
            let raw = record.payload.as_str().unwrap_or_default();
            self.publish(SessionEvent::Output {
                channel,
                text: decode_stream_text(raw),
            });
        }
    }
}
