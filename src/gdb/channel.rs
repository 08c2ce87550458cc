//! Single-slot hand-off of result records from the reader thread to the
//! command issuer.

use crate::gdb::types::ResultRecord;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, SyncSender, TrySendError};
use std::time::Duration;
use tracing::warn;

/// Outcome of waiting for a reply
#[derive(Debug, Clone, PartialEq)]
pub enum Awaited {
    Reply(ResultRecord),
    TimedOut,
    /// The producer is gone; nothing will ever arrive.
    Closed,
}

/// Producer half, owned by the transport's read loop
pub struct ReplySender {
    tx: SyncSender<ResultRecord>,
}

/// Consumer half, owned by the dispatcher
pub struct ReplyReceiver {
    rx: Receiver<ResultRecord>,
}

/// Create a connected pair with capacity one.
pub fn response_channel() -> (ReplySender, ReplyReceiver) {
    let (tx, rx) = mpsc::sync_channel(1);
    (ReplySender { tx }, ReplyReceiver { rx })
}

impl ReplySender {
    /// Hand a reply to the waiting issuer.
    ///
    /// Blocks while the previous reply is still unclaimed. Returns `false`
    /// when the receiving side has been dropped.
    pub fn deliver(&self, record: ResultRecord) -> bool {
        match self.tx.try_send(record) {
            Ok(()) => true,
            Err(TrySendError::Full(record)) => {
                warn!("Previous reply not yet consumed, waiting for slot");
                self.tx.send(record).is_ok()
            }
            Err(TrySendError::Disconnected(_)) => false,
        }
    }
}

impl ReplyReceiver {
    pub fn wait(&self, timeout: Duration) -> Awaited {
        match self.rx.recv_timeout(timeout) {
            Ok(record) => Awaited::Reply(record),
            Err(RecvTimeoutError::Timeout) => Awaited::TimedOut,
            Err(RecvTimeoutError::Disconnected) => Awaited::Closed,
        }
    }

    /// Discard replies that arrived after their issuer gave up.
    pub fn drain_stale(&self) -> usize {
        let mut drained = 0;
        while let Ok(record) = self.rx.try_recv() {
            warn!("Discarding stale reply (token {:?})", record.token);
            drained += 1;
        }
        drained
    }
}
