//! Reader side of the backend connection.
//!
//! A single thread owns the backend's output stream. Result records go to the
//! response channel; every other record is handed to the registered listeners
//! in registration order before the next line is read.

use crate::gdb::channel::ReplySender;
use crate::gdb::parser::MiParser;
use crate::gdb::types::{AsyncRecord, MiRecord};
use std::io::{BufRead, BufReader, Read};
use std::sync::{Arc, PoisonError, RwLock};
use std::thread::{self, JoinHandle};
use tracing::{debug, error, info, warn};

/// Consumer of unsolicited backend records.
///
/// Called on the reader thread; implementations must not issue commands
/// and wait for their replies from inside these callbacks.
pub trait AsyncListener: Send + Sync {
    fn on_record(&self, record: &AsyncRecord);

    /// The output stream ended; no further records will arrive.
    fn on_closed(&self) {}
}

/// Ordered, shareable listener registry
#[derive(Clone, Default)]
pub struct Listeners {
    inner: Arc<RwLock<Vec<Arc<dyn AsyncListener>>>>,
}

impl Listeners {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, listener: Arc<dyn AsyncListener>) {
        self.inner
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(listener);
    }

    // Snapshot so a listener may register another one without deadlocking.
    fn snapshot(&self) -> Vec<Arc<dyn AsyncListener>> {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn dispatch(&self, record: &AsyncRecord) {
        for listener in self.snapshot() {
            listener.on_record(record);
        }
    }

    fn closed(&self) {
        for listener in self.snapshot() {
            listener.on_closed();
        }
    }
}

/// Handle to the running read loop
pub struct Transport {
    handle: Option<JoinHandle<()>>,
}

impl Transport {
    /// Spawn the reader thread over `output`.
    pub fn start<R>(output: R, replies: ReplySender, listeners: Listeners) -> std::io::Result<Self>
    where
        R: Read + Send + 'static,
    {
        let handle = thread::Builder::new()
            .name("gdb-mi-reader".to_string())
            .spawn(move || read_loop(BufReader::new(output), replies, listeners))?;
        Ok(Self {
            handle: Some(handle),
        })
    }

    pub fn is_finished(&self) -> bool {
        self.handle.as_ref().map_or(true, JoinHandle::is_finished)
    }

    /// Wait for the read loop to observe end-of-stream.
    pub fn join(&mut self) {
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                error!("GDB output reader panicked");
            }
        }
    }
}

/// Read output loop (runs in background thread)
fn read_loop<R: BufRead>(reader: R, replies: ReplySender, listeners: Listeners) {
    let parser = MiParser::new();

    for chunk in reader.split(b'\n') {
        let bytes = match chunk {
            Ok(bytes) => bytes,
            Err(e) => {
                error!("Error reading GDB output: {}", e);
                break;
            }
        };
        let line = String::from_utf8_lossy(&bytes);
        debug!("GDB output: {}", line.trim_end());

        match parser.parse_line(&line) {
            Ok(Some(MiRecord::Result(record))) => {
                if !replies.deliver(record) {
                    debug!("No dispatcher is listening for replies");
                }
            }
            Ok(Some(MiRecord::Async(record))) => listeners.dispatch(&record),
            Ok(None) => {
                // Empty line or (gdb) prompt - ignore
            }
            Err(e) => {
                warn!("Failed to parse line: {} - {}", line.trim_end(), e);
            }
        }
    }

    drop(replies);
    listeners.closed();
    info!("GDB output reader stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gdb::channel::{response_channel, Awaited};
    use crate::gdb::types::{AsyncKind, ResultClass};
    use std::sync::Mutex;
    use std::time::Duration;

    struct Recorder {
        name: &'static str,
        log: Arc<Mutex<Vec<String>>>,
    }

    impl AsyncListener for Recorder {
        fn on_record(&self, record: &AsyncRecord) {
            self.log
                .lock()
                .unwrap()
                .push(format!("{}:{}", self.name, record.class));
        }

        fn on_closed(&self) {
            self.log.lock().unwrap().push(format!("{}:closed", self.name));
        }
    }

    fn run(output: &str, listeners: Listeners) -> crate::gdb::channel::ReplyReceiver {
        let (tx, rx) = response_channel();
        let mut transport =
            Transport::start(std::io::Cursor::new(output.as_bytes().to_vec()), tx, listeners).unwrap();
        transport.join();
        rx
    }

    #[test]
    fn test_listeners_run_in_registration_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let listeners = Listeners::new();
        listeners.register(Arc::new(Recorder { name: "a", log: log.clone() }));
        listeners.register(Arc::new(Recorder { name: "b", log: log.clone() }));

        run("*running,thread-id=\"all\"\n(gdb)\n=thread-group-exited,id=\"i1\"\n", listeners);

        assert_eq!(
            *log.lock().unwrap(),
            vec![
                "a:running",
                "b:running",
                "a:thread-group-exited",
                "b:thread-group-exited",
                "a:closed",
                "b:closed",
            ]
        );
    }

    #[test]
    fn test_result_goes_to_channel_and_close_follows() {
        let rx = run("1^done,value=\"42\"\n", Listeners::new());
        match rx.wait(Duration::from_millis(100)) {
            Awaited::Reply(record) => {
                assert_eq!(record.token, Some(1));
                assert_eq!(record.class, ResultClass::Done);
                assert_eq!(record.payload.get_str("value"), Some("42"));
            }
            other => panic!("Expected reply, got {:?}", other),
        }
        assert_eq!(rx.wait(Duration::from_millis(100)), Awaited::Closed);
    }

    #[test]
    fn test_malformed_lines_are_skipped() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let listeners = Listeners::new();
        listeners.register(Arc::new(Recorder { name: "l", log: log.clone() }));

        run("garbage line\n*stopped,reason=\"end-stepping-range\"\n*stopped,reason=\n", listeners);

        assert_eq!(*log.lock().unwrap(), vec!["l:stopped", "l:closed"]);
    }

    #[test]
    fn test_stream_records_reach_listeners() {
        struct Kinds(Mutex<Vec<AsyncKind>>);
        impl AsyncListener for Kinds {
            fn on_record(&self, record: &AsyncRecord) {
                self.0.lock().unwrap().push(record.kind);
            }
        }

        let kinds = Arc::new(Kinds(Mutex::new(Vec::new())));
        let listeners = Listeners::new();
        listeners.register(kinds.clone());
        run("~\"hi\\n\"\n&\"warning\"\n", listeners);

        assert_eq!(kinds.0.lock().unwrap().len(), 2);
    }
}
