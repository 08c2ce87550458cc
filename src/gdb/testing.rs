//! Scripted in-memory backend for exercising the session without gdb.

use crate::gdb::channel::response_channel;
use crate::gdb::dispatcher::Dispatcher;
use crate::gdb::events::EventBus;
use crate::gdb::session::{DebugSession, StartupContext};
use crate::gdb::transport::{Listeners, Transport};
use crate::gdb::types::GdbConfig;
use std::io::{self, Read, Write};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex};
use std::time::Duration;

type Responder = Box<dyn FnMut(&str) -> Vec<String> + Send>;
type Output = Arc<Mutex<Option<Sender<Vec<u8>>>>>;

/// Backend output stream fed line by line
pub struct PipeReader {
    rx: Receiver<Vec<u8>>,
    buf: Vec<u8>,
    pos: usize,
}

impl Read for PipeReader {
    fn read(&mut self, out: &mut [u8]) -> io::Result<usize> {
        if self.pos >= self.buf.len() {
            match self.rx.recv() {
                Ok(bytes) => {
                    self.buf = bytes;
                    self.pos = 0;
                }
                Err(_) => return Ok(0),
            }
        }
        let n = out.len().min(self.buf.len() - self.pos);
        out[..n].copy_from_slice(&self.buf[self.pos..self.pos + n]);
        self.pos += n;
        Ok(n)
    }
}

/// Backend input stream; every complete command line is answered by the responder.
///
/// The responder sees the command without its token and returns output lines;
/// lines starting with `^` get the command's token prepended.
pub struct ScriptWriter {
    pending: Vec<u8>,
    responder: Responder,
    output: Output,
    written: Arc<Mutex<Vec<String>>>,
}

impl Write for ScriptWriter {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        if self.output.lock().unwrap().is_none() {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "backend closed"));
        }
        self.pending.extend_from_slice(data);
        while let Some(end) = self.pending.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = self.pending.drain(..=end).collect();
            let line = String::from_utf8_lossy(&line).trim_end().to_string();
            let split = line.find(|c: char| !c.is_ascii_digit()).unwrap_or(line.len());
            let (token, command) = line.split_at(split);
            self.written.lock().unwrap().push(command.to_string());

            for reply in (self.responder)(command) {
                let reply = if reply.starts_with('^') {
                    format!("{}{}\n", token, reply)
                } else {
                    format!("{}\n", reply)
                };
                if let Some(tx) = self.output.lock().unwrap().as_ref() {
                    let _ = tx.send(reply.into_bytes());
                }
            }
        }
        Ok(data.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Test-side handle on the scripted backend
pub struct ScriptedBackend {
    output: Output,
    written: Arc<Mutex<Vec<String>>>,
}

impl ScriptedBackend {
    pub fn new<F>(responder: F) -> (Self, PipeReader, ScriptWriter)
    where
        F: FnMut(&str) -> Vec<String> + Send + 'static,
    {
        let (tx, rx) = mpsc::channel();
        let output = Arc::new(Mutex::new(Some(tx)));
        let written = Arc::new(Mutex::new(Vec::new()));
        let backend = Self {
            output: output.clone(),
            written: written.clone(),
        };
        let reader = PipeReader {
            rx,
            buf: Vec::new(),
            pos: 0,
        };
        let writer = ScriptWriter {
            pending: Vec::new(),
            responder: Box::new(responder),
            output,
            written,
        };
        (backend, reader, writer)
    }

    /// Dispatcher wired to a running transport over the scripted backend
    pub fn dispatcher<F>(responder: F, timeout: Duration) -> (Dispatcher, ScriptedBackend)
    where
        F: FnMut(&str) -> Vec<String> + Send + 'static,
    {
        let (backend, reader, writer) = Self::new(responder);
        let (tx, rx) = response_channel();
        Transport::start(reader, tx, Listeners::new()).unwrap();
        let dispatcher = Dispatcher::new(Box::new(writer), rx, timeout, EventBus::new());
        (dispatcher, backend)
    }

    /// Session attached to the scripted backend with the given startup context
    pub fn session<F>(responder: F, startup: StartupContext) -> (DebugSession, ScriptedBackend)
    where
        F: FnMut(&str) -> Vec<String> + Send + 'static,
    {
        let (backend, reader, writer) = Self::new(responder);
        let config = GdbConfig {
            timeout_ms: 500,
            ..GdbConfig::default()
        };
        let session = DebugSession::attach(reader, writer, &config, startup).unwrap();
        (session, backend)
    }

    /// Push an unsolicited output line.
    pub fn emit(&self, line: &str) {
        if let Some(tx) = self.output.lock().unwrap().as_ref() {
            let _ = tx.send(format!("{}\n", line).into_bytes());
        }
    }

    /// End the output stream.
    pub fn close(&self) {
        self.output.lock().unwrap().take();
    }

    /// Commands received so far, without tokens
    pub fn written(&self) -> Vec<String> {
        self.written.lock().unwrap().clone()
    }

    pub fn count(&self, prefix: &str) -> usize {
        self.written
            .lock()
            .unwrap()
            .iter()
            .filter(|c| c.starts_with(prefix))
            .count()
    }
}

/// Responder that accepts everything, numbering breakpoints from 1
pub fn accept_all() -> impl FnMut(&str) -> Vec<String> + Send + 'static {
    let mut next_number = 1;
    move |command: &str| {
        if command.starts_with("-break-insert") || command.starts_with("-dprintf-insert") {
            let number = next_number;
            next_number += 1;
            vec![format!(
                "^done,bkpt={{number=\"{}\",type=\"breakpoint\",enabled=\"y\"}}",
                number
            )]
        } else if command.starts_with("-exec-") && command != "-exec-interrupt" {
            vec!["^running".to_string(), "*running,thread-id=\"all\"".to_string()]
        } else {
            vec!["^done".to_string()]
        }
    }
}
