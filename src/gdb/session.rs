//! GDB Session
//!
//! Wires the transport, dispatcher, breakpoint registry and state machine
//! into one handle, and manages the gdb process when it owns one.

use crate::gdb::breakpoints::{Breakpoint, BreakpointFlags, BreakpointManager, InvalidReason, RemoveOutcome};
use crate::gdb::channel::response_channel;
use crate::gdb::dispatcher::{require_str, Dispatcher};
use crate::gdb::error::{MiError, Result};
use crate::gdb::events::{EventBus, SessionEvent};
use crate::gdb::parser::{parse_stack_frames, parse_variables};
use crate::gdb::state::SessionStateMachine;
use crate::gdb::transport::{Listeners, Transport};
use crate::gdb::types::*;
use anyhow::{anyhow, Context};
use std::io::{BufRead, BufReader, Read, Write};
use std::process::{Child, Command, Stdio};
use std::sync::mpsc::Receiver;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Breakpoint to register while attaching
#[derive(Debug, Clone)]
pub struct StartupBreakpoint {
    pub file_url: String,
    pub line: u32,
    pub flags: BreakpointFlags,
}

/// Everything a session needs to do while it is being attached
#[derive(Debug, Clone, Default)]
pub struct StartupContext {
    pub init_commands: Vec<String>,
    pub breakpoints: Vec<StartupBreakpoint>,
}

impl StartupContext {
    /// Async execution, no pagination, no confirmation prompts
    pub fn standard() -> Self {
        Self {
            init_commands: vec![
                "-gdb-set mi-async on".to_string(),
                "-gdb-set pagination off".to_string(),
                "-gdb-set confirm off".to_string(),
            ],
            breakpoints: Vec::new(),
        }
    }

    pub fn with_breakpoint(mut self, file_url: &str, line: u32, flags: BreakpointFlags) -> Self {
        self.breakpoints.push(StartupBreakpoint {
            file_url: file_url.to_string(),
            line,
            flags,
        });
        self
    }
}

/// GDB debugging session
pub struct DebugSession {
    id: Uuid,
    dispatcher: Arc<Dispatcher>,
    breakpoints: Arc<BreakpointManager>,
    state: Arc<SessionStateMachine>,
    events: EventBus,
    transport: Mutex<Transport>,
    /// GDB process, when this session spawned it
    process: Mutex<Option<Child>>,
    executable: Mutex<Option<String>>,
}

fn locked<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl DebugSession {
    /// Attach to a backend speaking MI over the given streams.
    pub fn attach<R, W>(output: R, input: W, config: &GdbConfig, startup: StartupContext) -> Result<Self>
    where
        R: Read + Send + 'static,
        W: Write + Send + 'static,
    {
        let events = EventBus::new();
        let (replies_tx, replies_rx) = response_channel();
        let dispatcher = Arc::new(Dispatcher::new(
            Box::new(input),
            replies_rx,
            config.timeout(),
            events.clone(),
        ));
        let state = Arc::new(SessionStateMachine::new(events.clone()));
        let breakpoints = Arc::new(BreakpointManager::new(dispatcher.clone(), events.clone()));

        let listeners = Listeners::new();
        listeners.register(state.clone());
        listeners.register(breakpoints.clone());
        listeners.register(Arc::new(events.clone()));
        let transport = Transport::start(output, replies_tx, listeners)?;

        let session = Self {
            id: Uuid::new_v4(),
            dispatcher,
            breakpoints,
            state,
            events,
            transport: Mutex::new(transport),
            process: Mutex::new(None),
            executable: Mutex::new(None),
        };

        for command in &startup.init_commands {
            session.dispatcher.send(command, &[], &[])?;
        }
        for bp in &startup.breakpoints {
            if let Err(reason) = session.insert_breakpoint(&bp.file_url, bp.line, &bp.flags) {
                warn!(
                    "Startup breakpoint {}:{} not registered: {}",
                    bp.file_url, bp.line, reason
                );
            }
        }

        info!("Session {} attached", session.id);
        Ok(session)
    }

    /// Start a gdb process and attach to it.
    pub fn spawn(config: &GdbConfig, startup: StartupContext) -> anyhow::Result<Self> {
        info!("Starting GDB: {}", config.gdb_path);

        let mut process = Command::new(&config.gdb_path)
            .args(&config.gdb_args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .with_context(|| format!("failed to start {}", config.gdb_path))?;

        let stdin = process.stdin.take().ok_or_else(|| anyhow!("Failed to get stdin"))?;
        let stdout = process.stdout.take().ok_or_else(|| anyhow!("Failed to get stdout"))?;
        let stderr = process.stderr.take().ok_or_else(|| anyhow!("Failed to get stderr"))?;

        let session = match Self::attach(stdout, stdin, config, startup) {
            Ok(session) => session,
            Err(e) => {
                let _ = process.kill();
                let _ = process.wait();
                return Err(anyhow!(e).context("failed to initialize GDB"));
            }
        };

        let events = session.events.clone();
        thread::spawn(move || {
            for line in BufReader::new(stderr).lines().map_while(|l| l.ok()) {
                debug!("GDB stderr: {}", line);
                events.publish(SessionEvent::Output {
                    channel: OutputChannel::Log,
                    text: line,
                });
            }
        });

        *locked(&session.process) = Some(process);
        info!("GDB started successfully");
        Ok(session)
    }

    pub fn id(&self) -> String {
        self.id.to_string()
    }

    /// False once the backend's output stream has ended
    pub fn is_alive(&self) -> bool {
        !locked(&self.transport).is_finished()
    }

    pub fn executable(&self) -> Option<String> {
        locked(&self.executable).clone()
    }

    pub fn subscribe(&self) -> Receiver<SessionEvent> {
        self.events.subscribe()
    }

    pub fn current_state(&self) -> StateSnapshot {
        self.state.snapshot()
    }

    pub fn insert_breakpoint(
        &self,
        file_url: &str,
        line: u32,
        flags: &BreakpointFlags,
    ) -> std::result::Result<Breakpoint, InvalidReason> {
        self.breakpoints.insert(file_url, line, flags)
    }

    /// Returns false when nothing was registered at that location, or when a
    /// delete for it is already pending.
    pub fn remove_breakpoint(&self, file_url: &str, line: u32) -> Result<bool> {
        Ok(self.breakpoints.remove(file_url, line)? == RemoveOutcome::Removed)
    }

    pub fn set_breakpoint_enabled(&self, file_url: &str, line: u32, enabled: bool) -> bool {
        self.breakpoints.set_enabled(file_url, line, enabled)
    }

    pub fn breakpoints(&self) -> Vec<Breakpoint> {
        self.breakpoints.list()
    }

    pub fn breakpoint_at(&self, file_url: &str, line: u32) -> Option<Breakpoint> {
        self.breakpoints.lookup(file_url, line)
    }

    pub fn breakpoint_by_number(&self, number: &str) -> Option<Breakpoint> {
        self.breakpoints.lookup_by_number(number)
    }

    /// Load an executable file
    pub fn load_file(&self, path: &str) -> Result<()> {
        self.dispatcher.send("-file-exec-and-symbols", &[], &[path])?;
        *locked(&self.executable) = Some(path.to_string());
        info!("Loaded {}", path);
        Ok(())
    }

    pub fn run(&self) -> Result<()> {
        self.exec("-exec-run")
    }

    pub fn continue_execution(&self) -> Result<()> {
        self.exec("-exec-continue")
    }

    pub fn next(&self) -> Result<()> {
        self.exec("-exec-next")
    }

    pub fn step(&self) -> Result<()> {
        self.exec("-exec-step")
    }

    pub fn interrupt(&self) -> Result<()> {
        self.exec("-exec-interrupt")
    }

    fn exec(&self, command: &str) -> Result<()> {
        self.dispatcher.send(command, &[], &[]).map(|_| ())
    }

    /// Frames of the stopped thread, innermost first
    pub fn stack_frames(&self) -> Result<Vec<StackFrame>> {
        let snapshot = self.state.require_suspended("stack_frames")?;
        let thread_id = stopped_thread(&snapshot);
        let command = "-stack-list-frames";
        let payload = self
            .dispatcher
            .send(command, &["--thread", thread_id.as_str()], &[])?;
        if payload.get("stack").is_none() {
            return Err(MiError::payload_shape(command, "stack"));
        }
        Ok(parse_stack_frames(&payload))
    }

    /// Locals and arguments of the frame at `level`
    pub fn frame_variables(&self, level: u32) -> Result<Vec<Variable>> {
        let snapshot = self.state.require_suspended("frame_variables")?;
        let thread_id = stopped_thread(&snapshot);
        let level = level.to_string();
        let command = "-stack-list-variables";
        let payload = self.dispatcher.send(
            command,
            &[
                "--thread",
                thread_id.as_str(),
                "--frame",
                level.as_str(),
                "--simple-values",
            ],
            &[],
        )?;
        if payload.get("variables").is_none() {
            return Err(MiError::payload_shape(command, "variables"));
        }
        Ok(parse_variables(&payload))
    }

    pub fn evaluate(&self, expression: &str) -> Result<String> {
        self.state.require_suspended("evaluate")?;
        let command = "-data-evaluate-expression";
        let payload = self.dispatcher.send(command, &[], &[expression])?;
        require_str(&payload, command, "value").map(str::to_string)
    }

    /// Send an arbitrary MI command line
    pub fn raw(&self, command: &str) -> Result<MiTuple> {
        self.dispatcher.send(command.trim(), &[], &[])
    }

    /// Ask gdb to exit and reap the process if this session owns one.
    pub fn shutdown(&self) {
        if let Err(e) = self.dispatcher.send("-gdb-exit", &[], &[]) {
            debug!("-gdb-exit: {}", e);
        }

        if let Some(mut process) = locked(&self.process).take() {
            let _ = process.kill();
            let _ = process.wait();
            locked(&self.transport).join();
            info!("GDB stopped");
        }
    }
}

impl Drop for DebugSession {
    fn drop(&mut self) {
        if locked(&self.process).is_some() {
            self.shutdown();
        }
    }
}

fn stopped_thread(snapshot: &StateSnapshot) -> String {
    snapshot
        .stop
        .as_ref()
        .and_then(|stop| stop.thread_id.clone())
        .unwrap_or_else(|| "1".to_string())
}
