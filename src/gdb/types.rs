//! GDB Machine Interface (MI) Type Definitions

use serde::ser::{SerializeMap, SerializeSeq};
use serde::{Serialize, Serializer};
use std::fmt;

/// GDB/MI value: every leaf is a string, containers keep their order
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MiValue {
    String(String),
    Tuple(MiTuple),
    List(MiList),
}

impl MiValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            MiValue::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_tuple(&self) -> Option<&MiTuple> {
        match self {
            MiValue::Tuple(t) => Some(t),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&MiList> {
        match self {
            MiValue::List(l) => Some(l),
            _ => None,
        }
    }
}

impl Serialize for MiValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            MiValue::String(s) => serializer.serialize_str(s),
            MiValue::Tuple(t) => t.serialize(serializer),
            MiValue::List(l) => l.serialize(serializer),
        }
    }
}

/// Ordered `name=value` mapping with unique names
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MiTuple {
    entries: Vec<(String, MiValue)>,
}

impl MiTuple {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a result; an existing name keeps its position and takes the new value.
    pub fn insert(&mut self, name: impl Into<String>, value: MiValue) {
        let name = name.into();
        match self.entries.iter_mut().find(|(n, _)| *n == name) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((name, value)),
        }
    }

    pub fn get(&self, name: &str) -> Option<&MiValue> {
        self.entries.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }

    pub fn get_str(&self, name: &str) -> Option<&str> {
        self.get(name).and_then(MiValue::as_str)
    }

    pub fn get_tuple(&self, name: &str) -> Option<&MiTuple> {
        self.get(name).and_then(MiValue::as_tuple)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &MiValue)> {
        self.entries.iter().map(|(n, v)| (n.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<N: Into<String>> FromIterator<(N, MiValue)> for MiTuple {
    fn from_iter<I: IntoIterator<Item = (N, MiValue)>>(iter: I) -> Self {
        let mut tuple = MiTuple::new();
        for (name, value) in iter {
            tuple.insert(name, value);
        }
        tuple
    }
}

impl Serialize for MiTuple {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (name, value) in &self.entries {
            map.serialize_entry(name, value)?;
        }
        map.end()
    }
}

/// GDB/MI list; the element kind is fixed for the whole list
///
/// `[]` carries no kind and always reads back as an empty `Values`, so an
/// empty `Results` does not survive a render/parse cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MiList {
    Values(Vec<MiValue>),
    /// `[name=value,...]`; names may repeat (e.g. `body=[bkpt={..},bkpt={..}]`)
    Results(Vec<(String, MiValue)>),
}

impl MiList {
    pub fn len(&self) -> usize {
        match self {
            MiList::Values(v) => v.len(),
            MiList::Results(r) => r.len(),
        }
    }

    /// Element values regardless of list kind
    pub fn values(&self) -> Vec<&MiValue> {
        match self {
            MiList::Values(v) => v.iter().collect(),
            MiList::Results(r) => r.iter().map(|(_, v)| v).collect(),
        }
    }
}

impl Serialize for MiList {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut seq = serializer.serialize_seq(Some(self.len()))?;
        match self {
            MiList::Values(values) => {
                for value in values {
                    seq.serialize_element(value)?;
                }
            }
            MiList::Results(results) => {
                for (name, value) in results {
                    let single: MiTuple = std::iter::once((name.as_str(), value.clone())).collect();
                    seq.serialize_element(&single)?;
                }
            }
        }
        seq.end()
    }
}

/// GDB/MI result class types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ResultClass {
    Done,
    Running,
    Connected,
    Error,
    Exit,
}

impl ResultClass {
    pub fn from_symbol(s: &str) -> Option<Self> {
        match s {
            "done" => Some(ResultClass::Done),
            "running" => Some(ResultClass::Running),
            "connected" => Some(ResultClass::Connected),
            "error" => Some(ResultClass::Error),
            "exit" => Some(ResultClass::Exit),
            _ => None,
        }
    }
}

/// Synchronous reply to exactly one command
#[derive(Debug, Clone, PartialEq)]
pub struct ResultRecord {
    pub token: Option<u64>,
    pub class: ResultClass,
    pub payload: MiTuple,
}

/// Output channel of a stream record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputChannel {
    Console,
    Target,
    Log,
}

impl OutputChannel {
    pub fn name(self) -> &'static str {
        match self {
            OutputChannel::Console => "console",
            OutputChannel::Target => "target",
            OutputChannel::Log => "log",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AsyncKind {
    Exec,
    Status,
    Notify,
    Stream(OutputChannel),
}

/// Unsolicited record, fanned out to every listener
#[derive(Debug, Clone, PartialEq)]
pub struct AsyncRecord {
    pub token: Option<u64>,
    pub kind: AsyncKind,
    pub class: String,
    pub payload: MiValue,
}

impl AsyncRecord {
    pub fn results(&self) -> Option<&MiTuple> {
        self.payload.as_tuple()
    }

    pub fn is(&self, kind: AsyncKind, class: &str) -> bool {
        self.kind == kind && self.class == class
    }
}

/// One classified line of backend output
#[derive(Debug, Clone, PartialEq)]
pub enum MiRecord {
    Result(ResultRecord),
    Async(AsyncRecord),
}

/// Stop reason types
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum StopReason {
    BreakpointHit,
    WatchpointTrigger,
    ReadWatchpointTrigger,
    AccessWatchpointTrigger,
    FunctionFinished,
    LocationReached,
    WatchpointScope,
    EndSteppingRange,
    ExitedSignalled,
    Exited,
    ExitedNormally,
    SignalReceived,
    SolibEvent,
    Fork,
    Vfork,
    SyscallEntry,
    SyscallReturn,
    Unknown(String),
}

impl StopReason {
    pub fn is_exit(&self) -> bool {
        matches!(
            self,
            StopReason::Exited | StopReason::ExitedNormally | StopReason::ExitedSignalled
        )
    }
}

impl From<&str> for StopReason {
    fn from(s: &str) -> Self {
        match s {
            "breakpoint-hit" => StopReason::BreakpointHit,
            "watchpoint-trigger" => StopReason::WatchpointTrigger,
            "read-watchpoint-trigger" => StopReason::ReadWatchpointTrigger,
            "access-watchpoint-trigger" => StopReason::AccessWatchpointTrigger,
            "function-finished" => StopReason::FunctionFinished,
            "location-reached" => StopReason::LocationReached,
            "watchpoint-scope" => StopReason::WatchpointScope,
            "end-stepping-range" => StopReason::EndSteppingRange,
            "exited-signalled" => StopReason::ExitedSignalled,
            "exited" => StopReason::Exited,
            "exited-normally" => StopReason::ExitedNormally,
            "signal-received" => StopReason::SignalReceived,
            "solib-event" => StopReason::SolibEvent,
            "fork" => StopReason::Fork,
            "vfork" => StopReason::Vfork,
            "syscall-entry" => StopReason::SyscallEntry,
            "syscall-return" => StopReason::SyscallReturn,
            _ => StopReason::Unknown(s.to_string()),
        }
    }
}

/// Stack frame: a source line when debug info is available, a bare address otherwise
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum StackFrame {
    Source {
        level: u32,
        addr: String,
        func: Option<String>,
        file: String,
        fullname: Option<String>,
        line: u32,
    },
    Instruction {
        level: u32,
        addr: String,
        func: Option<String>,
    },
}

impl StackFrame {
    /// Build a frame from a `frame={...}` tuple. `*stopped` frames carry no level.
    pub fn from_tuple(tuple: &MiTuple) -> Option<Self> {
        let level = tuple
            .get_str("level")
            .map(|s| s.parse().ok())
            .unwrap_or(Some(0))?;
        let addr = tuple.get_str("addr").unwrap_or_default().to_string();
        let func = tuple.get_str("func").map(str::to_string);
        let line = tuple.get_str("line").and_then(|s| s.parse().ok());

        match (tuple.get_str("file"), line) {
            (Some(file), Some(line)) => Some(StackFrame::Source {
                level,
                addr,
                func,
                file: file.to_string(),
                fullname: tuple.get_str("fullname").map(str::to_string),
                line,
            }),
            _ => Some(StackFrame::Instruction { level, addr, func }),
        }
    }

    /// One-line presentation, e.g. `#0 main at hello.c:12`
    pub fn render(&self) -> String {
        match self {
            StackFrame::Source {
                level,
                func,
                file,
                line,
                ..
            } => format!(
                "#{} {} at {}:{}",
                level,
                func.as_deref().unwrap_or("??"),
                file,
                line
            ),
            StackFrame::Instruction { level, addr, func } => match func {
                Some(func) => format!("#{} {} in {}", level, addr, func),
                None => format!("#{} {}", level, addr),
            },
        }
    }
}

/// Session execution state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SessionState {
    Running,
    Suspended,
    Exited,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionState::Running => write!(f, "RUNNING"),
            SessionState::Suspended => write!(f, "SUSPENDED"),
            SessionState::Exited => write!(f, "EXITED"),
        }
    }
}

/// What the backend reported when execution last stopped
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StopInfo {
    pub reason: StopReason,
    pub thread_id: Option<String>,
    pub frame: Option<StackFrame>,
    /// Raw `frame={...}` payload as carried by the notification
    pub frame_payload: Option<MiTuple>,
}

/// Read-only view of the state machine
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StateSnapshot {
    pub state: SessionState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stop: Option<StopInfo>,
}

/// Variable listed for a frame
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Variable {
    pub name: String,
    pub value: Option<String>,
    #[serde(rename = "type")]
    pub var_type: Option<String>,
    pub is_argument: bool,
}

/// GDB configuration
#[derive(Debug, Clone)]
pub struct GdbConfig {
    pub gdb_path: String,
    pub gdb_args: Vec<String>,
    pub timeout_ms: u64,
}

impl Default for GdbConfig {
    fn default() -> Self {
        Self {
            gdb_path: "gdb".to_string(),
            gdb_args: vec!["--interpreter=mi2".to_string()],
            timeout_ms: 2000,
        }
    }
}

impl GdbConfig {
    /// Defaults overridden by `MCP_GDB_PATH` and `MCP_GDB_TIMEOUT_MS`
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(path) = std::env::var("MCP_GDB_PATH") {
            if !path.is_empty() {
                config.gdb_path = path;
            }
        }
        if let Some(ms) = std::env::var("MCP_GDB_TIMEOUT_MS")
            .ok()
            .and_then(|s| s.parse().ok())
        {
            config.timeout_ms = ms;
        }
        config
    }

    pub fn timeout(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.timeout_ms)
    }
}
