//! MCP Server Handler Implementation

use crate::gdb::{BreakpointFlags, DebugSession, GdbConfig, MiValue, SessionEvent, StartupContext};
use crate::mcp::protocol::*;
use crate::mcp::tools::get_all_tools;
use anyhow::{anyhow, Context, Result};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::sync::mpsc::Receiver;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

type Arguments = Option<serde_json::Map<String, serde_json::Value>>;

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct StartArgs {
    gdb_path: Option<String>,
    timeout_ms: Option<u64>,
    breakpoints: Vec<LocationArgs>,
}

#[derive(Debug, Deserialize)]
struct LocationArgs {
    file: String,
    line: u32,
}

#[derive(Debug, Deserialize)]
struct BreakInsertArgs {
    file: String,
    line: u32,
    #[serde(flatten)]
    flags: BreakpointFlags,
}

#[derive(Debug, Deserialize)]
struct BreakEnableArgs {
    file: String,
    line: u32,
    enabled: bool,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct BreakListArgs {
    number: Option<String>,
}

#[derive(Debug, Deserialize)]
struct LoadFileArgs {
    file_path: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct VariablesArgs {
    frame: u32,
}

#[derive(Debug, Deserialize)]
struct EvaluateArgs {
    expression: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct EventsArgs {
    max: Option<usize>,
}

#[derive(Debug, Deserialize)]
struct RawCommandArgs {
    command: String,
}

fn parse_args<T: DeserializeOwned>(args: Arguments) -> Result<T> {
    serde_json::from_value(serde_json::Value::Object(args.unwrap_or_default()))
        .context("invalid tool arguments")
}

/// Running session plus the event queue drained by `gdb_events`
struct ActiveSession {
    session: Arc<DebugSession>,
    events: Mutex<Receiver<SessionEvent>>,
}

/// GDB MCP Server
pub struct GdbMcpServer {
    active: Arc<RwLock<Option<ActiveSession>>>,
    config: GdbConfig,
}

impl GdbMcpServer {
    pub fn new(config: GdbConfig) -> Self {
        Self {
            active: Arc::new(RwLock::new(None)),
            config,
        }
    }

    /// Get server info
    pub fn get_info(&self) -> InitializeResult {
        InitializeResult {
            protocol_version: PROTOCOL_VERSION,
            capabilities: ServerCapabilities::default(),
            server_info: Implementation::current(),
            instructions: "GDB/MI debugging session.\n\n\
                 Start with 'gdb_start', load a program with 'gdb_load_file', set breakpoints with 'gdb_break_insert', \
                 and control execution with 'gdb_run', 'gdb_continue', 'gdb_next', 'gdb_step' and 'gdb_interrupt'.\n\n\
                 Stack, variable and evaluation tools only work while the session is SUSPENDED; check 'gdb_status' \
                 and poll 'gdb_events' for state changes and program output."
                .to_string(),
        }
    }

    /// Handle initialize request
    pub async fn handle_initialize(&self, _params: Option<serde_json::Value>) -> Result<serde_json::Value> {
        let info = self.get_info();
        Ok(serde_json::to_value(info)?)
    }

    /// Handle tools/list request
    pub async fn handle_tools_list(&self) -> Result<serde_json::Value> {
        let result = ListToolsResult {
            tools: get_all_tools(),
        };
        Ok(serde_json::to_value(result)?)
    }

    /// Handle tools/call request
    pub async fn handle_tools_call(&self, params: Option<serde_json::Value>) -> Result<serde_json::Value> {
        let params = params.ok_or_else(|| anyhow!("Missing params"))?;
        let request: CallToolRequest = serde_json::from_value(params)?;

        debug!("Calling tool: {}", request.name);

        let args = request.arguments;
        let result = match request.name.as_str() {
            "gdb_start" => self.handle_start(args).await,
            "gdb_stop" => self.handle_stop().await,
            "gdb_load_file" => self.handle_load_file(args).await,
            "gdb_run" => self.handle_exec("gdb_run", DebugSession::run).await,
            "gdb_continue" => self.handle_exec("gdb_continue", DebugSession::continue_execution).await,
            "gdb_next" => self.handle_exec("gdb_next", DebugSession::next).await,
            "gdb_step" => self.handle_exec("gdb_step", DebugSession::step).await,
            "gdb_interrupt" => self.handle_exec("gdb_interrupt", DebugSession::interrupt).await,
            "gdb_break_insert" => self.handle_break_insert(args).await,
            "gdb_break_delete" => self.handle_break_delete(args).await,
            "gdb_break_enable" => self.handle_break_enable(args).await,
            "gdb_break_list" => self.handle_break_list(args).await,
            "gdb_status" => self.handle_status().await,
            "gdb_stack_list" => self.handle_stack_list().await,
            "gdb_variables" => self.handle_variables(args).await,
            "gdb_evaluate" => self.handle_evaluate(args).await,
            "gdb_events" => self.handle_events(args).await,
            "gdb_raw_command" => self.handle_raw_command(args).await,
            _ => Ok(CallToolResult::error_text(format!("Unknown tool: {}", request.name))),
        };

        let result = result.unwrap_or_else(|e| {
            warn!("{} failed: {:#}", request.name, e);
            CallToolResult::error_text(format!("Error: {:#}", e))
        });
        Ok(serde_json::to_value(result)?)
    }

    /// Make `session` the active one; fails while another is still running.
    pub async fn install_session(&self, session: DebugSession) -> Result<String> {
        let mut guard = self.active.write().await;
        if guard.is_some() {
            return Err(anyhow!("GDB session already running. Use gdb_stop first."));
        }
        let id = session.id();
        let events = Mutex::new(session.subscribe());
        *guard = Some(ActiveSession {
            session: Arc::new(session),
            events,
        });
        Ok(id)
    }

    /// Stop the active session, if any. Returns whether one was running.
    pub async fn shutdown(&self) -> Result<bool> {
        let active = self.active.write().await.take();
        match active {
            Some(active) => {
                let session = active.session;
                tokio::task::spawn_blocking(move || session.shutdown()).await?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn current_session(&self) -> Result<Arc<DebugSession>> {
        self.active
            .read()
            .await
            .as_ref()
            .map(|active| active.session.clone())
            .ok_or_else(|| anyhow!("GDB session not started. Use gdb_start first."))
    }

    /// Run a blocking session call off the async runtime.
    async fn blocking<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&DebugSession) -> T + Send + 'static,
        T: Send + 'static,
    {
        let session = self.current_session().await?;
        Ok(tokio::task::spawn_blocking(move || f(session.as_ref())).await?)
    }

    // ========================================================================
    // Tool Handlers
    // ========================================================================

    async fn handle_start(&self, args: Arguments) -> Result<CallToolResult> {
        let args: StartArgs = parse_args(args)?;
        if self.active.read().await.is_some() {
            return Ok(CallToolResult::error_text("GDB session already running. Use gdb_stop first."));
        }

        let mut config = self.config.clone();
        if let Some(path) = args.gdb_path {
            config.gdb_path = path;
        }
        if let Some(ms) = args.timeout_ms {
            config.timeout_ms = ms;
        }
        let startup = args.breakpoints.iter().fold(StartupContext::standard(), |ctx, bp| {
            ctx.with_breakpoint(&bp.file, bp.line, BreakpointFlags::default())
        });

        info!("Starting GDB session with: {}", config.gdb_path);
        let session = tokio::task::spawn_blocking(move || DebugSession::spawn(&config, startup)).await??;
        let registered = session.breakpoints().len();
        let id = self.install_session(session).await?;

        Ok(CallToolResult::text(format!(
            "GDB session {} started ({} of {} startup breakpoints registered). Use gdb_load_file to load a program.",
            id,
            registered,
            args.breakpoints.len()
        )))
    }

    async fn handle_stop(&self) -> Result<CallToolResult> {
        info!("Stopping GDB session");

        if self.shutdown().await? {
            Ok(CallToolResult::text("GDB session stopped successfully."))
        } else {
            Ok(CallToolResult::error_text("No GDB session is running."))
        }
    }

    async fn handle_load_file(&self, args: Arguments) -> Result<CallToolResult> {
        let args: LoadFileArgs = parse_args(args)?;
        info!("Loading file: {}", args.file_path);

        let path = args.file_path.clone();
        self.blocking(move |s| s.load_file(&path)).await??;
        Ok(CallToolResult::text(format!("Loaded executable: {}", args.file_path)))
    }

    async fn handle_exec(
        &self,
        tool: &str,
        op: fn(&DebugSession) -> crate::gdb::error::Result<()>,
    ) -> Result<CallToolResult> {
        self.blocking(op).await??;
        Ok(CallToolResult::text(format!("{}: ok", tool)))
    }

    async fn handle_break_insert(&self, args: Arguments) -> Result<CallToolResult> {
        let args: BreakInsertArgs = parse_args(args)?;
        let outcome = self
            .blocking(move |s| s.insert_breakpoint(&args.file, args.line, &args.flags))
            .await?;
        match outcome {
            Ok(bp) => Ok(CallToolResult::json(&bp)?),
            Err(reason) => Ok(CallToolResult::error_text(format!("Breakpoint is invalid: {}", reason))),
        }
    }

    async fn handle_break_delete(&self, args: Arguments) -> Result<CallToolResult> {
        let args: LocationArgs = parse_args(args)?;
        let location = format!("{}:{}", args.file, args.line);
        let removed = self
            .blocking(move |s| s.remove_breakpoint(&args.file, args.line))
            .await??;
        if removed {
            Ok(CallToolResult::text(format!("Deleted breakpoint at {}.", location)))
        } else {
            Ok(CallToolResult::error_text(format!("No breakpoint registered at {}.", location)))
        }
    }

    async fn handle_break_enable(&self, args: Arguments) -> Result<CallToolResult> {
        let args: BreakEnableArgs = parse_args(args)?;
        let session = self.current_session().await?;
        if session.set_breakpoint_enabled(&args.file, args.line, args.enabled) {
            let breakpoint = session.breakpoint_at(&args.file, args.line);
            Ok(CallToolResult::json(&breakpoint)?)
        } else {
            Ok(CallToolResult::error_text(format!(
                "No breakpoint registered at {}:{}.",
                args.file, args.line
            )))
        }
    }

    async fn handle_break_list(&self, args: Arguments) -> Result<CallToolResult> {
        let args: BreakListArgs = parse_args(args)?;
        let session = self.current_session().await?;
        let breakpoints = match args.number {
            Some(number) => session.breakpoint_by_number(&number).into_iter().collect(),
            None => session.breakpoints(),
        };
        Ok(CallToolResult::json(&breakpoints)?)
    }

    async fn handle_status(&self) -> Result<CallToolResult> {
        let session = self.current_session().await?;
        let status = serde_json::json!({
            "session_id": session.id(),
            "alive": session.is_alive(),
            "executable": session.executable(),
            "state": session.current_state(),
        });
        Ok(CallToolResult::json(&status)?)
    }

    async fn handle_stack_list(&self) -> Result<CallToolResult> {
        let frames = self.blocking(|s| s.stack_frames()).await??;
        let rendered: Vec<String> = frames.iter().map(|f| f.render()).collect();
        Ok(CallToolResult::text(format!(
            "{}\n\n{}",
            rendered.join("\n"),
            serde_json::to_string_pretty(&frames)?
        )))
    }

    async fn handle_variables(&self, args: Arguments) -> Result<CallToolResult> {
        let args: VariablesArgs = parse_args(args)?;
        let variables = self.blocking(move |s| s.frame_variables(args.frame)).await??;
        Ok(CallToolResult::json(&variables)?)
    }

    async fn handle_evaluate(&self, args: Arguments) -> Result<CallToolResult> {
        let args: EvaluateArgs = parse_args(args)?;
        let expression = args.expression.clone();
        let value = self.blocking(move |s| s.evaluate(&expression)).await??;
        Ok(CallToolResult::text(format!("{} = {}", args.expression, value)))
    }

    async fn handle_events(&self, args: Arguments) -> Result<CallToolResult> {
        let args: EventsArgs = parse_args(args)?;
        let max = args.max.unwrap_or(100);

        let guard = self.active.read().await;
        let active = guard
            .as_ref()
            .ok_or_else(|| anyhow!("GDB session not started. Use gdb_start first."))?;
        let events: Vec<SessionEvent> = {
            let rx = active.events.lock().unwrap_or_else(PoisonError::into_inner);
            rx.try_iter().take(max).collect()
        };
        Ok(CallToolResult::json(&events)?)
    }

    async fn handle_raw_command(&self, args: Arguments) -> Result<CallToolResult> {
        let args: RawCommandArgs = parse_args(args)?;
        let payload = self.blocking(move |s| s.raw(&args.command)).await??;
        if payload.is_empty() {
            return Ok(CallToolResult::text("done"));
        }
        Ok(CallToolResult::text(MiValue::Tuple(payload).to_string()))
    }
}

impl Default for GdbMcpServer {
    fn default() -> Self {
        Self::new(GdbConfig::from_env())
    }
}
