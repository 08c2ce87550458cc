//! MCP GDB Session Server
//!
//! A Model Context Protocol (MCP) server driving one GDB session over the
//! GDB/MI protocol: breakpoints keyed by source location, execution state
//! tracking, and stack/variable queries while the program is suspended.
//!
//! Usage:
//!   Add to the MCP client config:
//!   ```json
//!   {
//!     "mcpServers": {
//!       "gdb": {
//!         "command": "/path/to/mcp-gdb-session",
//!         "env": { "MCP_GDB_PATH": "gdb-multiarch", "RUST_LOG": "info" }
//!       }
//!     }
//!   }
//!   ```

mod gdb;
mod mcp;

use crate::gdb::GdbConfig;
use crate::mcp::protocol::*;
use crate::mcp::GdbMcpServer;
use anyhow::Result;
use std::io::{BufRead, BufReader, Write};
use tokio::sync::RwLock;
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

/// MCP Server state
struct ServerState {
    server: GdbMcpServer,
    initialized: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging to stderr
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    info!("Starting MCP GDB Session Server v{}", env!("CARGO_PKG_VERSION"));

    let config = GdbConfig::from_env();
    debug!("GDB config: {:?}", config);

    let state = RwLock::new(ServerState {
        server: GdbMcpServer::new(config),
        initialized: false,
    });

    // Read from stdin, write to stdout
    let stdin = std::io::stdin();
    let stdout = std::io::stdout();
    let mut stdout = stdout.lock();

    let reader = BufReader::new(stdin);

    info!("MCP GDB Session Server ready, listening on stdin");

    for line in reader.lines() {
        let line = match line {
            Ok(line) => line,
            Err(e) => {
                error!("Error reading from stdin: {}", e);
                break;
            }
        };
        if line.trim().is_empty() {
            continue;
        }
        debug!("Received: {}", line);

        let reply = match serde_json::from_str::<JsonRpcRequest>(&line) {
            Ok(req) => {
                if req.jsonrpc != JSONRPC_VERSION {
                    warn!("Unexpected jsonrpc version: {}", req.jsonrpc);
                }
                let id = req.id.clone();
                match handle_request(&state, req).await {
                    Ok(Some(resp)) => Some(serde_json::to_string(&resp)?),
                    Ok(None) => None,
                    Err(e) => {
                        error!("Error handling request: {}", e);
                        Some(serde_json::to_string(&JsonRpcResponse::failure(
                            id,
                            JsonRpcError::internal_error(&e.to_string()),
                        ))?)
                    }
                }
            }
            Err(e) => {
                error!("Failed to parse request: {}", e);
                Some(serde_json::to_string(&JsonRpcResponse::failure(
                    None,
                    JsonRpcError::parse_error(),
                ))?)
            }
        };

        if let Some(reply) = reply {
            debug!("Sending: {}", reply);
            writeln!(stdout, "{}", reply)?;
            stdout.flush()?;
        }
    }

    info!("MCP GDB Session Server shutting down");
    if let Err(e) = state.read().await.server.shutdown().await {
        warn!("Failed to stop GDB session: {}", e);
    }
    Ok(())
}

fn respond(id: Option<RequestId>, result: serde_json::Value) -> Option<serde_json::Value> {
    serde_json::to_value(JsonRpcResponse::success(id, result)).ok()
}

/// Handle a JSON-RPC request
async fn handle_request(
    state: &RwLock<ServerState>,
    request: JsonRpcRequest,
) -> Result<Option<serde_json::Value>> {
    let method = request.method.as_str();

    debug!("Handling method: {}", method);

    match method {
        // MCP Protocol methods
        "initialize" => {
            let mut state = state.write().await;
            state.initialized = true;
            let result = state.server.handle_initialize(request.params).await?;
            Ok(respond(request.id, result))
        }
        "initialized" | "notifications/initialized" => {
            // Notification, no response needed
            Ok(None)
        }
        "ping" => Ok(respond(request.id, serde_json::json!({}))),
        "tools/list" => {
            let state = state.read().await;
            let result = state.server.handle_tools_list().await?;
            Ok(respond(request.id, result))
        }
        "tools/call" => {
            let state = state.read().await;
            if !state.initialized {
                warn!("tools/call before initialize");
            }
            let result = state.server.handle_tools_call(request.params).await?;
            Ok(respond(request.id, result))
        }
        "resources/list" => Ok(respond(request.id, serde_json::json!({"resources": []}))),
        "prompts/list" => Ok(respond(request.id, serde_json::json!({"prompts": []}))),
        "logging/setLevel" => {
            // Acknowledge but ignore
            Ok(respond(request.id, serde_json::json!({})))
        }
        _ => {
            warn!("Unknown method: {}", method);
            let response = JsonRpcResponse::failure(request.id, JsonRpcError::method_not_found(method));
            Ok(Some(serde_json::to_value(response)?))
        }
    }
}
