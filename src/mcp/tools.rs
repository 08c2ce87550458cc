//! MCP Tool Definitions for GDB Debugging

use serde::Serialize;

/// MCP Tool definition
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub input_schema: serde_json::Value,
}

fn no_arguments() -> serde_json::Value {
    serde_json::json!({
        "type": "object",
        "properties": {},
        "required": []
    })
}

fn location_properties() -> serde_json::Value {
    serde_json::json!({
        "file": {
            "type": "string",
            "description": "Source file path or file:// URL"
        },
        "line": {
            "type": "integer",
            "description": "Line number (1-based)"
        }
    })
}

/// Tool: Start GDB session
pub fn tool_start_gdb() -> ToolDefinition {
    ToolDefinition {
        name: "gdb_start".to_string(),
        description: "Start a new GDB debugging session. Breakpoints given here are registered before the session is returned.".to_string(),
        input_schema: serde_json::json!({
            "type": "object",
            "properties": {
                "gdb_path": {
                    "type": "string",
                    "description": "Path to GDB executable (default: $MCP_GDB_PATH or gdb)"
                },
                "timeout_ms": {
                    "type": "integer",
                    "description": "How long to wait for each command's reply (default: 2000)"
                },
                "breakpoints": {
                    "type": "array",
                    "description": "Breakpoints to insert at startup",
                    "items": {
                        "type": "object",
                        "properties": location_properties(),
                        "required": ["file", "line"]
                    }
                }
            },
            "required": []
        }),
    }
}

/// Tool: Stop GDB session
pub fn tool_stop_gdb() -> ToolDefinition {
    ToolDefinition {
        name: "gdb_stop".to_string(),
        description: "Stop the current GDB debugging session and clean up resources.".to_string(),
        input_schema: no_arguments(),
    }
}

/// Tool: Load executable
pub fn tool_load_file() -> ToolDefinition {
    ToolDefinition {
        name: "gdb_load_file".to_string(),
        description: "Load an executable file and its symbol table into GDB for debugging.".to_string(),
        input_schema: serde_json::json!({
            "type": "object",
            "properties": {
                "file_path": {
                    "type": "string",
                    "description": "Path to the executable file to debug"
                }
            },
            "required": ["file_path"]
        }),
    }
}

/// Tool: Run program
pub fn tool_run() -> ToolDefinition {
    ToolDefinition {
        name: "gdb_run".to_string(),
        description: "Start running the loaded program from the beginning.".to_string(),
        input_schema: no_arguments(),
    }
}

/// Tool: Continue
pub fn tool_continue() -> ToolDefinition {
    ToolDefinition {
        name: "gdb_continue".to_string(),
        description: "Resume execution until the next breakpoint or exit.".to_string(),
        input_schema: no_arguments(),
    }
}

/// Tool: Step over
pub fn tool_next() -> ToolDefinition {
    ToolDefinition {
        name: "gdb_next".to_string(),
        description: "Execute the next source line, stepping over function calls.".to_string(),
        input_schema: no_arguments(),
    }
}

/// Tool: Step into
pub fn tool_step() -> ToolDefinition {
    ToolDefinition {
        name: "gdb_step".to_string(),
        description: "Execute the next source line, stepping into function calls.".to_string(),
        input_schema: no_arguments(),
    }
}

/// Tool: Interrupt
pub fn tool_interrupt() -> ToolDefinition {
    ToolDefinition {
        name: "gdb_interrupt".to_string(),
        description: "Interrupt the running program.".to_string(),
        input_schema: no_arguments(),
    }
}

/// Tool: Insert breakpoint
pub fn tool_break_insert() -> ToolDefinition {
    let mut properties = location_properties();
    properties["temporary"] = serde_json::json!({
        "type": "boolean",
        "description": "Delete the breakpoint after the first hit"
    });
    properties["disabled"] = serde_json::json!({
        "type": "boolean",
        "description": "Insert the breakpoint disabled"
    });
    properties["log_message"] = serde_json::json!({
        "type": "string",
        "description": "Print this message instead of stopping (dprintf)"
    });

    ToolDefinition {
        name: "gdb_break_insert".to_string(),
        description: "Set a breakpoint at a source line. Inserting at an already registered location only updates its enabled flag.".to_string(),
        input_schema: serde_json::json!({
            "type": "object",
            "properties": properties,
            "required": ["file", "line"]
        }),
    }
}

/// Tool: Delete breakpoint
pub fn tool_break_delete() -> ToolDefinition {
    ToolDefinition {
        name: "gdb_break_delete".to_string(),
        description: "Delete the breakpoint registered at a source line.".to_string(),
        input_schema: serde_json::json!({
            "type": "object",
            "properties": location_properties(),
            "required": ["file", "line"]
        }),
    }
}

/// Tool: Enable/disable breakpoint
pub fn tool_break_enable() -> ToolDefinition {
    let mut properties = location_properties();
    properties["enabled"] = serde_json::json!({
        "type": "boolean",
        "description": "New enabled flag"
    });

    ToolDefinition {
        name: "gdb_break_enable".to_string(),
        description: "Set the enabled flag of a registered breakpoint.".to_string(),
        input_schema: serde_json::json!({
            "type": "object",
            "properties": properties,
            "required": ["file", "line", "enabled"]
        }),
    }
}

/// Tool: List breakpoints
pub fn tool_break_list() -> ToolDefinition {
    ToolDefinition {
        name: "gdb_break_list".to_string(),
        description: "List all registered breakpoints, ordered by number.".to_string(),
        input_schema: serde_json::json!({
            "type": "object",
            "properties": {
                "number": {
                    "type": "string",
                    "description": "Only show the breakpoint with this number"
                }
            },
            "required": []
        }),
    }
}

/// Tool: Session status
pub fn tool_status() -> ToolDefinition {
    ToolDefinition {
        name: "gdb_status".to_string(),
        description: "Get the session state (RUNNING, SUSPENDED or EXITED) and, when suspended, the stop reason, thread and top frame.".to_string(),
        input_schema: no_arguments(),
    }
}

/// Tool: Backtrace
pub fn tool_stack_list() -> ToolDefinition {
    ToolDefinition {
        name: "gdb_stack_list".to_string(),
        description: "List the stack frames of the stopped thread. Only available while suspended.".to_string(),
        input_schema: no_arguments(),
    }
}

/// Tool: Frame variables
pub fn tool_variables() -> ToolDefinition {
    ToolDefinition {
        name: "gdb_variables".to_string(),
        description: "List arguments and locals of a stack frame. Only available while suspended.".to_string(),
        input_schema: serde_json::json!({
            "type": "object",
            "properties": {
                "frame": {
                    "type": "integer",
                    "description": "Frame level (default: 0, the innermost frame)"
                }
            },
            "required": []
        }),
    }
}

/// Tool: Evaluate expression
pub fn tool_evaluate() -> ToolDefinition {
    ToolDefinition {
        name: "gdb_evaluate".to_string(),
        description: "Evaluate an expression in the current frame. Only available while suspended.".to_string(),
        input_schema: serde_json::json!({
            "type": "object",
            "properties": {
                "expression": {
                    "type": "string",
                    "description": "Expression to evaluate"
                }
            },
            "required": ["expression"]
        }),
    }
}

/// Tool: Drain session events
pub fn tool_events() -> ToolDefinition {
    ToolDefinition {
        name: "gdb_events".to_string(),
        description: "Return session events (state changes, invalidated breakpoints, unresponsive backend, program output) received since the last call.".to_string(),
        input_schema: serde_json::json!({
            "type": "object",
            "properties": {
                "max": {
                    "type": "integer",
                    "description": "Maximum number of events to return (default: 100)"
                }
            },
            "required": []
        }),
    }
}

/// Tool: Execute raw GDB command
pub fn tool_raw_command() -> ToolDefinition {
    ToolDefinition {
        name: "gdb_raw_command".to_string(),
        description: "Execute a raw GDB/MI command directly. Use for advanced operations not covered by other tools.".to_string(),
        input_schema: serde_json::json!({
            "type": "object",
            "properties": {
                "command": {
                    "type": "string",
                    "description": "GDB/MI command to execute, e.g. '-gdb-version' or 'break-info 1'"
                }
            },
            "required": ["command"]
        }),
    }
}

/// Get all available tools
pub fn get_all_tools() -> Vec<ToolDefinition> {
    vec![
        tool_start_gdb(),
        tool_stop_gdb(),
        tool_load_file(),
        tool_run(),
        tool_continue(),
        tool_next(),
        tool_step(),
        tool_interrupt(),
        tool_break_insert(),
        tool_break_delete(),
        tool_break_enable(),
        tool_break_list(),
        tool_status(),
        tool_stack_list(),
        tool_variables(),
        tool_evaluate(),
        tool_events(),
        tool_raw_command(),
    ]
}
