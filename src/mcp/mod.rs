//! MCP (Model Context Protocol) Server Module

pub mod protocol;
pub mod server;
pub mod tools;

pub use server::GdbMcpServer;
