//! GDB (GNU Debugger) MI Interface Module

pub mod breakpoints;
pub mod channel;
pub mod dispatcher;
pub mod error;
pub mod events;
pub mod parser;
pub mod session;
pub mod state;
pub mod transport;
pub mod types;

#[cfg(test)]
pub mod testing;

pub use breakpoints::BreakpointFlags;
pub use events::SessionEvent;
pub use session::{DebugSession, StartupContext};
pub use types::*;
