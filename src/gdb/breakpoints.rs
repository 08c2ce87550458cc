//! Breakpoint registry keyed by source location.
//!
//! Inserts and deletes go through the dispatcher; the registry lock is
//! released before any command is sent so the reader thread can keep
//! delivering notifications while a command waits for its reply.

use crate::gdb::dispatcher::Dispatcher;
use crate::gdb::error::{MiError, Result};
use crate::gdb::events::{EventBus, SessionEvent};
use crate::gdb::parser::breakpoint_number;
use crate::gdb::transport::AsyncListener;
use crate::gdb::types::{AsyncKind, AsyncRecord};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use thiserror::Error;
use tracing::{debug, info, warn};

/// Source location identifying a breakpoint
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct BreakpointKey {
    pub file_url: String,
    pub line: u32,
}

impl BreakpointKey {
    pub fn new(file_url: impl Into<String>, line: u32) -> Self {
        Self {
            file_url: file_url.into(),
            line,
        }
    }

    /// `<path>:<line>` as understood by `-break-insert`
    pub fn location(&self) -> String {
        let path = self
            .file_url
            .strip_prefix("file://")
            .unwrap_or(&self.file_url);
        format!("{}:{}", path, self.line)
    }
}

/// Insert options
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct BreakpointFlags {
    pub temporary: bool,
    pub disabled: bool,
    /// Turns the breakpoint into a logpoint (`-dprintf-insert`) printing this message.
    pub log_message: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Breakpoint {
    #[serde(flatten)]
    pub key: BreakpointKey,
    pub number: String,
    pub enabled: bool,
    pub temporary: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log_message: Option<String>,
}

/// Why a breakpoint could not be registered
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Error)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum InvalidReason {
    #[error("rejected by debugger: {0}")]
    Rejected(String),

    #[error("debugger reply carries no breakpoint number")]
    MissingNumber,

    #[error("debugger did not answer in time")]
    Unresponsive,

    #[error("debugger connection is closed")]
    Closed,

    #[error("another request for this location is still in progress")]
    Busy,
}

impl From<&MiError> for InvalidReason {
    fn from(err: &MiError) -> Self {
        match err {
            MiError::Operation { message, .. } => InvalidReason::Rejected(message.clone()),
            MiError::PayloadShape { .. } => InvalidReason::MissingNumber,
            MiError::Timeout { .. } => InvalidReason::Unresponsive,
            MiError::Closed | MiError::Io(_) => InvalidReason::Closed,
            other => InvalidReason::Rejected(other.to_string()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoveOutcome {
    Removed,
    NotFound,
    /// A delete for this location is already awaiting its reply.
    Busy,
}

#[derive(Default)]
struct Registry {
    entries: HashMap<BreakpointKey, Breakpoint>,
    // Keys with an insert awaiting its reply
    in_flight: HashSet<BreakpointKey>,
    // Keys with a delete awaiting its reply
    deleting: HashSet<BreakpointKey>,
}

pub struct BreakpointManager {
    registry: Mutex<Registry>,
    dispatcher: Arc<Dispatcher>,
    events: EventBus,
}

impl BreakpointManager {
    pub fn new(dispatcher: Arc<Dispatcher>, events: EventBus) -> Self {
        Self {
            registry: Mutex::new(Registry::default()),
            dispatcher,
            events,
        }
    }

    fn registry(&self) -> MutexGuard<'_, Registry> {
        self.registry.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn insert(
        &self,
        file_url: &str,
        line: u32,
        flags: &BreakpointFlags,
    ) -> std::result::Result<Breakpoint, InvalidReason> {
        let key = BreakpointKey::new(file_url, line);
        {
            let mut registry = self.registry();
            if registry.deleting.contains(&key) {
                return Err(InvalidReason::Busy);
            }
            if let Some(existing) = registry.entries.get_mut(&key) {
                existing.enabled = !flags.disabled;
                debug!("Breakpoint {} already registered", existing.number);
                return Ok(existing.clone());
            }
            if !registry.in_flight.insert(key.clone()) {
                return Err(InvalidReason::Busy);
            }
        }

        let location = key.location();
        let mut options = Vec::new();
        if flags.temporary {
            options.push("-t");
        }
        if flags.disabled {
            options.push("-d");
        }
        let (command, parameters) = match &flags.log_message {
            Some(message) => ("-dprintf-insert", vec![location.as_str(), message.as_str()]),
            None => ("-break-insert", vec![location.as_str()]),
        };

        let outcome = self
            .dispatcher
            .send(command, &options, &parameters)
            .and_then(|payload| {
                breakpoint_number(&payload)
                    .map(str::to_string)
                    .ok_or_else(|| MiError::payload_shape(command, "bkpt.number"))
            });

        let mut registry = self.registry();
        registry.in_flight.remove(&key);
        match outcome {
            Ok(number) => {
                let breakpoint = Breakpoint {
                    key: key.clone(),
                    number,
                    enabled: !flags.disabled,
                    temporary: flags.temporary,
                    log_message: flags.log_message.clone(),
                };
                info!("Breakpoint {} inserted at {}", breakpoint.number, location);
                registry.entries.insert(key, breakpoint.clone());
                Ok(breakpoint)
            }
            Err(err) => {
                drop(registry);
                let reason = InvalidReason::from(&err);
                warn!("Breakpoint at {} is invalid: {}", location, reason);
                self.events.publish(SessionEvent::BreakpointInvalidated {
                    key,
                    reason: reason.clone(),
                });
                Err(reason)
            }
        }
    }

    /// Flip the local enabled flag. Returns false when no breakpoint is registered there.
    pub fn set_enabled(&self, file_url: &str, line: u32, enabled: bool) -> bool {
        let key = BreakpointKey::new(file_url, line);
        match self.registry().entries.get_mut(&key) {
            Some(breakpoint) => {
                breakpoint.enabled = enabled;
                true
            }
            None => false,
        }
    }

    pub fn remove(&self, file_url: &str, line: u32) -> Result<RemoveOutcome> {
        let key = BreakpointKey::new(file_url, line);
        let number = {
            let mut registry = self.registry();
            let number = match registry.entries.get(&key) {
                Some(breakpoint) => breakpoint.number.clone(),
                None => return Ok(RemoveOutcome::NotFound),
            };
            if !registry.deleting.insert(key.clone()) {
                return Ok(RemoveOutcome::Busy);
            }
            number
        };

        let outcome = self.dispatcher.send("-break-delete", &[], &[number.as_str()]);

        let mut registry = self.registry();
        registry.deleting.remove(&key);
        outcome?;
        // The backend may already have dropped it via =breakpoint-deleted.
        if registry
            .entries
            .get(&key)
            .is_some_and(|bp| bp.number == number)
        {
            registry.entries.remove(&key);
        }
        info!("Breakpoint {} deleted", number);
        Ok(RemoveOutcome::Removed)
    }

    /// Forget a breakpoint the backend deleted on its own.
    pub fn remove_by_number(&self, number: &str) -> Option<Breakpoint> {
        let mut registry = self.registry();
        let key = registry
            .entries
            .iter()
            .find(|(_, bp)| bp.number == number)
            .map(|(key, _)| key.clone())?;
        registry.entries.remove(&key)
    }

    pub fn lookup(&self, file_url: &str, line: u32) -> Option<Breakpoint> {
        self.registry()
            .entries
            .get(&BreakpointKey::new(file_url, line))
            .cloned()
    }

    pub fn lookup_by_number(&self, number: &str) -> Option<Breakpoint> {
        self.registry()
            .entries
            .values()
            .find(|bp| bp.number == number)
            .cloned()
    }

    /// Registered breakpoints ordered by number
    pub fn list(&self) -> Vec<Breakpoint> {
        let mut breakpoints: Vec<Breakpoint> = self.registry().entries.values().cloned().collect();
        breakpoints.sort_by(|a, b| {
            let order = |bp: &Breakpoint| bp.number.parse::<u64>().unwrap_or(u64::MAX);
            order(a)
                .cmp(&order(b))
                .then_with(|| a.number.cmp(&b.number))
        });
        breakpoints
    }
}

impl AsyncListener for BreakpointManager {
    fn on_record(&self, record: &AsyncRecord) {
        let Some(results) = record.results() else {
            return;
        };
        if record.is(AsyncKind::Notify, "breakpoint-deleted") {
            let number = results.get_str("id").or_else(|| results.get_str("number"));
            if let Some(removed) = number.and_then(|n| self.remove_by_number(n)) {
                info!("Breakpoint {} deleted by debugger", removed.number);
            }
        } else if record.is(AsyncKind::Notify, "breakpoint-modified") {
            let Some(bkpt) = results.get_tuple("bkpt") else {
                return;
            };
            let (Some(number), Some(enabled)) = (bkpt.get_str("number"), bkpt.get_str("enabled"))
            else {
                return;
            };
            let mut registry = self.registry();
            if let Some(breakpoint) = registry.entries.values_mut().find(|bp| bp.number == number) {
                breakpoint.enabled = enabled == "y";
            }
        }
    }
}
