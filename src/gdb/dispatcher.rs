//! Command issuer: one MI command in flight at a time.

use crate::gdb::channel::{Awaited, ReplyReceiver};
use crate::gdb::error::{MiError, Result};
use crate::gdb::events::{EventBus, SessionEvent};
use crate::gdb::parser::render_cstring;
use crate::gdb::types::{MiTuple, ResultClass, ResultRecord};
use std::io::Write;
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

struct Inflight {
    writer: Box<dyn Write + Send>,
    replies: ReplyReceiver,
    next_token: u64,
}

pub struct Dispatcher {
    // Held from write until the reply resolves.
    inflight: Mutex<Inflight>,
    timeout: Duration,
    events: EventBus,
}

impl Dispatcher {
    pub fn new(
        writer: Box<dyn Write + Send>,
        replies: ReplyReceiver,
        timeout: Duration,
        events: EventBus,
    ) -> Self {
        Self {
            inflight: Mutex::new(Inflight {
                writer,
                replies,
                next_token: 1,
            }),
            timeout,
            events,
        }
    }

    /// Send a command and wait for its result record.
    pub fn send(&self, command: &str, options: &[&str], parameters: &[&str]) -> Result<MiTuple> {
        // Parameters are quoted on the way out; command and options are not.
        if !is_single_line(command) || !options.iter().all(|option| is_single_line(option)) {
            return Err(MiError::MultiLineCommand {
                command: command.to_string(),
            });
        }

        let mut inflight = self
            .inflight
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        inflight.replies.drain_stale();

        let token = inflight.next_token;
        inflight.next_token += 1;

        let line = build_command_line(token, command, options, parameters);
        debug!("GDB input: {}", line.trim_end());
        inflight.writer.write_all(line.as_bytes())?;
        inflight.writer.flush()?;

        let started = Instant::now();
        let deadline = started + self.timeout;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match inflight.replies.wait(remaining) {
                Awaited::Reply(record) if record.token.is_some_and(|t| t != token) => {
                    warn!(
                        "Discarding reply with token {:?} while waiting for {}",
                        record.token, token
                    );
                }
                Awaited::Reply(record) => return complete(command, record),
                Awaited::TimedOut => {
                    drop(inflight);
                    warn!("{} timed out after {:?}", command, self.timeout);
                    self.events.publish(SessionEvent::BackendUnresponsive {
                        command: command.to_string(),
                    });
                    return Err(MiError::Timeout {
                        command: command.to_string(),
                        elapsed: started.elapsed(),
                    });
                }
                Awaited::Closed => return Err(MiError::Closed),
            }
        }
    }
}

fn complete(command: &str, record: ResultRecord) -> Result<MiTuple> {
    match record.class {
        ResultClass::Error => {
            let message = record
                .payload
                .get_str("msg")
                .unwrap_or("unknown error")
                .to_string();
            warn!("{} failed: {}", command, message);
            Err(MiError::Operation {
                command: command.to_string(),
                message,
                payload: record.payload,
            })
        }
        ResultClass::Done | ResultClass::Running | ResultClass::Connected | ResultClass::Exit => {
            Ok(record.payload)
        }
    }
}

fn is_single_line(text: &str) -> bool {
    !text.contains(|c| c == '\n' || c == '\r')
}

/// `<token><command>[ <option>...][ --][ <parameter>...]\n`
pub fn build_command_line(token: u64, command: &str, options: &[&str], parameters: &[&str]) -> String {
    let mut line = token.to_string();
    if !command.starts_with('-') {
        line.push('-');
    }
    line.push_str(command);
    for option in options {
        line.push(' ');
        line.push_str(option);
    }
    if !options.is_empty() && !parameters.is_empty() {
        line.push_str(" --");
    }
    for parameter in parameters {
        line.push(' ');
        line.push_str(&quote_parameter(parameter));
    }
    line.push('\n');
    line
}

/// Quote a parameter as an MI c-string when it would not survive as a bare word.
pub fn quote_parameter(parameter: &str) -> String {
    let needs_quoting = parameter.is_empty()
        || parameter
            .chars()
            .any(|c| c.is_whitespace() || c.is_control() || c == '"' || c == '\\');
    if needs_quoting {
        render_cstring(parameter)
    } else {
        parameter.to_string()
    }
}

/// String field a successful reply must carry
pub fn require_str<'a>(payload: &'a MiTuple, command: &str, field: &str) -> Result<&'a str> {
    payload
        .get_str(field)
        .ok_or_else(|| MiError::payload_shape(command, field))
}
