//! Execution state tracking driven by exec/notify records

use crate::gdb::error::{MiError, Result};
use crate::gdb::events::{EventBus, SessionEvent};
use crate::gdb::transport::AsyncListener;
use crate::gdb::types::*;
use std::sync::{PoisonError, RwLock};
use tracing::info;

pub struct SessionStateMachine {
    snapshot: RwLock<StateSnapshot>,
    events: EventBus,
}

impl SessionStateMachine {
    /// Starts in RUNNING.
    pub fn new(events: EventBus) -> Self {
        Self {
            snapshot: RwLock::new(StateSnapshot {
                state: SessionState::Running,
                stop: None,
            }),
            events,
        }
    }

    pub fn snapshot(&self) -> StateSnapshot {
        self.snapshot
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Fail fast unless execution is suspended.
    pub fn require_suspended(&self, operation: &'static str) -> Result<StateSnapshot> {
        let snapshot = self.snapshot();
        match snapshot.state {
            SessionState::Suspended => Ok(snapshot),
            state => Err(MiError::IllegalState { operation, state }),
        }
    }

    fn transition(&self, to: SessionState, stop: Option<StopInfo>) {
        let from = {
            let mut snapshot = self
                .snapshot
                .write()
                .unwrap_or_else(PoisonError::into_inner);
            // EXITED is terminal
            if snapshot.state == SessionState::Exited {
                return;
            }
            let from = snapshot.state;
            snapshot.state = to;
            snapshot.stop = stop;
            from
        };

        if from != to {
            info!("Session state {} -> {}", from, to);
            self.events.publish(SessionEvent::StateChanged { from, to });
        }
    }

    fn on_stopped(&self, results: &MiTuple) {
        let reason = StopReason::from(results.get_str("reason").unwrap_or_default());
        if reason.is_exit() {
            self.transition(SessionState::Exited, None);
            return;
        }

        let frame_payload = results.get_tuple("frame").cloned();
        let stop = StopInfo {
            reason,
            thread_id: results.get_str("thread-id").map(str::to_string),
            frame: frame_payload.as_ref().and_then(StackFrame::from_tuple),
            frame_payload,
        };
        self.transition(SessionState::Suspended, Some(stop));
    }
}

impl AsyncListener for SessionStateMachine {
    fn on_record(&self, record: &AsyncRecord) {
        let empty = MiTuple::new();
        let results = record.results().unwrap_or(&empty);
        if record.is(AsyncKind::Exec, "stopped") {
            self.on_stopped(results);
        } else if record.is(AsyncKind::Exec, "running") {
            self.transition(SessionState::Running, None);
        } else if record.is(AsyncKind::Notify, "thread-group-exited") {
            self.transition(SessionState::Exited, None);
        }
    }

    fn on_closed(&self) {
        self.transition(SessionState::Exited, None);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gdb::parser::MiParser;
    use std::sync::mpsc::Receiver;

    fn feed(machine: &SessionStateMachine, line: &str) {
        match MiParser::new().parse_line(line).unwrap() {
            Some(MiRecord::Async(record)) => machine.on_record(&record),
            other => panic!("Expected async record, got {:?}", other),
        }
    }

    fn machine() -> (SessionStateMachine, Receiver<SessionEvent>) {
        let events = EventBus::new();
        let rx = events.subscribe();
        (SessionStateMachine::new(events), rx)
    }

    #[test]
    fn test_stopped_suspends_with_stop_info() {
        let (machine, rx) = machine();
        feed(
            &machine,
            r#"*stopped,reason="breakpoint-hit",disp="keep",bkptno="1",frame={addr="0x0000555555555131",func="main",args=[],file="t.c",fullname="/tmp/t.c",line="4"},thread-id="1",stopped-threads="all""#,
        );

        let snapshot = machine.snapshot();
        assert_eq!(snapshot.state, SessionState::Suspended);
        let stop = snapshot.stop.unwrap();
        assert_eq!(stop.reason, StopReason::BreakpointHit);
        assert_eq!(stop.thread_id.as_deref(), Some("1"));
        match stop.frame {
            Some(StackFrame::Source { line, ref file, .. }) => {
                assert_eq!(line, 4);
                assert_eq!(file, "t.c");
            }
            other => panic!("Expected source frame, got {:?}", other),
        }
        assert_eq!(
            rx.try_recv().unwrap(),
            SessionEvent::StateChanged {
                from: SessionState::Running,
                to: SessionState::Suspended
            }
        );
    }

    #[test]
    fn test_running_resumes_and_clears_stop() {
        let (machine, _rx) = machine();
        feed(&machine, r#"*stopped,reason="end-stepping-range",thread-id="1""#);
        feed(&machine, r#"*running,thread-id="all""#);
        let snapshot = machine.snapshot();
        assert_eq!(snapshot.state, SessionState::Running);
        assert_eq!(snapshot.stop, None);
    }

    #[test]
    fn test_queries_rejected_while_running() {
        let (machine, _rx) = machine();
        match machine.require_suspended("stack_frames") {
            Err(MiError::IllegalState { operation, state }) => {
                assert_eq!(operation, "stack_frames");
                assert_eq!(state, SessionState::Running);
            }
            other => panic!("Expected illegal state, got {:?}", other),
        }
        feed(&machine, r#"*stopped,reason="signal-received",signal-name="SIGINT""#);
        assert!(machine.require_suspended("stack_frames").is_ok());
    }

    #[test]
    fn test_exit_reason_is_terminal() {
        let (machine, rx) = machine();
        feed(&machine, r#"*stopped,reason="exited-normally""#);
        assert_eq!(machine.snapshot().state, SessionState::Exited);

        feed(&machine, r#"*running,thread-id="all""#);
        feed(&machine, r#"*stopped,reason="breakpoint-hit""#);
        assert_eq!(machine.snapshot().state, SessionState::Exited);
        assert_eq!(rx.try_iter().count(), 1);
    }

    #[test]
    fn test_thread_group_exited_and_close() {
        let (machine, _rx) = machine();
        feed(&machine, r#"=thread-group-exited,id="i1",exit-code="0""#);
        assert_eq!(machine.snapshot().state, SessionState::Exited);

        let (machine, _rx) = self::machine();
        machine.on_closed();
        assert!(matches!(
            machine.require_suspended("frame_variables"),
            Err(MiError::IllegalState {
                state: SessionState::Exited,
                ..
            })
        ));
    }

    #[test]
    fn test_unrelated_records_are_ignored() {
        let (machine, rx) = machine();
        feed(&machine, r#"=library-loaded,id="/lib/libc.so.6""#);
        feed(&machine, "~\"Starting program\\n\"");
        assert_eq!(machine.snapshot().state, SessionState::Running);
        assert!(rx.try_recv().is_err());
    }
}
