//! Turn proposals, executions and cancellations into notification events.
//!
//! Delivery belongs to a [`Notify`] implementation. The reporter never retries
//! and never fails its caller: a delivery error is logged and dropped.

use crate::error::Result;
use crate::exec::Execution;
use crate::proposal::CommandProposal;
use crate::signal::DetectionSignal;
use crate::types::Severity;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const LOCAL_DETAIL_LIMIT: usize = 800;
pub const SAMPLE_PREVIEW_CHARS: usize = 60;

const PASS_MARKER: &str = "[PASS]";
const FAIL_MARKER: &str = "[FAIL]";
const NO_ACTION_MARKER: &str = "No action";

// ---------------------------------------------------------------------------
// NotificationEvent
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum NotificationEvent {
    ActionProposed {
        command: String,
        severity: Severity,
        sample: String,
        occurrences: u64,
        timestamp: DateTime<Utc>,
    },
    ExecutionResult {
        target: String,
        command: String,
        succeeded: bool,
        /// One line per device for fleet runs; captured output otherwise.
        detail: Vec<String>,
        timestamp: DateTime<Utc>,
    },
    Cancellation {
        target: String,
        command: String,
        timestamp: DateTime<Utc>,
    },
}

impl NotificationEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            NotificationEvent::ActionProposed { .. } => "action_proposed",
            NotificationEvent::ExecutionResult { .. } => "execution_result",
            NotificationEvent::Cancellation { .. } => "cancellation",
        }
    }
}

/// External notification sink.
pub trait Notify {
    fn notify(&self, event: &NotificationEvent) -> Result<()>;
}

impl<T: Notify + ?Sized> Notify for &T {
    fn notify(&self, event: &NotificationEvent) -> Result<()> {
        (**self).notify(event)
    }
}

impl<T: Notify + ?Sized> Notify for Box<T> {
    fn notify(&self, event: &NotificationEvent) -> Result<()> {
        (**self).notify(event)
    }
}

// ---------------------------------------------------------------------------
// OutcomeReporter
// ---------------------------------------------------------------------------

pub struct OutcomeReporter<N: Notify> {
    sink: N,
}

impl<N: Notify> OutcomeReporter<N> {
    pub fn new(sink: N) -> Self {
        Self { sink }
    }

    pub fn report_execution(
        &self,
        target_label: &str,
        command: &str,
        execution: &Execution,
        succeeded: bool,
    ) -> NotificationEvent {
        let event = NotificationEvent::ExecutionResult {
            target: target_label.to_string(),
            command: command.to_string(),
            succeeded,
            detail: render_detail(execution),
            timestamp: Utc::now(),
        };
        self.deliver(&event);
        event
    }

    pub fn report_cancellation(&self, target_label: &str, command: &str) -> NotificationEvent {
        let event = NotificationEvent::Cancellation {
            target: target_label.to_string(),
            command: command.to_string(),
            timestamp: Utc::now(),
        };
        self.deliver(&event);
        event
    }

    /// Announce a newly stored proposal. "No action" proposals stay quiet.
    pub fn report_proposal(
        &self,
        proposal: &CommandProposal,
        signal: &DetectionSignal,
    ) -> Option<NotificationEvent> {
        if proposal.command_text.contains(NO_ACTION_MARKER) {
            tracing::info!("proposal needs no action; not notifying");
            return None;
        }
        let event = NotificationEvent::ActionProposed {
            command: proposal.command_text.clone(),
            severity: proposal.derived_severity,
            sample: signal.preview(SAMPLE_PREVIEW_CHARS),
            occurrences: signal.occurrence_count,
            timestamp: Utc::now(),
        };
        self.deliver(&event);
        Some(event)
    }

    fn deliver(&self, event: &NotificationEvent) {
        match self.sink.notify(event) {
            Ok(()) => tracing::info!(kind = event.kind(), "notification delivered"),
            Err(e) => tracing::warn!(kind = event.kind(), error = %e, "notification failed"),
        }
    }
}

/// Per-device lines for a fleet run, truncated output for a local run.
pub fn render_detail(execution: &Execution) -> Vec<String> {
    match execution {
        Execution::Local(result) => vec![truncate(&result.message, LOCAL_DETAIL_LIMIT)],
        Execution::Fleet(outcome) => outcome
            .results
            .iter()
            .map(|r| {
                let marker = if r.succeeded { PASS_MARKER } else { FAIL_MARKER };
                format!("{marker} {}: {}", r.target_id, r.message.trim())
            })
            .collect(),
    }
}

fn truncate(s: &str, max_chars: usize) -> String {
    s.chars().take(max_chars).collect()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use crate::error::SoarError;
    use std::sync::Mutex;

    /// Records every event; optionally fails delivery.
    #[derive(Default)]
    pub struct RecordingNotifier {
        pub events: Mutex<Vec<NotificationEvent>>,
        pub fail: bool,
    }

    impl RecordingNotifier {
        pub fn failing() -> Self {
            Self {
                events: Mutex::new(Vec::new()),
                fail: true,
            }
        }

        pub fn events(&self) -> Vec<NotificationEvent> {
            self.events.lock().unwrap().clone()
        }
    }

    impl Notify for RecordingNotifier {
        fn notify(&self, event: &NotificationEvent) -> Result<()> {
            self.events.lock().unwrap().push(event.clone());
            if self.fail {
                return Err(SoarError::Notify("sink unavailable".into()));
            }
            Ok(())
        }
    }
}
