//! The approval gate: one human decision on the stored pending action.
//!
//! ```text
//! PendingApproval ──approve──▶ Approved ──▶ ExecutedSuccess | ExecutedFailure
//!        └────────reject─────▶ Rejected ──▶ Cancelled
//! ```
//!
//! Every terminal state removes the pending artifact, so a repeated run never
//! reprocesses a stale decision. Only the decided action is removed: a proposal
//! that lands while the operator is deciding survives for its own review.

use crate::classifier::classify;
use crate::error::{Result, SoarError};
use crate::exec::{Dispatch, Execution};
use crate::pending::{PendingAction, PendingStore};
use crate::report::{NotificationEvent, Notify, OutcomeReporter};
use crate::types::{Backend, HumanChoice};
use serde::{Deserialize, Serialize};
use std::fmt;

// ---------------------------------------------------------------------------
// ApprovalState
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalState {
    PendingApproval,
    Approved,
    Rejected,
    ExecutedSuccess,
    ExecutedFailure,
    Cancelled,
}

impl ApprovalState {
    pub fn as_str(self) -> &'static str {
        match self {
            ApprovalState::PendingApproval => "pending_approval",
            ApprovalState::Approved => "approved",
            ApprovalState::Rejected => "rejected",
            ApprovalState::ExecutedSuccess => "executed_success",
            ApprovalState::ExecutedFailure => "executed_failure",
            ApprovalState::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            ApprovalState::ExecutedSuccess | ApprovalState::ExecutedFailure | ApprovalState::Cancelled
        )
    }

    pub fn can_transition_to(self, target: ApprovalState) -> bool {
        use ApprovalState::*;
        matches!(
            (self, target),
            (PendingApproval, Approved)
                | (PendingApproval, Rejected)
                | (Approved, ExecutedSuccess)
                | (Approved, ExecutedFailure)
                | (Rejected, Cancelled)
        )
    }

    pub fn transition(self, target: ApprovalState) -> Result<ApprovalState> {
        if !self.can_transition_to(target) {
            return Err(SoarError::InvalidTransition {
                from: self.to_string(),
                to: target.to_string(),
            });
        }
        if target.is_terminal() {
            tracing::info!(from = %self, to = %target, "approval finished");
        } else {
            tracing::debug!(from = %self, to = %target, "approval state");
        }
        Ok(target)
    }
}

impl fmt::Display for ApprovalState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Decision collection
// ---------------------------------------------------------------------------

/// What the operator sees before deciding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ApprovalPrompt {
    pub command: String,
    pub backend: Backend,
    pub label: &'static str,
}

impl ApprovalPrompt {
    pub fn for_action(action: &PendingAction) -> Self {
        let backend = classify(&action.command_text);
        Self {
            command: action.command_text.clone(),
            backend,
            label: backend.label(),
        }
    }
}

/// Source of the human decision. Implementations must map aborted or
/// unreadable input to [`HumanChoice::Reject`].
pub trait DecisionSource {
    fn collect(&mut self, prompt: &ApprovalPrompt) -> HumanChoice;
}

/// A decision fixed up front (`--yes` / `--no`, tests).
#[derive(Debug, Clone, Copy)]
pub struct Preset(pub HumanChoice);

impl DecisionSource for Preset {
    fn collect(&mut self, _prompt: &ApprovalPrompt) -> HumanChoice {
        self.0
    }
}

// ---------------------------------------------------------------------------
// GateOutcome
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum GateOutcome {
    NoPendingAction,
    Cancelled {
        action: PendingAction,
        state: ApprovalState,
        notification: NotificationEvent,
    },
    Executed {
        action: PendingAction,
        state: ApprovalState,
        execution: Execution,
        notification: NotificationEvent,
    },
}

impl GateOutcome {
    pub fn state(&self) -> Option<ApprovalState> {
        match self {
            GateOutcome::NoPendingAction => None,
            GateOutcome::Cancelled { state, .. } | GateOutcome::Executed { state, .. } => Some(*state),
        }
    }
}

// ---------------------------------------------------------------------------
// ApprovalGate
// ---------------------------------------------------------------------------

pub struct ApprovalGate<'a, D: Dispatch, N: Notify> {
    store: &'a PendingStore,
    dispatcher: D,
    reporter: OutcomeReporter<N>,
}

impl<'a, D: Dispatch, N: Notify> ApprovalGate<'a, D, N> {
    pub fn new(store: &'a PendingStore, dispatcher: D, reporter: OutcomeReporter<N>) -> Self {
        Self {
            store,
            dispatcher,
            reporter,
        }
    }

    /// Read the pending action, ask `source` for a decision, apply it.
    pub fn run(&self, source: &mut dyn DecisionSource) -> Result<GateOutcome> {
        let Some(action) = self.store.read()? else {
            tracing::info!("no pending action");
            return Ok(GateOutcome::NoPendingAction);
        };
        let prompt = ApprovalPrompt::for_action(&action);
        let choice = source.collect(&prompt);
        tracing::info!(?choice, backend = %prompt.backend, "decision collected");
        self.decide(action, choice)
    }

    pub fn decide(&self, action: PendingAction, choice: HumanChoice) -> Result<GateOutcome> {
        let state = ApprovalState::PendingApproval;
        let label = classify(&action.command_text).label();
        match choice {
            HumanChoice::Approve => {
                let state = state.transition(ApprovalState::Approved)?;
                let execution = self.dispatcher.dispatch(&action.command_text);
                let cleared = self.store.clear_if(&action.command_text);
                let succeeded = execution.succeeded();
                let state = state.transition(if succeeded {
                    ApprovalState::ExecutedSuccess
                } else {
                    ApprovalState::ExecutedFailure
                })?;
                let notification =
                    self.reporter
                        .report_execution(label, &action.command_text, &execution, succeeded);
                cleared?;
                tracing::info!(%state, "approved command executed");
                Ok(GateOutcome::Executed {
                    action,
                    state,
                    execution,
                    notification,
                })
            }
            HumanChoice::Reject => {
                let state = state.transition(ApprovalState::Rejected)?;
                self.store.clear_if(&action.command_text)?;
                let state = state.transition(ApprovalState::Cancelled)?;
                let notification = self.reporter.report_cancellation(label, &action.command_text);
                tracing::info!(%state, "pending action rejected");
                Ok(GateOutcome::Cancelled {
                    action,
                    state,
                    notification,
                })
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
