//! Proposal intake: signal → oracle → pending store → notification.
//!
//! The intake always ends up with *some* command to hold for review: an
//! oracle failure is replaced by a labeled, harmless `echo` fallback, which is
//! `Advisory` and so can never displace a pending `Critical` action.

use crate::classifier::{classify, priority_of};
use crate::error::Result;
use crate::pending::{PendingStore, WriteOutcome};
use crate::report::{NotificationEvent, Notify, OutcomeReporter};
use crate::signal::DetectionSignal;
use crate::types::{Backend, Priority, Severity};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandProposal {
    pub command_text: String,
    pub derived_severity: Severity,
}

impl CommandProposal {
    pub fn new(command_text: impl Into<String>, signal: &DetectionSignal, threshold: u64) -> Self {
        Self {
            command_text: command_text.into().trim().to_string(),
            derived_severity: Severity::from_count(signal.occurrence_count, threshold),
        }
    }

    pub fn priority(&self) -> Priority {
        priority_of(&self.command_text)
    }
}

/// Synthesizes a corrective command from a detection.
pub trait Oracle {
    fn propose(&self, signal: &DetectionSignal) -> Result<String>;
}

const REDACTED_REASON: &str = "oracle request failed (see logs)";

/// Safe replacement for a failed synthesis. Single quotes are stripped from
/// the reason so the result stays one well-formed `echo`.
///
/// The result must route locally and rank `Advisory`. A reason that would
/// change either (e.g. an HTTP body mentioning `firewall`) is replaced by a
/// fixed label and only logged.
pub fn fallback_command(reason: &str) -> String {
    let cleaned: String = reason
        .chars()
        .filter(|c| *c != '\'' && !c.is_control())
        .collect();
    let command = format!("echo 'AI Error: {cleaned}'");
    if classify(&command) == Backend::LocalShell && priority_of(&command) == Priority::Advisory {
        return command;
    }
    tracing::warn!(reason = %cleaned, "oracle error text redacted from fallback command");
    format!("echo 'AI Error: {REDACTED_REASON}'")
}

// ---------------------------------------------------------------------------
// ProposalIntake
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
pub struct IntakeOutcome {
    pub proposal: CommandProposal,
    pub write: WriteOutcome,
    /// True when the oracle failed and the fallback was stored instead.
    pub fallback: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notification: Option<NotificationEvent>,
}

pub struct ProposalIntake<'a, N: Notify> {
    store: &'a PendingStore,
    reporter: OutcomeReporter<N>,
    severity_threshold: u64,
}

impl<'a, N: Notify> ProposalIntake<'a, N> {
    pub fn new(store: &'a PendingStore, reporter: OutcomeReporter<N>, severity_threshold: u64) -> Self {
        Self {
            store,
            reporter,
            severity_threshold,
        }
    }

    /// Ask the oracle, substituting the fallback on failure, then submit.
    pub fn propose(&self, oracle: &dyn Oracle, signal: &DetectionSignal) -> Result<IntakeOutcome> {
        let (command, fallback) = match oracle.propose(signal) {
            Ok(cmd) if !cmd.trim().is_empty() => (cmd, false),
            Ok(_) => {
                tracing::warn!("oracle returned an empty command; using fallback");
                (fallback_command("empty response"), true)
            }
            Err(e) => {
                tracing::warn!(error = %e, "oracle failed; using fallback");
                (fallback_command(&e.to_string()), true)
            }
        };
        let proposal = CommandProposal::new(command, signal, self.severity_threshold);
        let mut outcome = self.submit(proposal, signal)?;
        outcome.fallback = fallback;
        Ok(outcome)
    }

    /// Hand a proposal to the store; announce it only if it was written.
    pub fn submit(&self, proposal: CommandProposal, signal: &DetectionSignal) -> Result<IntakeOutcome> {
        tracing::info!(
            priority = %proposal.priority(),
            severity = %proposal.derived_severity,
            "proposal received"
        );
        let write = self.store.try_write(&proposal)?;
        let notification = match write {
            WriteOutcome::Written => self.reporter.report_proposal(&proposal, signal),
            WriteOutcome::Skipped => None,
        };
        Ok(IntakeOutcome {
            proposal,
            write,
            fallback: false,
            notification,
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SoarError;
    use crate::report::testing::RecordingNotifier;
    use tempfile::TempDir;

    struct FixedOracle(std::result::Result<&'static str, &'static str>);

    impl Oracle for FixedOracle {
        fn propose(&self, _signal: &DetectionSignal) -> Result<String> {
            self.0
                .map(str::to_string)
                .map_err(|e| SoarError::Oracle(e.to_string()))
        }
    }

    fn attack() -> DetectionSignal {
        DetectionSignal::new("Failed password for root from 198.51.100.9 port 22 ssh2", 10)
    }

    #[test]
    fn fallback_is_a_single_quoted_echo() {
        let cmd = fallback_command("quota 'exceeded'\n");
        assert_eq!(cmd, "echo 'AI Error: quota exceeded'");
        assert_eq!(priority_of(&cmd), Priority::Advisory);
    }

    #[test]
    fn fallback_reason_cannot_raise_priority_or_reroute() {
        let cmd = fallback_command("HTTP 403 Forbidden: request blocked by corporate firewall");
        assert_eq!(priority_of(&cmd), Priority::Advisory);
        assert_eq!(classify(&cmd), Backend::LocalShell);
        assert!(!cmd.contains("firewall"));

        let cmd = fallback_command("upstream rejected access-list lookup");
        assert_eq!(classify(&cmd), Backend::LocalShell);
        assert!(cmd.starts_with("echo 'AI Error:"));
    }

    #[test]
    fn firewall_error_keeps_pending_shun() {
        let dir = TempDir::new().unwrap();
        let store = PendingStore::new(dir.path().join("pending_fix.sh"));
        let sink = RecordingNotifier::default();
        let intake = ProposalIntake::new(&store, OutcomeReporter::new(&sink), 5);

        intake
            .propose(&FixedOracle(Ok("shun 198.51.100.9")), &attack())
            .unwrap();
        let out = intake
            .propose(
                &FixedOracle(Err("HTTP 403 Forbidden: request blocked by corporate firewall")),
                &attack(),
            )
            .unwrap();
        assert!(out.fallback);
        assert_eq!(out.proposal.priority(), Priority::Advisory);
        assert_eq!(out.write, WriteOutcome::Skipped);
        assert_eq!(store.read().unwrap().unwrap().command_text, "shun 198.51.100.9");
    }

    #[test]
    fn severity_follows_threshold() {
        let p = CommandProposal::new("shun 198.51.100.9", &attack(), 5);
        assert_eq!(p.derived_severity, Severity::High);
        let p = CommandProposal::new("shun 198.51.100.9", &DetectionSignal::new("x", 5), 5);
        assert_eq!(p.derived_severity, Severity::Low);
    }

    #[test]
    fn oracle_command_is_written_and_announced() {
        let dir = TempDir::new().unwrap();
        let store = PendingStore::new(dir.path().join("pending_fix.sh"));
        let sink = RecordingNotifier::default();
        let intake = ProposalIntake::new(&store, OutcomeReporter::new(&sink), 5);

        let out = intake
            .propose(&FixedOracle(Ok("shun 198.51.100.9\n")), &attack())
            .unwrap();
        assert_eq!(out.write, WriteOutcome::Written);
        assert!(!out.fallback);
        assert_eq!(out.proposal.command_text, "shun 198.51.100.9");
        assert_eq!(sink.events().len(), 1);
        assert_eq!(store.read().unwrap().unwrap().command_text, "shun 198.51.100.9");
    }

    #[test]
    fn oracle_failure_stores_fallback() {
        let dir = TempDir::new().unwrap();
        let store = PendingStore::new(dir.path().join("pending_fix.sh"));
        let sink = RecordingNotifier::default();
        let intake = ProposalIntake::new(&store, OutcomeReporter::new(&sink), 5);

        let out = intake
            .propose(&FixedOracle(Err("quota exhausted")), &attack())
            .unwrap();
        assert!(out.fallback);
        assert_eq!(out.write, WriteOutcome::Written);
        let stored = store.read().unwrap().unwrap();
        assert!(stored.command_text.starts_with("echo 'AI Error:"));
    }

    #[test]
    fn fallback_never_displaces_critical() {
        let dir = TempDir::new().unwrap();
        let store = PendingStore::new(dir.path().join("pending_fix.sh"));
        let sink = RecordingNotifier::default();
        let intake = ProposalIntake::new(&store, OutcomeReporter::new(&sink), 5);

        intake
            .propose(&FixedOracle(Ok("shun 198.51.100.9")), &attack())
            .unwrap();
        let out = intake
            .propose(&FixedOracle(Err("timeout")), &attack())
            .unwrap();
        assert_eq!(out.write, WriteOutcome::Skipped);
        assert!(out.notification.is_none());
        assert_eq!(store.read().unwrap().unwrap().command_text, "shun 198.51.100.9");
        assert_eq!(sink.events().len(), 1, "skipped proposals are not announced");
    }

    #[test]
    fn empty_oracle_output_uses_fallback() {
        let dir = TempDir::new().unwrap();
        let store = PendingStore::new(dir.path().join("pending_fix.sh"));
        let sink = RecordingNotifier::default();
        let intake = ProposalIntake::new(&store, OutcomeReporter::new(&sink), 5);
        let out = intake.propose(&FixedOracle(Ok("  ")), &attack()).unwrap();
        assert!(out.fallback);
        assert!(out.proposal.command_text.contains("empty response"));
    }
}
