use serde::{Deserialize, Serialize};
use std::fmt;

// ---------------------------------------------------------------------------
// Priority
// ---------------------------------------------------------------------------

/// Overwrite-protection tag for a pending action. Ordered `Advisory < Critical`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Advisory,
    Critical,
}

impl Priority {
    pub fn as_str(self) -> &'static str {
        match self {
            Priority::Advisory => "advisory",
            Priority::Critical => "critical",
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Backend
// ---------------------------------------------------------------------------

/// Execution backend selected by the classifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Backend {
    NetworkFleet,
    LocalShell,
}

impl Backend {
    pub fn as_str(self) -> &'static str {
        match self {
            Backend::NetworkFleet => "network_fleet",
            Backend::LocalShell => "local_shell",
        }
    }

    /// Human-facing target label used on the approval prompt and in notifications.
    pub fn label(self) -> &'static str {
        match self {
            Backend::NetworkFleet => "Firewall fleet",
            Backend::LocalShell => "Local host",
        }
    }
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Severity
// ---------------------------------------------------------------------------

/// Notification tone derived from the occurrence count. Independent of [`Priority`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Low,
    High,
}

impl Severity {
    pub fn from_count(occurrences: u64, threshold: u64) -> Self {
        if occurrences > threshold {
            Severity::High
        } else {
            Severity::Low
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Severity::Low => "low",
            Severity::High => "high",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// SuccessPolicy
// ---------------------------------------------------------------------------

/// How per-device results fold into the fleet-wide success flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SuccessPolicy {
    /// At least one device applied the command.
    #[default]
    Any,
    /// Every device applied the command.
    All,
}

// ---------------------------------------------------------------------------
// HumanChoice
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HumanChoice {
    Approve,
    Reject,
}

impl HumanChoice {
    /// Only an explicit `y`/`yes` approves; anything else is a rejection.
    pub fn from_answer(answer: &str) -> Self {
        match answer.trim().to_ascii_lowercase().as_str() {
            "y" | "yes" => HumanChoice::Approve,
            _ => HumanChoice::Reject,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn priority_ordering() {
        assert!(Priority::Advisory < Priority::Critical);
        assert!(Priority::Critical >= Priority::Critical);
    }

    #[test]
    fn severity_threshold_is_exclusive() {
        assert_eq!(Severity::from_count(5, 5), Severity::Low);
        assert_eq!(Severity::from_count(6, 5), Severity::High);
        assert_eq!(Severity::from_count(0, 5), Severity::Low);
    }

    #[test]
    fn only_explicit_yes_approves() {
        assert_eq!(HumanChoice::from_answer("y"), HumanChoice::Approve);
        assert_eq!(HumanChoice::from_answer(" YES \n"), HumanChoice::Approve);
        for answer in ["", "n", "no", "yep", "maybe", "\n"] {
            assert_eq!(
                HumanChoice::from_answer(answer),
                HumanChoice::Reject,
                "expected reject for {answer:?}"
            );
        }
    }

    #[test]
    fn backend_serializes_snake_case() {
        let json = serde_json::to_string(&Backend::NetworkFleet).unwrap();
        assert_eq!(json, "\"network_fleet\"");
    }
}
