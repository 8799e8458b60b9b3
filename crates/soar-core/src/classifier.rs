//! Pure routing and priority rules over command text.
//!
//! Routing and priority are deliberately separate rules: a command can be
//! `Critical` (it mentions `firewall`) while still running on the local host.

use crate::types::{Backend, Priority};

const FLEET_PREFIXES: &[&str] = &["shun", "no shun"];
const FLEET_MARKERS: &[&str] = &["access-list"];
const CRITICAL_MARKERS: &[&str] = &["shun", "firewall"];

/// Select the execution backend for a command.
pub fn classify(command: &str) -> Backend {
    let fleet = FLEET_PREFIXES.iter().any(|p| command.starts_with(p))
        || FLEET_MARKERS.iter().any(|m| command.contains(m));
    if fleet {
        Backend::NetworkFleet
    } else {
        Backend::LocalShell
    }
}

/// Overwrite-protection priority for a command.
pub fn priority_of(command: &str) -> Priority {
    if CRITICAL_MARKERS.iter().any(|m| command.contains(m)) {
        Priority::Critical
    } else {
        Priority::Advisory
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shun_routes_to_fleet() {
        assert_eq!(classify("shun 203.0.113.5"), Backend::NetworkFleet);
        assert_eq!(classify("no shun 203.0.113.5"), Backend::NetworkFleet);
    }

    #[test]
    fn access_list_anywhere_routes_to_fleet() {
        assert_eq!(
            classify("access-list OUTSIDE_IN deny ip host 198.51.100.9 any"),
            Backend::NetworkFleet
        );
        assert_eq!(
            classify("clear configure access-list OUTSIDE_IN"),
            Backend::NetworkFleet
        );
    }

    #[test]
    fn everything_else_is_local() {
        assert_eq!(classify("echo 'No action needed.'"), Backend::LocalShell);
        assert_eq!(classify(""), Backend::LocalShell);
        // prefix match only: a shun mentioned mid-command is not a device command
        assert_eq!(classify("echo shun 1.2.3.4"), Backend::LocalShell);
        assert_eq!(classify("firewall-cmd --reload"), Backend::LocalShell);
    }

    #[test]
    fn priority_is_content_based() {
        assert_eq!(priority_of("shun 198.51.100.9"), Priority::Critical);
        assert_eq!(priority_of("no shun 198.51.100.9"), Priority::Critical);
        assert_eq!(priority_of("firewall-cmd --reload"), Priority::Critical);
        assert_eq!(priority_of("echo 'No action needed.'"), Priority::Advisory);
        assert_eq!(
            priority_of("access-list OUTSIDE_IN deny ip any any"),
            Priority::Advisory
        );
    }

    #[test]
    fn routing_and_priority_are_independent() {
        let cmd = "firewall-cmd --add-rich-rule='rule family=ipv4 source address=203.0.113.5 reject'";
        assert_eq!(classify(cmd), Backend::LocalShell);
        assert_eq!(priority_of(cmd), Priority::Critical);
    }
}
