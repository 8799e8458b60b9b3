//! Execution backends and the dispatcher that routes between them.

pub mod fleet;
pub mod local;
pub mod ssh;

use crate::classifier::classify;
use crate::config::{Config, DeviceConfig};
use crate::error::Result;
use crate::types::{Backend, SuccessPolicy};
use serde::{Deserialize, Serialize};

pub use fleet::{DeviceConnector, DeviceSession, FleetExecutor, SessionGuard};
pub use local::LocalExecutor;
pub use ssh::SshConnector;

// ---------------------------------------------------------------------------
// Results
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub target_id: String,
    pub succeeded: bool,
    pub message: String,
}

impl ExecutionResult {
    pub fn ok(target_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            target_id: target_id.into(),
            succeeded: true,
            message: message.into(),
        }
    }

    pub fn failed(target_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            target_id: target_id.into(),
            succeeded: false,
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FleetOutcome {
    /// One entry per configured device, in configured order.
    pub results: Vec<ExecutionResult>,
    pub overall_succeeded: bool,
}

impl FleetOutcome {
    pub fn from_results(results: Vec<ExecutionResult>, policy: SuccessPolicy) -> Self {
        let overall_succeeded = match policy {
            SuccessPolicy::Any => results.iter().any(|r| r.succeeded),
            SuccessPolicy::All => !results.is_empty() && results.iter().all(|r| r.succeeded),
        };
        Self {
            results,
            overall_succeeded,
        }
    }
}

/// What the dispatcher produced, tagged by backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "backend", rename_all = "snake_case")]
pub enum Execution {
    Local(ExecutionResult),
    Fleet(FleetOutcome),
}

impl Execution {
    pub fn succeeded(&self) -> bool {
        match self {
            Execution::Local(r) => r.succeeded,
            Execution::Fleet(f) => f.overall_succeeded,
        }
    }

    pub fn backend(&self) -> Backend {
        match self {
            Execution::Local(_) => Backend::LocalShell,
            Execution::Fleet(_) => Backend::NetworkFleet,
        }
    }
}

// ---------------------------------------------------------------------------
// Dispatch
// ---------------------------------------------------------------------------

/// Seam between the approval gate and the backends.
pub trait Dispatch {
    fn dispatch(&self, command: &str) -> Execution;
}

/// Routes a command to the backend picked by [`classify`].
pub struct Dispatcher<C: DeviceConnector> {
    local: LocalExecutor,
    fleet: FleetExecutor<C>,
    devices: Vec<DeviceConfig>,
}

impl<C: DeviceConnector> Dispatcher<C> {
    pub fn new(local: LocalExecutor, fleet: FleetExecutor<C>, devices: Vec<DeviceConfig>) -> Self {
        Self {
            local,
            fleet,
            devices,
        }
    }
}

impl Dispatcher<SshConnector> {
    /// Production wiring: `/bin/sh`-style local shell and SSH to every configured device.
    pub fn from_config(config: &Config) -> Result<Self> {
        let devices = config.fleet.resolved_devices()?;
        let fleet = FleetExecutor::new(SshConnector::new(&config.fleet), &config.fleet);
        Ok(Self::new(LocalExecutor::new(&config.local), fleet, devices))
    }
}

impl<C: DeviceConnector> Dispatch for Dispatcher<C> {
    fn dispatch(&self, command: &str) -> Execution {
        let backend = classify(command);
        tracing::info!(%backend, "dispatching approved command");
        match backend {
            Backend::LocalShell => Execution::Local(self.local.run(command)),
            Backend::NetworkFleet => Execution::Fleet(self.fleet.run(command, &self.devices)),
        }
    }
}
