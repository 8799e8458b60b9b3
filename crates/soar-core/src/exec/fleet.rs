//! Apply one command across every configured device, isolating failures.
//!
//! Each device gets its own privileged session: connect, authenticate,
//! elevate, send, release. A failure at any step produces a failed
//! [`ExecutionResult`] for that device and processing moves on.

use super::{ExecutionResult, FleetOutcome};
use crate::config::{DeviceConfig, FleetConfig};
use crate::error::Result;
use crate::types::SuccessPolicy;
use rayon::prelude::*;

pub const DEVICE_SUCCESS: &str = "Success";

// ---------------------------------------------------------------------------
// Session seams
// ---------------------------------------------------------------------------

/// An open, already-elevated management session on one device.
pub trait DeviceSession {
    fn send(&mut self, command: &str) -> Result<String>;
    fn close(&mut self) -> Result<()>;
}

/// Opens privileged sessions (connect + authenticate + elevate).
pub trait DeviceConnector: Send + Sync {
    type Session: DeviceSession;

    fn open(&self, device: &DeviceConfig) -> Result<Self::Session>;
}

/// Owns a session and closes it when dropped, on every exit path.
pub struct SessionGuard<S: DeviceSession> {
    device_id: String,
    session: S,
}

impl<S: DeviceSession> SessionGuard<S> {
    pub fn new(device_id: impl Into<String>, session: S) -> Self {
        Self {
            device_id: device_id.into(),
            session,
        }
    }

    pub fn send(&mut self, command: &str) -> Result<String> {
        self.session.send(command)
    }
}

impl<S: DeviceSession> Drop for SessionGuard<S> {
    fn drop(&mut self) {
        if let Err(e) = self.session.close() {
            tracing::warn!(device = %self.device_id, error = %e, "failed to close device session");
        }
    }
}

/// Run a setup `step` (e.g. elevation) on a freshly opened session. The
/// session is closed before the step's error is returned.
pub fn prepare_session<S, F>(device_id: &str, mut session: S, step: F) -> Result<S>
where
    S: DeviceSession,
    F: FnOnce(&mut S) -> Result<()>,
{
    if let Err(e) = step(&mut session) {
        if let Err(close_err) = session.close() {
            tracing::warn!(device = %device_id, error = %close_err, "failed to close device session");
        }
        return Err(e);
    }
    Ok(session)
}

// ---------------------------------------------------------------------------
// FleetExecutor
// ---------------------------------------------------------------------------

pub struct FleetExecutor<C: DeviceConnector> {
    connector: C,
    parallelism: usize,
    policy: SuccessPolicy,
}

impl<C: DeviceConnector> FleetExecutor<C> {
    pub fn new(connector: C, config: &FleetConfig) -> Self {
        Self {
            connector,
            parallelism: config.parallelism.max(1),
            policy: config.success_policy,
        }
    }

    /// Results come back in `devices` order regardless of completion order.
    pub fn run(&self, command: &str, devices: &[DeviceConfig]) -> FleetOutcome {
        tracing::info!(devices = devices.len(), parallelism = self.parallelism, "applying command to fleet");
        let results = if self.parallelism <= 1 || devices.len() <= 1 {
            devices.iter().map(|d| self.run_one(command, d)).collect()
        } else {
            self.run_parallel(command, devices)
        };
        let outcome = FleetOutcome::from_results(results, self.policy);
        let failed = outcome.results.iter().filter(|r| !r.succeeded).count();
        tracing::info!(
            failed,
            total = outcome.results.len(),
            overall = outcome.overall_succeeded,
            "fleet run complete"
        );
        outcome
    }

    fn run_parallel(&self, command: &str, devices: &[DeviceConfig]) -> Vec<ExecutionResult> {
        match rayon::ThreadPoolBuilder::new()
            .num_threads(self.parallelism)
            .thread_name(|i| format!("soar-fleet-{i}"))
            .build()
        {
            Ok(pool) => pool.install(|| {
                devices
                    .par_iter()
                    .map(|d| self.run_one(command, d))
                    .collect()
            }),
            Err(e) => {
                tracing::warn!(error = %e, "failed to build fleet thread pool; running sequentially");
                devices.iter().map(|d| self.run_one(command, d)).collect()
            }
        }
    }

    fn run_one(&self, command: &str, device: &DeviceConfig) -> ExecutionResult {
        tracing::info!(device = %device.id, "opening session");
        match self.apply(command, device) {
            Ok(response) => {
                tracing::debug!(device = %device.id, %response, "device response");
                tracing::info!(device = %device.id, "command applied");
                ExecutionResult::ok(&device.id, DEVICE_SUCCESS)
            }
            Err(e) => {
                tracing::warn!(device = %device.id, error = %e, "device failed");
                ExecutionResult::failed(&device.id, e.to_string())
            }
        }
    }

    fn apply(&self, command: &str, device: &DeviceConfig) -> Result<String> {
        let session = self.connector.open(device)?;
        let mut guard = SessionGuard::new(&device.id, session);
        guard.send(command)
    }
}

// ---------------------------------------------------------------------------
// Test doubles
// ---------------------------------------------------------------------------


// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
