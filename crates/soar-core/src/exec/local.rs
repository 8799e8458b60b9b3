//! Single shell invocation on the local host.

use super::ExecutionResult;
use crate::config::LocalConfig;
use std::io::Read;
use std::process::{Command, Stdio};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

pub const LOCAL_TARGET: &str = "localhost";
pub const NO_OUTPUT: &str = "Success (no output)";

const POLL_INTERVAL: Duration = Duration::from_millis(20);

#[derive(Debug, Clone)]
pub struct LocalExecutor {
    shell: String,
    timeout: Option<Duration>,
}

impl LocalExecutor {
    pub fn new(config: &LocalConfig) -> Self {
        Self {
            shell: config.shell.clone(),
            timeout: config.timeout(),
        }
    }

    /// Run `command` once via `<shell> -c`. Every failure mode, including a
    /// spawn error or a timeout, comes back as `succeeded = false`.
    pub fn run(&self, command: &str) -> ExecutionResult {
        tracing::info!(shell = %self.shell, "running local command");
        let child = Command::new(&self.shell)
            .arg("-c")
            .arg(command)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn();
        let mut child = match child {
            Ok(c) => c,
            Err(e) => {
                tracing::warn!(error = %e, "failed to spawn local shell");
                return ExecutionResult::failed(
                    LOCAL_TARGET,
                    format!("failed to spawn '{}': {e}", self.shell),
                );
            }
        };

        // Drain both pipes concurrently so a chatty command cannot fill a pipe
        // and deadlock against the wait below.
        let stdout = drain(child.stdout.take());
        let stderr = drain(child.stderr.take());

        let started = Instant::now();
        let status = loop {
            match child.try_wait() {
                Ok(Some(status)) => break Ok(status),
                Ok(None) => {}
                Err(e) => break Err(e.to_string()),
            }
            if let Some(limit) = self.timeout {
                if started.elapsed() >= limit {
                    let _ = child.kill();
                    let _ = child.wait();
                    break Err(format!("timed out after {}s", limit.as_secs()));
                }
            }
            std::thread::sleep(POLL_INTERVAL);
        };

        let status = match status {
            Ok(status) => status,
            Err(reason) => {
                // Grandchildren may still hold the pipes open; leave the
                // drain threads detached rather than joining them.
                tracing::warn!(%reason, "local command did not complete");
                return ExecutionResult::failed(LOCAL_TARGET, reason);
            }
        };
        let stdout = collect(stdout);
        let stderr = collect(stderr);

        match status {
            status if status.success() => {
                let message = if stdout.trim().is_empty() {
                    NO_OUTPUT.to_string()
                } else {
                    stdout
                };
                ExecutionResult::ok(LOCAL_TARGET, message)
            }
            status => {
                let message = if stderr.trim().is_empty() {
                    match status.code() {
                        Some(code) => format!("command exited with status {code}"),
                        None => "command terminated by signal".to_string(),
                    }
                } else {
                    stderr
                };
                tracing::warn!(status = ?status.code(), "local command failed");
                ExecutionResult::failed(LOCAL_TARGET, message)
            }
        }
    }
}

fn drain<R: Read + Send + 'static>(pipe: Option<R>) -> Option<JoinHandle<String>> {
    pipe.map(|mut p| {
        std::thread::spawn(move || {
            let mut buf = Vec::new();
            let _ = p.read_to_end(&mut buf);
            String::from_utf8_lossy(&buf).into_owned()
        })
    })
}

fn collect(handle: Option<JoinHandle<String>>) -> String {
    handle.and_then(|h| h.join().ok()).unwrap_or_default()
}
