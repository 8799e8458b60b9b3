//! Interactive SSH sessions against firewall appliances.
//!
//! The appliance CLI is prompt-driven: we request a PTY shell, elevate with
//! `enable` + secret, turn paging off, then send the command and read until
//! the privileged prompt (`...# `) comes back. Every blocking read or write is
//! bounded by the session timeout.

use super::fleet::{prepare_session, DeviceConnector, DeviceSession};
use crate::config::{DeviceConfig, FleetConfig};
use crate::error::{Result, SoarError};
use ssh2::{Channel, Session};
use std::io::{Read, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::time::{Duration, Instant};

const PRIVILEGED_PROMPT: &str = "#";
const PASSWORD_PROMPT: &str = "assword:";
const ELEVATION_FAILURES: &[&str] = &["Invalid password", "Access denied", "% Bad secrets"];
const READ_CHUNK: usize = 4096;

// ---------------------------------------------------------------------------
// SshConnector
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct SshConnector {
    connect_timeout: Duration,
    session_timeout: Duration,
}

impl SshConnector {
    pub fn new(config: &FleetConfig) -> Self {
        Self {
            connect_timeout: config.connect_timeout(),
            session_timeout: config.session_timeout(),
        }
    }
}

impl DeviceConnector for SshConnector {
    type Session = SshSession;

    fn open(&self, device: &DeviceConfig) -> Result<SshSession> {
        let addr = (device.host.as_str(), device.port)
            .to_socket_addrs()
            .map_err(|e| SoarError::device(&device.id, format!("cannot resolve host: {e}")))?
            .next()
            .ok_or_else(|| SoarError::device(&device.id, "host resolved to no address"))?;
        let tcp = TcpStream::connect_timeout(&addr, self.connect_timeout)
            .map_err(|e| SoarError::device(&device.id, format!("connect failed: {e}")))?;

        let mut session = Session::new()?;
        session.set_tcp_stream(tcp);
        // libssh2 treats 0 as "no timeout"; config validation rejects it
        session.set_timeout(u32::try_from(self.session_timeout.as_millis()).unwrap_or(u32::MAX));
        session
            .handshake()
            .map_err(|e| SoarError::device(&device.id, format!("handshake failed: {e}")))?;
        session
            .userauth_password(&device.username, &device.password)
            .map_err(|e| SoarError::device(&device.id, format!("authentication failed: {e}")))?;
        if !session.authenticated() {
            return Err(SoarError::device(&device.id, "authentication failed"));
        }

        let mut channel = session.channel_session()?;
        channel.request_pty("vt100", None, None)?;
        channel.shell()?;

        let ssh = SshSession {
            device_id: device.id.clone(),
            session,
            channel,
            timeout: self.session_timeout,
            closed: false,
        };
        prepare_session(&device.id, ssh, |s| s.elevate(&device.secret))
    }
}

// ---------------------------------------------------------------------------
// SshSession
// ---------------------------------------------------------------------------

pub struct SshSession {
    device_id: String,
    session: Session,
    channel: Channel,
    timeout: Duration,
    closed: bool,
}

impl SshSession {
    fn elevate(&mut self, secret: &str) -> Result<()> {
        self.read_until(&[">", PRIVILEGED_PROMPT], &[])?;
        self.write_line("enable")?;
        let reply = self.read_until(&[PASSWORD_PROMPT, PRIVILEGED_PROMPT], ELEVATION_FAILURES)?;
        if reply.contains(PASSWORD_PROMPT) {
            self.write_line(secret)?;
            self.read_until(&[PRIVILEGED_PROMPT], ELEVATION_FAILURES)
                .map_err(|e| step_failed(e, "enable"))?;
        }
        self.write_line("terminal pager 0")?;
        self.read_until(&[PRIVILEGED_PROMPT], &[])?;
        tracing::debug!(device = %self.device_id, "privileged mode");
        Ok(())
    }

    fn write_line(&mut self, line: &str) -> Result<()> {
        self.channel.write_all(line.as_bytes())?;
        self.channel.write_all(b"\n")?;
        self.channel.flush()?;
        Ok(())
    }

    /// Read until the buffer ends with one of `done` (ignoring trailing
    /// whitespace) or contains one of `fail`.
    fn read_until(&mut self, done: &[&str], fail: &[&str]) -> Result<String> {
        let deadline = Instant::now() + self.timeout;
        let mut buf = String::new();
        let mut chunk = [0u8; READ_CHUNK];
        loop {
            if let Some(marker) = fail.iter().find(|m| buf.contains(*m)) {
                return Err(SoarError::device(&self.device_id, format!("device reported '{marker}'")));
            }
            let tail = buf.trim_end();
            if done.iter().any(|m| tail.ends_with(m)) {
                return Ok(buf);
            }
            if Instant::now() >= deadline || self.channel.eof() {
                return Err(SoarError::device(
                    &self.device_id,
                    format!("timed out waiting for prompt; last output: {}", last_line(&buf)),
                ));
            }
            let n = self.channel.read(&mut chunk)?;
            buf.push_str(&String::from_utf8_lossy(&chunk[..n]));
        }
    }
}

impl DeviceSession for SshSession {
    fn send(&mut self, command: &str) -> Result<String> {
        self.write_line(command)?;
        let output = self.read_until(&[PRIVILEGED_PROMPT], &[])?;
        let trimmed = output
            .lines()
            .skip_while(|l| l.trim() == command.trim())
            .collect::<Vec<_>>()
            .join("\n");
        if let Some(err) = trimmed.lines().find(|l| l.trim_start().starts_with("ERROR:")) {
            return Err(SoarError::device(&self.device_id, err.trim()));
        }
        Ok(trimmed)
    }

    fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        let _ = self.write_line("exit");
        self.channel.send_eof()?;
        self.channel.close()?;
        self.channel.wait_close()?;
        self.session.disconnect(None, "session complete", None)?;
        tracing::debug!(device = %self.device_id, "session closed");
        Ok(())
    }
}

impl Drop for SshSession {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            tracing::warn!(device = %self.device_id, error = %e, "failed to close device session");
        }
    }
}

/// Prefix a device error's reason with the step that failed, keeping the
/// single `device <id>:` label.
fn step_failed(err: SoarError, step: &str) -> SoarError {
    match err {
        SoarError::Device { host, reason } => SoarError::Device {
            host,
            reason: format!("{step} failed: {reason}"),
        },
        other => other,
    }
}

fn last_line(buf: &str) -> &str {
    buf.trim_end().lines().last().unwrap_or("")
}
