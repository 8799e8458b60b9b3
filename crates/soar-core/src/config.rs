use crate::error::{Result, SoarError};
use crate::paths;
use crate::types::SuccessPolicy;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

// ---------------------------------------------------------------------------
// ConfigWarning / WarnLevel
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigWarning {
    pub level: WarnLevel,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WarnLevel {
    Warning,
    Error,
}

/// Pipeline stage a configuration is validated for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    /// Detection → oracle → pending store. `manual` skips the oracle.
    Propose { manual: bool },
    /// Pending store → human decision → execution.
    Approve,
}

// ---------------------------------------------------------------------------
// NotifyConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotifyConfig {
    /// Absent ⇒ events are logged and not delivered.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub webhook_url: Option<String>,
    #[serde(default = "default_notify_username")]
    pub username: String,
    #[serde(default = "default_notify_timeout")]
    pub timeout_seconds: u64,
}

fn default_notify_username() -> String {
    "SOAR Guard".to_string()
}

fn default_notify_timeout() -> u64 {
    10
}

impl Default for NotifyConfig {
    fn default() -> Self {
        Self {
            webhook_url: None,
            username: default_notify_username(),
            timeout_seconds: default_notify_timeout(),
        }
    }
}

// ---------------------------------------------------------------------------
// OracleConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OracleConfig {
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_oracle_model")]
    pub model: String,
    #[serde(default = "default_oracle_base_url")]
    pub base_url: String,
    #[serde(default = "default_oracle_timeout")]
    pub timeout_seconds: u64,
}

fn default_oracle_model() -> String {
    "gemini-2.0-flash".to_string()
}

fn default_oracle_base_url() -> String {
    "https://generativelanguage.googleapis.com/v1beta/models".to_string()
}

fn default_oracle_timeout() -> u64 {
    30
}

impl Default for OracleConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            model: default_oracle_model(),
            base_url: default_oracle_base_url(),
            timeout_seconds: default_oracle_timeout(),
        }
    }
}

// ---------------------------------------------------------------------------
// DeviceEntry / FleetConfig
// ---------------------------------------------------------------------------

/// One configured device: either a bare host or a host with overrides.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DeviceEntry {
    Host(String),
    Detailed(DeviceOverrides),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceOverrides {
    pub host: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret: Option<String>,
}

/// Fully resolved connection descriptor for one device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceConfig {
    pub id: String,
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub secret: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FleetConfig {
    #[serde(default)]
    pub devices: Vec<DeviceEntry>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub secret: Option<String>,
    #[serde(default = "default_ssh_port")]
    pub port: u16,
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_seconds: u64,
    #[serde(default = "default_session_timeout")]
    pub session_timeout_seconds: u64,
    /// Devices processed concurrently. `1` is strictly sequential.
    #[serde(default = "default_parallelism")]
    pub parallelism: usize,
    #[serde(default)]
    pub success_policy: SuccessPolicy,
}

fn default_ssh_port() -> u16 {
    22
}

fn default_connect_timeout() -> u64 {
    10
}

fn default_session_timeout() -> u64 {
    30
}

fn default_parallelism() -> usize {
    1
}

impl Default for FleetConfig {
    fn default() -> Self {
        Self {
            devices: Vec::new(),
            username: None,
            password: None,
            secret: None,
            port: default_ssh_port(),
            connect_timeout_seconds: default_connect_timeout(),
            session_timeout_seconds: default_session_timeout(),
            parallelism: default_parallelism(),
            success_policy: SuccessPolicy::default(),
        }
    }
}

impl FleetConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_seconds)
    }

    pub fn session_timeout(&self) -> Duration {
        Duration::from_secs(self.session_timeout_seconds)
    }

    /// Resolve every entry against the shared credentials, in configured order.
    pub fn resolved_devices(&self) -> Result<Vec<DeviceConfig>> {
        self.devices
            .iter()
            .map(|entry| self.resolve(entry))
            .collect()
    }

    fn resolve(&self, entry: &DeviceEntry) -> Result<DeviceConfig> {
        let overrides = match entry {
            DeviceEntry::Host(host) => DeviceOverrides {
                host: host.clone(),
                name: None,
                port: None,
                username: None,
                password: None,
                secret: None,
            },
            DeviceEntry::Detailed(d) => d.clone(),
        };
        let host = overrides.host.trim().to_string();
        if host.is_empty() {
            return Err(SoarError::Config("fleet device with empty host".into()));
        }
        let pick = |own: Option<String>, shared: &Option<String>, field: &str| {
            own.or_else(|| shared.clone()).ok_or_else(|| {
                SoarError::Config(format!("device '{host}' has no {field} configured"))
            })
        };
        Ok(DeviceConfig {
            id: overrides.name.clone().unwrap_or_else(|| host.clone()),
            port: overrides.port.unwrap_or(self.port),
            username: pick(overrides.username, &self.username, "username")?,
            password: pick(overrides.password, &self.password, "password")?,
            secret: pick(overrides.secret, &self.secret, "secret")?,
            host,
        })
    }
}

// ---------------------------------------------------------------------------
// LocalConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocalConfig {
    #[serde(default = "default_shell")]
    pub shell: String,
    /// `0` disables the timeout.
    #[serde(default = "default_local_timeout")]
    pub timeout_seconds: u64,
}

fn default_shell() -> String {
    "/bin/sh".to_string()
}

fn default_local_timeout() -> u64 {
    300
}

impl Default for LocalConfig {
    fn default() -> Self {
        Self {
            shell: default_shell(),
            timeout_seconds: default_local_timeout(),
        }
    }
}

impl LocalConfig {
    pub fn timeout(&self) -> Option<Duration> {
        (self.timeout_seconds > 0).then(|| Duration::from_secs(self.timeout_seconds))
    }
}

// ---------------------------------------------------------------------------
// Config (top-level)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_pending_file")]
    pub pending_file: PathBuf,
    #[serde(default = "default_severity_threshold")]
    pub severity_threshold: u64,
    #[serde(default)]
    pub notify: NotifyConfig,
    #[serde(default)]
    pub oracle: OracleConfig,
    #[serde(default)]
    pub fleet: FleetConfig,
    #[serde(default)]
    pub local: LocalConfig,
}

fn default_pending_file() -> PathBuf {
    PathBuf::from(paths::DEFAULT_PENDING_FILE)
}

fn default_severity_threshold() -> u64 {
    5
}

impl Default for Config {
    fn default() -> Self {
        Self {
            pending_file: default_pending_file(),
            severity_threshold: default_severity_threshold(),
            notify: NotifyConfig::default(),
            oracle: OracleConfig::default(),
            fleet: FleetConfig::default(),
            local: LocalConfig::default(),
        }
    }
}

impl Config {
    /// Load from YAML. A JSON document is accepted as well.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(SoarError::ConfigNotFound(path.display().to_string()));
        }
        let data = std::fs::read_to_string(path)?;
        Self::from_yaml(&data)
    }

    pub fn from_yaml(data: &str) -> Result<Self> {
        let cfg: Config = serde_yaml::from_str(data)?;
        Ok(cfg)
    }

    // -----------------------------------------------------------------------
    // Validation
    // -----------------------------------------------------------------------

    pub fn validate(&self, stage: Stage) -> Vec<ConfigWarning> {
        let mut warnings = Vec::new();
        let mut error = |message: String| {
            warnings.push(ConfigWarning {
                level: WarnLevel::Error,
                message,
            })
        };

        if self.pending_file.as_os_str().is_empty() {
            error("pending_file is empty".to_string());
        }

        match stage {
            Stage::Propose { manual } => {
                if !manual && self.oracle.api_key.trim().is_empty() {
                    error("oracle.api_key is required to propose actions".to_string());
                }
            }
            Stage::Approve => {
                if self.fleet.devices.is_empty() {
                    error("fleet.devices is empty".to_string());
                }
                if let Err(e) = self.fleet.resolved_devices() {
                    error(e.to_string());
                }
                if self.fleet.parallelism == 0 {
                    error("fleet.parallelism must be at least 1".to_string());
                }
                // a zero SSH timeout means "wait forever" to libssh2
                if self.fleet.connect_timeout_seconds == 0 {
                    error("fleet.connect_timeout_seconds must be at least 1".to_string());
                }
                if self.fleet.session_timeout_seconds == 0 {
                    error("fleet.session_timeout_seconds must be at least 1".to_string());
                }
            }
        }

        let mut warn = |message: String| {
            warnings.push(ConfigWarning {
                level: WarnLevel::Warning,
                message,
            })
        };

        if self.notify.webhook_url.is_none() {
            warn("notify.webhook_url is not set; notifications will only be logged".to_string());
        }
        if stage == Stage::Approve {
            if which::which(&self.local.shell).is_err() {
                warn(format!("local.shell '{}' was not found", self.local.shell));
            }
            if self.fleet.success_policy == SuccessPolicy::Any && self.fleet.devices.len() > 1 {
                warn(
                    "fleet.success_policy is 'any': a block applied to only some devices is reported as success"
                        .to_string(),
                );
            }
        }

        warnings
    }

    /// Fail on any error-level finding. Warnings are logged.
    pub fn ensure_valid(&self, stage: Stage) -> Result<()> {
        let findings = self.validate(stage);
        let errors: Vec<&str> = findings
            .iter()
            .filter(|w| w.level == WarnLevel::Error)
            .map(|w| w.message.as_str())
            .collect();
        for w in findings.iter().filter(|w| w.level == WarnLevel::Warning) {
            tracing::warn!("{}", w.message);
        }
        if errors.is_empty() {
            Ok(())
        } else {
            Err(SoarError::Config(errors.join("; ")))
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
