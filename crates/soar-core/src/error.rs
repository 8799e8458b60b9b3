use thiserror::Error;

#[derive(Debug, Error)]
pub enum SoarError {
    #[error("config file not found: {0}")]
    ConfigNotFound(String),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("pending store is locked: {0}")]
    StoreLocked(String),

    #[error("invalid proposal: {0}")]
    InvalidProposal(String),

    #[error("invalid transition from {from} to {to}")]
    InvalidTransition { from: String, to: String },

    #[error("oracle error: {0}")]
    Oracle(String),

    #[error("notification failed: {0}")]
    Notify(String),

    #[error("device {host}: {reason}")]
    Device { host: String, reason: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Http(#[from] reqwest::Error),

    #[error(transparent)]
    Ssh(#[from] ssh2::Error),
}

impl SoarError {
    pub fn device(host: impl Into<String>, reason: impl std::fmt::Display) -> Self {
        SoarError::Device {
            host: host.into(),
            reason: reason.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, SoarError>;
