//! Webhook delivery of notification events as Discord-style embeds.

use crate::config::NotifyConfig;
use crate::error::{Result, SoarError};
use crate::report::{NotificationEvent, Notify};
use crate::types::Severity;
use reqwest::blocking::Client;
use serde_json::{json, Value};
use std::time::Duration;

const COLOR_SUCCESS: u32 = 5_763_719;
const COLOR_FAILURE: u32 = 15_548_997;
const COLOR_CANCELLED: u32 = 9_807_270;
const COLOR_HIGH: u32 = 15_158_332;
const COLOR_LOW: u32 = 3_066_993;

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S UTC";

/// Discord rejects the whole message if any embed field value is longer.
const FIELD_VALUE_LIMIT: usize = 1024;
const ELLIPSIS: &str = "...";

// ---------------------------------------------------------------------------
// WebhookNotifier
// ---------------------------------------------------------------------------

pub struct WebhookNotifier {
    client: Client,
    url: String,
    username: String,
}

impl WebhookNotifier {
    pub fn new(url: impl Into<String>, config: &NotifyConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .user_agent(concat!("soar/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            client,
            url: url.into(),
            username: config.username.clone(),
        })
    }

    pub fn payload(&self, event: &NotificationEvent) -> Value {
        json!({
            "username": self.username,
            "embeds": [embed(event)],
        })
    }
}

impl Notify for WebhookNotifier {
    fn notify(&self, event: &NotificationEvent) -> Result<()> {
        let resp = self.client.post(&self.url).json(&self.payload(event)).send()?;
        let status = resp.status();
        if !status.is_success() {
            let body: String = resp.text().unwrap_or_default().chars().take(200).collect();
            return Err(SoarError::Notify(format!("webhook returned {status}: {body}")));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// LogNotifier
// ---------------------------------------------------------------------------

/// Used when no webhook is configured: events go to the log only.
#[derive(Debug, Default)]
pub struct LogNotifier;

impl Notify for LogNotifier {
    fn notify(&self, event: &NotificationEvent) -> Result<()> {
        tracing::info!(kind = event.kind(), event = ?event, "no webhook configured; event not delivered");
        Ok(())
    }
}

/// Webhook notifier when a URL is configured, log-only otherwise.
pub fn from_config(config: &NotifyConfig) -> Result<Box<dyn Notify>> {
    match config.webhook_url.as_deref().map(str::trim) {
        Some(url) if !url.is_empty() => Ok(Box::new(WebhookNotifier::new(url, config)?)),
        _ => Ok(Box::new(LogNotifier)),
    }
}

// ---------------------------------------------------------------------------
// Embed rendering
// ---------------------------------------------------------------------------

fn embed(event: &NotificationEvent) -> Value {
    match event {
        NotificationEvent::ActionProposed {
            command,
            severity,
            sample,
            occurrences,
            timestamp,
        } => {
            let (title, color, description) = match severity {
                Severity::High => (
                    "Attack suspected: block pending approval",
                    COLOR_HIGH,
                    format!("**{occurrences}** repeated failures detected. A blocking action has been proposed."),
                ),
                Severity::Low => (
                    "Remediation proposed",
                    COLOR_LOW,
                    "An event was analysed and a corrective command has been proposed.".to_string(),
                ),
            };
            json!({
                "title": title,
                "description": description,
                "color": color,
                "fields": [
                    field("Signal", format!("Sample: `{sample}`\nOccurrences: **{occurrences}**"), false),
                    field("Proposed command", wrapped("```bash\n", command, "\n```"), false),
                    field("Approve", "`soar approve`".to_string(), false),
                ],
                "timestamp": timestamp.to_rfc3339(),
            })
        }
        NotificationEvent::ExecutionResult {
            target,
            command,
            succeeded,
            detail,
            timestamp,
        } => {
            let (title, color) = if *succeeded {
                (format!("{target}: applied"), COLOR_SUCCESS)
            } else {
                (format!("{target}: failed"), COLOR_FAILURE)
            };
            json!({
                "title": title,
                "description": format!("An approved **{target}** command was executed."),
                "color": color,
                "fields": [
                    field("Command", wrapped("`", command, "`"), false),
                    field("Result", wrapped("```\n", &detail.join("\n"), "\n```"), false),
                    field("Executed at", timestamp.format(TIMESTAMP_FORMAT).to_string(), true),
                ],
            })
        }
        NotificationEvent::Cancellation {
            target,
            command,
            timestamp,
        } => json!({
            "title": format!("{target}: cancelled"),
            "description": "The operator rejected the pending command.",
            "color": COLOR_CANCELLED,
            "fields": [
                field("Discarded command", wrapped("`", command, "`"), false),
                field("Cancelled at", timestamp.format(TIMESTAMP_FORMAT).to_string(), true),
            ],
        }),
    }
}

fn field(name: &str, value: String, inline: bool) -> Value {
    json!({ "name": name, "value": clip(&value, FIELD_VALUE_LIMIT), "inline": inline })
}

/// Surround `body` with markup, clipping the body so the markup survives.
fn wrapped(open: &str, body: &str, close: &str) -> String {
    let room = FIELD_VALUE_LIMIT.saturating_sub(open.chars().count() + close.chars().count());
    format!("{open}{}{close}", clip(body, room))
}

fn clip(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        return s.to_string();
    }
    let mut out: String = s.chars().take(max_chars.saturating_sub(ELLIPSIS.len())).collect();
    out.push_str(ELLIPSIS);
    out
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
