//! Command synthesis via the Gemini `generateContent` endpoint.

use crate::config::OracleConfig;
use crate::error::{Result, SoarError};
use crate::proposal::Oracle;
use crate::signal::DetectionSignal;
use regex::Regex;
use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;
use std::time::Duration;

pub const SAFETY_LOCK_COMMAND: &str =
    "echo \"Safety Lock: Internal IP detected. No block applied.\"";
pub const NO_ACTION_COMMAND: &str = "echo \"No action needed.\"";

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
struct GenerateRequest {
    contents: Vec<Content>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Content {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Part {
    #[serde(default)]
    text: String,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Content,
}

// ---------------------------------------------------------------------------
// GeminiOracle
// ---------------------------------------------------------------------------

pub struct GeminiOracle {
    client: Client,
    api_key: String,
    model: String,
    base_url: String,
}

impl GeminiOracle {
    pub fn new(config: &OracleConfig) -> Result<Self> {
        if config.api_key.trim().is_empty() {
            return Err(SoarError::Config("oracle.api_key is not set".into()));
        }
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()?;
        Ok(Self {
            client,
            api_key: config.api_key.clone(),
            model: config.model.clone(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }

    fn request(&self, prompt: String) -> Result<String> {
        let url = format!("{}/{}:generateContent", self.base_url, self.model);
        tracing::debug!(%url, model = %self.model, "requesting command synthesis");

        let body = GenerateRequest {
            contents: vec![Content {
                parts: vec![Part { text: prompt }],
            }],
        };
        let resp = self
            .client
            .post(&url)
            .query(&[("key", self.api_key.as_str())])
            .json(&body)
            .send()
            .map_err(|e| SoarError::Oracle(e.without_url().to_string()))?;

        let status = resp.status();
        let text = resp
            .text()
            .map_err(|e| SoarError::Oracle(e.without_url().to_string()))?;
        if !status.is_success() {
            let snippet: String = text.chars().take(200).collect();
            return Err(SoarError::Oracle(format!("HTTP {status}: {snippet}")));
        }

        let parsed: GenerateResponse = serde_json::from_str(&text)
            .map_err(|e| SoarError::Oracle(format!("malformed response: {e}")))?;
        let raw = parsed
            .candidates
            .into_iter()
            .next()
            .and_then(|c| c.content.parts.into_iter().next())
            .map(|p| p.text)
            .ok_or_else(|| SoarError::Oracle("no candidates in response".into()))?;

        clean_response(&raw).ok_or_else(|| SoarError::Oracle("empty command in response".into()))
    }
}

impl Oracle for GeminiOracle {
    fn propose(&self, signal: &DetectionSignal) -> Result<String> {
        let command = self.request(build_prompt(signal))?;
        tracing::info!(command = %command, "oracle proposed a command");
        Ok(command)
    }
}

/// Remove markdown fences the model adds despite being told not to.
pub fn clean_response(raw: &str) -> Option<String> {
    static FENCE: OnceLock<Regex> = OnceLock::new();
    let fence = FENCE.get_or_init(|| Regex::new(r"```[A-Za-z]*").expect("valid regex"));
    let cleaned = fence.replace_all(raw, "");
    let cleaned = cleaned.trim();
    if cleaned.is_empty() {
        None
    } else {
        Some(cleaned.to_string())
    }
}

pub fn build_prompt(signal: &DetectionSignal) -> String {
    format!(
        r#"You are a cyber security response engine.

[Situation]
- Detected log sample: "{sample}"
- Frequency: {count} times.

[Mission]
Analyze the log and produce the exact command that handles the situation.

[Decision rules]
1. Decide whether this is a brute force or login failure attack
   (keywords: Failed password, Invalid user, Login failed) and whether the frequency is high (>3).
2. Extract the source IP address and check whether it is private or internal
   (127.0.0.1, 10.x.x.x, 192.168.x.x, 172.16.x.x).
3. Choose one action:
   - Private IP: do not block. Output: {safety}
   - Public attacker IP: output a Cisco ASA block command. Template: shun IP_ADDRESS
   - System error or configuration issue: output an echo or sed command that fixes or logs it.
   - False alarm or low threat: output: {no_action}

[Output rules]
- Respond ONLY with the raw command string.
- No markdown formatting.
- No explanations."#,
        sample = signal.sample_text.replace('"', "'"),
        count = signal.occurrence_count,
        safety = SAFETY_LOCK_COMMAND,
        no_action = NO_ACTION_COMMAND,
    )
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
