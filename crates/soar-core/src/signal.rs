//! Detection signal: one sample record plus a count of authentication failures.

use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::io::BufRead;

/// Substrings that mark a record as an authentication failure.
pub const THREAT_MARKERS: &[&str] = &[
    "Failed password",
    "Invalid user",
    "Login failed",
    "LOGIN_FAILED",
];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DetectionSignal {
    pub sample_text: String,
    pub occurrence_count: u64,
}

impl DetectionSignal {
    pub fn new(sample_text: impl Into<String>, occurrence_count: u64) -> Self {
        Self {
            sample_text: sample_text.into(),
            occurrence_count,
        }
    }

    /// Fold raw event records into a signal. `None` when there are no records.
    ///
    /// The last threat record becomes the sample; before any threat is seen the
    /// latest plain record stands in.
    pub fn scan<I, S>(records: I) -> Option<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut sample: Option<String> = None;
        let mut count = 0u64;
        for record in records {
            let raw = record.as_ref().trim();
            if raw.is_empty() {
                continue;
            }
            if is_threat(raw) {
                count += 1;
                sample = Some(raw.to_string());
            } else if count == 0 {
                sample = Some(raw.to_string());
            }
        }
        sample.map(|sample_text| Self {
            sample_text,
            occurrence_count: count,
        })
    }

    /// Scan one record per line.
    pub fn scan_reader(reader: impl BufRead) -> Result<Option<Self>> {
        let lines = reader.lines().collect::<std::io::Result<Vec<_>>>()?;
        Ok(Self::scan(lines))
    }

    /// Sample truncated for display, on a char boundary.
    pub fn preview(&self, max_chars: usize) -> String {
        let mut out: String = self.sample_text.chars().take(max_chars).collect();
        if self.sample_text.chars().count() > max_chars {
            out.push_str("...");
        }
        out
    }
}

fn is_threat(raw: &str) -> bool {
    THREAT_MARKERS.iter().any(|m| raw.contains(m))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_records_no_signal() {
        assert_eq!(DetectionSignal::scan(Vec::<String>::new()), None);
        assert_eq!(DetectionSignal::scan(["", "   "]), None);
    }

    #[test]
    fn threat_records_are_counted_and_last_wins() {
        let records = [
            "sshd: session opened for user deploy",
            "sshd: Failed password for root from 203.0.113.5 port 22 ssh2",
            "cron: job finished",
            "sshd: Invalid user admin from 203.0.113.7",
        ];
        let signal = DetectionSignal::scan(records).unwrap();
        assert_eq!(signal.occurrence_count, 2);
        assert_eq!(signal.sample_text, "sshd: Invalid user admin from 203.0.113.7");
    }

    #[test]
    fn plain_records_only_keep_latest_sample() {
        let signal = DetectionSignal::scan(["disk 81% full", "disk 92% full"]).unwrap();
        assert_eq!(signal.occurrence_count, 0);
        assert_eq!(signal.sample_text, "disk 92% full");
    }

    #[test]
    fn plain_record_after_threat_does_not_replace_sample() {
        let signal =
            DetectionSignal::scan(["%ASA-6-113015: LOGIN_FAILED user x", "noise"]).unwrap();
        assert_eq!(signal.occurrence_count, 1);
        assert!(signal.sample_text.contains("LOGIN_FAILED"));
    }

    #[test]
    fn scan_reader_reads_lines() {
        let input = "Login failed for sa\nLogin failed for sa\n";
        let signal = DetectionSignal::scan_reader(input.as_bytes())
            .unwrap()
            .unwrap();
        assert_eq!(signal.occurrence_count, 2);
    }

    #[test]
    fn preview_truncates_on_chars() {
        let signal = DetectionSignal::new("é".repeat(70), 1);
        let preview = signal.preview(60);
        assert_eq!(preview.chars().count(), 63);
        assert!(preview.ends_with("..."));
        assert_eq!(DetectionSignal::new("short", 0).preview(60), "short");
    }
}
