//! Durable alert log
//!
//! Alerts are held in memory for the life of the process and persisted to one
//! JSON file per local calendar day (`alerts_YYYYMMDD.json`). Each append
//! loads the day's partition, appends and rewrites the whole file through a
//! temp file + rename. The store is the only writer of its directory.
//!
//! Disk failures never lose the in-memory alert: `append` records it first
//! and then reports the persistence error to the caller.
//!
//! Prior-day partitions are never modified or pruned.

use crate::analysis::{Sentiment, SentimentResult};
use crate::error::PersistenceError;
use crate::window::WindowRange;
use chatguard_common::time::{export_stamp, format_timestamp, partition_key, Clock};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

const REPORT_TITLE: &str = "Chat Monitoring Logs";

fn header_rule() -> String {
    "=".repeat(50)
}

fn record_rule() -> String {
    "-".repeat(50)
}

fn yes_no(flag: bool) -> &'static str {
    if flag {
        "Yes"
    } else {
        "No"
    }
}

/// A persisted analysis outcome
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonitoringAlert {
    /// Capture time, local, second precision
    pub timestamp: String,
    /// Participant whose message triggered the analysis
    #[serde(rename = "child_name")]
    pub party: String,
    pub sentiment: Sentiment,
    pub explanation: String,
    pub alert_needed: bool,
    /// Analyzed window, e.g. `messages 4-6`
    #[serde(default)]
    pub message_range: String,
}

impl MonitoringAlert {
    pub fn from_result(
        timestamp: String,
        party: &str,
        range: WindowRange,
        result: &SentimentResult,
    ) -> Self {
        Self {
            timestamp,
            party: party.to_string(),
            sentiment: result.sentiment,
            explanation: result.explanation.clone(),
            alert_needed: result.alert_needed,
            message_range: range.describe(),
        }
    }

    /// Text block shown in the viewer's alert feed
    pub fn render(&self) -> String {
        format!(
            "[{}] {}\nAnalysis Range: {}\nSentiment: {}\nAlert Needed: {}\nAnalysis: {}\n{}\n",
            self.timestamp,
            self.party,
            self.message_range,
            self.sentiment,
            yes_no(self.alert_needed),
            self.explanation,
            record_rule(),
        )
    }
}

/// Render alerts as the plain-text export report
pub fn render_report(alerts: &[MonitoringAlert]) -> String {
    let mut out = String::new();
    out.push_str(REPORT_TITLE);
    out.push('\n');
    out.push_str(&header_rule());
    out.push_str("\n\n");

    for alert in alerts {
        out.push_str(&format!("Time: {}\n", alert.timestamp));
        out.push_str(&format!("Child: {}\n", alert.party));
        out.push_str(&format!("Message Range: {}\n", alert.message_range));
        out.push_str(&format!("Sentiment: {}\n", alert.sentiment));
        out.push_str(&format!("Alert Needed: {}\n", yes_no(alert.alert_needed)));
        out.push_str(&format!("Analysis: {}\n", alert.explanation));
        out.push_str(&record_rule());
        out.push_str("\n\n");
    }
    out
}

/// One record recovered from an export report
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportRecord {
    pub timestamp: String,
    pub party: String,
    pub message_range: String,
    pub sentiment: Sentiment,
    pub alert_needed: bool,
    pub explanation: String,
}

#[derive(Default)]
struct PartialRecord {
    timestamp: Option<String>,
    party: Option<String>,
    message_range: Option<String>,
    sentiment: Option<Sentiment>,
    alert_needed: Option<bool>,
    explanation: Option<String>,
}

impl PartialRecord {
    fn finish(self) -> Option<ReportRecord> {
        Some(ReportRecord {
            timestamp: self.timestamp?,
            party: self.party?,
            message_range: self.message_range.unwrap_or_default(),
            sentiment: self.sentiment?,
            alert_needed: self.alert_needed?,
            explanation: self.explanation.unwrap_or_default(),
        })
    }
}

/// Parse an export report back into records
///
/// Structured fields round-trip exactly. Multi-line explanations are
/// rejoined with `\n`; a record missing a structured field is skipped.
///
/// A `Time: ` line opens a record only between records. Inside an
/// explanation, a rule line closes the record only when a blank line or the
/// end of the report follows it, so free text that looks like report markup
/// stays in the explanation.
pub fn parse_report(text: &str) -> Vec<ReportRecord> {
    let rule = record_rule();
    let lines: Vec<&str> = text.lines().collect();
    let mut records = Vec::new();
    let mut current: Option<PartialRecord> = None;
    let mut in_analysis = false;

    for (i, line) in lines.iter().enumerate() {
        if current.is_none() {
            if let Some(value) = line.strip_prefix("Time: ") {
                current = Some(PartialRecord {
                    timestamp: Some(value.to_string()),
                    ..Default::default()
                });
                in_analysis = false;
            }
            continue;
        }

        let closes_record = *line == rule
            && (!in_analysis || lines.get(i + 1).map_or(true, |next| next.is_empty()));
        if closes_record {
            if let Some(record) = current.take().and_then(PartialRecord::finish) {
                records.push(record);
            }
            in_analysis = false;
            continue;
        }

        let Some(record) = current.as_mut() else {
            continue;
        };

        if in_analysis {
            if let Some(explanation) = record.explanation.as_mut() {
                explanation.push('\n');
                explanation.push_str(line);
            }
        } else if let Some(value) = line.strip_prefix("Child: ") {
            record.party = Some(value.to_string());
        } else if let Some(value) = line.strip_prefix("Message Range: ") {
            record.message_range = Some(value.to_string());
        } else if let Some(value) = line.strip_prefix("Sentiment: ") {
            record.sentiment = value.parse().ok();
        } else if let Some(value) = line.strip_prefix("Alert Needed: ") {
            record.alert_needed = match value {
                "Yes" => Some(true),
                "No" => Some(false),
                _ => None,
            };
        } else if let Some(value) = line.strip_prefix("Analysis: ") {
            record.explanation = Some(value.to_string());
            in_analysis = true;
        }
    }

    records
}

/// Alert log with per-day JSON partitions
pub struct AlertStore {
    logs_dir: PathBuf,
    clock: Arc<dyn Clock>,
    alerts: Vec<MonitoringAlert>,
}

impl AlertStore {
    pub fn new(logs_dir: impl Into<PathBuf>, clock: Arc<dyn Clock>) -> Self {
        Self {
            logs_dir: logs_dir.into(),
            clock,
            alerts: Vec::new(),
        }
    }

    pub fn logs_dir(&self) -> &Path {
        &self.logs_dir
    }

    /// Current wall-clock time formatted for an alert
    pub fn timestamp_now(&self) -> String {
        format_timestamp(&self.clock.now())
    }

    pub fn partition_path(&self, date: NaiveDate) -> PathBuf {
        self.logs_dir
            .join(format!("alerts_{}.json", partition_key(date)))
    }

    pub fn today_path(&self) -> PathBuf {
        self.partition_path(self.clock.today())
    }

    /// Every alert held in memory, oldest first
    pub fn alerts(&self) -> &[MonitoringAlert] {
        &self.alerts
    }

    /// Record an alert and persist it to today's partition
    ///
    /// The in-memory list receives the alert even when persistence fails.
    pub fn append(&mut self, alert: MonitoringAlert) -> Result<(), PersistenceError> {
        self.alerts.push(alert.clone());

        let path = self.today_path();
        let result = read_partition(&path).and_then(|mut existing| {
            existing.push(alert);
            write_partition(&path, &existing)
        });

        match &result {
            Ok(()) => debug!(path = %path.display(), "Alert persisted"),
            Err(e) => warn!("Alert kept in memory but not persisted: {}", e),
        }
        result
    }

    /// Read today's partition; empty when the file does not exist
    pub fn load_today(&self) -> Result<Vec<MonitoringAlert>, PersistenceError> {
        let path = self.today_path();
        let alerts = read_partition(&path)?;
        info!(
            path = %path.display(),
            count = alerts.len(),
            "Loaded today's alert partition"
        );
        Ok(alerts)
    }

    /// Put previously persisted alerts back into memory without rewriting them
    pub fn restore(&mut self, alerts: Vec<MonitoringAlert>) {
        self.alerts.extend(alerts);
    }

    /// Overwrite today's partition with an empty array
    pub fn clear_today(&self) -> Result<(), PersistenceError> {
        let path = self.today_path();
        write_partition(&path, &[])?;
        info!(path = %path.display(), "Cleared today's alert partition");
        Ok(())
    }

    /// Forget in-memory alerts; partitions are untouched
    pub fn clear_memory(&mut self) {
        self.alerts.clear();
    }

    /// Write every in-memory alert to a plain-text report
    ///
    /// Returns the number of bytes written.
    pub fn export(&self, destination: &Path) -> Result<usize, PersistenceError> {
        let report = render_report(&self.alerts);
        if let Some(parent) = destination.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| PersistenceError::io(parent, e))?;
        }
        std::fs::write(destination, report.as_bytes())
            .map_err(|e| PersistenceError::io(destination, e))?;
        info!(
            path = %destination.display(),
            alerts = self.alerts.len(),
            "Exported monitoring report"
        );
        Ok(report.len())
    }

    /// Export to `monitoring_export_YYYYMMDD_HHMMSS.txt` inside `dir`
    pub fn export_to_dir(&self, dir: &Path) -> Result<(PathBuf, usize), PersistenceError> {
        let path = dir.join(format!(
            "monitoring_export_{}.txt",
            export_stamp(&self.clock.now())
        ));
        let written = self.export(&path)?;
        Ok((path, written))
    }
}

fn read_partition(path: &Path) -> Result<Vec<MonitoringAlert>, PersistenceError> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let content = std::fs::read_to_string(path).map_err(|e| PersistenceError::io(path, e))?;
    serde_json::from_str(&content).map_err(|e| PersistenceError::Corrupt {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })
}

/// Replace the partition via temp file + rename
fn write_partition(path: &Path, alerts: &[MonitoringAlert]) -> Result<(), PersistenceError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| PersistenceError::io(parent, e))?;
    }
    let json = serde_json::to_string_pretty(alerts)?;
    let tmp = path.with_extension("json.tmp");
    std::fs::write(&tmp, json).map_err(|e| PersistenceError::io(&tmp, e))?;
    std::fs::rename(&tmp, path).map_err(|e| PersistenceError::io(path, e))?;
    Ok(())
}
