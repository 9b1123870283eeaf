//! Append-only execution history — one record per generation attempt.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HistoryStatus {
    Completed,
    Failed,
}

impl HistoryStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            HistoryStatus::Completed => "completed",
            HistoryStatus::Failed => "failed",
        }
    }
}

/// Why an attempt failed. `Delivery` means the artifacts exist on disk but
/// never reached the channel; every other kind means no report was built.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    Validation,
    Generation,
    Timeout,
    Delivery,
    ContentSafety,
}

impl FailureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureKind::Validation => "validation",
            FailureKind::Generation => "generation",
            FailureKind::Timeout => "timeout",
            FailureKind::Delivery => "delivery",
            FailureKind::ContentSafety => "content_safety",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "validation" => Some(FailureKind::Validation),
            "generation" => Some(FailureKind::Generation),
            "timeout" => Some(FailureKind::Timeout),
            "delivery" => Some(FailureKind::Delivery),
            "content_safety" => Some(FailureKind::ContentSafety),
            _ => None,
        }
    }
}

/// Which entry point produced the attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunTrigger {
    /// Periodic poll tick.
    Scheduled,
    /// `process_now`.
    Manual,
    /// `process_specific_report`.
    Forced,
}

impl RunTrigger {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunTrigger::Scheduled => "scheduled",
            RunTrigger::Manual => "manual",
            RunTrigger::Forced => "forced",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "scheduled" => Some(RunTrigger::Scheduled),
            "manual" => Some(RunTrigger::Manual),
            "forced" => Some(RunTrigger::Forced),
            _ => None,
        }
    }
}

/// Immutable record of one attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportHistory {
    pub id: String,
    pub template_id: Option<String>,
    pub scheduled_report_id: Option<String>,
    pub report_name: String,
    /// Snapshot of the assembled document, or `{}` when assembly never ran.
    pub report_data: serde_json::Value,
    #[serde(default)]
    pub file_paths: Vec<String>,
    pub generation_time_ms: u64,
    pub status: HistoryStatus,
    #[serde(default)]
    pub failure_kind: Option<FailureKind>,
    #[serde(default)]
    pub error_message: Option<String>,
    pub trigger: RunTrigger,
    pub generated_at: DateTime<Utc>,
}

impl ReportHistory {
    pub fn completed(
        report_name: &str,
        trigger: RunTrigger,
        generated_at: DateTime<Utc>,
        generation_time_ms: u64,
    ) -> Self {
        Self {
            id: format!("hist-{}", uuid::Uuid::new_v4()),
            template_id: None,
            scheduled_report_id: None,
            report_name: report_name.to_string(),
            report_data: serde_json::json!({}),
            file_paths: Vec::new(),
            generation_time_ms,
            status: HistoryStatus::Completed,
            failure_kind: None,
            error_message: None,
            trigger,
            generated_at,
        }
    }

    pub fn failed(
        report_name: &str,
        trigger: RunTrigger,
        generated_at: DateTime<Utc>,
        generation_time_ms: u64,
        kind: FailureKind,
        message: &str,
    ) -> Self {
        Self {
            status: HistoryStatus::Failed,
            failure_kind: Some(kind),
            error_message: Some(message.to_string()),
            ..Self::completed(report_name, trigger, generated_at, generation_time_ms)
        }
    }

    pub fn for_schedule(mut self, scheduled_report_id: &str, template_id: &str) -> Self {
        self.scheduled_report_id = Some(scheduled_report_id.to_string());
        self.template_id = Some(template_id.to_string());
        self
    }

    pub fn with_snapshot(mut self, data: serde_json::Value, file_paths: Vec<String>) -> Self {
        self.report_data = data;
        self.file_paths = file_paths;
        self
    }

    pub fn is_completed(&self) -> bool {
        self.status == HistoryStatus::Completed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failed_record_carries_kind() {
        let rec = ReportHistory::failed(
            "Weekly",
            RunTrigger::Scheduled,
            Utc::now(),
            12,
            FailureKind::Delivery,
            "SMTP 550",
        )
        .for_schedule("s1", "t1");
        assert_eq!(rec.status, HistoryStatus::Failed);
        assert_eq!(rec.failure_kind, Some(FailureKind::Delivery));
        assert_eq!(rec.scheduled_report_id.as_deref(), Some("s1"));
        assert_eq!(rec.report_data, serde_json::json!({}));
    }

    #[test]
    fn test_kind_round_trip_strings() {
        for kind in [
            FailureKind::Validation,
            FailureKind::Generation,
            FailureKind::Timeout,
            FailureKind::Delivery,
            FailureKind::ContentSafety,
        ] {
            assert_eq!(FailureKind::parse(kind.as_str()), Some(kind));
        }
    }
}
