//! History log — one append per generation attempt, never fatal.

use chrono::{DateTime, NaiveTime, Utc};
use ledgerlens_core::{HistoryStatus, ReportHistory, ReportStore, Result};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;

pub struct HistoryLog {
    store: Arc<dyn ReportStore>,
}

/// Aggregate over a slice of history.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct HistorySummary {
    pub total: usize,
    pub completed: usize,
    pub failed: usize,
    /// Failure counts keyed by failure kind.
    pub failures_by_kind: BTreeMap<String, usize>,
    /// Percentage of attempts that completed; 0 when there were none.
    pub success_rate: f64,
    pub average_generation_ms: f64,
}

impl HistorySummary {
    pub fn from_records(records: &[ReportHistory]) -> Self {
        let mut summary = Self {
            total: records.len(),
            ..Self::default()
        };
        let mut total_ms = 0u64;
        for r in records {
            total_ms += r.generation_time_ms;
            match r.status {
                HistoryStatus::Completed => summary.completed += 1,
                HistoryStatus::Failed => {
                    summary.failed += 1;
                    let kind = r.failure_kind.map(|k| k.as_str()).unwrap_or("unknown");
                    *summary.failures_by_kind.entry(kind.to_string()).or_default() += 1;
                }
            }
        }
        if summary.total > 0 {
            summary.success_rate = summary.completed as f64 / summary.total as f64 * 100.0;
            summary.average_generation_ms = total_ms as f64 / summary.total as f64;
        }
        summary
    }
}

/// Start of the UTC day containing `now`.
pub fn utc_midnight(now: DateTime<Utc>) -> DateTime<Utc> {
    now.date_naive().and_time(NaiveTime::MIN).and_utc()
}

impl HistoryLog {
    pub fn new(store: Arc<dyn ReportStore>) -> Self {
        Self { store }
    }

    /// Append one record. A failed write is logged and reported as `false`;
    /// it never propagates.
    pub async fn record(&self, entry: &ReportHistory) -> bool {
        match self.store.append_history(entry).await {
            Ok(()) => {
                tracing::debug!(
                    "🗂️ History {}: {} ({})",
                    entry.id,
                    entry.report_name,
                    entry.status.as_str()
                );
                true
            }
            Err(e) => {
                tracing::error!(
                    "❌ Failed to write history for '{}' ({}): {e}",
                    entry.report_name,
                    entry.status.as_str()
                );
                false
            }
        }
    }

    pub async fn since(&self, since: DateTime<Utc>) -> Result<Vec<ReportHistory>> {
        self.store.history_since(since).await
    }

    /// Everything recorded since UTC midnight.
    pub async fn today_summary(&self, now: DateTime<Utc>) -> Result<HistorySummary> {
        let records = self.since(utc_midnight(now)).await?;
        Ok(HistorySummary::from_records(&records))
    }
}
