//! Seams to external collaborators: persistence, analytics, time.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Mutex;

use crate::error::Result;
use crate::history::ReportHistory;
use crate::schedule::{DateRange, ScheduledReport};
use crate::template::{ReportFilters, ReportTemplate};

/// Named, date-ranged metric lookups (revenue summary, MRR, churn, ...).
#[async_trait]
pub trait MetricProvider: Send + Sync {
    fn name(&self) -> &str {
        "metrics"
    }

    /// Fetch the raw data for one metric over `range`.
    async fn fetch(
        &self,
        metric: &str,
        range: &DateRange,
        filters: &ReportFilters,
    ) -> Result<serde_json::Value>;
}

/// Storage for templates, schedules, and history.
#[async_trait]
pub trait ReportStore: Send + Sync {
    async fn save_template(&self, template: &ReportTemplate) -> Result<()>;
    async fn find_template(&self, id: &str) -> Result<Option<ReportTemplate>>;

    /// Create or replace a schedule entry (operator-owned fields).
    async fn save_schedule(&self, schedule: &ScheduledReport) -> Result<()>;
    async fn find_schedule(&self, id: &str) -> Result<Option<ScheduledReport>>;
    async fn list_schedules(&self) -> Result<Vec<ScheduledReport>>;

    /// Active entries with `next_run_date <= now`, oldest first. This is the
    /// only query the poller uses to decide what to run.
    async fn due_schedules(&self, now: DateTime<Utc>) -> Result<Vec<ScheduledReport>>;

    /// Active entries with `now < next_run_date <= until`.
    async fn upcoming_schedules(
        &self,
        now: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> Result<Vec<ScheduledReport>>;

    /// Poller-owned update of the run dates only.
    async fn update_run_dates(
        &self,
        id: &str,
        last_run_date: DateTime<Utc>,
        next_run_date: DateTime<Utc>,
    ) -> Result<()>;

    /// Poller-owned pause/resume of an entry.
    async fn set_active(&self, id: &str, active: bool) -> Result<()>;

    async fn append_history(&self, record: &ReportHistory) -> Result<()>;
    async fn history_since(&self, since: DateTime<Utc>) -> Result<Vec<ReportHistory>>;
}

/// Source of "now", swappable in tests.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock that only moves when told to.
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(at: DateTime<Utc>) -> Self {
        Self { now: Mutex::new(at) }
    }

    pub fn set(&self, at: DateTime<Utc>) {
        *self.now.lock().unwrap_or_else(|e| e.into_inner()) = at;
    }

    pub fn advance(&self, by: chrono::Duration) {
        let mut now = self.now.lock().unwrap_or_else(|e| e.into_inner());
        *now += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap_or_else(|e| e.into_inner())
    }
}
