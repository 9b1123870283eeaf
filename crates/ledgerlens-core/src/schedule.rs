//! Schedule definitions — when a report runs and where it goes.

use chrono::{DateTime, Duration, Months, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{ReportError, Result};
use crate::template::ReportFilters;

/// How often a scheduled report fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Frequency {
    Daily,
    Weekly,
    Monthly,
    Quarterly,
}

impl Frequency {
    /// Earliest time the entry should next be considered: exactly one
    /// calendar unit after `now`. Month arithmetic clamps to the last day
    /// of shorter months (Jan 31 → Feb 28).
    pub fn next_after(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        match self {
            Frequency::Daily => now + Duration::days(1),
            Frequency::Weekly => now + Duration::days(7),
            Frequency::Monthly => add_months(now, 1),
            Frequency::Quarterly => add_months(now, 3),
        }
    }

    /// One calendar unit before `at`.
    pub fn previous_before(&self, at: DateTime<Utc>) -> DateTime<Utc> {
        match self {
            Frequency::Daily => at - Duration::days(1),
            Frequency::Weekly => at - Duration::days(7),
            Frequency::Monthly => at
                .checked_sub_months(Months::new(1))
                .unwrap_or(at - Duration::days(30)),
            Frequency::Quarterly => at
                .checked_sub_months(Months::new(3))
                .unwrap_or(at - Duration::days(91)),
        }
    }

    /// The window a report generated at `now` covers.
    pub fn reporting_range(&self, now: DateTime<Utc>) -> DateRange {
        DateRange {
            start: self.previous_before(now),
            end: now,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Frequency::Daily => "daily",
            Frequency::Weekly => "weekly",
            Frequency::Monthly => "monthly",
            Frequency::Quarterly => "quarterly",
        }
    }
}

fn add_months(now: DateTime<Utc>, months: u32) -> DateTime<Utc> {
    now.checked_add_months(Months::new(months))
        .unwrap_or(now + Duration::days(31 * months as i64))
}

impl std::fmt::Display for Frequency {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Frequency {
    type Err = ReportError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "daily" => Ok(Frequency::Daily),
            "weekly" => Ok(Frequency::Weekly),
            "monthly" => Ok(Frequency::Monthly),
            "quarterly" => Ok(Frequency::Quarterly),
            other => Err(ReportError::Validation(format!("Unknown frequency: {other}"))),
        }
    }
}

/// Which channel delivers the rendered artifacts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryMethod {
    Email,
    Slack,
    Webhook,
}

impl DeliveryMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeliveryMethod::Email => "email",
            DeliveryMethod::Slack => "slack",
            DeliveryMethod::Webhook => "webhook",
        }
    }
}

impl std::fmt::Display for DeliveryMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for DeliveryMethod {
    type Err = ReportError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "email" => Ok(DeliveryMethod::Email),
            "slack" => Ok(DeliveryMethod::Slack),
            "webhook" => Ok(DeliveryMethod::Webhook),
            other => Err(ReportError::Validation(format!(
                "Unknown delivery method: {other}"
            ))),
        }
    }
}

/// Binary report formats produced per run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportFormat {
    Pdf,
    Xlsx,
}

impl ReportFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            ReportFormat::Pdf => "pdf",
            ReportFormat::Xlsx => "xlsx",
        }
    }

    pub fn mime_type(&self) -> &'static str {
        match self {
            ReportFormat::Pdf => "application/pdf",
            ReportFormat::Xlsx => {
                "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet"
            }
        }
    }
}

fn default_formats() -> Vec<ReportFormat> {
    vec![ReportFormat::Pdf, ReportFormat::Xlsx]
}

fn default_true() -> bool {
    true
}

/// A half-open time window `[start, end)` a report covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl DateRange {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Self> {
        if end <= start {
            return Err(ReportError::Validation(format!(
                "Date range end {end} is not after start {start}"
            )));
        }
        Ok(Self { start, end })
    }

    /// Window of equal length ending where this one starts.
    pub fn previous(&self) -> Self {
        let len = self.end - self.start;
        Self {
            start: self.start - len,
            end: self.start,
        }
    }

    pub fn label(&self) -> String {
        format!(
            "{} to {}",
            self.start.format("%Y-%m-%d"),
            self.end.format("%Y-%m-%d")
        )
    }
}

/// A recurring report delivery.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduledReport {
    pub id: String,
    pub template_id: String,
    pub name: String,
    pub frequency: Frequency,
    pub delivery_method: DeliveryMethod,
    /// Email addresses, Slack channel names, or webhook URLs, per method.
    #[serde(default)]
    pub recipients: Vec<String>,
    /// Applied on top of the template's own filters.
    #[serde(default)]
    pub filters: ReportFilters,
    #[serde(default = "default_formats")]
    pub formats: Vec<ReportFormat>,
    pub next_run_date: DateTime<Utc>,
    #[serde(default)]
    pub last_run_date: Option<DateTime<Utc>>,
    #[serde(default = "default_true")]
    pub is_active: bool,
}

impl ScheduledReport {
    pub fn new(
        template_id: &str,
        name: &str,
        frequency: Frequency,
        delivery_method: DeliveryMethod,
        first_run: DateTime<Utc>,
    ) -> Self {
        Self {
            id: format!("sched-{}", uuid::Uuid::new_v4()),
            template_id: template_id.to_string(),
            name: name.to_string(),
            frequency,
            delivery_method,
            recipients: Vec::new(),
            filters: ReportFilters::default(),
            formats: default_formats(),
            next_run_date: first_run,
            last_run_date: None,
            is_active: true,
        }
    }

    pub fn with_recipients(mut self, recipients: &[&str]) -> Self {
        self.recipients = recipients.iter().map(|r| r.to_string()).collect();
        self
    }

    /// Active and past its next run date.
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.is_active && self.next_run_date <= now
    }

    /// Record a successful run. `next_run_date` never moves backwards, so a
    /// forced run ahead of schedule keeps the later of the two dates.
    pub fn mark_succeeded(&mut self, now: DateTime<Utc>) {
        self.last_run_date = Some(now);
        self.next_run_date = self.next_run_date.max(self.frequency.next_after(now));
    }

    pub fn validate(&self) -> Result<()> {
        if self.id.trim().is_empty() {
            return Err(ReportError::Validation("Schedule id is required".into()));
        }
        if self.name.trim().is_empty() {
            return Err(ReportError::Validation(format!(
                "Schedule {} has no name",
                self.id
            )));
        }
        if self.template_id.trim().is_empty() {
            return Err(ReportError::Validation(format!(
                "Schedule {} has no template",
                self.id
            )));
        }
        if self.formats.is_empty() {
            return Err(ReportError::Validation(format!(
                "Schedule {} requests no output formats",
                self.id
            )));
        }
        if self.delivery_method == DeliveryMethod::Email && self.recipients.is_empty() {
            return Err(ReportError::Validation(format!(
                "Schedule {} delivers by email but has no recipients",
                self.id
            )));
        }
        Ok(())
    }
}
