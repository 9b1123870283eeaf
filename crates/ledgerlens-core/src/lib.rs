//! # LedgerLens Core
//!
//! Shared vocabulary for the report pipeline: templates and schedules, the
//! format-independent document model, history records, configuration, the
//! error taxonomy, and the traits external collaborators implement.
//!
//! ## Pipeline
//! ```text
//! ReportScheduler (tokio interval)
//!   └── due ScheduledReport
//!         ├── DocumentAssembler ── MetricProvider (named lookups)
//!         ├── Renderer ── PDF / XLSX (+ chart PNGs)
//!         ├── Dispatcher ── email / slack / webhook
//!         └── HistoryLog ── ReportStore (append-only)
//! ```

pub mod config;
pub mod document;
pub mod error;
pub mod history;
pub mod schedule;
pub mod template;
pub mod traits;

pub use config::LedgerLensConfig;
pub use document::{
    CellValue, ChartOptions, ChartSpec, Dataset, Document, MetricCard, Section, SectionContent,
    SectionKind, TableContent, Trend, TrendDirection, ValueFormat,
};
pub use error::{ContentSafetyError, ReportError, Result};
pub use history::{FailureKind, HistoryStatus, ReportHistory, RunTrigger};
pub use schedule::{DateRange, DeliveryMethod, Frequency, ReportFormat, ScheduledReport};
pub use template::{ChartType, ReportFilters, ReportTemplate, TemplateCategory, TemplateConfig};
pub use traits::{Clock, ManualClock, MetricProvider, ReportStore, SystemClock};
