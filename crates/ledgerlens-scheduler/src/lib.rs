//! # LedgerLens Scheduler
//!
//! The report poller and everything it drives: metric handlers and the
//! document assembler, the HTTP metric provider, report stores (memory and
//! SQLite), and the append-only history log.

pub mod assembler;
pub mod engine;
pub mod handlers;
pub mod history;
pub mod persistence;
pub mod provider;
pub mod store;

#[cfg(test)]
mod testing;

pub use assembler::{DocumentAssembler, MetricRegistry};
pub use engine::{
    CycleStats, DetailedStatus, HealthReport, ReportScheduler, RunOutcome, SchedulerMetrics,
    SchedulerSettings, SchedulerStatus,
};
pub use handlers::{MetricContext, MetricHandler};
pub use history::{HistoryLog, HistorySummary};
pub use persistence::SqliteStore;
pub use provider::HttpMetricProvider;
pub use store::MemoryStore;
