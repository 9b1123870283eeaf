//! Report scheduler — the poller that finds due reports and runs them.
//!
//! One `tokio::time::interval` loop per service. Each tick runs a cycle:
//! due query → assemble → render → deliver → history, serially per entry.
//! A cycle holds an atomic guard for its whole duration, so a manual
//! `process_now` during a tick fails fast instead of running twice.

use chrono::{DateTime, NaiveDate, Utc};
use ledgerlens_core::config::SchedulerConfig;
use ledgerlens_core::{
    Clock, Document, FailureKind, HistoryStatus, ReportError, ReportHistory, ReportStore, Result,
    RunTrigger, ScheduledReport, SectionContent, SystemClock,
};
use ledgerlens_delivery::{DeliveryPayload, Dispatcher};
use ledgerlens_render::{RenderedArtifact, Renderer};
use serde::Serialize;
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::assembler::DocumentAssembler;
use crate::history::{HistoryLog, HistorySummary};

/// Poller timing.
#[derive(Debug, Clone)]
pub struct SchedulerSettings {
    pub poll_interval: Duration,
    pub report_timeout: Duration,
    /// How far ahead `detailed_status` looks for upcoming runs.
    pub upcoming_window: Duration,
}

impl From<&SchedulerConfig> for SchedulerSettings {
    fn from(config: &SchedulerConfig) -> Self {
        Self {
            poll_interval: Duration::from_secs(config.poll_interval_secs),
            report_timeout: Duration::from_secs(config.report_timeout_secs),
            upcoming_window: Duration::from_secs(config.upcoming_window_hours * 3600),
        }
    }
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self::from(&SchedulerConfig::default())
    }
}

fn chrono_span(d: Duration) -> chrono::Duration {
    chrono::Duration::from_std(d).unwrap_or(chrono::Duration::zero())
}

/// Result of one cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CycleStats {
    pub processed: usize,
    pub succeeded: usize,
    pub failed: usize,
    /// Due entries left alone because a forced run held them.
    pub skipped: usize,
    pub duration_ms: u64,
}

/// Result of processing one schedule entry.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunOutcome {
    pub schedule_id: String,
    pub report_name: String,
    pub status: HistoryStatus,
    pub failure_kind: Option<FailureKind>,
    pub error: Option<String>,
    pub generation_time_ms: u64,
    pub file_paths: Vec<String>,
    pub next_run_date: DateTime<Utc>,
    /// Set when a configuration error paused the entry.
    pub deactivated: bool,
}

impl RunOutcome {
    pub fn is_success(&self) -> bool {
        self.status == HistoryStatus::Completed
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SchedulerStatus {
    pub initialized: bool,
    pub running: bool,
    pub processing: bool,
    pub last_check: Option<DateTime<Utc>>,
    pub next_check: Option<DateTime<Utc>>,
    pub processed_today: u64,
    pub errors_today: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct DetailedStatus {
    #[serde(flatten)]
    pub status: SchedulerStatus,
    pub active_schedules: usize,
    pub due_now: usize,
    pub upcoming: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    pub healthy: bool,
    pub initialized: bool,
    pub running: bool,
    pub uptime_secs: u64,
    /// Resident set size; only known on Linux.
    pub memory_rss_bytes: Option<u64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SchedulerMetrics {
    pub date: NaiveDate,
    #[serde(flatten)]
    pub today: HistorySummary,
    pub processed_today: u64,
    pub errors_today: u64,
}

/// Per-day counters, reset when the UTC date changes.
struct DailyCounters {
    date: NaiveDate,
    processed: u64,
    errors: u64,
}

impl DailyCounters {
    fn roll(&mut self, today: NaiveDate) {
        if today != self.date {
            self.date = today;
            self.processed = 0;
            self.errors = 0;
        }
    }
}

#[derive(Default)]
struct LoopState {
    shutdown: Option<watch::Sender<bool>>,
    handle: Option<JoinHandle<()>>,
    started_at: Option<DateTime<Utc>>,
    last_check: Option<DateTime<Utc>>,
    next_check: Option<DateTime<Utc>>,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|e| e.into_inner())
}

/// Held for the duration of a cycle; released on every exit path.
struct CycleGuard<'a>(&'a AtomicBool);

impl<'a> CycleGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for CycleGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Marks one schedule entry as being processed.
struct InFlight<'a> {
    set: &'a Mutex<HashSet<String>>,
    id: String,
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        lock(self.set).remove(&self.id);
    }
}

/// Files written by one attempt. Once the attempt is abandoned (timed out),
/// anything written is deleted, including files a still-running render
/// task hands in later.
#[derive(Default)]
struct ArtifactLedger {
    abandoned: bool,
    paths: Vec<PathBuf>,
}

impl ArtifactLedger {
    /// Record freshly written files. Returns `false`, after deleting them,
    /// when the attempt was already abandoned.
    fn admit(ledger: &Mutex<Self>, written: &[PathBuf]) -> bool {
        let mut ledger = lock(ledger);
        if ledger.abandoned {
            remove_files(written);
            return false;
        }
        ledger.paths.extend_from_slice(written);
        true
    }

    /// Mark the attempt abandoned and delete what it wrote so far.
    fn abandon(ledger: &Mutex<Self>) -> usize {
        let mut ledger = lock(ledger);
        ledger.abandoned = true;
        let paths = std::mem::take(&mut ledger.paths);
        remove_files(&paths)
    }

    fn is_abandoned(ledger: &Mutex<Self>) -> bool {
        lock(ledger).abandoned
    }
}

fn remove_files(paths: &[PathBuf]) -> usize {
    let mut removed = 0;
    for path in paths {
        match std::fs::remove_file(path) {
            Ok(()) => removed += 1,
            Err(e) => tracing::warn!("⚠️ Could not remove {}: {e}", path.display()),
        }
    }
    removed
}

/// Outcome of assemble → render → deliver, before history is written.
struct Attempt {
    result: Result<()>,
    snapshot: serde_json::Value,
    file_paths: Vec<String>,
}

impl Attempt {
    fn failed(error: ReportError) -> Self {
        Self {
            result: Err(error),
            snapshot: serde_json::json!({}),
            file_paths: Vec::new(),
        }
    }
}

pub struct ReportScheduler {
    store: Arc<dyn ReportStore>,
    assembler: DocumentAssembler,
    renderer: Arc<Renderer>,
    dispatcher: Dispatcher,
    history: HistoryLog,
    clock: Arc<dyn Clock>,
    settings: SchedulerSettings,
    initialized: AtomicBool,
    processing: AtomicBool,
    in_flight: Mutex<HashSet<String>>,
    counters: Mutex<DailyCounters>,
    state: Mutex<LoopState>,
}

impl ReportScheduler {
    pub fn new(
        store: Arc<dyn ReportStore>,
        assembler: DocumentAssembler,
        renderer: Renderer,
        dispatcher: Dispatcher,
        settings: SchedulerSettings,
    ) -> Self {
        Self {
            history: HistoryLog::new(store.clone()),
            store,
            assembler,
            renderer: Arc::new(renderer),
            dispatcher,
            clock: Arc::new(SystemClock),
            settings,
            initialized: AtomicBool::new(false),
            processing: AtomicBool::new(false),
            in_flight: Mutex::new(HashSet::new()),
            counters: Mutex::new(DailyCounters {
                date: Utc::now().date_naive(),
                processed: 0,
                errors: 0,
            }),
            state: Mutex::new(LoopState::default()),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        lock(&self.counters).date = clock.now().date_naive();
        self.clock = clock;
        self
    }

    pub fn history(&self) -> &HistoryLog {
        &self.history
    }

    // ─── Lifecycle ────────────────────────────────────────────

    /// Prepare the output directory and mark the service ready.
    pub fn initialize(&self) -> Result<()> {
        self.renderer.output().ensure()?;
        if !self.initialized.swap(true, Ordering::SeqCst) {
            tracing::info!(
                "📋 Report scheduler initialized (output: {}, channels: {:?})",
                self.renderer.output().root().display(),
                self.dispatcher.methods()
            );
        }
        Ok(())
    }

    /// Begin periodic evaluation. Returns `false` if already running.
    pub fn start(self: &Arc<Self>) -> Result<bool> {
        if !self.initialized.load(Ordering::SeqCst) {
            self.initialize()?;
        }
        let mut state = lock(&self.state);
        if state.handle.is_some() {
            tracing::warn!("⚠️ Report scheduler already running");
            return Ok(false);
        }
        let (tx, rx) = watch::channel(false);
        let this = Arc::clone(self);
        state.handle = Some(tokio::spawn(this.poll_loop(rx)));
        state.shutdown = Some(tx);
        state.started_at = Some(self.clock.now());
        tracing::info!(
            "⏰ Report scheduler started (check every {}s)",
            self.settings.poll_interval.as_secs()
        );
        Ok(true)
    }

    /// Halt the timer. A cycle already running is left to finish.
    pub fn stop(&self) -> bool {
        if self.signal_stop().is_some() {
            tracing::info!("🛑 Report scheduler stopped");
            true
        } else {
            false
        }
    }

    /// Stop, wait for the loop to exit, and mark the service uninitialized.
    pub async fn shutdown(&self) {
        if let Some(handle) = self.signal_stop() {
            let _ = handle.await;
        }
        self.initialized.store(false, Ordering::SeqCst);
        tracing::info!("🛑 Report scheduler shut down");
    }

    pub async fn restart(self: &Arc<Self>) -> Result<bool> {
        if let Some(handle) = self.signal_stop() {
            let _ = handle.await;
        }
        tracing::info!("🔄 Restarting report scheduler");
        self.start()
    }

    fn signal_stop(&self) -> Option<JoinHandle<()>> {
        let mut state = lock(&self.state);
        let handle = state.handle.take()?;
        if let Some(tx) = state.shutdown.take() {
            let _ = tx.send(true);
        }
        state.started_at = None;
        state.next_check = None;
        Some(handle)
    }

    async fn poll_loop(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        let mut interval = tokio::time::interval(self.settings.poll_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = interval.tick() => {}
                _ = shutdown.changed() => break,
            }
            match self.run_cycle(RunTrigger::Scheduled).await {
                Ok(stats) if stats.processed > 0 => tracing::info!(
                    "📣 Cycle done: {} processed, {} ok, {} failed in {}ms",
                    stats.processed,
                    stats.succeeded,
                    stats.failed,
                    stats.duration_ms
                ),
                Ok(_) => {}
                Err(ReportError::Concurrency(_)) => {
                    tracing::debug!("⏭️ Previous cycle still running, skipping tick")
                }
                Err(e) => tracing::error!("❌ Report cycle failed: {e}"),
            }
        }
        tracing::debug!("Report poll loop exited");
    }

    // ─── Processing ───────────────────────────────────────────

    /// Run one cycle now. Fails fast if a cycle is already running.
    pub async fn process_now(&self) -> Result<CycleStats> {
        self.run_cycle(RunTrigger::Manual).await
    }

    /// Force one entry regardless of its due date or active flag.
    pub async fn process_specific_report(&self, id: &str) -> Result<RunOutcome> {
        let _claim = self.claim(id).ok_or_else(|| {
            ReportError::Concurrency(format!("report {id} is already being processed"))
        })?;
        let schedule = self
            .store
            .find_schedule(id)
            .await?
            .ok_or_else(|| ReportError::NotFound(format!("schedule {id}")))?;
        Ok(self.run_entry(&schedule, RunTrigger::Forced).await)
    }

    fn claim(&self, id: &str) -> Option<InFlight<'_>> {
        lock(&self.in_flight).insert(id.to_string()).then(|| InFlight {
            set: &self.in_flight,
            id: id.to_string(),
        })
    }

    async fn run_cycle(&self, trigger: RunTrigger) -> Result<CycleStats> {
        let _guard =
            CycleGuard::acquire(&self.processing).ok_or_else(ReportError::processing_in_progress)?;
        let started = Instant::now();
        let now = self.clock.now();
        {
            let mut state = lock(&self.state);
            state.last_check = Some(now);
            state.next_check = state
                .handle
                .as_ref()
                .map(|_| now + chrono_span(self.settings.poll_interval));
        }

        let due = self.store.due_schedules(now).await?;
        if !due.is_empty() {
            tracing::info!("📋 {} report(s) due", due.len());
        }

        let mut stats = CycleStats::default();
        for schedule in due {
            let Some(_claim) = self.claim(&schedule.id) else {
                tracing::debug!("⏭️ {} already in flight, skipping", schedule.id);
                stats.skipped += 1;
                continue;
            };
            let outcome = self.run_entry(&schedule, trigger).await;
            stats.processed += 1;
            if outcome.is_success() {
                stats.succeeded += 1;
            } else {
                stats.failed += 1;
            }
        }
        stats.duration_ms = started.elapsed().as_millis() as u64;
        Ok(stats)
    }

    /// Process one entry end to end and record the attempt.
    async fn run_entry(&self, schedule: &ScheduledReport, trigger: RunTrigger) -> RunOutcome {
        let started = Instant::now();
        let now = self.clock.now();
        tracing::info!("📊 Generating '{}' ({})", schedule.name, trigger.as_str());

        let ledger = Arc::new(Mutex::new(ArtifactLedger::default()));
        let attempt = match tokio::time::timeout(
            self.settings.report_timeout,
            self.attempt(schedule, now, &ledger),
        )
        .await
        {
            Ok(attempt) => attempt,
            Err(_) => {
                let removed = ArtifactLedger::abandon(&ledger);
                if removed > 0 {
                    tracing::warn!("🧹 Removed {removed} artifact(s) of timed-out '{}'", schedule.name);
                }
                Attempt::failed(ReportError::Timeout(self.settings.report_timeout.as_secs()))
            }
        };
        let elapsed_ms = started.elapsed().as_millis() as u64;

        let mut deactivated = false;
        let (record, next_run_date) = match &attempt.result {
            Ok(()) => {
                let mut updated = schedule.clone();
                updated.mark_succeeded(now);
                if let Err(e) = self
                    .store
                    .update_run_dates(&schedule.id, now, updated.next_run_date)
                    .await
                {
                    tracing::error!(
                        "❌ '{}' was delivered but its schedule could not be advanced: {e}",
                        schedule.name
                    );
                }
                tracing::info!(
                    "✅ '{}' delivered in {elapsed_ms}ms, next run {}",
                    schedule.name,
                    updated.next_run_date
                );
                (
                    ReportHistory::completed(&schedule.name, trigger, now, elapsed_ms),
                    updated.next_run_date,
                )
            }
            Err(e) if e.failure_kind() == FailureKind::Validation => {
                // Stays paused until an operator fixes and re-activates it.
                tracing::error!(
                    "❌ '{}' has an invalid definition and is paused: {e}",
                    schedule.name
                );
                match self.store.set_active(&schedule.id, false).await {
                    Ok(()) => deactivated = true,
                    Err(store_err) => tracing::error!(
                        "❌ Could not pause '{}': {store_err}",
                        schedule.name
                    ),
                }
                (
                    ReportHistory::failed(
                        &schedule.name,
                        trigger,
                        now,
                        elapsed_ms,
                        FailureKind::Validation,
                        &e.to_string(),
                    ),
                    schedule.next_run_date,
                )
            }
            Err(e) => {
                let kind = e.failure_kind();
                tracing::warn!("⚠️ '{}' failed ({}): {e}", schedule.name, kind.as_str());
                (
                    ReportHistory::failed(&schedule.name, trigger, now, elapsed_ms, kind, &e.to_string()),
                    schedule.next_run_date,
                )
            }
        };
        let record = record
            .for_schedule(&schedule.id, &schedule.template_id)
            .with_snapshot(attempt.snapshot, attempt.file_paths);

        {
            let mut counters = lock(&self.counters);
            counters.roll(now.date_naive());
            counters.processed += 1;
            if !record.is_completed() {
                counters.errors += 1;
            }
        }
        self.history.record(&record).await;

        RunOutcome {
            schedule_id: schedule.id.clone(),
            report_name: schedule.name.clone(),
            status: record.status,
            failure_kind: record.failure_kind,
            error: record.error_message,
            generation_time_ms: record.generation_time_ms,
            file_paths: record.file_paths,
            next_run_date,
            deactivated,
        }
    }

    async fn attempt(
        &self,
        schedule: &ScheduledReport,
        now: DateTime<Utc>,
        ledger: &Arc<Mutex<ArtifactLedger>>,
    ) -> Attempt {
        let (doc, artifacts) = match self.build(schedule, now, ledger).await {
            Ok(built) => built,
            Err(e) => return Attempt::failed(e),
        };
        let snapshot = serde_json::to_value(&doc).unwrap_or_else(|_| serde_json::json!({}));
        let file_paths = artifacts
            .iter()
            .map(|a| a.path.display().to_string())
            .collect();
        let payload = DeliveryPayload {
            report_name: schedule.name.clone(),
            schedule_id: schedule.id.clone(),
            period: doc.period,
            generated_at: now,
            recipients: schedule.recipients.clone(),
            artifacts,
        };
        let result = self
            .dispatcher
            .dispatch(schedule.delivery_method, &payload)
            .await;
        Attempt {
            result,
            snapshot,
            file_paths,
        }
    }

    async fn build(
        &self,
        schedule: &ScheduledReport,
        now: DateTime<Utc>,
        ledger: &Arc<Mutex<ArtifactLedger>>,
    ) -> Result<(Document, Vec<RenderedArtifact>)> {
        schedule.validate()?;
        let template = self
            .store
            .find_template(&schedule.template_id)
            .await?
            .ok_or_else(|| {
                ReportError::NotFound(format!(
                    "template {} for schedule {}",
                    schedule.template_id, schedule.id
                ))
            })?;

        let range = schedule.frequency.reporting_range(now);
        let mut doc = self
            .assembler
            .assemble(&template, range, &schedule.filters, now)
            .await?;
        doc.subtitle = schedule.name.clone();

        // Partial failures render as markers; a document with no data at
        // all is a failed generation and is retried next tick.
        if doc.error_count() == doc.sections.len() {
            let first = doc
                .sections
                .iter()
                .find_map(|s| match &s.content {
                    SectionContent::Error { error } => Some(error.clone()),
                    _ => None,
                })
                .unwrap_or_default();
            return Err(ReportError::Generation(format!(
                "no metric produced data ({first})"
            )));
        }

        let renderer = self.renderer.clone();
        let formats = schedule.formats.clone();
        let currency = schedule
            .filters
            .currency
            .clone()
            .unwrap_or_else(|| template.currency());
        let to_render = doc.clone();
        let ledger = Arc::clone(ledger);
        let artifacts = tokio::task::spawn_blocking(move || {
            if ArtifactLedger::is_abandoned(&ledger) {
                return Err(ReportError::Render("attempt abandoned before rendering".into()));
            }
            let artifacts = renderer.render(&to_render, &formats, &currency, now)?;
            let written: Vec<PathBuf> = artifacts.iter().map(|a| a.path.clone()).collect();
            if !ArtifactLedger::admit(&ledger, &written) {
                return Err(ReportError::Render("attempt abandoned during rendering".into()));
            }
            Ok(artifacts)
        })
        .await
        .map_err(|e| ReportError::Render(format!("render task failed: {e}")))??;
        Ok((doc, artifacts))
    }

    // ─── Operational surface ──────────────────────────────────

    pub fn status(&self) -> SchedulerStatus {
        let now = self.clock.now();
        let (processed_today, errors_today) = {
            let mut counters = lock(&self.counters);
            counters.roll(now.date_naive());
            (counters.processed, counters.errors)
        };
        let state = lock(&self.state);
        SchedulerStatus {
            initialized: self.initialized.load(Ordering::SeqCst),
            running: state.handle.is_some(),
            processing: self.processing.load(Ordering::SeqCst),
            last_check: state.last_check,
            next_check: state.next_check,
            processed_today,
            errors_today,
        }
    }

    pub async fn detailed_status(&self) -> Result<DetailedStatus> {
        let status = self.status();
        let now = self.clock.now();
        let until = now + chrono_span(self.settings.upcoming_window);
        let due_now = self.store.due_schedules(now).await?.len();
        let upcoming = self.store.upcoming_schedules(now, until).await?.len();
        let active_schedules = self
            .store
            .list_schedules()
            .await?
            .iter()
            .filter(|s| s.is_active)
            .count();
        Ok(DetailedStatus {
            status,
            active_schedules,
            due_now,
            upcoming,
        })
    }

    pub fn health(&self) -> HealthReport {
        let now = self.clock.now();
        let state = lock(&self.state);
        let initialized = self.initialized.load(Ordering::SeqCst);
        HealthReport {
            healthy: initialized,
            initialized,
            running: state.handle.is_some(),
            uptime_secs: state
                .started_at
                .map(|t| (now - t).num_seconds().max(0) as u64)
                .unwrap_or(0),
            memory_rss_bytes: resident_memory_bytes(),
        }
    }

    pub async fn metrics(&self) -> Result<SchedulerMetrics> {
        let now = self.clock.now();
        let today = self.history.today_summary(now).await?;
        let status = self.status();
        Ok(SchedulerMetrics {
            date: now.date_naive(),
            today,
            processed_today: status.processed_today,
            errors_today: status.errors_today,
        })
    }
}

/// RSS from `/proc/self/statm` (second field, in pages).
fn resident_memory_bytes() -> Option<u64> {
    let statm = std::fs::read_to_string("/proc/self/statm").ok()?;
    let pages: u64 = statm.split_whitespace().nth(1)?.parse().ok()?;
    Some(pages * 4096)
}
