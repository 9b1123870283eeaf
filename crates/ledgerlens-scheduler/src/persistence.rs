//! SQLite-backed report store — templates, schedules, and run history.
//! Survives restarts; the poller's due query is a single indexed SELECT.

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use ledgerlens_core::{
    FailureKind, HistoryStatus, ReportError, ReportHistory, ReportStore, ReportTemplate, Result,
    RunTrigger, ScheduledReport,
};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

pub struct SqliteStore {
    conn: Mutex<rusqlite::Connection>,
}

/// Fixed-width UTC timestamps so text comparison orders correctly.
fn ts(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn parse_ts(s: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|d| d.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(e)))
}

fn json_col<T: serde::de::DeserializeOwned>(s: &str) -> rusqlite::Result<T> {
    serde_json::from_str(s)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(e)))
}

impl SqliteStore {
    /// Open or create the database.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = rusqlite::Connection::open(path)
            .map_err(|e| ReportError::Store(format!("DB open: {e}")))?;
        Self::with_connection(conn)
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = rusqlite::Connection::open_in_memory()
            .map_err(|e| ReportError::Store(format!("DB open: {e}")))?;
        Self::with_connection(conn)
    }

    fn with_connection(conn: rusqlite::Connection) -> Result<Self> {
        let store = Self { conn: Mutex::new(conn) };
        store.migrate()?;
        Ok(store)
    }

    fn conn(&self) -> Result<MutexGuard<'_, rusqlite::Connection>> {
        self.conn
            .lock()
            .map_err(|_| ReportError::Store("connection lock poisoned".into()))
    }

    /// Run migrations to create tables.
    fn migrate(&self) -> Result<()> {
        self.conn()?
            .execute_batch(
                "
            CREATE TABLE IF NOT EXISTS report_templates (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                category TEXT NOT NULL,
                body TEXT NOT NULL               -- JSON ReportTemplate
            );

            CREATE TABLE IF NOT EXISTS scheduled_reports (
                id TEXT PRIMARY KEY,
                template_id TEXT NOT NULL,
                name TEXT NOT NULL,
                body TEXT NOT NULL,              -- JSON ScheduledReport (operator-owned fields)
                next_run_date TEXT NOT NULL,     -- poller-owned
                last_run_date TEXT,              -- poller-owned
                is_active INTEGER NOT NULL DEFAULT 1
            );
            CREATE INDEX IF NOT EXISTS idx_scheduled_due
                ON scheduled_reports (is_active, next_run_date);

            -- Append-only: rows are never updated or deleted.
            CREATE TABLE IF NOT EXISTS report_history (
                id TEXT PRIMARY KEY,
                template_id TEXT,
                scheduled_report_id TEXT,
                report_name TEXT NOT NULL,
                report_data TEXT NOT NULL DEFAULT '{}',
                file_paths TEXT NOT NULL DEFAULT '[]',
                generation_time_ms INTEGER NOT NULL,
                status TEXT NOT NULL,            -- 'completed', 'failed'
                failure_kind TEXT,
                error_message TEXT,
                trigger_kind TEXT NOT NULL,      -- 'scheduled', 'manual', 'forced'
                generated_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_history_generated
                ON report_history (generated_at);
         ",
            )
            .map_err(|e| ReportError::Store(format!("Migration: {e}")))?;
        Ok(())
    }

    fn query_schedules(&self, sql: &str, params: &[&dyn rusqlite::ToSql]) -> Result<Vec<ScheduledReport>> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(sql)
            .map_err(|e| ReportError::Store(format!("Query schedules: {e}")))?;
        let rows = stmt
            .query_map(params, |row| {
                let body: String = row.get(0)?;
                let next: String = row.get(1)?;
                let last: Option<String> = row.get(2)?;
                let active: i32 = row.get(3)?;
                let mut schedule: ScheduledReport = json_col(&body)?;
                schedule.next_run_date = parse_ts(&next)?;
                schedule.last_run_date = last.as_deref().map(parse_ts).transpose()?;
                schedule.is_active = active != 0;
                Ok(schedule)
            })
            .map_err(|e| ReportError::Store(format!("Query schedules: {e}")))?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .map_err(|e| ReportError::Store(format!("Read schedule row: {e}")))
    }
}

const SCHEDULE_COLUMNS: &str = "SELECT body, next_run_date, last_run_date, is_active FROM scheduled_reports";

#[async_trait]
impl ReportStore for SqliteStore {
    async fn save_template(&self, template: &ReportTemplate) -> Result<()> {
        template.validate()?;
        self.conn()?
            .execute(
                "INSERT OR REPLACE INTO report_templates (id, name, category, body) VALUES (?1, ?2, ?3, ?4)",
                rusqlite::params![
                    template.id,
                    template.name,
                    template.category.as_str(),
                    serde_json::to_string(template)?,
                ],
            )
            .map_err(|e| ReportError::Store(format!("Save template: {e}")))?;
        Ok(())
    }

    async fn find_template(&self, id: &str) -> Result<Option<ReportTemplate>> {
        let conn = self.conn()?;
        let body: Option<String> = match conn.query_row(
            "SELECT body FROM report_templates WHERE id = ?1",
            [id],
            |row| row.get(0),
        ) {
            Ok(b) => Some(b),
            Err(rusqlite::Error::QueryReturnedNoRows) => None,
            Err(e) => return Err(ReportError::Store(format!("Find template: {e}"))),
        };
        Ok(body.map(|b| serde_json::from_str(&b)).transpose()?)
    }

    async fn save_schedule(&self, schedule: &ScheduledReport) -> Result<()> {
        schedule.validate()?;
        self.conn()?
            .execute(
                "INSERT OR REPLACE INTO scheduled_reports
                 (id, template_id, name, body, next_run_date, last_run_date, is_active)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                rusqlite::params![
                    schedule.id,
                    schedule.template_id,
                    schedule.name,
                    serde_json::to_string(schedule)?,
                    ts(schedule.next_run_date),
                    schedule.last_run_date.map(ts),
                    schedule.is_active as i32,
                ],
            )
            .map_err(|e| ReportError::Store(format!("Save schedule: {e}")))?;
        Ok(())
    }

    async fn find_schedule(&self, id: &str) -> Result<Option<ScheduledReport>> {
        let sql = format!("{SCHEDULE_COLUMNS} WHERE id = ?1");
        Ok(self.query_schedules(&sql, &[&id])?.into_iter().next())
    }

    async fn list_schedules(&self) -> Result<Vec<ScheduledReport>> {
        let sql = format!("{SCHEDULE_COLUMNS} ORDER BY next_run_date, id");
        self.query_schedules(&sql, &[])
    }

    async fn due_schedules(&self, now: DateTime<Utc>) -> Result<Vec<ScheduledReport>> {
        let sql = format!(
            "{SCHEDULE_COLUMNS} WHERE is_active = 1 AND next_run_date <= ?1 ORDER BY next_run_date, id"
        );
        self.query_schedules(&sql, &[&ts(now)])
    }

    async fn upcoming_schedules(
        &self,
        now: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> Result<Vec<ScheduledReport>> {
        let sql = format!(
            "{SCHEDULE_COLUMNS} WHERE is_active = 1 AND next_run_date > ?1 AND next_run_date <= ?2 ORDER BY next_run_date, id"
        );
        self.query_schedules(&sql, &[&ts(now), &ts(until)])
    }

    async fn update_run_dates(
        &self,
        id: &str,
        last_run_date: DateTime<Utc>,
        next_run_date: DateTime<Utc>,
    ) -> Result<()> {
        let changed = self
            .conn()?
            .execute(
                "UPDATE scheduled_reports SET last_run_date = ?2, next_run_date = ?3 WHERE id = ?1",
                rusqlite::params![id, ts(last_run_date), ts(next_run_date)],
            )
            .map_err(|e| ReportError::Store(format!("Update run dates: {e}")))?;
        if changed == 0 {
            return Err(ReportError::NotFound(format!("schedule {id}")));
        }
        Ok(())
    }

    async fn set_active(&self, id: &str, active: bool) -> Result<()> {
        let changed = self
            .conn()?
            .execute(
                "UPDATE scheduled_reports SET is_active = ?2 WHERE id = ?1",
                rusqlite::params![id, active as i32],
            )
            .map_err(|e| ReportError::Store(format!("Set active: {e}")))?;
        if changed == 0 {
            return Err(ReportError::NotFound(format!("schedule {id}")));
        }
        Ok(())
    }

    async fn append_history(&self, record: &ReportHistory) -> Result<()> {
        self.conn()?
            .execute(
                "INSERT INTO report_history
                 (id, template_id, scheduled_report_id, report_name, report_data, file_paths,
                  generation_time_ms, status, failure_kind, error_message, trigger_kind, generated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
                rusqlite::params![
                    record.id,
                    record.template_id,
                    record.scheduled_report_id,
                    record.report_name,
                    record.report_data.to_string(),
                    serde_json::to_string(&record.file_paths)?,
                    record.generation_time_ms as i64,
                    record.status.as_str(),
                    record.failure_kind.map(|k| k.as_str()),
                    record.error_message,
                    record.trigger.as_str(),
                    ts(record.generated_at),
                ],
            )
            .map_err(|e| ReportError::Store(format!("Append history: {e}")))?;
        Ok(())
    }

    async fn history_since(&self, since: DateTime<Utc>) -> Result<Vec<ReportHistory>> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(
                "SELECT id, template_id, scheduled_report_id, report_name, report_data, file_paths,
                        generation_time_ms, status, failure_kind, error_message, trigger_kind, generated_at
                 FROM report_history WHERE generated_at >= ?1 ORDER BY generated_at",
            )
            .map_err(|e| ReportError::Store(format!("Query history: {e}")))?;
        let rows = stmt
            .query_map([ts(since)], |row| {
                let data: String = row.get(4)?;
                let paths: String = row.get(5)?;
                let status: String = row.get(7)?;
                let kind: Option<String> = row.get(8)?;
                let trigger: String = row.get(10)?;
                let generated_at: String = row.get(11)?;
                Ok(ReportHistory {
                    id: row.get(0)?,
                    template_id: row.get(1)?,
                    scheduled_report_id: row.get(2)?,
                    report_name: row.get(3)?,
                    report_data: serde_json::from_str(&data).unwrap_or_else(|_| serde_json::json!({})),
                    file_paths: json_col(&paths)?,
                    generation_time_ms: row.get::<_, i64>(6)?.max(0) as u64,
                    status: if status == "completed" {
                        HistoryStatus::Completed
                    } else {
                        HistoryStatus::Failed
                    },
                    failure_kind: kind.as_deref().and_then(FailureKind::parse),
                    error_message: row.get(9)?,
                    trigger: RunTrigger::parse(&trigger).unwrap_or(RunTrigger::Scheduled),
                    generated_at: parse_ts(&generated_at)?,
                })
            })
            .map_err(|e| ReportError::Store(format!("Query history: {e}")))?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .map_err(|e| ReportError::Store(format!("Read history row: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use ledgerlens_core::{DeliveryMethod, Frequency, TemplateConfig};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 10, 1, 12, 0, 0).unwrap()
    }

    #[tokio::test]
    async fn test_open_and_migrate_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("ledgerlens.db");
        let store = SqliteStore::open(&path).unwrap();
        assert!(store.list_schedules().await.unwrap().is_empty());
        drop(store);
        // Reopening runs the migrations again without error.
        SqliteStore::open(&path).unwrap();
    }

    #[tokio::test]
    async fn test_template_round_trip() {
        let store = SqliteStore::open_in_memory().unwrap();
        let template = ReportTemplate::new(
            "tpl-ops",
            "Ops",
            TemplateConfig::Operational { locations: vec!["north".into()] },
            &["sales_by_location"],
        )
        .unwrap();
        store.save_template(&template).await.unwrap();
        assert_eq!(store.find_template("tpl-ops").await.unwrap(), Some(template));
        assert_eq!(store.find_template("missing").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_due_query_and_run_dates() {
        let store = SqliteStore::open_in_memory().unwrap();
        let due = ScheduledReport::new("tpl", "due", Frequency::Weekly, DeliveryMethod::Slack, now() - Duration::minutes(5));
        let later = ScheduledReport::new("tpl", "later", Frequency::Weekly, DeliveryMethod::Slack, now() + Duration::hours(5));
        store.save_schedule(&due).await.unwrap();
        store.save_schedule(&later).await.unwrap();

        let found = store.due_schedules(now()).await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, due.id);
        assert_eq!(store.upcoming_schedules(now(), now() + Duration::hours(24)).await.unwrap().len(), 1);

        let next = Frequency::Weekly.next_after(now());
        store.update_run_dates(&due.id, now(), next).await.unwrap();
        assert!(store.due_schedules(now()).await.unwrap().is_empty());
        let reloaded = store.find_schedule(&due.id).await.unwrap().unwrap();
        assert_eq!(reloaded.last_run_date, Some(now()));
        assert_eq!(reloaded.next_run_date, next);
        assert!(matches!(
            store.update_run_dates("nope", now(), next).await,
            Err(ReportError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_paused_entry_leaves_due_query() {
        let store = SqliteStore::open_in_memory().unwrap();
        let due = ScheduledReport::new("tpl", "due", Frequency::Daily, DeliveryMethod::Slack, now() - Duration::minutes(5));
        store.save_schedule(&due).await.unwrap();

        store.set_active(&due.id, false).await.unwrap();
        assert!(store.due_schedules(now()).await.unwrap().is_empty());
        assert!(!store.find_schedule(&due.id).await.unwrap().unwrap().is_active);

        store.set_active(&due.id, true).await.unwrap();
        assert_eq!(store.due_schedules(now()).await.unwrap().len(), 1);
        assert!(matches!(store.set_active("nope", true).await, Err(ReportError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_history_append_and_query() {
        let store = SqliteStore::open_in_memory().unwrap();
        let ok = ReportHistory::completed("Weekly", RunTrigger::Scheduled, now(), 120)
            .for_schedule("s1", "t1")
            .with_snapshot(serde_json::json!({"title": "Weekly"}), vec!["/r/a.pdf".into()]);
        let failed = ReportHistory::failed(
            "Weekly",
            RunTrigger::Forced,
            now() + Duration::minutes(1),
            5,
            FailureKind::Delivery,
            "503",
        );
        store.append_history(&ok).await.unwrap();
        store.append_history(&failed).await.unwrap();

        let all = store.history_since(now() - Duration::hours(1)).await.unwrap();
        assert_eq!(all, vec![ok, failed.clone()]);
        let recent = store.history_since(now() + Duration::seconds(30)).await.unwrap();
        assert_eq!(recent, vec![failed]);
    }
}
