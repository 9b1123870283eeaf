//! In-memory report store — for tests and one-shot CLI runs.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use ledgerlens_core::{ReportError, ReportHistory, ReportStore, ReportTemplate, Result, ScheduledReport};
use std::collections::HashMap;
use tokio::sync::RwLock;

#[derive(Default)]
pub struct MemoryStore {
    templates: RwLock<HashMap<String, ReportTemplate>>,
    schedules: RwLock<HashMap<String, ScheduledReport>>,
    history: RwLock<Vec<ReportHistory>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn history_len(&self) -> usize {
        self.history.read().await.len()
    }
}

fn by_next_run(mut schedules: Vec<ScheduledReport>) -> Vec<ScheduledReport> {
    schedules.sort_by(|a, b| a.next_run_date.cmp(&b.next_run_date).then_with(|| a.id.cmp(&b.id)));
    schedules
}

#[async_trait]
impl ReportStore for MemoryStore {
    async fn save_template(&self, template: &ReportTemplate) -> Result<()> {
        template.validate()?;
        self.templates
            .write()
            .await
            .insert(template.id.clone(), template.clone());
        Ok(())
    }

    async fn find_template(&self, id: &str) -> Result<Option<ReportTemplate>> {
        Ok(self.templates.read().await.get(id).cloned())
    }

    async fn save_schedule(&self, schedule: &ScheduledReport) -> Result<()> {
        schedule.validate()?;
        self.schedules
            .write()
            .await
            .insert(schedule.id.clone(), schedule.clone());
        Ok(())
    }

    async fn find_schedule(&self, id: &str) -> Result<Option<ScheduledReport>> {
        Ok(self.schedules.read().await.get(id).cloned())
    }

    async fn list_schedules(&self) -> Result<Vec<ScheduledReport>> {
        Ok(by_next_run(self.schedules.read().await.values().cloned().collect()))
    }

    async fn due_schedules(&self, now: DateTime<Utc>) -> Result<Vec<ScheduledReport>> {
        let due = self
            .schedules
            .read()
            .await
            .values()
            .filter(|s| s.is_due(now))
            .cloned()
            .collect();
        Ok(by_next_run(due))
    }

    async fn upcoming_schedules(
        &self,
        now: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> Result<Vec<ScheduledReport>> {
        let upcoming = self
            .schedules
            .read()
            .await
            .values()
            .filter(|s| s.is_active && s.next_run_date > now && s.next_run_date <= until)
            .cloned()
            .collect();
        Ok(by_next_run(upcoming))
    }

    async fn update_run_dates(
        &self,
        id: &str,
        last_run_date: DateTime<Utc>,
        next_run_date: DateTime<Utc>,
    ) -> Result<()> {
        let mut schedules = self.schedules.write().await;
        let schedule = schedules
            .get_mut(id)
            .ok_or_else(|| ReportError::NotFound(format!("schedule {id}")))?;
        schedule.last_run_date = Some(last_run_date);
        schedule.next_run_date = next_run_date;
        Ok(())
    }

    async fn set_active(&self, id: &str, active: bool) -> Result<()> {
        self.schedules
            .write()
            .await
            .get_mut(id)
            .ok_or_else(|| ReportError::NotFound(format!("schedule {id}")))?
            .is_active = active;
        Ok(())
    }

    async fn append_history(&self, record: &ReportHistory) -> Result<()> {
        self.history.write().await.push(record.clone());
        Ok(())
    }

    async fn history_since(&self, since: DateTime<Utc>) -> Result<Vec<ReportHistory>> {
        Ok(self
            .history
            .read()
            .await
            .iter()
            .filter(|h| h.generated_at >= since)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use ledgerlens_core::{DeliveryMethod, Frequency};

    fn schedule(name: &str, next: DateTime<Utc>) -> ScheduledReport {
        ScheduledReport::new("tpl-1", name, Frequency::Daily, DeliveryMethod::Slack, next)
    }

    #[tokio::test]
    async fn test_due_and_upcoming_queries() {
        let now = Utc.with_ymd_and_hms(2026, 10, 1, 12, 0, 0).unwrap();
        let store = MemoryStore::new();
        let overdue = schedule("overdue", now - Duration::hours(3));
        let exact = schedule("exact", now);
        let soon = schedule("soon", now + Duration::hours(2));
        let later = schedule("later", now + Duration::days(3));
        let mut paused = schedule("paused", now - Duration::hours(1));
        paused.is_active = false;
        for s in [&overdue, &exact, &soon, &later, &paused] {
            store.save_schedule(s).await.unwrap();
        }

        let due: Vec<String> = store.due_schedules(now).await.unwrap().into_iter().map(|s| s.name).collect();
        assert_eq!(due, vec!["overdue", "exact"]);

        let upcoming = store.upcoming_schedules(now, now + Duration::hours(24)).await.unwrap();
        assert_eq!(upcoming.len(), 1);
        assert_eq!(upcoming[0].name, "soon");
    }

    #[tokio::test]
    async fn test_update_run_dates() {
        let now = Utc.with_ymd_and_hms(2026, 10, 1, 12, 0, 0).unwrap();
        let store = MemoryStore::new();
        let s = schedule("daily", now);
        store.save_schedule(&s).await.unwrap();
        store.update_run_dates(&s.id, now, now + Duration::days(1)).await.unwrap();
        let found = store.find_schedule(&s.id).await.unwrap().unwrap();
        assert_eq!(found.last_run_date, Some(now));
        assert!(store.due_schedules(now).await.unwrap().is_empty());
        assert!(store.update_run_dates("missing", now, now).await.is_err());

        store.set_active(&s.id, false).await.unwrap();
        assert!(!store.find_schedule(&s.id).await.unwrap().unwrap().is_active);
        assert!(store.set_active("missing", false).await.is_err());
    }

    #[tokio::test]
    async fn test_invalid_schedule_rejected() {
        let store = MemoryStore::new();
        let s = ScheduledReport::new("tpl-1", "mail", Frequency::Daily, DeliveryMethod::Email, Utc::now());
        assert!(matches!(store.save_schedule(&s).await, Err(ReportError::Validation(_))));
    }
}
