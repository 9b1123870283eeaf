//! Delivery channel trait and the payload every channel receives.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use ledgerlens_core::{DateRange, DeliveryMethod, Result};
use ledgerlens_render::RenderedArtifact;

/// What gets delivered for one report run.
#[derive(Debug, Clone)]
pub struct DeliveryPayload {
    pub report_name: String,
    pub schedule_id: String,
    pub period: DateRange,
    pub generated_at: DateTime<Utc>,
    pub recipients: Vec<String>,
    pub artifacts: Vec<RenderedArtifact>,
}

impl DeliveryPayload {
    pub fn subject(&self) -> String {
        format!("{}: {}", self.report_name, self.period.label())
    }

    /// Public link for an artifact when the reports directory is served.
    pub fn artifact_url(base: Option<&str>, artifact: &RenderedArtifact) -> Option<String> {
        base.filter(|b| !b.is_empty())
            .map(|b| format!("{}/{}", b.trim_end_matches('/'), artifact.file_name))
    }
}

/// A way of getting reports to people.
#[async_trait]
pub trait DeliveryChannel: Send + Sync {
    /// The method this channel serves.
    fn method(&self) -> DeliveryMethod;

    /// Deliver every artifact in the payload. Fails as a whole.
    async fn deliver(&self, payload: &DeliveryPayload) -> Result<()>;
}

/// `1536` → `1.5 KB`.
pub fn human_size(bytes: usize) -> String {
    const UNITS: [&str; 3] = ["KB", "MB", "GB"];
    if bytes < 1024 {
        return format!("{bytes} B");
    }
    let mut value = bytes as f64 / 1024.0;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    format!("{value:.1} {}", UNITS[unit])
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;
    use chrono::TimeZone;
    use ledgerlens_render::ArtifactKind;
    use std::path::PathBuf;

    pub fn payload(recipients: &[&str]) -> DeliveryPayload {
        let end = Utc.with_ymd_and_hms(2026, 10, 1, 0, 0, 0).unwrap();
        let start = Utc.with_ymd_and_hms(2026, 9, 1, 0, 0, 0).unwrap();
        DeliveryPayload {
            report_name: "Monthly Revenue".into(),
            schedule_id: "sched-1".into(),
            period: DateRange::new(start, end).unwrap(),
            generated_at: end,
            recipients: recipients.iter().map(|r| r.to_string()).collect(),
            artifacts: vec![
                RenderedArtifact {
                    kind: ArtifactKind::Pdf,
                    file_name: "monthly_revenue_report_20261001_000000_000.pdf".into(),
                    path: PathBuf::from("/tmp/monthly_revenue_report_20261001_000000_000.pdf"),
                    bytes: b"%PDF-1.4 test".to_vec(),
                },
                RenderedArtifact {
                    kind: ArtifactKind::Xlsx,
                    file_name: "monthly_revenue_report_20261001_000000_000.xlsx".into(),
                    path: PathBuf::from("/tmp/monthly_revenue_report_20261001_000000_000.xlsx"),
                    bytes: vec![b'P', b'K', 3, 4],
                },
            ],
        }
    }
}
