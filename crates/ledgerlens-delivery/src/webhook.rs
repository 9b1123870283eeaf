//! Generic HTTP webhook delivery — POSTs a JSON description of the run.

use async_trait::async_trait;
use ledgerlens_core::config::WebhookConfig;
use ledgerlens_core::{DeliveryMethod, ReportError, Result};
use std::collections::BTreeMap;
use std::time::Duration;

use crate::channel::{DeliveryChannel, DeliveryPayload};

const CHANNEL: &str = "webhook";

pub struct WebhookChannel {
    client: reqwest::Client,
    default_url: Option<String>,
    headers: BTreeMap<String, String>,
    link_base_url: Option<String>,
    timeout: Duration,
}

impl WebhookChannel {
    pub fn new(config: &WebhookConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            default_url: config.url.clone(),
            headers: config.headers.clone(),
            link_base_url: config.link_base_url.clone(),
            timeout: Duration::from_secs(config.timeout_secs),
        }
    }

    /// Schedule recipients are the target URLs; the configured URL is the
    /// fallback when a schedule lists none.
    pub fn targets(&self, payload: &DeliveryPayload) -> Result<Vec<String>> {
        let targets: Vec<String> = if payload.recipients.is_empty() {
            self.default_url.iter().cloned().collect()
        } else {
            payload.recipients.clone()
        };
        if targets.is_empty() {
            return Err(ReportError::delivery(CHANNEL, "no webhook URL configured"));
        }
        for url in &targets {
            if !(url.starts_with("http://") || url.starts_with("https://")) {
                return Err(ReportError::delivery(CHANNEL, format!("'{url}' is not an http(s) URL")));
            }
        }
        Ok(targets)
    }

    pub fn body(&self, payload: &DeliveryPayload) -> serde_json::Value {
        let artifacts: Vec<serde_json::Value> = payload
            .artifacts
            .iter()
            .map(|a| {
                serde_json::json!({
                    "file_name": a.file_name,
                    "kind": a.kind,
                    "mime_type": a.mime_type(),
                    "size_bytes": a.bytes.len(),
                    "url": DeliveryPayload::artifact_url(self.link_base_url.as_deref(), a),
                })
            })
            .collect();
        serde_json::json!({
            "event": "report.generated",
            "report_name": payload.report_name,
            "schedule_id": payload.schedule_id,
            "period": { "start": payload.period.start.to_rfc3339(), "end": payload.period.end.to_rfc3339() },
            "generated_at": payload.generated_at.to_rfc3339(),
            "artifacts": artifacts,
        })
    }
}

#[async_trait]
impl DeliveryChannel for WebhookChannel {
    fn method(&self) -> DeliveryMethod {
        DeliveryMethod::Webhook
    }

    async fn deliver(&self, payload: &DeliveryPayload) -> Result<()> {
        let targets = self.targets(payload)?;
        let body = self.body(payload);
        for url in &targets {
            let mut req = self.client.post(url).json(&body).timeout(self.timeout);
            for (key, value) in &self.headers {
                req = req.header(key.as_str(), value.as_str());
            }
            let resp = req
                .send()
                .await
                .map_err(|e| ReportError::delivery(CHANNEL, format!("send to {url} failed: {e}")))?;
            if !resp.status().is_success() {
                let status = resp.status();
                return Err(ReportError::delivery(CHANNEL, format!("{url} answered {status}")));
            }
            tracing::info!("✅ Webhook delivered to {}: {}", url, payload.report_name);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::fixtures;

    fn channel(url: Option<&str>) -> WebhookChannel {
        WebhookChannel::new(&WebhookConfig {
            url: url.map(String::from),
            headers: BTreeMap::new(),
            link_base_url: None,
            timeout_secs: 1,
        })
    }

    #[test]
    fn test_targets() {
        let payload = fixtures::payload(&[]);
        assert!(channel(None).targets(&payload).is_err());
        assert_eq!(
            channel(Some("https://hooks.test/a")).targets(&payload).unwrap(),
            vec!["https://hooks.test/a"]
        );
        let explicit = fixtures::payload(&["https://hooks.test/b"]);
        assert_eq!(
            channel(Some("https://hooks.test/a")).targets(&explicit).unwrap(),
            vec!["https://hooks.test/b"]
        );
        assert!(channel(None).targets(&fixtures::payload(&["file:///etc/passwd"])).is_err());
    }

    #[test]
    fn test_body_describes_run() {
        let payload = fixtures::payload(&[]);
        let body = channel(None).body(&payload);
        assert_eq!(body["schedule_id"], "sched-1");
        assert_eq!(body["artifacts"].as_array().unwrap().len(), 2);
        assert_eq!(body["artifacts"][0]["kind"], "pdf");
        assert!(body["artifacts"][0]["url"].is_null());
    }
}
