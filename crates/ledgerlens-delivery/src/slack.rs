//! Slack delivery via an incoming webhook. Slack webhooks cannot carry
//! files, so the message lists the artifacts and links them when the
//! reports directory is served somewhere.

use async_trait::async_trait;
use ledgerlens_core::config::SlackConfig;
use ledgerlens_core::{DeliveryMethod, ReportError, Result};
use std::time::Duration;

use crate::channel::{DeliveryChannel, DeliveryPayload, human_size};

const CHANNEL: &str = "slack";

pub struct SlackChannel {
    client: reqwest::Client,
    webhook_url: String,
    link_base_url: Option<String>,
    timeout: Duration,
}

impl SlackChannel {
    pub fn new(config: &SlackConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            webhook_url: config.webhook_url.clone(),
            link_base_url: config.link_base_url.clone(),
            timeout: Duration::from_secs(config.timeout_secs),
        }
    }

    /// Message body in Slack mrkdwn.
    pub fn message(&self, payload: &DeliveryPayload) -> serde_json::Value {
        let mut text = format!(
            "📊 *{}*\n_{}_",
            escape_mrkdwn(&payload.report_name),
            payload.period.label()
        );
        for a in &payload.artifacts {
            let size = human_size(a.bytes.len());
            match DeliveryPayload::artifact_url(self.link_base_url.as_deref(), a) {
                Some(url) => text.push_str(&format!("\n• <{url}|{}> ({size})", a.file_name)),
                None => text.push_str(&format!("\n• {} ({size})", a.file_name)),
            }
        }
        serde_json::json!({ "text": text })
    }
}

/// Slack treats `&`, `<` and `>` as control characters.
fn escape_mrkdwn(s: &str) -> String {
    s.replace('&', "&amp;").replace('<', "&lt;").replace('>', "&gt;")
}

#[async_trait]
impl DeliveryChannel for SlackChannel {
    fn method(&self) -> DeliveryMethod {
        DeliveryMethod::Slack
    }

    async fn deliver(&self, payload: &DeliveryPayload) -> Result<()> {
        let resp = self
            .client
            .post(&self.webhook_url)
            .json(&self.message(payload))
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| ReportError::delivery(CHANNEL, format!("send failed: {e}")))?;

        if resp.status().is_success() {
            tracing::info!("✅ Slack message sent: {}", payload.report_name);
            Ok(())
        } else {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            Err(ReportError::delivery(CHANNEL, format!("webhook error {status}: {body}")))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::fixtures;

    fn channel(link: Option<&str>) -> SlackChannel {
        SlackChannel::new(&SlackConfig {
            webhook_url: "http://127.0.0.1:9/hook".into(),
            link_base_url: link.map(String::from),
            timeout_secs: 1,
        })
    }

    #[test]
    fn test_message_lists_artifacts() {
        let mut payload = fixtures::payload(&[]);
        payload.report_name = "P&L <draft>".into();
        let text = channel(None).message(&payload)["text"].as_str().unwrap().to_string();
        assert!(text.contains("P&amp;L &lt;draft&gt;"));
        for a in &payload.artifacts {
            assert!(text.contains(&a.file_name));
        }
        assert!(!text.contains("<http"));
    }

    #[test]
    fn test_message_links_when_served() {
        let payload = fixtures::payload(&[]);
        let text = channel(Some("https://files.test/r")).message(&payload)["text"]
            .as_str()
            .unwrap()
            .to_string();
        assert!(text.contains(&format!("<https://files.test/r/{}|", payload.artifacts[0].file_name)));
    }

    #[tokio::test]
    async fn test_unreachable_webhook_is_a_delivery_error() {
        let err = channel(None).deliver(&fixtures::payload(&[])).await.unwrap_err();
        assert!(matches!(err, ReportError::Delivery { ref channel, .. } if channel == "slack"));
    }
}
