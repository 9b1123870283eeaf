//! HTTP metric provider — fetches named lookups from the analytics service.

use async_trait::async_trait;
use ledgerlens_core::config::ProviderConfig;
use ledgerlens_core::{DateRange, MetricProvider, ReportError, ReportFilters, Result};
use std::time::Duration;

/// `GET {base_url}/metrics/{metric}?start=..&end=..&location=..`
pub struct HttpMetricProvider {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    timeout: Duration,
}

impl HttpMetricProvider {
    pub fn new(config: &ProviderConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone().filter(|k| !k.is_empty()),
            timeout: Duration::from_secs(config.timeout_secs),
        }
    }

    pub fn endpoint(&self, metric: &str) -> String {
        format!("{}/metrics/{metric}", self.base_url)
    }

    pub fn query(range: &DateRange, filters: &ReportFilters) -> Vec<(String, String)> {
        let mut pairs = vec![
            ("start".to_string(), range.start.to_rfc3339()),
            ("end".to_string(), range.end.to_rfc3339()),
        ];
        pairs.extend(filters.to_query_pairs());
        pairs
    }
}

#[async_trait]
impl MetricProvider for HttpMetricProvider {
    fn name(&self) -> &str {
        "http"
    }

    async fn fetch(
        &self,
        metric: &str,
        range: &DateRange,
        filters: &ReportFilters,
    ) -> Result<serde_json::Value> {
        if !metric.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-') {
            return Err(ReportError::Provider(format!("invalid metric id '{metric}'")));
        }
        let mut req = self
            .client
            .get(self.endpoint(metric))
            .query(&Self::query(range, filters))
            .timeout(self.timeout);
        if let Some(key) = &self.api_key {
            req = req.bearer_auth(key);
        }

        let resp = req
            .send()
            .await
            .map_err(|e| ReportError::Provider(format!("{metric}: request failed: {e}")))?;
        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(ReportError::Provider(format!("{metric}: {status}: {body}")));
        }
        resp.json()
            .await
            .map_err(|e| ReportError::Provider(format!("{metric}: invalid JSON: {e}")))
    }
}
