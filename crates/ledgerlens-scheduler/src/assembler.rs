//! Document assembly — metric ids in, a format-independent document out.

use chrono::{DateTime, Utc};
use ledgerlens_core::{
    ChartSpec, DateRange, Document, MetricProvider, ReportFilters, ReportTemplate, Result, Section,
    SectionContent,
};
use std::collections::HashMap;
use std::sync::Arc;

use crate::handlers::{
    CHURN, CohortHandler, FORECAST, MRR, MetricContext, MetricHandler, REVENUE_SUMMARY,
    SALES_BY_LOCATION, TOP_PRODUCTS,
};

/// Metric id → handler.
#[derive(Default)]
pub struct MetricRegistry {
    handlers: HashMap<String, Arc<dyn MetricHandler>>,
}

impl MetricRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with every built-in metric.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register("revenue_summary", Arc::new(REVENUE_SUMMARY));
        registry.register("mrr", Arc::new(MRR));
        registry.register("cohort_analysis", Arc::new(CohortHandler));
        registry.register("churn", Arc::new(CHURN));
        registry.register("forecast", Arc::new(FORECAST));
        registry.register("top_products", Arc::new(TOP_PRODUCTS));
        registry.register("sales_by_location", Arc::new(SALES_BY_LOCATION));
        registry
    }

    pub fn register(&mut self, id: &str, handler: Arc<dyn MetricHandler>) {
        tracing::debug!("📐 Registered metric: {id} ({})", handler.title());
        self.handlers.insert(id.to_string(), handler);
    }

    pub fn get(&self, id: &str) -> Option<&Arc<dyn MetricHandler>> {
        self.handlers.get(id)
    }

    pub fn ids(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = self.handlers.keys().map(String::as_str).collect();
        ids.sort_unstable();
        ids
    }
}

pub struct DocumentAssembler {
    provider: Arc<dyn MetricProvider>,
    registry: Arc<MetricRegistry>,
}

impl DocumentAssembler {
    pub fn new(provider: Arc<dyn MetricProvider>, registry: Arc<MetricRegistry>) -> Self {
        Self { provider, registry }
    }

    pub fn registry(&self) -> &MetricRegistry {
        &self.registry
    }

    /// Build one section per metric, in template order. A metric that is
    /// unknown or fails becomes an error section; assembly itself only fails
    /// on an invalid template.
    pub async fn assemble(
        &self,
        template: &ReportTemplate,
        range: DateRange,
        filters: &ReportFilters,
        generated_at: DateTime<Utc>,
    ) -> Result<Document> {
        template.validate()?;
        let filters = template.filters.merged_with(filters);
        let subtitle = template
            .description
            .clone()
            .unwrap_or_else(|| format!("{} report", capitalize(template.category.as_str())));
        let mut doc = Document::new(&template.name, &subtitle, range, generated_at);

        for (i, metric_id) in template.metrics.iter().enumerate() {
            let chart_type = template.chart_type_for(i);
            let mut section = match self.registry.get(metric_id) {
                None => {
                    tracing::warn!("⚠️ Template {}: unknown metric '{metric_id}'", template.id);
                    Section::new(metric_id, SectionContent::error(format!("Unknown metric: {metric_id}")))
                }
                Some(handler) => {
                    let ctx = MetricContext {
                        provider: self.provider.as_ref(),
                        metric_id,
                        range,
                        filters: &filters,
                    };
                    match handler.build(&ctx).await {
                        Ok(content) => Section::new(handler.title(), content),
                        Err(e) => {
                            tracing::warn!("⚠️ Metric {metric_id} failed: {e}");
                            Section::new(handler.title(), SectionContent::error(format!("{metric_id}: {e}")))
                        }
                    }
                }
            };
            section.metric_id = Some(metric_id.clone());
            section.chart_type = chart_type;
            if let Some(chart) = ChartSpec::from_section(&section, chart_type) {
                doc.charts.push(chart);
            }
            doc.sections.push(section);
        }

        tracing::debug!(
            "🧩 Assembled '{}': {} section(s), {} chart(s), {} error(s)",
            doc.title,
            doc.sections.len(),
            doc.charts.len(),
            doc.error_count()
        );
        Ok(doc)
    }
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
