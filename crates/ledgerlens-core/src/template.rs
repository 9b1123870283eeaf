//! Report templates — which metrics go into a report and how they are charted.

use serde::{Deserialize, Serialize};

use crate::error::{ReportError, Result};

/// Template category. Must agree with the [`TemplateConfig`] variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TemplateCategory {
    Financial,
    Customer,
    Operational,
    Custom,
}

impl TemplateCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            TemplateCategory::Financial => "financial",
            TemplateCategory::Customer => "customer",
            TemplateCategory::Operational => "operational",
            TemplateCategory::Custom => "custom",
        }
    }
}

/// Category-specific settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TemplateConfig {
    Financial {
        #[serde(default = "default_currency")]
        currency: String,
        #[serde(default)]
        include_forecast: bool,
    },
    Customer {
        #[serde(default)]
        segments: Vec<String>,
    },
    Operational {
        #[serde(default)]
        locations: Vec<String>,
    },
    Custom,
}

fn default_currency() -> String {
    "USD".into()
}

impl TemplateConfig {
    pub fn category(&self) -> TemplateCategory {
        match self {
            TemplateConfig::Financial { .. } => TemplateCategory::Financial,
            TemplateConfig::Customer { .. } => TemplateCategory::Customer,
            TemplateConfig::Operational { .. } => TemplateCategory::Operational,
            TemplateConfig::Custom => TemplateCategory::Custom,
        }
    }
}

/// How a metric section is visualised.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChartType {
    #[default]
    Table,
    Bar,
    Line,
    Area,
    Pie,
}

impl ChartType {
    /// Table is rendered inline, everything else becomes a chart.
    pub fn is_chart(&self) -> bool {
        !matches!(self, ChartType::Table)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ChartType::Table => "table",
            ChartType::Bar => "bar",
            ChartType::Line => "line",
            ChartType::Area => "area",
            ChartType::Pie => "pie",
        }
    }
}

/// Data filters passed through to the metric provider.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportFilters {
    #[serde(default)]
    pub locations: Vec<String>,
    #[serde(default)]
    pub categories: Vec<String>,
    #[serde(default)]
    pub currency: Option<String>,
}

impl ReportFilters {
    /// Non-empty fields of `overrides` replace ours.
    pub fn merged_with(&self, overrides: &ReportFilters) -> ReportFilters {
        ReportFilters {
            locations: if overrides.locations.is_empty() {
                self.locations.clone()
            } else {
                overrides.locations.clone()
            },
            categories: if overrides.categories.is_empty() {
                self.categories.clone()
            } else {
                overrides.categories.clone()
            },
            currency: overrides.currency.clone().or_else(|| self.currency.clone()),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.locations.is_empty() && self.categories.is_empty() && self.currency.is_none()
    }

    /// Flatten into query pairs (`location=a&location=b&...`).
    pub fn to_query_pairs(&self) -> Vec<(String, String)> {
        let mut pairs = Vec::new();
        for l in &self.locations {
            pairs.push(("location".to_string(), l.clone()));
        }
        for c in &self.categories {
            pairs.push(("category".to_string(), c.clone()));
        }
        if let Some(cur) = &self.currency {
            pairs.push(("currency".to_string(), cur.clone()));
        }
        pairs
    }
}

/// A reusable report definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportTemplate {
    pub id: String,
    pub name: String,
    pub category: TemplateCategory,
    #[serde(default)]
    pub description: Option<String>,
    /// Metric ids resolved through the metric registry, in section order.
    pub metrics: Vec<String>,
    /// Chart type per metric, positionally. Missing entries fall back to
    /// the last configured type, or [`ChartType::Table`] when none.
    #[serde(default)]
    pub chart_types: Vec<ChartType>,
    #[serde(default)]
    pub filters: ReportFilters,
    pub config: TemplateConfig,
}

impl ReportTemplate {
    /// Build and validate a template.
    pub fn new(id: &str, name: &str, config: TemplateConfig, metrics: &[&str]) -> Result<Self> {
        let template = Self {
            id: id.to_string(),
            name: name.to_string(),
            category: config.category(),
            description: None,
            metrics: metrics.iter().map(|m| m.to_string()).collect(),
            chart_types: Vec::new(),
            filters: ReportFilters::default(),
            config,
        };
        template.validate()?;
        Ok(template)
    }

    pub fn with_chart_types(mut self, chart_types: &[ChartType]) -> Self {
        self.chart_types = chart_types.to_vec();
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.id.trim().is_empty() {
            return Err(ReportError::Validation("Template id is required".into()));
        }
        if self.name.trim().is_empty() {
            return Err(ReportError::Validation(format!(
                "Template {} has no name",
                self.id
            )));
        }
        if self.metrics.is_empty() {
            return Err(ReportError::Validation(format!(
                "Template {} lists no metrics",
                self.id
            )));
        }
        if self.metrics.iter().any(|m| m.trim().is_empty()) {
            return Err(ReportError::Validation(format!(
                "Template {} contains an empty metric id",
                self.id
            )));
        }
        if self.config.category() != self.category {
            return Err(ReportError::Validation(format!(
                "Template {} is category '{}' but carries '{}' settings",
                self.id,
                self.category.as_str(),
                self.config.category().as_str()
            )));
        }
        Ok(())
    }

    pub fn chart_type_for(&self, index: usize) -> ChartType {
        self.chart_types
            .get(index)
            .or(self.chart_types.last())
            .copied()
            .unwrap_or_default()
    }

    /// Currency for money values: explicit filter, then financial settings.
    pub fn currency(&self) -> String {
        if let Some(c) = &self.filters.currency {
            return c.clone();
        }
        match &self.config {
            TemplateConfig::Financial { currency, .. } => currency.clone(),
            _ => default_currency(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_validates() {
        assert!(ReportTemplate::new("t1", "Revenue", TemplateConfig::Custom, &[]).is_err());
        assert!(ReportTemplate::new("", "Revenue", TemplateConfig::Custom, &["mrr"]).is_err());
        let t = ReportTemplate::new("t1", "Revenue", TemplateConfig::Custom, &["mrr"]).unwrap();
        assert_eq!(t.category, TemplateCategory::Custom);
    }

    #[test]
    fn test_category_mismatch_rejected() {
        let mut t = ReportTemplate::new("t1", "Revenue", TemplateConfig::Custom, &["mrr"]).unwrap();
        t.category = TemplateCategory::Financial;
        assert!(matches!(t.validate(), Err(ReportError::Validation(_))));
    }

    #[test]
    fn test_chart_type_fallbacks() {
        let t = ReportTemplate::new("t1", "R", TemplateConfig::Custom, &["a", "b", "c"]).unwrap();
        assert_eq!(t.chart_type_for(0), ChartType::Table);

        let t = t.with_chart_types(&[ChartType::Bar, ChartType::Line]);
        assert_eq!(t.chart_type_for(0), ChartType::Bar);
        assert_eq!(t.chart_type_for(2), ChartType::Line);
    }

    #[test]
    fn test_filters_merge() {
        let base = ReportFilters {
            locations: vec!["north".into()],
            categories: vec!["food".into()],
            currency: Some("EUR".into()),
        };
        let over = ReportFilters {
            locations: vec!["south".into()],
            ..Default::default()
        };
        let merged = base.merged_with(&over);
        assert_eq!(merged.locations, vec!["south".to_string()]);
        assert_eq!(merged.categories, vec!["food".to_string()]);
        assert_eq!(merged.currency.as_deref(), Some("EUR"));
    }

    #[test]
    fn test_config_deserializes_tagged() {
        let cfg: TemplateConfig =
            serde_json::from_str(r#"{"kind":"financial","currency":"GBP"}"#).unwrap();
        assert_eq!(cfg.category(), TemplateCategory::Financial);
        let t = ReportTemplate::new("t", "F", cfg, &["revenue_summary"]).unwrap();
        assert_eq!(t.currency(), "GBP");
    }
}
