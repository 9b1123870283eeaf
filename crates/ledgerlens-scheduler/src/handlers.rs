//! Metric handlers — each turns one provider lookup into a section.
//!
//! Provider responses are JSON objects with camelCase keys. Card handlers
//! read named scalar fields; table handlers read a named list of rows.

use async_trait::async_trait;
use ledgerlens_core::{
    CellValue, DateRange, MetricCard, MetricProvider, ReportError, ReportFilters, Result,
    SectionContent, TableContent, ValueFormat,
};
use serde_json::Value;

/// Everything a handler needs for one lookup.
pub struct MetricContext<'a> {
    pub provider: &'a dyn MetricProvider,
    pub metric_id: &'a str,
    pub range: DateRange,
    pub filters: &'a ReportFilters,
}

impl MetricContext<'_> {
    pub async fn fetch(&self) -> Result<Value> {
        self.provider
            .fetch(self.metric_id, &self.range, self.filters)
            .await
    }

    /// Same lookup over the preceding period. A failure only costs the
    /// trend, so it is logged and swallowed.
    pub async fn fetch_previous(&self) -> Option<Value> {
        match self
            .provider
            .fetch(self.metric_id, &self.range.previous(), self.filters)
            .await
        {
            Ok(v) => Some(v),
            Err(e) => {
                tracing::warn!("⚠️ Prior-period lookup for {} failed: {e}", self.metric_id);
                None
            }
        }
    }
}

#[async_trait]
pub trait MetricHandler: Send + Sync {
    /// Section heading.
    fn title(&self) -> &str;

    async fn build(&self, ctx: &MetricContext<'_>) -> Result<SectionContent>;
}

/// Percentage change that never divides by zero: from nothing to something
/// is +100%, from nothing to nothing is 0%.
pub fn safe_growth(current: f64, previous: f64) -> f64 {
    if previous == 0.0 {
        if current > 0.0 { 100.0 } else { 0.0 }
    } else {
        (current - previous) / previous.abs() * 100.0
    }
}

/// Read a number, tolerating numeric strings.
fn number(v: &Value, key: &str) -> Option<f64> {
    match v.get(key)? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn text(v: &Value, key: &str) -> String {
    match v.get(key) {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Null) | None => String::new(),
        Some(other) => other.to_string(),
    }
}

/// The list under `key`, or the response itself when it is already a list.
fn list<'v>(metric: &str, v: &'v Value, key: &str) -> Result<&'v Vec<Value>> {
    v.get(key)
        .and_then(Value::as_array)
        .or_else(|| v.as_array())
        .ok_or_else(|| ReportError::Generation(format!("{metric} response has no '{key}' list")))
}

// ─── Cards ────────────────────────────────────────────────

pub struct CardField {
    pub key: &'static str,
    pub label: &'static str,
    pub format: ValueFormat,
    /// Compare against the previous period.
    pub trend: bool,
}

/// A grid of headline figures.
pub struct CardsHandler {
    pub title: &'static str,
    pub fields: &'static [CardField],
}

#[async_trait]
impl MetricHandler for CardsHandler {
    fn title(&self) -> &str {
        self.title
    }

    async fn build(&self, ctx: &MetricContext<'_>) -> Result<SectionContent> {
        let current = ctx.fetch().await?;
        let previous = if self.fields.iter().any(|f| f.trend) {
            ctx.fetch_previous().await
        } else {
            None
        };

        let mut metrics = Vec::new();
        for field in self.fields {
            let Some(value) = number(&current, field.key) else {
                continue;
            };
            let mut card = MetricCard::new(field.label, value, field.format);
            if field.trend
                && let Some(prev) = previous.as_ref().and_then(|p| number(p, field.key))
            {
                card = card.with_trend(safe_growth(value, prev));
            }
            metrics.push(card);
        }
        if metrics.is_empty() {
            let expected: Vec<&str> = self.fields.iter().map(|f| f.key).collect();
            return Err(ReportError::Generation(format!(
                "{} response carried none of: {}",
                ctx.metric_id,
                expected.join(", ")
            )));
        }
        Ok(SectionContent::Metrics { metrics })
    }
}

// ─── Tables ───────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnKind {
    Text,
    Number,
    Currency,
    Percent,
}

pub struct Column {
    pub key: &'static str,
    pub header: &'static str,
    pub kind: ColumnKind,
}

impl Column {
    fn cell(&self, row: &Value) -> CellValue {
        match self.kind {
            ColumnKind::Text => CellValue::Text(text(row, self.key)),
            ColumnKind::Number => number(row, self.key).map_or(CellValue::Empty, CellValue::Number),
            ColumnKind::Currency => {
                number(row, self.key).map_or(CellValue::Empty, CellValue::Currency)
            }
            ColumnKind::Percent => number(row, self.key).map_or(CellValue::Empty, CellValue::Percent),
        }
    }
}

/// Rows from a list in the response, with an optional summed totals row.
pub struct TableHandler {
    pub title: &'static str,
    pub list_key: &'static str,
    pub columns: &'static [Column],
    pub totals: bool,
}

#[async_trait]
impl MetricHandler for TableHandler {
    fn title(&self) -> &str {
        self.title
    }

    async fn build(&self, ctx: &MetricContext<'_>) -> Result<SectionContent> {
        let response = ctx.fetch().await?;
        let items = list(ctx.metric_id, &response, self.list_key)?;
        let rows: Vec<Vec<CellValue>> = items
            .iter()
            .map(|item| self.columns.iter().map(|c| c.cell(item)).collect())
            .collect();

        let totals = (self.totals && !rows.is_empty()).then(|| {
            self.columns
                .iter()
                .enumerate()
                .map(|(i, col)| match col.kind {
                    _ if i == 0 => CellValue::Text("Total".into()),
                    ColumnKind::Number | ColumnKind::Currency => {
                        let sum: f64 = rows.iter().filter_map(|r| r[i].as_f64()).sum();
                        if col.kind == ColumnKind::Number {
                            CellValue::Number(sum)
                        } else {
                            CellValue::Currency(sum)
                        }
                    }
                    ColumnKind::Text | ColumnKind::Percent => CellValue::Empty,
                })
                .collect()
        });

        Ok(SectionContent::Table(TableContent {
            headers: self.columns.iter().map(|c| c.header.to_string()).collect(),
            rows,
            totals,
        }))
    }
}

/// Retention triangle: one row per cohort, one column per period offset.
pub struct CohortHandler;

#[async_trait]
impl MetricHandler for CohortHandler {
    fn title(&self) -> &str {
        "Cohort Retention"
    }

    async fn build(&self, ctx: &MetricContext<'_>) -> Result<SectionContent> {
        let response = ctx.fetch().await?;
        let cohorts = list(ctx.metric_id, &response, "cohorts")?;
        let width = cohorts
            .iter()
            .filter_map(|c| c.get("retention").and_then(Value::as_array))
            .map(Vec::len)
            .max()
            .unwrap_or(0);

        let mut headers = vec!["Cohort".to_string(), "Customers".to_string()];
        headers.extend((0..width).map(|i| format!("Period {i}")));

        let rows = cohorts
            .iter()
            .map(|c| {
                let mut row = vec![
                    CellValue::Text(text(c, "cohort")),
                    number(c, "size").map_or(CellValue::Empty, CellValue::Number),
                ];
                let retention = c.get("retention").and_then(Value::as_array);
                for i in 0..width {
                    let cell = retention
                        .and_then(|r| r.get(i))
                        .and_then(Value::as_f64)
                        .map_or(CellValue::Empty, CellValue::Percent);
                    row.push(cell);
                }
                row
            })
            .collect();

        Ok(SectionContent::Table(TableContent {
            headers,
            rows,
            totals: None,
        }))
    }
}

// ─── Built-ins ────────────────────────────────────────────

pub const REVENUE_SUMMARY: CardsHandler = CardsHandler {
    title: "Revenue Summary",
    fields: &[
        CardField { key: "totalRevenue", label: "Total Revenue", format: ValueFormat::Currency, trend: true },
        CardField { key: "orderCount", label: "Orders", format: ValueFormat::Number, trend: true },
        CardField { key: "averageOrderValue", label: "Average Order", format: ValueFormat::Currency, trend: true },
        CardField { key: "refunds", label: "Refunds", format: ValueFormat::Currency, trend: false },
    ],
};

pub const MRR: CardsHandler = CardsHandler {
    title: "Monthly Recurring Revenue",
    fields: &[
        CardField { key: "mrr", label: "MRR", format: ValueFormat::Currency, trend: true },
        CardField { key: "newMrr", label: "New MRR", format: ValueFormat::Currency, trend: false },
        CardField { key: "churnedMrr", label: "Churned MRR", format: ValueFormat::Currency, trend: false },
        CardField { key: "activeSubscriptions", label: "Active Subscriptions", format: ValueFormat::Number, trend: true },
    ],
};

pub const CHURN: CardsHandler = CardsHandler {
    title: "Customer Churn",
    fields: &[
        CardField { key: "churnRate", label: "Churn Rate", format: ValueFormat::Percent, trend: true },
        CardField { key: "churnedCustomers", label: "Churned Customers", format: ValueFormat::Number, trend: false },
        CardField { key: "retainedCustomers", label: "Retained Customers", format: ValueFormat::Number, trend: false },
    ],
};

pub const FORECAST: TableHandler = TableHandler {
    title: "Revenue Forecast",
    list_key: "forecast",
    columns: &[
        Column { key: "period", header: "Period", kind: ColumnKind::Text },
        Column { key: "predicted", header: "Forecast", kind: ColumnKind::Currency },
        Column { key: "lower", header: "Low", kind: ColumnKind::Currency },
        Column { key: "upper", header: "High", kind: ColumnKind::Currency },
    ],
    totals: false,
};

pub const TOP_PRODUCTS: TableHandler = TableHandler {
    title: "Top Products",
    list_key: "products",
    columns: &[
        Column { key: "name", header: "Product", kind: ColumnKind::Text },
        Column { key: "quantity", header: "Units", kind: ColumnKind::Number },
        Column { key: "revenue", header: "Revenue", kind: ColumnKind::Currency },
    ],
    totals: true,
};

pub const SALES_BY_LOCATION: TableHandler = TableHandler {
    title: "Sales by Location",
    list_key: "locations",
    columns: &[
        Column { key: "location", header: "Location", kind: ColumnKind::Text },
        Column { key: "orders", header: "Orders", kind: ColumnKind::Number },
        Column { key: "revenue", header: "Revenue", kind: ColumnKind::Currency },
        Column { key: "share", header: "Share", kind: ColumnKind::Percent },
    ],
    totals: true,
};

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::StubProvider;
    use chrono::{TimeZone, Utc};
    use serde_json::json;

    fn range() -> DateRange {
        DateRange::new(
            Utc.with_ymd_and_hms(2026, 9, 1, 0, 0, 0).unwrap(),
            Utc.with_ymd_and_hms(2026, 10, 1, 0, 0, 0).unwrap(),
        )
        .unwrap()
    }

    async fn build(handler: &dyn MetricHandler, provider: &StubProvider, id: &str) -> Result<SectionContent> {
        let filters = ReportFilters::default();
        let ctx = MetricContext { provider, metric_id: id, range: range(), filters: &filters };
        handler.build(&ctx).await
    }

    #[test]
    fn test_safe_growth() {
        assert_eq!(safe_growth(50.0, 0.0), 100.0);
        assert_eq!(safe_growth(0.0, 0.0), 0.0);
        assert_eq!(safe_growth(150.0, 100.0), 50.0);
        assert_eq!(safe_growth(-50.0, -100.0), 50.0);
        assert_eq!(safe_growth(75.0, 100.0), -25.0);
    }

    #[tokio::test]
    async fn test_cards_skip_missing_fields_and_compute_trend() {
        let provider = StubProvider::fixed(json!({"totalRevenue": 1000, "orderCount": "40"}));
        let content = build(&REVENUE_SUMMARY, &provider, "revenue_summary").await.unwrap();
        let SectionContent::Metrics { metrics } = content else { panic!("expected cards") };
        assert_eq!(metrics.len(), 2);
        assert_eq!(metrics[0].value, 1000.0);
        assert_eq!(metrics[1].value, 40.0);
        // Same value both periods.
        assert_eq!(metrics[0].trend.unwrap().percentage, 0.0);
    }

    #[tokio::test]
    async fn test_cards_without_known_fields_fail() {
        let provider = StubProvider::fixed(json!({"unrelated": 1}));
        let err = build(&MRR, &provider, "mrr").await.unwrap_err();
        assert!(matches!(err, ReportError::Generation(_)));
    }

    #[tokio::test]
    async fn test_table_totals() {
        let provider = StubProvider::fixed(json!({"products": [
            {"name": "Latte", "quantity": 3, "revenue": 12.5},
            {"name": "Bagel", "quantity": 2, "revenue": 6.0},
        ]}));
        let content = build(&TOP_PRODUCTS, &provider, "top_products").await.unwrap();
        let SectionContent::Table(table) = content else { panic!("expected table") };
        assert_eq!(table.rows.len(), 2);
        assert_eq!(
            table.totals.unwrap(),
            vec![CellValue::Text("Total".into()), CellValue::Number(5.0), CellValue::Currency(18.5)]
        );
    }

    #[tokio::test]
    async fn test_cohort_width_follows_longest_retention() {
        let provider = StubProvider::fixed(json!({"cohorts": [
            {"cohort": "2026-07", "size": 100, "retention": [100, 70, 55]},
            {"cohort": "2026-08", "size": 80, "retention": [100, 65]},
        ]}));
        let content = build(&CohortHandler, &provider, "cohort_analysis").await.unwrap();
        let SectionContent::Table(table) = content else { panic!("expected table") };
        assert_eq!(table.headers.len(), 5);
        assert_eq!(table.rows[1][4], CellValue::Empty);
    }
}
