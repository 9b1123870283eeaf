//! Format-independent document model shared by every renderer.
//!
//! The assembler fills a [`Document`]; the PDF and workbook backends read the
//! same value, so the two outputs can never disagree on content.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::schedule::DateRange;
use crate::template::ChartType;

/// An assembled report, rebuilt on every run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub title: String,
    pub subtitle: String,
    pub period: DateRange,
    pub generated_at: DateTime<Utc>,
    pub sections: Vec<Section>,
    pub charts: Vec<ChartSpec>,
}

impl Document {
    pub fn new(title: &str, subtitle: &str, period: DateRange, generated_at: DateTime<Utc>) -> Self {
        Self {
            title: title.to_string(),
            subtitle: subtitle.to_string(),
            period,
            generated_at,
            sections: Vec::new(),
            charts: Vec::new(),
        }
    }

    /// Sections carrying an error marker instead of data.
    pub fn error_count(&self) -> usize {
        self.sections
            .iter()
            .filter(|s| matches!(s.content, SectionContent::Error { .. }))
            .count()
    }
}

/// Rendering shape of a section.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SectionKind {
    Text,
    Table,
    Metrics,
}

/// One titled block of a report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Section {
    pub title: String,
    /// Metric id this section was assembled from, if any.
    #[serde(default)]
    pub metric_id: Option<String>,
    #[serde(default)]
    pub chart_type: ChartType,
    pub content: SectionContent,
}

impl Section {
    pub fn new(title: &str, content: SectionContent) -> Self {
        Self {
            title: title.to_string(),
            metric_id: None,
            chart_type: ChartType::Table,
            content,
        }
    }

    /// Error markers render as text.
    pub fn kind(&self) -> SectionKind {
        match self.content {
            SectionContent::Text { .. } | SectionContent::Error { .. } => SectionKind::Text,
            SectionContent::Table(_) => SectionKind::Table,
            SectionContent::Metrics { .. } => SectionKind::Metrics,
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self.content, SectionContent::Error { .. })
    }
}

/// Section payload. `Error` is the inline marker left when a metric could
/// not be fetched, so the rest of the document still renders.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SectionContent {
    Text { text: String },
    Table(TableContent),
    Metrics { metrics: Vec<MetricCard> },
    Error { error: String },
}

impl SectionContent {
    pub fn error(message: impl Into<String>) -> Self {
        SectionContent::Error {
            error: message.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct TableContent {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<CellValue>>,
    #[serde(default)]
    pub totals: Option<Vec<CellValue>>,
}

impl TableContent {
    pub fn column_count(&self) -> usize {
        self.rows
            .iter()
            .map(|r| r.len())
            .chain(std::iter::once(self.headers.len()))
            .max()
            .unwrap_or(0)
    }
}

/// A typed table cell.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "format", content = "value", rename_all = "snake_case")]
pub enum CellValue {
    Text(String),
    Number(f64),
    Currency(f64),
    Percent(f64),
    Empty,
}

impl CellValue {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            CellValue::Number(v) | CellValue::Currency(v) | CellValue::Percent(v) => Some(*v),
            _ => None,
        }
    }

    pub fn display(&self, currency: &str) -> String {
        match self {
            CellValue::Text(s) => s.clone(),
            CellValue::Number(v) => format_value(*v, ValueFormat::Number, currency),
            CellValue::Currency(v) => format_value(*v, ValueFormat::Currency, currency),
            CellValue::Percent(v) => format_value(*v, ValueFormat::Percent, currency),
            CellValue::Empty => String::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueFormat {
    Number,
    Currency,
    Percent,
}

/// A labelled figure shown as a card in the metrics grid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricCard {
    pub label: String,
    pub value: f64,
    pub format: ValueFormat,
    #[serde(default)]
    pub trend: Option<Trend>,
}

impl MetricCard {
    pub fn new(label: &str, value: f64, format: ValueFormat) -> Self {
        Self {
            label: label.to_string(),
            value,
            format,
            trend: None,
        }
    }

    pub fn with_trend(mut self, growth_percent: f64) -> Self {
        self.trend = Some(Trend::from_growth(growth_percent));
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrendDirection {
    Up,
    Down,
    Flat,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Trend {
    pub direction: TrendDirection,
    pub percentage: f64,
}

impl Trend {
    pub fn from_growth(percent: f64) -> Self {
        let direction = if percent > 0.0 {
            TrendDirection::Up
        } else if percent < 0.0 {
            TrendDirection::Down
        } else {
            TrendDirection::Flat
        };
        Self {
            direction,
            percentage: percent,
        }
    }
}

/// Declarative chart description. Becomes pixels only in the rasterizer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChartSpec {
    #[serde(rename = "type")]
    pub kind: ChartType,
    pub title: String,
    pub labels: Vec<String>,
    pub datasets: Vec<Dataset>,
    #[serde(default)]
    pub options: ChartOptions,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dataset {
    pub label: String,
    pub data: Vec<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChartOptions {
    pub width: u32,
    pub height: u32,
    pub show_legend: bool,
}

impl Default for ChartOptions {
    fn default() -> Self {
        Self {
            width: 800,
            height: 400,
            show_legend: true,
        }
    }
}

impl ChartSpec {
    /// Derive a chart from a section's numeric data. Tables use the first
    /// column as labels and every numeric column as a dataset; metric grids
    /// become a single dataset of card values.
    pub fn from_section(section: &Section, kind: ChartType) -> Option<ChartSpec> {
        if !kind.is_chart() {
            return None;
        }
        let (labels, datasets) = match &section.content {
            SectionContent::Table(table) => {
                let labels: Vec<String> = table
                    .rows
                    .iter()
                    .map(|r| r.first().map(|c| c.display("")).unwrap_or_default())
                    .collect();
                let mut datasets = Vec::new();
                for col in 1..table.column_count() {
                    let data: Vec<f64> = table
                        .rows
                        .iter()
                        .map(|r| r.get(col).and_then(|c| c.as_f64()).unwrap_or(0.0))
                        .collect();
                    let numeric = table
                        .rows
                        .iter()
                        .any(|r| r.get(col).and_then(|c| c.as_f64()).is_some());
                    if numeric {
                        datasets.push(Dataset {
                            label: table.headers.get(col).cloned().unwrap_or_default(),
                            data,
                        });
                    }
                }
                (labels, datasets)
            }
            SectionContent::Metrics { metrics } => (
                metrics.iter().map(|m| m.label.clone()).collect(),
                vec![Dataset {
                    label: section.title.clone(),
                    data: metrics.iter().map(|m| m.value).collect(),
                }],
            ),
            _ => return None,
        };
        if labels.is_empty() || datasets.is_empty() {
            return None;
        }
        Some(ChartSpec {
            kind,
            title: section.title.clone(),
            labels,
            datasets,
            options: ChartOptions::default(),
        })
    }
}

/// Human formatting shared by both backends.
pub fn format_value(value: f64, format: ValueFormat, currency: &str) -> String {
    match format {
        ValueFormat::Number => {
            if value.fract() == 0.0 {
                group_thousands(value, 0)
            } else {
                group_thousands(value, 2)
            }
        }
        ValueFormat::Currency => {
            let amount = group_thousands(value, 2);
            if currency.is_empty() {
                amount
            } else {
                format!("{currency} {amount}")
            }
        }
        ValueFormat::Percent => format!("{value:.1}%"),
    }
}

fn group_thousands(value: f64, decimals: usize) -> String {
    let formatted = format!("{:.*}", decimals, value.abs());
    let (int_part, frac_part) = match formatted.split_once('.') {
        Some((i, f)) => (i, Some(f)),
        None => (formatted.as_str(), None),
    };
    let mut grouped = String::new();
    for (i, ch) in int_part.chars().enumerate() {
        if i > 0 && (int_part.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }
    let mut out = String::new();
    if value < 0.0 && formatted.chars().any(|c| c != '0' && c != '.') {
        out.push('-');
    }
    out.push_str(&grouped);
    if let Some(f) = frac_part {
        out.push('.');
        out.push_str(f);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_value() {
        assert_eq!(format_value(1234567.0, ValueFormat::Number, ""), "1,234,567");
        assert_eq!(format_value(1000.5, ValueFormat::Currency, "USD"), "USD 1,000.50");
        assert_eq!(format_value(-42.0, ValueFormat::Number, ""), "-42");
        assert_eq!(format_value(12.345, ValueFormat::Percent, ""), "12.3%");
    }

    #[test]
    fn test_error_marker_serializes_as_error_field() {
        let content = SectionContent::error("Unknown metric: X");
        let json = serde_json::to_value(&content).unwrap();
        assert_eq!(json["error"], "Unknown metric: X");
    }

    #[test]
    fn test_chart_from_table() {
        let section = Section::new(
            "Sales",
            SectionContent::Table(TableContent {
                headers: vec!["Location".into(), "Revenue".into(), "Note".into()],
                rows: vec![
                    vec![
                        CellValue::Text("North".into()),
                        CellValue::Currency(10.0),
                        CellValue::Text("ok".into()),
                    ],
                    vec![
                        CellValue::Text("South".into()),
                        CellValue::Currency(20.0),
                        CellValue::Empty,
                    ],
                ],
                totals: None,
            }),
        );
        assert!(ChartSpec::from_section(&section, ChartType::Table).is_none());
        let chart = ChartSpec::from_section(&section, ChartType::Bar).unwrap();
        assert_eq!(chart.labels, vec!["North".to_string(), "South".to_string()]);
        assert_eq!(chart.datasets.len(), 1);
        assert_eq!(chart.datasets[0].data, vec![10.0, 20.0]);
    }

    #[test]
    fn test_trend_direction() {
        assert_eq!(Trend::from_growth(5.0).direction, TrendDirection::Up);
        assert_eq!(Trend::from_growth(-1.0).direction, TrendDirection::Down);
        assert_eq!(Trend::from_growth(0.0).direction, TrendDirection::Flat);
    }
}
