//! Spreadsheet backend — one worksheet per data section.

use ledgerlens_core::{
    CellValue, Document, MetricCard, ReportError, Result, SectionContent, TableContent,
};
use rust_xlsxwriter::{Color, Format, FormatBorder, Image, Workbook, Worksheet, XlsxError};
use std::collections::HashSet;

use crate::RenderOptions;
use crate::chart::{ImageFormat, RenderedChart, validate_image};

const SHEET_NAME_MAX: usize = 31;
const SUMMARY_SHEET: &str = "Summary";
const CHARTS_SHEET: &str = "Charts";

fn xlsx_err(e: XlsxError) -> ReportError {
    ReportError::Render(format!("workbook: {e}"))
}

/// Cell formats shared across sheets.
struct Styles {
    title: Format,
    label: Format,
    header: Format,
    totals_text: Format,
    number: Format,
    decimal: Format,
    currency: Format,
    percent: Format,
    notice: Format,
}

impl Styles {
    fn new(currency: &str) -> Self {
        let currency_fmt = if currency.is_empty() {
            "#,##0.00".to_string()
        } else {
            format!("\"{currency}\" #,##0.00")
        };
        Self {
            title: Format::new().set_bold().set_font_size(16),
            label: Format::new().set_bold(),
            header: Format::new()
                .set_bold()
                .set_font_color(Color::White)
                .set_background_color(Color::RGB(0x1F4E79))
                .set_border(FormatBorder::Thin),
            totals_text: Format::new()
                .set_bold()
                .set_background_color(Color::RGB(0xDDE8F3))
                .set_border_top(FormatBorder::Medium),
            number: Format::new().set_num_format("#,##0"),
            decimal: Format::new().set_num_format("#,##0.00"),
            currency: Format::new().set_num_format(&currency_fmt),
            percent: Format::new().set_num_format("0.0%"),
            notice: Format::new().set_italic().set_font_color(Color::RGB(0x9B1C1C)),
        }
    }

    fn for_cell(&self, cell: &CellValue) -> Format {
        match cell {
            CellValue::Number(v) if v.fract() == 0.0 => self.number.clone(),
            CellValue::Number(_) => self.decimal.clone(),
            CellValue::Currency(_) => self.currency.clone(),
            CellValue::Percent(_) => self.percent.clone(),
            CellValue::Text(_) | CellValue::Empty => Format::new(),
        }
    }
}

/// Excel sheet names: at most 31 chars, none of `[]:*?/\`, no leading or
/// trailing apostrophe, unique ignoring case.
pub fn sheet_name(raw: &str, taken: &mut HashSet<String>) -> String {
    let cleaned: String = raw
        .chars()
        .map(|c| if "[]:*?/\\".contains(c) || c.is_control() { ' ' } else { c })
        .collect();
    let cleaned = cleaned.split_whitespace().collect::<Vec<_>>().join(" ");
    let cleaned = cleaned.trim_matches('\'').to_string();
    let base = if cleaned.is_empty() || cleaned.eq_ignore_ascii_case("history") {
        "Sheet".to_string()
    } else {
        cleaned
    };

    let mut candidate: String = base.chars().take(SHEET_NAME_MAX).collect();
    let mut n = 2;
    while taken.contains(&candidate.to_lowercase()) {
        let suffix = format!(" ({n})");
        let keep = SHEET_NAME_MAX - suffix.chars().count();
        candidate = format!("{}{suffix}", base.chars().take(keep).collect::<String>());
        n += 1;
    }
    taken.insert(candidate.to_lowercase());
    candidate
}

/// Render a document to XLSX bytes.
pub fn render_workbook(doc: &Document, charts: &[RenderedChart], opts: &RenderOptions) -> Result<Vec<u8>> {
    let styles = Styles::new(&opts.currency);
    let mut workbook = Workbook::new();
    let mut taken = HashSet::new();
    taken.insert(SUMMARY_SHEET.to_lowercase());
    taken.insert(CHARTS_SHEET.to_lowercase());

    // Sheet names first so the summary can index them.
    let mut index: Vec<(String, Option<String>)> = Vec::new();
    for section in &doc.sections {
        let sheet = match section.content {
            SectionContent::Table(_) | SectionContent::Metrics { .. } => {
                Some(sheet_name(&section.title, &mut taken))
            }
            _ => None,
        };
        index.push((section.title.clone(), sheet));
    }

    {
        let summary = workbook.add_worksheet();
        summary.set_name(SUMMARY_SHEET).map_err(xlsx_err)?;
        write_summary(summary, doc, opts, &index, !charts.is_empty(), &styles)?;
    }

    for (section, (_, sheet)) in doc.sections.iter().zip(&index) {
        let Some(name) = sheet else { continue };
        let ws = workbook.add_worksheet();
        ws.set_name(name).map_err(xlsx_err)?;
        match &section.content {
            SectionContent::Table(table) => write_table(ws, table, &styles)?,
            SectionContent::Metrics { metrics } => write_metrics(ws, metrics, &styles)?,
            _ => {}
        }
        ws.autofit();
    }

    if !charts.is_empty() {
        let ws = workbook.add_worksheet();
        ws.set_name(CHARTS_SHEET).map_err(xlsx_err)?;
        write_charts(ws, charts, &styles)?;
    }

    workbook.save_to_buffer().map_err(xlsx_err)
}

fn write_summary(
    ws: &mut Worksheet,
    doc: &Document,
    opts: &RenderOptions,
    index: &[(String, Option<String>)],
    has_charts: bool,
    styles: &Styles,
) -> Result<()> {
    ws.write_string_with_format(0, 0, &doc.title, &styles.title).map_err(xlsx_err)?;
    ws.write_string(1, 0, &doc.subtitle).map_err(xlsx_err)?;

    let mut row = 3;
    let mut facts = vec![
        ("Reporting period", doc.period.label()),
        ("Generated", doc.generated_at.format("%Y-%m-%d %H:%M UTC").to_string()),
    ];
    if let Some(company) = opts.company_name.as_deref().filter(|c| !c.is_empty()) {
        facts.push(("Prepared by", company.to_string()));
    }
    for (label, value) in facts {
        ws.write_string_with_format(row, 0, label, &styles.label).map_err(xlsx_err)?;
        ws.write_string(row, 1, &value).map_err(xlsx_err)?;
        row += 1;
    }

    row += 1;
    ws.write_string_with_format(row, 0, "Section", &styles.header).map_err(xlsx_err)?;
    ws.write_string_with_format(row, 1, "Sheet", &styles.header).map_err(xlsx_err)?;
    row += 1;
    for ((title, sheet), section) in index.iter().zip(&doc.sections) {
        ws.write_string(row, 0, title).map_err(xlsx_err)?;
        match (&section.content, sheet) {
            (SectionContent::Error { error }, _) => {
                ws.write_string_with_format(row, 1, format!("Data unavailable: {error}"), &styles.notice)
                    .map_err(xlsx_err)?;
            }
            (SectionContent::Text { text }, _) => {
                ws.write_string(row, 1, text).map_err(xlsx_err)?;
            }
            (_, Some(name)) => {
                ws.write_string(row, 1, name).map_err(xlsx_err)?;
            }
            _ => {}
        }
        row += 1;
    }
    if has_charts {
        ws.write_string(row, 0, "Charts").map_err(xlsx_err)?;
        ws.write_string(row, 1, CHARTS_SHEET).map_err(xlsx_err)?;
    }
    ws.set_column_width(0, 28).map_err(xlsx_err)?;
    ws.set_column_width(1, 48).map_err(xlsx_err)?;
    Ok(())
}

fn write_cell(ws: &mut Worksheet, row: u32, col: u16, cell: &CellValue, format: &Format) -> Result<()> {
    let written = match cell {
        CellValue::Text(s) => ws.write_string_with_format(row, col, s, format),
        CellValue::Number(v) | CellValue::Currency(v) => ws.write_number_with_format(row, col, *v, format),
        // Stored as a fraction so Excel's % format shows the same figure.
        CellValue::Percent(v) => ws.write_number_with_format(row, col, *v / 100.0, format),
        CellValue::Empty => ws.write_blank(row, col, format),
    };
    written.map(|_| ()).map_err(xlsx_err)
}

fn write_table(ws: &mut Worksheet, table: &TableContent, styles: &Styles) -> Result<()> {
    for (c, header) in table.headers.iter().enumerate() {
        ws.write_string_with_format(0, c as u16, header, &styles.header).map_err(xlsx_err)?;
    }
    let mut row = 1u32;
    for cells in &table.rows {
        for (c, cell) in cells.iter().enumerate() {
            write_cell(ws, row, c as u16, cell, &styles.for_cell(cell))?;
        }
        row += 1;
    }
    if let Some(totals) = &table.totals {
        for (c, cell) in totals.iter().enumerate() {
            let format = match cell {
                CellValue::Text(_) | CellValue::Empty => styles.totals_text.clone(),
                _ => styles
                    .for_cell(cell)
                    .set_bold()
                    .set_background_color(Color::RGB(0xDDE8F3))
                    .set_border_top(FormatBorder::Medium),
            };
            write_cell(ws, row, c as u16, cell, &format)?;
        }
    }
    if table.column_count() > 0 {
        ws.set_freeze_panes(1, 0).map_err(xlsx_err)?;
    }
    Ok(())
}

fn write_metrics(ws: &mut Worksheet, metrics: &[MetricCard], styles: &Styles) -> Result<()> {
    for (c, header) in ["Metric", "Value", "Change"].iter().enumerate() {
        ws.write_string_with_format(0, c as u16, *header, &styles.header).map_err(xlsx_err)?;
    }
    for (i, card) in metrics.iter().enumerate() {
        let row = i as u32 + 1;
        ws.write_string(row, 0, &card.label).map_err(xlsx_err)?;
        let cell = match card.format {
            ledgerlens_core::ValueFormat::Number => CellValue::Number(card.value),
            ledgerlens_core::ValueFormat::Currency => CellValue::Currency(card.value),
            ledgerlens_core::ValueFormat::Percent => CellValue::Percent(card.value),
        };
        write_cell(ws, row, 1, &cell, &styles.for_cell(&cell))?;
        if let Some(trend) = card.trend {
            ws.write_number_with_format(row, 2, trend.percentage / 100.0, &styles.percent)
                .map_err(xlsx_err)?;
        }
    }
    Ok(())
}

fn write_charts(ws: &mut Worksheet, charts: &[RenderedChart], styles: &Styles) -> Result<()> {
    let mut row = 0u32;
    for chart in charts {
        validate_image(&chart.png, ImageFormat::Png)?;
        ws.write_string_with_format(row, 0, &chart.spec.title, &styles.label).map_err(xlsx_err)?;
        let mut image = Image::new_from_buffer(&chart.png).map_err(xlsx_err)?;
        image = image.set_scale_width(0.75).set_scale_height(0.75);
        ws.insert_image(row + 1, 0, &image).map_err(xlsx_err)?;
        // Default row height is 20px.
        row += (chart.image.height as f64 * 0.75 / 20.0).ceil() as u32 + 3;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use calamine::{Data, Range, Reader, Xlsx};
    use chrono::{TimeZone, Utc};
    use std::io::Cursor;
    use ledgerlens_core::{ChartSpec, ChartType, DateRange, Section, ValueFormat};

    fn doc() -> Document {
        let end = Utc.with_ymd_and_hms(2026, 10, 1, 0, 0, 0).unwrap();
        let start = Utc.with_ymd_and_hms(2026, 9, 1, 0, 0, 0).unwrap();
        let mut d = Document::new("Revenue", "", DateRange::new(start, end).unwrap(), end);
        d.sections.push(Section::new(
            "Headline",
            SectionContent::Metrics {
                metrics: vec![MetricCard::new("Revenue", 1000.0, ValueFormat::Currency).with_trend(5.0)],
            },
        ));
        d.sections.push(Section::new(
            "Top products",
            SectionContent::Table(TableContent {
                headers: vec!["Product".into(), "Units".into()],
                rows: vec![
                    vec![CellValue::Text("A".into()), CellValue::Number(3.0)],
                    vec![CellValue::Text("B".into()), CellValue::Number(5.0)],
                ],
                totals: Some(vec![CellValue::Text("Total".into()), CellValue::Number(8.0)]),
            }),
        ));
        d.sections.push(Section::new("Missing", SectionContent::error("Unknown metric: nope")));
        d
    }

    #[test]
    fn test_sheet_name_rules() {
        let mut taken = HashSet::new();
        assert_eq!(sheet_name("Sales: by [region]/day", &mut taken), "Sales by region day");
        let long = "x".repeat(40);
        let first = sheet_name(&long, &mut taken);
        assert_eq!(first.chars().count(), 31);
        let second = sheet_name(&long, &mut taken);
        assert_eq!(second.chars().count(), 31);
        assert!(second.ends_with(" (2)"));
        assert_eq!(sheet_name("'quoted'", &mut taken), "quoted");
        assert_eq!(sheet_name("***", &mut taken), "Sheet");
        assert_eq!(sheet_name("QUOTED", &mut taken), "QUOTED (2)");
    }

    fn open(bytes: Vec<u8>) -> Xlsx<Cursor<Vec<u8>>> {
        Xlsx::new(Cursor::new(bytes)).unwrap()
    }

    fn text(range: &Range<Data>, row: u32, col: u32) -> String {
        match range.get_value((row, col)) {
            Some(Data::String(s)) => s.clone(),
            other => panic!("expected text at ({row}, {col}), got {other:?}"),
        }
    }

    fn number(range: &Range<Data>, row: u32, col: u32) -> f64 {
        match range.get_value((row, col)) {
            Some(Data::Float(v)) => *v,
            Some(Data::Int(v)) => *v as f64,
            other => panic!("expected a number at ({row}, {col}), got {other:?}"),
        }
    }

    #[test]
    fn test_workbook_reads_back_sheets_index_and_totals() {
        let bytes = render_workbook(&doc(), &[], &RenderOptions::default()).unwrap();
        let mut wb = open(bytes);
        assert_eq!(wb.sheet_names(), vec!["Summary", "Headline", "Top products"]);

        let summary = wb.worksheet_range("Summary").unwrap();
        assert_eq!(text(&summary, 0, 0), "Revenue");
        assert_eq!(text(&summary, 3, 0), "Reporting period");
        assert_eq!(text(&summary, 4, 0), "Generated");
        assert_eq!(text(&summary, 4, 1), "2026-10-01 00:00 UTC");
        assert_eq!((text(&summary, 6, 0), text(&summary, 6, 1)), ("Section".into(), "Sheet".into()));
        assert_eq!((text(&summary, 7, 0), text(&summary, 7, 1)), ("Headline".into(), "Headline".into()));
        assert_eq!(text(&summary, 8, 1), "Top products");
        assert_eq!(text(&summary, 9, 0), "Missing");
        assert_eq!(text(&summary, 9, 1), "Data unavailable: Unknown metric: nope");

        let headline = wb.worksheet_range("Headline").unwrap();
        assert_eq!(text(&headline, 1, 0), "Revenue");
        assert_eq!(number(&headline, 1, 1), 1000.0);
        assert!((number(&headline, 1, 2) - 0.05).abs() < 1e-9);

        let table = wb.worksheet_range("Top products").unwrap();
        assert_eq!(text(&table, 0, 0), "Product");
        assert_eq!(text(&table, 0, 1), "Units");
        assert_eq!(number(&table, 1, 1), 3.0);
        assert_eq!(number(&table, 2, 1), 5.0);
        assert_eq!(text(&table, 3, 0), "Total");
        assert_eq!(number(&table, 3, 1), 8.0);
    }

    #[test]
    fn test_workbook_with_chart_indexes_charts_sheet() {
        let mut d = doc();
        d.sections.push(Section::new(
            "Top products",
            SectionContent::Table(TableContent {
                headers: vec!["Region".into()],
                rows: vec![vec![CellValue::Text("EU".into())]],
                totals: None,
            }),
        ));
        let spec = ChartSpec::from_section(&d.sections[1], ChartType::Bar).unwrap();
        let chart = RenderedChart::draw(&spec).unwrap();
        let opts = RenderOptions { company_name: Some("Acme".into()), ..RenderOptions::default() };
        let mut wb = open(render_workbook(&d, &[chart], &opts).unwrap());
        assert_eq!(
            wb.sheet_names(),
            vec!["Summary", "Headline", "Top products", "Top products (2)", "Charts"]
        );

        let summary = wb.worksheet_range("Summary").unwrap();
        // The company line pushes the index down one row.
        assert_eq!((text(&summary, 5, 0), text(&summary, 5, 1)), ("Prepared by".into(), "Acme".into()));
        assert_eq!(text(&summary, 11, 1), "Top products (2)");
        assert_eq!((text(&summary, 12, 0), text(&summary, 12, 1)), ("Charts".into(), "Charts".into()));
        assert_eq!(text(&wb.worksheet_range("Charts").unwrap(), 0, 0), spec.title);
    }
}
