//! Paginated document backend — writes PDF 1.4 directly.
//!
//! Layout runs first into per-page operation lists, so page numbers are known
//! before anything is serialized. That lets the table of contents and the
//! "Page N of M" footer be filled in after the body is laid out.
//!
//! Fonts are the standard Helvetica pair (no embedding); text is encoded as
//! WinAnsi, anything outside Latin-1 degrades to `?`.

use chrono::{DateTime, Utc};
use ledgerlens_core::document::format_value;
use ledgerlens_core::{
    CellValue, Document, MetricCard, Result, Section, SectionContent, TableContent, TrendDirection,
};
use std::fmt::Write as _;

use crate::RenderOptions;
use crate::chart::{Rgb, RenderedChart, series_color, zlib};

const PAGE_W: f32 = 595.0;
const PAGE_H: f32 = 842.0;
const MARGIN: f32 = 50.0;
const CONTENT_W: f32 = PAGE_W - 2.0 * MARGIN;
const BOTTOM: f32 = 64.0;
const FOOTER_Y: f32 = 32.0;

const INK: Rgb = [0x22, 0x22, 0x22];
const MUTED: Rgb = [0x77, 0x77, 0x77];
const BRAND: Rgb = [0x1F, 0x4E, 0x79];
const WHITE: Rgb = [0xFF, 0xFF, 0xFF];
const ZEBRA: Rgb = [0xF4, 0xF6, 0xF8];
const TOTALS: Rgb = [0xDD, 0xE8, 0xF3];
const CARD: Rgb = [0xF7, 0xF9, 0xFC];
const CARD_EDGE: Rgb = [0xD0, 0xD7, 0xE1];
const UP: Rgb = [0x2E, 0x9E, 0x5B];
const DOWN: Rgb = [0xC0, 0x39, 0x2B];
const ALERT_BG: Rgb = [0xFD, 0xEC, 0xEA];
const ALERT_INK: Rgb = [0x9B, 0x1C, 0x1C];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Font {
    Regular,
    Bold,
}

impl Font {
    fn resource(&self) -> &'static str {
        match self {
            Font::Regular => "F1",
            Font::Bold => "F2",
        }
    }
}

#[derive(Debug, Clone)]
enum Op {
    Text { x: f32, y: f32, size: f32, font: Font, color: Rgb, text: String },
    Fill { x: f32, y: f32, w: f32, h: f32, color: Rgb },
    Stroke { x: f32, y: f32, w: f32, h: f32, color: Rgb },
    Line { x1: f32, y1: f32, x2: f32, y2: f32, width: f32, color: Rgb },
    Triangle { points: [(f32, f32); 3], color: Rgb },
    Image { index: usize, x: f32, y: f32, w: f32, h: f32 },
}

#[derive(Default)]
struct Page {
    ops: Vec<Op>,
}

/// Top-down cursor over a growing list of pages.
struct Layout {
    pages: Vec<Page>,
    y: f32,
}

impl Layout {
    fn new() -> Self {
        Self {
            pages: vec![Page::default()],
            y: PAGE_H - MARGIN,
        }
    }

    fn new_page(&mut self) {
        self.pages.push(Page::default());
        self.y = PAGE_H - MARGIN;
    }

    /// Break the page if `h` does not fit. Returns true on a break.
    fn ensure(&mut self, h: f32) -> bool {
        if self.y - h < BOTTOM {
            self.new_page();
            true
        } else {
            false
        }
    }

    fn page(&self) -> usize {
        self.pages.len() - 1
    }

    fn push(&mut self, op: Op) {
        if let Some(page) = self.pages.last_mut() {
            page.ops.push(op);
        }
    }

    fn text(&mut self, x: f32, size: f32, font: Font, color: Rgb, text: &str) {
        let y = self.y;
        self.push(Op::Text { x, y, size, font, color, text: text.to_string() });
    }

    /// Wrapped paragraph at the left margin, advancing the cursor.
    fn paragraph(&mut self, text: &str, size: f32, font: Font, color: Rgb) {
        let leading = size * 1.4;
        for line in wrap(text, size, font, CONTENT_W) {
            self.ensure(leading);
            self.y -= leading;
            self.text(MARGIN, size, font, color, &line);
        }
    }

    fn rule(&mut self, color: Rgb) {
        let y = self.y;
        self.push(Op::Line { x1: MARGIN, y1: y, x2: PAGE_W - MARGIN, y2: y, width: 0.8, color });
    }
}

/// Render a document to PDF bytes.
pub fn render_pdf(doc: &Document, charts: &[RenderedChart], opts: &RenderOptions) -> Result<Vec<u8>> {
    let mut layout = Layout::new();
    draw_cover(&mut layout, doc, opts);

    // Contents: reserve one line per entry now, fill page numbers later.
    layout.ensure(40.0);
    layout.y -= 28.0;
    layout.text(MARGIN, 14.0, Font::Bold, BRAND, "Contents");
    layout.y -= 6.0;
    let mut toc: Vec<(usize, f32, String)> = Vec::new();
    let mut entries: Vec<String> = doc
        .sections
        .iter()
        .enumerate()
        .map(|(i, s)| format!("{}. {}", i + 1, s.title))
        .collect();
    if !charts.is_empty() {
        entries.push("Chart appendix".to_string());
    }
    for entry in entries {
        layout.ensure(16.0);
        layout.y -= 16.0;
        toc.push((layout.page(), layout.y, entry));
    }

    let mut targets = Vec::with_capacity(toc.len());
    for (i, section) in doc.sections.iter().enumerate() {
        targets.push(draw_section(&mut layout, i + 1, section, &opts.currency));
    }
    if !charts.is_empty() {
        targets.push(draw_chart_appendix(&mut layout, charts));
    }

    for ((page, y, label), target) in toc.into_iter().zip(targets) {
        let number = (target + 1).to_string();
        let num_w = text_width(&number, 10.0, Font::Regular);
        let label = truncate(&label, 10.0, Font::Regular, CONTENT_W - num_w - 20.0);
        let ops = &mut layout.pages[page].ops;
        ops.push(Op::Text { x: MARGIN + 8.0, y, size: 10.0, font: Font::Regular, color: INK, text: label });
        ops.push(Op::Text {
            x: PAGE_W - MARGIN - num_w,
            y,
            size: 10.0,
            font: Font::Regular,
            color: MUTED,
            text: number,
        });
    }

    let total = layout.pages.len();
    let footer_title = truncate(&doc.title, 8.0, Font::Regular, CONTENT_W / 2.0);
    for (i, page) in layout.pages.iter_mut().enumerate() {
        let label = format!("Page {} of {}", i + 1, total);
        let w = text_width(&label, 8.0, Font::Regular);
        page.ops.push(Op::Line {
            x1: MARGIN,
            y1: FOOTER_Y + 12.0,
            x2: PAGE_W - MARGIN,
            y2: FOOTER_Y + 12.0,
            width: 0.5,
            color: CARD_EDGE,
        });
        page.ops.push(Op::Text { x: MARGIN, y: FOOTER_Y, size: 8.0, font: Font::Regular, color: MUTED, text: footer_title.clone() });
        page.ops.push(Op::Text { x: PAGE_W - MARGIN - w, y: FOOTER_Y, size: 8.0, font: Font::Regular, color: MUTED, text: label });
    }

    serialize(doc, &layout.pages, charts)
}

fn draw_cover(layout: &mut Layout, doc: &Document, opts: &RenderOptions) {
    if let Some(company) = opts.company_name.as_deref().filter(|c| !c.is_empty()) {
        layout.y -= 10.0;
        layout.text(MARGIN, 10.0, Font::Bold, MUTED, &company.to_uppercase());
        layout.y -= 8.0;
    }
    layout.y -= 6.0;
    layout.paragraph(&doc.title, 24.0, Font::Bold, BRAND);
    if !doc.subtitle.is_empty() {
        layout.y -= 4.0;
        layout.paragraph(&doc.subtitle, 12.0, Font::Regular, MUTED);
    }
    layout.y -= 8.0;
    layout.paragraph(&format!("Reporting period: {}", doc.period.label()), 10.0, Font::Regular, INK);
    layout.paragraph(&format!("Generated: {}", stamp(doc.generated_at)), 10.0, Font::Regular, INK);
    layout.y -= 10.0;
    layout.rule(BRAND);
}

/// Draw one section; returns the page index its heading landed on.
fn draw_section(layout: &mut Layout, number: usize, section: &Section, currency: &str) -> usize {
    layout.ensure(60.0);
    layout.y -= 34.0;
    let page = layout.page();
    let heading = format!("{number}. {}", section.title);
    layout.text(MARGIN, 14.0, Font::Bold, BRAND, &truncate(&heading, 14.0, Font::Bold, CONTENT_W));
    layout.y -= 6.0;
    layout.rule(CARD_EDGE);
    layout.y -= 6.0;

    match &section.content {
        SectionContent::Text { text } => {
            for para in text.split('\n') {
                layout.paragraph(para, 10.0, Font::Regular, INK);
            }
        }
        SectionContent::Table(table) => draw_table(layout, table, currency),
        SectionContent::Metrics { metrics } => draw_cards(layout, metrics, currency),
        SectionContent::Error { error } => draw_alert(layout, error),
    }
    page
}

fn draw_alert(layout: &mut Layout, message: &str) {
    let lines = wrap(&format!("Data unavailable: {message}"), 10.0, Font::Regular, CONTENT_W - 20.0);
    let h = lines.len() as f32 * 14.0 + 12.0;
    layout.ensure(h);
    let top = layout.y;
    layout.push(Op::Fill { x: MARGIN, y: top - h, w: CONTENT_W, h, color: ALERT_BG });
    layout.y -= 6.0;
    for line in lines {
        layout.y -= 14.0;
        layout.text(MARGIN + 10.0, 10.0, Font::Regular, ALERT_INK, &line);
    }
    layout.y = top - h;
}

const ROW_H: f32 = 18.0;
const CELL_SIZE: f32 = 9.0;

fn draw_table(layout: &mut Layout, table: &TableContent, currency: &str) {
    let cols = table.column_count();
    if cols == 0 {
        layout.paragraph("No data for this period.", 10.0, Font::Regular, MUTED);
        return;
    }
    let col_w = CONTENT_W / cols as f32;
    let header: Vec<CellValue> = table.headers.iter().cloned().map(CellValue::Text).collect();

    layout.ensure(ROW_H * 2.0);
    draw_row(layout, &header, col_w, currency, Font::Bold, WHITE, Some(BRAND));
    if table.rows.is_empty() {
        layout.paragraph("No data for this period.", 10.0, Font::Regular, MUTED);
    }
    for (i, row) in table.rows.iter().enumerate() {
        if layout.ensure(ROW_H) {
            draw_row(layout, &header, col_w, currency, Font::Bold, WHITE, Some(BRAND));
        }
        let fill = (i % 2 == 1).then_some(ZEBRA);
        draw_row(layout, row, col_w, currency, Font::Regular, INK, fill);
    }
    if let Some(totals) = &table.totals {
        if layout.ensure(ROW_H) {
            draw_row(layout, &header, col_w, currency, Font::Bold, WHITE, Some(BRAND));
        }
        let y = layout.y;
        layout.push(Op::Line { x1: MARGIN, y1: y, x2: PAGE_W - MARGIN, y2: y, width: 1.2, color: BRAND });
        draw_row(layout, totals, col_w, currency, Font::Bold, INK, Some(TOTALS));
    }
}

fn draw_row(
    layout: &mut Layout,
    cells: &[CellValue],
    col_w: f32,
    currency: &str,
    font: Font,
    color: Rgb,
    fill: Option<Rgb>,
) {
    let top = layout.y;
    if let Some(bg) = fill {
        layout.push(Op::Fill { x: MARGIN, y: top - ROW_H, w: CONTENT_W, h: ROW_H, color: bg });
    }
    let baseline = top - ROW_H + 5.5;
    for (c, cell) in cells.iter().enumerate() {
        let text = truncate(&cell.display(currency), CELL_SIZE, font, col_w - 8.0);
        let col_x = MARGIN + c as f32 * col_w;
        let x = if cell.as_f64().is_some() {
            col_x + col_w - 4.0 - text_width(&text, CELL_SIZE, font)
        } else {
            col_x + 4.0
        };
        layout.push(Op::Text { x, y: baseline, size: CELL_SIZE, font, color, text });
    }
    layout.y = top - ROW_H;
}

const CARDS_PER_ROW: usize = 3;
const CARD_H: f32 = 62.0;
const CARD_GAP: f32 = 10.0;

fn draw_cards(layout: &mut Layout, metrics: &[MetricCard], currency: &str) {
    if metrics.is_empty() {
        layout.paragraph("No figures for this period.", 10.0, Font::Regular, MUTED);
        return;
    }
    let card_w = (CONTENT_W - CARD_GAP * (CARDS_PER_ROW - 1) as f32) / CARDS_PER_ROW as f32;
    for row in metrics.chunks(CARDS_PER_ROW) {
        layout.ensure(CARD_H + CARD_GAP);
        layout.y -= CARD_GAP;
        let top = layout.y;
        for (i, card) in row.iter().enumerate() {
            let x = MARGIN + i as f32 * (card_w + CARD_GAP);
            let bottom = top - CARD_H;
            layout.push(Op::Fill { x, y: bottom, w: card_w, h: CARD_H, color: CARD });
            layout.push(Op::Stroke { x, y: bottom, w: card_w, h: CARD_H, color: CARD_EDGE });
            layout.push(Op::Text {
                x: x + 10.0,
                y: top - 16.0,
                size: 9.0,
                font: Font::Regular,
                color: MUTED,
                text: truncate(&card.label, 9.0, Font::Regular, card_w - 20.0),
            });
            layout.push(Op::Text {
                x: x + 10.0,
                y: top - 38.0,
                size: 16.0,
                font: Font::Bold,
                color: INK,
                text: truncate(&format_value(card.value, card.format, currency), 16.0, Font::Bold, card_w - 20.0),
            });
            if let Some(trend) = card.trend {
                let (color, points) = match trend.direction {
                    TrendDirection::Up => (UP, [(x + 10.0, top - 55.0), (x + 18.0, top - 55.0), (x + 14.0, top - 48.0)]),
                    TrendDirection::Down => (DOWN, [(x + 10.0, top - 48.0), (x + 18.0, top - 48.0), (x + 14.0, top - 55.0)]),
                    TrendDirection::Flat => (MUTED, [(x + 10.0, top - 48.0), (x + 10.0, top - 55.0), (x + 17.0, top - 51.5)]),
                };
                layout.push(Op::Triangle { points, color });
                layout.push(Op::Text {
                    x: x + 22.0,
                    y: top - 55.0,
                    size: 9.0,
                    font: Font::Regular,
                    color,
                    text: format!("{:+.1}%", trend.percentage),
                });
            }
        }
        layout.y = top - CARD_H;
    }
}

fn draw_chart_appendix(layout: &mut Layout, charts: &[RenderedChart]) -> usize {
    layout.new_page();
    let page = layout.page();
    layout.y -= 14.0;
    layout.text(MARGIN, 16.0, Font::Bold, BRAND, "Chart appendix");
    layout.y -= 8.0;
    layout.rule(CARD_EDGE);

    for (index, chart) in charts.iter().enumerate() {
        let img = &chart.image;
        let w = CONTENT_W.min(img.width as f32);
        let h = (w * img.height as f32 / img.width as f32).min(300.0);
        let w = h * img.width as f32 / img.height as f32;
        let legend_lines = chart.spec.datasets.len().max(1) as f32;
        layout.ensure(30.0 + h + legend_lines * 14.0 + 30.0);

        layout.y -= 26.0;
        layout.text(MARGIN, 12.0, Font::Bold, INK, &truncate(&chart.spec.title, 12.0, Font::Bold, CONTENT_W));
        layout.y -= 8.0 + h;
        let y = layout.y;
        layout.push(Op::Image { index, x: MARGIN, y, w, h });

        let pie = chart.spec.kind == ledgerlens_core::ChartType::Pie;
        let keys: Vec<String> = if pie {
            chart.spec.labels.clone()
        } else {
            chart.spec.datasets.iter().map(|d| d.label.clone()).collect()
        };
        if chart.spec.options.show_legend {
            for (i, key) in keys.iter().enumerate() {
                layout.ensure(14.0);
                layout.y -= 14.0;
                let y = layout.y;
                layout.push(Op::Fill { x: MARGIN, y: y - 1.0, w: 8.0, h: 8.0, color: series_color(i) });
                layout.text(MARGIN + 14.0, 9.0, Font::Regular, INK, &truncate(key, 9.0, Font::Regular, CONTENT_W - 14.0));
            }
        }
        if !pie {
            layout.y -= 4.0;
            layout.paragraph(&format!("Categories: {}", chart.spec.labels.join(", ")), 8.0, Font::Regular, MUTED);
        }
    }
    page
}

fn stamp(at: DateTime<Utc>) -> String {
    at.format("%Y-%m-%d %H:%M UTC").to_string()
}

// ─── Text metrics ─────────────────────────────────────────

/// Helvetica advance widths for ASCII 32..=126, in 1/1000 em.
const HELVETICA_WIDTHS: [u16; 95] = [
    278, 278, 355, 556, 556, 889, 667, 191, 333, 333, 389, 584, 278, 333, 278, 278, // ' '..'/'
    556, 556, 556, 556, 556, 556, 556, 556, 556, 556, // '0'..'9'
    278, 278, 584, 584, 584, 556, 1015, // ':'..'@'
    667, 667, 722, 722, 667, 611, 778, 722, 278, 500, 667, 556, 833, // 'A'..'M'
    722, 778, 667, 778, 722, 667, 611, 722, 667, 944, 667, 667, 611, // 'N'..'Z'
    278, 278, 278, 469, 556, 333, // '['..'`'
    556, 556, 500, 556, 556, 278, 556, 556, 222, 222, 500, 222, 833, // 'a'..'m'
    556, 556, 556, 556, 333, 500, 278, 556, 500, 722, 500, 500, 500, // 'n'..'z'
    334, 260, 334, 584, // '{'..'~'
];

fn char_width(c: char) -> u16 {
    let code = c as u32;
    if (32..=126).contains(&code) {
        HELVETICA_WIDTHS[(code - 32) as usize]
    } else {
        556
    }
}

fn text_width(text: &str, size: f32, font: Font) -> f32 {
    let units: u32 = text.chars().map(|c| char_width(c) as u32).sum();
    let bold = if font == Font::Bold { 1.06 } else { 1.0 };
    units as f32 * size / 1000.0 * bold
}

fn wrap(text: &str, size: f32, font: Font, max_w: f32) -> Vec<String> {
    let mut lines = Vec::new();
    let mut current = String::new();
    for word in text.split_whitespace() {
        let candidate = if current.is_empty() {
            word.to_string()
        } else {
            format!("{current} {word}")
        };
        if text_width(&candidate, size, font) <= max_w || current.is_empty() {
            current = candidate;
        } else {
            lines.push(std::mem::take(&mut current));
            current = word.to_string();
        }
    }
    if !current.is_empty() {
        lines.push(truncate(&current, size, font, max_w));
    }
    if lines.is_empty() {
        lines.push(String::new());
    }
    lines
}

fn truncate(text: &str, size: f32, font: Font, max_w: f32) -> String {
    if text_width(text, size, font) <= max_w {
        return text.to_string();
    }
    let mut out = String::new();
    for c in text.chars() {
        out.push(c);
        if text_width(&out, size, font) + text_width("...", size, font) > max_w {
            out.pop();
            break;
        }
    }
    out.push_str("...");
    out
}

// ─── Serialization ────────────────────────────────────────

/// Escape into a PDF literal string body, WinAnsi-encoded.
fn pdf_string(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '(' | ')' | '\\' => {
                out.push('\\');
                out.push(c);
            }
            ' '..='~' => out.push(c),
            '\u{A0}'..='\u{FF}' => {
                let _ = write!(out, "\\{:03o}", c as u32);
            }
            _ => out.push('?'),
        }
    }
    out
}

fn rgb(color: Rgb) -> String {
    format!(
        "{:.3} {:.3} {:.3}",
        color[0] as f32 / 255.0,
        color[1] as f32 / 255.0,
        color[2] as f32 / 255.0
    )
}

fn content_stream(page: &Page) -> String {
    let mut s = String::new();
    for op in &page.ops {
        let _ = match op {
            Op::Text { x, y, size, font, color, text } => writeln!(
                s,
                "BT /{} {size:.1} Tf {} rg {x:.2} {y:.2} Td ({}) Tj ET",
                font.resource(),
                rgb(*color),
                pdf_string(text)
            ),
            Op::Fill { x, y, w, h, color } => {
                writeln!(s, "{} rg {x:.2} {y:.2} {w:.2} {h:.2} re f", rgb(*color))
            }
            Op::Stroke { x, y, w, h, color } => {
                writeln!(s, "{} RG 0.8 w {x:.2} {y:.2} {w:.2} {h:.2} re S", rgb(*color))
            }
            Op::Line { x1, y1, x2, y2, width, color } => writeln!(
                s,
                "{} RG {width:.2} w {x1:.2} {y1:.2} m {x2:.2} {y2:.2} l S",
                rgb(*color)
            ),
            Op::Triangle { points, color } => writeln!(
                s,
                "{} rg {:.2} {:.2} m {:.2} {:.2} l {:.2} {:.2} l h f",
                rgb(*color),
                points[0].0,
                points[0].1,
                points[1].0,
                points[1].1,
                points[2].0,
                points[2].1
            ),
            Op::Image { index, x, y, w, h } => {
                writeln!(s, "q {w:.2} 0 0 {h:.2} {x:.2} {y:.2} cm /Im{index} Do Q")
            }
        };
    }
    s
}

/// Sequential object writer; object `n` must be written n-th.
struct PdfWriter {
    buf: Vec<u8>,
    offsets: Vec<usize>,
}

impl PdfWriter {
    fn new() -> Self {
        let mut buf = Vec::new();
        buf.extend_from_slice(b"%PDF-1.4\n%\xE2\xE3\xCF\xD3\n");
        Self { buf, offsets: Vec::new() }
    }

    fn object(&mut self, body: &str) {
        self.offsets.push(self.buf.len());
        let id = self.offsets.len();
        self.buf.extend_from_slice(format!("{id} 0 obj\n{body}\nendobj\n").as_bytes());
    }

    fn stream(&mut self, dict: &str, data: &[u8]) {
        self.offsets.push(self.buf.len());
        let id = self.offsets.len();
        self.buf.extend_from_slice(
            format!("{id} 0 obj\n<< {dict} /Length {} >>\nstream\n", data.len()).as_bytes(),
        );
        self.buf.extend_from_slice(data);
        self.buf.extend_from_slice(b"\nendstream\nendobj\n");
    }

    fn finish(mut self, root: usize, info: usize) -> Vec<u8> {
        let xref = self.buf.len();
        let count = self.offsets.len() + 1;
        let mut tail = format!("xref\n0 {count}\n0000000000 65535 f \n");
        for off in &self.offsets {
            let _ = write!(tail, "{off:010} 00000 n \n");
        }
        let _ = write!(
            tail,
            "trailer\n<< /Size {count} /Root {root} 0 R /Info {info} 0 R >>\nstartxref\n{xref}\n%%EOF\n"
        );
        self.buf.extend_from_slice(tail.as_bytes());
        self.buf
    }
}

fn serialize(doc: &Document, pages: &[Page], charts: &[RenderedChart]) -> Result<Vec<u8>> {
    // 1 catalog, 2 pages, 3-4 fonts, 5 info, images, then (page, content) pairs.
    let first_image = 6;
    let first_page = first_image + charts.len();
    let page_ids: Vec<usize> = (0..pages.len()).map(|i| first_page + i * 2).collect();

    let mut w = PdfWriter::new();
    w.object("<< /Type /Catalog /Pages 2 0 R >>");
    let kids: Vec<String> = page_ids.iter().map(|id| format!("{id} 0 R")).collect();
    w.object(&format!(
        "<< /Type /Pages /Kids [{}] /Count {} >>",
        kids.join(" "),
        pages.len()
    ));
    w.object("<< /Type /Font /Subtype /Type1 /BaseFont /Helvetica /Encoding /WinAnsiEncoding >>");
    w.object("<< /Type /Font /Subtype /Type1 /BaseFont /Helvetica-Bold /Encoding /WinAnsiEncoding >>");
    w.object(&format!(
        "<< /Title ({}) /Producer (LedgerLens) /CreationDate (D:{}Z) >>",
        pdf_string(&doc.title),
        doc.generated_at.format("%Y%m%d%H%M%S")
    ));

    for chart in charts {
        let data = zlib(&chart.image.pixels)?;
        w.stream(
            &format!(
                "/Type /XObject /Subtype /Image /Width {} /Height {} /ColorSpace /DeviceRGB /BitsPerComponent 8 /Filter /FlateDecode",
                chart.image.width, chart.image.height
            ),
            &data,
        );
    }

    let xobjects: String = (0..charts.len())
        .map(|i| format!("/Im{i} {} 0 R", first_image + i))
        .collect::<Vec<_>>()
        .join(" ");
    for (page, id) in pages.iter().zip(&page_ids) {
        w.object(&format!(
            "<< /Type /Page /Parent 2 0 R /MediaBox [0 0 {PAGE_W} {PAGE_H}] /Resources << /Font << /F1 3 0 R /F2 4 0 R >> /XObject << {xobjects} >> >> /Contents {} 0 R >>",
            id + 1
        ));
        let content = zlib(content_stream(page).as_bytes())?;
        w.stream("/Filter /FlateDecode", &content);
    }

    Ok(w.finish(1, 5))
}
