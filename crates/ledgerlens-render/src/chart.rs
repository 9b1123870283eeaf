//! Off-screen chart rasterizer.
//!
//! Turns a [`ChartSpec`] into an RGB pixel buffer (bar, line, area, pie).
//! Labels and legends are drawn by the document backends as real text, so
//! the raster holds only geometry. PNG encoding uses zlib and CRC-32 from
//! flate2.

use flate2::Compression;
use flate2::write::ZlibEncoder;
use ledgerlens_core::{ChartSpec, ChartType, ContentSafetyError, ReportError, Result};
use std::io::Write;

pub type Rgb = [u8; 3];

/// Series colours, cycled.
pub const PALETTE: [Rgb; 8] = [
    [0x1F, 0x4E, 0x79],
    [0xE0, 0x7B, 0x39],
    [0x3A, 0x9D, 0x5D],
    [0xC0, 0x39, 0x2B],
    [0x8E, 0x44, 0xAD],
    [0x16, 0xA0, 0x85],
    [0xF1, 0xC4, 0x0F],
    [0x7F, 0x8C, 0x8D],
];

const WHITE: Rgb = [0xFF, 0xFF, 0xFF];
const AXIS: Rgb = [0x44, 0x44, 0x44];
const GRID: Rgb = [0xE3, 0xE3, 0xE3];

const MAX_DIMENSION: u32 = 4096;

pub fn series_color(index: usize) -> Rgb {
    PALETTE[index % PALETTE.len()]
}

/// An RGB8 image.
#[derive(Debug, Clone, PartialEq)]
pub struct RasterImage {
    pub width: u32,
    pub height: u32,
    /// Row-major, 3 bytes per pixel.
    pub pixels: Vec<u8>,
}

impl RasterImage {
    fn new(width: u32, height: u32, background: Rgb) -> Self {
        let mut pixels = Vec::with_capacity((width * height * 3) as usize);
        for _ in 0..width * height {
            pixels.extend_from_slice(&background);
        }
        Self {
            width,
            height,
            pixels,
        }
    }

    fn put(&mut self, x: i64, y: i64, color: Rgb) {
        if x < 0 || y < 0 || x >= self.width as i64 || y >= self.height as i64 {
            return;
        }
        let idx = ((y as u32 * self.width + x as u32) * 3) as usize;
        self.pixels[idx..idx + 3].copy_from_slice(&color);
    }

    pub fn pixel(&self, x: u32, y: u32) -> Rgb {
        let idx = ((y * self.width + x) * 3) as usize;
        [self.pixels[idx], self.pixels[idx + 1], self.pixels[idx + 2]]
    }

    fn fill_rect(&mut self, x0: i64, y0: i64, x1: i64, y1: i64, color: Rgb) {
        for y in y0.min(y1)..y0.max(y1) {
            for x in x0.min(x1)..x0.max(x1) {
                self.put(x, y, color);
            }
        }
    }

    fn line(&mut self, x0: i64, y0: i64, x1: i64, y1: i64, thickness: i64, color: Rgb) {
        let (mut x, mut y) = (x0, y0);
        let dx = (x1 - x0).abs();
        let dy = -(y1 - y0).abs();
        let sx = if x0 < x1 { 1 } else { -1 };
        let sy = if y0 < y1 { 1 } else { -1 };
        let mut err = dx + dy;
        let half = thickness / 2;
        loop {
            self.fill_rect(x - half, y - half, x - half + thickness, y - half + thickness, color);
            if x == x1 && y == y1 {
                break;
            }
            let e2 = 2 * err;
            if e2 >= dy {
                err += dy;
                x += sx;
            }
            if e2 <= dx {
                err += dx;
                y += sy;
            }
        }
    }

    /// PNG encoding (colour type 2, no interlace, filter 0 on every row).
    pub fn to_png(&self) -> Result<Vec<u8>> {
        let mut raw = Vec::with_capacity(self.pixels.len() + self.height as usize);
        let stride = (self.width * 3) as usize;
        for row in self.pixels.chunks(stride) {
            raw.push(0);
            raw.extend_from_slice(row);
        }
        let idat = zlib(&raw)?;

        let mut ihdr = Vec::with_capacity(13);
        ihdr.extend_from_slice(&self.width.to_be_bytes());
        ihdr.extend_from_slice(&self.height.to_be_bytes());
        ihdr.extend_from_slice(&[8, 2, 0, 0, 0]);

        let mut png = Vec::with_capacity(idat.len() + 64);
        png.extend_from_slice(&PNG_SIGNATURE);
        write_chunk(&mut png, b"IHDR", &ihdr);
        write_chunk(&mut png, b"IDAT", &idat);
        write_chunk(&mut png, b"IEND", &[]);
        Ok(png)
    }
}

/// zlib-compress a buffer.
pub(crate) fn zlib(data: &[u8]) -> Result<Vec<u8>> {
    let mut enc = ZlibEncoder::new(Vec::new(), Compression::default());
    enc.write_all(data)?;
    Ok(enc.finish()?)
}

fn write_chunk(out: &mut Vec<u8>, kind: &[u8; 4], data: &[u8]) {
    out.extend_from_slice(&(data.len() as u32).to_be_bytes());
    out.extend_from_slice(kind);
    out.extend_from_slice(data);
    let mut crc = flate2::Crc::new();
    crc.update(kind);
    crc.update(data);
    out.extend_from_slice(&crc.sum().to_be_bytes());
}

// ─── Image validation ─────────────────────────────────────

pub const PNG_SIGNATURE: [u8; 8] = [0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];
pub const JPEG_SIGNATURE: [u8; 3] = [0xFF, 0xD8, 0xFF];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageFormat {
    Png,
    Jpeg,
}

impl ImageFormat {
    fn signature(&self) -> &'static [u8] {
        match self {
            ImageFormat::Png => &PNG_SIGNATURE,
            ImageFormat::Jpeg => &JPEG_SIGNATURE,
        }
    }
}

impl std::fmt::Display for ImageFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ImageFormat::Png => f.write_str("PNG"),
            ImageFormat::Jpeg => f.write_str("JPEG"),
        }
    }
}

/// Check a buffer is non-empty and starts with the format's magic bytes.
pub fn validate_image(bytes: &[u8], format: ImageFormat) -> std::result::Result<(), ContentSafetyError> {
    if bytes.is_empty() {
        return Err(ContentSafetyError::InvalidContent("empty image buffer".into()));
    }
    let sig = format.signature();
    if bytes.len() <= sig.len() || !bytes.starts_with(sig) {
        return Err(ContentSafetyError::InvalidContent(format!(
            "buffer of {} bytes is not a valid {format} image",
            bytes.len()
        )));
    }
    Ok(())
}

// ─── Rasterization ────────────────────────────────────────

/// Draw a chart off-screen.
pub fn rasterize(spec: &ChartSpec) -> Result<RasterImage> {
    let (w, h) = (spec.options.width, spec.options.height);
    if w < 50 || h < 50 || w > MAX_DIMENSION || h > MAX_DIMENSION {
        return Err(ReportError::Render(format!(
            "chart '{}' has unsupported size {w}x{h}",
            spec.title
        )));
    }
    if spec.labels.is_empty() || spec.datasets.iter().all(|d| d.data.is_empty()) {
        return Err(ReportError::Render(format!("chart '{}' has no data", spec.title)));
    }

    let mut img = RasterImage::new(w, h, WHITE);
    match spec.kind {
        ChartType::Pie => draw_pie(&mut img, spec),
        ChartType::Bar | ChartType::Table => draw_bars(&mut img, spec),
        ChartType::Line => draw_lines(&mut img, spec, false),
        ChartType::Area => draw_lines(&mut img, spec, true),
    }
    Ok(img)
}

/// Rasterize and PNG-encode a chart for handing to a caller. The buffer is
/// signature-checked before it leaves this function.
pub fn render_chart_png(spec: &ChartSpec) -> Result<Vec<u8>> {
    let png = rasterize(spec)?.to_png()?;
    validate_image(&png, ImageFormat::Png)?;
    Ok(png)
}

/// A chart drawn once and shared by every backend.
#[derive(Debug, Clone)]
pub struct RenderedChart {
    pub spec: ChartSpec,
    pub image: RasterImage,
    /// Validated PNG encoding of `image`.
    pub png: Vec<u8>,
}

impl RenderedChart {
    pub fn draw(spec: &ChartSpec) -> Result<Self> {
        let image = rasterize(spec)?;
        let png = image.to_png()?;
        validate_image(&png, ImageFormat::Png)?;
        Ok(Self {
            spec: spec.clone(),
            image,
            png,
        })
    }
}

struct Plot {
    left: i64,
    top: i64,
    right: i64,
    bottom: i64,
    min: f64,
    max: f64,
}

impl Plot {
    fn new(img: &RasterImage, spec: &ChartSpec) -> Self {
        let values = spec.datasets.iter().flat_map(|d| d.data.iter().copied());
        let (mut min, mut max) = (0.0f64, 0.0f64);
        for v in values.filter(|v| v.is_finite()) {
            min = min.min(v);
            max = max.max(v);
        }
        if (max - min).abs() < f64::EPSILON {
            max = min + 1.0;
        }
        let pad = (img.width as i64 / 20).max(10);
        Self {
            left: pad,
            top: pad,
            right: img.width as i64 - pad,
            bottom: img.height as i64 - pad,
            min,
            max,
        }
    }

    fn y_for(&self, v: f64) -> i64 {
        let v = if v.is_finite() { v } else { 0.0 };
        let t = (v - self.min) / (self.max - self.min);
        self.bottom - ((self.bottom - self.top) as f64 * t).round() as i64
    }

    fn draw_frame(&self, img: &mut RasterImage) {
        for i in 1..=4 {
            let y = self.top + (self.bottom - self.top) * i / 5;
            img.line(self.left, y, self.right, y, 1, GRID);
        }
        let zero = self.y_for(0.0);
        img.line(self.left, self.top, self.left, self.bottom, 2, AXIS);
        img.line(self.left, zero, self.right, zero, 2, AXIS);
    }
}

fn draw_bars(img: &mut RasterImage, spec: &ChartSpec) {
    let plot = Plot::new(img, spec);
    plot.draw_frame(img);
    let groups = spec.labels.len() as i64;
    let series = spec.datasets.len().max(1) as i64;
    let group_w = ((plot.right - plot.left) / groups).max(1);
    let bar_w = ((group_w * 7 / 10) / series).max(1);
    let zero = plot.y_for(0.0);
    for (s, dataset) in spec.datasets.iter().enumerate() {
        for (g, v) in dataset.data.iter().enumerate().take(groups as usize) {
            let x0 = plot.left + g as i64 * group_w + group_w * 15 / 100 + s as i64 * bar_w;
            img.fill_rect(x0, plot.y_for(*v), x0 + bar_w - 1, zero, series_color(s));
        }
    }
}

fn draw_lines(img: &mut RasterImage, spec: &ChartSpec, fill: bool) {
    let plot = Plot::new(img, spec);
    plot.draw_frame(img);
    let n = spec.labels.len().max(2) as i64;
    let step = (plot.right - plot.left) / (n - 1);
    let zero = plot.y_for(0.0);
    for (s, dataset) in spec.datasets.iter().enumerate() {
        let color = series_color(s);
        let points: Vec<(i64, i64)> = dataset
            .data
            .iter()
            .enumerate()
            .take(spec.labels.len())
            .map(|(i, v)| (plot.left + i as i64 * step, plot.y_for(*v)))
            .collect();
        if fill {
            let light = lighten(color);
            for pair in points.windows(2) {
                let ((x0, y0), (x1, y1)) = (pair[0], pair[1]);
                for x in x0..=x1 {
                    let t = if x1 == x0 { 0.0 } else { (x - x0) as f64 / (x1 - x0) as f64 };
                    let y = y0 + ((y1 - y0) as f64 * t).round() as i64;
                    img.fill_rect(x, y.min(zero), x + 1, y.max(zero), light);
                }
            }
        }
        for pair in points.windows(2) {
            img.line(pair[0].0, pair[0].1, pair[1].0, pair[1].1, 3, color);
        }
        for (x, y) in &points {
            img.fill_rect(x - 3, y - 3, x + 4, y + 4, color);
        }
    }
}

fn draw_pie(img: &mut RasterImage, spec: &ChartSpec) {
    let values: Vec<f64> = spec
        .datasets
        .first()
        .map(|d| d.data.iter().map(|v| v.max(0.0)).collect())
        .unwrap_or_default();
    let total: f64 = values.iter().filter(|v| v.is_finite()).sum();
    if total <= 0.0 {
        return;
    }
    // Cumulative end angle per slice, clockwise from 12 o'clock.
    let mut bounds = Vec::with_capacity(values.len());
    let mut acc = 0.0;
    for v in &values {
        acc += v / total * std::f64::consts::TAU;
        bounds.push(acc);
    }
    let cx = img.width as f64 / 2.0;
    let cy = img.height as f64 / 2.0;
    let r = (img.width.min(img.height) as f64 / 2.0) * 0.85;
    for y in 0..img.height {
        for x in 0..img.width {
            let dx = x as f64 + 0.5 - cx;
            let dy = y as f64 + 0.5 - cy;
            if dx * dx + dy * dy > r * r {
                continue;
            }
            let mut angle = dx.atan2(-dy);
            if angle < 0.0 {
                angle += std::f64::consts::TAU;
            }
            let slice = bounds.iter().position(|b| angle <= *b).unwrap_or(bounds.len() - 1);
            img.put(x as i64, y as i64, series_color(slice));
        }
    }
}

fn lighten(c: Rgb) -> Rgb {
    [
        c[0] / 3 + 170,
        c[1] / 3 + 170,
        c[2] / 3 + 170,
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use ledgerlens_core::{ChartOptions, Dataset};

    fn spec(kind: ChartType) -> ChartSpec {
        ChartSpec {
            kind,
            title: "Revenue".into(),
            labels: vec!["Jan".into(), "Feb".into(), "Mar".into()],
            datasets: vec![Dataset {
                label: "2026".into(),
                data: vec![10.0, 30.0, 20.0],
            }],
            options: ChartOptions {
                width: 200,
                height: 100,
                show_legend: true,
            },
        }
    }

    #[test]
    fn test_png_has_signature_and_ihdr() {
        let png = render_chart_png(&spec(ChartType::Bar)).unwrap();
        assert!(png.starts_with(&PNG_SIGNATURE));
        assert_eq!(&png[12..16], b"IHDR");
        assert_eq!(u32::from_be_bytes([png[16], png[17], png[18], png[19]]), 200);
        assert!(png.ends_with(&[0xAE, 0x42, 0x60, 0x82]));
    }

    #[test]
    fn test_every_kind_draws_something() {
        for kind in [ChartType::Bar, ChartType::Line, ChartType::Area, ChartType::Pie] {
            let img = rasterize(&spec(kind)).unwrap();
            assert!(
                img.pixels.chunks(3).any(|p| p == series_color(0)),
                "{kind:?} drew no series pixels"
            );
        }
    }

    #[test]
    fn test_rejects_empty_chart() {
        let mut s = spec(ChartType::Bar);
        s.labels.clear();
        assert!(rasterize(&s).is_err());
    }

    #[test]
    fn test_validate_image_rejects_non_images() {
        assert!(matches!(
            validate_image(b"", ImageFormat::Png),
            Err(ContentSafetyError::InvalidContent(_))
        ));
        assert!(validate_image(b"hello world, not a png", ImageFormat::Png).is_err());
        assert!(validate_image(&PNG_SIGNATURE[..4], ImageFormat::Png).is_err());
        assert!(validate_image(&PNG_SIGNATURE, ImageFormat::Png).is_err());
        assert!(validate_image(&[0xFF, 0xD8, 0xFF, 0xE0, 0x00], ImageFormat::Jpeg).is_ok());
        assert!(validate_image(&[0xFF, 0xD8, 0xFF, 0xE0, 0x00], ImageFormat::Png).is_err());
    }
}
