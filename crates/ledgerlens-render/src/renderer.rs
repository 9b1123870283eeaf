//! Renderer facade: draws charts once, runs each requested backend, and
//! writes the results through the output sandbox.

use chrono::{DateTime, Utc};
use ledgerlens_core::{Document, ReportFormat, Result};
use std::path::PathBuf;

use crate::chart::RenderedChart;
use crate::output::{ArtifactKind, OutputDir, artifact_file_name};
use crate::{pdf, workbook};

/// Per-render presentation settings.
#[derive(Debug, Clone)]
pub struct RenderOptions {
    pub company_name: Option<String>,
    /// ISO code printed next to currency figures.
    pub currency: String,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            company_name: None,
            currency: "USD".into(),
        }
    }
}

/// A file written to the output directory.
#[derive(Debug, Clone)]
pub struct RenderedArtifact {
    pub kind: ArtifactKind,
    pub file_name: String,
    pub path: PathBuf,
    pub bytes: Vec<u8>,
}

impl RenderedArtifact {
    pub fn mime_type(&self) -> &'static str {
        self.kind.mime_type()
    }
}

pub struct Renderer {
    output: OutputDir,
    company_name: Option<String>,
}

impl Renderer {
    pub fn new(output: OutputDir, company_name: Option<String>) -> Self {
        Self {
            output,
            company_name,
        }
    }

    pub fn output(&self) -> &OutputDir {
        &self.output
    }

    /// Render `doc` once per requested format. A chart that fails to draw is
    /// dropped with a warning; a backend or write failure fails the render.
    pub fn render(
        &self,
        doc: &Document,
        formats: &[ReportFormat],
        currency: &str,
        at: DateTime<Utc>,
    ) -> Result<Vec<RenderedArtifact>> {
        let charts: Vec<RenderedChart> = doc
            .charts
            .iter()
            .filter_map(|spec| match RenderedChart::draw(spec) {
                Ok(chart) => Some(chart),
                Err(e) => {
                    tracing::warn!("⚠️ Skipping chart '{}': {e}", spec.title);
                    None
                }
            })
            .collect();

        let opts = RenderOptions {
            company_name: self.company_name.clone(),
            currency: currency.to_string(),
        };

        let mut artifacts = Vec::with_capacity(formats.len());
        for format in formats {
            let kind = ArtifactKind::from(*format);
            if artifacts.iter().any(|a: &RenderedArtifact| a.kind == kind) {
                continue;
            }
            let bytes = match format {
                ReportFormat::Pdf => pdf::render_pdf(doc, &charts, &opts)?,
                ReportFormat::Xlsx => workbook::render_workbook(doc, &charts, &opts)?,
            };
            let file_name = artifact_file_name(&doc.title, at, kind);
            let path = self.output.write(&file_name, kind, &bytes)?;
            tracing::info!(
                "📄 Rendered {} ({} bytes, {} chart(s))",
                file_name,
                bytes.len(),
                charts.len()
            );
            artifacts.push(RenderedArtifact {
                kind,
                file_name,
                path,
                bytes,
            });
        }
        Ok(artifacts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use ledgerlens_core::{
        CellValue, ChartSpec, ChartType, DateRange, Section, SectionContent, TableContent,
    };

    fn doc_with_chart() -> Document {
        let end = Utc.with_ymd_and_hms(2026, 10, 1, 0, 0, 0).unwrap();
        let start = Utc.with_ymd_and_hms(2026, 9, 1, 0, 0, 0).unwrap();
        let mut doc = Document::new("Weekly Sales", "", DateRange::new(start, end).unwrap(), end);
        let section = Section::new(
            "By location",
            SectionContent::Table(TableContent {
                headers: vec!["Location".into(), "Revenue".into()],
                rows: vec![
                    vec![CellValue::Text("North".into()), CellValue::Currency(120.0)],
                    vec![CellValue::Text("South".into()), CellValue::Currency(80.0)],
                ],
                totals: None,
            }),
        );
        doc.charts.push(ChartSpec::from_section(&section, ChartType::Pie).unwrap());
        doc.sections.push(section);
        let mut broken = ChartSpec::from_section(&doc.sections[0], ChartType::Bar).unwrap();
        broken.options.width = 1;
        doc.charts.push(broken);
        doc
    }

    #[test]
    fn test_render_both_formats_into_sandbox() {
        let dir = tempfile::tempdir().unwrap();
        let renderer = Renderer::new(OutputDir::new(dir.path()), Some("Acme".into()));
        let at = Utc.with_ymd_and_hms(2026, 10, 1, 6, 0, 0).unwrap();
        let artifacts = renderer
            .render(
                &doc_with_chart(),
                &[ReportFormat::Pdf, ReportFormat::Xlsx, ReportFormat::Pdf],
                "EUR",
                at,
            )
            .unwrap();
        assert_eq!(artifacts.len(), 2);
        assert_eq!(artifacts[0].kind, ArtifactKind::Pdf);
        assert!(artifacts[0].bytes.starts_with(b"%PDF"));
        assert_eq!(artifacts[1].mime_type(), ReportFormat::Xlsx.mime_type());
        for a in &artifacts {
            assert!(a.path.exists());
            assert_eq!(a.path.parent(), Some(renderer.output().root()));
            assert!(a.file_name.starts_with("weekly_sales_report_20261001_060000"));
        }
    }
}
