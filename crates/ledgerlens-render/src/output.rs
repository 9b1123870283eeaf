//! Output directory sandbox.
//!
//! Every artifact name passes through [`OutputDir::resolve`] before touching
//! the filesystem: base name only, allow-listed characters, allow-listed
//! extension, and a lexical containment check against the fixed root.

use chrono::{DateTime, Utc};
use ledgerlens_core::{ContentSafetyError, ReportFormat, Result};
use std::path::{Component, Path, PathBuf};
use std::time::{Duration, SystemTime};

/// Artifact types the output directory accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactKind {
    Pdf,
    Xlsx,
    Png,
}

const ALLOWED_KINDS: [ArtifactKind; 3] = [ArtifactKind::Pdf, ArtifactKind::Xlsx, ArtifactKind::Png];

impl ArtifactKind {
    pub fn extension(&self) -> &'static str {
        match self {
            ArtifactKind::Pdf => "pdf",
            ArtifactKind::Xlsx => "xlsx",
            ArtifactKind::Png => "png",
        }
    }

    pub fn mime_type(&self) -> &'static str {
        match self {
            ArtifactKind::Pdf => ReportFormat::Pdf.mime_type(),
            ArtifactKind::Xlsx => ReportFormat::Xlsx.mime_type(),
            ArtifactKind::Png => "image/png",
        }
    }

    pub fn from_extension(ext: &str) -> Option<Self> {
        let ext = ext.to_ascii_lowercase();
        ALLOWED_KINDS.into_iter().find(|k| k.extension() == ext)
    }
}

impl From<ReportFormat> for ArtifactKind {
    fn from(format: ReportFormat) -> Self {
        match format {
            ReportFormat::Pdf => ArtifactKind::Pdf,
            ReportFormat::Xlsx => ArtifactKind::Xlsx,
        }
    }
}

/// Longest title part of a generated artifact name.
const MAX_TITLE_LEN: usize = 80;
/// Longest stem `resolve` accepts; leaves room for the extension under the
/// usual 255-byte file name limit.
const MAX_STEM_LEN: usize = 240;

/// Keep `[A-Za-z0-9_-]`, turn every other run of characters into one `_`.
/// Never truncates.
pub fn sanitize_component(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut last_was_sep = false;
    for ch in raw.chars() {
        if ch.is_ascii_alphanumeric() || ch == '-' || ch == '_' {
            out.push(ch);
            last_was_sep = ch == '_';
        } else if !last_was_sep {
            out.push('_');
            last_was_sep = true;
        }
    }
    let trimmed = out.trim_matches('_');
    if trimmed.is_empty() {
        "report".to_string()
    } else {
        trimmed.to_string()
    }
}

/// `{title}_report_{timestamp}.{ext}`. Only the title part is shortened, so
/// the timestamp always survives.
pub fn artifact_file_name(title: &str, at: DateTime<Utc>, kind: ArtifactKind) -> String {
    let title: String = sanitize_component(title)
        .to_lowercase()
        .chars()
        .take(MAX_TITLE_LEN)
        .collect();
    format!(
        "{}_report_{}.{}",
        title.trim_end_matches('_'),
        at.format("%Y%m%d_%H%M%S_%3f"),
        kind.extension()
    )
}

/// The fixed directory all artifacts are written under.
#[derive(Debug, Clone)]
pub struct OutputDir {
    root: PathBuf,
}

impl OutputDir {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: normalize_lexically(&root.into()),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Create the directory if missing.
    pub fn ensure(&self) -> Result<()> {
        std::fs::create_dir_all(&self.root)?;
        Ok(())
    }

    /// Validate a requested file name and map it into the sandbox.
    pub fn resolve(
        &self,
        requested: &str,
        kind: ArtifactKind,
    ) -> std::result::Result<PathBuf, ContentSafetyError> {
        if requested.is_empty() || requested.contains('\0') {
            return Err(ContentSafetyError::PathViolation(
                "empty or NUL-containing file name".into(),
            ));
        }
        let path = Path::new(requested);
        let mut components = path.components();
        let only_normal = matches!(
            (components.next(), components.next()),
            (Some(Component::Normal(_)), None)
        );
        // Backslashes are separators on Windows and never legitimate here.
        if !only_normal || requested.contains('\\') {
            return Err(ContentSafetyError::PathViolation(format!(
                "'{requested}' is not a plain file name"
            )));
        }

        let base = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| ContentSafetyError::PathViolation(format!("'{requested}' has no base name")))?;
        let (stem, ext) = base.rsplit_once('.').ok_or_else(|| {
            ContentSafetyError::PathViolation(format!("'{requested}' has no extension"))
        })?;
        let ext = ext.to_ascii_lowercase();
        match ArtifactKind::from_extension(&ext) {
            Some(k) if k == kind => {}
            _ => {
                return Err(ContentSafetyError::PathViolation(format!(
                    "extension '.{ext}' is not allowed for {} artifacts",
                    kind.extension()
                )));
            }
        }

        let stem = sanitize_component(stem);
        if stem.len() > MAX_STEM_LEN {
            return Err(ContentSafetyError::PathViolation(format!(
                "file name is longer than {MAX_STEM_LEN} characters"
            )));
        }
        let candidate = self.root.join(format!("{stem}.{ext}"));
        let normalized = normalize_lexically(&candidate);
        if normalized.parent() != Some(self.root.as_path()) {
            return Err(ContentSafetyError::PathViolation(format!(
                "'{requested}' resolves outside {}",
                self.root.display()
            )));
        }
        Ok(normalized)
    }

    /// Write an artifact after the path passes [`resolve`](Self::resolve).
    pub fn write(&self, requested: &str, kind: ArtifactKind, bytes: &[u8]) -> Result<PathBuf> {
        let path = self.resolve(requested, kind)?;
        self.ensure()?;
        std::fs::write(&path, bytes)?;
        tracing::debug!("💾 Wrote {} ({} bytes)", path.display(), bytes.len());
        Ok(path)
    }
}

/// Resolve `.` and `..` without touching the filesystem.
fn normalize_lexically(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() {
                    out.push("..");
                }
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

/// Outcome of one cleanup sweep.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize)]
pub struct CleanupReport {
    pub removed: usize,
    pub kept: usize,
    pub errors: usize,
}

/// Delete artifacts older than `max_age`. Only regular files with an
/// allow-listed extension are considered; anything else in the directory is
/// left alone. `max_age` must exceed the longest delivery time or a file may
/// be swept while still being sent.
pub fn cleanup_older_than(dir: &Path, max_age: Duration, now: SystemTime) -> Result<CleanupReport> {
    let mut report = CleanupReport::default();
    if !dir.exists() {
        return Ok(report);
    }
    for entry in std::fs::read_dir(dir)? {
        let entry = match entry {
            Ok(e) => e,
            Err(e) => {
                tracing::warn!("⚠️ Cleanup: unreadable entry: {e}");
                report.errors += 1;
                continue;
            }
        };
        let path = entry.path();
        let is_artifact = path
            .extension()
            .and_then(|e| e.to_str())
            .and_then(ArtifactKind::from_extension)
            .is_some();
        let meta = match entry.metadata() {
            Ok(m) => m,
            Err(e) => {
                tracing::warn!("⚠️ Cleanup: no metadata for {}: {e}", path.display());
                report.errors += 1;
                continue;
            }
        };
        if !meta.is_file() || !is_artifact {
            continue;
        }
        let age = meta
            .modified()
            .ok()
            .and_then(|m| now.duration_since(m).ok())
            .unwrap_or_default();
        if age > max_age {
            match std::fs::remove_file(&path) {
                Ok(()) => {
                    tracing::debug!("🧹 Removed {}", path.display());
                    report.removed += 1;
                }
                Err(e) => {
                    tracing::warn!("⚠️ Cleanup: failed to remove {}: {e}", path.display());
                    report.errors += 1;
                }
            }
        } else {
            report.kept += 1;
        }
    }
    if report.removed > 0 {
        tracing::info!("🧹 Cleanup removed {} old report file(s)", report.removed);
    }
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_artifact_file_name() {
        let at = Utc.with_ymd_and_hms(2026, 10, 1, 8, 30, 5).unwrap();
        assert_eq!(
            artifact_file_name("Weekly Sales / North", at, ArtifactKind::Pdf),
            "weekly_sales_north_report_20261001_083005_000.pdf"
        );
        let hostile = artifact_file_name("../../etc/passwd", at, ArtifactKind::Xlsx);
        assert!(!hostile.contains('/'));
        assert!(!hostile.contains(".."));
    }

    #[test]
    fn test_long_title_keeps_timestamp_and_advertised_name() {
        let dir = tempfile::tempdir().unwrap();
        let out = OutputDir::new(dir.path());
        let title = "Quarterly Revenue and Customer Retention Summary for All Locations";
        let first = Utc.with_ymd_and_hms(2026, 10, 1, 6, 0, 0).unwrap();
        let second = Utc.with_ymd_and_hms(2026, 10, 2, 6, 0, 0).unwrap();

        let name_a = artifact_file_name(title, first, ArtifactKind::Pdf);
        let name_b = artifact_file_name(title, second, ArtifactKind::Pdf);
        assert!(name_a.ends_with("_report_20261001_060000_000.pdf"), "{name_a}");

        let path_a = out.write(&name_a, ArtifactKind::Pdf, b"%PDF").unwrap();
        let path_b = out.write(&name_b, ArtifactKind::Pdf, b"%PDF").unwrap();
        assert_ne!(path_a, path_b);
        assert_eq!(path_a.file_name().unwrap().to_str(), Some(name_a.as_str()));
        assert_eq!(path_b.file_name().unwrap().to_str(), Some(name_b.as_str()));

        let huge = artifact_file_name(&"x".repeat(500), first, ArtifactKind::Xlsx);
        assert!(huge.ends_with("_report_20261001_060000_000.xlsx"));
        assert_eq!(out.resolve(&huge, ArtifactKind::Xlsx).unwrap().file_name().unwrap().to_str(), Some(huge.as_str()));
        assert!(out.resolve(&format!("{}.pdf", "y".repeat(300)), ArtifactKind::Pdf).is_err());
    }

    #[test]
    fn test_resolve_rejects_traversal() {
        let dir = tempfile::tempdir().unwrap();
        let out = OutputDir::new(dir.path());
        for bad in [
            "../../etc/passwd",
            "../../etc/passwd.pdf",
            "/etc/passwd.pdf",
            "sub/report.pdf",
            "..\\..\\win.pdf",
            "..",
            "",
        ] {
            let err = out.resolve(bad, ArtifactKind::Pdf).unwrap_err();
            assert!(
                matches!(err, ContentSafetyError::PathViolation(_)),
                "{bad} -> {err:?}"
            );
        }
    }

    #[test]
    fn test_resolve_checks_extension() {
        let dir = tempfile::tempdir().unwrap();
        let out = OutputDir::new(dir.path());
        assert!(out.resolve("report.exe", ArtifactKind::Pdf).is_err());
        assert!(out.resolve("report.xlsx", ArtifactKind::Pdf).is_err());
        let ok = out.resolve("Q3 report!.PDF", ArtifactKind::Pdf).unwrap();
        assert_eq!(ok.parent(), Some(out.root()));
        assert_eq!(ok.file_name().unwrap(), "Q3_report.pdf");
    }

    #[test]
    fn test_write_refuses_escape_and_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let out = OutputDir::new(dir.path().join("reports"));
        let err = out
            .write("../escape.pdf", ArtifactKind::Pdf, b"%PDF")
            .unwrap_err();
        assert!(err.is_content_safety());
        assert!(!dir.path().join("escape.pdf").exists());

        let path = out.write("fine.pdf", ArtifactKind::Pdf, b"%PDF").unwrap();
        assert!(path.exists());
    }

    #[test]
    fn test_cleanup_removes_only_old_artifacts() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.pdf"), b"x").unwrap();
        std::fs::write(dir.path().join("notes.txt"), b"x").unwrap();

        let now = SystemTime::now();
        let fresh = cleanup_older_than(dir.path(), Duration::from_secs(3600), now).unwrap();
        assert_eq!(fresh.removed, 0);
        assert_eq!(fresh.kept, 1);

        let later = now + Duration::from_secs(7200);
        let swept = cleanup_older_than(dir.path(), Duration::from_secs(3600), later).unwrap();
        assert_eq!(swept.removed, 1);
        assert!(!dir.path().join("a.pdf").exists());
        assert!(dir.path().join("notes.txt").exists());
    }
}
