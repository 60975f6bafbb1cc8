use std::path::{Component, Path, PathBuf};

use serde::Serialize;

use crate::error::{Error, Result};
use crate::summary::Summary;

pub const DEFAULT_SUMMARY_PATH: &str = "results/summary.json";

/// Resolves `rel` into a clean relative path; absolute paths and `..` are rejected.
pub fn sanitize_relative_output_path(rel: &str) -> Result<PathBuf> {
    if Path::new(rel).is_absolute() {
        return Err(Error::InvalidOutputPath(rel.to_string()));
    }

    let mut clean = PathBuf::new();
    for c in Path::new(rel).components() {
        match c {
            Component::CurDir => {}
            Component::Normal(p) => clean.push(p),
            _ => return Err(Error::InvalidOutputPath(rel.to_string())),
        }
    }

    if clean.as_os_str().is_empty() {
        return Err(Error::InvalidOutputPath(rel.to_string()));
    }

    Ok(clean)
}

/// Headline numbers at the top of the results file.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Highlights {
    pub api_requests_per_second: f64,
    /// Fraction of failed HTTP requests.
    pub failed_requests: f64,
    /// Milliseconds; 0 when nothing was measured.
    pub request_duration_p95: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct SummaryArtifact<'a> {
    #[serde(flatten)]
    pub highlights: Highlights,
    pub summary: &'a Summary,
}

impl<'a> SummaryArtifact<'a> {
    pub fn new(summary: &'a Summary) -> Self {
        Self {
            highlights: Highlights {
                api_requests_per_second: summary.api_requests.per_sec,
                failed_requests: summary.http.failed_rate,
                request_duration_p95: summary.http.duration_ms.p95.unwrap_or(0.0),
            },
            summary,
        }
    }
}

/// Writes the summary artifact under `base_dir` and returns the full path written.
pub fn write_summary_artifact(base_dir: &Path, rel: &str, summary: &Summary) -> Result<PathBuf> {
    let path = base_dir.join(sanitize_relative_output_path(rel)?);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let mut body = serde_json::to_vec_pretty(&SummaryArtifact::new(summary))?;
    body.push(b'\n');
    std::fs::write(&path, body)?;
    Ok(path)
}
