use anyhow::Context as _;
use serde::Serialize;
use std::io::Write;
use std::sync::Arc;

use sheetload_core::{ProgressUpdate, Summary, SummaryArtifact};
use tracing::warn;

use super::OutputFormatter;

pub(crate) struct JsonOutput;

impl OutputFormatter for JsonOutput {
    fn print_header(&self, _base_url: &str, _scenario: &sheetload_core::ScenarioConfig) {}

    fn progress(&self) -> Option<sheetload_core::ProgressFn> {
        Some(Arc::new(move |u| {
            let line = build_progress_line(&u);
            if let Err(err) = emit_json_line(&mut std::io::stdout().lock(), &line) {
                warn!(error = %err, tick = u.tick, "failed to write progress line");
            }
        }))
    }

    fn print_summary(&self, summary: &Summary) -> anyhow::Result<()> {
        emit_json_line(&mut std::io::stdout().lock(), &build_summary_line(summary))
            .context("failed to write summary line")
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct JsonProgressLine {
    pub kind: &'static str,
    pub tick: u64,
    pub elapsed_secs: f64,
    pub total_duration_secs: u64,

    pub stage: Option<usize>,
    pub stages: Option<usize>,
    pub stage_target: Option<u64>,

    pub desired_vus: u64,
    pub active_vus: u64,
    pub peak_vus: u64,

    pub requests_per_sec: f64,
    pub total_requests: u64,
    pub failed_requests_total: u64,
    pub iterations_total: u64,
}

fn build_progress_line(u: &ProgressUpdate) -> JsonProgressLine {
    JsonProgressLine {
        kind: "progress",
        tick: u.tick,
        elapsed_secs: u.elapsed.as_secs_f64(),
        total_duration_secs: u.total_duration.as_secs(),

        stage: u.stage.as_ref().map(|s| s.stage),
        stages: u.stage.as_ref().map(|s| s.stages),
        stage_target: u.stage.as_ref().map(|s| s.current_target),

        desired_vus: u.desired_vus,
        active_vus: u.active_vus,
        peak_vus: u.peak_vus,

        requests_per_sec: u.rps_now,
        total_requests: u.requests_total,
        failed_requests_total: u.failed_requests_total,
        iterations_total: u.iterations_total,
    }
}

/// Same payload as the results file, tagged as a summary line.
#[derive(Debug, Serialize)]
pub(crate) struct JsonSummaryLine<'a> {
    pub kind: &'static str,
    #[serde(flatten)]
    pub artifact: SummaryArtifact<'a>,
}

fn build_summary_line(summary: &Summary) -> JsonSummaryLine<'_> {
    JsonSummaryLine {
        kind: "summary",
        artifact: SummaryArtifact::new(summary),
    }
}

fn emit_json_line<W: Write, T: Serialize>(out: &mut W, line: &T) -> std::io::Result<()> {
    serde_json::to_writer(&mut *out, line)?;
    writeln!(out)?;
    out.flush()
}
