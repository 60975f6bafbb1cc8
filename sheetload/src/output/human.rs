use std::sync::Arc;
use std::time::Duration;

mod duration;
mod format;
mod progress;
mod summary;

use duration::format_duration_single;
use format::format_rate;
use progress::HumanProgress;
use summary::render;

use super::OutputFormatter;

pub(crate) struct HumanReadableOutput {
    progress: Arc<HumanProgress>,
}

impl HumanReadableOutput {
    pub(crate) fn new() -> Self {
        Self {
            progress: Arc::new(HumanProgress::new()),
        }
    }
}

impl OutputFormatter for HumanReadableOutput {
    fn print_header(&self, base_url: &str, scenario: &sheetload_core::ScenarioConfig) {
        println!("target: {base_url}");
        println!(
            "scenario: {} duration={} peak_vus={} stages={}",
            scenario.kind,
            format_duration_single(scenario.total_duration()),
            scenario.peak_target(),
            scenario.stages.len()
        );
        for set in &scenario.thresholds {
            let exprs = set
                .thresholds
                .iter()
                .map(|t| t.source.as_str())
                .collect::<Vec<_>>()
                .join(", ");
            println!("threshold: {} [{exprs}]", set.metric);
        }
        println!();
    }

    fn progress(&self) -> Option<sheetload_core::ProgressFn> {
        let progress = self.progress.clone();

        Some(Arc::new(move |u| {
            let stage = match &u.stage {
                Some(s) => format!(
                    "stage={}/{} target={} stage_remaining={} ",
                    s.stage,
                    s.stages,
                    s.current_target,
                    format_duration_single(s.stage_remaining)
                ),
                None => String::new(),
            };
            let message = format!(
                "{stage}vus={}/{} elapsed={} rps={} reqs={} failed={} iters={}",
                u.active_vus,
                u.desired_vus,
                format_duration_single(u.elapsed),
                format_rate(u.rps_now),
                u.requests_total,
                u.failed_requests_total,
                u.iterations_total
            );

            // A zero-length schedule still draws a full bar.
            let total = u.total_duration.max(Duration::from_millis(1));
            progress.update("sheetload", total, u.elapsed, message);
        }))
    }

    fn print_summary(&self, summary: &sheetload_core::Summary) -> anyhow::Result<()> {
        self.progress.finish();
        print!("{}", render(summary));

        let failed: Vec<_> = summary.thresholds.iter().filter(|t| !t.passed).collect();
        if !failed.is_empty() {
            eprintln!("thresholds failed:");
            for t in failed {
                match t.observed {
                    Some(obs) => eprintln!("  {}: {} (observed {obs})", t.metric, t.expression),
                    None => eprintln!("  {}: {} (no data)", t.metric, t.expression),
                }
            }
        }
        if !summary.setup.healthy {
            eprintln!("setup: service unhealthy, no load was generated");
        }

        Ok(())
    }
}
