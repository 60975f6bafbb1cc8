use anyhow::Context as _;
use std::path::Path;
use std::sync::Arc;

use sheetload_core::{
    Interrupt, RunOptions, ScenarioConfig, ScenarioOverrides, parse_stages, resolve_scenario,
    write_summary_artifact,
};
use tracing::{info, warn};

use crate::cli::RunArgs;
use crate::exit_codes::ExitCode;
use crate::output;
use crate::run_error::RunError;

pub async fn run(args: RunArgs) -> Result<ExitCode, RunError> {
    let out = output::formatter(args.output);

    let scenario = scenario_from_args(&args).map_err(RunError::InvalidInput)?;
    let cwd = std::env::current_dir()
        .context("failed to resolve current working directory")
        .map_err(RunError::RuntimeError)?;
    // Reject a bad artifact path before generating any load.
    sheetload_core::outputs::sanitize_relative_output_path(&args.summary_path)
        .context("invalid --summary-path")
        .map_err(RunError::InvalidInput)?;

    out.print_header(&args.base_url, &scenario);

    let mut options = RunOptions::new(args.base_url.clone(), scenario);
    options.credentials = args.credentials();
    options.think_time = args.think_time;
    options.request_timeout = Some(args.request_timeout).filter(|d| !d.is_zero());

    let interrupt = Arc::new(Interrupt::default());
    let signal = tokio::spawn(interrupt_on_ctrl_c(interrupt.clone()));

    let result = sheetload_core::run(options, interrupt, out.progress()).await;
    signal.abort();

    let summary = result
        .context("load test failed")
        .map_err(RunError::RuntimeError)?;

    out.print_summary(&summary)
        .map_err(RunError::RuntimeError)?;

    let written = write_summary_artifact(&cwd, &args.summary_path, &summary)
        .with_context(|| format!("failed to write summary: {}", args.summary_path))
        .map_err(RunError::RuntimeError)?;
    info!(path = %display_path(&written, &cwd), "summary written");

    Ok(ExitCode::from_thresholds(summary.passed))
}

fn scenario_from_args(args: &RunArgs) -> anyhow::Result<ScenarioConfig> {
    let stages = args
        .stages
        .as_deref()
        .map(parse_stages)
        .transpose()
        .context("invalid --stages")?;

    resolve_scenario(
        args.test_type.as_deref(),
        ScenarioOverrides {
            stages,
            thresholds: args.thresholds.clone(),
        },
    )
    .context("invalid scenario config")
}

async fn interrupt_on_ctrl_c(interrupt: Arc<Interrupt>) {
    match tokio::signal::ctrl_c().await {
        Ok(()) => {
            warn!("interrupt received, stopping VUs");
            interrupt.trigger();
        }
        Err(err) => warn!(error = %err, "failed to listen for ctrl-c"),
    }
}

fn display_path<'a>(path: &'a Path, cwd: &Path) -> std::path::Display<'a> {
    path.strip_prefix(cwd).unwrap_or(path).display()
}
