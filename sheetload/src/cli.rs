use clap::{Args, Parser, Subcommand};
use std::time::Duration;

use sheetload_core::{Credentials, DEFAULT_BASE_URL, DEFAULT_SUMMARY_PATH};

fn parse_duration(input: &str) -> Result<Duration, String> {
    let s = input.trim();
    if s.is_empty() {
        return Err("duration cannot be empty (expected e.g. 10s, 250ms, 1m)".to_string());
    }

    let number_end = s
        .char_indices()
        .find(|(_, ch)| !ch.is_ascii_digit())
        .map_or(s.len(), |(idx, _)| idx);

    if number_end == 0 {
        return Err(format!(
            "invalid duration '{s}' (expected e.g. 10s, 250ms, 1m)"
        ));
    }

    let (number_str, unit_str) = s.split_at(number_end);
    let value: u64 = number_str
        .parse()
        .map_err(|_| format!("invalid duration '{s}' (expected e.g. 10s, 250ms, 1m)"))?;

    match unit_str.trim() {
        "" | "s" | "sec" | "secs" | "second" | "seconds" => Ok(Duration::from_secs(value)),
        "ms" | "msec" | "msecs" | "millisecond" | "milliseconds" => {
            Ok(Duration::from_millis(value))
        }
        "m" | "min" | "mins" | "minute" | "minutes" => {
            let secs = value
                .checked_mul(60)
                .ok_or_else(|| format!("duration '{s}' is too large"))?;
            Ok(Duration::from_secs(secs))
        }
        "h" | "hr" | "hrs" | "hour" | "hours" => {
            let secs = value
                .checked_mul(60 * 60)
                .ok_or_else(|| format!("duration '{s}' is too large"))?;
            Ok(Duration::from_secs(secs))
        }
        _ => Err(format!(
            "invalid duration '{s}' (expected e.g. 10s, 250ms, 1m)"
        )),
    }
}

fn parse_threshold_arg(input: &str) -> Result<(String, String), String> {
    let (metric, expr) = input
        .split_once('=')
        .ok_or_else(|| format!("invalid threshold '{input}' (expected METRIC=EXPR)"))?;
    let metric = metric.trim();
    let expr = expr.trim();
    if metric.is_empty() || expr.is_empty() {
        return Err(format!("invalid threshold '{input}' (expected METRIC=EXPR)"));
    }
    Ok((metric.to_string(), expr.to_string()))
}

#[derive(Debug, Clone, Copy, clap::ValueEnum)]
pub enum OutputFormat {
    /// Progress bar on stderr and a text summary on stdout.
    HumanReadable,
    /// Emit JSON progress lines (NDJSON) and the final summary to stdout.
    Json,
}

#[derive(Debug, Parser)]
#[command(
    name = "sheetload",
    author,
    version,
    about = "Staged load tests for the OLSHEETS API",
    long_about = "sheetload ramps virtual users through the OLSHEETS user flow (health, sheets, instruments, pricing, account) and checks the results against thresholds.\n\nA run is shaped by a test type (smoke, load, spike) whose stages and thresholds can be overridden from the command line or the environment.",
    after_help = "Examples:\n  sheetload run\n  sheetload run --test-type smoke --base-url http://localhost:8080\n  sheetload run --stages 30s:10,1m:10,30s:0 --threshold 'http_req_duration=p(99)<800'\n  sheetload run --test-type spike --output json"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run a load test against the service
    #[command(
        long_about = "Run setup (health probe, signup or login), ramp the virtual users through every stage, run teardown and report.\n\nExits with 11 when a threshold fails."
    )]
    Run(RunArgs),
}

#[derive(Debug, Args)]
pub struct RunArgs {
    /// Base URL of the service under test
    #[arg(long, env = "BASE_URL", default_value = DEFAULT_BASE_URL)]
    pub base_url: String,

    /// Test type: smoke, load or spike (unknown values run `load`)
    #[arg(long, env = "TEST_TYPE")]
    pub test_type: Option<String>,

    /// Replace the profile's stages (e.g. 30s:10,1m:10,30s:0)
    #[arg(long, env = "STAGES")]
    pub stages: Option<String>,

    /// Extra threshold (repeatable, METRIC=EXPR, e.g. http_req_duration=p(99)<800)
    #[arg(long = "threshold", value_name = "METRIC=EXPR", value_parser = parse_threshold_arg)]
    pub thresholds: Vec<(String, String)>,

    /// Pause after every request (e.g. 1s, 250ms)
    #[arg(long, env = "THINK_TIME", default_value = "1s", value_parser = parse_duration)]
    pub think_time: Duration,

    /// Per-request timeout (e.g. 10s)
    #[arg(long, default_value = "10s", value_parser = parse_duration)]
    pub request_timeout: Duration,

    /// Account used by setup
    #[arg(long, env = "LOAD_TEST_USERNAME")]
    pub username: Option<String>,

    #[arg(long, env = "LOAD_TEST_PASSWORD", hide_env_values = true)]
    pub password: Option<String>,

    #[arg(long, env = "LOAD_TEST_EMAIL")]
    pub email: Option<String>,

    /// Where the JSON summary is written, relative to the working directory
    #[arg(long, default_value = DEFAULT_SUMMARY_PATH)]
    pub summary_path: String,

    /// Output format
    #[arg(long, value_enum, default_value_t = OutputFormat::HumanReadable)]
    pub output: OutputFormat,
}

impl RunArgs {
    pub fn credentials(&self) -> Credentials {
        let mut creds = Credentials::default();
        if let Some(username) = &self.username {
            creds.username.clone_from(username);
        }
        if let Some(password) = &self.password {
            creds.password.clone_from(password);
        }
        if let Some(email) = &self.email {
            creds.email.clone_from(email);
        }
        creds
    }
}
