pub mod config;
mod error;
pub mod executor;
pub mod flow;
pub mod lifecycle;
pub mod outputs;
pub mod progress;
pub mod request_metrics;
mod run;
pub mod schedule;
pub mod scheduler;
pub mod summary;
pub mod thresholds;
mod thresholds_eval;
pub mod vu;

pub use config::{
    ScenarioConfig, ScenarioKind, ScenarioOverrides, Stage, parse_stage_duration, parse_stages,
    resolve_scenario,
};
pub use error::{Error, Result};
pub use lifecycle::{Credentials, Lifecycle, SetupContext};
pub use outputs::{DEFAULT_SUMMARY_PATH, Highlights, SummaryArtifact, write_summary_artifact};
pub use progress::{ProgressFn, ProgressUpdate, StageProgress};
pub use run::{
    DEFAULT_BASE_URL, DEFAULT_REQUEST_TIMEOUT, DEFAULT_THINK_TIME, RunOptions, run,
};
pub use summary::Summary;
pub use thresholds::{MetricRef, Threshold, ThresholdOp, ThresholdSet};
pub use thresholds_eval::{ThresholdResult, all_passed, evaluate_thresholds};
pub use vu::Interrupt;

pub use sheetload_metrics::{MetricKind, MetricSeriesSummary, MetricValue, TrendSummary};
