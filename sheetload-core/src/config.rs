use std::time::Duration;

use serde::Serialize;
use tracing::warn;

use crate::error::{Error, Result};
use crate::thresholds::ThresholdSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Stage {
    pub duration: Duration,
    pub target: u64,
}

impl Stage {
    pub const fn new(duration: Duration, target: u64) -> Self {
        Self { duration, target }
    }
}

/// Named load profile.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    strum::Display,
    strum::EnumString,
    strum::VariantNames,
)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
#[serde(rename_all = "lowercase")]
pub enum ScenarioKind {
    Smoke,
    #[default]
    Load,
    Spike,
}

impl ScenarioKind {
    /// Case-insensitive lookup; absent or unknown names fall back to [`ScenarioKind::Load`].
    pub fn resolve(name: Option<&str>) -> Self {
        let Some(name) = name.map(str::trim).filter(|n| !n.is_empty()) else {
            return Self::default();
        };

        name.parse().unwrap_or_else(|_| {
            warn!(scenario = name, "unknown scenario, using `{}`", Self::default());
            Self::default()
        })
    }

    fn profile(self) -> (Vec<Stage>, &'static [(&'static str, &'static [&'static str])]) {
        let secs = Duration::from_secs;
        match self {
            Self::Smoke => (
                vec![Stage::new(secs(30), 1), Stage::new(secs(30), 1)],
                SMOKE_THRESHOLDS,
            ),
            Self::Load => (
                vec![
                    Stage::new(secs(30), 10),
                    Stage::new(secs(60), 10),
                    Stage::new(secs(30), 0),
                ],
                LOAD_THRESHOLDS,
            ),
            Self::Spike => (
                vec![
                    Stage::new(secs(10), 10),
                    Stage::new(secs(10), 100),
                    Stage::new(secs(60), 100),
                    Stage::new(secs(10), 10),
                    Stage::new(secs(10), 0),
                ],
                SPIKE_THRESHOLDS,
            ),
        }
    }
}

const SMOKE_THRESHOLDS: &[(&str, &[&str])] = &[
    ("http_req_failed", &["rate<0.01"]),
    ("http_req_duration", &["p(95)<500", "p(99)<1000"]),
    ("checks", &["rate>0.99"]),
];

const LOAD_THRESHOLDS: &[(&str, &[&str])] = &[
    ("http_req_failed", &["rate<0.1"]),
    ("http_req_duration", &["p(95)<500", "p(99)<1000"]),
    ("checks", &["rate>0.9"]),
];

const SPIKE_THRESHOLDS: &[(&str, &[&str])] = &[
    ("http_req_failed", &["rate<0.15"]),
    ("http_req_duration", &["p(95)<1500", "p(99)<3000"]),
    ("checks", &["rate>0.85"]),
];

#[derive(Debug, Clone, PartialEq)]
pub struct ScenarioConfig {
    pub kind: ScenarioKind,
    pub stages: Vec<Stage>,
    pub thresholds: Vec<ThresholdSet>,
}

impl ScenarioConfig {
    pub fn total_duration(&self) -> Duration {
        self.stages
            .iter()
            .fold(Duration::ZERO, |acc, s| acc.saturating_add(s.duration))
    }

    pub fn peak_target(&self) -> u64 {
        self.stages.iter().map(|s| s.target).max().unwrap_or(0)
    }
}

/// Adjustments applied on top of a built-in profile.
#[derive(Debug, Clone, Default)]
pub struct ScenarioOverrides {
    /// Replaces the profile's stages when set.
    pub stages: Option<Vec<Stage>>,
    /// `(metric, expression)` pairs appended to the profile's thresholds.
    pub thresholds: Vec<(String, String)>,
}

/// Builds the scenario for `name` (lenient) and applies `overrides`.
///
/// # Errors
/// Fails only when a threshold expression does not parse.
pub fn resolve_scenario(name: Option<&str>, overrides: ScenarioOverrides) -> Result<ScenarioConfig> {
    let kind = ScenarioKind::resolve(name);
    let (profile_stages, profile_thresholds) = kind.profile();

    let mut thresholds: Vec<ThresholdSet> = Vec::with_capacity(profile_thresholds.len());
    for &(metric, exprs) in profile_thresholds {
        let set = ThresholdSet::parse(metric, exprs).map_err(|error| Error::InvalidThreshold {
            metric: metric.to_string(),
            error,
        })?;
        thresholds.push(set);
    }

    for (metric, expr) in overrides.thresholds {
        let parsed = crate::thresholds::parse_threshold_expr(&metric, &expr).map_err(|error| {
            Error::InvalidThreshold {
                metric: metric.clone(),
                error,
            }
        })?;

        match thresholds.iter_mut().find(|s| s.metric == metric) {
            Some(set) => set.thresholds.push(parsed),
            None => thresholds.push(ThresholdSet {
                metric,
                thresholds: vec![parsed],
            }),
        }
    }

    Ok(ScenarioConfig {
        kind,
        stages: overrides.stages.unwrap_or(profile_stages),
        thresholds,
    })
}

/// Parses `<integer><unit>` with unit `s`, `m` or `h`.
///
/// Anything else contributes zero seconds and logs a warning.
pub fn parse_stage_duration(raw: &str) -> Duration {
    let s = raw.trim();
    let digits_end = s.find(|c: char| !c.is_ascii_digit()).unwrap_or(s.len());
    let (digits, unit) = s.split_at(digits_end);

    let Ok(n) = digits.parse::<u64>() else {
        warn!(duration = raw, "stage duration has no numeric prefix, using 0s");
        return Duration::ZERO;
    };

    let unit_secs = match unit {
        "s" => 1,
        "m" => 60,
        "h" => 3600,
        _ => {
            warn!(duration = raw, "stage duration has an unknown unit, using 0s");
            return Duration::ZERO;
        }
    };

    Duration::from_secs(n.saturating_mul(unit_secs))
}

/// Parses a stage list such as `30s:10,1m:10,30s:0`.
pub fn parse_stages(raw: &str) -> Result<Vec<Stage>> {
    let invalid = || Error::InvalidStages {
        raw: raw.to_string(),
    };

    let stages = raw
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|part| {
            let (duration, target) = part.split_once(':').ok_or_else(invalid)?;
            let target: u64 = target.trim().parse().map_err(|_| invalid())?;
            Ok(Stage::new(parse_stage_duration(duration), target))
        })
        .collect::<Result<Vec<_>>>()?;

    if stages.is_empty() {
        return Err(invalid());
    }
    Ok(stages)
}
