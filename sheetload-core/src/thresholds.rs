use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
pub enum ThresholdOp {
    #[strum(serialize = "<")]
    Lt,
    #[strum(serialize = "<=")]
    Lte,
    #[strum(serialize = ">")]
    Gt,
    #[strum(serialize = ">=")]
    Gte,
}

impl ThresholdOp {
    pub fn compare(self, observed: f64, expected: f64) -> bool {
        match self {
            Self::Lt => observed < expected,
            Self::Lte => observed <= expected,
            Self::Gt => observed > expected,
            Self::Gte => observed >= expected,
        }
    }
}

/// Left-hand side of a threshold: which number of the metric is compared.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MetricRef {
    /// Trend percentile, `0..=100`.
    Percentile(f64),
    Rate,
    Count,
    /// Primary value: Counter total or Rate fraction. Also written as the metric's own name.
    Value,
    Avg,
    Min,
    Med,
    Max,
}

impl fmt::Display for MetricRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Percentile(p) => write!(f, "p({p})"),
            Self::Rate => f.write_str("rate"),
            Self::Count => f.write_str("count"),
            Self::Value => f.write_str("value"),
            Self::Avg => f.write_str("avg"),
            Self::Min => f.write_str("min"),
            Self::Med => f.write_str("med"),
            Self::Max => f.write_str("max"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Threshold {
    /// Expression as written, for reporting.
    pub source: String,
    pub metric_ref: MetricRef,
    pub op: ThresholdOp,
    pub value: f64,
}

/// All conditions declared for one metric.
#[derive(Debug, Clone, PartialEq)]
pub struct ThresholdSet {
    pub metric: String,
    pub thresholds: Vec<Threshold>,
}

impl ThresholdSet {
    pub fn parse<S: AsRef<str>>(metric: &str, expressions: &[S]) -> Result<Self, String> {
        let thresholds = expressions
            .iter()
            .map(|raw| parse_threshold_expr(metric, raw.as_ref()))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            metric: metric.to_string(),
            thresholds,
        })
    }
}

/// Parses `<metric-ref> <op> <literal>`.
///
/// `metric` lets the metric's own name stand in for its primary value (`checks>0.9`).
pub fn parse_threshold_expr(metric: &str, raw: &str) -> Result<Threshold, String> {
    let s: String = raw.chars().filter(|c| !c.is_whitespace()).collect();
    if s.is_empty() {
        return Err("empty threshold".to_string());
    }

    // Two-char operators first so `<=` is not read as `<` followed by `=`.
    let ops = [
        ("<=", ThresholdOp::Lte),
        (">=", ThresholdOp::Gte),
        ("<", ThresholdOp::Lt),
        (">", ThresholdOp::Gt),
    ];
    let (op_pos, op_len, op) = ops
        .iter()
        .find_map(|(tok, op)| s.find(tok).map(|pos| (pos, tok.len(), *op)))
        .ok_or_else(|| format!("invalid threshold (missing operator): {raw}"))?;

    let (left, right_with_op) = s.split_at(op_pos);
    let right = &right_with_op[op_len..];
    if left.is_empty() || right.is_empty() {
        return Err(format!("invalid threshold: {raw}"));
    }

    let metric_ref = if left.eq_ignore_ascii_case("avg") {
        MetricRef::Avg
    } else if left.eq_ignore_ascii_case("min") {
        MetricRef::Min
    } else if left.eq_ignore_ascii_case("med") {
        MetricRef::Med
    } else if left.eq_ignore_ascii_case("max") {
        MetricRef::Max
    } else if left.eq_ignore_ascii_case("count") {
        MetricRef::Count
    } else if left.eq_ignore_ascii_case("rate") {
        MetricRef::Rate
    } else if left.eq_ignore_ascii_case("value") || left == metric {
        MetricRef::Value
    } else if let Some(inner) = left.strip_prefix("p(").and_then(|v| v.strip_suffix(')')) {
        let p: f64 = inner
            .parse()
            .map_err(|_| format!("invalid percentile in threshold: {raw}"))?;
        if !(0.0..=100.0).contains(&p) {
            return Err(format!("percentile out of range in threshold: {raw}"));
        }
        MetricRef::Percentile(p)
    } else {
        return Err(format!("unknown metric reference `{left}` in threshold: {raw}"));
    };

    let value: f64 = right
        .parse()
        .ok()
        .filter(|v: &f64| v.is_finite())
        .ok_or_else(|| format!("invalid numeric value in threshold: {raw}"))?;

    Ok(Threshold {
        source: raw.trim().to_string(),
        metric_ref,
        op,
        value,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(metric: &str, raw: &str) -> Threshold {
        parse_threshold_expr(metric, raw).unwrap_or_else(|e| panic!("{e}"))
    }

    fn parse_err(raw: &str) -> String {
        match parse_threshold_expr("http_req_duration", raw) {
            Ok(t) => panic!("expected error for `{raw}`, got {t:?}"),
            Err(e) => e,
        }
    }

    #[test]
    fn parses_percentiles_and_rates() {
        let t = parse("http_req_duration", "p(95)<500");
        assert_eq!(t.metric_ref, MetricRef::Percentile(95.0));
        assert_eq!(t.op, ThresholdOp::Lt);
        assert_eq!(t.value, 500.0);

        let t = parse("http_req_duration", "p(99.9) <= 1500");
        assert_eq!(t.metric_ref, MetricRef::Percentile(99.9));
        assert_eq!(t.op, ThresholdOp::Lte);

        let t = parse("http_req_failed", "rate<0.1");
        assert_eq!(t.metric_ref, MetricRef::Rate);
        assert_eq!(t.source, "rate<0.1");
    }

    #[test]
    fn trims_whitespace() {
        let t = parse("iteration_duration", "  avg  >=  123  ");
        assert_eq!(t.metric_ref, MetricRef::Avg);
        assert_eq!(t.op, ThresholdOp::Gte);
        assert_eq!(t.value, 123.0);
        assert_eq!(t.source, "avg  >=  123");
    }

    #[test]
    fn metric_name_and_value_mean_primary_value() {
        assert_eq!(parse("checks", "checks>0.9").metric_ref, MetricRef::Value);
        assert_eq!(parse("http_reqs", "value>10").metric_ref, MetricRef::Value);
        assert_eq!(parse("http_reqs", "count>10").metric_ref, MetricRef::Count);
        assert_eq!(parse("http_req_duration", "med<100").metric_ref, MetricRef::Med);
    }

    #[test]
    fn rejects_malformed_expressions() {
        assert!(parse_err("p(101)<1").contains("out of range"));
        assert!(parse_err("p(abc)<1").contains("invalid percentile"));
        assert!(parse_err("count==2").contains("missing operator"));
        assert!(parse_err("rate<").contains("invalid threshold"));
        assert!(parse_err("<5").contains("invalid threshold"));
        assert!(parse_err("stddev<5").contains("unknown metric reference"));
        assert!(parse_err("rate<fast").contains("invalid numeric value"));
        assert!(parse_err("rate<NaN").contains("invalid numeric value"));
        assert!(parse_err("   ").contains("empty"));
    }

    #[test]
    fn boundary_of_strict_less_than() {
        let t = parse("http_req_failed", "rate<0.1");
        assert!(t.op.compare(0.0999, t.value));
        assert!(!t.op.compare(0.1, t.value));
        assert!(!t.op.compare(0.5, t.value));
    }

    #[test]
    fn threshold_set_fails_on_first_bad_expression() {
        let ok = ThresholdSet::parse("http_req_duration", &["p(95)<500", "p(99)<1000"])
            .unwrap_or_else(|e| panic!("{e}"));
        assert_eq!(ok.thresholds.len(), 2);

        assert!(ThresholdSet::parse("http_req_duration", &["p(95)<500", "bogus"]).is_err());
    }
}
