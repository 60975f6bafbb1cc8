use std::time::Duration;

/// Renders as one rounded component in `ms`, `s` or `m`.
pub(crate) fn format_duration_single(d: Duration) -> String {
    const MS_PER_S: u128 = 1_000;
    const MS_PER_M: u128 = 60_000;

    fn round_div(value: u128, unit: u128) -> u128 {
        // Ties round up.
        (value + (unit / 2)) / unit
    }

    let total_ms = d.as_millis();

    if total_ms >= 10 * MS_PER_M {
        return format!("{}m", round_div(total_ms, MS_PER_M));
    }
    if total_ms >= MS_PER_S {
        return format!("{}s", round_div(total_ms, MS_PER_S));
    }
    format!("{total_ms}ms")
}
