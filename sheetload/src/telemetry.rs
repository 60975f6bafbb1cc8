use tracing_subscriber::EnvFilter;

const DEFAULT_FILTER: &str = "warn,sheetload=info,sheetload_core=info";

/// Installs the stderr subscriber; stdout is reserved for the report.
pub(crate) fn init() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    // A second init (tests) keeps the first subscriber.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}
