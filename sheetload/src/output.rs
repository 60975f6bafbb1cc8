use crate::cli::OutputFormat;

mod human;
mod json;

pub(crate) trait OutputFormatter: Send + Sync {
    fn print_header(&self, base_url: &str, scenario: &sheetload_core::ScenarioConfig);
    fn progress(&self) -> Option<sheetload_core::ProgressFn>;
    fn print_summary(&self, summary: &sheetload_core::Summary) -> anyhow::Result<()>;
}

pub(crate) fn formatter(format: OutputFormat) -> Box<dyn OutputFormatter> {
    match format {
        OutputFormat::HumanReadable => Box::new(human::HumanReadableOutput::new()),
        OutputFormat::Json => Box::new(json::JsonOutput),
    }
}
