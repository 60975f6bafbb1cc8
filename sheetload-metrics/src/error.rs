use crate::metrics::MetricKind;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("metric `{name}` is already registered as {existing}, cannot register it as {requested}")]
    KindMismatch {
        name: String,
        existing: MetricKind,
        requested: MetricKind,
    },
}

pub type Result<T> = std::result::Result<T, Error>;
