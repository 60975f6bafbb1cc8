pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("metrics registry: {0}")]
    Metrics(#[from] sheetload_metrics::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid threshold for metric `{metric}`: {error}")]
    InvalidThreshold { metric: String, error: String },

    #[error("invalid stages `{raw}`: expected `<duration>:<target>[,<duration>:<target>...]`")]
    InvalidStages { raw: String },

    #[error("invalid output path: `{0}`")]
    InvalidOutputPath(String),
}
