use thiserror::Error;

/// Errors talking to the PromQL backend.
#[derive(Debug, Error)]
pub enum MetricsError {
    #[error("invalid metrics URL: {0}")]
    Url(#[from] url::ParseError),

    #[error("querying metrics backend: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("metrics backend returned {status}: {body}")]
    UpstreamStatus { status: u16, body: String },

    #[error("metrics query failed: status={0}")]
    QueryFailed(String),
}

pub type MetricsResult<T> = Result<T, MetricsError>;
