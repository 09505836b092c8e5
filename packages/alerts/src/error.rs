use thiserror::Error;

#[derive(Debug, Error)]
pub enum AlertsError {
    #[error("fetching alerts: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("alertmanager returned {status}: {body}")]
    UpstreamStatus { status: u16, body: String },
}

pub type AlertsResult<T> = Result<T, AlertsError>;
