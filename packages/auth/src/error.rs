// ABOUTME: Error types for authentication and session handling
// ABOUTME: Covers OIDC discovery, code exchange, and rejected requests

use thiserror::Error;

pub type AuthResult<T> = Result<T, AuthError>;

#[derive(Error, Debug)]
pub enum AuthError {
    #[error("discovering OIDC issuer: {0}")]
    Discovery(#[source] reqwest::Error),

    #[error("invalid OIDC endpoint URL: {0}")]
    Endpoint(#[from] url::ParseError),

    #[error("exchanging authorization code: {0}")]
    TokenExchange(#[source] reqwest::Error),

    #[error("fetching userinfo: {0}")]
    UserInfo(#[source] reqwest::Error),

    #[error("state mismatch: CSRF protection failed")]
    StateMismatch,

    #[error("authentication required")]
    Unauthorized,
}
