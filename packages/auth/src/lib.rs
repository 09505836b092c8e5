// ABOUTME: Authentication for the depscope API: none, basic, and OIDC
// ABOUTME: Exposes an axum middleware guarding the protected routes

pub mod basic;
pub mod error;
pub mod oidc;
pub mod session;

use std::sync::Arc;

use axum::extract::{Request, State};
use axum::http::{header, HeaderMap, HeaderValue, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::{Json, Router};
use serde_json::json;

pub use basic::{hash_password, BasicAuth, BasicUser};
pub use error::{AuthError, AuthResult};
pub use oidc::{OidcAuth, OidcConfig, SESSION_COOKIE};
pub use session::{Session, SessionStore, UserInfo};

/// The configured authentication mode.
pub enum Authenticator {
    None,
    Basic(BasicAuth),
    Oidc(Arc<OidcAuth>),
}

impl Authenticator {
    /// The auth type exposed through the config endpoint.
    pub fn kind(&self) -> &'static str {
        match self {
            Authenticator::None => "none",
            Authenticator::Basic(_) => "basic",
            Authenticator::Oidc(_) => "oidc",
        }
    }

    /// Extra routes required by the mode (OIDC login flow).
    pub fn routes(&self) -> Option<Router> {
        match self {
            Authenticator::Oidc(auth) => Some(oidc::routes(Arc::clone(auth))),
            _ => None,
        }
    }

    /// Stops any background work owned by the authenticator.
    pub fn stop(&self) {
        if let Authenticator::Oidc(auth) = self {
            auth.stop();
        }
    }

    async fn authorize(&self, headers: &HeaderMap) -> bool {
        match self {
            Authenticator::None => true,
            Authenticator::Basic(basic) => headers
                .get(header::AUTHORIZATION)
                .and_then(|v| v.to_str().ok())
                .is_some_and(|v| basic.verify(v)),
            Authenticator::Oidc(auth) => auth.session_user(headers).await.is_some(),
        }
    }
}

/// Axum middleware rejecting unauthenticated requests with a JSON 401.
pub async fn require_auth(
    State(auth): State<Arc<Authenticator>>,
    req: Request,
    next: Next,
) -> Response {
    if auth.authorize(req.headers()).await {
        return next.run(req).await;
    }

    let mut resp = (
        StatusCode::UNAUTHORIZED,
        Json(json!({ "error": AuthError::Unauthorized.to_string() })),
    )
        .into_response();
    if matches!(auth.as_ref(), Authenticator::Basic(_)) {
        resp.headers_mut().insert(
            header::WWW_AUTHENTICATE,
            HeaderValue::from_static(r#"Basic realm="depscope""#),
        );
    }
    resp
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::routing::get;
    use base64::{engine::general_purpose::STANDARD, Engine};
    use tower::ServiceExt;

    fn protected(auth: Authenticator) -> Router {
        let auth = Arc::new(auth);
        Router::new()
            .route("/ping", get(|| async { "pong" }))
            .layer(axum::middleware::from_fn_with_state(auth, require_auth))
    }

    #[tokio::test]
    async fn none_mode_lets_everything_through() {
        let app = protected(Authenticator::None);
        let resp = app
            .oneshot(Request::builder().uri("/ping").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn basic_mode_rejects_missing_credentials() {
        let app = protected(Authenticator::Basic(BasicAuth::new(vec![BasicUser {
            username: "sre".into(),
            password_hash: hash_password("hunter2"),
        }])));

        let resp = app
            .oneshot(Request::builder().uri("/ping").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            resp.headers()
                .get(header::WWW_AUTHENTICATE)
                .and_then(|v| v.to_str().ok()),
            Some(r#"Basic realm="depscope""#)
        );
    }

    #[tokio::test]
    async fn basic_mode_accepts_valid_credentials() {
        let app = protected(Authenticator::Basic(BasicAuth::new(vec![BasicUser {
            username: "sre".into(),
            password_hash: hash_password("hunter2"),
        }])));

        let resp = app
            .oneshot(
                Request::builder()
                    .uri("/ping")
                    .header(
                        header::AUTHORIZATION,
                        format!("Basic {}", STANDARD.encode("sre:hunter2")),
                    )
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
    }
}
