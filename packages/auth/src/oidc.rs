// ABOUTME: OIDC authorization-code flow: discovery, login redirect,
// ABOUTME: callback exchange, userinfo fetch, and cookie-bound sessions

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::extract::{Query, State};
use axum::http::{header, HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Redirect, Response};
use axum::routing::get;
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use rand::Rng;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use tracing::{info, warn};
use url::Url;

use crate::error::{AuthError, AuthResult};
use crate::session::{SessionStore, UserInfo};

pub const SESSION_COOKIE: &str = "depscope_session";

/// OIDC sessions live for 8 hours.
const SESSION_TTL: Duration = Duration::from_secs(8 * 3600);
/// Login state nonces expire after 10 minutes.
const STATE_TTL_SECS: i64 = 600;

#[derive(Debug, Clone, Default)]
pub struct OidcConfig {
    pub issuer: String,
    pub client_id: String,
    pub client_secret: String,
    pub redirect_url: String,
}

#[derive(Debug, Deserialize)]
struct Discovery {
    authorization_endpoint: String,
    token_endpoint: String,
    userinfo_endpoint: String,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
}

/// OIDC authenticator. Holds the discovered endpoints, the pending login
/// state nonces, and the session store.
pub struct OidcAuth {
    cfg: OidcConfig,
    discovery: Discovery,
    http: Client,
    sessions: SessionStore,
    pending: Mutex<HashMap<String, DateTime<Utc>>>,
}

impl OidcAuth {
    /// Fetches the issuer's discovery document and builds the
    /// authenticator.
    pub async fn discover(cfg: OidcConfig) -> AuthResult<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(AuthError::Discovery)?;

        let well_known = format!(
            "{}/.well-known/openid-configuration",
            cfg.issuer.trim_end_matches('/')
        );
        let discovery: Discovery = http
            .get(&well_known)
            .send()
            .await
            .map_err(AuthError::Discovery)?
            .error_for_status()
            .map_err(AuthError::Discovery)?
            .json()
            .await
            .map_err(AuthError::Discovery)?;

        info!(issuer = %cfg.issuer, "OIDC discovery complete");

        Ok(Self {
            cfg,
            discovery,
            http,
            sessions: SessionStore::new(SESSION_TTL),
            pending: Mutex::new(HashMap::new()),
        })
    }

    /// Resolves the session referenced by the request's cookie.
    pub async fn session_user(&self, headers: &HeaderMap) -> Option<UserInfo> {
        let id = cookie_value(headers, SESSION_COOKIE)?;
        Some(self.sessions.get(&id).await?.user)
    }

    pub fn stop(&self) {
        self.sessions.stop();
    }

    fn begin_login(&self) -> AuthResult<String> {
        let state = generate_state();
        if let Ok(mut pending) = self.pending.lock() {
            let now = Utc::now();
            pending.retain(|_, t| now.signed_duration_since(*t).num_seconds() < STATE_TTL_SECS);
            pending.insert(state.clone(), now);
        }

        let mut url = Url::parse(&self.discovery.authorization_endpoint)?;
        url.query_pairs_mut()
            .append_pair("response_type", "code")
            .append_pair("client_id", &self.cfg.client_id)
            .append_pair("redirect_uri", &self.cfg.redirect_url)
            .append_pair("scope", "openid profile email")
            .append_pair("state", &state);
        Ok(url.into())
    }

    fn take_state(&self, state: &str) -> bool {
        let Ok(mut pending) = self.pending.lock() else {
            return false;
        };
        match pending.remove(state) {
            Some(created) => Utc::now().signed_duration_since(created).num_seconds() < STATE_TTL_SECS,
            None => false,
        }
    }

    async fn exchange_code(&self, code: &str) -> AuthResult<UserInfo> {
        let token: TokenResponse = self
            .http
            .post(&self.discovery.token_endpoint)
            .form(&[
                ("grant_type", "authorization_code"),
                ("code", code),
                ("redirect_uri", &self.cfg.redirect_url),
                ("client_id", &self.cfg.client_id),
                ("client_secret", &self.cfg.client_secret),
            ])
            .send()
            .await
            .map_err(AuthError::TokenExchange)?
            .error_for_status()
            .map_err(AuthError::TokenExchange)?
            .json()
            .await
            .map_err(AuthError::TokenExchange)?;

        let user: UserInfo = self
            .http
            .get(&self.discovery.userinfo_endpoint)
            .bearer_auth(&token.access_token)
            .send()
            .await
            .map_err(AuthError::UserInfo)?
            .error_for_status()
            .map_err(AuthError::UserInfo)?
            .json()
            .await
            .map_err(AuthError::UserInfo)?;

        Ok(user)
    }
}

/// Mounts the login/callback/logout/userinfo endpoints.
pub fn routes(auth: Arc<OidcAuth>) -> Router {
    Router::new()
        .route("/login", get(login))
        .route("/callback", get(callback))
        .route("/logout", get(logout))
        .route("/userinfo", get(userinfo))
        .with_state(auth)
}

async fn login(State(auth): State<Arc<OidcAuth>>) -> Response {
    match auth.begin_login() {
        Ok(url) => Redirect::temporary(&url).into_response(),
        Err(e) => error_response(StatusCode::INTERNAL_SERVER_ERROR, &e.to_string()),
    }
}

#[derive(Debug, Deserialize)]
struct CallbackParams {
    #[serde(default)]
    code: String,
    #[serde(default)]
    state: String,
}

async fn callback(
    State(auth): State<Arc<OidcAuth>>,
    Query(params): Query<CallbackParams>,
) -> Response {
    if params.code.is_empty() {
        return error_response(StatusCode::BAD_REQUEST, "missing code parameter");
    }
    if !auth.take_state(&params.state) {
        warn!("OIDC callback with unknown or expired state");
        return error_response(
            StatusCode::UNAUTHORIZED,
            &AuthError::StateMismatch.to_string(),
        );
    }

    let user = match auth.exchange_code(&params.code).await {
        Ok(user) => user,
        Err(e) => {
            warn!(error = %e, "OIDC code exchange failed");
            return error_response(StatusCode::BAD_GATEWAY, &e.to_string());
        }
    };

    info!(subject = %user.subject, "OIDC login successful");
    let id = auth.sessions.create(user).await;

    let mut resp = Redirect::to("/").into_response();
    let cookie = format!(
        "{SESSION_COOKIE}={id}; Path=/; HttpOnly; SameSite=Lax; Max-Age={}",
        SESSION_TTL.as_secs()
    );
    if let Ok(value) = HeaderValue::from_str(&cookie) {
        resp.headers_mut().append(header::SET_COOKIE, value);
    }
    resp
}

async fn logout(State(auth): State<Arc<OidcAuth>>, headers: HeaderMap) -> Response {
    if let Some(id) = cookie_value(&headers, SESSION_COOKIE) {
        auth.sessions.delete(&id).await;
    }

    let mut resp = Redirect::to("/").into_response();
    let cookie = format!("{SESSION_COOKIE}=; Path=/; HttpOnly; SameSite=Lax; Max-Age=0");
    if let Ok(value) = HeaderValue::from_str(&cookie) {
        resp.headers_mut().append(header::SET_COOKIE, value);
    }
    resp
}

async fn userinfo(State(auth): State<Arc<OidcAuth>>, headers: HeaderMap) -> Response {
    match auth.session_user(&headers).await {
        Some(user) => Json(user).into_response(),
        None => error_response(
            StatusCode::UNAUTHORIZED,
            &AuthError::Unauthorized.to_string(),
        ),
    }
}

fn error_response(status: StatusCode, message: &str) -> Response {
    (status, Json(json!({ "error": message }))).into_response()
}

/// Extracts a cookie value from the request headers.
pub(crate) fn cookie_value(headers: &HeaderMap, name: &str) -> Option<String> {
    let raw = headers.get(header::COOKIE)?.to_str().ok()?;
    raw.split(';')
        .filter_map(|part| part.trim().split_once('='))
        .find(|(key, _)| *key == name)
        .map(|(_, value)| value.to_string())
}

fn generate_state() -> String {
    let bytes: [u8; 16] = rand::thread_rng().gen();
    hex::encode(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cookie_value_finds_named_cookie() {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::COOKIE,
            HeaderValue::from_static("theme=dark; depscope_session=abc123; lang=en"),
        );
        assert_eq!(
            cookie_value(&headers, SESSION_COOKIE).as_deref(),
            Some("abc123")
        );
        assert_eq!(cookie_value(&headers, "missing"), None);
    }

    #[test]
    fn state_nonces_are_unique_hex() {
        let a = generate_state();
        let b = generate_state();
        assert_eq!(a.len(), 32);
        assert_ne!(a, b);
    }
}
