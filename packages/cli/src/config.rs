// ABOUTME: Environment-driven configuration with validation
// ABOUTME: All keys are prefixed DEPSCOPE_; .env files load via dotenvy

use std::env;
use std::time::Duration;

use thiserror::Error;

use depscope_auth::BasicUser;
use depscope_topology::models::default_severity_levels;
use depscope_topology::SeverityLevel;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("DEPSCOPE_PROMETHEUS_URL is required")]
    MissingPrometheusUrl,

    #[error("{key} is not a valid duration: {value} (expected e.g. 15s, 90m, 2h)")]
    InvalidDuration { key: &'static str, value: String },

    #[error("DEPSCOPE_LOOKBACK must be at least 1m when set (got {0:?})")]
    LookbackTooShort(Duration),

    #[error("unknown DEPSCOPE_AUTH_TYPE: {0:?} (supported: none, basic, oidc)")]
    UnknownAuthType(String),

    #[error("DEPSCOPE_AUTH_BASIC_USERS must not be empty when auth type is \"basic\"")]
    NoBasicUsers,

    #[error("DEPSCOPE_AUTH_BASIC_USERS entry {0:?} is not in user:sha256hex form")]
    InvalidBasicUser(String),

    #[error("{0} is required when auth type is \"oidc\"")]
    MissingOidcField(&'static str),

    #[error("DEPSCOPE_SEVERITY_LEVELS is not valid JSON: {0}")]
    InvalidSeverityLevels(#[from] serde_json::Error),

    #[error("severity level {index} color {color:?} is not a #RRGGBB hex color")]
    InvalidSeverityColor { index: usize, color: String },

    #[error("LOG_FORMAT {0:?} is invalid (expected text or json)")]
    InvalidLogFormat(String),
}

#[derive(Debug, Clone, Default)]
pub struct DatasourceSettings {
    pub url: String,
    pub username: String,
    pub password: String,
}

#[derive(Debug, Clone, Default)]
pub struct AuthSettings {
    pub kind: String,
    pub basic_users: Vec<BasicUser>,
    pub oidc_issuer: String,
    pub oidc_client_id: String,
    pub oidc_client_secret: String,
    pub oidc_redirect_url: String,
}

#[derive(Debug, Clone, Default)]
pub struct GrafanaSettings {
    pub base_url: String,
    pub token: String,
    pub username: String,
    pub password: String,
    pub dashboards: DashboardSettings,
}

#[derive(Debug, Clone, Default)]
pub struct DashboardSettings {
    pub service_status: String,
    pub link_status: String,
    pub service_list: String,
    pub services_status: String,
    pub links_status: String,
    pub cascade_overview: String,
    pub root_cause: String,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub listen: String,
    pub prometheus: DatasourceSettings,
    pub alertmanager: DatasourceSettings,
    pub cache_ttl: Duration,
    pub lookback: Duration,
    pub auth: AuthSettings,
    pub grafana: GrafanaSettings,
    pub severity_levels: Vec<SeverityLevel>,
    pub log_format: String,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        let listen = get("DEPSCOPE_LISTEN").unwrap_or_else(|| "0.0.0.0:8080".to_string());

        let prometheus = DatasourceSettings {
            url: get("DEPSCOPE_PROMETHEUS_URL").ok_or(ConfigError::MissingPrometheusUrl)?,
            username: get("DEPSCOPE_PROMETHEUS_USERNAME").unwrap_or_default(),
            password: get("DEPSCOPE_PROMETHEUS_PASSWORD").unwrap_or_default(),
        };

        let alertmanager = DatasourceSettings {
            url: get("DEPSCOPE_ALERTMANAGER_URL").unwrap_or_default(),
            username: get("DEPSCOPE_ALERTMANAGER_USERNAME").unwrap_or_default(),
            password: get("DEPSCOPE_ALERTMANAGER_PASSWORD").unwrap_or_default(),
        };

        let cache_ttl = duration_var("DEPSCOPE_CACHE_TTL", Duration::from_secs(15))?;
        let lookback = duration_var("DEPSCOPE_LOOKBACK", Duration::ZERO)?;
        if lookback > Duration::ZERO && lookback < Duration::from_secs(60) {
            return Err(ConfigError::LookbackTooShort(lookback));
        }

        let auth = auth_from_env()?;

        let grafana = GrafanaSettings {
            base_url: get("DEPSCOPE_GRAFANA_BASE_URL").unwrap_or_default(),
            token: get("DEPSCOPE_GRAFANA_TOKEN").unwrap_or_default(),
            username: get("DEPSCOPE_GRAFANA_USERNAME").unwrap_or_default(),
            password: get("DEPSCOPE_GRAFANA_PASSWORD").unwrap_or_default(),
            dashboards: DashboardSettings {
                service_status: get("DEPSCOPE_GRAFANA_DASH_SERVICE_STATUS").unwrap_or_default(),
                link_status: get("DEPSCOPE_GRAFANA_DASH_LINK_STATUS").unwrap_or_default(),
                service_list: get("DEPSCOPE_GRAFANA_DASH_SERVICE_LIST").unwrap_or_default(),
                services_status: get("DEPSCOPE_GRAFANA_DASH_SERVICES_STATUS").unwrap_or_default(),
                links_status: get("DEPSCOPE_GRAFANA_DASH_LINKS_STATUS").unwrap_or_default(),
                cascade_overview: get("DEPSCOPE_GRAFANA_DASH_CASCADE_OVERVIEW")
                    .unwrap_or_default(),
                root_cause: get("DEPSCOPE_GRAFANA_DASH_ROOT_CAUSE").unwrap_or_default(),
            },
        };

        let severity_levels = match get("DEPSCOPE_SEVERITY_LEVELS") {
            Some(raw) => serde_json::from_str::<Vec<SeverityLevel>>(&raw)?,
            None => default_severity_levels(),
        };
        for (index, level) in severity_levels.iter().enumerate() {
            if !is_hex_color(&level.color) {
                return Err(ConfigError::InvalidSeverityColor {
                    index,
                    color: level.color.clone(),
                });
            }
        }

        let log_format = get("LOG_FORMAT").unwrap_or_else(|| "json".to_string());
        if log_format != "json" && log_format != "text" {
            return Err(ConfigError::InvalidLogFormat(log_format));
        }

        Ok(Config {
            listen,
            prometheus,
            alertmanager,
            cache_ttl,
            lookback,
            auth,
            grafana,
            severity_levels,
            log_format,
        })
    }
}

fn auth_from_env() -> Result<AuthSettings, ConfigError> {
    let kind = get("DEPSCOPE_AUTH_TYPE").unwrap_or_else(|| "none".to_string());
    let mut auth = AuthSettings {
        kind: kind.clone(),
        ..Default::default()
    };

    match kind.as_str() {
        "none" => {}
        "basic" => {
            let raw = get("DEPSCOPE_AUTH_BASIC_USERS").unwrap_or_default();
            for entry in raw.split(',').map(str::trim).filter(|s| !s.is_empty()) {
                let Some((username, hash)) = entry.split_once(':') else {
                    return Err(ConfigError::InvalidBasicUser(entry.to_string()));
                };
                if username.is_empty() || hash.len() != 64 {
                    return Err(ConfigError::InvalidBasicUser(entry.to_string()));
                }
                auth.basic_users.push(BasicUser {
                    username: username.to_string(),
                    password_hash: hash.to_lowercase(),
                });
            }
            if auth.basic_users.is_empty() {
                return Err(ConfigError::NoBasicUsers);
            }
        }
        "oidc" => {
            auth.oidc_issuer = get("DEPSCOPE_AUTH_OIDC_ISSUER")
                .ok_or(ConfigError::MissingOidcField("DEPSCOPE_AUTH_OIDC_ISSUER"))?;
            auth.oidc_client_id = get("DEPSCOPE_AUTH_OIDC_CLIENT_ID")
                .ok_or(ConfigError::MissingOidcField("DEPSCOPE_AUTH_OIDC_CLIENT_ID"))?;
            auth.oidc_client_secret = get("DEPSCOPE_AUTH_OIDC_CLIENT_SECRET").unwrap_or_default();
            auth.oidc_redirect_url = get("DEPSCOPE_AUTH_OIDC_REDIRECT_URL").ok_or(
                ConfigError::MissingOidcField("DEPSCOPE_AUTH_OIDC_REDIRECT_URL"),
            )?;
        }
        other => return Err(ConfigError::UnknownAuthType(other.to_string())),
    }
    Ok(auth)
}

fn get(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.is_empty())
}

fn duration_var(key: &'static str, default: Duration) -> Result<Duration, ConfigError> {
    match get(key) {
        None => Ok(default),
        Some(raw) => parse_duration(&raw).ok_or(ConfigError::InvalidDuration { key, value: raw }),
    }
}

/// Accepts bare seconds or a single h/m/s suffix.
fn parse_duration(raw: &str) -> Option<Duration> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    if let Ok(secs) = raw.parse::<u64>() {
        return Some(Duration::from_secs(secs));
    }
    let (number, unit) = raw.split_at(raw.len() - 1);
    let n: u64 = number.parse().ok()?;
    match unit {
        "s" => Some(Duration::from_secs(n)),
        "m" => Some(Duration::from_secs(n * 60)),
        "h" => Some(Duration::from_secs(n * 3600)),
        _ => None,
    }
}

fn is_hex_color(s: &str) -> bool {
    s.len() == 7
        && s.starts_with('#')
        && s[1..].chars().all(|c| c.is_ascii_hexdigit())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_duration_accepts_suffixes_and_bare_seconds() {
        assert_eq!(parse_duration("15"), Some(Duration::from_secs(15)));
        assert_eq!(parse_duration("15s"), Some(Duration::from_secs(15)));
        assert_eq!(parse_duration("90m"), Some(Duration::from_secs(5400)));
        assert_eq!(parse_duration("2h"), Some(Duration::from_secs(7200)));
        assert_eq!(parse_duration("2d"), None);
        assert_eq!(parse_duration(""), None);
        assert_eq!(parse_duration("abc"), None);
    }

    #[test]
    fn hex_color_validation() {
        assert!(is_hex_color("#f44336"));
        assert!(is_hex_color("#ABCDEF"));
        assert!(!is_hex_color("f44336"));
        assert!(!is_hex_color("#f443"));
        assert!(!is_hex_color("#f4433g"));
    }

    #[test]
    fn default_severity_levels_are_valid() {
        for level in default_severity_levels() {
            assert!(is_hex_color(&level.color));
        }
    }
}
