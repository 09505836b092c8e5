// ABOUTME: depscope server entry point: wires config, clients, and router
// ABOUTME: Serves the topology API with graceful shutdown

use std::sync::Arc;

use axum::http::{header, Method};
use axum::Router;
use tower_http::compression::CompressionLayer;
use tower_http::cors::{Any, CorsLayer};
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

mod config;
mod grafana;
mod middleware;

use depscope_alerts::{AlertManagerClient, AlertSource, AlertsConfig};
use depscope_api::{
    create_api_router, create_probe_router, create_public_router, AppState, ConfigAlerts,
    ConfigAuth, ConfigCache, ConfigDashboards, ConfigGrafana, ConfigResponse,
};
use depscope_auth::{require_auth, Authenticator, BasicAuth, OidcAuth, OidcConfig};
use depscope_export::graphviz_available;
use depscope_metrics::{MetricsBackend, MetricsConfig, PrometheusClient};
use depscope_topology::{GrafanaConfig, GraphBuilder, TopologyCache};

use config::Config;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let cfg = Config::from_env()?;
    init_logging(&cfg.log_format);

    let metrics: Arc<dyn MetricsBackend> = Arc::new(PrometheusClient::new(MetricsConfig {
        url: cfg.prometheus.url.clone(),
        username: cfg.prometheus.username.clone(),
        password: cfg.prometheus.password.clone(),
        ..Default::default()
    })?);

    let alerts: Option<Arc<dyn AlertSource>> = if cfg.alertmanager.url.is_empty() {
        None
    } else {
        Some(Arc::new(AlertManagerClient::new(AlertsConfig {
            url: cfg.alertmanager.url.clone(),
            username: cfg.alertmanager.username.clone(),
            password: cfg.alertmanager.password.clone(),
            ..Default::default()
        })?))
    };

    let builder = Arc::new(GraphBuilder::new(
        Arc::clone(&metrics),
        alerts.clone(),
        GrafanaConfig {
            base_url: cfg.grafana.base_url.clone(),
            service_status_uid: cfg.grafana.dashboards.service_status.clone(),
            link_status_uid: cfg.grafana.dashboards.link_status.clone(),
        },
        cfg.cache_ttl,
        cfg.lookback,
        cfg.severity_levels.clone(),
    ));
    let cache = Arc::new(TopologyCache::new(cfg.cache_ttl));

    let authenticator = Arc::new(build_authenticator(&cfg).await?);

    let grafana_available = grafana::check_grafana(&cfg.grafana).await;
    if !cfg.grafana.base_url.is_empty() && !grafana_available {
        warn!("grafana links will be served but the instance looks unreachable");
    }
    if !graphviz_available() {
        warn!("graphviz not found; png/svg export will answer 503");
    }

    let state = AppState {
        builder,
        cache,
        metrics,
        alerts,
        severity_levels: cfg.severity_levels.clone(),
        config: Arc::new(frontend_config(&cfg, &authenticator, grafana_available)),
    };

    let mut app = Router::new()
        .merge(create_probe_router())
        .merge(create_public_router().with_state(state.clone()));

    if let Some(auth_routes) = authenticator.routes() {
        app = app.nest("/auth", auth_routes);
    }

    let protected = create_api_router()
        .with_state(state)
        .layer(axum::middleware::from_fn_with_state(
            Arc::clone(&authenticator),
            require_auth,
        ));
    app = app.merge(protected);

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::OPTIONS])
        .allow_headers([header::ACCEPT, header::CONTENT_TYPE, header::IF_NONE_MATCH]);

    let app = app
        .layer(middleware::create_panic_handler())
        .layer(CompressionLayer::new())
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid));

    info!(listen = %cfg.listen, "depscope listening");
    let listener = tokio::net::TcpListener::bind(&cfg.listen).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    authenticator.stop();
    info!("shutdown complete");
    Ok(())
}

fn init_logging(format: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if format == "json" {
        builder.json().init();
    } else {
        builder.init();
    }
}

async fn build_authenticator(cfg: &Config) -> anyhow::Result<Authenticator> {
    match cfg.auth.kind.as_str() {
        "basic" => Ok(Authenticator::Basic(BasicAuth::new(
            cfg.auth.basic_users.clone(),
        ))),
        "oidc" => {
            let oidc = OidcAuth::discover(OidcConfig {
                issuer: cfg.auth.oidc_issuer.clone(),
                client_id: cfg.auth.oidc_client_id.clone(),
                client_secret: cfg.auth.oidc_client_secret.clone(),
                redirect_url: cfg.auth.oidc_redirect_url.clone(),
            })
            .await?;
            Ok(Authenticator::Oidc(Arc::new(oidc)))
        }
        _ => Ok(Authenticator::None),
    }
}

fn frontend_config(
    cfg: &Config,
    authenticator: &Authenticator,
    grafana_available: bool,
) -> ConfigResponse {
    ConfigResponse {
        grafana: ConfigGrafana {
            base_url: cfg.grafana.base_url.clone(),
            available: grafana_available,
            dashboards: ConfigDashboards {
                service_status: cfg.grafana.dashboards.service_status.clone(),
                link_status: cfg.grafana.dashboards.link_status.clone(),
                service_list: cfg.grafana.dashboards.service_list.clone(),
                services_status: cfg.grafana.dashboards.services_status.clone(),
                links_status: cfg.grafana.dashboards.links_status.clone(),
                cascade_overview: cfg.grafana.dashboards.cascade_overview.clone(),
                root_cause: cfg.grafana.dashboards.root_cause.clone(),
            },
        },
        cache: ConfigCache {
            ttl: cfg.cache_ttl.as_secs(),
        },
        auth: ConfigAuth {
            kind: authenticator.kind().to_string(),
        },
        alerts: ConfigAlerts {
            enabled: !cfg.alertmanager.url.is_empty(),
            severity_levels: cfg.severity_levels.clone(),
        },
    }
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_err() {
        warn!("failed to install ctrl-c handler");
        return;
    }
    info!("shutdown signal received");
}
