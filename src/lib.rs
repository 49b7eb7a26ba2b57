//! Greenlight is a JSON API over a movie catalogue, with token based account
//! activation and authentication.

#![forbid(unsafe_code)]

mod crypto;
pub mod database;
pub mod error;
mod mail;
mod middleware;
pub mod movie;
mod router;
pub mod telemetry;
pub mod token;
pub mod user;
mod validation;

pub mod config;

use std::sync::Arc;
use std::time::Duration;

use axum::body::Bytes;
use axum::extract::DefaultBodyLimit;
use axum::http::{HeaderValue, Method, StatusCode, header};
use axum::routing::{get, post};
use axum::{Router, middleware as AxumMiddleware};
use metrics_exporter_prometheus::PrometheusHandle;
use tower::ServiceBuilder;
use tower_http::LatencyUnit;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::sensitive_headers::SetSensitiveHeadersLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::{
    DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer,
};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// MUST NEVER be used in production.
#[cfg(test)]
pub async fn make_request(
    app: Router,
    method: Method,
    path: &str,
    token: Option<&str>,
    body: String,
) -> axum::http::Response<axum::body::Body> {
    use axum::extract::Request;
    use tower::util::ServiceExt;

    let mut request = Request::builder()
        .method(method)
        .uri(path)
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(token) = token {
        request = request.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }

    app.oneshot(request.body(axum::body::Body::from(body)).unwrap())
        .await
        .unwrap()
}

/// State sharing between routes.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<config::Configuration>,
    pub db: database::Database,
    pub crypto: Arc<crypto::Crypto>,
    pub token: token::TokenManager,
    pub mail: Arc<dyn mail::Mailer>,
    pub metrics: Option<PrometheusHandle>,
}

fn cors(config: &config::Configuration) -> CorsLayer {
    let origin = if config.trusted_origins.is_empty() {
        AllowOrigin::from(Any)
    } else {
        AllowOrigin::list(
            config
                .trusted_origins
                .iter()
                .filter_map(|origin| HeaderValue::from_str(origin).ok()),
        )
    };

    CorsLayer::new()
        .allow_origin(origin)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
        .vary([header::ORIGIN, header::AUTHORIZATION])
}

/// Create router.
pub fn app(state: AppState) -> Router {
    let routes = Router::new()
        // `GET /v1/healthcheck` goes to `healthcheck`.
        .route("/v1/healthcheck", get(router::status::healthcheck))
        // `GET /debug/metrics` goes to `metrics`.
        .route("/debug/metrics", get(router::status::metrics))
        .merge(router::movies::router(&state))
        .merge(router::users::router())
        // `POST /v1/tokens/authentication` goes to `tokens`.
        .route("/v1/tokens/authentication", post(router::tokens::handler));

    layered(routes, state)
}

/// Wrap routes with fallbacks, authentication and the middleware stack.
fn layered(routes: Router<AppState>, state: AppState) -> Router {
    let middleware = ServiceBuilder::new()
        // Add high level tracing/logging to all requests.
        .layer(
            TraceLayer::new_for_http()
                .on_body_chunk(|chunk: &Bytes, latency: Duration, _span: &tracing::Span| {
                    tracing::trace!(size_bytes = chunk.len(), latency = ?latency, "sending body chunk")
                })
                .make_span_with(DefaultMakeSpan::new().include_headers(true).level(tracing::Level::INFO))
                .on_request(DefaultOnRequest::new())
                .on_response(DefaultOnResponse::new().include_headers(true).latency_unit(LatencyUnit::Micros)),
        )
        // Answer 500 instead of dropping the connection on panic.
        .layer(CatchPanicLayer::custom(middleware::recover_panic))
        // Set a timeout.
        .layer(TimeoutLayer::with_status_code(StatusCode::REQUEST_TIMEOUT, REQUEST_TIMEOUT))
        // Remove senstive headers from trace.
        .layer(SetSensitiveHeadersLayer::new([header::AUTHORIZATION, header::COOKIE]))
        // Add CORS preflight support.
        .layer(cors(&state.config));

    let mut router = routes
        .fallback(router::not_found)
        .method_not_allowed_fallback(router::method_not_allowed);

    if state.config.require_authentication {
        router = router.layer(AxumMiddleware::from_fn_with_state(
            state.clone(),
            middleware::authenticate,
        ));
    }

    router
        .route_layer(AxumMiddleware::from_fn(telemetry::track))
        .layer(DefaultBodyLimit::max(state.config.limits.body_limit))
        .with_state(state)
        .layer(middleware)
}

/// Initialize the application state.
pub async fn initialize_state() -> Result<AppState, Box<dyn std::error::Error>>
{
    // read configuration file. let it in memory.
    let config = match std::env::var("CONFIG_PATH") {
        Ok(path) => config::Configuration::default().path(path.into()).read(),
        Err(_) => config::Configuration::default().read(),
    };

    let db = match config.postgres {
        Some(ref config) => {
            database::Database::new(
                &config.address,
                &config
                    .username
                    .clone()
                    .unwrap_or(database::DEFAULT_CREDENTIALS.into()),
                &config
                    .password
                    .clone()
                    .unwrap_or(database::DEFAULT_CREDENTIALS.into()),
                &config
                    .database
                    .clone()
                    .unwrap_or(database::DEFAULT_DATABASE_NAME.into()),
                config.pool_size.unwrap_or(database::DEFAULT_POOL_SIZE),
            )
            .await?
        },
        None => {
            tracing::warn!(
                "missing `postgres` entry on `config.yaml` file, data is kept in memory"
            );
            database::Database::memory()
        },
    };

    let pepper = std::env::var("TOKEN_PEPPER").unwrap_or_default();
    let crypto = Arc::new(crypto::Crypto::new(config.argon2.clone(), pepper)?);

    let token = token::TokenManager::new(
        Arc::clone(&crypto.hasher),
        Arc::clone(&db.accounts),
        Arc::clone(&db.tokens),
    );

    let metrics = if config.metrics {
        Some(telemetry::setup_metrics_recorder()?)
    } else {
        None
    };

    Ok(AppState {
        config,
        db,
        crypto,
        token,
        mail: Arc::new(mail::LogMailer),
        metrics,
    })
}

/// Delete expired tokens every `cleanup_interval` seconds, forever.
pub async fn collect_expired_tokens(state: AppState) {
    let mut interval = tokio::time::interval(Duration::from_secs(
        state.config.token.cleanup_interval.max(1),
    ));

    loop {
        interval.tick().await;
        match state.token.purge_expired().await {
            Ok(0) => {},
            Ok(removed) => tracing::info!(removed, "expired tokens deleted"),
            Err(err) => tracing::error!(error = %err, "expired tokens not deleted"),
        }
    }
}
