use crate::{
    auth::CredentialVerifier,
    rate_limit::{RateLimitConfig, RateLimiter},
    store::Stores,
};
use anyhow::{Context, Result, anyhow};
use axum::{
    Extension, Json, Router,
    body::Body,
    extract::MatchedPath,
    http::{
        HeaderName, HeaderValue, Method, Request, StatusCode,
        header::{AUTHORIZATION, CONNECTION, CONTENT_TYPE},
    },
    response::{IntoResponse, Response},
};
use secrecy::{ExposeSecret, SecretString};
use serde_json::json;
use sqlx::postgres::PgPoolOptions;
use std::{any::Any, net::SocketAddr, sync::Arc, time::Duration};
use tokio::{net::TcpListener, signal};
use tower::ServiceBuilder;
use tower_http::{
    catch_panic::CatchPanicLayer,
    cors::{AllowOrigin, CorsLayer},
    request_id::PropagateRequestIdLayer,
    set_header::SetRequestHeaderLayer,
    trace::TraceLayer,
};
use tracing::{Span, error, info, info_span};
use ulid::Ulid;
use url::Url;
use utoipa_axum::router::OpenApiRouter;

pub mod email;
pub mod errors;
pub mod extract;
pub mod handlers;
pub mod metrics;
pub mod middleware;
mod openapi;
pub mod state;

pub use errors::ApiError;
pub use openapi::openapi;
pub use state::AppState;

/// Build the API router with all documented routes registered.
#[must_use]
pub fn router() -> OpenApiRouter {
    openapi::api_router()
}

#[derive(Debug)]
pub struct ServerConfig {
    port: u16,
    dsn: SecretString,
    env: String,
    db_max_connections: u32,
    db_min_connections: u32,
    db_acquire_timeout: Duration,
    limiter: RateLimitConfig,
    cors_trusted_origins: Vec<String>,
    mail_sender: String,
}

impl ServerConfig {
    /// Defaults: development environment, 1..=25 connections with a 5s acquire
    /// timeout, default limiter, no trusted CORS origins.
    #[must_use]
    pub fn new(port: u16, dsn: SecretString) -> Self {
        Self {
            port,
            dsn,
            env: "development".to_string(),
            db_max_connections: 25,
            db_min_connections: 1,
            db_acquire_timeout: Duration::from_secs(5),
            limiter: RateLimitConfig::new(),
            cors_trusted_origins: Vec::new(),
            mail_sender: "Reelgate <no-reply@reelgate.dev>".to_string(),
        }
    }

    #[must_use]
    pub fn with_env(mut self, env: String) -> Self {
        self.env = env;
        self
    }

    #[must_use]
    pub fn with_db_max_connections(mut self, max: u32) -> Self {
        self.db_max_connections = max;
        self
    }

    #[must_use]
    pub fn with_db_min_connections(mut self, min: u32) -> Self {
        self.db_min_connections = min;
        self
    }

    #[must_use]
    pub fn with_db_acquire_timeout_seconds(mut self, seconds: u64) -> Self {
        self.db_acquire_timeout = Duration::from_secs(seconds);
        self
    }

    #[must_use]
    pub fn with_limiter(mut self, limiter: RateLimitConfig) -> Self {
        self.limiter = limiter;
        self
    }

    #[must_use]
    pub fn with_cors_trusted_origins(mut self, origins: Vec<String>) -> Self {
        self.cors_trusted_origins = origins;
        self
    }

    #[must_use]
    pub fn with_mail_sender(mut self, sender: String) -> Self {
        self.mail_sender = sender;
        self
    }

    #[must_use]
    pub fn port(&self) -> u16 {
        self.port
    }

    #[must_use]
    pub fn env(&self) -> &str {
        &self.env
    }

    #[must_use]
    pub fn limiter(&self) -> RateLimitConfig {
        self.limiter
    }

    #[must_use]
    pub fn cors_trusted_origins(&self) -> &[String] {
        &self.cors_trusted_origins
    }
}

/// Start the server
/// # Errors
/// Return error if failed to start the server
pub async fn new(config: ServerConfig) -> Result<()> {
    // Connect to database
    let pool = PgPoolOptions::new()
        .min_connections(config.db_min_connections)
        .max_connections(config.db_max_connections.max(config.db_min_connections))
        .acquire_timeout(config.db_acquire_timeout)
        .max_lifetime(Duration::from_secs(60 * 2))
        .test_before_acquire(true)
        .connect(config.dsn.expose_secret())
        .await
        .context("Failed to connect to database")?;

    let limiter = Arc::new(RateLimiter::new(config.limiter()));
    let sweeper = limiter.spawn_sweeper();

    let (notifier, notifier_worker) = email::spawn_notifier(Arc::new(
        email::LogEmailSender::new(config.mail_sender.clone()),
    ));

    let credentials =
        CredentialVerifier::new().context("Failed to configure password hashing")?;

    let state = Arc::new(
        AppState::new(
            config.env.clone(),
            Stores::postgres(pool.clone()),
            credentials,
            limiter,
            notifier,
        )
        .with_metrics(metrics::Metrics::new().with_pool(pool.clone())),
    );

    let cors = cors_layer(config.cors_trusted_origins())?;
    let app = app(state, cors);

    let listener = TcpListener::bind(format!("::0:{}", config.port)).await?;

    info!("Listening on [::]:{}", config.port);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    // In-flight requests are done and the router (with every Notifier clone) is gone.
    if let Some(sweeper) = sweeper {
        sweeper.stop().await;
    }
    notifier_worker.drain().await;
    pool.close().await;

    Ok(())
}

/// The complete application: documented routes, fallbacks and the request
/// pipeline layers (outermost first).
pub fn app(state: Arc<AppState>, cors: CorsLayer) -> Router {
    let (router, _openapi) = router().split_for_parts();
    let recorder = Arc::clone(state.metrics());
    router
        .fallback(not_found)
        .method_not_allowed_fallback(method_not_allowed)
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestHeaderLayer::if_not_present(
                    HeaderName::from_static("x-request-id"),
                    |_req: &_| HeaderValue::from_str(Ulid::new().to_string().as_str()).ok(),
                ))
                .layer(PropagateRequestIdLayer::new(HeaderName::from_static(
                    "x-request-id",
                )))
                .layer(TraceLayer::new_for_http().make_span_with(make_span))
                .layer(axum::middleware::from_fn_with_state(recorder, metrics::record))
                .layer(CatchPanicLayer::custom(handle_panic))
                .layer(cors)
                .layer(Extension(state))
                .layer(axum::middleware::from_fn(middleware::rate_limit))
                .layer(axum::middleware::from_fn(middleware::authenticate)),
        )
}

async fn not_found() -> ApiError {
    ApiError::NotFound
}

async fn method_not_allowed(method: Method) -> ApiError {
    ApiError::MethodNotAllowed(method.to_string())
}

fn make_span(request: &Request<Body>) -> Span {
    let request_id = request
        .headers()
        .get("x-request-id")
        .and_then(|val| val.to_str().ok())
        .unwrap_or("none");
    let matched_path = request
        .extensions()
        .get::<MatchedPath>()
        .map_or_else(|| request.uri().path(), MatchedPath::as_str);

    info_span!(
        "http.request",
        http.method = %request.method(),
        http.route = matched_path,
        request_id
    )
}

/// Turn a handler panic into the generic 500 and ask the client to reconnect.
fn handle_panic(err: Box<dyn Any + Send + 'static>) -> Response {
    let detail = err
        .downcast_ref::<String>()
        .map(String::as_str)
        .or_else(|| err.downcast_ref::<&str>().copied())
        .unwrap_or("unknown panic payload");
    error!("request handler panicked: {detail}");

    let mut response = (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({ "error": errors::INTERNAL_MESSAGE })),
    )
        .into_response();
    response
        .headers_mut()
        .insert(CONNECTION, HeaderValue::from_static("close"));
    response
}

/// CORS for the configured trusted origins. Preflights may use any method the
/// API serves and send `Authorization` and `Content-Type`.
/// # Errors
/// Returns an error if an origin is not a valid absolute URL.
pub fn cors_layer(trusted_origins: &[String]) -> Result<CorsLayer> {
    let origins = trusted_origins
        .iter()
        .map(String::as_str)
        .map(origin_header)
        .collect::<Result<Vec<_>>>()?;
    Ok(CorsLayer::new()
        .allow_headers([AUTHORIZATION, CONTENT_TYPE])
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_origin(AllowOrigin::list(origins)))
}

fn origin_header(origin: &str) -> Result<HeaderValue> {
    let parsed = Url::parse(origin).with_context(|| format!("Invalid CORS origin: {origin}"))?;
    let host = parsed
        .host_str()
        .ok_or_else(|| anyhow!("CORS origin must include a valid host: {origin}"))?;
    let port = parsed
        .port()
        .map_or_else(String::new, |port| format!(":{port}"));
    HeaderValue::from_str(&format!("{}://{}{}", parsed.scheme(), host, port))
        .context("Failed to build CORS origin header")
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = signal::ctrl_c().await {
            error!("Failed to listen for ctrl-c: {err}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(err) => {
                error!("Failed to listen for SIGTERM: {err}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    info!("Gracefully shutdown");
}
