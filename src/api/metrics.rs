//! Process counters in Prometheus text format.
//!
//! `record` wraps every request: it counts the request on the way in, then the
//! response and the time spent on the way out. Runtime, pool and clock gauges
//! are sampled when `render` is called.

use anyhow::Result;
use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use chrono::Utc;
use prometheus::{
    Encoder, IntCounter, IntGauge, IntGaugeVec, Opts, Registry, TextEncoder,
};
use sqlx::PgPool;
use std::{
    sync::Arc,
    time::{Duration, Instant},
};
use tracing::error;

#[derive(Debug)]
struct Collectors {
    registry: Registry,
    requests_received: IntCounter,
    responses_sent: IntCounter,
    processing_time_us: IntCounter,
    tasks_alive: IntGauge,
    db_connections: IntGauge,
    db_idle_connections: IntGauge,
    db_max_connections: IntGauge,
    timestamp: IntGauge,
}

#[derive(Debug)]
pub struct Metrics {
    collectors: Option<Collectors>,
    pool: Option<PgPool>,
}

impl Metrics {
    /// Fresh registry with every collector at zero. If registration fails the
    /// error is logged and recording becomes a no-op.
    #[must_use]
    pub fn new() -> Self {
        Self {
            collectors: build_collectors(),
            pool: None,
        }
    }

    /// Report connection pool stats from `pool` on each render.
    #[must_use]
    pub fn with_pool(mut self, pool: PgPool) -> Self {
        self.pool = Some(pool);
        self
    }

    pub fn request_received(&self) {
        if let Some(collectors) = &self.collectors {
            collectors.requests_received.inc();
        }
    }

    pub fn response_sent(&self, elapsed: Duration) {
        if let Some(collectors) = &self.collectors {
            collectors.responses_sent.inc();
            collectors
                .processing_time_us
                .inc_by(u64::try_from(elapsed.as_micros()).unwrap_or(u64::MAX));
        }
    }

    /// Sample the gauges and encode every collector.
    ///
    /// # Errors
    /// Returns an error if the registry could not be set up or encoding fails.
    pub fn render(&self) -> Result<String> {
        let Some(collectors) = &self.collectors else {
            anyhow::bail!("metrics registry unavailable");
        };

        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            collectors
                .tasks_alive
                .set(gauge_value(handle.metrics().num_alive_tasks()));
        }
        if let Some(pool) = &self.pool {
            collectors.db_connections.set(i64::from(pool.size()));
            collectors
                .db_idle_connections
                .set(gauge_value(pool.num_idle()));
            collectors
                .db_max_connections
                .set(i64::from(pool.options().get_max_connections()));
        }
        collectors.timestamp.set(Utc::now().timestamp());

        let encoder = TextEncoder::new();
        let mut encoded = Vec::new();
        encoder.encode(&collectors.registry.gather(), &mut encoded)?;
        Ok(String::from_utf8(encoded)?)
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Count the request and, once the inner service answers, the response and
/// its processing time.
pub async fn record(State(metrics): State<Arc<Metrics>>, request: Request, next: Next) -> Response {
    let start = Instant::now();
    metrics.request_received();
    let response = next.run(request).await;
    metrics.response_sent(start.elapsed());
    response
}

fn gauge_value(value: usize) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

fn counter(registry: &Registry, name: &str, help: &str) -> prometheus::Result<IntCounter> {
    let metric = IntCounter::with_opts(Opts::new(name, help))?;
    registry.register(Box::new(metric.clone()))?;
    Ok(metric)
}

fn gauge(registry: &Registry, name: &str, help: &str) -> prometheus::Result<IntGauge> {
    let metric = IntGauge::with_opts(Opts::new(name, help))?;
    registry.register(Box::new(metric.clone()))?;
    Ok(metric)
}

fn build_collectors() -> Option<Collectors> {
    match try_build_collectors() {
        Ok(collectors) => Some(collectors),
        Err(err) => {
            error!("failed to register metrics: {err}");
            None
        }
    }
}

fn try_build_collectors() -> prometheus::Result<Collectors> {
    let registry = Registry::new_custom(Some("reelgate".to_string()), None)?;

    let build_info = IntGaugeVec::new(
        Opts::new("build_info", "Build version and commit, always 1."),
        &["version", "commit"],
    )?;
    registry.register(Box::new(build_info.clone()))?;
    build_info
        .with_label_values(&[env!("CARGO_PKG_VERSION"), crate::GIT_COMMIT_HASH])
        .set(1);

    Ok(Collectors {
        requests_received: counter(
            &registry,
            "requests_received_total",
            "Requests that entered the middleware chain.",
        )?,
        responses_sent: counter(
            &registry,
            "responses_sent_total",
            "Responses written back, including errors and recovered panics.",
        )?,
        processing_time_us: counter(
            &registry,
            "processing_time_microseconds_total",
            "Time between receiving a request and sending its response, summed.",
        )?,
        tasks_alive: gauge(&registry, "tasks_alive", "Tokio tasks currently alive.")?,
        db_connections: gauge(
            &registry,
            "db_connections",
            "Open database connections, idle or in use.",
        )?,
        db_idle_connections: gauge(
            &registry,
            "db_idle_connections",
            "Idle database connections.",
        )?,
        db_max_connections: gauge(
            &registry,
            "db_max_connections",
            "Configured database pool ceiling.",
        )?,
        timestamp: gauge(
            &registry,
            "timestamp_seconds",
            "Unix time at which this sample was taken.",
        )?,
        registry,
    })
}
