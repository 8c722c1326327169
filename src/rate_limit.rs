//! Per-client admission control.
//!
//! Flow Overview:
//! 1) `admit` looks up (or creates) the caller's token bucket, refills it for the
//!    time elapsed since the last refill and tries to take one token.
//! 2) A sweeper task wakes every `SWEEP_INTERVAL` and forgets clients idle for
//!    longer than `STALE_AFTER`.
//!
//! Both steps run under the same mutex, held only for map operations. The
//! registry is an ordinary value created at startup and shared through an `Arc`;
//! tests build as many independent instances as they need.

use std::{collections::HashMap, sync::Arc, time::Duration};
use tokio::{
    sync::{Mutex, oneshot},
    task::JoinHandle,
    time::{Instant, MissedTickBehavior, interval_at},
};
use tracing::{debug, error, info};

/// How often idle clients are swept.
pub const SWEEP_INTERVAL: Duration = Duration::from_secs(60);
/// Clients not seen for this long are forgotten.
pub const STALE_AFTER: Duration = Duration::from_secs(3 * 60);

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RateLimitConfig {
    rps: f64,
    burst: u32,
    enabled: bool,
    trust_proxy: bool,
}

impl RateLimitConfig {
    /// Default limiter config: 2 requests per second with bursts of 4, keyed on
    /// the socket peer.
    #[must_use]
    pub fn new() -> Self {
        Self {
            rps: 2.0,
            burst: 4,
            enabled: true,
            trust_proxy: false,
        }
    }

    #[must_use]
    pub fn with_rps(mut self, rps: f64) -> Self {
        self.rps = rps;
        self
    }

    #[must_use]
    pub fn with_burst(mut self, burst: u32) -> Self {
        self.burst = burst;
        self
    }

    #[must_use]
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Key clients on `X-Forwarded-For` / `X-Real-IP`. Only safe behind a proxy
    /// that overwrites those headers; otherwise a client can pick its own key.
    #[must_use]
    pub fn with_trust_proxy(mut self, trust_proxy: bool) -> Self {
        self.trust_proxy = trust_proxy;
        self
    }

    /// Clamp values a bucket cannot work with. A non-positive or non-finite rate
    /// never refills, so it is raised to the smallest usable value.
    #[must_use]
    pub fn normalize(self) -> Self {
        let rps = if self.rps.is_finite() && self.rps > 0.0 {
            self.rps
        } else {
            f64::MIN_POSITIVE
        };
        Self {
            rps,
            burst: self.burst.max(1),
            ..self
        }
    }

    #[must_use]
    pub fn rps(&self) -> f64 {
        self.rps
    }

    #[must_use]
    pub fn burst(&self) -> u32 {
        self.burst
    }

    #[must_use]
    pub fn enabled(&self) -> bool {
        self.enabled
    }

    #[must_use]
    pub fn trust_proxy(&self) -> bool {
        self.trust_proxy
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug)]
struct ClientEntry {
    tokens: f64,
    last_refill: Instant,
    last_seen: Instant,
}

#[derive(Debug)]
pub struct RateLimiter {
    config: RateLimitConfig,
    clients: Mutex<HashMap<String, ClientEntry>>,
}

impl RateLimiter {
    #[must_use]
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            config: config.normalize(),
            clients: Mutex::new(HashMap::new()),
        }
    }

    #[must_use]
    pub fn config(&self) -> &RateLimitConfig {
        &self.config
    }

    /// Try to admit one request from `client_id`.
    pub async fn admit(&self, client_id: &str) -> bool {
        self.admit_at(client_id, Instant::now()).await
    }

    /// `admit` against an explicit clock reading.
    pub async fn admit_at(&self, client_id: &str, now: Instant) -> bool {
        if !self.config.enabled() {
            return true;
        }

        let burst = f64::from(self.config.burst());
        let mut clients = self.clients.lock().await;
        let entry = clients
            .entry(client_id.to_string())
            .or_insert_with(|| ClientEntry {
                tokens: burst,
                last_refill: now,
                last_seen: now,
            });

        let elapsed = now.saturating_duration_since(entry.last_refill);
        entry.tokens = elapsed
            .as_secs_f64()
            .mul_add(self.config.rps(), entry.tokens)
            .min(burst);
        entry.last_refill = now;
        entry.last_seen = now;

        if entry.tokens >= 1.0 {
            entry.tokens -= 1.0;
            true
        } else {
            debug!(client_id, "rate limit exceeded");
            false
        }
    }

    /// Forget every client last seen more than `STALE_AFTER` before `now`.
    /// Returns how many entries were removed.
    pub async fn sweep_at(&self, now: Instant) -> usize {
        let mut clients = self.clients.lock().await;
        let before = clients.len();
        clients.retain(|_, entry| now.saturating_duration_since(entry.last_seen) <= STALE_AFTER);
        before - clients.len()
    }

    /// Number of clients currently tracked.
    pub async fn tracked(&self) -> usize {
        self.clients.lock().await.len()
    }

    /// Start the periodic sweep. Returns `None` when the limiter is disabled.
    #[must_use]
    pub fn spawn_sweeper(self: &Arc<Self>) -> Option<SweeperHandle> {
        if !self.config.enabled() {
            return None;
        }

        let limiter = Arc::clone(self);
        let (stop_tx, mut stop_rx) = oneshot::channel();
        let task = tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + SWEEP_INTERVAL, SWEEP_INTERVAL);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = &mut stop_rx => break,
                    _ = ticker.tick() => {
                        let removed = limiter.sweep_at(Instant::now()).await;
                        if removed > 0 {
                            debug!(removed, "swept idle rate limit clients");
                        }
                    }
                }
            }
        });

        Some(SweeperHandle {
            stop: stop_tx,
            task,
        })
    }
}

/// Owner of a running sweeper. Dropping it without `stop` leaves the task running.
#[derive(Debug)]
pub struct SweeperHandle {
    stop: oneshot::Sender<()>,
    task: JoinHandle<()>,
}

impl SweeperHandle {
    /// Signal the sweeper and wait for it to exit.
    pub async fn stop(self) {
        let _ = self.stop.send(());
        if let Err(err) = self.task.await {
            error!("rate limit sweeper failed: {err}");
        } else {
            info!("rate limit sweeper stopped");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limiter(rps: f64, burst: u32) -> RateLimiter {
        RateLimiter::new(RateLimitConfig::new().with_rps(rps).with_burst(burst))
    }

    #[test]
    fn config_defaults_and_normalize() {
        let config = RateLimitConfig::default();
        assert!((config.rps() - 2.0).abs() < f64::EPSILON);
        assert_eq!(config.burst(), 4);
        assert!(config.enabled());
        assert!(!config.trust_proxy());

        let config = RateLimitConfig::new()
            .with_rps(-1.0)
            .with_burst(0)
            .with_trust_proxy(true)
            .normalize();
        assert!(config.rps() > 0.0);
        assert_eq!(config.burst(), 1);
        assert!(config.trust_proxy());
    }

    #[tokio::test(start_paused = true)]
    async fn burst_then_refill() {
        let limiter = limiter(2.0, 4);
        for _ in 0..4 {
            assert!(limiter.admit("10.0.0.1").await);
        }
        assert!(!limiter.admit("10.0.0.1").await);

        tokio::time::advance(Duration::from_millis(500)).await;
        assert!(limiter.admit("10.0.0.1").await);
        assert!(!limiter.admit("10.0.0.1").await);
    }

    #[tokio::test(start_paused = true)]
    async fn clients_have_separate_buckets() {
        let limiter = limiter(1.0, 1);
        assert!(limiter.admit("a").await);
        assert!(!limiter.admit("a").await);
        assert!(limiter.admit("b").await);
        assert_eq!(limiter.tracked().await, 2);
    }

    #[tokio::test]
    async fn refill_never_exceeds_burst() {
        let limiter = limiter(2.0, 2);
        let start = Instant::now();
        assert!(limiter.admit_at("c", start).await);
        let later = start + Duration::from_secs(3600);
        assert!(limiter.admit_at("c", later).await);
        assert!(limiter.admit_at("c", later).await);
        assert!(!limiter.admit_at("c", later).await);
    }

    #[tokio::test]
    async fn sweep_removes_only_stale_clients() {
        let limiter = limiter(2.0, 4);
        let start = Instant::now();
        assert!(limiter.admit_at("old", start).await);
        assert!(limiter.admit_at("fresh", start + Duration::from_secs(150)).await);

        let now = start + STALE_AFTER + Duration::from_secs(1);
        assert_eq!(limiter.sweep_at(now).await, 1);
        assert_eq!(limiter.tracked().await, 1);

        // The surviving entry keeps its bucket state.
        assert!(limiter.admit_at("fresh", now).await);
    }

    #[tokio::test]
    async fn disabled_admits_everything() {
        let limiter = Arc::new(RateLimiter::new(
            RateLimitConfig::new().with_burst(1).with_enabled(false),
        ));
        for _ in 0..10 {
            assert!(limiter.admit("d").await);
        }
        assert_eq!(limiter.tracked().await, 0);
        assert!(limiter.spawn_sweeper().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn sweeper_runs_until_stopped() {
        let limiter = Arc::new(limiter(2.0, 4));
        assert!(limiter.admit("e").await);
        let handle = limiter.spawn_sweeper();
        assert!(handle.is_some());

        tokio::time::sleep(STALE_AFTER + SWEEP_INTERVAL * 2).await;
        assert_eq!(limiter.tracked().await, 0);

        if let Some(handle) = handle {
            handle.stop().await;
        }
    }
}
