//! Token-bucket rate limiting middleware, keyed by client IP.
//!
//! Not part of the framework's core request path — an optional middleware a
//! caller installs explicitly, same as the teacher's `RateLimiterPlugin`. Kept
//! the token-bucket math and the background replenish-and-purge task, adapted
//! from `TakoPlugin::setup` self-registration to a plain [`MiddlewareFn`]
//! builder.
//!
//! Clock-regression note: `last_seen`/the bucket timer use `Instant`, which is
//! monotonic on every platform this crate targets, so a system clock
//! adjustment cannot starve or over-grant tokens; replenishment is driven
//! purely by elapsed ticks of the background interval, not wall-clock deltas.

use std::net::IpAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use http::StatusCode;
use tokio::time;

use crate::middleware::MiddlewareFn;

#[derive(Clone)]
pub struct Config {
    pub burst_size: u32,
    pub per_second: u32,
    pub tick_secs: u64,
    pub status_on_limit: StatusCode,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            burst_size: 60,
            per_second: 60,
            tick_secs: 1,
            status_on_limit: StatusCode::TOO_MANY_REQUESTS,
        }
    }
}

pub struct RateLimiterBuilder(Config);

impl Default for RateLimiterBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl RateLimiterBuilder {
    pub fn new() -> Self {
        Self(Config::default())
    }

    pub fn burst_size(mut self, n: u32) -> Self {
        self.0.burst_size = n;
        self
    }

    pub fn per_second(mut self, n: u32) -> Self {
        self.0.per_second = n;
        self
    }

    pub fn tick_secs(mut self, s: u64) -> Self {
        self.0.tick_secs = s.max(1);
        self
    }

    pub fn status(mut self, status: StatusCode) -> Self {
        self.0.status_on_limit = status;
        self
    }

    /// Builds the middleware and spawns its background replenish task.
    pub fn build(self) -> MiddlewareFn {
        let cfg = self.0;
        let store: Arc<DashMap<IpAddr, Bucket>> = Arc::new(DashMap::new());

        spawn_replenisher(cfg.clone(), store.clone());

        crate::middleware::IntoMiddleware::into_middleware(move |req, res, next| {
            let cfg = cfg.clone();
            let store = store.clone();
            async move {
                let ip = req
                    .remote_addr
                    .map(|sa| sa.ip())
                    .unwrap_or(IpAddr::from([0, 0, 0, 0]));

                let mut entry = store.entry(ip).or_insert_with(|| Bucket {
                    tokens: cfg.burst_size as f64,
                    last_seen: Instant::now(),
                });

                if entry.tokens < 1.0 {
                    let mut res = res;
                    res.status = cfg.status_on_limit;
                    let _ = res.text("Too Many Requests");
                    drop(entry);
                    return (req, res, Ok(()));
                }
                entry.tokens -= 1.0;
                entry.last_seen = Instant::now();
                drop(entry);

                next.run(req, res).await
            }
        })
    }
}

#[derive(Clone)]
struct Bucket {
    tokens: f64,
    last_seen: Instant,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_applies_each_setter() {
        let builder = RateLimiterBuilder::new()
            .burst_size(10)
            .per_second(5)
            .tick_secs(2)
            .status(StatusCode::SERVICE_UNAVAILABLE);

        assert_eq!(builder.0.burst_size, 10);
        assert_eq!(builder.0.per_second, 5);
        assert_eq!(builder.0.tick_secs, 2);
        assert_eq!(builder.0.status_on_limit, StatusCode::SERVICE_UNAVAILABLE);
    }

    #[test]
    fn tick_secs_is_clamped_to_at_least_one() {
        let builder = RateLimiterBuilder::new().tick_secs(0);
        assert_eq!(builder.0.tick_secs, 1);
    }

    #[test]
    fn default_config_allows_a_modest_burst() {
        let cfg = Config::default();
        assert_eq!(cfg.burst_size, 60);
        assert_eq!(cfg.status_on_limit, StatusCode::TOO_MANY_REQUESTS);
    }

    #[tokio::test(start_paused = true)]
    async fn bucket_replenishes_up_to_the_burst_size_over_ticks() {
        let cfg = Config { burst_size: 5, per_second: 5, tick_secs: 1, ..Config::default() };
        let store: Arc<DashMap<IpAddr, Bucket>> = Arc::new(DashMap::new());
        let ip = IpAddr::from([127, 0, 0, 1]);
        store.insert(ip, Bucket { tokens: 0.0, last_seen: Instant::now() });

        spawn_replenisher(cfg, store.clone());
        time::advance(Duration::from_secs(1)).await;
        tokio::task::yield_now().await;

        assert!(store.get(&ip).unwrap().tokens > 0.0);
    }
}

fn spawn_replenisher(cfg: Config, store: Arc<DashMap<IpAddr, Bucket>>) {
    tokio::spawn(async move {
        let mut tick = time::interval(Duration::from_secs(cfg.tick_secs));
        let add_per_tick = cfg.per_second as f64 * cfg.tick_secs as f64;
        let purge_after = Duration::from_secs(300);
        loop {
            tick.tick().await;
            let now = Instant::now();
            store.retain(|_, b| {
                b.tokens = (b.tokens + add_per_tick).min(cfg.burst_size as f64);
                now.duration_since(b.last_seen) < purge_after
            });
        }
    });
}
