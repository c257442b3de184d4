//! Fixed-window request limiting per client address.
//!
//! Each address gets a counter that starts with its first request and resets
//! once the window has elapsed. Requests past the cap are answered with 429
//! before routing, so no handler runs for them.

use axum::{
    extract::{ConnectInfo, Request, State},
    http::{header, HeaderName, HeaderValue},
    middleware::Next,
    response::{IntoResponse, Response},
};
use dashmap::DashMap;
use parking_lot::Mutex;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::{Duration, Instant};

use crate::error::ApiError;
use crate::state::AppState;

// Expired windows are swept once the table holds this many addresses, at
// most once per window.
const PRUNE_THRESHOLD: usize = 10_000;

const LIMIT_HEADER: HeaderName = HeaderName::from_static("x-ratelimit-limit");
const REMAINING_HEADER: HeaderName = HeaderName::from_static("x-ratelimit-remaining");
const RESET_HEADER: HeaderName = HeaderName::from_static("x-ratelimit-reset");

#[derive(Debug, Clone, Copy)]
struct Window {
    started: Instant,
    hits: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Allowed { remaining: u32, reset_after: Duration },
    Limited { retry_after: Duration },
}

pub struct RateLimiter {
    window: Duration,
    max: u32,
    clients: DashMap<IpAddr, Window>,
    last_prune: Mutex<Instant>,
}

impl RateLimiter {
    pub fn new(window: Duration, max: u32) -> Self {
        Self {
            window,
            max,
            clients: DashMap::new(),
            last_prune: Mutex::new(Instant::now()),
        }
    }

    pub fn max(&self) -> u32 {
        self.max
    }

    pub fn check(&self, client: IpAddr) -> Decision {
        self.check_at(client, Instant::now())
    }

    fn check_at(&self, client: IpAddr, now: Instant) -> Decision {
        if self.clients.len() >= PRUNE_THRESHOLD {
            self.prune_if_due(now);
        }

        let mut entry = self.clients.entry(client).or_insert(Window {
            started: now,
            hits: 0,
        });
        if now.saturating_duration_since(entry.started) >= self.window {
            entry.started = now;
            entry.hits = 0;
        }
        entry.hits = entry.hits.saturating_add(1);

        let reset_after = self
            .window
            .saturating_sub(now.saturating_duration_since(entry.started));
        if entry.hits > self.max {
            Decision::Limited {
                retry_after: reset_after,
            }
        } else {
            Decision::Allowed {
                remaining: self.max - entry.hits,
                reset_after,
            }
        }
    }

    fn prune_if_due(&self, now: Instant) {
        let mut last = self.last_prune.lock();
        if now.saturating_duration_since(*last) < self.window {
            return;
        }
        *last = now;
        drop(last);
        self.prune(now);
    }

    fn prune(&self, now: Instant) {
        self.clients
            .retain(|_, w| now.saturating_duration_since(w.started) < self.window);
    }
}

/// Peer address from the connection; requests without one (in-process
/// callers) share a single bucket.
fn client_addr(req: &Request) -> IpAddr {
    req.extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip())
        .unwrap_or(IpAddr::V4(Ipv4Addr::UNSPECIFIED))
}

fn ceil_secs(d: Duration) -> u64 {
    d.as_secs() + u64::from(d.subsec_nanos() > 0)
}

pub async fn limit(State(state): State<AppState>, req: Request, next: Next) -> Response {
    let client = client_addr(&req);

    match state.limiter.check(client) {
        Decision::Allowed {
            remaining,
            reset_after,
        } => {
            let mut response = next.run(req).await;
            let headers = response.headers_mut();
            headers.insert(LIMIT_HEADER, HeaderValue::from(state.limiter.max()));
            headers.insert(REMAINING_HEADER, HeaderValue::from(remaining));
            headers.insert(RESET_HEADER, HeaderValue::from(ceil_secs(reset_after)));
            response
        }
        Decision::Limited { retry_after } => {
            tracing::warn!(%client, "rate limit exceeded");
            let mut response = ApiError::TooManyRequests.into_response();
            response
                .headers_mut()
                .insert(header::RETRY_AFTER, HeaderValue::from(ceil_secs(retry_after)));
            response
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(last: u8) -> IpAddr {
        IpAddr::V4(Ipv4Addr::new(10, 0, 0, last))
    }

    #[test]
    fn test_requests_past_the_cap_are_limited() {
        let limiter = RateLimiter::new(Duration::from_secs(900), 2);
        let now = Instant::now();

        assert!(matches!(
            limiter.check_at(addr(1), now),
            Decision::Allowed { remaining: 1, .. }
        ));
        assert!(matches!(
            limiter.check_at(addr(1), now),
            Decision::Allowed { remaining: 0, .. }
        ));
        assert_eq!(
            limiter.check_at(addr(1), now + Duration::from_secs(100)),
            Decision::Limited {
                retry_after: Duration::from_secs(800)
            }
        );
    }

    #[test]
    fn test_addresses_are_counted_separately() {
        let limiter = RateLimiter::new(Duration::from_secs(900), 1);
        let now = Instant::now();

        limiter.check_at(addr(1), now);
        assert!(matches!(
            limiter.check_at(addr(1), now),
            Decision::Limited { .. }
        ));
        assert!(matches!(
            limiter.check_at(addr(2), now),
            Decision::Allowed { .. }
        ));
    }

    #[test]
    fn test_counter_resets_after_the_window() {
        let limiter = RateLimiter::new(Duration::from_secs(900), 1);
        let now = Instant::now();

        limiter.check_at(addr(1), now);
        assert!(matches!(
            limiter.check_at(addr(1), now + Duration::from_secs(899)),
            Decision::Limited { .. }
        ));
        assert_eq!(
            limiter.check_at(addr(1), now + Duration::from_secs(900)),
            Decision::Allowed {
                remaining: 0,
                reset_after: Duration::from_secs(900)
            }
        );
    }

    #[test]
    fn test_prune_drops_expired_windows() {
        let limiter = RateLimiter::new(Duration::from_secs(10), 5);
        let now = Instant::now();

        limiter.check_at(addr(1), now);
        limiter.check_at(addr(2), now + Duration::from_secs(5));
        limiter.prune(now + Duration::from_secs(11));

        assert_eq!(limiter.clients.len(), 1);
        assert!(limiter.clients.contains_key(&addr(2)));
    }

    #[test]
    fn test_full_table_is_swept_at_most_once_per_window() {
        let limiter = RateLimiter::new(Duration::from_secs(10), 5);
        let start = *limiter.last_prune.lock();

        limiter.check_at(addr(1), start);
        limiter.check_at(addr(2), start + Duration::from_secs(5));
        limiter.prune_if_due(start + Duration::from_secs(11));
        assert_eq!(limiter.clients.len(), 1);

        // addr(2) has expired, but the last sweep was too recent.
        limiter.prune_if_due(start + Duration::from_secs(16));
        assert_eq!(limiter.clients.len(), 1);

        limiter.prune_if_due(start + Duration::from_secs(21));
        assert_eq!(limiter.clients.len(), 0);
    }
}
