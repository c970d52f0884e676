//! Per-client request limit for the `/api/v1` surface
//!
//! Each client IP gets a bucket of `RATE_LIMIT_MAX_REQUESTS` that refills
//! evenly over `RATE_LIMIT_WINDOW_SECS`.

use std::net::SocketAddr;
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{ConnectInfo, Request, State},
    middleware::Next,
    response::{IntoResponse, Response},
};
use governor::clock::{Clock, DefaultClock};
use governor::{DefaultKeyedRateLimiter, Quota, RateLimiter};

use eventhub_shared::ErrorCode;

use crate::error::ApiError;
use crate::state::AppState;

const UNKNOWN_CLIENT: &str = "unknown";

#[derive(Clone)]
pub struct ClientRateLimiter {
    limiter: Arc<DefaultKeyedRateLimiter<String>>,
    clock: DefaultClock,
    trust_forwarded_for: bool,
}

impl ClientRateLimiter {
    pub fn new(max_requests: NonZeroU32, window: Duration, trust_forwarded_for: bool) -> Self {
        let quota = Quota::with_period(window / max_requests.get())
            .map(|quota| quota.allow_burst(max_requests))
            .unwrap_or_else(|| Quota::per_second(max_requests));

        Self {
            limiter: Arc::new(RateLimiter::keyed(quota)),
            clock: DefaultClock::default(),
            trust_forwarded_for,
        }
    }

    /// Take one request from `client`'s bucket. `Err` carries the whole seconds until the next one.
    pub fn check(&self, client: &str) -> Result<(), u64> {
        self.limiter.check_key(&client.to_string()).map_err(|not_until| {
            let wait = not_until.wait_time_from(self.clock.now());
            wait.as_secs() + u64::from(wait.subsec_nanos() > 0)
        })
    }

    /// Drop buckets that have refilled completely
    pub fn prune(&self) {
        self.limiter.retain_recent();
        self.limiter.shrink_to_fit();
    }

    pub fn tracked_clients(&self) -> usize {
        self.limiter.len()
    }

    fn client_key(&self, request: &Request) -> String {
        if self.trust_forwarded_for {
            let forwarded = request
                .headers()
                .get("X-Forwarded-For")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.split(',').next())
                .map(str::trim)
                .filter(|ip| !ip.is_empty());
            if let Some(ip) = forwarded {
                return ip.to_string();
            }
        }

        request
            .extensions()
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| addr.ip().to_string())
            .unwrap_or_else(|| UNKNOWN_CLIENT.to_string())
    }
}

/// Rejects with 429 once the caller's bucket is empty
pub async fn rate_limit(State(state): State<AppState>, request: Request, next: Next) -> Response {
    let client = state.rate_limiter.client_key(&request);

    match state.rate_limiter.check(&client) {
        Ok(()) => next.run(request).await,
        Err(retry_after_secs) => {
            tracing::warn!(
                client = %client,
                path = %request.uri().path(),
                retry_after_secs,
                "rate_limit: request rejected"
            );
            ApiError::RateLimited {
                code: ErrorCode::TooManyRequests,
                message: "too many requests, please try again later".to_string(),
                retry_after_secs,
            }
            .into_response()
        }
    }
}
