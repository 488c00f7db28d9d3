//! Fixed-window rate limiter middleware.
//!
//! Counts requests per wall-clock minute with two atomics; the count resets
//! when a new minute begins.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use axum::extract::{Extension, Request};
use axum::http::StatusCode;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::Json;

const WINDOW_SECS: u64 = 60;

#[derive(Clone)]
pub struct RateLimiter {
    max_per_window: u64,
    count: Arc<AtomicU64>,
    /// Index of the current window since the epoch.
    window: Arc<AtomicU64>,
}

impl RateLimiter {
    /// Allow `max_per_minute` requests in each minute. Zero disables limiting.
    pub fn per_minute(max_per_minute: u32) -> Self {
        Self {
            max_per_window: u64::from(max_per_minute),
            count: Arc::new(AtomicU64::new(0)),
            window: Arc::new(AtomicU64::new(0)),
        }
    }

    fn current_window() -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs()
            / WINDOW_SECS
    }

    /// Try to acquire a permit. Returns true if the request is allowed.
    pub fn try_acquire(&self) -> bool {
        self.try_acquire_at(Self::current_window())
    }

    fn try_acquire_at(&self, now: u64) -> bool {
        if self.max_per_window == 0 {
            return true;
        }

        let current = self.window.load(Ordering::Relaxed);
        if now != current
            && self
                .window
                .compare_exchange(current, now, Ordering::AcqRel, Ordering::Relaxed)
                .is_ok()
        {
            self.count.store(1, Ordering::Relaxed);
            return true;
        }

        let prev = self.count.fetch_add(1, Ordering::Relaxed);
        prev < self.max_per_window
    }
}

/// Axum middleware that enforces the rate limit.
pub async fn rate_limit_middleware(
    Extension(limiter): Extension<RateLimiter>,
    req: Request,
    next: Next,
) -> Response {
    if limiter.try_acquire() {
        next.run(req).await
    } else {
        tracing::warn!(path = %req.uri().path(), "Rate limit exceeded");
        (
            StatusCode::TOO_MANY_REQUESTS,
            Json(serde_json::json!({
                "error": "too_many_requests",
                "message": "Rate limit exceeded. Please wait a moment and try again."
            })),
        )
            .into_response()
    }
}
