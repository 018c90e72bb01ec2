use axum::{
    extract::{ConnectInfo, Request, State},
    middleware::Next,
    response::Response,
};
use chrono::Utc;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::error::AppError;
use crate::middleware::auth::AuthUser;
use crate::AppState;

/// Fixed-window request counter keyed by client.
#[derive(Clone)]
pub struct RateLimiter {
    windows: Arc<Mutex<Windows>>,
    max_requests: u32,
    window_secs: i64,
}

#[derive(Default)]
struct Windows {
    entries: HashMap<String, WindowEntry>,
    next_sweep: i64,
}

struct WindowEntry {
    count: u32,
    reset_at: i64,
}

impl RateLimiter {
    pub fn new(max_requests: u32, window_secs: u64) -> Self {
        Self {
            windows: Arc::new(Mutex::new(Windows::default())),
            max_requests,
            window_secs: i64::try_from(window_secs).unwrap_or(i64::MAX),
        }
    }

    pub async fn check(&self, key: &str) -> bool {
        self.check_at(key, Utc::now().timestamp()).await
    }

    async fn check_at(&self, key: &str, now: i64) -> bool {
        let mut windows = self.windows.lock().await;

        // Expired windows are dropped at most once per window length.
        if now >= windows.next_sweep {
            windows.entries.retain(|_, e| e.reset_at > now);
            windows.next_sweep = now.saturating_add(self.window_secs);
        }

        let entry = windows.entries.entry(key.to_string()).or_insert(WindowEntry {
            count: 0,
            reset_at: now.saturating_add(self.window_secs),
        });

        if now >= entry.reset_at {
            entry.count = 0;
            entry.reset_at = now.saturating_add(self.window_secs);
        }

        entry.count += 1;
        entry.count <= self.max_requests
    }

    #[cfg(test)]
    async fn tracked(&self) -> usize {
        self.windows.lock().await.entries.len()
    }
}

fn client_key(req: &Request) -> String {
    if let Some(user) = req.extensions().get::<AuthUser>() {
        return format!("user:{}", user.id);
    }
    if let Some(ConnectInfo(addr)) = req.extensions().get::<ConnectInfo<SocketAddr>>() {
        return format!("ip:{}", addr.ip());
    }
    req.headers()
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(|ip| format!("ip:{}", ip.trim()))
        .unwrap_or_else(|| "ip:unknown".to_string())
}

/// Middleware: general limiter. Protected routers install it inside
/// `authenticate` so callers are counted per user; public routers count by IP.
pub async fn rate_limit(
    State(state): State<AppState>,
    req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let key = format!("global:{}", client_key(&req));
    if !state.rate_limiter.check(&key).await {
        return Err(AppError::RateLimited);
    }
    Ok(next.run(req).await)
}

/// Middleware: tighter limiter for endpoints that create requests for staff
/// or club admins to review (club submissions, join and lesson requests).
pub async fn submission_rate_limit(
    State(state): State<AppState>,
    req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let key = format!("submit:{}", client_key(&req));
    if !state.submission_rate_limiter.check(&key).await {
        return Err(AppError::RateLimited);
    }
    Ok(next.run(req).await)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn window_allows_max_then_resets() {
        let limiter = RateLimiter::new(2, 60);
        assert!(limiter.check_at("k", 1_000).await);
        assert!(limiter.check_at("k", 1_010).await);
        assert!(!limiter.check_at("k", 1_020).await);
        assert!(limiter.check_at("other", 1_020).await);
        assert!(limiter.check_at("k", 1_060).await);
    }

    #[tokio::test]
    async fn expired_windows_are_dropped() {
        let limiter = RateLimiter::new(5, 60);
        for i in 0..50 {
            assert!(limiter.check_at(&format!("ip:10.0.0.{i}"), 1_000).await);
        }
        assert_eq!(limiter.tracked().await, 50);

        assert!(limiter.check_at("ip:10.0.1.1", 1_030).await);
        assert_eq!(limiter.tracked().await, 51);

        // Past the first windows' reset, only live entries survive.
        assert!(limiter.check_at("ip:10.0.1.2", 1_061).await);
        assert_eq!(limiter.tracked().await, 2);
    }
}
