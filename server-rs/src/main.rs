use std::net::SocketAddr;
use std::sync::Arc;

use courtly_api::cache::Cache;
use courtly_api::config::Config;
use courtly_api::middleware::rate_limit::RateLimiter;
use courtly_api::services::stripe_service::StripeClient;
use courtly_api::{build_router, store, AppState};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .json()
        .init();

    let config = Config::from_env();
    config.validate()?;

    let store = store::connect(&config).await?;
    let cache = Cache::new(&config).await;
    let stripe = StripeClient::new(&config.stripe);
    if stripe.is_none() {
        tracing::warn!("STRIPE_SECRET_KEY not set; membership payments are disabled");
    }
    let rate_limiter =
        RateLimiter::new(config.rate_limit.max_requests, config.rate_limit.window_secs);
    let submission_rate_limiter = RateLimiter::new(
        config.rate_limit.submission_max,
        config.rate_limit.window_secs,
    );

    let port = config.port;
    let state = AppState {
        store,
        cache,
        config: Arc::new(config),
        stripe,
        rate_limiter,
        submission_rate_limiter,
    };

    let listener = tokio::net::TcpListener::bind(("0.0.0.0", port)).await?;
    tracing::info!(%port, "Courtly API listening");

    axum::serve(
        listener,
        build_router(state).into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;
    Ok(())
}
