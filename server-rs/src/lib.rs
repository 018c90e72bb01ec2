use axum::{
    http::HeaderValue,
    middleware as axum_mw,
    routing::{delete, get, post, put},
    Router,
};
use std::sync::Arc;
use tower_http::compression::CompressionLayer;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;

pub mod cache;
pub mod config;
pub mod db;
pub mod error;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod services;
pub mod store;

use cache::Cache;
use config::Config;
use middleware::rate_limit::RateLimiter;
use services::stripe_service::StripeClient;
use store::SharedStore;

#[derive(Clone)]
pub struct AppState {
    pub store: SharedStore,
    pub cache: Cache,
    pub config: Arc<Config>,
    pub stripe: Option<StripeClient>,
    pub rate_limiter: RateLimiter,
    pub submission_rate_limiter: RateLimiter,
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let allow_origin = if origins.iter().any(|o| o == "*") {
        AllowOrigin::from(Any)
    } else {
        AllowOrigin::list(
            origins
                .iter()
                .filter_map(|o| HeaderValue::from_str(o).ok()),
        )
    };
    CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods(Any)
        .allow_headers(Any)
}

pub fn build_router(state: AppState) -> Router {
    let cors = cors_layer(&state.config.cors_origins);

    // --- Auth routes (no auth required) ---
    let auth_routes = Router::new()
        .route("/register", post(routes::auth::register))
        .route("/login", post(routes::auth::login))
        .route("/refresh", post(routes::auth::refresh))
        .layer(axum_mw::from_fn_with_state(
            state.clone(),
            middleware::rate_limit::rate_limit,
        ));

    // --- Webhook routes (raw body, no auth) ---
    let webhook_routes = Router::new()
        .route("/stripe", post(routes::webhooks::stripe_webhook))
        .layer(axum_mw::from_fn_with_state(
            state.clone(),
            middleware::rate_limit::rate_limit,
        ));

    // --- Authenticated routes ---
    // The limiter sits inside authenticate so it can key on the user.
    let me_routes = Router::new()
        .route("/me", get(routes::me::me))
        .route("/dashboard", get(routes::me::dashboard))
        .layer(axum_mw::from_fn_with_state(
            state.clone(),
            middleware::rate_limit::rate_limit,
        ))
        .layer(axum_mw::from_fn_with_state(
            state.clone(),
            middleware::auth::authenticate,
        ));

    let submission_routes = Router::new()
        .route(
            "/",
            post(routes::submissions::create_submission).layer(axum_mw::from_fn_with_state(
                state.clone(),
                middleware::rate_limit::submission_rate_limit,
            )),
        )
        .route("/mine", get(routes::submissions::my_submissions))
        .layer(axum_mw::from_fn_with_state(
            state.clone(),
            middleware::rate_limit::rate_limit,
        ))
        .layer(axum_mw::from_fn_with_state(
            state.clone(),
            middleware::auth::authenticate,
        ));

    // Staff only: authenticate runs first, then require_staff, then the limiter.
    let admin_routes = Router::new()
        .route("/submissions", get(routes::admin::list_submissions))
        .route("/submissions/:id", get(routes::admin::get_submission))
        .route(
            "/submissions/:id/approve",
            post(routes::admin::approve_submission),
        )
        .route(
            "/submissions/:id/decline",
            post(routes::admin::decline_submission),
        )
        .route("/stats", get(routes::admin::stats))
        .route("/users/import", post(routes::admin::import_users))
        .route("/clubs/:id", delete(routes::admin::delete_club))
        .route("/clubs/:id/admins", post(routes::admin::assign_admin))
        .route(
            "/clubs/:id/admins/:userId",
            delete(routes::admin::remove_admin),
        )
        .route("/clubs/:id/status", post(routes::admin::set_club_status))
        .layer(axum_mw::from_fn_with_state(
            state.clone(),
            middleware::rate_limit::rate_limit,
        ))
        .layer(axum_mw::from_fn_with_state(
            state.clone(),
            middleware::admin::require_staff,
        ))
        .layer(axum_mw::from_fn_with_state(
            state.clone(),
            middleware::auth::authenticate,
        ));

    // Directory and club pages are public; everything else needs a session.
    let public_club_routes = Router::new()
        .route("/", get(routes::clubs::list_clubs))
        .route("/:id", get(routes::clubs::get_club))
        .route("/:id/courts", get(routes::facilities::list_courts))
        .route("/:id/coaches", get(routes::facilities::list_coaches))
        .route("/:id/lessons", get(routes::facilities::list_lessons))
        .route("/:id/plans", get(routes::plans::list_plans))
        .layer(axum_mw::from_fn_with_state(
            state.clone(),
            middleware::rate_limit::rate_limit,
        ));

    let club_routes = Router::new()
        .route("/:id", put(routes::clubs::update_club))
        .route("/:id/members", get(routes::clubs::list_members))
        .route("/:id/courts", post(routes::facilities::create_court))
        .route(
            "/:id/courts/:courtId",
            put(routes::facilities::update_court).delete(routes::facilities::delete_court),
        )
        .route("/:id/coaches", post(routes::facilities::create_coach))
        .route(
            "/:id/coaches/:coachId",
            delete(routes::facilities::delete_coach),
        )
        .route("/:id/lessons", post(routes::facilities::create_lesson))
        .route(
            "/:id/lessons/:lessonId",
            delete(routes::facilities::delete_lesson),
        )
        .route(
            "/:id/join",
            post(routes::requests::request_to_join).layer(axum_mw::from_fn_with_state(
                state.clone(),
                middleware::rate_limit::submission_rate_limit,
            )),
        )
        .route(
            "/:id/join-requests",
            get(routes::requests::list_join_requests),
        )
        .route(
            "/:id/join-requests/:requestId/approve",
            post(routes::requests::approve_join_request),
        )
        .route(
            "/:id/join-requests/:requestId/decline",
            post(routes::requests::decline_join_request),
        )
        .route(
            "/:id/lesson-requests",
            post(routes::requests::request_lesson)
                .layer(axum_mw::from_fn_with_state(
                    state.clone(),
                    middleware::rate_limit::submission_rate_limit,
                ))
                .get(routes::requests::list_lesson_requests),
        )
        .route(
            "/:id/lesson-requests/:requestId/approve",
            post(routes::requests::approve_lesson_request),
        )
        .route(
            "/:id/lesson-requests/:requestId/decline",
            post(routes::requests::decline_lesson_request),
        )
        .route("/:id/plans", post(routes::plans::create_plan))
        .route(
            "/:id/plans/:planId",
            put(routes::plans::update_plan).delete(routes::plans::delete_plan),
        )
        .route(
            "/:id/plans/:planId/checkout",
            post(routes::stripe_connect::checkout),
        )
        .route("/:id/stripe/onboard", post(routes::stripe_connect::onboard))
        .route("/:id/stripe/status", get(routes::stripe_connect::status))
        .route(
            "/:id/stripe/dashboard",
            post(routes::stripe_connect::dashboard_link),
        )
        .layer(axum_mw::from_fn_with_state(
            state.clone(),
            middleware::rate_limit::rate_limit,
        ))
        .layer(axum_mw::from_fn_with_state(
            state.clone(),
            middleware::auth::authenticate,
        ));

    // --- Compose full API ---
    let api = Router::new()
        .nest("/auth", auth_routes)
        .merge(me_routes)
        .nest("/submissions", submission_routes)
        .nest("/admin", admin_routes)
        .nest("/clubs", public_club_routes.merge(club_routes))
        .nest("/webhooks", webhook_routes);

    Router::new()
        .nest("/api/v1", api)
        .route("/health", get(routes::health::health))
        // Global middleware
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
