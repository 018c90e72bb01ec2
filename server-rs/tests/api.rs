use std::sync::Arc;

use axum::{
    body::{to_bytes, Body},
    http::{header, Method, Request, StatusCode},
    Router,
};
use serde_json::{json, Value};
use tower::ServiceExt;
use uuid::Uuid;

use courtly_api::cache::Cache;
use courtly_api::config::Config;
use courtly_api::middleware::auth::generate_tokens;
use courtly_api::middleware::rate_limit::RateLimiter;
use courtly_api::models::user::{User, UserType};
use courtly_api::services::stripe_service::{sign_payload, StripeClient};
use courtly_api::store::{ClubStore, MemoryStore};
use courtly_api::{build_router, AppState};

struct TestApp {
    router: Router,
    store: MemoryStore,
    config: Arc<Config>,
}

impl TestApp {
    fn new() -> Self {
        Self::build(Config::from_env(), Cache::disabled(), 1_000)
    }

    /// Stripe configured with a secret key and the given signing secret.
    fn with_stripe(webhook_secret: &str) -> Self {
        let mut config = Config::from_env();
        config.stripe.secret_key = "sk_test_configured".into();
        config.stripe.webhook_secret = webhook_secret.into();
        Self::build(config, Cache::disabled(), 1_000)
    }

    fn build(config: Config, cache: Cache, max_requests: u32) -> Self {
        let store = MemoryStore::new();
        let stripe = StripeClient::new(&config.stripe);
        let config = Arc::new(config);
        let state = AppState {
            store: Arc::new(store.clone()),
            cache,
            config: config.clone(),
            stripe,
            rate_limiter: RateLimiter::new(max_requests, 60),
            submission_rate_limiter: RateLimiter::new(1_000, 60),
        };
        Self {
            router: build_router(state),
            store,
            config,
        }
    }

    async fn user(&self, name: &str, email: &str, user_type: UserType) -> (User, String) {
        let mut user = User::new(name, email, None);
        user.user_type = user_type;
        self.store.create_user(&user).await.unwrap();
        let (token, _) = generate_tokens(user.id, &self.config.jwt).unwrap();
        (user, token)
    }

    async fn send(
        &self,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut req = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            req = req.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        let req = match body {
            Some(body) => req
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => req.body(Body::empty()).unwrap(),
        };

        let res = self.router.clone().oneshot(req).await.unwrap();
        let status = res.status();
        let bytes = to_bytes(res.into_body(), usize::MAX).await.unwrap();
        let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, value)
    }

    /// Posts `event` to the Stripe webhook, signed with `secret`.
    async fn deliver(&self, event: &Value, secret: &str) -> StatusCode {
        let payload = event.to_string();
        let signature =
            sign_payload(secret, payload.as_bytes(), chrono::Utc::now().timestamp()).unwrap();
        let req = Request::builder()
            .method(Method::POST)
            .uri("/api/v1/webhooks/stripe")
            .header(header::CONTENT_TYPE, "application/json")
            .header("stripe-signature", signature)
            .body(Body::from(payload))
            .unwrap();
        self.router.clone().oneshot(req).await.unwrap().status()
    }
}

fn checkout_event(event_id: &str, club_id: &str, user_id: Uuid, plan_id: Uuid) -> Value {
    json!({
        "id": event_id,
        "type": "checkout.session.completed",
        "data": { "object": {
            "id": "cs_test_1",
            "metadata": {
                "clubId": club_id,
                "userId": user_id.to_string(),
                "planId": plan_id.to_string(),
            },
        }},
    })
}

fn submission_body(name: &str) -> Value {
    json!({
        "name": name,
        "email": "hello@club.example",
        "city": "Austin",
        "state": "TX",
        "courts": 3,
        "courtType": "clay",
    })
}

/// Submits a club as `token` and has `staff_token` approve it. Returns the
/// new club id.
async fn approved_club(app: &TestApp, token: &str, staff_token: &str, name: &str) -> String {
    let (status, body) = app
        .send(Method::POST, "/api/v1/submissions", Some(token), Some(submission_body(name)))
        .await;
    assert_eq!(status, StatusCode::CREATED);
    let submission_id = body["submission"]["id"].as_str().unwrap().to_string();

    let (status, body) = app
        .send(
            Method::POST,
            &format!("/api/v1/admin/submissions/{submission_id}/approve"),
            Some(staff_token),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    body["clubId"].as_str().unwrap().to_string()
}

#[tokio::test]
async fn health_reports_store_status() {
    let app = TestApp::new();
    let (status, body) = app.send(Method::GET, "/health", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["store"], true);
    assert_eq!(body["status"], "healthy");
}

#[tokio::test]
async fn register_then_login() {
    let app = TestApp::new();
    let (status, body) = app
        .send(
            Method::POST,
            "/api/v1/auth/register",
            None,
            Some(json!({
                "email": "New.Player@Example.com",
                "password": "correct horse",
                "fullName": "New Player",
            })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["user"]["email"], "new.player@example.com");
    assert_eq!(body["user"]["userType"], "member");

    let (status, _) = app
        .send(
            Method::POST,
            "/api/v1/auth/login",
            None,
            Some(json!({ "email": "new.player@example.com", "password": "wrong password" })),
        )
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, body) = app
        .send(
            Method::POST,
            "/api/v1/auth/login",
            None,
            Some(json!({ "email": "new.player@example.com", "password": "correct horse" })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["token"].is_string());
    assert!(body["refreshToken"].is_string());
}

#[tokio::test]
async fn protected_routes_require_a_token() {
    let app = TestApp::new();
    let (status, _) = app.send(Method::GET, "/api/v1/me", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = app
        .send(Method::GET, "/api/v1/me", Some("not-a-token"), None)
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn approval_creates_club_and_promotes_submitter() {
    let app = TestApp::new();
    let (member, token) = app.user("Sam", "sam@example.com", UserType::Member).await;
    let (_, staff_token) = app.user("Staff", "staff@courtly.example", UserType::Courtly).await;

    let club_id = approved_club(&app, &token, &staff_token, "Ace Tennis").await;

    let (status, body) = app
        .send(Method::GET, &format!("/api/v1/clubs/{club_id}"), None, None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["club"]["name"], "Ace Tennis");
    assert_eq!(body["courts"].as_array().unwrap().len(), 3);

    let (status, body) = app.send(Method::GET, "/api/v1/me", Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["user"]["id"], member.id.to_string());
    assert_eq!(body["user"]["userType"], "admin");
    assert_eq!(body["user"]["organizations"], json!([club_id]));

    let (status, body) = app
        .send(Method::GET, "/api/v1/admin/submissions", Some(&staff_token), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total"], 0);
}

#[tokio::test]
async fn submission_cannot_be_approved_twice() {
    let app = TestApp::new();
    let (_, token) = app.user("Sam", "sam@example.com", UserType::Member).await;
    let (_, staff_token) = app.user("Staff", "staff@courtly.example", UserType::Courtly).await;

    let (_, body) = app
        .send(
            Method::POST,
            "/api/v1/submissions",
            Some(&token),
            Some(submission_body("Ace Tennis")),
        )
        .await;
    let uri = format!(
        "/api/v1/admin/submissions/{}/approve",
        body["submission"]["id"].as_str().unwrap()
    );

    let (first, _) = app.send(Method::POST, &uri, Some(&staff_token), None).await;
    let (second, _) = app.send(Method::POST, &uri, Some(&staff_token), None).await;
    assert_eq!(first, StatusCode::OK);
    assert_eq!(second, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn admin_routes_reject_non_staff() {
    let app = TestApp::new();
    let (_, token) = app.user("Sam", "sam@example.com", UserType::Admin).await;

    let (status, _) = app
        .send(Method::GET, "/api/v1/admin/submissions", Some(&token), None)
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = app.send(Method::GET, "/api/v1/admin/stats", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn directory_lists_active_clubs_with_search() {
    let app = TestApp::new();
    let (_, token) = app.user("Sam", "sam@example.com", UserType::Member).await;
    let (_, staff_token) = app.user("Staff", "staff@courtly.example", UserType::Courtly).await;

    let ace = approved_club(&app, &token, &staff_token, "Ace Tennis").await;
    approved_club(&app, &token, &staff_token, "Baseline Club").await;

    let (status, body) = app.send(Method::GET, "/api/v1/clubs", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total"], 2);

    let (_, body) = app
        .send(Method::GET, "/api/v1/clubs?search=ace", None, None)
        .await;
    assert_eq!(body["total"], 1);
    assert_eq!(body["clubs"][0]["id"], ace.as_str());

    let (status, _) = app
        .send(
            Method::POST,
            &format!("/api/v1/admin/clubs/{ace}/status"),
            Some(&staff_token),
            Some(json!({ "isActive": false })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);

    let (_, body) = app.send(Method::GET, "/api/v1/clubs", None, None).await;
    assert_eq!(body["total"], 1);
    let (status, _) = app
        .send(Method::GET, &format!("/api/v1/clubs/{ace}"), None, None)
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn join_request_approval_adds_member() {
    let app = TestApp::new();
    let (_, owner_token) = app.user("Owner", "owner@example.com", UserType::Member).await;
    let (_, staff_token) = app.user("Staff", "staff@courtly.example", UserType::Courtly).await;
    let (player, player_token) = app.user("Pat", "pat@example.com", UserType::Member).await;
    let club_id = approved_club(&app, &owner_token, &staff_token, "Ace Tennis").await;

    let (status, body) = app
        .send(
            Method::POST,
            &format!("/api/v1/clubs/{club_id}/join"),
            Some(&player_token),
            Some(json!({ "message": "Keen to play doubles" })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    let request_id = body["request"]["id"].as_str().unwrap().to_string();

    let (status, _) = app
        .send(
            Method::POST,
            &format!("/api/v1/clubs/{club_id}/join"),
            Some(&player_token),
            Some(json!({})),
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);

    // Only the club's managers can see or resolve requests.
    let (status, _) = app
        .send(
            Method::GET,
            &format!("/api/v1/clubs/{club_id}/join-requests"),
            Some(&player_token),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = app
        .send(
            Method::GET,
            &format!("/api/v1/clubs/{club_id}/join-requests?status=pending"),
            Some(&owner_token),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total"], 1);

    let (status, body) = app
        .send(
            Method::POST,
            &format!("/api/v1/clubs/{club_id}/join-requests/{request_id}/approve"),
            Some(&owner_token),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["request"]["status"], "approved");

    let (_, body) = app
        .send(
            Method::GET,
            &format!("/api/v1/clubs/{club_id}/members"),
            Some(&owner_token),
            None,
        )
        .await;
    let members = body["members"].as_array().unwrap();
    assert!(members
        .iter()
        .any(|m| m["user"]["id"] == player.id.to_string() && m["role"] == "member"));

    let (_, body) = app.send(Method::GET, "/api/v1/me", Some(&player_token), None).await;
    assert_eq!(body["user"]["userType"], "member");
    assert_eq!(body["user"]["organizations"], json!([club_id]));
}

#[tokio::test]
async fn stripe_endpoints_without_configuration() {
    let app = TestApp::new();
    let (_, owner_token) = app.user("Owner", "owner@example.com", UserType::Member).await;
    let (_, staff_token) = app.user("Staff", "staff@courtly.example", UserType::Courtly).await;
    let club_id = approved_club(&app, &owner_token, &staff_token, "Ace Tennis").await;

    let (status, _) = app
        .send(
            Method::POST,
            &format!("/api/v1/clubs/{club_id}/stripe/onboard"),
            Some(&owner_token),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = app
        .send(
            Method::GET,
            &format!("/api/v1/clubs/{club_id}/stripe/status"),
            Some(&owner_token),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["connected"], false);

    let (status, _) = app
        .send(
            Method::POST,
            "/api/v1/webhooks/stripe",
            None,
            Some(json!({ "id": "evt_1", "type": "checkout.session.completed" })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn health_is_degraded_when_redis_is_unreachable() {
    let app = TestApp::build(Config::from_env(), Cache::offline("courtly:"), 1_000);
    let (status, body) = app.send(Method::GET, "/health", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["store"], true);
    assert_eq!(body["redis"], false);
    assert_eq!(body["status"], "degraded");
}

#[tokio::test]
async fn webhook_signed_with_empty_secret_is_refused() {
    let app = TestApp::with_stripe("");
    let (_, owner_token) = app.user("Owner", "owner@example.com", UserType::Member).await;
    let (_, staff_token) = app.user("Staff", "staff@courtly.example", UserType::Courtly).await;
    let (intruder, _) = app.user("Eve", "eve@example.com", UserType::Member).await;
    let club_id = approved_club(&app, &owner_token, &staff_token, "Ace Tennis").await;

    let event = checkout_event("evt_forged", &club_id, intruder.id, Uuid::new_v4());
    let status = app.deliver(&event, "").await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);

    let membership = app.store.get_membership(&club_id, intruder.id).await.unwrap();
    assert!(membership.is_none());
}

#[tokio::test]
async fn checkout_webhook_grants_membership_once() {
    let app = TestApp::with_stripe("whsec_test");
    let (_, owner_token) = app.user("Owner", "owner@example.com", UserType::Member).await;
    let (_, staff_token) = app.user("Staff", "staff@courtly.example", UserType::Courtly).await;
    let (buyer, buyer_token) = app.user("Pat", "pat@example.com", UserType::Member).await;
    let club_id = approved_club(&app, &owner_token, &staff_token, "Ace Tennis").await;
    let plan_id = Uuid::new_v4();
    let event = checkout_event("evt_paid", &club_id, buyer.id, plan_id);

    assert_eq!(app.deliver(&event, "whsec_wrong").await, StatusCode::BAD_REQUEST);
    assert!(app.store.get_membership(&club_id, buyer.id).await.unwrap().is_none());

    assert_eq!(app.deliver(&event, "whsec_test").await, StatusCode::OK);
    let membership = app.store.get_membership(&club_id, buyer.id).await.unwrap().unwrap();
    assert_eq!(membership.plan_id, Some(plan_id));

    // A redelivery is acknowledged without a second grant.
    assert_eq!(app.deliver(&event, "whsec_test").await, StatusCode::OK);
    let members = app.store.list_memberships(&club_id).await.unwrap();
    assert_eq!(members.iter().filter(|m| m.user_id == buyer.id).count(), 1);

    let (_, body) = app.send(Method::GET, "/api/v1/me", Some(&buyer_token), None).await;
    assert_eq!(body["user"]["organizations"], json!([club_id]));
}

#[tokio::test]
async fn failed_checkout_is_applied_on_redelivery() {
    let app = TestApp::with_stripe("whsec_test");
    let (_, owner_token) = app.user("Owner", "owner@example.com", UserType::Member).await;
    let (_, staff_token) = app.user("Staff", "staff@courtly.example", UserType::Courtly).await;
    let club_id = approved_club(&app, &owner_token, &staff_token, "Ace Tennis").await;

    let buyer = User::new("Late Buyer", "late@example.com", None);
    let event = checkout_event("evt_retry", &club_id, buyer.id, Uuid::new_v4());

    let first = app.deliver(&event, "whsec_test").await;
    assert!(first.is_server_error());

    app.store.create_user(&buyer).await.unwrap();
    assert_eq!(app.deliver(&event, "whsec_test").await, StatusCode::OK);
    assert!(app.store.get_membership(&club_id, buyer.id).await.unwrap().is_some());
}

#[tokio::test]
async fn profile_edits_leave_staff_fields_alone() {
    let app = TestApp::new();
    let (_, owner_token) = app.user("Owner", "owner@example.com", UserType::Member).await;
    let (_, staff_token) = app.user("Staff", "staff@courtly.example", UserType::Courtly).await;
    let (helper, _) = app.user("Helper", "helper@example.com", UserType::Member).await;
    let club_id = approved_club(&app, &owner_token, &staff_token, "Ace Tennis").await;

    let (status, _) = app
        .send(
            Method::POST,
            &format!("/api/v1/admin/clubs/{club_id}/admins"),
            Some(&staff_token),
            Some(json!({ "userId": helper.id })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = app
        .send(
            Method::POST,
            &format!("/api/v1/admin/clubs/{club_id}/status"),
            Some(&staff_token),
            Some(json!({ "isActive": false, "isVerified": false })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);

    // Status fields in the body are not part of a profile edit.
    let (status, body) = app
        .send(
            Method::PUT,
            &format!("/api/v1/clubs/{club_id}"),
            Some(&owner_token),
            Some(json!({ "name": "Ace Tennis Centre", "isActive": true, "isVerified": true })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["club"]["name"], "Ace Tennis Centre");
    assert_eq!(body["club"]["isActive"], false);
    assert_eq!(body["club"]["isVerified"], false);
    assert_eq!(body["club"]["assignedAdmins"].as_array().unwrap().len(), 2);

    let (status, body) = app
        .send(
            Method::POST,
            &format!("/api/v1/admin/clubs/{club_id}/status"),
            Some(&staff_token),
            Some(json!({ "isActive": true })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["club"]["name"], "Ace Tennis Centre");
    assert_eq!(body["club"]["isActive"], true);
}

#[tokio::test]
async fn oversized_court_counts_are_rejected() {
    let app = TestApp::new();
    let (_, token) = app.user("Sam", "sam@example.com", UserType::Member).await;
    let mut body = submission_body("Huge Club");
    body["courts"] = json!(2_147_483_647);

    let (status, _) = app
        .send(Method::POST, "/api/v1/submissions", Some(&token), Some(body))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (_, body) = app
        .send(Method::GET, "/api/v1/submissions/mine", Some(&token), None)
        .await;
    assert_eq!(body["submissions"], json!([]));
}

#[tokio::test]
async fn lesson_requests_need_an_active_club() {
    let app = TestApp::new();
    let (_, owner_token) = app.user("Owner", "owner@example.com", UserType::Member).await;
    let (_, staff_token) = app.user("Staff", "staff@courtly.example", UserType::Courtly).await;
    let (_, player_token) = app.user("Pat", "pat@example.com", UserType::Member).await;
    let club_id = approved_club(&app, &owner_token, &staff_token, "Ace Tennis").await;

    let (status, body) = app
        .send(
            Method::POST,
            &format!("/api/v1/clubs/{club_id}/coaches"),
            Some(&owner_token),
            Some(json!({ "name": "Coach Kim" })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    let lesson = json!({ "coachId": body["coach"]["id"], "preferredTime": "Saturday 9am" });
    let uri = format!("/api/v1/clubs/{club_id}/lesson-requests");

    let (status, _) = app
        .send(Method::POST, &uri, Some(&player_token), Some(lesson.clone()))
        .await;
    assert_eq!(status, StatusCode::CREATED);

    app.send(
        Method::POST,
        &format!("/api/v1/admin/clubs/{club_id}/status"),
        Some(&staff_token),
        Some(json!({ "isActive": false })),
    )
    .await;
    let (status, _) = app
        .send(Method::POST, &uri, Some(&player_token), Some(lesson))
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn rate_limit_counts_signed_in_users_separately() {
    let app = TestApp::build(Config::from_env(), Cache::disabled(), 2);
    let (_, first_token) = app.user("Sam", "sam@example.com", UserType::Member).await;
    let (_, second_token) = app.user("Pat", "pat@example.com", UserType::Member).await;

    for _ in 0..2 {
        let (status, _) = app.send(Method::GET, "/api/v1/me", Some(&first_token), None).await;
        assert_eq!(status, StatusCode::OK);
    }
    let (status, _) = app.send(Method::GET, "/api/v1/me", Some(&first_token), None).await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);

    // Same address, different account.
    let (status, _) = app.send(Method::GET, "/api/v1/me", Some(&second_token), None).await;
    assert_eq!(status, StatusCode::OK);

    // Anonymous callers share a per-address budget.
    for _ in 0..2 {
        let (status, _) = app.send(Method::GET, "/api/v1/clubs", None, None).await;
        assert_eq!(status, StatusCode::OK);
    }
    let (status, body) = app.send(Method::GET, "/api/v1/clubs", None, None).await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    assert!(body["error"].is_string());
}
