//! HTTP routes

pub mod auth;
pub mod events;

use axum::{
    middleware::{from_fn, from_fn_with_state},
    routing::{delete, get, post, put},
    Json, Router,
};
use serde_json::{json, Value};

use crate::{
    auth::{require_organizer, require_session},
    rate_limit::rate_limit,
    state::AppState,
};

/// Build the application router.
///
/// Public routes (no session):
/// - POST /api/v1/signup, /send-email-otp, /verify-email-otp, /login, /logout
/// - POST /api/v1/forget-password, /forget-password-verify-otp, /forget-password-complete
///
/// Session routes (any role):
/// - GET /api/v1/events, /event/{event_id}
/// - POST /api/v1/event/{event_id}/register
/// - PUT /api/v1/event-registrations/{registration_id}/participate
/// - DELETE /api/v1/event-registrations/{registration_id}
///
/// Organizer routes:
/// - GET /api/v1/my-events, /my-event/{event_id}
/// - POST /api/v1/event
/// - PUT, DELETE /api/v1/event/{event_id}
///
/// Everything under /api/v1 counts against the caller's rate limit.
pub fn create_router(state: AppState) -> Router {
    let public_routes = Router::new()
        .route("/signup", post(auth::signup))
        .route("/send-email-otp", post(auth::send_email_otp))
        .route("/verify-email-otp", post(auth::verify_email_otp))
        .route("/login", post(auth::login))
        .route("/logout", post(auth::logout))
        .route("/forget-password", post(auth::forget_password))
        .route(
            "/forget-password-verify-otp",
            post(auth::forget_password_verify_otp),
        )
        .route(
            "/forget-password-complete",
            post(auth::forget_password_complete),
        );

    let user_routes = Router::new()
        .route("/events", get(events::list_events))
        .route("/event/{event_id}", get(events::get_event))
        .route(
            "/event/{event_id}/register",
            post(events::register_for_event),
        )
        .route(
            "/event-registrations/{registration_id}/participate",
            put(events::participate),
        )
        .route(
            "/event-registrations/{registration_id}",
            delete(events::cancel_registration),
        )
        .route_layer(from_fn_with_state(state.clone(), require_session));

    // Layers run bottom-up: session first, then the role gate
    let organizer_routes = Router::new()
        .route("/my-events", get(events::list_my_events))
        .route("/event", post(events::create_event))
        .route("/my-event/{event_id}", get(events::get_my_event))
        .route(
            "/event/{event_id}",
            put(events::update_event).delete(events::delete_event),
        )
        .route_layer(from_fn(require_organizer))
        .route_layer(from_fn_with_state(state.clone(), require_session));

    let api = public_routes
        .merge(user_routes)
        .merge(organizer_routes)
        .layer(from_fn_with_state(state.clone(), rate_limit));

    Router::new()
        .route("/health", get(health))
        .nest("/api/v1", api)
        .with_state(state)
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}
