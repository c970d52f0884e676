//! Edge case tests for the session gate
//!
//! Tests cover:
//! - Suspension taking effect at the next rotation
//! - Access tokens signed with a foreign secret
//! - Role gate mounted without a session gate in front
//! - Malformed request bodies

#[cfg(test)]
mod tests {
    use axum::{
        body::Body,
        extract::Extension,
        http::{header, HeaderMap, Request, StatusCode},
        middleware::{from_fn, from_fn_with_state},
        routing::get,
        Json, Router,
    };
    use time::Duration;
    use uuid::Uuid;

    use eventhub_shared::Role;

    use super::super::jwt::{AccessClaims, JwtManager, TokenType};
    use super::super::middleware::{require_organizer, require_session};
    use super::super::principal::Principal;
    use crate::config::TransportKind;
    use crate::test_support::{cookie_header, empty_request, send_to, TestApp, NOW};

    async fn whoami(Extension(principal): Extension<Principal>) -> Json<Principal> {
        Json(principal)
    }

    fn gated_router(app: &TestApp) -> Router {
        let organizer = Router::new()
            .route("/organizer", get(whoami))
            .route_layer(from_fn(require_organizer));
        Router::new()
            .route("/whoami", get(whoami))
            .merge(organizer)
            .route_layer(from_fn_with_state(app.state.clone(), require_session))
            .with_state(app.state.clone())
    }

    fn refresh_only(cookies: &str) -> String {
        cookies
            .split("; ")
            .filter(|c| c.starts_with("refresh="))
            .collect::<Vec<_>>()
            .join("; ")
    }

    // =========================================================================
    // Suspension
    // =========================================================================

    #[tokio::test]
    async fn test_suspended_user_cannot_rotate() {
        let app = TestApp::new();
        let user = app.seed_user("awais@example.com", Role::User, true).await;
        let pair = app.state.tokens.issue(&Principal::from(&user)).await.unwrap();
        let mut headers = HeaderMap::new();
        app.state.transport.attach(&mut headers, &pair);
        let cookies = refresh_only(&cookie_header(&headers));

        app.store.set_user_flags(user.id, true, false).await;

        let router = gated_router(&app);
        let response = send_to(&router, empty_request("GET", "/whoami", Some(&cookies))).await;
        assert_eq!(response.status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_missing_access_with_live_refresh_rotates() {
        let app = TestApp::new();
        let user = app.seed_user("awais@example.com", Role::User, true).await;
        let pair = app.state.tokens.issue(&Principal::from(&user)).await.unwrap();
        let mut headers = HeaderMap::new();
        app.state.transport.attach(&mut headers, &pair);
        let cookies = refresh_only(&cookie_header(&headers));

        let router = gated_router(&app);
        let response = send_to(&router, empty_request("GET", "/whoami", Some(&cookies))).await;
        assert_eq!(response.status, StatusCode::OK);
        assert_eq!(response.body["id"], user.id.to_string());
        assert_eq!(response.headers.get_all(header::SET_COOKIE).iter().count(), 2);
        assert_eq!(app.store.refresh_tokens_for(user.id).await.len(), 2);
    }

    // =========================================================================
    // Foreign signatures
    // =========================================================================

    #[tokio::test]
    async fn test_forged_access_claims_are_not_trusted() {
        let app = TestApp::with_transport(TransportKind::Header);
        let user = app.seed_user("awais@example.com", Role::User, true).await;
        let pair = app.state.tokens.issue(&Principal::from(&user)).await.unwrap();

        let forger = JwtManager::new("someone-else", "someone-else");
        let forged = forger
            .encode_access(&AccessClaims {
                sub: user.id,
                role: Role::Organizer,
                is_admin: true,
                user_name: user.user_name.clone(),
                email: user.email.clone(),
                iat: NOW.unix_timestamp(),
                exp: (NOW + Duration::days(1)).unix_timestamp(),
                jti: Uuid::new_v4().to_string(),
                typ: TokenType::Access,
            })
            .unwrap();

        let request = Request::builder()
            .uri("/organizer")
            .header(header::AUTHORIZATION, format!("Bearer {forged}"))
            .header("x-refresh-token", &pair.refresh_token)
            .body(Body::empty())
            .unwrap();

        // The forged token is ignored: rotation reloads the stored user role
        let router = gated_router(&app);
        let response = send_to(&router, request).await;
        assert_eq!(response.status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_refresh_token_from_foreign_secret_is_unauthorized() {
        let app = TestApp::with_transport(TransportKind::Header);
        let user = app.seed_user("awais@example.com", Role::User, true).await;

        let other = TestApp::with_transport(TransportKind::Header);
        let stranger = other.seed_user("awais@example.com", Role::User, true).await;
        let foreign = other
            .state
            .tokens
            .issue(&Principal::from(&stranger))
            .await
            .unwrap();
        assert_ne!(user.id, stranger.id);

        // Both apps share test secrets, so the token verifies but no record backs it
        let request = Request::builder()
            .uri("/whoami")
            .header("x-refresh-token", &foreign.refresh_token)
            .body(Body::empty())
            .unwrap();
        let router = gated_router(&app);
        let response = send_to(&router, request).await;
        assert_eq!(response.status, StatusCode::UNAUTHORIZED);
    }

    // =========================================================================
    // Gate ordering and request bodies
    // =========================================================================

    #[tokio::test]
    async fn test_role_gate_without_principal_is_unauthorized() {
        let router: Router = Router::new()
            .route("/organizer", get(whoami))
            .route_layer(from_fn(require_organizer));

        let response = send_to(&router, empty_request("GET", "/organizer", None)).await;
        assert_eq!(response.status, StatusCode::UNAUTHORIZED);
        assert_eq!(response.error_code(), "UNAUTHORIZED");
    }

    #[tokio::test]
    async fn test_malformed_json_is_missing_parameters() {
        let app = TestApp::new();
        let request = Request::builder()
            .method("POST")
            .uri("/api/v1/login")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from("{\"email\": "))
            .unwrap();

        let response = app.send(request).await;
        assert_eq!(response.status, StatusCode::BAD_REQUEST);
        assert_eq!(response.error_code(), "REQUIRED_PARAMETER_MISSING");
    }

    #[tokio::test]
    async fn test_missing_content_type_is_missing_parameters() {
        let app = TestApp::new();
        let request = Request::builder()
            .method("POST")
            .uri("/api/v1/signup")
            .body(Body::from("{}"))
            .unwrap();

        let response = app.send(request).await;
        assert_eq!(response.status, StatusCode::BAD_REQUEST);
        assert_eq!(response.error_code(), "REQUIRED_PARAMETER_MISSING");
    }
}
