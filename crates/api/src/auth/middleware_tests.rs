//! Unit tests for the session and role gates
//!
//! Tests cover:
//! - Missing, tampered and expired tokens
//! - Rotation when the access token has lapsed, and single use of the old refresh token
//! - Header transport (bearer in, `X-Access-Token` out)
//! - Role gate behind the session gate

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

    use eventhub_shared::{Role, User};

    use super::super::middleware::{require_organizer, require_session};
    use super::super::principal::Principal;
    use crate::config::TransportKind;
    use crate::test_support::{cookie_header, empty_request, send_to, TestApp};

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

    /// Issue a pair for `user` and render it the way the transport would
    async fn session_headers(app: &TestApp, user: &User) -> HeaderMap {
        let pair = app.state.tokens.issue(&Principal::from(user)).await.unwrap();
        let mut headers = HeaderMap::new();
        app.state.transport.attach(&mut headers, &pair);
        headers
    }

    async fn session_cookies(app: &TestApp, user: &User) -> String {
        cookie_header(&session_headers(app, user).await)
    }

    #[tokio::test]
    async fn test_no_tokens_is_unauthorized() {
        let app = TestApp::new();
        let router = gated_router(&app);

        let response = send_to(&router, empty_request("GET", "/whoami", None)).await;
        assert_eq!(response.status, StatusCode::UNAUTHORIZED);
        assert_eq!(response.error_code(), "UNAUTHORIZED");
    }

    #[tokio::test]
    async fn test_access_without_refresh_is_unauthorized() {
        let app = TestApp::new();
        let user = app.seed_user("awais@example.com", Role::User, true).await;
        let cookies = session_cookies(&app, &user).await;
        let access_only = cookies
            .split("; ")
            .find(|c| c.starts_with("access="))
            .unwrap()
            .to_string();

        let router = gated_router(&app);
        let response = send_to(&router, empty_request("GET", "/whoami", Some(&access_only))).await;
        assert_eq!(response.status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_valid_session_passes_without_rotation() {
        let app = TestApp::new();
        let user = app.seed_user("awais@example.com", Role::User, true).await;
        let cookies = session_cookies(&app, &user).await;

        let router = gated_router(&app);
        let response = send_to(&router, empty_request("GET", "/whoami", Some(&cookies))).await;
        assert_eq!(response.status, StatusCode::OK);
        assert_eq!(response.body["id"], user.id.to_string());
        assert_eq!(response.body["email"], "awais@example.com");
        assert!(response.headers.get(header::SET_COOKIE).is_none());
    }

    #[tokio::test]
    async fn test_expired_access_rotates_once() {
        let app = TestApp::new();
        let user = app.seed_user("awais@example.com", Role::User, true).await;
        let old_cookies = session_cookies(&app, &user).await;
        app.clock.advance(Duration::days(16));

        let router = gated_router(&app);
        let response = send_to(&router, empty_request("GET", "/whoami", Some(&old_cookies))).await;
        assert_eq!(response.status, StatusCode::OK);
        assert_eq!(response.headers.get_all(header::SET_COOKIE).iter().count(), 2);
        let new_cookies = response.cookies();
        assert_ne!(new_cookies, old_cookies);

        // The old refresh token has been spent
        let replay = send_to(&router, empty_request("GET", "/whoami", Some(&old_cookies))).await;
        assert_eq!(replay.status, StatusCode::UNAUTHORIZED);

        let fresh = send_to(&router, empty_request("GET", "/whoami", Some(&new_cookies))).await;
        assert_eq!(fresh.status, StatusCode::OK);
        assert!(fresh.headers.get(header::SET_COOKIE).is_none());
    }

    #[tokio::test]
    async fn test_tampered_access_cookie_falls_back_to_rotation() {
        let app = TestApp::new();
        let user = app.seed_user("awais@example.com", Role::User, true).await;
        let cookies = session_cookies(&app, &user).await;
        let tampered = cookies.replacen("access=s:", "access=s:x", 1);

        let router = gated_router(&app);
        let response = send_to(&router, empty_request("GET", "/whoami", Some(&tampered))).await;
        assert_eq!(response.status, StatusCode::OK);
        assert_eq!(response.headers.get_all(header::SET_COOKIE).iter().count(), 2);
    }

    #[tokio::test]
    async fn test_tampered_refresh_cookie_is_unauthorized() {
        let app = TestApp::new();
        let user = app.seed_user("awais@example.com", Role::User, true).await;
        let cookies = session_cookies(&app, &user).await;
        let tampered = cookies.replacen("refresh=s:", "refresh=s:x", 1);
        app.clock.advance(Duration::days(16));

        let router = gated_router(&app);
        let response = send_to(&router, empty_request("GET", "/whoami", Some(&tampered))).await;
        assert_eq!(response.status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_expired_refresh_is_unauthorized() {
        let app = TestApp::new();
        let user = app.seed_user("awais@example.com", Role::User, true).await;
        let cookies = session_cookies(&app, &user).await;
        app.clock.advance(Duration::days(31));

        let router = gated_router(&app);
        let response = send_to(&router, empty_request("GET", "/whoami", Some(&cookies))).await;
        assert_eq!(response.status, StatusCode::UNAUTHORIZED);
        assert_eq!(response.error_code(), "UNAUTHORIZED");
    }

    #[tokio::test]
    async fn test_role_gate() {
        let app = TestApp::new();
        let user = app.seed_user("user@example.com", Role::User, true).await;
        let organizer = app
            .seed_user("organizer@example.com", Role::Organizer, true)
            .await;
        let router = gated_router(&app);

        let user_cookies = session_cookies(&app, &user).await;
        let denied = send_to(&router, empty_request("GET", "/organizer", Some(&user_cookies))).await;
        assert_eq!(denied.status, StatusCode::UNAUTHORIZED);
        assert_eq!(denied.error_code(), "UNAUTHORIZED");

        let organizer_cookies = session_cookies(&app, &organizer).await;
        let allowed = send_to(
            &router,
            empty_request("GET", "/organizer", Some(&organizer_cookies)),
        )
        .await;
        assert_eq!(allowed.status, StatusCode::OK);
        assert_eq!(allowed.body["role"], "organizer");
    }

    #[tokio::test]
    async fn test_header_transport_rotation() {
        let app = TestApp::with_transport(TransportKind::Header);
        let user = app.seed_user("awais@example.com", Role::User, true).await;
        let issued = session_headers(&app, &user).await;
        let access = issued.get("x-access-token").unwrap().to_str().unwrap().to_string();
        let refresh = issued.get("x-refresh-token").unwrap().to_str().unwrap().to_string();
        let router = gated_router(&app);

        let request = |access: &str, refresh: &str| {
            Request::builder()
                .uri("/whoami")
                .header(header::AUTHORIZATION, format!("Bearer {access}"))
                .header("x-refresh-token", refresh)
                .body(Body::empty())
                .unwrap()
        };

        let response = send_to(&router, request(&access, &refresh)).await;
        assert_eq!(response.status, StatusCode::OK);
        assert!(response.headers.get("x-access-token").is_none());

        app.clock.advance(Duration::days(16));
        let rotated = send_to(&router, request(&access, &refresh)).await;
        assert_eq!(rotated.status, StatusCode::OK);
        let new_access = rotated.headers.get("x-access-token").unwrap().to_str().unwrap();
        assert_ne!(new_access, access);
        assert!(rotated.headers.get("x-refresh-token").is_some());
        assert!(rotated.headers.get(header::SET_COOKIE).is_none());
    }
}
