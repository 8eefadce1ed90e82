pub mod health;

use axum::{
    extract::DefaultBodyLimit,
    middleware,
    routing::{get, post, put},
    Router,
};

use crate::assistant::handlers as assistant;
use crate::auth::handlers as auth;
use crate::rate_limit;
use crate::reminders::handlers as reminders;
use crate::state::AppState;
use crate::users::handlers as users;

/// Headroom for multipart framing on top of the avatar byte limit.
const MULTIPART_OVERHEAD_BYTES: usize = 64 * 1024;

pub fn build_router(state: AppState) -> Router {
    // Unauthenticated credential endpoints share the auth bucket.
    let auth_public = Router::new()
        .route("/api/v1/auth/register", post(auth::handle_register))
        .route("/api/v1/auth/login", post(auth::handle_login))
        .route("/api/v1/auth/refresh", post(auth::handle_refresh))
        .route("/api/v1/auth/google", post(auth::handle_google_login))
        .route("/api/v1/auth/face/login", post(auth::handle_face_login))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            rate_limit::limit_auth,
        ));

    let assistant_routes = Router::new()
        .route("/api/v1/assistant/symptoms", post(assistant::handle_symptoms))
        .route("/api/v1/assistant/diet", post(assistant::handle_diet))
        .route("/api/v1/assistant/chat", post(assistant::handle_chat))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            rate_limit::limit_ai,
        ));

    let avatar_limit = state.config.max_avatar_bytes + MULTIPART_OVERHEAD_BYTES;

    Router::new()
        .route("/health", get(health::health_handler))
        .route("/health/ready", get(health::ready_handler))
        // Auth
        .merge(auth_public)
        .route("/api/v1/auth/logout", post(auth::handle_logout))
        .route("/api/v1/auth/me", get(auth::handle_me))
        .route(
            "/api/v1/auth/face",
            get(auth::handle_face_list).delete(auth::handle_face_delete),
        )
        .route("/api/v1/auth/face/enroll", post(auth::handle_face_enroll))
        // Profile
        .route(
            "/api/v1/profile",
            get(users::handle_get_profile)
                .patch(users::handle_update_profile)
                .delete(users::handle_delete_account),
        )
        .route(
            "/api/v1/profile/avatar",
            put(users::handle_upload_avatar)
                .get(users::handle_get_avatar)
                .layer(DefaultBodyLimit::max(avatar_limit)),
        )
        // Reminders
        .route(
            "/api/v1/reminders",
            get(reminders::handle_list_reminders).post(reminders::handle_create_reminder),
        )
        .route("/api/v1/reminders/upcoming", get(reminders::handle_upcoming))
        .route("/api/v1/reminders/due", get(reminders::handle_list_due))
        .route(
            "/api/v1/reminders/:id",
            get(reminders::handle_get_reminder)
                .patch(reminders::handle_update_reminder)
                .delete(reminders::handle_delete_reminder),
        )
        .route(
            "/api/v1/reminders/:id/doses",
            get(reminders::handle_list_doses).post(reminders::handle_record_dose),
        )
        // Assistant
        .merge(assistant_routes)
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::google::GoogleVerifier;
    use crate::auth::tokens::create_access_token;
    use crate::config::Config;
    use crate::llm_client::LlmClient;
    use axum::body::Body;
    use axum::http::{header, Request, StatusCode};
    use serde_json::{json, Value};
    use sqlx::postgres::PgPoolOptions;
    use std::time::Duration;
    use tower::ServiceExt;
    use uuid::Uuid;

    const SECRET: &str = "router-test-secret";

    fn test_config() -> Config {
        Config {
            database_url: "postgres://127.0.0.1:1/medassist".into(),
            redis_url: "redis://127.0.0.1:1".into(),
            s3_bucket: "avatars".into(),
            s3_endpoint: "http://127.0.0.1:1".into(),
            aws_access_key_id: "test".into(),
            aws_secret_access_key: "test".into(),
            gemini_api_key: "test".into(),
            jwt_secret: SECRET.into(),
            google_client_id: None,
            face_match_threshold: 0.6,
            access_token_ttl_secs: 3600,
            refresh_token_ttl_days: 30,
            auth_rate_limit: 20,
            ai_rate_limit: 30,
            rate_limit_window_secs: 900,
            max_avatar_bytes: 1024,
            reminder_sweep_secs: 60,
            cors_origin: None,
            port: 0,
            rust_log: "info".into(),
        }
    }

    /// State whose backends are all unreachable; only request paths that
    /// fail before touching storage can succeed.
    fn test_state() -> AppState {
        let config = test_config();
        let db = PgPoolOptions::new()
            .acquire_timeout(Duration::from_millis(200))
            .connect_lazy(&config.database_url)
            .unwrap();
        let s3_config = aws_sdk_s3::Config::builder()
            .behavior_version(aws_sdk_s3::config::BehaviorVersion::latest())
            .region(aws_sdk_s3::config::Region::new("us-east-1"))
            .build();
        AppState {
            db,
            redis: redis::Client::open(config.redis_url.clone()).unwrap(),
            s3: aws_sdk_s3::Client::from_conf(s3_config),
            llm: LlmClient::new(config.gemini_api_key.clone()).unwrap(),
            google: GoogleVerifier::new(None).unwrap(),
            config,
        }
    }

    fn json_request(method: &str, uri: &str, body: Value, token: Option<&str>) -> Request<Body> {
        let mut builder = Request::builder()
            .method(method)
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json");
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        builder.body(Body::from(body.to_string())).unwrap()
    }

    fn bearer() -> String {
        create_access_token(Uuid::new_v4(), "pat@example.com", SECRET, 3600).unwrap()
    }

    async fn body_json(response: axum::response::Response) -> Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_health() {
        let response = build_router(test_state())
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["status"], "ok");
        assert_eq!(body["service"], "medassist-api");
    }

    #[tokio::test]
    async fn test_ready_reports_unavailable_database() {
        let response = build_router(test_state())
            .oneshot(Request::get("/health/ready").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn test_protected_routes_require_token() {
        for uri in ["/api/v1/auth/me", "/api/v1/profile", "/api/v1/reminders"] {
            let response = build_router(test_state())
                .oneshot(Request::get(uri).body(Body::empty()).unwrap())
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::UNAUTHORIZED, "{uri}");
        }
    }

    #[tokio::test]
    async fn test_garbage_token_rejected() {
        let response = build_router(test_state())
            .oneshot(json_request(
                "POST",
                "/api/v1/assistant/chat",
                json!({"message": "hi"}),
                Some("not-a-jwt"),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_register_validates_before_storage() {
        let response = build_router(test_state())
            .oneshot(json_request(
                "POST",
                "/api/v1/auth/register",
                json!({"name": "Pat", "email": "pat@example.com", "password": "short"}),
                None,
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = body_json(response).await;
        assert_eq!(body["error"]["code"], "VALIDATION_ERROR");
    }

    #[tokio::test]
    async fn test_face_login_rejects_bad_descriptor() {
        let response = build_router(test_state())
            .oneshot(json_request(
                "POST",
                "/api/v1/auth/face/login",
                json!({"descriptor": [0.1, 0.2]}),
                None,
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_assistant_rejects_empty_message() {
        let token = bearer();
        let response = build_router(test_state())
            .oneshot(json_request(
                "POST",
                "/api/v1/assistant/chat",
                json!({"message": "   "}),
                Some(&token),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_upcoming_hours_bounds() {
        let token = bearer();
        let response = build_router(test_state())
            .oneshot(
                Request::get("/api/v1/reminders/upcoming?hours=500")
                    .header(header::AUTHORIZATION, format!("Bearer {token}"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_google_disabled_without_client_id() {
        let response = build_router(test_state())
            .oneshot(json_request(
                "POST",
                "/api/v1/auth/google",
                json!({"credential": "abc"}),
                None,
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
