use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use anyhow::Context;
use axum::{
    Json, Router,
    extract::{Path, Query, Request, State},
    http::{HeaderValue, StatusCode, header},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::get,
};
use log::error;
use serde::{Deserialize, Serialize};
use tower_http::limit::RequestBodyLimitLayer;

use crate::remote::RankedProfile;
use crema_core::db::Database;
use crema_core::leaderboard::{DEFAULT_LIMIT, MAX_LIMIT};
use crema_core::models::{ProfileUpdate, UserProfile};

const BODY_LIMIT: usize = 5 * 1024 * 1024; // 5 MB
const MAX_UID_LEN: usize = 128;

#[derive(Clone)]
struct AppState {
    db: Arc<Mutex<Database>>,
    api_key: Option<String>,
}

impl AppState {
    fn db(&self) -> MutexGuard<'_, Database> {
        self.db.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[derive(Deserialize)]
struct LeaderboardQuery {
    limit: Option<usize>,
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

// --- Error handling ---

enum ApiError {
    NotFound(String),
    BadRequest(String),
    Internal(anyhow::Error),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            Self::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            Self::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            Self::Internal(err) => {
                error!("Internal server error: {err:#}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
        };
        (status, Json(ErrorResponse { error: message })).into_response()
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        Self::Internal(err)
    }
}

fn validate_uid(uid: &str) -> Result<(), ApiError> {
    if uid.trim().is_empty() {
        return Err(ApiError::BadRequest("User id must not be empty".to_string()));
    }
    if uid.len() > MAX_UID_LEN {
        return Err(ApiError::BadRequest(format!(
            "User id must be at most {MAX_UID_LEN} bytes"
        )));
    }
    Ok(())
}

// --- Middleware ---

async fn require_auth(State(state): State<AppState>, request: Request, next: Next) -> Response {
    if let Some(ref expected_key) = state.api_key {
        let authorized = request
            .headers()
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
            .is_some_and(|token| token == expected_key);

        if !authorized {
            return (
                StatusCode::UNAUTHORIZED,
                Json(ErrorResponse {
                    error: "Invalid or missing API key".to_string(),
                }),
            )
                .into_response();
        }
    }
    next.run(request).await
}

async fn security_headers(request: Request, next: Next) -> Response {
    let mut response = next.run(request).await;
    let headers = response.headers_mut();
    headers.insert(
        "x-content-type-options",
        HeaderValue::from_static("nosniff"),
    );
    headers.insert("x-frame-options", HeaderValue::from_static("DENY"));
    headers.insert(
        "content-security-policy",
        HeaderValue::from_static("default-src 'none'"),
    );
    response
}

// --- Handlers ---

async fn get_user(
    State(state): State<AppState>,
    Path(uid): Path<String>,
) -> Result<Json<UserProfile>, ApiError> {
    validate_uid(&uid)?;
    let profile = state.db().get_profile(&uid).context("database error")?;
    profile
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("No user document for '{uid}'")))
}

/// Full overwrite, used when an account is first created.
async fn put_user(
    State(state): State<AppState>,
    Path(uid): Path<String>,
    Json(profile): Json<UserProfile>,
) -> Result<StatusCode, ApiError> {
    validate_uid(&uid)?;
    state
        .db()
        .put_profile(&uid, &profile)
        .context("database error")?;
    Ok(StatusCode::NO_CONTENT)
}

async fn patch_user(
    State(state): State<AppState>,
    Path(uid): Path<String>,
    Json(update): Json<ProfileUpdate>,
) -> Result<StatusCode, ApiError> {
    validate_uid(&uid)?;
    if update.is_empty() {
        return Err(ApiError::BadRequest(
            "Update must set at least one of points, brews, drinks, shops".to_string(),
        ));
    }
    let merged = state
        .db()
        .merge_profile(&uid, &update)
        .context("database error")?;
    if !merged {
        return Err(ApiError::NotFound(format!("No user document for '{uid}'")));
    }
    Ok(StatusCode::NO_CONTENT)
}

async fn leaderboard(
    State(state): State<AppState>,
    Query(query): Query<LeaderboardQuery>,
) -> Result<Json<Vec<RankedProfile>>, ApiError> {
    let limit = query.limit.unwrap_or(DEFAULT_LIMIT);
    if limit == 0 || limit > MAX_LIMIT {
        return Err(ApiError::BadRequest(format!(
            "limit must be between 1 and {MAX_LIMIT}"
        )));
    }
    let top = state.db().top_profiles(limit).context("database error")?;
    Ok(Json(
        top.into_iter()
            .map(|(uid, profile)| RankedProfile { uid, profile })
            .collect(),
    ))
}

fn build_router(state: AppState) -> Router {
    Router::new()
        .route(
            "/api/users/{uid}",
            get(get_user).put(put_user).patch(patch_user),
        )
        .route("/api/leaderboard", get(leaderboard))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_auth))
        .layer(RequestBodyLimitLayer::new(BODY_LIMIT))
        .layer(middleware::from_fn(security_headers))
        .with_state(state)
}

/// Router serving user documents from `db`.
pub fn router(db: Database, api_key: Option<String>) -> Router {
    build_router(AppState {
        db: Arc::new(Mutex::new(db)),
        api_key,
    })
}

// --- Server startup ---

pub async fn start_server(
    db: Database,
    port: u16,
    bind: &str,
    api_key: Option<String>,
) -> anyhow::Result<()> {
    if let Some(ref key) = api_key {
        eprintln!(
            "API key: {}...{} (see api_key file in data directory)",
            &key[..4],
            &key[key.len() - 4..],
        );
    } else {
        eprintln!("Warning: Authentication disabled (--no-auth). API is open to anyone.");
    }

    if bind != "127.0.0.1" && bind != "localhost" && api_key.is_none() {
        eprintln!(
            "Warning: Listening on {bind} with no authentication. Any device on your network can read and change every profile."
        );
    }

    let app = router(db, api_key);
    let listener = tokio::net::TcpListener::bind(format!("{bind}:{port}"))
        .await
        .with_context(|| format!("Failed to bind {bind}:{port}"))?;
    eprintln!("Listening on http://{bind}:{port}");
    axum::serve(listener, app).await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use crema_core::models::{Drink, NewDrink};
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    fn test_app(api_key: Option<String>) -> (Router, Arc<Mutex<Database>>) {
        let db = Arc::new(Mutex::new(Database::open_in_memory().unwrap()));
        let app = build_router(AppState {
            db: Arc::clone(&db),
            api_key,
        });
        (app, db)
    }

    fn seed(db: &Arc<Mutex<Database>>, uid: &str, points: u64) {
        let profile = UserProfile {
            email: Some(format!("{uid}@example.com")),
            points,
            ..UserProfile::default()
        };
        db.lock().unwrap().put_profile(uid, &profile).unwrap();
    }

    async fn body_json(response: Response) -> serde_json::Value {
        let body = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&body).unwrap()
    }

    fn json_request(method: &str, uri: &str, body: &serde_json::Value) -> axum::http::Request<Body> {
        axum::http::Request::builder()
            .method(method)
            .uri(uri)
            .header("Content-Type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn auth_missing_key_returns_401() {
        let (app, _) = test_app(Some("test-key-abc123".to_string()));

        let response = app
            .oneshot(
                axum::http::Request::get("/api/leaderboard")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        let json = body_json(response).await;
        assert_eq!(json["error"], "Invalid or missing API key");
    }

    #[tokio::test]
    async fn auth_wrong_key_returns_401() {
        let (app, _) = test_app(Some("test-key-abc123".to_string()));

        let response = app
            .oneshot(
                axum::http::Request::get("/api/leaderboard")
                    .header("Authorization", "Bearer wrong-key")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn auth_correct_key_succeeds() {
        let (app, _) = test_app(Some("test-key-abc123".to_string()));

        let response = app
            .oneshot(
                axum::http::Request::get("/api/leaderboard")
                    .header("Authorization", "Bearer test-key-abc123")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn security_headers_on_auth_failure() {
        let (app, _) = test_app(Some("secret".to_string()));

        let response = app
            .oneshot(
                axum::http::Request::get("/api/users/u1")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            response.headers().get("x-content-type-options").unwrap(),
            "nosniff"
        );
        assert_eq!(response.headers().get("x-frame-options").unwrap(), "DENY");
        assert_eq!(
            response.headers().get("content-security-policy").unwrap(),
            "default-src 'none'"
        );
    }

    #[tokio::test]
    async fn get_missing_user_returns_404() {
        let (app, _) = test_app(None);

        let response = app
            .oneshot(
                axum::http::Request::get("/api/users/ghost")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let json = body_json(response).await;
        assert!(json["error"].as_str().unwrap().contains("ghost"));
    }

    #[tokio::test]
    async fn put_then_get_user() {
        let (app, _) = test_app(None);
        let doc = serde_json::json!({
            "email": "anna@example.com",
            "displayName": "anna",
            "points": 0,
            "brews": [],
            "drinks": [],
            "shops": [],
            "createdAt": "2024-06-15T08:00:00+00:00"
        });

        let response = app
            .clone()
            .oneshot(json_request("PUT", "/api/users/u-anna", &doc))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NO_CONTENT);

        let response = app
            .oneshot(
                axum::http::Request::get("/api/users/u-anna")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert_eq!(json["displayName"], "anna");
        assert_eq!(json["createdAt"], "2024-06-15T08:00:00+00:00");
    }

    #[tokio::test]
    async fn patch_merges_fields() {
        let (app, db) = test_app(None);
        seed(&db, "u-anna", 40);

        let drinks = vec![Drink::from_new(
            NewDrink {
                drink_name: "Cortado".to_string(),
                recipe: "1:1".to_string(),
            },
            "d1".to_string(),
        )];
        let body = serde_json::json!({ "drinks": drinks });
        let response = app
            .oneshot(json_request("PATCH", "/api/users/u-anna", &body))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NO_CONTENT);

        let stored = db.lock().unwrap().get_profile("u-anna").unwrap().unwrap();
        assert_eq!(stored.drinks, drinks);
        assert_eq!(stored.points, 40);
        assert_eq!(stored.email.as_deref(), Some("u-anna@example.com"));
    }

    #[tokio::test]
    async fn patch_missing_user_returns_404() {
        let (app, db) = test_app(None);

        let response = app
            .oneshot(json_request(
                "PATCH",
                "/api/users/ghost",
                &serde_json::json!({ "points": 5 }),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert!(db.lock().unwrap().get_profile("ghost").unwrap().is_none());
    }

    #[tokio::test]
    async fn patch_without_fields_returns_400() {
        let (app, db) = test_app(None);
        seed(&db, "u-anna", 1);

        let response = app
            .oneshot(json_request(
                "PATCH",
                "/api/users/u-anna",
                &serde_json::json!({ "nickname": "ann" }),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn overlong_uid_returns_400() {
        let (app, _) = test_app(None);
        let uri = format!("/api/users/{}", "x".repeat(MAX_UID_LEN + 1));

        let response = app
            .oneshot(axum::http::Request::get(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn leaderboard_sorted_and_limited() {
        let (app, db) = test_app(None);
        seed(&db, "anna", 40);
        seed(&db, "ben", 300);
        seed(&db, "cleo", 5);

        let response = app
            .oneshot(
                axum::http::Request::get("/api/leaderboard?limit=2")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        let rows = json.as_array().unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0]["uid"], "ben");
        assert_eq!(rows[0]["profile"]["points"], 300);
        assert_eq!(rows[1]["uid"], "anna");
    }

    #[tokio::test]
    async fn leaderboard_rejects_bad_limit() {
        let (app, _) = test_app(None);

        for uri in ["/api/leaderboard?limit=0", "/api/leaderboard?limit=501"] {
            let response = app
                .clone()
                .oneshot(axum::http::Request::get(uri).body(Body::empty()).unwrap())
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        }
    }
}
