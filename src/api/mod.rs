// 22POULTRY - REST API
// JSON endpoints under /api with bearer-token sessions, plus read-only bucket serving.
//
// Every handler locks the shared connection, resolves the session from the
// Authorization header and calls one domain operation. Authorization lives in
// the domain layer; handlers never inspect roles themselves.

mod admin;
mod community;
mod error;
mod extract;
mod finance;
mod loans;
mod marketplace;

use axum::extract::{DefaultBodyLimit, State};
use axum::http::{header, HeaderMap};
use axum::response::{IntoResponse, Json};
use axum::routing::{delete, get, post, put};
use axum::Router;
use rusqlite::Connection;
use serde::Serialize;
use std::sync::{Arc, Mutex, MutexGuard};
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

use crate::error::{AppError, AppResult};
use crate::session::{authenticate, revoke_token, Session};
use crate::storage::{BucketStore, PUBLIC_PREFIX};
use crate::workflow::TransitionPolicy;

use extract::{ApiJson, ApiQuery};

/// Uploads are checked against bucket limits in the domain; this only caps the transport.
const MAX_BODY_BYTES: usize = 6 * 1024 * 1024;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    db: Arc<Mutex<Connection>>,
    store: BucketStore,
    transitions: TransitionPolicy,
}

impl AppState {
    pub fn new(conn: Connection, store: BucketStore, transitions: TransitionPolicy) -> Self {
        Self {
            db: Arc::new(Mutex::new(conn)),
            store,
            transitions,
        }
    }

    fn conn(&self) -> AppResult<MutexGuard<'_, Connection>> {
        self.db.lock().map_err(|_| AppError::Poisoned)
    }
}

/// API Response wrapper
#[derive(Serialize)]
pub struct ApiResponse<T> {
    success: bool,
    data: T,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl<T> ApiResponse<T> {
    fn ok(data: T) -> Self {
        Self {
            success: true,
            data,
            error: None,
        }
    }
}

impl ApiResponse<()> {
    fn failed(message: String) -> Self {
        Self {
            success: false,
            data: (),
            error: Some(message),
        }
    }
}

type ApiResult<T> = Result<Json<ApiResponse<T>>, AppError>;

fn ok<T>(data: T) -> ApiResult<T> {
    Ok(Json(ApiResponse::ok(data)))
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(str::trim)
}

/// Session for a request that may be anonymous. A token that does not resolve is rejected.
fn optional_session(conn: &Connection, headers: &HeaderMap) -> AppResult<Option<Session>> {
    match bearer_token(headers) {
        Some(token) => authenticate(conn, token)?
            .map(Some)
            .ok_or(AppError::Unauthenticated),
        None => Ok(None),
    }
}

fn require_session(conn: &Connection, headers: &HeaderMap) -> AppResult<Session> {
    optional_session(conn, headers)?.ok_or(AppError::Unauthenticated)
}

// ============================================================================
// Session Handlers
// ============================================================================

/// GET /api/health - Health check
async fn health_check() -> impl IntoResponse {
    Json(ApiResponse::ok("OK"))
}

/// GET /api/me - The resolved session for the bearer token
async fn me(State(state): State<AppState>, headers: HeaderMap) -> ApiResult<Session> {
    let conn = state.conn()?;
    ok(require_session(&conn, &headers)?)
}

/// POST /api/auth/logout - Revoke the bearer token
async fn logout(State(state): State<AppState>, headers: HeaderMap) -> ApiResult<bool> {
    let conn = state.conn()?;
    let token = bearer_token(&headers).ok_or(AppError::Unauthenticated)?;
    ok(revoke_token(&conn, token)?)
}

// ============================================================================
// Router
// ============================================================================

pub fn router(state: AppState) -> Router {
    let storage = ServeDir::new(state.store.root());

    let api_routes = Router::new()
        .route("/health", get(health_check))
        .route("/me", get(me))
        .route("/auth/logout", post(logout))
        // Loan applications
        .route(
            "/loan-applications",
            get(loans::list).post(loans::create),
        )
        .route("/loan-applications/stats", get(loans::stats))
        .route("/loan-applications/bulk-status", post(loans::bulk_status))
        .route("/loan-applications/:id", get(loans::get_one))
        .route("/loan-applications/:id/status", put(loans::set_status))
        // Financial services and farm ledger
        .route(
            "/financial-services",
            get(finance::list_services).post(finance::create_service),
        )
        .route(
            "/financial-services/:id",
            get(finance::get_service)
                .put(finance::update_service)
                .delete(finance::delete_service),
        )
        .route(
            "/transactions",
            get(finance::list_transactions).post(finance::add_transaction),
        )
        .route("/transactions/summary", get(finance::summary))
        .route("/transactions/:id", delete(finance::delete_transaction))
        // Marketplace
        .route(
            "/marketplace",
            get(marketplace::list).post(marketplace::create),
        )
        .route(
            "/marketplace/:id",
            get(marketplace::get_one).delete(marketplace::remove),
        )
        .route("/marketplace/:id/sold", post(marketplace::sold))
        .route("/marketplace/:id/images/:file_name", post(marketplace::upload_image))
        // Training, network, jobs, profiles
        .route(
            "/training",
            get(community::list_training).post(community::create_training),
        )
        .route("/training/:id", delete(community::delete_training))
        .route(
            "/network/posts",
            get(community::list_posts).post(community::create_post),
        )
        .route(
            "/network/farmers",
            get(community::list_farmers).post(community::create_farmer),
        )
        .route(
            "/network/experts",
            get(community::list_experts).post(community::create_expert),
        )
        .route(
            "/network/events",
            get(community::list_events).post(community::create_event),
        )
        .route("/network/:kind/:id", delete(community::delete_network_entry))
        .route("/jobs", get(community::list_jobs).post(community::create_job))
        .route("/jobs/:id", delete(community::delete_job))
        .route(
            "/profile",
            get(community::own_profile).put(community::save_profile),
        )
        .route("/profile/avatar/:file_name", post(community::upload_avatar))
        .route("/profiles/:id", get(community::get_profile))
        // Admin panel
        .route("/admin/users", get(admin::users))
        .route("/admin/users/:id/role", put(admin::set_role))
        .route("/admin/users/:id/admin", put(admin::set_admin))
        .route("/admin/policies", post(admin::apply_policies))
        .route("/admin/overview", get(admin::overview))
        .route("/admin/events/:entity_type/:entity_id", get(admin::events))
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .with_state(state);

    Router::new()
        .nest("/api", api_routes)
        .nest_service(PUBLIC_PREFIX, storage)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::setup_database;
    use crate::policy::apply_policies;
    use crate::roles::Role;
    use crate::session::{create_user, issue_token};
    use axum::body::{to_bytes, Body};
    use axum::http::{Method, Request, StatusCode};
    use serde_json::{json, Value};
    use tower::ServiceExt;

    struct Harness {
        app: Router,
        state: AppState,
        _dir: tempfile::TempDir,
    }

    fn harness() -> Harness {
        let conn = Connection::open_in_memory().unwrap();
        setup_database(&conn).unwrap();
        apply_policies(&conn).unwrap();

        let dir = tempfile::tempdir().unwrap();
        let state = AppState::new(
            conn,
            BucketStore::new(dir.path()),
            TransitionPolicy::Permissive,
        );
        Harness {
            app: router(state.clone()),
            state,
            _dir: dir,
        }
    }

    impl Harness {
        fn token_for(&self, name: &str, role: Role) -> String {
            let conn = self.state.conn().unwrap();
            let user = create_user(&conn, &format!("{}@example.in", name), role).unwrap();
            issue_token(&conn, &user.id).unwrap()
        }

        async fn call(
            &self,
            method: Method,
            uri: &str,
            token: Option<&str>,
            body: Option<Value>,
        ) -> (StatusCode, Value) {
            let mut builder = Request::builder().method(method).uri(uri);
            if let Some(token) = token {
                builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
            }
            let request = match body {
                Some(body) => builder
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(body.to_string()))
                    .unwrap(),
                None => builder.body(Body::empty()).unwrap(),
            };

            let response = self.app.clone().oneshot(request).await.unwrap();
            let status = response.status();
            let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
            let json = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
            (status, json)
        }

        async fn upload(&self, uri: &str, token: &str, bytes: Vec<u8>) -> (StatusCode, Value) {
            let request = Request::builder()
                .method(Method::POST)
                .uri(uri)
                .header(header::AUTHORIZATION, format!("Bearer {}", token))
                .header(header::CONTENT_TYPE, "application/octet-stream")
                .body(Body::from(bytes))
                .unwrap();
            let response = self.app.clone().oneshot(request).await.unwrap();
            let status = response.status();
            let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
            (status, serde_json::from_slice(&bytes).unwrap_or(Value::Null))
        }
    }

    fn application_body() -> Value {
        json!({
            "amount": 50000.0,
            "purpose": "Equipment",
            "farm_type": "Broiler Farm",
            "farm_size": "Small (< 5,000 birds)"
        })
    }

    #[tokio::test]
    async fn test_health() {
        let h = harness();
        let (status, body) = h.call(Method::GET, "/api/health", None, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"], "OK");
    }

    #[tokio::test]
    async fn test_me_requires_a_valid_token() {
        let h = harness();
        let token = h.token_for("farmer", Role::Farmer);

        let (status, body) = h.call(Method::GET, "/api/me", None, None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["success"], false);

        let (status, _) = h.call(Method::GET, "/api/me", Some("bogus"), None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let (status, body) = h.call(Method::GET, "/api/me", Some(&token), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["role"], "farmer");
        assert_eq!(body["data"]["capabilities"]["can_sell"], true);
    }

    #[tokio::test]
    async fn test_submit_and_review_application() {
        let h = harness();
        let farmer = h.token_for("farmer", Role::Farmer);
        let provider = h.token_for("bank", Role::FinancialProvider);

        let (status, body) = h
            .call(Method::POST, "/api/loan-applications", Some(&farmer), Some(application_body()))
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["status"], "pending");
        let id = body["data"]["id"].as_str().unwrap().to_string();

        // Applicants cannot review; the row looks missing to them.
        let uri = format!("/api/loan-applications/{}/status", id);
        let (status, _) = h
            .call(Method::PUT, &uri, Some(&farmer), Some(json!({ "status": "approved" })))
            .await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, body) = h
            .call(
                Method::PUT,
                &uri,
                Some(&provider),
                Some(json!({ "status": "approved", "feedback": "Documents verified" })),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["status"], "approved");
        assert_eq!(body["data"]["feedback"], "Documents verified");
        assert_eq!(body["data"]["purpose"], "Equipment");

        let (_, body) = h
            .call(Method::GET, "/api/loan-applications", Some(&farmer), None)
            .await;
        assert_eq!(body["data"].as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_anonymous_submit_is_rejected() {
        let h = harness();
        let (status, _) = h
            .call(Method::POST, "/api/loan-applications", None, Some(application_body()))
            .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let conn = h.state.conn().unwrap();
        assert_eq!(
            crate::db::count_rows(&conn, crate::db::Table::LoanApplications).unwrap(),
            0
        );
    }

    #[tokio::test]
    async fn test_bulk_status_reports_outcome() {
        let h = harness();
        let farmer = h.token_for("farmer", Role::Farmer);
        let admin = h.token_for("admin", Role::Admin);
        for _ in 0..3 {
            h.call(Method::POST, "/api/loan-applications", Some(&farmer), Some(application_body()))
                .await;
        }

        let (status, _) = h
            .call(
                Method::POST,
                "/api/loan-applications/bulk-status",
                Some(&farmer),
                Some(json!({ "status": "approved" })),
            )
            .await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, body) = h
            .call(
                Method::POST,
                "/api/loan-applications/bulk-status",
                Some(&admin),
                Some(json!({ "status": "approved" })),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], true);
        assert_eq!(body["data"]["updated"].as_array().unwrap().len(), 3);

        let (_, body) = h
            .call(Method::GET, "/api/loan-applications/stats", Some(&admin), None)
            .await;
        assert_eq!(body["data"]["approved"], 3);
    }

    #[tokio::test]
    async fn test_bulk_status_partial_failure_over_http() {
        let h = harness();
        let farmer = h.token_for("farmer", Role::Farmer);
        let admin = h.token_for("admin", Role::Admin);
        let mut ids = Vec::new();
        for _ in 0..3 {
            let (_, body) = h
                .call(Method::POST, "/api/loan-applications", Some(&farmer), Some(application_body()))
                .await;
            ids.push(body["data"]["id"].as_str().unwrap().to_string());
        }

        {
            let conn = h.state.conn().unwrap();
            conn.execute_batch(&format!(
                "CREATE TRIGGER refuse_one BEFORE UPDATE ON loan_applications
                 WHEN OLD.id = '{}'
                 BEGIN SELECT RAISE(ABORT, 'write refused'); END;",
                ids[1]
            ))
            .unwrap();
        }

        let (status, body) = h
            .call(
                Method::POST,
                "/api/loan-applications/bulk-status",
                Some(&admin),
                Some(json!({ "status": "approved" })),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], false);
        assert_eq!(body["data"]["updated"].as_array().unwrap().len(), 2);
        let failed = body["data"]["failed"].as_array().unwrap();
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0]["id"], ids[1].as_str());
        assert!(body["error"].as_str().unwrap().contains("1 of 3"));

        let (_, body) = h
            .call(Method::GET, "/api/loan-applications/stats", Some(&admin), None)
            .await;
        assert_eq!(body["data"]["approved"], 2);
        assert_eq!(body["data"]["pending"], 1);
    }

    #[tokio::test]
    async fn test_rejected_bodies_use_the_response_envelope() {
        let h = harness();
        let farmer = h.token_for("farmer", Role::Farmer);
        let provider = h.token_for("bank", Role::FinancialProvider);

        let (_, body) = h
            .call(Method::POST, "/api/loan-applications", Some(&farmer), Some(application_body()))
            .await;
        let uri = format!(
            "/api/loan-applications/{}/status",
            body["data"]["id"].as_str().unwrap()
        );

        let (status, body) = h
            .call(Method::PUT, &uri, Some(&provider), Some(json!({ "status": "archived" })))
            .await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body["success"], false);
        assert!(body["error"].as_str().unwrap().starts_with("Invalid body"));

        let request = Request::builder()
            .method(Method::POST)
            .uri("/api/loan-applications")
            .header(header::AUTHORIZATION, format!("Bearer {}", farmer))
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from("{\"amount\": "))
            .unwrap();
        let response = h.app.clone().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["success"], false);

        let (status, body) = h
            .call(Method::GET, "/api/loan-applications?status=archived", Some(&provider), None)
            .await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body["success"], false);
    }

    #[tokio::test]
    async fn test_upload_file_name_is_decoded_once() {
        let h = harness();
        let seller = h.token_for("seller", Role::Seller);
        let (_, body) = h
            .call(
                Method::POST,
                "/api/marketplace",
                Some(&seller),
                Some(json!({
                    "title": "Layer feed",
                    "description": "50 kg bags",
                    "category": "Feed",
                    "price": 1800.0,
                    "quantity": 40,
                    "unit": "bag",
                    "location": "Namakkal"
                })),
            )
            .await;
        let id = body["data"]["id"].as_str().unwrap().to_string();

        // One decode leaves "photo%2Epng", which has no image extension.
        let uri = format!("/api/marketplace/{}/images/photo%252Epng", id);
        let (status, body) = h.upload(&uri, &seller, b"png-bytes".to_vec()).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert!(body["error"].as_str().unwrap().contains("photo%2Epng"));

        let (status, _) = h
            .call(Method::PUT, "/api/profile", Some(&seller), Some(json!({ "full_name": "Meena" })))
            .await;
        assert_eq!(status, StatusCode::OK);

        let (status, _) = h
            .upload("/api/profile/avatar/face%252Ejpg", &seller, b"jpeg-bytes".to_vec())
            .await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

        let (status, _) = h
            .upload("/api/profile/avatar/face%20front.jpg", &seller, b"jpeg-bytes".to_vec())
            .await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_marketplace_is_public_and_upload_limit_applies() {
        let h = harness();
        let seller = h.token_for("seller", Role::Seller);

        let (status, body) = h
            .call(
                Method::POST,
                "/api/marketplace",
                Some(&seller),
                Some(json!({
                    "title": "Kadaknath chicks",
                    "description": "Two weeks old",
                    "category": "Birds",
                    "price": 120.0,
                    "quantity": 200,
                    "unit": "chick",
                    "location": "Jhabua"
                })),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        let id = body["data"]["id"].as_str().unwrap().to_string();

        let (status, body) = h
            .call(Method::GET, "/api/marketplace?category=birds", None, None)
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"].as_array().unwrap().len(), 1);

        let uri = format!("/api/marketplace/{}/images/chicks%20one.jpg", id);
        let (status, body) = h.upload(&uri, &seller, b"jpeg-bytes".to_vec()).await;
        assert_eq!(status, StatusCode::OK);
        let url = body["data"]["image_urls"][0].as_str().unwrap().to_string();
        assert!(url.starts_with("/storage/marketplace/"));

        let (status, _) = h
            .upload(&uri, &seller, vec![0u8; 5 * 1024 * 1024 + 1])
            .await;
        assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);

        let (status, _) = h.call(Method::GET, &url, None, None).await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_non_owner_delete_leaves_service() {
        let h = harness();
        let provider = h.token_for("bank", Role::FinancialProvider);
        let other = h.token_for("other", Role::FinancialProvider);

        let (status, body) = h
            .call(
                Method::POST,
                "/api/financial-services",
                Some(&provider),
                Some(json!({
                    "title": "Poultry shed loan",
                    "description": "For new sheds",
                    "category": "loan",
                    "provider_name": "Grameen Bank",
                    "interest_rate": 9.5,
                    "max_amount": 500000.0
                })),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        let uri = format!("/api/financial-services/{}", body["data"]["id"].as_str().unwrap());

        let (status, _) = h.call(Method::DELETE, &uri, Some(&other), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, _) = h.call(Method::GET, &uri, Some(&provider), None).await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_admin_routes_need_admin() {
        let h = harness();
        let farmer = h.token_for("farmer", Role::Farmer);
        let admin = h.token_for("admin", Role::Admin);

        let (status, _) = h.call(Method::GET, "/api/admin/users", Some(&farmer), None).await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, body) = h.call(Method::GET, "/api/admin/users", Some(&admin), None).await;
        assert_eq!(status, StatusCode::OK);
        let farmer_id = body["data"]
            .as_array()
            .unwrap()
            .iter()
            .find(|u| u["email"] == "farmer@example.in")
            .unwrap()["id"]
            .as_str()
            .unwrap()
            .to_string();

        let uri = format!("/api/admin/users/{}/role", farmer_id);
        let (status, _) = h
            .call(Method::PUT, &uri, Some(&admin), Some(json!({ "role": "trainer" })))
            .await;
        assert_eq!(status, StatusCode::OK);

        let (_, body) = h.call(Method::GET, "/api/me", Some(&farmer), None).await;
        assert_eq!(body["data"]["role"], "trainer");
    }

    #[tokio::test]
    async fn test_logout_revokes_token() {
        let h = harness();
        let token = h.token_for("farmer", Role::Farmer);

        let (status, _) = h.call(Method::POST, "/api/auth/logout", Some(&token), None).await;
        assert_eq!(status, StatusCode::OK);

        let (status, _) = h.call(Method::GET, "/api/me", Some(&token), None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }
}
