// Admin panel endpoints. The domain layer rejects non-admin sessions.

use axum::extract::{Path, State};
use axum::http::HeaderMap;
use serde::Deserialize;

use super::{ok, require_session, ApiJson, ApiResult, AppState};
use crate::admin::{self, Overview, UserSummary};
use crate::db::Event;
use crate::roles::Role;

#[derive(Debug, Deserialize)]
pub struct RoleChange {
    role: Role,
}

#[derive(Debug, Deserialize)]
pub struct AdminChange {
    admin: bool,
}

/// GET /api/admin/users
pub async fn users(State(state): State<AppState>, headers: HeaderMap) -> ApiResult<Vec<UserSummary>> {
    let conn = state.conn()?;
    let session = require_session(&conn, &headers)?;
    ok(admin::users(&conn, &session)?)
}

/// PUT /api/admin/users/:id/role
pub async fn set_role(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(user_id): Path<String>,
    ApiJson(change): ApiJson<RoleChange>,
) -> ApiResult<Role> {
    let conn = state.conn()?;
    let session = require_session(&conn, &headers)?;
    admin::assign_role(&conn, &session, &user_id, change.role)?;
    ok(change.role)
}

/// PUT /api/admin/users/:id/admin
pub async fn set_admin(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(user_id): Path<String>,
    ApiJson(change): ApiJson<AdminChange>,
) -> ApiResult<bool> {
    let conn = state.conn()?;
    let session = require_session(&conn, &headers)?;
    admin::set_admin(&conn, &session, &user_id, change.admin)?;
    ok(change.admin)
}

/// POST /api/admin/policies - Re-apply row-level policies
pub async fn apply_policies(State(state): State<AppState>, headers: HeaderMap) -> ApiResult<usize> {
    let conn = state.conn()?;
    let session = require_session(&conn, &headers)?;
    ok(admin::reapply_policies(&conn, &session)?)
}

/// GET /api/admin/overview - Dashboard counts
pub async fn overview(State(state): State<AppState>, headers: HeaderMap) -> ApiResult<Overview> {
    let conn = state.conn()?;
    let session = require_session(&conn, &headers)?;
    ok(admin::overview(&conn, &session)?)
}

/// GET /api/admin/events/:entity_type/:entity_id - Audit trail, newest first
pub async fn events(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path((entity_type, entity_id)): Path<(String, String)>,
) -> ApiResult<Vec<Event>> {
    let conn = state.conn()?;
    let session = require_session(&conn, &headers)?;
    ok(admin::audit_trail(&conn, &session, &entity_type, &entity_id)?)
}
