// Loan application endpoints

use axum::extract::{Path, State};
use axum::http::HeaderMap;
use axum::response::Json;
use serde::Deserialize;

use super::{ok, require_session, ApiJson, ApiQuery, ApiResponse, ApiResult, AppState};
use crate::entities::{LoanApplication, LoanStatus, NewLoanApplication};
use crate::workflow::{
    bulk_update_status, create_application, get_application, list_applications, review_stats,
    update_application_status, ApplicationStats, BulkOutcome,
};

#[derive(Debug, Deserialize)]
pub struct StatusQuery {
    status: Option<LoanStatus>,
}

#[derive(Debug, Deserialize)]
pub struct StatusChange {
    status: LoanStatus,
    #[serde(default)]
    feedback: Option<String>,
}

/// GET /api/loan-applications?status= - Own rows, or every row for reviewers
pub async fn list(
    State(state): State<AppState>,
    headers: HeaderMap,
    ApiQuery(query): ApiQuery<StatusQuery>,
) -> ApiResult<Vec<LoanApplication>> {
    let conn = state.conn()?;
    let session = require_session(&conn, &headers)?;
    ok(list_applications(&conn, &session, query.status)?)
}

/// POST /api/loan-applications - Submit a new application
pub async fn create(
    State(state): State<AppState>,
    headers: HeaderMap,
    ApiJson(input): ApiJson<NewLoanApplication>,
) -> ApiResult<LoanApplication> {
    let conn = state.conn()?;
    let session = require_session(&conn, &headers)?;
    ok(create_application(&conn, &session, &input)?)
}

/// GET /api/loan-applications/:id
pub async fn get_one(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> ApiResult<LoanApplication> {
    let conn = state.conn()?;
    let session = require_session(&conn, &headers)?;
    ok(get_application(&conn, &session, &id)?)
}

/// PUT /api/loan-applications/:id/status - Reviewer decision
pub async fn set_status(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
    ApiJson(change): ApiJson<StatusChange>,
) -> ApiResult<LoanApplication> {
    let conn = state.conn()?;
    let session = require_session(&conn, &headers)?;
    ok(update_application_status(
        &conn,
        &session,
        state.transitions,
        &id,
        change.status,
        change.feedback.as_deref(),
    )?)
}

/// POST /api/loan-applications/bulk-status - Move every pending application
pub async fn bulk_status(
    State(state): State<AppState>,
    headers: HeaderMap,
    ApiJson(change): ApiJson<StatusChange>,
) -> ApiResult<BulkOutcome> {
    let conn = state.conn()?;
    let session = require_session(&conn, &headers)?;
    let outcome = bulk_update_status(
        &conn,
        &session,
        state.transitions,
        change.status,
        change.feedback.as_deref(),
    )?;

    if outcome.is_complete() {
        return ok(outcome);
    }

    let total = outcome.updated.len() + outcome.failed.len();
    let error = format!("{} of {} updates failed", outcome.failed.len(), total);
    Ok(Json(ApiResponse {
        success: false,
        data: outcome,
        error: Some(error),
    }))
}

/// GET /api/loan-applications/stats - Counts per status for the review panel
pub async fn stats(State(state): State<AppState>, headers: HeaderMap) -> ApiResult<ApplicationStats> {
    let conn = state.conn()?;
    let session = require_session(&conn, &headers)?;
    ok(review_stats(&conn, &session)?)
}
