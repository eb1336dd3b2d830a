// Financial services and farm ledger endpoints

use axum::extract::{Path, State};
use axum::http::HeaderMap;

use super::{ok, optional_session, require_session, ApiJson, ApiResult, AppState};
use crate::entities::{FinancialService, FinancialServiceInput, NewTransaction, Transaction};
use crate::financial::{self, LedgerSummary};

/// GET /api/financial-services
pub async fn list_services(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> ApiResult<Vec<FinancialService>> {
    let conn = state.conn()?;
    let session = optional_session(&conn, &headers)?;
    ok(financial::list_services(&conn, session.as_ref())?)
}

/// POST /api/financial-services
pub async fn create_service(
    State(state): State<AppState>,
    headers: HeaderMap,
    ApiJson(input): ApiJson<FinancialServiceInput>,
) -> ApiResult<FinancialService> {
    let conn = state.conn()?;
    let session = require_session(&conn, &headers)?;
    ok(financial::create_service(&conn, &session, &input)?)
}

/// GET /api/financial-services/:id
pub async fn get_service(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> ApiResult<FinancialService> {
    let conn = state.conn()?;
    let session = optional_session(&conn, &headers)?;
    ok(financial::get_service(&conn, session.as_ref(), &id)?)
}

/// PUT /api/financial-services/:id
pub async fn update_service(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
    ApiJson(input): ApiJson<FinancialServiceInput>,
) -> ApiResult<FinancialService> {
    let conn = state.conn()?;
    let session = require_session(&conn, &headers)?;
    ok(financial::update_service(&conn, &session, &id, &input)?)
}

/// DELETE /api/financial-services/:id
pub async fn delete_service(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> ApiResult<String> {
    let conn = state.conn()?;
    let session = require_session(&conn, &headers)?;
    financial::delete_service(&conn, &session, &id)?;
    ok(id)
}

/// GET /api/transactions - The caller's ledger
pub async fn list_transactions(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> ApiResult<Vec<Transaction>> {
    let conn = state.conn()?;
    let session = require_session(&conn, &headers)?;
    ok(financial::list_transactions(&conn, &session)?)
}

/// POST /api/transactions
pub async fn add_transaction(
    State(state): State<AppState>,
    headers: HeaderMap,
    ApiJson(input): ApiJson<NewTransaction>,
) -> ApiResult<Transaction> {
    let conn = state.conn()?;
    let session = require_session(&conn, &headers)?;
    ok(financial::add_transaction(&conn, &session, &input)?)
}

/// GET /api/transactions/summary - Income, expenses and per-category totals
pub async fn summary(State(state): State<AppState>, headers: HeaderMap) -> ApiResult<LedgerSummary> {
    let conn = state.conn()?;
    let session = require_session(&conn, &headers)?;
    let transactions = financial::list_transactions(&conn, &session)?;
    ok(financial::summarize(&transactions))
}

/// DELETE /api/transactions/:id
pub async fn delete_transaction(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> ApiResult<String> {
    let conn = state.conn()?;
    let session = require_session(&conn, &headers)?;
    financial::delete_transaction(&conn, &session, &id)?;
    ok(id)
}
