// Marketplace endpoints

use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::HeaderMap;

use super::{ok, optional_session, require_session, ApiJson, ApiQuery, ApiResult, AppState};
use crate::entities::{ListingFilter, MarketplaceListing, NewMarketplaceListing};
use crate::marketplace::{
    attach_image, create_listing, delete_listing, get_listing, list_listings, mark_sold,
};

/// GET /api/marketplace?category=&search=&sort=&include_sold=
pub async fn list(
    State(state): State<AppState>,
    headers: HeaderMap,
    ApiQuery(filter): ApiQuery<ListingFilter>,
) -> ApiResult<Vec<MarketplaceListing>> {
    let conn = state.conn()?;
    let session = optional_session(&conn, &headers)?;
    ok(list_listings(&conn, session.as_ref(), &filter)?)
}

/// POST /api/marketplace
pub async fn create(
    State(state): State<AppState>,
    headers: HeaderMap,
    ApiJson(input): ApiJson<NewMarketplaceListing>,
) -> ApiResult<MarketplaceListing> {
    let conn = state.conn()?;
    let session = require_session(&conn, &headers)?;
    ok(create_listing(&conn, &session, &input)?)
}

/// GET /api/marketplace/:id
pub async fn get_one(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> ApiResult<MarketplaceListing> {
    let conn = state.conn()?;
    let session = optional_session(&conn, &headers)?;
    ok(get_listing(&conn, session.as_ref(), &id)?)
}

/// POST /api/marketplace/:id/sold
pub async fn sold(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> ApiResult<MarketplaceListing> {
    let conn = state.conn()?;
    let session = require_session(&conn, &headers)?;
    ok(mark_sold(&conn, &session, &id)?)
}

/// POST /api/marketplace/:id/images/:file_name - Raw image bytes in the body
pub async fn upload_image(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path((id, file_name)): Path<(String, String)>,
    body: Bytes,
) -> ApiResult<MarketplaceListing> {
    let conn = state.conn()?;
    let session = require_session(&conn, &headers)?;

    // `Path` has already percent-decoded the segment
    ok(attach_image(&conn, &state.store, &session, &id, &file_name, &body)?)
}

/// DELETE /api/marketplace/:id - Removes the listing and its images
pub async fn remove(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> ApiResult<String> {
    let conn = state.conn()?;
    let session = require_session(&conn, &headers)?;
    delete_listing(&conn, &state.store, &session, &id)?;
    ok(id)
}
