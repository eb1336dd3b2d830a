// Training, network, jobs and profile endpoints

use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::HeaderMap;
use serde::Deserialize;

use super::{ok, optional_session, require_session, ApiJson, ApiQuery, ApiResult, AppState};
use crate::db::Table;
use crate::entities::{
    Expert, Farmer, JobListing, NetworkEvent, NetworkPost, NewExpert, NewFarmer, NewJobListing,
    NewNetworkEvent, NewNetworkPost, NewTrainingResource, Profile, ProfileUpdate, TrainingFormat,
    TrainingResource,
};
use crate::error::AppError;
use crate::{network, profile, training};

// ============================================================================
// Training
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct TrainingQuery {
    category: Option<String>,
    format: Option<TrainingFormat>,
}

/// GET /api/training?category=&format=
pub async fn list_training(
    State(state): State<AppState>,
    headers: HeaderMap,
    ApiQuery(query): ApiQuery<TrainingQuery>,
) -> ApiResult<Vec<TrainingResource>> {
    let conn = state.conn()?;
    let session = optional_session(&conn, &headers)?;
    ok(training::list_resources(
        &conn,
        session.as_ref(),
        query.category.as_deref(),
        query.format,
    )?)
}

/// POST /api/training
pub async fn create_training(
    State(state): State<AppState>,
    headers: HeaderMap,
    ApiJson(input): ApiJson<NewTrainingResource>,
) -> ApiResult<TrainingResource> {
    let conn = state.conn()?;
    let session = require_session(&conn, &headers)?;
    ok(training::create_resource(&conn, &session, &input)?)
}

/// DELETE /api/training/:id
pub async fn delete_training(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> ApiResult<String> {
    let conn = state.conn()?;
    let session = require_session(&conn, &headers)?;
    training::delete_resource(&conn, &session, &id)?;
    ok(id)
}

// ============================================================================
// Network
// ============================================================================

/// GET /api/network/posts
pub async fn list_posts(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> ApiResult<Vec<NetworkPost>> {
    let conn = state.conn()?;
    let session = optional_session(&conn, &headers)?;
    ok(network::list_posts(&conn, session.as_ref())?)
}

/// POST /api/network/posts
pub async fn create_post(
    State(state): State<AppState>,
    headers: HeaderMap,
    ApiJson(input): ApiJson<NewNetworkPost>,
) -> ApiResult<NetworkPost> {
    let conn = state.conn()?;
    let session = require_session(&conn, &headers)?;
    ok(network::create_post(&conn, &session, &input)?)
}

/// GET /api/network/farmers
pub async fn list_farmers(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> ApiResult<Vec<Farmer>> {
    let conn = state.conn()?;
    let session = optional_session(&conn, &headers)?;
    ok(network::list_farmers(&conn, session.as_ref())?)
}

/// POST /api/network/farmers
pub async fn create_farmer(
    State(state): State<AppState>,
    headers: HeaderMap,
    ApiJson(input): ApiJson<NewFarmer>,
) -> ApiResult<Farmer> {
    let conn = state.conn()?;
    let session = require_session(&conn, &headers)?;
    ok(network::create_farmer(&conn, &session, &input)?)
}

/// GET /api/network/experts
pub async fn list_experts(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> ApiResult<Vec<Expert>> {
    let conn = state.conn()?;
    let session = optional_session(&conn, &headers)?;
    ok(network::list_experts(&conn, session.as_ref())?)
}

/// POST /api/network/experts
pub async fn create_expert(
    State(state): State<AppState>,
    headers: HeaderMap,
    ApiJson(input): ApiJson<NewExpert>,
) -> ApiResult<Expert> {
    let conn = state.conn()?;
    let session = require_session(&conn, &headers)?;
    ok(network::create_expert(&conn, &session, &input)?)
}

/// GET /api/network/events - Soonest first
pub async fn list_events(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> ApiResult<Vec<NetworkEvent>> {
    let conn = state.conn()?;
    let session = optional_session(&conn, &headers)?;
    ok(network::list_events(&conn, session.as_ref())?)
}

/// POST /api/network/events
pub async fn create_event(
    State(state): State<AppState>,
    headers: HeaderMap,
    ApiJson(input): ApiJson<NewNetworkEvent>,
) -> ApiResult<NetworkEvent> {
    let conn = state.conn()?;
    let session = require_session(&conn, &headers)?;
    ok(network::create_event(&conn, &session, &input)?)
}

fn network_table(kind: &str) -> Result<Table, AppError> {
    match kind {
        "posts" => Ok(Table::NetworkPosts),
        "farmers" => Ok(Table::NetworkFarmers),
        "experts" => Ok(Table::NetworkExperts),
        "events" => Ok(Table::NetworkEvents),
        other => Err(AppError::not_found("network section", other)),
    }
}

/// DELETE /api/network/:kind/:id
pub async fn delete_network_entry(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path((kind, id)): Path<(String, String)>,
) -> ApiResult<String> {
    let conn = state.conn()?;
    let session = require_session(&conn, &headers)?;
    network::delete_entry(&conn, &session, network_table(&kind)?, &id)?;
    ok(id)
}

// ============================================================================
// Jobs
// ============================================================================

/// GET /api/jobs
pub async fn list_jobs(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> ApiResult<Vec<JobListing>> {
    let conn = state.conn()?;
    let session = optional_session(&conn, &headers)?;
    ok(network::list_jobs(&conn, session.as_ref())?)
}

/// POST /api/jobs
pub async fn create_job(
    State(state): State<AppState>,
    headers: HeaderMap,
    ApiJson(input): ApiJson<NewJobListing>,
) -> ApiResult<JobListing> {
    let conn = state.conn()?;
    let session = require_session(&conn, &headers)?;
    ok(network::create_job(&conn, &session, &input)?)
}

/// DELETE /api/jobs/:id
pub async fn delete_job(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> ApiResult<String> {
    let conn = state.conn()?;
    let session = require_session(&conn, &headers)?;
    network::delete_entry(&conn, &session, Table::JobListings, &id)?;
    ok(id)
}

// ============================================================================
// Profiles
// ============================================================================

/// GET /api/profile - The caller's own profile
pub async fn own_profile(State(state): State<AppState>, headers: HeaderMap) -> ApiResult<Profile> {
    let conn = state.conn()?;
    let session = require_session(&conn, &headers)?;
    ok(profile::get_profile(&conn, Some(&session), &session.user_id)?)
}

/// PUT /api/profile
pub async fn save_profile(
    State(state): State<AppState>,
    headers: HeaderMap,
    ApiJson(update): ApiJson<ProfileUpdate>,
) -> ApiResult<Profile> {
    let conn = state.conn()?;
    let session = require_session(&conn, &headers)?;
    ok(profile::upsert_profile(&conn, &session, &update)?)
}

/// POST /api/profile/avatar/:file_name - Raw image bytes in the body
pub async fn upload_avatar(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(file_name): Path<String>,
    body: Bytes,
) -> ApiResult<Profile> {
    let conn = state.conn()?;
    let session = require_session(&conn, &headers)?;

    ok(profile::upload_avatar(&conn, &state.store, &session, &file_name, &body)?)
}

/// GET /api/profiles/:id - Any user's public profile
pub async fn get_profile(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> ApiResult<Profile> {
    let conn = state.conn()?;
    let session = optional_session(&conn, &headers)?;
    ok(profile::get_profile(&conn, session.as_ref(), &id)?)
}
