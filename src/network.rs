// Network & Jobs
// Community posts, farmer/expert directories, events and job listings.
// Parallel CRUD over five tables: create, list (newest first), delete by owner.

use rusqlite::{params, Connection, Row, ToSql};

use crate::db::{
    date_at, delete_row, json_at, new_id, now_rfc3339, timestamp_at, to_json_text, Table,
};
use crate::entities::{
    Expert, Farmer, JobListing, NetworkEvent, NetworkPost, NewExpert, NewFarmer, NewJobListing,
    NewNetworkEvent, NewNetworkPost,
};
use crate::error::{AppError, AppResult};
use crate::policy::PolicySet;
use crate::session::Session;

// ============================================================================
// SHARED PLUMBING
// ============================================================================

/// Run `select` against the rows of `table` visible to the caller, newest first
fn list_visible<T, F>(
    conn: &Connection,
    table: Table,
    session: Option<&Session>,
    select: &str,
    map: F,
) -> AppResult<Vec<T>>
where
    F: FnMut(&Row<'_>) -> rusqlite::Result<T>,
{
    let policies = PolicySet::load(conn)?;
    let scope = policies.read_scope(table, session);
    let Some(owner) = scope.owner_filter() else {
        return Ok(Vec::new());
    };

    let sql = format!(
        "{} FROM {} WHERE (?1 IS NULL OR user_id = ?1) ORDER BY created_at DESC",
        select,
        table.as_str()
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(params![owner], map)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

fn fetch_one<T, F>(conn: &Connection, table: Table, select: &str, id: &str, map: F) -> AppResult<T>
where
    F: FnOnce(&Row<'_>) -> rusqlite::Result<T>,
{
    let sql = format!("{} FROM {} WHERE id = ?1", select, table.as_str());
    Ok(conn.query_row(&sql, params![id], map)?)
}

fn insert(conn: &Connection, table: Table, columns: &[&str], values: &[&dyn ToSql]) -> AppResult<()> {
    let placeholders: Vec<String> = (1..=columns.len()).map(|i| format!("?{}", i)).collect();
    let sql = format!(
        "INSERT INTO {} ({}) VALUES ({})",
        table.as_str(),
        columns.join(", "),
        placeholders.join(", ")
    );
    conn.execute(&sql, values)?;
    Ok(())
}

/// Owner-scoped delete shared by every network table
pub fn delete_entry(conn: &Connection, session: &Session, table: Table, id: &str) -> AppResult<()> {
    let policies = PolicySet::load(conn)?;
    let removed = delete_row(conn, table, id, policies.write_owner_filter(session))?;
    if removed == 0 {
        return Err(AppError::not_found(table.entity_name(), id));
    }
    tracing::debug!(table = %table, id, "network entry deleted");
    Ok(())
}

// ============================================================================
// POSTS
// ============================================================================

const POST_SELECT: &str = "SELECT id, user_id, content, created_at";

fn map_post(row: &Row<'_>) -> rusqlite::Result<NetworkPost> {
    Ok(NetworkPost {
        id: row.get(0)?,
        user_id: row.get(1)?,
        content: row.get(2)?,
        created_at: timestamp_at(row, 3)?,
    })
}

pub fn create_post(conn: &Connection, session: &Session, input: &NewNetworkPost) -> AppResult<NetworkPost> {
    input.validate()?;
    let id = new_id();
    insert(
        conn,
        Table::NetworkPosts,
        &["id", "user_id", "content", "created_at"],
        &[&id, &session.user_id, &input.content.trim(), &now_rfc3339()],
    )?;
    fetch_one(conn, Table::NetworkPosts, POST_SELECT, &id, map_post)
}

pub fn list_posts(conn: &Connection, session: Option<&Session>) -> AppResult<Vec<NetworkPost>> {
    list_visible(conn, Table::NetworkPosts, session, POST_SELECT, map_post)
}

// ============================================================================
// FARMERS
// ============================================================================

const FARMER_SELECT: &str =
    "SELECT id, user_id, name, location, farm_type, farm_size, specialization, created_at";

fn map_farmer(row: &Row<'_>) -> rusqlite::Result<Farmer> {
    Ok(Farmer {
        id: row.get(0)?,
        user_id: row.get(1)?,
        name: row.get(2)?,
        location: row.get(3)?,
        farm_type: row.get(4)?,
        farm_size: row.get(5)?,
        specialization: row.get(6)?,
        created_at: timestamp_at(row, 7)?,
    })
}

pub fn create_farmer(conn: &Connection, session: &Session, input: &NewFarmer) -> AppResult<Farmer> {
    input.validate()?;
    let id = new_id();
    insert(
        conn,
        Table::NetworkFarmers,
        &[
            "id", "user_id", "name", "location", "farm_type", "farm_size", "specialization",
            "created_at",
        ],
        &[
            &id,
            &session.user_id,
            &input.name.trim(),
            &input.location,
            &input.farm_type,
            &input.farm_size,
            &input.specialization,
            &now_rfc3339(),
        ],
    )?;
    fetch_one(conn, Table::NetworkFarmers, FARMER_SELECT, &id, map_farmer)
}

pub fn list_farmers(conn: &Connection, session: Option<&Session>) -> AppResult<Vec<Farmer>> {
    list_visible(conn, Table::NetworkFarmers, session, FARMER_SELECT, map_farmer)
}

// ============================================================================
// EXPERTS
// ============================================================================

const EXPERT_SELECT: &str =
    "SELECT id, user_id, name, expertise, experience_years, location, contact, created_at";

fn map_expert(row: &Row<'_>) -> rusqlite::Result<Expert> {
    Ok(Expert {
        id: row.get(0)?,
        user_id: row.get(1)?,
        name: row.get(2)?,
        expertise: row.get(3)?,
        experience_years: row.get(4)?,
        location: row.get(5)?,
        contact: row.get(6)?,
        created_at: timestamp_at(row, 7)?,
    })
}

pub fn create_expert(conn: &Connection, session: &Session, input: &NewExpert) -> AppResult<Expert> {
    input.validate()?;
    let id = new_id();
    insert(
        conn,
        Table::NetworkExperts,
        &[
            "id", "user_id", "name", "expertise", "experience_years", "location", "contact",
            "created_at",
        ],
        &[
            &id,
            &session.user_id,
            &input.name.trim(),
            &input.expertise,
            &input.experience_years,
            &input.location,
            &input.contact,
            &now_rfc3339(),
        ],
    )?;
    fetch_one(conn, Table::NetworkExperts, EXPERT_SELECT, &id, map_expert)
}

pub fn list_experts(conn: &Connection, session: Option<&Session>) -> AppResult<Vec<Expert>> {
    list_visible(conn, Table::NetworkExperts, session, EXPERT_SELECT, map_expert)
}

// ============================================================================
// EVENTS
// ============================================================================

const EVENT_SELECT: &str =
    "SELECT id, user_id, title, description, event_date, location, organizer, created_at";

fn map_event(row: &Row<'_>) -> rusqlite::Result<NetworkEvent> {
    Ok(NetworkEvent {
        id: row.get(0)?,
        user_id: row.get(1)?,
        title: row.get(2)?,
        description: row.get(3)?,
        event_date: date_at(row, 4)?,
        location: row.get(5)?,
        organizer: row.get(6)?,
        created_at: timestamp_at(row, 7)?,
    })
}

pub fn create_event(
    conn: &Connection,
    session: &Session,
    input: &NewNetworkEvent,
) -> AppResult<NetworkEvent> {
    input.validate()?;
    let id = new_id();
    insert(
        conn,
        Table::NetworkEvents,
        &[
            "id", "user_id", "title", "description", "event_date", "location", "organizer",
            "created_at",
        ],
        &[
            &id,
            &session.user_id,
            &input.title.trim(),
            &input.description,
            &input.event_date.format("%Y-%m-%d").to_string(),
            &input.location,
            &input.organizer,
            &now_rfc3339(),
        ],
    )?;
    fetch_one(conn, Table::NetworkEvents, EVENT_SELECT, &id, map_event)
}

/// Events sorted by date, soonest first
pub fn list_events(conn: &Connection, session: Option<&Session>) -> AppResult<Vec<NetworkEvent>> {
    let mut events = list_visible(conn, Table::NetworkEvents, session, EVENT_SELECT, map_event)?;
    events.sort_by_key(|e| e.event_date);
    Ok(events)
}

// ============================================================================
// JOBS
// ============================================================================

const JOB_SELECT: &str = "SELECT id, user_id, title, company, location, job_type, salary_range,
        description, requirements, contact_email, created_at";

fn map_job(row: &Row<'_>) -> rusqlite::Result<JobListing> {
    Ok(JobListing {
        id: row.get(0)?,
        user_id: row.get(1)?,
        title: row.get(2)?,
        company: row.get(3)?,
        location: row.get(4)?,
        job_type: row.get(5)?,
        salary_range: row.get(6)?,
        description: row.get(7)?,
        requirements: json_at(row, 8)?,
        contact_email: row.get(9)?,
        created_at: timestamp_at(row, 10)?,
    })
}

pub fn create_job(conn: &Connection, session: &Session, input: &NewJobListing) -> AppResult<JobListing> {
    input.validate()?;
    let id = new_id();
    let requirements = to_json_text(&input.requirements)?;
    insert(
        conn,
        Table::JobListings,
        &[
            "id", "user_id", "title", "company", "location", "job_type", "salary_range",
            "description", "requirements", "contact_email", "created_at",
        ],
        &[
            &id,
            &session.user_id,
            &input.title.trim(),
            &input.company,
            &input.location,
            &input.job_type,
            &input.salary_range,
            &input.description,
            &requirements,
            &input.contact_email,
            &now_rfc3339(),
        ],
    )?;
    fetch_one(conn, Table::JobListings, JOB_SELECT, &id, map_job)
}

pub fn list_jobs(conn: &Connection, session: Option<&Session>) -> AppResult<Vec<JobListing>> {
    list_visible(conn, Table::JobListings, session, JOB_SELECT, map_job)
}
