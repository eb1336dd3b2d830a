use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, Row};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::str::FromStr;

use crate::error::AppError;

// ============================================================================
// TABLES
// ============================================================================

/// Every table that holds user-owned rows
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Table {
    Profiles,
    FinancialServices,
    LoanApplications,
    FarmTransactions,
    MarketplaceListings,
    JobListings,
    NetworkPosts,
    NetworkFarmers,
    NetworkExperts,
    NetworkEvents,
    TrainingResources,
}

impl Table {
    pub const ALL: [Table; 11] = [
        Table::Profiles,
        Table::FinancialServices,
        Table::LoanApplications,
        Table::FarmTransactions,
        Table::MarketplaceListings,
        Table::JobListings,
        Table::NetworkPosts,
        Table::NetworkFarmers,
        Table::NetworkExperts,
        Table::NetworkEvents,
        Table::TrainingResources,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Table::Profiles => "profiles",
            Table::FinancialServices => "financial_services",
            Table::LoanApplications => "loan_applications",
            Table::FarmTransactions => "farm_transactions",
            Table::MarketplaceListings => "marketplace_listings",
            Table::JobListings => "job_listings",
            Table::NetworkPosts => "network_posts",
            Table::NetworkFarmers => "network_farmers",
            Table::NetworkExperts => "network_experts",
            Table::NetworkEvents => "network_events",
            Table::TrainingResources => "training_resources",
        }
    }

    /// Column naming the owning user
    pub fn owner_column(&self) -> &'static str {
        match self {
            Table::Profiles => "id",
            _ => "user_id",
        }
    }

    /// Human name used in error messages
    pub fn entity_name(&self) -> &'static str {
        match self {
            Table::Profiles => "profile",
            Table::FinancialServices => "financial service",
            Table::LoanApplications => "loan application",
            Table::FarmTransactions => "transaction",
            Table::MarketplaceListings => "marketplace listing",
            Table::JobListings => "job listing",
            Table::NetworkPosts => "post",
            Table::NetworkFarmers => "farmer",
            Table::NetworkExperts => "expert",
            Table::NetworkEvents => "event",
            Table::TrainingResources => "training resource",
        }
    }
}

impl fmt::Display for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Table {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Table::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| AppError::validation("table", format!("unknown table '{}'", s)))
    }
}

// ============================================================================
// AUDIT EVENTS
// ============================================================================

/// Event for audit trail: every workflow transition and deletion is recorded
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Event {
    pub event_id: String,
    pub timestamp: DateTime<Utc>,
    pub event_type: String,
    pub entity_type: String,
    pub entity_id: String,
    pub data: serde_json::Value,
    pub actor: String,
}

impl Event {
    pub fn new(
        event_type: &str,
        entity_type: &str,
        entity_id: &str,
        data: serde_json::Value,
        actor: &str,
    ) -> Self {
        Self {
            event_id: uuid::Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            event_type: event_type.to_string(),
            entity_type: entity_type.to_string(),
            entity_id: entity_id.to_string(),
            data,
            actor: actor.to_string(),
        }
    }
}

/// Insert event into audit trail
pub fn insert_event(conn: &Connection, event: &Event) -> Result<(), AppError> {
    let data_json = serde_json::to_string(&event.data)?;

    conn.execute(
        "INSERT INTO events (
            event_id, timestamp, event_type, entity_type, entity_id, data, actor
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            event.event_id,
            format_timestamp(&event.timestamp),
            event.event_type,
            event.entity_type,
            event.entity_id,
            data_json,
            event.actor,
        ],
    )?;

    Ok(())
}

/// Record an event, logging instead of failing the surrounding operation
pub fn record_event(conn: &Connection, event: Event) {
    if let Err(e) = insert_event(conn, &event) {
        tracing::warn!(
            error = %e,
            event_type = %event.event_type,
            entity_id = %event.entity_id,
            "failed to record audit event"
        );
    }
}

/// Get events for a specific entity, newest first
pub fn get_events_for_entity(
    conn: &Connection,
    entity_type: &str,
    entity_id: &str,
) -> Result<Vec<Event>, AppError> {
    let mut stmt = conn.prepare(
        "SELECT event_id, timestamp, event_type, entity_type, entity_id, data, actor
         FROM events
         WHERE entity_type = ?1 AND entity_id = ?2
         ORDER BY timestamp DESC, id DESC",
    )?;

    let events = stmt
        .query_map(params![entity_type, entity_id], |row| {
            Ok(Event {
                event_id: row.get(0)?,
                timestamp: timestamp_at(row, 1)?,
                event_type: row.get(2)?,
                entity_type: row.get(3)?,
                entity_id: row.get(4)?,
                data: json_at(row, 5)?,
                actor: row.get(6)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(events)
}

// ============================================================================
// SCHEMA
// ============================================================================

/// Open (or create) the database file and make sure the schema exists
pub fn open_database(path: &Path) -> Result<Connection> {
    let conn = Connection::open(path)
        .with_context(|| format!("Failed to open database at {}", path.display()))?;
    setup_database(&conn)?;
    Ok(conn)
}

pub fn setup_database(conn: &Connection) -> Result<()> {
    // Enable WAL mode for crash recovery
    conn.pragma_update(None, "journal_mode", "WAL")?;
    conn.pragma_update(None, "foreign_keys", "ON")?;

    conn.execute_batch(
        "
        -- ======================================================================
        -- Auth provider tables (users, admin flags, bearer sessions)
        -- ======================================================================
        CREATE TABLE IF NOT EXISTS users (
            id TEXT PRIMARY KEY,
            email TEXT UNIQUE NOT NULL,
            metadata TEXT NOT NULL DEFAULT '{}',
            created_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS admin_users (
            user_id TEXT PRIMARY KEY REFERENCES users(id) ON DELETE CASCADE,
            granted_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS auth_sessions (
            token_hash TEXT PRIMARY KEY,
            user_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            created_at TEXT NOT NULL
        );

        -- ======================================================================
        -- Application tables
        -- ======================================================================
        CREATE TABLE IF NOT EXISTS profiles (
            id TEXT PRIMARY KEY REFERENCES users(id) ON DELETE CASCADE,
            full_name TEXT NOT NULL,
            phone TEXT,
            location TEXT,
            bio TEXT,
            farm_name TEXT,
            avatar_url TEXT,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS financial_services (
            id TEXT PRIMARY KEY,
            user_id TEXT NOT NULL,
            title TEXT NOT NULL,
            description TEXT NOT NULL DEFAULT '',
            category TEXT NOT NULL,
            provider_name TEXT NOT NULL,
            interest_rate REAL,
            max_amount REAL,
            tenure TEXT,
            eligibility_criteria TEXT NOT NULL DEFAULT '[]',
            tags TEXT NOT NULL DEFAULT '[]',
            contact_email TEXT,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS loan_applications (
            id TEXT PRIMARY KEY,
            user_id TEXT NOT NULL,
            amount REAL NOT NULL,
            purpose TEXT NOT NULL,
            duration TEXT NOT NULL DEFAULT '',
            farm_type TEXT NOT NULL,
            farm_size TEXT NOT NULL,
            annual_revenue TEXT NOT NULL DEFAULT '',
            collateral TEXT NOT NULL DEFAULT '',
            status TEXT NOT NULL DEFAULT 'pending'
                CHECK (status IN ('pending', 'reviewing', 'approved', 'rejected')),
            contact_number TEXT,
            existing_loans TEXT,
            additional_info TEXT,
            feedback TEXT,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS farm_transactions (
            id TEXT PRIMARY KEY,
            user_id TEXT NOT NULL,
            date TEXT NOT NULL,
            description TEXT NOT NULL DEFAULT '',
            amount REAL NOT NULL,
            kind TEXT NOT NULL CHECK (kind IN ('income', 'expense')),
            category TEXT NOT NULL,
            created_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS marketplace_listings (
            id TEXT PRIMARY KEY,
            user_id TEXT NOT NULL,
            title TEXT NOT NULL,
            description TEXT NOT NULL DEFAULT '',
            category TEXT NOT NULL,
            price REAL NOT NULL,
            quantity INTEGER NOT NULL DEFAULT 1,
            unit TEXT NOT NULL DEFAULT '',
            location TEXT NOT NULL DEFAULT '',
            image_urls TEXT NOT NULL DEFAULT '[]',
            status TEXT NOT NULL DEFAULT 'active' CHECK (status IN ('active', 'sold')),
            created_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS job_listings (
            id TEXT PRIMARY KEY,
            user_id TEXT NOT NULL,
            title TEXT NOT NULL,
            company TEXT NOT NULL,
            location TEXT NOT NULL,
            job_type TEXT NOT NULL DEFAULT '',
            salary_range TEXT,
            description TEXT NOT NULL DEFAULT '',
            requirements TEXT NOT NULL DEFAULT '[]',
            contact_email TEXT NOT NULL,
            created_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS network_posts (
            id TEXT PRIMARY KEY,
            user_id TEXT NOT NULL,
            content TEXT NOT NULL,
            created_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS network_farmers (
            id TEXT PRIMARY KEY,
            user_id TEXT NOT NULL,
            name TEXT NOT NULL,
            location TEXT NOT NULL,
            farm_type TEXT NOT NULL,
            farm_size TEXT NOT NULL DEFAULT '',
            specialization TEXT,
            created_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS network_experts (
            id TEXT PRIMARY KEY,
            user_id TEXT NOT NULL,
            name TEXT NOT NULL,
            expertise TEXT NOT NULL,
            experience_years INTEGER NOT NULL DEFAULT 0,
            location TEXT NOT NULL DEFAULT '',
            contact TEXT,
            created_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS network_events (
            id TEXT PRIMARY KEY,
            user_id TEXT NOT NULL,
            title TEXT NOT NULL,
            description TEXT NOT NULL DEFAULT '',
            event_date TEXT NOT NULL,
            location TEXT NOT NULL,
            organizer TEXT NOT NULL DEFAULT '',
            created_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS training_resources (
            id TEXT PRIMARY KEY,
            user_id TEXT NOT NULL,
            title TEXT NOT NULL,
            description TEXT NOT NULL DEFAULT '',
            category TEXT NOT NULL,
            format TEXT NOT NULL,
            url TEXT NOT NULL,
            duration_minutes INTEGER,
            created_at TEXT NOT NULL
        );

        -- ======================================================================
        -- Platform tables (buckets, row policies, audit trail)
        -- ======================================================================
        CREATE TABLE IF NOT EXISTS storage_buckets (
            name TEXT PRIMARY KEY,
            public INTEGER NOT NULL,
            size_limit INTEGER,
            created_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS row_policies (
            table_name TEXT PRIMARY KEY,
            public_read INTEGER NOT NULL,
            signed_in_read INTEGER NOT NULL DEFAULT 0,
            reviewer_roles TEXT NOT NULL DEFAULT '[]',
            applied_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS events (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            event_id TEXT UNIQUE NOT NULL,
            timestamp TEXT NOT NULL,
            event_type TEXT NOT NULL,
            entity_type TEXT NOT NULL,
            entity_id TEXT NOT NULL,
            data TEXT NOT NULL,
            actor TEXT NOT NULL
        );

        -- ======================================================================
        -- Indexes
        -- ======================================================================
        CREATE INDEX IF NOT EXISTS idx_loan_applications_user ON loan_applications(user_id);
        CREATE INDEX IF NOT EXISTS idx_loan_applications_status ON loan_applications(status);
        CREATE INDEX IF NOT EXISTS idx_financial_services_user ON financial_services(user_id);
        CREATE INDEX IF NOT EXISTS idx_farm_transactions_user ON farm_transactions(user_id);
        CREATE INDEX IF NOT EXISTS idx_marketplace_category ON marketplace_listings(category);
        CREATE INDEX IF NOT EXISTS idx_events_entity ON events(entity_type, entity_id);
        CREATE INDEX IF NOT EXISTS idx_events_timestamp ON events(timestamp);
        ",
    )
    .context("Failed to create schema")?;

    migrate_add_signed_in_read(conn)?;

    Ok(())
}

/// Databases created before catalogue reads existed lack `row_policies.signed_in_read`
fn migrate_add_signed_in_read(conn: &Connection) -> Result<()> {
    let mut stmt = conn.prepare("SELECT name FROM pragma_table_info('row_policies')")?;
    let columns = stmt
        .query_map([], |row| row.get::<_, String>(0))?
        .collect::<Result<Vec<_>, _>>()?;

    if !columns.iter().any(|c| c == "signed_in_read") {
        conn.execute(
            "ALTER TABLE row_policies ADD COLUMN signed_in_read INTEGER NOT NULL DEFAULT 0",
            [],
        )
        .context("Failed to add row_policies.signed_in_read")?;
        tracing::info!("migrated row_policies: added signed_in_read");
    }
    Ok(())
}

// ============================================================================
// ROW HELPERS
// ============================================================================

pub fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Fixed-width UTC form so text ordering matches time ordering
pub fn format_timestamp(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

pub fn now_rfc3339() -> String {
    format_timestamp(&Utc::now())
}

fn conversion_error<E>(idx: usize, err: E) -> rusqlite::Error
where
    E: std::error::Error + Send + Sync + 'static,
{
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(err))
}

/// Read an RFC 3339 column
pub fn timestamp_at(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let raw: String = row.get(idx)?;
    DateTime::parse_from_rfc3339(&raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| conversion_error(idx, e))
}

/// Read a YYYY-MM-DD column
pub fn date_at(row: &Row<'_>, idx: usize) -> rusqlite::Result<NaiveDate> {
    let raw: String = row.get(idx)?;
    NaiveDate::parse_from_str(&raw, "%Y-%m-%d").map_err(|e| conversion_error(idx, e))
}

/// Read a JSON text column
pub fn json_at<T: serde::de::DeserializeOwned>(row: &Row<'_>, idx: usize) -> rusqlite::Result<T> {
    let raw: String = row.get(idx)?;
    serde_json::from_str(&raw).map_err(|e| conversion_error(idx, e))
}

/// Read a text column holding one of our closed enums
pub fn enum_at<T>(row: &Row<'_>, idx: usize) -> rusqlite::Result<T>
where
    T: FromStr<Err = AppError>,
{
    let raw: String = row.get(idx)?;
    raw.parse::<T>().map_err(|e| conversion_error(idx, e))
}

pub fn to_json_text<T: Serialize>(value: &T) -> Result<String, AppError> {
    Ok(serde_json::to_string(value)?)
}

pub fn count_rows(conn: &Connection, table: Table) -> Result<i64, AppError> {
    let sql = format!("SELECT COUNT(*) FROM {}", table.as_str());
    Ok(conn.query_row(&sql, [], |row| row.get(0))?)
}

/// Delete a row by id, restricted to `owner` when given.
///
/// Returns the number of rows removed; a non-owner delete removes nothing.
pub fn delete_row(
    conn: &Connection,
    table: Table,
    id: &str,
    owner: Option<&str>,
) -> Result<usize, AppError> {
    let removed = match owner {
        Some(owner) => {
            let sql = format!(
                "DELETE FROM {} WHERE id = ?1 AND {} = ?2",
                table.as_str(),
                table.owner_column()
            );
            conn.execute(&sql, params![id, owner])?
        }
        None => {
            let sql = format!("DELETE FROM {} WHERE id = ?1", table.as_str());
            conn.execute(&sql, params![id])?
        }
    };
    Ok(removed)
}
