// Admin Panel
// User/role management, policy application, dashboard counts and audit lookups.
// Every operation requires an admin session.

use rusqlite::Connection;
use serde::Serialize;
use std::collections::BTreeMap;

use crate::db::{count_rows, get_events_for_entity, Event, Table};
use crate::error::{AppError, AppResult};
use crate::policy::apply_policies;
use crate::roles::{resolve_role, Role};
use crate::session::{is_flagged_admin, list_users, set_admin_flag, set_user_role, Session};
use crate::workflow::{application_stats, ApplicationStats};

fn require_admin(session: &Session) -> AppResult<()> {
    if session.is_admin() {
        Ok(())
    } else {
        Err(AppError::Forbidden {
            required: "admin role",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UserSummary {
    pub id: String,
    pub email: String,
    pub role: Role,
    pub is_admin: bool,
    pub created_at: String,
}

pub fn users(conn: &Connection, session: &Session) -> AppResult<Vec<UserSummary>> {
    require_admin(session)?;

    let mut out = Vec::new();
    for user in list_users(conn)? {
        let flagged = is_flagged_admin(conn, &user.id)?;
        let resolved = resolve_role(Some(&user.metadata), flagged);
        out.push(UserSummary {
            id: user.id,
            email: user.email,
            role: resolved.role,
            is_admin: flagged,
            created_at: user.created_at.to_rfc3339(),
        });
    }
    Ok(out)
}

pub fn assign_role(conn: &Connection, session: &Session, user_id: &str, role: Role) -> AppResult<()> {
    require_admin(session)?;
    set_user_role(conn, user_id, role)?;
    tracing::info!(user_id, role = %role, admin = %session.user_id, "role assigned");
    Ok(())
}

pub fn set_admin(conn: &Connection, session: &Session, user_id: &str, admin: bool) -> AppResult<()> {
    require_admin(session)?;
    if !admin && session.user_id == user_id {
        return Err(AppError::validation("user_id", "admins cannot revoke their own flag"));
    }
    set_admin_flag(conn, user_id, admin)?;
    tracing::info!(user_id, admin, by = %session.user_id, "admin flag changed");
    Ok(())
}

pub fn reapply_policies(conn: &Connection, session: &Session) -> AppResult<usize> {
    require_admin(session)?;
    apply_policies(conn)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Overview {
    pub users: i64,
    pub table_counts: BTreeMap<String, i64>,
    pub applications: ApplicationStats,
}

pub fn overview(conn: &Connection, session: &Session) -> AppResult<Overview> {
    require_admin(session)?;

    let users: i64 = conn.query_row("SELECT COUNT(*) FROM users", [], |row| row.get(0))?;
    let mut table_counts = BTreeMap::new();
    for table in Table::ALL {
        table_counts.insert(table.as_str().to_string(), count_rows(conn, table)?);
    }

    Ok(Overview {
        users,
        table_counts,
        applications: application_stats(conn)?,
    })
}

pub fn audit_trail(
    conn: &Connection,
    session: &Session,
    entity_type: &str,
    entity_id: &str,
) -> AppResult<Vec<Event>> {
    require_admin(session)?;
    get_events_for_entity(conn, entity_type, entity_id)
}
