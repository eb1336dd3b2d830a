// Auth/Session Provider
// Stand-in for the external auth service: users, admin flags and bearer tokens.
//
// Password and OAuth flows live with the auth provider. This module only turns an
// opaque token into a Session, resolving the role from server-side metadata.

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::db::{format_timestamp, json_at, new_id, now_rfc3339, timestamp_at, to_json_text};
use crate::error::{AppError, AppResult};
use crate::roles::{resolve_role, Capabilities, ResolvedRole, Role, ROLE_METADATA_KEY};

// ============================================================================
// USERS
// ============================================================================

/// Account record as held by the auth provider
#[derive(Debug, Clone, Serialize)]
pub struct AuthUser {
    pub id: String,
    pub email: String,
    pub metadata: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

pub fn create_user(conn: &Connection, email: &str, role: Role) -> AppResult<AuthUser> {
    let email = email.trim().to_lowercase();
    if !email.contains('@') {
        return Err(AppError::validation("email", "is not an email address"));
    }

    let user = AuthUser {
        id: new_id(),
        email,
        metadata: serde_json::json!({ ROLE_METADATA_KEY: role.as_str() }),
        created_at: Utc::now(),
    };

    conn.execute(
        "INSERT INTO users (id, email, metadata, created_at) VALUES (?1, ?2, ?3, ?4)",
        params![
            user.id,
            user.email,
            to_json_text(&user.metadata)?,
            format_timestamp(&user.created_at),
        ],
    )?;

    tracing::info!(user_id = %user.id, role = %role, "user created");
    Ok(user)
}

fn map_user(row: &rusqlite::Row<'_>) -> rusqlite::Result<AuthUser> {
    Ok(AuthUser {
        id: row.get(0)?,
        email: row.get(1)?,
        metadata: json_at(row, 2)?,
        created_at: timestamp_at(row, 3)?,
    })
}

pub fn get_user(conn: &Connection, user_id: &str) -> AppResult<Option<AuthUser>> {
    let user = conn
        .query_row(
            "SELECT id, email, metadata, created_at FROM users WHERE id = ?1",
            params![user_id],
            map_user,
        )
        .optional()?;
    Ok(user)
}

pub fn find_user_by_email(conn: &Connection, email: &str) -> AppResult<Option<AuthUser>> {
    let user = conn
        .query_row(
            "SELECT id, email, metadata, created_at FROM users WHERE email = ?1",
            params![email.trim().to_lowercase()],
            map_user,
        )
        .optional()?;
    Ok(user)
}

pub fn list_users(conn: &Connection) -> AppResult<Vec<AuthUser>> {
    let mut stmt =
        conn.prepare("SELECT id, email, metadata, created_at FROM users ORDER BY created_at DESC")?;
    let users = stmt
        .query_map([], map_user)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(users)
}

/// Overwrite the role key in a user's metadata, keeping other keys
pub fn set_user_role(conn: &Connection, user_id: &str, role: Role) -> AppResult<()> {
    let mut user = get_user(conn, user_id)?.ok_or_else(|| AppError::not_found("user", user_id))?;

    match user.metadata.as_object_mut() {
        Some(map) => {
            map.insert(ROLE_METADATA_KEY.to_string(), serde_json::json!(role.as_str()));
        }
        None => user.metadata = serde_json::json!({ ROLE_METADATA_KEY: role.as_str() }),
    }

    conn.execute(
        "UPDATE users SET metadata = ?1 WHERE id = ?2",
        params![to_json_text(&user.metadata)?, user_id],
    )?;
    Ok(())
}

pub fn is_flagged_admin(conn: &Connection, user_id: &str) -> AppResult<bool> {
    let found: Option<String> = conn
        .query_row(
            "SELECT user_id FROM admin_users WHERE user_id = ?1",
            params![user_id],
            |row| row.get(0),
        )
        .optional()?;
    Ok(found.is_some())
}

pub fn set_admin_flag(conn: &Connection, user_id: &str, admin: bool) -> AppResult<()> {
    if get_user(conn, user_id)?.is_none() {
        return Err(AppError::not_found("user", user_id));
    }

    if admin {
        conn.execute(
            "INSERT OR IGNORE INTO admin_users (user_id, granted_at) VALUES (?1, ?2)",
            params![user_id, now_rfc3339()],
        )?;
    } else {
        conn.execute("DELETE FROM admin_users WHERE user_id = ?1", params![user_id])?;
    }
    Ok(())
}

// ============================================================================
// SESSIONS
// ============================================================================

/// The signed-in user, passed explicitly to every operation
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Session {
    pub user_id: String,
    pub email: String,
    #[serde(flatten)]
    pub resolved: ResolvedRole,
}

impl Session {
    pub fn role(&self) -> Role {
        self.resolved.role
    }

    pub fn capabilities(&self) -> Capabilities {
        self.resolved.capabilities
    }

    pub fn is_admin(&self) -> bool {
        self.resolved.capabilities.is_admin
    }

    pub fn owns(&self, owner_id: &str) -> bool {
        self.user_id == owner_id
    }
}

/// Build the session for a user id, reading role and admin flag from the store
pub fn session_for_user(conn: &Connection, user_id: &str) -> AppResult<Option<Session>> {
    let Some(user) = get_user(conn, user_id)? else {
        return Ok(None);
    };
    let flagged_admin = is_flagged_admin(conn, &user.id)?;
    let resolved = resolve_role(Some(&user.metadata), flagged_admin);

    Ok(Some(Session {
        user_id: user.id,
        email: user.email,
        resolved,
    }))
}

fn hash_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Issue a new bearer token; only its SHA-256 digest is stored
pub fn issue_token(conn: &Connection, user_id: &str) -> AppResult<String> {
    if get_user(conn, user_id)?.is_none() {
        return Err(AppError::not_found("user", user_id));
    }

    let token = format!("{}{}", uuid::Uuid::new_v4().simple(), uuid::Uuid::new_v4().simple());
    conn.execute(
        "INSERT INTO auth_sessions (token_hash, user_id, created_at) VALUES (?1, ?2, ?3)",
        params![hash_token(&token), user_id, now_rfc3339()],
    )?;

    tracing::debug!(user_id, "session token issued");
    Ok(token)
}

/// Resolve a bearer token. Unknown tokens yield `None`
pub fn authenticate(conn: &Connection, token: &str) -> AppResult<Option<Session>> {
    let user_id: Option<String> = conn
        .query_row(
            "SELECT user_id FROM auth_sessions WHERE token_hash = ?1",
            params![hash_token(token)],
            |row| row.get(0),
        )
        .optional()?;

    match user_id {
        Some(user_id) => session_for_user(conn, &user_id),
        None => Ok(None),
    }
}

pub fn revoke_token(conn: &Connection, token: &str) -> AppResult<bool> {
    let removed = conn.execute(
        "DELETE FROM auth_sessions WHERE token_hash = ?1",
        params![hash_token(token)],
    )?;
    Ok(removed > 0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::setup_database;

    fn conn() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        setup_database(&conn).unwrap();
        conn
    }

    #[test]
    fn test_token_resolves_to_session_with_role() {
        let conn = conn();
        let user = create_user(&conn, "Ravi@Example.com", Role::Farmer).unwrap();
        assert_eq!(user.email, "ravi@example.com");

        let token = issue_token(&conn, &user.id).unwrap();
        let session = authenticate(&conn, &token).unwrap().expect("session");

        assert_eq!(session.user_id, user.id);
        assert_eq!(session.role(), Role::Farmer);
        assert!(session.capabilities().can_sell);
    }

    #[test]
    fn test_unknown_and_revoked_tokens() {
        let conn = conn();
        let user = create_user(&conn, "a@b.in", Role::Buyer).unwrap();
        let token = issue_token(&conn, &user.id).unwrap();

        assert!(authenticate(&conn, "nope").unwrap().is_none());

        assert!(revoke_token(&conn, &token).unwrap());
        assert!(authenticate(&conn, &token).unwrap().is_none());
    }

    #[test]
    fn test_tokens_are_stored_hashed() {
        let conn = conn();
        let user = create_user(&conn, "a@b.in", Role::Buyer).unwrap();
        let token = issue_token(&conn, &user.id).unwrap();

        let stored: String = conn
            .query_row("SELECT token_hash FROM auth_sessions", [], |row| row.get(0))
            .unwrap();
        assert_ne!(stored, token);
        assert_eq!(stored.len(), 64);
    }

    #[test]
    fn test_admin_flag_overrides_metadata_role() {
        let conn = conn();
        let user = create_user(&conn, "boss@22poultry.in", Role::Farmer).unwrap();

        set_admin_flag(&conn, &user.id, true).unwrap();
        let session = session_for_user(&conn, &user.id).unwrap().unwrap();
        assert_eq!(session.role(), Role::Admin);

        set_admin_flag(&conn, &user.id, false).unwrap();
        let session = session_for_user(&conn, &user.id).unwrap().unwrap();
        assert_eq!(session.role(), Role::Farmer);
    }

    #[test]
    fn test_set_role_keeps_other_metadata() {
        let conn = conn();
        let user = create_user(&conn, "t@b.in", Role::Unassigned).unwrap();
        conn.execute(
            "UPDATE users SET metadata = '{\"role\":\"\",\"full_name\":\"Meena\"}' WHERE id = ?1",
            params![user.id],
        )
        .unwrap();

        set_user_role(&conn, &user.id, Role::Trainer).unwrap();

        let reloaded = get_user(&conn, &user.id).unwrap().unwrap();
        assert_eq!(reloaded.metadata["role"], "trainer");
        assert_eq!(reloaded.metadata["full_name"], "Meena");
    }

    #[test]
    fn test_issue_token_for_missing_user_fails() {
        let conn = conn();
        assert!(matches!(
            issue_token(&conn, "ghost"),
            Err(AppError::NotFound { .. })
        ));
    }
}
