//! Fixtures shared by the unit tests.

use rusqlite::Connection;

use crate::db::setup_database;
use crate::policy::apply_policies;
use crate::roles::Role;
use crate::session::{create_user, session_for_user, Session};

/// In-memory database with schema and row policies applied
pub fn test_conn() -> Connection {
    let conn = Connection::open_in_memory().expect("in-memory database");
    setup_database(&conn).expect("schema");
    apply_policies(&conn).expect("policies");
    conn
}

/// Create a user with `role` and return their session
pub fn signed_in(conn: &Connection, name: &str, role: Role) -> Session {
    let user = create_user(conn, &format!("{}@example.in", name), role).expect("user");
    session_for_user(conn, &user.id)
        .expect("session lookup")
        .expect("session")
}
