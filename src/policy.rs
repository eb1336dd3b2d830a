// Row-Level Policies
// Server-side authorization for every user-owned table.
//
// `apply_policies` is the administrative function: it writes the policy for a
// fixed list of tables. Every repository call consults the stored `PolicySet`,
// so nothing depends on what a client claims about its role.
//
// Rules:
// - owner-only read/write by default
// - public read for the allowlist below
// - signed-in read for provider catalogues (financial services, training)
// - reviewer roles may read every row of a table and change workflow state
// - admins bypass row policies

use rusqlite::{params, Connection};
use serde::Serialize;
use std::collections::HashMap;

use crate::db::{json_at, now_rfc3339, to_json_text, Table};
use crate::error::AppResult;
use crate::roles::Role;
use crate::session::Session;

/// Tables anyone (even without a session) may read
pub const PUBLIC_READ_TABLES: [Table; 6] = [
    Table::MarketplaceListings,
    Table::NetworkEvents,
    Table::NetworkExperts,
    Table::NetworkFarmers,
    Table::JobListings,
    Table::Profiles,
];

/// Catalogue tables any signed-in user may read; writes stay with the owner
pub const SIGNED_IN_READ_TABLES: [Table; 2] = [Table::FinancialServices, Table::TrainingResources];

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TablePolicy {
    pub table: Table,
    pub public_read: bool,
    pub signed_in_read: bool,
    pub reviewer_roles: Vec<Role>,
}

impl TablePolicy {
    fn owner_only(table: Table) -> Self {
        TablePolicy {
            table,
            public_read: false,
            signed_in_read: false,
            reviewer_roles: Vec::new(),
        }
    }
}

/// The fixed policy list applied by `apply_policies`
pub fn default_policies() -> Vec<TablePolicy> {
    Table::ALL
        .into_iter()
        .map(|table| {
            let reviewer_roles = match table {
                Table::LoanApplications => vec![Role::FinancialProvider],
                _ => Vec::new(),
            };
            TablePolicy {
                table,
                public_read: PUBLIC_READ_TABLES.contains(&table),
                signed_in_read: SIGNED_IN_READ_TABLES.contains(&table),
                reviewer_roles,
            }
        })
        .collect()
}

/// Write the default policies, replacing whatever was stored
pub fn apply_policies(conn: &Connection) -> AppResult<usize> {
    let applied_at = now_rfc3339();
    let policies = default_policies();

    for policy in &policies {
        conn.execute(
            "INSERT INTO row_policies (
                table_name, public_read, signed_in_read, reviewer_roles, applied_at
             ) VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(table_name) DO UPDATE SET
                public_read = excluded.public_read,
                signed_in_read = excluded.signed_in_read,
                reviewer_roles = excluded.reviewer_roles,
                applied_at = excluded.applied_at",
            params![
                policy.table.as_str(),
                policy.public_read,
                policy.signed_in_read,
                to_json_text(&policy.reviewer_roles)?,
                applied_at,
            ],
        )?;
    }

    tracing::info!(tables = policies.len(), "row-level policies applied");
    Ok(policies.len())
}

/// Which rows of a table a caller may read
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadScope {
    All,
    Owner(String),
    Nothing,
}

impl ReadScope {
    /// SQL owner filter: `None` when nothing is visible, `Some(None)` for every row
    pub fn owner_filter(&self) -> Option<Option<&str>> {
        match self {
            ReadScope::All => Some(None),
            ReadScope::Owner(user_id) => Some(Some(user_id.as_str())),
            ReadScope::Nothing => None,
        }
    }
}

/// Policies as currently stored
#[derive(Debug, Clone, Default)]
pub struct PolicySet {
    policies: HashMap<Table, TablePolicy>,
}

impl PolicySet {
    pub fn load(conn: &Connection) -> AppResult<Self> {
        let mut stmt =
            conn.prepare("SELECT table_name, public_read, signed_in_read, reviewer_roles FROM row_policies")?;

        let rows = stmt
            .query_map([], |row| {
                let name: String = row.get(0)?;
                let public_read: bool = row.get(1)?;
                let signed_in_read: bool = row.get(2)?;
                let reviewer_roles: Vec<Role> = json_at(row, 3)?;
                Ok((name, public_read, signed_in_read, reviewer_roles))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        let mut policies = HashMap::new();
        for (name, public_read, signed_in_read, reviewer_roles) in rows {
            match name.parse::<Table>() {
                Ok(table) => {
                    policies.insert(
                        table,
                        TablePolicy {
                            table,
                            public_read,
                            signed_in_read,
                            reviewer_roles,
                        },
                    );
                }
                Err(_) => tracing::warn!(table = %name, "ignoring policy for unknown table"),
            }
        }

        Ok(PolicySet { policies })
    }

    /// True when `apply_policies` has never run against this database
    pub fn is_empty(&self) -> bool {
        self.policies.is_empty()
    }

    /// Tables without a stored policy are owner-only
    pub fn policy(&self, table: Table) -> TablePolicy {
        self.policies
            .get(&table)
            .cloned()
            .unwrap_or_else(|| TablePolicy::owner_only(table))
    }

    pub fn is_reviewer(&self, table: Table, session: &Session) -> bool {
        session.is_admin() || self.policy(table).reviewer_roles.contains(&session.role())
    }

    pub fn read_scope(&self, table: Table, session: Option<&Session>) -> ReadScope {
        let policy = self.policy(table);
        if policy.public_read {
            return ReadScope::All;
        }
        match session {
            Some(s) if policy.signed_in_read || self.is_reviewer(table, s) => ReadScope::All,
            Some(s) => ReadScope::Owner(s.user_id.clone()),
            None => ReadScope::Nothing,
        }
    }

    pub fn can_read(&self, table: Table, session: Option<&Session>, owner_id: &str) -> bool {
        match self.read_scope(table, session) {
            ReadScope::All => true,
            ReadScope::Owner(user_id) => user_id == owner_id,
            ReadScope::Nothing => false,
        }
    }

    /// Owner-level writes (edit, delete). Reviewers get no general write access.
    pub fn can_write(&self, session: &Session, owner_id: &str) -> bool {
        session.is_admin() || session.owns(owner_id)
    }

    /// Owner filter to apply to a delete/update; `None` means unrestricted
    pub fn write_owner_filter<'a>(&self, session: &'a Session) -> Option<&'a str> {
        if session.is_admin() {
            None
        } else {
            Some(session.user_id.as_str())
        }
    }
}
