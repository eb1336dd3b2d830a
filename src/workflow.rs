// Loan Application Workflow
// submit → review → approve/reject, plus the bulk action used by the review panel.
//
// States: pending → reviewing → approved | rejected (pending → terminal allowed).
// Whether the workflow must be strictly forward-only was never settled, so the
// check is configurable: Permissive logs backward moves, ForwardOnly rejects them.

use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};
use std::io::Write;

use crate::db::{enum_at, new_id, now_rfc3339, record_event, timestamp_at, Event, Table};
use crate::entities::{LoanApplication, LoanStatus, NewLoanApplication};
use crate::error::{AppError, AppResult};
use crate::policy::{PolicySet, ReadScope};
use crate::session::Session;

const ENTITY: &str = "loan_application";

const SELECT_COLUMNS: &str = "SELECT id, user_id, amount, purpose, duration, farm_type, farm_size,
        annual_revenue, collateral, status, contact_number, existing_loans,
        additional_info, feedback, created_at, updated_at
     FROM loan_applications";

// ============================================================================
// TRANSITION POLICY
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum TransitionPolicy {
    /// Any status may be set at any time; non-forward moves are logged
    #[default]
    Permissive,

    /// Only pending → reviewing → approved|rejected (and pending → terminal)
    ForwardOnly,
}

impl TransitionPolicy {
    pub fn check(&self, id: &str, from: LoanStatus, to: LoanStatus) -> AppResult<()> {
        if from.is_forward_to(to) {
            return Ok(());
        }
        match self {
            TransitionPolicy::Permissive => {
                tracing::warn!(
                    application_id = id,
                    from = %from,
                    to = %to,
                    "non-forward status transition accepted"
                );
                Ok(())
            }
            TransitionPolicy::ForwardOnly => Err(AppError::InvalidTransition { from, to }),
        }
    }
}

// ============================================================================
// ROW MAPPING
// ============================================================================

fn map_application(row: &Row<'_>) -> rusqlite::Result<LoanApplication> {
    Ok(LoanApplication {
        id: row.get(0)?,
        user_id: row.get(1)?,
        amount: row.get(2)?,
        purpose: row.get(3)?,
        duration: row.get(4)?,
        farm_type: row.get(5)?,
        farm_size: row.get(6)?,
        annual_revenue: row.get(7)?,
        collateral: row.get(8)?,
        status: enum_at(row, 9)?,
        contact_number: row.get(10)?,
        existing_loans: row.get(11)?,
        additional_info: row.get(12)?,
        feedback: row.get(13)?,
        created_at: timestamp_at(row, 14)?,
        updated_at: timestamp_at(row, 15)?,
    })
}

fn fetch_by_id(conn: &Connection, id: &str) -> AppResult<Option<LoanApplication>> {
    let sql = format!("{} WHERE id = ?1", SELECT_COLUMNS);
    Ok(conn.query_row(&sql, params![id], map_application).optional()?)
}

// ============================================================================
// OPERATIONS
// ============================================================================

/// Insert a pending application owned by the session's user
pub fn create_application(
    conn: &Connection,
    session: &Session,
    data: &NewLoanApplication,
) -> AppResult<LoanApplication> {
    data.validate()?;

    let id = new_id();
    let now = now_rfc3339();

    conn.execute(
        "INSERT INTO loan_applications (
            id, user_id, amount, purpose, duration, farm_type, farm_size,
            annual_revenue, collateral, status, contact_number, existing_loans,
            additional_info, created_at, updated_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?14)",
        params![
            id,
            session.user_id,
            data.amount,
            data.purpose.trim(),
            data.duration,
            data.farm_type,
            data.farm_size,
            data.annual_revenue,
            data.collateral,
            LoanStatus::Pending.as_str(),
            data.contact_number,
            data.existing_loans,
            data.additional_info,
            now,
        ],
    )?;

    record_event(
        conn,
        Event::new(
            "application_submitted",
            ENTITY,
            &id,
            serde_json::json!({ "amount": data.amount, "purpose": data.purpose }),
            &session.user_id,
        ),
    );
    tracing::info!(application_id = %id, user_id = %session.user_id, "loan application submitted");

    fetch_by_id(conn, &id)?.ok_or_else(|| AppError::not_found("loan application", id))
}

/// Submit an application for the signed-in user.
///
/// Returns `Ok(false)` without touching the database when there is no session.
pub fn submit_application(
    conn: &Connection,
    session: Option<&Session>,
    data: &NewLoanApplication,
) -> AppResult<bool> {
    let Some(session) = session else {
        tracing::debug!("application submitted without a session, ignoring");
        return Ok(false);
    };
    create_application(conn, session, data)?;
    Ok(true)
}

pub fn get_application(
    conn: &Connection,
    session: &Session,
    id: &str,
) -> AppResult<LoanApplication> {
    let policies = PolicySet::load(conn)?;
    match fetch_by_id(conn, id)? {
        Some(app) if policies.can_read(Table::LoanApplications, Some(session), &app.user_id) => {
            Ok(app)
        }
        _ => Err(AppError::not_found("loan application", id)),
    }
}

/// Visible applications, newest first
pub fn list_applications(
    conn: &Connection,
    session: &Session,
    status: Option<LoanStatus>,
) -> AppResult<Vec<LoanApplication>> {
    let policies = PolicySet::load(conn)?;
    let owner = match policies.read_scope(Table::LoanApplications, Some(session)) {
        ReadScope::All => None,
        ReadScope::Owner(user_id) => Some(user_id),
        ReadScope::Nothing => return Ok(Vec::new()),
    };

    let sql = format!(
        "{} WHERE (?1 IS NULL OR user_id = ?1) AND (?2 IS NULL OR status = ?2)
         ORDER BY created_at DESC",
        SELECT_COLUMNS
    );
    let mut stmt = conn.prepare(&sql)?;
    let apps = stmt
        .query_map(params![owner, status.map(|s| s.as_str())], map_application)?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(apps)
}

/// Set the status (and optionally the reviewer feedback) of one application.
///
/// Only reviewers (financial providers, admins) may do this; for anyone else the
/// row is reported as not found. Nothing but status, feedback and updated_at changes.
pub fn update_application_status(
    conn: &Connection,
    session: &Session,
    transitions: TransitionPolicy,
    id: &str,
    status: LoanStatus,
    feedback: Option<&str>,
) -> AppResult<LoanApplication> {
    let policies = PolicySet::load(conn)?;
    if !policies.is_reviewer(Table::LoanApplications, session) {
        return Err(AppError::not_found("loan application", id));
    }

    let current = fetch_by_id(conn, id)?.ok_or_else(|| AppError::not_found("loan application", id))?;
    transitions.check(id, current.status, status)?;

    let updated = conn.execute(
        "UPDATE loan_applications
         SET status = ?1, feedback = COALESCE(?2, feedback), updated_at = ?3
         WHERE id = ?4",
        params![status.as_str(), feedback, now_rfc3339(), id],
    )?;
    if updated == 0 {
        return Err(AppError::not_found("loan application", id));
    }

    record_event(
        conn,
        Event::new(
            "status_changed",
            ENTITY,
            id,
            serde_json::json!({
                "from": current.status,
                "to": status,
                "feedback": feedback,
            }),
            &session.user_id,
        ),
    );
    tracing::info!(
        application_id = id,
        from = %current.status,
        to = %status,
        reviewer = %session.user_id,
        "loan application status updated"
    );

    fetch_by_id(conn, id)?.ok_or_else(|| AppError::not_found("loan application", id))
}

// ============================================================================
// BULK ACTION
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BulkFailure {
    pub id: String,
    pub error: String,
}

/// Per-item result of a bulk status change. Not atomic: successes stay applied.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BulkOutcome {
    pub target: LoanStatus,
    pub updated: Vec<String>,
    pub failed: Vec<BulkFailure>,
}

impl BulkOutcome {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Move every pending application to `target`, one row at a time.
pub fn bulk_update_status(
    conn: &Connection,
    session: &Session,
    transitions: TransitionPolicy,
    target: LoanStatus,
    feedback: Option<&str>,
) -> AppResult<BulkOutcome> {
    let policies = PolicySet::load(conn)?;
    if !policies.is_reviewer(Table::LoanApplications, session) {
        return Err(AppError::Forbidden {
            required: "financial provider or admin role",
        });
    }

    let mut stmt = conn.prepare(
        "SELECT id FROM loan_applications WHERE status = ?1 ORDER BY created_at ASC",
    )?;
    let pending: Vec<String> = stmt
        .query_map(params![LoanStatus::Pending.as_str()], |row| row.get(0))?
        .collect::<Result<Vec<_>, _>>()?;

    let mut outcome = BulkOutcome {
        target,
        updated: Vec::new(),
        failed: Vec::new(),
    };

    for id in pending {
        match update_application_status(conn, session, transitions, &id, target, feedback) {
            Ok(_) => outcome.updated.push(id),
            Err(e) => {
                tracing::error!(application_id = %id, error = %e, "bulk status update failed");
                outcome.failed.push(BulkFailure {
                    id,
                    error: e.to_string(),
                });
            }
        }
    }

    if !outcome.is_complete() {
        tracing::warn!(
            updated = outcome.updated.len(),
            failed = outcome.failed.len(),
            target = %target,
            "bulk status update partially applied"
        );
    }

    Ok(outcome)
}

// ============================================================================
// STATS & EXPORT
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ApplicationStats {
    pub total: i64,
    pub pending: i64,
    pub reviewing: i64,
    pub approved: i64,
    pub rejected: i64,
}

pub fn application_stats(conn: &Connection) -> AppResult<ApplicationStats> {
    let mut stmt = conn.prepare("SELECT status, COUNT(*) FROM loan_applications GROUP BY status")?;
    let rows = stmt
        .query_map([], |row| Ok((enum_at::<LoanStatus>(row, 0)?, row.get::<_, i64>(1)?)))?
        .collect::<Result<Vec<_>, _>>()?;

    let mut stats = ApplicationStats::default();
    for (status, count) in rows {
        stats.total += count;
        match status {
            LoanStatus::Pending => stats.pending = count,
            LoanStatus::Reviewing => stats.reviewing = count,
            LoanStatus::Approved => stats.approved = count,
            LoanStatus::Rejected => stats.rejected = count,
        }
    }
    Ok(stats)
}

/// Status counts for the review panel; reviewers only
pub fn review_stats(conn: &Connection, session: &Session) -> AppResult<ApplicationStats> {
    let policies = PolicySet::load(conn)?;
    if !policies.is_reviewer(Table::LoanApplications, session) {
        return Err(AppError::Forbidden {
            required: "financial provider or admin role",
        });
    }
    application_stats(conn)
}

#[derive(Serialize)]
struct CsvRow<'a> {
    id: &'a str,
    user_id: &'a str,
    amount: f64,
    purpose: &'a str,
    duration: &'a str,
    farm_type: &'a str,
    farm_size: &'a str,
    annual_revenue: &'a str,
    collateral: &'a str,
    status: &'a str,
    contact_number: &'a str,
    feedback: &'a str,
    created_at: String,
    updated_at: String,
}

/// Write applications as CSV with a header row
pub fn write_csv<W: Write>(apps: &[LoanApplication], writer: W) -> anyhow::Result<usize> {
    let mut wtr = csv::Writer::from_writer(writer);
    for app in apps {
        wtr.serialize(CsvRow {
            id: &app.id,
            user_id: &app.user_id,
            amount: app.amount,
            purpose: &app.purpose,
            duration: &app.duration,
            farm_type: &app.farm_type,
            farm_size: &app.farm_size,
            annual_revenue: &app.annual_revenue,
            collateral: &app.collateral,
            status: app.status.as_str(),
            contact_number: app.contact_number.as_deref().unwrap_or_default(),
            feedback: app.feedback.as_deref().unwrap_or_default(),
            created_at: app.created_at.to_rfc3339(),
            updated_at: app.updated_at.to_rfc3339(),
        })?;
    }
    wtr.flush()?;
    Ok(apps.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{count_rows, get_events_for_entity};
    use crate::roles::Role;
    use crate::test_support::{signed_in, test_conn};

    fn broiler_application() -> NewLoanApplication {
        NewLoanApplication {
            amount: 50000.0,
            purpose: "Equipment".to_string(),
            duration: "12 months".to_string(),
            farm_type: "Broiler Farm".to_string(),
            farm_size: "Small (< 5,000 birds)".to_string(),
            annual_revenue: "₹3,00,000".to_string(),
            collateral: "Land".to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_submit_creates_pending_row() {
        let conn = test_conn();
        let farmer = signed_in(&conn, "farmer", Role::Farmer);

        assert!(submit_application(&conn, Some(&farmer), &broiler_application()).unwrap());

        let apps = list_applications(&conn, &farmer, None).unwrap();
        assert_eq!(apps.len(), 1);
        let app = &apps[0];
        assert_eq!(app.status, LoanStatus::Pending);
        assert_eq!(app.user_id, farmer.user_id);
        assert_eq!(app.amount, 50000.0);
        assert_eq!(app.purpose, "Equipment");
        assert_eq!(app.farm_type, "Broiler Farm");
        assert_eq!(app.farm_size, "Small (< 5,000 birds)");
    }

    #[test]
    fn test_submit_without_session_creates_nothing() {
        let conn = test_conn();

        assert!(!submit_application(&conn, None, &broiler_application()).unwrap());
        assert_eq!(count_rows(&conn, Table::LoanApplications).unwrap(), 0);
    }

    #[test]
    fn test_approve_changes_only_status_and_feedback() {
        let conn = test_conn();
        let farmer = signed_in(&conn, "farmer", Role::Farmer);
        let bank = signed_in(&conn, "bank", Role::FinancialProvider);

        let before = create_application(&conn, &farmer, &broiler_application()).unwrap();
        let after = update_application_status(
            &conn,
            &bank,
            TransitionPolicy::Permissive,
            &before.id,
            LoanStatus::Approved,
            Some("Documents verified"),
        )
        .unwrap();

        assert_eq!(after.status, LoanStatus::Approved);
        assert_eq!(after.feedback.as_deref(), Some("Documents verified"));

        let normalized = LoanApplication {
            status: before.status,
            feedback: before.feedback.clone(),
            updated_at: before.updated_at,
            ..after.clone()
        };
        assert_eq!(normalized, before, "no other field may change");

        let events = get_events_for_entity(&conn, ENTITY, &before.id).unwrap();
        assert_eq!(events[0].event_type, "status_changed");
        assert_eq!(events[0].data["from"], "pending");
        assert_eq!(events[0].data["to"], "approved");
    }

    #[test]
    fn test_feedback_is_kept_when_not_supplied() {
        let conn = test_conn();
        let farmer = signed_in(&conn, "farmer", Role::Farmer);
        let bank = signed_in(&conn, "bank", Role::FinancialProvider);
        let app = create_application(&conn, &farmer, &broiler_application()).unwrap();

        let p = TransitionPolicy::Permissive;
        update_application_status(&conn, &bank, p, &app.id, LoanStatus::Reviewing, Some("Call scheduled"))
            .unwrap();
        let app = update_application_status(&conn, &bank, p, &app.id, LoanStatus::Rejected, None).unwrap();

        assert_eq!(app.status, LoanStatus::Rejected);
        assert_eq!(app.feedback.as_deref(), Some("Call scheduled"));
    }

    #[test]
    fn test_applicant_cannot_change_status() {
        let conn = test_conn();
        let farmer = signed_in(&conn, "farmer", Role::Farmer);
        let app = create_application(&conn, &farmer, &broiler_application()).unwrap();

        let err = update_application_status(
            &conn,
            &farmer,
            TransitionPolicy::Permissive,
            &app.id,
            LoanStatus::Approved,
            None,
        )
        .unwrap_err();

        assert!(matches!(err, AppError::NotFound { .. }));
        assert_eq!(get_application(&conn, &farmer, &app.id).unwrap().status, LoanStatus::Pending);
    }

    #[test]
    fn test_owners_see_their_own_reviewers_see_all() {
        let conn = test_conn();
        let a = signed_in(&conn, "a", Role::Farmer);
        let b = signed_in(&conn, "b", Role::Farmer);
        let bank = signed_in(&conn, "bank", Role::FinancialProvider);

        let app_a = create_application(&conn, &a, &broiler_application()).unwrap();
        create_application(&conn, &b, &broiler_application()).unwrap();

        assert_eq!(list_applications(&conn, &a, None).unwrap().len(), 1);
        assert_eq!(list_applications(&conn, &bank, None).unwrap().len(), 2);
        assert!(get_application(&conn, &b, &app_a.id).is_err());
        assert!(get_application(&conn, &bank, &app_a.id).is_ok());
    }

    #[test]
    fn test_forward_only_rejects_reopening() {
        let conn = test_conn();
        let farmer = signed_in(&conn, "farmer", Role::Farmer);
        let admin = signed_in(&conn, "admin", Role::Admin);
        let app = create_application(&conn, &farmer, &broiler_application()).unwrap();

        let strict = TransitionPolicy::ForwardOnly;
        update_application_status(&conn, &admin, strict, &app.id, LoanStatus::Approved, None).unwrap();

        let err = update_application_status(&conn, &admin, strict, &app.id, LoanStatus::Pending, None)
            .unwrap_err();
        assert!(matches!(
            err,
            AppError::InvalidTransition {
                from: LoanStatus::Approved,
                to: LoanStatus::Pending
            }
        ));

        // The permissive default still lets it through
        let reopened = update_application_status(
            &conn,
            &admin,
            TransitionPolicy::Permissive,
            &app.id,
            LoanStatus::Pending,
            None,
        )
        .unwrap();
        assert_eq!(reopened.status, LoanStatus::Pending);
    }

    #[test]
    fn test_bulk_approve_reports_partial_failure() {
        let conn = test_conn();
        let farmer = signed_in(&conn, "farmer", Role::Farmer);
        let bank = signed_in(&conn, "bank", Role::FinancialProvider);

        let ids: Vec<String> = (0..3)
            .map(|_| create_application(&conn, &farmer, &broiler_application()).unwrap().id)
            .collect();

        // Make the store refuse writes to the second application
        conn.execute_batch(&format!(
            "CREATE TRIGGER fail_one BEFORE UPDATE ON loan_applications
             WHEN OLD.id = '{}'
             BEGIN SELECT RAISE(ABORT, 'write refused'); END;",
            ids[1]
        ))
        .unwrap();

        let outcome = bulk_update_status(
            &conn,
            &bank,
            TransitionPolicy::Permissive,
            LoanStatus::Approved,
            None,
        )
        .unwrap();

        assert_eq!(outcome.updated.len(), 2);
        assert_eq!(outcome.failed.len(), 1);
        assert_eq!(outcome.failed[0].id, ids[1]);
        assert!(outcome.failed[0].error.contains("write refused"));
        assert!(!outcome.is_complete());

        let stats = application_stats(&conn).unwrap();
        assert_eq!(stats.approved, 2);
        assert_eq!(stats.pending, 1);
        assert_eq!(get_application(&conn, &bank, &ids[1]).unwrap().status, LoanStatus::Pending);
    }

    #[test]
    fn test_bulk_requires_reviewer() {
        let conn = test_conn();
        let trainer = signed_in(&conn, "trainer", Role::Trainer);

        let err = bulk_update_status(
            &conn,
            &trainer,
            TransitionPolicy::Permissive,
            LoanStatus::Rejected,
            None,
        )
        .unwrap_err();
        assert!(matches!(err, AppError::Forbidden { .. }));
    }

    #[test]
    fn test_bulk_only_touches_pending() {
        let conn = test_conn();
        let farmer = signed_in(&conn, "farmer", Role::Farmer);
        let admin = signed_in(&conn, "admin", Role::Admin);
        let p = TransitionPolicy::Permissive;

        let reviewing = create_application(&conn, &farmer, &broiler_application()).unwrap();
        update_application_status(&conn, &admin, p, &reviewing.id, LoanStatus::Reviewing, None).unwrap();
        create_application(&conn, &farmer, &broiler_application()).unwrap();

        let outcome = bulk_update_status(&conn, &admin, p, LoanStatus::Rejected, Some("Budget exhausted")).unwrap();
        assert_eq!(outcome.updated.len(), 1);
        assert!(outcome.is_complete());

        let stats = application_stats(&conn).unwrap();
        assert_eq!(stats.reviewing, 1);
        assert_eq!(stats.rejected, 1);
        assert_eq!(stats.total, 2);
    }

    #[test]
    fn test_status_always_one_of_four() {
        let conn = test_conn();
        let farmer = signed_in(&conn, "farmer", Role::Farmer);
        let app = create_application(&conn, &farmer, &broiler_application()).unwrap();

        let raw = conn.execute(
            "UPDATE loan_applications SET status = 'archived' WHERE id = ?1",
            params![app.id],
        );
        assert!(raw.is_err());

        for app in list_applications(&conn, &farmer, None).unwrap() {
            assert!(LoanStatus::ALL.contains(&app.status));
        }
    }

    #[test]
    fn test_csv_export() {
        let conn = test_conn();
        let farmer = signed_in(&conn, "farmer", Role::Farmer);
        create_application(&conn, &farmer, &broiler_application()).unwrap();
        let apps = list_applications(&conn, &farmer, None).unwrap();

        let mut out = Vec::new();
        assert_eq!(write_csv(&apps, &mut out).unwrap(), 1);

        let text = String::from_utf8(out).unwrap();
        let mut lines = text.lines();
        assert!(lines.next().unwrap().starts_with("id,user_id,amount,purpose"));
        assert!(lines.next().unwrap().contains("Broiler Farm"));
    }

    #[test]
    fn test_review_stats_are_for_reviewers() {
        let conn = test_conn();
        let farmer = signed_in(&conn, "farmer", Role::Farmer);
        let provider = signed_in(&conn, "bank", Role::FinancialProvider);
        create_application(&conn, &farmer, &broiler_application()).unwrap();

        assert!(matches!(review_stats(&conn, &farmer), Err(AppError::Forbidden { .. })));
        let stats = review_stats(&conn, &provider).unwrap();
        assert_eq!(stats.total, 1);
        assert_eq!(stats.pending, 1);
    }
}
