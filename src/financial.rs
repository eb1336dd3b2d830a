// Financial Services & Farm Ledger
// Provider listings (create / list / edit / delete) and the farmer's own
// income-expense ledger with its summary.

use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::Serialize;
use std::collections::BTreeMap;

use crate::db::{
    date_at, delete_row, enum_at, json_at, new_id, now_rfc3339, record_event, timestamp_at,
    to_json_text, Event, Table,
};
use crate::entities::{
    FinancialService, FinancialServiceInput, NewTransaction, Transaction, TransactionKind,
};
use crate::error::{AppError, AppResult};
use crate::policy::{PolicySet, ReadScope};
use crate::session::Session;

// ============================================================================
// FINANCIAL SERVICES
// ============================================================================

const SERVICE_COLUMNS: &str = "SELECT id, user_id, title, description, category, provider_name,
        interest_rate, max_amount, tenure, eligibility_criteria, tags, contact_email,
        created_at, updated_at
     FROM financial_services";

fn map_service(row: &Row<'_>) -> rusqlite::Result<FinancialService> {
    Ok(FinancialService {
        id: row.get(0)?,
        user_id: row.get(1)?,
        title: row.get(2)?,
        description: row.get(3)?,
        category: row.get(4)?,
        provider_name: row.get(5)?,
        interest_rate: row.get(6)?,
        max_amount: row.get(7)?,
        tenure: row.get(8)?,
        eligibility_criteria: json_at(row, 9)?,
        tags: json_at(row, 10)?,
        contact_email: row.get(11)?,
        created_at: timestamp_at(row, 12)?,
        updated_at: timestamp_at(row, 13)?,
    })
}

fn fetch_service(conn: &Connection, id: &str) -> AppResult<Option<FinancialService>> {
    let sql = format!("{} WHERE id = ?1", SERVICE_COLUMNS);
    Ok(conn.query_row(&sql, params![id], map_service).optional()?)
}

pub fn create_service(
    conn: &Connection,
    session: &Session,
    input: &FinancialServiceInput,
) -> AppResult<FinancialService> {
    if !(session.capabilities().is_financial_provider || session.is_admin()) {
        return Err(AppError::Forbidden {
            required: "financial provider role",
        });
    }
    input.validate()?;

    let id = new_id();
    let now = now_rfc3339();
    conn.execute(
        "INSERT INTO financial_services (
            id, user_id, title, description, category, provider_name, interest_rate,
            max_amount, tenure, eligibility_criteria, tags, contact_email, created_at, updated_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?13)",
        params![
            id,
            session.user_id,
            input.title.trim(),
            input.description,
            input.category,
            input.provider_name,
            input.interest_rate,
            input.max_amount,
            input.tenure,
            to_json_text(&input.eligibility_criteria)?,
            to_json_text(&input.tags)?,
            input.contact_email,
            now,
        ],
    )?;

    tracing::info!(service_id = %id, provider = %session.user_id, "financial service created");
    fetch_service(conn, &id)?.ok_or_else(|| AppError::not_found("financial service", id))
}

/// Visible services, newest first
pub fn list_services(conn: &Connection, session: Option<&Session>) -> AppResult<Vec<FinancialService>> {
    let policies = PolicySet::load(conn)?;
    let owner = match policies.read_scope(Table::FinancialServices, session) {
        ReadScope::All => None,
        ReadScope::Owner(user_id) => Some(user_id),
        ReadScope::Nothing => return Ok(Vec::new()),
    };

    let sql = format!(
        "{} WHERE (?1 IS NULL OR user_id = ?1) ORDER BY created_at DESC",
        SERVICE_COLUMNS
    );
    let mut stmt = conn.prepare(&sql)?;
    let services = stmt
        .query_map(params![owner], map_service)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(services)
}

pub fn get_service(
    conn: &Connection,
    session: Option<&Session>,
    id: &str,
) -> AppResult<FinancialService> {
    let policies = PolicySet::load(conn)?;
    match fetch_service(conn, id)? {
        Some(s) if policies.can_read(Table::FinancialServices, session, &s.user_id) => Ok(s),
        _ => Err(AppError::not_found("financial service", id)),
    }
}

/// Replace the editable fields of a listing; owner (or admin) only
pub fn update_service(
    conn: &Connection,
    session: &Session,
    id: &str,
    input: &FinancialServiceInput,
) -> AppResult<FinancialService> {
    input.validate()?;
    let policies = PolicySet::load(conn)?;

    let updated = conn.execute(
        "UPDATE financial_services SET
            title = ?1, description = ?2, category = ?3, provider_name = ?4,
            interest_rate = ?5, max_amount = ?6, tenure = ?7, eligibility_criteria = ?8,
            tags = ?9, contact_email = ?10, updated_at = ?11
         WHERE id = ?12 AND (?13 IS NULL OR user_id = ?13)",
        params![
            input.title.trim(),
            input.description,
            input.category,
            input.provider_name,
            input.interest_rate,
            input.max_amount,
            input.tenure,
            to_json_text(&input.eligibility_criteria)?,
            to_json_text(&input.tags)?,
            input.contact_email,
            now_rfc3339(),
            id,
            policies.write_owner_filter(session),
        ],
    )?;

    if updated == 0 {
        return Err(AppError::not_found("financial service", id));
    }
    fetch_service(conn, id)?.ok_or_else(|| AppError::not_found("financial service", id))
}

/// Delete a listing. A non-owner delete leaves the row in place and reports not found.
pub fn delete_service(conn: &Connection, session: &Session, id: &str) -> AppResult<()> {
    let policies = PolicySet::load(conn)?;
    let removed = delete_row(
        conn,
        Table::FinancialServices,
        id,
        policies.write_owner_filter(session),
    )?;

    if removed == 0 {
        tracing::warn!(service_id = id, user_id = %session.user_id, "financial service delete matched no row");
        return Err(AppError::not_found("financial service", id));
    }

    record_event(
        conn,
        Event::new("deleted", "financial_service", id, serde_json::json!({}), &session.user_id),
    );
    Ok(())
}

// ============================================================================
// FARM LEDGER
// ============================================================================

const TRANSACTION_COLUMNS: &str =
    "SELECT id, user_id, date, description, amount, kind, category, created_at
     FROM farm_transactions";

fn map_transaction(row: &Row<'_>) -> rusqlite::Result<Transaction> {
    Ok(Transaction {
        id: row.get(0)?,
        user_id: row.get(1)?,
        date: date_at(row, 2)?,
        description: row.get(3)?,
        amount: row.get(4)?,
        kind: enum_at(row, 5)?,
        category: row.get(6)?,
        created_at: timestamp_at(row, 7)?,
    })
}

pub fn add_transaction(
    conn: &Connection,
    session: &Session,
    input: &NewTransaction,
) -> AppResult<Transaction> {
    input.validate()?;
    let id = new_id();

    conn.execute(
        "INSERT INTO farm_transactions (id, user_id, date, description, amount, kind, category, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        params![
            id,
            session.user_id,
            input.date.format("%Y-%m-%d").to_string(),
            input.description,
            input.amount,
            input.kind.as_str(),
            input.category.trim(),
            now_rfc3339(),
        ],
    )?;

    let sql = format!("{} WHERE id = ?1", TRANSACTION_COLUMNS);
    Ok(conn.query_row(&sql, params![id], map_transaction)?)
}

/// The caller's own ledger, newest date first
pub fn list_transactions(conn: &Connection, session: &Session) -> AppResult<Vec<Transaction>> {
    let sql = format!(
        "{} WHERE user_id = ?1 ORDER BY date DESC, created_at DESC",
        TRANSACTION_COLUMNS
    );
    let mut stmt = conn.prepare(&sql)?;
    let transactions = stmt
        .query_map(params![session.user_id], map_transaction)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(transactions)
}

pub fn delete_transaction(conn: &Connection, session: &Session, id: &str) -> AppResult<()> {
    let policies = PolicySet::load(conn)?;
    let removed = delete_row(
        conn,
        Table::FarmTransactions,
        id,
        policies.write_owner_filter(session),
    )?;
    if removed == 0 {
        return Err(AppError::not_found("transaction", id));
    }
    Ok(())
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct LedgerSummary {
    pub transaction_count: usize,
    pub total_income: f64,
    pub total_expenses: f64,
    pub net: f64,

    /// Signed totals per category (income positive, expense negative)
    pub by_category: BTreeMap<String, f64>,
}

pub fn summarize(transactions: &[Transaction]) -> LedgerSummary {
    let mut summary = LedgerSummary {
        transaction_count: transactions.len(),
        ..Default::default()
    };

    for tx in transactions {
        let signed = match tx.kind {
            TransactionKind::Income => {
                summary.total_income += tx.amount;
                tx.amount
            }
            TransactionKind::Expense => {
                summary.total_expenses += tx.amount;
                -tx.amount
            }
        };
        *summary.by_category.entry(tx.category.clone()).or_insert(0.0) += signed;
    }

    summary.net = summary.total_income - summary.total_expenses;
    summary
}
