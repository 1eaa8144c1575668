use chrono::{DateTime, Utc};
use rusqlite::Connection;
use serde::Deserialize;
use uuid::Uuid;

use crate::dates::parse_datetime;
use crate::db::{format_timestamp, now_timestamp, DbPool};
use crate::error::{AppError, AppResult};
use crate::models::{Category, Transaction, TransactionType};

pub const MAX_TITLE_LEN: usize = 100;

pub(crate) const TX_COLS: &str =
    "id, user_id, title, amount, date, category, type, created_at, updated_at";

pub(crate) fn row_to_transaction(row: &rusqlite::Row) -> rusqlite::Result<Transaction> {
    Ok(Transaction {
        id: row.get(0)?,
        user_id: row.get(1)?,
        title: row.get(2)?,
        amount: row.get(3)?,
        date: row.get(4)?,
        category: row.get(5)?,
        tx_type: row.get(6)?,
        created_at: row.get(7)?,
        updated_at: row.get(8)?,
    })
}

fn not_found() -> AppError {
    AppError::NotFound("Transaction not found".into())
}

/// Amount as sent by clients: a JSON number or a numeric string.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum AmountInput {
    Number(f64),
    Text(String),
}

impl AmountInput {
    fn value(&self) -> Option<f64> {
        let value = match self {
            AmountInput::Number(n) => *n,
            AmountInput::Text(s) => s.trim().parse().ok()?,
        };
        value.is_finite().then_some(value)
    }
}

impl From<f64> for AmountInput {
    fn from(value: f64) -> Self {
        AmountInput::Number(value)
    }
}

/// Create/update payload. Any client-supplied `type` is not even read.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TransactionInput {
    pub title: Option<String>,
    pub amount: Option<AmountInput>,
    pub date: Option<String>,
    pub category: Option<String>,
}

/// A payload that passed validation.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidTransaction {
    pub title: String,
    pub amount: f64,
    pub date: DateTime<Utc>,
    pub category: Category,
}

impl ValidTransaction {
    pub fn tx_type(&self) -> TransactionType {
        TransactionType::from_amount(self.amount)
    }
}

/// Check every field and report all violations at once. A missing date
/// defaults to `now`.
pub fn validate(input: &TransactionInput, now: DateTime<Utc>) -> AppResult<ValidTransaction> {
    let mut errors = Vec::new();

    let title = input.title.as_deref().map(str::trim).unwrap_or_default();
    if title.is_empty() {
        errors.push("Title is required".to_string());
    } else if title.chars().count() > MAX_TITLE_LEN {
        errors.push(format!(
            "Title cannot be more than {MAX_TITLE_LEN} characters"
        ));
    }

    let amount = match &input.amount {
        None => {
            errors.push("Amount is required".to_string());
            None
        }
        Some(raw) => match raw.value() {
            None => {
                errors.push("Amount must be a number".to_string());
                None
            }
            Some(v) if v == 0.0 => {
                errors.push("Amount cannot be zero".to_string());
                None
            }
            Some(v) => Some(v),
        },
    };

    let category = match input.category.as_deref().map(str::trim) {
        None | Some("") => {
            errors.push("Category is required".to_string());
            None
        }
        Some(raw) => match raw.parse::<Category>() {
            Ok(category) => Some(category),
            Err(e) => {
                errors.push(e.to_string());
                None
            }
        },
    };

    let date = match input.date.as_deref() {
        None => Some(now),
        Some(raw) => {
            let parsed = parse_datetime(raw);
            if parsed.is_none() {
                errors.push("Date is invalid".to_string());
            }
            parsed
        }
    };

    match (amount, category, date) {
        (Some(amount), Some(category), Some(date)) if errors.is_empty() => Ok(ValidTransaction {
            title: title.to_string(),
            amount,
            date,
            category,
        }),
        _ => Err(AppError::Validation(errors)),
    }
}

/// Overlay a partial update on the stored record. Fields the client omitted
/// keep their stored value; the merged result is validated as a whole.
pub fn merge_update(existing: &Transaction, update: TransactionInput) -> TransactionInput {
    TransactionInput {
        title: update.title.or_else(|| Some(existing.title.clone())),
        amount: update.amount.or(Some(AmountInput::Number(existing.amount))),
        date: update.date.or_else(|| Some(existing.date.clone())),
        category: update
            .category
            .or_else(|| Some(existing.category.as_str().to_string())),
    }
}

fn fetch(conn: &Connection, owner_id: &str, id: &str) -> AppResult<Transaction> {
    conn.query_row(
        &format!("SELECT {TX_COLS} FROM transactions WHERE id = ?1 AND user_id = ?2"),
        rusqlite::params![id, owner_id],
        row_to_transaction,
    )
    .map_err(|e| match e {
        rusqlite::Error::QueryReturnedNoRows => not_found(),
        e => AppError::Database(e),
    })
}

/// Owner-scoped lookup. A record owned by someone else is reported exactly
/// like a missing one.
pub fn get_by_id(pool: &DbPool, owner_id: &str, id: &str) -> AppResult<Transaction> {
    let conn = pool.get()?;
    fetch(&conn, owner_id, id)
}

pub fn create(pool: &DbPool, owner_id: &str, valid: ValidTransaction) -> AppResult<Transaction> {
    let now = now_timestamp();
    let tx = Transaction {
        id: Uuid::new_v4().to_string(),
        user_id: owner_id.to_string(),
        tx_type: valid.tx_type(),
        title: valid.title,
        amount: valid.amount,
        date: format_timestamp(valid.date),
        category: valid.category,
        created_at: now.clone(),
        updated_at: now,
    };

    let conn = pool.get()?;
    conn.execute(
        &format!("INSERT INTO transactions ({TX_COLS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)"),
        rusqlite::params![
            tx.id,
            tx.user_id,
            tx.title,
            tx.amount,
            tx.date,
            tx.category,
            tx.tx_type,
            tx.created_at,
            tx.updated_at
        ],
    )?;

    Ok(tx)
}

pub fn update(
    pool: &DbPool,
    owner_id: &str,
    id: &str,
    input: TransactionInput,
) -> AppResult<Transaction> {
    let conn = pool.get()?;
    let existing = fetch(&conn, owner_id, id)?;
    let valid = validate(&merge_update(&existing, input), Utc::now())?;

    let updated = Transaction {
        tx_type: valid.tx_type(),
        title: valid.title,
        amount: valid.amount,
        date: format_timestamp(valid.date),
        category: valid.category,
        updated_at: now_timestamp(),
        ..existing
    };

    let affected = conn.execute(
        "UPDATE transactions SET title = ?1, amount = ?2, date = ?3, category = ?4, type = ?5, updated_at = ?6
         WHERE id = ?7 AND user_id = ?8",
        rusqlite::params![
            updated.title,
            updated.amount,
            updated.date,
            updated.category,
            updated.tx_type,
            updated.updated_at,
            updated.id,
            owner_id
        ],
    )?;
    // Deleted between the read and the write.
    if affected == 0 {
        return Err(not_found());
    }

    Ok(updated)
}

pub fn delete(pool: &DbPool, owner_id: &str, id: &str) -> AppResult<()> {
    let conn = pool.get()?;
    let affected = conn.execute(
        "DELETE FROM transactions WHERE id = ?1 AND user_id = ?2",
        rusqlite::params![id, owner_id],
    )?;

    if affected == 0 {
        return Err(not_found());
    }
    Ok(())
}
