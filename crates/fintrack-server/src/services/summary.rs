//! Owner-scoped transaction queries: filtering, paging and aggregate totals.
//!
//! Totals are recomputed from the full filtered set on every call, so the
//! summary always agrees with whatever the filter currently selects.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use rusqlite::types::ToSql;
use serde::Serialize;

use crate::dates::{parse_bound, Bound};
use crate::db::{format_timestamp, DbPool};
use crate::error::{AppError, AppResult};
use crate::models::{Category, Transaction, TransactionType};
use crate::services::transactions::{row_to_transaction, TX_COLS};

pub const DEFAULT_PAGE_SIZE: u32 = 10;
pub const MAX_PAGE_SIZE: u32 = 100;

/// Value clients send to mean "no constraint" for category and type.
const ALL: &str = "all";

#[derive(Debug, Clone, Default, PartialEq)]
pub struct TransactionFilter {
    pub category: Option<Category>,
    pub tx_type: Option<TransactionType>,
    /// Inclusive.
    pub start: Option<DateTime<Utc>>,
    /// Inclusive.
    pub end: Option<DateTime<Utc>>,
}

fn constrained(raw: Option<&str>) -> Option<&str> {
    raw.map(str::trim)
        .filter(|v| !v.is_empty() && !v.eq_ignore_ascii_case(ALL))
}

impl TransactionFilter {
    /// Build a filter from raw query values, collecting every invalid one.
    pub fn parse(
        category: Option<&str>,
        tx_type: Option<&str>,
        start: Option<&str>,
        end: Option<&str>,
    ) -> AppResult<Self> {
        let mut errors = Vec::new();
        let mut filter = Self::default();

        if let Some(raw) = constrained(category) {
            match raw.parse::<Category>() {
                Ok(category) => filter.category = Some(category),
                Err(e) => errors.push(format!("{e}")),
            }
        }
        if let Some(raw) = constrained(tx_type) {
            match raw.parse::<TransactionType>() {
                Ok(tx_type) => filter.tx_type = Some(tx_type),
                Err(e) => errors.push(e),
            }
        }
        (filter.start, filter.end) = parse_range(start, end, &mut errors);

        if errors.is_empty() {
            Ok(filter)
        } else {
            Err(AppError::Validation(errors))
        }
    }

    /// Filter with only a date range, as used by the stats endpoint.
    pub fn date_range(start: Option<&str>, end: Option<&str>) -> AppResult<Self> {
        Self::parse(None, None, start, end)
    }

    fn where_clause(&self, owner_id: &str) -> (String, Vec<Box<dyn ToSql>>) {
        let mut clause = "WHERE user_id = ?1".to_string();
        let mut params: Vec<Box<dyn ToSql>> = vec![Box::new(owner_id.to_string())];

        if let Some(category) = self.category {
            params.push(Box::new(category));
            clause.push_str(&format!(" AND category = ?{}", params.len()));
        }
        if let Some(tx_type) = self.tx_type {
            params.push(Box::new(tx_type));
            clause.push_str(&format!(" AND type = ?{}", params.len()));
        }
        if let Some(start) = self.start {
            params.push(Box::new(format_timestamp(start)));
            clause.push_str(&format!(" AND date >= ?{}", params.len()));
        }
        if let Some(end) = self.end {
            params.push(Box::new(format_timestamp(end)));
            clause.push_str(&format!(" AND date <= ?{}", params.len()));
        }

        (clause, params)
    }
}

fn parse_range(
    start: Option<&str>,
    end: Option<&str>,
    errors: &mut Vec<String>,
) -> (Option<DateTime<Utc>>, Option<DateTime<Utc>>) {
    let mut parse = |raw: Option<&str>, bound: Bound, name: &str| {
        let raw = raw.map(str::trim).filter(|v| !v.is_empty())?;
        let parsed = parse_bound(raw, bound);
        if parsed.is_none() {
            errors.push(format!("{name} is not a valid date"));
        }
        parsed
    };
    let start = parse(start, Bound::Start, "startDate");
    let end = parse(end, Bound::End, "endDate");
    (start, end)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pagination {
    /// 1-indexed.
    pub page: u32,
    pub page_size: u32,
}

impl Default for Pagination {
    fn default() -> Self {
        Self {
            page: 1,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }
}

impl Pagination {
    /// `page` must be at least 1; `limit` between 1 and [`MAX_PAGE_SIZE`].
    pub fn parse(page: Option<&str>, limit: Option<&str>) -> AppResult<Self> {
        let mut errors = Vec::new();
        let mut parse = |raw: Option<&str>, default: u32, max: u32, message: &str| {
            match raw.map(str::trim).filter(|v| !v.is_empty()) {
                None => default,
                Some(raw) => match raw.parse::<u32>() {
                    Ok(v) if (1..=max).contains(&v) => v,
                    _ => {
                        errors.push(message.to_string());
                        default
                    }
                },
            }
        };

        let page = parse(page, 1, u32::MAX, "page must be a positive integer");
        let page_size = parse(
            limit,
            DEFAULT_PAGE_SIZE,
            MAX_PAGE_SIZE,
            "limit must be an integer between 1 and 100",
        );

        if errors.is_empty() {
            Ok(Self { page, page_size })
        } else {
            Err(AppError::Validation(errors))
        }
    }

    fn offset(self) -> u64 {
        u64::from(self.page.saturating_sub(1)) * u64::from(self.page_size)
    }

    pub fn total_pages(self, total_count: u64) -> u64 {
        total_count.div_ceil(u64::from(self.page_size.max(1)))
    }
}

fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Summary {
    pub total_income: f64,
    pub total_expenses: f64,
    pub balance: f64,
}

impl Summary {
    pub fn from_amounts(amounts: impl IntoIterator<Item = f64>) -> Self {
        let (income, expenses) = amounts
            .into_iter()
            .fold((0.0, 0.0), |(income, expenses), amount| {
                if amount > 0.0 {
                    (income + amount, expenses)
                } else {
                    (income, expenses + amount.abs())
                }
            });
        let total_income = round2(income);
        let total_expenses = round2(expenses);
        Self {
            total_income,
            total_expenses,
            balance: round2(total_income - total_expenses),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TransactionPage {
    pub page: u32,
    pub total_pages: u64,
    pub total_count: u64,
    pub items: Vec<Transaction>,
    pub summary: Summary,
}

/// One page of the owner's transactions matching `filter`, newest first,
/// with totals over every match (not just the page).
pub fn list_transactions(
    pool: &DbPool,
    owner_id: &str,
    filter: &TransactionFilter,
    pagination: Pagination,
) -> AppResult<TransactionPage> {
    let mut conn = pool.get()?;
    let (where_clause, mut params) = filter.where_clause(owner_id);

    // Totals and the page must come from the same snapshot.
    let tx = conn.transaction()?;

    let amounts = tx
        .prepare(&format!("SELECT amount FROM transactions {where_clause}"))?
        .query_map(
            rusqlite::params_from_iter(params.iter().map(|p| p.as_ref())),
            |row| row.get::<_, f64>(0),
        )?
        .collect::<Result<Vec<_>, _>>()?;
    let total_count = amounts.len() as u64;
    let summary = Summary::from_amounts(amounts);

    params.push(Box::new(i64::from(pagination.page_size)));
    let limit_idx = params.len();
    params.push(Box::new(i64::try_from(pagination.offset()).unwrap_or(i64::MAX)));
    let offset_idx = params.len();

    // rowid breaks ties between records created in the same millisecond.
    let sql = format!(
        "SELECT {TX_COLS} FROM transactions {where_clause}
         ORDER BY date DESC, created_at DESC, rowid DESC
         LIMIT ?{limit_idx} OFFSET ?{offset_idx}"
    );
    let items = tx
        .prepare(&sql)?
        .query_map(
            rusqlite::params_from_iter(params.iter().map(|p| p.as_ref())),
            row_to_transaction,
        )?
        .collect::<Result<Vec<_>, _>>()?;

    tx.commit()?;

    Ok(TransactionPage {
        page: pagination.page,
        total_pages: pagination.total_pages(total_count),
        total_count,
        items,
        summary,
    })
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct CategoryStats {
    pub income: f64,
    pub expenses: f64,
    /// Signed net of the category.
    pub total: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsSummary {
    pub total_income: f64,
    pub total_expenses: f64,
    pub balance: f64,
    pub transaction_count: u64,
    pub category_stats: BTreeMap<Category, CategoryStats>,
}

impl StatsSummary {
    pub fn from_rows(rows: &[(Category, f64)]) -> Self {
        let summary = Summary::from_amounts(rows.iter().map(|(_, amount)| *amount));

        let mut category_stats: BTreeMap<Category, CategoryStats> = BTreeMap::new();
        for (category, amount) in rows {
            let stats = category_stats.entry(*category).or_default();
            if *amount > 0.0 {
                stats.income += amount;
            } else {
                stats.expenses += amount.abs();
            }
            stats.total += amount;
        }
        for stats in category_stats.values_mut() {
            stats.income = round2(stats.income);
            stats.expenses = round2(stats.expenses);
            stats.total = round2(stats.total);
        }

        Self {
            total_income: summary.total_income,
            total_expenses: summary.total_expenses,
            balance: summary.balance,
            transaction_count: rows.len() as u64,
            category_stats,
        }
    }
}

/// Totals and per-category breakdown of the owner's transactions in a date range.
pub fn stats_summary(
    pool: &DbPool,
    owner_id: &str,
    filter: &TransactionFilter,
) -> AppResult<StatsSummary> {
    let conn = pool.get()?;
    let (where_clause, params) = filter.where_clause(owner_id);

    let mut stmt = conn.prepare(&format!(
        "SELECT category, amount FROM transactions {where_clause}"
    ))?;
    let rows = stmt
        .query_map(
            rusqlite::params_from_iter(params.iter().map(|p| p.as_ref())),
            |row| Ok((row.get::<_, Category>(0)?, row.get::<_, f64>(1)?)),
        )?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(StatsSummary::from_rows(&rows))
}
