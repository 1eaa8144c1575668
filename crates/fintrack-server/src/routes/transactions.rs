use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Extension, Json,
};
use axum_extra::extract::WithRejection;
use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::error::{AppError, AppResult};
use crate::models::{Transaction, User};
use crate::routes::AppState;
use crate::services::summary::{self, Pagination, StatsSummary, Summary, TransactionFilter};
use crate::services::transactions::{self as store, TransactionInput};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListTransactionsQuery {
    pub page: Option<String>,
    pub limit: Option<String>,
    pub category: Option<String>,
    #[serde(rename = "type")]
    pub tx_type: Option<String>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsQuery {
    pub start_date: Option<String>,
    pub end_date: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionListResponse {
    pub transactions: Vec<Transaction>,
    pub current_page: u32,
    pub total_pages: u64,
    pub total: u64,
    pub summary: Summary,
}

#[derive(Debug, Serialize)]
pub struct DeleteResponse {
    pub message: &'static str,
}

/// GET /api/transactions?page&limit&category&type&startDate&endDate
pub async fn list(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    Query(query): Query<ListTransactionsQuery>,
) -> AppResult<Json<TransactionListResponse>> {
    let filter = TransactionFilter::parse(
        query.category.as_deref(),
        query.tx_type.as_deref(),
        query.start_date.as_deref(),
        query.end_date.as_deref(),
    )?;
    let pagination = Pagination::parse(query.page.as_deref(), query.limit.as_deref())?;

    let page = summary::list_transactions(&state.db, &user.id, &filter, pagination)?;

    Ok(Json(TransactionListResponse {
        transactions: page.items,
        current_page: page.page,
        total_pages: page.total_pages,
        total: page.total_count,
        summary: page.summary,
    }))
}

pub async fn get(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    Path(id): Path<String>,
) -> AppResult<Json<Transaction>> {
    Ok(Json(store::get_by_id(&state.db, &user.id, &id)?))
}

pub async fn create(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    WithRejection(Json(body), _): WithRejection<Json<TransactionInput>, AppError>,
) -> AppResult<(StatusCode, Json<Transaction>)> {
    let valid = store::validate(&body, Utc::now())?;
    let tx = store::create(&state.db, &user.id, valid)?;
    tracing::info!(user_id = %user.id, transaction_id = %tx.id, "Transaction created");

    Ok((StatusCode::CREATED, Json(tx)))
}

pub async fn update(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    Path(id): Path<String>,
    WithRejection(Json(body), _): WithRejection<Json<TransactionInput>, AppError>,
) -> AppResult<Json<Transaction>> {
    let tx = store::update(&state.db, &user.id, &id, body)?;
    tracing::info!(user_id = %user.id, transaction_id = %tx.id, "Transaction updated");

    Ok(Json(tx))
}

pub async fn delete(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    Path(id): Path<String>,
) -> AppResult<Json<DeleteResponse>> {
    store::delete(&state.db, &user.id, &id)?;
    tracing::info!(user_id = %user.id, transaction_id = %id, "Transaction deleted");

    Ok(Json(DeleteResponse {
        message: "Transaction deleted successfully",
    }))
}

/// GET /api/transactions/stats/summary?startDate&endDate
pub async fn stats_summary(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    Query(query): Query<StatsQuery>,
) -> AppResult<Json<StatsSummary>> {
    let filter =
        TransactionFilter::date_range(query.start_date.as_deref(), query.end_date.as_deref())?;
    Ok(Json(summary::stats_summary(&state.db, &user.id, &filter)?))
}
