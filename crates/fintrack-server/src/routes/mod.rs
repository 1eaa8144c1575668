mod auth;
mod transactions;

use std::sync::Arc;

use axum::{
    http::StatusCode,
    middleware,
    response::IntoResponse,
    routing::{get, post, put},
    Extension, Json, Router,
};
use serde_json::json;
use tower_governor::{governor::GovernorConfigBuilder, GovernorLayer};

use crate::auth::middleware::{optional_auth, require_auth, MaybeUser};
use crate::auth::token::TokenService;
use crate::config::Config;
use crate::db::DbPool;

#[derive(Clone)]
pub struct AppState {
    pub db: DbPool,
    pub config: Config,
    pub tokens: TokenService,
}

impl AppState {
    pub fn new(db: DbPool, config: Config) -> Self {
        let tokens = TokenService::new(config.token_secret.as_bytes(), config.token_ttl);
        Self { db, config, tokens }
    }
}

async fn health(Extension(MaybeUser(user)): Extension<MaybeUser>) -> impl IntoResponse {
    Json(json!({
        "message": "Personal Finance Tracker API is running!",
        "authenticated": user.is_some(),
    }))
}

async fn not_found() -> impl IntoResponse {
    (
        StatusCode::NOT_FOUND,
        Json(json!({ "message": "Route not found" })),
    )
}

pub fn create_router(state: AppState) -> Router {
    let health_routes = Router::new()
        .route("/api/health", get(health))
        .route_layer(middleware::from_fn_with_state(state.clone(), optional_auth));

    let mut auth_routes = Router::new()
        .route("/api/auth/signup", post(auth::signup))
        .route("/api/auth/login", post(auth::login))
        .route("/api/auth/logout", post(auth::logout));

    let mut protected = Router::new()
        // Auth
        .route("/api/auth/me", get(auth::me))
        .route("/api/auth/profile", put(auth::update_profile))
        // Transactions
        .route(
            "/api/transactions",
            get(transactions::list).post(transactions::create),
        )
        .route(
            "/api/transactions/stats/summary",
            get(transactions::stats_summary),
        )
        .route(
            "/api/transactions/{id}",
            get(transactions::get)
                .put(transactions::update)
                .delete(transactions::delete),
        )
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            require_auth,
        ));

    if state.config.rate_limit_enabled {
        // Auth routes — 10 requests burst per IP, refilled every 6 seconds
        if let Some(auth_governor) = GovernorConfigBuilder::default()
            .per_second(6)
            .burst_size(10)
            .finish()
        {
            auth_routes = auth_routes.layer(GovernorLayer::new(Arc::new(auth_governor)));
        }

        // Protected API — 120 requests burst per IP
        if let Some(api_governor) = GovernorConfigBuilder::default()
            .per_second(2)
            .burst_size(120)
            .finish()
        {
            protected = protected.layer(GovernorLayer::new(Arc::new(api_governor)));
        }
    }

    Router::new()
        .merge(health_routes)
        .merge(auth_routes)
        .merge(protected)
        .fallback(not_found)
        .with_state(state)
}

#[cfg(test)]
pub fn test_state() -> AppState {
    AppState::new(crate::db::create_memory_pool(), Config::for_tests())
}
