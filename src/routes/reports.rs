use axum::{
    extract::{Query, State},
    http::HeaderMap,
    Json,
};
use chrono::{Datelike, Utc};
use serde_json::{json, Map, Value};

use crate::{
    auth::require_user_id,
    error::{AppError, AppResult},
    repository::table_service::list_rows,
    schemas::{validate_input, CashPositionQuery, FinancialSummaryQuery, MonthlyCollectionQuery},
    services::ledger::{financial_summary, handover_ledger, monthly_collection},
    state::AppState,
    tenancy::{assert_building_role, STAFF_ROLES},
};

pub fn router() -> axum::Router<AppState> {
    axum::Router::new()
        .route(
            "/reports/monthly-collection",
            axum::routing::get(monthly_collection_report),
        )
        .route(
            "/reports/financial-summary",
            axum::routing::get(financial_summary_report),
        )
        .route(
            "/reports/cash-position",
            axum::routing::get(cash_position_report),
        )
}

async fn monthly_collection_report(
    State(state): State<AppState>,
    Query(query): Query<MonthlyCollectionQuery>,
    headers: HeaderMap,
) -> AppResult<Json<Value>> {
    let user_id = require_user_id(&state, &headers).await?;
    validate_input(&query)?;
    assert_building_role(&state, &user_id, &query.building_id, STAFF_ROLES).await?;
    let pool = db_pool(&state)?;

    let tenants = fetch_all(pool, "tenants", &query.building_id).await?;
    let payments = fetch_all(pool, "rent_payments", &query.building_id).await?;

    let collection = monthly_collection(&tenants, &payments, query.month, query.year);

    Ok(Json(json!({
        "data": {
            "building_id": query.building_id,
            "month": query.month,
            "year": query.year,
            "target": collection.target,
            "collected": collection.collected,
            "due": collection.due,
            "percentage": collection.percentage,
        }
    })))
}

async fn financial_summary_report(
    State(state): State<AppState>,
    Query(query): Query<FinancialSummaryQuery>,
    headers: HeaderMap,
) -> AppResult<Json<Value>> {
    let user_id = require_user_id(&state, &headers).await?;
    validate_input(&query)?;
    assert_building_role(&state, &user_id, &query.building_id, STAFF_ROLES).await?;
    let pool = db_pool(&state)?;

    let tenants = fetch_all(pool, "tenants", &query.building_id).await?;
    let payments = fetch_all(pool, "rent_payments", &query.building_id).await?;
    let expenses = fetch_all(pool, "expenses", &query.building_id).await?;

    let summary = financial_summary(&tenants, &payments, &expenses, query.year);

    Ok(Json(json!({
        "data": {
            "building_id": query.building_id,
            "year": query.year,
            "payment_income": summary.payment_income,
            "security_deposits": summary.security_deposits,
            "gross_income": summary.gross_income,
            "expense_categories": summary.expense_categories,
            "total_expenses": summary.total_expenses,
            "net_balance": summary.net_balance,
            "monthly": summary.monthly,
        }
    })))
}

async fn cash_position_report(
    State(state): State<AppState>,
    Query(query): Query<CashPositionQuery>,
    headers: HeaderMap,
) -> AppResult<Json<Value>> {
    let user_id = require_user_id(&state, &headers).await?;
    assert_building_role(&state, &user_id, &query.building_id, STAFF_ROLES).await?;
    let pool = db_pool(&state)?;

    let tenants = fetch_all(pool, "tenants", &query.building_id).await?;
    let payments = fetch_all(pool, "rent_payments", &query.building_id).await?;
    let expenses = fetch_all(pool, "expenses", &query.building_id).await?;
    let handovers = fetch_all(pool, "handovers", &query.building_id).await?;

    let summary = financial_summary(&tenants, &payments, &expenses, Utc::now().year());
    let custody = handover_ledger(&handovers, summary.net_balance);

    Ok(Json(json!({
        "data": {
            "building_id": query.building_id,
            "net_balance": summary.net_balance,
            "confirmed_total": custody.confirmed_total,
            "pending_total": custody.pending_total,
            "manager_cash": custody.manager_cash,
        }
    })))
}

async fn fetch_all(
    pool: &sqlx::PgPool,
    table: &str,
    building_id: &str,
) -> AppResult<Vec<Value>> {
    let mut filters = Map::new();
    filters.insert(
        "building_id".to_string(),
        Value::String(building_id.to_string()),
    );
    list_rows(pool, table, Some(&filters), 5000, 0, "created_at", true).await
}

fn db_pool(state: &AppState) -> AppResult<&sqlx::PgPool> {
    state.db_pool.as_ref().ok_or_else(|| {
        AppError::Dependency("Database is not configured. Set DATABASE_URL.".to_string())
    })
}
