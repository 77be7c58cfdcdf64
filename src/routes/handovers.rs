use axum::{
    extract::{Path, Query, State},
    http::HeaderMap,
    response::IntoResponse,
    Json,
};
use chrono::{Datelike, Utc};
use serde_json::{json, Map, Value};
use sqlx::PgConnection;

use crate::{
    auth::require_user_id,
    error::{AppError, AppResult},
    repository::table_service::{create_row_tx, get_row, list_rows, list_rows_tx, update_row},
    schemas::{
        clamp_limit_in_range, validate_input, CreateHandoverInput, HandoverPath, HandoversQuery,
    },
    services::{
        audit::write_activity_log,
        ledger::{financial_summary, handover_ledger},
    },
    state::AppState,
    tenancy::{assert_building_member, assert_building_role, ROLE_MANAGER, ROLE_OWNER},
};

pub fn router() -> axum::Router<AppState> {
    axum::Router::new()
        .route(
            "/handovers",
            axum::routing::get(list_handovers).post(create_handover),
        )
        .route("/handovers/{handover_id}", axum::routing::get(get_handover))
        .route(
            "/handovers/{handover_id}/confirm",
            axum::routing::post(confirm_handover),
        )
}

async fn list_handovers(
    State(state): State<AppState>,
    Query(query): Query<HandoversQuery>,
    headers: HeaderMap,
) -> AppResult<Json<Value>> {
    let user_id = require_user_id(&state, &headers).await?;
    assert_building_member(&state, &user_id, &query.building_id).await?;
    let pool = db_pool(&state)?;

    let mut filters = Map::new();
    filters.insert(
        "building_id".to_string(),
        Value::String(query.building_id.clone()),
    );
    if let Some(status) = query.status.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
        filters.insert(
            "status".to_string(),
            Value::String(status.to_ascii_lowercase()),
        );
    }

    let rows = list_rows(
        pool,
        "handovers",
        Some(&filters),
        clamp_limit_in_range(query.limit, 1, 1000),
        0,
        "created_at",
        false,
    )
    .await?;

    Ok(Json(json!({ "data": rows })))
}

// The insert is serialized per building with an advisory lock and the
// balance is recomputed inside the same transaction, so two concurrent
// handovers cannot both pass the check against a stale balance.
async fn create_handover(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<CreateHandoverInput>,
) -> AppResult<impl IntoResponse> {
    let user_id = require_user_id(&state, &headers).await?;
    validate_input(&payload)?;
    assert_building_role(&state, &user_id, &payload.building_id, &[ROLE_MANAGER]).await?;
    let pool = db_pool(&state)?;

    let mut tx = pool
        .begin()
        .await
        .map_err(|_| AppError::Dependency("Database operation failed.".to_string()))?;

    sqlx::query("SELECT pg_advisory_xact_lock(hashtext($1))")
        .bind(&payload.building_id)
        .execute(&mut *tx)
        .await
        .map_err(|_| AppError::Dependency("Database operation failed.".to_string()))?;

    let manager_cash = manager_cash_in_tx(&mut tx, &payload.building_id).await?;
    ensure_sufficient_balance(payload.amount, manager_cash)?;

    let mut record = Map::new();
    record.insert(
        "building_id".to_string(),
        Value::String(payload.building_id.clone()),
    );
    record.insert(
        "amount".to_string(),
        json!(payload.amount),
    );
    record.insert("status".to_string(), Value::String("pending".to_string()));
    record.insert(
        "created_by_user_id".to_string(),
        Value::String(user_id.clone()),
    );
    if let Some(note) = payload.note.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
        record.insert("note".to_string(), Value::String(note.to_string()));
    }

    let created = create_row_tx(&mut tx, "handovers", &record).await?;

    tx.commit()
        .await
        .map_err(|_| AppError::Dependency("Database operation failed.".to_string()))?;

    let entity_id = value_str(&created, "id");
    write_activity_log(
        state.db_pool.as_ref(),
        Some(&payload.building_id),
        Some(&user_id),
        "create",
        "handovers",
        Some(&entity_id),
        Some(json!({ "amount": payload.amount })),
    )
    .await;

    Ok((axum::http::StatusCode::CREATED, Json(created)))
}

async fn get_handover(
    State(state): State<AppState>,
    Path(path): Path<HandoverPath>,
    headers: HeaderMap,
) -> AppResult<Json<Value>> {
    let user_id = require_user_id(&state, &headers).await?;
    let pool = db_pool(&state)?;

    let record = get_row(pool, "handovers", &path.handover_id, "id").await?;
    let building_id = value_str(&record, "building_id");
    assert_building_member(&state, &user_id, &building_id).await?;

    Ok(Json(record))
}

// Confirmation is one-way. There is no endpoint to flip a handover back to
// pending or to delete it, so the custody trail stays append-only.
async fn confirm_handover(
    State(state): State<AppState>,
    Path(path): Path<HandoverPath>,
    headers: HeaderMap,
) -> AppResult<Json<Value>> {
    let user_id = require_user_id(&state, &headers).await?;
    let pool = db_pool(&state)?;

    let record = get_row(pool, "handovers", &path.handover_id, "id").await?;
    let building_id = value_str(&record, "building_id");
    assert_building_role(&state, &user_id, &building_id, &[ROLE_OWNER]).await?;

    let status = value_str(&record, "status").to_ascii_lowercase();
    if status == "confirmed" {
        return Err(AppError::Conflict(
            "Handover is already confirmed.".to_string(),
        ));
    }

    let mut patch = Map::new();
    patch.insert(
        "status".to_string(),
        Value::String("confirmed".to_string()),
    );
    patch.insert(
        "confirmed_at".to_string(),
        Value::String(Utc::now().to_rfc3339()),
    );
    patch.insert(
        "confirmed_by_user_id".to_string(),
        Value::String(user_id.clone()),
    );

    let updated = update_row(pool, "handovers", &path.handover_id, &patch, "id").await?;

    write_activity_log(
        state.db_pool.as_ref(),
        Some(&building_id),
        Some(&user_id),
        "confirm",
        "handovers",
        Some(&path.handover_id),
        None,
    )
    .await;

    Ok(Json(updated))
}

async fn manager_cash_in_tx(conn: &mut PgConnection, building_id: &str) -> AppResult<f64> {
    let mut filters = Map::new();
    filters.insert(
        "building_id".to_string(),
        Value::String(building_id.to_string()),
    );

    let tenants = list_rows_tx(conn, "tenants", Some(&filters), 5000, 0, "created_at", true).await?;
    let payments = list_rows_tx(
        conn,
        "rent_payments",
        Some(&filters),
        5000,
        0,
        "created_at",
        true,
    )
    .await?;
    let expenses =
        list_rows_tx(conn, "expenses", Some(&filters), 5000, 0, "created_at", true).await?;
    let handovers =
        list_rows_tx(conn, "handovers", Some(&filters), 5000, 0, "created_at", true).await?;

    let current_year = Utc::now().year();
    let summary = financial_summary(&tenants, &payments, &expenses, current_year);
    let custody = handover_ledger(&handovers, summary.net_balance);
    Ok(custody.manager_cash)
}

fn ensure_sufficient_balance(amount: f64, manager_cash: f64) -> AppResult<()> {
    if amount > manager_cash {
        return Err(AppError::UnprocessableEntity(format!(
            "Handover amount {amount:.2} exceeds the manager's cash balance {manager_cash:.2}."
        )));
    }
    Ok(())
}

fn db_pool(state: &AppState) -> AppResult<&sqlx::PgPool> {
    state.db_pool.as_ref().ok_or_else(|| {
        AppError::Dependency("Database is not configured. Set DATABASE_URL.".to_string())
    })
}

fn value_str(row: &Value, key: &str) -> String {
    row.as_object()
        .and_then(|obj| obj.get(key))
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(ToOwned::to_owned)
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::ensure_sufficient_balance;
    use crate::error::AppError;

    #[test]
    fn rejects_handover_exceeding_manager_cash() {
        // ManagerCash 60,000: a 70,000 handover is refused, 50,000 goes through.
        let rejected = ensure_sufficient_balance(70000.0, 60000.0);
        assert!(matches!(
            rejected,
            Err(AppError::UnprocessableEntity(ref detail))
                if detail.contains("70000.00") && detail.contains("60000.00")
        ));

        assert!(ensure_sufficient_balance(50000.0, 60000.0).is_ok());
        // Handing over the exact balance is allowed.
        assert!(ensure_sufficient_balance(60000.0, 60000.0).is_ok());
    }
}
