use axum::{
    extract::{Path, Query, State},
    http::HeaderMap,
    response::IntoResponse,
    Json,
};
use chrono::Utc;
use serde_json::{json, Map, Value};

use crate::{
    auth::require_user_id,
    error::{AppError, AppResult},
    repository::table_service::{create_row, get_row, list_rows, update_row},
    schemas::{
        clamp_limit_in_range, validate_input, PaymentPath, PaymentsQuery, RecordPaymentInput,
    },
    services::audit::write_activity_log,
    state::AppState,
    tenancy::{assert_building_member, assert_building_role, STAFF_ROLES},
};

pub fn router() -> axum::Router<AppState> {
    axum::Router::new()
        .route(
            "/payments",
            axum::routing::get(list_payments).post(record_payment),
        )
        .route("/payments/{payment_id}", axum::routing::get(get_payment))
}

/// Records a rent transaction for (tenant, month, year).
///
/// Writes are an upsert: a second submission for the same period replaces
/// the earlier row instead of appending, so the one-row-per-period invariant
/// holds. Until the manager records something, no row exists and the period
/// reads as unpaid.
async fn record_payment(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<RecordPaymentInput>,
) -> AppResult<impl IntoResponse> {
    let user_id = require_user_id(&state, &headers).await?;
    validate_input(&payload)?;
    assert_building_role(&state, &user_id, &payload.building_id, STAFF_ROLES).await?;
    let pool = db_pool(&state)?;

    let tenant = get_row(pool, "tenants", &payload.tenant_id, "id").await?;
    if value_str(&tenant, "building_id") != payload.building_id {
        return Err(AppError::BadRequest(
            "tenant_id does not belong to this building.".to_string(),
        ));
    }

    let status = normalize_choice(&payload.status, &["paid", "unpaid"], "status")?;
    let method = normalize_choice(&payload.method, &["cash", "online"], "method")?;

    // Default the rent to the tenant's contracted amount.
    let rent_amount = payload
        .rent_amount
        .unwrap_or_else(|| number_from_value(tenant.get("rent_amount")));
    if rent_amount < 0.0 || payload.service_charge < 0.0 {
        return Err(AppError::UnprocessableEntity(
            "Amounts must be non-negative.".to_string(),
        ));
    }

    let mut record = Map::new();
    record.insert(
        "building_id".to_string(),
        Value::String(payload.building_id.clone()),
    );
    record.insert(
        "tenant_id".to_string(),
        Value::String(payload.tenant_id.clone()),
    );
    record.insert("month".to_string(), json!(payload.month));
    record.insert("year".to_string(), json!(payload.year));
    record.insert("rent_amount".to_string(), json!(rent_amount));
    record.insert("service_charge".to_string(), json!(payload.service_charge));
    record.insert(
        "total_amount".to_string(),
        json!(rent_amount + payload.service_charge),
    );
    record.insert("status".to_string(), Value::String(status.clone()));
    record.insert("method".to_string(), Value::String(method));
    // Written unconditionally so that replacing a paid row with an unpaid
    // one clears the old timestamp.
    let paid_at = if status == "paid" {
        Value::String(Utc::now().to_rfc3339())
    } else {
        Value::Null
    };
    record.insert("paid_at".to_string(), paid_at);
    record.insert(
        "recorded_by_user_id".to_string(),
        Value::String(user_id.clone()),
    );

    let existing = find_period_row(pool, &payload.tenant_id, payload.month, payload.year).await?;
    let (written, action, created_now) = match existing {
        Some(row) => {
            let row_id = value_str(&row, "id");
            let updated = update_row(pool, "rent_payments", &row_id, &record, "id").await?;
            (updated, "update", false)
        }
        None => {
            let created = create_row(pool, "rent_payments", &record).await?;
            (created, "create", true)
        }
    };

    let entity_id = value_str(&written, "id");
    write_activity_log(
        state.db_pool.as_ref(),
        Some(&payload.building_id),
        Some(&user_id),
        action,
        "rent_payments",
        Some(&entity_id),
        Some(json!({ "month": payload.month, "year": payload.year, "status": status })),
    )
    .await;

    let status_code = if created_now {
        axum::http::StatusCode::CREATED
    } else {
        axum::http::StatusCode::OK
    };
    Ok((status_code, Json(written)))
}

async fn list_payments(
    State(state): State<AppState>,
    Query(query): Query<PaymentsQuery>,
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
    if let Some(month) = query.month {
        if !(1..=12).contains(&month) {
            return Err(AppError::BadRequest("month must be 1-12.".to_string()));
        }
        filters.insert("month".to_string(), json!(month));
    }
    if let Some(year) = query.year {
        filters.insert("year".to_string(), json!(year));
    }
    if let Some(tenant_id) = non_empty_opt(query.tenant_id.as_deref()) {
        filters.insert("tenant_id".to_string(), Value::String(tenant_id));
    }
    if let Some(status) = non_empty_opt(query.status.as_deref()) {
        filters.insert(
            "status".to_string(),
            Value::String(status.to_ascii_lowercase()),
        );
    }

    let rows = list_rows(
        pool,
        "rent_payments",
        Some(&filters),
        clamp_limit_in_range(query.limit, 1, 5000),
        0,
        "created_at",
        false,
    )
    .await?;

    Ok(Json(json!({ "data": rows })))
}

async fn get_payment(
    State(state): State<AppState>,
    Path(path): Path<PaymentPath>,
    headers: HeaderMap,
) -> AppResult<Json<Value>> {
    let user_id = require_user_id(&state, &headers).await?;
    let pool = db_pool(&state)?;

    let record = get_row(pool, "rent_payments", &path.payment_id, "id").await?;
    let building_id = value_str(&record, "building_id");
    assert_building_member(&state, &user_id, &building_id).await?;

    Ok(Json(record))
}

async fn find_period_row(
    pool: &sqlx::PgPool,
    tenant_id: &str,
    month: u32,
    year: i32,
) -> AppResult<Option<Value>> {
    let mut filters = Map::new();
    filters.insert("tenant_id".to_string(), Value::String(tenant_id.to_string()));
    filters.insert("month".to_string(), json!(month));
    filters.insert("year".to_string(), json!(year));

    let mut rows = list_rows(pool, "rent_payments", Some(&filters), 1, 0, "created_at", false).await?;
    Ok(rows.pop())
}

fn normalize_choice(raw: &str, allowed: &[&str], field: &str) -> AppResult<String> {
    let normalized = raw.trim().to_ascii_lowercase();
    if allowed.contains(&normalized.as_str()) {
        return Ok(normalized);
    }
    Err(AppError::UnprocessableEntity(format!(
        "Invalid {field} '{raw}'. Expected one of: {}.",
        allowed.join(", ")
    )))
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

fn non_empty_opt(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(ToOwned::to_owned)
}

fn number_from_value(value: Option<&Value>) -> f64 {
    match value {
        Some(Value::Number(number)) => number.as_f64().unwrap_or(0.0),
        Some(Value::String(text)) => text.trim().parse::<f64>().unwrap_or(0.0),
        _ => 0.0,
    }
}

#[cfg(test)]
mod tests {
    use super::normalize_choice;

    #[test]
    fn normalizes_status_and_method_choices() {
        assert_eq!(
            normalize_choice(" Paid ", &["paid", "unpaid"], "status").unwrap(),
            "paid"
        );
        assert_eq!(
            normalize_choice("ONLINE", &["cash", "online"], "method").unwrap(),
            "online"
        );
        assert!(normalize_choice("bkash", &["cash", "online"], "method").is_err());
    }
}
