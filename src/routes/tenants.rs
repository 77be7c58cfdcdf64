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
    repository::table_service::{create_row, delete_row, get_row, list_rows, update_row},
    schemas::{
        clamp_limit_in_range, remove_nulls, serialize_to_map, validate_input, CreateTenantInput,
        MoveOutInput, TenantPath, TenantsQuery, UpdateTenantInput,
    },
    services::{audit::write_activity_log, ledger},
    state::AppState,
    tenancy::{assert_building_member, assert_building_role, STAFF_ROLES},
};

pub fn router() -> axum::Router<AppState> {
    axum::Router::new()
        .route(
            "/tenants",
            axum::routing::get(list_tenants).post(create_tenant),
        )
        .route(
            "/tenants/{tenant_id}",
            axum::routing::get(get_tenant)
                .patch(update_tenant)
                .delete(delete_tenant),
        )
        .route(
            "/tenants/{tenant_id}/move-out",
            axum::routing::post(move_out_tenant),
        )
}

/// Lists tenants for a building. When `month` and `year` are given, exited
/// tenants are filtered by the lifecycle rule (visible through their exit
/// month) and each row carries its resolved payment status for that period.
async fn list_tenants(
    State(state): State<AppState>,
    Query(query): Query<TenantsQuery>,
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
    if let Some(status) = non_empty_opt(query.status.as_deref()) {
        filters.insert("status".to_string(), Value::String(status));
    }
    if let Some(flat_no) = non_empty_opt(query.flat_no.as_deref()) {
        filters.insert("flat_no".to_string(), Value::String(flat_no));
    }

    let mut rows = list_rows(
        pool,
        "tenants",
        Some(&filters),
        clamp_limit_in_range(query.limit, 1, 2000),
        0,
        "flat_no",
        true,
    )
    .await?;

    let (Some(month), Some(year)) = (query.month, query.year) else {
        return Ok(Json(json!({ "data": rows })));
    };
    if !(1..=12).contains(&month) {
        return Err(AppError::BadRequest("month must be 1-12.".to_string()));
    }

    rows.retain(|row| ledger::tenant_visible_in_month(row, month, year));

    let mut payment_filters = Map::new();
    payment_filters.insert(
        "building_id".to_string(),
        Value::String(query.building_id.clone()),
    );
    payment_filters.insert("month".to_string(), json!(month));
    payment_filters.insert("year".to_string(), json!(year));
    let payments = list_rows(
        pool,
        "rent_payments",
        Some(&payment_filters),
        5000,
        0,
        "created_at",
        false,
    )
    .await?;

    let data = rows
        .into_iter()
        .map(|mut row| {
            let tenant_id = value_str(&row, "id");
            let status = ledger::resolve_payment_status(&tenant_id, month, year, &payments);
            if let Some(object) = row.as_object_mut() {
                object.insert(
                    "payment_status".to_string(),
                    serde_json::to_value(&status).unwrap_or(Value::Null),
                );
            }
            row
        })
        .collect::<Vec<_>>();

    Ok(Json(json!({ "data": data, "month": month, "year": year })))
}

async fn create_tenant(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<CreateTenantInput>,
) -> AppResult<impl IntoResponse> {
    let user_id = require_user_id(&state, &headers).await?;
    validate_input(&payload)?;
    assert_building_role(&state, &user_id, &payload.building_id, STAFF_ROLES).await?;
    let pool = db_pool(&state)?;

    let mut record = remove_nulls(serialize_to_map(&payload));
    record.insert("status".to_string(), Value::String("active".to_string()));
    if !record.contains_key("joined_date") {
        record.insert(
            "joined_date".to_string(),
            Value::String(Utc::now().date_naive().to_string()),
        );
    }
    record.insert(
        "created_by_user_id".to_string(),
        Value::String(user_id.clone()),
    );

    let created = create_row(pool, "tenants", &record).await?;
    let entity_id = value_str(&created, "id");

    write_activity_log(
        state.db_pool.as_ref(),
        Some(&payload.building_id),
        Some(&user_id),
        "create",
        "tenants",
        Some(&entity_id),
        Some(json!({ "flat_no": payload.flat_no })),
    )
    .await;

    Ok((axum::http::StatusCode::CREATED, Json(created)))
}

async fn get_tenant(
    State(state): State<AppState>,
    Path(path): Path<TenantPath>,
    headers: HeaderMap,
) -> AppResult<Json<Value>> {
    let user_id = require_user_id(&state, &headers).await?;
    let pool = db_pool(&state)?;

    let record = get_row(pool, "tenants", &path.tenant_id, "id").await?;
    let building_id = value_str(&record, "building_id");
    assert_building_member(&state, &user_id, &building_id).await?;

    Ok(Json(record))
}

async fn update_tenant(
    State(state): State<AppState>,
    Path(path): Path<TenantPath>,
    headers: HeaderMap,
    Json(payload): Json<UpdateTenantInput>,
) -> AppResult<Json<Value>> {
    let user_id = require_user_id(&state, &headers).await?;
    let pool = db_pool(&state)?;

    let record = get_row(pool, "tenants", &path.tenant_id, "id").await?;
    let building_id = value_str(&record, "building_id");
    assert_building_role(&state, &user_id, &building_id, STAFF_ROLES).await?;

    let patch = remove_nulls(serialize_to_map(&payload));
    let updated = update_row(pool, "tenants", &path.tenant_id, &patch, "id").await?;

    write_activity_log(
        state.db_pool.as_ref(),
        Some(&building_id),
        Some(&user_id),
        "update",
        "tenants",
        Some(&path.tenant_id),
        None,
    )
    .await;

    Ok(Json(updated))
}

/// Marks a tenant as exited. The tenant stays visible in historical month
/// views through the exit month; payment rows are never touched.
async fn move_out_tenant(
    State(state): State<AppState>,
    Path(path): Path<TenantPath>,
    headers: HeaderMap,
    Json(payload): Json<MoveOutInput>,
) -> AppResult<Json<Value>> {
    let user_id = require_user_id(&state, &headers).await?;
    let pool = db_pool(&state)?;

    let record = get_row(pool, "tenants", &path.tenant_id, "id").await?;
    let building_id = value_str(&record, "building_id");
    assert_building_role(&state, &user_id, &building_id, STAFF_ROLES).await?;

    if value_str(&record, "status").eq_ignore_ascii_case("exited") {
        return Err(AppError::Conflict(
            "Tenant has already moved out.".to_string(),
        ));
    }

    let exit_date = non_empty_opt(payload.exit_date.as_deref())
        .unwrap_or_else(|| Utc::now().date_naive().to_string());

    let mut patch = Map::new();
    patch.insert("status".to_string(), Value::String("exited".to_string()));
    patch.insert("exit_date".to_string(), Value::String(exit_date.clone()));

    let updated = update_row(pool, "tenants", &path.tenant_id, &patch, "id").await?;

    write_activity_log(
        state.db_pool.as_ref(),
        Some(&building_id),
        Some(&user_id),
        "move_out",
        "tenants",
        Some(&path.tenant_id),
        Some(json!({ "exit_date": exit_date })),
    )
    .await;

    Ok(Json(updated))
}

async fn delete_tenant(
    State(state): State<AppState>,
    Path(path): Path<TenantPath>,
    headers: HeaderMap,
) -> AppResult<Json<Value>> {
    let user_id = require_user_id(&state, &headers).await?;
    let pool = db_pool(&state)?;

    let record = get_row(pool, "tenants", &path.tenant_id, "id").await?;
    let building_id = value_str(&record, "building_id");
    assert_building_role(&state, &user_id, &building_id, STAFF_ROLES).await?;

    let deleted = delete_row(pool, "tenants", &path.tenant_id, "id").await?;

    write_activity_log(
        state.db_pool.as_ref(),
        Some(&building_id),
        Some(&user_id),
        "delete",
        "tenants",
        Some(&path.tenant_id),
        None,
    )
    .await;

    Ok(Json(deleted))
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
