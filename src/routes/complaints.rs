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
        clamp_limit_in_range, validate_input, ComplaintPath, ComplaintsQuery, CreateComplaintInput,
    },
    services::audit::write_activity_log,
    state::AppState,
    tenancy::{assert_building_member, assert_building_role, STAFF_ROLES},
};

pub fn router() -> axum::Router<AppState> {
    axum::Router::new()
        .route(
            "/complaints",
            axum::routing::get(list_complaints).post(create_complaint),
        )
        .route(
            "/complaints/{complaint_id}",
            axum::routing::get(get_complaint),
        )
        .route(
            "/complaints/{complaint_id}/resolve",
            axum::routing::post(resolve_complaint),
        )
}

async fn list_complaints(
    State(state): State<AppState>,
    Query(query): Query<ComplaintsQuery>,
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
    if let Some(tenant_id) = query
        .tenant_id
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
    {
        filters.insert("tenant_id".to_string(), Value::String(tenant_id.to_string()));
    }

    let rows = list_rows(
        pool,
        "complaints",
        Some(&filters),
        clamp_limit_in_range(query.limit, 1, 1000),
        0,
        "created_at",
        false,
    )
    .await?;

    Ok(Json(json!({ "data": rows })))
}

async fn create_complaint(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<CreateComplaintInput>,
) -> AppResult<impl IntoResponse> {
    let user_id = require_user_id(&state, &headers).await?;
    validate_input(&payload)?;
    assert_building_member(&state, &user_id, &payload.building_id).await?;
    let pool = db_pool(&state)?;

    let mut record = Map::new();
    record.insert(
        "building_id".to_string(),
        Value::String(payload.building_id.clone()),
    );
    record.insert(
        "subject".to_string(),
        Value::String(payload.subject.trim().to_string()),
    );
    if let Some(body) = payload.body.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
        record.insert("body".to_string(), Value::String(body.to_string()));
    }
    record.insert("status".to_string(), Value::String("open".to_string()));
    record.insert(
        "created_by_user_id".to_string(),
        Value::String(user_id.clone()),
    );

    // If the caller is a registered tenant of this building, link the
    // complaint to their tenant record so staff see which flat it came from.
    if let Some(tenant_id) = find_tenant_id(pool, &payload.building_id, &user_id).await? {
        record.insert("tenant_id".to_string(), Value::String(tenant_id));
    }

    let created = create_row(pool, "complaints", &record).await?;
    let entity_id = value_str(&created, "id");

    write_activity_log(
        state.db_pool.as_ref(),
        Some(&payload.building_id),
        Some(&user_id),
        "create",
        "complaints",
        Some(&entity_id),
        None,
    )
    .await;

    Ok((axum::http::StatusCode::CREATED, Json(created)))
}

async fn get_complaint(
    State(state): State<AppState>,
    Path(path): Path<ComplaintPath>,
    headers: HeaderMap,
) -> AppResult<Json<Value>> {
    let user_id = require_user_id(&state, &headers).await?;
    let pool = db_pool(&state)?;

    let record = get_row(pool, "complaints", &path.complaint_id, "id").await?;
    let building_id = value_str(&record, "building_id");
    assert_building_member(&state, &user_id, &building_id).await?;

    Ok(Json(record))
}

async fn resolve_complaint(
    State(state): State<AppState>,
    Path(path): Path<ComplaintPath>,
    headers: HeaderMap,
) -> AppResult<Json<Value>> {
    let user_id = require_user_id(&state, &headers).await?;
    let pool = db_pool(&state)?;

    let record = get_row(pool, "complaints", &path.complaint_id, "id").await?;
    let building_id = value_str(&record, "building_id");
    assert_building_role(&state, &user_id, &building_id, STAFF_ROLES).await?;

    let status = value_str(&record, "status").to_ascii_lowercase();
    if status == "resolved" {
        return Err(AppError::Conflict(
            "Complaint is already resolved.".to_string(),
        ));
    }

    let mut patch = Map::new();
    patch.insert("status".to_string(), Value::String("resolved".to_string()));
    patch.insert(
        "resolved_at".to_string(),
        Value::String(Utc::now().to_rfc3339()),
    );
    patch.insert(
        "resolved_by_user_id".to_string(),
        Value::String(user_id.clone()),
    );

    let updated = update_row(pool, "complaints", &path.complaint_id, &patch, "id").await?;

    write_activity_log(
        state.db_pool.as_ref(),
        Some(&building_id),
        Some(&user_id),
        "resolve",
        "complaints",
        Some(&path.complaint_id),
        None,
    )
    .await;

    Ok(Json(updated))
}

async fn find_tenant_id(
    pool: &sqlx::PgPool,
    building_id: &str,
    user_id: &str,
) -> AppResult<Option<String>> {
    let mut filters = Map::new();
    filters.insert(
        "building_id".to_string(),
        Value::String(building_id.to_string()),
    );
    filters.insert("user_id".to_string(), Value::String(user_id.to_string()));

    let rows = list_rows(pool, "tenants", Some(&filters), 1, 0, "created_at", false).await?;
    Ok(rows.first().map(|row| value_str(row, "id")).filter(|id| !id.is_empty()))
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
