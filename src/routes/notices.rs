use axum::{
    extract::{Path, Query, State},
    http::HeaderMap,
    response::IntoResponse,
    Json,
};
use serde_json::{json, Map, Value};

use crate::{
    auth::require_user_id,
    error::{AppError, AppResult},
    repository::table_service::{create_row, delete_row, get_row, list_rows},
    schemas::{clamp_limit_in_range, validate_input, CreateNoticeInput, NoticePath, NoticesQuery},
    services::audit::write_activity_log,
    state::AppState,
    tenancy::{assert_building_member, assert_building_role, STAFF_ROLES},
};

pub fn router() -> axum::Router<AppState> {
    axum::Router::new()
        .route(
            "/notices",
            axum::routing::get(list_notices).post(create_notice),
        )
        .route(
            "/notices/{notice_id}",
            axum::routing::get(get_notice).delete(delete_notice),
        )
}

async fn list_notices(
    State(state): State<AppState>,
    Query(query): Query<NoticesQuery>,
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

    let rows = list_rows(
        pool,
        "notices",
        Some(&filters),
        clamp_limit_in_range(query.limit, 1, 1000),
        0,
        "created_at",
        false,
    )
    .await?;

    Ok(Json(json!({ "data": rows })))
}

async fn create_notice(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<CreateNoticeInput>,
) -> AppResult<impl IntoResponse> {
    let user_id = require_user_id(&state, &headers).await?;
    validate_input(&payload)?;
    assert_building_role(&state, &user_id, &payload.building_id, STAFF_ROLES).await?;
    let pool = db_pool(&state)?;

    let mut record = Map::new();
    record.insert(
        "building_id".to_string(),
        Value::String(payload.building_id.clone()),
    );
    record.insert(
        "title".to_string(),
        Value::String(payload.title.trim().to_string()),
    );
    if let Some(body) = payload.body.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
        record.insert("body".to_string(), Value::String(body.to_string()));
    }
    record.insert(
        "posted_by_user_id".to_string(),
        Value::String(user_id.clone()),
    );

    let created = create_row(pool, "notices", &record).await?;
    let entity_id = value_str(&created, "id");

    write_activity_log(
        state.db_pool.as_ref(),
        Some(&payload.building_id),
        Some(&user_id),
        "create",
        "notices",
        Some(&entity_id),
        None,
    )
    .await;

    Ok((axum::http::StatusCode::CREATED, Json(created)))
}

async fn get_notice(
    State(state): State<AppState>,
    Path(path): Path<NoticePath>,
    headers: HeaderMap,
) -> AppResult<Json<Value>> {
    let user_id = require_user_id(&state, &headers).await?;
    let pool = db_pool(&state)?;

    let record = get_row(pool, "notices", &path.notice_id, "id").await?;
    let building_id = value_str(&record, "building_id");
    assert_building_member(&state, &user_id, &building_id).await?;

    Ok(Json(record))
}

async fn delete_notice(
    State(state): State<AppState>,
    Path(path): Path<NoticePath>,
    headers: HeaderMap,
) -> AppResult<Json<Value>> {
    let user_id = require_user_id(&state, &headers).await?;
    let pool = db_pool(&state)?;

    let record = get_row(pool, "notices", &path.notice_id, "id").await?;
    let building_id = value_str(&record, "building_id");
    assert_building_role(&state, &user_id, &building_id, STAFF_ROLES).await?;

    let deleted = delete_row(pool, "notices", &path.notice_id, "id").await?;

    write_activity_log(
        state.db_pool.as_ref(),
        Some(&building_id),
        Some(&user_id),
        "delete",
        "notices",
        Some(&path.notice_id),
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
