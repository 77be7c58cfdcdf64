use axum::{
    extract::{Path, State},
    http::HeaderMap,
    response::IntoResponse,
    Json,
};
use serde_json::{json, Map, Value};

use crate::{
    auth::require_user,
    error::{AppError, AppResult},
    repository::table_service::{create_row, get_row, list_rows},
    schemas::{validate_input, AddBuildingMemberInput, BuildingPath, CreateBuildingInput},
    services::audit::write_activity_log,
    state::AppState,
    tenancy::{
        assert_building_member, assert_building_role, ensure_app_user,
        ensure_building_membership, list_user_buildings, ROLE_MANAGER, ROLE_OWNER, ROLE_TENANT,
    },
};

pub fn router() -> axum::Router<AppState> {
    axum::Router::new()
        .route(
            "/buildings",
            axum::routing::get(list_buildings).post(create_building),
        )
        .route("/buildings/{building_id}", axum::routing::get(get_building))
        .route(
            "/buildings/{building_id}/members",
            axum::routing::get(list_members).post(add_member),
        )
}

async fn create_building(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<CreateBuildingInput>,
) -> AppResult<impl IntoResponse> {
    let user = require_user(&state, &headers).await?;
    validate_input(&payload)?;
    ensure_app_user(&state, &user).await?;
    let pool = db_pool(&state)?;

    let mut record = Map::new();
    record.insert("name".to_string(), Value::String(payload.name.clone()));
    if let Some(address) = non_empty_opt(payload.address.as_deref()) {
        record.insert("address".to_string(), Value::String(address));
    }
    record.insert(
        "created_by_user_id".to_string(),
        Value::String(user.id.clone()),
    );

    let created = create_row(pool, "buildings", &record).await?;
    let building_id = value_str(&created, "id");

    // The creator becomes the building owner.
    ensure_building_membership(&state, &building_id, &user.id, ROLE_OWNER).await?;

    write_activity_log(
        state.db_pool.as_ref(),
        Some(&building_id),
        Some(&user.id),
        "create",
        "buildings",
        Some(&building_id),
        None,
    )
    .await;

    Ok((axum::http::StatusCode::CREATED, Json(created)))
}

async fn list_buildings(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> AppResult<Json<Value>> {
    let user = require_user(&state, &headers).await?;
    let buildings = list_user_buildings(&state, &user.id).await?;
    Ok(Json(json!({ "data": buildings })))
}

async fn get_building(
    State(state): State<AppState>,
    Path(path): Path<BuildingPath>,
    headers: HeaderMap,
) -> AppResult<Json<Value>> {
    let user = require_user(&state, &headers).await?;
    assert_building_member(&state, &user.id, &path.building_id).await?;
    let pool = db_pool(&state)?;

    let record = get_row(pool, "buildings", &path.building_id, "id").await?;
    Ok(Json(record))
}

async fn list_members(
    State(state): State<AppState>,
    Path(path): Path<BuildingPath>,
    headers: HeaderMap,
) -> AppResult<Json<Value>> {
    let user = require_user(&state, &headers).await?;
    assert_building_member(&state, &user.id, &path.building_id).await?;
    let pool = db_pool(&state)?;

    let mut filters = Map::new();
    filters.insert(
        "building_id".to_string(),
        Value::String(path.building_id.clone()),
    );
    let rows = list_rows(
        pool,
        "building_members",
        Some(&filters),
        500,
        0,
        "created_at",
        true,
    )
    .await?;
    Ok(Json(json!({ "data": rows })))
}

async fn add_member(
    State(state): State<AppState>,
    Path(path): Path<BuildingPath>,
    headers: HeaderMap,
    Json(payload): Json<AddBuildingMemberInput>,
) -> AppResult<impl IntoResponse> {
    let user = require_user(&state, &headers).await?;
    // Only the owner can grant or change roles.
    assert_building_role(&state, &user.id, &path.building_id, &[ROLE_OWNER]).await?;

    let role = payload.role.trim().to_ascii_lowercase();
    if ![ROLE_OWNER, ROLE_MANAGER, ROLE_TENANT].contains(&role.as_str()) {
        return Err(AppError::BadRequest(format!(
            "Unknown role '{role}'. Expected owner, manager, or tenant."
        )));
    }

    ensure_building_membership(&state, &path.building_id, &payload.user_id, &role).await?;

    write_activity_log(
        state.db_pool.as_ref(),
        Some(&path.building_id),
        Some(&user.id),
        "add_member",
        "building_members",
        Some(&payload.user_id),
        Some(json!({ "role": role })),
    )
    .await;

    Ok((
        axum::http::StatusCode::CREATED,
        Json(json!({
            "building_id": path.building_id,
            "user_id": payload.user_id,
            "role": role,
        })),
    ))
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
