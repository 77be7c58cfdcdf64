use axum::{
    extract::{Query, State},
    http::HeaderMap,
    Json,
};
use serde_json::{json, Map, Value};

use crate::{
    auth::require_user_id,
    error::{AppError, AppResult},
    repository::table_service::list_rows,
    schemas::{clamp_limit_in_range, ActivityLogsQuery},
    state::AppState,
    tenancy::{assert_building_role, STAFF_ROLES},
};

pub fn router() -> axum::Router<AppState> {
    axum::Router::new().route("/activity-logs", axum::routing::get(list_activity_logs))
}

async fn list_activity_logs(
    State(state): State<AppState>,
    Query(query): Query<ActivityLogsQuery>,
    headers: HeaderMap,
) -> AppResult<Json<Value>> {
    let user_id = require_user_id(&state, &headers).await?;
    assert_building_role(&state, &user_id, &query.building_id, STAFF_ROLES).await?;
    let pool = db_pool(&state)?;

    let mut filters = Map::new();
    filters.insert(
        "building_id".to_string(),
        Value::String(query.building_id.clone()),
    );

    let rows = list_rows(
        pool,
        "activity_logs",
        Some(&filters),
        clamp_limit_in_range(query.limit, 1, 500),
        0,
        "created_at",
        false,
    )
    .await?;

    Ok(Json(json!({ "data": rows })))
}

fn db_pool(state: &AppState) -> AppResult<&sqlx::PgPool> {
    state.db_pool.as_ref().ok_or_else(|| {
        AppError::Dependency("Database is not configured. Set DATABASE_URL.".to_string())
    })
}
