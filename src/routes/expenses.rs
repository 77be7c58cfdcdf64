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
    schemas::{
        clamp_limit_in_range, remove_nulls, serialize_to_map, validate_input, CreateExpenseInput,
        ExpensePath, ExpensesQuery,
    },
    services::audit::write_activity_log,
    state::AppState,
    tenancy::{assert_building_member, assert_building_role, STAFF_ROLES},
};

const EXPENSE_CATEGORIES: &[&str] = &["construction", "maintenance", "salary"];

pub fn router() -> axum::Router<AppState> {
    axum::Router::new()
        .route(
            "/expenses",
            axum::routing::get(list_expenses).post(create_expense),
        )
        .route(
            "/expenses/{expense_id}",
            axum::routing::get(get_expense).delete(delete_expense),
        )
}

async fn list_expenses(
    State(state): State<AppState>,
    Query(query): Query<ExpensesQuery>,
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
    if let Some(category) = non_empty_opt(query.category.as_deref()) {
        filters.insert(
            "category".to_string(),
            Value::String(category.to_ascii_lowercase()),
        );
    }
    if let Some(from_date) = non_empty_opt(query.from_date.as_deref()) {
        filters.insert("expense_date__gte".to_string(), Value::String(from_date));
    }
    if let Some(to_date) = non_empty_opt(query.to_date.as_deref()) {
        filters.insert("expense_date__lte".to_string(), Value::String(to_date));
    }

    let rows = list_rows(
        pool,
        "expenses",
        Some(&filters),
        clamp_limit_in_range(query.limit, 1, 2000),
        0,
        "expense_date",
        false,
    )
    .await?;

    Ok(Json(json!({ "data": rows })))
}

async fn create_expense(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<CreateExpenseInput>,
) -> AppResult<impl IntoResponse> {
    let user_id = require_user_id(&state, &headers).await?;
    validate_input(&payload)?;
    assert_building_role(&state, &user_id, &payload.building_id, STAFF_ROLES).await?;
    let pool = db_pool(&state)?;

    let category = payload.category.trim().to_ascii_lowercase();
    if !EXPENSE_CATEGORIES.contains(&category.as_str()) {
        return Err(AppError::UnprocessableEntity(format!(
            "Invalid category '{}'. Expected one of: {}.",
            payload.category,
            EXPENSE_CATEGORIES.join(", ")
        )));
    }

    let mut record = remove_nulls(serialize_to_map(&payload));
    record.insert("category".to_string(), Value::String(category));
    record.insert(
        "created_by_user_id".to_string(),
        Value::String(user_id.clone()),
    );

    let created = create_row(pool, "expenses", &record).await?;
    let entity_id = value_str(&created, "id");

    write_activity_log(
        state.db_pool.as_ref(),
        Some(&payload.building_id),
        Some(&user_id),
        "create",
        "expenses",
        Some(&entity_id),
        Some(json!({ "amount": payload.amount })),
    )
    .await;

    Ok((axum::http::StatusCode::CREATED, Json(created)))
}

async fn get_expense(
    State(state): State<AppState>,
    Path(path): Path<ExpensePath>,
    headers: HeaderMap,
) -> AppResult<Json<Value>> {
    let user_id = require_user_id(&state, &headers).await?;
    let pool = db_pool(&state)?;

    let record = get_row(pool, "expenses", &path.expense_id, "id").await?;
    let building_id = value_str(&record, "building_id");
    assert_building_member(&state, &user_id, &building_id).await?;

    Ok(Json(record))
}

async fn delete_expense(
    State(state): State<AppState>,
    Path(path): Path<ExpensePath>,
    headers: HeaderMap,
) -> AppResult<Json<Value>> {
    let user_id = require_user_id(&state, &headers).await?;
    let pool = db_pool(&state)?;

    let record = get_row(pool, "expenses", &path.expense_id, "id").await?;
    let building_id = value_str(&record, "building_id");
    assert_building_role(&state, &user_id, &building_id, STAFF_ROLES).await?;

    let deleted = delete_row(pool, "expenses", &path.expense_id, "id").await?;

    write_activity_log(
        state.db_pool.as_ref(),
        Some(&building_id),
        Some(&user_id),
        "delete",
        "expenses",
        Some(&path.expense_id),
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
