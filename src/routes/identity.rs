use axum::{extract::State, http::HeaderMap, Json};
use serde_json::{json, Value};

use crate::{
    auth::require_user,
    error::AppResult,
    state::AppState,
    tenancy::{ensure_app_user, list_user_buildings},
};

/// Returns the resolved user plus the buildings they belong to. Also upserts
/// the app_users row so first-time logins get a profile without a separate
/// signup call.
pub async fn me(State(state): State<AppState>, headers: HeaderMap) -> AppResult<Json<Value>> {
    let user = require_user(&state, &headers).await?;
    let profile = ensure_app_user(&state, &user).await?;
    let buildings = list_user_buildings(&state, &user.id).await?;

    Ok(Json(json!({
        "user": profile,
        "buildings": buildings,
    })))
}
