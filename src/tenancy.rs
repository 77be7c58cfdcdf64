#![allow(dead_code)]

use serde_json::{json, Value};
use sqlx::{PgPool, Row};

use crate::{auth::AuthUser, error::AppError, state::AppState};

pub const ROLE_OWNER: &str = "owner";
pub const ROLE_MANAGER: &str = "manager";
pub const ROLE_TENANT: &str = "tenant";

/// Roles allowed to write building data (tenants, payments, expenses …).
pub const STAFF_ROLES: &[&str] = &[ROLE_OWNER, ROLE_MANAGER];

fn db_pool(state: &AppState) -> Result<&PgPool, AppError> {
    state.db_pool.as_ref().ok_or_else(|| {
        AppError::Dependency("Database is not configured. Set DATABASE_URL.".to_string())
    })
}

pub async fn get_building_membership(
    state: &AppState,
    user_id: &str,
    building_id: &str,
) -> Result<Option<Value>, AppError> {
    let cache_key = (user_id.to_string(), building_id.to_string());
    if let Some(cached) = state.membership_cache.get(&cache_key).await {
        return Ok(cached);
    }

    let pool = db_pool(state)?;
    let row = sqlx::query(
        "SELECT row_to_json(t) AS row
         FROM building_members t
         WHERE building_id = $1::uuid AND user_id = $2::uuid
         LIMIT 1",
    )
    .bind(building_id)
    .bind(user_id)
    .fetch_optional(pool)
    .await
    .map_err(|error| AppError::Dependency(format!("Database request failed: {error}")))?;

    let membership =
        row.and_then(|value| value.try_get::<Option<Value>, _>("row").ok().flatten());
    state
        .membership_cache
        .insert(cache_key, membership.clone())
        .await;
    Ok(membership)
}

pub async fn assert_building_member(
    state: &AppState,
    user_id: &str,
    building_id: &str,
) -> Result<Value, AppError> {
    get_building_membership(state, user_id, building_id)
        .await?
        .ok_or_else(|| {
            AppError::Forbidden("Forbidden: not a member of this building.".to_string())
        })
}

pub async fn assert_building_role(
    state: &AppState,
    user_id: &str,
    building_id: &str,
    allowed_roles: &[&str],
) -> Result<Value, AppError> {
    let membership = assert_building_member(state, user_id, building_id).await?;
    let role = membership
        .get("role")
        .and_then(Value::as_str)
        .unwrap_or("unknown");

    if allowed_roles.contains(&role) {
        return Ok(membership);
    }

    Err(AppError::Forbidden(format!(
        "Forbidden: role '{role}' is not allowed for this action."
    )))
}

/// Upserts the app_users row for an authenticated user so foreign keys
/// (memberships, audit logs) always have a target.
pub async fn ensure_app_user(state: &AppState, user: &AuthUser) -> Result<Value, AppError> {
    if user.id.trim().is_empty() {
        return Err(AppError::Unauthorized(
            "Unauthorized: missing user.".to_string(),
        ));
    }

    let full_name = resolve_full_name(user);
    let pool = db_pool(state)?;

    sqlx::query(
        "INSERT INTO app_users (id, email, full_name)
         VALUES ($1::uuid, $2, $3)
         ON CONFLICT (id)
         DO UPDATE SET email = COALESCE(EXCLUDED.email, app_users.email),
                       full_name = COALESCE(EXCLUDED.full_name, app_users.full_name)",
    )
    .bind(&user.id)
    .bind(user.email.as_deref())
    .bind(&full_name)
    .execute(pool)
    .await
    .map_err(|error| AppError::Dependency(format!("Database request failed: {error}")))?;

    Ok(json!({
        "id": user.id,
        "email": user.email,
        "full_name": full_name
    }))
}

pub async fn list_user_building_ids(
    state: &AppState,
    user_id: &str,
) -> Result<Vec<String>, AppError> {
    let pool = db_pool(state)?;
    let rows = sqlx::query(
        "SELECT building_id::text AS building_id
         FROM building_members
         WHERE user_id = $1::uuid
         LIMIT 500",
    )
    .bind(user_id)
    .fetch_all(pool)
    .await
    .map_err(|error| AppError::Dependency(format!("Database request failed: {error}")))?;

    let mut building_ids = Vec::new();
    for row in rows {
        if let Ok(value) = row.try_get::<String, _>("building_id") {
            if !value.is_empty() {
                building_ids.push(value);
            }
        }
    }
    Ok(building_ids)
}

pub async fn list_user_buildings(
    state: &AppState,
    user_id: &str,
) -> Result<Vec<Value>, AppError> {
    let pool = db_pool(state)?;
    let building_ids = list_user_building_ids(state, user_id).await?;
    if building_ids.is_empty() {
        return Ok(Vec::new());
    }

    let rows = sqlx::query(
        "SELECT row_to_json(t) AS row
         FROM buildings t
         WHERE id = ANY($1::uuid[])
         LIMIT 500",
    )
    .bind(&building_ids)
    .fetch_all(pool)
    .await
    .map_err(|error| AppError::Dependency(format!("Database request failed: {error}")))?;

    let mut buildings = Vec::new();
    for row in rows {
        if let Ok(Some(item)) = row.try_get::<Option<Value>, _>("row") {
            buildings.push(item);
        }
    }
    Ok(buildings)
}

pub async fn ensure_building_membership(
    state: &AppState,
    building_id: &str,
    user_id: &str,
    role: &str,
) -> Result<(), AppError> {
    let pool = db_pool(state)?;
    sqlx::query(
        "INSERT INTO building_members (building_id, user_id, role)
         VALUES ($1::uuid, $2::uuid, $3)
         ON CONFLICT (building_id, user_id)
         DO UPDATE SET role = EXCLUDED.role",
    )
    .bind(building_id)
    .bind(user_id)
    .bind(role)
    .execute(pool)
    .await
    .map_err(|error| AppError::Dependency(format!("Database request failed: {error}")))?;

    // Role changes must be visible immediately, not after the cache TTL.
    state
        .membership_cache
        .invalidate(&(user_id.to_string(), building_id.to_string()))
        .await;
    Ok(())
}

fn resolve_full_name(user: &AuthUser) -> String {
    if let Some(name) = user
        .full_name
        .as_deref()
        .map(str::trim)
        .filter(|value| !value.is_empty())
    {
        return name.to_string();
    }

    user.email
        .as_deref()
        .and_then(|email| email.split('@').next())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(ToOwned::to_owned)
        .unwrap_or_else(|| "User".to_string())
}

#[cfg(test)]
mod tests {
    use super::resolve_full_name;
    use crate::auth::AuthUser;

    #[test]
    fn full_name_falls_back_to_email_local_part() {
        let user = AuthUser {
            id: "u1".to_string(),
            email: Some("karim@example.com".to_string()),
            full_name: None,
        };
        assert_eq!(resolve_full_name(&user), "karim");

        let anonymous = AuthUser {
            id: "u2".to_string(),
            email: None,
            full_name: None,
        };
        assert_eq!(resolve_full_name(&anonymous), "User");
    }
}
