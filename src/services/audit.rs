use serde_json::{Map, Value};
use sqlx::PgPool;

use crate::repository::table_service::create_row;

/// Fire-and-forget activity log write. Audit failures are logged and
/// swallowed so they never fail the user-facing request.
#[allow(clippy::too_many_arguments)]
pub async fn write_activity_log(
    pool: Option<&PgPool>,
    building_id: Option<&str>,
    actor_user_id: Option<&str>,
    action: &str,
    entity_type: &str,
    entity_id: Option<&str>,
    detail: Option<Value>,
) {
    let Some(pool) = pool else {
        return;
    };

    let mut record = Map::new();
    if let Some(building_id) = building_id.filter(|value| !value.trim().is_empty()) {
        record.insert(
            "building_id".to_string(),
            Value::String(building_id.to_string()),
        );
    }
    if let Some(actor) = actor_user_id.filter(|value| !value.trim().is_empty()) {
        record.insert(
            "actor_user_id".to_string(),
            Value::String(actor.to_string()),
        );
    }
    record.insert("action".to_string(), Value::String(action.to_string()));
    record.insert(
        "entity_type".to_string(),
        Value::String(entity_type.to_string()),
    );
    if let Some(entity_id) = entity_id.filter(|value| !value.trim().is_empty()) {
        record.insert(
            "entity_id".to_string(),
            Value::String(entity_id.to_string()),
        );
    }
    if let Some(detail) = detail {
        record.insert("detail".to_string(), detail);
    }

    if let Err(error) = create_row(pool, "activity_logs", &record).await {
        tracing::warn!(error = %error, action, entity_type, "Activity log write failed");
    }
}
