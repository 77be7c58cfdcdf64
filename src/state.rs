use std::sync::Arc;
use std::time::Duration;

use moka::future::Cache;
use serde_json::Value;
use sqlx::PgPool;

use crate::config::AppConfig;
use crate::db;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub db_pool: Option<PgPool>,
    /// (user_id, building_id) -> membership row. A short TTL keeps role
    /// changes visible without hitting the database on every request.
    pub membership_cache: Cache<(String, String), Option<Value>>,
}

impl AppState {
    pub fn build(config: AppConfig) -> Result<Self, Box<dyn std::error::Error>> {
        let db_pool = db::build_pool(&config);
        if db_pool.is_none() {
            tracing::warn!("DATABASE_URL is not set — data routes will return 502");
        }

        let membership_cache = Cache::builder()
            .time_to_live(Duration::from_secs(config.membership_cache_ttl_seconds))
            .max_capacity(config.membership_cache_max_entries)
            .build();

        Ok(Self {
            config: Arc::new(config),
            db_pool,
            membership_cache,
        })
    }
}
