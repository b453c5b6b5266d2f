pub mod assets;
pub mod auth;
pub mod cards;
pub mod error;
pub mod middleware;
pub mod profile;
pub mod provider;
pub mod routes;
pub mod service;

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{error, warn};

use cardwall_db::Database;

use crate::error::ApiError;

/// Run a blocking store call off the async runtime.
pub(crate) async fn db_task<F, T>(db: &Arc<Database>, f: F) -> Result<T, ApiError>
where
    F: FnOnce(&Database) -> cardwall_db::Result<T> + Send + 'static,
    T: Send + 'static,
{
    let db = db.clone();
    tokio::task::spawn_blocking(move || f(&db))
        .await
        .map_err(|e| {
            error!("spawn_blocking join error: {}", e);
            ApiError::Internal
        })?
        .map_err(ApiError::from)
}

pub(crate) fn parse_timestamp(raw: &str) -> DateTime<Utc> {
    raw.parse::<DateTime<Utc>>().unwrap_or_else(|e| {
        warn!("Corrupt timestamp '{}': {}", raw, e);
        DateTime::default()
    })
}
