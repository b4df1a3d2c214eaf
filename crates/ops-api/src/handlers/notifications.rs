//! Notification inbox handlers

use axum::{extract::Query, extract::State, Json};
use ops_notifications::{Audience, Notification};
use serde::Deserialize;

use crate::error::ApiResult;
use crate::extractors::AppState;

/// GET /api/v1/notifications
pub async fn list_notifications(
    State(state): State<AppState>,
    Query(filters): Query<NotificationFilters>,
) -> ApiResult<Json<Vec<Notification>>> {
    let notifications = state
        .notifications
        .list(filters.audience, filters.unread_only, filters.limit)
        .await?;
    Ok(Json(notifications))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationFilters {
    pub audience: Option<Audience>,
    #[serde(default)]
    pub unread_only: bool,
    #[serde(default = "default_limit")]
    pub limit: usize,
}

fn default_limit() -> usize {
    50
}
