//! Time entry API handlers

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use chrono::NaiveDate;
use ops_core::traits::Id;
use ops_db::TimeEntryFilter;
use ops_models::time_entry::{TimeEntry, TimeEntryStatus};
use ops_timer::{EntryChanges, OpenTimerPolicy};
use serde::{Deserialize, Serialize};

use crate::error::{ApiError, ApiResult};
use crate::extractors::{AppState, Collection, Pagination};

/// POST /api/v1/time-entries
///
/// Starts a timer. The default policy rejects a second open timer for the
/// employee with a 409; `"policy": "auto_stop_previous"` opts into stopping
/// the old one instead.
pub async fn start_time_entry(
    State(state): State<AppState>,
    Json(dto): Json<StartTimeEntryDto>,
) -> ApiResult<impl IntoResponse> {
    let entry = state
        .timer
        .start(
            dto.employee_id,
            dto.project_id,
            dto.category_id,
            dto.billable.unwrap_or(true),
            dto.policy.unwrap_or_default(),
        )
        .await?;
    Ok((StatusCode::CREATED, Json(entry)))
}

/// PUT /api/v1/time-entries/:id
///
/// Either a timer action (`{"action": "pause" | "resume" | "stop"}`) or a
/// set of field edits, never both in one request.
pub async fn update_time_entry(
    State(state): State<AppState>,
    Path(id): Path<Id>,
    Json(dto): Json<UpdateTimeEntryDto>,
) -> ApiResult<Json<TimeEntry>> {
    if let Some(action) = dto.action {
        if dto.has_field_edits() {
            return Err(ApiError::bad_request(
                "A timer action cannot be combined with field edits",
            ));
        }
        let entry = match action {
            TimerAction::Pause => state.timer.pause(id).await?,
            TimerAction::Resume => state.timer.resume(id).await?,
            TimerAction::Stop => state.timer.stop(id).await?,
        };
        return Ok(Json(entry));
    }

    let changes = EntryChanges {
        date: dto.date,
        category_id: dto.category_id,
        billable: dto.billable,
        duration_minutes: dto.duration_minutes,
        description: dto.description,
    };
    let entry = state.timer.edit(id, changes).await?;
    Ok(Json(entry))
}

/// DELETE /api/v1/time-entries/:id
pub async fn delete_time_entry(
    State(state): State<AppState>,
    Path(id): Path<Id>,
) -> ApiResult<StatusCode> {
    state.timer.delete(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// GET /api/v1/time-entries
pub async fn list_time_entries(
    State(state): State<AppState>,
    pagination: Pagination,
    Query(filters): Query<TimeEntryFilters>,
) -> ApiResult<Json<Collection<TimeEntry>>> {
    let filter = TimeEntryFilter {
        employee_id: filters.employee_id,
        project_id: filters.project_id,
        status: filters.status,
        from: filters.from,
        to: filters.to,
    };
    let result = state.entries.list(&filter, pagination.0).await?;
    Ok(Json(result.into()))
}

/// GET /api/v1/time-entries/:id
pub async fn get_time_entry(
    State(state): State<AppState>,
    Path(id): Path<Id>,
) -> ApiResult<Json<TimeEntry>> {
    let entry = state
        .entries
        .find_by_id(id)
        .await?
        .ok_or_else(|| ApiError::not_found(format!("Time entry {id} not found")))?;
    Ok(Json(entry))
}

/// POST /api/v1/time-entries/sweep-stale
pub async fn sweep_stale(State(state): State<AppState>) -> ApiResult<Json<SweepResponse>> {
    let entries = state.timer.sweep_stale().await?;
    Ok(Json(SweepResponse {
        stopped: entries.len(),
        entries,
    }))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartTimeEntryDto {
    pub employee_id: Id,
    pub project_id: Id,
    pub category_id: Id,
    pub billable: Option<bool>,
    pub policy: Option<OpenTimerPolicy>,
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimerAction {
    Pause,
    Resume,
    Stop,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateTimeEntryDto {
    pub action: Option<TimerAction>,
    pub date: Option<NaiveDate>,
    pub category_id: Option<Id>,
    pub billable: Option<bool>,
    pub duration_minutes: Option<i64>,
    pub description: Option<String>,
}

impl UpdateTimeEntryDto {
    fn has_field_edits(&self) -> bool {
        self.date.is_some()
            || self.category_id.is_some()
            || self.billable.is_some()
            || self.duration_minutes.is_some()
            || self.description.is_some()
    }
}

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct TimeEntryFilters {
    pub employee_id: Option<Id>,
    pub project_id: Option<Id>,
    pub status: Option<TimeEntryStatus>,
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SweepResponse {
    pub stopped: usize,
    pub entries: Vec<TimeEntry>,
}
