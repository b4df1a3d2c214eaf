//! Payroll API handlers

use axum::{
    extract::{Path, State},
    Json,
};
use ops_core::traits::Id;
use ops_models::{PayPeriod, PayrollRecord, PayrollRun};
use ops_payroll::Anomaly;
use serde::Deserialize;

use crate::error::{ApiError, ApiResult};
use crate::extractors::{AppState, Collection, Pagination};

/// POST /api/v1/payroll/calculate
///
/// Creates or rebuilds the draft run for the given `YYYY-MM` period. A
/// locked or paid run comes back unchanged.
pub async fn calculate_payroll(
    State(state): State<AppState>,
    Json(dto): Json<CalculatePayrollDto>,
) -> ApiResult<Json<PayrollRun>> {
    let period: PayPeriod = dto
        .period
        .parse()
        .map_err(|e: ops_models::PeriodParseError| ApiError::bad_request(e.to_string()))?;
    Ok(Json(state.payroll.calculate(period).await?))
}

/// GET /api/v1/payroll-runs
pub async fn list_payroll_runs(
    State(state): State<AppState>,
    pagination: Pagination,
) -> ApiResult<Json<Collection<PayrollRun>>> {
    let result = state.payroll.list_runs(pagination.0).await?;
    Ok(Json(result.into()))
}

/// GET /api/v1/payroll-runs/:id
pub async fn get_payroll_run(
    State(state): State<AppState>,
    Path(id): Path<Id>,
) -> ApiResult<Json<PayrollRun>> {
    Ok(Json(state.payroll.get_run(id).await?))
}

/// GET /api/v1/payroll-runs/:id/records
pub async fn get_payroll_records(
    State(state): State<AppState>,
    Path(id): Path<Id>,
) -> ApiResult<Json<Vec<PayrollRecord>>> {
    Ok(Json(state.payroll.records(id).await?))
}

/// GET /api/v1/payroll-runs/:id/anomalies
pub async fn get_payroll_anomalies(
    State(state): State<AppState>,
    Path(id): Path<Id>,
) -> ApiResult<Json<Vec<Anomaly>>> {
    Ok(Json(state.payroll.screen(id).await?))
}

/// POST /api/v1/payroll-runs/:id/lock
pub async fn lock_payroll_run(
    State(state): State<AppState>,
    Path(id): Path<Id>,
) -> ApiResult<Json<PayrollRun>> {
    Ok(Json(state.payroll.lock(id).await?))
}

/// POST /api/v1/payroll-runs/:id/pay
pub async fn pay_payroll_run(
    State(state): State<AppState>,
    Path(id): Path<Id>,
) -> ApiResult<Json<PayrollRun>> {
    Ok(Json(state.payroll.mark_paid(id).await?))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CalculatePayrollDto {
    pub period: String,
}
