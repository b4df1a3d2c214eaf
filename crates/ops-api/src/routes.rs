//! API routes

use axum::{
    routing::{delete, get, post, put},
    Json, Router,
};
use serde::Serialize;

use crate::extractors::AppState;
use crate::handlers::{invoices, notifications, payroll, time_entries};

/// Create the complete API router
pub fn router() -> Router<AppState> {
    Router::new().nest("/api/v1", api_v1_router())
}

fn api_v1_router() -> Router<AppState> {
    Router::new()
        .route("/", get(api_root))
        .nest("/time-entries", time_entries_router())
        .nest("/invoices", invoices_router())
        .nest("/payroll-runs", payroll_runs_router())
        .route("/payroll/calculate", post(payroll::calculate_payroll))
        .route("/notifications", get(notifications::list_notifications))
}

fn time_entries_router() -> Router<AppState> {
    Router::new()
        .route("/", get(time_entries::list_time_entries))
        .route("/", post(time_entries::start_time_entry))
        .route("/sweep-stale", post(time_entries::sweep_stale))
        .route("/:id", get(time_entries::get_time_entry))
        .route("/:id", put(time_entries::update_time_entry))
        .route("/:id", delete(time_entries::delete_time_entry))
}

fn invoices_router() -> Router<AppState> {
    Router::new()
        .route("/", get(invoices::list_invoices))
        .route("/", post(invoices::create_invoice))
        .route("/:id", get(invoices::get_invoice))
        .route("/:id", put(invoices::update_invoice))
}

fn payroll_runs_router() -> Router<AppState> {
    Router::new()
        .route("/", get(payroll::list_payroll_runs))
        .route("/:id", get(payroll::get_payroll_run))
        .route("/:id/records", get(payroll::get_payroll_records))
        .route("/:id/anomalies", get(payroll::get_payroll_anomalies))
        .route("/:id/lock", post(payroll::lock_payroll_run))
        .route("/:id/pay", post(payroll::pay_payroll_run))
}

async fn api_root() -> Json<ApiRoot> {
    Json(ApiRoot {
        name: "OpsConsole API".into(),
        version: "1".into(),
    })
}

#[derive(Serialize)]
struct ApiRoot {
    name: String,
    version: String,
}
