//! Axum extractors and shared response shapes

use std::sync::Arc;

use axum::{
    async_trait,
    extract::{FromRequestParts, Query},
    http::request::Parts,
};
use ops_billing::InvoiceService;
use ops_db::{PaginatedResult, TimeEntryStore};
use ops_notifications::NotificationSink;
use ops_payroll::PayrollEngine;
use ops_timer::TimerEngine;
use serde::{Deserialize, Serialize};

use crate::error::ApiError;

/// Application state shared by every handler.
///
/// Engines own the write paths; the store and sink handles cover plain
/// reads that have no engine logic attached.
#[derive(Clone)]
pub struct AppState {
    pub timer: Arc<TimerEngine>,
    pub invoices: Arc<InvoiceService>,
    pub payroll: Arc<PayrollEngine>,
    pub entries: Arc<dyn TimeEntryStore>,
    pub notifications: Arc<dyn NotificationSink>,
}

/// Pagination query parameters
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaginationParams {
    #[serde(default = "default_page_size")]
    pub page_size: i64,
    #[serde(default)]
    pub offset: i64,
}

fn default_page_size() -> i64 {
    20
}

impl Default for PaginationParams {
    fn default() -> Self {
        Self {
            page_size: 20,
            offset: 0,
        }
    }
}

pub struct Pagination(pub ops_db::Pagination);

#[async_trait]
impl<S> FromRequestParts<S> for Pagination
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Query(params) = Query::<PaginationParams>::from_request_parts(parts, state)
            .await
            .map_err(|e| ApiError::bad_request(format!("Invalid pagination: {e}")))?;
        Ok(Pagination(ops_db::Pagination::new(
            params.page_size,
            params.offset,
        )))
    }
}

/// Paged collection envelope for list endpoints.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Collection<T> {
    pub total: i64,
    pub count: usize,
    pub page_size: i64,
    pub offset: i64,
    pub items: Vec<T>,
}

impl<T> From<PaginatedResult<T>> for Collection<T> {
    fn from(result: PaginatedResult<T>) -> Self {
        Self {
            total: result.total,
            count: result.items.len(),
            page_size: result.limit,
            offset: result.offset,
            items: result.items,
        }
    }
}
