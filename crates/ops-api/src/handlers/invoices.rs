//! Invoice API handlers
//!
//! Manual invoices only; automator drafts arrive through the same store and
//! show up in these listings with their system `createdBy`.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use ops_core::traits::Id;
use ops_models::{CreateInvoiceDto, Invoice, InvoiceStatus, UpdateInvoiceDto};
use serde::Deserialize;

use crate::error::ApiResult;
use crate::extractors::{AppState, Collection, Pagination};

const MANUAL_ACTOR: &str = "Manual";

/// GET /api/v1/invoices
pub async fn list_invoices(
    State(state): State<AppState>,
    pagination: Pagination,
    Query(filters): Query<InvoiceFilters>,
) -> ApiResult<Json<Collection<Invoice>>> {
    let result = state.invoices.list(filters.status, pagination.0).await?;
    Ok(Json(result.into()))
}

/// GET /api/v1/invoices/:id
pub async fn get_invoice(
    State(state): State<AppState>,
    Path(id): Path<Id>,
) -> ApiResult<Json<Invoice>> {
    Ok(Json(state.invoices.get(id).await?))
}

/// POST /api/v1/invoices
pub async fn create_invoice(
    State(state): State<AppState>,
    Json(dto): Json<CreateInvoiceDto>,
) -> ApiResult<impl IntoResponse> {
    let invoice = state.invoices.create(dto, MANUAL_ACTOR).await?;
    Ok((StatusCode::CREATED, Json(invoice)))
}

/// PUT /api/v1/invoices/:id
pub async fn update_invoice(
    State(state): State<AppState>,
    Path(id): Path<Id>,
    Json(dto): Json<UpdateInvoiceDto>,
) -> ApiResult<Json<Invoice>> {
    Ok(Json(state.invoices.update(id, dto).await?))
}

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct InvoiceFilters {
    pub status: Option<InvoiceStatus>,
}
