//! Invoice service
//!
//! Manual invoice management behind `POST /invoices` and `PUT /invoices/:id`.
//! Automator-drafted and hand-created invoices share this persistence path
//! and differ only by `created_by`.

use std::sync::Arc;

use chrono::{Datelike, Duration};
use ops_core::config::BillingConfig;
use ops_core::traits::Id;
use ops_core::Clock;
use ops_db::{
    ClientStore, InvoiceStore, PaginatedResult, Pagination, ProjectStore, StoreError,
};
use ops_models::{CreateInvoiceDto, Invoice, InvoiceStatus, UpdateInvoiceDto};
use thiserror::Error;
use validator::Validate;

/// Billing errors
#[derive(Debug, Error)]
pub enum BillingError {
    #[error("Invoice {0} not found")]
    InvoiceNotFound(Id),

    #[error("Project {0} not found")]
    ProjectNotFound(Id),

    #[error("Client {0} not found")]
    ClientNotFound(Id),

    #[error("Unknown invoice status '{0}'")]
    UnknownStatus(String),

    #[error("Invoice {id} is {} and can no longer be edited", status.as_str())]
    NotEditable { id: Id, status: InvoiceStatus },

    #[error("Invoice {0} is not a draft; its line items are frozen")]
    ItemsFrozen(Id),

    #[error("Invoice status cannot change from {} to {}", from.as_str(), to.as_str())]
    InvalidTransition {
        from: InvoiceStatus,
        to: InvoiceStatus,
    },

    #[error(transparent)]
    Validation(#[from] validator::ValidationErrors),

    #[error(transparent)]
    Store(#[from] StoreError),
}

pub type BillingResult<T> = Result<T, BillingError>;

/// Formats an invoice number from the issue year and the backing sequence.
pub(crate) fn invoice_number(year: i32, sequence: i64) -> String {
    format!("INV-{year}-{sequence:05}")
}

/// Invoice service
pub struct InvoiceService {
    invoices: Arc<dyn InvoiceStore>,
    projects: Arc<dyn ProjectStore>,
    clients: Arc<dyn ClientStore>,
    clock: Arc<dyn Clock>,
    config: BillingConfig,
}

impl InvoiceService {
    pub fn new(
        invoices: Arc<dyn InvoiceStore>,
        projects: Arc<dyn ProjectStore>,
        clients: Arc<dyn ClientStore>,
        clock: Arc<dyn Clock>,
        config: &BillingConfig,
    ) -> Self {
        Self {
            invoices,
            projects,
            clients,
            clock,
            config: config.clone(),
        }
    }

    pub async fn get(&self, id: Id) -> BillingResult<Invoice> {
        self.invoices
            .find_by_id(id)
            .await?
            .ok_or(BillingError::InvoiceNotFound(id))
    }

    pub async fn list(
        &self,
        status: Option<InvoiceStatus>,
        pagination: Pagination,
    ) -> BillingResult<PaginatedResult<Invoice>> {
        Ok(self.invoices.list(status, pagination).await?)
    }

    /// Create a draft invoice by hand. Dates default to today and
    /// today + the configured due window.
    pub async fn create(
        &self,
        dto: CreateInvoiceDto,
        created_by: impl Into<String>,
    ) -> BillingResult<Invoice> {
        dto.validate()?;

        let project = self
            .projects
            .find_by_id(dto.project_id)
            .await?
            .ok_or(BillingError::ProjectNotFound(dto.project_id))?;
        let client = self
            .clients
            .find_by_id(project.client_id)
            .await?
            .ok_or(BillingError::ClientNotFound(project.client_id))?;

        let issue_date = dto
            .issue_date
            .unwrap_or_else(|| self.clock.now().date_naive());
        let due_date = dto
            .due_date
            .unwrap_or(issue_date + Duration::days(self.config.due_days));

        let sequence = self.invoices.next_invoice_sequence().await?;
        let mut invoice = Invoice::draft(
            invoice_number(issue_date.year(), sequence),
            dto.project_id,
            project.client_id,
            client.name,
            issue_date,
            due_date,
            project.currency,
            created_by,
        );
        invoice.notes = dto.notes;
        invoice.replace_items(dto.items, self.config.tax_rate);

        let created = self.invoices.insert(&invoice).await?;
        tracing::info!(invoice_id = ?created.id, number = %created.number, "invoice created");
        Ok(created)
    }

    /// Apply field edits and status transitions to an invoice.
    ///
    /// Paid and Void invoices are immutable. Line items may only be replaced
    /// while the invoice is still a draft; recorded payments adjust the
    /// balance instead.
    pub async fn update(&self, id: Id, dto: UpdateInvoiceDto) -> BillingResult<Invoice> {
        dto.validate()?;

        let mut invoice = self.get(id).await?;
        if matches!(invoice.status, InvoiceStatus::Paid | InvoiceStatus::Void) {
            return Err(BillingError::NotEditable {
                id,
                status: invoice.status,
            });
        }

        if let Some(items) = dto.items {
            if !invoice.is_draft() {
                return Err(BillingError::ItemsFrozen(id));
            }
            invoice.items = items;
        }
        if let Some(due_date) = dto.due_date {
            invoice.due_date = due_date;
        }
        if let Some(notes) = dto.notes {
            invoice.notes = Some(notes);
        }
        if let Some(paid_amount) = dto.paid_amount {
            invoice.paid_amount = paid_amount;
        }
        if let Some(ref status) = dto.status {
            let to = parse_status(status)?;
            if to != invoice.status {
                let allowed = matches!(
                    (invoice.status, to),
                    (InvoiceStatus::Draft, InvoiceStatus::Sent)
                        | (InvoiceStatus::Draft, InvoiceStatus::Void)
                        | (InvoiceStatus::Sent, InvoiceStatus::Paid)
                        | (InvoiceStatus::Sent, InvoiceStatus::Void)
                );
                if !allowed {
                    return Err(BillingError::InvalidTransition {
                        from: invoice.status,
                        to,
                    });
                }
                invoice.status = to;
            }
        }

        invoice.recompute_totals(self.config.tax_rate);
        let updated = self.invoices.update(&invoice).await?;
        tracing::info!(invoice_id = id, status = updated.status.as_str(), "invoice updated");
        Ok(updated)
    }
}

/// Strict status parse for client-supplied transitions; unknown values are an
/// error, not a fallback.
fn parse_status(s: &str) -> BillingResult<InvoiceStatus> {
    match s {
        "draft" => Ok(InvoiceStatus::Draft),
        "sent" => Ok(InvoiceStatus::Sent),
        "paid" => Ok(InvoiceStatus::Paid),
        "void" => Ok(InvoiceStatus::Void),
        other => Err(BillingError::UnknownStatus(other.to_string())),
    }
}
