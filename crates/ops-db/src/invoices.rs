//! Invoice store
//!
//! Line items are stored in a JSONB column. Invoice numbers come from a
//! store-backed sequence so drafts keep their number across rewrites.

use std::sync::atomic::{AtomicI64, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use ops_core::traits::Id;
use ops_models::{Invoice, InvoiceStatus};
use sqlx::{FromRow, PgPool};
use tokio::sync::RwLock;

use crate::repository::{PaginatedResult, Pagination, StoreError, StoreResult};

const COLUMNS: &str = "id, number, project_id, client_id, client_name, status, issue_date, \
     due_date, items, subtotal, tax_amount, total_amount, paid_amount, balance_amount, \
     currency, created_by, notes, deleted_at, created_at, updated_at";

/// Invoice database row
#[derive(Debug, Clone, FromRow)]
pub struct InvoiceRow {
    pub id: i64,
    pub number: String,
    pub project_id: i64,
    pub client_id: i64,
    pub client_name: String,
    pub status: String,
    pub issue_date: NaiveDate,
    pub due_date: NaiveDate,
    pub items: serde_json::Value,
    pub subtotal: f64,
    pub tax_amount: f64,
    pub total_amount: f64,
    pub paid_amount: f64,
    pub balance_amount: f64,
    pub currency: String,
    pub created_by: String,
    pub notes: Option<String>,
    pub deleted_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<InvoiceRow> for Invoice {
    type Error = StoreError;

    fn try_from(row: InvoiceRow) -> Result<Self, Self::Error> {
        let items = if row.items.is_null() {
            Vec::new()
        } else {
            serde_json::from_value(row.items)?
        };

        Ok(Invoice {
            id: Some(row.id),
            number: row.number,
            project_id: row.project_id,
            client_id: row.client_id,
            client_name: row.client_name,
            status: InvoiceStatus::from_str(&row.status),
            issue_date: row.issue_date,
            due_date: row.due_date,
            items,
            subtotal: row.subtotal,
            tax_amount: row.tax_amount,
            total_amount: row.total_amount,
            paid_amount: row.paid_amount,
            balance_amount: row.balance_amount,
            currency: row.currency,
            created_by: row.created_by,
            notes: row.notes,
            deleted_at: row.deleted_at,
            created_at: Some(row.created_at),
            updated_at: Some(row.updated_at),
        })
    }
}

/// Invoice storage trait
///
/// Finders exclude soft-deleted rows.
#[async_trait]
pub trait InvoiceStore: Send + Sync {
    /// Find an invoice by ID
    async fn find_by_id(&self, id: Id) -> StoreResult<Option<Invoice>>;

    /// The project's current draft invoice, if one exists
    async fn find_draft_for_project(&self, project_id: Id) -> StoreResult<Option<Invoice>>;

    /// Next value of the invoice number sequence
    async fn next_invoice_sequence(&self) -> StoreResult<i64>;

    /// List invoices, newest first, optionally filtered by status
    async fn list(
        &self,
        status: Option<InvoiceStatus>,
        pagination: Pagination,
    ) -> StoreResult<PaginatedResult<Invoice>>;

    /// Insert a new invoice and return it with its assigned ID
    async fn insert(&self, invoice: &Invoice) -> StoreResult<Invoice>;

    /// Persist the invoice's current state
    async fn update(&self, invoice: &Invoice) -> StoreResult<Invoice>;
}

/// Postgres invoice store
pub struct PgInvoiceStore {
    pool: PgPool,
}

impl PgInvoiceStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl InvoiceStore for PgInvoiceStore {
    async fn find_by_id(&self, id: Id) -> StoreResult<Option<Invoice>> {
        let row = sqlx::query_as::<_, InvoiceRow>(&format!(
            "SELECT {COLUMNS} FROM invoices WHERE id = $1 AND deleted_at IS NULL"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(Invoice::try_from).transpose()
    }

    async fn find_draft_for_project(&self, project_id: Id) -> StoreResult<Option<Invoice>> {
        let row = sqlx::query_as::<_, InvoiceRow>(&format!(
            "SELECT {COLUMNS} FROM invoices \
             WHERE project_id = $1 AND status = 'draft' AND deleted_at IS NULL \
             ORDER BY id LIMIT 1"
        ))
        .bind(project_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(Invoice::try_from).transpose()
    }

    async fn next_invoice_sequence(&self) -> StoreResult<i64> {
        let next = sqlx::query_scalar::<_, i64>("SELECT nextval('invoice_number_seq')::bigint")
            .fetch_one(&self.pool)
            .await?;

        Ok(next)
    }

    async fn list(
        &self,
        status: Option<InvoiceStatus>,
        pagination: Pagination,
    ) -> StoreResult<PaginatedResult<Invoice>> {
        let pagination = pagination.clamped();
        let status = status.map(|s| s.as_str());

        let rows = sqlx::query_as::<_, InvoiceRow>(&format!(
            "SELECT {COLUMNS} FROM invoices \
             WHERE deleted_at IS NULL AND ($1::text IS NULL OR status = $1) \
             ORDER BY id DESC LIMIT $2 OFFSET $3"
        ))
        .bind(status)
        .bind(pagination.limit)
        .bind(pagination.offset)
        .fetch_all(&self.pool)
        .await?;

        let total = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM invoices \
             WHERE deleted_at IS NULL AND ($1::text IS NULL OR status = $1)",
        )
        .bind(status)
        .fetch_one(&self.pool)
        .await?;

        let items = rows
            .into_iter()
            .map(Invoice::try_from)
            .collect::<StoreResult<Vec<_>>>()?;

        Ok(PaginatedResult::new(items, total, pagination))
    }

    async fn insert(&self, invoice: &Invoice) -> StoreResult<Invoice> {
        let items = serde_json::to_value(&invoice.items)?;

        let row = sqlx::query_as::<_, InvoiceRow>(&format!(
            "INSERT INTO invoices ( \
                number, project_id, client_id, client_name, status, issue_date, due_date, \
                items, subtotal, tax_amount, total_amount, paid_amount, balance_amount, \
                currency, created_by, notes, created_at, updated_at \
             ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, NOW(), NOW()) \
             RETURNING {COLUMNS}"
        ))
        .bind(&invoice.number)
        .bind(invoice.project_id)
        .bind(invoice.client_id)
        .bind(&invoice.client_name)
        .bind(invoice.status.as_str())
        .bind(invoice.issue_date)
        .bind(invoice.due_date)
        .bind(items)
        .bind(invoice.subtotal)
        .bind(invoice.tax_amount)
        .bind(invoice.total_amount)
        .bind(invoice.paid_amount)
        .bind(invoice.balance_amount)
        .bind(&invoice.currency)
        .bind(&invoice.created_by)
        .bind(&invoice.notes)
        .fetch_one(&self.pool)
        .await?;

        Invoice::try_from(row)
    }

    async fn update(&self, invoice: &Invoice) -> StoreResult<Invoice> {
        let id = invoice
            .id
            .ok_or_else(|| StoreError::Conflict("cannot update an unsaved invoice".into()))?;
        let items = serde_json::to_value(&invoice.items)?;

        let row = sqlx::query_as::<_, InvoiceRow>(&format!(
            "UPDATE invoices SET \
                status = $1, issue_date = $2, due_date = $3, items = $4, subtotal = $5, \
                tax_amount = $6, total_amount = $7, paid_amount = $8, balance_amount = $9, \
                notes = $10, updated_at = NOW() \
             WHERE id = $11 AND deleted_at IS NULL \
             RETURNING {COLUMNS}"
        ))
        .bind(invoice.status.as_str())
        .bind(invoice.issue_date)
        .bind(invoice.due_date)
        .bind(items)
        .bind(invoice.subtotal)
        .bind(invoice.tax_amount)
        .bind(invoice.total_amount)
        .bind(invoice.paid_amount)
        .bind(invoice.balance_amount)
        .bind(&invoice.notes)
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| StoreError::NotFound(format!("Invoice with id {} not found", id)))?;

        Invoice::try_from(row)
    }
}

/// In-memory invoice store for tests
pub struct MemoryInvoiceStore {
    invoices: RwLock<Vec<Invoice>>,
    next_id: AtomicI64,
    next_number: AtomicI64,
}

impl Default for MemoryInvoiceStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryInvoiceStore {
    pub fn new() -> Self {
        Self {
            invoices: RwLock::new(Vec::new()),
            next_id: AtomicI64::new(1),
            next_number: AtomicI64::new(1),
        }
    }
}

#[async_trait]
impl InvoiceStore for MemoryInvoiceStore {
    async fn find_by_id(&self, id: Id) -> StoreResult<Option<Invoice>> {
        let invoices = self.invoices.read().await;
        Ok(invoices
            .iter()
            .find(|i| i.id == Some(id) && i.deleted_at.is_none())
            .cloned())
    }

    async fn find_draft_for_project(&self, project_id: Id) -> StoreResult<Option<Invoice>> {
        let invoices = self.invoices.read().await;
        Ok(invoices
            .iter()
            .filter(|i| i.project_id == project_id && i.is_draft() && i.deleted_at.is_none())
            .min_by_key(|i| i.id)
            .cloned())
    }

    async fn next_invoice_sequence(&self) -> StoreResult<i64> {
        Ok(self.next_number.fetch_add(1, Ordering::SeqCst))
    }

    async fn list(
        &self,
        status: Option<InvoiceStatus>,
        pagination: Pagination,
    ) -> StoreResult<PaginatedResult<Invoice>> {
        let pagination = pagination.clamped();
        let invoices = self.invoices.read().await;
        let mut found: Vec<Invoice> = invoices
            .iter()
            .filter(|i| i.deleted_at.is_none() && status.map_or(true, |s| i.status == s))
            .cloned()
            .collect();
        found.sort_by_key(|i| std::cmp::Reverse(i.id));

        let total = found.len() as i64;
        let items = found
            .into_iter()
            .skip(pagination.offset as usize)
            .take(pagination.limit as usize)
            .collect();

        Ok(PaginatedResult::new(items, total, pagination))
    }

    async fn insert(&self, invoice: &Invoice) -> StoreResult<Invoice> {
        let mut stored = invoice.clone();
        stored.id = Some(self.next_id.fetch_add(1, Ordering::SeqCst));
        if stored.created_at.is_none() {
            stored.created_at = Some(Utc::now());
        }
        if stored.updated_at.is_none() {
            stored.updated_at = Some(Utc::now());
        }

        let mut invoices = self.invoices.write().await;
        invoices.push(stored.clone());
        Ok(stored)
    }

    async fn update(&self, invoice: &Invoice) -> StoreResult<Invoice> {
        let id = invoice
            .id
            .ok_or_else(|| StoreError::Conflict("cannot update an unsaved invoice".into()))?;

        let mut stored = invoice.clone();
        stored.updated_at = Some(Utc::now());

        let mut invoices = self.invoices.write().await;
        let pos = invoices
            .iter()
            .position(|i| i.id == Some(id) && i.deleted_at.is_none())
            .ok_or_else(|| StoreError::NotFound(format!("Invoice with id {} not found", id)))?;
        invoices[pos] = stored.clone();
        Ok(stored)
    }
}
