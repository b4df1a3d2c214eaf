//! Invoice model
//!
//! Line items live in a JSONB column on the invoice row. Monetary totals are
//! always recomputed from the items, rounded to cents.

use chrono::{DateTime, NaiveDate, Utc};
use ops_core::traits::{Entity, Id, Identifiable, SoftDeletable, Timestamped};
use serde::{Deserialize, Serialize};
use validator::Validate;

/// Invoice lifecycle status
///
/// Only `Draft` invoices are ever rewritten by automation. Once an invoice
/// is sent it is immutable from the automator's point of view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum InvoiceStatus {
    #[default]
    Draft,
    Sent,
    Paid,
    Void,
}

impl InvoiceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Sent => "sent",
            Self::Paid => "paid",
            Self::Void => "void",
        }
    }

    pub fn from_str(s: &str) -> Self {
        match s {
            "sent" => Self::Sent,
            "paid" => Self::Paid,
            "void" => Self::Void,
            _ => Self::Draft,
        }
    }
}

/// One line of an invoice
///
/// `quantity` is hours, `unit_price` the hourly rate. Non-billable lines
/// carry a zero rate so the client still sees the work performed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InvoiceItem {
    pub description: String,
    pub quantity: f64,
    pub unit_price: f64,
    pub amount: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_entry_id: Option<Id>,
}

impl InvoiceItem {
    pub fn new(description: impl Into<String>, quantity: f64, unit_price: f64) -> Self {
        Self {
            description: description.into(),
            quantity,
            unit_price,
            amount: round_cents(quantity * unit_price),
            time_entry_id: None,
        }
    }

    pub fn for_time_entry(
        description: impl Into<String>,
        quantity: f64,
        unit_price: f64,
        time_entry_id: Id,
    ) -> Self {
        let mut item = Self::new(description, quantity, unit_price);
        item.time_entry_id = Some(time_entry_id);
        item
    }
}

/// Invoice entity
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Invoice {
    pub id: Option<Id>,
    pub number: String,
    pub project_id: Id,
    pub client_id: Id,
    pub client_name: String,
    pub status: InvoiceStatus,
    pub issue_date: NaiveDate,
    pub due_date: NaiveDate,
    #[serde(default)]
    pub items: Vec<InvoiceItem>,
    pub subtotal: f64,
    pub tax_amount: f64,
    pub total_amount: f64,
    pub paid_amount: f64,
    pub balance_amount: f64,
    pub currency: String,
    pub created_by: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    pub deleted_at: Option<DateTime<Utc>>,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl Invoice {
    /// Fresh draft with empty items and zeroed totals.
    #[allow(clippy::too_many_arguments)]
    pub fn draft(
        number: impl Into<String>,
        project_id: Id,
        client_id: Id,
        client_name: impl Into<String>,
        issue_date: NaiveDate,
        due_date: NaiveDate,
        currency: impl Into<String>,
        created_by: impl Into<String>,
    ) -> Self {
        Self {
            id: None,
            number: number.into(),
            project_id,
            client_id,
            client_name: client_name.into(),
            status: InvoiceStatus::Draft,
            issue_date,
            due_date,
            items: Vec::new(),
            subtotal: 0.0,
            tax_amount: 0.0,
            total_amount: 0.0,
            paid_amount: 0.0,
            balance_amount: 0.0,
            currency: currency.into(),
            created_by: created_by.into(),
            notes: None,
            deleted_at: None,
            created_at: None,
            updated_at: None,
        }
    }

    /// Replaces the line items wholesale and recomputes every total.
    pub fn replace_items(&mut self, items: Vec<InvoiceItem>, tax_rate: f64) {
        self.items = items;
        self.recompute_totals(tax_rate);
    }

    /// Derives subtotal, tax, total and balance from the current items.
    /// Cents rounding applies at each derived figure, not just at the end.
    pub fn recompute_totals(&mut self, tax_rate: f64) {
        self.subtotal = round_cents(self.items.iter().map(|item| item.amount).sum());
        self.tax_amount = round_cents(self.subtotal * tax_rate);
        self.total_amount = round_cents(self.subtotal + self.tax_amount);
        self.balance_amount = round_cents(self.total_amount - self.paid_amount);
    }

    pub fn is_draft(&self) -> bool {
        self.status == InvoiceStatus::Draft
    }
}

impl Identifiable for Invoice {
    fn id(&self) -> Option<Id> {
        self.id
    }
}

impl Timestamped for Invoice {
    fn created_at(&self) -> Option<DateTime<Utc>> {
        self.created_at
    }

    fn updated_at(&self) -> Option<DateTime<Utc>> {
        self.updated_at
    }
}

impl SoftDeletable for Invoice {
    fn deleted_at(&self) -> Option<DateTime<Utc>> {
        self.deleted_at
    }
}

impl Entity for Invoice {
    const TABLE_NAME: &'static str = "invoices";
    const TYPE_NAME: &'static str = "Invoice";
}

/// DTO for manually creating an invoice
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateInvoiceDto {
    pub project_id: Id,
    #[validate(length(min = 1, max = 1000))]
    pub notes: Option<String>,
    pub issue_date: Option<NaiveDate>,
    pub due_date: Option<NaiveDate>,
    #[serde(default)]
    pub items: Vec<InvoiceItem>,
}

/// DTO for updating a draft invoice
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct UpdateInvoiceDto {
    pub status: Option<String>,
    #[validate(length(min = 1, max = 1000))]
    pub notes: Option<String>,
    pub due_date: Option<NaiveDate>,
    #[validate(range(min = 0.0))]
    pub paid_amount: Option<f64>,
    pub items: Option<Vec<InvoiceItem>>,
}

/// Rounds a monetary value to two decimal places.
pub fn round_cents(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_draft() -> Invoice {
        Invoice::draft(
            "INV-2025-00001",
            1,
            2,
            "Acme Corp",
            NaiveDate::from_ymd_opt(2025, 3, 1).unwrap(),
            NaiveDate::from_ymd_opt(2025, 3, 8).unwrap(),
            "USD",
            "System (Overrun Automator)",
        )
    }

    #[test]
    fn test_item_amount_rounds_to_cents() {
        let item = InvoiceItem::new("Design work", 0.333, 99.99);
        assert_eq!(item.amount, 33.30);
    }

    #[test]
    fn test_recompute_totals() {
        let mut invoice = sample_draft();
        invoice.replace_items(
            vec![
                InvoiceItem::new("Development", 10.5, 100.0),
                InvoiceItem::new("Internal QA", 2.0, 0.0),
            ],
            0.10,
        );

        assert_eq!(invoice.subtotal, 1050.0);
        assert_eq!(invoice.tax_amount, 105.0);
        assert_eq!(invoice.total_amount, 1155.0);
        assert_eq!(invoice.balance_amount, 1155.0);
    }

    #[test]
    fn test_balance_reflects_payments() {
        let mut invoice = sample_draft();
        invoice.paid_amount = 155.0;
        invoice.replace_items(vec![InvoiceItem::new("Development", 10.5, 100.0)], 0.10);

        assert_eq!(invoice.total_amount, 1155.0);
        assert_eq!(invoice.balance_amount, 1000.0);
    }

    #[test]
    fn test_replace_items_is_wholesale() {
        let mut invoice = sample_draft();
        invoice.replace_items(vec![InvoiceItem::new("Old line", 1.0, 50.0)], 0.10);
        invoice.replace_items(vec![InvoiceItem::new("New line", 2.0, 75.0)], 0.10);

        assert_eq!(invoice.items.len(), 1);
        assert_eq!(invoice.items[0].description, "New line");
        assert_eq!(invoice.subtotal, 150.0);
    }

    #[test]
    fn test_status_round_trip() {
        for status in [
            InvoiceStatus::Draft,
            InvoiceStatus::Sent,
            InvoiceStatus::Paid,
            InvoiceStatus::Void,
        ] {
            assert_eq!(InvoiceStatus::from_str(status.as_str()), status);
        }
    }
}
