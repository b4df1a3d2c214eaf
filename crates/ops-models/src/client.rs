//! Billing client, the party an invoice is addressed to.

use chrono::{DateTime, Utc};
use ops_core::traits::{Entity, Id, Identifiable, Timestamped};
use serde::{Deserialize, Serialize};

/// Client record.
///
/// Invoice headers snapshot the client name at draft time, so renaming a
/// client does not rewrite already-issued invoices.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Client {
    pub id: Option<Id>,
    pub name: String,
    pub email: Option<String>,
    /// ISO 4217 code, the default currency for this client's projects.
    pub currency: String,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl Default for Client {
    fn default() -> Self {
        Self {
            id: None,
            name: String::new(),
            email: None,
            currency: "USD".to_string(),
            created_at: None,
            updated_at: None,
        }
    }
}

impl Client {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }
}

impl Identifiable for Client {
    fn id(&self) -> Option<Id> {
        self.id
    }
}

impl Timestamped for Client {
    fn created_at(&self) -> Option<DateTime<Utc>> {
        self.created_at
    }

    fn updated_at(&self) -> Option<DateTime<Utc>> {
        self.updated_at
    }
}

impl Entity for Client {
    const TABLE_NAME: &'static str = "clients";
    const TYPE_NAME: &'static str = "Client";
}
