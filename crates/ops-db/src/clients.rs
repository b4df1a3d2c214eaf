//! Client store

use std::sync::atomic::{AtomicI64, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use ops_core::traits::Id;
use ops_models::Client;
use sqlx::{FromRow, PgPool};
use tokio::sync::RwLock;

use crate::repository::StoreResult;

const COLUMNS: &str = "id, name, email, currency, created_at, updated_at";

/// Client database row
#[derive(Debug, Clone, FromRow)]
pub struct ClientRow {
    pub id: i64,
    pub name: String,
    pub email: Option<String>,
    pub currency: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<ClientRow> for Client {
    fn from(row: ClientRow) -> Self {
        Client {
            id: Some(row.id),
            name: row.name,
            email: row.email,
            currency: row.currency,
            created_at: Some(row.created_at),
            updated_at: Some(row.updated_at),
        }
    }
}

/// Client storage trait
#[async_trait]
pub trait ClientStore: Send + Sync {
    /// Find a client by ID
    async fn find_by_id(&self, id: Id) -> StoreResult<Option<Client>>;

    /// Insert a new client and return it with its assigned ID
    async fn insert(&self, client: &Client) -> StoreResult<Client>;
}

/// Postgres client store
pub struct PgClientStore {
    pool: PgPool,
}

impl PgClientStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ClientStore for PgClientStore {
    async fn find_by_id(&self, id: Id) -> StoreResult<Option<Client>> {
        let row = sqlx::query_as::<_, ClientRow>(&format!(
            "SELECT {COLUMNS} FROM clients WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(Client::from))
    }

    async fn insert(&self, client: &Client) -> StoreResult<Client> {
        let row = sqlx::query_as::<_, ClientRow>(&format!(
            "INSERT INTO clients (name, email, currency, created_at, updated_at) \
             VALUES ($1, $2, $3, NOW(), NOW()) \
             RETURNING {COLUMNS}"
        ))
        .bind(&client.name)
        .bind(&client.email)
        .bind(&client.currency)
        .fetch_one(&self.pool)
        .await?;

        Ok(Client::from(row))
    }
}

/// In-memory client store for tests
pub struct MemoryClientStore {
    clients: RwLock<Vec<Client>>,
    next_id: AtomicI64,
}

impl Default for MemoryClientStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryClientStore {
    pub fn new() -> Self {
        Self {
            clients: RwLock::new(Vec::new()),
            next_id: AtomicI64::new(1),
        }
    }
}

#[async_trait]
impl ClientStore for MemoryClientStore {
    async fn find_by_id(&self, id: Id) -> StoreResult<Option<Client>> {
        let clients = self.clients.read().await;
        Ok(clients.iter().find(|c| c.id == Some(id)).cloned())
    }

    async fn insert(&self, client: &Client) -> StoreResult<Client> {
        let mut stored = client.clone();
        stored.id = Some(self.next_id.fetch_add(1, Ordering::SeqCst));
        if stored.created_at.is_none() {
            stored.created_at = Some(Utc::now());
        }
        if stored.updated_at.is_none() {
            stored.updated_at = Some(Utc::now());
        }

        let mut clients = self.clients.write().await;
        clients.push(stored.clone());
        Ok(stored)
    }
}
