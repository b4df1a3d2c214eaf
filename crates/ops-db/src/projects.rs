//! Project store

use std::sync::atomic::{AtomicI64, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use ops_core::traits::Id;
use ops_models::Project;
use sqlx::{FromRow, PgPool};
use tokio::sync::RwLock;

use crate::repository::StoreResult;

const COLUMNS: &str =
    "id, client_id, name, estimated_hours, global_rate, currency, active, created_at, updated_at";

/// Project database row
#[derive(Debug, Clone, FromRow)]
pub struct ProjectRow {
    pub id: i64,
    pub client_id: i64,
    pub name: String,
    pub estimated_hours: Option<f64>,
    pub global_rate: Option<f64>,
    pub currency: String,
    pub active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<ProjectRow> for Project {
    fn from(row: ProjectRow) -> Self {
        Project {
            id: Some(row.id),
            client_id: row.client_id,
            name: row.name,
            estimated_hours: row.estimated_hours,
            global_rate: row.global_rate,
            currency: row.currency,
            active: row.active,
            created_at: Some(row.created_at),
            updated_at: Some(row.updated_at),
        }
    }
}

/// Project storage trait
#[async_trait]
pub trait ProjectStore: Send + Sync {
    /// Find a project by ID
    async fn find_by_id(&self, id: Id) -> StoreResult<Option<Project>>;

    /// Insert a new project and return it with its assigned ID
    async fn insert(&self, project: &Project) -> StoreResult<Project>;
}

/// Postgres project store
pub struct PgProjectStore {
    pool: PgPool,
}

impl PgProjectStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ProjectStore for PgProjectStore {
    async fn find_by_id(&self, id: Id) -> StoreResult<Option<Project>> {
        let row = sqlx::query_as::<_, ProjectRow>(&format!(
            "SELECT {COLUMNS} FROM projects WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(Project::from))
    }

    async fn insert(&self, project: &Project) -> StoreResult<Project> {
        let row = sqlx::query_as::<_, ProjectRow>(&format!(
            "INSERT INTO projects (client_id, name, estimated_hours, global_rate, currency, active, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, NOW(), NOW()) \
             RETURNING {COLUMNS}"
        ))
        .bind(project.client_id)
        .bind(&project.name)
        .bind(project.estimated_hours)
        .bind(project.global_rate)
        .bind(&project.currency)
        .bind(project.active)
        .fetch_one(&self.pool)
        .await?;

        Ok(Project::from(row))
    }
}

/// In-memory project store for tests
pub struct MemoryProjectStore {
    projects: RwLock<Vec<Project>>,
    next_id: AtomicI64,
}

impl Default for MemoryProjectStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryProjectStore {
    pub fn new() -> Self {
        Self {
            projects: RwLock::new(Vec::new()),
            next_id: AtomicI64::new(1),
        }
    }
}

#[async_trait]
impl ProjectStore for MemoryProjectStore {
    async fn find_by_id(&self, id: Id) -> StoreResult<Option<Project>> {
        let projects = self.projects.read().await;
        Ok(projects.iter().find(|p| p.id == Some(id)).cloned())
    }

    async fn insert(&self, project: &Project) -> StoreResult<Project> {
        let mut stored = project.clone();
        stored.id = Some(self.next_id.fetch_add(1, Ordering::SeqCst));
        if stored.created_at.is_none() {
            stored.created_at = Some(Utc::now());
        }
        if stored.updated_at.is_none() {
            stored.updated_at = Some(Utc::now());
        }

        let mut projects = self.projects.write().await;
        projects.push(stored.clone());
        Ok(stored)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_store_round_trip() {
        let store = MemoryProjectStore::new();
        let project = store.insert(&Project::new(7, "Redesign")).await.unwrap();

        let found = store.find_by_id(project.id.unwrap()).await.unwrap();
        assert_eq!(found.map(|p| p.name), Some("Redesign".to_string()));
        assert!(store.find_by_id(999).await.unwrap().is_none());
    }
}
