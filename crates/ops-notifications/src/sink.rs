//! Notification sinks
//!
//! Callers treat delivery as best-effort: a sink failure is logged by the
//! caller and never propagated into the triggering operation.

use std::sync::atomic::{AtomicI64, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use ops_core::traits::Id;
use sqlx::{FromRow, PgPool};
use thiserror::Error;
use tokio::sync::RwLock;

use crate::notification::{Audience, Notification, NotificationKind};

/// Sink errors
#[derive(Debug, Error)]
pub enum SinkError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Storage error: {0}")]
    Storage(String),
}

pub type SinkResult<T> = Result<T, SinkError>;

/// Notification storage trait
#[async_trait]
pub trait NotificationSink: Send + Sync {
    /// Store a notification, returning its assigned ID
    async fn add(&self, notification: &mut Notification) -> SinkResult<Id>;

    /// Recent notifications, newest first, optionally filtered by audience
    async fn list(
        &self,
        audience: Option<Audience>,
        unread_only: bool,
        limit: usize,
    ) -> SinkResult<Vec<Notification>>;
}

/// In-memory notification sink for tests and single-node setups
pub struct MemoryNotificationSink {
    notifications: RwLock<Vec<Notification>>,
    next_id: AtomicI64,
}

impl Default for MemoryNotificationSink {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryNotificationSink {
    pub fn new() -> Self {
        Self {
            notifications: RwLock::new(Vec::new()),
            next_id: AtomicI64::new(1),
        }
    }
}

#[async_trait]
impl NotificationSink for MemoryNotificationSink {
    async fn add(&self, notification: &mut Notification) -> SinkResult<Id> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        notification.id = Some(id);

        let mut notifications = self.notifications.write().await;
        notifications.push(notification.clone());

        Ok(id)
    }

    async fn list(
        &self,
        audience: Option<Audience>,
        unread_only: bool,
        limit: usize,
    ) -> SinkResult<Vec<Notification>> {
        let notifications = self.notifications.read().await;
        let mut found: Vec<Notification> = notifications
            .iter()
            .filter(|n| audience.map_or(true, |a| n.audience == a))
            .filter(|n| !unread_only || n.is_unread())
            .cloned()
            .collect();
        found.sort_by_key(|n| std::cmp::Reverse(n.id));
        found.truncate(limit);
        Ok(found)
    }
}

/// Notification database row
#[derive(Debug, Clone, FromRow)]
struct NotificationRow {
    id: i64,
    audience: String,
    kind: String,
    title: String,
    message: String,
    project_id: Option<i64>,
    read_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
}

impl TryFrom<NotificationRow> for Notification {
    type Error = SinkError;

    fn try_from(row: NotificationRow) -> Result<Self, Self::Error> {
        let audience = Audience::from_str(&row.audience)
            .ok_or_else(|| SinkError::Storage(format!("unknown audience '{}'", row.audience)))?;
        let kind = NotificationKind::from_str(&row.kind)
            .ok_or_else(|| SinkError::Storage(format!("unknown kind '{}'", row.kind)))?;

        Ok(Notification {
            id: Some(row.id),
            audience,
            kind,
            title: row.title,
            message: row.message,
            project_id: row.project_id,
            read_at: row.read_at,
            created_at: row.created_at,
        })
    }
}

/// Postgres notification sink
pub struct PgNotificationSink {
    pool: PgPool,
}

impl PgNotificationSink {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl NotificationSink for PgNotificationSink {
    async fn add(&self, notification: &mut Notification) -> SinkResult<Id> {
        let id = sqlx::query_scalar::<_, i64>(
            "INSERT INTO notifications (audience, kind, title, message, project_id, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6) \
             RETURNING id",
        )
        .bind(notification.audience.as_str())
        .bind(notification.kind.as_str())
        .bind(&notification.title)
        .bind(&notification.message)
        .bind(notification.project_id)
        .bind(notification.created_at)
        .fetch_one(&self.pool)
        .await?;

        notification.id = Some(id);
        Ok(id)
    }

    async fn list(
        &self,
        audience: Option<Audience>,
        unread_only: bool,
        limit: usize,
    ) -> SinkResult<Vec<Notification>> {
        let rows = sqlx::query_as::<_, NotificationRow>(
            "SELECT id, audience, kind, title, message, project_id, read_at, created_at \
             FROM notifications \
             WHERE ($1::text IS NULL OR audience = $1) \
               AND ($2::boolean = FALSE OR read_at IS NULL) \
             ORDER BY id DESC LIMIT $3",
        )
        .bind(audience.map(|a| a.as_str()))
        .bind(unread_only)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Notification::try_from).collect()
    }
}
