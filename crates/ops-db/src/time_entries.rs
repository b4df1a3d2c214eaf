//! Time entry store
//!
//! Postgres-backed store plus an in-memory implementation used by the engine
//! tests. The activity log rides in a JSONB column.

use std::sync::atomic::{AtomicI64, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use ops_core::traits::Id;
use ops_models::time_entry::{TimeEntry, TimeEntryStatus, TimerLog};
use sqlx::{FromRow, PgPool};
use tokio::sync::RwLock;

use crate::repository::{PaginatedResult, Pagination, StoreError, StoreResult};

const COLUMNS: &str = "id, employee_id, project_id, category_id, date, started_at, ended_at, \
     duration_minutes, status, billable, description, activity_log, \
     deleted_at, created_at, updated_at";

/// Time entry database row
#[derive(Debug, Clone, FromRow)]
pub struct TimeEntryRow {
    pub id: i64,
    pub employee_id: i64,
    pub project_id: i64,
    pub category_id: i64,
    pub date: NaiveDate,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
    pub duration_minutes: i64,
    pub status: String,
    pub billable: bool,
    pub description: Option<String>,
    pub activity_log: serde_json::Value,
    pub deleted_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<TimeEntryRow> for TimeEntry {
    type Error = StoreError;

    fn try_from(row: TimeEntryRow) -> Result<Self, Self::Error> {
        let activity_log = if row.activity_log.is_null() {
            TimerLog::default()
        } else {
            serde_json::from_value(row.activity_log)?
        };

        Ok(TimeEntry {
            id: Some(row.id),
            employee_id: row.employee_id,
            project_id: row.project_id,
            category_id: row.category_id,
            date: row.date,
            started_at: row.started_at,
            ended_at: row.ended_at,
            duration_minutes: row.duration_minutes,
            status: TimeEntryStatus::from_str(&row.status),
            billable: row.billable,
            description: row.description,
            activity_log,
            deleted_at: row.deleted_at,
            created_at: Some(row.created_at),
            updated_at: Some(row.updated_at),
        })
    }
}

/// Filters for listing time entries
#[derive(Debug, Clone, Default)]
pub struct TimeEntryFilter {
    pub employee_id: Option<Id>,
    pub project_id: Option<Id>,
    pub status: Option<TimeEntryStatus>,
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
}

/// Time entry storage trait
///
/// Every finder excludes soft-deleted rows.
#[async_trait]
pub trait TimeEntryStore: Send + Sync {
    /// Find an entry by ID
    async fn find_by_id(&self, id: Id) -> StoreResult<Option<TimeEntry>>;

    /// Find the employee's open entry (running or paused), if any
    async fn find_open_for_employee(&self, employee_id: Id) -> StoreResult<Option<TimeEntry>>;

    /// All entries for a project, any lifecycle status, oldest first
    async fn find_for_project(&self, project_id: Id) -> StoreResult<Vec<TimeEntry>>;

    /// Entries for one employee within a date range, oldest first
    async fn find_for_employee_in_range(
        &self,
        employee_id: Id,
        from: NaiveDate,
        to: NaiveDate,
    ) -> StoreResult<Vec<TimeEntry>>;

    /// Open entries past their freshness cutoffs: running entries started
    /// before the first bound, paused entries untouched since the second
    async fn find_stale_open(
        &self,
        started_before: DateTime<Utc>,
        updated_before: DateTime<Utc>,
    ) -> StoreResult<Vec<TimeEntry>>;

    /// List entries with filters and pagination, newest first
    async fn list(
        &self,
        filter: &TimeEntryFilter,
        pagination: Pagination,
    ) -> StoreResult<PaginatedResult<TimeEntry>>;

    /// Insert a new entry and return it with its assigned ID
    async fn insert(&self, entry: &TimeEntry) -> StoreResult<TimeEntry>;

    /// Persist the entry's current state
    async fn update(&self, entry: &TimeEntry) -> StoreResult<TimeEntry>;

    /// Soft-delete an entry
    async fn soft_delete(&self, id: Id, now: DateTime<Utc>) -> StoreResult<()>;
}

/// Postgres time entry store
pub struct PgTimeEntryStore {
    pool: PgPool,
}

impl PgTimeEntryStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TimeEntryStore for PgTimeEntryStore {
    async fn find_by_id(&self, id: Id) -> StoreResult<Option<TimeEntry>> {
        let row = sqlx::query_as::<_, TimeEntryRow>(&format!(
            "SELECT {COLUMNS} FROM time_entries WHERE id = $1 AND deleted_at IS NULL"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(TimeEntry::try_from).transpose()
    }

    async fn find_open_for_employee(&self, employee_id: Id) -> StoreResult<Option<TimeEntry>> {
        let row = sqlx::query_as::<_, TimeEntryRow>(&format!(
            "SELECT {COLUMNS} FROM time_entries \
             WHERE employee_id = $1 AND status IN ('pending', 'paused') AND deleted_at IS NULL \
             ORDER BY id DESC LIMIT 1"
        ))
        .bind(employee_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(TimeEntry::try_from).transpose()
    }

    async fn find_for_project(&self, project_id: Id) -> StoreResult<Vec<TimeEntry>> {
        let rows = sqlx::query_as::<_, TimeEntryRow>(&format!(
            "SELECT {COLUMNS} FROM time_entries \
             WHERE project_id = $1 AND deleted_at IS NULL \
             ORDER BY date, id"
        ))
        .bind(project_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(TimeEntry::try_from).collect()
    }

    async fn find_for_employee_in_range(
        &self,
        employee_id: Id,
        from: NaiveDate,
        to: NaiveDate,
    ) -> StoreResult<Vec<TimeEntry>> {
        let rows = sqlx::query_as::<_, TimeEntryRow>(&format!(
            "SELECT {COLUMNS} FROM time_entries \
             WHERE employee_id = $1 AND date >= $2 AND date <= $3 AND deleted_at IS NULL \
             ORDER BY date, id"
        ))
        .bind(employee_id)
        .bind(from)
        .bind(to)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(TimeEntry::try_from).collect()
    }

    async fn find_stale_open(
        &self,
        started_before: DateTime<Utc>,
        updated_before: DateTime<Utc>,
    ) -> StoreResult<Vec<TimeEntry>> {
        let rows = sqlx::query_as::<_, TimeEntryRow>(&format!(
            "SELECT {COLUMNS} FROM time_entries \
             WHERE deleted_at IS NULL \
               AND ((status = 'pending' AND started_at < $1) \
                 OR (status = 'paused' AND updated_at < $2)) \
             ORDER BY id"
        ))
        .bind(started_before)
        .bind(updated_before)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(TimeEntry::try_from).collect()
    }

    async fn list(
        &self,
        filter: &TimeEntryFilter,
        pagination: Pagination,
    ) -> StoreResult<PaginatedResult<TimeEntry>> {
        let pagination = pagination.clamped();
        let status = filter.status.map(|s| s.as_str());

        let rows = sqlx::query_as::<_, TimeEntryRow>(&format!(
            "SELECT {COLUMNS} FROM time_entries \
             WHERE deleted_at IS NULL \
               AND ($1::bigint IS NULL OR employee_id = $1) \
               AND ($2::bigint IS NULL OR project_id = $2) \
               AND ($3::text IS NULL OR status = $3) \
               AND ($4::date IS NULL OR date >= $4) \
               AND ($5::date IS NULL OR date <= $5) \
             ORDER BY date DESC, id DESC \
             LIMIT $6 OFFSET $7"
        ))
        .bind(filter.employee_id)
        .bind(filter.project_id)
        .bind(status)
        .bind(filter.from)
        .bind(filter.to)
        .bind(pagination.limit)
        .bind(pagination.offset)
        .fetch_all(&self.pool)
        .await?;

        let total = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM time_entries \
             WHERE deleted_at IS NULL \
               AND ($1::bigint IS NULL OR employee_id = $1) \
               AND ($2::bigint IS NULL OR project_id = $2) \
               AND ($3::text IS NULL OR status = $3) \
               AND ($4::date IS NULL OR date >= $4) \
               AND ($5::date IS NULL OR date <= $5)",
        )
        .bind(filter.employee_id)
        .bind(filter.project_id)
        .bind(status)
        .bind(filter.from)
        .bind(filter.to)
        .fetch_one(&self.pool)
        .await?;

        let items = rows
            .into_iter()
            .map(TimeEntry::try_from)
            .collect::<StoreResult<Vec<_>>>()?;

        Ok(PaginatedResult::new(items, total, pagination))
    }

    async fn insert(&self, entry: &TimeEntry) -> StoreResult<TimeEntry> {
        let activity_log = serde_json::to_value(&entry.activity_log)?;

        let row = sqlx::query_as::<_, TimeEntryRow>(&format!(
            "INSERT INTO time_entries ( \
                employee_id, project_id, category_id, date, started_at, ended_at, \
                duration_minutes, status, billable, description, activity_log, \
                created_at, updated_at \
             ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, NOW(), NOW()) \
             RETURNING {COLUMNS}"
        ))
        .bind(entry.employee_id)
        .bind(entry.project_id)
        .bind(entry.category_id)
        .bind(entry.date)
        .bind(entry.started_at)
        .bind(entry.ended_at)
        .bind(entry.duration_minutes)
        .bind(entry.status.as_str())
        .bind(entry.billable)
        .bind(&entry.description)
        .bind(activity_log)
        .fetch_one(&self.pool)
        .await?;

        TimeEntry::try_from(row)
    }

    async fn update(&self, entry: &TimeEntry) -> StoreResult<TimeEntry> {
        let id = entry
            .id
            .ok_or_else(|| StoreError::Conflict("cannot update an unsaved time entry".into()))?;
        let activity_log = serde_json::to_value(&entry.activity_log)?;

        let row = sqlx::query_as::<_, TimeEntryRow>(&format!(
            "UPDATE time_entries SET \
                category_id = $1, date = $2, started_at = $3, ended_at = $4, \
                duration_minutes = $5, status = $6, billable = $7, description = $8, \
                activity_log = $9, updated_at = NOW() \
             WHERE id = $10 AND deleted_at IS NULL \
             RETURNING {COLUMNS}"
        ))
        .bind(entry.category_id)
        .bind(entry.date)
        .bind(entry.started_at)
        .bind(entry.ended_at)
        .bind(entry.duration_minutes)
        .bind(entry.status.as_str())
        .bind(entry.billable)
        .bind(&entry.description)
        .bind(activity_log)
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| StoreError::NotFound(format!("Time entry with id {} not found", id)))?;

        TimeEntry::try_from(row)
    }

    async fn soft_delete(&self, id: Id, now: DateTime<Utc>) -> StoreResult<()> {
        let result = sqlx::query(
            "UPDATE time_entries SET deleted_at = $1, updated_at = NOW() \
             WHERE id = $2 AND deleted_at IS NULL",
        )
        .bind(now)
        .bind(id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(format!(
                "Time entry with id {} not found",
                id
            )));
        }

        Ok(())
    }
}

/// In-memory time entry store for tests
pub struct MemoryTimeEntryStore {
    entries: RwLock<Vec<TimeEntry>>,
    next_id: AtomicI64,
}

impl Default for MemoryTimeEntryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryTimeEntryStore {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(Vec::new()),
            next_id: AtomicI64::new(1),
        }
    }

    fn matches_filter(entry: &TimeEntry, filter: &TimeEntryFilter) -> bool {
        if let Some(employee_id) = filter.employee_id {
            if entry.employee_id != employee_id {
                return false;
            }
        }
        if let Some(project_id) = filter.project_id {
            if entry.project_id != project_id {
                return false;
            }
        }
        if let Some(status) = filter.status {
            if entry.status != status {
                return false;
            }
        }
        if let Some(from) = filter.from {
            if entry.date < from {
                return false;
            }
        }
        if let Some(to) = filter.to {
            if entry.date > to {
                return false;
            }
        }
        true
    }
}

#[async_trait]
impl TimeEntryStore for MemoryTimeEntryStore {
    async fn find_by_id(&self, id: Id) -> StoreResult<Option<TimeEntry>> {
        let entries = self.entries.read().await;
        Ok(entries
            .iter()
            .find(|e| e.id == Some(id) && e.deleted_at.is_none())
            .cloned())
    }

    async fn find_open_for_employee(&self, employee_id: Id) -> StoreResult<Option<TimeEntry>> {
        let entries = self.entries.read().await;
        Ok(entries
            .iter()
            .filter(|e| {
                e.employee_id == employee_id && e.is_open() && e.deleted_at.is_none()
            })
            .max_by_key(|e| e.id)
            .cloned())
    }

    async fn find_for_project(&self, project_id: Id) -> StoreResult<Vec<TimeEntry>> {
        let entries = self.entries.read().await;
        let mut found: Vec<TimeEntry> = entries
            .iter()
            .filter(|e| e.project_id == project_id && e.deleted_at.is_none())
            .cloned()
            .collect();
        found.sort_by_key(|e| (e.date, e.id));
        Ok(found)
    }

    async fn find_for_employee_in_range(
        &self,
        employee_id: Id,
        from: NaiveDate,
        to: NaiveDate,
    ) -> StoreResult<Vec<TimeEntry>> {
        let entries = self.entries.read().await;
        let mut found: Vec<TimeEntry> = entries
            .iter()
            .filter(|e| {
                e.employee_id == employee_id
                    && e.date >= from
                    && e.date <= to
                    && e.deleted_at.is_none()
            })
            .cloned()
            .collect();
        found.sort_by_key(|e| (e.date, e.id));
        Ok(found)
    }

    async fn find_stale_open(
        &self,
        started_before: DateTime<Utc>,
        updated_before: DateTime<Utc>,
    ) -> StoreResult<Vec<TimeEntry>> {
        let entries = self.entries.read().await;
        Ok(entries
            .iter()
            .filter(|e| {
                if e.deleted_at.is_some() {
                    return false;
                }
                match e.status {
                    TimeEntryStatus::Pending => {
                        matches!(e.started_at, Some(t) if t < started_before)
                    }
                    TimeEntryStatus::Paused => {
                        matches!(e.updated_at, Some(t) if t < updated_before)
                    }
                    _ => false,
                }
            })
            .cloned()
            .collect())
    }

    async fn list(
        &self,
        filter: &TimeEntryFilter,
        pagination: Pagination,
    ) -> StoreResult<PaginatedResult<TimeEntry>> {
        let pagination = pagination.clamped();
        let entries = self.entries.read().await;
        let mut found: Vec<TimeEntry> = entries
            .iter()
            .filter(|e| e.deleted_at.is_none() && Self::matches_filter(e, filter))
            .cloned()
            .collect();
        found.sort_by_key(|e| (std::cmp::Reverse(e.date), std::cmp::Reverse(e.id)));

        let total = found.len() as i64;
        let items = found
            .into_iter()
            .skip(pagination.offset as usize)
            .take(pagination.limit as usize)
            .collect();

        Ok(PaginatedResult::new(items, total, pagination))
    }

    async fn insert(&self, entry: &TimeEntry) -> StoreResult<TimeEntry> {
        let mut stored = entry.clone();
        stored.id = Some(self.next_id.fetch_add(1, Ordering::SeqCst));
        if stored.created_at.is_none() {
            stored.created_at = Some(Utc::now());
        }
        if stored.updated_at.is_none() {
            stored.updated_at = Some(Utc::now());
        }

        let mut entries = self.entries.write().await;
        entries.push(stored.clone());
        Ok(stored)
    }

    async fn update(&self, entry: &TimeEntry) -> StoreResult<TimeEntry> {
        let id = entry
            .id
            .ok_or_else(|| StoreError::Conflict("cannot update an unsaved time entry".into()))?;

        let mut stored = entry.clone();
        stored.updated_at = Some(Utc::now());

        let mut entries = self.entries.write().await;
        let pos = entries
            .iter()
            .position(|e| e.id == Some(id) && e.deleted_at.is_none())
            .ok_or_else(|| StoreError::NotFound(format!("Time entry with id {} not found", id)))?;
        entries[pos] = stored.clone();
        Ok(stored)
    }

    async fn soft_delete(&self, id: Id, now: DateTime<Utc>) -> StoreResult<()> {
        let mut entries = self.entries.write().await;
        let entry = entries
            .iter_mut()
            .find(|e| e.id == Some(id) && e.deleted_at.is_none())
            .ok_or_else(|| StoreError::NotFound(format!("Time entry with id {} not found", id)))?;
        entry.deleted_at = Some(now);
        entry.updated_at = Some(now);
        Ok(())
    }
}
