//! Payroll store
//!
//! Runs and their per-employee records. Draft recalculation deletes and
//! reinserts a run's records wholesale, so record IDs are not stable across
//! rebuilds.

use std::sync::atomic::{AtomicI64, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use ops_core::traits::Id;
use ops_models::{PayrollRecord, PayrollRun, PayrollRunStatus};
use sqlx::{FromRow, PgPool};
use tokio::sync::RwLock;

use crate::repository::{PaginatedResult, Pagination, StoreError, StoreResult};

const RUN_COLUMNS: &str = "id, period, status, total_employees, total_approved_hours, \
     total_payable, locked_at, paid_at, created_at, updated_at";

const RECORD_COLUMNS: &str = "id, run_id, employee_id, employee_name, total_hours, \
     billable_hours, non_billable_hours, hourly_rate, base_pay, overtime_hours, \
     overtime_amount, bonus, deductions, total_payable, created_at, updated_at";

/// Payroll run database row
#[derive(Debug, Clone, FromRow)]
pub struct PayrollRunRow {
    pub id: i64,
    pub period: String,
    pub status: String,
    pub total_employees: i64,
    pub total_approved_hours: f64,
    pub total_payable: f64,
    pub locked_at: Option<DateTime<Utc>>,
    pub paid_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<PayrollRunRow> for PayrollRun {
    fn from(row: PayrollRunRow) -> Self {
        PayrollRun {
            id: Some(row.id),
            period: row.period,
            status: PayrollRunStatus::from_str(&row.status),
            total_employees: row.total_employees,
            total_approved_hours: row.total_approved_hours,
            total_payable: row.total_payable,
            locked_at: row.locked_at,
            paid_at: row.paid_at,
            created_at: Some(row.created_at),
            updated_at: Some(row.updated_at),
        }
    }
}

/// Payroll record database row
#[derive(Debug, Clone, FromRow)]
pub struct PayrollRecordRow {
    pub id: i64,
    pub run_id: i64,
    pub employee_id: i64,
    pub employee_name: String,
    pub total_hours: f64,
    pub billable_hours: f64,
    pub non_billable_hours: f64,
    pub hourly_rate: f64,
    pub base_pay: f64,
    pub overtime_hours: f64,
    pub overtime_amount: f64,
    pub bonus: f64,
    pub deductions: f64,
    pub total_payable: f64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<PayrollRecordRow> for PayrollRecord {
    fn from(row: PayrollRecordRow) -> Self {
        PayrollRecord {
            id: Some(row.id),
            run_id: row.run_id,
            employee_id: row.employee_id,
            employee_name: row.employee_name,
            total_hours: row.total_hours,
            billable_hours: row.billable_hours,
            non_billable_hours: row.non_billable_hours,
            hourly_rate: row.hourly_rate,
            base_pay: row.base_pay,
            overtime_hours: row.overtime_hours,
            overtime_amount: row.overtime_amount,
            bonus: row.bonus,
            deductions: row.deductions,
            total_payable: row.total_payable,
            created_at: Some(row.created_at),
            updated_at: Some(row.updated_at),
        }
    }
}

/// Payroll storage trait
#[async_trait]
pub trait PayrollStore: Send + Sync {
    /// Find a run by ID
    async fn find_run_by_id(&self, id: Id) -> StoreResult<Option<PayrollRun>>;

    /// Find a run by its period label
    async fn find_run_by_period(&self, period: &str) -> StoreResult<Option<PayrollRun>>;

    /// List runs, newest period first
    async fn list_runs(&self, pagination: Pagination) -> StoreResult<PaginatedResult<PayrollRun>>;

    /// Insert a new run and return it with its assigned ID
    async fn insert_run(&self, run: &PayrollRun) -> StoreResult<PayrollRun>;

    /// Persist the run's current state
    async fn update_run(&self, run: &PayrollRun) -> StoreResult<PayrollRun>;

    /// All records for a run, ordered by employee
    async fn records_for_run(&self, run_id: Id) -> StoreResult<Vec<PayrollRecord>>;

    /// Delete every record of a run, returning how many were removed
    async fn delete_records_for_run(&self, run_id: Id) -> StoreResult<u64>;

    /// Insert a freshly built record set
    async fn insert_records(&self, records: &[PayrollRecord]) -> StoreResult<Vec<PayrollRecord>>;
}

/// Postgres payroll store
pub struct PgPayrollStore {
    pool: PgPool,
}

impl PgPayrollStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl PayrollStore for PgPayrollStore {
    async fn find_run_by_id(&self, id: Id) -> StoreResult<Option<PayrollRun>> {
        let row = sqlx::query_as::<_, PayrollRunRow>(&format!(
            "SELECT {RUN_COLUMNS} FROM payroll_runs WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(PayrollRun::from))
    }

    async fn find_run_by_period(&self, period: &str) -> StoreResult<Option<PayrollRun>> {
        let row = sqlx::query_as::<_, PayrollRunRow>(&format!(
            "SELECT {RUN_COLUMNS} FROM payroll_runs WHERE period = $1"
        ))
        .bind(period)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(PayrollRun::from))
    }

    async fn list_runs(&self, pagination: Pagination) -> StoreResult<PaginatedResult<PayrollRun>> {
        let pagination = pagination.clamped();

        let rows = sqlx::query_as::<_, PayrollRunRow>(&format!(
            "SELECT {RUN_COLUMNS} FROM payroll_runs ORDER BY period DESC LIMIT $1 OFFSET $2"
        ))
        .bind(pagination.limit)
        .bind(pagination.offset)
        .fetch_all(&self.pool)
        .await?;

        let total = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM payroll_runs")
            .fetch_one(&self.pool)
            .await?;

        let items = rows.into_iter().map(PayrollRun::from).collect();
        Ok(PaginatedResult::new(items, total, pagination))
    }

    async fn insert_run(&self, run: &PayrollRun) -> StoreResult<PayrollRun> {
        let row = sqlx::query_as::<_, PayrollRunRow>(&format!(
            "INSERT INTO payroll_runs ( \
                period, status, total_employees, total_approved_hours, total_payable, \
                locked_at, paid_at, created_at, updated_at \
             ) VALUES ($1, $2, $3, $4, $5, $6, $7, NOW(), NOW()) \
             RETURNING {RUN_COLUMNS}"
        ))
        .bind(&run.period)
        .bind(run.status.as_str())
        .bind(run.total_employees)
        .bind(run.total_approved_hours)
        .bind(run.total_payable)
        .bind(run.locked_at)
        .bind(run.paid_at)
        .fetch_one(&self.pool)
        .await?;

        Ok(PayrollRun::from(row))
    }

    async fn update_run(&self, run: &PayrollRun) -> StoreResult<PayrollRun> {
        let id = run
            .id
            .ok_or_else(|| StoreError::Conflict("cannot update an unsaved payroll run".into()))?;

        let row = sqlx::query_as::<_, PayrollRunRow>(&format!(
            "UPDATE payroll_runs SET \
                status = $1, total_employees = $2, total_approved_hours = $3, \
                total_payable = $4, locked_at = $5, paid_at = $6, updated_at = NOW() \
             WHERE id = $7 \
             RETURNING {RUN_COLUMNS}"
        ))
        .bind(run.status.as_str())
        .bind(run.total_employees)
        .bind(run.total_approved_hours)
        .bind(run.total_payable)
        .bind(run.locked_at)
        .bind(run.paid_at)
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| StoreError::NotFound(format!("Payroll run with id {} not found", id)))?;

        Ok(PayrollRun::from(row))
    }

    async fn records_for_run(&self, run_id: Id) -> StoreResult<Vec<PayrollRecord>> {
        let rows = sqlx::query_as::<_, PayrollRecordRow>(&format!(
            "SELECT {RECORD_COLUMNS} FROM payroll_records WHERE run_id = $1 ORDER BY employee_id"
        ))
        .bind(run_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(PayrollRecord::from).collect())
    }

    async fn delete_records_for_run(&self, run_id: Id) -> StoreResult<u64> {
        let result = sqlx::query("DELETE FROM payroll_records WHERE run_id = $1")
            .bind(run_id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }

    async fn insert_records(&self, records: &[PayrollRecord]) -> StoreResult<Vec<PayrollRecord>> {
        let mut inserted = Vec::with_capacity(records.len());

        for record in records {
            let row = sqlx::query_as::<_, PayrollRecordRow>(&format!(
                "INSERT INTO payroll_records ( \
                    run_id, employee_id, employee_name, total_hours, billable_hours, \
                    non_billable_hours, hourly_rate, base_pay, overtime_hours, \
                    overtime_amount, bonus, deductions, total_payable, created_at, updated_at \
                 ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, NOW(), NOW()) \
                 RETURNING {RECORD_COLUMNS}"
            ))
            .bind(record.run_id)
            .bind(record.employee_id)
            .bind(&record.employee_name)
            .bind(record.total_hours)
            .bind(record.billable_hours)
            .bind(record.non_billable_hours)
            .bind(record.hourly_rate)
            .bind(record.base_pay)
            .bind(record.overtime_hours)
            .bind(record.overtime_amount)
            .bind(record.bonus)
            .bind(record.deductions)
            .bind(record.total_payable)
            .fetch_one(&self.pool)
            .await?;

            inserted.push(PayrollRecord::from(row));
        }

        Ok(inserted)
    }
}

/// In-memory payroll store for tests
pub struct MemoryPayrollStore {
    runs: RwLock<Vec<PayrollRun>>,
    records: RwLock<Vec<PayrollRecord>>,
    next_run_id: AtomicI64,
    next_record_id: AtomicI64,
}

impl Default for MemoryPayrollStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryPayrollStore {
    pub fn new() -> Self {
        Self {
            runs: RwLock::new(Vec::new()),
            records: RwLock::new(Vec::new()),
            next_run_id: AtomicI64::new(1),
            next_record_id: AtomicI64::new(1),
        }
    }
}

#[async_trait]
impl PayrollStore for MemoryPayrollStore {
    async fn find_run_by_id(&self, id: Id) -> StoreResult<Option<PayrollRun>> {
        let runs = self.runs.read().await;
        Ok(runs.iter().find(|r| r.id == Some(id)).cloned())
    }

    async fn find_run_by_period(&self, period: &str) -> StoreResult<Option<PayrollRun>> {
        let runs = self.runs.read().await;
        Ok(runs.iter().find(|r| r.period == period).cloned())
    }

    async fn list_runs(&self, pagination: Pagination) -> StoreResult<PaginatedResult<PayrollRun>> {
        let pagination = pagination.clamped();
        let runs = self.runs.read().await;
        let mut found: Vec<PayrollRun> = runs.iter().cloned().collect();
        found.sort_by(|a, b| b.period.cmp(&a.period));

        let total = found.len() as i64;
        let items = found
            .into_iter()
            .skip(pagination.offset as usize)
            .take(pagination.limit as usize)
            .collect();

        Ok(PaginatedResult::new(items, total, pagination))
    }

    async fn insert_run(&self, run: &PayrollRun) -> StoreResult<PayrollRun> {
        {
            let runs = self.runs.read().await;
            if runs.iter().any(|r| r.period == run.period) {
                return Err(StoreError::Conflict(format!(
                    "payroll run for period {} already exists",
                    run.period
                )));
            }
        }

        let mut stored = run.clone();
        stored.id = Some(self.next_run_id.fetch_add(1, Ordering::SeqCst));
        if stored.created_at.is_none() {
            stored.created_at = Some(Utc::now());
        }
        if stored.updated_at.is_none() {
            stored.updated_at = Some(Utc::now());
        }

        let mut runs = self.runs.write().await;
        runs.push(stored.clone());
        Ok(stored)
    }

    async fn update_run(&self, run: &PayrollRun) -> StoreResult<PayrollRun> {
        let id = run
            .id
            .ok_or_else(|| StoreError::Conflict("cannot update an unsaved payroll run".into()))?;

        let mut stored = run.clone();
        stored.updated_at = Some(Utc::now());

        let mut runs = self.runs.write().await;
        let pos = runs
            .iter()
            .position(|r| r.id == Some(id))
            .ok_or_else(|| StoreError::NotFound(format!("Payroll run with id {} not found", id)))?;
        runs[pos] = stored.clone();
        Ok(stored)
    }

    async fn records_for_run(&self, run_id: Id) -> StoreResult<Vec<PayrollRecord>> {
        let records = self.records.read().await;
        let mut found: Vec<PayrollRecord> = records
            .iter()
            .filter(|r| r.run_id == run_id)
            .cloned()
            .collect();
        found.sort_by_key(|r| r.employee_id);
        Ok(found)
    }

    async fn delete_records_for_run(&self, run_id: Id) -> StoreResult<u64> {
        let mut records = self.records.write().await;
        let before = records.len();
        records.retain(|r| r.run_id != run_id);
        Ok((before - records.len()) as u64)
    }

    async fn insert_records(&self, new_records: &[PayrollRecord]) -> StoreResult<Vec<PayrollRecord>> {
        let mut inserted = Vec::with_capacity(new_records.len());
        let mut records = self.records.write().await;

        for record in new_records {
            let mut stored = record.clone();
            stored.id = Some(self.next_record_id.fetch_add(1, Ordering::SeqCst));
            if stored.created_at.is_none() {
                stored.created_at = Some(Utc::now());
            }
            if stored.updated_at.is_none() {
                stored.updated_at = Some(Utc::now());
            }
            records.push(stored.clone());
            inserted.push(stored);
        }

        Ok(inserted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ops_models::PayPeriod;

    fn draft_run(period: &str) -> PayrollRun {
        PayrollRun::draft(period.parse::<PayPeriod>().unwrap())
    }

    #[tokio::test]
    async fn test_period_uniqueness() {
        let store = MemoryPayrollStore::new();
        store.insert_run(&draft_run("2025-03")).await.unwrap();

        assert!(matches!(
            store.insert_run(&draft_run("2025-03")).await,
            Err(StoreError::Conflict(_))
        ));
    }

    #[tokio::test]
    async fn test_wipe_only_touches_one_run() {
        let store = MemoryPayrollStore::new();
        let first = store.insert_run(&draft_run("2025-03")).await.unwrap();
        let second = store.insert_run(&draft_run("2025-04")).await.unwrap();

        let records = vec![
            PayrollRecord::new(first.id.unwrap(), 1, "Ada"),
            PayrollRecord::new(first.id.unwrap(), 2, "Bob"),
            PayrollRecord::new(second.id.unwrap(), 1, "Ada"),
        ];
        store.insert_records(&records).await.unwrap();

        let removed = store
            .delete_records_for_run(first.id.unwrap())
            .await
            .unwrap();
        assert_eq!(removed, 2);

        assert!(store
            .records_for_run(first.id.unwrap())
            .await
            .unwrap()
            .is_empty());
        assert_eq!(
            store.records_for_run(second.id.unwrap()).await.unwrap().len(),
            1
        );
    }

    #[tokio::test]
    async fn test_find_run_by_period() {
        let store = MemoryPayrollStore::new();
        let run = store.insert_run(&draft_run("2025-03")).await.unwrap();

        let found = store.find_run_by_period("2025-03").await.unwrap();
        assert_eq!(found.and_then(|r| r.id), run.id);
        assert!(store.find_run_by_period("2025-04").await.unwrap().is_none());
    }
}
