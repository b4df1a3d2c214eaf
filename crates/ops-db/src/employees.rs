//! Employee store

use std::sync::atomic::{AtomicI64, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use ops_core::traits::Id;
use ops_models::Employee;
use sqlx::{FromRow, PgPool};
use tokio::sync::RwLock;

use crate::repository::StoreResult;

const COLUMNS: &str =
    "id, name, email, department, designation, hourly_cost_rate, active, created_at, updated_at";

/// Employee database row
#[derive(Debug, Clone, FromRow)]
pub struct EmployeeRow {
    pub id: i64,
    pub name: String,
    pub email: String,
    pub department: Option<String>,
    pub designation: Option<String>,
    pub hourly_cost_rate: f64,
    pub active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<EmployeeRow> for Employee {
    fn from(row: EmployeeRow) -> Self {
        Employee {
            id: Some(row.id),
            name: row.name,
            email: row.email,
            department: row.department,
            designation: row.designation,
            hourly_cost_rate: row.hourly_cost_rate,
            active: row.active,
            created_at: Some(row.created_at),
            updated_at: Some(row.updated_at),
        }
    }
}

/// Employee storage trait
#[async_trait]
pub trait EmployeeStore: Send + Sync {
    /// Find an employee by ID
    async fn find_by_id(&self, id: Id) -> StoreResult<Option<Employee>>;

    /// All active employees, ordered by ID
    async fn find_active(&self) -> StoreResult<Vec<Employee>>;

    /// Insert a new employee and return it with its assigned ID
    async fn insert(&self, employee: &Employee) -> StoreResult<Employee>;
}

/// Postgres employee store
pub struct PgEmployeeStore {
    pool: PgPool,
}

impl PgEmployeeStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl EmployeeStore for PgEmployeeStore {
    async fn find_by_id(&self, id: Id) -> StoreResult<Option<Employee>> {
        let row = sqlx::query_as::<_, EmployeeRow>(&format!(
            "SELECT {COLUMNS} FROM employees WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(Employee::from))
    }

    async fn find_active(&self) -> StoreResult<Vec<Employee>> {
        let rows = sqlx::query_as::<_, EmployeeRow>(&format!(
            "SELECT {COLUMNS} FROM employees WHERE active = TRUE ORDER BY id"
        ))
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(Employee::from).collect())
    }

    async fn insert(&self, employee: &Employee) -> StoreResult<Employee> {
        let row = sqlx::query_as::<_, EmployeeRow>(&format!(
            "INSERT INTO employees (name, email, department, designation, hourly_cost_rate, active, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, NOW(), NOW()) \
             RETURNING {COLUMNS}"
        ))
        .bind(&employee.name)
        .bind(&employee.email)
        .bind(&employee.department)
        .bind(&employee.designation)
        .bind(employee.hourly_cost_rate)
        .bind(employee.active)
        .fetch_one(&self.pool)
        .await?;

        Ok(Employee::from(row))
    }
}

/// In-memory employee store for tests
pub struct MemoryEmployeeStore {
    employees: RwLock<Vec<Employee>>,
    next_id: AtomicI64,
}

impl Default for MemoryEmployeeStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryEmployeeStore {
    pub fn new() -> Self {
        Self {
            employees: RwLock::new(Vec::new()),
            next_id: AtomicI64::new(1),
        }
    }
}

#[async_trait]
impl EmployeeStore for MemoryEmployeeStore {
    async fn find_by_id(&self, id: Id) -> StoreResult<Option<Employee>> {
        let employees = self.employees.read().await;
        Ok(employees.iter().find(|e| e.id == Some(id)).cloned())
    }

    async fn find_active(&self) -> StoreResult<Vec<Employee>> {
        let employees = self.employees.read().await;
        let mut active: Vec<Employee> = employees.iter().filter(|e| e.active).cloned().collect();
        active.sort_by_key(|e| e.id);
        Ok(active)
    }

    async fn insert(&self, employee: &Employee) -> StoreResult<Employee> {
        let mut stored = employee.clone();
        stored.id = Some(self.next_id.fetch_add(1, Ordering::SeqCst));
        if stored.created_at.is_none() {
            stored.created_at = Some(Utc::now());
        }
        if stored.updated_at.is_none() {
            stored.updated_at = Some(Utc::now());
        }

        let mut employees = self.employees.write().await;
        employees.push(stored.clone());
        Ok(stored)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_find_active_excludes_inactive() {
        let store = MemoryEmployeeStore::new();

        store
            .insert(&Employee::new("Ada", "ada@example.com"))
            .await
            .unwrap();

        let mut inactive = Employee::new("Bob", "bob@example.com");
        inactive.active = false;
        store.insert(&inactive).await.unwrap();

        let active = store.find_active().await.unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].name, "Ada");
    }
}
