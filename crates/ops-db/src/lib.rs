//! # ops-db
//!
//! Database layer for OpsConsole.
//!
//! This crate provides PostgreSQL access using SQLx, including:
//!
//! - Connection pool management
//! - Store traits the engines depend on
//! - Postgres implementations plus in-memory stores for tests
//!
//! ## Example
//!
//! ```ignore
//! use ops_db::{Database, PgTimeEntryStore, TimeEntryStore};
//!
//! let db = Database::connect(&config.database).await?;
//! let store = PgTimeEntryStore::new(db.pool().clone());
//! let entry = store.find_by_id(1).await?;
//! ```

pub mod clients;
pub mod employees;
pub mod invoices;
pub mod payroll;
pub mod pool;
pub mod projects;
pub mod repository;
pub mod time_entries;

// Re-exports
pub use clients::{ClientRow, ClientStore, MemoryClientStore, PgClientStore};
pub use employees::{EmployeeRow, EmployeeStore, MemoryEmployeeStore, PgEmployeeStore};
pub use invoices::{InvoiceRow, InvoiceStore, MemoryInvoiceStore, PgInvoiceStore};
pub use payroll::{
    MemoryPayrollStore, PayrollRecordRow, PayrollRunRow, PayrollStore, PgPayrollStore,
};
pub use pool::Database;
pub use projects::{MemoryProjectStore, PgProjectStore, ProjectRow, ProjectStore};
pub use repository::{PaginatedResult, Pagination, StoreError, StoreResult};
pub use time_entries::{
    MemoryTimeEntryStore, PgTimeEntryStore, TimeEntryFilter, TimeEntryRow, TimeEntryStore,
};
