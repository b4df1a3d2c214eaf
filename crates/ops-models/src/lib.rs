//! # ops-models
//!
//! Domain models for OpsConsole: time entries, projects, employees, clients,
//! invoices, and payroll runs. Models are plain data with serde/JSON support;
//! persistence lives in `ops-db` and behavior in the engine crates.

pub mod client;
pub mod employee;
pub mod invoice;
pub mod payroll;
pub mod project;
pub mod time_entry;

pub use client::Client;
pub use employee::Employee;
pub use invoice::{
    round_cents, CreateInvoiceDto, Invoice, InvoiceItem, InvoiceStatus, UpdateInvoiceDto,
};
pub use payroll::{PayPeriod, PayrollRecord, PayrollRun, PayrollRunStatus, PeriodParseError};
pub use project::Project;
pub use time_entry::{TimeEntry, TimeEntryStatus, TimerLog, TimerSession};
