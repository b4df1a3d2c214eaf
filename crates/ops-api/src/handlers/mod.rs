//! API request handlers

pub mod invoices;
pub mod notifications;
pub mod payroll;
pub mod time_entries;
