//! Billing for opsconsole.
//!
//! Two halves: [`InvoiceService`] backs the manual invoice endpoints, and
//! [`OverrunAutomator`] reacts to time-entry changes by drafting an invoice
//! once a project's logged hours reach its estimate. Both write through the
//! same invoice store.

pub mod automator;
pub mod service;

pub use automator::{OverrunAutomator, AUTOMATOR_ACTOR};
pub use service::{BillingError, BillingResult, InvoiceService};
