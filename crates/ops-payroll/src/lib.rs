//! Payroll for opsconsole.
//!
//! [`PayrollEngine`] aggregates a month of time entries into per-employee
//! payable records with a wipe-and-rebuild strategy for draft runs, one-way
//! lock and pay transitions, and an advisory anomaly screen.

pub mod anomalies;
pub mod engine;

pub use anomalies::{screen_records, Anomaly, AnomalyKind};
pub use engine::{PayrollEngine, PayrollError, PayrollResult};
