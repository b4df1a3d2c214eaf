//! Payroll models
//!
//! A run is the monthly container; records are the per-employee rows wiped
//! and rebuilt on every draft recalculation. Anomaly findings are derived on
//! demand and never stored.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Duration, NaiveDate, Utc};
use ops_core::traits::{Entity, Id, Identifiable, Timestamped};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::invoice::round_cents;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PeriodParseError {
    #[error("invalid pay period '{0}', expected format YYYY-MM")]
    Invalid(String),
}

/// Calendar-month pay period, canonically labelled `YYYY-MM`.
///
/// Parsing is strict so the label doubles as the run's unique key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PayPeriod {
    year: i32,
    month: u32,
}

impl PayPeriod {
    pub fn new(year: i32, month: u32) -> Result<Self, PeriodParseError> {
        if !(1970..=9999).contains(&year) || !(1..=12).contains(&month) {
            return Err(PeriodParseError::Invalid(format!("{year}-{month}")));
        }
        Ok(Self { year, month })
    }

    pub fn year(&self) -> i32 {
        self.year
    }

    pub fn month(&self) -> u32 {
        self.month
    }

    /// First calendar day of the period.
    pub fn first_day(&self) -> NaiveDate {
        // month is validated to 1..=12 at construction
        NaiveDate::from_ymd_opt(self.year, self.month, 1).expect("validated period")
    }

    /// Last calendar day of the period.
    pub fn last_day(&self) -> NaiveDate {
        let (year, month) = if self.month == 12 {
            (self.year + 1, 1)
        } else {
            (self.year, self.month + 1)
        };
        let next_first = NaiveDate::from_ymd_opt(year, month, 1).expect("validated period");
        next_first - Duration::days(1)
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        date >= self.first_day() && date <= self.last_day()
    }
}

impl fmt::Display for PayPeriod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

impl FromStr for PayPeriod {
    type Err = PeriodParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || PeriodParseError::Invalid(s.to_string());
        let (year, month) = s.split_once('-').ok_or_else(invalid)?;
        if year.len() != 4 || month.len() != 2 {
            return Err(invalid());
        }
        let year: i32 = year.parse().map_err(|_| invalid())?;
        let month: u32 = month.parse().map_err(|_| invalid())?;
        Self::new(year, month).map_err(|_| invalid())
    }
}

impl TryFrom<String> for PayPeriod {
    type Error = PeriodParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<PayPeriod> for String {
    fn from(period: PayPeriod) -> Self {
        period.to_string()
    }
}

/// Payroll run lifecycle status
///
/// `Draft` is the only recalculable state. `Locked` and `Paid` are one-way.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PayrollRunStatus {
    #[default]
    Draft,
    Locked,
    Paid,
}

impl PayrollRunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Locked => "locked",
            Self::Paid => "paid",
        }
    }

    pub fn from_str(s: &str) -> Self {
        match s {
            "locked" => Self::Locked,
            "paid" => Self::Paid,
            _ => Self::Draft,
        }
    }
}

/// Payroll run entity
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PayrollRun {
    pub id: Option<Id>,
    /// Canonical `YYYY-MM` label, unique per run.
    pub period: String,
    pub status: PayrollRunStatus,
    pub total_employees: i64,
    pub total_approved_hours: f64,
    pub total_payable: f64,
    pub locked_at: Option<DateTime<Utc>>,
    pub paid_at: Option<DateTime<Utc>>,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl PayrollRun {
    pub fn draft(period: PayPeriod) -> Self {
        Self {
            id: None,
            period: period.to_string(),
            status: PayrollRunStatus::Draft,
            total_employees: 0,
            total_approved_hours: 0.0,
            total_payable: 0.0,
            locked_at: None,
            paid_at: None,
            created_at: None,
            updated_at: None,
        }
    }

    pub fn is_draft(&self) -> bool {
        self.status == PayrollRunStatus::Draft
    }

    pub fn is_locked(&self) -> bool {
        self.status == PayrollRunStatus::Locked
    }

    pub fn is_paid(&self) -> bool {
        self.status == PayrollRunStatus::Paid
    }
}

impl Identifiable for PayrollRun {
    fn id(&self) -> Option<Id> {
        self.id
    }
}

impl Timestamped for PayrollRun {
    fn created_at(&self) -> Option<DateTime<Utc>> {
        self.created_at
    }

    fn updated_at(&self) -> Option<DateTime<Utc>> {
        self.updated_at
    }
}

impl Entity for PayrollRun {
    const TABLE_NAME: &'static str = "payroll_runs";
    const TYPE_NAME: &'static str = "PayrollRun";
}

/// Per-employee payroll record
///
/// `base_pay` covers every hour at the employee's cost rate; overtime pays
/// only the premium on top, so the multiplier applies once.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PayrollRecord {
    pub id: Option<Id>,
    pub run_id: Id,
    pub employee_id: Id,
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
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl PayrollRecord {
    pub fn new(run_id: Id, employee_id: Id, employee_name: impl Into<String>) -> Self {
        Self {
            id: None,
            run_id,
            employee_id,
            employee_name: employee_name.into(),
            total_hours: 0.0,
            billable_hours: 0.0,
            non_billable_hours: 0.0,
            hourly_rate: 0.0,
            base_pay: 0.0,
            overtime_hours: 0.0,
            overtime_amount: 0.0,
            bonus: 0.0,
            deductions: 0.0,
            total_payable: 0.0,
            created_at: None,
            updated_at: None,
        }
    }

    /// Recomputes the derived pay figures from hours and rate.
    ///
    /// Hours above `overtime_threshold` earn the premium share of the
    /// multiplier on top of base pay.
    pub fn recompute_pay(&mut self, overtime_threshold: f64, overtime_multiplier: f64) {
        self.base_pay = round_cents(self.total_hours * self.hourly_rate);
        self.overtime_hours = (self.total_hours - overtime_threshold).max(0.0);
        self.overtime_amount = round_cents(
            self.overtime_hours * self.hourly_rate * (overtime_multiplier - 1.0).max(0.0),
        );
        self.recompute_payable();
    }

    pub fn recompute_payable(&mut self) {
        self.total_payable =
            round_cents(self.base_pay + self.overtime_amount + self.bonus - self.deductions);
    }
}

impl Identifiable for PayrollRecord {
    fn id(&self) -> Option<Id> {
        self.id
    }
}

impl Timestamped for PayrollRecord {
    fn created_at(&self) -> Option<DateTime<Utc>> {
        self.created_at
    }

    fn updated_at(&self) -> Option<DateTime<Utc>> {
        self.updated_at
    }
}

impl Entity for PayrollRecord {
    const TABLE_NAME: &'static str = "payroll_records";
    const TYPE_NAME: &'static str = "PayrollRecord";
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_period_parse_and_bounds() {
        let period: PayPeriod = "2025-03".parse().unwrap();
        assert_eq!(period.year(), 2025);
        assert_eq!(period.month(), 3);
        assert_eq!(period.first_day(), NaiveDate::from_ymd_opt(2025, 3, 1).unwrap());
        assert_eq!(period.last_day(), NaiveDate::from_ymd_opt(2025, 3, 31).unwrap());
        assert_eq!(period.to_string(), "2025-03");
    }

    #[test]
    fn test_period_december_and_leap_february() {
        let december: PayPeriod = "2025-12".parse().unwrap();
        assert_eq!(december.last_day(), NaiveDate::from_ymd_opt(2025, 12, 31).unwrap());

        let february: PayPeriod = "2024-02".parse().unwrap();
        assert_eq!(february.last_day(), NaiveDate::from_ymd_opt(2024, 2, 29).unwrap());
    }

    #[test]
    fn test_period_rejects_malformed_input() {
        for input in ["2025-13", "2025-00", "202503", "2025-3", "25-03", "march", ""] {
            assert!(input.parse::<PayPeriod>().is_err(), "accepted {input:?}");
        }
    }

    #[test]
    fn test_period_contains() {
        let period: PayPeriod = "2025-03".parse().unwrap();
        assert!(period.contains(NaiveDate::from_ymd_opt(2025, 3, 1).unwrap()));
        assert!(period.contains(NaiveDate::from_ymd_opt(2025, 3, 31).unwrap()));
        assert!(!period.contains(NaiveDate::from_ymd_opt(2025, 2, 28).unwrap()));
        assert!(!period.contains(NaiveDate::from_ymd_opt(2025, 4, 1).unwrap()));
    }

    #[test]
    fn test_recompute_pay_without_overtime() {
        let mut record = PayrollRecord::new(1, 2, "Ada");
        record.total_hours = 120.0;
        record.hourly_rate = 50.0;
        record.recompute_pay(160.0, 1.5);

        assert_eq!(record.base_pay, 6000.0);
        assert_eq!(record.overtime_hours, 0.0);
        assert_eq!(record.overtime_amount, 0.0);
        assert_eq!(record.total_payable, 6000.0);
    }

    #[test]
    fn test_recompute_pay_with_overtime_premium() {
        let mut record = PayrollRecord::new(1, 2, "Ada");
        record.total_hours = 180.0;
        record.hourly_rate = 50.0;
        record.recompute_pay(160.0, 1.5);

        // 180h at base rate plus the 0.5x premium on the 20 overtime hours
        assert_eq!(record.base_pay, 9000.0);
        assert_eq!(record.overtime_hours, 20.0);
        assert_eq!(record.overtime_amount, 500.0);
        assert_eq!(record.total_payable, 9500.0);
    }

    #[test]
    fn test_payable_includes_bonus_and_deductions() {
        let mut record = PayrollRecord::new(1, 2, "Ada");
        record.total_hours = 100.0;
        record.hourly_rate = 40.0;
        record.recompute_pay(160.0, 1.5);
        record.bonus = 250.0;
        record.deductions = 100.0;
        record.recompute_payable();

        assert_eq!(record.total_payable, 4150.0);
    }

    #[test]
    fn test_run_status_round_trip() {
        for status in [
            PayrollRunStatus::Draft,
            PayrollRunStatus::Locked,
            PayrollRunStatus::Paid,
        ] {
            assert_eq!(PayrollRunStatus::from_str(status.as_str()), status);
        }
    }
}
