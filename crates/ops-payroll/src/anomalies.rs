//! Payroll anomaly screen
//!
//! Flags payroll records an operator should look at before locking a run.
//! Findings are advisory: nothing here mutates a record, and a record can
//! carry more than one finding.

use ops_core::config::PayrollConfig;
use ops_core::traits::Id;
use ops_models::PayrollRecord;
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AnomalyKind {
    ZeroRateWithHours,
    ZeroPayWithHours,
    ExcessiveOvertime,
    DeductionsExceedHalfBase,
}

impl AnomalyKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ZeroRateWithHours => "zero_rate_with_hours",
            Self::ZeroPayWithHours => "zero_pay_with_hours",
            Self::ExcessiveOvertime => "excessive_overtime",
            Self::DeductionsExceedHalfBase => "deductions_exceed_half_base",
        }
    }
}

/// One reviewable finding against a payroll record.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Anomaly {
    pub record_id: Option<Id>,
    pub employee_id: Id,
    pub employee_name: String,
    pub kind: AnomalyKind,
    pub detail: String,
}

impl Anomaly {
    fn flag(record: &PayrollRecord, kind: AnomalyKind, detail: String) -> Self {
        Self {
            record_id: record.id,
            employee_id: record.employee_id,
            employee_name: record.employee_name.clone(),
            kind,
            detail,
        }
    }
}

/// Run every anomaly rule over a run's records.
pub fn screen_records(records: &[PayrollRecord], config: &PayrollConfig) -> Vec<Anomaly> {
    let mut findings = Vec::new();

    for record in records {
        if record.total_hours > 0.0 && record.hourly_rate == 0.0 {
            findings.push(Anomaly::flag(
                record,
                AnomalyKind::ZeroRateWithHours,
                format!("{:.1}h logged with no cost rate on file", record.total_hours),
            ));
        }
        if record.total_hours > 0.0 && record.total_payable == 0.0 {
            findings.push(Anomaly::flag(
                record,
                AnomalyKind::ZeroPayWithHours,
                format!(
                    "{:.1}h logged but the payable amount computes to zero",
                    record.total_hours
                ),
            ));
        }
        if record.overtime_hours > config.excessive_overtime_hours {
            findings.push(Anomaly::flag(
                record,
                AnomalyKind::ExcessiveOvertime,
                format!(
                    "{:.1}h overtime exceeds the {:.0}h review ceiling",
                    record.overtime_hours, config.excessive_overtime_hours
                ),
            ));
        }
        if record.deductions > 0.0 && record.deductions > record.base_pay / 2.0 {
            findings.push(Anomaly::flag(
                record,
                AnomalyKind::DeductionsExceedHalfBase,
                format!(
                    "deductions of {:.2} exceed half of base pay {:.2}",
                    record.deductions, record.base_pay
                ),
            ));
        }
    }

    findings
}
