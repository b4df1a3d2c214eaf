//! Payroll aggregation engine
//!
//! Turns a month of time entries into payable records. Draft runs are
//! recalculated destructively: every existing record for the run is wiped
//! and the full set is rebuilt from the current entries, which keeps
//! repeated recalculation safe while approvals are still moving. Locking a
//! run closes it to this engine for good.

use std::sync::Arc;

use ops_core::config::PayrollConfig;
use ops_core::lock::{LockKey, LockRegistry};
use ops_core::traits::Id;
use ops_core::Clock;
use ops_db::{EmployeeStore, PaginatedResult, Pagination, PayrollStore, StoreError, TimeEntryStore};
use ops_models::payroll::PayrollRunStatus;
use ops_models::{round_cents, PayPeriod, PayrollRecord, PayrollRun};
use ops_notifications::{Audience, Notification, NotificationKind, NotificationSink};
use thiserror::Error;

use crate::anomalies::{screen_records, Anomaly};

/// Payroll errors
#[derive(Debug, Error)]
pub enum PayrollError {
    #[error("Payroll run {0} not found")]
    RunNotFound(Id),

    #[error("Payroll run {id} is {} and cannot be locked", status.as_str())]
    NotLockable { id: Id, status: PayrollRunStatus },

    #[error("Payroll run {id} is {} and cannot be marked paid", status.as_str())]
    NotPayable { id: Id, status: PayrollRunStatus },

    #[error(transparent)]
    Store(#[from] StoreError),
}

pub type PayrollResult<T> = Result<T, PayrollError>;

/// Payroll aggregation engine
pub struct PayrollEngine {
    payroll: Arc<dyn PayrollStore>,
    entries: Arc<dyn TimeEntryStore>,
    employees: Arc<dyn EmployeeStore>,
    notifications: Arc<dyn NotificationSink>,
    locks: Arc<LockRegistry>,
    clock: Arc<dyn Clock>,
    config: PayrollConfig,
}

impl PayrollEngine {
    pub fn new(
        payroll: Arc<dyn PayrollStore>,
        entries: Arc<dyn TimeEntryStore>,
        employees: Arc<dyn EmployeeStore>,
        notifications: Arc<dyn NotificationSink>,
        locks: Arc<LockRegistry>,
        clock: Arc<dyn Clock>,
        config: &PayrollConfig,
    ) -> Self {
        Self {
            payroll,
            entries,
            employees,
            notifications,
            locks,
            clock,
            config: config.clone(),
        }
    }

    /// Produce or refresh the run for a period.
    ///
    /// Holds the per-period lock across the wipe and rebuild, so a
    /// concurrent recalculation can never observe a half-built record set.
    /// Locked and Paid runs are returned untouched.
    pub async fn calculate(&self, period: PayPeriod) -> PayrollResult<PayrollRun> {
        let label = period.to_string();
        let _guard = self.locks.acquire(LockKey::Period(label.clone())).await;

        let mut run = match self.payroll.find_run_by_period(&label).await? {
            Some(run) if run.is_draft() => {
                let run_id = run.id.unwrap_or_default();
                let removed = self.payroll.delete_records_for_run(run_id).await?;
                tracing::debug!(run_id, removed, "wiped draft payroll records for rebuild");
                run
            }
            Some(run) => {
                tracing::info!(
                    run_id = ?run.id,
                    status = run.status.as_str(),
                    "payroll run is closed, returning unchanged"
                );
                return Ok(run);
            }
            None => self.payroll.insert_run(&PayrollRun::draft(period)).await?,
        };
        let run_id = run.id.unwrap_or_default();

        let first_day = period.first_day();
        let last_day = period.last_day();

        let mut records = Vec::new();
        for employee in self.employees.find_active().await? {
            let employee_id = employee.id.unwrap_or_default();
            let entries = self
                .entries
                .find_for_employee_in_range(employee_id, first_day, last_day)
                .await?;

            let billable_hours: f64 = entries
                .iter()
                .filter(|e| e.billable)
                .map(|e| e.duration_hours())
                .sum();
            let non_billable_hours: f64 = entries
                .iter()
                .filter(|e| !e.billable)
                .map(|e| e.duration_hours())
                .sum();
            let total_hours = billable_hours + non_billable_hours;

            // nothing to pay and nothing to report
            if total_hours == 0.0 && employee.hourly_cost_rate == 0.0 {
                continue;
            }

            let mut record = PayrollRecord::new(run_id, employee_id, employee.name.clone());
            record.total_hours = total_hours;
            record.billable_hours = billable_hours;
            record.non_billable_hours = non_billable_hours;
            record.hourly_rate = employee.hourly_cost_rate;
            record.recompute_pay(
                self.config.overtime_threshold_hours,
                self.config.overtime_multiplier,
            );
            records.push(record);
        }

        let written = self.payroll.insert_records(&records).await?;

        run.total_employees = written.len() as i64;
        run.total_approved_hours = written.iter().map(|r| r.total_hours).sum();
        run.total_payable = round_cents(written.iter().map(|r| r.total_payable).sum());

        let run = self.payroll.update_run(&run).await?;
        tracing::info!(
            run_id,
            period = %label,
            employees = run.total_employees,
            total_payable = run.total_payable,
            "payroll run calculated"
        );
        Ok(run)
    }

    /// Lock a draft run against further recalculation.
    pub async fn lock(&self, run_id: Id) -> PayrollResult<PayrollRun> {
        let preload = self.require_run(run_id).await?;
        let _guard = self.locks.acquire(LockKey::Period(preload.period)).await;
        let mut run = self.require_run(run_id).await?;

        if !run.is_draft() {
            return Err(PayrollError::NotLockable {
                id: run_id,
                status: run.status,
            });
        }

        run.status = PayrollRunStatus::Locked;
        run.locked_at = Some(self.clock.now());
        let run = self.payroll.update_run(&run).await?;
        tracing::info!(run_id, period = %run.period, "payroll run locked");

        self.notify(
            NotificationKind::PayrollLocked,
            format!("Payroll locked for {}", run.period),
            format!(
                "Run covers {} employees with a total payable of {:.2}",
                run.total_employees, run.total_payable
            ),
        )
        .await;
        Ok(run)
    }

    /// Mark a locked run as paid out.
    pub async fn mark_paid(&self, run_id: Id) -> PayrollResult<PayrollRun> {
        let preload = self.require_run(run_id).await?;
        let _guard = self.locks.acquire(LockKey::Period(preload.period)).await;
        let mut run = self.require_run(run_id).await?;

        if !run.is_locked() {
            return Err(PayrollError::NotPayable {
                id: run_id,
                status: run.status,
            });
        }

        run.status = PayrollRunStatus::Paid;
        run.paid_at = Some(self.clock.now());
        let run = self.payroll.update_run(&run).await?;
        tracing::info!(run_id, period = %run.period, "payroll run marked paid");

        self.notify(
            NotificationKind::PayrollPaid,
            format!("Payroll paid for {}", run.period),
            format!("{:.2} paid out across {} employees", run.total_payable, run.total_employees),
        )
        .await;
        Ok(run)
    }

    pub async fn get_run(&self, run_id: Id) -> PayrollResult<PayrollRun> {
        self.require_run(run_id).await
    }

    pub async fn list_runs(
        &self,
        pagination: Pagination,
    ) -> PayrollResult<PaginatedResult<PayrollRun>> {
        Ok(self.payroll.list_runs(pagination).await?)
    }

    pub async fn records(&self, run_id: Id) -> PayrollResult<Vec<PayrollRecord>> {
        self.require_run(run_id).await?;
        Ok(self.payroll.records_for_run(run_id).await?)
    }

    /// Anomaly pass over a run's records. Findings are computed on demand
    /// and never written back.
    pub async fn screen(&self, run_id: Id) -> PayrollResult<Vec<Anomaly>> {
        let records = self.records(run_id).await?;
        Ok(screen_records(&records, &self.config))
    }

    async fn require_run(&self, run_id: Id) -> PayrollResult<PayrollRun> {
        self.payroll
            .find_run_by_id(run_id)
            .await?
            .ok_or(PayrollError::RunNotFound(run_id))
    }

    async fn notify(&self, kind: NotificationKind, title: String, message: String) {
        let mut notification = Notification::new(Audience::Finance, kind, title, message);
        if let Err(error) = self.notifications.add(&mut notification).await {
            tracing::error!(%error, "failed to record payroll notification");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, Utc};
    use ops_core::ManualClock;
    use ops_db::{MemoryEmployeeStore, MemoryPayrollStore, MemoryTimeEntryStore};
    use ops_models::time_entry::{TimeEntry, TimeEntryStatus};
    use ops_models::Employee;
    use ops_notifications::MemoryNotificationSink;

    struct Fixture {
        engine: PayrollEngine,
        entries: Arc<MemoryTimeEntryStore>,
        employees: Arc<MemoryEmployeeStore>,
        payroll: Arc<MemoryPayrollStore>,
        sink: Arc<MemoryNotificationSink>,
    }

    fn march() -> PayPeriod {
        PayPeriod::new(2025, 3).unwrap()
    }

    async fn fixture() -> Fixture {
        let payroll = Arc::new(MemoryPayrollStore::new());
        let entries = Arc::new(MemoryTimeEntryStore::new());
        let employees = Arc::new(MemoryEmployeeStore::new());
        let sink = Arc::new(MemoryNotificationSink::new());

        let engine = PayrollEngine::new(
            payroll.clone(),
            entries.clone(),
            employees.clone(),
            sink.clone(),
            Arc::new(LockRegistry::new()),
            Arc::new(ManualClock::new(Utc::now())),
            &PayrollConfig {
                overtime_threshold_hours: 160.0,
                overtime_multiplier: 1.5,
                excessive_overtime_hours: 60.0,
            },
        );

        Fixture {
            engine,
            entries,
            employees,
            payroll,
            sink,
        }
    }

    async fn hire(f: &Fixture, name: &str, rate: f64) -> Id {
        let mut employee = Employee::new(name, format!("{}@example.com", name.to_lowercase()));
        employee.hourly_cost_rate = rate;
        f.employees.insert(&employee).await.unwrap().id.unwrap()
    }

    async fn log_minutes(f: &Fixture, employee_id: Id, date: NaiveDate, minutes: i64, billable: bool) {
        let now = Utc::now();
        let mut entry = TimeEntry::started(employee_id, 1, 1, billable, now);
        entry.date = date;
        entry.status = TimeEntryStatus::Submitted;
        entry.started_at = None;
        entry.ended_at = Some(now);
        entry.duration_minutes = minutes;
        f.entries.insert(&entry).await.unwrap();
    }

    #[tokio::test]
    async fn test_calculate_builds_records_and_totals() {
        let f = fixture().await;
        let dana = hire(&f, "Dana", 50.0).await;
        let eli = hire(&f, "Eli", 40.0).await;
        let mid_march = NaiveDate::from_ymd_opt(2025, 3, 14).unwrap();

        log_minutes(&f, dana, mid_march, 100 * 60, true).await;
        log_minutes(&f, dana, mid_march, 20 * 60, false).await;
        log_minutes(&f, eli, mid_march, 80 * 60, true).await;

        let run = f.engine.calculate(march()).await.unwrap();
        assert_eq!(run.status, PayrollRunStatus::Draft);
        assert_eq!(run.total_employees, 2);
        assert_eq!(run.total_approved_hours, 200.0);
        // 120h * 50 + 80h * 40
        assert_eq!(run.total_payable, 9200.0);

        let records = f.engine.records(run.id.unwrap()).await.unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].employee_id, dana);
        assert_eq!(records[0].total_hours, 120.0);
        assert_eq!(records[0].billable_hours, 100.0);
        assert_eq!(records[0].non_billable_hours, 20.0);
        assert_eq!(records[0].base_pay, 6000.0);
        assert_eq!(records[1].employee_id, eli);
        assert_eq!(records[1].base_pay, 3200.0);
    }

    #[tokio::test]
    async fn test_entries_outside_period_are_excluded() {
        let f = fixture().await;
        let dana = hire(&f, "Dana", 50.0).await;

        log_minutes(&f, dana, NaiveDate::from_ymd_opt(2025, 2, 28).unwrap(), 600, true).await;
        log_minutes(&f, dana, NaiveDate::from_ymd_opt(2025, 3, 1).unwrap(), 120, true).await;
        log_minutes(&f, dana, NaiveDate::from_ymd_opt(2025, 3, 31).unwrap(), 60, true).await;
        log_minutes(&f, dana, NaiveDate::from_ymd_opt(2025, 4, 1).unwrap(), 600, true).await;

        let run = f.engine.calculate(march()).await.unwrap();
        assert_eq!(run.total_approved_hours, 3.0);
    }

    #[tokio::test]
    async fn test_rebuild_is_deterministic_and_replaces_records() {
        let f = fixture().await;
        let dana = hire(&f, "Dana", 50.0).await;
        let mid_march = NaiveDate::from_ymd_opt(2025, 3, 10).unwrap();
        log_minutes(&f, dana, mid_march, 90 * 60, true).await;

        let first = f.engine.calculate(march()).await.unwrap();
        let first_records = f.engine.records(first.id.unwrap()).await.unwrap();

        let second = f.engine.calculate(march()).await.unwrap();
        let second_records = f.engine.records(second.id.unwrap()).await.unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(second_records.len(), first_records.len());
        assert_eq!(second_records[0].employee_id, first_records[0].employee_id);
        assert_eq!(second_records[0].total_hours, first_records[0].total_hours);
        assert_eq!(second_records[0].total_payable, first_records[0].total_payable);

        // new hours picked up on the next rebuild
        log_minutes(&f, dana, mid_march, 10 * 60, true).await;
        let third = f.engine.calculate(march()).await.unwrap();
        assert_eq!(third.total_approved_hours, 100.0);
        assert_eq!(f.engine.records(third.id.unwrap()).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_zero_hours_zero_rate_skipped_but_anomalous_kept() {
        let f = fixture().await;
        let idle_unpaid = hire(&f, "Idle", 0.0).await;
        let no_rate = hire(&f, "Norah", 0.0).await;
        let no_hours = hire(&f, "Quiet", 50.0).await;
        let mid_march = NaiveDate::from_ymd_opt(2025, 3, 5).unwrap();
        log_minutes(&f, no_rate, mid_march, 40 * 60, true).await;

        let run = f.engine.calculate(march()).await.unwrap();
        let records = f.engine.records(run.id.unwrap()).await.unwrap();

        let ids: Vec<Id> = records.iter().map(|r| r.employee_id).collect();
        assert!(!ids.contains(&idle_unpaid));
        assert!(ids.contains(&no_rate));
        assert!(ids.contains(&no_hours));
        assert_eq!(run.total_employees, 2);
    }

    #[tokio::test]
    async fn test_overtime_paid_at_premium() {
        let f = fixture().await;
        let dana = hire(&f, "Dana", 50.0).await;
        let mid_march = NaiveDate::from_ymd_opt(2025, 3, 20).unwrap();
        log_minutes(&f, dana, mid_march, 180 * 60, true).await;

        let run = f.engine.calculate(march()).await.unwrap();
        let records = f.engine.records(run.id.unwrap()).await.unwrap();

        assert_eq!(records[0].overtime_hours, 20.0);
        assert_eq!(records[0].base_pay, 9000.0);
        // 20h at half the 50.0 rate on top of base
        assert_eq!(records[0].overtime_amount, 500.0);
        assert_eq!(records[0].total_payable, 9500.0);
        assert_eq!(run.total_payable, 9500.0);
    }

    #[tokio::test]
    async fn test_locked_run_is_untouched_by_calculate() {
        let f = fixture().await;
        let dana = hire(&f, "Dana", 50.0).await;
        let mid_march = NaiveDate::from_ymd_opt(2025, 3, 12).unwrap();
        log_minutes(&f, dana, mid_march, 60 * 60, true).await;

        let run = f.engine.calculate(march()).await.unwrap();
        let locked = f.engine.lock(run.id.unwrap()).await.unwrap();
        assert_eq!(locked.status, PayrollRunStatus::Locked);
        assert!(locked.locked_at.is_some());

        log_minutes(&f, dana, mid_march, 60 * 60, true).await;
        let after = f.engine.calculate(march()).await.unwrap();

        assert_eq!(after.status, PayrollRunStatus::Locked);
        assert_eq!(after.total_approved_hours, 60.0);
        let records = f.engine.records(run.id.unwrap()).await.unwrap();
        assert_eq!(records[0].total_hours, 60.0);
    }

    #[tokio::test]
    async fn test_lock_and_pay_are_one_way() {
        let f = fixture().await;
        hire(&f, "Dana", 50.0).await;
        let run = f.engine.calculate(march()).await.unwrap();
        let run_id = run.id.unwrap();

        // cannot pay a draft
        assert!(matches!(
            f.engine.mark_paid(run_id).await,
            Err(PayrollError::NotPayable { .. })
        ));

        f.engine.lock(run_id).await.unwrap();
        assert!(matches!(
            f.engine.lock(run_id).await,
            Err(PayrollError::NotLockable { .. })
        ));

        let paid = f.engine.mark_paid(run_id).await.unwrap();
        assert_eq!(paid.status, PayrollRunStatus::Paid);
        assert!(paid.paid_at.is_some());
        assert!(matches!(
            f.engine.mark_paid(run_id).await,
            Err(PayrollError::NotPayable { .. })
        ));

        let inbox = f.sink.list(Some(Audience::Finance), false, 10).await.unwrap();
        assert_eq!(inbox.len(), 2);
        let kinds: Vec<_> = inbox.iter().map(|n| n.kind).collect();
        assert!(kinds.contains(&NotificationKind::PayrollLocked));
        assert!(kinds.contains(&NotificationKind::PayrollPaid));
    }

    #[tokio::test]
    async fn test_screen_surfaces_zero_rate_records() {
        let f = fixture().await;
        let no_rate = hire(&f, "Norry", 0.0).await;
        let mid_march = NaiveDate::from_ymd_opt(2025, 3, 5).unwrap();
        log_minutes(&f, no_rate, mid_march, 40 * 60, true).await;

        let run = f.engine.calculate(march()).await.unwrap();
        let findings = f.engine.screen(run.id.unwrap()).await.unwrap();

        assert!(!findings.is_empty());
        assert!(findings.iter().all(|a| a.employee_id == no_rate));
    }

    #[tokio::test]
    async fn test_unknown_run_is_not_found() {
        let f = fixture().await;
        assert!(matches!(
            f.engine.get_run(42).await,
            Err(PayrollError::RunNotFound(42))
        ));
        assert!(matches!(
            f.engine.screen(42).await,
            Err(PayrollError::RunNotFound(42))
        ));
    }
}
