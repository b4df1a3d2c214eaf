//! Budget overrun automator
//!
//! Watches a project's consumed hours against its estimate and, once the
//! estimate is reached, notifies admins and upserts a draft invoice built
//! from the project's time entries. Runs synchronously inside the request
//! that changed the hours, wired in as the timer engine's [`BudgetHook`].

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Datelike, Duration};
use ops_core::config::BillingConfig;
use ops_core::lock::{LockKey, LockRegistry};
use ops_core::traits::Id;
use ops_core::Clock;
use ops_db::{ClientStore, InvoiceStore, ProjectStore, TimeEntryStore};
use ops_models::{Invoice, InvoiceItem, Project, TimeEntry};
use ops_notifications::{Audience, Notification, NotificationKind, NotificationSink};
use ops_timer::BudgetHook;

use crate::service::{invoice_number, BillingError, BillingResult};

/// `created_by` marker that distinguishes automator drafts from manual ones.
pub const AUTOMATOR_ACTOR: &str = "System (Overrun Automator)";

/// Budget overrun automator
pub struct OverrunAutomator {
    entries: Arc<dyn TimeEntryStore>,
    projects: Arc<dyn ProjectStore>,
    clients: Arc<dyn ClientStore>,
    invoices: Arc<dyn InvoiceStore>,
    notifications: Arc<dyn NotificationSink>,
    locks: Arc<LockRegistry>,
    clock: Arc<dyn Clock>,
    config: BillingConfig,
}

impl OverrunAutomator {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        entries: Arc<dyn TimeEntryStore>,
        projects: Arc<dyn ProjectStore>,
        clients: Arc<dyn ClientStore>,
        invoices: Arc<dyn InvoiceStore>,
        notifications: Arc<dyn NotificationSink>,
        locks: Arc<LockRegistry>,
        clock: Arc<dyn Clock>,
        config: &BillingConfig,
    ) -> Self {
        Self {
            entries,
            projects,
            clients,
            invoices,
            notifications,
            locks,
            clock,
            config: config.clone(),
        }
    }

    /// Recompute the project's consumed hours and, at or past the estimate,
    /// notify admins and upsert the draft invoice.
    ///
    /// Returns the upserted draft, or `None` when the project has no usable
    /// budget or is still under it. The whole overrun path runs under the
    /// per-project lock so concurrent triggers cannot both insert a draft.
    pub async fn check_project(&self, project_id: Id) -> BillingResult<Option<Invoice>> {
        let project = self
            .projects
            .find_by_id(project_id)
            .await?
            .ok_or(BillingError::ProjectNotFound(project_id))?;

        let Some(budgeted_hours) = project.estimated_hours.filter(|h| *h > 0.0) else {
            tracing::debug!(project_id, "no budget configured, overrun check skipped");
            return Ok(None);
        };

        let _guard = self.locks.acquire(LockKey::Project(project_id)).await;

        let entries = self.entries.find_for_project(project_id).await?;
        let consumed_minutes: i64 = entries.iter().map(|e| e.duration_minutes).sum();
        let consumed_hours = consumed_minutes as f64 / 60.0;
        if consumed_hours < budgeted_hours {
            return Ok(None);
        }

        tracing::info!(
            project_id,
            consumed_hours,
            budgeted_hours,
            "project budget overrun detected"
        );

        let mut notification = Notification::new(
            Audience::Admins,
            NotificationKind::BudgetOverrun,
            format!("Budget overrun on {}", project.name),
            format!(
                "Project {} has logged {:.1}h against a {:.1}h budget; a draft invoice is ready for review",
                project.name, consumed_hours, budgeted_hours
            ),
        )
        .with_project(project_id);
        if let Err(error) = self.notifications.add(&mut notification).await {
            tracing::error!(project_id, %error, "failed to record overrun notification");
        }

        let invoice = self
            .upsert_draft(&project, &entries, consumed_hours, budgeted_hours)
            .await?;
        Ok(Some(invoice))
    }

    /// Replace the draft's items wholesale, or create the draft if the
    /// project has none. An existing draft keeps its number and dates, so
    /// retriggering without new entries is a no-op on the totals.
    async fn upsert_draft(
        &self,
        project: &Project,
        entries: &[TimeEntry],
        consumed_hours: f64,
        budgeted_hours: f64,
    ) -> BillingResult<Invoice> {
        let project_id = project.id.unwrap_or_default();
        let items = self.line_items(project, entries);

        match self.invoices.find_draft_for_project(project_id).await? {
            Some(mut draft) => {
                draft.replace_items(items, self.config.tax_rate);
                let updated = self.invoices.update(&draft).await?;
                tracing::info!(project_id, number = %updated.number, "overrun draft refreshed");
                Ok(updated)
            }
            None => {
                let client = self
                    .clients
                    .find_by_id(project.client_id)
                    .await?
                    .ok_or(BillingError::ClientNotFound(project.client_id))?;

                let sequence = self.invoices.next_invoice_sequence().await?;
                let issue_date = self.clock.now().date_naive();
                let due_date = issue_date + Duration::days(self.config.due_days);

                let mut draft = Invoice::draft(
                    invoice_number(issue_date.year(), sequence),
                    project_id,
                    project.client_id,
                    client.name,
                    issue_date,
                    due_date,
                    project.currency.clone(),
                    AUTOMATOR_ACTOR,
                );
                draft.notes = Some(format!(
                    "Auto-drafted after logging {consumed_hours:.1}h against a {budgeted_hours:.1}h budget"
                ));
                draft.replace_items(items, self.config.tax_rate);

                let created = self.invoices.insert(&draft).await?;
                tracing::info!(project_id, number = %created.number, "overrun draft created");
                Ok(created)
            }
        }
    }

    /// One line per time entry: billable entries at the project rate (or the
    /// configured fallback), non-billable entries priced at zero.
    fn line_items(&self, project: &Project, entries: &[TimeEntry]) -> Vec<InvoiceItem> {
        let rate = project
            .global_rate
            .unwrap_or(self.config.default_hourly_rate);

        entries
            .iter()
            .map(|entry| {
                let unit_price = if entry.billable { rate } else { 0.0 };
                let label = format!(
                    "{} - {}",
                    entry.date,
                    entry.description.as_deref().unwrap_or("Logged time")
                );
                match entry.id {
                    Some(id) => {
                        InvoiceItem::for_time_entry(label, entry.duration_hours(), unit_price, id)
                    }
                    None => InvoiceItem::new(label, entry.duration_hours(), unit_price),
                }
            })
            .collect()
    }
}

#[async_trait]
impl BudgetHook for OverrunAutomator {
    /// Fire-and-forget entry point: a failed check is logged and never
    /// reaches the timer operation that triggered it.
    async fn hours_changed(&self, project_id: Id) {
        if let Err(error) = self.check_project(project_id).await {
            tracing::error!(project_id, %error, "budget overrun check failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use ops_core::ManualClock;
    use ops_db::{
        MemoryClientStore, MemoryInvoiceStore, MemoryProjectStore, MemoryTimeEntryStore,
        Pagination,
    };
    use ops_models::time_entry::TimeEntryStatus;
    use ops_models::{Client, InvoiceStatus};
    use ops_notifications::MemoryNotificationSink;

    struct Fixture {
        automator: OverrunAutomator,
        entries: Arc<MemoryTimeEntryStore>,
        projects: Arc<MemoryProjectStore>,
        invoices: Arc<MemoryInvoiceStore>,
        sink: Arc<MemoryNotificationSink>,
        client_id: Id,
    }

    async fn fixture() -> Fixture {
        let entries = Arc::new(MemoryTimeEntryStore::new());
        let projects = Arc::new(MemoryProjectStore::new());
        let clients = Arc::new(MemoryClientStore::new());
        let invoices = Arc::new(MemoryInvoiceStore::new());
        let sink = Arc::new(MemoryNotificationSink::new());

        let client = clients.insert(&Client::new("Acme Corp")).await.unwrap();

        let automator = OverrunAutomator::new(
            entries.clone(),
            projects.clone(),
            clients,
            invoices.clone(),
            sink.clone(),
            Arc::new(LockRegistry::new()),
            Arc::new(ManualClock::new(Utc::now())),
            &BillingConfig {
                tax_rate: 0.10,
                default_hourly_rate: 50.0,
                due_days: 7,
            },
        );

        Fixture {
            automator,
            entries,
            projects,
            invoices,
            sink,
            client_id: client.id.unwrap(),
        }
    }

    async fn insert_project(
        f: &Fixture,
        estimated_hours: Option<f64>,
        global_rate: Option<f64>,
    ) -> Id {
        let mut project = Project::new(f.client_id, "Atlas");
        project.estimated_hours = estimated_hours;
        project.global_rate = global_rate;
        f.projects.insert(&project).await.unwrap().id.unwrap()
    }

    async fn log_hours(f: &Fixture, project_id: Id, minutes: i64, billable: bool) -> TimeEntry {
        let now = Utc::now();
        let mut entry = TimeEntry::started(1, project_id, 1, billable, now);
        entry.status = TimeEntryStatus::Submitted;
        entry.started_at = None;
        entry.ended_at = Some(now);
        entry.duration_minutes = minutes;
        f.entries.insert(&entry).await.unwrap()
    }

    #[tokio::test]
    async fn test_skip_without_budget() {
        let f = fixture().await;
        let project_id = insert_project(&f, None, Some(100.0)).await;
        log_hours(&f, project_id, 600, true).await;

        let result = f.automator.check_project(project_id).await.unwrap();
        assert!(result.is_none());
        assert!(f.sink.list(None, false, 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_under_budget_no_action() {
        let f = fixture().await;
        let project_id = insert_project(&f, Some(10.0), Some(100.0)).await;
        log_hours(&f, project_id, 9 * 60, true).await;

        assert!(f.automator.check_project(project_id).await.unwrap().is_none());
        assert!(f
            .invoices
            .find_draft_for_project(project_id)
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_overrun_drafts_invoice_and_notifies() {
        let f = fixture().await;
        let project_id = insert_project(&f, Some(10.0), Some(100.0)).await;
        log_hours(&f, project_id, 6 * 60, true).await;
        log_hours(&f, project_id, 270, true).await; // 4.5h, total 10.5h

        let invoice = f
            .automator
            .check_project(project_id)
            .await
            .unwrap()
            .unwrap();

        assert_eq!(invoice.status, InvoiceStatus::Draft);
        assert_eq!(invoice.created_by, AUTOMATOR_ACTOR);
        assert_eq!(invoice.client_name, "Acme Corp");
        assert!(invoice.number.starts_with("INV-"));
        assert!(invoice.number.ends_with("-00001"));
        assert_eq!(invoice.due_date - invoice.issue_date, Duration::days(7));
        assert_eq!(invoice.items.len(), 2);
        assert_eq!(invoice.subtotal, 1050.0);
        assert_eq!(invoice.tax_amount, 105.0);
        assert_eq!(invoice.total_amount, 1155.0);

        let inbox = f.sink.list(Some(Audience::Admins), false, 10).await.unwrap();
        assert_eq!(inbox.len(), 1);
        assert_eq!(inbox[0].kind, NotificationKind::BudgetOverrun);
        assert!(inbox[0].message.contains("10.5h"));
        assert!(inbox[0].message.contains("10.0h"));
        assert_eq!(inbox[0].project_id, Some(project_id));
    }

    #[tokio::test]
    async fn test_reaching_budget_exactly_triggers() {
        let f = fixture().await;
        let project_id = insert_project(&f, Some(10.0), Some(100.0)).await;
        log_hours(&f, project_id, 10 * 60, true).await;

        assert!(f.automator.check_project(project_id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_repeated_trigger_is_idempotent() {
        let f = fixture().await;
        let project_id = insert_project(&f, Some(10.0), Some(100.0)).await;
        log_hours(&f, project_id, 11 * 60, true).await;

        let first = f
            .automator
            .check_project(project_id)
            .await
            .unwrap()
            .unwrap();
        let second = f
            .automator
            .check_project(project_id)
            .await
            .unwrap()
            .unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(first.number, second.number);
        assert_eq!(first.items.len(), second.items.len());
        assert_eq!(first.subtotal, second.subtotal);
        assert_eq!(first.total_amount, second.total_amount);

        let drafts = f
            .invoices
            .list(Some(InvoiceStatus::Draft), Pagination::default())
            .await
            .unwrap();
        assert_eq!(drafts.total, 1);
    }

    #[tokio::test]
    async fn test_refresh_replaces_items_and_keeps_payments() {
        let f = fixture().await;
        let project_id = insert_project(&f, Some(10.0), Some(100.0)).await;
        log_hours(&f, project_id, 11 * 60, true).await;

        let mut first = f
            .automator
            .check_project(project_id)
            .await
            .unwrap()
            .unwrap();
        first.paid_amount = 100.0;
        f.invoices.update(&first).await.unwrap();

        log_hours(&f, project_id, 60, true).await;
        let second = f
            .automator
            .check_project(project_id)
            .await
            .unwrap()
            .unwrap();

        assert_eq!(second.id, first.id);
        assert_eq!(second.number, first.number);
        assert_eq!(second.items.len(), 2);
        assert_eq!(second.subtotal, 1200.0);
        assert_eq!(second.total_amount, 1320.0);
        assert_eq!(second.paid_amount, 100.0);
        assert_eq!(second.balance_amount, 1220.0);
    }

    #[tokio::test]
    async fn test_non_billable_entries_priced_at_zero() {
        let f = fixture().await;
        let project_id = insert_project(&f, Some(5.0), Some(100.0)).await;
        log_hours(&f, project_id, 4 * 60, true).await;
        log_hours(&f, project_id, 2 * 60, false).await;

        let invoice = f
            .automator
            .check_project(project_id)
            .await
            .unwrap()
            .unwrap();

        assert_eq!(invoice.items.len(), 2);
        assert_eq!(invoice.subtotal, 400.0);
        let zero_line = invoice
            .items
            .iter()
            .find(|item| item.unit_price == 0.0)
            .unwrap();
        assert_eq!(zero_line.quantity, 2.0);
        assert_eq!(zero_line.amount, 0.0);
    }

    #[tokio::test]
    async fn test_missing_rate_falls_back_to_default() {
        let f = fixture().await;
        let project_id = insert_project(&f, Some(1.0), None).await;
        log_hours(&f, project_id, 2 * 60, true).await;

        let invoice = f
            .automator
            .check_project(project_id)
            .await
            .unwrap()
            .unwrap();
        // 2h at the configured 50.0 fallback
        assert_eq!(invoice.subtotal, 100.0);
    }

    #[tokio::test]
    async fn test_hook_swallows_failures() {
        let f = fixture().await;
        // unknown project: check_project errors, the hook only logs
        f.automator.hours_changed(999).await;
    }
}
