//! Timer engine
//!
//! Drives the per-employee timer state machine over time entries:
//! Idle -> Running -> Paused -> Running ... -> Stopped. All transitions run
//! under the per-employee lock so the open-timer invariant is re-verified at
//! write time, not just at read time.

use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::{DateTime, Duration, NaiveDate, Utc};
use ops_core::config::TimerConfig;
use ops_core::lock::{LockKey, LockRegistry};
use ops_core::traits::Id;
use ops_core::Clock;
use ops_db::{ProjectStore, StoreError, TimeEntryStore};
use ops_models::time_entry::{TimeEntry, TimeEntryStatus};
use ops_notifications::{Audience, Notification, NotificationKind, NotificationSink};
use serde::Deserialize;
use thiserror::Error;

use crate::hook::BudgetHook;

/// Timer errors
#[derive(Debug, Error)]
pub enum TimerError {
    #[error("Time entry {0} not found")]
    NotFound(Id),

    #[error("Project {0} not found")]
    ProjectNotFound(Id),

    #[error("Employee {employee_id} already has a running timer (entry {entry_id})")]
    OpenTimerExists { employee_id: Id, entry_id: Id },

    #[error("Employee {employee_id} has a paused timer (entry {entry_id}); resume or stop it first")]
    PausedTimerExists { employee_id: Id, entry_id: Id },

    #[error("No active timer on entry {0}")]
    NoActiveTimer(Id),

    #[error("Timer on entry {0} is not running")]
    NotRunning(Id),

    #[error("Timer on entry {0} is not paused")]
    NotPaused(Id),

    #[error("Entry {0} has an open timer; stop it before editing its duration")]
    EntryOpen(Id),

    #[error(transparent)]
    Store(#[from] StoreError),
}

pub type TimerResult<T> = Result<T, TimerError>;

/// What to do when a start request finds an existing open timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OpenTimerPolicy {
    /// Refuse the new timer with a conflict error.
    #[default]
    Reject,
    /// Stop the existing timer first, then start the new one. Last writer
    /// wins; the stop is logged and noted on the stopped entry.
    AutoStopPrevious,
}

/// Field edits applied to an existing entry. `None` leaves a field alone.
#[derive(Debug, Clone, Default)]
pub struct EntryChanges {
    pub date: Option<NaiveDate>,
    pub category_id: Option<Id>,
    pub billable: Option<bool>,
    pub duration_minutes: Option<i64>,
    pub description: Option<String>,
}

impl EntryChanges {
    /// Whether the edit can change what an invoice or payroll run derives
    /// from this entry.
    fn affects_derived_totals(&self) -> bool {
        self.duration_minutes.is_some() || self.billable.is_some() || self.date.is_some()
    }
}

/// Timer engine
pub struct TimerEngine {
    entries: Arc<dyn TimeEntryStore>,
    projects: Arc<dyn ProjectStore>,
    notifications: Arc<dyn NotificationSink>,
    hook: Arc<dyn BudgetHook>,
    locks: Arc<LockRegistry>,
    clock: Arc<dyn Clock>,
    stale_ceiling_hours: i64,
}

impl TimerEngine {
    pub fn new(
        entries: Arc<dyn TimeEntryStore>,
        projects: Arc<dyn ProjectStore>,
        notifications: Arc<dyn NotificationSink>,
        hook: Arc<dyn BudgetHook>,
        locks: Arc<LockRegistry>,
        clock: Arc<dyn Clock>,
        config: &TimerConfig,
    ) -> Self {
        Self {
            entries,
            projects,
            notifications,
            hook,
            locks,
            clock,
            stale_ceiling_hours: config.stale_open_ceiling_hours,
        }
    }

    /// Start a timer for an employee on a project.
    ///
    /// The open-timer check runs again under the per-employee lock, so two
    /// concurrent starts cannot both pass it.
    pub async fn start(
        &self,
        employee_id: Id,
        project_id: Id,
        category_id: Id,
        billable: bool,
        policy: OpenTimerPolicy,
    ) -> TimerResult<TimeEntry> {
        self.projects
            .find_by_id(project_id)
            .await?
            .ok_or(TimerError::ProjectNotFound(project_id))?;

        let guard = self.locks.acquire(LockKey::Employee(employee_id)).await;

        let mut stopped_project = None;
        if let Some(open) = self.entries.find_open_for_employee(employee_id).await? {
            let entry_id = open.id.unwrap_or_default();
            match policy {
                OpenTimerPolicy::Reject => {
                    return Err(if open.status == TimeEntryStatus::Paused {
                        TimerError::PausedTimerExists {
                            employee_id,
                            entry_id,
                        }
                    } else {
                        TimerError::OpenTimerExists {
                            employee_id,
                            entry_id,
                        }
                    });
                }
                OpenTimerPolicy::AutoStopPrevious => {
                    let now = self.clock.now();
                    let mut previous = open;
                    finalize(&mut previous, now);
                    previous
                        .activity_log
                        .note("Auto-stopped by a newer timer for the same employee");
                    let previous = self.entries.update(&previous).await?;
                    tracing::warn!(
                        employee_id,
                        entry_id,
                        "auto-stopped previous open timer on start"
                    );
                    stopped_project = Some(previous.project_id);
                }
            }
        }

        let now = self.clock.now();
        let entry = TimeEntry::started(employee_id, project_id, category_id, billable, now);
        let created = self.entries.insert(&entry).await?;
        drop(guard);

        tracing::info!(employee_id, project_id, entry_id = ?created.id, "timer started");

        if let Some(previous_project) = stopped_project {
            if previous_project != project_id {
                self.hook.hours_changed(previous_project).await;
            }
        }
        self.hook.hours_changed(project_id).await;

        Ok(created)
    }

    /// Pause a running timer, banking the elapsed seconds.
    pub async fn pause(&self, entry_id: Id) -> TimerResult<TimeEntry> {
        let preload = self.require_entry(entry_id).await?;
        let _guard = self
            .locks
            .acquire(LockKey::Employee(preload.employee_id))
            .await;
        let mut entry = self.require_entry(entry_id).await?;

        if entry.status != TimeEntryStatus::Pending {
            return Err(TimerError::NotRunning(entry_id));
        }
        let started_at = entry.started_at.ok_or(TimerError::NotRunning(entry_id))?;

        let now = self.clock.now();
        entry.activity_log.bank(started_at, now);
        entry.started_at = None;
        entry.status = TimeEntryStatus::Paused;

        let entry = self.entries.update(&entry).await?;
        tracing::info!(
            entry_id,
            banked_seconds = entry.activity_log.accumulated_seconds,
            "timer paused"
        );
        Ok(entry)
    }

    /// Resume a paused timer. Banked seconds are untouched.
    pub async fn resume(&self, entry_id: Id) -> TimerResult<TimeEntry> {
        let preload = self.require_entry(entry_id).await?;
        let _guard = self
            .locks
            .acquire(LockKey::Employee(preload.employee_id))
            .await;
        let mut entry = self.require_entry(entry_id).await?;

        if entry.status != TimeEntryStatus::Paused {
            return Err(TimerError::NotPaused(entry_id));
        }

        entry.started_at = Some(self.clock.now());
        entry.status = TimeEntryStatus::Pending;

        let entry = self.entries.update(&entry).await?;
        tracing::info!(entry_id, "timer resumed");
        Ok(entry)
    }

    /// Stop an open timer and finalize the entry's duration.
    ///
    /// The stop commits before downstream automation runs; a failing hook
    /// can never roll it back.
    pub async fn stop(&self, entry_id: Id) -> TimerResult<TimeEntry> {
        let preload = self.require_entry(entry_id).await?;
        let guard = self
            .locks
            .acquire(LockKey::Employee(preload.employee_id))
            .await;
        let mut entry = self.require_entry(entry_id).await?;

        if !entry.is_open() {
            return Err(TimerError::NoActiveTimer(entry_id));
        }

        let now = self.clock.now();
        finalize(&mut entry, now);
        let entry = self.entries.update(&entry).await?;
        drop(guard);

        tracing::info!(entry_id, minutes = entry.duration_minutes, "timer stopped");
        self.hook.hours_changed(entry.project_id).await;
        Ok(entry)
    }

    /// Apply field edits to an entry.
    ///
    /// Duration edits require a closed entry; an open timer owns its own
    /// duration. Edits that change derived totals retrigger the budget hook.
    pub async fn edit(&self, entry_id: Id, changes: EntryChanges) -> TimerResult<TimeEntry> {
        let mut entry = self.require_entry(entry_id).await?;

        if changes.duration_minutes.is_some() && entry.is_open() {
            return Err(TimerError::EntryOpen(entry_id));
        }

        let retrigger = changes.affects_derived_totals();

        if let Some(date) = changes.date {
            entry.date = date;
        }
        if let Some(category_id) = changes.category_id {
            entry.category_id = category_id;
        }
        if let Some(billable) = changes.billable {
            entry.billable = billable;
        }
        if let Some(duration_minutes) = changes.duration_minutes {
            entry.duration_minutes = duration_minutes.max(0);
        }
        if let Some(description) = changes.description {
            entry.description = Some(description);
        }

        let entry = self.entries.update(&entry).await?;
        tracing::info!(entry_id, "time entry edited");

        if retrigger {
            self.hook.hours_changed(entry.project_id).await;
        }
        Ok(entry)
    }

    /// Soft-delete an entry. The project's totals change, so the budget hook
    /// runs afterwards.
    pub async fn delete(&self, entry_id: Id) -> TimerResult<()> {
        let entry = self.require_entry(entry_id).await?;

        self.entries.soft_delete(entry_id, self.clock.now()).await?;
        tracing::info!(entry_id, "time entry deleted");

        self.hook.hours_changed(entry.project_id).await;
        Ok(())
    }

    /// Stop every open timer past the staleness ceiling.
    ///
    /// Each candidate is re-verified under its employee's lock before being
    /// stopped, so a timer that was paused or stopped meanwhile is skipped.
    pub async fn sweep_stale(&self) -> TimerResult<Vec<TimeEntry>> {
        let now = self.clock.now();
        let cutoff = now - Duration::hours(self.stale_ceiling_hours);
        let candidates = self.entries.find_stale_open(cutoff, cutoff).await?;

        let mut stopped = Vec::new();
        let mut touched_projects = BTreeSet::new();

        for candidate in candidates {
            let Some(entry_id) = candidate.id else {
                continue;
            };
            let _guard = self
                .locks
                .acquire(LockKey::Employee(candidate.employee_id))
                .await;
            let Some(mut entry) = self.entries.find_by_id(entry_id).await? else {
                continue;
            };

            let still_stale = match entry.status {
                TimeEntryStatus::Pending => {
                    matches!(entry.started_at, Some(t) if t < cutoff)
                }
                TimeEntryStatus::Paused => {
                    matches!(entry.updated_at, Some(t) if t < cutoff)
                }
                _ => false,
            };
            if !still_stale {
                continue;
            }

            finalize(&mut entry, now);
            entry.activity_log.note(format!(
                "Auto-stopped: open for more than {}h",
                self.stale_ceiling_hours
            ));
            let entry = self.entries.update(&entry).await?;
            tracing::warn!(
                entry_id,
                employee_id = entry.employee_id,
                "stale timer auto-stopped"
            );
            touched_projects.insert(entry.project_id);
            stopped.push(entry);
        }

        if !stopped.is_empty() {
            let mut notification = Notification::new(
                Audience::Admins,
                NotificationKind::StaleTimerSweep,
                "Stale timers stopped",
                format!(
                    "{} open timer(s) exceeded the {}h ceiling and were auto-stopped",
                    stopped.len(),
                    self.stale_ceiling_hours
                ),
            );
            if let Err(error) = self.notifications.add(&mut notification).await {
                tracing::error!(%error, "failed to record sweep notification");
            }
        }

        for project_id in touched_projects {
            self.hook.hours_changed(project_id).await;
        }

        Ok(stopped)
    }

    async fn require_entry(&self, entry_id: Id) -> TimerResult<TimeEntry> {
        self.entries
            .find_by_id(entry_id)
            .await?
            .ok_or(TimerError::NotFound(entry_id))
    }
}

/// Close an open entry: bank the live segment if running, derive the final
/// whole-minute duration, stamp the end.
fn finalize(entry: &mut TimeEntry, now: DateTime<Utc>) {
    if entry.status == TimeEntryStatus::Pending {
        if let Some(started_at) = entry.started_at {
            entry.activity_log.bank(started_at, now);
        }
    }
    entry.duration_minutes = entry.activity_log.accumulated_seconds / 60;
    entry.started_at = None;
    entry.ended_at = Some(now);
    entry.status = TimeEntryStatus::Submitted;
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use ops_core::ManualClock;
    use ops_db::{MemoryProjectStore, MemoryTimeEntryStore};
    use ops_models::Project;
    use ops_notifications::MemoryNotificationSink;

    #[derive(Default)]
    struct RecordingHook {
        calls: std::sync::Mutex<Vec<Id>>,
    }

    impl RecordingHook {
        fn calls(&self) -> Vec<Id> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl BudgetHook for RecordingHook {
        async fn hours_changed(&self, project_id: Id) {
            self.calls.lock().unwrap().push(project_id);
        }
    }

    struct Fixture {
        engine: TimerEngine,
        entries: Arc<MemoryTimeEntryStore>,
        sink: Arc<MemoryNotificationSink>,
        hook: Arc<RecordingHook>,
        clock: Arc<ManualClock>,
        project_id: Id,
    }

    async fn fixture() -> Fixture {
        let entries = Arc::new(MemoryTimeEntryStore::new());
        let projects = Arc::new(MemoryProjectStore::new());
        let sink = Arc::new(MemoryNotificationSink::new());
        let hook = Arc::new(RecordingHook::default());
        let clock = Arc::new(ManualClock::new(Utc::now()));

        let project = projects.insert(&Project::new(1, "Redesign")).await.unwrap();

        let engine = TimerEngine::new(
            entries.clone(),
            projects,
            sink.clone(),
            hook.clone(),
            Arc::new(LockRegistry::new()),
            clock.clone(),
            &TimerConfig {
                stale_open_ceiling_hours: 12,
            },
        );

        Fixture {
            engine,
            entries,
            sink,
            hook,
            clock,
            project_id: project.id.unwrap(),
        }
    }

    #[tokio::test]
    async fn test_start_creates_running_entry() {
        let f = fixture().await;
        let entry = f
            .engine
            .start(1, f.project_id, 1, true, OpenTimerPolicy::Reject)
            .await
            .unwrap();

        assert_eq!(entry.status, TimeEntryStatus::Pending);
        assert!(entry.started_at.is_some());
        assert_eq!(entry.duration_minutes, 0);
        assert_eq!(f.hook.calls(), vec![f.project_id]);
    }

    #[tokio::test]
    async fn test_start_requires_known_project() {
        let f = fixture().await;
        assert!(matches!(
            f.engine.start(1, 999, 1, true, OpenTimerPolicy::Reject).await,
            Err(TimerError::ProjectNotFound(999))
        ));
    }

    #[tokio::test]
    async fn test_second_start_is_rejected() {
        let f = fixture().await;
        let first = f
            .engine
            .start(1, f.project_id, 1, true, OpenTimerPolicy::Reject)
            .await
            .unwrap();

        let err = f
            .engine
            .start(1, f.project_id, 1, true, OpenTimerPolicy::Reject)
            .await
            .unwrap_err();

        match err {
            TimerError::OpenTimerExists {
                employee_id,
                entry_id,
            } => {
                assert_eq!(employee_id, 1);
                assert_eq!(Some(entry_id), first.id);
            }
            other => panic!("expected OpenTimerExists, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_start_with_paused_timer_directs_to_resume() {
        let f = fixture().await;
        let entry = f
            .engine
            .start(1, f.project_id, 1, true, OpenTimerPolicy::Reject)
            .await
            .unwrap();
        f.engine.pause(entry.id.unwrap()).await.unwrap();

        assert!(matches!(
            f.engine.start(1, f.project_id, 1, true, OpenTimerPolicy::Reject).await,
            Err(TimerError::PausedTimerExists { .. })
        ));
    }

    #[tokio::test]
    async fn test_auto_stop_previous_policy() {
        let f = fixture().await;
        let first = f
            .engine
            .start(1, f.project_id, 1, true, OpenTimerPolicy::Reject)
            .await
            .unwrap();
        f.clock.advance_secs(120);

        let second = f
            .engine
            .start(1, f.project_id, 2, true, OpenTimerPolicy::AutoStopPrevious)
            .await
            .unwrap();

        let first = f
            .entries
            .find_by_id(first.id.unwrap())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(first.status, TimeEntryStatus::Submitted);
        assert_eq!(first.duration_minutes, 2);
        assert!(first
            .activity_log
            .notes
            .iter()
            .any(|n| n.contains("newer timer")));

        assert!(second.is_open());
        let open = f.entries.find_open_for_employee(1).await.unwrap();
        assert_eq!(open.and_then(|e| e.id), second.id);
    }

    #[tokio::test]
    async fn test_pause_resume_accumulation() {
        let f = fixture().await;
        let entry = f
            .engine
            .start(1, f.project_id, 1, true, OpenTimerPolicy::Reject)
            .await
            .unwrap();
        let id = entry.id.unwrap();

        f.clock.advance_secs(90);
        let paused = f.engine.pause(id).await.unwrap();
        assert_eq!(paused.activity_log.accumulated_seconds, 90);
        assert_eq!(paused.status, TimeEntryStatus::Paused);
        assert!(paused.started_at.is_none());

        // dead time while paused must not count
        f.clock.advance_secs(110);
        let resumed = f.engine.resume(id).await.unwrap();
        assert_eq!(resumed.activity_log.accumulated_seconds, 90);
        assert_eq!(resumed.status, TimeEntryStatus::Pending);

        f.clock.advance_secs(60);
        let stopped = f.engine.stop(id).await.unwrap();
        assert_eq!(stopped.activity_log.accumulated_seconds, 150);
        assert_eq!(stopped.duration_minutes, 2);
        assert_eq!(stopped.status, TimeEntryStatus::Submitted);
        assert_eq!(stopped.activity_log.sessions.len(), 2);
        assert!(stopped.ended_at.is_some());
    }

    #[tokio::test]
    async fn test_pause_requires_running_timer() {
        let f = fixture().await;
        let entry = f
            .engine
            .start(1, f.project_id, 1, true, OpenTimerPolicy::Reject)
            .await
            .unwrap();
        let id = entry.id.unwrap();

        f.engine.pause(id).await.unwrap();
        assert!(matches!(
            f.engine.pause(id).await,
            Err(TimerError::NotRunning(_))
        ));
    }

    #[tokio::test]
    async fn test_resume_requires_paused_timer() {
        let f = fixture().await;
        let entry = f
            .engine
            .start(1, f.project_id, 1, true, OpenTimerPolicy::Reject)
            .await
            .unwrap();

        assert!(matches!(
            f.engine.resume(entry.id.unwrap()).await,
            Err(TimerError::NotPaused(_))
        ));
    }

    #[tokio::test]
    async fn test_stop_closed_entry_reports_no_active_timer() {
        let f = fixture().await;
        let entry = f
            .engine
            .start(1, f.project_id, 1, true, OpenTimerPolicy::Reject)
            .await
            .unwrap();
        let id = entry.id.unwrap();

        f.engine.stop(id).await.unwrap();
        assert!(matches!(
            f.engine.stop(id).await,
            Err(TimerError::NoActiveTimer(_))
        ));
    }

    #[tokio::test]
    async fn test_stop_triggers_budget_hook() {
        let f = fixture().await;
        let entry = f
            .engine
            .start(1, f.project_id, 1, true, OpenTimerPolicy::Reject)
            .await
            .unwrap();
        f.clock.advance_secs(300);
        f.engine.stop(entry.id.unwrap()).await.unwrap();

        // once for the start, once for the stop
        assert_eq!(f.hook.calls(), vec![f.project_id, f.project_id]);
    }

    #[tokio::test]
    async fn test_edit_duration_requires_closed_entry() {
        let f = fixture().await;
        let entry = f
            .engine
            .start(1, f.project_id, 1, true, OpenTimerPolicy::Reject)
            .await
            .unwrap();

        let changes = EntryChanges {
            duration_minutes: Some(45),
            ..Default::default()
        };
        assert!(matches!(
            f.engine.edit(entry.id.unwrap(), changes).await,
            Err(TimerError::EntryOpen(_))
        ));
    }

    #[tokio::test]
    async fn test_edit_retriggers_hook_only_for_derived_totals() {
        let f = fixture().await;
        let entry = f
            .engine
            .start(1, f.project_id, 1, true, OpenTimerPolicy::Reject)
            .await
            .unwrap();
        let id = entry.id.unwrap();
        f.engine.stop(id).await.unwrap();
        let baseline = f.hook.calls().len();

        let edited = f
            .engine
            .edit(
                id,
                EntryChanges {
                    duration_minutes: Some(120),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(edited.duration_minutes, 120);
        assert_eq!(f.hook.calls().len(), baseline + 1);

        f.engine
            .edit(
                id,
                EntryChanges {
                    description: Some("write-up".into()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(f.hook.calls().len(), baseline + 1);
    }

    #[tokio::test]
    async fn test_delete_soft_deletes_and_retriggers() {
        let f = fixture().await;
        let entry = f
            .engine
            .start(1, f.project_id, 1, true, OpenTimerPolicy::Reject)
            .await
            .unwrap();
        let id = entry.id.unwrap();
        let baseline = f.hook.calls().len();

        f.engine.delete(id).await.unwrap();
        assert!(f.entries.find_by_id(id).await.unwrap().is_none());
        assert_eq!(f.hook.calls().len(), baseline + 1);
        assert!(matches!(
            f.engine.delete(id).await,
            Err(TimerError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_sweep_stops_only_stale_entries() {
        let f = fixture().await;
        let stale = f
            .engine
            .start(1, f.project_id, 1, true, OpenTimerPolicy::Reject)
            .await
            .unwrap();
        f.clock.advance_secs(13 * 3600);
        let fresh = f
            .engine
            .start(2, f.project_id, 1, true, OpenTimerPolicy::Reject)
            .await
            .unwrap();

        let stopped = f.engine.sweep_stale().await.unwrap();
        assert_eq!(stopped.len(), 1);
        assert_eq!(stopped[0].id, stale.id);
        assert_eq!(stopped[0].duration_minutes, 13 * 60);
        assert!(stopped[0]
            .activity_log
            .notes
            .iter()
            .any(|n| n.contains("Auto-stopped")));

        let fresh = f
            .entries
            .find_by_id(fresh.id.unwrap())
            .await
            .unwrap()
            .unwrap();
        assert!(fresh.is_open());

        let inbox = f.sink.list(Some(Audience::Admins), false, 10).await.unwrap();
        assert_eq!(inbox.len(), 1);
        assert_eq!(inbox[0].kind, NotificationKind::StaleTimerSweep);
    }

    #[tokio::test]
    async fn test_sweep_catches_stale_paused_entries() {
        let f = fixture().await;
        let entry = f
            .engine
            .start(1, f.project_id, 1, true, OpenTimerPolicy::Reject)
            .await
            .unwrap();
        f.clock.advance_secs(600);
        f.engine.pause(entry.id.unwrap()).await.unwrap();

        f.clock.advance_secs(13 * 3600);
        let stopped = f.engine.sweep_stale().await.unwrap();

        assert_eq!(stopped.len(), 1);
        // banked ten minutes; the pause gap adds nothing
        assert_eq!(stopped[0].duration_minutes, 10);
        assert_eq!(stopped[0].status, TimeEntryStatus::Submitted);
    }

    #[tokio::test]
    async fn test_sweep_with_nothing_stale_is_quiet() {
        let f = fixture().await;
        f.engine
            .start(1, f.project_id, 1, true, OpenTimerPolicy::Reject)
            .await
            .unwrap();

        let stopped = f.engine.sweep_stale().await.unwrap();
        assert!(stopped.is_empty());
        assert!(f.sink.list(None, false, 10).await.unwrap().is_empty());
    }
}
