//! Time entry model
//!
//! One logged span of work with a duration, owner, project, and billable
//! flag. The status enum is the single source of truth for the timer state;
//! the nullable timestamps are derived audit data.

use chrono::{DateTime, NaiveDate, Utc};
use ops_core::traits::{Entity, Id, Identifiable, SoftDeletable, Timestamped};
use serde::{Deserialize, Serialize};

/// Lifecycle status of a time entry.
///
/// `Pending` and `Paused` are the open timer states; everything else is
/// closed. At most one open entry may exist per employee at any time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TimeEntryStatus {
    /// Timer is running.
    #[default]
    Pending,
    /// Timer is paused; elapsed seconds are banked in the activity log.
    Paused,
    /// Stopped, awaiting approval.
    Submitted,
    Approved,
    Rejected,
}

impl TimeEntryStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Paused => "paused",
            Self::Submitted => "submitted",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
        }
    }

    pub fn from_str(s: &str) -> Self {
        match s {
            "paused" => Self::Paused,
            "submitted" => Self::Submitted,
            "approved" => Self::Approved,
            "rejected" => Self::Rejected,
            _ => Self::Pending,
        }
    }

    /// Whether the timer is still open (running or paused).
    pub fn is_open(&self) -> bool {
        matches!(self, Self::Pending | Self::Paused)
    }
}

/// One running segment of a timer, recorded when the segment closes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimerSession {
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
    pub seconds: i64,
}

/// Auxiliary timer log persisted as JSON alongside the entry.
///
/// `accumulated_seconds` is the pause-surviving counter the final duration is
/// computed from; sessions and notes are audit data.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimerLog {
    pub accumulated_seconds: i64,
    #[serde(default)]
    pub sessions: Vec<TimerSession>,
    #[serde(default)]
    pub notes: Vec<String>,
}

impl TimerLog {
    /// Bank a closed running segment into the accumulated counter.
    pub fn bank(&mut self, started_at: DateTime<Utc>, ended_at: DateTime<Utc>) {
        let seconds = (ended_at - started_at).num_seconds().max(0);
        self.accumulated_seconds += seconds;
        self.sessions.push(TimerSession {
            started_at,
            ended_at,
            seconds,
        });
    }

    pub fn note(&mut self, message: impl Into<String>) {
        self.notes.push(message.into());
    }
}

/// Time entry entity
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimeEntry {
    pub id: Option<Id>,
    pub employee_id: Id,
    pub project_id: Id,
    pub category_id: Id,

    /// Calendar day the work is attributed to.
    pub date: NaiveDate,
    /// Set while the timer is running; cleared on pause.
    pub started_at: Option<DateTime<Utc>>,
    /// Set once, when the timer stops.
    pub ended_at: Option<DateTime<Utc>>,
    /// Authoritative once finalized (whole minutes, floor of total seconds).
    pub duration_minutes: i64,

    #[serde(default)]
    pub status: TimeEntryStatus,
    pub billable: bool,
    pub description: Option<String>,

    /// Pause-surviving seconds counter plus per-session audit records.
    #[serde(default)]
    pub activity_log: TimerLog,

    pub deleted_at: Option<DateTime<Utc>>,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl TimeEntry {
    /// Start a fresh entry with a running timer.
    pub fn started(
        employee_id: Id,
        project_id: Id,
        category_id: Id,
        billable: bool,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: None,
            employee_id,
            project_id,
            category_id,
            date: now.date_naive(),
            started_at: Some(now),
            ended_at: None,
            duration_minutes: 0,
            status: TimeEntryStatus::Pending,
            billable,
            description: None,
            activity_log: TimerLog::default(),
            deleted_at: None,
            created_at: Some(now),
            updated_at: Some(now),
        }
    }

    /// Whether the timer is still open (running or paused).
    pub fn is_open(&self) -> bool {
        self.status.is_open()
    }

    /// Total seconds on the clock as of `now`: banked seconds plus the live
    /// segment if the timer is running.
    pub fn total_seconds_at(&self, now: DateTime<Utc>) -> i64 {
        let live = match (self.status, self.started_at) {
            (TimeEntryStatus::Pending, Some(started_at)) => {
                (now - started_at).num_seconds().max(0)
            }
            _ => 0,
        };
        self.activity_log.accumulated_seconds + live
    }

    pub fn duration_hours(&self) -> f64 {
        self.duration_minutes as f64 / 60.0
    }
}

impl Identifiable for TimeEntry {
    fn id(&self) -> Option<Id> {
        self.id
    }
}

impl Timestamped for TimeEntry {
    fn created_at(&self) -> Option<DateTime<Utc>> {
        self.created_at
    }

    fn updated_at(&self) -> Option<DateTime<Utc>> {
        self.updated_at
    }
}

impl SoftDeletable for TimeEntry {
    fn deleted_at(&self) -> Option<DateTime<Utc>> {
        self.deleted_at
    }
}

impl Entity for TimeEntry {
    const TABLE_NAME: &'static str = "time_entries";
    const TYPE_NAME: &'static str = "TimeEntry";
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap()
    }

    #[test]
    fn test_status_round_trip() {
        for status in [
            TimeEntryStatus::Pending,
            TimeEntryStatus::Paused,
            TimeEntryStatus::Submitted,
            TimeEntryStatus::Approved,
            TimeEntryStatus::Rejected,
        ] {
            assert_eq!(TimeEntryStatus::from_str(status.as_str()), status);
        }
    }

    #[test]
    fn test_open_states() {
        assert!(TimeEntryStatus::Pending.is_open());
        assert!(TimeEntryStatus::Paused.is_open());
        assert!(!TimeEntryStatus::Submitted.is_open());
        assert!(!TimeEntryStatus::Approved.is_open());
    }

    #[test]
    fn test_log_bank_is_additive() {
        let mut log = TimerLog::default();
        log.bank(t0(), t0() + chrono::Duration::seconds(90));
        log.bank(t0() + chrono::Duration::seconds(200), t0() + chrono::Duration::seconds(260));

        assert_eq!(log.accumulated_seconds, 150);
        assert_eq!(log.sessions.len(), 2);
        assert_eq!(log.sessions[1].seconds, 60);
    }

    #[test]
    fn test_log_bank_clamps_negative_spans() {
        let mut log = TimerLog::default();
        log.bank(t0() + chrono::Duration::seconds(10), t0());
        assert_eq!(log.accumulated_seconds, 0);
    }

    #[test]
    fn test_total_seconds_includes_live_segment_only_when_running() {
        let mut entry = TimeEntry::started(1, 1, 1, true, t0());
        entry.activity_log.accumulated_seconds = 100;

        let now = t0() + chrono::Duration::seconds(50);
        assert_eq!(entry.total_seconds_at(now), 150);

        entry.status = TimeEntryStatus::Paused;
        entry.started_at = None;
        assert_eq!(entry.total_seconds_at(now), 100);
    }

    #[test]
    fn test_timer_log_serde_shape() {
        let mut log = TimerLog::default();
        log.bank(t0(), t0() + chrono::Duration::seconds(60));
        log.note("swept");

        let json = serde_json::to_value(&log).unwrap();
        assert_eq!(json["accumulatedSeconds"], 60);
        assert_eq!(json["sessions"][0]["seconds"], 60);
        assert_eq!(json["notes"][0], "swept");
    }
}
