//! Notification model

use chrono::{DateTime, Utc};
use ops_core::traits::Id;
use serde::{Deserialize, Serialize};

/// Who a notification is addressed to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Audience {
    /// Operations administrators
    Admins,
    /// Finance team
    Finance,
}

impl Audience {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Admins => "admins",
            Self::Finance => "finance",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "admins" => Some(Self::Admins),
            "finance" => Some(Self::Finance),
            _ => None,
        }
    }
}

/// What triggered the notification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    /// A project's logged hours crossed its budget
    BudgetOverrun,
    /// Stale open timers were auto-stopped
    StaleTimerSweep,
    /// A payroll run was locked for payment
    PayrollLocked,
    /// A payroll run was marked paid
    PayrollPaid,
}

impl NotificationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::BudgetOverrun => "budget_overrun",
            Self::StaleTimerSweep => "stale_timer_sweep",
            Self::PayrollLocked => "payroll_locked",
            Self::PayrollPaid => "payroll_paid",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "budget_overrun" => Some(Self::BudgetOverrun),
            "stale_timer_sweep" => Some(Self::StaleTimerSweep),
            "payroll_locked" => Some(Self::PayrollLocked),
            "payroll_paid" => Some(Self::PayrollPaid),
            _ => None,
        }
    }
}

/// A notification
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub id: Option<Id>,
    pub audience: Audience,
    pub kind: NotificationKind,
    pub title: String,
    pub message: String,
    /// Optional link back to the triggering entity.
    pub project_id: Option<Id>,
    pub read_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl Notification {
    pub fn new(
        audience: Audience,
        kind: NotificationKind,
        title: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            id: None,
            audience,
            kind,
            title: title.into(),
            message: message.into(),
            project_id: None,
            read_at: None,
            created_at: Utc::now(),
        }
    }

    pub fn with_project(mut self, project_id: Id) -> Self {
        self.project_id = Some(project_id);
        self
    }

    pub fn is_unread(&self) -> bool {
        self.read_at.is_none()
    }

    pub fn mark_read(&mut self) {
        self.read_at = Some(Utc::now());
    }
}
