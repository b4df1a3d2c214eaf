//! Employee model

use chrono::{DateTime, Utc};
use ops_core::traits::{Entity, Id, Identifiable, Timestamped};
use serde::{Deserialize, Serialize};

/// Employee entity
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Employee {
    pub id: Option<Id>,
    pub name: String,
    pub email: String,
    pub department: Option<String>,
    pub designation: Option<String>,

    /// Internal cost rate used by payroll. Zero means "not configured" and
    /// is surfaced as an anomaly when hours exist.
    pub hourly_cost_rate: f64,

    /// Inactive employees are excluded from payroll runs.
    #[serde(default = "default_true")]
    pub active: bool,

    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

fn default_true() -> bool {
    true
}

impl Employee {
    pub fn new(name: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            id: None,
            name: name.into(),
            email: email.into(),
            department: None,
            designation: None,
            hourly_cost_rate: 0.0,
            active: true,
            created_at: None,
            updated_at: None,
        }
    }

    pub fn has_cost_rate(&self) -> bool {
        self.hourly_cost_rate > 0.0
    }
}

impl Identifiable for Employee {
    fn id(&self) -> Option<Id> {
        self.id
    }
}

impl Timestamped for Employee {
    fn created_at(&self) -> Option<DateTime<Utc>> {
        self.created_at
    }

    fn updated_at(&self) -> Option<DateTime<Utc>> {
        self.updated_at
    }
}

impl Entity for Employee {
    const TABLE_NAME: &'static str = "employees";
    const TYPE_NAME: &'static str = "Employee";
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_defaults() {
        let employee = Employee::new("Ada", "ada@example.com");
        assert!(employee.active);
        assert!(!employee.has_cost_rate());
        assert_eq!(employee.hourly_cost_rate, 0.0);
    }
}
