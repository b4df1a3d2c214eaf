//! Project model
//!
//! Billing/budget container. Consumed hours are always derived from time
//! entries, never stored here.

use chrono::{DateTime, Utc};
use ops_core::traits::{Entity, Id, Identifiable, Timestamped};
use serde::{Deserialize, Serialize};

/// Project entity
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Project {
    pub id: Option<Id>,
    pub client_id: Id,
    pub name: String,

    /// Budget ceiling in hours; unset or non-positive disables the overrun
    /// check.
    pub estimated_hours: Option<f64>,
    /// Fallback hourly billing rate when no more specific rate applies.
    pub global_rate: Option<f64>,
    pub currency: String,

    /// Archived projects stay readable for billing history.
    #[serde(default = "default_true")]
    pub active: bool,

    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

fn default_true() -> bool {
    true
}

impl Project {
    pub fn new(client_id: Id, name: impl Into<String>) -> Self {
        Self {
            id: None,
            client_id,
            name: name.into(),
            estimated_hours: None,
            global_rate: None,
            currency: "USD".to_string(),
            active: true,
            created_at: None,
            updated_at: None,
        }
    }

    /// Whether the project carries a usable budget ceiling.
    pub fn has_budget(&self) -> bool {
        matches!(self.estimated_hours, Some(hours) if hours > 0.0)
    }
}

impl Identifiable for Project {
    fn id(&self) -> Option<Id> {
        self.id
    }
}

impl Timestamped for Project {
    fn created_at(&self) -> Option<DateTime<Utc>> {
        self.created_at
    }

    fn updated_at(&self) -> Option<DateTime<Utc>> {
        self.updated_at
    }
}

impl Entity for Project {
    const TABLE_NAME: &'static str = "projects";
    const TYPE_NAME: &'static str = "Project";
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_has_budget() {
        let mut project = Project::new(1, "Redesign");
        assert!(!project.has_budget());

        project.estimated_hours = Some(0.0);
        assert!(!project.has_budget());

        project.estimated_hours = Some(-4.0);
        assert!(!project.has_budget());

        project.estimated_hours = Some(10.0);
        assert!(project.has_budget());
    }
}
