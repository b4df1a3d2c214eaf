//! Persistence traits for opsconsole entities.
//!
//! Every aggregate in the system (time entries, projects, invoices, payroll
//! runs) carries an optional database id plus audit timestamps; the traits
//! here name that shape once so stores and models agree on it.

use chrono::{DateTime, Utc};

/// Database primary key. All aggregates use bigserial keys.
pub type Id = i64;

/// An entity that is keyed by [`Id`] once stored.
///
/// `id` is `None` until the row is inserted; stores assign it.
pub trait Identifiable {
    fn id(&self) -> Option<Id>;

    /// Whether the entity has been through an insert.
    fn is_persisted(&self) -> bool {
        self.id().is_some()
    }
}

/// Audit timestamps maintained by the stores on insert and update.
pub trait Timestamped {
    fn created_at(&self) -> Option<DateTime<Utc>>;
    fn updated_at(&self) -> Option<DateTime<Utc>>;
}

/// Soft deletion marker.
///
/// Deletion is a marker, not removal: rows referenced by invoice lines or
/// payroll records must stay addressable.
pub trait SoftDeletable {
    fn deleted_at(&self) -> Option<DateTime<Utc>>;

    fn is_deleted(&self) -> bool {
        self.deleted_at().is_some()
    }
}

/// Marker for persisted aggregates, tying the key and audit traits together
/// with the names the storage layer knows them by.
pub trait Entity: Identifiable + Timestamped + Send + Sync {
    /// Table the aggregate persists to.
    const TABLE_NAME: &'static str;

    /// Display name used in error messages.
    const TYPE_NAME: &'static str;
}
