//! # ops-notifications
//!
//! In-app notifications for OpsConsole. Automation components publish to a
//! [`NotificationSink`]; delivery is best-effort and never blocks or fails
//! the operation that triggered it.

pub mod notification;
pub mod sink;

pub use notification::{Audience, Notification, NotificationKind};
pub use sink::{MemoryNotificationSink, NotificationSink, PgNotificationSink, SinkError, SinkResult};
