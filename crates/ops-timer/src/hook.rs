//! Budget hook
//!
//! Seam between the timer and downstream billing automation. The timer tells
//! the hook which project's logged time changed; whatever the hook does with
//! that must swallow its own failures, because the triggering write has
//! already committed.

use async_trait::async_trait;
use ops_core::traits::Id;

/// Receives project time-change events from the timer engine.
#[async_trait]
pub trait BudgetHook: Send + Sync {
    /// Called after an operation changed a project's logged time.
    async fn hours_changed(&self, project_id: Id);
}

/// Hook that does nothing. Used where no billing automation is wired.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopBudgetHook;

#[async_trait]
impl BudgetHook for NoopBudgetHook {
    async fn hours_changed(&self, _project_id: Id) {}
}
