//! Timer engine for opsconsole.
//!
//! Owns the lifecycle of time entries: starting, pausing, resuming and
//! stopping timers, field edits, soft deletion, and the staleness sweep that
//! closes forgotten timers. Changes that affect a project's consumed hours
//! are reported through [`BudgetHook`] so billing automation can react.

pub mod engine;
pub mod hook;

pub use engine::{EntryChanges, OpenTimerPolicy, TimerEngine, TimerError, TimerResult};
pub use hook::{BudgetHook, NoopBudgetHook};
