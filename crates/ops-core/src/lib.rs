//! # ops-core
//!
//! Core types, traits, and utilities shared across OpsConsole crates:
//!
//! - The [`traits::Id`] primary-key alias and entity traits
//! - The [`clock::Clock`] abstraction over wall-clock time
//! - The [`lock::LockRegistry`] for per-entity critical sections
//! - Application configuration loaded from the environment

pub mod clock;
pub mod config;
pub mod lock;
pub mod traits;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{AppConfig, ConfigError};
pub use lock::{LockKey, LockRegistry};
pub use traits::Id;
