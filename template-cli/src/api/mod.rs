//! Directus API access
//!
//! Provides the per-run API client plus the resilience layer every request
//! passes through: the scheduler (spacing, concurrency window, reservoir)
//! and the fixed-delay retry policy.

pub mod client;
pub mod config;
pub mod error;
pub mod retry;
pub mod scheduler;

pub use client::{DirectusClient, item_path};
pub use config::{ResilienceConfig, RetryConfig, SchedulerConfig};
pub use error::{ApiError, RemoteError};
pub use retry::RetryPolicy;
pub use scheduler::Scheduler;
