//! DentForge Common Library
//!
//! Shared code for the DentForge services including:
//! - Dental chart domain: code catalog, procedure ledger, reconciler
//! - Schedule override expansion
//! - Database models and repository patterns
//! - Error types and handling
//! - Configuration management
//! - Authentication utilities
//! - Metrics and observability

pub mod auth;
pub mod config;
pub mod db;
pub mod dental;
pub mod errors;
pub mod metrics;
pub mod schedule;

// Re-export commonly used types
pub use config::AppConfig;
pub use db::{DbPool, Repository};
pub use errors::{AppError, Result};

/// Application version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
